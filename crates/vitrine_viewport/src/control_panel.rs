//! egui rendering of the control binding table.
//!
//! Widgets edit a local copy of each value; anything the user changed comes
//! back as a list of edits for the caller to push through
//! [`ControlPanel::set`], so the store stays the single writer.

use vitrine_core::{Binding, ControlPanel, Folder, ParamKey, ParamValue, ParameterStore};
use vitrine_math::Color;

/// Read-only figures shown above the controls.
#[derive(Debug, Clone, Default)]
pub struct PanelStats {
    pub fps: f32,
    pub frames: u64,
    pub failed_frames: u64,
    pub meshes: usize,
    pub triangles: usize,
    pub asset: String,
}

const FOLDERS: [Folder; 4] = [Folder::Haze, Folder::Lines, Folder::Bloom, Folder::Model];

pub(crate) fn color_to_srgb8(color: Color) -> [u8; 3] {
    color.to_array().map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

pub(crate) fn srgb8_to_color(rgb: [u8; 3]) -> Color {
    Color::from_array(rgb.map(|c| c as f32 / 255.0))
}

fn binding_widget(ui: &mut egui::Ui, binding: &Binding, current: ParamValue) -> Option<ParamValue> {
    match current {
        ParamValue::Scalar(mut value) => {
            let (min, max) = binding.range.unwrap_or((0.0, 1.0));
            let changed = ui
                .add(egui::Slider::new(&mut value, min..=max))
                .changed();
            changed.then_some(ParamValue::Scalar(value))
        }
        ParamValue::Color(color) => {
            let mut rgb = color_to_srgb8(color);
            let changed = ui.color_edit_button_srgb(&mut rgb).changed();
            changed.then(|| ParamValue::Color(srgb8_to_color(rgb)))
        }
    }
}

/// Draw the panel and return the edits made this frame.
pub(crate) fn show(
    ctx: &egui::Context,
    panel: &ControlPanel,
    store: &ParameterStore,
    stats: &PanelStats,
) -> Vec<(ParamKey, ParamValue)> {
    let mut edits = Vec::new();
    if !panel.visible {
        return edits;
    }

    egui::SidePanel::right("controls_panel")
        .default_width(280.0)
        .show(ctx, |ui| {
            ui.heading("Vitrine");
            ui.separator();

            ui.label(format!("FPS: {:.1}", stats.fps));
            ui.collapsing("Stats", |ui| {
                ui.label(format!("Frames: {}", stats.frames));
                ui.label(format!("Failed frames: {}", stats.failed_frames));
                ui.label(format!("Asset: {}", stats.asset));
                ui.label(format!("Meshes: {}", stats.meshes));
                ui.label(format!("Triangles: {}", stats.triangles));
            });
            ui.separator();

            for folder in FOLDERS {
                let mut bindings = panel.folder(folder).peekable();
                if bindings.peek().is_none() {
                    continue;
                }

                egui::CollapsingHeader::new(folder.title())
                    .default_open(true)
                    .show(ui, |ui| {
                        egui::Grid::new(folder.title())
                            .num_columns(2)
                            .striped(true)
                            .show(ui, |ui| {
                                for binding in bindings {
                                    let Ok(current) = store.value(binding.key) else {
                                        continue;
                                    };
                                    ui.label(binding.label);
                                    if let Some(value) = binding_widget(ui, binding, current) {
                                        edits.push((binding.key, value));
                                    }
                                    ui.end_row();
                                }
                            });
                    });
            }

            ui.separator();
            ui.collapsing("Controls", |ui| {
                ui.label("Left Mouse: Orbit");
                ui.label("Scroll Wheel: Dolly");
                ui.label("H: Toggle this panel");
            });
        });

    edits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srgb8_conversion() {
        let color = Color::from_hex("#ff8000").unwrap();
        assert_eq!(color_to_srgb8(color), [255, 128, 0]);

        let back = srgb8_to_color([255, 128, 0]);
        assert!((back.g - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(back.r, 1.0);
    }

    #[test]
    fn test_out_of_range_channels_clamp() {
        let color = Color::new(1.5, -0.2, 0.5);
        assert_eq!(color_to_srgb8(color), [255, 0, 128]);
    }
}
