//! Vitrine Core - GPU-agnostic pieces of the product viewer.
//!
//! This crate provides:
//!
//! - **Parameters**: `ParameterStore`, `SceneSettings`, `StageConfig`
//! - **Scene graph**: `Scene`, `SceneNode`, `Mesh`, `Material`
//! - **Backdrop**: CPU reference of the procedural background shader
//! - **Assets**: asynchronous glTF loading into a single-assignment slot
//! - **Camera**: damped orbit controls driving a perspective camera
//! - **Post**: bloom parameters and size-checked render targets
//! - **Panel**: the declarative control binding table
//! - **Stage**: `StageState`, the live components seeded from the store
//! - **Scheduling**: `FrameScheduler` and the `FrameStage` it drives
//!
//! # Example
//!
//! ```ignore
//! use vitrine_core::{AssetSlot, Scene, SceneSettings};
//!
//! let settings = SceneSettings::load("look.json")?;
//! let mut store = settings.to_parameter_store();
//! let mut slot = AssetSlot::load(std::path::PathBuf::from("models/phantom.glb"));
//! ```

pub mod asset;
pub mod background;
pub mod clock;
pub mod mesh;
pub mod panel;
pub mod params;
pub mod post;
pub mod rig;
pub mod scene;
pub mod scheduler;
pub mod settings;
pub mod stage;

// Re-export commonly used types
pub use asset::{
    AssetError, AssetEvent, AssetHandle, AssetOverrides, AssetSlot, AssetSource, AssetStage,
    PendingAsset,
};
pub use background::{ShaderUniformSet, UniformError, UniformName, UniformValue};
pub use clock::Clock;
pub use mesh::Mesh;
pub use panel::{
    AssetField, AssetTarget, Binding, BindingTarget, BindingTargets, ControlPanel, Folder,
    PanelError,
};
pub use params::{ParamError, ParamKey, ParamValue, Parameter, ParameterStore, SubscriptionId};
pub use post::{BloomField, PostProcessConfig, SizedTargets, StaleTargets, BLOOM_LEVELS};
pub use rig::{CameraRig, OrbitControls, ViewportState};
pub use scene::{Material, NodeId, Scene, SceneNode, Transform};
pub use scheduler::{FpsCounter, FrameScheduler, FrameStage, SchedulerState, TickOutcome};
pub use settings::{Lighting, SceneSettings, SettingsError, StageConfig};
pub use stage::StageState;
