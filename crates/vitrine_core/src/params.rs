//! Live-tunable parameter registry.
//!
//! Every tunable value of the scene lives here. Writes go through
//! [`ParameterStore::set`], which clamps to the declared range, stores the
//! value and then notifies every subscriber before returning.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use vitrine_math::Color;

/// Errors from parameter lookups and writes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("unknown parameter key: {0}")]
    UnknownKey(String),

    #[error("parameter {0} is not registered in this store")]
    NotRegistered(ParamKey),

    #[error("parameter {key} expects a {expected} value")]
    KindMismatch { key: ParamKey, expected: &'static str },
}

/// Recognised parameter keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamKey {
    Scale,
    Metalness,
    Roughness,
    BgSpeed,
    BgColor1,
    BgColor2,
    LineSpeed,
    LineColor,
    LineIntensity,
    LineWidth,
    BloomStrength,
    BloomRadius,
    BloomThreshold,
}

impl ParamKey {
    pub const ALL: [ParamKey; 13] = [
        ParamKey::Scale,
        ParamKey::Metalness,
        ParamKey::Roughness,
        ParamKey::BgSpeed,
        ParamKey::BgColor1,
        ParamKey::BgColor2,
        ParamKey::LineSpeed,
        ParamKey::LineColor,
        ParamKey::LineIntensity,
        ParamKey::LineWidth,
        ParamKey::BloomStrength,
        ParamKey::BloomRadius,
        ParamKey::BloomThreshold,
    ];

    /// Name used in settings files.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKey::Scale => "scale",
            ParamKey::Metalness => "metalness",
            ParamKey::Roughness => "roughness",
            ParamKey::BgSpeed => "bgSpeed",
            ParamKey::BgColor1 => "bgColor1",
            ParamKey::BgColor2 => "bgColor2",
            ParamKey::LineSpeed => "lineSpeed",
            ParamKey::LineColor => "lineColor",
            ParamKey::LineIntensity => "lineIntensity",
            ParamKey::LineWidth => "lineWidth",
            ParamKey::BloomStrength => "bloomStrength",
            ParamKey::BloomRadius => "bloomRadius",
            ParamKey::BloomThreshold => "bloomThreshold",
        }
    }

    pub fn is_color(&self) -> bool {
        matches!(
            self,
            ParamKey::BgColor1 | ParamKey::BgColor2 | ParamKey::LineColor
        )
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamKey {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParamKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ParamError::UnknownKey(s.to_string()))
    }
}

/// A parameter value: a number or a color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Scalar(f32),
    Color(Color),
}

impl ParamValue {
    pub fn as_scalar(&self) -> Option<f32> {
        match self {
            ParamValue::Scalar(v) => Some(*v),
            ParamValue::Color(_) => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match self {
            ParamValue::Color(c) => Some(*c),
            ParamValue::Scalar(_) => None,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            ParamValue::Scalar(_) => "scalar",
            ParamValue::Color(_) => "color",
        }
    }
}

/// A registered parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub key: ParamKey,
    pub value: ParamValue,
    /// Inclusive `[min, max]` for scalar values
    pub range: Option<(f32, f32)>,
}

/// Handle returned by [`ParameterStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&Parameter)>;

/// `value` clamped into `range`, or `None` if it is not finite.
fn clamp_scalar(value: f32, range: Option<(f32, f32)>) -> Option<f32> {
    if !value.is_finite() {
        return None;
    }
    Some(range.map_or(value, |(min, max)| value.clamp(min, max)))
}

/// Mutable parameter registry with synchronous change notification.
#[derive(Default)]
pub struct ParameterStore {
    params: BTreeMap<ParamKey, Parameter>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter with its initial value. Re-registering replaces it.
    pub fn register(&mut self, key: ParamKey, value: ParamValue, range: Option<(f32, f32)>) {
        let value = match value {
            ParamValue::Scalar(v) => {
                let fallback = range.map_or(0.0, |(min, _)| min);
                ParamValue::Scalar(clamp_scalar(v, range).unwrap_or(fallback))
            }
            other => other,
        };
        self.params.insert(key, Parameter { key, value, range });
    }

    pub fn get(&self, key: ParamKey) -> Option<&Parameter> {
        self.params.get(&key)
    }

    pub fn value(&self, key: ParamKey) -> Result<ParamValue, ParamError> {
        self.params
            .get(&key)
            .map(|p| p.value)
            .ok_or(ParamError::NotRegistered(key))
    }

    pub fn scalar(&self, key: ParamKey) -> Result<f32, ParamError> {
        self.value(key)?.as_scalar().ok_or(ParamError::KindMismatch {
            key,
            expected: "scalar",
        })
    }

    pub fn color(&self, key: ParamKey) -> Result<Color, ParamError> {
        self.value(key)?.as_color().ok_or(ParamError::KindMismatch {
            key,
            expected: "color",
        })
    }

    pub fn range(&self, key: ParamKey) -> Option<(f32, f32)> {
        self.params.get(&key).and_then(|p| p.range)
    }

    pub fn keys(&self) -> impl Iterator<Item = ParamKey> + '_ {
        self.params.keys().copied()
    }

    /// Write a value and notify subscribers.
    ///
    /// Out-of-range scalars are clamped, not rejected; NaN and infinities keep
    /// the previous value. Returns the stored value.
    pub fn set(&mut self, key: ParamKey, value: ParamValue) -> Result<ParamValue, ParamError> {
        let param = self
            .params
            .get_mut(&key)
            .ok_or(ParamError::NotRegistered(key))?;

        let stored = match (param.value, value) {
            (ParamValue::Scalar(previous), ParamValue::Scalar(v)) => {
                let clamped = match clamp_scalar(v, param.range) {
                    Some(clamped) => clamped,
                    None => {
                        log::debug!("{} = {} is not finite, keeping {}", key, v, previous);
                        previous
                    }
                };
                if v.is_finite() && clamped != v {
                    log::debug!("{} = {} clamped to {}", key, v, clamped);
                }
                ParamValue::Scalar(clamped)
            }
            (ParamValue::Color(_), ParamValue::Color(c)) => ParamValue::Color(c),
            (current, _) => {
                return Err(ParamError::KindMismatch {
                    key,
                    expected: current.kind_name(),
                })
            }
        };

        // Value is fully written before anyone is told about it
        param.value = stored;
        let param = &self.params[&key];
        for (_, subscriber) in self.subscribers.iter_mut() {
            subscriber(param);
        }

        Ok(stored)
    }

    /// Register a change listener. Called synchronously from `set`.
    pub fn subscribe(&mut self, subscriber: impl FnMut(&Parameter) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Drop every listener. Returns how many were removed.
    pub fn clear_subscribers(&mut self) -> usize {
        let count = self.subscribers.len();
        self.subscribers.clear();
        count
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterStore")
            .field("params", &self.params)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn store() -> ParameterStore {
        let mut store = ParameterStore::new();
        store.register(ParamKey::LineWidth, ParamValue::Scalar(0.05), Some((0.01, 0.2)));
        store.register(
            ParamKey::BgColor1,
            ParamValue::Color(Color::from_hex("#06090f").unwrap()),
            None,
        );
        store
    }

    #[test]
    fn test_key_names_roundtrip() {
        for key in ParamKey::ALL {
            assert_eq!(key.as_str().parse::<ParamKey>().unwrap(), key);
        }
        assert!(matches!(
            "glow".parse::<ParamKey>(),
            Err(ParamError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_set_clamps_to_range() {
        let mut store = store();

        let stored = store.set(ParamKey::LineWidth, ParamValue::Scalar(5.0)).unwrap();
        assert_eq!(stored, ParamValue::Scalar(0.2));
        assert_eq!(store.scalar(ParamKey::LineWidth).unwrap(), 0.2);

        store.set(ParamKey::LineWidth, ParamValue::Scalar(-1.0)).unwrap();
        assert_eq!(store.scalar(ParamKey::LineWidth).unwrap(), 0.01);
    }

    #[test]
    fn test_non_finite_set_keeps_previous() {
        let mut store = store();
        store.set(ParamKey::LineWidth, ParamValue::Scalar(0.1)).unwrap();

        let stored = store.set(ParamKey::LineWidth, ParamValue::Scalar(f32::NAN)).unwrap();
        assert_eq!(stored, ParamValue::Scalar(0.1));

        store.set(ParamKey::LineWidth, ParamValue::Scalar(f32::INFINITY)).unwrap();
        let width = store.scalar(ParamKey::LineWidth).unwrap();
        assert!(width.is_finite());
        assert!((width - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_non_finite_register_uses_range_floor() {
        let mut store = ParameterStore::new();
        store.register(ParamKey::BgSpeed, ParamValue::Scalar(f32::NAN), Some((0.0, 2.0)));
        assert_eq!(store.scalar(ParamKey::BgSpeed).unwrap(), 0.0);
    }

    #[test]
    fn test_register_clamps_initial_value() {
        let mut store = ParameterStore::new();
        store.register(ParamKey::BgSpeed, ParamValue::Scalar(9.0), Some((0.0, 2.0)));
        assert_eq!(store.scalar(ParamKey::BgSpeed).unwrap(), 2.0);
    }

    #[test]
    fn test_kind_mismatch_leaves_value() {
        let mut store = store();
        let err = store
            .set(ParamKey::LineWidth, ParamValue::Color(Color::WHITE))
            .unwrap_err();
        assert_eq!(
            err,
            ParamError::KindMismatch {
                key: ParamKey::LineWidth,
                expected: "scalar"
            }
        );
        assert_eq!(store.scalar(ParamKey::LineWidth).unwrap(), 0.05);
        assert!(store.color(ParamKey::LineWidth).is_err());
    }

    #[test]
    fn test_unregistered_key() {
        let mut store = store();
        assert_eq!(
            store.set(ParamKey::Scale, ParamValue::Scalar(1.0)),
            Err(ParamError::NotRegistered(ParamKey::Scale))
        );
    }

    #[test]
    fn test_subscribers_see_committed_value() {
        let mut store = store();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let log_a = seen.clone();
        store.subscribe(move |p| log_a.borrow_mut().push(("a", p.key, p.value)));
        let log_b = seen.clone();
        store.subscribe(move |p| log_b.borrow_mut().push(("b", p.key, p.value)));

        store.set(ParamKey::LineWidth, ParamValue::Scalar(1.0)).unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], ("a", ParamKey::LineWidth, ParamValue::Scalar(0.2)));
        assert_eq!(seen[1], ("b", ParamKey::LineWidth, ParamValue::Scalar(0.2)));
    }

    #[test]
    fn test_unsubscribe_and_clear() {
        let mut store = store();
        let count = Rc::new(RefCell::new(0));

        let c = count.clone();
        let id = store.subscribe(move |_| *c.borrow_mut() += 1);
        let c = count.clone();
        store.subscribe(move |_| *c.borrow_mut() += 1);

        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.set(ParamKey::LineWidth, ParamValue::Scalar(0.1)).unwrap();
        assert_eq!(*count.borrow(), 1);

        assert_eq!(store.clear_subscribers(), 1);
        assert_eq!(store.clear_subscribers(), 0);
        store.set(ParamKey::LineWidth, ParamValue::Scalar(0.1)).unwrap();
        assert_eq!(*count.borrow(), 1);
    }
}
