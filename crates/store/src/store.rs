use std::any::Any;
use std::collections::BTreeMap;

use crate::prop::{Clamp, PropValue};

/// Errors from store access.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("prop '{0}' was never declared")]
    UnknownProp(String),
    #[error("prop '{name}' holds a {expected} value, got {actual}")]
    PropTypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("state slot {index} out of range ({len} slots allocated)")]
    SlotOutOfRange { index: usize, len: usize },
    #[error("state slot {index} holds a different type")]
    SlotTypeMismatch { index: usize },
}

/// Stable handle to one state slot of a [`Store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey(pub usize);

/// Outcome of [`Store::effect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Dependencies differ from the committed ones; run the effect.
    Changed,
    /// Nothing changed; skip.
    Unchanged,
}

impl Effect {
    pub fn is_changed(self) -> bool {
        self == Effect::Changed
    }
}

#[derive(Debug)]
struct Prop {
    value: PropValue,
    clamp: Option<Clamp>,
}

/// Per-node memoized state container.
///
/// Holds three kinds of state:
/// - props: named values with an optional clamp rule fixed at first declaration
/// - state slots: opaque values addressed either by an explicit key or by the
///   order of [`Store::state`] calls within one run
/// - effect slots: the last committed dependency list of each effect
///
/// # Preconditions
/// The owner calls [`Store::reset`] once before every run, and the sequence of
/// positional `state`/`effect` calls is identical from run to run. A
/// conditional call shifts every later slot and silently aliases state; use
/// [`Store::keyed_state`] where call order is not fixed.
#[derive(Default)]
pub struct Store {
    props: BTreeMap<String, Prop>,
    slots: Vec<Box<dyn Any>>,
    /// Positional call order -> slot index.
    ordered: Vec<usize>,
    keyed: BTreeMap<String, usize>,
    cursor: usize,
    effects: Vec<Option<Vec<PropValue>>>,
    effect_cursor: usize,
    /// Effect index -> queued dependency list. Later writes replace earlier ones.
    pending: BTreeMap<usize, Vec<PropValue>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Props ---

    /// Declare a prop, or read it if it already exists.
    ///
    /// The first declaration fixes the clamp rule and stores the clamped
    /// initial value. Later declarations ignore `initial` and `clamp` and
    /// return the live value.
    pub fn declare_prop(
        &mut self,
        name: &str,
        initial: impl Into<PropValue>,
        clamp: Option<Clamp>,
    ) -> PropValue {
        if let Some(prop) = self.props.get(name) {
            return prop.value;
        }
        let initial = initial.into();
        let value = clamp.as_ref().map_or(initial, |c| c.apply(initial));
        self.props.insert(name.to_string(), Prop { value, clamp });
        value
    }

    pub fn prop(&self, name: &str) -> Option<&PropValue> {
        self.props.get(name).map(|p| &p.value)
    }

    pub fn has_prop(&self, name: &str) -> bool {
        self.props.contains_key(name)
    }

    /// Read a scalar prop.
    pub fn scalar(&self, name: &str) -> Result<f32, StoreError> {
        let value = self
            .prop(name)
            .ok_or_else(|| StoreError::UnknownProp(name.to_string()))?;
        value.as_scalar().ok_or_else(|| StoreError::PropTypeMismatch {
            name: name.to_string(),
            expected: "scalar",
            actual: value.kind(),
        })
    }

    /// Write a prop through its clamp rule. Returns the stored value.
    pub fn set_prop(
        &mut self,
        name: &str,
        value: impl Into<PropValue>,
    ) -> Result<PropValue, StoreError> {
        let value = value.into();
        let prop = self
            .props
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownProp(name.to_string()))?;
        if !prop.value.same_kind(&value) {
            return Err(StoreError::PropTypeMismatch {
                name: name.to_string(),
                expected: prop.value.kind(),
                actual: value.kind(),
            });
        }
        prop.value = prop.clamp.as_ref().map_or(value, |c| c.apply(value));
        Ok(prop.value)
    }

    /// Names of all declared props, sorted.
    pub fn prop_names(&self) -> impl Iterator<Item = &str> {
        self.props.keys().map(String::as_str)
    }

    // --- State slots ---

    /// Rewind the positional slot and effect cursors for a new run.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.effect_cursor = 0;
    }

    /// Address the next positional slot, allocating it with `init` on first use.
    pub fn state<T: Any>(&mut self, init: impl FnOnce() -> T) -> SlotKey {
        let index = match self.ordered.get(self.cursor) {
            Some(&index) => index,
            None => {
                let index = self.allocate(init);
                self.ordered.push(index);
                index
            }
        };
        self.cursor += 1;
        SlotKey(index)
    }

    /// Address a slot by explicit key, allocating it with `init` on first use.
    pub fn keyed_state<T: Any>(&mut self, key: &str, init: impl FnOnce() -> T) -> SlotKey {
        if let Some(&index) = self.keyed.get(key) {
            return SlotKey(index);
        }
        let index = self.allocate(init);
        self.keyed.insert(key.to_string(), index);
        SlotKey(index)
    }

    fn allocate<T: Any>(&mut self, init: impl FnOnce() -> T) -> usize {
        self.slots.push(Box::new(init()));
        tracing::trace!(index = self.slots.len() - 1, "allocated state slot");
        self.slots.len() - 1
    }

    pub fn get<T: Any>(&self, slot: SlotKey) -> Result<&T, StoreError> {
        let len = self.slots.len();
        self.slots
            .get(slot.0)
            .ok_or(StoreError::SlotOutOfRange { index: slot.0, len })?
            .downcast_ref::<T>()
            .ok_or(StoreError::SlotTypeMismatch { index: slot.0 })
    }

    pub fn get_mut<T: Any>(&mut self, slot: SlotKey) -> Result<&mut T, StoreError> {
        let len = self.slots.len();
        self.slots
            .get_mut(slot.0)
            .ok_or(StoreError::SlotOutOfRange { index: slot.0, len })?
            .downcast_mut::<T>()
            .ok_or(StoreError::SlotTypeMismatch { index: slot.0 })
    }

    pub fn set<T: Any>(&mut self, slot: SlotKey, value: T) -> Result<(), StoreError> {
        *self.get_mut::<T>(slot)? = value;
        Ok(())
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    // --- Effects ---

    /// Compare `deps` positionally against this effect slot's committed list.
    ///
    /// An empty list, or any difference, returns [`Effect::Changed`] and queues
    /// the new list. The write lands on the next [`Store::flush`], so calls
    /// before then still compare against the old list. Each effect slot keeps
    /// at most one queued write; the latest one wins.
    pub fn effect(&mut self, deps: &[PropValue]) -> Effect {
        let index = self.effect_cursor;
        self.effect_cursor += 1;
        if index >= self.effects.len() {
            self.effects.push(None);
        }

        let unchanged = !deps.is_empty() && self.effects[index].as_deref() == Some(deps);
        if unchanged {
            return Effect::Unchanged;
        }
        self.pending.insert(index, deps.to_vec());
        Effect::Changed
    }

    /// Commit queued effect writes. Called once the run's synchronous work is done.
    pub fn flush(&mut self) {
        for (index, deps) in std::mem::take(&mut self.pending) {
            self.effects[index] = Some(deps);
        }
    }

    pub fn pending_effects(&self) -> usize {
        self.pending.len()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("props", &self.props)
            .field("slots", &self.slots.len())
            .field("cursor", &self.cursor)
            .field("effects", &self.effects.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn declare_prop_is_idempotent() {
        let mut store = Store::new();
        let first = store.declare_prop("fov", 50.0f32, None);
        let second = store.declare_prop("fov", 90.0f32, None);
        assert_eq!(first, PropValue::Scalar(50.0));
        assert_eq!(second, PropValue::Scalar(50.0));
        assert_eq!(store.scalar("fov"), Ok(50.0));
    }

    #[test]
    fn first_clamp_rule_wins() {
        let mut store = Store::new();
        store.declare_prop("zoom", 1.0f32, Some(Clamp::range(0.5, 2.0)));
        store.declare_prop("zoom", 1.0f32, Some(Clamp::range(0.0, 100.0)));
        assert_eq!(store.set_prop("zoom", 10.0f32), Ok(PropValue::Scalar(2.0)));
    }

    #[test]
    fn initial_value_is_clamped() {
        let mut store = Store::new();
        let v = store.declare_prop("fov", 500.0f32, Some(Clamp::range(1.0, 179.0)));
        assert_eq!(v, PropValue::Scalar(179.0));
    }

    #[test]
    fn set_prop_errors() {
        let mut store = Store::new();
        assert_eq!(
            store.set_prop("missing", 1.0f32),
            Err(StoreError::UnknownProp("missing".into()))
        );
        store.declare_prop("light", Vec3::ZERO, None);
        assert!(matches!(
            store.set_prop("light", 1.0f32),
            Err(StoreError::PropTypeMismatch { expected: "vector3", actual: "scalar", .. })
        ));
        assert!(matches!(
            store.scalar("light"),
            Err(StoreError::PropTypeMismatch { .. })
        ));
    }

    #[test]
    fn state_slots_are_stable_across_runs() {
        let mut store = Store::new();

        store.reset();
        let a = store.state(|| 1u32);
        let b = store.state(|| 2u32);
        assert_ne!(a, b);
        store.set(a, 10u32).unwrap();
        *store.get_mut::<u32>(b).unwrap() += 5;
        assert_eq!(*store.get::<u32>(a).unwrap(), 10);
        assert_eq!(*store.get::<u32>(b).unwrap(), 7);

        store.reset();
        let a2 = store.state(|| 99u32);
        let b2 = store.state(|| 99u32);
        assert_eq!(a, a2);
        assert_eq!(b, b2);
        assert_eq!(*store.get::<u32>(a2).unwrap(), 10);
        assert_eq!(*store.get::<u32>(b2).unwrap(), 7);
        assert_eq!(store.slot_count(), 2);
    }

    #[test]
    fn missing_reset_grows_slots() {
        let mut store = Store::new();
        store.state(|| 0u8);
        store.state(|| 0u8);
        assert_eq!(store.slot_count(), 2);
    }

    #[test]
    fn keyed_state_ignores_call_order() {
        let mut store = Store::new();
        store.reset();
        let packed = store.keyed_state("packed", || vec![1.0f32, 2.0]);
        store.state(|| 'x');

        store.reset();
        store.state(|| 'y');
        let again = store.keyed_state("packed", || Vec::<f32>::new());
        assert_eq!(packed, again);
        assert_eq!(store.get::<Vec<f32>>(again).unwrap().len(), 2);
    }

    #[test]
    fn slot_misuse_names_the_index() {
        let mut store = Store::new();
        let slot = store.state(|| 1i32);
        assert_eq!(
            store.get::<f32>(slot),
            Err(StoreError::SlotTypeMismatch { index: 0 })
        );
        assert_eq!(
            store.get::<i32>(SlotKey(4)),
            Err(StoreError::SlotOutOfRange { index: 4, len: 1 })
        );
    }

    #[test]
    fn effect_gates_on_dependency_change() {
        let mut store = Store::new();
        let deps = [PropValue::Scalar(1.0), PropValue::Flag(true)];

        store.reset();
        assert_eq!(store.effect(&deps), Effect::Changed);
        store.flush();

        store.reset();
        assert_eq!(store.effect(&deps), Effect::Unchanged);

        store.reset();
        assert_eq!(
            store.effect(&[PropValue::Scalar(2.0), PropValue::Flag(true)]),
            Effect::Changed
        );
    }

    #[test]
    fn effect_write_is_deferred_until_flush() {
        let mut store = Store::new();
        let deps = [PropValue::Scalar(3.0)];

        store.reset();
        assert!(store.effect(&deps).is_changed());
        assert_eq!(store.pending_effects(), 1);

        // Not flushed yet: the next run still sees no committed deps.
        store.reset();
        assert!(store.effect(&deps).is_changed());

        store.flush();
        assert_eq!(store.pending_effects(), 0);
        store.reset();
        assert_eq!(store.effect(&deps), Effect::Unchanged);
    }

    #[test]
    fn unflushed_runs_keep_one_write_per_effect() {
        let mut store = Store::new();
        for i in 0..1000 {
            store.reset();
            store.effect(&[PropValue::Scalar(i as f32)]);
            store.effect(&[]);
        }
        assert_eq!(store.pending_effects(), 2);

        store.flush();
        store.reset();
        assert_eq!(store.effect(&[PropValue::Scalar(999.0)]), Effect::Unchanged);
    }

    #[test]
    fn empty_dependencies_always_run() {
        let mut store = Store::new();
        for _ in 0..3 {
            store.reset();
            assert_eq!(store.effect(&[]), Effect::Changed);
            store.flush();
        }
    }
}
