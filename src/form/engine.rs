use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use indexmap::IndexMap;
use log::warn;
use serde_json::Value;

use crate::{
    domain::{FieldPath, FieldRules},
    validation::{ErrorInfo, ErrorKind, Validation},
};

use super::{
    array::ArrayState,
    bus::{Selector, Subscription, SubscriptionBus},
    error::FormError,
    node::FieldState,
    options::{FormOptions, ResetOptions, SetValueOptions},
    registry::FieldRegistry,
    state::{FormMachine, FormPhase, FormSnapshot},
};

/// Shared state behind every [`FormEngine`] handle.
#[derive(Debug)]
pub(crate) struct FormCore {
    pub registry: FieldRegistry,
    pub machine: FormMachine,
    pub arrays: IndexMap<FieldPath, ArrayState>,
    pub bus: SubscriptionBus,
    pub options: FormOptions,
}

impl FormCore {
    fn new(defaults: Value, options: FormOptions) -> Self {
        Self {
            registry: FieldRegistry::new(defaults),
            machine: FormMachine::default(),
            arrays: IndexMap::new(),
            bus: SubscriptionBus::default(),
            options,
        }
    }

    pub fn snapshot(&self) -> FormSnapshot {
        FormSnapshot::capture(&self.registry, &self.machine)
    }

    /// Delivers the pending diff unless a batch is holding the bus.
    pub fn flush(&mut self) {
        if let Some(diff) = self.bus.take_ready() {
            let snapshot = Arc::new(self.snapshot());
            self.bus.broadcast(snapshot, diff);
        }
    }

    /// Lets the phase leave `Validating` once no run is pending.
    pub fn settle(&mut self) {
        let valid = self.registry.is_valid();
        let pending = self.registry.any_pending();
        if self.machine.settle(valid, pending) {
            self.bus.state_changed();
        }
    }

    pub fn edited(&mut self, path: &FieldPath) {
        self.bus.field_changed(path);
        if self.machine.edit() {
            self.bus.state_changed();
        }
    }

    pub fn reset(&mut self, values: Option<Value>, options: ResetOptions) {
        self.registry.reset(values, &options);
        self.reseed_arrays_under(&FieldPath::root());
        self.machine.reset(options.keep_is_submitted);
        self.bus.field_changed(&FieldPath::root());
        self.bus.state_changed();
        self.flush();
    }

    /// A field array lies at or under `path`.
    pub fn covers_array(&self, path: &FieldPath) -> bool {
        self.arrays.keys().any(|array| array.starts_with(path))
    }
}

pub(crate) fn lock_core(core: &Mutex<FormCore>) -> MutexGuard<'_, FormCore> {
    core.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds notifications for as long as it lives. Dropping it, on unwind too,
/// releases the bus and delivers whatever piled up.
pub(crate) struct BusHold<'a> {
    engine: &'a FormEngine,
}

impl Drop for BusHold<'_> {
    fn drop(&mut self) {
        let mut core = self.engine.lock();
        core.bus.release();
        core.flush();
    }
}

/// Handle to one form. Clones share the same state.
///
/// ```ignore
/// let form = FormEngine::new(json!({"username": "Batman", "age": 0}));
/// form.register("age", None, FieldRules::new().validate("adult", |v, _| {
///     if v.as_i64().unwrap_or(0) >= 0 { Ok(()) } else { Err("age must be positive".into()) }
/// }))?;
/// form.set_value("age", json!(-1), SetValueOptions::all())?.await;
/// assert!(!form.snapshot().is_valid);
/// ```
#[derive(Clone)]
pub struct FormEngine {
    core: Arc<Mutex<FormCore>>,
}

impl fmt::Debug for FormEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.lock();
        f.debug_struct("FormEngine")
            .field("phase", &core.machine.phase())
            .field("fields", &core.registry.paths().len())
            .field("arrays", &core.arrays.len())
            .finish()
    }
}

impl FormEngine {
    pub fn new(defaults: Value) -> Self {
        Self::with_options(defaults, FormOptions::default())
    }

    pub fn with_options(defaults: Value, options: FormOptions) -> Self {
        Self {
            core: Arc::new(Mutex::new(FormCore::new(defaults, options))),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, FormCore> {
        lock_core(&self.core)
    }

    pub(crate) fn hold_bus(&self) -> BusHold<'_> {
        self.lock().bus.hold();
        BusHold { engine: self }
    }

    pub(crate) fn downgrade(&self) -> Weak<Mutex<FormCore>> {
        Arc::downgrade(&self.core)
    }

    pub fn options(&self) -> FormOptions {
        self.lock().options.clone()
    }

    /// Registers a field. Re-registering an existing path is a no-op. When
    /// the tree holds no value at `path`, `initial` (or `null`) becomes both
    /// its value and its committed default.
    pub fn register(&self, path: &str, initial: Option<Value>, rules: FieldRules) -> Result<(), FormError> {
        let path = FieldPath::parse(path)?;
        let mut core = self.lock();
        if core.registry.register(&path, initial, rules) {
            core.bus.field_changed(&path);
            core.flush();
        }
        Ok(())
    }

    /// Destroys the field (and any fields underneath it). In-flight
    /// validation for them is discarded when it resolves.
    pub fn unregister(&self, path: &str) -> Result<(), FormError> {
        let path = FieldPath::parse(path)?;
        let mut core = self.lock();
        let drop_value = core.options.should_unregister;
        let removed = core.registry.unregister(&path, drop_value);
        let arrays_before = core.arrays.len();
        core.arrays.retain(|array, _| !array.starts_with(&path));
        if removed.is_empty() && core.arrays.len() == arrays_before {
            warn!("unregister on unknown field path {path}");
            return Err(FormError::unknown(&path));
        }
        core.bus.field_changed(&path);
        core.settle();
        core.flush();
        Ok(())
    }

    /// Writes a value. State changes are visible as soon as this returns;
    /// when `options.validate` is set, the sync rules have already run and
    /// the returned [`Validation`] drives the async ones.
    ///
    /// `path` must be a registered field, or contain registered fields or a
    /// field array (setting a whole object or list).
    pub fn set_value(&self, path: &str, value: Value, options: SetValueOptions) -> Result<Validation, FormError> {
        let path = FieldPath::parse(path)?;
        let targets = {
            let mut core = self.lock();
            if core.registry.covering(&path).is_empty() && !core.covers_array(&path) {
                warn!("set_value on unknown field path {path}");
                return Err(FormError::unknown(&path));
            }
            core.registry.write(&path, value);
            core.reseed_arrays_under(&path);
            let targets = core.registry.covering(&path);
            for target in &targets {
                if options.mark_dirty {
                    core.registry.refresh_dirty(target);
                }
                if options.mark_touched {
                    core.registry.mark_touched(target);
                }
            }
            core.edited(&path);
            if !options.validate {
                core.flush();
                return Ok(Validation::skipped());
            }
            targets
        };

        let _hold = self.hold_bus();
        Ok(self.validate_targets(targets, false))
    }

    /// A user edit: marks dirty and validates according to the configured
    /// mode (before the first submit) or re-validate mode (after it).
    pub fn change(&self, path: &str, value: Value) -> Result<Validation, FormError> {
        let parsed = FieldPath::parse(path)?;
        let validate = {
            let core = self.lock();
            let touched = core.registry.node(&parsed).is_some_and(|node| node.touched);
            core.options
                .validates_on_change(core.machine.is_submitted(), touched)
        };
        let options = SetValueOptions {
            validate,
            mark_dirty: true,
            mark_touched: false,
        };
        self.set_value(path, value, options)
    }

    /// The field lost focus: marks it touched and validates if the mode asks.
    pub fn blur(&self, path: &str) -> Result<Validation, FormError> {
        let path = FieldPath::parse(path)?;
        let validate = {
            let mut core = self.lock();
            if !core.registry.contains(&path) {
                warn!("blur on unknown field path {path}");
                return Err(FormError::unknown(&path));
            }
            if core.registry.mark_touched(&path) {
                core.bus.field_changed(&path);
                core.flush();
            }
            core.options.validates_on_blur(core.machine.is_submitted())
        };
        if !validate {
            return Ok(Validation::skipped());
        }
        Ok(self.validate_targets(vec![path], false))
    }

    /// A copy of the value at `path`, `None` when the tree has nothing there.
    pub fn get_value(&self, path: &str) -> Result<Option<Value>, FormError> {
        let path = FieldPath::parse(path)?;
        Ok(self.lock().registry.value_at(&path).cloned())
    }

    /// A copy of the whole value tree.
    pub fn values(&self) -> Value {
        self.lock().registry.values().clone()
    }

    pub fn field_state(&self, path: &str) -> Result<FieldState, FormError> {
        let path = FieldPath::parse(path)?;
        self.lock()
            .registry
            .field_state(&path)
            .ok_or_else(|| FormError::unknown(&path))
    }

    pub fn is_registered(&self, path: &str) -> bool {
        FieldPath::parse(path).is_ok_and(|path| self.lock().registry.contains(&path))
    }

    pub fn errors(&self) -> IndexMap<String, ErrorInfo> {
        self.lock().registry.errors()
    }

    /// Sets a manual error on a field.
    pub fn set_error(&self, path: &str, message: impl Into<String>) -> Result<(), FormError> {
        let path = FieldPath::parse(path)?;
        let mut core = self.lock();
        if !core.registry.set_error(&path, ErrorInfo::new(ErrorKind::Manual, message)) {
            return Err(FormError::unknown(&path));
        }
        core.bus.field_changed(&path);
        let valid = core.registry.is_valid();
        if core.machine.refresh(valid) {
            core.bus.state_changed();
        }
        core.flush();
        Ok(())
    }

    /// Clears errors at and under `path`, or every error when `None`.
    pub fn clear_errors(&self, path: Option<&str>) -> Result<(), FormError> {
        let path = path.map(FieldPath::parse).transpose()?;
        let mut core = self.lock();
        match &path {
            Some(path) => {
                core.registry.clear_errors_under(path);
                core.bus.field_changed(path);
            }
            None => {
                core.registry.clear_all_errors();
                core.bus.field_changed(&FieldPath::root());
            }
        }
        let valid = core.registry.is_valid();
        if core.machine.refresh(valid) {
            core.bus.state_changed();
        }
        core.flush();
        Ok(())
    }

    /// Back to the original defaults and `Pristine`.
    pub fn reset(&self) {
        self.reset_with(None, ResetOptions::default());
    }

    /// Replaces the values with `values` (or the defaults), clears
    /// interaction state per `options` and cancels in-flight validation.
    pub fn reset_with(&self, values: Option<Value>, options: ResetOptions) {
        self.lock().reset(values, options);
    }

    pub fn snapshot(&self) -> FormSnapshot {
        self.lock().snapshot()
    }

    pub fn phase(&self) -> FormPhase {
        self.lock().machine.phase()
    }

    pub fn subscribe(&self, selector: Selector) -> Subscription {
        let mut core = self.lock();
        Subscription::open(&self.core, &mut core, selector)
    }

    /// Updates touching `path` (or anything above or below it).
    pub fn watch(&self, path: &str) -> Result<Subscription, FormError> {
        let path = FieldPath::parse(path)?;
        Ok(self.subscribe(Selector::Fields(vec![path])))
    }

    /// Runs `f` with notifications held; everything it changes is delivered
    /// as a single update afterwards, even if `f` panics.
    pub fn batch<R>(&self, f: impl FnOnce(&FormEngine) -> R) -> R {
        let _hold = self.hold_bus();
        f(self)
    }
}
