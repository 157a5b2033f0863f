//! Typed fronts for settings keys.
//!
//! A [`Parameter`] is an `Rc` handle and is deliberately `!Send`: parameters
//! live on the affinity thread together with the dependency engine, and
//! background workers have to go through the dispatcher to reach them.

use crate::store::{ConfigStore, StoreEvent};
use crate::value::{ParamKind, ParamValue};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::{Arc, mpsc};
use tracing::debug;

pub type ListenerId = u64;

type ValueListener = Rc<dyn Fn(&Parameter)>;
type StateListener = Rc<dyn Fn(&Parameter, StateChange)>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StateChange {
    Enabled(bool),
    Visible(bool),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
    None,
    IntRange { min: i64, max: i64 },
    Choices(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    #[error("parameter '{key}' expects a {expected} value, got {actual}")]
    KindMismatch {
        key: String,
        expected: ParamKind,
        actual: ParamKind,
    },
    #[error("parameter '{key}' value {value} is outside {min}..={max}")]
    OutOfRange {
        key: String,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("parameter '{key}' does not accept '{value}'")]
    InvalidChoice { key: String, value: String },
}

struct ParameterInner {
    key: String,
    default: ParamValue,
    constraint: Constraint,
    store: Arc<dyn ConfigStore>,
    enabled: Cell<bool>,
    visible: Cell<bool>,
    notifying: Cell<bool>,
    observed: RefCell<ParamValue>,
    next_listener: Cell<ListenerId>,
    value_listeners: RefCell<Vec<(ListenerId, ValueListener)>>,
    state_listeners: RefCell<Vec<(ListenerId, StateListener)>>,
}

#[derive(Clone)]
pub struct Parameter {
    inner: Rc<ParameterInner>,
}

impl Parameter {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        key: &str,
        default: ParamValue,
        constraint: Constraint,
    ) -> Self {
        let current = store
            .get(key)
            .filter(|value| value.kind() == default.kind())
            .unwrap_or_else(|| default.clone());
        Self {
            inner: Rc::new(ParameterInner {
                key: key.to_string(),
                default,
                constraint,
                store,
                enabled: Cell::new(true),
                visible: Cell::new(true),
                notifying: Cell::new(false),
                observed: RefCell::new(current),
                next_listener: Cell::new(1),
                value_listeners: RefCell::new(Vec::new()),
                state_listeners: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn kind(&self) -> ParamKind {
        self.inner.default.kind()
    }

    pub fn constraint(&self) -> &Constraint {
        &self.inner.constraint
    }

    /// Current value; falls back to the default when the store has no entry
    /// of the right kind.
    pub fn value(&self) -> ParamValue {
        self.inner
            .store
            .get(&self.inner.key)
            .filter(|value| value.kind() == self.kind())
            .unwrap_or_else(|| self.inner.default.clone())
    }

    pub fn is_selected(&self) -> bool {
        self.value().as_bool().unwrap_or(false)
    }

    pub fn text(&self) -> String {
        match self.value() {
            ParamValue::Str(value) | ParamValue::Choice(value) => value,
            other => other.to_string(),
        }
    }

    pub fn int(&self) -> i64 {
        self.value().as_int().unwrap_or_default()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.get()
    }

    pub fn is_visible(&self) -> bool {
        self.inner.visible.get()
    }

    pub fn is_default(&self) -> bool {
        self.value() == self.inner.default
    }

    pub fn validate(&self, value: &ParamValue) -> Result<(), ParameterError> {
        if value.kind() != self.kind() {
            return Err(ParameterError::KindMismatch {
                key: self.inner.key.clone(),
                expected: self.kind(),
                actual: value.kind(),
            });
        }
        match (&self.inner.constraint, value) {
            (Constraint::IntRange { min, max }, ParamValue::Int(v)) if v < min || v > max => {
                Err(ParameterError::OutOfRange {
                    key: self.inner.key.clone(),
                    value: *v,
                    min: *min,
                    max: *max,
                })
            }
            (Constraint::Choices(choices), ParamValue::Choice(v)) if !choices.contains(v) => {
                Err(ParameterError::InvalidChoice {
                    key: self.inner.key.clone(),
                    value: v.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Writes the value through to the store and notifies value listeners.
    /// Returns whether the value changed. Invalid values leave the store
    /// untouched.
    pub fn set_value(&self, value: ParamValue) -> Result<bool, ParameterError> {
        self.validate(&value)?;
        if !self.inner.store.set(&self.inner.key, value) {
            return Ok(false);
        }
        self.notify_value_changed();
        Ok(true)
    }

    pub fn set_bool(&self, value: bool) -> Result<bool, ParameterError> {
        self.set_value(ParamValue::Bool(value))
    }

    pub fn set_text(&self, value: &str) -> Result<bool, ParameterError> {
        match self.kind() {
            ParamKind::Choice => self.set_value(ParamValue::Choice(value.to_string())),
            _ => self.set_value(ParamValue::Str(value.to_string())),
        }
    }

    pub fn set_int(&self, value: i64) -> Result<bool, ParameterError> {
        self.set_value(ParamValue::Int(value))
    }

    pub fn reset_to_default(&self) -> bool {
        if self.inner.store.remove(&self.inner.key).is_none() {
            return false;
        }
        self.refresh()
    }

    /// Re-reads the store and notifies listeners when the value differs from
    /// the one they last observed. Used for changes made outside this
    /// handle.
    pub fn refresh(&self) -> bool {
        if self.value() == *self.inner.observed.borrow() {
            return false;
        }
        self.notify_value_changed();
        true
    }

    pub fn set_enabled(&self, enabled: bool) -> bool {
        if self.inner.enabled.replace(enabled) == enabled {
            return false;
        }
        debug!(key = %self.inner.key, enabled, "Parameter enablement changed");
        self.notify_state_changed(StateChange::Enabled(enabled));
        true
    }

    pub fn set_visible(&self, visible: bool) -> bool {
        if self.inner.visible.replace(visible) == visible {
            return false;
        }
        debug!(key = %self.inner.key, visible, "Parameter visibility changed");
        self.notify_state_changed(StateChange::Visible(visible));
        true
    }

    pub fn add_listener(&self, listener: impl Fn(&Parameter) + 'static) -> ListenerId {
        let id = self.next_listener_id();
        self.inner
            .value_listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));
        id
    }

    pub fn add_state_listener(
        &self,
        listener: impl Fn(&Parameter, StateChange) + 'static,
    ) -> ListenerId {
        let id = self.next_listener_id();
        self.inner
            .state_listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut removed = false;
        self.inner.value_listeners.borrow_mut().retain(|(lid, _)| {
            let keep = *lid != id;
            removed |= !keep;
            keep
        });
        self.inner.state_listeners.borrow_mut().retain(|(lid, _)| {
            let keep = *lid != id;
            removed |= !keep;
            keep
        });
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.inner.value_listeners.borrow().len() + self.inner.state_listeners.borrow().len()
    }

    pub fn same(&self, other: &Parameter) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn next_listener_id(&self) -> ListenerId {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        id
    }

    fn notify_value_changed(&self) {
        *self.inner.observed.borrow_mut() = self.value();
        if self.inner.notifying.get() {
            debug!(key = %self.inner.key, "Suppressed re-entrant change notification");
            return;
        }
        self.inner.notifying.set(true);
        // Snapshot so listeners may add or remove listeners while running.
        let listeners: Vec<ValueListener> = self
            .inner
            .value_listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener(self);
        }
        self.inner.notifying.set(false);
    }

    fn notify_state_changed(&self, change: StateChange) {
        let listeners: Vec<StateListener> = self
            .inner
            .state_listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener(self, change);
        }
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("key", &self.inner.key)
            .field("value", &self.value())
            .field("enabled", &self.is_enabled())
            .field("visible", &self.is_visible())
            .finish()
    }
}

/// The parameters of one section, bound to a store.
pub struct ParameterSet {
    store: Arc<dyn ConfigStore>,
    params: BTreeMap<String, Parameter>,
    order: Vec<String>,
    events: mpsc::Receiver<StoreEvent>,
}

impl ParameterSet {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        let events = store.subscribe();
        Self {
            store,
            params: BTreeMap::new(),
            order: Vec::new(),
            events,
        }
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub fn add(&mut self, key: &str, default: ParamValue, constraint: Constraint) -> Parameter {
        if let Some(existing) = self.params.get(key) {
            return existing.clone();
        }
        let param = Parameter::new(Arc::clone(&self.store), key, default, constraint);
        self.params.insert(key.to_string(), param.clone());
        self.order.push(key.to_string());
        param
    }

    pub fn boolean(&mut self, key: &str, default: bool) -> Parameter {
        self.add(key, ParamValue::Bool(default), Constraint::None)
    }

    pub fn int(&mut self, key: &str, default: i64, min: i64, max: i64) -> Parameter {
        self.add(key, ParamValue::Int(default), Constraint::IntRange { min, max })
    }

    pub fn string(&mut self, key: &str, default: &str) -> Parameter {
        self.add(key, ParamValue::Str(default.to_string()), Constraint::None)
    }

    pub fn choice(&mut self, key: &str, default: &str, choices: &[&str]) -> Parameter {
        self.add(
            key,
            ParamValue::Choice(default.to_string()),
            Constraint::Choices(choices.iter().map(|c| c.to_string()).collect()),
        )
    }

    pub fn get(&self, key: &str) -> Option<&Parameter> {
        self.params.get(key)
    }

    /// Parameters in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.order.iter().filter_map(|key| self.params.get(key))
    }

    /// Applies pending store notifications to the parameters they concern.
    /// Returns how many parameters fired their listeners.
    pub fn poll_store_events(&self) -> usize {
        let mut fired = 0;
        while let Ok(event) = self.events.try_recv() {
            if let Some(param) = self.params.get(event.key())
                && param.refresh()
            {
                fired += 1;
            }
        }
        fired
    }
}
