//! Attribute-change events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::error::EventError;
use crate::event::Event;

type Predicate<T> = Arc<dyn Fn(&Attributes<T>) -> bool + Send + Sync>;

/// Event triggered by changes of named attribute values.
///
/// Attributes are registered at build time with [`add`](ChangeEvent::add) and
/// switched by the client between steps with
/// [`switching`](ChangeEvent::switching). The predicate passed to
/// [`new`](ChangeEvent::new) reads them through [`Attributes::value`] and
/// decides whether the event happened.
///
/// A `ChangeEvent` is a cloneable shared handle: clone it before attaching it
/// to a transition and keep the original to apply stimuli while the machine
/// owns its copy.
///
/// # Example
///
/// ```rust
/// use statechart::ChangeEvent;
///
/// let switch_on = ChangeEvent::<bool>::new(|attrs| attrs.value("on"));
/// switch_on.add("on", false);
///
/// // The clone given to a transition observes later switching calls.
/// let trigger = switch_on.clone();
/// switch_on.switching("on", true).unwrap();
/// ```
pub struct ChangeEvent<T = bool> {
    attributes: Arc<Mutex<HashMap<String, T>>>,
    predicate: Predicate<T>,
}

/// Read-only view of a change event's attributes, passed to the predicate.
pub struct Attributes<'a, T> {
    map: &'a HashMap<String, T>,
}

impl<T> Attributes<'_, T> {
    /// Returns the value of the named attribute.
    ///
    /// An unregistered name is reported as a warning and yields the type's
    /// default value, so a predicate stays a total function.
    pub fn value(&self, name: &str) -> T
    where
        T: Clone + Default,
    {
        match self.map.get(name) {
            Some(value) => value.clone(),
            None => {
                warn!(attribute = name, "attribute is not registered");
                T::default()
            }
        }
    }

    /// Returns the value of the named attribute, or `None` if unregistered.
    pub fn get(&self, name: &str) -> Option<&T> {
        self.map.get(name)
    }
}

impl<T> ChangeEvent<T> {
    /// Creates a change event whose triggering condition is the given
    /// predicate over the registered attributes.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Attributes<T>) -> bool + Send + Sync + 'static,
    {
        ChangeEvent {
            attributes: Arc::new(Mutex::new(HashMap::new())),
            predicate: Arc::new(predicate),
        }
    }

    /// Registers an attribute and its initial value. Build-time only.
    pub fn add(&self, name: &str, initial_value: T) {
        self.lock().insert(name.to_string(), initial_value);
    }

    /// Switches the value of a registered attribute.
    ///
    /// This is the external stimulus applied by the client strictly between
    /// `run` calls. Switching an unregistered name is an error.
    pub fn switching(&self, name: &str, value: T) -> Result<(), EventError> {
        match self.lock().get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(EventError::UnknownAttribute(name.to_string())),
        }
    }

    /// Returns the current value of a registered attribute.
    pub fn value(&self, name: &str) -> Option<T>
    where
        T: Clone,
    {
        self.lock().get(name).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, T>> {
        self.attributes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Clone for ChangeEvent<T> {
    fn clone(&self) -> Self {
        ChangeEvent {
            attributes: Arc::clone(&self.attributes),
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<T: Send> Event for ChangeEvent<T> {
    fn happened(&self) -> bool {
        let guard = self.lock();
        (self.predicate)(&Attributes { map: &guard })
    }
}
