//! Event triggers gating transition activation.
//!
//! An [`Event`] is the capability a transition polls every step: it can be
//! initialized when its owning state is entered, and it can report whether
//! its triggering condition currently holds. A transition with no event is
//! unconditional.
//!
//! Two built-in implementations are provided:
//!
//! - [`ChangeEvent`]: triggered by changes of named attribute values applied
//!   by the client between steps.
//! - [`TimeEvent`]: triggered while the clock lies inside a deadline window.

mod change;
mod time;

pub use change::{Attributes, ChangeEvent};
pub use time::{Clock, SystemClock, TimeEvent};

use crate::error::EventError;

/// Triggering condition attached to a transition.
///
/// `happened` is a pure, idempotent query: it is evaluated on every step and
/// must neither cause side effects nor depend on the ordering of calls within
/// one step.
pub trait Event: Send {
    /// Prepares the triggering condition.
    ///
    /// Called when the owning transition's source state is entered, e.g. to
    /// compute an absolute deadline from a relative duration. The default
    /// implementation does nothing.
    fn init(&mut self) -> Result<(), EventError> {
        Ok(())
    }

    /// Returns whether the triggering condition currently holds.
    fn happened(&self) -> bool;
}
