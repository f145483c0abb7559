//! Time-triggered events.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::EventError;
use crate::event::Event;

/// Clock capability used to compute and test deadline windows.
///
/// The engine only needs "now" and total ordering on calendar time; both are
/// delegated to chrono. Implement this trait to drive [`TimeEvent`]s from a
/// simulated clock in tests.
pub trait Clock: Send + Sync {
    /// Returns the current calendar time.
    fn now(&self) -> DateTime<Utc>;
}

/// The default wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Copy, Debug)]
enum Mode {
    /// Deadline computed relative to the clock time at `init`.
    After(Duration),
    /// Fixed absolute deadline.
    At(DateTime<Utc>),
}

/// Event triggered while "now" lies inside a deadline window.
///
/// The event `happened` while `now` is in `[deadline, deadline + tolerance]`;
/// before or after that window it did not. The caller must poll `run` often
/// enough relative to the tolerance, or a transition with a strict deadline
/// is silently missed. The window is re-evaluated on every query and is never
/// latched.
pub struct TimeEvent {
    mode: Mode,
    deadline: Option<DateTime<Utc>>,
    tolerance: Duration,
    clock: Arc<dyn Clock>,
}

impl TimeEvent {
    /// Event happening `duration` after the owning state is entered, valid
    /// within the `tolerance` margin past the deadline.
    pub fn after(duration: Duration, tolerance: Duration) -> Self {
        TimeEvent {
            mode: Mode::After(duration),
            deadline: None,
            tolerance,
            clock: Arc::new(SystemClock),
        }
    }

    /// Event happening at the absolute time `when`, valid within the
    /// `tolerance` margin past the deadline.
    pub fn at(when: DateTime<Utc>, tolerance: Duration) -> Self {
        TimeEvent {
            mode: Mode::At(when),
            deadline: None,
            tolerance,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the wall clock, e.g. with a simulated clock in tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Event for TimeEvent {
    fn init(&mut self) -> Result<(), EventError> {
        self.deadline = Some(match self.mode {
            Mode::After(duration) => self.clock.now() + duration,
            Mode::At(when) => when,
        });
        Ok(())
    }

    fn happened(&self) -> bool {
        let Some(deadline) = self.deadline else {
            return false;
        };
        let now = self.clock.now();
        let inside = deadline <= now && now <= deadline + self.tolerance;
        if inside {
            debug!(%now, %deadline, "time event happened");
        }
        inside
    }
}
