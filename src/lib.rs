//! Statechart: hierarchical, concurrent state machines.
//!
//! A [`Machine`] is made of orthogonal regions; each region holds states and
//! tracks one active state. States can be irreducible ([`State::simple`]),
//! pseudostates (initial, final, terminate) or composite states owning child
//! regions, which is how machines nest to any depth. [`Transition`]s connect
//! states one-to-one; [`Fork`] and [`Join`] compounds split into and merge
//! out of the orthogonal regions of a composite state.
//!
//! The machine advances in synchronized run-to-completion steps: every call
//! to [`Machine::run`] steps each region once, innermost flows first, firing
//! at most one transition per region per step. Transitions fire when their
//! trigger is activated: a [`ChangeEvent`] watches a predicate over shared
//! attributes, a [`TimeEvent`] watches a deadline window.
//!
//! # Core Concepts
//!
//! - **Region**: an independent sequential flow with one active state
//! - **Composite state**: a state owning child regions, the nesting point
//! - **Step**: one `run` call; regions are stepped in declaration order
//! - **Trigger**: an [`Event`] gating a transition; untriggered transitions
//!   are always activated
//!
//! # Example
//!
//! ```rust
//! use statechart::{ChangeEvent, Machine, State, Transition};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut machine = Machine::new("lamp machine");
//! machine.new_region("Lamp")?;
//! machine.add_state("Lamp", State::initial("Initial"))?;
//! machine.add_state("Lamp", State::simple("Lamp OFF"))?;
//! machine.add_state("Lamp", State::simple("Lamp ON"))?;
//!
//! let switch_on = ChangeEvent::<bool>::new(|attrs| attrs.value("switch ON"));
//! switch_on.add("switch ON", false);
//! let switch_off = ChangeEvent::<bool>::new(|attrs| attrs.value("switch OFF"));
//! switch_off.add("switch OFF", false);
//!
//! machine.add_transition(Transition::new("t0", "Initial", "Lamp OFF"))?;
//! machine.add_transition(
//!     Transition::new("t1", "Lamp OFF", "Lamp ON").with_trigger(switch_on.clone()),
//! )?;
//! machine.add_transition(
//!     Transition::new("t2", "Lamp ON", "Lamp OFF").with_trigger(switch_off.clone()),
//! )?;
//!
//! machine.run()?; // first run initializes, no transition fires
//! assert_eq!(machine.active_state("Lamp"), "Lamp OFF");
//!
//! switch_on.switching("switch ON", true)?;
//! machine.run()?;
//! assert_eq!(machine.active_state("Lamp"), "Lamp ON");
//!
//! switch_on.switching("switch ON", false)?;
//! switch_off.switching("switch OFF", true)?;
//! machine.run()?;
//! assert_eq!(machine.active_state("Lamp"), "Lamp OFF");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod event;
pub mod machine;
pub mod region;
pub mod state;
pub mod transition;

pub use error::{BuildError, EventError, StepError};
pub use event::{Attributes, ChangeEvent, Clock, Event, SystemClock, TimeEvent};
pub use machine::{Machine, MachineSnapshot, RegionSnapshot};
pub use region::{Region, RegionSet};
pub use state::{Hook, State};
pub use transition::{Effect, Fork, ForkOutgoing, Join, JoinIncoming, Transition};
