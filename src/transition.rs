//! Transitions between states: plain, fork and join.
//!
//! A plain [`Transition`] has exactly one starting state and one reachable
//! state. A [`Fork`] splits one flow into one leg per orthogonal region of
//! the destination composite state; a [`Join`] merges one leg per orthogonal
//! region of the source composite state back into one flow. Each carries an
//! optional [`Event`] trigger and optional side-effect hooks.
//!
//! These are build types: the `Machine` add-methods consume them, validate
//! them and attach them to their source state.

use tracing::debug;

use crate::error::StepError;
use crate::event::Event;

/// Side-effect hook executed exactly once when a transition fires, after the
/// source state's exit and before the target state's entry.
pub type Effect = Box<dyn Fn() + Send + Sync>;

/// A transition between two states.
///
/// If no trigger is set the transition is always activated. A transition
/// starting from an initial pseudostate must not be triggered.
pub struct Transition {
    pub(crate) name: String,
    pub(crate) source: String,
    pub(crate) target: String,
    pub(crate) trigger: Option<Box<dyn Event>>,
    pub(crate) effect: Option<Effect>,
}

impl Transition {
    /// Creates a transition from the state named `source` to the state named
    /// `target`. The transition name is used in diagnostics.
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Transition {
            name: name.into(),
            source: source.into(),
            target: target.into(),
            trigger: None,
            effect: None,
        }
    }

    /// Sets the transition trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: impl Event + 'static) -> Self {
        self.trigger = Some(Box::new(trigger));
        self
    }

    /// Sets the side effect executed when the transition fires.
    #[must_use]
    pub fn with_effect(mut self, effect: impl Fn() + Send + Sync + 'static) -> Self {
        self.effect = Some(Box::new(effect));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns whether a trigger has been set.
    pub fn is_triggered(&self) -> bool {
        self.trigger.is_some()
    }
}

/// One outgoing leg of a [`Fork`], naming the reachable state in one
/// orthogonal region of the destination composite state.
pub struct ForkOutgoing {
    pub(crate) target: String,
    pub(crate) effect: Option<Effect>,
}

impl ForkOutgoing {
    pub fn new(target: impl Into<String>) -> Self {
        ForkOutgoing {
            target: target.into(),
            effect: None,
        }
    }

    /// Side effect executed when the fork fires.
    #[must_use]
    pub fn with_effect(mut self, effect: impl Fn() + Send + Sync + 'static) -> Self {
        self.effect = Some(Box::new(effect));
        self
    }
}

/// A compound transition from one state into the orthogonal regions of a
/// composite state.
///
/// Every region under the destination anchor must contain exactly one of the
/// legs' named states; the balance is checked when the fork is registered.
pub struct Fork {
    pub(crate) name: String,
    pub(crate) source: String,
    pub(crate) trigger: Option<Box<dyn Event>>,
    pub(crate) outgoings: Vec<ForkOutgoing>,
}

impl Fork {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Fork {
            name: name.into(),
            source: source.into(),
            trigger: None,
            outgoings: Vec::new(),
        }
    }

    /// Adds an outgoing leg. A fork needs at least two.
    #[must_use]
    pub fn outgoing(mut self, leg: ForkOutgoing) -> Self {
        self.outgoings.push(leg);
        self
    }

    #[must_use]
    pub fn with_trigger(mut self, trigger: impl Event + 'static) -> Self {
        self.trigger = Some(Box::new(trigger));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One incoming leg of a [`Join`], naming the starting state in one
/// orthogonal region of the source composite state.
pub struct JoinIncoming {
    pub(crate) source: String,
    pub(crate) effect: Option<Effect>,
}

impl JoinIncoming {
    pub fn new(source: impl Into<String>) -> Self {
        JoinIncoming {
            source: source.into(),
            effect: None,
        }
    }

    /// Side effect executed when the join fires.
    #[must_use]
    pub fn with_effect(mut self, effect: impl Fn() + Send + Sync + 'static) -> Self {
        self.effect = Some(Box::new(effect));
        self
    }
}

/// A compound transition merging the orthogonal regions of a composite state
/// into one reachable state.
///
/// A join fires only when its trigger is activated and every incoming leg's
/// named state is simultaneously the active state of its owning region.
pub struct Join {
    pub(crate) name: String,
    pub(crate) target: String,
    pub(crate) trigger: Option<Box<dyn Event>>,
    pub(crate) incomings: Vec<JoinIncoming>,
}

impl Join {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Join {
            name: name.into(),
            target: target.into(),
            trigger: None,
            incomings: Vec::new(),
        }
    }

    /// Adds an incoming leg. A join needs at least two.
    #[must_use]
    pub fn incoming(mut self, leg: JoinIncoming) -> Self {
        self.incomings.push(leg);
        self
    }

    #[must_use]
    pub fn with_trigger(mut self, trigger: impl Event + 'static) -> Self {
        self.trigger = Some(Box::new(trigger));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Resolved target of a fired transition.
#[derive(Clone, Debug)]
pub(crate) enum TargetSpec {
    Single(String),
    Fork(Vec<String>),
}

/// A transition as owned by its source state: either a plain edge or a fork.
pub(crate) struct Outgoing {
    pub(crate) name: String,
    pub(crate) trigger: Option<Box<dyn Event>>,
    pub(crate) kind: OutgoingKind,
}

pub(crate) enum OutgoingKind {
    Single {
        target: String,
        effect: Option<Effect>,
    },
    Fork {
        legs: Vec<ForkOutgoing>,
    },
}

impl Outgoing {
    pub(crate) fn init(&mut self) -> Result<(), StepError> {
        init_trigger(&self.name, self.trigger.as_deref_mut())
    }

    pub(crate) fn is_activated(&self) -> bool {
        self.trigger.as_ref().is_none_or(|t| t.happened())
    }

    pub(crate) fn is_triggered(&self) -> bool {
        self.trigger.is_some()
    }

    pub(crate) fn targets(&self) -> TargetSpec {
        match &self.kind {
            OutgoingKind::Single { target, .. } => TargetSpec::Single(target.clone()),
            OutgoingKind::Fork { legs } => {
                TargetSpec::Fork(legs.iter().map(|leg| leg.target.clone()).collect())
            }
        }
    }

    pub(crate) fn run_effect(&self) {
        debug!(transition = %self.name, "effect");
        match &self.kind {
            OutgoingKind::Single { effect, .. } => {
                if let Some(effect) = effect {
                    effect();
                }
            }
            OutgoingKind::Fork { legs } => {
                for leg in legs {
                    if let Some(effect) = &leg.effect {
                        effect();
                    }
                }
            }
        }
    }
}

impl From<Transition> for Outgoing {
    fn from(transition: Transition) -> Self {
        Outgoing {
            name: transition.name,
            trigger: transition.trigger,
            kind: OutgoingKind::Single {
                target: transition.target,
                effect: transition.effect,
            },
        }
    }
}

impl From<Fork> for Outgoing {
    fn from(fork: Fork) -> Self {
        Outgoing {
            name: fork.name,
            trigger: fork.trigger,
            kind: OutgoingKind::Fork {
                legs: fork.outgoings,
            },
        }
    }
}

/// A join as owned by its anchor state, the outermost starting state whose
/// regions hold the incoming legs.
pub(crate) struct AnchoredJoin {
    pub(crate) name: String,
    pub(crate) target: String,
    pub(crate) trigger: Option<Box<dyn Event>>,
    pub(crate) legs: Vec<JoinIncoming>,
}

impl AnchoredJoin {
    pub(crate) fn init(&mut self) -> Result<(), StepError> {
        init_trigger(&self.name, self.trigger.as_deref_mut())
    }

    pub(crate) fn is_activated(&self) -> bool {
        self.trigger.as_ref().is_none_or(|t| t.happened())
    }

    pub(crate) fn run_effect(&self) {
        debug!(transition = %self.name, "join effect");
        for leg in &self.legs {
            if let Some(effect) = &leg.effect {
                effect();
            }
        }
    }
}

impl From<Join> for AnchoredJoin {
    fn from(join: Join) -> Self {
        AnchoredJoin {
            name: join.name,
            target: join.target,
            trigger: join.trigger,
            legs: join.incomings,
        }
    }
}

fn init_trigger(name: &str, trigger: Option<&mut (dyn Event + 'static)>) -> Result<(), StepError> {
    match trigger {
        Some(trigger) => trigger.init().map_err(|source| StepError::Trigger {
            transition: name.to_string(),
            source,
        }),
        None => Ok(()),
    }
}
