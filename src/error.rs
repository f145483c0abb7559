//! Error types for machine construction and stepping.
//!
//! Structural misuse at tree-assembly time is a [`BuildError`], reported by
//! the `Machine` add-method that caused it and aborting only that operation.
//! Structural failures discovered while stepping are [`StepError`]s; they
//! abort the current `run` call and leave the tree in its last consistent
//! state. Triggering ambiguity (more than one transition activated on the
//! same state in the same step) is deliberately not an error: it is resolved
//! first-declared-wins and surfaced as a `tracing` warning.

use thiserror::Error;

/// Errors raised by event triggers.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("attribute \"{0}\" is not registered")]
    UnknownAttribute(String),

    #[error("event initialization failed: {0}")]
    Init(String),
}

/// Structural misuse caught while assembling the state tree.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("region \"{0}\" not found")]
    RegionNotFound(String),

    #[error("a region named \"{0}\" already exists at this level")]
    DuplicateRegion(String),

    #[error("a state named \"{0}\" already exists in the machine")]
    DuplicateState(String),

    #[error("region \"{region}\" already has the initial state \"{existing}\"; \"{state}\" can't be added")]
    DuplicateInitial {
        region: String,
        existing: String,
        state: String,
    },

    #[error("state \"{0}\" is not a composite state")]
    NotComposite(String),

    #[error("transition \"{transition}\" starting state \"{state}\" not found")]
    SourceNotFound { transition: String, state: String },

    #[error("transition \"{transition}\" reachable state \"{state}\" not found")]
    TargetNotFound { transition: String, state: String },

    #[error("transition \"{transition}\" anchor state \"{state}\" not found")]
    AnchorNotFound { transition: String, state: String },

    #[error("initial state \"{state}\" already has one transition; \"{transition}\" can't be added")]
    InitialHasTransition { state: String, transition: String },

    #[error("initial state \"{state}\" can't own the triggered transition \"{transition}\"")]
    InitialTriggered { state: String, transition: String },

    #[error("final state \"{state}\" can't have the transition \"{transition}\" starting from it")]
    TransitionFromFinal { state: String, transition: String },

    #[error("terminate state \"{state}\" can't have the transition \"{transition}\" starting from it")]
    TransitionFromTerminate { state: String, transition: String },

    #[error("fork \"{0}\" must have at least two outgoings")]
    ForkTooFewOutgoings(String),

    #[error("join \"{0}\" must have at least two incomings")]
    JoinTooFewIncomings(String),

    #[error("fork \"{transition}\" outgoing legs don't cover the regions under \"{anchor}\" exactly")]
    UnbalancedFork { transition: String, anchor: String },

    #[error("join \"{transition}\" incoming legs don't cover the regions under \"{anchor}\" exactly")]
    UnbalancedJoin { transition: String, anchor: String },
}

/// Run-time structural failures; abort the current `run` call.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("region \"{0}\" doesn't have an initial pseudostate")]
    MissingInitial(String),

    #[error("region \"{0}\" doesn't have an active state")]
    NoActiveState(String),

    #[error("initial state \"{state}\" in region \"{region}\" doesn't have any transition")]
    InitialWithoutTransition { region: String, state: String },

    #[error("in region \"{region}\" the state \"{target}\" reached by transition \"{transition}\" can't be retrieved")]
    TargetNotFound {
        region: String,
        transition: String,
        target: String,
    },

    #[error("in region \"{region}\" no state claims the outgoing legs of fork \"{transition}\"")]
    ForkUnresolved { region: String, transition: String },

    #[error("trigger of transition \"{transition}\" failed to initialize")]
    Trigger {
        transition: String,
        #[source]
        source: EventError,
    },
}
