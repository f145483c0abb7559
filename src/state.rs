//! States of the machine: simple, pseudostates and composite.
//!
//! The state variants form a closed set, dispatched by pattern matching:
//!
//! - Simple: an irreducible state holding its outgoing transitions and
//!   overridable entry/exit hooks.
//! - Initial: pseudostate marking the beginning of a region; owns exactly one
//!   untriggered transition.
//! - Final: pseudostate stopping further firing within its region.
//! - Terminate: pseudostate stopping further firing machine-wide.
//! - Composite: a state that owns child regions, the recursion point of the
//!   whole tree.
//!
//! When a transition is fired from a state, the `exit` hook of that state is
//! called, followed by the `effect` of the transition and finally the `entry`
//! hook of the reached state.

use std::fmt;

use tracing::{debug, error, warn};

use crate::error::{BuildError, StepError};
use crate::region::{Region, RegionSet, StepContext};
use crate::transition::{AnchoredJoin, Outgoing, TargetSpec};

/// Overridable lifecycle hook (entry, exit, completed).
pub type Hook = Box<dyn Fn() + Send + Sync>;

pub(crate) enum StateKind {
    Simple,
    Initial,
    Final,
    Terminate,
    Composite(RegionSet),
}

impl StateKind {
    fn label(&self) -> &'static str {
        match self {
            StateKind::Simple => "simple",
            StateKind::Initial => "initial",
            StateKind::Final => "final",
            StateKind::Terminate => "terminate",
            StateKind::Composite(_) => "composite",
        }
    }
}

/// A state within a region, identified by a machine-wide unique name.
pub struct State {
    pub(crate) name: String,
    pub(crate) owning_region: Option<String>,
    pub(crate) kind: StateKind,
    pub(crate) outgoings: Vec<Outgoing>,
    pub(crate) joins: Vec<AnchoredJoin>,
    entry: Option<Hook>,
    exit: Option<Hook>,
    completed: Option<Hook>,
}

/// Identifies the transition a state decided to fire this step.
#[derive(Clone, Copy, Debug)]
pub(crate) enum FiredId {
    Outgoing(usize),
    Join(usize),
}

impl State {
    fn with_kind(name: impl Into<String>, kind: StateKind) -> Self {
        State {
            name: name.into(),
            owning_region: None,
            kind,
            outgoings: Vec::new(),
            joins: Vec::new(),
            entry: None,
            exit: None,
            completed: None,
        }
    }

    /// Creates an irreducible state.
    pub fn simple(name: impl Into<String>) -> Self {
        State::with_kind(name, StateKind::Simple)
    }

    /// Creates an initial pseudostate.
    ///
    /// Every region should contain one, except regions only ever entered
    /// through a fork transition.
    pub fn initial(name: impl Into<String>) -> Self {
        State::with_kind(name, StateKind::Initial)
    }

    /// Creates a final pseudostate: reaching it stops further firing within
    /// the owning region.
    pub fn final_state(name: impl Into<String>) -> Self {
        State::with_kind(name, StateKind::Final)
    }

    /// Creates a terminate pseudostate: reaching it stops further firing
    /// machine-wide, once the current step has finished for every region.
    pub fn terminate(name: impl Into<String>) -> Self {
        State::with_kind(name, StateKind::Terminate)
    }

    /// Creates a composite state with no regions yet; add them with
    /// [`add_region`](State::add_region).
    pub fn composite(name: impl Into<String>) -> Self {
        State::with_kind(name, StateKind::Composite(RegionSet::default()))
    }

    /// Creates a composite state from an already built set of regions, e.g.
    /// the regions moved out of a machine with
    /// [`Machine::into_regions`](crate::Machine::into_regions). This is the
    /// submachine mechanism: a whole statechart reused as one macro-state.
    pub fn composite_from(name: impl Into<String>, regions: RegionSet) -> Self {
        State::with_kind(name, StateKind::Composite(regions))
    }

    /// Adds a child region to a composite state.
    pub fn add_region(&mut self, region_name: &str) -> Result<(), BuildError> {
        match &mut self.kind {
            StateKind::Composite(regions) => regions.new_region(region_name),
            _ => Err(BuildError::NotComposite(self.name.clone())),
        }
    }

    /// Hook called when the state is reached.
    #[must_use]
    pub fn on_entry(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.entry = Some(Box::new(hook));
        self
    }

    /// Hook called when the state is left.
    #[must_use]
    pub fn on_exit(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.exit = Some(Box::new(hook));
        self
    }

    /// Hook called, for a composite state, while all of its regions sit in a
    /// final state; evaluated once per step after the region pass.
    #[must_use]
    pub fn on_completed(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.completed = Some(Box::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the region the state was added to, once added.
    pub fn owning_region(&self) -> Option<&str> {
        self.owning_region.as_deref()
    }

    pub fn is_initial(&self) -> bool {
        matches!(self.kind, StateKind::Initial)
    }

    pub fn is_final(&self) -> bool {
        matches!(self.kind, StateKind::Final)
    }

    pub fn is_terminate(&self) -> bool {
        matches!(self.kind, StateKind::Terminate)
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.kind, StateKind::Composite(_))
    }

    /// Attaches an outgoing transition, enforcing the per-kind rules: an
    /// initial pseudostate owns exactly one untriggered transition; final and
    /// terminate pseudostates own none.
    pub(crate) fn add_outgoing(&mut self, outgoing: Outgoing) -> Result<(), BuildError> {
        match self.kind {
            StateKind::Final => {
                return Err(BuildError::TransitionFromFinal {
                    state: self.name.clone(),
                    transition: outgoing.name,
                })
            }
            StateKind::Terminate => {
                return Err(BuildError::TransitionFromTerminate {
                    state: self.name.clone(),
                    transition: outgoing.name,
                })
            }
            StateKind::Initial => {
                if !self.outgoings.is_empty() {
                    return Err(BuildError::InitialHasTransition {
                        state: self.name.clone(),
                        transition: outgoing.name,
                    });
                }
                if outgoing.is_triggered() {
                    return Err(BuildError::InitialTriggered {
                        state: self.name.clone(),
                        transition: outgoing.name,
                    });
                }
            }
            StateKind::Simple | StateKind::Composite(_) => {}
        }
        self.outgoings.push(outgoing);
        Ok(())
    }

    pub(crate) fn add_join(&mut self, join: AnchoredJoin) {
        self.joins.push(join);
    }

    /// Called when the state is reached: initializes the triggers of its
    /// owned transitions, calls the `entry` hook and, for a composite state,
    /// initializes every child region in declaration order, failing fast.
    pub(crate) fn init(&mut self) -> Result<(), StepError> {
        if matches!(self.kind, StateKind::Final | StateKind::Terminate) {
            return Ok(());
        }
        self.init_edges()?;
        self.run_entry();
        if let StateKind::Composite(regions) = &mut self.kind {
            regions.init()?;
        }
        Ok(())
    }

    fn init_edges(&mut self) -> Result<(), StepError> {
        for outgoing in &mut self.outgoings {
            outgoing.init()?;
        }
        for join in &mut self.joins {
            join.init()?;
        }
        Ok(())
    }

    fn run_entry(&self) {
        debug!(state = %self.name, "entry");
        if let Some(entry) = &self.entry {
            entry();
        }
    }

    /// Called when the state is left: runs the `exit` hook and, for a
    /// composite state, finalizes every child region.
    pub(crate) fn finalize(&mut self) -> Result<(), StepError> {
        if matches!(self.kind, StateKind::Final | StateKind::Terminate) {
            return Ok(());
        }
        self.run_exit();
        if let StateKind::Composite(regions) = &mut self.kind {
            for region in &mut regions.regions {
                region.finalize()?;
            }
        }
        Ok(())
    }

    fn run_exit(&self) {
        debug!(state = %self.name, "exit");
        if let Some(exit) = &self.exit {
            exit();
        }
    }

    /// Runs one sub-step inside this state. Only composite states do work
    /// here: their child regions each get a fresh step context, and the fold
    /// of those contexts decides whether the enclosing region may still fire
    /// an outer transition this step.
    pub(crate) fn run(&mut self, ctx: &mut StepContext) -> Result<(), StepError> {
        if let StateKind::Composite(regions) = &mut self.kind {
            regions.run(ctx)?;
            if self.is_completed() {
                debug!(state = %self.name, "completed");
                if let Some(completed) = &self.completed {
                    completed();
                }
            }
        }
        Ok(())
    }

    /// Returns, for a composite state, whether every child region's active
    /// state is a final pseudostate.
    pub(crate) fn is_completed(&self) -> bool {
        let StateKind::Composite(regions) = &self.kind else {
            return false;
        };
        regions.regions.iter().all(|region| match region.active_state() {
            Some(active) => active.is_final(),
            None => {
                warn!(
                    state = %self.name,
                    region = %region.name,
                    "region doesn't have any active state"
                );
                false
            }
        })
    }

    /// Scans owned transitions in insertion order and returns the first
    /// activated one; joins are considered after plain and fork transitions
    /// and additionally require every incoming leg's state to be the active
    /// state of its owning region.
    ///
    /// More than one simultaneously activated candidate is a modeling error;
    /// it is resolved first-declared-wins and reported as a warning.
    pub(crate) fn fire_transition(&self) -> Option<FiredId> {
        let mut fired: Option<FiredId> = None;
        for (index, outgoing) in self.outgoings.iter().enumerate() {
            if outgoing.is_activated() {
                match fired {
                    None => fired = Some(FiredId::Outgoing(index)),
                    Some(first) => self.warn_ambiguous(first, &outgoing.name),
                }
            }
        }
        for (index, join) in self.joins.iter().enumerate() {
            if join.is_activated() && self.join_ready(join) {
                match fired {
                    None => fired = Some(FiredId::Join(index)),
                    Some(first) => self.warn_ambiguous(first, &join.name),
                }
            }
        }
        fired
    }

    fn warn_ambiguous(&self, first: FiredId, also: &str) {
        warn!(
            state = %self.name,
            fired = %self.edge_name(first),
            also_activated = %also,
            "state has more than one activated transition; firing the first declared"
        );
    }

    /// Residency check: every incoming leg of the join names the current
    /// active state of its owning region inside this composite state.
    fn join_ready(&self, join: &AnchoredJoin) -> bool {
        let StateKind::Composite(regions) = &self.kind else {
            warn!(
                state = %self.name,
                transition = %join.name,
                "join anchored on a non-composite state can never fire"
            );
            return false;
        };
        join.legs.iter().all(|leg| {
            regions
                .find_owning_region(&leg.source)
                .is_some_and(|region| region.active_state_name() == Some(leg.source.as_str()))
        })
    }

    pub(crate) fn edge_name(&self, id: FiredId) -> &str {
        match id {
            FiredId::Outgoing(index) => &self.outgoings[index].name,
            FiredId::Join(index) => &self.joins[index].name,
        }
    }

    pub(crate) fn edge_targets(&self, id: FiredId) -> TargetSpec {
        match id {
            FiredId::Outgoing(index) => self.outgoings[index].targets(),
            FiredId::Join(index) => TargetSpec::Single(self.joins[index].target.clone()),
        }
    }

    pub(crate) fn run_edge_effect(&self, id: FiredId) {
        match id {
            FiredId::Outgoing(index) => self.outgoings[index].run_effect(),
            FiredId::Join(index) => self.joins[index].run_effect(),
        }
    }

    /// Activates, inside a composite state reached by a fork, the active
    /// state of every child region from the fork's leg names. Returns whether
    /// all regions could be initialized from the name set.
    pub(crate) fn init_fork(&mut self, names: &[String]) -> bool {
        let StateKind::Composite(regions) = &mut self.kind else {
            return false;
        };
        let mut all = true;
        for region in &mut regions.regions {
            all = region.init_fork(names) && all;
        }
        all
    }

    /// Build-time balance check for fork/join legs, see `Machine::add_fork`.
    ///
    /// A simple state satisfies the check when its own name is in the set;
    /// initial, final and terminate pseudostates never do. A composite state
    /// is balanced when each of its regions contains exactly one participant
    /// (possibly through further nesting); naming both the composite itself
    /// and states inside its regions is rejected as contradictory.
    pub(crate) fn check_fork_or_join(&self, names: &[String], is_caller: bool) -> bool {
        match &self.kind {
            StateKind::Simple => names.iter().any(|n| n == &self.name),
            StateKind::Initial | StateKind::Final | StateKind::Terminate => false,
            StateKind::Composite(regions) => {
                let mut balanced = true;
                for region in &regions.regions {
                    balanced = region.check_fork_or_join(names) && balanced;
                    if !balanced && is_caller {
                        error!(
                            state = %self.name,
                            region = %region.name,
                            "bad fork or join compound: missing incoming/outgoing leg inside region"
                        );
                        return false;
                    }
                }
                let named_itself = names.iter().any(|n| n == &self.name);
                if named_itself {
                    if balanced {
                        error!(
                            state = %self.name,
                            "bad fork or join compound: legs name both the state and its regions' contents"
                        );
                        return false;
                    }
                    return true;
                }
                balanced
            }
        }
    }

    pub(crate) fn find_region(&self, region_name: &str) -> Option<&Region> {
        match &self.kind {
            StateKind::Composite(regions) => regions.find_region(region_name),
            _ => None,
        }
    }

    pub(crate) fn find_region_mut(&mut self, region_name: &str) -> Option<&mut Region> {
        match &mut self.kind {
            StateKind::Composite(regions) => regions.find_region_mut(region_name),
            _ => None,
        }
    }

    pub(crate) fn find_state(&self, state_name: &str) -> Option<&State> {
        match &self.kind {
            StateKind::Composite(regions) => regions.find_state(state_name),
            _ => None,
        }
    }

    pub(crate) fn find_state_mut(&mut self, state_name: &str) -> Option<&mut State> {
        match &mut self.kind {
            StateKind::Composite(regions) => regions.find_state_mut(state_name),
            _ => None,
        }
    }

    /// Collects this state's name and, recursively, every state name nested
    /// inside it. Used for machine-wide uniqueness validation.
    pub(crate) fn collect_state_names(&self, out: &mut Vec<String>) {
        out.push(self.name.clone());
        if let StateKind::Composite(regions) = &self.kind {
            regions.collect_state_names(out);
        }
    }

    pub(crate) fn regions(&self) -> Option<&RegionSet> {
        match &self.kind {
            StateKind::Composite(regions) => Some(regions),
            _ => None,
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("name", &self.name)
            .field("kind", &self.kind.label())
            .field("owning_region", &self.owning_region)
            .field("outgoings", &self.outgoings.len())
            .field("joins", &self.joins.len())
            .finish()
    }
}
