//! Regions: independent sequential flows of control.
//!
//! A region holds an ordered set of states and tracks the single currently
//! active state within it; insertion order is transition firing precedence
//! order. Sibling regions, in the machine or in a composite state, are
//! orthogonal: conceptually concurrent, stepped in declaration order, each
//! firing at most one transition per step.

use std::fmt;

use tracing::debug;

use crate::error::{BuildError, StepError};
use crate::state::State;
use crate::transition::TargetSpec;

/// Per-step fold state threaded through one `run` pass.
///
/// Every `Region::run` call receives a fresh context. A parent folds its
/// children's contexts by OR-ing `terminated` and by clearing its own
/// `firing_allowed` when a child fired or had already disallowed firing:
/// a region nested inside a state that fired this step must not also fire.
/// The fold is never propagated back down into sibling regions.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StepContext {
    pub(crate) fired: bool,
    pub(crate) firing_allowed: bool,
    pub(crate) terminated: bool,
}

impl Default for StepContext {
    fn default() -> Self {
        StepContext {
            fired: false,
            firing_allowed: true,
            terminated: false,
        }
    }
}

/// An independent sequential flow holding states and one active state.
pub struct Region {
    pub(crate) name: String,
    pub(crate) states: Vec<State>,
    initial: Option<usize>,
    active: Option<usize>,
}

impl Region {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Region {
            name: name.into(),
            states: Vec::new(),
            initial: None,
            active: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a state, recording it as the region's initial pseudostate if it
    /// is one. A region has at most one initial pseudostate.
    pub(crate) fn add_state(&mut self, mut state: State) -> Result<(), BuildError> {
        if state.is_initial() {
            if let Some(existing) = self.initial {
                return Err(BuildError::DuplicateInitial {
                    region: self.name.clone(),
                    existing: self.states[existing].name.clone(),
                    state: state.name,
                });
            }
            self.initial = Some(self.states.len());
        }
        state.owning_region = Some(self.name.clone());
        self.states.push(state);
        Ok(())
    }

    pub(crate) fn active_state(&self) -> Option<&State> {
        self.active.map(|index| &self.states[index])
    }

    pub(crate) fn active_state_name(&self) -> Option<&str> {
        self.active_state().map(State::name)
    }

    /// Index of the named state within this region only.
    fn index_of(&self, state_name: &str) -> Option<usize> {
        self.states.iter().position(|state| state.name == state_name)
    }

    /// Activates the region.
    ///
    /// If the region was never activated, its initial pseudostate's sole
    /// transition is fired immediately: effect, then target resolution
    /// (direct lookup, or fork-claim resolution for a multi-target
    /// transition), then target init. If an active state is already set --
    /// re-entry without finalization, as for submachine reattachment or fork
    /// participants -- that state is just re-initialized.
    pub(crate) fn init(&mut self) -> Result<(), StepError> {
        if let Some(index) = self.active {
            return self.states[index].init();
        }
        let initial = self
            .initial
            .ok_or_else(|| StepError::MissingInitial(self.name.clone()))?;
        self.active = Some(initial);

        let Some(first) = self.states[initial].outgoings.first() else {
            return Err(StepError::InitialWithoutTransition {
                region: self.name.clone(),
                state: self.states[initial].name.clone(),
            });
        };
        let transition_name = first.name.clone();
        let targets = first.targets();
        self.states[initial].outgoings[0].run_effect();

        let next = self.resolve_target(&transition_name, targets)?;
        self.active = Some(next);
        self.states[next].init()
    }

    /// Resolves the target of a fired transition to a state index in this
    /// region: by direct name lookup for a single target, or by finding the
    /// state that claims all of a fork's legs.
    fn resolve_target(
        &mut self,
        transition_name: &str,
        targets: TargetSpec,
    ) -> Result<usize, StepError> {
        match targets {
            TargetSpec::Single(target) => {
                self.index_of(&target)
                    .ok_or_else(|| StepError::TargetNotFound {
                        region: self.name.clone(),
                        transition: transition_name.to_string(),
                        target,
                    })
            }
            TargetSpec::Fork(names) => {
                self.claim_fork(&names)
                    .ok_or_else(|| StepError::ForkUnresolved {
                        region: self.name.clone(),
                        transition: transition_name.to_string(),
                    })
            }
        }
    }

    /// Finds, across this region's states, which one claims the fork: a
    /// composite whose regions are all covered by the leg names, or a state
    /// directly matching a leg name.
    fn claim_fork(&mut self, names: &[String]) -> Option<usize> {
        for index in 0..self.states.len() {
            if self.states[index].init_fork(names) {
                return Some(index);
            }
            if names.iter().any(|n| n == &self.states[index].name) {
                return Some(index);
            }
        }
        None
    }

    /// Activates this region as a fork participant: the active state is set
    /// from the leg names without going through a local initial pseudostate.
    /// The activated state is initialized later, by the composite's own init.
    pub(crate) fn init_fork(&mut self, names: &[String]) -> bool {
        match self.claim_fork(names) {
            Some(index) => {
                self.active = Some(index);
                debug!(region = %self.name, state = %self.states[index].name, "fork leg activated");
                true
            }
            None => false,
        }
    }

    /// Finalizes the active state and deactivates the region.
    pub(crate) fn finalize(&mut self) -> Result<(), StepError> {
        if let Some(index) = self.active.take() {
            self.states[index].finalize()?;
        }
        Ok(())
    }

    /// Performs one step for this region: first recursively run the active
    /// state (descending into composite states), then, if this path may
    /// still fire and the machine is not terminating, fire at most one
    /// activated transition of the active state.
    pub(crate) fn run(&mut self, ctx: &mut StepContext) -> Result<(), StepError> {
        let Some(index) = self.active else {
            return Err(StepError::NoActiveState(self.name.clone()));
        };
        self.states[index].run(ctx)?;

        if !ctx.firing_allowed || ctx.terminated {
            return Ok(());
        }
        let Some(fired) = self.states[index].fire_transition() else {
            return Ok(());
        };
        let transition_name = self.states[index].edge_name(fired).to_string();
        let targets = self.states[index].edge_targets(fired);

        self.states[index].finalize()?;
        self.states[index].run_edge_effect(fired);
        debug!(region = %self.name, transition = %transition_name, "transition fired");

        let next = self.resolve_target(&transition_name, targets)?;
        self.active = Some(next);
        if self.states[next].is_terminate() {
            ctx.terminated = true;
        }
        self.states[next].init()?;
        ctx.fired = true;
        Ok(())
    }

    /// Searches recursively, through composite states, for a region.
    pub(crate) fn find_region(&self, region_name: &str) -> Option<&Region> {
        self.states
            .iter()
            .find_map(|state| state.find_region(region_name))
    }

    pub(crate) fn find_region_mut(&mut self, region_name: &str) -> Option<&mut Region> {
        self.states
            .iter_mut()
            .find_map(|state| state.find_region_mut(region_name))
    }

    /// Searches recursively, through composite states, for a state.
    pub(crate) fn find_state(&self, state_name: &str) -> Option<&State> {
        for state in &self.states {
            if state.name == state_name {
                return Some(state);
            }
            if let Some(found) = state.find_state(state_name) {
                return Some(found);
            }
        }
        None
    }

    pub(crate) fn find_state_mut(&mut self, state_name: &str) -> Option<&mut State> {
        for state in &mut self.states {
            if state.name == state_name {
                return Some(state);
            }
            if let Some(found) = state.find_state_mut(state_name) {
                return Some(found);
            }
        }
        None
    }

    pub(crate) fn check_fork_or_join(&self, names: &[String]) -> bool {
        self.states
            .iter()
            .any(|state| state.check_fork_or_join(names, false))
    }

    pub(crate) fn collect_state_names(&self, out: &mut Vec<String>) {
        for state in &self.states {
            state.collect_state_names(out);
        }
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("name", &self.name)
            .field("states", &self.states.len())
            .field("active", &self.active_state_name())
            .finish()
    }
}

/// Container of regions, shared by `Machine` and composite states.
///
/// This shared value type is what makes submachine composition possible: the
/// region set of a fully built machine can be moved, as a unit, into a fresh
/// composite state.
#[derive(Default)]
pub struct RegionSet {
    pub(crate) regions: Vec<Region>,
}

impl RegionSet {
    /// Creates a region; names must be unique among siblings at this level.
    pub(crate) fn new_region(&mut self, region_name: &str) -> Result<(), BuildError> {
        if self.regions.iter().any(|region| region.name == region_name) {
            return Err(BuildError::DuplicateRegion(region_name.to_string()));
        }
        self.regions.push(Region::new(region_name));
        Ok(())
    }

    /// Initializes every region in declaration order, failing fast.
    pub(crate) fn init(&mut self) -> Result<(), StepError> {
        for region in &mut self.regions {
            region.init()?;
        }
        Ok(())
    }

    /// Steps every region, each with a fresh context, and folds the results
    /// into the parent context.
    pub(crate) fn run(&mut self, ctx: &mut StepContext) -> Result<(), StepError> {
        for region in &mut self.regions {
            let mut child = StepContext::default();
            region.run(&mut child)?;
            if child.fired || !child.firing_allowed {
                ctx.firing_allowed = false;
            }
            if child.terminated {
                ctx.terminated = true;
            }
        }
        Ok(())
    }

    pub(crate) fn find_region(&self, region_name: &str) -> Option<&Region> {
        for region in &self.regions {
            if region.name == region_name {
                return Some(region);
            }
            if let Some(found) = region.find_region(region_name) {
                return Some(found);
            }
        }
        None
    }

    pub(crate) fn find_region_mut(&mut self, region_name: &str) -> Option<&mut Region> {
        for region in &mut self.regions {
            if region.name == region_name {
                return Some(region);
            }
            if let Some(found) = region.find_region_mut(region_name) {
                return Some(found);
            }
        }
        None
    }

    pub(crate) fn find_state(&self, state_name: &str) -> Option<&State> {
        self.regions
            .iter()
            .find_map(|region| region.find_state(state_name))
    }

    pub(crate) fn find_state_mut(&mut self, state_name: &str) -> Option<&mut State> {
        self.regions
            .iter_mut()
            .find_map(|region| region.find_state_mut(state_name))
    }

    /// Finds the region that directly contains the named state, searching
    /// recursively. Used by the join residency check.
    pub(crate) fn find_owning_region(&self, state_name: &str) -> Option<&Region> {
        for region in &self.regions {
            if region.states.iter().any(|state| state.name == state_name) {
                return Some(region);
            }
            for state in &region.states {
                if let Some(inner) = state.regions() {
                    if let Some(found) = inner.find_owning_region(state_name) {
                        return Some(found);
                    }
                }
            }
        }
        None
    }

    pub(crate) fn collect_state_names(&self, out: &mut Vec<String>) {
        for region in &self.regions {
            region.collect_state_names(out);
        }
    }
}

impl fmt::Debug for RegionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.regions.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::Transition;

    #[test]
    fn step_context_starts_permissive() {
        let ctx = StepContext::default();
        assert!(!ctx.fired);
        assert!(ctx.firing_allowed);
        assert!(!ctx.terminated);
    }

    #[test]
    fn init_moves_past_the_initial_pseudostate() {
        let mut region = Region::new("r");
        let mut initial = State::initial("start");
        initial
            .add_outgoing(Transition::new("t0", "start", "a").into())
            .unwrap();
        region.add_state(initial).unwrap();
        region.add_state(State::simple("a")).unwrap();

        region.init().unwrap();
        assert_eq!(region.active_state_name(), Some("a"));
    }

    #[test]
    fn init_without_initial_pseudostate_fails() {
        let mut region = Region::new("r");
        region.add_state(State::simple("a")).unwrap();

        assert!(matches!(region.init(), Err(StepError::MissingInitial(_))));
    }

    #[test]
    fn initial_without_transition_fails() {
        let mut region = Region::new("r");
        region.add_state(State::initial("start")).unwrap();

        assert!(matches!(
            region.init(),
            Err(StepError::InitialWithoutTransition { .. })
        ));
    }

    #[test]
    fn second_initial_pseudostate_is_rejected() {
        let mut region = Region::new("r");
        region.add_state(State::initial("start")).unwrap();

        let result = region.add_state(State::initial("other"));
        assert!(matches!(result, Err(BuildError::DuplicateInitial { .. })));
    }

    #[test]
    fn run_without_active_state_fails() {
        let mut region = Region::new("r");
        region.add_state(State::simple("a")).unwrap();

        let mut ctx = StepContext::default();
        assert!(matches!(
            region.run(&mut ctx),
            Err(StepError::NoActiveState(_))
        ));
    }

    #[test]
    fn unconditional_transition_fires_once_per_step() {
        let mut region = Region::new("r");
        let mut initial = State::initial("start");
        initial
            .add_outgoing(Transition::new("t0", "start", "a").into())
            .unwrap();
        region.add_state(initial).unwrap();
        let mut a = State::simple("a");
        a.add_outgoing(Transition::new("t1", "a", "b").into()).unwrap();
        region.add_state(a).unwrap();
        let mut b = State::simple("b");
        b.add_outgoing(Transition::new("t2", "b", "a").into()).unwrap();
        region.add_state(b).unwrap();

        region.init().unwrap();
        assert_eq!(region.active_state_name(), Some("a"));

        let mut ctx = StepContext::default();
        region.run(&mut ctx).unwrap();
        assert!(ctx.fired);
        assert_eq!(region.active_state_name(), Some("b"));

        let mut ctx = StepContext::default();
        region.run(&mut ctx).unwrap();
        assert_eq!(region.active_state_name(), Some("a"));
    }

    #[test]
    fn firing_disallowed_context_suppresses_firing() {
        let mut region = Region::new("r");
        let mut initial = State::initial("start");
        initial
            .add_outgoing(Transition::new("t0", "start", "a").into())
            .unwrap();
        region.add_state(initial).unwrap();
        let mut a = State::simple("a");
        a.add_outgoing(Transition::new("t1", "a", "b").into()).unwrap();
        region.add_state(a).unwrap();
        region.add_state(State::simple("b")).unwrap();

        region.init().unwrap();

        let mut ctx = StepContext {
            firing_allowed: false,
            ..StepContext::default()
        };
        region.run(&mut ctx).unwrap();
        assert!(!ctx.fired);
        assert_eq!(region.active_state_name(), Some("a"));
    }
}
