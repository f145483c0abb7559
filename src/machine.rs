//! The machine: root container and build/run API.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{BuildError, StepError};
use crate::region::{Region, RegionSet, StepContext};
use crate::state::State;
use crate::transition::{Fork, Join, Transition};

/// Path from the machine's root region set down to one region: a chain of
/// (region index, composite state index) descents, then the region index at
/// the final level. Precomputed at initialization so that stepping-time
/// region lookups don't re-walk the tree.
#[derive(Clone, Debug)]
struct RegionPath {
    steps: Vec<(usize, usize)>,
    region: usize,
}

/// Snapshot of one region's active state, for diagnostics and logging.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSnapshot {
    pub region: String,
    pub active: Option<String>,
}

/// Snapshot of the machine's whole active configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub machine: String,
    pub regions: Vec<RegionSnapshot>,
}

/// Root container for the modeling and simulation of automata or concurrent
/// systems.
///
/// A machine is made of regions; a region is where states and transitions
/// are programmed. Regions are orthogonal and only one transition can fire
/// per region per step. Build the tree once with the add-methods, then call
/// [`run`](Machine::run) repeatedly: the first call initializes the machine,
/// each later call performs one synchronized step.
///
/// # Example
///
/// ```rust
/// use statechart::{ChangeEvent, Machine, State, Transition};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut machine = Machine::new("lamp machine");
/// machine.new_region("Lamp")?;
/// machine.add_state("Lamp", State::initial("Initial"))?;
/// machine.add_state("Lamp", State::simple("Lamp OFF"))?;
/// machine.add_state("Lamp", State::simple("Lamp ON"))?;
///
/// let switch_on = ChangeEvent::<bool>::new(|attrs| attrs.value("switch ON"));
/// switch_on.add("switch ON", false);
///
/// machine.add_transition(Transition::new("t0", "Initial", "Lamp OFF"))?;
/// machine.add_transition(
///     Transition::new("t1", "Lamp OFF", "Lamp ON").with_trigger(switch_on.clone()),
/// )?;
///
/// machine.run()?; // initialization
/// assert_eq!(machine.active_state("Lamp"), "Lamp OFF");
///
/// switch_on.switching("switch ON", true)?;
/// machine.run()?;
/// assert_eq!(machine.active_state("Lamp"), "Lamp ON");
/// # Ok(())
/// # }
/// ```
pub struct Machine {
    name: String,
    regions: RegionSet,
    is_initiated: bool,
    is_terminated: bool,
    region_index: HashMap<String, RegionPath>,
}

impl Machine {
    /// Creates an empty machine.
    pub fn new(name: impl Into<String>) -> Self {
        Machine {
            name: name.into(),
            regions: RegionSet::default(),
            is_initiated: false,
            is_terminated: false,
            region_index: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether initialization has run.
    pub fn is_initiated(&self) -> bool {
        self.is_initiated
    }

    /// Returns whether a terminate pseudostate has been reached anywhere.
    /// Termination is one-way: no later step fires any transition.
    pub fn is_terminated(&self) -> bool {
        self.is_terminated
    }

    /// Adds a top-level region to the machine.
    pub fn new_region(&mut self, region_name: &str) -> Result<(), BuildError> {
        self.regions.new_region(region_name)
    }

    /// Adds a state to the named region, looked up hierarchically.
    ///
    /// State names are machine-wide unique; for a composite state built from
    /// a transplanted submachine, every nested state name is validated too.
    pub fn add_state(&mut self, region_name: &str, state: State) -> Result<(), BuildError> {
        let mut names = Vec::new();
        state.collect_state_names(&mut names);
        for name in &names {
            if self.regions.find_state(name).is_some() {
                return Err(BuildError::DuplicateState(name.clone()));
            }
        }
        let region = self
            .find_region_mut(region_name)
            .ok_or_else(|| BuildError::RegionNotFound(region_name.to_string()))?;
        region.add_state(state)
    }

    /// Adds a transition between two states of the machine.
    ///
    /// Both the starting and the reachable state must already exist. Fork
    /// and join compounds have their own add-methods; a plain transition is
    /// one-to-one by construction.
    pub fn add_transition(&mut self, transition: Transition) -> Result<(), BuildError> {
        if self.regions.find_state(&transition.target).is_none() {
            return Err(BuildError::TargetNotFound {
                transition: transition.name,
                state: transition.target,
            });
        }
        let Some(source) = self.regions.find_state_mut(&transition.source) else {
            return Err(BuildError::SourceNotFound {
                transition: transition.name,
                state: transition.source,
            });
        };
        source.add_outgoing(transition.into())
    }

    /// Adds a fork transition.
    ///
    /// `anchor` names the outermost reachable state: the composite whose
    /// orthogonal regions the fork enters. Registration fails unless the
    /// fork has at least two outgoing legs and the legs cover every region
    /// under the anchor exactly once.
    pub fn add_fork(&mut self, anchor: &str, fork: Fork) -> Result<(), BuildError> {
        if fork.outgoings.len() < 2 {
            return Err(BuildError::ForkTooFewOutgoings(fork.name));
        }
        let leg_names: Vec<String> = fork.outgoings.iter().map(|leg| leg.target.clone()).collect();
        let Some(anchor_state) = self.regions.find_state(anchor) else {
            return Err(BuildError::AnchorNotFound {
                transition: fork.name,
                state: anchor.to_string(),
            });
        };
        if !anchor_state.check_fork_or_join(&leg_names, true) {
            return Err(BuildError::UnbalancedFork {
                transition: fork.name,
                anchor: anchor.to_string(),
            });
        }
        let Some(source) = self.regions.find_state_mut(&fork.source) else {
            return Err(BuildError::SourceNotFound {
                transition: fork.name,
                state: fork.source,
            });
        };
        source.add_outgoing(fork.into())
    }

    /// Adds a join transition.
    ///
    /// `anchor` names the outermost starting state: the composite whose
    /// orthogonal regions hold the join's incoming legs. Registration fails
    /// unless the join has at least two incoming legs and the legs cover
    /// every region under the anchor exactly once. The join is owned by the
    /// anchor and fires in the anchor's own region.
    pub fn add_join(&mut self, anchor: &str, join: Join) -> Result<(), BuildError> {
        if join.incomings.len() < 2 {
            return Err(BuildError::JoinTooFewIncomings(join.name));
        }
        let leg_names: Vec<String> = join.incomings.iter().map(|leg| leg.source.clone()).collect();
        if self.regions.find_state(&join.target).is_none() {
            return Err(BuildError::TargetNotFound {
                transition: join.name,
                state: join.target,
            });
        }
        let Some(anchor_state) = self.regions.find_state(anchor) else {
            return Err(BuildError::AnchorNotFound {
                transition: join.name,
                state: anchor.to_string(),
            });
        };
        if !anchor_state.check_fork_or_join(&leg_names, true) {
            return Err(BuildError::UnbalancedJoin {
                transition: join.name,
                anchor: anchor.to_string(),
            });
        }
        let Some(anchor_state) = self.regions.find_state_mut(anchor) else {
            return Err(BuildError::AnchorNotFound {
                transition: join.name,
                state: anchor.to_string(),
            });
        };
        anchor_state.add_join(join.into());
        Ok(())
    }

    /// Changes the states of the machine.
    ///
    /// Three-state behavior: if the machine is already terminated this is a
    /// quiet no-op; if it was never initialized, every region is initialized
    /// in declaration order (fail-fast, no transition fires); otherwise one
    /// step is performed across all top-level regions, each with a fresh
    /// step context, and the machine terminates if any region reached a
    /// terminate pseudostate.
    pub fn run(&mut self) -> Result<(), StepError> {
        if self.is_terminated {
            debug!(machine = %self.name, "terminated");
            return Ok(());
        }
        if !self.is_initiated {
            self.regions.init()?;
            self.region_index = build_region_index(&self.regions);
            self.is_initiated = true;
            return Ok(());
        }
        for region in &mut self.regions.regions {
            let mut ctx = StepContext::default();
            region.run(&mut ctx)?;
            if ctx.terminated {
                self.is_terminated = true;
            }
        }
        Ok(())
    }

    /// Returns the name of the state that is active within the named region,
    /// or the empty string when the region does not exist or has no active
    /// state. Both conditions are reported as warnings, not errors.
    pub fn active_state(&self, region_name: &str) -> String {
        let region = self
            .region_index
            .get(region_name)
            .and_then(|path| region_at(&self.regions, path))
            .or_else(|| self.regions.find_region(region_name));
        match region {
            Some(region) => match region.active_state_name() {
                Some(active) => active.to_string(),
                None => {
                    warn!(region = region_name, "region doesn't have any active state");
                    String::new()
                }
            },
            None => {
                warn!(region = region_name, "region doesn't exist");
                String::new()
            }
        }
    }

    /// Returns the machine's whole active configuration, one entry per
    /// region at every nesting depth, in declaration order.
    pub fn snapshot(&self) -> MachineSnapshot {
        let mut regions = Vec::new();
        snapshot_regions(&self.regions, &mut regions);
        MachineSnapshot {
            machine: self.name.clone(),
            regions,
        }
    }

    /// Moves the machine's region set out, leaving the machine empty.
    ///
    /// The returned set can be rebuilt into a composite state with
    /// [`State::composite_from`], which is how a whole built statechart is
    /// reused as a submachine inside another machine.
    pub fn into_regions(self) -> RegionSet {
        self.regions
    }

    fn find_region_mut(&mut self, region_name: &str) -> Option<&mut Region> {
        self.regions.find_region_mut(region_name)
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("name", &self.name)
            .field("regions", &self.regions)
            .field("is_initiated", &self.is_initiated)
            .field("is_terminated", &self.is_terminated)
            .finish()
    }
}

fn snapshot_regions(set: &RegionSet, out: &mut Vec<RegionSnapshot>) {
    for region in &set.regions {
        out.push(RegionSnapshot {
            region: region.name().to_string(),
            active: region.active_state_name().map(str::to_string),
        });
        for state in &region.states {
            if let Some(inner) = state.regions() {
                snapshot_regions(inner, out);
            }
        }
    }
}

fn build_region_index(set: &RegionSet) -> HashMap<String, RegionPath> {
    let mut index = HashMap::new();
    let mut steps = Vec::new();
    index_region_set(set, &mut steps, &mut index);
    index
}

fn index_region_set(
    set: &RegionSet,
    steps: &mut Vec<(usize, usize)>,
    index: &mut HashMap<String, RegionPath>,
) {
    for (region_idx, region) in set.regions.iter().enumerate() {
        // First match wins for shadowed names, as in the recursive search.
        index
            .entry(region.name().to_string())
            .or_insert_with(|| RegionPath {
                steps: steps.clone(),
                region: region_idx,
            });
        for (state_idx, state) in region.states.iter().enumerate() {
            if let Some(inner) = state.regions() {
                steps.push((region_idx, state_idx));
                index_region_set(inner, steps, index);
                steps.pop();
            }
        }
    }
}

fn region_at<'a>(set: &'a RegionSet, path: &RegionPath) -> Option<&'a Region> {
    let mut current = set;
    for &(region_idx, state_idx) in &path.steps {
        let state = current.regions.get(region_idx)?.states.get(state_idx)?;
        current = state.regions()?;
    }
    current.regions.get(path.region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangeEvent;

    fn lamp() -> (Machine, ChangeEvent, ChangeEvent) {
        let mut machine = Machine::new("lamp");
        machine.new_region("Lamp").unwrap();
        machine.add_state("Lamp", State::initial("Initial")).unwrap();
        machine.add_state("Lamp", State::simple("Off")).unwrap();
        machine.add_state("Lamp", State::simple("On")).unwrap();

        let switch_on = ChangeEvent::<bool>::new(|attrs| attrs.value("on"));
        switch_on.add("on", false);
        let switch_off = ChangeEvent::<bool>::new(|attrs| attrs.value("off"));
        switch_off.add("off", false);

        machine
            .add_transition(Transition::new("t0", "Initial", "Off"))
            .unwrap();
        machine
            .add_transition(Transition::new("t1", "Off", "On").with_trigger(switch_on.clone()))
            .unwrap();
        machine
            .add_transition(Transition::new("t2", "On", "Off").with_trigger(switch_off.clone()))
            .unwrap();
        (machine, switch_on, switch_off)
    }

    #[test]
    fn unknown_region_in_add_state_fails() {
        let mut machine = Machine::new("m");
        let result = machine.add_state("nowhere", State::simple("a"));
        assert!(matches!(result, Err(BuildError::RegionNotFound(_))));
    }

    #[test]
    fn duplicate_state_name_fails() {
        let mut machine = Machine::new("m");
        machine.new_region("r").unwrap();
        machine.add_state("r", State::simple("a")).unwrap();
        let result = machine.add_state("r", State::simple("a"));
        assert!(matches!(result, Err(BuildError::DuplicateState(_))));
    }

    #[test]
    fn duplicate_top_level_region_fails() {
        let mut machine = Machine::new("m");
        machine.new_region("r").unwrap();
        assert!(matches!(
            machine.new_region("r"),
            Err(BuildError::DuplicateRegion(_))
        ));
    }

    #[test]
    fn transition_endpoints_must_exist() {
        let mut machine = Machine::new("m");
        machine.new_region("r").unwrap();
        machine.add_state("r", State::simple("a")).unwrap();

        assert!(matches!(
            machine.add_transition(Transition::new("t0", "a", "missing")),
            Err(BuildError::TargetNotFound { .. })
        ));
        assert!(matches!(
            machine.add_transition(Transition::new("t1", "missing", "a")),
            Err(BuildError::SourceNotFound { .. })
        ));
    }

    #[test]
    fn active_state_contract_is_empty_string() {
        let (mut machine, _on, _off) = lamp();
        // Before initialization: region exists but has no active state.
        assert_eq!(machine.active_state("Lamp"), "");
        // Unknown region.
        assert_eq!(machine.active_state("nowhere"), "");

        machine.run().unwrap();
        assert_eq!(machine.active_state("Lamp"), "Off");
        assert_eq!(machine.active_state("nowhere"), "");
    }

    #[test]
    fn first_run_initializes_without_firing() {
        let (mut machine, switch_on, _off) = lamp();
        // Even with an activated trigger, the first run only initializes.
        switch_on.switching("on", true).unwrap();
        machine.run().unwrap();
        assert_eq!(machine.active_state("Lamp"), "Off");
        assert!(machine.is_initiated());
    }

    #[test]
    fn snapshot_reports_the_active_configuration() {
        let (mut machine, _on, _off) = lamp();
        machine.run().unwrap();

        let snapshot = machine.snapshot();
        assert_eq!(snapshot.machine, "lamp");
        assert_eq!(
            snapshot.regions,
            vec![RegionSnapshot {
                region: "Lamp".to_string(),
                active: Some("Off".to_string()),
            }]
        );

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: MachineSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn region_index_resolves_nested_regions() {
        let mut machine = Machine::new("m");
        machine.new_region("main").unwrap();
        machine.add_state("main", State::initial("initial")).unwrap();
        let mut composite = State::composite("outer");
        composite.add_region("inner").unwrap();
        machine.add_state("main", composite).unwrap();
        machine.add_state("inner", State::initial("inner_initial")).unwrap();
        machine.add_state("inner", State::simple("inner_a")).unwrap();
        machine
            .add_transition(Transition::new("t0", "initial", "outer"))
            .unwrap();
        machine
            .add_transition(Transition::new("t1", "inner_initial", "inner_a"))
            .unwrap();

        machine.run().unwrap();
        assert_eq!(machine.active_state("main"), "outer");
        assert_eq!(machine.active_state("inner"), "inner_a");
    }
}
