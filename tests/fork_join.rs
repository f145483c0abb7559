//! Fork and join compounds across the orthogonal regions of a composite
//! state, plus termination behavior.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use statechart::{
    BuildError, ChangeEvent, Fork, ForkOutgoing, Join, JoinIncoming, Machine, State, Transition,
};

/// Machine under test:
///
/// main: init -> start --fork(go)--> work{ r1: a1 -> b1, r2: a2 -> b2 }
///       work --join--> done --(kill)--> stop (terminate)
struct ForkJoin {
    machine: Machine,
    go: ChangeEvent,
    e1: ChangeEvent,
    e2: ChangeEvent,
    kill: ChangeEvent,
}

fn build() -> ForkJoin {
    let mut machine = Machine::new("fork join");
    machine.new_region("main").unwrap();
    machine.add_state("main", State::initial("init")).unwrap();
    machine.add_state("main", State::simple("start")).unwrap();

    let mut work = State::composite("work");
    work.add_region("r1").unwrap();
    work.add_region("r2").unwrap();
    machine.add_state("main", work).unwrap();
    machine.add_state("r1", State::simple("a1")).unwrap();
    machine.add_state("r1", State::simple("b1")).unwrap();
    machine.add_state("r2", State::simple("a2")).unwrap();
    machine.add_state("r2", State::simple("b2")).unwrap();

    machine.add_state("main", State::simple("done")).unwrap();
    machine.add_state("main", State::terminate("stop")).unwrap();

    let go = ChangeEvent::<bool>::new(|attrs| attrs.value("go"));
    go.add("go", false);
    let e1 = ChangeEvent::<bool>::new(|attrs| attrs.value("e1"));
    e1.add("e1", false);
    let e2 = ChangeEvent::<bool>::new(|attrs| attrs.value("e2"));
    e2.add("e2", false);
    let kill = ChangeEvent::<bool>::new(|attrs| attrs.value("kill"));
    kill.add("kill", false);

    machine
        .add_transition(Transition::new("t0", "init", "start"))
        .unwrap();
    machine
        .add_fork(
            "work",
            Fork::new("f0", "start")
                .with_trigger(go.clone())
                .outgoing(ForkOutgoing::new("a1"))
                .outgoing(ForkOutgoing::new("a2")),
        )
        .unwrap();
    machine
        .add_transition(Transition::new("t1", "a1", "b1").with_trigger(e1.clone()))
        .unwrap();
    machine
        .add_transition(Transition::new("t2", "a2", "b2").with_trigger(e2.clone()))
        .unwrap();
    machine
        .add_join(
            "work",
            Join::new("j0", "done")
                .incoming(JoinIncoming::new("b1"))
                .incoming(JoinIncoming::new("b2")),
        )
        .unwrap();
    machine
        .add_transition(Transition::new("t3", "done", "stop").with_trigger(kill.clone()))
        .unwrap();

    ForkJoin {
        machine,
        go,
        e1,
        e2,
        kill,
    }
}

#[test]
fn fork_enters_every_region_at_once() {
    let mut fj = build();
    fj.machine.run().unwrap();
    assert_eq!(fj.machine.active_state("main"), "start");

    fj.go.switching("go", true).unwrap();
    fj.machine.run().unwrap();
    assert_eq!(fj.machine.active_state("main"), "work");
    assert_eq!(fj.machine.active_state("r1"), "a1");
    assert_eq!(fj.machine.active_state("r2"), "a2");
}

#[test]
fn join_waits_for_residency_of_every_leg() {
    let mut fj = build();
    fj.machine.run().unwrap();
    fj.go.switching("go", true).unwrap();
    fj.machine.run().unwrap();

    // Only r1 has reached its leg: the join must not fire.
    fj.e1.switching("e1", true).unwrap();
    fj.machine.run().unwrap();
    assert_eq!(fj.machine.active_state("r1"), "b1");
    assert_eq!(fj.machine.active_state("main"), "work");

    // r2 catches up, but its inner firing consumes this step for main.
    fj.e2.switching("e2", true).unwrap();
    fj.machine.run().unwrap();
    assert_eq!(fj.machine.active_state("r2"), "b2");
    assert_eq!(fj.machine.active_state("main"), "work");

    // No inner activity left: the join fires.
    fj.machine.run().unwrap();
    assert_eq!(fj.machine.active_state("main"), "done");
}

#[test]
fn inner_firing_suppresses_outer_firing_same_step() {
    let mut fj = build();
    fj.machine.run().unwrap();
    fj.go.switching("go", true).unwrap();
    fj.machine.run().unwrap();

    // Both legs become ready in one step; the two inner firings each consume
    // their region's step and disallow main from firing the join.
    fj.e1.switching("e1", true).unwrap();
    fj.e2.switching("e2", true).unwrap();
    fj.machine.run().unwrap();
    assert_eq!(fj.machine.active_state("r1"), "b1");
    assert_eq!(fj.machine.active_state("r2"), "b2");
    assert_eq!(fj.machine.active_state("main"), "work");

    fj.machine.run().unwrap();
    assert_eq!(fj.machine.active_state("main"), "done");
}

#[test]
fn triggered_join_needs_both_trigger_and_residency() {
    // Fork straight into the join's legs: residency holds from the moment
    // the composite is entered, so only the join's own trigger gates it.
    let mut machine = Machine::new("triggered join");
    machine.new_region("main").unwrap();
    machine.add_state("main", State::initial("init")).unwrap();
    machine.add_state("main", State::simple("start")).unwrap();

    let mut work = State::composite("work");
    work.add_region("r1").unwrap();
    work.add_region("r2").unwrap();
    machine.add_state("main", work).unwrap();
    machine.add_state("r1", State::simple("l1")).unwrap();
    machine.add_state("r2", State::simple("l2")).unwrap();
    machine.add_state("main", State::simple("done")).unwrap();

    let go = ChangeEvent::<bool>::new(|attrs| attrs.value("go"));
    go.add("go", false);
    let merge = ChangeEvent::<bool>::new(|attrs| attrs.value("merge"));
    merge.add("merge", false);

    machine
        .add_transition(Transition::new("t0", "init", "start"))
        .unwrap();
    machine
        .add_fork(
            "work",
            Fork::new("f0", "start")
                .with_trigger(go.clone())
                .outgoing(ForkOutgoing::new("l1"))
                .outgoing(ForkOutgoing::new("l2")),
        )
        .unwrap();
    machine
        .add_join(
            "work",
            Join::new("j0", "done")
                .with_trigger(merge.clone())
                .incoming(JoinIncoming::new("l1"))
                .incoming(JoinIncoming::new("l2")),
        )
        .unwrap();

    machine.run().unwrap();
    go.switching("go", true).unwrap();
    machine.run().unwrap();
    assert_eq!(machine.active_state("main"), "work");
    assert_eq!(machine.active_state("r1"), "l1");
    assert_eq!(machine.active_state("r2"), "l2");

    // Legs are resident but the trigger is off: the join must not fire.
    machine.run().unwrap();
    machine.run().unwrap();
    assert_eq!(machine.active_state("main"), "work");

    merge.switching("merge", true).unwrap();
    machine.run().unwrap();
    assert_eq!(machine.active_state("main"), "done");
}

#[test]
fn termination_is_one_way() {
    let mut fj = build();
    fj.machine.run().unwrap();
    fj.go.switching("go", true).unwrap();
    fj.machine.run().unwrap();
    fj.e1.switching("e1", true).unwrap();
    fj.e2.switching("e2", true).unwrap();
    fj.machine.run().unwrap();
    fj.machine.run().unwrap();
    assert_eq!(fj.machine.active_state("main"), "done");

    fj.kill.switching("kill", true).unwrap();
    fj.machine.run().unwrap();
    assert_eq!(fj.machine.active_state("main"), "stop");
    assert!(fj.machine.is_terminated());

    // Later steps are quiet no-ops even with activated triggers around.
    fj.machine.run().unwrap();
    fj.machine.run().unwrap();
    assert_eq!(fj.machine.active_state("main"), "stop");
    assert!(fj.machine.is_terminated());
}

#[test]
fn terminate_reached_inside_a_nested_region_stops_the_machine() {
    let mut machine = Machine::new("nested terminate");
    machine.new_region("main").unwrap();
    machine.add_state("main", State::initial("init")).unwrap();
    let mut outer = State::composite("outer");
    outer.add_region("inner").unwrap();
    machine.add_state("main", outer).unwrap();
    machine.add_state("inner", State::initial("i0")).unwrap();
    machine.add_state("inner", State::simple("a")).unwrap();
    machine.add_state("inner", State::terminate("halt")).unwrap();

    let boom = ChangeEvent::<bool>::new(|attrs| attrs.value("boom"));
    boom.add("boom", false);

    machine
        .add_transition(Transition::new("t0", "init", "outer"))
        .unwrap();
    machine
        .add_transition(Transition::new("t1", "i0", "a"))
        .unwrap();
    machine
        .add_transition(Transition::new("t2", "a", "halt").with_trigger(boom.clone()))
        .unwrap();

    machine.run().unwrap();
    machine.run().unwrap();
    assert_eq!(machine.active_state("inner"), "a");

    boom.switching("boom", true).unwrap();
    machine.run().unwrap();
    assert_eq!(machine.active_state("inner"), "halt");
    assert!(machine.is_terminated());

    machine.run().unwrap();
    assert_eq!(machine.active_state("inner"), "halt");
}

#[test]
fn completed_hook_runs_while_all_regions_are_final() {
    let completed = Arc::new(AtomicUsize::new(0));

    let mut machine = Machine::new("completion");
    machine.new_region("main").unwrap();
    machine.add_state("main", State::initial("init")).unwrap();

    let c = Arc::clone(&completed);
    let mut work = State::composite("work").on_completed(move || {
        c.fetch_add(1, Ordering::SeqCst);
    });
    work.add_region("r1").unwrap();
    machine.add_state("main", work).unwrap();
    machine.add_state("r1", State::initial("i1")).unwrap();
    machine.add_state("r1", State::simple("a")).unwrap();
    machine.add_state("r1", State::final_state("f1")).unwrap();

    let finish = ChangeEvent::<bool>::new(|attrs| attrs.value("finish"));
    finish.add("finish", false);

    machine
        .add_transition(Transition::new("t0", "init", "work"))
        .unwrap();
    machine
        .add_transition(Transition::new("t1", "i1", "a"))
        .unwrap();
    machine
        .add_transition(Transition::new("t2", "a", "f1").with_trigger(finish.clone()))
        .unwrap();

    machine.run().unwrap();
    machine.run().unwrap();
    assert_eq!(completed.load(Ordering::SeqCst), 0);

    finish.switching("finish", true).unwrap();
    machine.run().unwrap();
    assert_eq!(completed.load(Ordering::SeqCst), 1);

    // Completion is a condition, not a latch: it is observed again each step
    // while all regions sit in a final state.
    machine.run().unwrap();
    assert_eq!(completed.load(Ordering::SeqCst), 2);
}

#[test]
fn fork_registration_validates_arity_and_balance() {
    let mut fj = build();

    let too_few = fj.machine.add_fork(
        "work",
        Fork::new("bad0", "start").outgoing(ForkOutgoing::new("a1")),
    );
    assert!(matches!(too_few, Err(BuildError::ForkTooFewOutgoings(_))));

    // Both legs land in r1, none in r2.
    let unbalanced = fj.machine.add_fork(
        "work",
        Fork::new("bad1", "start")
            .outgoing(ForkOutgoing::new("a1"))
            .outgoing(ForkOutgoing::new("b1")),
    );
    assert!(matches!(unbalanced, Err(BuildError::UnbalancedFork { .. })));

    // Naming the composite itself alongside its regions' contents is
    // contradictory.
    let contradictory = fj.machine.add_fork(
        "work",
        Fork::new("bad2", "start")
            .outgoing(ForkOutgoing::new("work"))
            .outgoing(ForkOutgoing::new("a1"))
            .outgoing(ForkOutgoing::new("a2")),
    );
    assert!(matches!(contradictory, Err(BuildError::UnbalancedFork { .. })));

    let missing_anchor = fj.machine.add_fork(
        "nowhere",
        Fork::new("bad3", "start")
            .outgoing(ForkOutgoing::new("a1"))
            .outgoing(ForkOutgoing::new("a2")),
    );
    assert!(matches!(missing_anchor, Err(BuildError::AnchorNotFound { .. })));
}

#[test]
fn join_registration_validates_arity_and_balance() {
    let mut fj = build();

    let too_few = fj.machine.add_join(
        "work",
        Join::new("bad0", "done").incoming(JoinIncoming::new("b1")),
    );
    assert!(matches!(too_few, Err(BuildError::JoinTooFewIncomings(_))));

    let unbalanced = fj.machine.add_join(
        "work",
        Join::new("bad1", "done")
            .incoming(JoinIncoming::new("a1"))
            .incoming(JoinIncoming::new("b1")),
    );
    assert!(matches!(unbalanced, Err(BuildError::UnbalancedJoin { .. })));

    let missing_target = fj.machine.add_join(
        "work",
        Join::new("bad2", "nowhere")
            .incoming(JoinIncoming::new("b1"))
            .incoming(JoinIncoming::new("b2")),
    );
    assert!(matches!(missing_target, Err(BuildError::TargetNotFound { .. })));
}
