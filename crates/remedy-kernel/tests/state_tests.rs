use proptest::prelude::*;
use remedy_kernel::state_machine::{allowed_transitions, validate_transition, RunTracker};
use remedy_kernel::types::{NodeId, PlanId, RunState};

fn state() -> impl Strategy<Value = RunState> {
    prop_oneof![
        Just(RunState::Pending),
        Just(RunState::Running),
        Just(RunState::Done),
        Just(RunState::Failed),
    ]
}

fn rank(state: RunState) -> u8 {
    match state {
        RunState::Pending => 0,
        RunState::Running => 1,
        RunState::Done | RunState::Failed => 2,
    }
}

proptest! {
    #[test]
    fn prop_transitions_only_move_forward(from in state(), to in state()) {
        if validate_transition(from, to).is_ok() {
            prop_assert!(rank(to) > rank(from));
        }
    }

    #[test]
    fn prop_tracker_never_regresses(steps in proptest::collection::vec(state(), 0..12)) {
        let mut tracker = RunTracker::new(PlanId::from("p"), NodeId::from("n"), 1);
        let mut last = tracker.state();
        for to in steps {
            let _ = tracker.transition(to);
            prop_assert!(rank(tracker.state()) >= rank(last));
            last = tracker.state();
        }
        if last != RunState::Running {
            let run = tracker.seal(serde_json::Value::Null).unwrap();
            prop_assert_eq!(run.state, last);
            prop_assert_eq!(run.finished_at.is_some(), last.is_terminal());
        }
    }
}

#[test]
fn test_terminal_states_have_no_exits() {
    assert!(allowed_transitions(RunState::Done).is_empty());
    assert!(allowed_transitions(RunState::Failed).is_empty());
}

#[test]
fn test_pending_cannot_skip_running() {
    assert!(validate_transition(RunState::Pending, RunState::Done).is_err());
    assert!(validate_transition(RunState::Pending, RunState::Failed).is_err());
    assert!(validate_transition(RunState::Running, RunState::Pending).is_err());
}
