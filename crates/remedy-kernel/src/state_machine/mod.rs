use crate::error::StateMachineError;
use crate::types::{NodeId, OrchestrationRun, PlanId, RunId, RunState};
use chrono::{DateTime, Utc};

/// Validates a run-state transition.
///
/// Transitions only ever move forward: `pending -> running -> done | failed`.
/// With the `strict-debug` feature an illegal transition panics instead.
pub fn validate_transition(from: RunState, to: RunState) -> Result<(), StateMachineError> {
    if allowed(from, to) {
        Ok(())
    } else {
        #[cfg(feature = "strict-debug")]
        panic!("Illegal run transition attempted: {:?} -> {:?}", from, to);

        Err(StateMachineError::IllegalTransition { from, to })
    }
}

/// States reachable in one step from `from`
pub fn allowed_transitions(from: RunState) -> Vec<RunState> {
    use RunState::*;
    match from {
        Pending => vec![Running],
        Running => vec![Done, Failed],
        Done => vec![],
        Failed => vec![],
    }
}

fn allowed(from: RunState, to: RunState) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}

/// In-flight attempt of one node.
///
/// Owned by the task executing the node; sealing it yields the immutable
/// [`OrchestrationRun`]. A tracker can be sealed while `pending` (the node
/// was never dispatched) or once terminal, never while `running`.
#[derive(Debug)]
pub struct RunTracker {
    id: RunId,
    plan_id: PlanId,
    node_id: NodeId,
    attempt: u32,
    state: RunState,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl RunTracker {
    /// Start tracking a pending attempt
    #[must_use]
    pub fn new(plan_id: PlanId, node_id: NodeId, attempt: u32) -> Self {
        Self {
            id: RunId::generate(),
            plan_id,
            node_id,
            attempt,
            state: RunState::Pending,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Node being tracked
    #[inline]
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Move to the next state, stamping timestamps on the way
    pub fn transition(&mut self, to: RunState) -> Result<(), StateMachineError> {
        validate_transition(self.state, to)?;
        let now = Utc::now();
        if to == RunState::Running {
            self.started_at = now;
        }
        if to.is_terminal() {
            self.finished_at = Some(now);
        }
        self.state = to;
        Ok(())
    }

    /// Seal the attempt into an immutable run record
    pub fn seal(self, output: serde_json::Value) -> Result<OrchestrationRun, StateMachineError> {
        if self.state == RunState::Running {
            return Err(StateMachineError::NotSettled(self.state));
        }
        Ok(OrchestrationRun {
            id: self.id,
            plan_id: self.plan_id,
            node_id: self.node_id,
            attempt: self.attempt,
            state: self.state,
            started_at: self.started_at,
            finished_at: self.finished_at,
            output,
        })
    }
}
