//! Execution Phase
//!
//! Runs a plan batch by batch. Every node of a batch is spawned as its own
//! task and the engine waits for all of them before touching the next batch.
//! A node's outcome never affects its siblings: a failing or panicking step
//! executor only produces a `failed` run for that node.
//!
//! # Policy
//!
//! The engine does not score plans. It is handed a [`RiskDecision`] and, when
//! that decision is not approved, records every node as `pending` without
//! invoking any step executor.

mod registry;

pub use registry::{DryRunExecutor, ExecutorRegistry, TimeoutExecutor};

use crate::config::{EngineConfig, FailurePolicy};
use crate::construction::Plan;
use crate::error::{EngineError, RepositoryError, StateMachineError, StepError};
use crate::scheduler::{Batch, BatchScheduler};
use crate::state_machine::RunTracker;
use crate::types::{IncidentId, NodeId, OrchestrationRun, PlanId, PlanNode, RiskDecision, RunState};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What a step executor knows about the node it runs
#[derive(Debug, Clone)]
pub struct StepContext {
    pub incident_id: IncidentId,
    pub plan_id: PlanId,
    /// Index of the batch the node belongs to
    pub batch: usize,
    pub attempt: u32,
    /// Cancelled when the caller abandons the execution
    pub cancel: CancellationToken,
}

/// Step executor trait
///
/// Implement this to perform the actual remediation work of a node. The
/// returned value becomes the run's output payload; an error marks the node
/// `failed`.
#[async_trait::async_trait]
pub trait StepExecutor: Send + Sync {
    /// Execute a single node
    async fn execute(
        &self,
        node: &PlanNode,
        ctx: &StepContext,
    ) -> Result<serde_json::Value, StepError>;
}

/// Receives each run as soon as it is settled
#[async_trait::async_trait]
pub trait RunRecorder: Send + Sync {
    /// Persist one run for an incident
    async fn record(
        &self,
        incident_id: &IncidentId,
        run: &OrchestrationRun,
    ) -> Result<(), RepositoryError>;
}

/// Result of one engine invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub plan_id: PlanId,
    /// Whether the engine was allowed to dispatch at all
    pub approved: bool,
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    pub pending: usize,
    /// Batches actually dispatched
    pub batch_count: usize,
    pub cancelled: bool,
    /// Nodes never dispatched because of cancellation
    pub skipped: usize,
    pub runs: Vec<OrchestrationRun>,
}

impl ExecutionSummary {
    fn tally(
        plan: &Plan,
        approved: bool,
        runs: Vec<OrchestrationRun>,
        batch_count: usize,
        cancelled: bool,
        skipped: usize,
    ) -> Self {
        let count = |state: RunState| runs.iter().filter(|r| r.state == state).count();
        let (done, failed, pending) = (
            count(RunState::Done),
            count(RunState::Failed),
            count(RunState::Pending),
        );
        Self {
            plan_id: plan.id().clone(),
            approved,
            total: plan.node_count(),
            done,
            failed,
            pending,
            batch_count,
            cancelled,
            skipped,
            runs,
        }
    }

    /// Whether any node failed
    #[inline]
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Every node ran and finished `done`
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.done == self.total
    }

    /// Run recorded for a node, if any
    #[must_use]
    pub fn run_for(&self, node_id: &NodeId) -> Option<&OrchestrationRun> {
        self.runs.iter().find(|r| &r.node_id == node_id)
    }
}

struct NodeOutcome {
    run: OrchestrationRun,
    record_error: Option<RepositoryError>,
}

struct BatchOutcome {
    runs: Vec<OrchestrationRun>,
    record_error: Option<RepositoryError>,
}

/// Batch-wise plan executor
pub struct ExecutionEngine {
    config: EngineConfig,
    scheduler: BatchScheduler,
    recorder: Option<Arc<dyn RunRecorder>>,
}

impl ExecutionEngine {
    /// Create an engine without a run recorder
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            scheduler: BatchScheduler::new(config.max_concurrency),
            config,
            recorder: None,
        }
    }

    /// With a recorder that receives every settled run
    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<dyn RunRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a plan as its first attempt
    pub async fn run(
        &self,
        plan: &Plan,
        decision: &RiskDecision,
        executor: Arc<dyn StepExecutor>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionSummary, EngineError> {
        self.run_attempt(plan, decision, executor, cancel, 1).await
    }

    /// Run a plan, stamping every run with `attempt`
    ///
    /// # Errors
    /// - `Graph` if the plan cannot be partitioned
    /// - `Recorder` if the run recorder failed; the batch in flight is still
    ///   awaited but no further batch is dispatched
    pub async fn run_attempt(
        &self,
        plan: &Plan,
        decision: &RiskDecision,
        executor: Arc<dyn StepExecutor>,
        cancel: &CancellationToken,
        attempt: u32,
    ) -> Result<ExecutionSummary, EngineError> {
        if !decision.approved {
            return self.record_withheld(plan, decision, attempt).await;
        }

        let batches = self.scheduler.partition(plan)?;
        let mut runs = Vec::with_capacity(plan.node_count());
        let mut unhealthy: HashSet<NodeId> = HashSet::new();
        let mut dispatched = 0;
        let mut cancelled = false;
        let mut skipped = 0;

        for (position, batch) in batches.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                skipped = batches[position..].iter().map(Batch::len).sum();
                tracing::warn!(plan = %plan.id(), batch = batch.index, skipped, "execution cancelled");
                break;
            }

            let outcome = self
                .run_batch(plan, batch, &executor, cancel, attempt, &unhealthy)
                .await?;
            dispatched += 1;

            unhealthy.extend(
                outcome
                    .runs
                    .iter()
                    .filter(|r| r.state != RunState::Done)
                    .map(|r| r.node_id.clone()),
            );
            runs.extend(outcome.runs);

            if let Some(err) = outcome.record_error {
                tracing::error!(plan = %plan.id(), batch = batch.index, error = %err, "run recorder failed");
                return Err(EngineError::Recorder(err));
            }
        }

        let summary = ExecutionSummary::tally(plan, true, runs, dispatched, cancelled, skipped);
        tracing::info!(
            plan = %plan.id(),
            done = summary.done,
            failed = summary.failed,
            pending = summary.pending,
            batches = summary.batch_count,
            cancelled = summary.cancelled,
            "execution finished"
        );
        Ok(summary)
    }

    async fn record_withheld(
        &self,
        plan: &Plan,
        decision: &RiskDecision,
        attempt: u32,
    ) -> Result<ExecutionSummary, EngineError> {
        let runs = plan
            .nodes()
            .iter()
            .map(|node| {
                RunTracker::new(plan.id().clone(), node.id.clone(), attempt).seal(json!({
                    "reason": "policy rejected",
                    "score": decision.score,
                }))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let recorded = join_all(runs.iter().map(|r| self.record(plan.incident_id(), r))).await;
        if let Some(err) = recorded.into_iter().find_map(Result::err) {
            return Err(EngineError::Recorder(err));
        }

        metrics::counter!("remedy_node_runs_total", "state" => "pending").increment(runs.len() as u64);
        tracing::info!(plan = %plan.id(), nodes = runs.len(), score = decision.score, "plan not approved; recorded pending runs");
        Ok(ExecutionSummary::tally(plan, false, runs, 0, false, 0))
    }

    async fn run_batch(
        &self,
        plan: &Plan,
        batch: &Batch,
        executor: &Arc<dyn StepExecutor>,
        cancel: &CancellationToken,
        attempt: u32,
        unhealthy: &HashSet<NodeId>,
    ) -> Result<BatchOutcome, EngineError> {
        let mut runs = Vec::with_capacity(batch.len());
        let mut record_error = None;
        let mut spawned = Vec::with_capacity(batch.len());

        tracing::debug!(plan = %plan.id(), batch = batch.index, nodes = batch.len(), "dispatching batch");

        for node_id in &batch.nodes {
            let Some(node) = plan.node(node_id) else {
                continue;
            };

            if self.config.failure_policy == FailurePolicy::HaltDependents {
                let blocked_by: Vec<&NodeId> = node
                    .depends_on
                    .iter()
                    .filter(|dep| unhealthy.contains(*dep))
                    .collect();
                if !blocked_by.is_empty() {
                    let run = RunTracker::new(plan.id().clone(), node.id.clone(), attempt)
                        .seal(json!({ "blocked_by": blocked_by }))?;
                    tracing::debug!(node = %node.id, "dependent halted");
                    if let Err(err) = self.record(plan.incident_id(), &run).await {
                        record_error.get_or_insert(err);
                    }
                    metrics::counter!("remedy_node_runs_total", "state" => "pending").increment(1);
                    runs.push(run);
                    continue;
                }
            }

            let ctx = StepContext {
                incident_id: plan.incident_id().clone(),
                plan_id: plan.id().clone(),
                batch: batch.index,
                attempt,
                cancel: cancel.clone(),
            };
            let task = tokio::spawn(run_node(
                node.clone(),
                ctx,
                Arc::clone(executor),
                self.recorder.clone(),
            ));
            spawned.push((node.id.clone(), task));
        }

        let (ids, handles): (Vec<_>, Vec<_>) = spawned.into_iter().unzip();
        let joined = join_all(handles).await;

        for (node_id, result) in ids.into_iter().zip(joined) {
            let outcome = match result {
                Ok(outcome) => outcome?,
                Err(join_error) => {
                    let reason = if join_error.is_panic() {
                        "step executor panicked"
                    } else {
                        "step task cancelled"
                    };
                    tracing::error!(node = %node_id, reason, "step task aborted");
                    let run = aborted_run(plan.id(), node_id, attempt, StepError::Aborted(reason.into()))?;
                    let record_error = self.record(plan.incident_id(), &run).await.err();
                    NodeOutcome { run, record_error }
                }
            };

            metrics::counter!("remedy_node_runs_total", "state" => outcome.run.state.as_str()).increment(1);
            if let Some(err) = outcome.record_error {
                record_error.get_or_insert(err);
            }
            runs.push(outcome.run);
        }

        Ok(BatchOutcome { runs, record_error })
    }

    async fn record(
        &self,
        incident_id: &IncidentId,
        run: &OrchestrationRun,
    ) -> Result<(), RepositoryError> {
        record_run(self.recorder.as_deref(), incident_id, run).await
    }
}

async fn record_run(
    recorder: Option<&dyn RunRecorder>,
    incident_id: &IncidentId,
    run: &OrchestrationRun,
) -> Result<(), RepositoryError> {
    match recorder {
        Some(recorder) => recorder.record(incident_id, run).await,
        None => Ok(()),
    }
}

async fn run_node(
    node: PlanNode,
    ctx: StepContext,
    executor: Arc<dyn StepExecutor>,
    recorder: Option<Arc<dyn RunRecorder>>,
) -> Result<NodeOutcome, StateMachineError> {
    let mut tracker = RunTracker::new(ctx.plan_id.clone(), node.id.clone(), ctx.attempt);
    tracker.transition(RunState::Running)?;

    let output = match executor.execute(&node, &ctx).await {
        Ok(output) => {
            tracker.transition(RunState::Done)?;
            output
        }
        Err(err) => {
            tracing::warn!(node = %node.id, error = %err, "step failed");
            tracker.transition(RunState::Failed)?;
            json!({ "error": err.to_string() })
        }
    };

    let run = tracker.seal(output)?;
    let record_error = record_run(recorder.as_deref(), &ctx.incident_id, &run).await.err();
    Ok(NodeOutcome { run, record_error })
}

fn aborted_run(
    plan_id: &PlanId,
    node_id: NodeId,
    attempt: u32,
    err: StepError,
) -> Result<OrchestrationRun, StateMachineError> {
    let mut tracker = RunTracker::new(plan_id.clone(), node_id, attempt);
    tracker.transition(RunState::Running)?;
    tracker.transition(RunState::Failed)?;
    tracker.seal(json!({ "error": err.to_string() }))
}
