//! Command Center
//!
//! Single entry point for operators and automation. Each command validates
//! its input, coordinates plan construction, policy and execution, and always
//! answers with a status, a message, a snapshot and the audit entries it
//! appended. Errors never escape [`CommandCenter::dispatch`]; they become a
//! `rejected` status whose message starts with the error kind.
//!
//! | command   | effect                                                        |
//! |-----------|---------------------------------------------------------------|
//! | `plan`    | build and score; store with `approved = canAutoApprove`        |
//! | `promote` | build and score; store with `approved = approved` (operator)   |
//! | `refresh` | rebuild; store only when the structure changed                 |
//! | `execute` | run the latest plan; `done`, `queued` or `rejected`            |
//! | `query`   | summarize incidents, plans and runs for the tenant             |

mod input;

pub use input::{CommandInput, CommandRequest};

use crate::config::RemedyConfig;
use crate::construction::{Plan, PlanGraph};
use crate::error::{CommandError, ValidationError};
use crate::executor::{ExecutionEngine, ExecutionSummary, StepExecutor, TimeoutExecutor};
use crate::logging::{AuditLog, CommandAudit};
use crate::playbook::Playbook;
use crate::policy::PolicyGate;
use crate::repository::{IncidentQuery, Repository, RepositoryRecorder};
use crate::scheduler::{Batch, BatchScheduler};
use crate::types::{
    CorrelationId, IncidentId, IncidentRecord, OrchestrationRun, PlanId, RiskDecision, RunState,
    Severity, TenantId,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Supported commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Plan,
    Execute,
    Promote,
    Refresh,
    Query,
}

impl CommandKind {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Plan => "plan",
            CommandKind::Execute => "execute",
            CommandKind::Promote => "promote",
            CommandKind::Refresh => "refresh",
            CommandKind::Query => "query",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan" => Ok(CommandKind::Plan),
            "execute" => Ok(CommandKind::Execute),
            "promote" => Ok(CommandKind::Promote),
            "refresh" => Ok(CommandKind::Refresh),
            "query" => Ok(CommandKind::Query),
            other => Err(ValidationError::UnknownCommand(other.to_string())),
        }
    }
}

/// Command outcome status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    /// Plan stored (and approved by policy)
    Accepted,
    /// Input, lookup, build, repository or policy said no
    Rejected,
    /// Execution finished without failures, or a query answered
    Done,
    /// Execution left failed or undispatched nodes behind
    Queued,
}

impl CommandStatus {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CommandStatus::Accepted => "accepted",
            CommandStatus::Rejected => "rejected",
            CommandStatus::Done => "done",
            CommandStatus::Queued => "queued",
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-state run counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub pending: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}

impl RunCounts {
    fn of(runs: &[OrchestrationRun]) -> Self {
        runs.iter().fold(Self::default(), |mut counts, run| {
            match run.state {
                RunState::Pending => counts.pending += 1,
                RunState::Running => counts.running += 1,
                RunState::Done => counts.done += 1,
                RunState::Failed => counts.failed += 1,
            }
            counts
        })
    }
}

/// One incident as seen by `query`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentDigest {
    pub incident_id: IncidentId,
    pub severity: Severity,
    pub resolved: bool,
    pub plan_count: usize,
    pub latest_plan_id: Option<PlanId>,
    pub latest_plan_approved: Option<bool>,
    pub latest_risk_score: Option<f64>,
    pub runs: RunCounts,
}

/// Answer to `query`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySummary {
    pub incidents: Vec<IncidentDigest>,
    /// Matching incidents before the limit
    pub total: usize,
    pub plan_count: usize,
    pub runs: RunCounts,
}

/// State returned alongside a status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Snapshot {
    /// Nothing to show (validation or lookup failure)
    None,
    /// A built and scored plan
    Plan {
        plan: Box<Plan>,
        decision: RiskDecision,
        batches: Vec<Batch>,
    },
    /// An execution attempt
    Execution {
        plan: Box<Plan>,
        decision: RiskDecision,
        summary: ExecutionSummary,
    },
    /// Query results
    Query(QuerySummary),
}

/// What every command returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    pub status: CommandStatus,
    pub message: String,
    pub snapshot: Snapshot,
    pub audit: Vec<CommandAudit>,
}

impl CommandOutcome {
    /// Anything but `rejected`
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status != CommandStatus::Rejected
    }
}

type Handled = Result<(CommandStatus, String, Snapshot), CommandError>;

struct Prepared {
    plan: Plan,
    batches: Vec<Batch>,
    decision: RiskDecision,
}

/// Coordinates construction, policy and execution behind the command contract
pub struct CommandCenter {
    repository: Arc<dyn Repository>,
    playbook: Arc<dyn Playbook>,
    executor: Arc<dyn StepExecutor>,
    scheduler: BatchScheduler,
    gate: PolicyGate,
    engine: ExecutionEngine,
    audit: Arc<AuditLog>,
}

impl CommandCenter {
    /// Wire a command center from configuration and collaborators
    #[must_use]
    pub fn new(
        config: &RemedyConfig,
        repository: Arc<dyn Repository>,
        playbook: Arc<dyn Playbook>,
        executor: Arc<dyn StepExecutor>,
    ) -> Self {
        let executor: Arc<dyn StepExecutor> = match config.engine.step_timeout_secs {
            Some(secs) => Arc::new(TimeoutExecutor::from_secs(executor, secs)),
            None => executor,
        };
        let engine = ExecutionEngine::new(config.engine.clone())
            .with_recorder(Arc::new(RepositoryRecorder::new(Arc::clone(&repository))));

        Self {
            repository,
            playbook,
            executor,
            scheduler: BatchScheduler::new(config.engine.max_concurrency),
            gate: PolicyGate::new(config.policy.clone()),
            engine,
            audit: Arc::new(AuditLog::new()),
        }
    }

    /// Share an existing audit log
    #[must_use]
    pub fn with_audit_log(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    /// The audit log every command appends to
    #[inline]
    #[must_use]
    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Parse and dispatch a JSON command
    pub async fn dispatch_json(&self, raw: &str) -> CommandOutcome {
        match CommandInput::from_json(raw) {
            Ok(input) => self.dispatch(input).await,
            Err(err) => self.reject_invalid(&CommandInput::default(), err),
        }
    }

    /// Validate and run a command
    pub async fn dispatch(&self, input: CommandInput) -> CommandOutcome {
        self.dispatch_with_cancel(input, &CancellationToken::new()).await
    }

    /// Validate and run a command; `execute` stops dispatching once `cancel` fires
    pub async fn dispatch_with_cancel(
        &self,
        input: CommandInput,
        cancel: &CancellationToken,
    ) -> CommandOutcome {
        let request = match input.validate() {
            Ok(request) => request,
            Err(err) => return self.reject_invalid(&input, err),
        };

        let handled = match request.kind {
            CommandKind::Plan => self.plan(&request).await,
            CommandKind::Promote => self.promote(&request).await,
            CommandKind::Refresh => self.refresh(&request).await,
            CommandKind::Execute => self.execute(&request, cancel).await,
            CommandKind::Query => self.query(&request).await,
        };

        let (status, message, snapshot) = handled.unwrap_or_else(|err| {
            tracing::warn!(
                command = %request.kind,
                incident = %request.incident_id,
                kind = err.kind(),
                retryable = err.is_retryable(),
                error = %err,
                "command rejected"
            );
            (
                CommandStatus::Rejected,
                format!("{}: {err}", err.kind()),
                Snapshot::None,
            )
        });

        let entry = self.audit.append(CommandAudit::new(
            request.kind.as_str(),
            request.incident_id.clone(),
            request.tenant_id.clone(),
            request.correlation_id.clone(),
            status,
            message.clone(),
        ));

        metrics::counter!(
            "remedy_commands_total",
            "command" => request.kind.as_str(),
            "status" => status.as_str()
        )
        .increment(1);
        tracing::info!(
            command = %request.kind,
            incident = %request.incident_id,
            correlation = %request.correlation_id,
            status = %status,
            "command handled"
        );

        CommandOutcome {
            status,
            message,
            snapshot,
            audit: vec![entry],
        }
    }

    fn reject_invalid(&self, input: &CommandInput, err: ValidationError) -> CommandOutcome {
        let err = CommandError::from(err);
        let message = format!("{}: {err}", err.kind());
        let raw = |v: &Option<String>| v.clone().unwrap_or_default();

        let entry = self.audit.append(CommandAudit::new(
            raw(&input.command),
            IncidentId::from(raw(&input.incident_id)),
            TenantId::from(raw(&input.tenant_id)),
            CorrelationId::from(raw(&input.correlation_id)),
            CommandStatus::Rejected,
            message.clone(),
        ));
        metrics::counter!(
            "remedy_commands_total",
            "command" => "invalid",
            "status" => CommandStatus::Rejected.as_str()
        )
        .increment(1);
        tracing::warn!(error = %message, "command input rejected");

        CommandOutcome {
            status: CommandStatus::Rejected,
            message,
            snapshot: Snapshot::None,
            audit: vec![entry],
        }
    }

    /// Build, score and store a plan; only auto-approvable plans are stored approved
    pub async fn plan(&self, request: &CommandRequest) -> Handled {
        let incident = self.load_incident(request).await?;
        let Prepared {
            plan,
            batches,
            decision,
        } = self.prepare(&incident)?;

        let plan = plan.with_decision(&decision, decision.can_auto_approve);
        self.repository.add_plan(&plan).await?;

        let (status, message) = if decision.can_auto_approve {
            (
                CommandStatus::Accepted,
                format!("plan {} accepted and auto-approved", plan.id()),
            )
        } else if decision.approved {
            (
                CommandStatus::Accepted,
                format!("plan {} accepted; promotion required before execution", plan.id()),
            )
        } else {
            (
                CommandStatus::Rejected,
                format!("plan {} rejected: {}", plan.id(), decision.reasons.join("; ")),
            )
        };
        Ok((status, message, plan_snapshot(plan, decision, batches)))
    }

    /// Operator override: store the plan approved whenever policy approves it
    pub async fn promote(&self, request: &CommandRequest) -> Handled {
        let incident = self.load_incident(request).await?;
        let Prepared {
            plan,
            batches,
            decision,
        } = self.prepare(&incident)?;

        let plan = plan.with_decision(&decision, decision.approved);
        self.repository.add_plan(&plan).await?;

        let reason = request.reason.as_deref().unwrap_or("no reason given");
        let (status, message) = if decision.approved {
            (
                CommandStatus::Accepted,
                format!("plan {} promoted ({reason})", plan.id()),
            )
        } else {
            (
                CommandStatus::Rejected,
                format!(
                    "plan {} cannot be promoted: {}",
                    plan.id(),
                    decision.reasons.join("; ")
                ),
            )
        };
        Ok((status, message, plan_snapshot(plan, decision, batches)))
    }

    /// Rebuild the plan; store it only if its structure changed
    pub async fn refresh(&self, request: &CommandRequest) -> Handled {
        let incident = self.load_incident(request).await?;
        let Prepared {
            plan,
            batches,
            decision,
        } = self.prepare(&incident)?;

        let latest = self.latest_plan(&request.incident_id).await?;
        if let Some(latest) = latest.filter(|p| p.fingerprint() == plan.fingerprint()) {
            let message = format!("plan {} unchanged", latest.id());
            let decision = RiskDecision {
                plan_id: latest.id().clone(),
                ..decision
            };
            let status = if decision.approved {
                CommandStatus::Accepted
            } else {
                CommandStatus::Rejected
            };
            return Ok((status, message, plan_snapshot(latest, decision, batches)));
        }

        let plan = plan.with_decision(&decision, decision.can_auto_approve);
        self.repository.add_plan(&plan).await?;
        tracing::info!(incident = %request.incident_id, plan = %plan.id(), "plan refreshed");

        let status = if decision.approved {
            CommandStatus::Accepted
        } else {
            CommandStatus::Rejected
        };
        let message = format!("plan {} stored from refreshed playbook", plan.id());
        Ok((status, message, plan_snapshot(plan, decision, batches)))
    }

    /// Execute the latest plan for the incident
    pub async fn execute(&self, request: &CommandRequest, cancel: &CancellationToken) -> Handled {
        let incident = self.load_incident(request).await?;
        let plan = self
            .latest_plan(&request.incident_id)
            .await?
            .ok_or_else(|| CommandError::PlanNotFound(request.incident_id.clone()))?;

        let batches = self.scheduler.partition(&plan)?;
        let mut decision = self.gate.evaluate(&incident, &plan, &batches)?;
        if decision.approved && !plan.is_approved() {
            decision = decision.withheld("plan is not approved; promote it first");
        }

        let attempt = self.next_attempt(&request.incident_id, plan.id()).await?;
        let summary = self
            .engine
            .run_attempt(&plan, &decision, Arc::clone(&self.executor), cancel, attempt)
            .await?;

        let (status, message) = if !summary.approved {
            (
                CommandStatus::Rejected,
                format!(
                    "plan {} not approved; {} nodes recorded pending: {}",
                    plan.id(),
                    summary.pending,
                    decision.reasons.join("; ")
                ),
            )
        } else if summary.cancelled || summary.has_failures() {
            (
                CommandStatus::Queued,
                format!(
                    "plan {} attempt {attempt}: {} done, {} failed, {} pending, {} skipped",
                    plan.id(),
                    summary.done,
                    summary.failed,
                    summary.pending,
                    summary.skipped
                ),
            )
        } else {
            (
                CommandStatus::Done,
                format!(
                    "plan {} attempt {attempt}: {} nodes done in {} batches",
                    plan.id(),
                    summary.done,
                    summary.batch_count
                ),
            )
        };

        Ok((
            status,
            message,
            Snapshot::Execution {
                plan: Box::new(plan),
                decision,
                summary,
            },
        ))
    }

    /// Summarize incidents, plans and runs for the caller's tenant
    pub async fn query(&self, request: &CommandRequest) -> Handled {
        let page = self
            .repository
            .find_incidents(&request.incident_query())
            .await?;

        let mut summary = QuerySummary {
            total: page.total,
            ..QuerySummary::default()
        };
        for incident in page.items {
            let plans = self.repository.find_plans(&incident.id).await?;
            let runs = self.repository.get_runs(&incident.id).await?;
            let counts = RunCounts::of(&runs);
            let latest = latest_of(plans.iter());

            summary.plan_count += plans.len();
            summary.runs.pending += counts.pending;
            summary.runs.running += counts.running;
            summary.runs.done += counts.done;
            summary.runs.failed += counts.failed;
            summary.incidents.push(IncidentDigest {
                incident_id: incident.id,
                severity: incident.severity,
                resolved: incident.resolved,
                plan_count: plans.len(),
                latest_plan_id: latest.map(|p| p.id().clone()),
                latest_plan_approved: latest.map(Plan::is_approved),
                latest_risk_score: latest.and_then(Plan::risk_score),
                runs: counts,
            });
        }

        let message = format!(
            "{} of {} incidents, {} plans, {} runs",
            summary.incidents.len(),
            summary.total,
            summary.plan_count,
            summary.runs.pending + summary.runs.running + summary.runs.done + summary.runs.failed
        );
        Ok((CommandStatus::Done, message, Snapshot::Query(summary)))
    }

    async fn load_incident(&self, request: &CommandRequest) -> Result<IncidentRecord, CommandError> {
        let page = self
            .repository
            .find_incidents(&IncidentQuery::for_tenant(request.tenant_id.clone()))
            .await?;
        page.items
            .into_iter()
            .find(|i| i.id == request.incident_id)
            .ok_or_else(|| CommandError::IncidentNotFound(request.incident_id.clone()))
    }

    fn prepare(&self, incident: &IncidentRecord) -> Result<Prepared, CommandError> {
        let steps = self.playbook.candidate_steps(incident);
        let plan = PlanGraph::build_from(incident, steps)?;
        let batches = self.scheduler.partition(&plan)?;
        let decision = self.gate.evaluate(incident, &plan, &batches)?;
        Ok(Prepared {
            plan,
            batches,
            decision,
        })
    }

    async fn latest_plan(&self, incident_id: &IncidentId) -> Result<Option<Plan>, CommandError> {
        let plans = self.repository.find_plans(incident_id).await?;
        Ok(latest_of(plans.iter()).cloned())
    }

    async fn next_attempt(&self, incident_id: &IncidentId, plan_id: &PlanId) -> Result<u32, CommandError> {
        let runs = self.repository.get_runs(incident_id).await?;
        let last = runs
            .iter()
            .filter(|r| &r.plan_id == plan_id)
            .map(|r| r.attempt)
            .max()
            .unwrap_or(0);
        Ok(last + 1)
    }
}

/// Most recently created plan; later insertions win ties
fn latest_of<'a>(plans: impl Iterator<Item = &'a Plan>) -> Option<&'a Plan> {
    plans.max_by_key(|p| p.created_at())
}

fn plan_snapshot(plan: Plan, decision: RiskDecision, batches: Vec<Batch>) -> Snapshot {
    Snapshot::Plan {
        plan: Box::new(plan),
        decision,
        batches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_round_trip_through_from_str() {
        for kind in [
            CommandKind::Plan,
            CommandKind::Execute,
            CommandKind::Promote,
            CommandKind::Refresh,
            CommandKind::Query,
        ] {
            assert_eq!(kind.as_str().parse::<CommandKind>().unwrap(), kind);
        }
        assert!("PLAN".parse::<CommandKind>().is_err());
    }

    #[test]
    fn run_counts_tally_states() {
        let run = |state| OrchestrationRun {
            id: crate::types::RunId::generate(),
            plan_id: PlanId::from("p"),
            node_id: crate::types::NodeId::from("n"),
            attempt: 1,
            state,
            started_at: chrono::Utc::now(),
            finished_at: None,
            output: serde_json::Value::Null,
        };
        let counts = RunCounts::of(&[run(RunState::Done), run(RunState::Done), run(RunState::Pending)]);
        assert_eq!(counts.done, 2);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.failed, 0);
    }

    #[test]
    fn snapshot_is_tagged_by_kind() {
        let value = serde_json::to_value(Snapshot::None).unwrap();
        assert_eq!(value["kind"], "none");
    }
}
