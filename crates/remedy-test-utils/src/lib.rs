//! Testing utilities for the Remedy workspace
//!
//! Shared fixtures, scripted executors and fault-injecting collaborators.

#![allow(missing_docs)]

use parking_lot::Mutex;
use remedy_kernel::command::{CommandInput, CommandKind};
use remedy_kernel::construction::{Plan, PlanGraph};
use remedy_kernel::error::{RepositoryError, StepError};
use remedy_kernel::executor::{RunRecorder, StepContext, StepExecutor};
use remedy_kernel::repository::{IncidentPage, IncidentQuery, InMemoryRepository, Repository};
use remedy_kernel::types::{
    IncidentId, IncidentRecord, NodeId, OrchestrationRun, Play, PlanNode, RiskDecision, Severity,
    StepSpec,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const TENANT: &str = "acme";

pub fn incident(id: &str, severity: Severity) -> IncidentRecord {
    IncidentRecord::new(id, TENANT, severity)
}

pub fn step(id: &str, deps: &[&str]) -> StepSpec {
    deps.iter()
        .fold(StepSpec::new(id, Play::new("noop")), |s, d| s.after(*d))
}

/// A; B(A); C(A); D(B, C)
pub fn diamond_steps() -> Vec<StepSpec> {
    vec![
        step("a", &[]),
        step("b", &["a"]),
        step("c", &["a"]),
        step("d", &["b", "c"]),
    ]
}

/// s0 <- s1 <- ... <- s{len-1}
pub fn chain_steps(len: usize) -> Vec<StepSpec> {
    (0..len)
        .map(|i| {
            let id = format!("s{i}");
            if i == 0 {
                step(&id, &[])
            } else {
                let prev = format!("s{}", i - 1);
                step(&id, &[prev.as_str()])
            }
        })
        .collect()
}

pub fn diamond_plan() -> Plan {
    PlanGraph::build_from(&incident("inc-diamond", Severity::Low), diamond_steps()).unwrap()
}

pub fn decision(plan: &Plan, approved: bool) -> RiskDecision {
    RiskDecision {
        plan_id: plan.id().clone(),
        score: 10.0,
        reasons: vec!["fixture".to_string()],
        approved,
        can_auto_approve: approved,
    }
}

pub fn command(kind: CommandKind, incident_id: &str) -> CommandInput {
    CommandInput::new(kind, TENANT, incident_id, format!("corr-{incident_id}"))
}

pub fn ids(nodes: &[NodeId]) -> Vec<&str> {
    nodes.iter().map(NodeId::as_str).collect()
}

/// Step executor whose behavior per node is scripted up front
#[derive(Default)]
pub struct ScriptedExecutor {
    fail: HashSet<String>,
    panic: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<NodeId>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, node: &str) -> Self {
        self.fail.insert(node.to_string());
        self
    }

    pub fn panicking(mut self, node: &str) -> Self {
        self.panic.insert(node.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Nodes in invocation order
    pub fn calls(&self) -> Vec<NodeId> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Highest number of simultaneously running invocations
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        node: &PlanNode,
        ctx: &StepContext,
    ) -> Result<serde_json::Value, StepError> {
        self.calls.lock().push(node.id.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panic.contains(node.id.as_str()) {
            panic!("scripted panic in {}", node.id);
        }
        if self.fail.contains(node.id.as_str()) {
            return Err(StepError::Failed(format!("scripted failure in {}", node.id)));
        }
        Ok(json!({ "node": node.id, "batch": ctx.batch, "attempt": ctx.attempt }))
    }
}

/// Run recorder that keeps runs in memory and can be told to fail
#[derive(Default)]
pub struct MemoryRecorder {
    runs: Mutex<Vec<OrchestrationRun>>,
    fail: AtomicBool,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let recorder = Self::default();
        recorder.fail.store(true, Ordering::SeqCst);
        recorder
    }

    pub fn runs(&self) -> Vec<OrchestrationRun> {
        self.runs.lock().clone()
    }
}

#[async_trait::async_trait]
impl RunRecorder for MemoryRecorder {
    async fn record(
        &self,
        _incident_id: &IncidentId,
        run: &OrchestrationRun,
    ) -> Result<(), RepositoryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("recorder offline".into()));
        }
        self.runs.lock().push(run.clone());
        Ok(())
    }
}

/// In-memory repository with switchable faults
#[derive(Default)]
pub struct FaultyRepository {
    inner: InMemoryRepository,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FaultyRepository {
    pub fn with_incidents(incidents: impl IntoIterator<Item = IncidentRecord>) -> Self {
        Self {
            inner: InMemoryRepository::with_incidents(incidents),
            ..Self::default()
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryRepository {
        &self.inner
    }

    fn read(&self) -> Result<(), RepositoryError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("read path down".into()));
        }
        Ok(())
    }

    fn write(&self) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::WriteRejected("write path down".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Repository for FaultyRepository {
    async fn find_incidents(&self, query: &IncidentQuery) -> Result<IncidentPage, RepositoryError> {
        self.read()?;
        self.inner.find_incidents(query).await
    }

    async fn add_plan(&self, plan: &Plan) -> Result<(), RepositoryError> {
        self.write()?;
        self.inner.add_plan(plan).await
    }

    async fn find_plans(&self, incident_id: &IncidentId) -> Result<Vec<Plan>, RepositoryError> {
        self.read()?;
        self.inner.find_plans(incident_id).await
    }

    async fn add_runs(
        &self,
        incident_id: &IncidentId,
        run: &OrchestrationRun,
    ) -> Result<(), RepositoryError> {
        self.write()?;
        self.inner.add_runs(incident_id, run).await
    }

    async fn get_runs(
        &self,
        incident_id: &IncidentId,
    ) -> Result<Vec<OrchestrationRun>, RepositoryError> {
        self.read()?;
        self.inner.get_runs(incident_id).await
    }
}
