//! Core data model
//!
//! Incidents are owned by the ingestion path and are read-only here. Plans are
//! produced by the construction phase and run records by the execution phase;
//! both are append-only from the repository's point of view.

mod ids;

pub use ids::{CorrelationId, IncidentId, NodeId, PlanId, RunId, TenantId};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Incident severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
    Extreme,
}

impl Severity {
    /// All severities in ascending order
    pub const ALL: [Severity; 5] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
        Severity::Extreme,
    ];

    /// Ordinal rank (low = 0)
    #[inline]
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Severity::Low => 0,
            Severity::Medium => 1,
            Severity::High => 2,
            Severity::Critical => 3,
            Severity::Extreme => 4,
        }
    }

    /// Risk weight used by the policy gate
    #[inline]
    #[must_use]
    pub fn weight(self) -> f64 {
        match self {
            Severity::Low => 0.15,
            Severity::Medium => 0.40,
            Severity::High => 0.70,
            Severity::Critical => 1.0,
            Severity::Extreme => 1.10,
        }
    }

    /// Lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
            Severity::Extreme => "extreme",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            "extreme" => Ok(Severity::Extreme),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Where an incident applies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentScope {
    pub tenant: Option<String>,
    pub region: Option<String>,
}

/// Incident snapshot as delivered by the ingestion path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentRecord {
    pub id: IncidentId,
    pub tenant: TenantId,
    pub severity: Severity,
    pub detected_at: DateTime<Utc>,
    #[serde(default)]
    pub scope: IncidentScope,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub resolved: bool,
}

impl IncidentRecord {
    /// Create an unresolved incident detected now
    #[must_use]
    pub fn new(id: impl Into<IncidentId>, tenant: impl Into<TenantId>, severity: Severity) -> Self {
        Self {
            id: id.into(),
            tenant: tenant.into(),
            severity,
            detected_at: Utc::now(),
            scope: IncidentScope::default(),
            labels: BTreeMap::new(),
            resolved: false,
        }
    }

    /// With a label
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// With region scope
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.scope.region = Some(region.into());
        self
    }

    /// Mark resolved
    #[must_use]
    pub fn resolved(mut self) -> Self {
        self.resolved = true;
        self
    }
}

/// Action descriptor attached to a plan node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Play {
    /// Executor kind, used to pick a step executor from the registry
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default = "default_estimated_minutes")]
    pub estimated_minutes: u32,
}

fn default_estimated_minutes() -> u32 {
    5
}

impl Play {
    /// Create a play of the given kind with the default duration estimate
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            command: None,
            estimated_minutes: default_estimated_minutes(),
        }
    }

    /// With command string
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// With estimated duration
    #[must_use]
    pub fn with_estimate(mut self, minutes: u32) -> Self {
        self.estimated_minutes = minutes;
        self
    }
}

/// Candidate step handed to the plan builder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    pub id: NodeId,
    pub play: Play,
    #[serde(default)]
    pub depends_on: Vec<NodeId>,
}

impl StepSpec {
    /// Create a step with no dependencies
    #[must_use]
    pub fn new(id: impl Into<NodeId>, play: Play) -> Self {
        Self {
            id: id.into(),
            play,
            depends_on: Vec::new(),
        }
    }

    /// Add a dependency
    #[must_use]
    pub fn after(mut self, dep: impl Into<NodeId>) -> Self {
        self.depends_on.push(dep.into());
        self
    }
}

/// A node of a built plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanNode {
    pub id: NodeId,
    pub play: Play,
    pub depends_on: Vec<NodeId>,
}

impl From<StepSpec> for PlanNode {
    fn from(step: StepSpec) -> Self {
        Self {
            id: step.id,
            play: step.play,
            depends_on: step.depends_on,
        }
    }
}

/// Run state of a single node attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Done,
    Failed,
}

impl RunState {
    /// `done` and `failed` close a node within its batch
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    /// Lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one attempt of one plan node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationRun {
    pub id: RunId,
    pub plan_id: PlanId,
    pub node_id: NodeId,
    pub attempt: u32,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub output: serde_json::Value,
}

/// Outcome of the policy gate for one plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskDecision {
    pub plan_id: PlanId,
    /// Risk score on a 0-100 scale
    pub score: f64,
    pub reasons: Vec<String>,
    pub approved: bool,
    pub can_auto_approve: bool,
}

impl RiskDecision {
    /// Copy of this decision with approval withdrawn
    #[must_use]
    pub fn withheld(mut self, reason: impl Into<String>) -> Self {
        self.approved = false;
        self.can_auto_approve = false;
        self.reasons.push(reason.into());
        self
    }
}
