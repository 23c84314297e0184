//! Playbooks supply the candidate steps the construction phase orders.
//!
//! The only shipped implementation is static: steps come from configuration
//! and are filtered by incident severity. Registration happens at
//! construction time, never as a side effect of loading code.

use crate::types::{IncidentRecord, NodeId, Play, Severity, StepSpec};
use serde::{Deserialize, Serialize};

/// Source of candidate remediation steps for an incident
pub trait Playbook: Send + Sync {
    /// Candidate steps in declaration order
    fn candidate_steps(&self, incident: &IncidentRecord) -> Vec<StepSpec>;
}

/// One configured playbook step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybookStep {
    pub id: NodeId,
    pub kind: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<NodeId>,
    #[serde(default = "default_minutes")]
    pub estimated_minutes: u32,
    /// Only include the step for incidents at or above this severity
    #[serde(default)]
    pub min_severity: Option<Severity>,
}

fn default_minutes() -> u32 {
    5
}

impl PlaybookStep {
    fn applies_to(&self, incident: &IncidentRecord) -> bool {
        self.min_severity.map_or(true, |min| incident.severity >= min)
    }

    fn to_step(&self) -> StepSpec {
        let mut play = Play::new(self.kind.clone()).with_estimate(self.estimated_minutes);
        if let Some(command) = &self.command {
            play = play.with_command(command.clone());
        }
        StepSpec {
            id: self.id.clone(),
            play,
            depends_on: self.depends_on.clone(),
        }
    }
}

/// Configuration-driven playbook
#[derive(Debug, Clone, Default)]
pub struct StaticPlaybook {
    steps: Vec<PlaybookStep>,
}

impl StaticPlaybook {
    /// Create from configured steps
    #[must_use]
    pub fn new(steps: Vec<PlaybookStep>) -> Self {
        Self { steps }
    }

    /// Create from ready-made step specs, applied to every incident
    #[must_use]
    pub fn from_specs(specs: Vec<StepSpec>) -> Self {
        Self {
            steps: specs
                .into_iter()
                .map(|s| PlaybookStep {
                    id: s.id,
                    kind: s.play.kind,
                    command: s.play.command,
                    depends_on: s.depends_on,
                    estimated_minutes: s.play.estimated_minutes,
                    min_severity: None,
                })
                .collect(),
        }
    }

    /// Number of configured steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no steps are configured
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Playbook for StaticPlaybook {
    fn candidate_steps(&self, incident: &IncidentRecord) -> Vec<StepSpec> {
        self.steps
            .iter()
            .filter(|s| s.applies_to(incident))
            .map(PlaybookStep::to_step)
            .collect()
    }
}
