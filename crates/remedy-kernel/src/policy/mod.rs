//! Policy Gate
//!
//! Converts incident severity and plan shape into a risk score (0-100) and an
//! approve/reject decision. Rejection is an ordinary outcome: the execution
//! engine still records a no-op run for a rejected plan.
//!
//! Score composition:
//! - severity weight x 70
//! - size load: 1.5 per node beyond the first, capped at 15
//! - a fixed penalty per breached structural threshold
//!
//! The result is clamped to 100 and rounded to one decimal.

use crate::config::PolicyThresholds;
use crate::construction::Plan;
use crate::error::GraphError;
use crate::scheduler::Batch;
use crate::types::{IncidentRecord, RiskDecision, Severity};
use serde::{Deserialize, Serialize};

const SEVERITY_BASE: f64 = 70.0;
const LOAD_PER_NODE: f64 = 1.5;
const MAX_LOAD: f64 = 15.0;

/// Structural measurements the gate scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanShape {
    pub route_length: usize,
    pub batch_count: usize,
    pub critical_path_minutes: u64,
}

impl PlanShape {
    /// Measure a plan and its partition
    pub fn measure(plan: &Plan, batches: &[Batch]) -> Result<Self, GraphError> {
        Ok(Self {
            route_length: plan.node_count(),
            batch_count: batches.len(),
            critical_path_minutes: plan.critical_path_minutes()?,
        })
    }
}

/// One breached structural threshold
#[derive(Debug, Clone, PartialEq)]
struct Breach(String);

/// Risk scoring and approval
#[derive(Debug, Clone, Default)]
pub struct PolicyGate {
    thresholds: PolicyThresholds,
}

impl PolicyGate {
    /// Create a gate with the given thresholds
    #[must_use]
    pub fn new(thresholds: PolicyThresholds) -> Self {
        Self { thresholds }
    }

    /// Configured thresholds
    #[inline]
    #[must_use]
    pub fn thresholds(&self) -> &PolicyThresholds {
        &self.thresholds
    }

    /// Evaluate a plan against the thresholds
    pub fn evaluate(
        &self,
        incident: &IncidentRecord,
        plan: &Plan,
        batches: &[Batch],
    ) -> Result<RiskDecision, GraphError> {
        let shape = PlanShape::measure(plan, batches)?;
        let decision = self.decide(incident.severity, &shape, plan);

        metrics::counter!(
            "remedy_policy_decisions_total",
            "approved" => decision.approved.to_string()
        )
        .increment(1);
        tracing::info!(
            plan = %plan.id(),
            incident = %incident.id,
            severity = %incident.severity,
            score = decision.score,
            approved = decision.approved,
            auto = decision.can_auto_approve,
            "policy evaluated"
        );

        Ok(decision)
    }

    /// Risk score for a severity and shape, without a decision
    #[must_use]
    pub fn score(&self, severity: Severity, shape: &PlanShape) -> f64 {
        let breaches = self.breaches(shape).len();
        self.score_with(severity, shape, breaches)
    }

    fn score_with(&self, severity: Severity, shape: &PlanShape, breaches: usize) -> f64 {
        let base = severity.weight() * SEVERITY_BASE;
        let load = (shape.route_length.saturating_sub(1) as f64 * LOAD_PER_NODE).min(MAX_LOAD);
        let penalty = breaches as f64 * self.thresholds.structural_penalty;
        let raw = (base + load + penalty).clamp(0.0, 100.0);
        (raw * 10.0).round() / 10.0
    }

    fn breaches(&self, shape: &PlanShape) -> Vec<Breach> {
        let t = &self.thresholds;
        let mut breaches = Vec::new();
        if shape.route_length > t.max_route_length {
            breaches.push(Breach(format!(
                "route length {} exceeds max {}",
                shape.route_length, t.max_route_length
            )));
        }
        if shape.batch_count > t.max_batch_count {
            breaches.push(Breach(format!(
                "batch count {} exceeds max {}",
                shape.batch_count, t.max_batch_count
            )));
        }
        if shape.critical_path_minutes > t.max_critical_path_minutes {
            breaches.push(Breach(format!(
                "critical path {}m exceeds max {}m",
                shape.critical_path_minutes, t.max_critical_path_minutes
            )));
        }
        breaches
    }

    fn decide(&self, severity: Severity, shape: &PlanShape, plan: &Plan) -> RiskDecision {
        let t = &self.thresholds;
        let breaches = self.breaches(shape);
        let score = self.score_with(severity, shape, breaches.len());

        let mut reasons = Vec::with_capacity(breaches.len() + 3);
        reasons.push(format!(
            "severity {severity} contributes {:.1}",
            severity.weight() * SEVERITY_BASE
        ));
        let structural_ok = breaches.is_empty();
        reasons.extend(breaches.into_iter().map(|b| b.0));

        let within_risk = score <= t.max_risk;
        if within_risk {
            reasons.push(format!("risk score {score:.1} within max {:.1}", t.max_risk));
        } else {
            reasons.push(format!("risk score {score:.1} exceeds max {:.1}", t.max_risk));
        }

        let approved = within_risk && structural_ok;
        let below_ceiling = severity < t.auto_approve_ceiling;
        let can_auto_approve = approved && below_ceiling;

        if approved && !below_ceiling {
            reasons.push(format!(
                "severity {severity} at or above auto-approve ceiling {}; operator promotion required",
                t.auto_approve_ceiling
            ));
        } else if can_auto_approve {
            reasons.push("eligible for auto-approval".to_string());
        }

        RiskDecision {
            plan_id: plan.id().clone(),
            score,
            reasons,
            approved,
            can_auto_approve,
        }
    }
}
