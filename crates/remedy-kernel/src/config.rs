//! Configuration
//!
//! A single TOML document configures the engine, the policy gate and the
//! static playbook:
//!
//! ```toml
//! [engine]
//! max_concurrency = 4
//! failure_policy = "continue"
//! step_timeout_secs = 300
//!
//! [policy]
//! max_risk = 78.0
//! auto_approve_ceiling = "high"
//!
//! [[steps]]
//! id = "drain"
//! kind = "shell"
//! command = "kubectl drain node-1"
//! ```

use crate::error::ConfigError;
use crate::playbook::PlaybookStep;
use crate::types::Severity;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What happens to dependents of a failed node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Dependents run once their dependencies are terminal, failed or not
    #[default]
    Continue,
    /// Dependents of a failed node are recorded pending and never dispatched
    HaltDependents,
}

/// Execution engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum nodes per batch (0 is treated as 1)
    pub max_concurrency: usize,
    pub failure_policy: FailurePolicy,
    /// Wrap step executors with a timeout when set
    pub step_timeout_secs: Option<u64>,
}

impl EngineConfig {
    /// With max concurrency
    #[inline]
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// With failure policy
    #[inline]
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            failure_policy: FailurePolicy::Continue,
            step_timeout_secs: None,
        }
    }
}

/// Policy gate thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyThresholds {
    /// Highest acceptable risk score (0-100)
    pub max_risk: f64,
    pub max_route_length: usize,
    pub max_batch_count: usize,
    pub max_critical_path_minutes: u64,
    /// Incidents at or above this severity always need operator promotion
    pub auto_approve_ceiling: Severity,
    /// Score added per breached structural threshold
    pub structural_penalty: f64,
}

impl PolicyThresholds {
    /// With max risk
    #[inline]
    #[must_use]
    pub fn with_max_risk(mut self, max_risk: f64) -> Self {
        self.max_risk = max_risk;
        self
    }

    /// With auto-approve ceiling
    #[inline]
    #[must_use]
    pub fn with_auto_approve_ceiling(mut self, ceiling: Severity) -> Self {
        self.auto_approve_ceiling = ceiling;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.max_risk) {
            return Err(ConfigError::Invalid(format!(
                "policy.max_risk must be within 0..=100, got {}",
                self.max_risk
            )));
        }
        if self.structural_penalty < 0.0 || !self.structural_penalty.is_finite() {
            return Err(ConfigError::Invalid(
                "policy.structural_penalty must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PolicyThresholds {
    fn default() -> Self {
        Self {
            max_risk: 78.0,
            max_route_length: 12,
            max_batch_count: 6,
            max_critical_path_minutes: 120,
            auto_approve_ceiling: Severity::High,
            structural_penalty: 12.0,
        }
    }
}

/// Top-level configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemedyConfig {
    pub engine: EngineConfig,
    pub policy: PolicyThresholds,
    pub steps: Vec<PlaybookStep>,
}

impl RemedyConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.policy.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            steps = config.steps.len(),
            max_concurrency = config.engine.max_concurrency,
            "configuration loaded"
        );
        Ok(config)
    }
}
