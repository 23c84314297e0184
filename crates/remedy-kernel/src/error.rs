//! Error types for the remediation kernel
//!
//! Each phase has its own error enum. `CommandError` is the umbrella the
//! command center converts into a `rejected` status at its boundary.
//! Policy rejection is deliberately absent: it is a decision, not an error.

use crate::types::{IncidentId, NodeId, RunState};
use std::path::PathBuf;

/// Plan construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Kahn's sweep left nodes unvisited
    #[error("cycle detected among steps {nodes:?}")]
    CycleDetected { nodes: Vec<NodeId> },

    /// A dependency names a step outside the candidate set
    #[error("step '{node}' depends on unknown step '{missing}'")]
    DanglingDependency { node: NodeId, missing: NodeId },

    /// Two candidate steps share an id
    #[error("duplicate step '{0}'")]
    DuplicateStep(NodeId),

    /// No candidate steps at all
    #[error("plan has no steps")]
    EmptyPlan,
}

impl GraphError {
    /// Stable error kind used in command messages
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            GraphError::CycleDetected { .. } => "CycleDetected",
            GraphError::DanglingDependency { .. } => "DanglingDependency",
            GraphError::DuplicateStep(_) => "DuplicateStep",
            GraphError::EmptyPlan => "EmptyPlan",
        }
    }
}

/// Failures reported by the repository collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// Backend could not be reached
    #[error("repository unavailable: {0}")]
    Unavailable(String),

    /// Backend refused a write
    #[error("repository rejected write: {0}")]
    WriteRejected(String),
}

/// Step executor failures. Any of these marks the node `failed`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// The step ran and reported failure
    #[error("step failed: {0}")]
    Failed(String),

    /// No executor registered for the play kind
    #[error("no executor registered for play kind '{0}'")]
    UnknownPlay(String),

    /// Wrapped executor did not finish in time
    #[error("step timed out after {secs}s")]
    TimedOut { secs: u64 },

    /// Executor task panicked or was aborted
    #[error("step task aborted: {0}")]
    Aborted(String),
}

/// Run-state machine violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    /// Transition not in the allowed table
    #[error("illegal run transition {from} -> {to}")]
    IllegalTransition { from: RunState, to: RunState },

    /// A run cannot be sealed while still running
    #[error("run cannot be sealed in state {0}")]
    NotSettled(RunState),
}

/// Audit log failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    /// An entry's hash or back-link does not match the chain
    #[error("audit chain broken at entry {index}")]
    IntegrityViolation { index: usize },
}

/// Execution engine failures
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The plan's own structure is unusable
    #[error("plan structure invalid: {0}")]
    Graph(#[from] GraphError),

    /// The run recorder failed; dispatch stopped after the current batch
    #[error("run recorder failed: {0}")]
    Recorder(#[from] RepositoryError),

    /// A run tracker was driven through an illegal transition
    #[error(transparent)]
    StateMachine(#[from] StateMachineError),
}

/// Configuration load errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML did not parse
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Parsed but semantically invalid
    #[error("invalid configuration value: {0}")]
    Invalid(String),
}

/// Command input contract violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Required string field missing or empty
    #[error("field '{0}' must be a non-empty string")]
    MissingField(&'static str),

    /// Command name outside the supported set
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Input was not a valid command object
    #[error("malformed command input: {0}")]
    Malformed(String),
}

/// Umbrella error for command center operations
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Plan construction failed
    #[error("plan build failed: {0}")]
    Graph(#[from] GraphError),

    /// No plan stored for the incident
    #[error("no plan found for incident {0}")]
    PlanNotFound(IncidentId),

    /// Incident unknown to the repository (or outside the caller's tenant)
    #[error("incident {0} not found")]
    IncidentNotFound(IncidentId),

    /// Repository collaborator failed
    #[error("repository failure: {0}")]
    Repository(#[from] RepositoryError),

    /// Input contract violated
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Engine drove a run through an illegal transition
    #[error("run tracking failed: {0}")]
    StateMachine(#[from] StateMachineError),
}

impl CommandError {
    /// Stable error kind used in command messages
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::Graph(e) => e.kind(),
            CommandError::PlanNotFound(_) => "PlanNotFound",
            CommandError::IncidentNotFound(_) => "IncidentNotFound",
            CommandError::Repository(_) => "RepositoryFailure",
            CommandError::Validation(_) => "ValidationFailed",
            CommandError::StateMachine(_) => "IllegalTransition",
        }
    }

    /// Whether an external caller may reasonably retry the command unchanged
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, CommandError::Repository(RepositoryError::Unavailable(_)))
    }
}

impl From<EngineError> for CommandError {
    fn from(value: EngineError) -> Self {
        match value {
            EngineError::Graph(e) => CommandError::Graph(e),
            EngineError::Recorder(e) => CommandError::Repository(e),
            EngineError::StateMachine(e) => CommandError::StateMachine(e),
        }
    }
}
