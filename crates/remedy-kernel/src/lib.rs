//! Remedy Kernel (remedy-kernel)
//!
//! Turns incidents into dependency-ordered remediation plans and runs them:
//! 1. **Construction**: candidate steps become a validated, deterministically
//!    ordered [`Plan`](construction::Plan)
//! 2. **Scheduling**: the plan is cut into concurrency-bounded batches
//! 3. **Policy**: a risk score decides whether the plan may run unattended
//! 4. **Execution**: batches run in order, nodes within a batch concurrently
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use remedy_kernel::prelude::*;
//!
//! let repo = Arc::new(InMemoryRepository::with_incidents(incidents));
//! let center = CommandCenter::new(&config, repo, playbook, Arc::new(DryRunExecutor));
//!
//! let outcome = center
//!     .dispatch(CommandInput::new(CommandKind::Plan, "acme", "inc-1", "corr-1"))
//!     .await;
//! ```

pub mod command;
pub mod config;
pub mod construction;
pub mod error;
pub mod executor;
pub mod logging;
pub mod playbook;
pub mod policy;
pub mod repository;
pub mod scheduler;
pub mod state_machine;
pub mod types;

pub use error::*;
pub use types::*;

/// Everything needed to wire and drive a command center
pub mod prelude {
    pub use crate::command::{
        CommandCenter, CommandInput, CommandKind, CommandOutcome, CommandRequest, CommandStatus,
        Snapshot,
    };
    pub use crate::config::{EngineConfig, FailurePolicy, PolicyThresholds, RemedyConfig};
    pub use crate::construction::{Plan, PlanGraph};
    pub use crate::error::{CommandError, EngineError, GraphError, RepositoryError, StepError};
    pub use crate::executor::{
        DryRunExecutor, ExecutionEngine, ExecutionSummary, ExecutorRegistry, RunRecorder,
        StepContext, StepExecutor, TimeoutExecutor,
    };
    pub use crate::logging::{AuditLog, CommandAudit};
    pub use crate::playbook::{Playbook, PlaybookStep, StaticPlaybook};
    pub use crate::policy::PolicyGate;
    pub use crate::repository::{IncidentPage, IncidentQuery, InMemoryRepository, Repository};
    pub use crate::scheduler::{Batch, BatchScheduler};
    pub use crate::types::{
        IncidentId, IncidentRecord, NodeId, OrchestrationRun, Play, PlanId, PlanNode,
        RiskDecision, RunState, Severity, StepSpec, TenantId,
    };
    pub use std::sync::Arc;
    pub use tokio_util::sync::CancellationToken;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Check if running with strict debugging enabled
pub const fn strict_debug() -> bool {
    cfg!(feature = "strict-debug")
}
