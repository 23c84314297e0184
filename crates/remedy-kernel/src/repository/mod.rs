//! Persistence boundary
//!
//! The command center talks to storage only through [`Repository`]. Plans
//! and runs are append-only; incidents are owned by an external ingestion
//! path and are only read here.

mod memory;

pub use memory::InMemoryRepository;

use crate::construction::Plan;
use crate::error::RepositoryError;
use crate::executor::RunRecorder;
use crate::types::{IncidentId, IncidentRecord, OrchestrationRun, TenantId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Incident filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentQuery {
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    #[serde(default)]
    pub unresolved_only: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl IncidentQuery {
    /// Query scoped to one tenant
    #[must_use]
    pub fn for_tenant(tenant_id: impl Into<TenantId>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Self::default()
        }
    }

    /// Only return unresolved incidents
    #[inline]
    #[must_use]
    pub fn with_unresolved_only(mut self, unresolved_only: bool) -> Self {
        self.unresolved_only = unresolved_only;
        self
    }

    /// Cap the number of returned incidents
    #[inline]
    #[must_use]
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Whether an incident passes the filter (the limit is not considered)
    #[must_use]
    pub fn matches(&self, incident: &IncidentRecord) -> bool {
        self.tenant_id.as_ref().map_or(true, |t| &incident.tenant == t)
            && !(self.unresolved_only && incident.resolved)
    }
}

/// One page of incidents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentPage {
    pub items: Vec<IncidentRecord>,
    /// Matches before the limit was applied
    pub total: usize,
}

/// Storage collaborator of the command center
#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    /// Incidents matching a filter
    async fn find_incidents(&self, query: &IncidentQuery) -> Result<IncidentPage, RepositoryError>;

    /// Persist a plan
    async fn add_plan(&self, plan: &Plan) -> Result<(), RepositoryError>;

    /// Plans stored for an incident, in insertion order
    async fn find_plans(&self, incident_id: &IncidentId) -> Result<Vec<Plan>, RepositoryError>;

    /// Append one run
    async fn add_runs(
        &self,
        incident_id: &IncidentId,
        run: &OrchestrationRun,
    ) -> Result<(), RepositoryError>;

    /// Runs stored for an incident, in insertion order
    async fn get_runs(&self, incident_id: &IncidentId)
        -> Result<Vec<OrchestrationRun>, RepositoryError>;
}

/// Feeds engine runs straight into a repository
#[derive(Clone)]
pub struct RepositoryRecorder {
    repository: Arc<dyn Repository>,
}

impl RepositoryRecorder {
    /// Wrap a repository
    #[must_use]
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }
}

#[async_trait::async_trait]
impl RunRecorder for RepositoryRecorder {
    async fn record(
        &self,
        incident_id: &IncidentId,
        run: &OrchestrationRun,
    ) -> Result<(), RepositoryError> {
        self.repository.add_runs(incident_id, run).await
    }
}
