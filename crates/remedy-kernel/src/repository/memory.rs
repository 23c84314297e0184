use super::{IncidentPage, IncidentQuery, Repository};
use crate::construction::Plan;
use crate::error::RepositoryError;
use crate::types::{IncidentId, IncidentRecord, OrchestrationRun};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Store {
    incidents: Vec<IncidentRecord>,
    plans: HashMap<IncidentId, Vec<Plan>>,
    runs: HashMap<IncidentId, Vec<OrchestrationRun>>,
}

/// Process-local repository
///
/// Incidents keep their first-seen order; upserting an existing id replaces
/// the record in place.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    /// Empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeded with incidents
    #[must_use]
    pub fn with_incidents(incidents: impl IntoIterator<Item = IncidentRecord>) -> Self {
        let repo = Self::new();
        for incident in incidents {
            repo.upsert_incident(incident);
        }
        repo
    }

    /// Insert or replace an incident
    pub fn upsert_incident(&self, incident: IncidentRecord) {
        let mut store = self.store.write();
        match store.incidents.iter_mut().find(|i| i.id == incident.id) {
            Some(existing) => *existing = incident,
            None => store.incidents.push(incident),
        }
    }

    /// Number of plans across all incidents
    pub fn plan_count(&self) -> usize {
        self.store.read().plans.values().map(Vec::len).sum()
    }

    /// Number of runs across all incidents
    pub fn run_count(&self) -> usize {
        self.store.read().runs.values().map(Vec::len).sum()
    }
}

#[async_trait::async_trait]
impl Repository for InMemoryRepository {
    async fn find_incidents(&self, query: &IncidentQuery) -> Result<IncidentPage, RepositoryError> {
        let store = self.store.read();
        let matching: Vec<&IncidentRecord> =
            store.incidents.iter().filter(|i| query.matches(i)).collect();
        let total = matching.len();
        let items = matching
            .into_iter()
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(IncidentPage { items, total })
    }

    async fn add_plan(&self, plan: &Plan) -> Result<(), RepositoryError> {
        let mut store = self.store.write();
        let plans = store.plans.entry(plan.incident_id().clone()).or_default();
        if plans.iter().any(|p| p.id() == plan.id()) {
            return Err(RepositoryError::WriteRejected(format!(
                "plan {} already stored",
                plan.id()
            )));
        }
        plans.push(plan.clone());
        Ok(())
    }

    async fn find_plans(&self, incident_id: &IncidentId) -> Result<Vec<Plan>, RepositoryError> {
        Ok(self
            .store
            .read()
            .plans
            .get(incident_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_runs(
        &self,
        incident_id: &IncidentId,
        run: &OrchestrationRun,
    ) -> Result<(), RepositoryError> {
        self.store
            .write()
            .runs
            .entry(incident_id.clone())
            .or_default()
            .push(run.clone());
        Ok(())
    }

    async fn get_runs(
        &self,
        incident_id: &IncidentId,
    ) -> Result<Vec<OrchestrationRun>, RepositoryError> {
        Ok(self
            .store
            .read()
            .runs
            .get(incident_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construction::PlanGraph;
    use crate::types::{Play, Severity, StepSpec};

    #[tokio::test]
    async fn limit_applies_after_filtering() {
        let repo = InMemoryRepository::with_incidents(vec![
            IncidentRecord::new("i1", "acme", Severity::Low),
            IncidentRecord::new("i2", "acme", Severity::Low).resolved(),
            IncidentRecord::new("i3", "acme", Severity::Low),
            IncidentRecord::new("i4", "acme", Severity::Low),
        ]);
        let q = IncidentQuery::for_tenant("acme")
            .with_unresolved_only(true)
            .with_limit(Some(2));
        let page = repo.find_incidents(&q).await.unwrap();
        assert_eq!(page.total, 3);
        let ids: Vec<&str> = page.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["i1", "i3"]);
    }

    #[tokio::test]
    async fn upsert_replaces_in_place() {
        let repo = InMemoryRepository::new();
        repo.upsert_incident(IncidentRecord::new("i1", "acme", Severity::Low));
        repo.upsert_incident(IncidentRecord::new("i2", "acme", Severity::Low));
        repo.upsert_incident(IncidentRecord::new("i1", "acme", Severity::High));

        let page = repo.find_incidents(&IncidentQuery::default()).await.unwrap();
        assert_eq!(page.items[0].severity, Severity::High);
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn duplicate_plan_is_rejected() {
        let repo = InMemoryRepository::new();
        let incident = IncidentRecord::new("i1", "acme", Severity::Low);
        let plan =
            PlanGraph::build_from(&incident, vec![StepSpec::new("a", Play::new("noop"))]).unwrap();

        repo.add_plan(&plan).await.unwrap();
        assert!(matches!(
            repo.add_plan(&plan).await,
            Err(RepositoryError::WriteRejected(_))
        ));
        assert_eq!(repo.find_plans(&incident.id).await.unwrap().len(), 1);
        assert_eq!(repo.plan_count(), 1);
    }
}
