//! Plan Graph Builder
//!
//! Collects candidate steps for an incident and turns them into a [`Plan`].
//!
//! Usage:
//! ```rust,ignore
//! let mut graph = PlanGraph::new(&incident);
//! graph.add_step(StepSpec::new("drain", Play::new("shell")));
//! graph.add_step(StepSpec::new("restart", Play::new("shell")).after("drain"));
//! let plan = graph.build()?;
//! ```

use super::order::{kahn, resolve_dependencies};
use super::plan::Plan;
use crate::error::GraphError;
use crate::types::{IncidentId, IncidentRecord, NodeId, PlanNode, StepSpec};

/// Builder for remediation plans
#[derive(Debug, Clone)]
pub struct PlanGraph {
    incident_id: IncidentId,
    steps: Vec<StepSpec>,
}

impl PlanGraph {
    /// Start an empty graph for the incident snapshot
    #[must_use]
    pub fn new(incident: &IncidentRecord) -> Self {
        Self {
            incident_id: incident.id.clone(),
            steps: Vec::new(),
        }
    }

    /// Build a plan in one call
    pub fn build_from(incident: &IncidentRecord, steps: Vec<StepSpec>) -> Result<Plan, GraphError> {
        let mut graph = Self::new(incident);
        graph.extend(steps);
        graph.build()
    }

    /// Standalone topological order over an existing plan
    pub fn topological_order(plan: &Plan) -> Result<Vec<NodeId>, GraphError> {
        plan.topological_order()
    }

    /// Append a candidate step. Declaration order is the tie-breaker.
    pub fn add_step(&mut self, step: StepSpec) -> &mut Self {
        self.steps.push(step);
        self
    }

    /// Append several candidate steps
    pub fn extend(&mut self, steps: impl IntoIterator<Item = StepSpec>) -> &mut Self {
        self.steps.extend(steps);
        self
    }

    /// Number of candidate steps
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.steps.len()
    }

    /// Number of declared dependency references
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.steps.iter().map(|s| s.depends_on.len()).sum()
    }

    /// Validate and order the steps, producing a plan.
    ///
    /// # Errors
    /// - `EmptyPlan` if no steps were added
    /// - `DuplicateStep` if two steps share an id
    /// - `DanglingDependency` if a dependency is not among the steps
    /// - `CycleDetected` if Kahn's sweep cannot visit every step
    pub fn build(self) -> Result<Plan, GraphError> {
        if self.steps.is_empty() {
            return Err(GraphError::EmptyPlan);
        }

        let nodes: Vec<PlanNode> = self.steps.into_iter().map(PlanNode::from).collect();
        let dependencies = resolve_dependencies(&nodes)?;
        let order = kahn(&nodes, &dependencies)?;

        let mut slots: Vec<Option<PlanNode>> = nodes.into_iter().map(Some).collect();
        let ordered: Vec<PlanNode> = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .map(|mut node| {
                dedup_in_place(&mut node.depends_on);
                node
            })
            .collect();

        tracing::debug!(
            incident = %self.incident_id,
            nodes = ordered.len(),
            "plan graph built"
        );

        Ok(Plan::from_ordered(self.incident_id, ordered))
    }
}

fn dedup_in_place(deps: &mut Vec<NodeId>) {
    let mut seen = Vec::with_capacity(deps.len());
    deps.retain(|d| {
        if seen.contains(d) {
            false
        } else {
            seen.push(d.clone());
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Play, Severity};

    fn incident() -> IncidentRecord {
        IncidentRecord::new("inc-1", "acme", Severity::High)
    }

    fn step(id: &str, deps: &[&str]) -> StepSpec {
        let mut s = StepSpec::new(id, Play::new("shell"));
        for d in deps {
            s = s.after(*d);
        }
        s
    }

    #[test]
    fn builder_counts_steps_and_edges() {
        let mut graph = PlanGraph::new(&incident());
        graph.add_step(step("a", &[])).add_step(step("b", &["a"]));
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn build_orders_nodes_topologically() {
        let plan = PlanGraph::build_from(
            &incident(),
            vec![step("restart", &["drain"]), step("drain", &[])],
        )
        .unwrap();
        let ids: Vec<&str> = plan.nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["drain", "restart"]);
        assert_eq!(plan.incident_id().as_str(), "inc-1");
        assert!(!plan.is_approved());
    }

    #[test]
    fn empty_step_list_is_rejected() {
        assert_eq!(
            PlanGraph::build_from(&incident(), vec![]).unwrap_err(),
            GraphError::EmptyPlan
        );
    }

    #[test]
    fn duplicate_step_is_rejected() {
        let err = PlanGraph::build_from(&incident(), vec![step("a", &[]), step("a", &[])]).unwrap_err();
        assert_eq!(err, GraphError::DuplicateStep(NodeId::from("a")));
    }

    #[test]
    fn duplicate_dependencies_are_collapsed() {
        let plan = PlanGraph::build_from(&incident(), vec![step("a", &[]), step("b", &["a", "a"])]).unwrap();
        assert_eq!(plan.nodes()[1].depends_on, vec![NodeId::from("a")]);
    }

    #[test]
    fn same_structure_same_fingerprint() {
        let steps = vec![step("a", &[]), step("b", &["a"])];
        let p1 = PlanGraph::build_from(&incident(), steps.clone()).unwrap();
        let p2 = PlanGraph::build_from(&incident(), steps).unwrap();
        assert_ne!(p1.id(), p2.id());
        assert_eq!(p1.fingerprint(), p2.fingerprint());

        let p3 = PlanGraph::build_from(&incident(), vec![step("a", &[]), step("b", &[])]).unwrap();
        assert_ne!(p1.fingerprint(), p3.fingerprint());
    }

    #[test]
    fn critical_path_takes_longest_branch() {
        let steps = vec![
            StepSpec::new("a", Play::new("shell").with_estimate(5)),
            StepSpec::new("b", Play::new("shell").with_estimate(20)).after("a"),
            StepSpec::new("c", Play::new("shell").with_estimate(3)).after("a"),
            StepSpec::new("d", Play::new("shell").with_estimate(1)).after("b").after("c"),
        ];
        let plan = PlanGraph::build_from(&incident(), steps).unwrap();
        assert_eq!(plan.critical_path_minutes().unwrap(), 26);
        assert_eq!(plan.entry_nodes(), vec![NodeId::from("a")]);
        assert_eq!(plan.exit_nodes().unwrap(), vec![NodeId::from("d")]);
    }
}
