//! Built remediation plan
//!
//! A `Plan` only comes out of [`PlanGraph::build`](super::PlanGraph::build)
//! (or back out of a repository). Its nodes are stored in topological order.
//! There is no mutating API: approval is stamped once, by value, before the
//! plan is persisted.

use super::order::{kahn, resolve_dependencies, topological_order_of};
use crate::error::GraphError;
use crate::types::{IncidentId, NodeId, PlanId, PlanNode, RiskDecision};
use chrono::{DateTime, Utc};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Remediation plan (route) for one incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    id: PlanId,
    incident_id: IncidentId,
    nodes: Vec<PlanNode>,
    created_at: DateTime<Utc>,
    approved: bool,
    risk_score: Option<f64>,
    fingerprint: String,
}

impl Plan {
    pub(crate) fn from_ordered(incident_id: IncidentId, nodes: Vec<PlanNode>) -> Self {
        let fingerprint = fingerprint(&nodes);
        Self {
            id: PlanId::generate(),
            incident_id,
            nodes,
            created_at: Utc::now(),
            approved: false,
            risk_score: None,
            fingerprint,
        }
    }

    /// Plan id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &PlanId {
        &self.id
    }

    /// Incident this plan remediates
    #[inline]
    #[must_use]
    pub fn incident_id(&self) -> &IncidentId {
        &self.incident_id
    }

    /// Nodes in topological order
    #[inline]
    #[must_use]
    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    /// Look up a node
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&PlanNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Number of nodes (route length)
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Creation timestamp
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether the plan was approved for execution when persisted
    #[inline]
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.approved
    }

    /// Risk score stamped at persistence time
    #[inline]
    #[must_use]
    pub fn risk_score(&self) -> Option<f64> {
        self.risk_score
    }

    /// SHA-256 over the node/edge structure, hex encoded
    #[inline]
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Stamp the policy outcome onto the plan.
    ///
    /// `approved` is passed separately because the command center decides
    /// which decision flag applies (auto-approval or operator promotion).
    #[must_use]
    pub fn with_decision(mut self, decision: &RiskDecision, approved: bool) -> Self {
        self.risk_score = Some(decision.score);
        self.approved = approved;
        self
    }

    /// Every dependency edge as (dependency, dependent)
    #[must_use]
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.nodes
            .iter()
            .flat_map(|n| n.depends_on.iter().map(move |d| (d.clone(), n.id.clone())))
            .collect()
    }

    /// Re-derive the topological order from the adjacency
    pub fn topological_order(&self) -> Result<Vec<NodeId>, GraphError> {
        topological_order_of(&self.nodes)
    }

    /// Check the stored node set still forms a DAG
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::EmptyPlan);
        }
        let dependencies = resolve_dependencies(&self.nodes)?;
        kahn(&self.nodes, &dependencies).map(|_| ())
    }

    /// Diagnostic digraph with edges pointing from dependency to dependent
    pub fn digraph(&self) -> Result<DiGraph<NodeId, ()>, GraphError> {
        let dependencies = resolve_dependencies(&self.nodes)?;
        let mut graph = DiGraph::with_capacity(self.nodes.len(), self.nodes.len());
        let indices: Vec<NodeIndex> = self
            .nodes
            .iter()
            .map(|n| graph.add_node(n.id.clone()))
            .collect();
        for (i, deps) in dependencies.iter().enumerate() {
            for &d in deps {
                graph.add_edge(indices[d], indices[i], ());
            }
        }
        Ok(graph)
    }

    /// Nodes with no dependencies
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.depends_on.is_empty())
            .map(|n| n.id.clone())
            .collect()
    }

    /// Nodes nothing depends on
    pub fn exit_nodes(&self) -> Result<Vec<NodeId>, GraphError> {
        let graph = self.digraph()?;
        Ok(graph
            .node_indices()
            .filter(|&i| graph.neighbors_directed(i, Direction::Outgoing).next().is_none())
            .map(|i| graph[i].clone())
            .collect())
    }

    /// Longest path through the plan, weighted by estimated minutes
    pub fn critical_path_minutes(&self) -> Result<u64, GraphError> {
        let graph = self.digraph()?;
        let order = toposort(&graph, None).map_err(|cycle| GraphError::CycleDetected {
            nodes: vec![graph[cycle.node_id()].clone()],
        })?;

        let estimates: HashMap<&NodeId, u64> = self
            .nodes
            .iter()
            .map(|n| (&n.id, u64::from(n.play.estimated_minutes)))
            .collect();

        let mut finish: HashMap<NodeIndex, u64> = HashMap::with_capacity(order.len());
        let mut longest = 0;
        for idx in order {
            let start = graph
                .neighbors_directed(idx, Direction::Incoming)
                .filter_map(|p| finish.get(&p).copied())
                .max()
                .unwrap_or(0);
            let end = start + estimates.get(&graph[idx]).copied().unwrap_or(0);
            longest = longest.max(end);
            finish.insert(idx, end);
        }
        Ok(longest)
    }
}

fn fingerprint(nodes: &[PlanNode]) -> String {
    let mut hasher = Sha256::new();
    for node in nodes {
        hasher.update(node.id.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(node.play.kind.as_bytes());
        hasher.update([0]);
        if let Some(command) = &node.play.command {
            hasher.update(command.as_bytes());
        }
        hasher.update([0]);
        hasher.update(node.play.estimated_minutes.to_le_bytes());
        let mut deps: Vec<&str> = node.depends_on.iter().map(NodeId::as_str).collect();
        deps.sort_unstable();
        for dep in deps {
            hasher.update(dep.as_bytes());
            hasher.update([1]);
        }
        hasher.update([0xff]);
    }
    hex::encode(hasher.finalize())
}
