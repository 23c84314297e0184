//! Kahn's algorithm over plan nodes
//!
//! The ready queue is a min-heap keyed by (declaration index, node id), so the
//! resulting order depends only on the input and never on hash iteration.

use crate::error::GraphError;
use crate::types::{NodeId, PlanNode};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Resolve every dependency to a node index.
///
/// Returns `dependencies[i]` = indices node `i` depends on (deduplicated, in
/// declaration order).
pub(crate) fn resolve_dependencies(nodes: &[PlanNode]) -> Result<Vec<Vec<usize>>, GraphError> {
    let mut index: HashMap<&NodeId, usize> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if index.insert(&node.id, i).is_some() {
            return Err(GraphError::DuplicateStep(node.id.clone()));
        }
    }

    let mut dependencies = Vec::with_capacity(nodes.len());
    for node in nodes {
        let mut deps: Vec<usize> = Vec::with_capacity(node.depends_on.len());
        for dep in &node.depends_on {
            if dep == &node.id {
                return Err(GraphError::CycleDetected {
                    nodes: vec![node.id.clone()],
                });
            }
            let Some(&j) = index.get(dep) else {
                return Err(GraphError::DanglingDependency {
                    node: node.id.clone(),
                    missing: dep.clone(),
                });
            };
            if !deps.contains(&j) {
                deps.push(j);
            }
        }
        dependencies.push(deps);
    }
    Ok(dependencies)
}

/// Kahn sweep returning node indices in topological order.
pub(crate) fn kahn(nodes: &[PlanNode], dependencies: &[Vec<usize>]) -> Result<Vec<usize>, GraphError> {
    let mut in_degree: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, deps) in dependencies.iter().enumerate() {
        for &d in deps {
            dependents[d].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<(usize, &NodeId)>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, deg)| **deg == 0)
        .map(|(i, _)| Reverse((i, &nodes[i].id)))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse((i, _))) = ready.pop() {
        order.push(i);
        for &next in &dependents[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse((next, &nodes[next].id)));
            }
        }
    }

    if order.len() != nodes.len() {
        let mut stuck: Vec<NodeId> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg > 0)
            .map(|(i, _)| nodes[i].id.clone())
            .collect();
        stuck.sort();
        return Err(GraphError::CycleDetected { nodes: stuck });
    }

    Ok(order)
}

/// Topological order of an arbitrary node list, as node ids.
pub fn topological_order_of(nodes: &[PlanNode]) -> Result<Vec<NodeId>, GraphError> {
    let dependencies = resolve_dependencies(nodes)?;
    let order = kahn(nodes, &dependencies)?;
    Ok(order.into_iter().map(|i| nodes[i].id.clone()).collect())
}
