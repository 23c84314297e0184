//! Scheduler Module
//!
//! Partitions a plan's topological order into concurrency-bounded batches.
//! The scheduler makes no policy decisions; it only decides which nodes may
//! run side by side.

use crate::construction::Plan;
use crate::error::GraphError;
use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A set of nodes whose dependencies all live in earlier batches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub index: usize,
    pub nodes: Vec<NodeId>,
}

impl Batch {
    /// Number of nodes in the batch
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the batch is empty (never true for scheduler output)
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Concurrency-bounded batch scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchScheduler {
    max_concurrency: usize,
}

impl BatchScheduler {
    /// Create a scheduler. A limit of 0 is normalized to 1 (fully serial).
    #[must_use]
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Effective batch size limit
    #[inline]
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Partition a plan into ordered batches.
    ///
    /// Repeatedly scans the remaining topological order, taking up to
    /// `max_concurrency` nodes whose dependencies were all assigned to a
    /// previously closed batch.
    pub fn partition(&self, plan: &Plan) -> Result<Vec<Batch>, GraphError> {
        let order = plan.topological_order()?;
        let dependencies: HashMap<&NodeId, &[NodeId]> = plan
            .nodes()
            .iter()
            .map(|n| (&n.id, n.depends_on.as_slice()))
            .collect();

        let mut closed: HashSet<NodeId> = HashSet::with_capacity(order.len());
        let mut remaining = order;
        let mut batches = Vec::new();

        while !remaining.is_empty() {
            let mut current: Vec<NodeId> = Vec::with_capacity(self.max_concurrency);
            for node in &remaining {
                if current.len() == self.max_concurrency {
                    break;
                }
                let ready = dependencies
                    .get(node)
                    .map_or(true, |deps| deps.iter().all(|d| closed.contains(d)));
                if ready {
                    current.push(node.clone());
                }
            }

            // the first remaining node is always ready, so each pass makes progress
            debug_assert!(!current.is_empty());

            remaining.retain(|n| !current.contains(n));
            closed.extend(current.iter().cloned());
            batches.push(Batch {
                index: batches.len(),
                nodes: current,
            });
        }

        tracing::debug!(
            plan = %plan.id(),
            batches = batches.len(),
            max_concurrency = self.max_concurrency,
            "plan partitioned"
        );

        Ok(batches)
    }
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Map each node to the index of the batch containing it
#[must_use]
pub fn batch_index(batches: &[Batch]) -> HashMap<NodeId, usize> {
    batches
        .iter()
        .flat_map(|b| b.nodes.iter().map(move |n| (n.clone(), b.index)))
        .collect()
}
