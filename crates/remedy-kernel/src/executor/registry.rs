use super::{StepContext, StepExecutor};
use crate::error::StepError;
use crate::types::PlanNode;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Routes each node to the executor registered for its play kind
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn StepExecutor>>,
    fallback: Option<Arc<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor for a play kind, replacing any previous one
    #[must_use]
    pub fn with(mut self, kind: impl Into<String>, executor: Arc<dyn StepExecutor>) -> Self {
        self.register(kind, executor);
        self
    }

    /// Executor used when no kind matches
    #[must_use]
    pub fn with_fallback(mut self, executor: Arc<dyn StepExecutor>) -> Self {
        self.fallback = Some(executor);
        self
    }

    /// Register an executor for a play kind
    pub fn register(&mut self, kind: impl Into<String>, executor: Arc<dyn StepExecutor>) {
        let kind = kind.into();
        tracing::debug!(kind = %kind, "step executor registered");
        self.executors.insert(kind, executor);
    }

    /// Whether a play kind can be dispatched
    #[must_use]
    pub fn handles(&self, kind: &str) -> bool {
        self.fallback.is_some() || self.executors.contains_key(kind)
    }

    /// Registered kinds, sorted
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

#[async_trait::async_trait]
impl StepExecutor for ExecutorRegistry {
    async fn execute(
        &self,
        node: &PlanNode,
        ctx: &StepContext,
    ) -> Result<serde_json::Value, StepError> {
        let executor = self
            .executors
            .get(&node.play.kind)
            .or(self.fallback.as_ref())
            .ok_or_else(|| StepError::UnknownPlay(node.play.kind.clone()))?;
        executor.execute(node, ctx).await
    }
}

/// Fails a step whose inner executor does not finish in time
pub struct TimeoutExecutor {
    inner: Arc<dyn StepExecutor>,
    limit: Duration,
}

impl TimeoutExecutor {
    /// Wrap an executor
    #[must_use]
    pub fn new(inner: Arc<dyn StepExecutor>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    /// Wrap an executor with a limit in seconds
    #[must_use]
    pub fn from_secs(inner: Arc<dyn StepExecutor>, secs: u64) -> Self {
        Self::new(inner, Duration::from_secs(secs))
    }
}

#[async_trait::async_trait]
impl StepExecutor for TimeoutExecutor {
    async fn execute(
        &self,
        node: &PlanNode,
        ctx: &StepContext,
    ) -> Result<serde_json::Value, StepError> {
        match tokio::time::timeout(self.limit, self.inner.execute(node, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(StepError::TimedOut {
                secs: self.limit.as_secs(),
            }),
        }
    }
}

/// Reports what would run without doing anything
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunExecutor;

#[async_trait::async_trait]
impl StepExecutor for DryRunExecutor {
    async fn execute(
        &self,
        node: &PlanNode,
        ctx: &StepContext,
    ) -> Result<serde_json::Value, StepError> {
        tracing::info!(node = %node.id, kind = %node.play.kind, batch = ctx.batch, "dry run");
        Ok(json!({
            "dryRun": true,
            "kind": node.play.kind,
            "command": node.play.command,
            "batch": ctx.batch,
        }))
    }
}
