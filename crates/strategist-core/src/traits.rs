use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// Persisted store for strategies, their graphs, and execution history.
///
/// Insert methods have "insert, ignoring conflicts" semantics and return
/// whether a row was actually written, so seeding is idempotent.
pub trait StrategyStore: Send + Sync + 'static {
    fn get_strategy(&self, id: StrategyId) -> BoxFuture<'_, Result<Option<Strategy>>>;

    fn list_strategies(&self) -> BoxFuture<'_, Result<Vec<Strategy>>>;

    fn insert_strategy(&self, strategy: &Strategy) -> BoxFuture<'_, Result<bool>>;

    /// Delete a strategy together with its nodes and edges.
    fn delete_strategy(&self, id: StrategyId) -> BoxFuture<'_, Result<bool>>;

    /// Nodes of every kind, ordered by order index.
    fn list_nodes(&self, strategy_id: StrategyId) -> BoxFuture<'_, Result<Vec<Node>>>;

    fn insert_node(&self, node: &Node) -> BoxFuture<'_, Result<bool>>;

    fn list_edges(&self, strategy_id: StrategyId) -> BoxFuture<'_, Result<Vec<Edge>>>;

    fn insert_edge(&self, edge: &Edge) -> BoxFuture<'_, Result<bool>>;

    /// Create a new execution row in the `running` state.
    fn create_execution(
        &self,
        strategy_id: StrategyId,
        trigger: TriggerKind,
    ) -> BoxFuture<'_, Result<Execution>>;

    /// Move an execution to a terminal status.
    fn finish_execution(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> BoxFuture<'_, Result<()>>;

    fn get_execution(&self, id: ExecutionId) -> BoxFuture<'_, Result<Option<Execution>>>;

    /// Most recent first.
    fn list_executions(
        &self,
        strategy_id: StrategyId,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Execution>>>;

    fn append_log(&self, entry: &ExecutionLogEntry) -> BoxFuture<'_, Result<()>>;

    /// Log entries of one execution in insertion order.
    fn list_logs(&self, execution_id: ExecutionId) -> BoxFuture<'_, Result<Vec<ExecutionLogEntry>>>;
}

/// HTTP fetch collaborator. Transport failures are errors; HTTP error
/// statuses are returned as responses.
pub trait HttpFetcher: Send + Sync + 'static {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<FetchResponse>>;
}

/// Language-model collaborator.
pub trait LanguageModel: Send + Sync + 'static {
    fn generate(&self, request: GenerateRequest) -> BoxFuture<'_, Result<String>>;
}

/// Notification collaborator. Returns a delivery id.
pub trait Notifier: Send + Sync + 'static {
    /// Channel name (e.g., "telegram", "log").
    fn name(&self) -> &str;

    fn send(&self, notification: Notification) -> BoxFuture<'_, Result<String>>;
}
