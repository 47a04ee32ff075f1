use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use strategist_core::config::EngineConfig;
use strategist_core::error::{Result, StrategistError};
use strategist_core::event::{EngineEvent, EventBus};
use strategist_core::traits::{HttpFetcher, LanguageModel, Notifier, StrategyStore};
use strategist_core::types::{
    Edge, Execution, ExecutionId, ExecutionLogEntry, ExecutionStatus, Node, NodeType, StrategyId,
    TriggerKind, VariableMap,
};

use crate::executors::{self, NodeOutput};
use crate::graph::FlowGraph;
use crate::legacy::order_groups;
use crate::log_sink::LogSink;
use crate::variables::VariableEnv;

/// Result of one strategy run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunOutcome {
    pub success: bool,
    pub variables: VariableMap,
    pub logs: Vec<ExecutionLogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunOutcome {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Executes strategies against the store and the outside-world collaborators.
///
/// Cheap to clone; every clone shares the same collaborators and event bus.
#[derive(Clone)]
pub struct StrategyFlowEngine {
    store: Arc<dyn StrategyStore>,
    fetcher: Arc<dyn HttpFetcher>,
    llm: Arc<dyn LanguageModel>,
    notifier: Arc<dyn Notifier>,
    events: Arc<EventBus>,
    settings: Arc<EngineConfig>,
    sink: LogSink,
}

impl StrategyFlowEngine {
    pub fn new(
        store: Arc<dyn StrategyStore>,
        fetcher: Arc<dyn HttpFetcher>,
        llm: Arc<dyn LanguageModel>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let settings = EngineConfig::default();
        let sink = LogSink::new(store.clone(), settings.max_log_payload_chars);
        Self {
            store,
            fetcher,
            llm,
            notifier,
            events: Arc::new(EventBus::default()),
            settings: Arc::new(settings),
            sink,
        }
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_settings(mut self, settings: EngineConfig) -> Self {
        self.sink = LogSink::new(self.store.clone(), settings.max_log_payload_chars);
        self.settings = Arc::new(settings);
        self
    }

    pub fn store(&self) -> &dyn StrategyStore {
        self.store.as_ref()
    }

    pub fn fetcher(&self) -> &dyn HttpFetcher {
        self.fetcher.as_ref()
    }

    pub fn language_model(&self) -> &dyn LanguageModel {
        self.llm.as_ref()
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub fn settings(&self) -> &EngineConfig {
        &self.settings
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Run a strategy with an empty environment.
    pub fn run(
        &self,
        strategy_id: StrategyId,
        execution_id: ExecutionId,
    ) -> BoxFuture<'_, RunOutcome> {
        self.run_with_variables(strategy_id, execution_id, VariableEnv::new())
    }

    /// Run a strategy starting from `variables`.
    ///
    /// Boxed because trigger nodes re-enter it for the target strategy.
    pub fn run_with_variables(
        &self,
        strategy_id: StrategyId,
        execution_id: ExecutionId,
        variables: VariableEnv,
    ) -> BoxFuture<'_, RunOutcome> {
        Box::pin(async move {
            info!(strategy_id, execution_id, "Strategy run started");
            self.events.publish(EngineEvent::RunStarted {
                strategy_id,
                execution_id,
            });

            let outcome = match self.load(strategy_id).await {
                Ok((nodes, edges)) if edges.is_empty() => {
                    debug!(strategy_id, "No edges, running by order index");
                    self.run_legacy(nodes, execution_id, variables).await
                }
                Ok((nodes, edges)) => self.run_graph(nodes, &edges, execution_id, variables).await,
                Err(e) => RunOutcome::failed(e.to_string()),
            };

            if outcome.success {
                info!(strategy_id, execution_id, nodes = outcome.logs.len(), "Strategy run succeeded");
            } else {
                error!(
                    strategy_id,
                    execution_id,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "Strategy run failed"
                );
            }
            self.events.publish(EngineEvent::RunFinished {
                strategy_id,
                execution_id,
                success: outcome.success,
                error: outcome.error.clone(),
            });
            outcome
        })
    }

    /// Create an execution row, run the strategy and finalize the row.
    pub async fn execute(
        &self,
        strategy_id: StrategyId,
        trigger: TriggerKind,
    ) -> Result<(Execution, RunOutcome)> {
        let execution = self.store.create_execution(strategy_id, trigger).await?;
        let outcome = self.run(strategy_id, execution.id).await;
        self.finish_execution(execution.id, &outcome).await;

        let execution = self
            .store
            .get_execution(execution.id)
            .await?
            .unwrap_or(execution);
        Ok((execution, outcome))
    }

    /// Move an execution row to the terminal status matching `outcome`.
    pub async fn finish_execution(&self, execution_id: ExecutionId, outcome: &RunOutcome) {
        let (status, error) = if outcome.success {
            (ExecutionStatus::Success, None)
        } else {
            (ExecutionStatus::Failed, outcome.error.clone())
        };
        if let Err(e) = self.store.finish_execution(execution_id, status, error).await {
            warn!(execution_id, error = %e, "Failed to finalize execution");
        }
    }

    async fn load(&self, strategy_id: StrategyId) -> Result<(Vec<Node>, Vec<Edge>)> {
        if self.store.get_strategy(strategy_id).await?.is_none() {
            return Err(StrategistError::StrategyNotFound(strategy_id));
        }
        let nodes = self.store.list_nodes(strategy_id).await?;
        let edges = self.store.list_edges(strategy_id).await?;
        Ok((nodes, edges))
    }

    async fn run_graph(
        &self,
        nodes: Vec<Node>,
        edges: &[Edge],
        execution_id: ExecutionId,
        mut env: VariableEnv,
    ) -> RunOutcome {
        let graph = FlowGraph::build(nodes, edges);
        let mut queue: VecDeque<String> = graph.start_keys().iter().cloned().collect();
        let mut executed: HashSet<String> = HashSet::new();
        let mut logs = Vec::new();

        while let Some(key) = queue.pop_front() {
            if FlowGraph::is_sentinel(&key) || executed.contains(&key) {
                continue;
            }
            let Some(node) = graph.node(&key) else {
                debug!(node = %key, "Edge target is disabled or missing, skipping");
                continue;
            };
            executed.insert(key.clone());

            let (entry, result) = self.execute_node(node, &env, execution_id).await;
            logs.push(entry);

            match result {
                Ok(out) => {
                    out.apply(&mut env);
                    for next in graph.next(&key, out.branch) {
                        if !executed.contains(next) {
                            debug!(from = %key, to = %next, handle = %out.branch, "Enqueue");
                            queue.push_back(next.clone());
                        }
                    }
                }
                Err(e) => return abort(node, e, env, logs),
            }
        }

        RunOutcome {
            success: true,
            variables: env.into_map(),
            logs,
            error: None,
        }
    }

    async fn run_legacy(
        &self,
        nodes: Vec<Node>,
        execution_id: ExecutionId,
        mut env: VariableEnv,
    ) -> RunOutcome {
        let mut logs = Vec::new();

        for (index, group) in order_groups(nodes) {
            debug!(order_index = index, size = group.len(), "Running order group");
            let snapshot = &env.clone();
            let mut pending: FuturesUnordered<_> = group
                .iter()
                .map(|node| async move {
                    let (entry, result) = self.execute_node(node, snapshot, execution_id).await;
                    (node, entry, result)
                })
                .collect();

            // Every member settles; the earliest failure to complete becomes the run error
            let mut failure = None;
            while let Some((node, entry, result)) = pending.next().await {
                logs.push(entry);
                match result {
                    Ok(out) => out.apply(&mut env),
                    Err(e) => {
                        if failure.is_none() {
                            failure = Some((node, e));
                        }
                    }
                }
            }
            if let Some((node, e)) = failure {
                return abort(node, e, env, logs);
            }
        }

        RunOutcome {
            success: true,
            variables: env.into_map(),
            logs,
            error: None,
        }
    }

    /// Execute one node and persist its log entry.
    async fn execute_node(
        &self,
        node: &Node,
        env: &VariableEnv,
        execution_id: ExecutionId,
    ) -> (ExecutionLogEntry, Result<NodeOutput>) {
        let node_type = node.node_type();
        self.events.publish(EngineEvent::NodeStarted {
            execution_id,
            node_type,
            node_id: node.id,
        });
        debug!(execution_id, node = %node.key(), name = %node.name, "Executing node");

        let started = Instant::now();
        let result = executors::dispatch(self, node, env).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let entry = match &result {
            Ok(out) => {
                self.events.publish(EngineEvent::NodeCompleted {
                    execution_id,
                    node_type,
                    node_id: node.id,
                    duration_ms,
                });
                if let Some(soft) = &out.soft_error {
                    warn!(node = %node.key(), error = %soft, "Node recovered from failure");
                }
                log_entry(
                    execution_id,
                    node,
                    node_type,
                    out.input.clone(),
                    out.output.clone(),
                    out.soft_error.clone(),
                    duration_ms,
                )
            }
            Err(e) => {
                error!(node = %node.key(), name = %node.name, error = %e, "Node failed");
                self.events.publish(EngineEvent::NodeFailed {
                    execution_id,
                    node_type,
                    node_id: node.id,
                    error: e.to_string(),
                });
                log_entry(
                    execution_id,
                    node,
                    node_type,
                    serde_json::to_value(&node.spec).unwrap_or_default(),
                    serde_json::Value::Null,
                    Some(e.to_string()),
                    duration_ms,
                )
            }
        };

        (self.sink.record(entry).await, result)
    }
}

fn log_entry(
    execution_id: ExecutionId,
    node: &Node,
    node_type: NodeType,
    input: serde_json::Value,
    output: serde_json::Value,
    error: Option<String>,
    duration_ms: u64,
) -> ExecutionLogEntry {
    ExecutionLogEntry {
        execution_id,
        node_type,
        node_id: node.id,
        node_name: node.name.clone(),
        input,
        output,
        error,
        duration_ms,
        created_at: Utc::now(),
    }
}

fn abort(
    node: &Node,
    e: StrategistError,
    env: VariableEnv,
    logs: Vec<ExecutionLogEntry>,
) -> RunOutcome {
    let error = StrategistError::NodeFailed {
        node: node.name.clone(),
        message: e.to_string(),
    };
    RunOutcome {
        success: false,
        variables: env.into_map(),
        logs,
        error: Some(error.to_string()),
    }
}
