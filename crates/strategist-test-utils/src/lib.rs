//! Shared test utilities for Strategist crates.
//!
//! In-memory implementations of the collaborator traits plus fixture
//! builders for strategies, nodes and edges.

pub mod fixtures;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;

use strategist_core::error::{Result, StrategistError};
use strategist_core::traits::{HttpFetcher, LanguageModel, Notifier, StrategyStore};
use strategist_core::types::*;

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    strategies: BTreeMap<StrategyId, Strategy>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    executions: Vec<Execution>,
    logs: Vec<ExecutionLogEntry>,
}

/// StrategyStore kept entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    next_execution: AtomicI64,
    next_edge: AtomicI64,
    fail_log_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a strategy with its graph in one call.
    pub fn with_strategy(self, strategy: Strategy, nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        self.add_strategy(strategy, nodes, edges);
        self
    }

    pub fn add_strategy(&self, strategy: Strategy, nodes: Vec<Node>, edges: Vec<Edge>) {
        let mut state = self.state.lock().unwrap();
        let id = strategy.id;
        state.strategies.insert(id, strategy);
        for mut node in nodes {
            node.strategy_id = id;
            state.nodes.push(node);
        }
        for mut edge in edges {
            edge.strategy_id = id;
            edge.id = self.next_edge.fetch_add(1, Ordering::SeqCst) + 1;
            state.edges.push(edge);
        }
    }

    /// Make every `append_log` call fail.
    pub fn fail_log_writes(&self, fail: bool) {
        self.fail_log_writes.store(fail, Ordering::SeqCst);
    }

    pub fn executions(&self) -> Vec<Execution> {
        self.state.lock().unwrap().executions.clone()
    }

    pub fn all_logs(&self) -> Vec<ExecutionLogEntry> {
        self.state.lock().unwrap().logs.clone()
    }
}

impl StrategyStore for MemoryStore {
    fn get_strategy(&self, id: StrategyId) -> BoxFuture<'_, Result<Option<Strategy>>> {
        Box::pin(async move { Ok(self.state.lock().unwrap().strategies.get(&id).cloned()) })
    }

    fn list_strategies(&self) -> BoxFuture<'_, Result<Vec<Strategy>>> {
        Box::pin(async move {
            Ok(self.state.lock().unwrap().strategies.values().cloned().collect())
        })
    }

    fn insert_strategy(&self, strategy: &Strategy) -> BoxFuture<'_, Result<bool>> {
        let strategy = strategy.clone();
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.strategies.contains_key(&strategy.id) {
                return Ok(false);
            }
            state.strategies.insert(strategy.id, strategy);
            Ok(true)
        })
    }

    fn delete_strategy(&self, id: StrategyId) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let existed = state.strategies.remove(&id).is_some();
            state.nodes.retain(|n| n.strategy_id != id);
            state.edges.retain(|e| e.strategy_id != id);
            Ok(existed)
        })
    }

    fn list_nodes(&self, strategy_id: StrategyId) -> BoxFuture<'_, Result<Vec<Node>>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            let mut nodes: Vec<Node> = state
                .nodes
                .iter()
                .filter(|n| n.strategy_id == strategy_id)
                .cloned()
                .collect();
            nodes.sort_by(|a, b| {
                (a.order_index, a.node_type(), a.id).cmp(&(b.order_index, b.node_type(), b.id))
            });
            Ok(nodes)
        })
    }

    fn insert_node(&self, node: &Node) -> BoxFuture<'_, Result<bool>> {
        let node = node.clone();
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state
                .nodes
                .iter()
                .any(|n| n.node_type() == node.node_type() && n.id == node.id)
            {
                return Ok(false);
            }
            state.nodes.push(node);
            Ok(true)
        })
    }

    fn list_edges(&self, strategy_id: StrategyId) -> BoxFuture<'_, Result<Vec<Edge>>> {
        Box::pin(async move {
            Ok(self
                .state
                .lock()
                .unwrap()
                .edges
                .iter()
                .filter(|e| e.strategy_id == strategy_id)
                .cloned()
                .collect())
        })
    }

    fn insert_edge(&self, edge: &Edge) -> BoxFuture<'_, Result<bool>> {
        let mut edge = edge.clone();
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.edges.iter().any(|e| {
                e.strategy_id == edge.strategy_id
                    && e.source == edge.source
                    && e.source_handle == edge.source_handle
                    && e.target == edge.target
            }) {
                return Ok(false);
            }
            edge.id = self.next_edge.fetch_add(1, Ordering::SeqCst) + 1;
            state.edges.push(edge);
            Ok(true)
        })
    }

    fn create_execution(
        &self,
        strategy_id: StrategyId,
        trigger: TriggerKind,
    ) -> BoxFuture<'_, Result<Execution>> {
        Box::pin(async move {
            let execution = Execution {
                id: self.next_execution.fetch_add(1, Ordering::SeqCst) + 1,
                strategy_id,
                started_at: Utc::now(),
                completed_at: None,
                status: ExecutionStatus::Running,
                error: None,
                trigger,
            };
            self.state.lock().unwrap().executions.push(execution.clone());
            Ok(execution)
        })
    }

    fn finish_execution(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if let Some(exec) = state
                .executions
                .iter_mut()
                .find(|e| e.id == id && e.status == ExecutionStatus::Running)
            {
                exec.status = status;
                exec.error = error;
                exec.completed_at = Some(Utc::now());
            }
            Ok(())
        })
    }

    fn get_execution(&self, id: ExecutionId) -> BoxFuture<'_, Result<Option<Execution>>> {
        Box::pin(async move {
            Ok(self
                .state
                .lock()
                .unwrap()
                .executions
                .iter()
                .find(|e| e.id == id)
                .cloned())
        })
    }

    fn list_executions(
        &self,
        strategy_id: StrategyId,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Execution>>> {
        Box::pin(async move {
            Ok(self
                .state
                .lock()
                .unwrap()
                .executions
                .iter()
                .rev()
                .filter(|e| e.strategy_id == strategy_id)
                .take(limit)
                .cloned()
                .collect())
        })
    }

    fn append_log(&self, entry: &ExecutionLogEntry) -> BoxFuture<'_, Result<()>> {
        let entry = entry.clone();
        Box::pin(async move {
            if self.fail_log_writes.load(Ordering::SeqCst) {
                return Err(StrategistError::Database("log table is read-only".into()));
            }
            self.state.lock().unwrap().logs.push(entry);
            Ok(())
        })
    }

    fn list_logs(&self, execution_id: ExecutionId) -> BoxFuture<'_, Result<Vec<ExecutionLogEntry>>> {
        Box::pin(async move {
            Ok(self
                .state
                .lock()
                .unwrap()
                .logs
                .iter()
                .filter(|l| l.execution_id == execution_id)
                .cloned()
                .collect())
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedFetcher
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum ScriptedResponse {
    Ok(FetchResponse),
    TransportError(String),
}

/// HttpFetcher that answers from a URL -> response table.
///
/// Every call records `"start:{url}"` and `"end:{url}"` into a shared
/// event log, which tests use to assert on concurrency.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, ScriptedResponse>>,
    delays: Mutex<HashMap<String, Duration>>,
    requests: Mutex<Vec<FetchRequest>>,
    events: Arc<Mutex<Vec<String>>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an event log with other mocks.
    pub fn with_event_log(mut self, events: Arc<Mutex<Vec<String>>>) -> Self {
        self.events = events;
        self
    }

    pub fn respond(self, url: &str, status: u16, body: serde_json::Value) -> Self {
        self.responses.lock().unwrap().insert(
            url.to_string(),
            ScriptedResponse::Ok(FetchResponse { status, body }),
        );
        self
    }

    pub fn fail(self, url: &str, message: &str) -> Self {
        self.responses.lock().unwrap().insert(
            url.to_string(),
            ScriptedResponse::TransportError(message.to_string()),
        );
        self
    }

    pub fn delay(self, url: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
        self
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl HttpFetcher for ScriptedFetcher {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<FetchResponse>> {
        Box::pin(async move {
            let url = request.url.clone();
            self.events.lock().unwrap().push(format!("start:{}", url));
            self.requests.lock().unwrap().push(request);

            let delay = self.delays.lock().unwrap().get(&url).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let scripted = self.responses.lock().unwrap().get(&url).cloned();
            self.events.lock().unwrap().push(format!("end:{}", url));

            match scripted {
                Some(ScriptedResponse::Ok(response)) => Ok(response),
                Some(ScriptedResponse::TransportError(msg)) => Err(StrategistError::Transport(msg)),
                None => Ok(FetchResponse {
                    status: 404,
                    body: serde_json::Value::String("not found".into()),
                }),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedLlm
// ---------------------------------------------------------------------------

/// LanguageModel that replays queued replies, then repeats a default.
pub struct ScriptedLlm {
    queue: Mutex<VecDeque<std::result::Result<String, String>>>,
    default_reply: std::result::Result<String, String>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedLlm {
    pub fn replying(text: &str) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default_reply: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default_reply: Err(message.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn then_reply(self, text: &str) -> Self {
        self.queue.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn then_fail(self, message: &str) -> Self {
        self.queue.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl LanguageModel for ScriptedLlm {
    fn generate(&self, request: GenerateRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            let reply = self
                .queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.default_reply.clone());
            reply.map_err(StrategistError::Llm)
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Notifier that records every notification it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.failing.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    fn send(&self, notification: Notification) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StrategistError::Notify {
                    channel: "recording".into(),
                    message: "chat not found".into(),
                });
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(notification);
            Ok(format!("msg-{}", sent.len()))
        })
    }
}
