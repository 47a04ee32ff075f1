use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StrategistError;

pub type StrategyId = i64;
pub type NodeId = i64;
pub type ExecutionId = i64;

/// Variable name -> value, as threaded between nodes of one run.
pub type VariableMap = HashMap<String, serde_json::Value>;

/// Source node identifier that seeds traversal when it has outgoing edges.
pub const START_NODE: &str = "start";
/// Terminal sentinel; never executed.
pub const END_NODE: &str = "end";

/// A named, optionally scheduled graph of nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Strategy {
    pub id: StrategyId,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cron expression (5 or 6 fields). `None` = manual only.
    #[serde(default)]
    pub schedule: Option<String>,
    /// Free-form metadata attached by whoever defines the trigger.
    #[serde(default)]
    pub trigger_meta: serde_json::Value,
}

fn default_true() -> bool {
    true
}

/// Discriminant of the five node variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Fetch,
    Generate,
    Condition,
    Trigger,
    Notify,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Generate => "generate",
            Self::Condition => "condition",
            Self::Trigger => "trigger",
            Self::Notify => "notify",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = StrategistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetch" => Ok(Self::Fetch),
            "generate" => Ok(Self::Generate),
            "condition" => Ok(Self::Condition),
            "trigger" => Ok(Self::Trigger),
            "notify" => Ok(Self::Notify),
            other => Err(StrategistError::Config(format!("Unknown node type: {}", other))),
        }
    }
}

/// One step of a strategy. Common fields live here; the per-kind
/// configuration lives in [`NodeSpec`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    #[serde(default)]
    pub strategy_id: StrategyId,
    pub name: String,
    #[serde(default)]
    pub order_index: i64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub spec: NodeSpec,
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        self.spec.node_type()
    }

    /// Graph key used by edges: `"{kind}_{id}"`.
    pub fn key(&self) -> String {
        node_key(self.node_type(), self.id)
    }
}

pub fn node_key(node_type: NodeType, id: NodeId) -> String {
    format!("{}_{}", node_type.as_str(), id)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeSpec {
    Fetch(FetchNode),
    Generate(GenerateNode),
    Condition(ConditionNode),
    Trigger(TriggerNode),
    Notify(NotifyNode),
}

impl NodeSpec {
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Fetch(_) => NodeType::Fetch,
            Self::Generate(_) => NodeType::Generate,
            Self::Condition(_) => NodeType::Condition,
            Self::Trigger(_) => NodeType::Trigger,
            Self::Notify(_) => NodeType::Notify,
        }
    }
}

/// HTTP request whose (extracted) response becomes a variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchNode {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// JSON object template, e.g. `{"Authorization": "Bearer {token}"}`.
    #[serde(default)]
    pub headers: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    /// JSONPath-style expression, e.g. `$.data[0].price`.
    #[serde(default)]
    pub extract_path: Option<String>,
    #[serde(default)]
    pub parse_number: bool,
    pub output_variable: String,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    #[default]
    Cheap,
    Deep,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cheap => "cheap",
            Self::Deep => "deep",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language-model call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateNode {
    #[serde(default)]
    pub tier: ModelTier,
    #[serde(default)]
    pub system_prompt: Option<String>,
    pub prompt: String,
    /// Prepend a dump of every defined variable to the prompt.
    #[serde(default)]
    pub include_variables: bool,
    pub output_variable: String,
}

/// Typed comparison; branches the graph via the `true`/`false` handles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionNode {
    pub left: String,
    /// Kept as text so that an unknown operator is a soft evaluation
    /// failure rather than a load failure.
    pub operator: String,
    pub right: String,
    #[serde(default)]
    pub true_output: Option<String>,
    #[serde(default)]
    pub false_output: Option<String>,
}

/// Starts a run of another strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerNode {
    pub target_strategy_id: StrategyId,
    #[serde(default)]
    pub guard_variable: Option<String>,
    #[serde(default)]
    pub forward_variables: Vec<String>,
    #[serde(default)]
    pub wait_for_completion: bool,
    #[serde(default)]
    pub output_variable: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Plain,
    Markdown,
    Html,
}

/// Message to the notification channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotifyNode {
    /// Destination chat; `None` uses the channel's configured default.
    #[serde(default)]
    pub chat_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub include_variables: bool,
    #[serde(default)]
    pub guard_variable: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub render_mode: RenderMode,
}

/// Named exit of a node that edges attach to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handle {
    #[default]
    Default,
    True,
    False,
    Start,
}

impl Handle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::True => "true",
            Self::False => "false",
            Self::Start => "start",
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Handle {
    type Err = StrategistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" | "" => Ok(Self::Default),
            "true" => Ok(Self::True),
            "false" => Ok(Self::False),
            "start" => Ok(Self::Start),
            other => Err(StrategistError::Config(format!("Unknown handle: {}", other))),
        }
    }
}

/// Directed link from a node's handle to a target node.
///
/// `source` and `target` are node keys (`"fetch_1"`) or the
/// [`START_NODE`]/[`END_NODE`] sentinels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub strategy_id: StrategyId,
    pub source: String,
    #[serde(default)]
    pub source_handle: Handle,
    pub target: String,
}

impl Edge {
    pub fn new(source: impl Into<String>, handle: Handle, target: impl Into<String>) -> Self {
        Self {
            id: 0,
            strategy_id: 0,
            source: source.into(),
            source_handle: handle,
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = StrategistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(StrategistError::Database(format!(
                "Unknown execution status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Scheduled,
    Manual,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for TriggerKind {
    type Err = StrategistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "manual" => Ok(Self::Manual),
            other => Err(StrategistError::Database(format!(
                "Unknown trigger kind: {}",
                other
            ))),
        }
    }
}

/// One run of a strategy. Created `running`, updated once to a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Execution {
    pub id: ExecutionId,
    pub strategy_id: StrategyId,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    pub trigger: TriggerKind,
}

impl Execution {
    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|done| (done - self.started_at).num_milliseconds())
    }
}

/// Audit record for one executed node. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionLogEntry {
    pub execution_id: ExecutionId,
    pub node_type: NodeType,
    pub node_id: NodeId,
    pub node_name: String,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Request handed to the HTTP fetch collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Response from the HTTP fetch collaborator. Non-JSON bodies arrive as
/// a JSON string.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Request handed to the language-model collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub tier: ModelTier,
    pub system_prompt: Option<String>,
}

/// Outgoing notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub chat_id: Option<String>,
    pub text: String,
    pub severity: Severity,
    pub render_mode: RenderMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_key_format() {
        let node = Node {
            id: 7,
            strategy_id: 1,
            name: "Price".into(),
            order_index: 0,
            enabled: true,
            spec: NodeSpec::Fetch(FetchNode {
                url: "https://example.com".into(),
                method: default_method(),
                headers: None,
                body: None,
                extract_path: None,
                parse_number: false,
                output_variable: "price".into(),
            }),
        };
        assert_eq!(node.key(), "fetch_7");
        assert_eq!(node.node_type(), NodeType::Fetch);
    }

    #[test]
    fn test_node_deserializes_flat_kind() {
        let json = serde_json::json!({
            "id": 3,
            "name": "Check",
            "kind": "condition",
            "left": "$price",
            "operator": ">",
            "right": "50000",
            "true_output": "high"
        });
        let node: Node = serde_json::from_value(json).unwrap();
        assert!(node.enabled);
        assert_eq!(node.order_index, 0);
        match node.spec {
            NodeSpec::Condition(c) => {
                assert_eq!(c.operator, ">");
                assert_eq!(c.true_output.as_deref(), Some("high"));
                assert!(c.false_output.is_none());
            }
            other => panic!("unexpected spec: {:?}", other),
        }
    }

    #[test]
    fn test_handle_parsing() {
        assert_eq!("true".parse::<Handle>().unwrap(), Handle::True);
        assert_eq!("".parse::<Handle>().unwrap(), Handle::Default);
        assert!("sideways".parse::<Handle>().is_err());
    }

    #[test]
    fn test_fetch_response_success_range() {
        let ok = FetchResponse { status: 204, body: serde_json::Value::Null };
        let bad = FetchResponse { status: 302, body: serde_json::Value::Null };
        assert!(ok.is_success());
        assert!(!bad.is_success());
    }
}
