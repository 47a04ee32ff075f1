use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use strategist_core::traits::StrategyStore;
use strategist_core::types::ExecutionLogEntry;

/// Persists one audit record per executed node.
///
/// A failed write is logged and otherwise ignored; it never fails the run.
#[derive(Clone)]
pub struct LogSink {
    store: Arc<dyn StrategyStore>,
    max_payload_chars: usize,
}

impl LogSink {
    pub fn new(store: Arc<dyn StrategyStore>, max_payload_chars: usize) -> Self {
        Self {
            store,
            max_payload_chars,
        }
    }

    /// Truncate the entry's payloads, store it, and hand back what was stored.
    pub async fn record(&self, mut entry: ExecutionLogEntry) -> ExecutionLogEntry {
        entry.input = truncate_payload(entry.input, self.max_payload_chars);
        entry.output = truncate_payload(entry.output, self.max_payload_chars);

        if let Err(e) = self.store.append_log(&entry).await {
            warn!(
                execution_id = entry.execution_id,
                node_type = %entry.node_type,
                node_id = entry.node_id,
                error = %e,
                "Failed to persist execution log entry"
            );
        }
        entry
    }
}

/// Values whose JSON form exceeds `max_chars` become a truncated string.
pub fn truncate_payload(value: Value, max_chars: usize) -> Value {
    let s = value.to_string();
    if s.chars().count() <= max_chars {
        return value;
    }
    let cut: String = s.chars().take(max_chars).collect();
    Value::String(format!("{}...", cut))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use strategist_core::types::NodeType;
    use strategist_test_utils::MemoryStore;

    fn entry(output: Value) -> ExecutionLogEntry {
        ExecutionLogEntry {
            execution_id: 1,
            node_type: NodeType::Generate,
            node_id: 2,
            node_name: "Summarize".into(),
            input: json!({ "prompt": "hi" }),
            output,
            error: None,
            duration_ms: 5,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_small_payload_untouched() {
        assert_eq!(truncate_payload(json!({ "a": 1 }), 100), json!({ "a": 1 }));
    }

    #[test]
    fn test_large_payload_truncated() {
        let long = json!("ü".repeat(50));
        let truncated = truncate_payload(long, 10);
        let s = truncated.as_str().unwrap();
        assert!(s.ends_with("..."));
        assert_eq!(s.chars().count(), 13);
    }

    #[tokio::test]
    async fn test_record_persists_truncated_entry() {
        let store = Arc::new(MemoryStore::new());
        let sink = LogSink::new(store.clone(), 8);
        let stored = sink.record(entry(json!("a long model answer"))).await;

        assert!(stored.output.as_str().unwrap().ends_with("..."));
        assert_eq!(store.all_logs(), vec![stored]);
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::new());
        store.fail_log_writes(true);
        let sink = LogSink::new(store.clone(), 100);

        let stored = sink.record(entry(json!("ok"))).await;
        assert_eq!(stored.output, json!("ok"));
        assert!(store.all_logs().is_empty());
    }
}
