use std::sync::Arc;

use serde_json::json;

use strategist_core::traits::StrategyStore;
use strategist_core::types::{ExecutionStatus, NodeType, TriggerKind};
use strategist_engine::StrategyFlowEngine;
use strategist_store::{seed_store, MetricsReader, SeedFile, SqliteStore};
use strategist_test_utils::{RecordingNotifier, ScriptedFetcher, ScriptedLlm};

const SEED: &str = r#"
[[strategies]]
id = 1
name = "BTC watch"
schedule = "*/5 * * * *"

[[strategies.nodes]]
id = 1
name = "Price"
kind = "fetch"
url = "https://api.example.com/btc"
extract_path = "$.data.price"
parse_number = true
output_variable = "price"

[[strategies.nodes]]
id = 1
name = "High?"
kind = "condition"
left = "$price"
operator = ">"
right = "50000"
true_output = "highFlag"

[[strategies.nodes]]
id = 1
name = "Comment"
kind = "generate"
prompt = "Comment on a BTC price of {price}"
output_variable = "comment"

[[strategies.nodes]]
id = 2
name = "Alert"
kind = "notify"
message = "BTC {price}: {comment}"
guard_variable = "highFlag"
severity = "critical"

[[strategies.edges]]
source = "fetch_1"
target = "condition_1"

[[strategies.edges]]
source = "condition_1"
source_handle = "true"
target = "generate_1"

[[strategies.edges]]
source = "generate_1"
target = "notify_2"
"#;

fn write_seed(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("strategies.toml");
    std::fs::write(&path, SEED).expect("write seed");
    path
}

#[tokio::test]
async fn seeded_strategy_runs_against_sqlite() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(SqliteStore::open(&dir.path().join("strategist.db")).expect("open db"));

    let seed = SeedFile::load(&write_seed(&dir)).expect("load seed");
    let report = seed_store(store.as_ref(), &seed).await.expect("seed");
    assert_eq!((report.strategies, report.nodes, report.edges), (1, 4, 3));

    let notifier = Arc::new(RecordingNotifier::new());
    let engine = StrategyFlowEngine::new(
        store.clone(),
        Arc::new(ScriptedFetcher::new().respond(
            "https://api.example.com/btc",
            200,
            json!({ "data": { "price": "61000" } }),
        )),
        Arc::new(ScriptedLlm::replying("steady climb")),
        notifier.clone(),
    );

    let (execution, outcome) = engine.execute(1, TriggerKind::Manual).await.expect("execute");
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(execution.status, ExecutionStatus::Success);
    assert_eq!(notifier.sent()[0].text, "BTC 61000: steady climb");

    let logs = store.list_logs(execution.id).await.expect("logs");
    let kinds: Vec<NodeType> = logs.iter().map(|l| l.node_type).collect();
    assert_eq!(
        kinds,
        vec![NodeType::Fetch, NodeType::Condition, NodeType::Generate, NodeType::Notify]
    );

    let metrics = MetricsReader::new(store.clone())
        .strategy_metrics(1)
        .await
        .expect("metrics");
    assert_eq!(metrics.total_runs, 1);
    assert_eq!(metrics.success_rate, 1.0);
    assert_eq!(metrics.node_stats.len(), 4);
}

#[tokio::test]
async fn reseeding_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::open(&dir.path().join("strategist.db")).expect("open db");
    let seed = SeedFile::load(&write_seed(&dir)).expect("load seed");

    seed_store(&store, &seed).await.expect("first seed");
    let second = seed_store(&store, &seed).await.expect("second seed");

    assert_eq!((second.strategies, second.nodes, second.edges), (0, 0, 0));
    assert_eq!(store.list_nodes(1).await.expect("nodes").len(), 4);
    assert_eq!(store.list_edges(1).await.expect("edges").len(), 3);
}
