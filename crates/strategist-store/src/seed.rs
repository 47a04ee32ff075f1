use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use strategist_core::error::{Result, StrategistError};
use strategist_core::traits::StrategyStore;
use strategist_core::types::{Edge, Node, Strategy};

/// A strategy together with its graph, as written in a definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyDefinition {
    #[serde(flatten)]
    pub strategy: Strategy,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Contents of a seed file (`.toml` or `.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub strategies: Vec<StrategyDefinition>,
}

impl SeedFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| StrategistError::ConfigNotFound(path.display().to_string()))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => toml::from_str(&content).map_err(|e| StrategistError::Config(e.to_string())),
        }
    }
}

/// Rows written vs. rows that already existed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub strategies: usize,
    pub nodes: usize,
    pub edges: usize,
    pub skipped: usize,
}

/// Insert every definition, ignoring rows that already exist.
///
/// Running the same seed twice writes nothing the second time.
pub async fn seed_store(store: &dyn StrategyStore, seed: &SeedFile) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    for def in &seed.strategies {
        let strategy_id = def.strategy.id;

        if store.insert_strategy(&def.strategy).await? {
            report.strategies += 1;
        } else {
            report.skipped += 1;
        }

        for node in &def.nodes {
            let mut node = node.clone();
            node.strategy_id = strategy_id;
            if store.insert_node(&node).await? {
                report.nodes += 1;
            } else {
                report.skipped += 1;
            }
        }

        for edge in &def.edges {
            let mut edge = edge.clone();
            edge.strategy_id = strategy_id;
            if store.insert_edge(&edge).await? {
                report.edges += 1;
            } else {
                report.skipped += 1;
            }
        }

        info!(
            strategy_id,
            name = %def.strategy.name,
            nodes = def.nodes.len(),
            edges = def.edges.len(),
            "Seeded strategy"
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqliteStore;
    use strategist_core::types::{Handle, NodeSpec};

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
extract_path = "$.price"
parse_number = true
output_variable = "price"

[[strategies.nodes]]
id = 1
name = "High?"
kind = "condition"
left = "$price"
operator = ">"
right = "50000"

[[strategies.nodes]]
id = 2
name = "Alert"
kind = "notify"
message = "Price: {price}"
severity = "critical"

[[strategies.edges]]
source = "fetch_1"
target = "condition_1"

[[strategies.edges]]
source = "condition_1"
source_handle = "true"
target = "notify_2"
"#;

    #[test]
    fn test_parse_toml_definition() {
        let seed: SeedFile = toml::from_str(SEED).unwrap();
        let def = &seed.strategies[0];
        assert_eq!(def.strategy.name, "BTC watch");
        assert!(def.strategy.enabled);
        assert_eq!(def.nodes.len(), 3);
        assert!(matches!(def.nodes[2].spec, NodeSpec::Notify(_)));
        assert_eq!(def.edges[1].source_handle, Handle::True);
        assert_eq!(def.edges[0].source_handle, Handle::Default);
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        let seed: SeedFile = toml::from_str(SEED).unwrap();

        let first = seed_store(&store, &seed).await.unwrap();
        assert_eq!(first.strategies, 1);
        assert_eq!(first.nodes, 3);
        assert_eq!(first.edges, 2);
        assert_eq!(first.skipped, 0);

        let second = seed_store(&store, &seed).await.unwrap();
        assert_eq!(second.strategies + second.nodes + second.edges, 0);
        assert_eq!(second.skipped, 6);

        let nodes = store.list_nodes(1).await.unwrap();
        assert!(nodes.iter().all(|n| n.strategy_id == 1));
    }

    #[test]
    fn test_load_json_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(
            &path,
            r#"{"strategies":[{"id":4,"name":"Empty","enabled":false}]}"#,
        )
        .unwrap();

        let seed = SeedFile::load(&path).unwrap();
        assert_eq!(seed.strategies[0].strategy.id, 4);
        assert!(!seed.strategies[0].strategy.enabled);
        assert!(seed.strategies[0].nodes.is_empty());
    }
}
