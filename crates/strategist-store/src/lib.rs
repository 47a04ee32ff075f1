pub mod metrics;
pub mod seed;
pub mod sqlite;

pub use metrics::{MetricsReader, NodeStats, StrategyMetrics};
pub use seed::{seed_store, SeedFile, SeedReport, StrategyDefinition};
pub use sqlite::SqliteStore;
