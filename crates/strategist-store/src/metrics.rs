use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use strategist_core::error::{Result, StrategistError};
use strategist_core::traits::StrategyStore;
use strategist_core::types::{Execution, ExecutionStatus, NodeId, NodeType, StrategyId};

/// Per-node aggregate over the executions in the metrics window.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NodeStats {
    pub node_type: NodeType,
    pub node_id: NodeId,
    pub node_name: String,
    pub runs: usize,
    pub errors: usize,
    pub average_duration_ms: f64,
}

/// Read-only summary of a strategy's recent execution history.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyMetrics {
    pub strategy_id: StrategyId,
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    pub running: usize,
    /// Successes over finished runs; 0.0 when nothing has finished.
    pub success_rate: f64,
    pub average_duration_ms: Option<f64>,
    pub recent: Vec<Execution>,
    pub node_stats: Vec<NodeStats>,
}

/// Computes [`StrategyMetrics`] from stored executions and log entries.
pub struct MetricsReader {
    store: Arc<dyn StrategyStore>,
    window: usize,
}

impl MetricsReader {
    pub fn new(store: Arc<dyn StrategyStore>) -> Self {
        Self { store, window: 100 }
    }

    /// Number of most recent executions considered.
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    pub async fn strategy_metrics(&self, strategy_id: StrategyId) -> Result<StrategyMetrics> {
        if self.store.get_strategy(strategy_id).await?.is_none() {
            return Err(StrategistError::StrategyNotFound(strategy_id));
        }

        let executions = self.store.list_executions(strategy_id, self.window).await?;

        let successful_runs = count_status(&executions, ExecutionStatus::Success);
        let failed_runs = count_status(&executions, ExecutionStatus::Failed);
        let running = count_status(&executions, ExecutionStatus::Running);

        let finished = successful_runs + failed_runs;
        let success_rate = if finished == 0 {
            0.0
        } else {
            successful_runs as f64 / finished as f64
        };

        let durations: Vec<i64> = executions.iter().filter_map(|e| e.duration_ms()).collect();
        let average_duration_ms = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<i64>() as f64 / durations.len() as f64)
        };

        let node_stats = self.node_stats(&executions).await?;

        Ok(StrategyMetrics {
            strategy_id,
            total_runs: executions.len(),
            successful_runs,
            failed_runs,
            running,
            success_rate,
            average_duration_ms,
            recent: executions.into_iter().take(10).collect(),
            node_stats,
        })
    }

    /// Most recent executions first.
    pub async fn recent_executions(
        &self,
        strategy_id: StrategyId,
        limit: usize,
    ) -> Result<Vec<Execution>> {
        self.store.list_executions(strategy_id, limit).await
    }

    async fn node_stats(&self, executions: &[Execution]) -> Result<Vec<NodeStats>> {
        // (type, id) -> (name, runs, errors, total duration)
        let mut acc: BTreeMap<(NodeType, NodeId), (String, usize, usize, u64)> = BTreeMap::new();

        for execution in executions {
            for entry in self.store.list_logs(execution.id).await? {
                let slot = acc
                    .entry((entry.node_type, entry.node_id))
                    .or_insert_with(|| (entry.node_name.clone(), 0, 0, 0));
                slot.1 += 1;
                if entry.error.is_some() {
                    slot.2 += 1;
                }
                slot.3 += entry.duration_ms;
            }
        }

        Ok(acc
            .into_iter()
            .map(|((node_type, node_id), (node_name, runs, errors, total))| NodeStats {
                node_type,
                node_id,
                node_name,
                runs,
                errors,
                average_duration_ms: total as f64 / runs as f64,
            })
            .collect())
    }
}

fn count_status(executions: &[Execution], status: ExecutionStatus) -> usize {
    executions.iter().filter(|e| e.status == status).count()
}
