use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use strategist_core::error::{Result, StrategistError};
use strategist_core::traits::StrategyStore;
use strategist_core::types::*;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS strategies (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 1,
        schedule TEXT,
        trigger_meta TEXT NOT NULL DEFAULT 'null'
    );

    CREATE TABLE IF NOT EXISTS nodes (
        kind TEXT NOT NULL,
        id INTEGER NOT NULL,
        strategy_id INTEGER NOT NULL REFERENCES strategies(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        order_index INTEGER NOT NULL DEFAULT 0,
        enabled INTEGER NOT NULL DEFAULT 1,
        config TEXT NOT NULL,
        PRIMARY KEY (kind, id)
    );

    CREATE INDEX IF NOT EXISTS idx_nodes_strategy
        ON nodes(strategy_id, order_index);

    CREATE TABLE IF NOT EXISTS edges (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        strategy_id INTEGER NOT NULL REFERENCES strategies(id) ON DELETE CASCADE,
        source TEXT NOT NULL,
        source_handle TEXT NOT NULL DEFAULT 'default',
        target TEXT NOT NULL,
        UNIQUE (strategy_id, source, source_handle, target)
    );

    CREATE TABLE IF NOT EXISTS executions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        strategy_id INTEGER NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        status TEXT NOT NULL,
        error TEXT,
        trigger TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_executions_strategy
        ON executions(strategy_id, id DESC);

    CREATE TABLE IF NOT EXISTS execution_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        execution_id INTEGER NOT NULL,
        node_type TEXT NOT NULL,
        node_id INTEGER NOT NULL,
        node_name TEXT NOT NULL,
        input TEXT NOT NULL,
        output TEXT NOT NULL,
        error TEXT,
        duration_ms INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_logs_execution
        ON execution_logs(execution_id, id);";

/// SQLite-backed strategy store.
///
/// Every statement runs on its own; nothing spans a whole run, so log
/// entries become durable as each node completes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn db(e: impl std::fmt::Display) -> StrategistError {
    StrategistError::Database(e.to_string())
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| db(format!("Failed to create db directory: {}", e)))?;
        }

        let conn = Connection::open(path).map_err(db)?;

        // WAL lets the scheduler and manual runs write concurrently
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db)?;

        let store = Self::with_connection(conn)?;
        debug!(path = %path.display(), "SQLite store opened");
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;").map_err(db)?;
        conn.execute_batch(SCHEMA).map_err(db)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(db)
    }
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_json(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or(serde_json::Value::String(raw.to_string()))
}

fn strategy_from_row(row: &Row<'_>) -> rusqlite::Result<Strategy> {
    let meta: String = row.get(4)?;
    Ok(Strategy {
        id: row.get(0)?,
        name: row.get(1)?,
        enabled: row.get(2)?,
        schedule: row.get(3)?,
        trigger_meta: parse_json(&meta),
    })
}

type ExecutionRow = (i64, i64, String, Option<String>, String, Option<String>, String);

fn execution_row(row: &Row<'_>) -> rusqlite::Result<ExecutionRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn execution_from_row(raw: ExecutionRow) -> Result<Execution> {
    let (id, strategy_id, started_at, completed_at, status, error, trigger) = raw;
    Ok(Execution {
        id,
        strategy_id,
        started_at: parse_ts(&started_at),
        completed_at: completed_at.as_deref().map(parse_ts),
        status: status.parse()?,
        error,
        trigger: trigger.parse()?,
    })
}

const EXECUTION_COLUMNS: &str =
    "id, strategy_id, started_at, completed_at, status, error, trigger";

impl StrategyStore for SqliteStore {
    fn get_strategy(&self, id: StrategyId) -> BoxFuture<'_, Result<Option<Strategy>>> {
        Box::pin(async move {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT id, name, enabled, schedule, trigger_meta FROM strategies WHERE id = ?1",
                params![id],
                strategy_from_row,
            )
            .optional()
            .map_err(db)
        })
    }

    fn list_strategies(&self) -> BoxFuture<'_, Result<Vec<Strategy>>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare("SELECT id, name, enabled, schedule, trigger_meta FROM strategies ORDER BY id")
                .map_err(db)?;
            let rows = stmt.query_map([], strategy_from_row).map_err(db)?;

            let mut strategies = Vec::new();
            for row in rows {
                strategies.push(row.map_err(db)?);
            }
            Ok(strategies)
        })
    }

    fn insert_strategy(&self, strategy: &Strategy) -> BoxFuture<'_, Result<bool>> {
        let strategy = strategy.clone();
        Box::pin(async move {
            let conn = self.lock()?;
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO strategies (id, name, enabled, schedule, trigger_meta)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        strategy.id,
                        strategy.name,
                        strategy.enabled,
                        strategy.schedule,
                        strategy.trigger_meta.to_string(),
                    ],
                )
                .map_err(db)?;
            Ok(inserted > 0)
        })
    }

    fn delete_strategy(&self, id: StrategyId) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let deleted = conn
                .execute("DELETE FROM strategies WHERE id = ?1", params![id])
                .map_err(db)?;
            Ok(deleted > 0)
        })
    }

    fn list_nodes(&self, strategy_id: StrategyId) -> BoxFuture<'_, Result<Vec<Node>>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT kind, id, strategy_id, name, order_index, enabled, config
                     FROM nodes
                     WHERE strategy_id = ?1
                     ORDER BY order_index ASC, kind ASC, id ASC",
                )
                .map_err(db)?;

            let rows = stmt
                .query_map(params![strategy_id], |row| {
                    let kind: String = row.get(0)?;
                    let id: i64 = row.get(1)?;
                    let strategy_id: i64 = row.get(2)?;
                    let name: String = row.get(3)?;
                    let order_index: i64 = row.get(4)?;
                    let enabled: bool = row.get(5)?;
                    let config: String = row.get(6)?;
                    Ok((kind, id, strategy_id, name, order_index, enabled, config))
                })
                .map_err(db)?;

            let mut nodes = Vec::new();
            for row in rows {
                let (kind, id, strategy_id, name, order_index, enabled, config) =
                    row.map_err(db)?;
                let spec: NodeSpec = match serde_json::from_str(&config) {
                    Ok(spec) => spec,
                    Err(e) => {
                        warn!(kind = %kind, node_id = id, error = %e, "Skipping node with unreadable config");
                        continue;
                    }
                };
                nodes.push(Node {
                    id,
                    strategy_id,
                    name,
                    order_index,
                    enabled,
                    spec,
                });
            }
            Ok(nodes)
        })
    }

    fn insert_node(&self, node: &Node) -> BoxFuture<'_, Result<bool>> {
        let node = node.clone();
        Box::pin(async move {
            let config = serde_json::to_string(&node.spec)?;
            let conn = self.lock()?;
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO nodes (kind, id, strategy_id, name, order_index, enabled, config)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        node.node_type().as_str(),
                        node.id,
                        node.strategy_id,
                        node.name,
                        node.order_index,
                        node.enabled,
                        config,
                    ],
                )
                .map_err(db)?;
            Ok(inserted > 0)
        })
    }

    fn list_edges(&self, strategy_id: StrategyId) -> BoxFuture<'_, Result<Vec<Edge>>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, strategy_id, source, source_handle, target
                     FROM edges
                     WHERE strategy_id = ?1
                     ORDER BY id ASC",
                )
                .map_err(db)?;

            let rows = stmt
                .query_map(params![strategy_id], |row| {
                    let id: i64 = row.get(0)?;
                    let strategy_id: i64 = row.get(1)?;
                    let source: String = row.get(2)?;
                    let handle: String = row.get(3)?;
                    let target: String = row.get(4)?;
                    Ok((id, strategy_id, source, handle, target))
                })
                .map_err(db)?;

            let mut edges = Vec::new();
            for row in rows {
                let (id, strategy_id, source, handle, target) = row.map_err(db)?;
                let source_handle = handle.parse().unwrap_or_else(|_| {
                    warn!(edge_id = id, handle = %handle, "Unknown edge handle, treating as default");
                    Handle::Default
                });
                edges.push(Edge {
                    id,
                    strategy_id,
                    source,
                    source_handle,
                    target,
                });
            }
            Ok(edges)
        })
    }

    fn insert_edge(&self, edge: &Edge) -> BoxFuture<'_, Result<bool>> {
        let edge = edge.clone();
        Box::pin(async move {
            let conn = self.lock()?;
            // id 0 means "let SQLite assign one"
            let id = (edge.id != 0).then_some(edge.id);
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO edges (id, strategy_id, source, source_handle, target)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        id,
                        edge.strategy_id,
                        edge.source,
                        edge.source_handle.as_str(),
                        edge.target,
                    ],
                )
                .map_err(db)?;
            Ok(inserted > 0)
        })
    }

    fn create_execution(
        &self,
        strategy_id: StrategyId,
        trigger: TriggerKind,
    ) -> BoxFuture<'_, Result<Execution>> {
        Box::pin(async move {
            let started_at = Utc::now();
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO executions (strategy_id, started_at, status, trigger)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    strategy_id,
                    started_at.to_rfc3339(),
                    ExecutionStatus::Running.as_str(),
                    trigger.as_str(),
                ],
            )
            .map_err(db)?;

            Ok(Execution {
                id: conn.last_insert_rowid(),
                strategy_id,
                started_at,
                completed_at: None,
                status: ExecutionStatus::Running,
                error: None,
                trigger,
            })
        })
    }

    fn finish_execution(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let updated = conn
                .execute(
                    "UPDATE executions SET status = ?2, error = ?3, completed_at = ?4
                     WHERE id = ?1 AND status = 'running'",
                    params![id, status.as_str(), error, Utc::now().to_rfc3339()],
                )
                .map_err(db)?;
            if updated == 0 {
                warn!(execution_id = id, "Execution already finished or missing");
            }
            Ok(())
        })
    }

    fn get_execution(&self, id: ExecutionId) -> BoxFuture<'_, Result<Option<Execution>>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let raw = conn
                .query_row(
                    &format!("SELECT {} FROM executions WHERE id = ?1", EXECUTION_COLUMNS),
                    params![id],
                    execution_row,
                )
                .optional()
                .map_err(db)?;
            raw.map(execution_from_row).transpose()
        })
    }

    fn list_executions(
        &self,
        strategy_id: StrategyId,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Execution>>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM executions WHERE strategy_id = ?1 ORDER BY id DESC LIMIT ?2",
                    EXECUTION_COLUMNS
                ))
                .map_err(db)?;
            let rows = stmt
                .query_map(params![strategy_id, limit as i64], execution_row)
                .map_err(db)?;

            let mut executions = Vec::new();
            for row in rows {
                executions.push(execution_from_row(row.map_err(db)?)?);
            }
            Ok(executions)
        })
    }

    fn append_log(&self, entry: &ExecutionLogEntry) -> BoxFuture<'_, Result<()>> {
        let entry = entry.clone();
        Box::pin(async move {
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO execution_logs
                    (execution_id, node_type, node_id, node_name, input, output, error, duration_ms, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    entry.execution_id,
                    entry.node_type.as_str(),
                    entry.node_id,
                    entry.node_name,
                    entry.input.to_string(),
                    entry.output.to_string(),
                    entry.error,
                    entry.duration_ms as i64,
                    entry.created_at.to_rfc3339(),
                ],
            )
            .map_err(db)?;
            Ok(())
        })
    }

    fn list_logs(&self, execution_id: ExecutionId) -> BoxFuture<'_, Result<Vec<ExecutionLogEntry>>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT execution_id, node_type, node_id, node_name, input, output, error, duration_ms, created_at
                     FROM execution_logs
                     WHERE execution_id = ?1
                     ORDER BY id ASC",
                )
                .map_err(db)?;

            let rows = stmt
                .query_map(params![execution_id], |row| {
                    let execution_id: i64 = row.get(0)?;
                    let node_type: String = row.get(1)?;
                    let node_id: i64 = row.get(2)?;
                    let node_name: String = row.get(3)?;
                    let input: String = row.get(4)?;
                    let output: String = row.get(5)?;
                    let error: Option<String> = row.get(6)?;
                    let duration_ms: i64 = row.get(7)?;
                    let created_at: String = row.get(8)?;
                    Ok((
                        execution_id, node_type, node_id, node_name, input, output, error,
                        duration_ms, created_at,
                    ))
                })
                .map_err(db)?;

            let mut entries = Vec::new();
            for row in rows {
                let (
                    execution_id,
                    node_type,
                    node_id,
                    node_name,
                    input,
                    output,
                    error,
                    duration_ms,
                    created_at,
                ) = row.map_err(db)?;
                entries.push(ExecutionLogEntry {
                    execution_id,
                    node_type: node_type.parse()?,
                    node_id,
                    node_name,
                    input: parse_json(&input),
                    output: parse_json(&output),
                    error,
                    duration_ms: duration_ms.max(0) as u64,
                    created_at: parse_ts(&created_at),
                });
            }
            Ok(entries)
        })
    }
}
