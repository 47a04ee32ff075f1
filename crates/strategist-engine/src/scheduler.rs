use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use cron::Schedule;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use strategist_core::config::SchedulerConfig;
use strategist_core::error::{Result, StrategistError};
use strategist_core::event::EngineEvent;
use strategist_core::types::{StrategyId, TriggerKind};

use crate::engine::StrategyFlowEngine;

struct ScheduledJob {
    expression: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Fires enabled strategies on their cron schedules.
///
/// One task per strategy. Runs of the same strategy are not serialized:
/// a slow run can overlap the next fire.
pub struct StrategyScheduler {
    engine: StrategyFlowEngine,
    jobs: Mutex<HashMap<StrategyId, ScheduledJob>>,
    offset: FixedOffset,
}

impl StrategyScheduler {
    pub fn new(engine: StrategyFlowEngine, config: &SchedulerConfig) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600).unwrap_or_else(|| {
            warn!(hours = config.utc_offset_hours, "Invalid UTC offset, using UTC");
            Utc.fix()
        });
        Self {
            engine,
            jobs: Mutex::new(HashMap::new()),
            offset,
        }
    }

    /// Parse a 5- or 6-field cron expression.
    pub fn parse_schedule(expression: &str) -> Result<Schedule> {
        let trimmed = expression.trim();
        let normalized = if trimmed.split_whitespace().count() == 5 {
            format!("0 {}", trimmed)
        } else {
            trimmed.to_string()
        };
        Schedule::from_str(&normalized)
            .map_err(|e| StrategistError::Config(format!("invalid schedule '{}': {}", expression, e)))
    }

    /// Drop every job and register one per enabled, scheduled strategy.
    /// Returns the number of jobs registered.
    pub async fn refresh(&self) -> Result<usize> {
        let strategies = self.engine.store().list_strategies().await?;

        let mut jobs = self.jobs.lock().await;
        for (_, job) in jobs.drain() {
            job.cancel.cancel();
        }

        for strategy in strategies.into_iter().filter(|s| s.enabled) {
            let Some(expression) = strategy.schedule.as_deref().filter(|s| !s.trim().is_empty())
            else {
                continue;
            };
            match Self::parse_schedule(expression) {
                Ok(schedule) => {
                    let cancel = CancellationToken::new();
                    let handle = tokio::spawn(job_loop(
                        self.engine.clone(),
                        strategy.id,
                        schedule,
                        self.offset,
                        cancel.clone(),
                    ));
                    info!(strategy_id = strategy.id, schedule = %expression, "Strategy scheduled");
                    jobs.insert(
                        strategy.id,
                        ScheduledJob {
                            expression: expression.to_string(),
                            cancel,
                            handle,
                        },
                    );
                }
                Err(e) => {
                    warn!(strategy_id = strategy.id, error = %e, "Invalid cron expression, skipping strategy");
                }
            }
        }

        Ok(jobs.len())
    }

    /// Scheduled strategy ids with their expressions, sorted by id.
    pub async fn scheduled(&self) -> Vec<(StrategyId, String)> {
        let jobs = self.jobs.lock().await;
        let mut out: Vec<_> = jobs
            .iter()
            .map(|(id, job)| (*id, job.expression.clone()))
            .collect();
        out.sort();
        out
    }

    /// Cancel every job and wait for the tasks to exit.
    pub async fn stop(&self) {
        let jobs: Vec<ScheduledJob> = self.jobs.lock().await.drain().map(|(_, j)| j).collect();
        for job in &jobs {
            job.cancel.cancel();
        }
        for job in jobs {
            let _ = job.handle.await;
        }
        info!("Strategy scheduler stopped");
    }

    /// Register jobs, then block until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let count = self.refresh().await?;
        if count == 0 {
            info!("No scheduled strategies, scheduler idle");
        } else {
            info!(count, "Strategy scheduler started");
        }
        shutdown.cancelled().await;
        self.stop().await;
        Ok(())
    }
}

async fn job_loop(
    engine: StrategyFlowEngine,
    strategy_id: StrategyId,
    schedule: Schedule,
    offset: FixedOffset,
    cancel: CancellationToken,
) {
    loop {
        let Some(fire_at) = schedule.upcoming(offset).next() else {
            info!(strategy_id, "Schedule has no upcoming times");
            return;
        };
        let delay = (fire_at.with_timezone(&Utc) - Utc::now())
            .to_std()
            .unwrap_or(Duration::from_secs(1));

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return,
        }

        info!(strategy_id, "Firing scheduled strategy");
        engine
            .event_bus()
            .publish(EngineEvent::ScheduleFired { strategy_id });
        match engine.execute(strategy_id, TriggerKind::Scheduled).await {
            Ok((execution, outcome)) if !outcome.success => {
                warn!(strategy_id, execution_id = execution.id, "Scheduled run failed");
            }
            Ok(_) => {}
            Err(e) => error!(strategy_id, error = %e, "Scheduled run could not start"),
        }
    }
}
