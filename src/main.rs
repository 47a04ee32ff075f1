use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use strategist_core::config::AppConfig;
use strategist_core::event::{EngineEvent, EventBus};
use strategist_core::traits::StrategyStore;
use strategist_core::types::{Execution, StrategyId, TriggerKind};

use strategist_engine::{RunOutcome, StrategyFlowEngine, StrategyScheduler};
use strategist_store::{seed_store, MetricsReader, SeedFile, SqliteStore};

#[derive(Parser)]
#[command(name = "strategist", version, about = "Scheduled strategy flows over HTTP data, LLMs and notifications")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "strategist.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a strategy once and print its result
    Run {
        strategy_id: StrategyId,
        /// Print the run outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run scheduled strategies until interrupted
    Daemon,
    /// Load strategies from a TOML or JSON definition file
    Seed { file: PathBuf },
    /// List stored strategies
    List,
    /// Show execution metrics for a strategy
    Metrics {
        strategy_id: StrategyId,
        #[arg(long)]
        json: bool,
    },
    /// Show recent executions of a strategy
    History {
        strategy_id: StrategyId,
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("strategist=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "strategist", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    if let Commands::Config = &cli.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let db_path = config.database_path();
    let store: Arc<dyn StrategyStore> = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?,
    );

    match cli.command {
        Commands::Seed { file } => {
            let seed = SeedFile::load(&file)?;
            let report = seed_store(store.as_ref(), &seed).await?;
            println!(
                "Seeded {} strategies, {} nodes, {} edges ({} already present)",
                report.strategies, report.nodes, report.edges, report.skipped
            );
        }
        Commands::List => {
            let strategies = store.list_strategies().await?;
            if strategies.is_empty() {
                println!("No strategies stored.");
            }
            for s in strategies {
                println!(
                    "{:>4}  {:<32} {:<8} {}",
                    s.id,
                    s.name,
                    if s.enabled { "enabled" } else { "disabled" },
                    s.schedule.as_deref().unwrap_or("manual")
                );
            }
        }
        Commands::Metrics { strategy_id, json } => {
            let metrics = MetricsReader::new(store).strategy_metrics(strategy_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&metrics)?);
            } else {
                println!("Strategy {}:", strategy_id);
                println!(
                    "  runs: {} ({} ok, {} failed, {} running)",
                    metrics.total_runs, metrics.successful_runs, metrics.failed_runs, metrics.running
                );
                println!("  success rate: {:.1}%", metrics.success_rate * 100.0);
                if let Some(avg) = metrics.average_duration_ms {
                    println!("  average duration: {:.0}ms", avg);
                }
                for node in &metrics.node_stats {
                    println!(
                        "  {:<18} {:>4} runs {:>3} errors {:>8.0}ms avg",
                        format!("{}_{}:", node.node_type, node.node_id),
                        node.runs,
                        node.errors,
                        node.average_duration_ms
                    );
                }
            }
        }
        Commands::History { strategy_id, limit } => {
            let executions = MetricsReader::new(store)
                .recent_executions(strategy_id, limit)
                .await?;
            if executions.is_empty() {
                println!("No executions recorded yet.");
            }
            for execution in &executions {
                print_execution(execution);
            }
        }
        Commands::Run { strategy_id, json } => {
            let engine = build_engine(&config, store, Arc::new(EventBus::default()))?;
            let (execution, outcome) = engine.execute(strategy_id, TriggerKind::Manual).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&execution, &outcome);
            }
            if !outcome.success {
                anyhow::bail!(
                    "execution {} failed: {}",
                    execution.id,
                    outcome.error.unwrap_or_default()
                );
            }
        }
        Commands::Daemon => {
            let event_bus = Arc::new(EventBus::default());
            let engine = build_engine(&config, store, event_bus.clone())?;

            let cancel = tokio_util::sync::CancellationToken::new();
            let cancel_clone = cancel.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down daemon...");
                cancel_clone.cancel();
            });

            // Surface run results from every source, including triggered sub-runs
            let mut events = event_bus.subscribe();
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(EngineEvent::RunFinished {
                            strategy_id,
                            execution_id,
                            success: false,
                            error,
                        }) => {
                            warn!(strategy_id, execution_id, error = ?error, "Run failed");
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(n)) => warn!(skipped = n, "Event listener lagged"),
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            if config.scheduler.enabled {
                let scheduler = StrategyScheduler::new(engine, &config.scheduler);
                scheduler.run(cancel).await?;
            } else {
                info!("Scheduler disabled, waiting for shutdown");
                cancel.cancelled().await;
            }
        }
        Commands::Config | Commands::Completions { .. } => {}
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    // Fall back to the per-user config
    let home_config = dirs_home().map(|h| h.join(".strategist").join("config.toml"));
    match home_config {
        Some(p) if p.exists() => Ok(AppConfig::load(&p)?),
        _ => anyhow::bail!(
            "config file not found: {} (and no ~/.strategist/config.toml)",
            path.display()
        ),
    }
}

fn build_engine(
    config: &AppConfig,
    store: Arc<dyn StrategyStore>,
    event_bus: Arc<EventBus>,
) -> anyhow::Result<StrategyFlowEngine> {
    let fetcher = strategist_channels::ReqwestFetcher::new(&config.http)?;
    let llm = strategist_llm::ModelRouter::from_config(&config.models);
    let notifier = strategist_channels::create_notifier(&config.channels);
    info!(channel = notifier.name(), "Notification channel ready");

    Ok(
        StrategyFlowEngine::new(store, Arc::new(fetcher), Arc::new(llm), notifier)
            .with_settings(config.engine.clone())
            .with_event_bus(event_bus),
    )
}

fn print_outcome(execution: &Execution, outcome: &RunOutcome) {
    for entry in &outcome.logs {
        let status = match &entry.error {
            Some(e) => format!("error: {}", truncate(e, 80)),
            None => "ok".to_string(),
        };
        println!(
            "  {:<24} {:>6}ms  {}",
            truncate(&entry.node_name, 24),
            entry.duration_ms,
            status
        );
    }
    print_execution(execution);
}

fn print_execution(execution: &Execution) {
    let duration = execution
        .duration_ms()
        .map(|d| format!("{}ms", d))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "#{:<6} {}  {:<9} {:<9} {:>8}  {}",
        execution.id,
        execution.started_at.format("%Y-%m-%d %H:%M:%S"),
        execution.trigger.as_str(),
        execution.status.as_str(),
        duration,
        execution.error.as_deref().unwrap_or("")
    );
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
