/*
* Command line
* ------------
*
* vm-drs
* ├── run [--once] [--dry-run]   control loop (plus the status API if enabled)
* ├── check                      one dry-run cycle, decision printed
* ├── nodes                      current load of every target node
* └── init [--force]             write config/default.toml
*
* Global flags: --config <file>, --json (JSON log lines).
*/

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::watch;
use tracing::{error, info};

use crate::api::{self, AppState};
use crate::cluster::{ClusterApi, ProxmoxClient};
use crate::config::settings::generate_default_config;
use crate::config::Settings;
use crate::core::{find_extremes, ClusterSnapshot};
use crate::logging::init_tracing;
use crate::monitoring::{CycleHistory, CycleOutcome, CycleReport};
use crate::scheduler::Balancer;
use crate::AsyncMutex;

#[derive(Parser)]
#[command(name = "vm-drs")]
#[command(about = "Keeps VM load balanced across cluster nodes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Extra configuration file, applied on top of config/default.toml
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long, global = true, env = "DRS_LOG_JSON")]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the balancing loop
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
        /// Only recommend migrations, whatever auto_migration says
        #[arg(long)]
        dry_run: bool,
    },
    /// Evaluate the cluster once without migrating anything
    Check,
    /// Show the current load of the target nodes
    Nodes,
    /// Generate default configuration
    Init {
        #[arg(short, long)]
        force: bool,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            init_tracing("info", cli.json);
            handle_init_command(force)
        }
        Commands::Run { once, dry_run } => {
            let (settings, api) = prepare(cli.config.as_deref(), cli.json)?;
            handle_run_command(&settings, api, once, dry_run).await
        }
        Commands::Check => {
            let (settings, api) = prepare(cli.config.as_deref(), cli.json)?;
            handle_check_command(&settings, api).await
        }
        Commands::Nodes => {
            let (settings, api) = prepare(cli.config.as_deref(), cli.json)?;
            handle_nodes_command(&settings, api).await
        }
    }
}

fn prepare(
    config: Option<&std::path::Path>,
    json: bool,
) -> anyhow::Result<(Settings, Arc<dyn ClusterApi>)> {
    let settings = Settings::load(config).context("invalid configuration")?;
    init_tracing(&settings.logging.level, json || settings.logging.json);
    info!(cluster = ?settings.cluster, balancer = ?settings.balancer, "Configuration loaded");

    let client = ProxmoxClient::new(&settings.cluster).context("failed to create cluster client")?;
    Ok((settings, Arc::new(client)))
}

fn new_history(settings: &Settings) -> Arc<AsyncMutex<CycleHistory>> {
    Arc::new(AsyncMutex::new(CycleHistory::new(
        settings.status_api.history_size,
        settings.status_api.retention_hours,
    )))
}

async fn handle_run_command(
    settings: &Settings,
    api: Arc<dyn ClusterApi>,
    once: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let history = new_history(settings);
    let mut balancer = Balancer::new(api, settings.balancer.clone(), history.clone());
    if dry_run {
        balancer = balancer.dry_run();
    }

    if once {
        let report = balancer.run_cycle().await;
        print_report(&report);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let api_task = if settings.status_api.enabled {
        let addr: SocketAddr = format!("{}:{}", settings.status_api.host, settings.status_api.port)
            .parse()
            .context("invalid status_api host/port")?;
        let listener = api::bind(addr)
            .await
            .with_context(|| format!("failed to bind status API on {}", addr))?;
        let state = Arc::new(AppState {
            history: history.clone(),
            balancer: balancer.settings().clone(),
        });
        Some(tokio::spawn(api::serve(listener, state, shutdown_rx.clone())))
    } else {
        None
    };

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    balancer.run(shutdown_rx).await;

    if let Some(task) = api_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Status API failed"),
            Err(e) => error!(error = %e, "Status API task panicked"),
        }
    }

    Ok(())
}

async fn handle_check_command(settings: &Settings, api: Arc<dyn ClusterApi>) -> anyhow::Result<()> {
    let balancer = Balancer::new(api, settings.balancer.clone(), new_history(settings)).dry_run();
    let report = balancer.run_cycle().await;
    print_report(&report);
    Ok(())
}

async fn handle_nodes_command(settings: &Settings, api: Arc<dyn ClusterApi>) -> anyhow::Result<()> {
    let snapshot = ClusterSnapshot::build(api.as_ref(), &settings.balancer).await?;
    let extremes = find_extremes(&snapshot);

    println!("{}", "Target nodes:".bold());
    println!(
        "  {:<16} {:>8} {:>8} {:>8} {:>6}",
        "NODE", "CPU%", "MEM%", "SCORE", "VMS"
    );
    for node in snapshot.nodes() {
        let line = format!(
            "  {:<16} {:>8.2} {:>8.2} {:>8.2} {:>6}",
            node.name,
            node.cpu_percent,
            node.memory_usage_percent(),
            node.load_score(),
            node.running_workloads.len()
        );
        let line = match extremes {
            Some(ex) if !ex.is_same_node() && ex.highest.name == node.name => line.red(),
            Some(ex) if !ex.is_same_node() && ex.lowest.name == node.name => line.green(),
            _ => line.normal(),
        };
        println!("{}", line);
    }

    for excluded in &snapshot.excluded {
        println!("  {} {} ({})", "✗".red(), excluded.name.red(), excluded.reason);
    }
    for missing in &snapshot.missing {
        println!("  {} {} (not a cluster member)", "?".yellow(), missing.yellow());
    }
    if !snapshot.skipped.is_empty() {
        println!("{} {}", "Ignored:".dimmed(), snapshot.skipped.join(", ").dimmed());
    }
    Ok(())
}

fn print_report(report: &CycleReport) {
    let summary = report.outcome.to_string();
    let summary = match &report.outcome {
        CycleOutcome::Migrated { .. } => summary.green(),
        CycleOutcome::Recommended { .. } => summary.yellow(),
        _ if report.outcome.is_error() => summary.red(),
        _ => summary.normal(),
    };
    println!("{} {}", "Cycle".bold(), report.id);
    println!("  {}", summary);

    if let CycleOutcome::Recommended {
        hint: Some(hint), ..
    } = &report.outcome
    {
        println!("  {} {}", "Suggested:".bold(), hint);
    }
    for excluded in &report.excluded_nodes {
        println!("  {} {}: {}", "excluded".red(), excluded.name, excluded.reason);
    }
}

fn handle_init_command(force: bool) -> anyhow::Result<()> {
    let config_dir = PathBuf::from("config");
    let target = config_dir.join("default.toml");
    if target.exists() && !force {
        error!("{} already exists. Use --force to overwrite.", target.display());
        return Ok(());
    }

    std::fs::create_dir_all(&config_dir)?;
    let config_str = generate_default_config().to_toml()?;
    std::fs::write(&target, config_str)?;

    println!("{} Default configuration written to {}", "✓".green(), target.display());
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
