//! `kite` - demonstration CLI wiring the Kite crates into a runnable ride.
//!
//! ## Commands
//!
//! - `run`: execute the built-in demo ride end to end
//! - `graph`: print the demo ride's topological levels and critical path

mod demo;
mod telemetry;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kite_artifacts::ArtifactStore;
use kite_graph::Graph;
use kite_model::{CancellationSource, Status};
use kite_scheduler::{ContextAssembly, Scheduler, SchedulerConfig, TokioProcessRunner};
use kite_secrets::SecretRegistry;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "kite")]
#[command(author = "Kite Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Concurrency-bounded CI/CD workflow runner", long_about = None)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the built-in demo ride
    Run {
        /// Workspace directory the ride executes in (default: a fresh temp dir)
        #[arg(long)]
        workspace: Option<std::path::PathBuf>,

        /// Maximum concurrent segments (defaults to the logical CPU count)
        #[arg(long)]
        max_concurrency: Option<usize>,
    },

    /// Print the demo ride's topological levels and critical path
    Graph,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            workspace,
            max_concurrency,
        } => cmd_run(workspace, max_concurrency).await,
        Commands::Graph => cmd_graph(),
    }
}

fn cmd_graph() -> Result<()> {
    let segments = demo::sample_segments();
    let ride = demo::sample_ride();
    let outcome = Graph::build(&segments, &ride);

    if !outcome.is_valid() {
        for err in &outcome.errors {
            println!("error: {err}");
        }
        anyhow::bail!("demo ride failed validation");
    }

    let levels = outcome
        .graph
        .levels()
        .map_err(|e| anyhow::anyhow!("levels: {e}"))?;
    println!("Levels:");
    for (i, level) in levels.iter().enumerate() {
        println!("  {}: {}", i, level.join(", "));
    }

    println!("\nCritical path:");
    println!("  {}", outcome.graph.critical_path().join(" -> "));

    Ok(())
}

async fn cmd_run(workspace: Option<std::path::PathBuf>, max_concurrency: Option<usize>) -> Result<()> {
    let temp_dir;
    let workspace = match workspace {
        Some(path) => path,
        None => {
            temp_dir = tempfile::tempdir().context("failed to create a scratch workspace")?;
            temp_dir.path().to_path_buf()
        }
    };

    let segments = demo::sample_segments();
    let ride = demo::sample_ride();
    let outcome = Graph::build(&segments, &ride);
    if !outcome.is_valid() {
        for err in &outcome.errors {
            println!("error: {err}");
        }
        anyhow::bail!("demo ride failed validation");
    }

    let artifacts_dir = workspace.join(".kite/artifacts");
    let logs_dir = workspace.join(".kite/logs");
    let store = ArtifactStore::new(&artifacts_dir).context("failed to open artifact store")?;

    let assembly = ContextAssembly::new(
        "main",
        "0000000000000000000000000000000000000000",
        HashMap::new(),
        workspace.clone(),
        Arc::new(store),
        Arc::new(SecretRegistry::new()),
        Arc::new(TokioProcessRunner::new(Duration::from_secs(5))),
        logs_dir,
    );

    let mut config = SchedulerConfig::default();
    if let Some(cap) = max_concurrency {
        config.max_concurrency = cap;
    }
    config.artifacts_dir = artifacts_dir;

    let scheduler = Scheduler::new(config);
    let (_source, cancel) = CancellationSource::new();

    info!(workspace = %workspace.display(), "running demo ride");
    let result = scheduler.run(&outcome.graph, &ride, &assembly, cancel).await;

    println!("Ride '{}': {}", ride.name, if result.success { "PASSED" } else { "FAILED" });
    println!("Duration: {}ms", result.duration_ms);
    println!();

    let mut names: Vec<&String> = result.results.keys().collect();
    names.sort();
    for name in names {
        let seg = &result.results[name];
        let marker = match seg.status {
            Status::Success => "pass",
            Status::Skipped => "skip",
            Status::Failure | Status::TimedOut => "fail",
            Status::Pending | Status::Running => "????",
        };
        println!(
            "  [{marker}] {name} ({}ms, attempts={})",
            seg.duration_ms, seg.attempts
        );
        if let Some(kind) = &seg.error_kind {
            println!("         {kind}: {}", seg.error_message.as_deref().unwrap_or(""));
        }
    }

    println!(
        "\nSummary: {} passed, {} failed, {} skipped",
        result.passed_count(),
        result.failed_count(),
        result.skipped_count()
    );

    if result.success {
        Ok(())
    } else {
        anyhow::bail!("ride failed")
    }
}
