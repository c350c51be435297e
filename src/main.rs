use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use claim_scheduler::config::{NodeConfig, SchedulerConfig};
use claim_scheduler::node::Node;
use claim_scheduler::scheduler::{Job, ObjectRef};
use claim_scheduler::shutdown::install_shutdown_handler;
use claim_scheduler::store::MemoryJobStore;
use claim_scheduler::worker::{Handler, HandlerRegistry};

#[derive(Parser, Debug)]
#[command(name = "claim-scheduler")]
#[command(version)]
#[command(about = "Priority job admission and dispatch for a cluster operator")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Load jobs from a file and run the scheduler until interrupted
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// JSON file containing an array of jobs
    #[arg(long)]
    jobs: Option<PathBuf>,

    /// Maximum number of jobs running at once
    #[arg(long, default_value = "5")]
    max_concurrent_jobs: usize,

    /// Minimum delay between scheduling passes, in milliseconds
    #[arg(long, default_value = "3000")]
    schedule_interval_ms: u64,

    /// Execution permits above the running ceiling
    #[arg(long, default_value = "2")]
    dispatch_slack: usize,

    /// Full store re-list period, in milliseconds
    #[arg(long, default_value = "30000")]
    resync_interval_ms: u64,

    /// Time to wait for in-flight jobs on shutdown, in milliseconds
    #[arg(long, default_value = "10000")]
    shutdown_grace_ms: u64,

    /// Port for the status dashboard (optional)
    #[arg(long)]
    dashboard_port: Option<u16>,
}

/// Built-in handler for the `log` job type: records the target and succeeds.
struct LogHandler;

#[async_trait]
impl Handler for LogHandler {
    async fn handle(&self, target: &ObjectRef) -> anyhow::Result<()> {
        tracing::info!(object = %target, "Handled log job");
        Ok(())
    }
}

async fn load_jobs(path: &Path) -> claim_scheduler::Result<Vec<Job>> {
    let data = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&data)?)
}

async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = SchedulerConfig::default()
        .with_max_concurrent_jobs(args.max_concurrent_jobs)
        .with_schedule_interval_ms(args.schedule_interval_ms)
        .with_dispatch_slack(args.dispatch_slack)
        .with_resync_interval_ms(args.resync_interval_ms)
        .with_shutdown_grace_ms(args.shutdown_grace_ms);

    let mut config = NodeConfig::new(scheduler);
    if let Some(port) = args.dashboard_port {
        let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
        config = config.with_dashboard(addr);
    }

    let store = Arc::new(MemoryJobStore::new());
    if let Some(path) = &args.jobs {
        let jobs = load_jobs(path).await?;
        tracing::info!(count = jobs.len(), path = %path.display(), "Loaded jobs");
        for job in jobs {
            store.apply(job).await;
        }
    }

    let mut registry = HandlerRegistry::builder();
    registry.register("log", Arc::new(LogHandler))?;

    let (node, signal_rx) = Node::new(config, store, registry.build())?;

    tracing::info!(
        max_concurrent_jobs = args.max_concurrent_jobs,
        dashboard_port = ?args.dashboard_port,
        "Starting claim-scheduler"
    );

    let shutdown = install_shutdown_handler();
    node.run(signal_rx, shutdown).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Run(run_args) => run(run_args).await,
    }
}
