use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use jobsignal_common::{Config, RuntimeConfig};
use jobsignal_engine::worker::{Engine, WorkerRole};

#[derive(Parser, Debug)]
#[command(name = "jobsignal-worker", about = "Job-board scrape-and-ingest worker")]
struct Cli {
    /// Which task queue this worker serves.
    #[arg(long, value_enum, default_value = "all")]
    role: WorkerRole,

    /// Run a single tick of each role and exit.
    #[arg(long)]
    once: bool,

    /// Seconds between ticks.
    #[arg(long, default_value_t = 60)]
    cadence_seconds: u64,

    /// Stable worker identity for site leases. Random when omitted.
    #[arg(long)]
    worker_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jobsignal=info".parse()?))
        .init();

    let cli = Cli::parse();
    info!("jobsignal worker starting...");

    let config = Config::from_env();
    config.log_redacted();
    let runtime = RuntimeConfig::load();

    let worker_id = cli
        .worker_id
        .or_else(|| {
            if config.worker_id.is_empty() {
                None
            } else {
                Some(config.worker_id.clone())
            }
        })
        .unwrap_or_else(|| format!("worker-{}", Uuid::new_v4()));

    let engine = Engine::new(config, runtime)?;

    if cli.once {
        engine.run_once(&worker_id).await?;
        info!("single tick complete");
        return Ok(());
    }

    engine
        .run_loop(
            cli.role,
            &worker_id,
            Duration::from_secs(cli.cadence_seconds),
        )
        .await
}
