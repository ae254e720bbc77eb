//! Crucible worker binary.
//!
//! Usage:
//!     crucible-worker --database-url sqlite:crucible.db?mode=rwc \
//!                     --events tcp://127.0.0.1:5556

use clap::Parser;
use crucible_protocol::defaults;
use crucible_sandbox::SandboxConfig;
use crucible_worker::{Worker, WorkerConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "crucible-worker", about = "Crucible execution worker")]
struct Args {
    /// Registry/queue database URL
    #[arg(long, env = "CRUCIBLE_DATABASE_URL", default_value = defaults::DEFAULT_DB_URL)]
    database_url: String,

    /// Artifact store root directory
    #[arg(long, env = "CRUCIBLE_ARTIFACT_ROOT", default_value = defaults::DEFAULT_ARTIFACT_ROOT)]
    artifact_root: PathBuf,

    /// Event-hub addresses (comma separated)
    #[arg(
        long = "events",
        env = "CRUCIBLE_EVENT_ADDRS",
        value_delimiter = ',',
        default_value = defaults::DEFAULT_EVENT_BUS_ADDR
    )]
    event_addrs: Vec<String>,

    /// Worker ID (auto-generated if not provided)
    #[arg(long, env = "CRUCIBLE_WORKER_ID")]
    worker_id: Option<String>,

    /// Queue poll interval in milliseconds
    #[arg(long, env = "CRUCIBLE_QUEUE_POLL_MS", default_value_t = defaults::DEFAULT_QUEUE_POLL_MS)]
    poll_ms: u64,

    /// Claim lease in seconds before redelivery
    #[arg(long, env = "CRUCIBLE_CLAIM_LEASE_SECS", default_value_t = defaults::DEFAULT_CLAIM_LEASE_SECS)]
    lease_secs: u64,

    /// Container runtime binary
    #[arg(long, env = "CRUCIBLE_CONTAINER_RUNTIME", default_value = "podman")]
    runtime: PathBuf,

    /// Interpreter image
    #[arg(
        long,
        env = "CRUCIBLE_SANDBOX_IMAGE",
        default_value = "docker.io/library/python:3.9-slim"
    )]
    image: String,

    /// Syscall allow-list profile path
    #[arg(long, env = "CRUCIBLE_SECCOMP_PROFILE", default_value = "profiles/seccomp.json")]
    seccomp_profile: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crucible_worker=info,crucible_db=info,crucible_sandbox=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let worker_id = args.worker_id.unwrap_or_else(|| {
        let id = uuid::Uuid::new_v4().to_string();
        format!("worker-{}", id.split('-').next().unwrap())
    });

    let config = WorkerConfig {
        worker_id: worker_id.clone(),
        database_url: args.database_url.clone(),
        artifact_root: args.artifact_root.clone(),
        event_addrs: args.event_addrs.clone(),
        poll_interval: Duration::from_millis(args.poll_ms),
        claim_lease: Duration::from_secs(args.lease_secs),
        sandbox: SandboxConfig {
            runtime: args.runtime,
            image: args.image,
            seccomp_profile: args.seccomp_profile,
            ..SandboxConfig::default()
        },
    };

    tracing::info!("Starting Crucible worker");
    tracing::info!("  Worker ID: {}", worker_id);
    tracing::info!("  Database:  {}", args.database_url);
    tracing::info!("  Artifacts: {}", args.artifact_root.display());
    tracing::info!("  Events:    {}", args.event_addrs.join(", "));

    let mut worker = Worker::connect(config).await?;

    let token = worker.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested; finishing in-flight job");
            token.trigger();
        }
    });

    worker.run().await?;

    Ok(())
}
