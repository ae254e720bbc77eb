//! Crucible gateway binary.
//!
//! Usage:
//!     crucible-gateway --bind 0.0.0.0:8000 --event-bind tcp://127.0.0.1:5556

use clap::Parser;
use crucible_gateway::{build_router, events, AppState};
use crucible_protocol::defaults;
use crucible_store::FsArtifactStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "crucible-gateway", about = "Crucible HTTP gateway")]
struct Args {
    /// HTTP bind address
    #[arg(long, env = "CRUCIBLE_HTTP_BIND", default_value = defaults::DEFAULT_HTTP_BIND_ADDR)]
    bind: String,

    /// Registry/queue database URL
    #[arg(long, env = "CRUCIBLE_DATABASE_URL", default_value = defaults::DEFAULT_DB_URL)]
    database_url: String,

    /// Artifact store root directory
    #[arg(long, env = "CRUCIBLE_ARTIFACT_ROOT", default_value = defaults::DEFAULT_ARTIFACT_ROOT)]
    artifact_root: PathBuf,

    /// Event bus bind address (workers connect their PUB sockets here)
    #[arg(long, env = "CRUCIBLE_EVENT_BUS_BIND", default_value = defaults::DEFAULT_EVENT_BUS_ADDR)]
    event_bind: String,

    /// Registry connection pool size
    #[arg(long, env = "CRUCIBLE_DB_POOL_SIZE", default_value_t = 10)]
    pool_size: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crucible_gateway=info,crucible_db=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    tracing::info!("Starting Crucible gateway");
    tracing::info!("  HTTP:      {}", args.bind);
    tracing::info!("  Database:  {}", args.database_url);
    tracing::info!("  Artifacts: {}", args.artifact_root.display());
    tracing::info!("  Event bus: {}", args.event_bind);

    let pool = crucible_db::connect_pool(&args.database_url, args.pool_size).await?;
    crucible_db::init_schema(&pool).await?;

    let store = Arc::new(FsArtifactStore::new(&args.artifact_root)?);
    let state = Arc::new(AppState::new(pool, store));

    // Best-effort path: the gateway keeps serving even if the bus dies.
    let hub = state.hub.clone();
    let event_bind = args.event_bind.clone();
    tokio::spawn(async move {
        if let Err(e) = events::run_event_loop(&event_bind, hub).await {
            tracing::error!("Event loop terminated: {}", e);
        }
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
