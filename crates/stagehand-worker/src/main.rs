//! Staging completion worker.
//!
//! The single composition point: every collaborator is constructed here
//! and injected explicitly.

use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stagehand_config::load_staging_config;
use stagehand_core::log_stream::AppLogEmitter;
use stagehand_core::Guid;
use stagehand_db::{create_pool, run_migrations, PgAppRepo, PgDropletRepo};
use stagehand_staging::blobstore::BlobstoreUrlGenerator;
use stagehand_staging::lifecycle::Protocol;
use stagehand_staging::queue::{PgAppControlClient, PgCompletionQueue, PgStagerClient};
use stagehand_staging::runner::ClusterRunner;
use stagehand_staging::{CompletionWorker, Messenger, StagingCompletionHandler};

#[derive(Parser, Debug)]
#[command(name = "stagehand-worker", about = "Staging completion worker")]
struct Args {
    /// Path to the system configuration file.
    #[arg(long, env = "STAGEHAND_CONFIG", default_value = "stagehand.kdl")]
    config: String,

    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Worker identity used when claiming completions.
    #[arg(long, default_value = "completion-worker-1")]
    worker_id: String,
}

/// Emits app log-stream errors as structured operator logs until an
/// external log stream is attached.
struct LogStreamEmitter;

impl AppLogEmitter for LogStreamEmitter {
    fn emit_error(&self, guid: &Guid, message: &str) {
        tracing::error!(target: "app_log_stream", guid = %guid, "{message}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_staging_config(&args.config)?;

    info!("Connecting to database...");
    let pool = create_pool(&args.database_url).await?;
    run_migrations(&pool).await?;
    info!("Database connected");

    let droplets = Arc::new(PgDropletRepo::new(pool.clone()));
    let apps = Arc::new(PgAppRepo::new(pool.clone()));

    let urls = Arc::new(BlobstoreUrlGenerator::from_config(&config.blobstore)?);
    let protocol = Arc::new(Protocol::new(urls));
    let messenger = Arc::new(Messenger::new(
        Arc::new(PgStagerClient::new(pool.clone(), "cluster")),
        Arc::new(PgAppControlClient::new(pool.clone())),
        protocol,
    ));

    let runner = Arc::new(ClusterRunner::new(
        apps.clone(),
        droplets.clone(),
        messenger,
        config.staging.default_health_check_timeout_secs,
    ));

    let handler = Arc::new(StagingCompletionHandler::new(
        "cluster",
        droplets.clone(),
        apps,
        runner,
        Arc::new(LogStreamEmitter),
    ));

    let worker = CompletionWorker::new(
        args.worker_id,
        Arc::new(PgCompletionQueue::new(pool)),
        droplets,
        handler,
        config.staging.start_after_staging,
    );

    worker.run().await;
    Ok(())
}
