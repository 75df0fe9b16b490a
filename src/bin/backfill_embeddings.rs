use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hybrid_search::config::{BackfillArgs, DatabaseArgs, ProviderArgs};
use hybrid_search::{telemetry, BackfillWorker, EmbeddingClient, EmbeddingGenerator, PgStore};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "backfill-embeddings",
    about = "Generates embeddings for items that are missing one (or have a stale dimensionality)"
)]
struct BackfillCli {
    #[command(flatten)]
    database: DatabaseArgs,

    #[command(flatten)]
    provider: ProviderArgs,

    #[command(flatten)]
    backfill: BackfillArgs,

    /// Force debug logging regardless of RUST_LOG.
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = BackfillCli::parse();
    telemetry::init_logging(cli.verbose).context("failed to install logger")?;

    let provider = cli.provider.build().context("invalid embedding provider configuration")?;
    let backfill = cli.backfill.build().context("invalid backfill configuration")?;
    let client = EmbeddingClient::from_config(&provider).context("failed to build embedding provider")?;
    let store = PgStore::connect(&cli.database.database_url, cli.database.schema.clone())
        .await
        .context("failed to connect to Postgres")?;

    let worker = BackfillWorker::new(Arc::new(store), EmbeddingGenerator::new(client), backfill)
        .context("invalid backfill configuration")?;
    let handle = worker.start();
    let stop = handle.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; finishing current batch");
            stop.stop();
        }
    });

    let stats = handle.join().await.context("backfill aborted")?;
    println!(
        "succeeded={} failed={} skipped={} batches={}",
        stats.succeeded, stats.failed, stats.skipped, stats.batches
    );
    Ok(())
}
