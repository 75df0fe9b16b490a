use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hybrid_search::config::{DatabaseArgs, ProviderArgs, SearchArgs};
use hybrid_search::{api, telemetry, EmbeddingClient, EmbeddingGenerator, PgStore, SearchOrchestrator};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "search-api",
    about = "HTTP API serving hybrid full-text + semantic search"
)]
struct ApiCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "SEARCH_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    #[command(flatten)]
    database: DatabaseArgs,

    #[command(flatten)]
    provider: ProviderArgs,

    #[command(flatten)]
    search: SearchArgs,

    /// Force debug logging regardless of RUST_LOG.
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ApiCli::parse();
    telemetry::init_logging(cli.verbose).context("failed to install logger")?;

    let search_config = cli.search.build().context("invalid search configuration")?;
    let generator = match cli.provider.build() {
        Ok(config) => {
            let client = EmbeddingClient::from_config(&config)
                .context("failed to build embedding provider")?;
            info!(
                provider = client.provider_name(),
                dims = client.dimensions(),
                "semantic search available"
            );
            Some(EmbeddingGenerator::new(client))
        }
        Err(err) => {
            warn!(error = %err, "embedding provider not configured; serving full-text only");
            None
        }
    };

    let store = PgStore::connect(&cli.database.database_url, cli.database.schema.clone())
        .await
        .context("failed to connect to Postgres")?;
    let orchestrator = Arc::new(SearchOrchestrator::new(
        Arc::new(store),
        generator,
        search_config,
    ));
    let app = api::router(orchestrator);

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "search api listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
            }
        })
        .await
        .context("server shutdown")?;
    Ok(())
}
