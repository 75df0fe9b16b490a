use anyhow::{Context, Result};
use clap::Parser;
use hybrid_search::config::{DatabaseArgs, ProviderArgs};
use hybrid_search::item::parse_kinds;
use hybrid_search::store::postgres::ensure_schema;
use hybrid_search::{telemetry, PgStore};

#[derive(Parser, Debug)]
#[command(
    name = "search-schema",
    about = "Creates the pgvector extension, embedding columns, HNSW and full-text indexes"
)]
struct SchemaCli {
    #[command(flatten)]
    database: DatabaseArgs,

    #[command(flatten)]
    provider: ProviderArgs,

    /// Tables to prepare.
    #[arg(long, default_value = "posts,answers,approaches")]
    kinds: String,

    /// Force debug logging regardless of RUST_LOG.
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = SchemaCli::parse();
    telemetry::init_logging(cli.verbose).context("failed to install logger")?;

    let kinds = parse_kinds(&cli.kinds).map_err(anyhow::Error::msg)?;
    // Only the dimensionality matters here; a missing API key is fine.
    let dims = match cli.provider.build() {
        Ok(config) => config.dimensions,
        Err(_) => cli
            .provider
            .embedding_dimensions
            .unwrap_or(cli.provider.embedding_provider.default_dimensions()),
    };
    let store = PgStore::connect(&cli.database.database_url, cli.database.schema.clone())
        .await
        .context("failed to connect to Postgres")?;
    ensure_schema(store.client(), store.schema(), &kinds, dims)
        .await
        .context("failed to prepare search schema")?;
    println!("schema {} ready for {} table(s) at {dims} dims", store.schema(), kinds.len());
    Ok(())
}
