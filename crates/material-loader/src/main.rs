//! material-detail - load material request details through the batching loaders
//!
//! Every id given on the command line is loaded concurrently, so the whole
//! run costs one request query and one items query. The loads are separate
//! `load` calls, which coalesce into one window only on a current-thread
//! runtime.

use clap::Parser;
use futures::future::join_all;
use material_loader::{Config, DataLoaderService, PgMaterialStore, Result};
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "material-detail")]
#[command(about = "Print material request details as JSON")]
struct Args {
    /// Request ids to load
    #[arg(required = true)]
    request_ids: Vec<String>,

    /// Log loader statistics when done
    #[arg(long)]
    stats: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("material_loader=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    };

    let args = Args::parse();
    let config = Config::from_env()?;
    info!(
        ttl_ms = config.loader.ttl.as_millis() as u64,
        requests = args.request_ids.len(),
        "Loading material request details"
    );

    let store = PgMaterialStore::connect(&config.database_url, config.max_connections).await?;
    let service = DataLoaderService::new(store, config.loader)?;

    let results = join_all(
        args.request_ids
            .iter()
            .map(|id| service.load_request_detail(id)),
    )
    .await;

    let mut details = Vec::with_capacity(results.len());
    for (request_id, result) in args.request_ids.iter().zip(results) {
        match result {
            Ok(detail) => details.push(detail),
            Err(e) if e.is_not_found() => warn!(request_id = %request_id, "Request not found"),
            Err(e) => return Err(e.into()),
        }
    }

    println!("{}", serde_json::to_string_pretty(&details)?);

    if args.stats {
        let stats = service.stats();
        info!(
            request_batches = stats.requests.batches,
            item_batches = stats.items.batches,
            request_hits = stats.requests.hits,
            "Loader statistics"
        );
    }

    Ok(())
}
