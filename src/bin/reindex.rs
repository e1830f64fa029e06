//! Operator command: rebuild a collection's search index from the record
//! store.
//!
//! ```bash
//! searchbridge-reindex --store ./records.db -b bid -c cid
//! ```
//!
//! Exit codes:
//! - `0`  success
//! - `62` indexing subsystem unavailable (backend unreachable)
//! - `63` collection not found
//! - `64` collection has no declared `index:schema` attribute

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use searchbridge::{
    reindex, CollectionId, Config, HttpBackend, Indexer, RedbStore, TenantId,
};

const EXIT_SUCCESS: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_UNAVAILABLE: i32 = 62;
const EXIT_NO_COLLECTION: i32 = 63;
const EXIT_NO_SCHEMA: i32 = 64;

/// Rebuild a collection's search index from the record store.
#[derive(Parser)]
#[command(name = "searchbridge-reindex")]
#[command(about = "Rebuild a collection's search index from the record store")]
#[command(version)]
struct Cli {
    /// Path to the record store file.
    #[arg(long, default_value = "./records.db")]
    store: PathBuf,

    /// Search backend hosts, comma separated.
    #[arg(long, value_delimiter = ',', default_value = "http://localhost:9200")]
    hosts: Vec<String>,

    /// Index name prefix.
    #[arg(long, default_value = "searchbridge")]
    prefix: String,

    /// Bucket (tenant) id.
    #[arg(short, long)]
    bucket: String,

    /// Collection id.
    #[arg(short, long)]
    collection: String,

    /// Records per page when scanning the store.
    #[arg(long)]
    page_size: Option<usize>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let config = Config {
        hosts: cli.hosts,
        index_prefix: cli.prefix,
        reindex_page_size: cli.page_size.unwrap_or(Config::default().reindex_page_size),
        ..Default::default()
    };
    if let Err(e) = config.validate() {
        error!("{}", e);
        return EXIT_FAILURE;
    }

    let store = match RedbStore::open(&cli.store) {
        Ok(store) => store,
        Err(e) => {
            error!("Cannot open record store {}: {}", cli.store.display(), e);
            return EXIT_FAILURE;
        }
    };

    let backend = Arc::new(HttpBackend::new(&config.hosts));
    let indexer = Indexer::new(backend, &config);
    if !indexer.ping() {
        error!("Indexing subsystem not available.");
        return EXIT_UNAVAILABLE;
    }

    let tenant = TenantId::new(cli.bucket);
    let collection = CollectionId::new(cli.collection);

    match reindex(
        &indexer,
        &store,
        &tenant,
        &collection,
        config.reindex_page_size,
    ) {
        Ok(report) => {
            println!("{} records reindexed.", report.total);
            if report.failed_pages > 0 {
                println!("{} pages failed and were skipped.", report.failed_pages);
            }
            EXIT_SUCCESS
        }
        Err(e) if e.is_collection_not_found() => {
            error!("{}", e);
            EXIT_NO_COLLECTION
        }
        Err(e) if e.is_schema_missing() => {
            error!("{}", e);
            EXIT_NO_SCHEMA
        }
        Err(e) if e.is_backend_unavailable() => {
            error!("{}", e);
            EXIT_UNAVAILABLE
        }
        Err(e) => {
            error!("{}", e);
            EXIT_FAILURE
        }
    }
}
