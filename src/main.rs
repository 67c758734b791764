use std::error::Error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use booklog::{
    core::store::LibraryStore,
    persist::{OpSink, sqlite::SqliteOpSink},
    runtime::handle::spawn_library,
    server::{CliArgs, LibraryServer, ServerConfig},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = CliArgs::parse();

    let (store, sink): (LibraryStore, Option<Box<dyn OpSink>>) = if args.in_memory {
        tracing::info!("running in memory, nothing will be persisted");
        (LibraryStore::new(), None)
    } else {
        let sink = SqliteOpSink::open(&args.db_path)?;
        let store = sink.load_store()?;
        tracing::info!(
            path = %args.db_path.display(),
            books = store.books().len(),
            transactions = store.ledger().len(),
            last_op_seq = store.latest_op_seq(),
            "recovered library from journal"
        );
        let sink: Box<dyn OpSink> = Box::new(sink);
        (store, Some(sink))
    };

    let handle = spawn_library(store, sink, args.to_runtime_config());
    LibraryServer::new(handle.clone(), ServerConfig::from(&args))
        .run()
        .await?;
    handle.shutdown().await?;
    Ok(())
}
