use std::sync::Arc;

use anyhow::{Context, Result};
use broker_storage::sqlite::SqliteStore;
use broker_storage::Store;
use broker_tangle::iri::IriClient;
use broker_tangle::{Blake3Pow, Ledger};
use tracing::info;

use crate::broker::Broker;
use crate::config::NodeConfig;
use crate::pool::WorkerPool;
use crate::report::{ErrorReporter, TracingReporter};
use crate::scheduler::Scheduler;
use crate::verify::TangleVerifier;

/// Builds the broker from `config` and runs its background jobs until ctrl-c.
pub async fn run_node(config: NodeConfig) -> Result<()> {
    if let Some(parent) = config.db_file.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&config.db_file).context("Failed to open broker database")?,
    );

    let url = reqwest::Url::parse(&config.iri.url())
        .with_context(|| format!("Invalid IRI node url {}", config.iri.url()))?;
    let ledger: Arc<dyn Ledger> = Arc::new(
        IriClient::new(url, config.iri.timeout).context("Failed to create IRI client")?,
    );
    let reporter: Arc<dyn ErrorReporter> = Arc::new(TracingReporter);

    let pool = WorkerPool::start(
        config.pool.clone(),
        Arc::clone(&store),
        Arc::clone(&ledger),
        Arc::new(Blake3Pow::new()),
        Arc::clone(&reporter),
    )
    .await
    .context("Failed to start PoW worker pool")?;
    let verifier = TangleVerifier::new(ledger, reporter);
    let broker = Arc::new(Broker::new(
        store,
        Arc::new(pool),
        verifier,
        config.broker.clone(),
    ));

    let mut scheduler = Scheduler::new();
    let b = Arc::clone(&broker);
    scheduler.spawn(
        "process_paid_sessions",
        config.jobs.process_paid_sessions,
        move || {
            let broker = Arc::clone(&b);
            async move { broker.process_paid_sessions().await }
        },
    );
    let b = Arc::clone(&broker);
    scheduler.spawn(
        "process_unassigned_chunks",
        config.jobs.process_unassigned_chunks,
        move || {
            let broker = Arc::clone(&b);
            async move { broker.process_unassigned_chunks().await }
        },
    );
    let b = Arc::clone(&broker);
    scheduler.spawn(
        "verify_unverified_chunks",
        config.jobs.verify_unverified_chunks,
        move || {
            let broker = Arc::clone(&b);
            async move { broker.verify_unverified_chunks().await }
        },
    );
    let b = Arc::clone(&broker);
    scheduler.spawn(
        "confirm_complete_chunks",
        config.jobs.confirm_complete_chunks,
        move || {
            let broker = Arc::clone(&b);
            async move { broker.confirm_complete_chunks().await }
        },
    );

    info!("Broker node running against {}", config.iri.url());
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down broker node");
    scheduler.shutdown().await;
    broker.pool().shutdown().await;
    Ok(())
}

/// Runs the broker node on a new multi-threaded runtime.
pub fn run(config: NodeConfig) -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?
        .block_on(run_node(config))
}
