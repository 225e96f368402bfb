//! # Dealer Sync Main Entry Point
//!
//! This is the main entry point for the Dealer Sync service. It wires the
//! database pool, job queue, sync executor, optional scheduler and the
//! operator API server to one shared shutdown signal.

use std::sync::Arc;

use migration::{Migrator, MigratorTrait};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use dealer_sync::client::PartnerClient;
use dealer_sync::config::ConfigLoader;
use dealer_sync::crypto::CryptoKey;
use dealer_sync::executor::SyncExecutor;
use dealer_sync::processors::ProcessorRegistry;
use dealer_sync::queue::JobQueue;
use dealer_sync::scheduler::SyncScheduler;
use dealer_sync::server::{AppState, run_server};
use dealer_sync::token::TokenManager;
use dealer_sync::{db, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from layered env files and variables
    let config = ConfigLoader::new().load()?;

    telemetry::init_tracing(&config)?;

    info!("Loaded configuration for profile: {}", config.profile);
    if let Ok(redacted_json) = config.redacted_json() {
        info!("Configuration: {}", redacted_json);
    }

    let db = db::init_pool(&config).await?;
    Migrator::up(&db, None).await?;

    // load() already checked presence and length of the key
    let key_bytes = config.crypto_key.clone().ok_or("CRYPTO_KEY is required")?;
    let crypto_key = CryptoKey::new(key_bytes)?;

    let registry = Arc::new(ProcessorRegistry::with_default_processors(&config.upsert));
    let queue = JobQueue::new(db.clone(), Arc::clone(&registry));

    // Jobs left running by an earlier crash would block the queue forever.
    let recovered = queue
        .recover_stale_running(config.executor.max_run_seconds)
        .await?;
    if recovered > 0 {
        warn!(
            "Recovered {} stale running jobs left by an earlier run",
            recovered
        );
    }

    let tokens = Arc::new(TokenManager::new(&config.token));
    let client = PartnerClient::new(config.partner_api.clone(), tokens)?;

    let config = Arc::new(config);
    let shutdown = CancellationToken::new();

    let executor = SyncExecutor::new(
        db.clone(),
        queue.clone(),
        Arc::clone(&registry),
        client,
        crypto_key.clone(),
        config.executor.clone(),
    );
    let executor_handle = tokio::spawn(executor.run(shutdown.clone()));

    let scheduler_handle = if config.scheduler.enabled {
        let scheduler = SyncScheduler::new(config.scheduler.clone(), db.clone(), queue.clone());
        Some(tokio::spawn(scheduler.run(shutdown.clone())))
    } else {
        info!("Scheduler is disabled; jobs are only enqueued through the API");
        None
    };

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                signal_shutdown.cancel();
            }
            Err(err) => error!("Failed to listen for shutdown signal: {}", err),
        }
    });

    let state = AppState {
        config,
        db,
        queue,
        registry,
        crypto_key,
    };
    let result = run_server(state, shutdown.clone()).await;

    // Let in-flight work finish before the process exits.
    shutdown.cancel();
    let _ = executor_handle.await;
    if let Some(handle) = scheduler_handle {
        let _ = handle.await;
    }

    result
}
