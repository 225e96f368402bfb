//! Test utilities for database and pipeline testing.
//!
//! This module provides fixtures for setting up in-memory SQLite databases
//! with migrations applied, registering dealers through the real repository
//! so secrets are stored encrypted, and driving queued jobs to completion.

use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use dealer_sync::client::PartnerClient;
use dealer_sync::config::PartnerApiConfig;
use dealer_sync::crypto::CryptoKey;
use dealer_sync::models::{parse_job_status, sync_job};
use dealer_sync::queue::JobQueue;
use dealer_sync::repositories::dealer::{DealerRepository, NewDealer};
use dealer_sync::token::TokenManager;

/// Sets up an in-memory SQLite database with all migrations applied.
///
/// # Returns
///
/// Returns a Result containing the database connection
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;

    Migrator::up(&db, None).await?;

    Ok(db)
}

/// A fixed 32-byte key so encrypted fixtures are reproducible across tests.
pub fn test_crypto_key() -> CryptoKey {
    CryptoKey::new(vec![7u8; 32]).expect("32 bytes is a valid key")
}

/// Registers an active dealer through the real repository, so its partner
/// secret round-trips the production encryption path.
///
/// The api key and secret are derived from the code, which keeps wiremock
/// header expectations per dealer predictable.
pub async fn create_test_dealer(
    db: &DatabaseConnection,
    key: &CryptoKey,
    code: &str,
) -> Result<Uuid> {
    let dealer = DealerRepository::new(db)
        .create(
            key,
            NewDealer {
                code: code.to_string(),
                name: format!("Dealer {}", code),
                api_key: format!("api-key-{}", code),
                secret_key: format!("secret-{}", code),
                active: true,
            },
        )
        .await?;

    Ok(dealer.id)
}

/// Partner gateway settings tuned for wiremock: immediate retries, no jitter.
#[allow(dead_code)]
pub fn partner_test_config(base_url: &str) -> PartnerApiConfig {
    PartnerApiConfig {
        base_url: base_url.to_string(),
        timeout_seconds: 5,
        max_retries: 2,
        retry_base_ms: 1,
        retry_max_ms: 4,
        retry_jitter_factor: 0.0,
    }
}

/// Builds a partner client pointed at a wiremock server.
#[allow(dead_code)]
pub fn partner_test_client(base_url: &str) -> Result<PartnerClient> {
    let tokens = Arc::new(TokenManager::with_parts(Duration::from_secs(3600), 16));
    let client = PartnerClient::new(partner_test_config(base_url), tokens)?;
    Ok(client)
}

/// Polls the queue until the job reaches a terminal status.
///
/// Fails after five seconds so a wedged executor surfaces as a test failure
/// instead of a hang.
#[allow(dead_code)]
pub async fn wait_for_terminal(queue: &JobQueue, job_id: Uuid) -> Result<sync_job::Model> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

    loop {
        let job = queue
            .get(job_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("job {} disappeared from the queue", job_id))?;

        let terminal = parse_job_status(&job.status)
            .map(|status| status.is_terminal())
            .unwrap_or(false);
        if terminal {
            return Ok(job);
        }

        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!(
                "job {} still {} after five seconds",
                job_id,
                job.status
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
