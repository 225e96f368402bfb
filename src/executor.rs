//! # Sync Executor
//!
//! Single background worker that drains the job queue. Each tick claims the
//! oldest queued job through the queue's single-flight CAS, runs it to
//! completion, then claims again immediately; only an empty queue waits out
//! the tick interval.
//!
//! A run loads the dealer, decrypts its secret, fetches one time window from
//! the partner gateway and hands the rows to the registered processor. Both
//! outcomes end with a fetch log row and a terminal job status, written in
//! that order so the audit row survives even when the status update fails.
//! A job failure never stops the loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, histogram};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{DatabaseConnection, EntityTrait};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::client::{FetchContext, PartnerClient};
use crate::config::ExecutorConfig;
use crate::crypto::{CryptoKey, decrypt_dealer_secret};
use crate::error::SyncError;
use crate::models::dealer::Entity as Dealer;
use crate::models::{FetchType, JobStatus, parse_fetch_type, sync_job};
use crate::processors::ProcessorRegistry;
use crate::queue::JobQueue;
use crate::repositories::fetch_log::{FetchLogRepository, NewFetchLog};
use crate::upsert::UpsertReport;

/// Worker owning the claim/run/record loop.
pub struct SyncExecutor {
    db: DatabaseConnection,
    queue: JobQueue,
    registry: Arc<ProcessorRegistry>,
    client: PartnerClient,
    crypto_key: CryptoKey,
    config: ExecutorConfig,
}

impl SyncExecutor {
    pub fn new(
        db: DatabaseConnection,
        queue: JobQueue,
        registry: Arc<ProcessorRegistry>,
        client: PartnerClient,
        crypto_key: CryptoKey,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            db,
            queue,
            registry,
            client,
            crypto_key,
            config,
        }
    }

    /// Run until the shutdown token fires.
    ///
    /// A job claimed before the signal still runs to completion; shutdown
    /// only stops further claims.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            tick_ms = self.config.tick_ms,
            max_run_seconds = self.config.max_run_seconds,
            "Starting sync executor"
        );
        let tick = Duration::from_millis(self.config.tick_ms);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Sync executor received shutdown signal");
                    break;
                }
                _ = sleep(tick) => {
                    self.drain(&shutdown).await;
                }
            }
        }

        info!("Sync executor stopped");
    }

    /// Claim and run jobs back to back until the queue is empty. Queued jobs
    /// never wait a tick behind a finished one.
    async fn drain(&self, shutdown: &CancellationToken) {
        while !shutdown.is_cancelled() {
            match self.queue.claim_next().await {
                Ok(Some(job)) => self.run_job(job).await,
                Ok(None) => break,
                Err(error) => {
                    error!("Error claiming next job: {}", error);
                    break;
                }
            }
        }
    }

    /// Run one claimed job to completion and record the outcome.
    #[instrument(skip(self), fields(job_id = %job.id, dealer_id = %job.dealer_id, fetch_type = %job.fetch_type))]
    async fn run_job(&self, job: sync_job::Model) {
        let start_time = Instant::now();
        let started_at: DateTimeWithTimeZone = Utc::now().into();
        info!("Starting sync job {}", job.id);

        // Enqueue validates fetch types, so a row that no longer parses was
        // edited outside the service. Fail it instead of leaving it running.
        let Some(fetch_type) = parse_fetch_type(&job.fetch_type) else {
            error!("Job {} has unknown fetch type {:?}", job.id, job.fetch_type);
            let message = format!("unknown fetch type: {}", job.fetch_type);
            if let Err(mark_error) = self.queue.mark_failed(job.id, &message).await {
                error!("Error marking job {} failed: {}", job.id, mark_error);
            }
            return;
        };

        // The fetched count outlives a failed run so the audit row still
        // records it when the failure happened during persistence.
        let mut records_fetched: i32 = 0;
        let outcome = match tokio::time::timeout(
            Duration::from_secs(self.config.max_run_seconds),
            self.execute(&job, fetch_type, &mut records_fetched),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(self.config.max_run_seconds)),
        };

        let finished_at: DateTimeWithTimeZone = Utc::now().into();
        let duration_ms = start_time.elapsed().as_millis() as i64;
        let log_row = |status: JobStatus, records_fetched: i32, error_message: Option<String>| {
            NewFetchLog {
                job_id: job.id,
                dealer_id: job.dealer_id,
                fetch_type,
                status,
                records_fetched,
                error_message,
                duration_ms,
                started_at,
                finished_at,
            }
        };

        let labels = vec![("fetch_type", fetch_type.as_str().to_string())];
        histogram!("sync_job_duration_ms", &labels).record(duration_ms as f64);

        match outcome {
            Ok(report) => {
                counter!("sync_jobs_succeeded_total", &labels).increment(1);
                info!(
                    "Completed sync job {} in {}ms ({} fetched, {} written)",
                    job.id,
                    duration_ms,
                    records_fetched,
                    report.records_written()
                );
                self.append_fetch_log(log_row(JobStatus::Succeeded, records_fetched, None))
                    .await;
                if let Err(mark_error) = self.queue.mark_succeeded(job.id, report.to_json()).await {
                    error!("Error marking job {} succeeded: {}", job.id, mark_error);
                }
            }
            Err(error) => {
                counter!("sync_jobs_failed_total", &labels).increment(1);
                let message = error.to_string();
                warn!("Job {} failed after {}ms: {}", job.id, duration_ms, message);
                self.append_fetch_log(log_row(
                    JobStatus::Failed,
                    records_fetched,
                    Some(message.clone()),
                ))
                .await;
                if let Err(mark_error) = self.queue.mark_failed(job.id, &message).await {
                    error!("Error marking job {} failed: {}", job.id, mark_error);
                }
            }
        }
    }

    /// The job body: load the dealer, fetch the window, persist the records.
    async fn execute(
        &self,
        job: &sync_job::Model,
        fetch_type: FetchType,
        records_fetched: &mut i32,
    ) -> Result<UpsertReport, SyncError> {
        let dealer = Dealer::find_by_id(job.dealer_id)
            .one(&self.db)
            .await?
            .ok_or(SyncError::UnknownDealer(job.dealer_id))?;
        if !dealer.active {
            return Err(SyncError::InactiveDealer(dealer.id));
        }
        let secret_key = decrypt_dealer_secret(&self.crypto_key, &dealer)?;

        let processor = self.registry.get(fetch_type)?;

        let ctx = FetchContext {
            dealer_code: dealer.code,
            api_key: dealer.api_key,
            secret_key,
            from_time: job.range_from,
            to_time: job.range_to,
            filters: job.filters.clone(),
        };

        let records = processor.fetch_api_data(&self.client, &ctx).await?;
        *records_fetched = records.len() as i32;
        debug!("Fetched {} records for job {}", records.len(), job.id);

        processor
            .process_records(&self.db, job.dealer_id, records)
            .await
    }

    /// Append the audit row for a finished run. Errors are logged and
    /// swallowed so a log write never changes the job outcome.
    async fn append_fetch_log(&self, row: NewFetchLog) {
        if let Err(error) = FetchLogRepository::new(&self.db).append(row).await {
            error!("Error appending fetch log row: {}", error);
        }
    }
}
