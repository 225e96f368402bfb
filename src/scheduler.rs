//! # Sync Scheduler
//!
//! Background task that periodically enqueues sync jobs for every active
//! dealer and configured fetch type. A pair with a queued or running job is
//! skipped, so at most one job per (dealer, fetch type) is ever pending from
//! the scheduler. Each enqueued job covers a fixed lookback window ending at
//! the tick time.

use chrono::{Duration as ChronoDuration, Utc};
use metrics::{counter, histogram};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use tokio::time::{Duration as TokioDuration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::SyncError;
use crate::models::sync_job::{Column as SyncJobColumn, Entity as SyncJob};
use crate::models::{FetchType, parse_fetch_type};
use crate::queue::{JobQueue, NewJob};
use crate::repositories::DealerRepository;

/// Background scheduler service.
pub struct SyncScheduler {
    config: SchedulerConfig,
    db: DatabaseConnection,
    queue: JobQueue,
    fetch_types: Vec<FetchType>,
}

#[derive(Debug, Default)]
struct TickStats {
    dealers_polled: u64,
    jobs_enqueued: u64,
    pairs_skipped_pending: u64,
    enqueue_errors: u64,
}

impl SyncScheduler {
    /// Create a new scheduler instance. Unknown fetch type names in the
    /// configuration are dropped here with a warning rather than failing
    /// every tick.
    pub fn new(config: SchedulerConfig, db: DatabaseConnection, queue: JobQueue) -> Self {
        let (fetch_types, unknown) = resolve_fetch_types(&config.fetch_types);
        if !unknown.is_empty() {
            warn!(
                "Ignoring unknown scheduler fetch types: {}",
                unknown.join(", ")
            );
        }
        Self {
            config,
            db,
            queue,
            fetch_types,
        }
    }

    /// Run the scheduler loop until the provided shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        if self.fetch_types.is_empty() {
            warn!("Sync scheduler has no valid fetch types configured; not scheduling");
            return;
        }

        info!(
            tick_interval_seconds = self.config.tick_interval_seconds,
            lookback_seconds = self.config.lookback_seconds,
            "Starting sync scheduler"
        );
        let tick_interval = TokioDuration::from_secs(self.config.tick_interval_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Sync scheduler shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = ?err, "Scheduler tick failed");
                    }
                    let elapsed = tick_started.elapsed();
                    histogram!("sync_scheduler_tick_duration_ms")
                        .record(elapsed.as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Sync scheduler stopped");
    }

    async fn tick(&self) -> Result<(), SyncError> {
        let mut stats = TickStats::default();

        let dealers = DealerRepository::new(&self.db).list_active().await?;

        for dealer in dealers {
            stats.dealers_polled += 1;
            for fetch_type in &self.fetch_types {
                self.process_pair(dealer.id, *fetch_type, &mut stats).await;
            }
        }

        debug!(
            polled = stats.dealers_polled,
            enqueued = stats.jobs_enqueued,
            skipped_pending = stats.pairs_skipped_pending,
            errors = stats.enqueue_errors,
            "Scheduler tick completed"
        );

        Ok(())
    }

    /// Enqueue one job for a (dealer, fetch type) pair unless one is already
    /// queued or running. Errors are counted, logged and never abort a tick.
    async fn process_pair(&self, dealer_id: Uuid, fetch_type: FetchType, stats: &mut TickStats) {
        match self.pending_exists(dealer_id, fetch_type).await {
            Ok(true) => {
                stats.pairs_skipped_pending += 1;
                debug!(
                    dealer_id = %dealer_id,
                    fetch_type = fetch_type.as_str(),
                    "Skipping scheduling; pending job exists"
                );
                return;
            }
            Ok(false) => {}
            Err(err) => {
                stats.enqueue_errors += 1;
                error!(
                    error = ?err,
                    dealer_id = %dealer_id,
                    "Failed to check pending jobs for scheduling"
                );
                return;
            }
        }

        let now = Utc::now();
        let range_from = now - ChronoDuration::seconds(self.config.lookback_seconds as i64);
        let job = NewJob {
            dealer_id,
            fetch_type: fetch_type.as_str().to_string(),
            range_from: range_from.into(),
            range_to: now.into(),
            filters: None,
        };

        match self.queue.enqueue(job).await {
            Ok(job) => {
                stats.jobs_enqueued += 1;
                counter!("sync_scheduler_jobs_enqueued_total").increment(1);
                info!(
                    job_id = %job.id,
                    dealer_id = %dealer_id,
                    fetch_type = fetch_type.as_str(),
                    range_from = %range_from,
                    range_to = %now,
                    "Enqueued scheduled sync job"
                );
            }
            Err(err) => {
                stats.enqueue_errors += 1;
                error!(
                    error = %err,
                    dealer_id = %dealer_id,
                    fetch_type = fetch_type.as_str(),
                    "Failed to enqueue scheduled sync job"
                );
            }
        }
    }

    async fn pending_exists(
        &self,
        dealer_id: Uuid,
        fetch_type: FetchType,
    ) -> Result<bool, SyncError> {
        let pending = SyncJob::find()
            .filter(SyncJobColumn::DealerId.eq(dealer_id))
            .filter(SyncJobColumn::FetchType.eq(fetch_type.as_str()))
            .filter(SyncJobColumn::Status.is_in(vec!["queued", "running"]))
            .count(&self.db)
            .await?;
        Ok(pending > 0)
    }
}

/// Split configured fetch type names into resolved types and unknown names,
/// preserving order and dropping duplicates.
fn resolve_fetch_types(names: &[String]) -> (Vec<FetchType>, Vec<String>) {
    let mut resolved = Vec::new();
    let mut unknown = Vec::new();
    for name in names {
        match parse_fetch_type(name) {
            Some(fetch_type) if !resolved.contains(&fetch_type) => resolved.push(fetch_type),
            Some(_) => {}
            None => unknown.push(name.clone()),
        }
    }
    (resolved, unknown)
}
