//! # Job Queue Manager
//!
//! Database-backed FIFO queue for sync jobs. All queue state lives in the
//! `sync_jobs` table; claiming is a single compare-and-swap UPDATE guarded by
//! `NOT EXISTS (running job)`, so the one-running-job invariant holds even
//! when several service processes share the database.

use std::sync::Arc;

use chrono::{Duration, Utc};
use metrics::counter;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, QueryTrait, Set, TransactionTrait,
};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SyncError;
use crate::models::dealer::Entity as Dealer;
use crate::models::sync_job::{self, Entity as SyncJob};
use crate::models::{FetchType, JobStatus, parse_fetch_type};
use crate::processors::ProcessorRegistry;

/// A validated-on-enqueue job submission.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub dealer_id: Uuid,
    pub fetch_type: String,
    pub range_from: DateTimeWithTimeZone,
    pub range_to: DateTimeWithTimeZone,
    pub filters: Option<JsonValue>,
}

/// Filters for listing jobs. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub dealer_id: Option<Uuid>,
    pub fetch_type: Option<FetchType>,
    pub limit: u64,
}

/// One consistent view of the queue, read inside a single transaction.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub running: Option<sync_job::Model>,
    pub queued: Vec<sync_job::Model>,
    pub queue_length: u64,
    pub is_processing: bool,
}

/// FIFO queue of sync jobs backed by `sync_jobs`.
#[derive(Clone)]
pub struct JobQueue {
    db: DatabaseConnection,
    registry: Arc<ProcessorRegistry>,
}

impl JobQueue {
    pub fn new(db: DatabaseConnection, registry: Arc<ProcessorRegistry>) -> Self {
        Self { db, registry }
    }

    /// Validate and enqueue one job at the FIFO tail.
    pub async fn enqueue(&self, new_job: NewJob) -> Result<sync_job::Model, SyncError> {
        let fetch_type = self.validate(&new_job).await?;

        let now: DateTimeWithTimeZone = Utc::now().into();
        let job = sync_job::ActiveModel {
            id: Set(Uuid::new_v4()),
            dealer_id: Set(new_job.dealer_id),
            fetch_type: Set(fetch_type.as_str().to_string()),
            range_from: Set(new_job.range_from),
            range_to: Set(new_job.range_to),
            filters: Set(new_job.filters),
            status: Set(JobStatus::Queued.as_str().to_string()),
            result: Set(None),
            error_message: Set(None),
            created_at: Set(now),
            started_at: Set(None),
            completed_at: Set(None),
        }
        .insert(&self.db)
        .await?;

        counter!("sync_queue_enqueued_total").increment(1);
        info!(
            job_id = %job.id,
            dealer_id = %job.dealer_id,
            fetch_type = %job.fetch_type,
            "enqueued sync job"
        );
        Ok(job)
    }

    /// Enqueue a batch. Each item is validated and inserted independently, so
    /// one rejected item never blocks its siblings.
    pub async fn enqueue_many(
        &self,
        items: Vec<NewJob>,
    ) -> Vec<Result<sync_job::Model, SyncError>> {
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            results.push(self.enqueue(item).await);
        }
        results
    }

    async fn validate(&self, new_job: &NewJob) -> Result<FetchType, SyncError> {
        if new_job.range_from > new_job.range_to {
            return Err(SyncError::Validation(
                "range_from must not be after range_to".to_string(),
            ));
        }

        let Some(fetch_type) = parse_fetch_type(&new_job.fetch_type) else {
            return Err(SyncError::Validation(format!(
                "unknown fetch type: {}",
                new_job.fetch_type
            )));
        };
        if !self.registry.contains(fetch_type) {
            return Err(SyncError::UnsupportedFetchType(new_job.fetch_type.clone()));
        }

        let dealer = Dealer::find_by_id(new_job.dealer_id)
            .one(&self.db)
            .await?
            .ok_or(SyncError::UnknownDealer(new_job.dealer_id))?;
        if !dealer.active {
            return Err(SyncError::InactiveDealer(dealer.id));
        }

        Ok(fetch_type)
    }

    /// Cancel a queued job. Jobs in any other state are left untouched and
    /// the caller gets an error naming the state that blocked the cancel.
    pub async fn cancel(&self, job_id: Uuid) -> Result<sync_job::Model, SyncError> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let result = SyncJob::update_many()
            .col_expr(
                sync_job::Column::Status,
                Expr::value(JobStatus::Cancelled.as_str()),
            )
            .col_expr(sync_job::Column::CompletedAt, Expr::value(now))
            .filter(sync_job::Column::Id.eq(job_id))
            .filter(sync_job::Column::Status.eq(JobStatus::Queued.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            let job = self
                .get(job_id)
                .await?
                .ok_or(SyncError::UnknownJob(job_id))?;
            return Err(SyncError::NotCancellable {
                job_id,
                status: job.status,
            });
        }

        info!(job_id = %job_id, "cancelled sync job");
        self.get(job_id)
            .await?
            .ok_or_else(|| sea_orm::DbErr::RecordNotFound(format!("sync_jobs: {job_id}")).into())
    }

    /// Fetch one job by id.
    pub async fn get(&self, job_id: Uuid) -> Result<Option<sync_job::Model>, SyncError> {
        Ok(SyncJob::find_by_id(job_id).one(&self.db).await?)
    }

    /// List jobs, newest first.
    pub async fn list(&self, filter: JobFilter) -> Result<Vec<sync_job::Model>, SyncError> {
        let mut query = SyncJob::find();
        if let Some(status) = filter.status {
            query = query.filter(sync_job::Column::Status.eq(status.as_str()));
        }
        if let Some(dealer_id) = filter.dealer_id {
            query = query.filter(sync_job::Column::DealerId.eq(dealer_id));
        }
        if let Some(fetch_type) = filter.fetch_type {
            query = query.filter(sync_job::Column::FetchType.eq(fetch_type.as_str()));
        }

        let jobs = query
            .order_by_desc(sync_job::Column::CreatedAt)
            .order_by_desc(sync_job::Column::Id)
            .limit(filter.limit.max(1))
            .all(&self.db)
            .await?;
        Ok(jobs)
    }

    /// One consistent snapshot of the queue.
    pub async fn status(&self) -> Result<QueueSnapshot, SyncError> {
        let txn = self.db.begin().await?;

        let running = SyncJob::find()
            .filter(sync_job::Column::Status.eq(JobStatus::Running.as_str()))
            .one(&txn)
            .await?;
        let queued = SyncJob::find()
            .filter(sync_job::Column::Status.eq(JobStatus::Queued.as_str()))
            .order_by_asc(sync_job::Column::CreatedAt)
            .order_by_asc(sync_job::Column::Id)
            .all(&txn)
            .await?;

        txn.commit().await?;

        let is_processing = running.is_some();
        let queue_length = queued.len() as u64;
        Ok(QueueSnapshot {
            running,
            queued,
            queue_length,
            is_processing,
        })
    }

    /// Claim the FIFO head if, and only if, no job is currently running.
    ///
    /// The claim itself is a single UPDATE whose WHERE clause re-checks both
    /// the queued status and the absence of any running job, so two racing
    /// claimers can never both win: one sees `rows_affected == 1`, the other
    /// zero.
    pub async fn claim_next(&self) -> Result<Option<sync_job::Model>, SyncError> {
        let txn = self.db.begin().await?;

        let head: Option<Uuid> = SyncJob::find()
            .select_only()
            .column(sync_job::Column::Id)
            .filter(sync_job::Column::Status.eq(JobStatus::Queued.as_str()))
            .order_by_asc(sync_job::Column::CreatedAt)
            .order_by_asc(sync_job::Column::Id)
            .limit(1)
            .into_tuple::<Uuid>()
            .one(&txn)
            .await?;

        let Some(head) = head else {
            txn.commit().await?;
            return Ok(None);
        };

        let running_subquery = SyncJob::find()
            .select_only()
            .column(sync_job::Column::Id)
            .filter(sync_job::Column::Status.eq(JobStatus::Running.as_str()))
            .into_query();

        let now: DateTimeWithTimeZone = Utc::now().into();
        let update = SyncJob::update_many()
            .col_expr(
                sync_job::Column::Status,
                Expr::value(JobStatus::Running.as_str()),
            )
            .col_expr(sync_job::Column::StartedAt, Expr::value(now))
            .filter(sync_job::Column::Id.eq(head))
            .filter(sync_job::Column::Status.eq(JobStatus::Queued.as_str()))
            .filter(Expr::exists(running_subquery).not())
            .exec(&txn)
            .await?;

        if update.rows_affected == 0 {
            txn.commit().await?;
            return Ok(None);
        }

        let job = SyncJob::find_by_id(head)
            .one(&txn)
            .await?
            .ok_or_else(|| sea_orm::DbErr::RecordNotFound(format!("sync_jobs: {head}")))?;
        txn.commit().await?;

        counter!("sync_queue_claimed_total").increment(1);
        debug!(job_id = %job.id, fetch_type = %job.fetch_type, "claimed sync job");
        Ok(Some(job))
    }

    /// Record a successful run: terminal status, result report, completion
    /// timestamp.
    pub async fn mark_succeeded(&self, job_id: Uuid, result: JsonValue) -> Result<(), SyncError> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let update = SyncJob::update_many()
            .col_expr(
                sync_job::Column::Status,
                Expr::value(JobStatus::Succeeded.as_str()),
            )
            .col_expr(sync_job::Column::Result, Expr::value(result))
            .col_expr(sync_job::Column::CompletedAt, Expr::value(now))
            .filter(sync_job::Column::Id.eq(job_id))
            .filter(sync_job::Column::Status.eq(JobStatus::Running.as_str()))
            .exec(&self.db)
            .await?;

        if update.rows_affected == 0 {
            warn!(job_id = %job_id, "job was not running when marked succeeded");
        }
        Ok(())
    }

    /// Record a failed run with the error that killed it.
    pub async fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<(), SyncError> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let update = SyncJob::update_many()
            .col_expr(
                sync_job::Column::Status,
                Expr::value(JobStatus::Failed.as_str()),
            )
            .col_expr(sync_job::Column::ErrorMessage, Expr::value(error))
            .col_expr(sync_job::Column::CompletedAt, Expr::value(now))
            .filter(sync_job::Column::Id.eq(job_id))
            .filter(sync_job::Column::Status.eq(JobStatus::Running.as_str()))
            .exec(&self.db)
            .await?;

        if update.rows_affected == 0 {
            warn!(job_id = %job_id, "job was not running when marked failed");
        }
        Ok(())
    }

    /// Fail `running` rows left behind by a crashed process. Called once at
    /// startup, before the executor loop begins claiming.
    ///
    /// Only claims older than the job ceiling are touched: a row inside the
    /// ceiling may be a job legitimately running in a sibling process, and
    /// the CAS claim already keeps this process off the slot until it frees.
    pub async fn recover_stale_running(&self, max_run_seconds: u64) -> Result<u64, SyncError> {
        let now = Utc::now();
        let cutoff: DateTimeWithTimeZone =
            (now - Duration::seconds(max_run_seconds as i64)).into();
        let completed: DateTimeWithTimeZone = now.into();
        let update = SyncJob::update_many()
            .col_expr(
                sync_job::Column::Status,
                Expr::value(JobStatus::Failed.as_str()),
            )
            .col_expr(
                sync_job::Column::ErrorMessage,
                Expr::value("job exceeded the run ceiling after a service restart"),
            )
            .col_expr(sync_job::Column::CompletedAt, Expr::value(completed))
            .filter(sync_job::Column::Status.eq(JobStatus::Running.as_str()))
            .filter(sync_job::Column::StartedAt.lt(cutoff))
            .exec(&self.db)
            .await?;

        if update.rows_affected > 0 {
            warn!(
                recovered = update.rows_affected,
                "failed stale running jobs from a previous process"
            );
        }
        Ok(update.rows_affected)
    }
}
