//! # Fetch Log Repository
//!
//! Append-only audit trail. One row per executed fetch, written for both
//! successful and failed runs; rows are never updated or deleted.

use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::cursor::CursorData;
use crate::error::SyncError;
use crate::models::fetch_log::{self, Entity as FetchLog};
use crate::models::{FetchType, JobStatus};

/// One fetch outcome to append to the audit trail.
#[derive(Debug, Clone)]
pub struct NewFetchLog {
    pub job_id: Uuid,
    pub dealer_id: Uuid,
    pub fetch_type: FetchType,
    pub status: JobStatus,
    pub records_fetched: i32,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    pub started_at: DateTimeWithTimeZone,
    pub finished_at: DateTimeWithTimeZone,
}

/// Filters for listing fetch logs. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct FetchLogFilter {
    pub dealer_id: Option<Uuid>,
    pub fetch_type: Option<FetchType>,
    pub status: Option<JobStatus>,
    pub started_after: Option<DateTime<Utc>>,
    pub started_before: Option<DateTime<Utc>>,
    pub cursor: Option<CursorData>,
    pub limit: u64,
}

/// Repository for fetch log database operations
pub struct FetchLogRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> FetchLogRepository<'a> {
    /// Create a new FetchLogRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Append one audit row.
    pub async fn append(&self, new: NewFetchLog) -> Result<fetch_log::Model, SyncError> {
        let log = fetch_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            job_id: Set(new.job_id),
            dealer_id: Set(new.dealer_id),
            fetch_type: Set(new.fetch_type.as_str().to_string()),
            status: Set(new.status.as_str().to_string()),
            records_fetched: Set(new.records_fetched),
            error_message: Set(new.error_message),
            duration_ms: Set(new.duration_ms),
            started_at: Set(new.started_at),
            finished_at: Set(new.finished_at),
            created_at: Set(Utc::now().into()),
        }
        .insert(self.db)
        .await?;

        Ok(log)
    }

    /// List audit rows, newest first, with keyset pagination over
    /// (created_at, id).
    pub async fn list(&self, filter: FetchLogFilter) -> Result<Vec<fetch_log::Model>, SyncError> {
        let mut query = FetchLog::find();

        if let Some(dealer_id) = filter.dealer_id {
            query = query.filter(fetch_log::Column::DealerId.eq(dealer_id));
        }
        if let Some(fetch_type) = filter.fetch_type {
            query = query.filter(fetch_log::Column::FetchType.eq(fetch_type.as_str()));
        }
        if let Some(status) = filter.status {
            query = query.filter(fetch_log::Column::Status.eq(status.as_str()));
        }
        if let Some(after) = filter.started_after {
            query = query.filter(fetch_log::Column::StartedAt.gte(after));
        }
        if let Some(before) = filter.started_before {
            query = query.filter(fetch_log::Column::StartedAt.lte(before));
        }

        if let Some(cursor) = filter.cursor {
            query = query.filter(
                Condition::any()
                    .add(fetch_log::Column::CreatedAt.lt(cursor.created_at))
                    .add(
                        Condition::all()
                            .add(fetch_log::Column::CreatedAt.eq(cursor.created_at))
                            .add(fetch_log::Column::Id.lt(cursor.id)),
                    ),
            );
        }

        let logs = query
            .order_by_desc(fetch_log::Column::CreatedAt)
            .order_by_desc(fetch_log::Column::Id)
            .limit(filter.limit.max(1))
            .all(self.db)
            .await?;

        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CryptoKey;
    use crate::models::sync_job;
    use crate::repositories::dealer::{DealerRepository, NewDealer};
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    async fn setup_db() -> (DatabaseConnection, Uuid, Uuid) {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("create in-memory db");
        Migrator::up(&db, None).await.expect("apply migrations");

        let key = CryptoKey::new(vec![1u8; 32]).expect("valid test key");
        let dealer = DealerRepository::new(&db)
            .create(
                &key,
                NewDealer {
                    code: "DLR001".to_string(),
                    name: "Mitra Motor".to_string(),
                    api_key: "api-key-1".to_string(),
                    secret_key: "secret".to_string(),
                    active: true,
                },
            )
            .await
            .expect("create dealer");

        let job_id = insert_job(&db, dealer.id).await;
        (db, dealer.id, job_id)
    }

    async fn insert_job(db: &DatabaseConnection, dealer_id: Uuid) -> Uuid {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let job = sync_job::ActiveModel {
            id: Set(Uuid::new_v4()),
            dealer_id: Set(dealer_id),
            fetch_type: Set("work_order".to_string()),
            range_from: Set(now),
            range_to: Set(now),
            filters: Set(None),
            status: Set("succeeded".to_string()),
            result: Set(None),
            error_message: Set(None),
            created_at: Set(now),
            started_at: Set(Some(now)),
            completed_at: Set(Some(now)),
        }
        .insert(db)
        .await
        .expect("insert job");
        job.id
    }

    fn sample_log(job_id: Uuid, dealer_id: Uuid, status: JobStatus) -> NewFetchLog {
        let now: DateTimeWithTimeZone = Utc::now().into();
        NewFetchLog {
            job_id,
            dealer_id,
            fetch_type: FetchType::WorkOrder,
            status,
            records_fetched: 12,
            error_message: None,
            duration_ms: 321,
            started_at: now,
            finished_at: now,
        }
    }

    #[tokio::test]
    async fn append_and_list_roundtrip() {
        let (db, dealer_id, job_id) = setup_db().await;
        let repo = FetchLogRepository::new(&db);

        repo.append(sample_log(job_id, dealer_id, JobStatus::Succeeded))
            .await
            .unwrap();

        let logs = repo
            .list(FetchLogFilter {
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].fetch_type, "work_order");
        assert_eq!(logs[0].status, "succeeded");
        assert_eq!(logs[0].records_fetched, 12);
    }

    #[tokio::test]
    async fn status_filter_narrows_results() {
        let (db, dealer_id, job_id) = setup_db().await;
        let repo = FetchLogRepository::new(&db);

        repo.append(sample_log(job_id, dealer_id, JobStatus::Succeeded))
            .await
            .unwrap();
        let mut failed = sample_log(job_id, dealer_id, JobStatus::Failed);
        failed.error_message = Some("partner API returned status 500".to_string());
        repo.append(failed).await.unwrap();

        let logs = repo
            .list(FetchLogFilter {
                status: Some(JobStatus::Failed),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(logs.len(), 1);
        assert!(logs[0].error_message.as_deref().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn cursor_pages_do_not_overlap() {
        let (db, dealer_id, job_id) = setup_db().await;
        let repo = FetchLogRepository::new(&db);

        for _ in 0..5 {
            repo.append(sample_log(job_id, dealer_id, JobStatus::Succeeded))
                .await
                .unwrap();
        }

        let first_page = repo
            .list(FetchLogFilter {
                limit: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(first_page.len(), 2);

        let cursor = CursorData {
            created_at: first_page[1].created_at.into(),
            id: first_page[1].id,
        };
        let second_page = repo
            .list(FetchLogFilter {
                cursor: Some(cursor),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(second_page.len(), 3);
        let first_ids: Vec<Uuid> = first_page.iter().map(|log| log.id).collect();
        assert!(second_page.iter().all(|log| !first_ids.contains(&log.id)));
    }
}
