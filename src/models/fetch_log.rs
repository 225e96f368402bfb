//! FetchLog entity model
//!
//! This module contains the SeaORM entity model for the fetch_logs table,
//! an append-only audit trail of every partner API fetch attempt.

use super::sync_job::Entity as SyncJob;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// FetchLog entity recording the outcome of one partner API fetch
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "fetch_logs")]
pub struct Model {
    /// Unique identifier for the log entry (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Sync job this fetch ran under
    pub job_id: Uuid,

    /// Dealer the fetch was performed for
    pub dealer_id: Uuid,

    /// Canonical fetch type string
    pub fetch_type: String,

    /// Outcome of the fetch (succeeded or failed)
    pub status: String,

    /// Number of records the partner API returned
    pub records_fetched: i32,

    /// Failure reason when status is failure
    pub error_message: Option<String>,

    /// Wall-clock duration of the fetch in milliseconds
    pub duration_ms: i64,

    /// Timestamp when the fetch started
    pub started_at: DateTimeWithTimeZone,

    /// Timestamp when the fetch finished
    pub finished_at: DateTimeWithTimeZone,

    /// Timestamp when the log entry was written
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "SyncJob",
        from = "Column::JobId",
        to = "super::sync_job::Column::Id"
    )]
    SyncJob,
}

impl Related<SyncJob> for Entity {
    fn to() -> RelationDef {
        Relation::SyncJob.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
