//! SyncJob entity model
//!
//! This module contains the SeaORM entity model for the sync_jobs table,
//! which represents queued fetch requests against the partner DMS API.

use super::dealer::Entity as Dealer;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// SyncJob entity representing one queued fetch against the partner API
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_jobs")]
pub struct Model {
    /// Unique identifier for the sync job (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Dealer this job fetches data for
    pub dealer_id: Uuid,

    /// Canonical fetch type string (e.g. work_order, prospect)
    pub fetch_type: String,

    /// Inclusive start of the requested date range
    pub range_from: DateTimeWithTimeZone,

    /// Inclusive end of the requested date range
    pub range_to: DateTimeWithTimeZone,

    /// Optional extra query filters forwarded to the partner API
    #[sea_orm(column_type = "JsonBinary")]
    pub filters: Option<JsonValue>,

    /// Current lifecycle status (queued, running, succeeded, failed, cancelled)
    pub status: String,

    /// Upsert report for succeeded jobs (counts per phase)
    #[sea_orm(column_type = "JsonBinary")]
    pub result: Option<JsonValue>,

    /// Human-readable failure reason for failed jobs
    pub error_message: Option<String>,

    /// Timestamp when the job was enqueued
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the executor claimed the job
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the job reached a terminal status
    pub completed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Dealer",
        from = "Column::DealerId",
        to = "super::dealer::Column::Id"
    )]
    Dealer,
}

impl Related<Dealer> for Entity {
    fn to() -> RelationDef {
        Relation::Dealer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
