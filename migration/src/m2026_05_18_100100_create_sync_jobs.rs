//! Migration to create the sync_jobs table.
//!
//! This migration creates the sync_jobs table which holds the persisted FIFO
//! queue of fetch jobs, one row per (dealer, fetch type, time window) request.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncJobs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SyncJobs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(SyncJobs::DealerId).uuid().not_null())
                    .col(ColumnDef::new(SyncJobs::FetchType).text().not_null())
                    .col(
                        ColumnDef::new(SyncJobs::RangeFrom)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::RangeTo)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SyncJobs::Filters).json_binary().null())
                    .col(
                        ColumnDef::new(SyncJobs::Status)
                            .text()
                            .not_null()
                            .default("queued"),
                    )
                    .col(ColumnDef::new(SyncJobs::Result).json_binary().null())
                    .col(ColumnDef::new(SyncJobs::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(SyncJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sync_jobs_dealer_id")
                            .from(SyncJobs::Table, SyncJobs::DealerId)
                            .to(Dealers::Table, Dealers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Partial index backing the FIFO head scan; only queued rows matter there
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_sync_jobs_queue_order ON sync_jobs (created_at, id) WHERE status = 'queued'".to_string(),
            ))
            .await?;

        // Index for the single-runner guard and status filters
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_jobs_status")
                    .table(SyncJobs::Table)
                    .col(SyncJobs::Status)
                    .to_owned(),
            )
            .await?;

        // Index for per-dealer job history views, newest first
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_sync_jobs_dealer_created ON sync_jobs (dealer_id, created_at DESC)".to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop indexes first
        manager
            .drop_index(Index::drop().name("idx_sync_jobs_queue_order").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_sync_jobs_status").to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_sync_jobs_dealer_created")
                    .to_owned(),
            )
            .await?;

        // Then drop table
        manager
            .drop_table(Table::drop().table(SyncJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncJobs {
    Table,
    Id,
    DealerId,
    FetchType,
    RangeFrom,
    RangeTo,
    Filters,
    Status,
    Result,
    ErrorMessage,
    CreatedAt,
    StartedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum Dealers {
    Table,
    Id,
}
