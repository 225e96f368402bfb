//! Migration to create the fetch_logs table.
//!
//! This migration creates the fetch_logs table, an append-only audit trail
//! with one row per job execution. Rows are never updated or deleted.

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
                    .table(FetchLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FetchLogs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FetchLogs::JobId).uuid().not_null())
                    .col(ColumnDef::new(FetchLogs::DealerId).uuid().not_null())
                    .col(ColumnDef::new(FetchLogs::FetchType).text().not_null())
                    .col(ColumnDef::new(FetchLogs::Status).text().not_null())
                    .col(
                        ColumnDef::new(FetchLogs::RecordsFetched)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(FetchLogs::ErrorMessage).text().null())
                    .col(ColumnDef::new(FetchLogs::DurationMs).big_integer().not_null())
                    .col(
                        ColumnDef::new(FetchLogs::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FetchLogs::FinishedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FetchLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_fetch_logs_job_id")
                            .from(FetchLogs::Table, FetchLogs::JobId)
                            .to(SyncJobs::Table, SyncJobs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_fetch_logs_dealer_id")
                            .from(FetchLogs::Table, FetchLogs::DealerId)
                            .to(Dealers::Table, Dealers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_fetch_logs_job_id")
                    .table(FetchLogs::Table)
                    .col(FetchLogs::JobId)
                    .to_owned(),
            )
            .await?;

        // Index for the paginated listing endpoint, newest first
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_fetch_logs_created_desc ON fetch_logs (created_at DESC, id)".to_string(),
            ))
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_fetch_logs_dealer_fetch_type")
                    .table(FetchLogs::Table)
                    .col(FetchLogs::DealerId)
                    .col(FetchLogs::FetchType)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_fetch_logs_job_id").to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_fetch_logs_created_desc")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_fetch_logs_dealer_fetch_type")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(FetchLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FetchLogs {
    Table,
    Id,
    JobId,
    DealerId,
    FetchType,
    Status,
    RecordsFetched,
    ErrorMessage,
    DurationMs,
    StartedAt,
    FinishedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum SyncJobs {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Dealers {
    Table,
    Id,
}
