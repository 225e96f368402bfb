//! Migration to create the work_order_parts table.
//!
//! Child table of work_orders holding one row per part usage. Parts hang off a
//! service job line, so the natural key is the composite
//! (work_order_id, parts_no, job_no).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WorkOrderParts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WorkOrderParts::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WorkOrderParts::WorkOrderId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkOrderParts::PartsNo)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkOrderParts::JobNo)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(WorkOrderParts::PartsName).text().null())
                    .col(
                        ColumnDef::new(WorkOrderParts::Quantity)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(WorkOrderParts::UnitPrice)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(WorkOrderParts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(WorkOrderParts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_work_order_parts_work_order_id")
                            .from(WorkOrderParts::Table, WorkOrderParts::WorkOrderId)
                            .to(WorkOrders::Table, WorkOrders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_work_order_parts_work_order_parts_job")
                    .table(WorkOrderParts::Table)
                    .col(WorkOrderParts::WorkOrderId)
                    .col(WorkOrderParts::PartsNo)
                    .col(WorkOrderParts::JobNo)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_work_order_parts_work_order_parts_job")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(WorkOrderParts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WorkOrderParts {
    Table,
    Id,
    WorkOrderId,
    PartsNo,
    JobNo,
    PartsName,
    Quantity,
    UnitPrice,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum WorkOrders {
    Table,
    Id,
}
