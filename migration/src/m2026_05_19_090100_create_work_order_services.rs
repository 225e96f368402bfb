//! Migration to create the work_order_services table.
//!
//! Child table of work_orders holding one row per service job line. The
//! natural key is (work_order_id, job_no) against the parent surrogate id.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WorkOrderServices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WorkOrderServices::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WorkOrderServices::WorkOrderId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkOrderServices::JobNo)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(WorkOrderServices::JobName).text().null())
                    .col(
                        ColumnDef::new(WorkOrderServices::Fee)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(WorkOrderServices::Discount)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(WorkOrderServices::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(WorkOrderServices::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_work_order_services_work_order_id")
                            .from(WorkOrderServices::Table, WorkOrderServices::WorkOrderId)
                            .to(WorkOrders::Table, WorkOrders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_work_order_services_work_order_job")
                    .table(WorkOrderServices::Table)
                    .col(WorkOrderServices::WorkOrderId)
                    .col(WorkOrderServices::JobNo)
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
                    .name("idx_work_order_services_work_order_job")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(WorkOrderServices::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WorkOrderServices {
    Table,
    Id,
    WorkOrderId,
    JobNo,
    JobName,
    Fee,
    Discount,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum WorkOrders {
    Table,
    Id,
}
