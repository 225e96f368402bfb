//! Migration to create the work_orders table.
//!
//! This migration creates the work_orders parent table for workshop repair
//! orders pulled from the partner API. Rows carry a surrogate bigint id and a
//! (dealer_id, work_order_no) natural key; children reference the surrogate id.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WorkOrders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WorkOrders::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WorkOrders::DealerId).uuid().not_null())
                    .col(
                        ColumnDef::new(WorkOrders::WorkOrderNo)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(WorkOrders::QueueNo).text().null())
                    .col(ColumnDef::new(WorkOrders::StatusCode).text().null())
                    .col(ColumnDef::new(WorkOrders::VehiclePlateNo).text().null())
                    .col(ColumnDef::new(WorkOrders::OwnerName).text().null())
                    .col(ColumnDef::new(WorkOrders::OwnerPhone).text().null())
                    .col(
                        ColumnDef::new(WorkOrders::ServiceDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WorkOrders::TotalAmount)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(WorkOrders::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(WorkOrders::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_work_orders_dealer_id")
                            .from(WorkOrders::Table, WorkOrders::DealerId)
                            .to(Dealers::Table, Dealers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Natural-key uniqueness; the upsert conflict target
        manager
            .create_index(
                Index::create()
                    .name("idx_work_orders_dealer_work_order_no")
                    .table(WorkOrders::Table)
                    .col(WorkOrders::DealerId)
                    .col(WorkOrders::WorkOrderNo)
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
                    .name("idx_work_orders_dealer_work_order_no")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(WorkOrders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WorkOrders {
    Table,
    Id,
    DealerId,
    WorkOrderNo,
    QueueNo,
    StatusCode,
    VehiclePlateNo,
    OwnerName,
    OwnerPhone,
    ServiceDate,
    TotalAmount,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Dealers {
    Table,
    Id,
}
