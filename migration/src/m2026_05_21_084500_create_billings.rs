//! Migration to create the billings table.
//!
//! Billings have no child tables; the sync pipeline commits them in a single
//! phase keyed by (dealer_id, invoice_no).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Billings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Billings::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Billings::DealerId).uuid().not_null())
                    .col(
                        ColumnDef::new(Billings::InvoiceNo)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Billings::BillingDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Billings::CustomerName).text().null())
                    .col(
                        ColumnDef::new(Billings::TotalAmount)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Billings::PaidAmount)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(Billings::StatusCode).text().null())
                    .col(
                        ColumnDef::new(Billings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Billings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_billings_dealer_id")
                            .from(Billings::Table, Billings::DealerId)
                            .to(Dealers::Table, Dealers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_billings_dealer_invoice")
                    .table(Billings::Table)
                    .col(Billings::DealerId)
                    .col(Billings::InvoiceNo)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_billings_dealer_invoice").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Billings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Billings {
    Table,
    Id,
    DealerId,
    InvoiceNo,
    BillingDate,
    CustomerName,
    TotalAmount,
    PaidAmount,
    StatusCode,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Dealers {
    Table,
    Id,
}
