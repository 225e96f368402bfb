//! Migration to create the prospects table.
//!
//! Parent table for sales prospects pulled from the partner API, keyed by the
//! (dealer_id, prospect_no) natural key with a surrogate bigint id.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Prospects::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Prospects::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Prospects::DealerId).uuid().not_null())
                    .col(
                        ColumnDef::new(Prospects::ProspectNo)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Prospects::Name).text().null())
                    .col(ColumnDef::new(Prospects::Phone).text().null())
                    .col(ColumnDef::new(Prospects::Address).text().null())
                    .col(ColumnDef::new(Prospects::SourceCode).text().null())
                    .col(ColumnDef::new(Prospects::StatusCode).text().null())
                    .col(
                        ColumnDef::new(Prospects::FollowupDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Prospects::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Prospects::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_prospects_dealer_id")
                            .from(Prospects::Table, Prospects::DealerId)
                            .to(Dealers::Table, Dealers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_prospects_dealer_prospect_no")
                    .table(Prospects::Table)
                    .col(Prospects::DealerId)
                    .col(Prospects::ProspectNo)
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
                    .name("idx_prospects_dealer_prospect_no")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Prospects::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Prospects {
    Table,
    Id,
    DealerId,
    ProspectNo,
    Name,
    Phone,
    Address,
    SourceCode,
    StatusCode,
    FollowupDate,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Dealers {
    Table,
    Id,
}
