//! Migration to create the dealers table.
//!
//! This migration creates the dealers table which stores partner API
//! credentials per dealer, with the secret key held only as AES-GCM ciphertext.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Dealers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Dealers::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Dealers::Code).text().not_null())
                    .col(ColumnDef::new(Dealers::Name).text().not_null())
                    .col(ColumnDef::new(Dealers::ApiKey).text().not_null())
                    .col(
                        ColumnDef::new(Dealers::SecretKeyCiphertext)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Dealers::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Dealers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Dealers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Dealer codes are the external identity used on job submission
        manager
            .create_index(
                Index::create()
                    .name("idx_dealers_code")
                    .table(Dealers::Table)
                    .col(Dealers::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_dealers_code").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Dealers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Dealers {
    Table,
    Id,
    Code,
    Name,
    ApiKey,
    SecretKeyCiphertext,
    Active,
    CreatedAt,
    UpdatedAt,
}
