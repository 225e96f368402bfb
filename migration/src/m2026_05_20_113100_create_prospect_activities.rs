//! Migration to create the prospect_activities table.
//!
//! Child table of prospects holding one row per follow-up activity, keyed by
//! (prospect_id, activity_no) against the parent surrogate id.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProspectActivities::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProspectActivities::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProspectActivities::ProspectId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProspectActivities::ActivityNo)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProspectActivities::ActivityDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ProspectActivities::Description)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(ProspectActivities::ResultCode).text().null())
                    .col(
                        ColumnDef::new(ProspectActivities::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ProspectActivities::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_prospect_activities_prospect_id")
                            .from(ProspectActivities::Table, ProspectActivities::ProspectId)
                            .to(Prospects::Table, Prospects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_prospect_activities_prospect_activity")
                    .table(ProspectActivities::Table)
                    .col(ProspectActivities::ProspectId)
                    .col(ProspectActivities::ActivityNo)
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
                    .name("idx_prospect_activities_prospect_activity")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ProspectActivities::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProspectActivities {
    Table,
    Id,
    ProspectId,
    ActivityNo,
    ActivityDate,
    Description,
    ResultCode,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Prospects {
    Table,
    Id,
}
