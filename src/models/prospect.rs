//! Prospect entity model
//!
//! This module contains the SeaORM entity model for the prospects table.
//! Prospects are the parent documents of the two-phase prospect pipeline.

use super::dealer::Entity as Dealer;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Prospect entity representing one sales prospect document
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "prospects")]
pub struct Model {
    /// Surrogate primary key
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Dealer this prospect belongs to
    pub dealer_id: Uuid,

    /// Prospect number, unique per dealer
    pub prospect_no: String,

    /// Prospect name
    pub name: Option<String>,

    /// Prospect phone number
    pub phone: Option<String>,

    /// Prospect address
    pub address: Option<String>,

    /// Partner code identifying the lead source
    pub source_code: Option<String>,

    /// Partner status code for the prospect
    pub status_code: Option<String>,

    /// Next scheduled follow-up date
    pub followup_date: Option<DateTimeWithTimeZone>,

    /// Timestamp when the row was first inserted
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the row was last upserted
    pub updated_at: DateTimeWithTimeZone,
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
