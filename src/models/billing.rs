//! Billing entity model
//!
//! This module contains the SeaORM entity model for the billings table.
//! Billings have no child tables and commit in a single phase.

use super::dealer::Entity as Dealer;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Billing entity representing one invoice document
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "billings")]
pub struct Model {
    /// Surrogate primary key
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Dealer this billing belongs to
    pub dealer_id: Uuid,

    /// Invoice number, unique per dealer
    pub invoice_no: String,

    /// Date the invoice was issued
    pub billing_date: Option<DateTimeWithTimeZone>,

    /// Customer the invoice was issued to
    pub customer_name: Option<String>,

    /// Total invoiced amount
    pub total_amount: f64,

    /// Amount paid so far
    pub paid_amount: f64,

    /// Partner status code for the invoice
    pub status_code: Option<String>,

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
