//! WorkOrder entity model
//!
//! This module contains the SeaORM entity model for the work_orders table.
//! Work orders are the parent documents of the three-phase work order
//! pipeline; services and parts hang off the surrogate id.

use super::dealer::Entity as Dealer;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// WorkOrder entity representing one workshop work order document
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "work_orders")]
pub struct Model {
    /// Surrogate primary key
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Dealer this work order belongs to
    pub dealer_id: Uuid,

    /// Work order number, unique per dealer
    pub work_order_no: String,

    /// Workshop queue number
    pub queue_no: Option<String>,

    /// Partner status code for the work order
    pub status_code: Option<String>,

    /// Vehicle license plate number
    pub vehicle_plate_no: Option<String>,

    /// Vehicle owner name
    pub owner_name: Option<String>,

    /// Vehicle owner phone number
    pub owner_phone: Option<String>,

    /// Date the service was performed
    pub service_date: Option<DateTimeWithTimeZone>,

    /// Total amount billed for the work order
    pub total_amount: f64,

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
