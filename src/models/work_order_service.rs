//! WorkOrderService entity model
//!
//! Child table of work_orders holding one row per service line, keyed by
//! (work_order_id, job_no).

use super::work_order::Entity as WorkOrder;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// WorkOrderService entity representing one service line on a work order
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "work_order_services")]
pub struct Model {
    /// Surrogate primary key
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Parent work order surrogate id
    pub work_order_id: i64,

    /// Service job number, unique per work order
    pub job_no: String,

    /// Description of the service job
    pub job_name: Option<String>,

    /// Fee charged for this service line
    pub fee: f64,

    /// Discount applied to this service line
    pub discount: f64,

    /// Timestamp when the row was first inserted
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the row was last upserted
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "WorkOrder",
        from = "Column::WorkOrderId",
        to = "super::work_order::Column::Id"
    )]
    WorkOrder,
}

impl Related<WorkOrder> for Entity {
    fn to() -> RelationDef {
        Relation::WorkOrder.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
