//! WorkOrderPart entity model
//!
//! Child table of work_orders holding one row per part line. Parts are keyed
//! by (work_order_id, parts_no, job_no) because the same part can appear
//! under different service jobs on one work order.

use super::work_order::Entity as WorkOrder;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// WorkOrderPart entity representing one part line on a work order
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "work_order_parts")]
pub struct Model {
    /// Surrogate primary key
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Parent work order surrogate id
    pub work_order_id: i64,

    /// Part number
    pub parts_no: String,

    /// Service job this part line is attached to
    pub job_no: String,

    /// Description of the part
    pub parts_name: Option<String>,

    /// Quantity used
    pub quantity: i32,

    /// Price per unit
    pub unit_price: f64,

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
