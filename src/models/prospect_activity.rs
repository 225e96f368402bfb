//! ProspectActivity entity model
//!
//! Child table of prospects holding one row per follow-up activity, keyed by
//! (prospect_id, activity_no).

use super::prospect::Entity as Prospect;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// ProspectActivity entity representing one follow-up on a prospect
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "prospect_activities")]
pub struct Model {
    /// Surrogate primary key
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Parent prospect surrogate id
    pub prospect_id: i64,

    /// Activity number, unique per prospect
    pub activity_no: String,

    /// Date the activity took place
    pub activity_date: Option<DateTimeWithTimeZone>,

    /// Free-text description of the activity
    pub description: Option<String>,

    /// Partner code for the activity outcome
    pub result_code: Option<String>,

    /// Timestamp when the row was first inserted
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the row was last upserted
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Prospect",
        from = "Column::ProspectId",
        to = "super::prospect::Column::Id"
    )]
    Prospect,
}

impl Related<Prospect> for Entity {
    fn to() -> RelationDef {
        Relation::Prospect.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
