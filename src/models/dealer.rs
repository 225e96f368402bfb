//! Dealer entity model
//!
//! This module contains the SeaORM entity model for the dealers table,
//! which stores registered dealer accounts and their encrypted partner
//! API credentials.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Dealer entity representing a registered dealer account
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "dealers")]
pub struct Model {
    /// Unique identifier for the dealer (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Short dealer code, unique across the service
    pub code: String,

    /// Human-readable dealer name
    pub name: String,

    /// Partner API key issued to this dealer
    pub api_key: String,

    /// Encrypted partner secret key (AES-256-GCM ciphertext)
    pub secret_key_ciphertext: Vec<u8>,

    /// Whether sync jobs may be enqueued for this dealer
    pub active: bool,

    /// Timestamp when the dealer was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the dealer was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
