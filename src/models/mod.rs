//! # Data Models
//!
//! This module contains all the data models used throughout the Dealer Sync API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod billing;
pub mod dealer;
pub mod fetch_log;
pub mod fetch_type;
pub mod job_status;
pub mod prospect;
pub mod prospect_activity;
pub mod sync_job;
pub mod work_order;
pub mod work_order_part;
pub mod work_order_service;

pub use billing::Entity as Billing;
pub use dealer::Entity as Dealer;
pub use fetch_log::Entity as FetchLog;
pub use fetch_type::{FetchType, parse_fetch_type};
pub use job_status::{JobStatus, parse_job_status};
pub use prospect::Entity as Prospect;
pub use prospect_activity::Entity as ProspectActivity;
pub use sync_job::Entity as SyncJob;
pub use work_order::Entity as WorkOrder;
pub use work_order_part::Entity as WorkOrderPart;
pub use work_order_service::Entity as WorkOrderService;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "dealer-sync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
