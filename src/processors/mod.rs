//! # Fetch-Type Processors
//!
//! One processor per partner data domain. A processor knows its gateway
//! endpoint, the character width of its natural key columns, and how to turn
//! the raw payload rows into the domain's phased upsert. The registry maps
//! each [`FetchType`] to its processor; fetch types without a processor are
//! rejected at enqueue time rather than discovered mid-job.

pub mod billing;
pub mod prospect;
pub mod work_order;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sea_orm::DatabaseConnection;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::{FetchContext, PartnerClient};
use crate::config::UpsertConfig;
use crate::error::SyncError;
use crate::models::FetchType;
use crate::upsert::UpsertReport;

pub use billing::BillingProcessor;
pub use prospect::ProspectProcessor;
pub use work_order::WorkOrderProcessor;

/// A partner data domain: one endpoint, one persistence pipeline.
#[async_trait]
pub trait Processor: Send + Sync + std::fmt::Debug {
    /// Fetch type this processor serves.
    fn fetch_type(&self) -> FetchType;

    /// Endpoint path under the gateway base URL.
    fn endpoint(&self) -> &'static str;

    /// Character width of this domain's natural key columns, matching the
    /// migrations. Keys longer than this are dropped before any statement.
    fn key_width(&self) -> usize;

    /// Fetch one time window of raw records from the partner.
    async fn fetch_api_data(
        &self,
        client: &PartnerClient,
        ctx: &FetchContext,
    ) -> Result<Vec<JsonValue>, SyncError> {
        client.fetch(self.endpoint(), ctx).await
    }

    /// Persist raw records through this domain's phased upsert. Safe to
    /// re-run with the same payload: every phase is a natural-key upsert.
    async fn process_records(
        &self,
        db: &DatabaseConnection,
        dealer_id: Uuid,
        records: Vec<JsonValue>,
    ) -> Result<UpsertReport, SyncError>;
}

/// Registry mapping fetch types to their processors.
pub struct ProcessorRegistry {
    processors: HashMap<FetchType, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    /// Build the registry with the three implemented domains.
    pub fn with_default_processors(upsert: &UpsertConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(WorkOrderProcessor::new(upsert.clone())));
        registry.register(Arc::new(ProspectProcessor::new(upsert.clone())));
        registry.register(Arc::new(BillingProcessor::new(upsert.clone())));
        registry
    }

    /// Register a processor under its own fetch type.
    pub fn register(&mut self, processor: Arc<dyn Processor>) {
        self.processors.insert(processor.fetch_type(), processor);
    }

    /// Look up the processor for a fetch type.
    pub fn get(&self, fetch_type: FetchType) -> Result<Arc<dyn Processor>, SyncError> {
        self.processors
            .get(&fetch_type)
            .cloned()
            .ok_or_else(|| SyncError::UnsupportedFetchType(fetch_type.to_string()))
    }

    /// Whether a fetch type has a registered processor.
    pub fn contains(&self, fetch_type: FetchType) -> bool {
        self.processors.contains_key(&fetch_type)
    }

    /// Registered fetch types, sorted by name for stable ordering.
    pub fn registered_types(&self) -> Vec<FetchType> {
        let mut types: Vec<_> = self.processors.keys().copied().collect();
        types.sort_by_key(|fetch_type| fetch_type.as_str());
        types
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deserialize payload rows into a domain's typed records, skipping rows the
/// partner sent in a shape we cannot read.
pub(crate) fn parse_records<T: DeserializeOwned>(
    records: Vec<JsonValue>,
    domain: &'static str,
) -> Vec<T> {
    let mut parsed = Vec::with_capacity(records.len());
    let mut malformed: u64 = 0;

    for record in records {
        match serde_json::from_value::<T>(record) {
            Ok(value) => parsed.push(value),
            Err(error) => {
                malformed += 1;
                debug!(domain, error = %error, "skipping unreadable partner record");
            }
        }
    }

    if malformed > 0 {
        warn!(domain, malformed, "skipped unreadable partner records");
    }

    parsed
}

/// Parse a partner timestamp. The gateway sends `YYYY-MM-DD HH:MM:SS` for
/// datetimes and `YYYY-MM-DD` for bare dates; both are stored as UTC.
pub(crate) fn parse_partner_datetime(raw: Option<&str>) -> Option<DateTimeWithTimeZone> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(datetime.and_utc().fixed_offset());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|datetime| datetime.and_utc().fixed_offset());
    }

    debug!(raw, "unparseable partner timestamp");
    None
}

/// Normalise an optional partner string: trimmed, with empty collapsed to
/// `None` so blank strings never shadow real values in the database.
pub(crate) fn opt_text(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
