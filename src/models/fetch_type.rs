//! Canonical registry of supported fetch types.
//!
//! Every document category the partner API exposes has an entry here, whether
//! or not this service ships a processor for it yet. Job validation only
//! accepts fetch types that are both canonical and registered with a
//! processor; the rest exist so request parsing can distinguish "known but
//! unsupported" from "never heard of it".

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Closed set of document categories fetchable from the partner DMS API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FetchType {
    Prospect,
    WorkOrder,
    Billing,
    DocumentHandling,
    UnitInbound,
    PartsInbound,
    Leasing,
    HloDeposit,
    WorkshopInvoice,
    Delivery,
    SpkDealing,
}

impl FetchType {
    /// Return the canonical string representation for this fetch type.
    pub const fn as_str(self) -> &'static str {
        match self {
            FetchType::Prospect => "prospect",
            FetchType::WorkOrder => "work_order",
            FetchType::Billing => "billing",
            FetchType::DocumentHandling => "document_handling",
            FetchType::UnitInbound => "unit_inbound",
            FetchType::PartsInbound => "parts_inbound",
            FetchType::Leasing => "leasing",
            FetchType::HloDeposit => "hlo_deposit",
            FetchType::WorkshopInvoice => "workshop_invoice",
            FetchType::Delivery => "delivery",
            FetchType::SpkDealing => "spk_dealing",
        }
    }
}

impl fmt::Display for FetchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete registry of canonical fetch types.
pub const ALL_FETCH_TYPES: &[FetchType] = &[
    FetchType::Prospect,
    FetchType::WorkOrder,
    FetchType::Billing,
    FetchType::DocumentHandling,
    FetchType::UnitInbound,
    FetchType::PartsInbound,
    FetchType::Leasing,
    FetchType::HloDeposit,
    FetchType::WorkshopInvoice,
    FetchType::Delivery,
    FetchType::SpkDealing,
];

/// Return the canonical fetch type corresponding to the provided string, if any.
pub fn parse_fetch_type(value: &str) -> Option<FetchType> {
    ALL_FETCH_TYPES
        .iter()
        .copied()
        .find(|ft| ft.as_str() == value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn registry_has_unique_entries() {
        let mut seen = HashSet::new();
        for fetch_type in ALL_FETCH_TYPES {
            assert!(
                seen.insert(fetch_type.as_str()),
                "duplicate fetch type {}",
                fetch_type
            );
        }
    }

    #[test]
    fn parse_round_trips() {
        for fetch_type in ALL_FETCH_TYPES {
            let parsed = parse_fetch_type(fetch_type.as_str()).expect("fetch type should parse");
            assert_eq!(*fetch_type, parsed);
        }
    }

    #[test]
    fn parse_rejects_unknown_values() {
        assert_eq!(parse_fetch_type("warranty_claim"), None);
        assert_eq!(parse_fetch_type(""), None);
        assert_eq!(parse_fetch_type("WORK_ORDER"), None);
    }

    #[test]
    fn serde_matches_canonical_strings() {
        for fetch_type in ALL_FETCH_TYPES {
            let json = serde_json::to_string(fetch_type).expect("serialize");
            assert_eq!(json, format!("\"{}\"", fetch_type.as_str()));
        }
    }
}
