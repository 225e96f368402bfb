//! # Billing Processor
//!
//! Syncs workshop invoices from the gateway's `billing` endpoint. Single
//! phase, no child tables.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter, QuerySelect,
    Set, TransactionTrait,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::warn;
use uuid::Uuid;

use crate::config::UpsertConfig;
use crate::error::SyncError;
use crate::models::FetchType;
use crate::models::billing::{self, Entity as Billing};
use crate::processors::{Processor, opt_text, parse_partner_datetime, parse_records};
use crate::upsert::{PhaseReport, UpsertReport, clean_key, dedup_last_wins, upsert_in_batches};

const KEY_WIDTH: usize = 64;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BillingRecord {
    invoice_no: Option<String>,
    billing_date: Option<String>,
    customer_name: Option<String>,
    total_amount: Option<f64>,
    paid_amount: Option<f64>,
    status_code: Option<String>,
}

/// Processor for the billing (invoice) domain.
#[derive(Debug)]
pub struct BillingProcessor {
    upsert: UpsertConfig,
}

impl BillingProcessor {
    pub fn new(upsert: UpsertConfig) -> Self {
        Self { upsert }
    }

    fn lookup_batch(&self) -> usize {
        self.upsert.lookup_batch_size.max(1)
    }

    async fn upsert_billings(
        &self,
        db: &DatabaseConnection,
        dealer_id: Uuid,
        records: &[BillingRecord],
    ) -> Result<PhaseReport, SyncError> {
        let mut invalid_keys: u64 = 0;
        let mut keyed: Vec<(String, &BillingRecord)> = Vec::new();
        for record in records {
            match clean_key(record.invoice_no.as_deref(), KEY_WIDTH) {
                Some(key) => keyed.push((key, record)),
                None => invalid_keys += 1,
            }
        }
        if invalid_keys > 0 {
            warn!(invalid_keys, "dropped billings with unusable invoice numbers");
        }

        let (keyed, duplicates_dropped) = dedup_last_wins(keyed, |(key, _)| key.clone());

        let txn = db.begin().await?;
        let keys: Vec<String> = keyed.iter().map(|(key, _)| key.clone()).collect();
        let existing = self.existing_keys(&txn, dealer_id, &keys).await?;
        let updated = keyed
            .iter()
            .filter(|(key, _)| existing.contains(key))
            .count() as u64;
        let inserted = keyed.len() as u64 - updated;

        let now: DateTimeWithTimeZone = Utc::now().into();
        let models: Vec<billing::ActiveModel> = keyed
            .into_iter()
            .map(|(key, record)| billing::ActiveModel {
                dealer_id: Set(dealer_id),
                invoice_no: Set(key),
                billing_date: Set(parse_partner_datetime(record.billing_date.as_deref())),
                customer_name: Set(opt_text(record.customer_name.as_deref())),
                total_amount: Set(record.total_amount.unwrap_or(0.0)),
                paid_amount: Set(record.paid_amount.unwrap_or(0.0)),
                status_code: Set(opt_text(record.status_code.as_deref())),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            })
            .collect();

        let conflict = OnConflict::columns([
            billing::Column::DealerId,
            billing::Column::InvoiceNo,
        ])
        .update_columns([
            billing::Column::BillingDate,
            billing::Column::CustomerName,
            billing::Column::TotalAmount,
            billing::Column::PaidAmount,
            billing::Column::StatusCode,
            billing::Column::UpdatedAt,
        ])
        .to_owned();

        upsert_in_batches(&txn, models, conflict, self.upsert.chunk_size).await?;
        txn.commit().await?;

        Ok(PhaseReport {
            table: "billings".to_string(),
            inserted,
            updated,
            orphans_skipped: 0,
            duplicates_dropped,
        })
    }

    async fn existing_keys(
        &self,
        txn: &DatabaseTransaction,
        dealer_id: Uuid,
        keys: &[String],
    ) -> Result<HashSet<String>, SyncError> {
        let mut existing = HashSet::new();
        for chunk in keys.chunks(self.lookup_batch()) {
            let rows: Vec<String> = Billing::find()
                .select_only()
                .column(billing::Column::InvoiceNo)
                .filter(billing::Column::DealerId.eq(dealer_id))
                .filter(billing::Column::InvoiceNo.is_in(chunk.iter().cloned()))
                .into_tuple::<String>()
                .all(txn)
                .await?;
            existing.extend(rows);
        }
        Ok(existing)
    }
}

#[async_trait]
impl Processor for BillingProcessor {
    fn fetch_type(&self) -> FetchType {
        FetchType::Billing
    }

    fn endpoint(&self) -> &'static str {
        "billing"
    }

    fn key_width(&self) -> usize {
        KEY_WIDTH
    }

    async fn process_records(
        &self,
        db: &DatabaseConnection,
        dealer_id: Uuid,
        records: Vec<JsonValue>,
    ) -> Result<UpsertReport, SyncError> {
        let parsed: Vec<BillingRecord> = parse_records(records, "billing");
        let mut report = UpsertReport::default();

        let billings = self
            .upsert_billings(db, dealer_id, &parsed)
            .await
            .map_err(|error| SyncError::phase("billings", 0, error))?;
        report.push(billings);

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_parses_partner_payload_shape() {
        let raw = json!({
            "invoiceNo": "INV/2026/0101",
            "billingDate": "2026-05-20 14:00:00",
            "customerName": "Agus",
            "totalAmount": 275000.0,
            "paidAmount": 275000.0,
            "statusCode": "PAID"
        });

        let record: BillingRecord = serde_json::from_value(raw).unwrap();

        assert_eq!(record.invoice_no.as_deref(), Some("INV/2026/0101"));
        assert_eq!(record.paid_amount, Some(275000.0));
    }

    #[test]
    fn missing_amounts_default_to_none() {
        let raw = json!({"invoiceNo": "INV-1"});

        let record: BillingRecord = serde_json::from_value(raw).unwrap();

        assert_eq!(record.total_amount, None);
        assert_eq!(record.paid_amount, None);
    }
}
