//! # Work Order Processor
//!
//! Syncs workshop work orders from the gateway's `pkb` endpoint into the
//! three-table hierarchy `work_orders` → `work_order_services` /
//! `work_order_parts`. Each payload row is one work order document carrying
//! its service and part lines inline; persistence runs in three phases, each
//! committed in its own transaction so surrogate ids are durable and
//! queryable before any child row references them.

use std::collections::{HashMap, HashSet};

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
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::UpsertConfig;
use crate::error::SyncError;
use crate::models::FetchType;
use crate::models::work_order::{self, Entity as WorkOrder};
use crate::models::work_order_part::{self, Entity as WorkOrderPart};
use crate::models::work_order_service::{self, Entity as WorkOrderService};
use crate::processors::{Processor, opt_text, parse_partner_datetime, parse_records};
use crate::upsert::{
    PhaseReport, UpsertReport, clean_key, count_lookups, dedup_last_wins, sanitize_keys,
    upsert_in_batches,
};

/// Width of the natural key columns in the work order tables.
const KEY_WIDTH: usize = 64;

/// One work order document as the gateway returns it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkOrderRecord {
    work_order_no: Option<String>,
    queue_no: Option<String>,
    status_code: Option<String>,
    plate_no: Option<String>,
    owner_name: Option<String>,
    owner_phone: Option<String>,
    service_date: Option<String>,
    total_amount: Option<f64>,
    #[serde(default)]
    services: Vec<ServiceRecord>,
    #[serde(default)]
    parts: Vec<PartRecord>,
}

/// A labour line on a work order.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceRecord {
    job_no: Option<String>,
    job_name: Option<String>,
    fee: Option<f64>,
    discount: Option<f64>,
}

/// A part line on a work order, attached to a labour line by job number.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartRecord {
    parts_no: Option<String>,
    job_no: Option<String>,
    parts_name: Option<String>,
    quantity: Option<i64>,
    unit_price: Option<f64>,
}

/// Processor for the work order (PKB) domain.
#[derive(Debug)]
pub struct WorkOrderProcessor {
    upsert: UpsertConfig,
}

impl WorkOrderProcessor {
    pub fn new(upsert: UpsertConfig) -> Self {
        Self { upsert }
    }

    fn lookup_batch(&self) -> usize {
        self.upsert.lookup_batch_size.max(1)
    }

    /// Phase 1: upsert parent work orders and commit.
    async fn upsert_parents(
        &self,
        db: &DatabaseConnection,
        dealer_id: Uuid,
        records: &[WorkOrderRecord],
    ) -> Result<PhaseReport, SyncError> {
        let mut invalid_keys: u64 = 0;
        let mut keyed: Vec<(String, &WorkOrderRecord)> = Vec::new();
        for record in records {
            match clean_key(record.work_order_no.as_deref(), KEY_WIDTH) {
                Some(key) => keyed.push((key, record)),
                None => invalid_keys += 1,
            }
        }
        if invalid_keys > 0 {
            warn!(
                invalid_keys,
                "dropped work orders with unusable work order numbers"
            );
        }

        let (keyed, duplicates_dropped) = dedup_last_wins(keyed, |(key, _)| key.clone());

        let txn = db.begin().await?;
        let keys: Vec<String> = keyed.iter().map(|(key, _)| key.clone()).collect();
        let existing = self.existing_parent_keys(&txn, dealer_id, &keys).await?;
        let updated = keyed
            .iter()
            .filter(|(key, _)| existing.contains(key))
            .count() as u64;
        let inserted = keyed.len() as u64 - updated;

        let now: DateTimeWithTimeZone = Utc::now().into();
        let models: Vec<work_order::ActiveModel> = keyed
            .into_iter()
            .map(|(key, record)| work_order::ActiveModel {
                dealer_id: Set(dealer_id),
                work_order_no: Set(key),
                queue_no: Set(opt_text(record.queue_no.as_deref())),
                status_code: Set(opt_text(record.status_code.as_deref())),
                vehicle_plate_no: Set(opt_text(record.plate_no.as_deref())),
                owner_name: Set(opt_text(record.owner_name.as_deref())),
                owner_phone: Set(opt_text(record.owner_phone.as_deref())),
                service_date: Set(parse_partner_datetime(record.service_date.as_deref())),
                total_amount: Set(record.total_amount.unwrap_or(0.0)),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            })
            .collect();

        let conflict = OnConflict::columns([
            work_order::Column::DealerId,
            work_order::Column::WorkOrderNo,
        ])
        .update_columns([
            work_order::Column::QueueNo,
            work_order::Column::StatusCode,
            work_order::Column::VehiclePlateNo,
            work_order::Column::OwnerName,
            work_order::Column::OwnerPhone,
            work_order::Column::ServiceDate,
            work_order::Column::TotalAmount,
            work_order::Column::UpdatedAt,
        ])
        .to_owned();

        upsert_in_batches(&txn, models, conflict, self.upsert.chunk_size).await?;
        txn.commit().await?;

        Ok(PhaseReport {
            table: "work_orders".to_string(),
            inserted,
            updated,
            orphans_skipped: 0,
            duplicates_dropped,
        })
    }

    /// Which of the given work order numbers already exist for this dealer.
    async fn existing_parent_keys(
        &self,
        txn: &DatabaseTransaction,
        dealer_id: Uuid,
        keys: &[String],
    ) -> Result<HashSet<String>, SyncError> {
        let mut existing = HashSet::new();
        for chunk in keys.chunks(self.lookup_batch()) {
            let rows: Vec<String> = WorkOrder::find()
                .select_only()
                .column(work_order::Column::WorkOrderNo)
                .filter(work_order::Column::DealerId.eq(dealer_id))
                .filter(work_order::Column::WorkOrderNo.is_in(chunk.iter().cloned()))
                .into_tuple::<String>()
                .all(txn)
                .await?;
            existing.extend(rows);
        }
        Ok(existing)
    }

    /// Resolve `{work_order_no → id}` from committed parents, batched.
    async fn resolve_parent_ids(
        &self,
        db: &DatabaseConnection,
        dealer_id: Uuid,
        records: &[WorkOrderRecord],
    ) -> Result<HashMap<String, i64>, SyncError> {
        let keys = sanitize_keys(
            records.iter().map(|record| record.work_order_no.as_deref()),
            KEY_WIDTH,
        );

        let mut ids = HashMap::with_capacity(keys.len());
        for chunk in keys.chunks(self.lookup_batch()) {
            let rows: Vec<(i64, String)> = WorkOrder::find()
                .select_only()
                .column(work_order::Column::Id)
                .column(work_order::Column::WorkOrderNo)
                .filter(work_order::Column::DealerId.eq(dealer_id))
                .filter(work_order::Column::WorkOrderNo.is_in(chunk.iter().cloned()))
                .into_tuple::<(i64, String)>()
                .all(db)
                .await?;
            for (id, key) in rows {
                ids.insert(key, id);
            }
        }

        debug!(
            keys = keys.len(),
            lookups = count_lookups(keys.len(), self.lookup_batch()),
            resolved = ids.len(),
            "resolved work order ids"
        );
        Ok(ids)
    }

    /// Phase 2: upsert service lines against committed parents.
    async fn upsert_services(
        &self,
        db: &DatabaseConnection,
        records: &[WorkOrderRecord],
        parent_ids: &HashMap<String, i64>,
    ) -> Result<PhaseReport, SyncError> {
        let mut orphans_skipped: u64 = 0;
        let mut invalid_keys: u64 = 0;
        let now: DateTimeWithTimeZone = Utc::now().into();

        let mut keyed: Vec<((i64, String), work_order_service::ActiveModel)> = Vec::new();
        for record in records {
            let parent_id = clean_key(record.work_order_no.as_deref(), KEY_WIDTH)
                .and_then(|key| parent_ids.get(&key).copied());
            for service in &record.services {
                let Some(job_no) = clean_key(service.job_no.as_deref(), KEY_WIDTH) else {
                    invalid_keys += 1;
                    continue;
                };
                let Some(parent_id) = parent_id else {
                    orphans_skipped += 1;
                    warn!(
                        work_order_no = record.work_order_no.as_deref().unwrap_or("<missing>"),
                        job_no = %job_no,
                        "skipping service line with no committed parent work order"
                    );
                    continue;
                };
                keyed.push((
                    (parent_id, job_no.clone()),
                    work_order_service::ActiveModel {
                        work_order_id: Set(parent_id),
                        job_no: Set(job_no),
                        job_name: Set(opt_text(service.job_name.as_deref())),
                        fee: Set(service.fee.unwrap_or(0.0)),
                        discount: Set(service.discount.unwrap_or(0.0)),
                        created_at: Set(now),
                        updated_at: Set(now),
                        ..Default::default()
                    },
                ));
            }
        }
        if invalid_keys > 0 {
            warn!(invalid_keys, "dropped service lines with unusable job numbers");
        }

        let (keyed, duplicates_dropped) = dedup_last_wins(keyed, |(key, _)| key.clone());

        let txn = db.begin().await?;
        let existing = self.existing_service_keys(&txn, &keyed).await?;
        let updated = keyed
            .iter()
            .filter(|(key, _)| existing.contains(key))
            .count() as u64;
        let inserted = keyed.len() as u64 - updated;

        let models: Vec<work_order_service::ActiveModel> =
            keyed.into_iter().map(|(_, model)| model).collect();
        let conflict = OnConflict::columns([
            work_order_service::Column::WorkOrderId,
            work_order_service::Column::JobNo,
        ])
        .update_columns([
            work_order_service::Column::JobName,
            work_order_service::Column::Fee,
            work_order_service::Column::Discount,
            work_order_service::Column::UpdatedAt,
        ])
        .to_owned();

        upsert_in_batches(&txn, models, conflict, self.upsert.chunk_size).await?;
        txn.commit().await?;

        Ok(PhaseReport {
            table: "work_order_services".to_string(),
            inserted,
            updated,
            orphans_skipped,
            duplicates_dropped,
        })
    }

    async fn existing_service_keys(
        &self,
        txn: &DatabaseTransaction,
        keyed: &[((i64, String), work_order_service::ActiveModel)],
    ) -> Result<HashSet<(i64, String)>, SyncError> {
        let mut parent_ids: Vec<i64> = keyed.iter().map(|(key, _)| key.0).collect();
        parent_ids.sort_unstable();
        parent_ids.dedup();

        let mut existing = HashSet::new();
        for chunk in parent_ids.chunks(self.lookup_batch()) {
            let rows: Vec<(i64, String)> = WorkOrderService::find()
                .select_only()
                .column(work_order_service::Column::WorkOrderId)
                .column(work_order_service::Column::JobNo)
                .filter(work_order_service::Column::WorkOrderId.is_in(chunk.iter().copied()))
                .into_tuple::<(i64, String)>()
                .all(txn)
                .await?;
            existing.extend(rows);
        }
        Ok(existing)
    }

    /// Phase 3: upsert part lines against committed parents.
    async fn upsert_parts(
        &self,
        db: &DatabaseConnection,
        records: &[WorkOrderRecord],
        parent_ids: &HashMap<String, i64>,
    ) -> Result<PhaseReport, SyncError> {
        let mut orphans_skipped: u64 = 0;
        let mut invalid_keys: u64 = 0;
        let now: DateTimeWithTimeZone = Utc::now().into();

        let mut keyed: Vec<((i64, String, String), work_order_part::ActiveModel)> = Vec::new();
        for record in records {
            let parent_id = clean_key(record.work_order_no.as_deref(), KEY_WIDTH)
                .and_then(|key| parent_ids.get(&key).copied());
            for part in &record.parts {
                let (Some(parts_no), Some(job_no)) = (
                    clean_key(part.parts_no.as_deref(), KEY_WIDTH),
                    clean_key(part.job_no.as_deref(), KEY_WIDTH),
                ) else {
                    invalid_keys += 1;
                    continue;
                };
                let Some(parent_id) = parent_id else {
                    orphans_skipped += 1;
                    warn!(
                        work_order_no = record.work_order_no.as_deref().unwrap_or("<missing>"),
                        parts_no = %parts_no,
                        "skipping part line with no committed parent work order"
                    );
                    continue;
                };
                keyed.push((
                    (parent_id, parts_no.clone(), job_no.clone()),
                    work_order_part::ActiveModel {
                        work_order_id: Set(parent_id),
                        parts_no: Set(parts_no),
                        job_no: Set(job_no),
                        parts_name: Set(opt_text(part.parts_name.as_deref())),
                        quantity: Set(part.quantity.map(|q| q as i32).unwrap_or(0)),
                        unit_price: Set(part.unit_price.unwrap_or(0.0)),
                        created_at: Set(now),
                        updated_at: Set(now),
                        ..Default::default()
                    },
                ));
            }
        }
        if invalid_keys > 0 {
            warn!(
                invalid_keys,
                "dropped part lines with unusable part or job numbers"
            );
        }

        let (keyed, duplicates_dropped) = dedup_last_wins(keyed, |(key, _)| key.clone());

        let txn = db.begin().await?;
        let existing = self.existing_part_keys(&txn, &keyed).await?;
        let updated = keyed
            .iter()
            .filter(|(key, _)| existing.contains(key))
            .count() as u64;
        let inserted = keyed.len() as u64 - updated;

        let models: Vec<work_order_part::ActiveModel> =
            keyed.into_iter().map(|(_, model)| model).collect();
        let conflict = OnConflict::columns([
            work_order_part::Column::WorkOrderId,
            work_order_part::Column::PartsNo,
            work_order_part::Column::JobNo,
        ])
        .update_columns([
            work_order_part::Column::PartsName,
            work_order_part::Column::Quantity,
            work_order_part::Column::UnitPrice,
            work_order_part::Column::UpdatedAt,
        ])
        .to_owned();

        upsert_in_batches(&txn, models, conflict, self.upsert.chunk_size).await?;
        txn.commit().await?;

        Ok(PhaseReport {
            table: "work_order_parts".to_string(),
            inserted,
            updated,
            orphans_skipped,
            duplicates_dropped,
        })
    }

    async fn existing_part_keys(
        &self,
        txn: &DatabaseTransaction,
        keyed: &[((i64, String, String), work_order_part::ActiveModel)],
    ) -> Result<HashSet<(i64, String, String)>, SyncError> {
        let mut parent_ids: Vec<i64> = keyed.iter().map(|(key, _)| key.0).collect();
        parent_ids.sort_unstable();
        parent_ids.dedup();

        let mut existing = HashSet::new();
        for chunk in parent_ids.chunks(self.lookup_batch()) {
            let rows: Vec<(i64, String, String)> = WorkOrderPart::find()
                .select_only()
                .column(work_order_part::Column::WorkOrderId)
                .column(work_order_part::Column::PartsNo)
                .column(work_order_part::Column::JobNo)
                .filter(work_order_part::Column::WorkOrderId.is_in(chunk.iter().copied()))
                .into_tuple::<(i64, String, String)>()
                .all(txn)
                .await?;
            existing.extend(rows);
        }
        Ok(existing)
    }
}

#[async_trait]
impl Processor for WorkOrderProcessor {
    fn fetch_type(&self) -> FetchType {
        FetchType::WorkOrder
    }

    fn endpoint(&self) -> &'static str {
        "pkb"
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
        let parsed: Vec<WorkOrderRecord> = parse_records(records, "work_order");
        let mut report = UpsertReport::default();

        let parents = self
            .upsert_parents(db, dealer_id, &parsed)
            .await
            .map_err(|error| SyncError::phase("work_orders", 0, error))?;
        report.push(parents);

        let parent_ids = self
            .resolve_parent_ids(db, dealer_id, &parsed)
            .await
            .map_err(|error| SyncError::phase("work_order_id_resolution", 1, error))?;

        let services = self
            .upsert_services(db, &parsed, &parent_ids)
            .await
            .map_err(|error| SyncError::phase("work_order_services", 1, error))?;
        report.push(services);

        let parts = self
            .upsert_parts(db, &parsed, &parent_ids)
            .await
            .map_err(|error| SyncError::phase("work_order_parts", 2, error))?;
        report.push(parts);

        Ok(report)
    }
}
