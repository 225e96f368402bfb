//! # Prospect Processor
//!
//! Syncs sales prospects and their follow-up activities from the gateway's
//! `prospect` endpoint. Two phases: parent prospects commit first, then
//! activities resolve their parent ids from the committed rows.

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
use crate::models::prospect::{self, Entity as Prospect};
use crate::models::prospect_activity::{self, Entity as ProspectActivity};
use crate::processors::{Processor, opt_text, parse_partner_datetime, parse_records};
use crate::upsert::{
    PhaseReport, UpsertReport, clean_key, count_lookups, dedup_last_wins, sanitize_keys,
    upsert_in_batches,
};

const KEY_WIDTH: usize = 64;

/// One prospect as the gateway returns it, with its activities inline.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProspectRecord {
    prospect_no: Option<String>,
    name: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    source_code: Option<String>,
    status_code: Option<String>,
    followup_date: Option<String>,
    #[serde(default)]
    activities: Vec<ActivityRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityRecord {
    activity_no: Option<String>,
    activity_date: Option<String>,
    description: Option<String>,
    result_code: Option<String>,
}

/// Processor for the sales prospect domain.
#[derive(Debug)]
pub struct ProspectProcessor {
    upsert: UpsertConfig,
}

impl ProspectProcessor {
    pub fn new(upsert: UpsertConfig) -> Self {
        Self { upsert }
    }

    fn lookup_batch(&self) -> usize {
        self.upsert.lookup_batch_size.max(1)
    }

    async fn upsert_parents(
        &self,
        db: &DatabaseConnection,
        dealer_id: Uuid,
        records: &[ProspectRecord],
    ) -> Result<PhaseReport, SyncError> {
        let mut invalid_keys: u64 = 0;
        let mut keyed: Vec<(String, &ProspectRecord)> = Vec::new();
        for record in records {
            match clean_key(record.prospect_no.as_deref(), KEY_WIDTH) {
                Some(key) => keyed.push((key, record)),
                None => invalid_keys += 1,
            }
        }
        if invalid_keys > 0 {
            warn!(invalid_keys, "dropped prospects with unusable prospect numbers");
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
        let models: Vec<prospect::ActiveModel> = keyed
            .into_iter()
            .map(|(key, record)| prospect::ActiveModel {
                dealer_id: Set(dealer_id),
                prospect_no: Set(key),
                name: Set(opt_text(record.name.as_deref())),
                phone: Set(opt_text(record.phone.as_deref())),
                address: Set(opt_text(record.address.as_deref())),
                source_code: Set(opt_text(record.source_code.as_deref())),
                status_code: Set(opt_text(record.status_code.as_deref())),
                followup_date: Set(parse_partner_datetime(record.followup_date.as_deref())),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            })
            .collect();

        let conflict = OnConflict::columns([
            prospect::Column::DealerId,
            prospect::Column::ProspectNo,
        ])
        .update_columns([
            prospect::Column::Name,
            prospect::Column::Phone,
            prospect::Column::Address,
            prospect::Column::SourceCode,
            prospect::Column::StatusCode,
            prospect::Column::FollowupDate,
            prospect::Column::UpdatedAt,
        ])
        .to_owned();

        upsert_in_batches(&txn, models, conflict, self.upsert.chunk_size).await?;
        txn.commit().await?;

        Ok(PhaseReport {
            table: "prospects".to_string(),
            inserted,
            updated,
            orphans_skipped: 0,
            duplicates_dropped,
        })
    }

    async fn existing_parent_keys(
        &self,
        txn: &DatabaseTransaction,
        dealer_id: Uuid,
        keys: &[String],
    ) -> Result<HashSet<String>, SyncError> {
        let mut existing = HashSet::new();
        for chunk in keys.chunks(self.lookup_batch()) {
            let rows: Vec<String> = Prospect::find()
                .select_only()
                .column(prospect::Column::ProspectNo)
                .filter(prospect::Column::DealerId.eq(dealer_id))
                .filter(prospect::Column::ProspectNo.is_in(chunk.iter().cloned()))
                .into_tuple::<String>()
                .all(txn)
                .await?;
            existing.extend(rows);
        }
        Ok(existing)
    }

    async fn resolve_parent_ids(
        &self,
        db: &DatabaseConnection,
        dealer_id: Uuid,
        records: &[ProspectRecord],
    ) -> Result<HashMap<String, i64>, SyncError> {
        let keys = sanitize_keys(
            records.iter().map(|record| record.prospect_no.as_deref()),
            KEY_WIDTH,
        );

        let mut ids = HashMap::with_capacity(keys.len());
        for chunk in keys.chunks(self.lookup_batch()) {
            let rows: Vec<(i64, String)> = Prospect::find()
                .select_only()
                .column(prospect::Column::Id)
                .column(prospect::Column::ProspectNo)
                .filter(prospect::Column::DealerId.eq(dealer_id))
                .filter(prospect::Column::ProspectNo.is_in(chunk.iter().cloned()))
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
            "resolved prospect ids"
        );
        Ok(ids)
    }

    async fn upsert_activities(
        &self,
        db: &DatabaseConnection,
        records: &[ProspectRecord],
        parent_ids: &HashMap<String, i64>,
    ) -> Result<PhaseReport, SyncError> {
        let mut orphans_skipped: u64 = 0;
        let mut invalid_keys: u64 = 0;
        let now: DateTimeWithTimeZone = Utc::now().into();

        let mut keyed: Vec<((i64, String), prospect_activity::ActiveModel)> = Vec::new();
        for record in records {
            let parent_id = clean_key(record.prospect_no.as_deref(), KEY_WIDTH)
                .and_then(|key| parent_ids.get(&key).copied());
            for activity in &record.activities {
                let Some(activity_no) = clean_key(activity.activity_no.as_deref(), KEY_WIDTH)
                else {
                    invalid_keys += 1;
                    continue;
                };
                let Some(parent_id) = parent_id else {
                    orphans_skipped += 1;
                    warn!(
                        prospect_no = record.prospect_no.as_deref().unwrap_or("<missing>"),
                        activity_no = %activity_no,
                        "skipping activity with no committed parent prospect"
                    );
                    continue;
                };
                keyed.push((
                    (parent_id, activity_no.clone()),
                    prospect_activity::ActiveModel {
                        prospect_id: Set(parent_id),
                        activity_no: Set(activity_no),
                        activity_date: Set(parse_partner_datetime(
                            activity.activity_date.as_deref(),
                        )),
                        description: Set(opt_text(activity.description.as_deref())),
                        result_code: Set(opt_text(activity.result_code.as_deref())),
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
                "dropped activities with unusable activity numbers"
            );
        }

        let (keyed, duplicates_dropped) = dedup_last_wins(keyed, |(key, _)| key.clone());

        let txn = db.begin().await?;
        let existing = self.existing_activity_keys(&txn, &keyed).await?;
        let updated = keyed
            .iter()
            .filter(|(key, _)| existing.contains(key))
            .count() as u64;
        let inserted = keyed.len() as u64 - updated;

        let models: Vec<prospect_activity::ActiveModel> =
            keyed.into_iter().map(|(_, model)| model).collect();
        let conflict = OnConflict::columns([
            prospect_activity::Column::ProspectId,
            prospect_activity::Column::ActivityNo,
        ])
        .update_columns([
            prospect_activity::Column::ActivityDate,
            prospect_activity::Column::Description,
            prospect_activity::Column::ResultCode,
            prospect_activity::Column::UpdatedAt,
        ])
        .to_owned();

        upsert_in_batches(&txn, models, conflict, self.upsert.chunk_size).await?;
        txn.commit().await?;

        Ok(PhaseReport {
            table: "prospect_activities".to_string(),
            inserted,
            updated,
            orphans_skipped,
            duplicates_dropped,
        })
    }

    async fn existing_activity_keys(
        &self,
        txn: &DatabaseTransaction,
        keyed: &[((i64, String), prospect_activity::ActiveModel)],
    ) -> Result<HashSet<(i64, String)>, SyncError> {
        let mut parent_ids: Vec<i64> = keyed.iter().map(|(key, _)| key.0).collect();
        parent_ids.sort_unstable();
        parent_ids.dedup();

        let mut existing = HashSet::new();
        for chunk in parent_ids.chunks(self.lookup_batch()) {
            let rows: Vec<(i64, String)> = ProspectActivity::find()
                .select_only()
                .column(prospect_activity::Column::ProspectId)
                .column(prospect_activity::Column::ActivityNo)
                .filter(prospect_activity::Column::ProspectId.is_in(chunk.iter().copied()))
                .into_tuple::<(i64, String)>()
                .all(txn)
                .await?;
            existing.extend(rows);
        }
        Ok(existing)
    }
}

#[async_trait]
impl Processor for ProspectProcessor {
    fn fetch_type(&self) -> FetchType {
        FetchType::Prospect
    }

    fn endpoint(&self) -> &'static str {
        "prospect"
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
        let parsed: Vec<ProspectRecord> = parse_records(records, "prospect");
        let mut report = UpsertReport::default();

        let parents = self
            .upsert_parents(db, dealer_id, &parsed)
            .await
            .map_err(|error| SyncError::phase("prospects", 0, error))?;
        report.push(parents);

        let parent_ids = self
            .resolve_parent_ids(db, dealer_id, &parsed)
            .await
            .map_err(|error| SyncError::phase("prospect_id_resolution", 1, error))?;

        let activities = self
            .upsert_activities(db, &parsed, &parent_ids)
            .await
            .map_err(|error| SyncError::phase("prospect_activities", 1, error))?;
        report.push(activities);

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
            "prospectNo": "PR-0042",
            "name": "Siti",
            "phone": "0813111222",
            "sourceCode": "WALKIN",
            "statusCode": "HOT",
            "followupDate": "2026-05-25",
            "activities": [
                {"activityNo": "ACT-1", "activityDate": "2026-05-20 10:00:00", "description": "Called", "resultCode": "OK"}
            ]
        });

        let record: ProspectRecord = serde_json::from_value(raw).unwrap();

        assert_eq!(record.prospect_no.as_deref(), Some("PR-0042"));
        assert_eq!(record.address, None);
        assert_eq!(record.activities.len(), 1);
        assert_eq!(record.activities[0].result_code.as_deref(), Some("OK"));
    }

    #[test]
    fn record_tolerates_missing_activity_array() {
        let raw = json!({"prospectNo": "PR-1"});

        let record: ProspectRecord = serde_json::from_value(raw).unwrap();

        assert!(record.activities.is_empty());
    }
}
