//! # Bulk-Upsert Engine
//!
//! Shared primitives for the phased hierarchical writes every processor
//! performs. The partner API hands back denormalised payloads where natural
//! keys may be null, blank, duplicated or over-length, so everything here is
//! defensive about keys before they reach a statement:
//!
//! 1. keys are sanitized (trim, drop empty, drop over-length, de-duplicate),
//! 2. in-batch duplicates are collapsed last-write-wins, because a multi-row
//!    `INSERT .. ON CONFLICT` containing the same conflict key twice is a
//!    cardinality violation, not a constraint conflict,
//! 3. inserts run chunked to respect bind-parameter limits.
//!
//! Each phase commits in its own transaction; processors compose these
//! helpers into parent-then-children phase sequences and report per-phase
//! counts through [`UpsertReport`].

use std::collections::HashSet;
use std::collections::hash_map::{Entry, HashMap};
use std::hash::Hash;

use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, IntoActiveModel};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::SyncError;

/// Counters for one committed (or attempted) upsert phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    /// Target table name, e.g. `work_order_services`.
    pub table: String,
    /// Rows that did not exist before this phase.
    pub inserted: u64,
    /// Rows that already existed and were updated in place.
    pub updated: u64,
    /// Child rows dropped because their parent key never committed.
    pub orphans_skipped: u64,
    /// In-batch duplicates collapsed before the statement was issued.
    pub duplicates_dropped: u64,
}

/// Aggregated result of a job's upsert phases, stored as the job result JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertReport {
    pub phases: Vec<PhaseReport>,
}

impl UpsertReport {
    pub fn push(&mut self, phase: PhaseReport) {
        self.phases.push(phase);
    }

    /// Rows written across all phases, inserted and updated alike.
    pub fn records_written(&self) -> u64 {
        self.phases
            .iter()
            .map(|phase| phase.inserted + phase.updated)
            .sum()
    }

    pub fn total_orphans_skipped(&self) -> u64 {
        self.phases.iter().map(|phase| phase.orphans_skipped).sum()
    }

    /// Serialize for the `sync_jobs.result` column.
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

/// Normalise one raw natural key: trim whitespace, reject empty and
/// over-length values.
///
/// Over-length keys are dropped rather than truncated: truncation could
/// alias two distinct upstream keys onto one row, silently merging records.
pub fn clean_key(raw: Option<&str>, max_chars: usize) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().count() > max_chars {
        debug!(
            key_chars = trimmed.chars().count(),
            max_chars, "dropping over-length natural key"
        );
        return None;
    }
    Some(trimmed.to_string())
}

/// Sanitize a set of natural keys destined for lookup parameters.
///
/// Applies [`clean_key`] to every candidate and de-duplicates the survivors
/// preserving first-seen order, so lookup batches stay deterministic.
pub fn sanitize_keys<I, S>(keys: I, max_chars: usize) -> Vec<String>
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut sanitized = Vec::new();

    for key in keys {
        let Some(key) = clean_key(key.as_ref().map(|k| k.as_ref()), max_chars) else {
            continue;
        };
        if seen.insert(key.clone()) {
            sanitized.push(key);
        }
    }

    sanitized
}

/// Collapse in-batch duplicates, keeping the last row per key at the first
/// occurrence's position.
///
/// Last-write-wins matches what serial single-row upserts would have done;
/// keeping the first position preserves the payload's ordering for
/// everything else. Returns the surviving rows and how many were dropped.
pub fn dedup_last_wins<T, K, F>(rows: Vec<T>, key_fn: F) -> (Vec<T>, u64)
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut index_of: HashMap<K, usize> = HashMap::new();
    let mut slots: Vec<Option<T>> = Vec::with_capacity(rows.len());
    let mut dropped: u64 = 0;

    for row in rows {
        match index_of.entry(key_fn(&row)) {
            Entry::Occupied(entry) => {
                slots[*entry.get()] = Some(row);
                dropped += 1;
            }
            Entry::Vacant(entry) => {
                entry.insert(slots.len());
                slots.push(Some(row));
            }
        }
    }

    (slots.into_iter().flatten().collect(), dropped)
}

/// Chunked `insert_many` with an `ON CONFLICT .. DO UPDATE` clause.
///
/// Empty input is a no-op. Chunking keeps every statement under the
/// backend's bind-parameter ceiling; rows must already be de-duplicated by
/// the conflict key. Returns the total number of rows affected.
pub async fn upsert_in_batches<A, C>(
    conn: &C,
    rows: Vec<A>,
    conflict: OnConflict,
    chunk_size: usize,
) -> Result<u64, SyncError>
where
    A: ActiveModelTrait + Send,
    C: ConnectionTrait,
    <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
{
    if rows.is_empty() {
        return Ok(0);
    }

    let chunk_size = chunk_size.max(1);
    let mut affected: u64 = 0;
    let mut remaining = rows;

    while !remaining.is_empty() {
        let split = remaining.len().min(chunk_size);
        let tail = remaining.split_off(split);
        let chunk = std::mem::replace(&mut remaining, tail);

        affected += <A::Entity as EntityTrait>::insert_many(chunk)
            .on_conflict(conflict.clone())
            .exec_without_returning(conn)
            .await?;
    }

    Ok(affected)
}

/// Number of `IS IN` lookup queries needed to resolve `total_keys` keys in
/// batches of `batch_size`.
pub const fn count_lookups(total_keys: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    total_keys.div_ceil(batch_size)
}
