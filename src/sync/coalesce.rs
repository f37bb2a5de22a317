//! Journal coalescing: at most one pending mutation per entity.

use std::collections::HashSet;

use super::types::SyncRecord;

/// Reduce `records` to the highest-key record per entity.
///
/// Later mutations supersede earlier ones regardless of method, so a delete
/// after updates wins, and an update after a delete wins. Output order is
/// descending by key, deterministic for the same input.
pub fn coalesce(mut records: Vec<SyncRecord>) -> Vec<SyncRecord> {
    records.sort_by(|a, b| b.key.cmp(&a.key));
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
    records.retain(|record| seen.insert(record.entity_id.clone()));
    records
}
