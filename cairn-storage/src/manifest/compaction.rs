//! # Manifest Compaction
//!
//! Consolidates every committed block into one.
//!
//! ```text
//! per ID among all inputs:
//!   entry only              -> keep the newest entry
//!   entry + tombstone       -> drop the entry, keep the newest tombstone
//!   tombstone only (orphan) -> keep the tombstone
//! ```
//!
//! Tombstones are always carried into the consolidated block. Old blocks are
//! retired one by one, so a run that fails midway may leave an entry's block
//! behind after its tombstone's block is gone; the consolidated block must
//! still shadow it.

use std::collections::BTreeMap;

use cairn_core::{ContentId, ManifestId, ManifestRecord};

/// Output of `plan_compaction`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompactionPlan {
    /// Consolidated records, sorted by ID
    pub records: Vec<ManifestRecord>,
    /// Blocks superseded by the consolidated block
    pub retired: Vec<ContentId>,
    pub entries_kept: usize,
    pub entries_dropped: usize,
    pub tombstones_kept: usize,
}

/// Compaction result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionResult {
    pub blocks_compacted: usize,
    pub blocks_deleted: usize,
    /// Consolidated block; `None` when there were no records at all
    pub new_block: Option<ContentId>,
    pub entries_kept: usize,
    pub entries_dropped: usize,
    pub tombstones_kept: usize,
    pub duration_ms: u64,
}

#[derive(Default)]
struct Survivor {
    entry: Option<ManifestRecord>,
    tombstone: Option<ManifestRecord>,
}

fn keep_newer(slot: &mut Option<ManifestRecord>, record: ManifestRecord) {
    let replace = match slot.as_ref() {
        Some(existing) => record.supersedes(existing),
        None => true,
    };
    if replace {
        *slot = Some(record);
    }
}

/// Plan the consolidation of `blocks` and the `pending` records
pub fn plan_compaction(
    blocks: Vec<(ContentId, Vec<ManifestRecord>)>,
    pending: Vec<ManifestRecord>,
) -> CompactionPlan {
    let mut retired = Vec::with_capacity(blocks.len());
    let mut by_id: BTreeMap<ManifestId, Survivor> = BTreeMap::new();

    let inputs = blocks
        .into_iter()
        .flat_map(|(content_id, records)| {
            retired.push(content_id);
            records
        })
        .chain(pending);

    for record in inputs {
        let slot = by_id.entry(record.id().clone()).or_default();
        if record.is_tombstone() {
            keep_newer(&mut slot.tombstone, record);
        } else {
            keep_newer(&mut slot.entry, record);
        }
    }

    let mut plan = CompactionPlan {
        retired,
        ..Default::default()
    };

    for survivor in by_id.into_values() {
        match survivor {
            Survivor {
                entry,
                tombstone: Some(tombstone),
            } => {
                if entry.is_some() {
                    plan.entries_dropped += 1;
                }
                plan.tombstones_kept += 1;
                plan.records.push(tombstone);
            }
            Survivor {
                entry: Some(entry),
                tombstone: None,
            } => {
                plan.entries_kept += 1;
                plan.records.push(entry);
            }
            Survivor {
                entry: None,
                tombstone: None,
            } => {}
        }
    }

    plan
}
