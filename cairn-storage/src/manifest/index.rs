//! # Manifest Index
//!
//! In-memory view of committed records plus the uncommitted pending buffer.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ PendingBuffer   id -> (seq, record)           │  overlay, checked first
//! ├───────────────────────────────────────────────┤
//! │ ManifestIndex   id -> record                  │  replayed from blocks
//! │                 (key, value) -> {id}          │  live entries only
//! └───────────────────────────────────────────────┘
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};

use cairn_core::{Labels, ManifestEntry, ManifestId, ManifestRecord};

type Posting = (String, String);

/// Committed records keyed by ID with a label inverted index
#[derive(Debug, Default)]
pub struct ManifestIndex {
    records: HashMap<ManifestId, ManifestRecord>,
    postings: HashMap<Posting, BTreeSet<ManifestId>>,
}

impl ManifestIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay `records` into a fresh index
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = ManifestRecord>,
    {
        let mut index = Self::new();
        for record in records {
            index.apply(record);
        }
        index
    }

    /// Apply one record under the replay rule; returns false if it lost
    pub fn apply(&mut self, record: ManifestRecord) -> bool {
        if let Some(existing) = self.records.get(record.id()) {
            if !record.supersedes(existing) {
                return false;
            }
        }

        if let Some(ManifestRecord::Live(old)) = self.records.remove(record.id()) {
            self.unindex(&old);
        }
        if let ManifestRecord::Live(entry) = &record {
            for (key, value) in &entry.labels {
                self.postings
                    .entry((key.clone(), value.clone()))
                    .or_default()
                    .insert(entry.id.clone());
            }
        }
        self.records.insert(record.id().clone(), record);
        true
    }

    fn unindex(&mut self, entry: &ManifestEntry) {
        for (key, value) in &entry.labels {
            let posting = (key.clone(), value.clone());
            if let Some(ids) = self.postings.get_mut(&posting) {
                ids.remove(&entry.id);
                if ids.is_empty() {
                    self.postings.remove(&posting);
                }
            }
        }
    }

    pub fn contains(&self, id: &ManifestId) -> bool {
        self.records.contains_key(id)
    }

    /// Live entry for `id`, if not tombstoned
    pub fn live(&self, id: &ManifestId) -> Option<&ManifestEntry> {
        self.records.get(id).and_then(ManifestRecord::as_live)
    }

    /// Live entries matching every criteria pair, sorted by ID
    pub fn find(&self, criteria: &Labels) -> Vec<&ManifestEntry> {
        if criteria.is_empty() {
            let mut all: Vec<&ManifestEntry> =
                self.records.values().filter_map(ManifestRecord::as_live).collect();
            all.sort_by(|a, b| a.id.cmp(&b.id));
            return all;
        }

        let mut lists = Vec::with_capacity(criteria.len());
        for (key, value) in criteria {
            match self.postings.get(&(key.clone(), value.clone())) {
                Some(ids) => lists.push(ids),
                None => return Vec::new(),
            }
        }
        lists.sort_by_key(|ids| ids.len());

        let Some((smallest, rest)) = lists.split_first() else {
            return Vec::new();
        };

        // BTreeSet iteration keeps the result sorted by ID
        smallest
            .iter()
            .filter(|id| rest.iter().all(|ids| ids.contains(*id)))
            .filter_map(|id| self.live(id))
            .collect()
    }

    /// Number of IDs known, live or tombstoned
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub fn live_count(&self) -> usize {
        self.records.values().filter(|r| !r.is_tombstone()).count()
    }
}

/// Uncommitted operations since the last flush.
///
/// Later operations on the same ID replace earlier ones; sequence numbers keep
/// the order in which the final state of each ID was issued.
#[derive(Debug, Default)]
pub struct PendingBuffer {
    ops: BTreeMap<ManifestId, (u64, ManifestRecord)>,
    next_seq: u64,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ManifestRecord) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.ops.insert(record.id().clone(), (seq, record));
    }

    /// Drop the pending operation for `id`; returns it if there was one
    pub fn remove(&mut self, id: &ManifestId) -> Option<ManifestRecord> {
        self.ops.remove(id).map(|(_, record)| record)
    }

    fn get(&self, id: &ManifestId) -> Option<&ManifestRecord> {
        self.ops.get(id).map(|(_, record)| record)
    }

    pub fn contains(&self, id: &ManifestId) -> bool {
        self.ops.contains_key(id)
    }

    /// Final record of every ID, in sequence order
    pub fn records(&self) -> Vec<ManifestRecord> {
        let mut ordered: Vec<&(u64, ManifestRecord)> = self.ops.values().collect();
        ordered.sort_by_key(|(seq, _)| *seq);
        ordered.into_iter().map(|(_, record)| record.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

/// Read-only merged view: pending operations shadow committed records
pub struct MergedView<'a> {
    pub committed: &'a ManifestIndex,
    pub pending: &'a PendingBuffer,
}

impl<'a> MergedView<'a> {
    pub fn new(committed: &'a ManifestIndex, pending: &'a PendingBuffer) -> Self {
        Self { committed, pending }
    }

    pub fn live(&self, id: &ManifestId) -> Option<&'a ManifestEntry> {
        match self.pending.get(id) {
            Some(record) => record.as_live(),
            None => self.committed.live(id),
        }
    }

    /// True if `id` is in use anywhere, including by a tombstone
    pub fn knows(&self, id: &ManifestId) -> bool {
        self.pending.contains(id) || self.committed.contains(id)
    }

    pub fn find(&self, criteria: &Labels) -> Vec<&'a ManifestEntry> {
        let mut found: Vec<&'a ManifestEntry> = self
            .committed
            .find(criteria)
            .into_iter()
            .filter(|entry| !self.pending.contains(&entry.id))
            .collect();

        found.extend(
            self.pending
                .ops
                .values()
                .filter_map(|(_, record)| record.as_live())
                .filter(|entry| entry.matches(criteria)),
        );
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }
}
