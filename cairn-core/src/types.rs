//! # Core Types
//!
//! Data model of the manifest index.
//!
//! ## Record Model
//!
//! ```text
//! ManifestRecord
//! ├── Live(ManifestEntry)   { id, labels, payload, mod_time }
//! └── Tombstone(Tombstone)  { id, deleted_at }
//! ```
//!
//! A tombstone always supersedes an entry with the same ID. Two records of the
//! same kind are ordered by their timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Timestamp type used throughout the system
pub type Timestamp = DateTime<Utc>;

/// Label set attached to every manifest
pub type Labels = BTreeMap<String, String>;

/// Label that every manifest must carry
pub const TYPE_LABEL: &str = "type";

/// Unique identifier for manifests
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(String);

impl ManifestId {
    /// Generate a fresh random ID (32 lowercase hex chars)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ManifestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ManifestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a record in the content store: `prefix + hex(blake3(data))`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(prefix: &str, hash_hex: &str) -> Self {
        Self(format!("{}{}", prefix, hash_hex))
    }

    /// Parse a content ID, splitting off its optional one-letter prefix
    pub fn parse(s: &str) -> Result<Self> {
        let hash = match s.chars().next() {
            Some(c) if is_prefix_char(c) => &s[1..],
            _ => s,
        };
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::Store {
                message: format!("invalid content id {:?}", s),
            });
        }
        Ok(Self(s.to_string()))
    }

    pub fn prefix(&self) -> &str {
        match self.0.chars().next() {
            Some(c) if is_prefix_char(c) => &self.0[..1],
            _ => "",
        }
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.prefix() == prefix
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_prefix_char(c: char) -> bool {
    ('g'..='z').contains(&c)
}

/// Validate a content prefix: empty, or a single letter in `g..=z`
pub fn validate_prefix(prefix: &str) -> Result<()> {
    let mut chars = prefix.chars();
    match (chars.next(), chars.next()) {
        (None, _) => Ok(()),
        (Some(c), None) if is_prefix_char(c) => Ok(()),
        _ => Err(Error::InvalidPrefix {
            prefix: prefix.to_string(),
        }),
    }
}

/// Listing entry returned by the content store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentInfo {
    pub id: ContentId,
    pub length: u64,
}

/// Check a label set: non-empty, non-empty keys, non-empty `type`
pub fn validate_labels(labels: &Labels) -> Result<()> {
    if labels.is_empty() {
        return Err(Error::InvalidLabels {
            reason: "label set is empty".to_string(),
        });
    }

    match labels.get(TYPE_LABEL) {
        Some(value) if !value.is_empty() => {}
        _ => {
            return Err(Error::InvalidLabels {
                reason: "'type' label is required".to_string(),
            })
        }
    }

    if labels.keys().any(|k| k.is_empty()) {
        return Err(Error::InvalidLabels {
            reason: "label keys must be non-empty".to_string(),
        });
    }

    Ok(())
}

/// A live manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: ManifestId,
    pub labels: Labels,
    pub mod_time: Timestamp,
    pub payload: serde_json::Value,
}

impl ManifestEntry {
    /// True if every criteria pair is present in the labels
    pub fn matches(&self, criteria: &Labels) -> bool {
        criteria
            .iter()
            .all(|(k, v)| self.labels.get(k).map_or(false, |have| have == v))
    }

    pub fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            id: self.id.clone(),
            labels: self.labels.clone(),
            mod_time: self.mod_time,
            length: payload_length(&self.payload),
        }
    }
}

/// Durable deletion marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub id: ManifestId,
    pub deleted_at: Timestamp,
}

/// One record of a manifest block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ManifestRecord {
    #[serde(rename = "put")]
    Live(ManifestEntry),
    #[serde(rename = "delete")]
    Tombstone(Tombstone),
}

impl ManifestRecord {
    pub fn id(&self) -> &ManifestId {
        match self {
            ManifestRecord::Live(e) => &e.id,
            ManifestRecord::Tombstone(t) => &t.id,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            ManifestRecord::Live(e) => e.mod_time,
            ManifestRecord::Tombstone(t) => t.deleted_at,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, ManifestRecord::Tombstone(_))
    }

    pub fn as_live(&self) -> Option<&ManifestEntry> {
        match self {
            ManifestRecord::Live(e) => Some(e),
            ManifestRecord::Tombstone(_) => None,
        }
    }

    /// Replay rule: a tombstone beats an entry, otherwise the newer record wins
    pub fn supersedes(&self, existing: &ManifestRecord) -> bool {
        match (self.is_tombstone(), existing.is_tombstone()) {
            (true, false) => true,
            (false, true) => false,
            _ => self.timestamp() > existing.timestamp(),
        }
    }
}

/// Manifest metadata returned by lookups and queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub id: ManifestId,
    pub labels: Labels,
    pub mod_time: Timestamp,
    pub length: u64,
}

fn payload_length(payload: &serde_json::Value) -> u64 {
    serde_json::to_vec(payload).map(|v| v.len() as u64).unwrap_or(0)
}

/// Build a label set from `(key, value)` pairs
pub fn labels<K, V, I>(pairs: I) -> Labels
where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
