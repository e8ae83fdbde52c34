//! # Manifest Block Codec
//!
//! ```text
//! byte 0      format version
//! byte 1      compression (0 = none, 1 = zstd)
//! bytes 2..   JSON document {"records":[...]}, compressed as tagged
//! ```
//!
//! Encoding is deterministic: the same records in the same order always
//! produce the same bytes, and therefore the same content ID.

use serde::{Deserialize, Serialize};

use cairn_core::{
    config::CompressionAlgorithm,
    error::{Error, Result},
    ContentId, ManifestRecord,
};

/// Content prefix reserved for manifest blocks
pub const MANIFEST_PREFIX: &str = "m";

pub const BLOCK_FORMAT_VERSION: u8 = 1;
const BLOCK_HEADER_SIZE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockCompression {
    None = 0,
    Zstd = 1,
}

impl TryFrom<u8> for BlockCompression {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, String> {
        match value {
            0 => Ok(BlockCompression::None),
            1 => Ok(BlockCompression::Zstd),
            _ => Err(format!("invalid compression type: {}", value)),
        }
    }
}

impl From<CompressionAlgorithm> for BlockCompression {
    fn from(algorithm: CompressionAlgorithm) -> Self {
        match algorithm {
            CompressionAlgorithm::None => BlockCompression::None,
            CompressionAlgorithm::Zstd => BlockCompression::Zstd,
        }
    }
}

#[derive(Serialize)]
struct BlockDocumentRef<'a> {
    records: &'a [ManifestRecord],
}

#[derive(Deserialize)]
struct BlockDocument {
    records: Vec<ManifestRecord>,
}

/// Encode a batch of records into one block payload
pub fn encode_block(
    records: &[ManifestRecord],
    compression: CompressionAlgorithm,
    level: i32,
) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(&BlockDocumentRef { records }).map_err(|e| Error::Marshal {
        message: e.to_string(),
    })?;

    let compression = BlockCompression::from(compression);
    let body = match compression {
        BlockCompression::None => json,
        BlockCompression::Zstd => zstd::encode_all(json.as_slice(), level).map_err(|e| {
            Error::Internal {
                message: format!("zstd compression failed: {}", e),
            }
        })?,
    };

    let mut block = Vec::with_capacity(BLOCK_HEADER_SIZE + body.len());
    block.push(BLOCK_FORMAT_VERSION);
    block.push(compression as u8);
    block.extend_from_slice(&body);
    Ok(block)
}

/// Decode a block payload read from `content_id`
pub fn decode_block(content_id: &ContentId, data: &[u8]) -> Result<Vec<ManifestRecord>> {
    let malformed = |message: String| Error::MalformedBlock {
        content_id: content_id.to_string(),
        message,
    };

    if data.len() < BLOCK_HEADER_SIZE {
        return Err(malformed("block shorter than its header".to_string()));
    }
    if data[0] != BLOCK_FORMAT_VERSION {
        return Err(malformed(format!("unsupported block version {}", data[0])));
    }

    let compression = BlockCompression::try_from(data[1]).map_err(malformed)?;
    let body = &data[BLOCK_HEADER_SIZE..];

    let document: BlockDocument = match compression {
        BlockCompression::None => serde_json::from_slice(body),
        BlockCompression::Zstd => {
            let json = zstd::decode_all(body)
                .map_err(|e| malformed(format!("zstd decompression failed: {}", e)))?;
            serde_json::from_slice(&json)
        }
    }
    .map_err(|e| malformed(e.to_string()))?;

    Ok(document.records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::types::labels;
    use cairn_core::{ManifestEntry, ManifestId, Tombstone};
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use serde_json::json;

    fn block_id() -> ContentId {
        ContentId::new(MANIFEST_PREFIX, "00ff")
    }

    fn sample_records() -> Vec<ManifestRecord> {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        vec![
            ManifestRecord::Live(ManifestEntry {
                id: ManifestId::from("a1"),
                labels: labels([("type", "snapshot"), ("host", "alpha")]),
                mod_time: ts,
                payload: json!({"root": "abc", "sizes": [1, 2, 3]}),
            }),
            ManifestRecord::Tombstone(Tombstone {
                id: ManifestId::from("b2"),
                deleted_at: ts,
            }),
        ]
    }

    #[test]
    fn test_wire_header_and_tags() {
        let block = encode_block(&sample_records(), CompressionAlgorithm::None, 0).unwrap();
        assert_eq!(block[0], BLOCK_FORMAT_VERSION);
        assert_eq!(block[1], BlockCompression::None as u8);

        let text = std::str::from_utf8(&block[2..]).unwrap();
        assert!(text.starts_with(r#"{"records":[{"op":"put""#), "{}", text);
        assert!(text.contains(r#""op":"delete""#));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let records = sample_records();
        let a = encode_block(&records, CompressionAlgorithm::Zstd, 3).unwrap();
        let b = encode_block(&records, CompressionAlgorithm::Zstd, 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(decode_block(&block_id(), &a).unwrap(), records);
    }

    #[test]
    fn test_malformed_blocks() {
        let id = block_id();

        let err = decode_block(&id, &[]).unwrap_err();
        assert!(matches!(err, Error::MalformedBlock { .. }));

        let err = decode_block(&id, &[9, 0, b'{', b'}']).unwrap_err();
        assert!(err.to_string().contains("unsupported block version"));

        let err = decode_block(&id, &[1, 7, b'{', b'}']).unwrap_err();
        assert!(err.to_string().contains("invalid compression type"));

        let err = decode_block(&id, b"\x01\x00not json").unwrap_err();
        assert!(err.is_integrity());

        let err = decode_block(&id, b"\x01\x00{\"records\":[{\"op\":\"merge\"}]}").unwrap_err();
        assert!(matches!(err, Error::MalformedBlock { .. }));
    }

    fn arb_payload() -> impl Strategy<Value = serde_json::Value> {
        let leaf = prop_oneof![
            Just(serde_json::Value::Null),
            any::<bool>().prop_map(serde_json::Value::from),
            any::<i64>().prop_map(serde_json::Value::from),
            ".*".prop_map(serde_json::Value::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::from),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn arb_record() -> impl Strategy<Value = ManifestRecord> {
        let ts = (0i64..4_000_000_000, 0u32..1_000_000_000)
            .prop_map(|(secs, nanos)| Utc.timestamp_opt(secs, nanos).unwrap());
        let live = (
            "[0-9a-f]{32}",
            prop::collection::btree_map(".{1,8}", ".*", 0..4),
            ts.clone(),
            arb_payload(),
        )
            .prop_map(|(id, mut labels, mod_time, payload)| {
                labels.insert("type".to_string(), "t".to_string());
                ManifestRecord::Live(ManifestEntry {
                    id: ManifestId::from(id),
                    labels,
                    mod_time,
                    payload,
                })
            });
        let tombstone = ("[0-9a-f]{32}", ts).prop_map(|(id, deleted_at)| {
            ManifestRecord::Tombstone(Tombstone {
                id: ManifestId::from(id),
                deleted_at,
            })
        });
        prop_oneof![live, tombstone]
    }

    proptest! {
        #[test]
        fn prop_block_roundtrip(
            records in prop::collection::vec(arb_record(), 0..8),
            zstd in any::<bool>(),
        ) {
            let compression = if zstd {
                CompressionAlgorithm::Zstd
            } else {
                CompressionAlgorithm::None
            };
            let block = encode_block(&records, compression, 1).unwrap();
            prop_assert_eq!(decode_block(&block_id(), &block).unwrap(), records);
        }
    }
}
