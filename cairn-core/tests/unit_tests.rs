//! Unit tests for cairn-core

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;

use cairn_core::{
    config::{CompressionAlgorithm, Config, LogFormat, LogLevel},
    types::{labels, validate_labels, validate_prefix},
    ContentId, Error, Labels, ManifestEntry, ManifestId, ManifestRecord, Tombstone,
};

mod label_tests {
    use super::*;

    #[test]
    fn test_valid_labels() {
        assert!(validate_labels(&labels([("type", "snapshot"), ("host", "a")])).is_ok());
    }

    #[test]
    fn test_rejected_labels() {
        let cases: Vec<(Labels, &str)> = vec![
            (Labels::new(), "label set is empty"),
            (labels([("", "")]), "'type' label is required"),
            (labels([("type", "")]), "'type' label is required"),
            (labels([("host", "a")]), "'type' label is required"),
            (labels([("type", "t"), ("", "x")]), "label keys must be non-empty"),
        ];

        for (labels, expected) in cases {
            let err = validate_labels(&labels).unwrap_err();
            assert!(matches!(err, Error::InvalidLabels { .. }));
            assert!(err.to_string().contains(expected), "{:?}: {}", labels, err);
        }
    }

    #[test]
    fn test_entry_matches_superset_only() {
        let entry = ManifestEntry {
            id: ManifestId::generate(),
            labels: labels([("type", "item"), ("color", "red"), ("shape", "square")]),
            mod_time: Utc::now(),
            payload: json!(null),
        };

        assert!(entry.matches(&Labels::new()));
        assert!(entry.matches(&labels([("color", "red")])));
        assert!(entry.matches(&labels([("color", "red"), ("shape", "square")])));
        assert!(!entry.matches(&labels([("color", "blue")])));
        assert!(!entry.matches(&labels([("color", "red"), ("size", "xl")])));
    }
}

mod id_tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_hex_and_unique() {
        let a = ManifestId::generate();
        let b = ManifestId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_content_id_prefixes() {
        let prefixed = ContentId::parse("m0a1b2c").unwrap();
        assert_eq!(prefixed.prefix(), "m");
        assert!(prefixed.has_prefix("m"));

        let plain = ContentId::parse("0a1b2c").unwrap();
        assert_eq!(plain.prefix(), "");
        assert!(!plain.has_prefix("m"));

        assert!(ContentId::parse("").is_err());
        assert!(ContentId::parse("m").is_err());
        assert!(ContentId::parse("mzz").is_err());
    }

    #[test]
    fn test_prefix_validation() {
        assert!(validate_prefix("").is_ok());
        assert!(validate_prefix("m").is_ok());
        assert!(validate_prefix("z").is_ok());
        assert!(validate_prefix("f").is_err());
        assert!(validate_prefix("mm").is_err());
    }
}

mod record_tests {
    use super::*;

    fn at(secs: i64) -> cairn_core::Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_tombstone_supersedes_newer_entry() {
        let entry = ManifestRecord::Live(ManifestEntry {
            id: ManifestId::from("x"),
            labels: labels([("type", "t")]),
            mod_time: at(100),
            payload: json!(1),
        });
        let tombstone = ManifestRecord::Tombstone(Tombstone {
            id: ManifestId::from("x"),
            deleted_at: at(0),
        });

        assert!(tombstone.supersedes(&entry));
        assert!(!entry.supersedes(&tombstone));
    }

    #[test]
    fn test_record_json_shape() {
        let record = ManifestRecord::Tombstone(Tombstone {
            id: ManifestId::from("abc"),
            deleted_at: at(0),
        });
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["op"], "delete");
        assert_eq!(value["id"], "abc");
        assert_eq!(value["deleted_at"], "2024-06-01T00:00:00Z");
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.manifest.auto_compaction_threshold, 16);
        assert_eq!(config.manifest.compression, CompressionAlgorithm::Zstd);
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.store.sync_writes);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = Config::from_toml_str(
            r#"
            [manifest]
            auto_compaction_threshold = 4
            compression = "none"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.manifest.auto_compaction_threshold, 4);
        assert_eq!(config.manifest.compression, CompressionAlgorithm::None);
        assert_eq!(config.manifest.compression_level, 3);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cairn.toml");
        std::fs::write(&path, "[store]\nroot = \"/srv/cairn\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.store.root, std::path::PathBuf::from("/srv/cairn"));

        let err = Config::load(temp_dir.path().join("missing.toml")).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml_str("[manifest]\ncompression = \"lz4\"\n").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}

mod error_tests {
    use super::*;

    #[test]
    fn test_only_corruption_is_replayable() {
        let integrity = Error::Integrity {
            details: "invalid checksum".to_string(),
        };
        let replayed = integrity.replay().unwrap();
        assert_eq!(replayed.to_string(), integrity.to_string());
        assert!(!integrity.is_recoverable());

        let io: Error = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert!(io.replay().is_none());
        assert!(io.is_recoverable());
        assert_eq!(io.error_code(), "IO_ERROR");
    }

    #[test]
    fn test_not_found() {
        let err = Error::not_found(ManifestId::from("abc"));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "manifest not found: abc");
    }
}
