//! # Cairn Core
//!
//! This crate provides the fundamental building blocks for Cairn:
//! - Manifest data model (IDs, labels, entries, tombstones)
//! - Error types
//! - Configuration
//! - Integrity primitives (checksums, content hashing)
//! - Payload serialization
//! - The `ContentStore` interface the manifest manager is built on
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   cairn-core                    │
//! ├─────────────────────────────────────────────────┤
//! │  • types         - Manifest data model          │
//! │  • traits        - ContentStore, Clock          │
//! │  • error         - Error handling               │
//! │  • config        - Serde configuration          │
//! │  • crypto        - CRC32 & BLAKE3               │
//! │  • serialization - Canonical JSON payloads      │
//! │  • metrics       - Operation counters           │
//! │  • utils         - Common utilities             │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod metrics;
pub mod serialization;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{Error, Result};
pub use traits::{Clock, ContentStore, SystemClock};
pub use types::{
    ContentId, ContentInfo, EntryMetadata, Labels, ManifestEntry, ManifestId, ManifestRecord,
    Timestamp, Tombstone, TYPE_LABEL,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
