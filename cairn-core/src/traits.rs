//! # Core Traits
//!
//! Interfaces at the seams between the manifest manager and its collaborators.
//!
//! 1. **Async-First**: all store I/O is async
//! 2. **Error Propagation**: every operation returns `Result`
//! 3. **Testability**: the manager only sees `dyn ContentStore` and `dyn Clock`

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use crate::types::{ContentId, ContentInfo, Timestamp};
use crate::Result;

/// Content-addressed record storage
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `data` under `prefix`; identical data yields the same ID
    async fn write_content(&self, data: Bytes, prefix: &str) -> Result<ContentId>;

    /// Read a record, verifying its checksum
    async fn read_content(&self, id: &ContentId) -> Result<Bytes>;

    /// List the records whose ID starts with `prefix`, sorted by ID.
    ///
    /// The listing is a snapshot: calling it again restarts the iteration.
    async fn list_contents(&self, prefix: &str) -> Result<Vec<ContentInfo>>;

    /// Logically remove a record
    async fn delete_content(&self, id: &ContentId) -> Result<()>;

    /// Durability barrier for all preceding writes and deletes
    async fn flush(&self) -> Result<()>;
}

/// Source of modification and deletion timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}
