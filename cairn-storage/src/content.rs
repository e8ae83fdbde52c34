//! # Content Manager
//!
//! Reference `ContentStore` layered over a `BlobStorage`.
//!
//! ## Write Path
//!
//! ```text
//! write_content(data, prefix)
//!     │  id = prefix + hex(blake3(data))
//!     ▼
//! ┌──────────────┐   flush()   ┌────────────────────────────────┐
//! │   Overlay    │────────────>│ BlobStorage                    │
//! │ writes/dels  │             │ key = id, value = framed data  │
//! └──────────────┘             └────────────────────────────────┘
//! ```
//!
//! ## Frame Layout
//!
//! ```text
//! ┌──────────┬─────────┬─────────┬───────────┬──────────────┐
//! │ magic(8) │ ver u32 │ crc u32 │ len u64   │ data (len)   │
//! └──────────┴─────────┴─────────┴───────────┴──────────────┘
//! ```
//!
//! Until `flush()` the overlay is visible only through this instance; another
//! `ContentManager` over the same blobs sees the records after the flush.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use cairn_core::{
    crypto::{content_hash_hex, crc32_checksum, verify_crc32},
    error::{Error, Result},
    types::validate_prefix,
    ContentId, ContentInfo, ContentStore,
};

use crate::blob::BlobStorage;

pub const FRAME_MAGIC: &[u8; 8] = b"CAIRNBLB";
pub const FRAME_VERSION: u32 = 1;
pub const FRAME_HEADER_SIZE: usize = 24;

/// Unflushed writes and deletes
#[derive(Default)]
struct Overlay {
    writes: BTreeMap<ContentId, Bytes>,
    deletes: BTreeSet<ContentId>,
}

/// Content-addressed store with a flush-on-demand overlay
pub struct ContentManager {
    blobs: Arc<dyn BlobStorage>,
    overlay: Mutex<Overlay>,
}

impl ContentManager {
    pub fn new(blobs: Arc<dyn BlobStorage>) -> Self {
        Self {
            blobs,
            overlay: Mutex::new(Overlay::default()),
        }
    }

    /// Number of writes and deletes waiting for `flush()`
    pub fn pending_operations(&self) -> usize {
        let overlay = self.overlay.lock();
        overlay.writes.len() + overlay.deletes.len()
    }
}

/// Wrap `data` in a checksummed frame
pub fn encode_frame(data: &[u8]) -> Result<Bytes> {
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + data.len());
    buf.extend_from_slice(FRAME_MAGIC);
    buf.write_u32::<LittleEndian>(FRAME_VERSION)?;
    buf.write_u32::<LittleEndian>(crc32_checksum(data))?;
    buf.write_u64::<LittleEndian>(data.len() as u64)?;
    buf.extend_from_slice(data);
    Ok(Bytes::from(buf))
}

/// Unwrap a frame, failing `Integrity` on any mismatch
pub fn decode_frame(id: &ContentId, frame: &Bytes) -> Result<Bytes> {
    let corrupt = |what: &str| Error::Integrity {
        details: format!("invalid checksum for content {}: {}", id, what),
    };

    if frame.len() < FRAME_HEADER_SIZE {
        return Err(corrupt("frame truncated"));
    }
    if &frame[..8] != FRAME_MAGIC {
        return Err(corrupt("bad frame magic"));
    }

    let mut cursor = Cursor::new(&frame[8..FRAME_HEADER_SIZE]);
    let version = cursor.read_u32::<LittleEndian>()?;
    let checksum = cursor.read_u32::<LittleEndian>()?;
    let length = cursor.read_u64::<LittleEndian>()?;

    if version != FRAME_VERSION {
        return Err(corrupt(&format!("unsupported frame version {}", version)));
    }
    if length != (frame.len() - FRAME_HEADER_SIZE) as u64 {
        return Err(corrupt("length mismatch"));
    }

    let data = frame.slice(FRAME_HEADER_SIZE..);
    if !verify_crc32(&data, checksum) {
        return Err(corrupt("crc mismatch"));
    }

    Ok(data)
}

#[async_trait]
impl ContentStore for ContentManager {
    async fn write_content(&self, data: Bytes, prefix: &str) -> Result<ContentId> {
        validate_prefix(prefix)?;
        let id = ContentId::new(prefix, &content_hash_hex(&data));

        let mut overlay = self.overlay.lock();
        overlay.deletes.remove(&id);
        overlay.writes.insert(id.clone(), data);

        debug!("Staged content {}", id);
        Ok(id)
    }

    async fn read_content(&self, id: &ContentId) -> Result<Bytes> {
        {
            let overlay = self.overlay.lock();
            if overlay.deletes.contains(id) {
                return Err(Error::ContentNotFound { id: id.to_string() });
            }
            if let Some(data) = overlay.writes.get(id) {
                return Ok(data.clone());
            }
        }

        match self.blobs.get_blob(id.as_str()).await? {
            Some(frame) => decode_frame(id, &frame).map_err(|e| {
                warn!("Content {} failed verification: {}", id, e);
                e
            }),
            None => Err(Error::ContentNotFound { id: id.to_string() }),
        }
    }

    async fn list_contents(&self, prefix: &str) -> Result<Vec<ContentInfo>> {
        let stored = self.blobs.list_blobs(prefix).await?;

        let mut listing: BTreeMap<ContentId, u64> = BTreeMap::new();
        for blob in stored {
            match ContentId::parse(&blob.key) {
                Ok(id) if id.has_prefix(prefix) => {
                    let length = blob.length.saturating_sub(FRAME_HEADER_SIZE as u64);
                    listing.insert(id, length);
                }
                Ok(_) => {}
                Err(_) => debug!("Ignoring foreign blob {}", blob.key),
            }
        }

        let overlay = self.overlay.lock();
        for (id, data) in overlay.writes.iter().filter(|(id, _)| id.has_prefix(prefix)) {
            listing.insert(id.clone(), data.len() as u64);
        }
        for id in &overlay.deletes {
            listing.remove(id);
        }

        Ok(listing
            .into_iter()
            .map(|(id, length)| ContentInfo { id, length })
            .collect())
    }

    async fn delete_content(&self, id: &ContentId) -> Result<()> {
        let mut overlay = self.overlay.lock();
        overlay.writes.remove(id);
        overlay.deletes.insert(id.clone());
        debug!("Staged deletion of content {}", id);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let (writes, deletes) = {
            let overlay = self.overlay.lock();
            (overlay.writes.clone(), overlay.deletes.clone())
        };

        if writes.is_empty() && deletes.is_empty() {
            return Ok(());
        }

        for (id, data) in &writes {
            self.blobs.put_blob(id.as_str(), encode_frame(data)?).await?;
        }
        for id in &deletes {
            self.blobs.delete_blob(id.as_str()).await?;
        }

        // Drop only what was persisted; operations staged meanwhile stay pending
        let mut overlay = self.overlay.lock();
        for (id, data) in &writes {
            if overlay.writes.get(id) == Some(data) {
                overlay.writes.remove(id);
            }
        }
        for id in &deletes {
            if !overlay.writes.contains_key(id) {
                overlay.deletes.remove(id);
            }
        }

        info!(
            "Flushed content store: {} writes, {} deletes",
            writes.len(),
            deletes.len()
        );
        Ok(())
    }
}
