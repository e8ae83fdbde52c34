//! # Manifest Manager
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Manifest Manager                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  Write Path:                                                │
//! │  ┌─────────┐    ┌─────────┐  flush  ┌──────────────────┐    │
//! │  │   Put   │───>│ Pending │────────>│ block "m<hash>"  │    │
//! │  │ Delete  │    │ Buffer  │         │ in ContentStore  │    │
//! │  └─────────┘    └─────────┘         └──────────────────┘    │
//! │                                                             │
//! │  Read Path (lazy, first read loads every block):            │
//! │  ┌─────────┐    ┌─────────┐    ┌───────────┐                │
//! │  │  Query  │───>│ Pending │───>│ Committed │                │
//! │  └─────────┘    └─────────┘    │   Index   │                │
//! │                                └───────────┘                │
//! │                                                             │
//! │  Init State:                                                │
//! │  Uninitialized ──load ok──> Ready                           │
//! │        │                                                    │
//! │        └──corrupt block──> Failed(err)  (sticky)            │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! One async mutex guards the pending buffer, the committed index and the init
//! state. It stays held across content store calls, so concurrent first readers
//! wait for a single load and all observe its outcome.

use std::sync::Arc;

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use cairn_core::{
    config::{CompressionAlgorithm, ManifestConfig},
    error::{Error, Result},
    metrics::{ManifestMetrics, Timer},
    serialization::{from_payload, to_payload},
    types::validate_labels,
    Clock, ContentId, ContentStore, EntryMetadata, Labels, ManifestEntry, ManifestId,
    ManifestRecord, SystemClock, Tombstone,
};

use super::codec::{decode_block, encode_block, MANIFEST_PREFIX};
use super::compaction::{plan_compaction, CompactionResult};
use super::index::{ManifestIndex, MergedView, PendingBuffer};

type LoadedBlocks = Vec<(ContentId, Vec<ManifestRecord>)>;

/// Manager options
#[derive(Clone)]
pub struct ManagerOptions {
    /// Compact on load when more blocks than this exist (0 = never)
    pub auto_compaction_threshold: usize,
    pub compression: CompressionAlgorithm,
    pub compression_level: i32,
    pub clock: Arc<dyn Clock>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self::from_config(&ManifestConfig::default())
    }
}

impl ManagerOptions {
    pub fn from_config(config: &ManifestConfig) -> Self {
        Self {
            auto_compaction_threshold: config.auto_compaction_threshold,
            compression: config.compression,
            compression_level: config.compression_level,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

enum InitState {
    Uninitialized,
    Ready,
    /// Holds a replayable corruption error
    Failed(Error),
}

struct ManagerState {
    init: InitState,
    committed: ManifestIndex,
    pending: PendingBuffer,
}

/// Labeled manifest store over a content store
pub struct Manager {
    store: Arc<dyn ContentStore>,
    options: ManagerOptions,
    state: Mutex<ManagerState>,
    metrics: ManifestMetrics,
}

impl Manager {
    pub fn new(store: Arc<dyn ContentStore>, options: ManagerOptions) -> Self {
        Self {
            store,
            options,
            state: Mutex::new(ManagerState {
                init: InitState::Uninitialized,
                committed: ManifestIndex::new(),
                pending: PendingBuffer::new(),
            }),
            metrics: ManifestMetrics::new(),
        }
    }

    pub fn metrics(&self) -> ManifestMetrics {
        self.metrics.clone()
    }

    /// Number of uncommitted operations
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Stage a new manifest and return its freshly allocated ID
    pub async fn put<T>(&self, labels: Labels, payload: &T) -> Result<ManifestId>
    where
        T: Serialize + ?Sized,
    {
        validate_labels(&labels)?;
        let payload = to_payload(payload)?;

        let mut state = self.state.lock().await;
        let id = {
            let view = MergedView::new(&state.committed, &state.pending);
            let mut id = ManifestId::generate();
            while view.knows(&id) {
                id = ManifestId::generate();
            }
            id
        };

        state.pending.push(ManifestRecord::Live(ManifestEntry {
            id: id.clone(),
            labels,
            mod_time: self.options.clock.now(),
            payload,
        }));
        self.metrics.record_put();

        debug!("Put manifest {}", id);
        Ok(id)
    }

    /// Fetch a manifest payload decoded into `T`
    pub async fn get<T: DeserializeOwned>(&self, id: &ManifestId) -> Result<(T, EntryMetadata)> {
        let (payload, metadata) = self.get_raw(id).await?;
        Ok((from_payload(&payload)?, metadata))
    }

    /// Fetch a manifest payload as raw JSON
    pub async fn get_raw(&self, id: &ManifestId) -> Result<(serde_json::Value, EntryMetadata)> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        self.metrics.record_get();

        let view = MergedView::new(&state.committed, &state.pending);
        let entry = view.live(id).ok_or_else(|| Error::not_found(id))?;
        Ok((entry.payload.clone(), entry.metadata()))
    }

    pub async fn get_metadata(&self, id: &ManifestId) -> Result<EntryMetadata> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        self.metrics.record_get();

        let view = MergedView::new(&state.committed, &state.pending);
        view.live(id)
            .map(ManifestEntry::metadata)
            .ok_or_else(|| Error::not_found(id))
    }

    /// Live manifests carrying every label in `criteria`, sorted by ID
    pub async fn find(&self, criteria: &Labels) -> Result<Vec<EntryMetadata>> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        self.metrics.record_find();

        let view = MergedView::new(&state.committed, &state.pending);
        Ok(view
            .find(criteria)
            .into_iter()
            .map(ManifestEntry::metadata)
            .collect())
    }

    /// Delete a manifest; unknown or already deleted IDs are ignored
    pub async fn delete(&self, id: &ManifestId) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        self.metrics.record_delete();

        let view = MergedView::new(&state.committed, &state.pending);
        if view.live(id).is_none() {
            debug!("Delete of unknown manifest {} ignored", id);
            return Ok(());
        }

        if !state.committed.contains(id) {
            // Never written, nothing durable to shadow
            state.pending.remove(id);
        } else {
            state.pending.push(ManifestRecord::Tombstone(Tombstone {
                id: id.clone(),
                deleted_at: self.options.clock.now(),
            }));
        }

        debug!("Deleted manifest {}", id);
        Ok(())
    }

    /// Write all pending operations as one block; returns the record count.
    ///
    /// Does not call the content store's own `flush()`.
    pub async fn flush(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        if state.pending.is_empty() {
            return Ok(0);
        }

        let records = state.pending.records();
        let block = encode_block(
            &records,
            self.options.compression,
            self.options.compression_level,
        )?;
        let block_len = block.len() as u64;
        let content_id = self
            .store
            .write_content(Bytes::from(block), MANIFEST_PREFIX)
            .await?;

        let count = records.len();
        if matches!(state.init, InitState::Ready) {
            for record in records {
                state.committed.apply(record);
            }
        }
        state.pending.clear();
        self.metrics.record_flush(block_len);

        info!("Flushed {} manifest records to block {}", count, content_id);
        Ok(count)
    }

    /// Rewrite every committed block, plus pending operations, into one block
    pub async fn compact(&self) -> Result<CompactionResult> {
        let mut state = self.state.lock().await;
        if let InitState::Failed(err) = &state.init {
            return Err(replay(err));
        }

        let blocks = self.load_or_fail(&mut state).await?;
        self.compact_blocks(&mut state, blocks).await
    }

    async fn ensure_loaded(&self, state: &mut ManagerState) -> Result<()> {
        match &state.init {
            InitState::Ready => return Ok(()),
            InitState::Failed(err) => return Err(replay(err)),
            InitState::Uninitialized => {}
        }

        let blocks = self.load_or_fail(state).await?;
        let block_count = blocks.len();

        state.committed = ManifestIndex::from_records(
            blocks.iter().flat_map(|(_, records)| records.iter().cloned()),
        );
        state.init = InitState::Ready;
        debug!(
            "Loaded {} manifest blocks, {} manifests ({} live)",
            block_count,
            state.committed.len(),
            state.committed.live_count()
        );

        let threshold = self.options.auto_compaction_threshold;
        if threshold > 0 && block_count > threshold {
            info!(
                "Auto-compacting {} manifest blocks (threshold {})",
                block_count, threshold
            );
            if let Err(e) = self.compact_blocks(state, blocks).await {
                warn!("Auto-compaction failed: {}", e);
            }
        }

        Ok(())
    }

    /// Load every block; corruption moves the instance into `Failed`
    async fn load_or_fail(&self, state: &mut ManagerState) -> Result<LoadedBlocks> {
        match self.load_blocks().await {
            Ok(blocks) => {
                self.metrics.record_blocks_loaded(blocks.len() as u64);
                Ok(blocks)
            }
            Err(e) => {
                if e.replay().is_some() {
                    warn!("Manifest load failed permanently: {}", e);
                    self.metrics.record_integrity_failure();
                    let sticky = replay(&e);
                    state.init = InitState::Failed(e);
                    Err(sticky)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Read and decode every block before any of it is applied
    async fn load_blocks(&self) -> Result<LoadedBlocks> {
        let listing = self.store.list_contents(MANIFEST_PREFIX).await?;
        let mut blocks = Vec::with_capacity(listing.len());
        for info in listing {
            let data = self.store.read_content(&info.id).await?;
            let records = decode_block(&info.id, &data)?;
            blocks.push((info.id, records));
        }
        Ok(blocks)
    }

    async fn compact_blocks(
        &self,
        state: &mut ManagerState,
        blocks: LoadedBlocks,
    ) -> Result<CompactionResult> {
        let timer = Timer::new("manifest_compaction");
        let blocks_compacted = blocks.len();
        let plan = plan_compaction(blocks, state.pending.records());

        let new_block = if plan.records.is_empty() {
            None
        } else {
            let block = encode_block(
                &plan.records,
                self.options.compression,
                self.options.compression_level,
            )?;
            let block_len = block.len() as u64;
            let id = self
                .store
                .write_content(Bytes::from(block), MANIFEST_PREFIX)
                .await?;
            self.metrics.record_block_written(block_len);
            Some(id)
        };

        // The consolidated block is written before anything is retired
        let mut blocks_deleted = 0;
        for old in &plan.retired {
            if new_block.as_ref() == Some(old) {
                continue;
            }
            self.store.delete_content(old).await?;
            blocks_deleted += 1;
        }

        state.committed = ManifestIndex::from_records(plan.records);
        state.pending.clear();
        state.init = InitState::Ready;

        let duration = timer.stop();
        self.metrics.record_compaction(blocks_deleted as u64);

        let result = CompactionResult {
            blocks_compacted,
            blocks_deleted,
            new_block,
            entries_kept: plan.entries_kept,
            entries_dropped: plan.entries_dropped,
            tombstones_kept: plan.tombstones_kept,
            duration_ms: duration.as_millis() as u64,
        };
        info!(
            "Compacted {} manifest blocks: {} entries kept, {} dropped, {} tombstones kept",
            result.blocks_compacted,
            result.entries_kept,
            result.entries_dropped,
            result.tombstones_kept
        );
        Ok(result)
    }
}

fn replay(err: &Error) -> Error {
    err.replay().unwrap_or_else(|| Error::Internal {
        message: err.to_string(),
    })
}
