//! # Manifest Storage
//!
//! Labeled JSON manifests persisted as batched, content-addressed blocks.
//!
//! ## Module Structure
//!
//! - `codec.rs` - Block wire format
//! - `index.rs` - Committed index, pending buffer and their merged view
//! - `compaction.rs` - Pure consolidation planning
//! - `manager.rs` - The public `Manager`

mod codec;
mod compaction;
mod index;
mod manager;

pub use codec::{
    decode_block, encode_block, BlockCompression, BLOCK_FORMAT_VERSION, MANIFEST_PREFIX,
};
pub use compaction::{plan_compaction, CompactionPlan, CompactionResult};
pub use index::{ManifestIndex, MergedView, PendingBuffer};
pub use manager::{Manager, ManagerOptions};
