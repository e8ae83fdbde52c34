//! # Cairn Storage
//!
//! Manifest manager and the reference content store it runs on.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Manifest Manager                       │
//! │   put / get / find / delete ──> pending ──flush──> block    │
//! └──────────────────────────────┬──────────────────────────────┘
//!                                │ dyn ContentStore
//! ┌──────────────────────────────▼──────────────────────────────┐
//! │                      ContentManager                         │
//! │   content-addressed, checksummed frames, overlay until flush│
//! └──────────────────────────────┬──────────────────────────────┘
//!                                │ dyn BlobStorage
//! ┌──────────────────────────────▼──────────────────────────────┐
//! │          MemoryBlobStorage        FileBlobStorage           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod blob;
pub mod content;
pub mod manifest;

pub use blob::{BlobMetadata, BlobStorage, FileBlobStorage, MemoryBlobStorage};
pub use content::ContentManager;
pub use manifest::{CompactionResult, Manager, ManagerOptions, MANIFEST_PREFIX};
