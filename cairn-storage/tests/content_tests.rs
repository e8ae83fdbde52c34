//! # Content Store Tests
//!
//! Tests for:
//! - Content addressing and deduplication
//! - Overlay visibility before and after flush
//! - Checksum verification of stored frames

use std::sync::Arc;

use bytes::Bytes;
use tempfile::TempDir;

use cairn_core::{ContentId, ContentStore, Error};
use cairn_storage::blob::{BlobStorage, FileBlobStorage, MemoryBlobStorage};
use cairn_storage::content::{ContentManager, FRAME_HEADER_SIZE};

fn content_manager(blobs: &MemoryBlobStorage) -> ContentManager {
    ContentManager::new(Arc::new(blobs.clone()))
}

#[tokio::test]
async fn test_identical_data_dedups() {
    let blobs = MemoryBlobStorage::new();
    let store = content_manager(&blobs);

    let a = store.write_content(Bytes::from_static(b"same"), "m").await.unwrap();
    let b = store.write_content(Bytes::from_static(b"same"), "m").await.unwrap();
    let c = store.write_content(Bytes::from_static(b"same"), "").await.unwrap();

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.prefix(), "m");
    assert_eq!(c.prefix(), "");
    assert_eq!(&a.as_str()[1..], c.as_str());

    store.flush().await.unwrap();
    assert_eq!(blobs.len(), 2);
}

#[tokio::test]
async fn test_overlay_is_private_until_flush() {
    let blobs = MemoryBlobStorage::new();
    let writer = content_manager(&blobs);

    let id = writer
        .write_content(Bytes::from_static(b"record"), "m")
        .await
        .unwrap();
    assert_eq!(writer.pending_operations(), 1);
    assert_eq!(writer.list_contents("m").await.unwrap().len(), 1);

    let reader = content_manager(&blobs);
    assert!(reader.list_contents("m").await.unwrap().is_empty());
    assert!(matches!(
        reader.read_content(&id).await,
        Err(Error::ContentNotFound { .. })
    ));

    writer.flush().await.unwrap();
    assert_eq!(writer.pending_operations(), 0);

    let listed = reader.list_contents("m").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert_eq!(listed[0].length, 6);
    assert_eq!(
        reader.read_content(&id).await.unwrap(),
        Bytes::from_static(b"record")
    );
}

#[tokio::test]
async fn test_delete_hides_then_removes() {
    let blobs = MemoryBlobStorage::new();
    let store = content_manager(&blobs);

    let id = store.write_content(Bytes::from_static(b"x"), "m").await.unwrap();
    store.flush().await.unwrap();

    store.delete_content(&id).await.unwrap();
    assert!(store.list_contents("m").await.unwrap().is_empty());
    assert!(store.read_content(&id).await.is_err());
    assert_eq!(blobs.len(), 1);

    store.flush().await.unwrap();
    assert!(blobs.is_empty());
}

#[tokio::test]
async fn test_listing_filters_by_prefix() {
    let blobs = MemoryBlobStorage::new();
    let store = content_manager(&blobs);

    store.write_content(Bytes::from_static(b"1"), "m").await.unwrap();
    store.write_content(Bytes::from_static(b"2"), "m").await.unwrap();
    store.write_content(Bytes::from_static(b"3"), "k").await.unwrap();
    store.write_content(Bytes::from_static(b"4"), "").await.unwrap();
    store.flush().await.unwrap();

    let listed = store.list_contents("m").await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed[0].id < listed[1].id);
    assert_eq!(store.list_contents("k").await.unwrap().len(), 1);
    assert_eq!(store.list_contents("").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_prefixes_rejected() {
    let store = content_manager(&MemoryBlobStorage::new());

    for prefix in ["a", "mm", "M", "0"] {
        let err = store
            .write_content(Bytes::from_static(b"x"), prefix)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPrefix { .. }), "{}", prefix);
    }
}

#[tokio::test]
async fn test_corrupted_blob_fails_checksum() {
    let blobs = MemoryBlobStorage::new();
    let store = content_manager(&blobs);

    let id = store
        .write_content(Bytes::from_static(b"precious bytes"), "m")
        .await
        .unwrap();
    store.flush().await.unwrap();

    let mut raw = blobs.get_blob(id.as_str()).await.unwrap().unwrap().to_vec();
    raw[FRAME_HEADER_SIZE + 3] ^= 0x40;
    blobs.put_blob(id.as_str(), Bytes::from(raw)).await.unwrap();

    let err = store.read_content(&id).await.unwrap_err();
    assert!(err.is_integrity());
    assert!(err.to_string().contains("invalid checksum"), "{}", err);
}

#[tokio::test]
async fn test_missing_content() {
    let store = content_manager(&MemoryBlobStorage::new());
    let id = ContentId::parse("m0123abcd").unwrap();
    assert!(matches!(
        store.read_content(&id).await,
        Err(Error::ContentNotFound { .. })
    ));
}

#[tokio::test]
async fn test_file_backed_store_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();

    let id = {
        let blobs = FileBlobStorage::open(temp_dir.path(), true).await.unwrap();
        let store = ContentManager::new(Arc::new(blobs));
        let id = store
            .write_content(Bytes::from_static(b"on disk"), "m")
            .await
            .unwrap();
        store.flush().await.unwrap();
        id
    };

    let blobs = FileBlobStorage::open(temp_dir.path(), true).await.unwrap();
    let store = ContentManager::new(Arc::new(blobs));
    assert_eq!(
        store.read_content(&id).await.unwrap(),
        Bytes::from_static(b"on disk")
    );
}
