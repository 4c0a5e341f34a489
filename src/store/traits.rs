//! `SnapshotStore` trait — the durable key-value boundary the wizard
//! persists its session snapshot through.

use async_trait::async_trait;

use crate::error::StoreError;

/// Backend-agnostic key-value store for serialized session snapshots.
///
/// Values are stored as raw text so that unreadable data can still be
/// fetched and deleted by the caller.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or replace the value stored under `key`.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete `key`. Returns whether a value was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}
