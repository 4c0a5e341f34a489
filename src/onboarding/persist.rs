//! Session snapshots — save, load-with-expiry, clear.
//!
//! Loading never fails: expired, unverified and unreadable snapshots are
//! all treated as "nothing to resume". Unreadable and expired ones are
//! deleted on the way out.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::store::SnapshotStore;

use super::model::{FormRecord, storage_keys};
use super::steps::Step;

/// The persisted `{record, step, timestamp}` triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub attempt_id: Uuid,
    pub record: FormRecord,
    pub current_step: Step,
    pub timestamp: DateTime<Utc>,
}

/// Reads and writes the session snapshot through a [`SnapshotStore`].
#[derive(Clone)]
pub struct PersistenceStore {
    store: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    key: &'static str,
}

impl PersistenceStore {
    pub fn new(store: Arc<dyn SnapshotStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            key: storage_keys::SESSION_SNAPSHOT,
        }
    }

    /// Write a snapshot stamped with the current instant.
    pub async fn save(
        &self,
        attempt_id: Uuid,
        record: &FormRecord,
        step: Step,
    ) -> Result<(), StoreError> {
        let snapshot = Snapshot {
            attempt_id,
            record: record.clone(),
            current_step: step,
            timestamp: self.clock.now(),
        };
        let value = serde_json::to_string(&snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store.set(self.key, &value).await?;
        debug!(attempt_id = %attempt_id, step = %step, "Snapshot saved");
        Ok(())
    }

    /// Load the snapshot if it is worth resuming.
    pub async fn load(&self) -> Option<Snapshot> {
        let raw = match self.store.get(self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read session snapshot: {}", e);
                return None;
            }
        };

        let snapshot: Snapshot = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                warn!("Discarding unreadable session snapshot: {}", e);
                self.discard().await;
                return None;
            }
        };

        let age = self.clock.now() - snapshot.timestamp;
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        if age > ttl {
            info!(
                attempt_id = %snapshot.attempt_id,
                age_hours = age.num_hours(),
                "Discarding expired session snapshot"
            );
            self.discard().await;
            return None;
        }

        if !snapshot.record.is_email_verified {
            debug!(attempt_id = %snapshot.attempt_id, "Snapshot not resumable: email unverified");
            return None;
        }

        Some(snapshot)
    }

    /// Delete the stored snapshot.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let removed = self.store.delete(self.key).await?;
        if removed {
            info!("Session snapshot cleared");
        }
        Ok(())
    }

    async fn discard(&self) {
        if let Err(e) = self.store.delete(self.key).await {
            warn!("Failed to delete session snapshot: {}", e);
        }
    }
}
