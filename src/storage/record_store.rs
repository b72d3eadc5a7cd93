//! Durable store of URL records and click events
//!
//! The whole store lives in one JSON blob (`{urls, clicks}`) under a fixed
//! namespace key of a [`Storage`] medium. Every read loads the full
//! snapshot; every mutation rewrites it.
//!
//! Mutations run `load -> mutate -> save` under a single async mutex owned
//! by the handle, so callers sharing one `RecordStore` never lose updates.
//! The save is conditional on the blob still being the one that was read,
//! so writers in other processes (or behind a stale read cache) cause a
//! retry instead of a silent overwrite.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::models::{ClickEvent, StoreSnapshot, UrlRecord};
use crate::storage::{MemoryStorage, Storage, StorageError, StorageResult};

/// Namespace key of the record blob
pub const DEFAULT_NAMESPACE: &str = "url_shortener_data_v1";

/// Upper bound for a single medium call
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(3);

/// Read-modify-write rounds before a mutation gives up on a busy blob
pub const MAX_MUTATION_ATTEMPTS: usize = 5;

/// Outcome of [`RecordStore::prune_expired`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub removed_clicks: usize,
    pub retained_clicks: usize,
    pub active_codes: usize,
}

pub struct RecordStore {
    storage: Arc<dyn Storage>,
    namespace: String,
    timeout: Duration,
    write_lock: Mutex<()>,
}

impl RecordStore {
    pub fn new(storage: Arc<dyn Storage>, namespace: impl Into<String>, timeout: Duration) -> Self {
        Self {
            storage,
            namespace: namespace.into(),
            timeout,
            write_lock: Mutex::new(()),
        }
    }

    /// Isolated store backed by a fresh [`MemoryStorage`]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStorage::new()),
            DEFAULT_NAMESPACE,
            DEFAULT_STORAGE_TIMEOUT,
        )
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Current snapshot. An unreadable or corrupted medium yields an empty store.
    pub async fn load(&self) -> StoreSnapshot {
        let decoded = match self.read_payload().await {
            Ok(payload) => self.decode(payload.as_deref()),
            Err(err) => Err(err),
        };

        decoded.unwrap_or_else(|err| {
            error!(
                namespace = %self.namespace,
                backend = self.storage.backend_name(),
                error = %err,
                "storage load failed, using empty store"
            );
            StoreSnapshot::default()
        })
    }

    /// Replace the stored snapshot wholly.
    ///
    /// Failures are logged here; callers may drop the returned error.
    pub async fn save(&self, snapshot: &StoreSnapshot) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let result = match self.encode(snapshot) {
            Ok(payload) => self
                .bounded(self.storage.write(&self.namespace, &payload))
                .await
                .map_err(StorageError::Write),
            Err(err) => Err(err),
        };
        result.inspect_err(|err| self.log_save_failure(err))
    }

    pub async fn get_all(&self) -> Vec<UrlRecord> {
        self.load().await.urls
    }

    pub async fn get_by_code(&self, code: &str) -> Option<UrlRecord> {
        self.load()
            .await
            .urls
            .into_iter()
            .find(|url| url.code == code)
    }

    /// True if any record, active or expired, owns `code`
    pub async fn is_code_taken(&self, code: &str) -> bool {
        self.load().await.contains_code(code)
    }

    pub async fn get_clicks_by_code(&self, code: &str) -> Vec<ClickEvent> {
        self.load()
            .await
            .clicks
            .into_iter()
            .filter(|click| click.code == code)
            .collect()
    }

    /// Append new records as one batch.
    ///
    /// Fails with [`StorageError::Conflict`] without writing anything when a
    /// code is already stored or appears twice in `records`.
    pub async fn insert_records(&self, records: Vec<UrlRecord>) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        self.mutate(|snapshot| {
            let mut batch_codes = HashSet::with_capacity(records.len());
            for record in &records {
                if snapshot.contains_code(&record.code) || !batch_codes.insert(record.code.as_str())
                {
                    return Err(StorageError::Conflict(record.code.clone()));
                }
            }
            snapshot.urls.extend(records.iter().cloned());
            Ok(())
        })
        .await
    }

    /// Append one click event. The code is not checked against stored records.
    pub async fn append_click(&self, event: ClickEvent) -> StorageResult<()> {
        self.mutate(|snapshot| {
            snapshot.clicks.push(event.clone());
            Ok(())
        })
        .await
    }

    /// Drop click events whose code has no active record at `now`.
    ///
    /// URL records are left untouched so expired codes are never reissued.
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> StorageResult<PruneReport> {
        self.mutate(|snapshot| {
            let active: HashSet<String> = snapshot
                .urls
                .iter()
                .filter(|url| url.is_active_at(now))
                .map(|url| url.code.clone())
                .collect();

            let before = snapshot.clicks.len();
            snapshot.clicks.retain(|click| active.contains(&click.code));

            Ok(PruneReport {
                removed_clicks: before - snapshot.clicks.len(),
                retained_clicks: snapshot.clicks.len(),
                active_codes: active.len(),
            })
        })
        .await
    }

    /// Critical section for every write.
    ///
    /// A medium that cannot be read, or a blob that holds data this store
    /// cannot decode, aborts the mutation instead of overwriting the blob.
    /// A blob that is not JSON at all is replaced. `apply` runs again on a
    /// fresh snapshot whenever the blob changed before the save landed.
    async fn mutate<T, F>(&self, mut apply: F) -> StorageResult<T>
    where
        F: FnMut(&mut StoreSnapshot) -> StorageResult<T>,
    {
        let _guard = self.write_lock.lock().await;

        for attempt in 1..=MAX_MUTATION_ATTEMPTS {
            let payload = self.read_payload().await.inspect_err(|err| {
                error!(
                    namespace = %self.namespace,
                    error = %err,
                    "storage unavailable, mutation skipped"
                );
            })?;
            let mut snapshot = self.decode(payload.as_deref()).inspect_err(|err| {
                error!(
                    namespace = %self.namespace,
                    error = %err,
                    "stored data unreadable, mutation skipped"
                );
            })?;

            let value = apply(&mut snapshot)?;
            let encoded = self.encode(&snapshot)?;

            let saved = self
                .bounded(self.storage.write_if_unchanged(
                    &self.namespace,
                    payload.as_deref(),
                    &encoded,
                ))
                .await
                .map_err(StorageError::Write)
                .inspect_err(|err| self.log_save_failure(err))?;

            if saved {
                return Ok(value);
            }
            debug!(
                namespace = %self.namespace,
                attempt,
                "stored data changed underneath, retrying"
            );
        }

        let err = StorageError::Contended {
            attempts: MAX_MUTATION_ATTEMPTS,
        };
        self.log_save_failure(&err);
        Err(err)
    }

    async fn read_payload(&self) -> StorageResult<Option<String>> {
        self.bounded(self.storage.read(&self.namespace))
            .await
            .map_err(StorageError::Read)
    }

    fn decode(&self, payload: Option<&str>) -> StorageResult<StoreSnapshot> {
        let Some(payload) = payload else {
            debug!(namespace = %self.namespace, "no stored data yet");
            return Ok(StoreSnapshot::default());
        };

        let err = match serde_json::from_str(payload) {
            Ok(snapshot) => return Ok(snapshot),
            Err(err) => err,
        };

        // Structured data we cannot read must survive for whoever can
        if serde_json::from_str::<serde_json::Value>(payload).is_ok_and(|value| value.is_object()) {
            return Err(StorageError::Undecodable(err.into()));
        }

        error!(
            namespace = %self.namespace,
            error = %err,
            "stored data is corrupted, using empty store"
        );
        Ok(StoreSnapshot::default())
    }

    fn encode(&self, snapshot: &StoreSnapshot) -> StorageResult<String> {
        serde_json::to_string(snapshot).map_err(|err| StorageError::Write(err.into()))
    }

    fn log_save_failure(&self, err: &StorageError) {
        warn!(
            namespace = %self.namespace,
            backend = self.storage.backend_name(),
            error = %err,
            "storage save failed"
        );
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("storage call timed out after {:?}", self.timeout)),
        }
    }
}
