use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("short code already exists: {0}")]
    Conflict(String),
    #[error("failed to read store: {0:#}")]
    Read(anyhow::Error),
    #[error("stored data cannot be decoded, refusing to overwrite it: {0:#}")]
    Undecodable(anyhow::Error),
    #[error("failed to write store: {0:#}")]
    Write(anyhow::Error),
    #[error("store kept changing underneath, gave up after {attempts} attempts")]
    Contended { attempts: usize },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Durable keyed blob medium.
///
/// Each key holds one opaque payload that is replaced wholly on every write.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables, directories, etc.)
    async fn init(&self) -> Result<()>;

    /// Read the payload stored under `key`, if any
    async fn read(&self, key: &str) -> Result<Option<String>>;

    /// Replace the payload stored under `key`
    async fn write(&self, key: &str, payload: &str) -> Result<()>;

    /// Replace the payload only while it still equals `expected`
    /// (`None` meaning the key is absent).
    ///
    /// Returns `false` and writes nothing when another writer changed the
    /// key since it was read. The comparison and the write are atomic with
    /// respect to other writers of the same medium.
    async fn write_if_unchanged(
        &self,
        key: &str,
        expected: Option<&str>,
        payload: &str,
    ) -> Result<bool>;

    /// Short name used in logs
    fn backend_name(&self) -> &'static str;
}
