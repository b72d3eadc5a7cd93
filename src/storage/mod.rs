pub mod cached;
pub mod file;
pub mod memory;
pub mod postgres;
pub mod record_store;
pub mod sqlite;
pub mod trait_def;

pub use cached::CachedStorage;
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use record_store::{PruneReport, RecordStore, DEFAULT_NAMESPACE, DEFAULT_STORAGE_TIMEOUT};
pub use sqlite::SqliteStorage;
pub use trait_def::{Storage, StorageError, StorageResult};

use crate::config::{CacheConfig, DatabaseBackend, DatabaseConfig};
use std::sync::Arc;
use tracing::info;

/// Open and initialize the configured medium, wrapped in a read cache if enabled
pub async fn open_storage(
    database: &DatabaseConfig,
    cache: &CacheConfig,
) -> anyhow::Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match database.backend {
        DatabaseBackend::Memory => {
            info!("Using in-memory storage (data is lost on exit)");
            Arc::new(MemoryStorage::new())
        }
        DatabaseBackend::File => {
            info!("Using file storage: {}", database.url);
            Arc::new(FileStorage::new(&database.url))
        }
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", database.url);
            Arc::new(SqliteStorage::new(&database.url, database.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage");
            Arc::new(PostgresStorage::new(&database.url, database.max_connections).await?)
        }
    };

    storage.init().await?;

    if cache.enabled && database.backend != DatabaseBackend::Memory {
        info!("Read cache enabled (ttl {}s)", cache.ttl_secs);
        return Ok(Arc::new(CachedStorage::new(storage, 64, cache.ttl_secs)));
    }

    Ok(storage)
}
