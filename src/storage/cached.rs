use crate::storage::Storage;
use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Cached storage wrapper that keeps recently read blobs in memory
pub struct CachedStorage {
    /// Underlying storage implementation
    inner: Arc<dyn Storage>,
    /// Read cache keyed by namespace (Moka cache)
    read_cache: Cache<String, Option<String>>,
}

impl CachedStorage {
    pub fn new(inner: Arc<dyn Storage>, max_entries: u64, ttl_secs: u64) -> Self {
        let read_cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { inner, read_cache }
    }

    /// Drop a cached blob so the next read goes to the medium
    pub async fn invalidate(&self, key: &str) {
        self.read_cache.invalidate(key).await;
    }
}

#[async_trait]
impl Storage for CachedStorage {
    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn read(&self, key: &str) -> Result<Option<String>> {
        if let Some(cached) = self.read_cache.get(key).await {
            return Ok(cached);
        }

        let result = self.inner.read(key).await?;

        self.read_cache
            .insert(key.to_string(), result.clone())
            .await;

        Ok(result)
    }

    async fn write(&self, key: &str, payload: &str) -> Result<()> {
        if let Err(e) = self.inner.write(key, payload).await {
            // The medium may hold either version now
            self.invalidate(key).await;
            return Err(e);
        }

        self.read_cache
            .insert(key.to_string(), Some(payload.to_string()))
            .await;

        Ok(())
    }

    async fn write_if_unchanged(
        &self,
        key: &str,
        expected: Option<&str>,
        payload: &str,
    ) -> Result<bool> {
        match self.inner.write_if_unchanged(key, expected, payload).await {
            Ok(true) => {
                self.read_cache
                    .insert(key.to_string(), Some(payload.to_string()))
                    .await;
                Ok(true)
            }
            other => {
                // Our cached copy may be what went stale
                self.invalidate(key).await;
                other
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts reads that reach the inner medium
    struct CountingStorage {
        inner: MemoryStorage,
        reads: AtomicUsize,
        fail_writes: bool,
    }

    #[async_trait]
    impl Storage for CountingStorage {
        async fn init(&self) -> Result<()> {
            Ok(())
        }

        async fn read(&self, key: &str) -> Result<Option<String>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read(key).await
        }

        async fn write(&self, key: &str, payload: &str) -> Result<()> {
            if self.fail_writes {
                anyhow::bail!("disk full");
            }
            self.inner.write(key, payload).await
        }

        async fn write_if_unchanged(
            &self,
            key: &str,
            expected: Option<&str>,
            payload: &str,
        ) -> Result<bool> {
            if self.fail_writes {
                anyhow::bail!("disk full");
            }
            self.inner.write_if_unchanged(key, expected, payload).await
        }

        fn backend_name(&self) -> &'static str {
            "counting"
        }
    }

    fn counting(fail_writes: bool) -> Arc<CountingStorage> {
        Arc::new(CountingStorage {
            inner: MemoryStorage::new(),
            reads: AtomicUsize::new(0),
            fail_writes,
        })
    }

    #[tokio::test]
    async fn test_repeated_reads_hit_cache() {
        let inner = counting(false);
        inner.inner.write("ns", "payload").await.unwrap();
        let cached = CachedStorage::new(inner.clone(), 16, 300);

        assert_eq!(cached.read("ns").await.unwrap().as_deref(), Some("payload"));
        assert_eq!(cached.read("ns").await.unwrap().as_deref(), Some("payload"));
        assert_eq!(inner.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_write_refreshes_cache() {
        let inner = counting(false);
        let cached = CachedStorage::new(inner.clone(), 16, 300);

        assert_eq!(cached.read("ns").await.unwrap(), None);
        cached.write("ns", "new").await.unwrap();

        assert_eq!(cached.read("ns").await.unwrap().as_deref(), Some("new"));
        assert_eq!(inner.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_write_invalidates() {
        let inner = counting(true);
        inner.inner.write("ns", "old").await.unwrap();
        let cached = CachedStorage::new(inner.clone(), 16, 300);

        assert_eq!(cached.read("ns").await.unwrap().as_deref(), Some("old"));
        assert!(cached.write("ns", "new").await.is_err());

        assert_eq!(cached.read("ns").await.unwrap().as_deref(), Some("old"));
        assert_eq!(inner.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejected_conditional_write_drops_stale_entry() {
        let inner = counting(false);
        inner.inner.write("ns", "v1").await.unwrap();
        let cached = CachedStorage::new(inner.clone(), 16, 300);
        assert_eq!(cached.read("ns").await.unwrap().as_deref(), Some("v1"));

        // Another process replaces the blob behind the cache
        inner.inner.write("ns", "theirs").await.unwrap();
        assert_eq!(cached.read("ns").await.unwrap().as_deref(), Some("v1"));

        assert!(!cached.write_if_unchanged("ns", Some("v1"), "v2").await.unwrap());
        assert_eq!(cached.read("ns").await.unwrap().as_deref(), Some("theirs"));

        assert!(cached.write_if_unchanged("ns", Some("theirs"), "v2").await.unwrap());
        assert_eq!(cached.read("ns").await.unwrap().as_deref(), Some("v2"));
        assert_eq!(inner.reads.load(Ordering::SeqCst), 2);
    }
}
