use crate::storage::Storage;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Process-local medium; contents vanish with the process
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.blobs.get(key).map(|entry| entry.value().clone()))
    }

    async fn write(&self, key: &str, payload: &str) -> Result<()> {
        self.blobs.insert(key.to_string(), payload.to_string());
        Ok(())
    }

    async fn write_if_unchanged(
        &self,
        key: &str,
        expected: Option<&str>,
        payload: &str,
    ) -> Result<bool> {
        // The entry guard holds the shard lock across compare and write
        match (self.blobs.entry(key.to_string()), expected) {
            (Entry::Occupied(mut entry), Some(expected)) if entry.get() == expected => {
                entry.insert(payload.to_string());
                Ok(true)
            }
            (Entry::Vacant(entry), None) => {
                entry.insert(payload.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
