use crate::storage::Storage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to open SQLite database at {}", database_url))?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blobs (
                namespace TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<String>> {
        let payload = sqlx::query_scalar::<_, String>(
            r#"
            SELECT payload
            FROM blobs
            WHERE namespace = ?
            "#,
        )
        .bind(key)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(payload)
    }

    async fn write(&self, key: &str, payload: &str) -> Result<()> {
        let updated_at = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO blobs (namespace, payload, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(namespace) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(payload)
        .bind(updated_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn write_if_unchanged(
        &self,
        key: &str,
        expected: Option<&str>,
        payload: &str,
    ) -> Result<bool> {
        let updated_at = chrono::Utc::now().timestamp();

        let result = match expected {
            Some(expected) => {
                sqlx::query(
                    r#"
                    UPDATE blobs
                    SET payload = ?, updated_at = ?
                    WHERE namespace = ? AND payload = ?
                    "#,
                )
                .bind(payload)
                .bind(updated_at)
                .bind(key)
                .bind(expected)
                .execute(self.pool.as_ref())
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO blobs (namespace, payload, updated_at)
                    VALUES (?, ?, ?)
                    ON CONFLICT(namespace) DO NOTHING
                    "#,
                )
                .bind(key)
                .bind(payload)
                .bind(updated_at)
                .execute(self.pool.as_ref())
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
