use crate::storage::Storage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blobs (
                namespace TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at BIGINT NOT NULL
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
            WHERE namespace = $1
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
            VALUES ($1, $2, $3)
            ON CONFLICT (namespace) DO UPDATE SET
                payload = EXCLUDED.payload,
                updated_at = EXCLUDED.updated_at
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
                    SET payload = $1, updated_at = $2
                    WHERE namespace = $3 AND payload = $4
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
                    VALUES ($1, $2, $3)
                    ON CONFLICT (namespace) DO NOTHING
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
        "postgres"
    }
}
