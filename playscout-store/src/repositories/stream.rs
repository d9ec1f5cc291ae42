use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::Stream;

#[async_trait]
pub trait StreamRepository: Send + Sync {
    /// Looks up a stream row by name, creating a placeholder row if one
    /// doesn't exist yet, and returns its id. Streams are normally seeded
    /// from configuration at startup; this covers the case where a
    /// recognition needs a stream id before that seeding has run.
    async fn ensure_stream(&self, name: &str, url: &str) -> Result<i64>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Stream>>;
}

pub struct SqliteStreamRepository {
    pool: SqlitePool,
}

impl SqliteStreamRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StreamRepository for SqliteStreamRepository {
    async fn ensure_stream(&self, name: &str, url: &str) -> Result<i64> {
        if let Some((id,)) = sqlx::query_as::<_, (i64,)>("SELECT id FROM streams WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
        {
            return Ok(id);
        }

        let result = sqlx::query("INSERT INTO streams (name, url, enabled) VALUES (?, ?, 1)")
            .bind(name)
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Stream>> {
        let row = sqlx::query_as::<_, Stream>("SELECT * FROM streams WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn ensure_stream_is_idempotent() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteStreamRepository::new(pool);

        let id1 = repo.ensure_stream("lobby", "rtsp://lobby").await.unwrap();
        let id2 = repo.ensure_stream("lobby", "rtsp://lobby").await.unwrap();
        assert_eq!(id1, id2);
    }
}
