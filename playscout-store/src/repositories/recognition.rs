use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::Recognition;

/// Fields needed to log one attempted recognition, success or failure alike.
#[derive(Debug, Clone)]
pub struct RecognitionRecord {
    pub stream_id: i64,
    pub provider: String,
    pub recognized_at_utc: DateTime<Utc>,
    pub window_start_utc: DateTime<Utc>,
    pub window_end_utc: DateTime<Utc>,
    pub track_id: Option<i64>,
    pub confidence: Option<f64>,
    pub latency_ms: Option<i64>,
    pub raw_response: Option<String>,
    pub error_message: Option<String>,
}

#[async_trait]
pub trait RecognitionRepository: Send + Sync {
    /// Appends a diagnostics row for one recognizer call against one window.
    /// Always uses the window's real `[start, end)` bounds, never a
    /// synthetic point-in-time stand-in.
    async fn append_recognition(&self, record: RecognitionRecord) -> Result<i64>;

    async fn recent(&self, limit: i64, stream_name: Option<&str>) -> Result<Vec<Recognition>>;
}

pub struct SqliteRecognitionRepository {
    pool: SqlitePool,
}

impl SqliteRecognitionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecognitionRepository for SqliteRecognitionRepository {
    async fn append_recognition(&self, record: RecognitionRecord) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO recognitions \
             (stream_id, provider, recognized_at_utc, window_start_utc, window_end_utc, \
              track_id, confidence, latency_ms, raw_response, error_message) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.stream_id)
        .bind(&record.provider)
        .bind(record.recognized_at_utc)
        .bind(record.window_start_utc)
        .bind(record.window_end_utc)
        .bind(record.track_id)
        .bind(record.confidence)
        .bind(record.latency_ms)
        .bind(&record.raw_response)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn recent(&self, limit: i64, stream_name: Option<&str>) -> Result<Vec<Recognition>> {
        let rows = match stream_name {
            Some(name) => {
                sqlx::query_as::<_, Recognition>(
                    "SELECT r.* FROM recognitions r \
                     JOIN streams s ON s.id = r.stream_id \
                     WHERE s.name = ? \
                     ORDER BY r.recognized_at_utc DESC LIMIT ?",
                )
                .bind(name)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Recognition>(
                    "SELECT * FROM recognitions ORDER BY recognized_at_utc DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::repositories::stream::{SqliteStreamRepository, StreamRepository};

    #[tokio::test]
    async fn append_then_read_back() {
        let pool = create_test_pool().await.unwrap();
        let stream_id = SqliteStreamRepository::new(pool.clone())
            .ensure_stream("lobby", "rtsp://lobby")
            .await
            .unwrap();

        let repo = SqliteRecognitionRepository::new(pool);
        let now = Utc::now();
        repo.append_recognition(RecognitionRecord {
            stream_id,
            provider: "shazam".to_string(),
            recognized_at_utc: now,
            window_start_utc: now - chrono::Duration::seconds(12),
            window_end_utc: now,
            track_id: None,
            confidence: None,
            latency_ms: Some(120),
            raw_response: None,
            error_message: None,
        })
        .await
        .unwrap();

        let rows = repo.recent(10, Some("lobby")).await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
