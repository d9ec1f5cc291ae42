use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{Result, StoreError};
use crate::models::Play;

#[async_trait]
pub trait PlayRepository: Send + Sync {
    /// Records a confirmed play. Returns [`StoreError::DuplicatePlay`] instead
    /// of propagating the underlying unique-constraint violation — callers
    /// (C7) are expected to swallow that variant, not retry or escalate it.
    async fn insert_play(
        &self,
        track_id: i64,
        stream_id: i64,
        recognized_at_utc: DateTime<Utc>,
        dedup_bucket: i64,
        confidence: Option<f64>,
    ) -> Result<i64>;

    async fn plays_by_date(
        &self,
        target_date: chrono::NaiveDate,
        stream_name: Option<&str>,
    ) -> Result<Vec<Play>>;
}

pub struct SqlitePlayRepository {
    pool: SqlitePool,
}

impl SqlitePlayRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlayRepository for SqlitePlayRepository {
    async fn insert_play(
        &self,
        track_id: i64,
        stream_id: i64,
        recognized_at_utc: DateTime<Utc>,
        dedup_bucket: i64,
        confidence: Option<f64>,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO plays (track_id, stream_id, recognized_at_utc, dedup_bucket, confidence) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(track_id)
        .bind(stream_id)
        .bind(recognized_at_utc)
        .bind(dedup_bucket)
        .bind(confidence)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::DuplicatePlay {
                    track_id,
                    stream_id,
                    dedup_bucket,
                }
            } else {
                StoreError::Database(err)
            }
        })?;
        Ok(result.last_insert_rowid())
    }

    async fn plays_by_date(
        &self,
        target_date: chrono::NaiveDate,
        stream_name: Option<&str>,
    ) -> Result<Vec<Play>> {
        let start = target_date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let end = start + chrono::Duration::days(1);

        let rows = match stream_name {
            Some(name) => {
                sqlx::query_as::<_, Play>(
                    "SELECT p.* FROM plays p \
                     JOIN streams s ON s.id = p.stream_id \
                     WHERE s.name = ? AND p.recognized_at_utc >= ? AND p.recognized_at_utc < ? \
                     ORDER BY p.recognized_at_utc DESC",
                )
                .bind(name)
                .bind(start)
                .bind(end)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Play>(
                    "SELECT * FROM plays \
                     WHERE recognized_at_utc >= ? AND recognized_at_utc < ? \
                     ORDER BY recognized_at_utc DESC",
                )
                .bind(start)
                .bind(end)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("2067") || db_err.code().as_deref() == Some("1555")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::stream::{SqliteStreamRepository, StreamRepository};
    use crate::repositories::track::{SqliteTrackRepository, TrackRepository};
    use crate::{db::create_test_pool, models::TrackUpsert};

    async fn seed(pool: &SqlitePool) -> (i64, i64) {
        let stream_id = SqliteStreamRepository::new(pool.clone())
            .ensure_stream("lobby", "rtsp://lobby")
            .await
            .unwrap();
        let track_id = SqliteTrackRepository::new(pool.clone())
            .upsert_track(TrackUpsert {
                provider: "shazam".to_string(),
                provider_track_id: "t1".to_string(),
                title: "Song".to_string(),
                artist: "Artist".to_string(),
                album: None,
                isrc: None,
                artwork_url: None,
                metadata: None,
            })
            .await
            .unwrap();
        (track_id, stream_id)
    }

    #[tokio::test]
    async fn duplicate_play_is_reported_as_typed_error() {
        let pool = create_test_pool().await.unwrap();
        let (track_id, stream_id) = seed(&pool).await;
        let repo = SqlitePlayRepository::new(pool);

        let now = Utc::now();
        repo.insert_play(track_id, stream_id, now, 42, Some(0.9))
            .await
            .unwrap();

        let err = repo
            .insert_play(track_id, stream_id, now, 42, Some(0.9))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicatePlay { .. }));
    }
}
