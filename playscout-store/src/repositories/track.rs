use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{Track, TrackUpsert};

#[async_trait]
pub trait TrackRepository: Send + Sync {
    /// Finds the track matching `(provider, provider_track_id)`, updating its
    /// metadata in place, or inserts a new row. Returns the track id either way.
    async fn upsert_track(&self, fields: TrackUpsert) -> Result<i64>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Track>>;
}

pub struct SqliteTrackRepository {
    pool: SqlitePool,
}

impl SqliteTrackRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrackRepository for SqliteTrackRepository {
    async fn upsert_track(&self, fields: TrackUpsert) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM tracks WHERE provider = ? AND provider_track_id = ?",
        )
        .bind(&fields.provider)
        .bind(&fields.provider_track_id)
        .fetch_optional(&mut *tx)
        .await?;

        let track_id = if let Some((id,)) = existing {
            sqlx::query(
                "UPDATE tracks SET title = ?, artist = ?, album = ?, isrc = ?, \
                 artwork_url = ?, metadata = ?, updated_at = ? WHERE id = ?",
            )
            .bind(&fields.title)
            .bind(&fields.artist)
            .bind(&fields.album)
            .bind(&fields.isrc)
            .bind(&fields.artwork_url)
            .bind(&fields.metadata)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;
            id
        } else {
            let now = Utc::now();
            let result = sqlx::query(
                "INSERT INTO tracks \
                 (provider, provider_track_id, title, artist, album, isrc, artwork_url, \
                  metadata, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&fields.provider)
            .bind(&fields.provider_track_id)
            .bind(&fields.title)
            .bind(&fields.artist)
            .bind(&fields.album)
            .bind(&fields.isrc)
            .bind(&fields.artwork_url)
            .bind(&fields.metadata)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            result.last_insert_rowid()
        };

        tx.commit().await?;
        Ok(track_id)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Track>> {
        let row = sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    fn fields(provider_track_id: &str) -> TrackUpsert {
        TrackUpsert {
            provider: "shazam".to_string(),
            provider_track_id: provider_track_id.to_string(),
            title: "Song".to_string(),
            artist: "Artist".to_string(),
            album: None,
            isrc: None,
            artwork_url: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn upsert_inserts_then_updates_same_row() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteTrackRepository::new(pool);

        let id1 = repo.upsert_track(fields("abc")).await.unwrap();
        let mut updated = fields("abc");
        updated.title = "New Title".to_string();
        let id2 = repo.upsert_track(updated).await.unwrap();

        assert_eq!(id1, id2);
        let track = repo.find_by_id(id1).await.unwrap().unwrap();
        assert_eq!(track.title, "New Title");
    }
}
