use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("duplicate play: track {track_id} already recorded for stream {stream_id} in dedup bucket {dedup_bucket}")]
    DuplicatePlay {
        track_id: i64,
        stream_id: i64,
        dedup_bucket: i64,
    },

    #[error("entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
