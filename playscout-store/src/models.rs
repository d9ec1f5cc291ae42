//! Row types for the four tables the pipeline depends on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Track {
    pub id: i64,
    pub provider: String,
    pub provider_track_id: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub isrc: Option<String>,
    pub artwork_url: Option<String>,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Stream {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Recognition {
    pub id: i64,
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Play {
    pub id: i64,
    pub track_id: i64,
    pub stream_id: i64,
    pub recognized_at_utc: DateTime<Utc>,
    pub dedup_bucket: i64,
    pub confidence: Option<f64>,
}

/// Fields needed to upsert a track; mirrors what a recognition result carries.
#[derive(Debug, Clone)]
pub struct TrackUpsert {
    pub provider: String,
    pub provider_track_id: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub isrc: Option<String>,
    pub artwork_url: Option<String>,
    pub metadata: Option<String>,
}
