//! The uniform contract every recognizer speaks: `(payload, timeout) ->
//! RecognitionResult`, with success/no-match/error folded into one type
//! rather than three.

use chrono::{DateTime, Utc};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct RecognitionResult {
    pub provider: String,
    pub provider_track_id: String,
    pub title: String,
    pub artist: String,
    pub recognized_at_utc: DateTime<Utc>,
    pub album: Option<String>,
    pub isrc: Option<String>,
    pub artwork_url: Option<String>,
    pub confidence: Option<f64>,
    pub raw_response: Option<Value>,
    pub error_message: Option<String>,
}

impl RecognitionResult {
    /// A match: no error, and the provider named a track.
    pub fn is_success(&self) -> bool {
        self.error_message.is_none() && !self.provider_track_id.is_empty()
    }

    /// The provider ran cleanly but found nothing.
    pub fn is_no_match(&self) -> bool {
        self.error_message.is_none() && self.provider_track_id.is_empty()
    }

    pub fn is_error(&self) -> bool {
        self.error_message.is_some()
    }

    pub fn error(provider: &str, recognized_at_utc: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            provider_track_id: String::new(),
            title: String::new(),
            artist: String::new(),
            recognized_at_utc,
            album: None,
            isrc: None,
            artwork_url: None,
            confidence: None,
            raw_response: None,
            error_message: Some(message.into()),
        }
    }

    pub fn no_match(provider: &str, recognized_at_utc: DateTime<Utc>, raw_response: Option<Value>) -> Self {
        Self {
            provider: provider.to_string(),
            provider_track_id: String::new(),
            title: String::new(),
            artist: String::new(),
            recognized_at_utc,
            album: None,
            isrc: None,
            artwork_url: None,
            confidence: None,
            raw_response,
            error_message: None,
        }
    }
}
