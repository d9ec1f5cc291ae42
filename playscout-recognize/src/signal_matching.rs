//! Direct-submission signal matching: the payload is POSTed whole to a
//! matching endpoint, which reports back a track plus the time/frequency
//! skew of the match. Confidence is derived from that skew rather than
//! supplied by the provider.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::error::RecognizeError;
use crate::recognizer::MusicRecognizer;
use crate::types::RecognitionResult;

const MAX_RETRIES: u32 = 3;

#[derive(Debug, Deserialize)]
struct MatchResponse {
    #[serde(default)]
    matches: Vec<TrackMatch>,
}

#[derive(Debug, Deserialize)]
struct TrackMatch {
    track_id: String,
    title: String,
    artist: String,
    #[serde(default)]
    album: Option<String>,
    #[serde(default)]
    isrc: Option<String>,
    #[serde(default)]
    artwork_url: Option<String>,
    #[serde(default)]
    timeskew: f64,
    #[serde(default)]
    frequencyskew: f64,
}

/// `0.6`/`0.8` on time-skew over `1e-3`/`1e-4`, `0.7`/`0.9` on frequency-skew
/// over `1e-4`/`1e-5`, multiplied together and clamped to `[0, 1]`.
fn derive_confidence(time_skew: f64, frequency_skew: f64) -> f64 {
    let mut confidence = 1.0_f64;

    let time_skew = time_skew.abs();
    if time_skew > 1e-3 {
        confidence *= 0.6;
    } else if time_skew > 1e-4 {
        confidence *= 0.8;
    }

    let frequency_skew = frequency_skew.abs();
    if frequency_skew > 1e-4 {
        confidence *= 0.7;
    } else if frequency_skew > 1e-5 {
        confidence *= 0.9;
    }

    confidence.clamp(0.0, 1.0)
}

pub struct SignalMatchingRecognizer {
    endpoint: String,
    http: reqwest::Client,
}

impl SignalMatchingRecognizer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Retries 429/5xx responses with exponential backoff; a 4xx other than
    /// 429 is a client error and returned immediately.
    #[instrument(skip(self, payload))]
    async fn submit_with_retry(&self, payload: &[u8], timeout: Duration) -> crate::error::Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            let response = self
                .http
                .post(&self.endpoint)
                .timeout(timeout)
                .body(payload.to_vec())
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if status.as_u16() == 429 || status.is_server_error() {
                attempt += 1;
                if attempt >= MAX_RETRIES {
                    warn!(status = status.as_u16(), attempt, "signal match request failed after retries");
                    return Err(RecognizeError::ProviderError {
                        status: status.as_u16(),
                        message: format!("request failed after {MAX_RETRIES} retries"),
                    });
                }
                let backoff_ms = 100u64 * 2u64.pow(attempt);
                warn!(status = status.as_u16(), attempt, backoff_ms, "retrying signal match request");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                continue;
            }

            let message = response.text().await.unwrap_or_default();
            return Err(RecognizeError::ProviderError {
                status: status.as_u16(),
                message,
            });
        }
    }
}

#[async_trait]
impl MusicRecognizer for SignalMatchingRecognizer {
    fn provider_name(&self) -> &str {
        "shazam"
    }

    #[instrument(skip(self, payload))]
    async fn recognize(&self, payload: &[u8], timeout: Duration) -> RecognitionResult {
        let recognized_at = Utc::now();

        let response = match tokio::time::timeout(timeout, self.submit_with_retry(payload, timeout)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return RecognitionResult::error("shazam", recognized_at, err.to_string()),
            Err(_) => return RecognitionResult::error("shazam", recognized_at, "recognizer timed out"),
        };

        let raw: Result<Value, _> = response.json().await;
        let raw = match raw {
            Ok(raw) => raw,
            Err(err) => return RecognitionResult::error("shazam", recognized_at, err.to_string()),
        };

        let parsed: MatchResponse = match serde_json::from_value(raw.clone()) {
            Ok(parsed) => parsed,
            Err(err) => return RecognitionResult::error("shazam", recognized_at, err.to_string()),
        };

        let Some(best) = parsed.matches.into_iter().next() else {
            return RecognitionResult::no_match("shazam", recognized_at, Some(raw));
        };

        let confidence = derive_confidence(best.timeskew, best.frequencyskew);

        RecognitionResult {
            provider: "shazam".to_string(),
            provider_track_id: best.track_id,
            title: best.title,
            artist: best.artist,
            recognized_at_utc: recognized_at,
            album: best.album,
            isrc: best.isrc,
            artwork_url: best.artwork_url,
            confidence: Some(confidence),
            raw_response: Some(raw),
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_full_when_skews_are_tiny() {
        assert_eq!(derive_confidence(0.0, 0.0), 1.0);
    }

    #[test]
    fn confidence_drops_on_large_time_skew() {
        assert!((derive_confidence(0.01, 0.0) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn confidence_drops_on_moderate_time_skew() {
        assert!((derive_confidence(0.0005, 0.0) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn confidence_multiplies_both_factors() {
        let confidence = derive_confidence(0.01, 0.001);
        assert!((confidence - 0.6 * 0.7).abs() < 1e-9);
    }

    #[test]
    fn confidence_is_clamped_to_unit_interval() {
        assert!(derive_confidence(10.0, 10.0) >= 0.0);
    }
}
