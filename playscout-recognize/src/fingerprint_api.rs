//! AcoustID-style fingerprint recognition: `fpcalc` generates a fingerprint
//! from a temp WAV file, which is then looked up against a hosted fingerprint
//! database over HTTP.

use std::io::Write;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::recognizer::MusicRecognizer;
use crate::types::RecognitionResult;

const LOOKUP_URL: &str = "https://api.acoustid.org/v2/lookup";
const MAJOR_MARKETS: [&str; 5] = ["US", "GB", "DE", "FR", "JP"];
const MAX_RETRIES: u32 = 3;

pub struct FingerprintApiRecognizer {
    api_key: String,
    chromaprint_path: String,
    http: reqwest::Client,
}

impl FingerprintApiRecognizer {
    pub fn new(api_key: impl Into<String>, chromaprint_path: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            chromaprint_path: chromaprint_path.into(),
            http: reqwest::Client::new(),
        }
    }

    #[instrument(skip(self, wav_bytes))]
    async fn generate_fingerprint(&self, wav_bytes: &[u8], timeout: Duration) -> Option<String> {
        let mut tmp = tempfile::Builder::new()
            .suffix(".wav")
            .tempfile()
            .ok()?;
        tmp.write_all(wav_bytes).ok()?;
        let path = tmp.path().to_path_buf();

        let fpcalc = tokio::process::Command::new(&self.chromaprint_path)
            .arg("-json")
            .arg(&path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match fpcalc {
            Ok(child) => child,
            Err(err) => {
                warn!(error = %err, "failed to spawn fpcalc");
                return None;
            }
        };

        let output = tokio::time::timeout(timeout, child.wait_with_output()).await;
        let output = match output {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                warn!(error = %err, "fpcalc failed");
                return None;
            }
            Err(_) => {
                warn!("fpcalc timed out");
                return None;
            }
        };

        if !output.status.success() {
            warn!(stderr = %String::from_utf8_lossy(&output.stderr), "fpcalc returned non-zero");
            return None;
        }

        let parsed: Value = serde_json::from_slice(&output.stdout).ok()?;
        let fingerprint = parsed.get("fingerprint")?.as_str()?.to_string();
        debug!(len = fingerprint.len(), "generated fingerprint");
        Some(fingerprint)
    }

    /// Retries 429/5xx responses with exponential backoff; a 4xx other than
    /// 429 is a client error and returned immediately.
    #[instrument(skip(self, fingerprint))]
    async fn query(&self, fingerprint: &str, timeout: Duration) -> crate::error::Result<Value> {
        let mut attempt = 0;
        loop {
            let response = self
                .http
                .post(LOOKUP_URL)
                .timeout(timeout)
                .form(&[
                    ("client", self.api_key.as_str()),
                    ("fingerprint", fingerprint),
                    ("meta", "recordings+releases+artists"),
                    ("format", "json"),
                ])
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(response.json().await?);
            }

            if status.as_u16() == 429 || status.is_server_error() {
                attempt += 1;
                if attempt >= MAX_RETRIES {
                    warn!(status = status.as_u16(), attempt, "acoustid lookup failed after retries");
                    return Err(crate::error::RecognizeError::ProviderError {
                        status: status.as_u16(),
                        message: format!("request failed after {MAX_RETRIES} retries"),
                    });
                }
                let backoff_ms = 100u64 * 2u64.pow(attempt);
                warn!(status = status.as_u16(), attempt, backoff_ms, "retrying acoustid lookup");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                continue;
            }

            let message = response.text().await.unwrap_or_default();
            return Err(crate::error::RecognizeError::ProviderError {
                status: status.as_u16(),
                message,
            });
        }
    }

    fn parse_response(&self, response: Value, recognized_at: chrono::DateTime<Utc>) -> RecognitionResult {
        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown acoustid error")
                .to_string();
            return RecognitionResult::error("acoustid", recognized_at, message);
        }

        if response.get("status").and_then(Value::as_str) != Some("ok") {
            return RecognitionResult::error(
                "acoustid",
                recognized_at,
                format!("unexpected status: {:?}", response.get("status")),
            );
        }

        let results = match response.get("results").and_then(Value::as_array) {
            Some(results) if !results.is_empty() => results,
            _ => return RecognitionResult::no_match("acoustid", recognized_at, Some(response)),
        };

        let best = results
            .iter()
            .max_by(|a, b| {
                let score_a = a.get("score").and_then(Value::as_f64).unwrap_or(0.0);
                let score_b = b.get("score").and_then(Value::as_f64).unwrap_or(0.0);
                score_a.partial_cmp(&score_b).unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("non-empty");

        let track_id = best.get("id").and_then(Value::as_str).unwrap_or("").to_string();
        let score = best.get("score").and_then(Value::as_f64);

        let recordings = best.get("recordings").and_then(Value::as_array);
        let Some(recordings) = recordings.filter(|r| !r.is_empty()) else {
            return RecognitionResult {
                provider: "acoustid".to_string(),
                provider_track_id: track_id,
                title: String::new(),
                artist: String::new(),
                recognized_at_utc: recognized_at,
                album: None,
                isrc: None,
                artwork_url: None,
                confidence: score,
                raw_response: Some(response),
                error_message: None,
            };
        };

        let recording = &recordings[0];
        let title = recording.get("title").and_then(Value::as_str).unwrap_or("").to_string();
        let artist = recording
            .get("artists")
            .and_then(Value::as_array)
            .map(|artists| {
                artists
                    .iter()
                    .filter_map(|a| a.get("name").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();

        let album = recording
            .get("releases")
            .and_then(Value::as_array)
            .filter(|releases| !releases.is_empty())
            .and_then(|releases| select_best_release(releases))
            .and_then(|release| release.get("title").and_then(Value::as_str))
            .map(str::to_string);

        RecognitionResult {
            provider: "acoustid".to_string(),
            provider_track_id: track_id,
            title,
            artist,
            recognized_at_utc: recognized_at,
            album,
            isrc: None,
            artwork_url: None,
            confidence: score,
            raw_response: Some(response),
            error_message: None,
        }
    }
}

/// Prefers a release with a known date, then one from a major market, then
/// whatever is first among what remains.
fn select_best_release(releases: &[Value]) -> Option<&Value> {
    if releases.is_empty() {
        return None;
    }

    let dated: Vec<&Value> = releases
        .iter()
        .filter(|r| r.get("date").is_some())
        .collect();
    let pool: Vec<&Value> = if dated.is_empty() { releases.iter().collect() } else { dated };

    let major: Vec<&Value> = pool
        .iter()
        .filter(|r| {
            r.get("country")
                .and_then(Value::as_str)
                .map(|c| MAJOR_MARKETS.contains(&c))
                .unwrap_or(false)
        })
        .copied()
        .collect();

    Some(if major.is_empty() { pool[0] } else { major[0] })
}

#[async_trait]
impl MusicRecognizer for FingerprintApiRecognizer {
    fn provider_name(&self) -> &str {
        "acoustid"
    }

    async fn recognize(&self, payload: &[u8], timeout: Duration) -> RecognitionResult {
        let recognized_at = Utc::now();

        let Some(fingerprint) = self.generate_fingerprint(payload, timeout).await else {
            return RecognitionResult::error(
                "acoustid",
                recognized_at,
                "failed to generate audio fingerprint",
            );
        };

        match self.query(&fingerprint, timeout).await {
            Ok(response) => self.parse_response(response, recognized_at),
            Err(err) => RecognitionResult::error("acoustid", recognized_at, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recognizer() -> FingerprintApiRecognizer {
        FingerprintApiRecognizer::new("key", "/bin/true")
    }

    #[test]
    fn select_best_release_prefers_dated_then_major_market() {
        let releases = vec![
            json!({"country": "XX"}),
            json!({"date": {"year": 2000}, "country": "BR"}),
            json!({"date": {"year": 2001}, "country": "US"}),
        ];
        let best = select_best_release(&releases).unwrap();
        assert_eq!(best["country"], "US");
    }

    #[test]
    fn select_best_release_falls_back_to_first_remaining() {
        let releases = vec![json!({"country": "XX"}), json!({"country": "YY"})];
        let best = select_best_release(&releases).unwrap();
        assert_eq!(best["country"], "XX");
    }

    #[test]
    fn parse_response_reports_no_match_on_empty_results() {
        let r = recognizer();
        let response = json!({"status": "ok", "results": []});
        let parsed = r.parse_response(response, Utc::now());
        assert!(parsed.is_no_match());
    }

    #[test]
    fn parse_response_surfaces_api_error() {
        let r = recognizer();
        let response = json!({"error": {"message": "invalid fingerprint"}});
        let parsed = r.parse_response(response, Utc::now());
        assert!(parsed.is_error());
        assert_eq!(parsed.error_message.unwrap(), "invalid fingerprint");
    }
}
