//! Two-hit confirmation: a track only becomes a confirmed play once the same
//! `(provider, provider_track_id)` has been seen twice on the same stream
//! within `tolerance_hops` hops of each other.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use playscout_recognize::RecognitionResult;
use tracing::debug;

#[derive(Debug, Clone)]
struct PendingHit {
    first_hit_time: DateTime<Utc>,
    confidence: Option<f64>,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TrackKey {
    provider: String,
    provider_track_id: String,
}

/// Per-stream pending-hit state, keyed by `(provider, provider_track_id)`.
#[derive(Default)]
pub struct TwoHitAggregator {
    pending: HashMap<String, HashMap<TrackKey, PendingHit>>,
    tolerance_hops: u32,
    hop_seconds: u32,
}

impl TwoHitAggregator {
    pub fn new(tolerance_hops: u32, hop_seconds: u32) -> Self {
        Self {
            pending: HashMap::new(),
            tolerance_hops,
            hop_seconds,
        }
    }

    /// Feeds one recognition result for `stream_name` through the state
    /// machine. Non-success results (no-match, error) are ignored. Returns
    /// `Some(result)` only when this hit confirms a previously pending one.
    pub fn process_recognition(
        &mut self,
        stream_name: &str,
        result: &RecognitionResult,
    ) -> Option<RecognitionResult> {
        if !result.is_success() {
            return None;
        }

        let key = TrackKey {
            provider: result.provider.clone(),
            provider_track_id: result.provider_track_id.clone(),
        };
        let stream_pending = self.pending.entry(stream_name.to_string()).or_default();

        match stream_pending.get(&key) {
            Some(pending) if self.is_within_tolerance(pending.first_hit_time, result.recognized_at_utc) => {
                stream_pending.remove(&key);
                debug!(stream = stream_name, provider = %key.provider, "two-hit confirmed");
                Some(result.clone())
            }
            _ => {
                stream_pending.insert(
                    key,
                    PendingHit {
                        first_hit_time: result.recognized_at_utc,
                        confidence: result.confidence,
                    },
                );
                None
            }
        }
    }

    fn is_within_tolerance(&self, first_hit_time: DateTime<Utc>, second_hit_time: DateTime<Utc>) -> bool {
        let elapsed = (second_hit_time - first_hit_time).num_seconds();
        elapsed <= (self.tolerance_hops as i64) * (self.hop_seconds as i64)
    }

    /// Purges entries older than `(tolerance_hops + 1) * hop_seconds`. Safe to
    /// call on every update or on a periodic timer.
    pub fn evict_expired(&mut self, now: DateTime<Utc>) {
        let max_age = (self.tolerance_hops as i64 + 1) * self.hop_seconds as i64;
        for stream_pending in self.pending.values_mut() {
            stream_pending.retain(|_, pending| (now - pending.first_hit_time).num_seconds() <= max_age);
        }
    }

    pub fn pending_hits_count(&self, stream_name: Option<&str>) -> usize {
        match stream_name {
            Some(name) => self.pending.get(name).map(HashMap::len).unwrap_or(0),
            None => self.pending.values().map(HashMap::len).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(provider: &str, track_id: &str, at: DateTime<Utc>) -> RecognitionResult {
        RecognitionResult {
            provider: provider.to_string(),
            provider_track_id: track_id.to_string(),
            title: "Song".to_string(),
            artist: "Artist".to_string(),
            recognized_at_utc: at,
            album: None,
            isrc: None,
            artwork_url: None,
            confidence: Some(0.9),
            raw_response: None,
            error_message: None,
        }
    }

    #[test]
    fn first_hit_is_pending_not_confirmed() {
        let mut agg = TwoHitAggregator::new(1, 120);
        let t0 = Utc::now();
        let result = agg.process_recognition("S", &hit("shazam", "abc", t0));
        assert!(result.is_none());
        assert_eq!(agg.pending_hits_count(Some("S")), 1);
    }

    #[test]
    fn second_hit_within_tolerance_confirms() {
        let mut agg = TwoHitAggregator::new(1, 120);
        let t0 = Utc::now();
        agg.process_recognition("S", &hit("shazam", "abc", t0));
        let confirmed = agg.process_recognition("S", &hit("shazam", "abc", t0 + chrono::Duration::seconds(120)));
        assert!(confirmed.is_some());
        assert_eq!(agg.pending_hits_count(Some("S")), 0);
    }

    #[test]
    fn second_hit_past_tolerance_replaces_pending_entry() {
        let mut agg = TwoHitAggregator::new(1, 120);
        let t0 = Utc::now();
        agg.process_recognition("S", &hit("shazam", "abc", t0));
        let confirmed = agg.process_recognition("S", &hit("shazam", "abc", t0 + chrono::Duration::seconds(121)));
        assert!(confirmed.is_none());
        assert_eq!(agg.pending_hits_count(Some("S")), 1);
    }

    #[test]
    fn eviction_removes_stale_entries() {
        let mut agg = TwoHitAggregator::new(1, 120);
        let t0 = Utc::now();
        agg.process_recognition("S", &hit("shazam", "abc", t0));
        agg.evict_expired(t0 + chrono::Duration::seconds(241));
        assert_eq!(agg.pending_hits_count(Some("S")), 0);
    }

    #[test]
    fn non_success_results_are_ignored() {
        let mut agg = TwoHitAggregator::new(1, 120);
        let mut no_match = hit("shazam", "", Utc::now());
        no_match.provider_track_id = String::new();
        assert!(agg.process_recognition("S", &no_match).is_none());
        assert_eq!(agg.pending_hits_count(Some("S")), 0);
    }
}
