//! Process-wide pipeline configuration.
//!
//! Loading and validating these values from environment/files is an external
//! collaborator's job; by the time a [`PipelineConfig`] reaches this crate it
//! is assumed already valid. The builder setters below exist for ergonomics
//! in tests and in the binary's composition root, not for untrusted input.

use std::time::Duration;

/// One configured stream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub name: String,
    pub url: String,
    pub enabled: bool,
}

impl StreamDescriptor {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            enabled: true,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// The decision policy for reconciling recognition hits into confirmed plays.
///
/// Fixed to two-hit confirmation; kept as an enum (rather than a bare
/// constant) so a future policy has somewhere to land without reshaping the
/// config struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecisionPolicy {
    #[default]
    TwoHit,
}

/// Validated, process-wide pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub db_path: String,
    pub streams: Vec<StreamDescriptor>,

    pub window_seconds: u32,
    pub hop_seconds: u32,
    pub dedup_seconds: u64,
    pub two_hit_hop_tolerance: u32,
    pub decision_policy: DecisionPolicy,

    pub global_max_inflight_recognitions: usize,
    pub per_provider_max_inflight: usize,
    pub recognition_timeout: Duration,

    pub acoustid_enabled: bool,
    pub acoustid_api_key: Option<String>,
    pub chromaprint_path: String,
    pub shazam_endpoint: String,

    pub rtsp_transport: String,
    pub rtsp_timeout: Duration,
    pub rw_timeout: Duration,
    pub max_restart_attempts: u32,
    pub restart_backoff_base: Duration,
    pub restart_backoff_cap: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            db_path: "playscout.db".to_string(),
            streams: Vec::new(),
            window_seconds: 12,
            hop_seconds: 120,
            dedup_seconds: 300,
            two_hit_hop_tolerance: 1,
            decision_policy: DecisionPolicy::TwoHit,
            global_max_inflight_recognitions: 3,
            per_provider_max_inflight: 3,
            recognition_timeout: Duration::from_secs(10),
            acoustid_enabled: false,
            acoustid_api_key: None,
            chromaprint_path: "/usr/bin/fpcalc".to_string(),
            shazam_endpoint: "https://amp.shazam.com/discovery/v5/en/US/android/-/tag/match"
                .to_string(),
            rtsp_transport: "tcp".to_string(),
            rtsp_timeout: Duration::from_secs(10),
            rw_timeout: Duration::from_secs(15),
            max_restart_attempts: 10,
            restart_backoff_base: Duration::from_secs(1),
            restart_backoff_cap: Duration::from_secs(60),
        }
    }
}

impl PipelineConfig {
    pub fn with_streams(mut self, streams: Vec<StreamDescriptor>) -> Self {
        self.streams = streams;
        self
    }

    pub fn with_db_path(mut self, db_path: impl Into<String>) -> Self {
        self.db_path = db_path.into();
        self
    }

    pub fn with_window_hop(mut self, window_seconds: u32, hop_seconds: u32) -> Self {
        self.window_seconds = window_seconds;
        self.hop_seconds = hop_seconds;
        self
    }

    pub fn with_acoustid(mut self, api_key: impl Into<String>) -> Self {
        self.acoustid_enabled = true;
        self.acoustid_api_key = Some(api_key.into());
        self
    }

    /// Re-checks the invariants an external loader is expected to have
    /// already enforced. Exists so tests and the binary's composition root
    /// fail loudly instead of producing silently-wrong windows.
    pub fn validate(&self) -> crate::Result<()> {
        if self.window_seconds == 0 || self.window_seconds > 300 {
            return Err(crate::Error::Config(format!(
                "window_seconds must be in 1..=300, got {}",
                self.window_seconds
            )));
        }
        if self.hop_seconds <= self.window_seconds {
            return Err(crate::Error::Config(format!(
                "hop_seconds ({}) must exceed window_seconds ({})",
                self.hop_seconds, self.window_seconds
            )));
        }
        if self.dedup_seconds == 0 {
            return Err(crate::Error::Config("dedup_seconds must be > 0".into()));
        }
        if self.two_hit_hop_tolerance > 10 {
            return Err(crate::Error::Config(
                "two_hit_hop_tolerance must be in 0..=10".into(),
            ));
        }
        if self.global_max_inflight_recognitions == 0 {
            return Err(crate::Error::Config(
                "global_max_inflight_recognitions must be > 0".into(),
            ));
        }
        if self.per_provider_max_inflight == 0 {
            return Err(crate::Error::Config(
                "per_provider_max_inflight must be > 0".into(),
            ));
        }
        if self.acoustid_enabled && self.acoustid_api_key.is_none() {
            return Err(crate::Error::Config(
                "acoustid_enabled requires acoustid_api_key".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn hop_must_exceed_window() {
        let cfg = PipelineConfig::default().with_window_hop(120, 60);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn acoustid_enabled_requires_key() {
        let mut cfg = PipelineConfig::default();
        cfg.acoustid_enabled = true;
        assert!(cfg.validate().is_err());
    }
}
