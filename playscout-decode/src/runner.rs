//! Subprocess supervision for the external decoder binary.
//!
//! The decoder is invoked once per stream and re-spawned under exponential
//! backoff when it exits or stalls; a restart budget turns persistent
//! failure into a hard stop instead of an infinite retry loop.

use std::process::Stdio;
use std::time::Duration;

use playscout_async::sync::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout};
use tracing::{info, instrument, warn};

use crate::error::{DecodeError, Result};

#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub rtsp_url: String,
    pub rtsp_transport: String,
    pub rtsp_timeout: Duration,
    pub rw_timeout: Duration,
    pub sample_rate: u32,
    pub channels: u16,
    pub max_restart_attempts: u32,
    pub restart_backoff_base: Duration,
    pub restart_backoff_cap: Duration,
}

impl DecoderConfig {
    pub fn new(rtsp_url: impl Into<String>) -> Self {
        Self {
            rtsp_url: rtsp_url.into(),
            rtsp_transport: "tcp".to_string(),
            rtsp_timeout: Duration::from_secs(10),
            rw_timeout: Duration::from_secs(15),
            sample_rate: 44100,
            channels: 1,
            max_restart_attempts: 10,
            restart_backoff_base: Duration::from_secs(1),
            restart_backoff_cap: Duration::from_secs(60),
        }
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-rtsp_transport".to_string(),
            self.rtsp_transport.clone(),
            "-stimeout".to_string(),
            self.rtsp_timeout.as_micros().to_string(),
            "-rw_timeout".to_string(),
            self.rw_timeout.as_micros().to_string(),
            "-i".to_string(),
            self.rtsp_url.clone(),
            "-vn".to_string(),
            "-ac".to_string(),
            self.channels.to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-f".to_string(),
            "s16le".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "pipe:1".to_string(),
        ]
    }

    /// `min(base * 2^(restart_count - 1), cap)`; zero before the first restart.
    fn backoff(&self, restart_count: u32) -> Duration {
        if restart_count == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64.checked_shl(restart_count - 1).unwrap_or(u64::MAX);
        let scaled = self.restart_backoff_base.saturating_mul(factor as u32);
        scaled.min(self.restart_backoff_cap)
    }
}

/// Owns the decoder's child process and its stderr-drain task.
pub struct DecoderRunner {
    config: DecoderConfig,
    child: Mutex<Option<Child>>,
    restart_count: Mutex<u32>,
}

impl DecoderRunner {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            child: Mutex::new(None),
            restart_count: Mutex::new(0),
        }
    }

    #[instrument(skip(self), fields(rtsp_url = %self.config.rtsp_url))]
    pub async fn start(&self) -> Result<ChildStdout> {
        let restart_count = *self.restart_count.lock().await;
        let delay = self.config.backoff(restart_count);
        if !delay.is_zero() {
            warn!(restart_count, backoff_seconds = delay.as_secs(), "backing off before decoder restart");
            tokio::time::sleep(delay).await;
        }

        let mut child = tokio::process::Command::new("ffmpeg")
            .args(self.config.args())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .spawn()
            .map_err(DecodeError::Spawn)?;

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        info!(restart_count, "decoder process started");
        spawn_stderr_drain(stderr, self.config.rtsp_url.clone());

        *self.child.lock().await = Some(child);
        Ok(stdout)
    }

    pub async fn stop(&self) -> Result<()> {
        let mut guard = self.child.lock().await;
        let Some(mut child) = guard.take() else {
            return Ok(());
        };

        let _ = child.start_kill();
        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                warn!("decoder did not exit gracefully, killing");
                let _ = child.kill().await;
            }
        }
        Ok(())
    }

    /// Restarts the decoder, returning a fresh stdout handle. Fails once the
    /// restart budget is exhausted; the caller (C7) treats that as fatal.
    ///
    /// With `max_restart_attempts = N`, restarts `1..=N-1` succeed and the
    /// `N`th call is the one that fails fatally: the check below looks one
    /// attempt ahead so the budget is spent, not overrun, before stopping.
    pub async fn restart(&self) -> Result<ChildStdout> {
        let mut restart_count = self.restart_count.lock().await;
        if *restart_count + 1 >= self.config.max_restart_attempts {
            return Err(DecodeError::RestartBudgetExhausted {
                attempts: *restart_count,
            });
        }
        *restart_count += 1;
        let attempts = *restart_count;
        drop(restart_count);

        self.stop().await?;
        let stdout = self.start().await?;
        info!(attempts, "decoder restarted");
        Ok(stdout)
    }
}

fn spawn_stderr_drain(stderr: tokio::process::ChildStderr, stream_label: String) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.is_empty() {
                warn!(stream = %stream_label, "decoder stderr: {line}");
            }
        }
    });
}

/// Reads raw PCM in fixed-size chunks until EOF.
pub async fn read_chunk(stdout: &mut ChildStdout, buf: &mut [u8]) -> std::io::Result<usize> {
    stdout.read(buf).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_follows_exponential_schedule_with_cap() {
        let config = DecoderConfig::new("rtsp://example");
        let expected = [0, 1, 2, 4, 8, 16, 32, 60, 60, 60];
        for (restart_count, expected_secs) in expected.iter().enumerate() {
            assert_eq!(
                config.backoff(restart_count as u32).as_secs(),
                *expected_secs,
                "restart_count={restart_count}"
            );
        }
    }

    #[test]
    fn args_match_expected_decoder_invocation() {
        let config = DecoderConfig::new("rtsp://example/stream");
        let args = config.args();
        assert_eq!(args[0], "-rtsp_transport");
        assert!(args.contains(&"pipe:1".to_string()));
        assert!(args.contains(&"s16le".to_string()));
    }
}
