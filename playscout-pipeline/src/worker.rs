//! Per-stream pipeline coordinator: wires the decoder (C1) through the
//! window scheduler (C2), the parallel dispatcher (C4), the two-hit
//! aggregator (C5), and persistence (C6) into one supervised task per
//! enabled stream.

use std::sync::Arc;
use std::time::Duration;

use playscout_async::sync::{watch, CancellationToken, Mutex};
use playscout_decode::{read_chunk, DecoderConfig, DecoderRunner};
use playscout_ingest::{AudioWindow, Clock, TwoHitAggregator, WindowScheduler};
use playscout_recognize::RecognitionResult;
use playscout_runtime::StreamDescriptor;
use playscout_store::models::TrackUpsert;
use playscout_store::repositories::RecognitionRecord;
use playscout_store::{PlayRepository, RecognitionRepository, StoreError, StreamRepository, TrackRepository};
use tokio::process::ChildStdout;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::dispatch::ParallelDispatcher;
use crate::error::{PipelineError, Result};

const READ_CHUNK_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    Starting,
    Running,
    Restarting,
    Stopping,
    Stopped,
    Failed,
}

impl WorkerStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Restarting => "restarting",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    fn validate_transition(&self, to: WorkerStatus) -> std::result::Result<(), PipelineError> {
        let valid = matches!(
            (self, to),
            (Self::Idle, Self::Starting)
                | (Self::Starting, Self::Running)
                | (Self::Starting, Self::Failed)
                | (Self::Running, Self::Restarting)
                | (Self::Running, Self::Stopping)
                | (Self::Running, Self::Failed)
                | (Self::Restarting, Self::Running)
                | (Self::Restarting, Self::Failed)
                | (Self::Stopping, Self::Stopped)
                | (Self::Failed, Self::Starting)
        );
        if !valid {
            return Err(PipelineError::InvalidStateTransition {
                from: self.as_str(),
                to: to.as_str(),
                reason: "no such edge in the stream worker state machine",
            });
        }
        Ok(())
    }
}

/// Shared collaborators a worker needs but does not own: the recognizer
/// fleet (via the dispatcher) and the persistence handles, both arena-owned
/// by the worker manager and lent out as non-owning `Arc` handles.
pub struct WorkerDeps {
    pub dispatcher: Arc<ParallelDispatcher>,
    pub clock: Arc<dyn Clock>,
    pub stream_repo: Arc<dyn StreamRepository>,
    pub track_repo: Arc<dyn TrackRepository>,
    pub recognition_repo: Arc<dyn RecognitionRepository>,
    pub play_repo: Arc<dyn PlayRepository>,
}

pub struct WorkerConfig {
    pub stream: StreamDescriptor,
    pub decoder: DecoderConfig,
    pub window_seconds: u32,
    pub hop_seconds: u32,
    pub two_hit_hop_tolerance: u32,
    pub dedup_seconds: u64,
}

pub struct StreamWorker {
    config: WorkerConfig,
    deps: WorkerDeps,
    status: Mutex<WorkerStatus>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamWorker {
    pub fn new(config: WorkerConfig, deps: WorkerDeps) -> Arc<Self> {
        Arc::new(Self {
            config,
            deps,
            status: Mutex::new(WorkerStatus::Idle),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    pub fn stream_name(&self) -> &str {
        &self.config.stream.name
    }

    pub async fn status(&self) -> WorkerStatus {
        *self.status.lock().await
    }

    #[instrument(skip(self), fields(stream = %self.config.stream.name))]
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut status = self.status.lock().await;
            status.validate_transition(WorkerStatus::Starting)?;
            *status = WorkerStatus::Starting;
        }

        let worker = Arc::clone(self);
        let handle = tokio::spawn(async move { worker.run_loop().await });
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    #[instrument(skip(self), fields(stream = %self.config.stream.name))]
    pub async fn stop(&self) -> Result<()> {
        {
            let mut status = self.status.lock().await;
            if *status == WorkerStatus::Stopped || *status == WorkerStatus::Idle {
                return Ok(());
            }
            status.validate_transition(WorkerStatus::Stopping)?;
            *status = WorkerStatus::Stopping;
        }

        self.cancel.cancel();
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }

        *self.status.lock().await = WorkerStatus::Stopped;
        Ok(())
    }

    async fn transition(&self, to: WorkerStatus) {
        let mut status = self.status.lock().await;
        if let Err(err) = status.validate_transition(to) {
            warn!(stream = %self.config.stream.name, %err, "ignoring invalid worker transition");
            return;
        }
        *status = to;
    }

    async fn run_loop(self: Arc<Self>) {
        let runner = Arc::new(DecoderRunner::new(self.config.decoder.clone()));

        let stream_id = match self
            .deps
            .stream_repo
            .ensure_stream(&self.config.stream.name, &self.config.stream.url)
            .await
        {
            Ok(id) => id,
            Err(err) => {
                error!(stream = %self.config.stream.name, %err, "failed to ensure stream row");
                self.transition(WorkerStatus::Failed).await;
                return;
            }
        };

        let stdout = match runner.start().await {
            Ok(stdout) => stdout,
            Err(err) => {
                error!(stream = %self.config.stream.name, %err, "decoder failed to start");
                self.transition(WorkerStatus::Failed).await;
                return;
            }
        };
        self.transition(WorkerStatus::Running).await;

        let scheduler = WindowScheduler::new(
            Arc::clone(&self.deps.clock),
            self.config.window_seconds,
            self.config.hop_seconds,
        );
        let mut aggregator =
            TwoHitAggregator::new(self.config.two_hit_hop_tolerance, self.config.hop_seconds);

        let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));
        let (mut died_tx, mut died_rx) = watch::channel(false);
        self.spawn_reader(Arc::clone(&buffer), stdout, died_tx.clone());

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let window_start = scheduler.next_window_start(self.deps.clock.now());
            let sleep_for = (window_start - self.deps.clock.now()).to_std().unwrap_or(Duration::ZERO);
            if !sleep_for.is_zero() {
                self.deps.clock.sleep(sleep_for).await;
            }
            buffer.lock().await.clear();

            let window_end = scheduler.wait_for_window_close(window_start).await;
            if self.cancel.is_cancelled() {
                break;
            }

            let payload = std::mem::take(&mut *buffer.lock().await);
            let window = AudioWindow {
                start_utc: window_start,
                end_utc: window_end,
                payload,
            };

            self.process_window(stream_id, window, &mut aggregator).await;

            if *died_rx.borrow() {
                match self.restart_decoder(&runner).await {
                    Ok(new_stdout) => {
                        let (new_tx, new_rx) = watch::channel(false);
                        died_tx = new_tx.clone();
                        died_rx = new_rx;
                        self.spawn_reader(Arc::clone(&buffer), new_stdout, new_tx);
                    }
                    Err(()) => {
                        self.transition(WorkerStatus::Failed).await;
                        return;
                    }
                }
            }
        }

        let _ = died_tx.send(true);
        let _ = runner.stop().await;
    }

    fn spawn_reader(&self, buffer: Arc<Mutex<Vec<u8>>>, mut stdout: ChildStdout, died: watch::Sender<bool>) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut chunk = [0u8; READ_CHUNK_BYTES];
            loop {
                if cancel.is_cancelled() {
                    return;
                }
                match read_chunk(&mut stdout, &mut chunk).await {
                    Ok(0) | Err(_) => {
                        let _ = died.send(true);
                        return;
                    }
                    Ok(n) => buffer.lock().await.extend_from_slice(&chunk[..n]),
                }
            }
        });
    }

    async fn restart_decoder(&self, runner: &DecoderRunner) -> std::result::Result<ChildStdout, ()> {
        self.transition(WorkerStatus::Restarting).await;
        match runner.restart().await {
            Ok(stdout) => {
                self.transition(WorkerStatus::Running).await;
                Ok(stdout)
            }
            Err(err) => {
                error!(stream = %self.config.stream.name, %err, "decoder restart budget exhausted");
                Err(())
            }
        }
    }

    #[instrument(skip(self, window, aggregator), fields(stream = %self.config.stream.name))]
    async fn process_window(
        &self,
        stream_id: i64,
        window: AudioWindow,
        aggregator: &mut TwoHitAggregator,
    ) {
        let results = self.deps.dispatcher.recognize_parallel(&window.payload).await;

        for result in &results {
            if let Err(err) = self.record_diagnostics(stream_id, &window, result).await {
                warn!(stream = %self.config.stream.name, %err, "diagnostics write failed, window lost");
                continue;
            }

            if let Some(confirmed) = aggregator.process_recognition(&self.config.stream.name, result) {
                if let Err(err) = self.confirm_play(stream_id, &confirmed).await {
                    warn!(stream = %self.config.stream.name, %err, "failed to record confirmed play");
                }
            }
        }

        aggregator.evict_expired(self.deps.clock.now());
    }

    async fn record_diagnostics(
        &self,
        stream_id: i64,
        window: &AudioWindow,
        result: &RecognitionResult,
    ) -> Result<()> {
        let track_id = if result.is_success() {
            self.deps.track_repo.upsert_track(to_upsert(result)).await.ok()
        } else {
            None
        };

        self.deps
            .recognition_repo
            .append_recognition(RecognitionRecord {
                stream_id,
                provider: result.provider.clone(),
                recognized_at_utc: result.recognized_at_utc,
                window_start_utc: window.start_utc,
                window_end_utc: window.end_utc,
                track_id,
                confidence: result.confidence,
                latency_ms: None,
                raw_response: result.raw_response.as_ref().map(|v| v.to_string()),
                error_message: result.error_message.clone(),
            })
            .await?;
        Ok(())
    }

    async fn confirm_play(&self, stream_id: i64, result: &RecognitionResult) -> Result<()> {
        let track_id = self.deps.track_repo.upsert_track(to_upsert(result)).await?;
        let dedup_bucket = result.recognized_at_utc.timestamp() / self.config.dedup_seconds as i64;

        match self
            .deps
            .play_repo
            .insert_play(track_id, stream_id, result.recognized_at_utc, dedup_bucket, result.confidence)
            .await
        {
            Ok(_) => {
                info!(stream = %self.config.stream.name, provider = %result.provider, "play confirmed");
                Ok(())
            }
            Err(StoreError::DuplicatePlay { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn to_upsert(result: &RecognitionResult) -> TrackUpsert {
    TrackUpsert {
        provider: result.provider.clone(),
        provider_track_id: result.provider_track_id.clone(),
        title: result.title.clone(),
        artist: result.artist.clone(),
        album: result.album.clone(),
        isrc: result.isrc.clone(),
        artwork_url: result.artwork_url.clone(),
        metadata: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_can_only_start() {
        assert!(WorkerStatus::Idle.validate_transition(WorkerStatus::Starting).is_ok());
        assert!(WorkerStatus::Idle.validate_transition(WorkerStatus::Running).is_err());
    }

    #[test]
    fn running_can_restart_stop_or_fail() {
        assert!(WorkerStatus::Running.validate_transition(WorkerStatus::Restarting).is_ok());
        assert!(WorkerStatus::Running.validate_transition(WorkerStatus::Stopping).is_ok());
        assert!(WorkerStatus::Running.validate_transition(WorkerStatus::Failed).is_ok());
        assert!(WorkerStatus::Running.validate_transition(WorkerStatus::Starting).is_err());
    }

    #[test]
    fn restarting_returns_to_running() {
        assert!(WorkerStatus::Restarting.validate_transition(WorkerStatus::Running).is_ok());
    }

    #[test]
    fn stopped_and_failed_are_terminal_except_failed_can_restart() {
        assert!(WorkerStatus::Stopping.validate_transition(WorkerStatus::Stopped).is_ok());
        assert!(WorkerStatus::Stopped.validate_transition(WorkerStatus::Starting).is_err());
        assert!(WorkerStatus::Failed.validate_transition(WorkerStatus::Starting).is_ok());
    }
}
