//! Process-level fleet coordinator: owns the capacity gates and persistence
//! handles shared by every stream worker, and the `start_all`/`stop_all`/
//! `restart_all` lifecycle plus a 30s liveness-logging task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use playscout_async::sync::{CancellationToken, Mutex};
use playscout_decode::DecoderConfig;
use playscout_ingest::{Clock, SystemClock};
use playscout_recognize::{FingerprintApiRecognizer, MusicRecognizer, SignalMatchingRecognizer};
use playscout_runtime::PipelineConfig;
use playscout_store::repositories::{
    SqlitePlayRepository, SqliteRecognitionRepository, SqliteStreamRepository, SqliteTrackRepository,
};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::dispatch::ParallelDispatcher;
use crate::error::{PipelineError, Result};
use crate::worker::{StreamWorker, WorkerConfig, WorkerDeps, WorkerStatus};

const LIVENESS_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Owns the global/per-provider capacity gates and shared database handles;
/// constructs and supervises one [`StreamWorker`] per enabled stream.
pub struct WorkerManager {
    config: PipelineConfig,
    dispatcher: Arc<ParallelDispatcher>,
    clock: Arc<dyn Clock>,
    pool: SqlitePool,
    workers: Mutex<HashMap<String, Arc<StreamWorker>>>,
    liveness_cancel: Mutex<Option<CancellationToken>>,
}

impl WorkerManager {
    pub fn new(config: PipelineConfig, pool: SqlitePool) -> Self {
        let recognizers = build_recognizers(&config);
        let dispatcher = Arc::new(ParallelDispatcher::new(
            recognizers,
            config.global_max_inflight_recognitions,
            config.per_provider_max_inflight,
            config.recognition_timeout,
        ));

        Self {
            config,
            dispatcher,
            clock: Arc::new(SystemClock),
            pool,
            workers: Mutex::new(HashMap::new()),
            liveness_cancel: Mutex::new(None),
        }
    }

    /// Starts one worker per enabled stream descriptor, then the liveness task.
    pub async fn start_all(&self) -> Result<()> {
        info!(stream_count = self.config.streams.len(), "starting all stream workers");

        let mut workers = self.workers.lock().await;
        for stream in &self.config.streams {
            if !stream.enabled {
                info!(stream = %stream.name, "skipping disabled stream");
                continue;
            }
            if workers.contains_key(&stream.name) {
                return Err(PipelineError::DuplicateStream(stream.name.clone()));
            }

            let worker = StreamWorker::new(
                WorkerConfig {
                    stream: stream.clone(),
                    decoder: DecoderConfig {
                        rtsp_url: stream.url.clone(),
                        rtsp_transport: self.config.rtsp_transport.clone(),
                        rtsp_timeout: self.config.rtsp_timeout,
                        rw_timeout: self.config.rw_timeout,
                        sample_rate: 44100,
                        channels: 1,
                        max_restart_attempts: self.config.max_restart_attempts,
                        restart_backoff_base: self.config.restart_backoff_base,
                        restart_backoff_cap: self.config.restart_backoff_cap,
                    },
                    window_seconds: self.config.window_seconds,
                    hop_seconds: self.config.hop_seconds,
                    two_hit_hop_tolerance: self.config.two_hit_hop_tolerance,
                    dedup_seconds: self.config.dedup_seconds,
                },
                WorkerDeps {
                    dispatcher: Arc::clone(&self.dispatcher),
                    clock: Arc::clone(&self.clock),
                    stream_repo: Arc::new(SqliteStreamRepository::new(self.pool.clone())),
                    track_repo: Arc::new(SqliteTrackRepository::new(self.pool.clone())),
                    recognition_repo: Arc::new(SqliteRecognitionRepository::new(self.pool.clone())),
                    play_repo: Arc::new(SqlitePlayRepository::new(self.pool.clone())),
                },
            );
            worker.start().await?;
            info!(stream = %stream.name, "started stream worker");
            workers.insert(stream.name.clone(), worker);
        }
        drop(workers);

        self.start_liveness_task().await;
        Ok(())
    }

    /// Stops every worker concurrently and awaits completion.
    pub async fn stop_all(&self) -> Result<()> {
        info!("stopping all stream workers");
        if let Some(cancel) = self.liveness_cancel.lock().await.take() {
            cancel.cancel();
        }

        let workers: Vec<Arc<StreamWorker>> = self.workers.lock().await.drain().map(|(_, w)| w).collect();
        let stop_futures = workers.iter().map(|w| w.stop());
        for result in futures::future::join_all(stop_futures).await {
            if let Err(err) = result {
                warn!(%err, "error stopping a stream worker");
            }
        }
        info!("all stream workers stopped");
        Ok(())
    }

    pub async fn restart_all(&self) -> Result<()> {
        info!("restarting all stream workers");
        self.stop_all().await?;
        self.start_all().await
    }

    async fn start_liveness_task(&self) {
        let cancel = CancellationToken::new();
        *self.liveness_cancel.lock().await = Some(cancel.clone());

        let workers = {
            let guard = self.workers.lock().await;
            guard.values().cloned().collect::<Vec<_>>()
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(LIVENESS_LOG_INTERVAL) => {}
                }

                if workers.is_empty() {
                    warn!("no active stream workers");
                    continue;
                }
                info!(active_streams = workers.len(), "stream status");
                for worker in &workers {
                    let status = worker.status().await;
                    info!(
                        stream = worker.stream_name(),
                        worker = ?status,
                        decoder_running = status == WorkerStatus::Running,
                        "stream liveness"
                    );
                }
            }
        });
    }
}

fn build_recognizers(config: &PipelineConfig) -> Vec<Arc<dyn MusicRecognizer>> {
    let mut recognizers: Vec<Arc<dyn MusicRecognizer>> = vec![Arc::new(SignalMatchingRecognizer::new(
        config.shazam_endpoint.clone(),
    ))];

    if config.acoustid_enabled {
        if let Some(api_key) = &config.acoustid_api_key {
            recognizers.push(Arc::new(FingerprintApiRecognizer::new(
                api_key.clone(),
                config.chromaprint_path.clone(),
            )));
        }
    }

    recognizers
}
