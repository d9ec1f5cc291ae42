//! Fans one window payload out to every enabled recognizer concurrently,
//! under a two-level capacity gate (global, then per-provider).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use playscout_async::sync::Semaphore;
use playscout_recognize::{MusicRecognizer, RecognitionResult};
use tracing::{instrument, warn};

/// Bounds in-flight recognition calls process-wide and per-provider, then
/// fans a payload out to every configured recognizer.
///
/// Acquisition order is global gate first, then per-provider; a provider
/// whose gate is saturated is skipped rather than queued, so one slow
/// provider never backs up the others or the next window.
pub struct ParallelDispatcher {
    recognizers: Vec<Arc<dyn MusicRecognizer>>,
    global_gate: Arc<Semaphore>,
    per_provider_gates: HashMap<String, Arc<Semaphore>>,
    call_timeout: Duration,
}

impl ParallelDispatcher {
    pub fn new(
        recognizers: Vec<Arc<dyn MusicRecognizer>>,
        global_max_inflight: usize,
        per_provider_max_inflight: usize,
        call_timeout: Duration,
    ) -> Self {
        let per_provider_gates = recognizers
            .iter()
            .map(|r| {
                (
                    r.provider_name().to_string(),
                    Arc::new(Semaphore::new(per_provider_max_inflight)),
                )
            })
            .collect();
        Self {
            recognizers,
            global_gate: Arc::new(Semaphore::new(global_max_inflight)),
            per_provider_gates,
            call_timeout,
        }
    }

    /// Returns every result that completed, including no-match and
    /// provider-side error results. A recognizer whose task panicked, or
    /// whose per-provider gate was saturated at acquire time, contributes no
    /// entry. Result order is unspecified.
    #[instrument(skip(self, payload), fields(recognizer_count = self.recognizers.len()))]
    pub async fn recognize_parallel(&self, payload: &[u8]) -> Vec<RecognitionResult> {
        let mut tasks = Vec::with_capacity(self.recognizers.len());

        for recognizer in &self.recognizers {
            let provider = recognizer.provider_name().to_string();
            let Some(provider_gate) = self.per_provider_gates.get(&provider).cloned() else {
                continue;
            };
            let recognizer = Arc::clone(recognizer);
            let global_gate = Arc::clone(&self.global_gate);
            let payload = payload.to_vec();
            let timeout = self.call_timeout;

            tasks.push(tokio::spawn(async move {
                let Ok(_global_permit) = global_gate.acquire().await else {
                    return None;
                };
                let _provider_permit = match provider_gate.try_acquire() {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!(provider = %provider, "skipping recognizer: per-provider gate saturated");
                        return None;
                    }
                };
                Some(recognizer.recognize(&payload, timeout).await)
            }));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(join_err) => warn!(error = %join_err, "recognizer task failed"),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubRecognizer {
        name: &'static str,
        inflight: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait]
    impl MusicRecognizer for StubRecognizer {
        fn provider_name(&self) -> &str {
            self.name
        }

        async fn recognize(&self, _payload: &[u8], _timeout: Duration) -> RecognitionResult {
            self.inflight.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.inflight.fetch_sub(1, Ordering::SeqCst);
            RecognitionResult::no_match(self.name, Utc::now(), None)
        }
    }

    #[tokio::test]
    async fn dispatches_to_every_recognizer() {
        let inflight = Arc::new(AtomicUsize::new(0));
        let recognizers: Vec<Arc<dyn MusicRecognizer>> = vec![
            Arc::new(StubRecognizer {
                name: "shazam",
                inflight: inflight.clone(),
                delay: Duration::from_millis(1),
            }),
            Arc::new(StubRecognizer {
                name: "acoustid",
                inflight: inflight.clone(),
                delay: Duration::from_millis(1),
            }),
        ];
        let dispatcher = ParallelDispatcher::new(recognizers, 3, 3, Duration::from_secs(1));
        let results = dispatcher.recognize_parallel(b"pcm").await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn saturated_per_provider_gate_skips_without_blocking() {
        let inflight = Arc::new(AtomicUsize::new(0));
        let recognizers: Vec<Arc<dyn MusicRecognizer>> = vec![Arc::new(StubRecognizer {
            name: "shazam",
            inflight: inflight.clone(),
            delay: Duration::from_millis(50),
        })];
        let dispatcher = Arc::new(ParallelDispatcher::new(recognizers, 3, 1, Duration::from_secs(1)));

        let first = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.recognize_parallel(b"pcm").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = dispatcher.recognize_parallel(b"pcm").await;
        assert!(second.is_empty());

        let first_results = first.await.unwrap();
        assert_eq!(first_results.len(), 1);
    }

    mockall::mock! {
        Recognizer {}

        #[async_trait]
        impl MusicRecognizer for Recognizer {
            fn provider_name(&self) -> &str;
            async fn recognize(&self, payload: &[u8], timeout: Duration) -> RecognitionResult;
        }
    }

    #[tokio::test]
    async fn result_from_recognizer_is_passed_through_unchanged() {
        let mut mock = MockRecognizer::new();
        mock.expect_provider_name().returning(|| "shazam");
        mock.expect_recognize()
            .returning(|_, _| RecognitionResult::no_match("shazam", Utc::now(), None));

        let recognizers: Vec<Arc<dyn MusicRecognizer>> = vec![Arc::new(mock)];
        let dispatcher = ParallelDispatcher::new(recognizers, 1, 1, Duration::from_secs(1));
        let results = dispatcher.recognize_parallel(b"pcm").await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].provider, "shazam");
    }
}
