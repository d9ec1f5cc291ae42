use async_trait::async_trait;
use std::time::Duration;

use crate::types::RecognitionResult;

/// A music recognizer: given a self-contained audio payload, produce exactly
/// one [`RecognitionResult`] within `timeout`. Never returns `Err` for
/// provider-side failures — those are folded into the result's
/// `error_message`. `Err` is reserved for bugs in the caller (e.g. a timeout
/// value of zero), which should not occur in practice.
#[async_trait]
pub trait MusicRecognizer: Send + Sync {
    fn provider_name(&self) -> &str;

    async fn recognize(&self, payload: &[u8], timeout: Duration) -> RecognitionResult;
}
