use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("recognizer timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("failed to generate audio fingerprint: {0}")]
    FingerprintFailed(String),

    #[error("failed to parse provider response: {0}")]
    ParseError(String),

    #[error("provider request failed after retries: status={status}, {message}")]
    ProviderError { status: u16, message: String },
}

pub type Result<T> = std::result::Result<T, RecognizeError>;
