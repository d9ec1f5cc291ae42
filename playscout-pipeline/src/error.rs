use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: &'static str,
        to: &'static str,
        reason: &'static str,
    },

    #[error("decoder error for stream {stream}: {source}")]
    Decode {
        stream: String,
        #[source]
        source: playscout_decode::DecodeError,
    },

    #[error("store error: {0}")]
    Store(#[from] playscout_store::StoreError),

    #[error("stream {0} is not registered")]
    UnknownStream(String),

    #[error("stream {0} already registered")]
    DuplicateStream(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
