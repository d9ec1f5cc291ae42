//! Decoder subprocess supervision (C1): spawns the external RTSP decoder,
//! restarts it under exponential backoff on failure, and drains its stderr.

pub mod error;
pub mod runner;

pub use error::{DecodeError, Result};
pub use runner::{read_chunk, DecoderConfig, DecoderRunner};
