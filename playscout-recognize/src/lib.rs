//! The recognizer contract and its two concrete providers.

pub mod error;
pub mod fingerprint_api;
pub mod recognizer;
pub mod signal_matching;
pub mod types;

pub use error::{RecognizeError, Result};
pub use fingerprint_api::FingerprintApiRecognizer;
pub use recognizer::MusicRecognizer;
pub use signal_matching::SignalMatchingRecognizer;
pub use types::RecognitionResult;
