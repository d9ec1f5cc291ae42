//! Process-wide runtime infrastructure: configuration and logging init.
//!
//! Configuration *loading* (env vars, files, validation) is an external
//! collaborator's job — this crate only defines the shape the rest of the
//! pipeline is built against, already validated by the time it arrives here.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{PipelineConfig, StreamDescriptor};
pub use error::{Error, Result};
