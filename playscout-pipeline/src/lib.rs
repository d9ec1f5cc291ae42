//! Per-stream worker lifecycle (C7), parallel recognizer dispatch (C4), and
//! process-level fleet management (C8).

pub mod dispatch;
pub mod error;
pub mod manager;
pub mod worker;

pub use dispatch::ParallelDispatcher;
pub use error::{PipelineError, Result};
pub use manager::WorkerManager;
pub use worker::{StreamWorker, WorkerConfig, WorkerDeps, WorkerStatus};
