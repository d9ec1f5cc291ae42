//! SQLite-backed persistence for the recognition pipeline.
//!
//! Owns the `tracks`/`streams`/`recognitions`/`plays` schema, connection
//! pool construction, and the repository functions C6 through C8 call on
//! the hot path.

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{Result, StoreError};
pub use models::{Play, Recognition, Stream, Track};
pub use repositories::{PlayRepository, RecognitionRepository, StreamRepository, TrackRepository};
