//! Repository traits and their sqlite implementations.
//!
//! Each is a thin `Arc<SqlitePool>`-holding struct exposing exactly the
//! operations the pipeline's hot path and diagnostics reads need. Plain
//! `sqlx::query!`/`query_as!` against the pool; no cross-platform adapter
//! abstraction — this daemon only ever runs against native SQLite.

mod play;
mod recognition;
mod stream;
mod track;

pub use play::{PlayRepository, SqlitePlayRepository};
pub use recognition::{RecognitionRecord, RecognitionRepository, SqliteRecognitionRepository};
pub use stream::{SqliteStreamRepository, StreamRepository};
pub use track::{SqliteTrackRepository, TrackRepository};
