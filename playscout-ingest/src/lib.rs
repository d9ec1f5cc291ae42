//! Window scheduling and two-hit aggregation (C2 + C5): turns a stream of PCM
//! bytes into hop-aligned [`AudioWindow`]s, and turns a stream of per-window
//! recognition results into confirmed plays.

pub mod aggregator;
pub mod clock;
pub mod scheduler;

pub use aggregator::TwoHitAggregator;
pub use clock::{Clock, SystemClock};
pub use scheduler::{AudioWindow, WindowScheduler};
