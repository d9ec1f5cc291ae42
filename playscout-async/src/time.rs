//! Time-related operations.

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};
pub use tokio::time::{interval, sleep, sleep_until, timeout, Instant, Interval, Sleep, Timeout};
