//! Hop-aligned window scheduling.
//!
//! Windows start at wall-clock instants that are multiples of `hop_seconds`
//! from the epoch, are strictly disjoint (`hop_seconds > window_seconds` is
//! enforced by [`playscout_runtime::PipelineConfig::validate`]), and discard
//! any PCM buffered past a window's boundary rather than carrying it forward.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::clock::Clock;

#[derive(Debug, Clone)]
pub struct AudioWindow {
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub payload: Vec<u8>,
}

impl AudioWindow {
    pub fn duration_seconds(&self) -> i64 {
        (self.end_utc - self.start_utc).num_seconds()
    }
}

pub struct WindowScheduler {
    clock: Arc<dyn Clock>,
    window_seconds: u32,
    hop_seconds: u32,
}

impl WindowScheduler {
    pub fn new(clock: Arc<dyn Clock>, window_seconds: u32, hop_seconds: u32) -> Self {
        Self {
            clock,
            window_seconds,
            hop_seconds,
        }
    }

    /// The smallest hop-aligned instant `>= now` whose window won't overshoot
    /// already-elapsed time.
    pub fn next_window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let epoch_seconds = now.timestamp();
        let hop = self.hop_seconds as i64;
        let mut boundary = (epoch_seconds / hop) * hop;
        if epoch_seconds >= boundary + self.window_seconds as i64 {
            boundary += hop;
        }
        Utc.timestamp_opt(boundary, 0).single().expect("valid timestamp")
    }

    /// Waits until `window_start + window_seconds`, then emits a window
    /// covering `[window_start, window_start + window_seconds)` built from
    /// whatever bytes the caller accumulated during that span. Any bytes
    /// accumulated after the boundary belong to the next window, not this
    /// one, and must be discarded by the caller before the next call.
    pub async fn wait_for_window_close(&self, window_start: DateTime<Utc>) -> DateTime<Utc> {
        let window_end = window_start + chrono::Duration::seconds(self.window_seconds as i64);
        loop {
            let now = self.clock.now();
            if now >= window_end {
                return window_end;
            }
            let remaining = (window_end - now)
                .to_std()
                .unwrap_or(std::time::Duration::from_millis(10));
            self.clock.sleep(remaining).await;
        }
    }

    pub fn window_seconds(&self) -> u32 {
        self.window_seconds
    }

    pub fn hop_seconds(&self) -> u32 {
        self.hop_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct FixedClock;

    #[async_trait::async_trait]
    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        }
        async fn sleep(&self, _duration: std::time::Duration) {}
    }

    #[test]
    fn first_window_aligns_to_next_hop_boundary() {
        let scheduler = WindowScheduler::new(Arc::new(FixedClock), 12, 120);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 37, 0).unwrap();
        let start = scheduler.next_window_start(now);
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 12, 2, 0, 0).unwrap();
        assert_eq!(start, expected);
    }

    #[test]
    fn exact_hop_boundary_is_used_as_is() {
        let scheduler = WindowScheduler::new(Arc::new(FixedClock), 12, 120);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 2, 0, 0).unwrap();
        let start = scheduler.next_window_start(now);
        assert_eq!(start, now);
    }

    #[test]
    fn window_just_past_boundary_but_inside_window_length_is_not_advanced() {
        let scheduler = WindowScheduler::new(Arc::new(FixedClock), 12, 120);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 2, 5, 0).unwrap();
        let start = scheduler.next_window_start(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 1, 12, 2, 0, 0).unwrap());
    }
}
