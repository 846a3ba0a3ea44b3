//! Rolling throughput history of a worker channel.

use std::collections::VecDeque;
use std::time::Duration;

use broker_core::constants::{DEFAULT_READY_DELAY, THROUGHPUT_WINDOW};
use chrono::{DateTime, Utc};

/// One completed batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkTracker {
    pub chunk_count: usize,
    pub elapsed: Duration,
}

/// The most recent [`THROUGHPUT_WINDOW`] batches of a channel. The oldest sample is
/// evicted when a new one would overflow the window.
#[derive(Clone, Debug, Default)]
pub struct ThroughputWindow {
    samples: VecDeque<ChunkTracker>,
}

impl ThroughputWindow {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(THROUGHPUT_WINDOW + 1),
        }
    }

    pub fn record(&mut self, chunk_count: usize, elapsed: Duration) {
        self.samples.push_back(ChunkTracker {
            chunk_count,
            elapsed,
        });
        while self.samples.len() > THROUGHPUT_WINDOW {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = &ChunkTracker> {
        self.samples.iter()
    }

    /// Expected time to process `num_chunks` more chunks.
    ///
    /// Uses the average time per chunk over the window, or [`DEFAULT_READY_DELAY`]
    /// when there is no history to go on.
    pub fn expected_delay(&self, num_chunks: usize) -> Duration {
        let total_chunks: usize = self.samples.iter().map(|s| s.chunk_count).sum();
        if total_chunks == 0 {
            return DEFAULT_READY_DELAY;
        }
        let total_nanos: u128 = self.samples.iter().map(|s| s.elapsed.as_nanos()).sum();
        let per_chunk = total_nanos / total_chunks as u128;
        let delay = per_chunk.saturating_mul(num_chunks as u128);
        Duration::from_nanos(u64::try_from(delay).unwrap_or(u64::MAX))
    }

    /// When a channel starting `num_chunks` now is expected to be free again.
    pub fn estimate_at(&self, now: DateTime<Utc>, num_chunks: usize) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.expected_delay(num_chunks))
            .unwrap_or(chrono::Duration::MAX);
        now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn estimate(&self, num_chunks: usize) -> DateTime<Utc> {
        self.estimate_at(Utc::now(), num_chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cold_start_uses_default_delay() {
        let window = ThroughputWindow::new();
        let now = Utc::now();
        assert_eq!(
            window.estimate_at(now, 25),
            now + chrono::Duration::seconds(10)
        );

        let before = Utc::now();
        let estimate = window.estimate(1);
        let after = Utc::now();
        assert!(estimate >= before + chrono::Duration::seconds(10));
        assert!(estimate <= after + chrono::Duration::seconds(10));
    }

    #[test]
    fn test_estimate_averages_time_per_chunk() {
        let mut window = ThroughputWindow::new();
        window.record(10, Duration::from_secs(1));
        window.record(20, Duration::from_secs(2));

        assert_eq!(window.expected_delay(15), Duration::from_millis(1500));
        let now = Utc::now();
        assert_eq!(
            window.estimate_at(now, 15),
            now + chrono::Duration::milliseconds(1500)
        );
    }

    #[test]
    fn test_window_evicts_oldest_sample() {
        let mut window = ThroughputWindow::new();
        window.record(1, Duration::from_secs(100));
        for _ in 0..10 {
            window.record(1, Duration::from_secs(1));
        }

        assert_eq!(window.len(), 10);
        assert!(window
            .samples()
            .all(|s| s.elapsed == Duration::from_secs(1)));
        assert_eq!(window.expected_delay(3), Duration::from_secs(3));
    }

    #[test]
    fn test_zero_chunk_samples_fall_back_to_default() {
        let mut window = ThroughputWindow::new();
        window.record(0, Duration::from_secs(5));
        assert_eq!(window.expected_delay(4), DEFAULT_READY_DELAY);
    }
}
