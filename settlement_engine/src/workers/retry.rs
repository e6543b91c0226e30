use std::time::Duration;

use thiserror::Error;

/// Retry schedule for the background workers. An event gets one initial attempt plus up to `max_retries`
/// retries; retry `i` waits `intervals[i]` first.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    intervals: Vec<Duration>,
}

#[derive(Debug, Clone, Error)]
pub enum RetryPolicyError {
    #[error("The retry schedule has {supplied} intervals but allows {max_retries} retries")]
    NotEnoughIntervals { supplied: usize, max_retries: u32 },
    #[error("Retry intervals must be non-decreasing, but interval {index} is shorter than its predecessor")]
    DecreasingIntervals { index: usize },
}

impl RetryPolicy {
    pub fn new(max_retries: u32, intervals: Vec<Duration>) -> Result<Self, RetryPolicyError> {
        if intervals.len() < max_retries as usize {
            return Err(RetryPolicyError::NotEnoughIntervals { supplied: intervals.len(), max_retries });
        }
        if let Some(index) = intervals.windows(2).position(|w| w[1] < w[0]) {
            return Err(RetryPolicyError::DecreasingIntervals { index: index + 1 });
        }
        Ok(Self { max_retries, intervals })
    }

    /// A schedule suitable for tests: instant retries.
    pub fn no_delay(max_retries: u32) -> Self {
        Self { max_retries, intervals: vec![Duration::ZERO; max_retries as usize] }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// The backoff before retry number `retry` (zero-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let last = self.intervals.len().saturating_sub(1);
        self.intervals.get((retry as usize).min(last)).copied().unwrap_or(Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            intervals: [1, 5, 15, 30, 60].into_iter().map(Duration::from_secs).collect(),
        }
    }
}
