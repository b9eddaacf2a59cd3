use rand::{thread_rng, Rng};
use std::time::Duration;

/// Exponential backoff bounds, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { initial_delay_ms: 1_000, max_delay_ms: 30_000 }
    }
}

impl Backoff {
    pub fn new(initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self { initial_delay_ms, max_delay_ms }
    }

    /// Delay to wait after the given 0-based retry attempt failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut thread_rng())
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        // exponential backoff with up to 10% jitter
        let exp = self
            .initial_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let spread = exp / 10;
        let jitter = if spread == 0 { 0 } else { rng.gen_range(0..spread) };
        let ms = exp.saturating_add(jitter).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}
