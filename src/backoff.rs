//! Exponential backoff with full jitter.
//!
//! The n-th delay is `factor * base^n`, optionally capped, and the actual
//! sleep is drawn uniformly from `[0, delay]`.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current: u64,
    base: u64,
    factor: Duration,
    max_delay: Option<Duration>,
    jitter: bool,
}

impl ExponentialBackoff {
    /// Constructs a strategy growing by `base` on every attempt.
    pub const fn new(base: u64) -> ExponentialBackoff {
        ExponentialBackoff {
            current: 1,
            base,
            factor: Duration::from_millis(1),
            max_delay: None,
            jitter: true,
        }
    }

    /// The unit every delay is expressed in. Default is one millisecond.
    pub const fn factor(mut self, factor: Duration) -> ExponentialBackoff {
        self.factor = factor;
        self
    }

    /// No delay will be longer than `duration`.
    pub const fn max_delay(mut self, duration: Duration) -> ExponentialBackoff {
        self.max_delay = Some(duration);
        self
    }

    /// Sleep exactly the computed delay instead of a random fraction of it.
    pub const fn without_jitter(mut self) -> ExponentialBackoff {
        self.jitter = false;
        self
    }

    /// Upper bound of the next delay, before jitter.
    fn next_ceiling(&mut self) -> Duration {
        let factor_ms = u64::try_from(self.factor.as_millis()).unwrap_or(u64::MAX);
        let mut duration = Duration::from_millis(self.current.saturating_mul(factor_ms));

        if let Some(max_delay) = self.max_delay
            && duration > max_delay
        {
            duration = max_delay;
        }

        self.current = self.current.saturating_mul(self.base);
        duration
    }

    /// The next `Duration` to wait for.
    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self.next_ceiling();
        if !self.jitter {
            return ceiling;
        }

        let ceiling_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(fastrand::u64(0..=ceiling_ms))
    }

    pub async fn wait(&mut self) {
        let duration = self.next_delay();
        tokio::time::sleep(duration).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_base_2() {
        let mut s = ExponentialBackoff::new(2)
            .factor(Duration::from_secs(2))
            .without_jitter();

        assert_eq!(s.next_delay(), Duration::from_secs(2));
        assert_eq!(s.next_delay(), Duration::from_secs(4));
        assert_eq!(s.next_delay(), Duration::from_secs(8));
        assert_eq!(s.next_delay(), Duration::from_secs(16));
    }

    #[test]
    fn test_respects_max_delay() {
        let mut s = ExponentialBackoff::new(10)
            .factor(Duration::from_millis(10))
            .max_delay(Duration::from_millis(500))
            .without_jitter();

        assert_eq!(s.next_delay(), Duration::from_millis(10));
        assert_eq!(s.next_delay(), Duration::from_millis(100));
        assert_eq!(s.next_delay(), Duration::from_millis(500));
        assert_eq!(s.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_saturates_at_maximum_value() {
        let mut s = ExponentialBackoff::new(u64::MAX).without_jitter();

        assert_eq!(s.next_delay(), Duration::from_millis(1));
        assert_eq!(s.next_delay(), Duration::from_millis(u64::MAX));
        assert_eq!(s.next_delay(), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_jitter_stays_below_ceiling() {
        let mut s = ExponentialBackoff::new(2).factor(Duration::from_millis(100));
        for ceiling in [100, 200, 400, 800] {
            assert!(s.next_delay() <= Duration::from_millis(ceiling));
        }
    }
}
