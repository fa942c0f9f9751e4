//! Retry and re-check delays.

use std::time::Duration;

/// Largest exponent used by [`retry_delay`] (2^11 = 2048 seconds).
pub const MAX_RETRY_EXPONENT: u32 = 11;

/// Largest exponent used by [`check_delay`], i.e. at most 8 × interval.
const MAX_CHECK_EXPONENT: u32 = 3;

/// Delay before the next delivery attempt: 2^attempt seconds, capped at
/// 2^11.
pub fn retry_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempt.min(MAX_RETRY_EXPONENT)))
}

/// Delay before the next confirmation check after `failures` consecutive
/// transient errors: `interval · 2^failures`, capped at 8 × interval.
pub fn check_delay(interval: Duration, failures: u32) -> Duration {
    interval.saturating_mul(1 << failures.min(MAX_CHECK_EXPONENT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_calculation() {
        assert_eq!(retry_delay(0), Duration::from_secs(1));
        assert_eq!(retry_delay(1), Duration::from_secs(2));
        assert_eq!(retry_delay(2), Duration::from_secs(4));
        assert_eq!(retry_delay(10), Duration::from_secs(1024));
        assert_eq!(retry_delay(11), Duration::from_secs(2048));
        // Max capped at 11
        assert_eq!(retry_delay(12), Duration::from_secs(2048));
        assert_eq!(retry_delay(100), Duration::from_secs(2048));
    }

    #[test]
    fn test_check_delay_backs_off() {
        let interval = Duration::from_secs(15);
        assert_eq!(check_delay(interval, 0), interval);
        assert_eq!(check_delay(interval, 1), Duration::from_secs(30));
        assert_eq!(check_delay(interval, 3), Duration::from_secs(120));
        assert_eq!(check_delay(interval, 40), Duration::from_secs(120));
    }
}
