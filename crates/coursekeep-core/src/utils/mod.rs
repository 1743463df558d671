//! Small stateless helpers: identifiers, shape checks, rounding, delays and retry.

pub mod checks;
pub mod format;
pub mod retry;

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;

pub use checks::{is_valid_email, is_valid_name, is_valid_phone};
pub use format::{decode_html, encode_html, format_hours, format_progress, truncate_string};
pub use retry::{Backoff, RetryPolicy};

/// Generate a new unique entity identifier
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Suspend the current task for `duration`. A zero duration returns immediately.
pub async fn delay(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

/// Random integer in the inclusive range
pub fn random_increment(range: RangeInclusive<u32>) -> u32 {
    rand::thread_rng().gen_range(range)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(42.456), 42.46);
        assert_eq!(round2(42.454), 42.45);
        assert_eq!(round2(100.0), 100.0);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn test_generate_id_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_random_increment_bounds() {
        for _ in 0..200 {
            let n = random_increment(3..=20);
            assert!((3..=20).contains(&n));
        }
    }

    #[tokio::test]
    async fn test_delay_zero_returns() {
        delay(Duration::ZERO).await;
    }
}
