//! Wall-clock abstraction for deterministic sessions and tests.

use chrono::{DateTime, Duration, Utc};

/// Source of "now" for the session runner.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    /// Always returns the same instant.
    Fixed(DateTime<Utc>),
    /// Starts at `base` and advances with the tokio clock, so paused-time
    /// tests see wall time move when they call `tokio::time::advance`.
    Tokio {
        base: DateTime<Utc>,
        origin: tokio::time::Instant,
    },
}

impl Clock {
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// A clock anchored at `base` that follows tokio time from here on.
    #[must_use]
    pub fn tokio_anchored(base: DateTime<Utc>) -> Self {
        Self::Tokio {
            base,
            origin: tokio::time::Instant::now(),
        }
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
            Clock::Tokio { base, origin } => {
                let elapsed = Duration::from_std(origin.elapsed()).unwrap_or_else(|_| Duration::zero());
                *base + elapsed
            }
        }
    }
}

/// Deterministic timestamp for tests (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns the deterministic test timestamp.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_never_moves() {
        let clock = Clock::fixed(fixed_now());
        assert_eq!(clock.now(), fixed_now());
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(clock.now(), fixed_now());
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let clock = Clock::tokio_anchored(fixed_now());
        tokio::time::advance(std::time::Duration::from_secs(5)).await;
        assert_eq!(clock.now(), fixed_now() + Duration::seconds(5));
    }
}
