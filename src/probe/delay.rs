//! Randomized inter-request delay.

use std::time::Duration;

use rand::Rng;

/// Inclusive bounds of the sleep drawn before every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min: Duration,
    max: Duration,
}

impl DelayRange {
    /// Bounds are swapped if given in the wrong order.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draw a delay uniformly from `[min, max]` at nanosecond granularity.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let nanos = rng.gen_range(self.min.as_nanos()..=self.max.as_nanos());
        from_nanos_u128(nanos)
    }
}

/// Both bounds came from a `Duration`, so the whole seconds fit a `u64`.
fn from_nanos_u128(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    Duration::new(
        (nanos / NANOS_PER_SEC) as u64,
        (nanos % NANOS_PER_SEC) as u32,
    )
}
