//! Sensor clock domain.

use kz_core::TimestampNs;
use tokio::time::Instant;

/// Monotonic nanosecond clock shared by simulated sensors and trigger
/// sources, so trigger timestamps and sensor timestamps are comparable.
///
/// Built on `tokio::time::Instant`, so paused test runtimes drive it.
#[derive(Debug, Clone, Copy)]
pub struct SensorClock {
    origin: Instant
}

impl SensorClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now()
        }
    }

    pub fn now_ns(&self) -> TimestampNs {
        self.at(Instant::now())
    }

    /// Converts an instant into the clock domain. Instants before the origin
    /// map to zero.
    pub fn at(&self, instant: Instant) -> TimestampNs {
        let elapsed = instant.saturating_duration_since(self.origin);
        i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX)
    }
}

impl Default for SensorClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_runtime_time() {
        let clock = SensorClock::new();
        let before = clock.now_ns();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(clock.now_ns() - before, 50_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_instants_before_origin_saturate() {
        let early = Instant::now();
        tokio::time::advance(Duration::from_millis(5)).await;
        let clock = SensorClock::new();
        assert_eq!(clock.at(early), 0);
    }
}
