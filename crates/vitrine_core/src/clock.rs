//! Monotonic animation clock.

use std::time::Instant;

/// Elapsed-time source for the frame loop. Starts when created.
#[derive(Debug, Clone)]
pub struct Clock {
    start: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Clock whose zero point is `start`.
    pub fn starting_at(start: Instant) -> Self {
        Self { start }
    }

    /// Seconds since the clock started.
    pub fn elapsed_time(&self) -> f32 {
        self.elapsed_at(Instant::now())
    }

    /// Seconds between the clock start and `now` (zero if `now` is earlier).
    pub fn elapsed_at(&self, now: Instant) -> f32 {
        now.saturating_duration_since(self.start).as_secs_f32()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_elapsed_is_monotonic() {
        let clock = Clock::new();
        let a = clock.elapsed_time();
        let b = clock.elapsed_time();
        assert!(a >= 0.0);
        assert!(b >= a);
    }

    #[test]
    fn test_elapsed_at_offsets() {
        let start = Instant::now();
        let clock = Clock::starting_at(start);
        let t = clock.elapsed_at(start + Duration::from_millis(1500));
        assert!((t - 1.5).abs() < 1e-4);
        assert_eq!(clock.elapsed_at(start), 0.0);
    }
}
