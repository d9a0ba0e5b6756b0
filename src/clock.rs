use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Source of "now" for keystroke timestamps and elapsed time
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Wall clock backed by `Instant::now`
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Used to make timings deterministic.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// The instant this clock reads as zero
    pub fn base(&self) -> Instant {
        self.base
    }

    /// Move the clock to `secs` seconds past its base
    pub fn set_secs(&self, secs: f64) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset = secs_to_duration(secs);
    }

    pub fn advance_secs(&self, secs: f64) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += secs_to_duration(secs);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.base + *offset
    }
}

/// Nearest whole nanosecond, so offsets like 0.3s land exactly on 300ms
fn secs_to_duration(secs: f64) -> Duration {
    Duration::from_nanos((secs.max(0.0) * 1e9).round() as u64)
}

/// Seconds from `start` to `end`, zero if `end` is earlier
pub fn secs_between(start: Instant, end: Instant) -> f64 {
    end.saturating_duration_since(start).as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_starts_at_base() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), clock.base());
    }

    #[test]
    fn manual_clock_set_and_advance() {
        let clock = ManualClock::new();
        clock.set_secs(1.5);
        assert!((secs_between(clock.base(), clock.now()) - 1.5).abs() < 1e-9);

        clock.advance_secs(0.25);
        assert!((secs_between(clock.base(), clock.now()) - 1.75).abs() < 1e-9);
    }

    #[test]
    fn manual_clock_lands_on_whole_nanos() {
        let clock = ManualClock::new();
        clock.set_secs(0.3);
        assert_eq!(clock.now() - clock.base(), Duration::from_millis(300));
        clock.advance_secs(0.1);
        assert_eq!(clock.now() - clock.base(), Duration::from_millis(400));
    }

    #[test]
    fn secs_between_saturates() {
        let clock = ManualClock::new();
        clock.set_secs(2.0);
        assert_eq!(secs_between(clock.now(), clock.base()), 0.0);
    }
}
