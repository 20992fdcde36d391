//! Platform trait definitions

use std::time::Duration;

/// Microseconds per millisecond
pub const MICROS_PER_MILLI: u64 = 1_000;

/// Monotonic time source
///
/// Implementations must never go backwards. A `u64` microsecond counter does
/// not wrap within any realistic device uptime.
pub trait Clock {
    /// Microseconds elapsed since an arbitrary fixed origin
    fn now_micros(&self) -> u64;

    /// Whole milliseconds elapsed, truncated
    fn now_millis(&self) -> u64 {
        self.now_micros() / MICROS_PER_MILLI
    }

    /// Elapsed milliseconds with sub-millisecond precision
    fn now_millis_f64(&self) -> f64 {
        self.now_micros() as f64 / MICROS_PER_MILLI as f64
    }
}

/// Cooperative delay primitive
pub trait Scheduler {
    /// Yield the current task for at least `duration`
    fn delay(&self, duration: Duration);

    /// Park the calling task forever, waking once per `period`
    fn idle_forever(&self, period: Duration) -> ! {
        tracing::info!(period_ms = period.as_millis() as u64, "Entering idle loop");
        loop {
            self.delay(period);
        }
    }
}
