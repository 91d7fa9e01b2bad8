//! Common time and rounding helpers for shelf_core.

use std::time::{Duration, Instant};

/// Number of millimeters in one centimeter.
pub const MM_PER_CM: u64 = 10;

/// Non-blocking periodic timer polled from the control loop.
///
/// The first `due` call fires immediately. Firing re-arms from the observed
/// instant, so a late poll never produces a burst of catch-up ticks.
#[derive(Debug, Clone)]
pub struct Interval {
    period: Duration,
    last: Option<Instant>,
}

impl Interval {
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// True when a period has elapsed since the last firing; re-arms on true.
    pub fn due(&mut self, now: Instant) -> bool {
        let fire = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.period,
        };
        if fire {
            self.last = Some(now);
        }
        fire
    }

    /// Restart the period from `now`.
    pub fn reset(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

/// Mean of `n` millimeter samples expressed in tenths of a centimeter
/// (i.e. whole millimeters), rounding halves up.
///
/// Returns `None` for an empty set.
#[inline]
pub fn mean_mm_round_half_up(sum_mm: u64, n: u64) -> Option<u64> {
    if n == 0 {
        return None;
    }
    Some((sum_mm * 2 + n) / (n * 2))
}

/// Convert whole millimeters to centimeters with one decimal.
#[inline]
pub fn mm_to_cm(mm: u64) -> f32 {
    // Precision loss only above 2^24 mm, far beyond any ranger.
    #[allow(clippy::cast_precision_loss)]
    let cm = mm as f32 / MM_PER_CM as f32;
    cm
}
