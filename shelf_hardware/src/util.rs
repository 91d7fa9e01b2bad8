use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Wait until the `ready` predicate becomes true, or a timeout expires.
///
/// Returns the instant at which the predicate was first observed true, which
/// the ultrasonic driver uses to time echo edges. A zero `poll_interval`
/// spins instead of sleeping.
pub fn wait_until_with_timeout(
    mut ready: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Instant> {
    let deadline = Instant::now() + timeout;
    loop {
        if ready() {
            return Ok(Instant::now());
        }
        if Instant::now() >= deadline {
            return Err(HwError::Timeout);
        }
        if poll_interval.is_zero() {
            std::hint::spin_loop();
        } else {
            std::thread::sleep(poll_interval);
        }
    }
}

/// Convert an echo round-trip time to a one-way distance in millimeters,
/// using 343 m/s for the speed of sound.
#[inline]
pub fn echo_us_to_mm(round_trip_us: u64) -> u32 {
    let mm = round_trip_us.saturating_mul(343) / 2000;
    u32::try_from(mm).unwrap_or(u32::MAX)
}
