use std::thread;
use std::time::{Duration, Instant};

/// Time source for timers, uptime and every bounded wait in the node.
///
/// Components never call `Instant::now()` or `thread::sleep` directly, so a
/// whole association attempt or calibration run can be replayed in tests
/// without real time passing.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        u64::try_from(dur.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Wall-clock implementation used on the device.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            thread::sleep(d);
        }
    }
}

#[cfg(any(test, feature = "test-clock"))]
pub mod test_clock {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Elapsed {
        offset: Duration,
        slept: Duration,
    }

    /// Manually driven clock. `sleep` returns at once and moves time forward.
    ///
    /// Clones share one timeline, so a clone handed to the code under test
    /// can be advanced from the test body.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        state: Arc<Mutex<Elapsed>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                state: Arc::new(Mutex::new(Elapsed::default())),
            }
        }

        /// Move time forward without counting it as sleep.
        pub fn advance(&self, d: Duration) {
            if let Ok(mut st) = self.state.lock() {
                st.offset = st.offset.saturating_add(d);
            }
        }

        /// Sum of every duration passed to `sleep()`.
        pub fn total_slept(&self) -> Duration {
            self.state.lock().map(|st| st.slept).unwrap_or(Duration::ZERO)
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            let offset = self.state.lock().map(|st| st.offset).unwrap_or(Duration::ZERO);
            self.origin + offset
        }

        fn sleep(&self, d: Duration) {
            if let Ok(mut st) = self.state.lock() {
                st.offset = st.offset.saturating_add(d);
                st.slept = st.slept.saturating_add(d);
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn sleep_advances_without_blocking() {
            let clock = TestClock::new();
            let t0 = clock.now();
            clock.sleep(Duration::from_secs(60));
            assert_eq!(clock.ms_since(t0), 60_000);
            assert_eq!(clock.total_slept(), Duration::from_secs(60));
        }

        #[test]
        fn advance_is_not_sleep() {
            let a = TestClock::new();
            let b = a.clone();
            let t0 = a.now();
            b.advance(Duration::from_millis(250));
            assert_eq!(a.ms_since(t0), 250);
            assert_eq!(a.total_slept(), Duration::ZERO);
        }
    }
}
