use std::time::Duration;

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// A reading of the monotonic clock, kept as whole seconds plus nanoseconds
/// so differences are exact integer arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stamp {
    secs: u64,
    nanos: u32,
}

impl Stamp {
    pub fn new(secs: u64, nanos: u32) -> Self {
        debug_assert!(nanos < NANOS_PER_SEC);
        Self { secs, nanos }
    }

    pub fn now() -> Self {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // CLOCK_MONOTONIC cannot fail with a valid timespec pointer.
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
        }
        Self::new(ts.tv_sec as u64, ts.tv_nsec as u32)
    }

    /// Time from `start` to `self`, borrowing a second when the nanosecond
    /// part underflows. Saturates to zero if `start` is later.
    pub fn since(self, start: Stamp) -> Duration {
        if self <= start {
            return Duration::ZERO;
        }
        let mut secs = self.secs - start.secs;
        let nanos = if self.nanos < start.nanos {
            secs -= 1;
            self.nanos + NANOS_PER_SEC - start.nanos
        } else {
            self.nanos - start.nanos
        };
        Duration::new(secs, nanos)
    }
}
