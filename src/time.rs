//! Monotonic time source.
//!
//! Timeout deadlines and timer expiry both read `CLOCK_MONOTONIC`, the same
//! clock io_uring interprets absolute timeouts against, so deadlines computed
//! here stay coherent with kernel-side timers.

use nix::time::{clock_gettime, ClockId};

/// Returns a monotonic reading in nanoseconds from an unspecified origin.
pub(crate) fn monotonic_nanos() -> u64 {
    // CLOCK_MONOTONIC is always available on the supported platforms.
    let ts = clock_gettime(ClockId::CLOCK_MONOTONIC)
        .expect("clock_gettime(CLOCK_MONOTONIC) failed");
    ts.tv_sec() as u64 * 1_000_000_000 + ts.tv_nsec() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readings_are_monotonic() {
        let a = monotonic_nanos();
        let b = monotonic_nanos();
        assert!(b >= a);
    }

    #[test]
    fn tracks_real_sleeps() {
        let before = monotonic_nanos();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let after = monotonic_nanos();
        assert!(after - before >= 2_000_000);
    }
}
