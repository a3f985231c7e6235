use core::mem::MaybeUninit;
use core::time::Duration;

use crate::error::{Error, Result};

use super::errno;

const NANOS_PER_SEC: libc::c_long = 1_000_000_000;

/// Reads `CLOCK_REALTIME`, the clock `sem_timedwait` measures its deadline against.
pub fn realtime_now() -> Result<libc::timespec> {
    let mut now = MaybeUninit::<libc::timespec>::uninit();

    // SAFETY: `now` is valid for writes of a `timespec`.
    let res = unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, now.as_mut_ptr()) };
    if res != 0 {
        return Err(Error::Os(errno()));
    }

    // SAFETY: `clock_gettime` succeeded and filled `now`.
    Ok(unsafe { now.assume_init() })
}

/// Returns the absolute time `timeout` after `now`.
///
/// The nanosecond field of the result is always in `[0, 1_000_000_000)`, with the excess
/// carried into seconds. Seconds saturate at `time_t::MAX` instead of wrapping.
pub fn deadline_after(now: libc::timespec, timeout: Duration) -> libc::timespec {
    // Both terms are below one second, the sum fits in a 32-bit `c_long`.
    let mut nanos = now.tv_nsec + timeout.subsec_nanos() as libc::c_long;
    let mut secs = now.tv_sec;

    if nanos >= NANOS_PER_SEC {
        nanos -= NANOS_PER_SEC;
        secs = secs.saturating_add(1);
    }

    let whole = libc::time_t::try_from(timeout.as_secs()).unwrap_or(libc::time_t::MAX);
    secs = secs.saturating_add(whole);

    timespec(secs, nanos)
}

/// Builds a `timespec` without naming the private padding fields some targets carry.
pub fn timespec(secs: libc::time_t, nanos: libc::c_long) -> libc::timespec {
    // SAFETY: `timespec` is plain old data, all zeroes is a valid value.
    let mut ts: libc::timespec = unsafe { core::mem::zeroed() };
    ts.tv_sec = secs;
    ts.tv_nsec = nanos;
    ts
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{deadline_after, realtime_now, timespec, NANOS_PER_SEC};

    #[test]
    fn test_deadline_without_carry() {
        let deadline = deadline_after(timespec(10, 100), Duration::from_nanos(900));
        assert_eq!((deadline.tv_sec, deadline.tv_nsec), (10, 1_000));
    }

    #[test]
    fn test_deadline_carries_into_seconds() {
        let deadline = deadline_after(timespec(10, 999_999_999), Duration::from_nanos(1));
        assert_eq!((deadline.tv_sec, deadline.tv_nsec), (11, 0));

        let deadline = deadline_after(timespec(0, 500_000_000), Duration::from_millis(2_700));
        assert_eq!((deadline.tv_sec, deadline.tv_nsec), (3, 200_000_000));
    }

    #[test]
    fn test_deadline_nanos_always_normalized() {
        let starts = [0, 1, 499_999_999, 500_000_000, 999_999_999];
        let timeouts = [0, 1, 999_999_999, 1_000_000_000, 1_500_000_001, 7_999_999_999];

        for start in starts {
            for timeout in timeouts {
                let deadline = deadline_after(timespec(100, start), Duration::from_nanos(timeout));
                assert!((0..NANOS_PER_SEC).contains(&deadline.tv_nsec));

                let total = deadline.tv_sec as i128 * 1_000_000_000 + deadline.tv_nsec as i128;
                let expected = 100i128 * 1_000_000_000 + start as i128 + timeout as i128;
                assert_eq!(total, expected);
            }
        }
    }

    #[test]
    fn test_deadline_saturates() {
        let deadline = deadline_after(timespec(libc::time_t::MAX, 999_999_999), Duration::MAX);
        assert_eq!(deadline.tv_sec, libc::time_t::MAX);
        assert!(deadline.tv_nsec < NANOS_PER_SEC);
    }

    #[test]
    fn test_realtime_now() {
        let now = realtime_now().unwrap();
        assert!(now.tv_sec > 0);
        assert!((0..NANOS_PER_SEC).contains(&now.tv_nsec));
    }
}
