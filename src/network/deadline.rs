//! Deadline arithmetic for the receive loop
//!
//! The receive loop waits against one absolute deadline computed when the
//! call starts; every wakeup recomputes the remaining time so repeated
//! partial-readiness rounds can never extend the wait past the configured
//! bound.

use std::time::{SystemTime, UNIX_EPOCH};

pub const MICROS_PER_SEC: i64 = 1_000_000;

/// A wall-clock instant or duration as whole seconds plus microseconds.
///
/// Microseconds are normalized to `[0, 1_000_000)` by [`Timestamp::new`];
/// [`subtract`] also renormalizes inputs that arrive malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub secs: i64,
    pub usecs: i64,
}

impl Timestamp {
    /// Build a timestamp, carrying excess microseconds into seconds.
    pub fn new(secs: i64, usecs: i64) -> Self {
        let mut stamp = Timestamp { secs, usecs };
        if stamp.usecs >= MICROS_PER_SEC {
            stamp.secs += stamp.usecs / MICROS_PER_SEC;
            stamp.usecs %= MICROS_PER_SEC;
        }
        stamp
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        // The engine never runs with a pre-1970 clock; treat that as zero.
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp {
            secs: since_epoch.as_secs() as i64,
            usecs: i64::from(since_epoch.subsec_micros()),
        }
    }

    fn add(self, other: Timestamp) -> Timestamp {
        Timestamp::new(self.secs + other.secs, self.usecs + other.usecs)
    }
}

/// Compute `deadline - now`.
///
/// Borrows a second when the microsecond subtrahend exceeds the minuend and
/// renormalizes when the raw microsecond difference exceeds one second.
/// Returns `expired = true` when the deadline lies before `now` (seconds
/// comparison primary, microseconds tie-break); the remaining duration is
/// meaningless in that case.
pub fn subtract(deadline: Timestamp, mut now: Timestamp) -> (Timestamp, bool) {
    if deadline.usecs < now.usecs {
        let borrow = (now.usecs - deadline.usecs) / MICROS_PER_SEC + 1;
        now.usecs -= MICROS_PER_SEC * borrow;
        now.secs += borrow;
    }
    if deadline.usecs - now.usecs > MICROS_PER_SEC {
        let carry = (deadline.usecs - now.usecs) / MICROS_PER_SEC;
        now.usecs += MICROS_PER_SEC * carry;
        now.secs -= carry;
    }

    let remaining = Timestamp {
        secs: deadline.secs - now.secs,
        usecs: deadline.usecs - now.usecs,
    };
    (remaining, deadline.secs < now.secs)
}

/// Absolute instant beyond which a receive attempt reports no reply.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires: Timestamp,
}

impl Deadline {
    /// Deadline `timeout` from now.
    pub fn after(timeout: Timestamp) -> Self {
        Deadline {
            expires: Timestamp::now().add(timeout),
        }
    }

    /// Time left until expiry, or `None` once the deadline has passed.
    pub fn remaining(&self) -> Option<Timestamp> {
        let (left, expired) = subtract(self.expires, Timestamp::now());
        if expired {
            None
        } else {
            Some(left)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64, usecs: i64) -> Timestamp {
        Timestamp { secs, usecs }
    }

    #[test]
    fn test_simple_difference() {
        let (left, expired) = subtract(ts(10, 500_000), ts(8, 200_000));
        assert!(!expired);
        assert_eq!(left, ts(2, 300_000));
    }

    #[test]
    fn test_borrow_from_seconds() {
        let (left, expired) = subtract(ts(10, 100_000), ts(8, 900_000));
        assert!(!expired);
        assert_eq!(left, ts(1, 200_000));
    }

    #[test]
    fn test_equal_instants_are_not_expired() {
        let (left, expired) = subtract(ts(5, 42), ts(5, 42));
        assert!(!expired);
        assert_eq!(left, ts(0, 0));
    }

    #[test]
    fn test_expired_by_seconds() {
        let (_, expired) = subtract(ts(4, 999_999), ts(5, 0));
        assert!(expired);
    }

    #[test]
    fn test_expired_by_microsecond_tiebreak() {
        let (_, expired) = subtract(ts(5, 100_000), ts(5, 100_001));
        assert!(expired);
        let (_, expired) = subtract(ts(5, 100_001), ts(5, 100_000));
        assert!(!expired);
    }

    #[test]
    fn test_renormalizes_malformed_minuend() {
        // 2.5 million microseconds is malformed on purpose.
        let (left, expired) = subtract(ts(3, 2_500_000), ts(3, 100_000));
        assert!(!expired);
        assert_eq!(left.secs * MICROS_PER_SEC + left.usecs, 2_400_000);
    }

    #[test]
    fn test_exhaustive_small_grid() {
        // Every pair over a small grid of normalized stamps must agree with
        // plain integer arithmetic on total microseconds.
        let points = [
            ts(0, 0),
            ts(0, 1),
            ts(0, 999_999),
            ts(1, 0),
            ts(1, 500_000),
            ts(2, 999_999),
        ];
        for deadline in points {
            for now in points {
                let (left, expired) = subtract(deadline, now);
                let d_total = deadline.secs * MICROS_PER_SEC + deadline.usecs;
                let n_total = now.secs * MICROS_PER_SEC + now.usecs;
                assert_eq!(expired, d_total < n_total, "{deadline:?} - {now:?}");
                if !expired {
                    assert_eq!(
                        left.secs * MICROS_PER_SEC + left.usecs,
                        d_total - n_total,
                        "{deadline:?} - {now:?}"
                    );
                    assert!(left.usecs >= 0 && left.usecs < MICROS_PER_SEC);
                }
            }
        }
    }

    #[test]
    fn test_timestamp_new_normalizes() {
        let stamp = Timestamp::new(1, 2_300_000);
        assert_eq!(stamp, ts(3, 300_000));
    }

    #[test]
    fn test_deadline_counts_down() {
        let deadline = Deadline::after(Timestamp::new(60, 0));
        let left = deadline.remaining().unwrap();
        assert!(left.secs <= 60);
        assert!(left.secs >= 59);
    }

    #[test]
    fn test_deadline_expires_immediately_on_zero_timeout() {
        let deadline = Deadline::after(Timestamp::new(0, 0));
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(deadline.remaining().is_none());
    }
}
