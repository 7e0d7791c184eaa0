//! Deadline-bounded receive-and-match loop
//!
//! The hardest part of the engine: block on several heterogeneous
//! descriptors at once, tolerate reads that carry zero, one, or many
//! candidate frames, and keep the total wait under one absolute deadline
//! no matter how many wakeups it takes. Candidates go to an externally
//! supplied matching predicate; the first accepted one is turned into a
//! reply and returned immediately.

use std::os::fd::{BorrowedFd, RawFd};

use nix::sys::select::{select, FdSet};
use nix::sys::time::TimeVal;

#[cfg(any(
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
    target_os = "macos",
    target_os = "ios"
))]
use crate::network::batch::{RecordCursor, OS_RECORD_LAYOUT};
use crate::network::deadline::{Deadline, Timestamp};

/// Wait on `fds` until a candidate satisfies `matches` or `timeout`
/// elapses, whichever comes first.
///
/// Each wait uses the time still remaining until the absolute deadline, so
/// the call blocks for at most `timeout` in total across however many
/// wait/read rounds it takes. Descriptors are inspected in the order given;
/// the first accepted candidate wins and ends the call even if later
/// descriptors are also ready. A failed wait, like an expired deadline,
/// yields `None`: from the protocol's point of view an absent reply is an
/// ordinary outcome, not an error.
///
/// Reads that return zero or fail contribute no candidate and do not end
/// the loop. On platforms whose capture devices batch several frames into
/// one read, each read is demultiplexed into per-record candidates first.
pub fn recv_match_loop<R, M, B>(
    fds: &[RawFd],
    read_len: usize,
    timeout: Timestamp,
    mut matches: M,
    mut build: B,
) -> Option<R>
where
    M: FnMut(&[u8]) -> bool,
    B: FnMut(&[u8]) -> R,
{
    let deadline = Deadline::after(timeout);
    let mut remaining = timeout;
    let mut scratch = vec![0u8; read_len.max(1)];

    loop {
        let mut readfds = FdSet::new();
        for &fd in fds {
            readfds.insert(unsafe { BorrowedFd::borrow_raw(fd) });
        }
        let mut wait = TimeVal::new(
            remaining.secs as libc::time_t,
            remaining.usecs as libc::suseconds_t,
        );

        let ready = match select(None, &mut readfds, None, None, &mut wait) {
            Ok(count) => count,
            Err(err) => {
                tracing::debug!(%err, "wait failed, reporting no reply");
                return None;
            }
        };

        if ready > 0 {
            for &fd in fds {
                if !readfds.contains(unsafe { BorrowedFd::borrow_raw(fd) }) {
                    continue;
                }
                let size = unsafe {
                    libc::read(fd, scratch.as_mut_ptr() as *mut libc::c_void, scratch.len())
                };
                if size <= 0 {
                    // No candidate from this descriptor this round.
                    continue;
                }
                let data = &scratch[..size as usize];

                #[cfg(any(
                    target_os = "freebsd",
                    target_os = "netbsd",
                    target_os = "openbsd",
                    target_os = "dragonfly",
                    target_os = "macos",
                    target_os = "ios"
                ))]
                for span in RecordCursor::new(data, OS_RECORD_LAYOUT) {
                    if matches(span) {
                        return Some(build(span));
                    }
                }

                #[cfg(not(any(
                    target_os = "freebsd",
                    target_os = "netbsd",
                    target_os = "openbsd",
                    target_os = "dragonfly",
                    target_os = "macos",
                    target_os = "ios"
                )))]
                if matches(data) {
                    return Some(build(data));
                }
            }
        }

        // Shrink the wait to what is left of the deadline; an expired
        // deadline must not reach the wait primitive as a negative time.
        match deadline.remaining() {
            Some(left) => remaining = left,
            None => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::os::fd::AsRawFd;
    use std::time::Instant;

    fn udp_pair() -> (UdpSocket, UdpSocket) {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.connect(receiver.local_addr().unwrap()).unwrap();
        (receiver, sender)
    }

    #[test]
    fn test_returns_first_matching_candidate() {
        let (receiver, sender) = udp_pair();
        sender.send(b"expected-reply").unwrap();

        let reply = recv_match_loop(
            &[receiver.as_raw_fd()],
            2048,
            Timestamp::new(2, 0),
            |data| data == b"expected-reply",
            |data| data.to_vec(),
        );
        assert_eq!(reply.unwrap(), b"expected-reply");
    }

    #[test]
    fn test_times_out_when_nothing_matches() {
        let (receiver, sender) = udp_pair();
        sender.send(b"noise").unwrap();

        let start = Instant::now();
        let reply = recv_match_loop(
            &[receiver.as_raw_fd()],
            2048,
            Timestamp::new(0, 300_000),
            |_| false,
            |data| data.to_vec(),
        );
        let elapsed = start.elapsed();
        assert!(reply.is_none());
        assert!(elapsed.as_millis() >= 250, "returned early: {elapsed:?}");
        assert!(elapsed.as_secs() < 2, "deadline not honored: {elapsed:?}");
    }

    #[test]
    fn test_zero_size_read_is_not_a_candidate() {
        let (receiver, sender) = udp_pair();
        sender.send(b"").unwrap();

        // An always-true matcher would accept any candidate; the empty
        // datagram must produce none at all.
        let reply = recv_match_loop(
            &[receiver.as_raw_fd()],
            2048,
            Timestamp::new(0, 200_000),
            |_| true,
            |data| data.to_vec(),
        );
        assert!(reply.is_none());
    }

    #[test]
    fn test_companion_descriptor_can_win() {
        let (primary, to_primary) = udp_pair();
        let (companion, to_companion) = udp_pair();
        to_primary.send(b"uninteresting").unwrap();
        to_companion.send(b"port-unreachable").unwrap();

        let reply = recv_match_loop(
            &[primary.as_raw_fd(), companion.as_raw_fd()],
            2048,
            Timestamp::new(2, 0),
            |data| data == b"port-unreachable",
            |data| data.to_vec(),
        );
        assert_eq!(reply.unwrap(), b"port-unreachable");
    }

    #[test]
    fn test_keeps_waiting_across_unmatched_rounds() {
        let (receiver, sender) = udp_pair();
        sender.send(b"one").unwrap();
        sender.send(b"two").unwrap();
        sender.send(b"the-answer").unwrap();

        let mut tested = Vec::new();
        let reply = recv_match_loop(
            &[receiver.as_raw_fd()],
            2048,
            Timestamp::new(2, 0),
            |data| {
                tested.push(data.to_vec());
                data == b"the-answer"
            },
            |data| data.to_vec(),
        );
        assert_eq!(reply.unwrap(), b"the-answer");
        assert_eq!(tested.len(), 3);
    }

    #[test]
    fn test_wait_failure_reports_no_reply() {
        // A descriptor number this process never opened makes the wait
        // fail with EBADF immediately. 900 stays below FD_SETSIZE and far
        // above anything the test binary allocates.
        let bogus: RawFd = 900;
        let start = Instant::now();
        let reply = recv_match_loop(
            &[bogus],
            2048,
            Timestamp::new(5, 0),
            |_| true,
            |data| data.to_vec(),
        );
        assert!(reply.is_none());
        assert!(start.elapsed().as_secs() < 5, "wait error must not block");
    }
}
