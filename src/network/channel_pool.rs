//! Channel pool: lazy, cached OS socket handles
//!
//! The pool owns every channel the engine uses: a fixed table of raw
//! IP-layer sockets indexed by socket kind, and the platform link-layer
//! backend (one shared packet socket, or per-interface capture devices,
//! depending on the build). Channels open on first use and stay cached
//! until explicitly closed or the pool is dropped.
//!
//! The pool is plain mutable state with no internal locking: one logical
//! call at a time. Callers that want concurrent access must serialize it
//! themselves.

use std::os::fd::{AsRawFd, IntoRawFd, RawFd};

use socket2::{Protocol, Socket, Type};

use crate::network::errors::ChannelError;
use crate::network::interface::NetworkInterface;
use crate::network::link_layer::{close_raw_fd, LinkLayer, PlatformLinkLayer};
use crate::network::socket_kind::{SocketKind, SOCKET_KIND_COUNT};

/// Owns and lazily creates the OS channels, keyed by socket kind and, for
/// link-layer channels on per-interface platforms, by interface.
///
/// Dropping the pool closes every remaining channel best-effort; close
/// failures at teardown are swallowed.
#[derive(Default)]
pub struct ChannelPool {
    ip_channels: [Option<Socket>; SOCKET_KIND_COUNT],
    link: PlatformLinkLayer,
}

impl ChannelPool {
    pub fn new() -> Self {
        ChannelPool::default()
    }

    /// Open the channel for `kind`, creating it on first use. Returns the
    /// underlying descriptor. Idempotent: a second open of the same kind
    /// (and interface, for link-layer channels) returns the same handle.
    pub fn open(
        &mut self,
        kind: SocketKind,
        iface: &NetworkInterface,
    ) -> Result<RawFd, ChannelError> {
        if kind.is_link_layer() {
            self.link.open(iface)?;
            self.link.fd(iface)
        } else {
            self.open_ip(kind)
        }
    }

    /// Open an IP-layer channel: a raw socket for the kind's protocol
    /// number, configured to include its own IP header on transmit.
    pub fn open_ip(&mut self, kind: SocketKind) -> Result<RawFd, ChannelError> {
        // Rejects the link-layer kind (and any future unmapped kind) before
        // any OS resource is created.
        let protocol = kind.protocol_number()?;

        if let Some(socket) = &self.ip_channels[kind.index()] {
            return Ok(socket.as_raw_fd());
        }

        let socket = Socket::new(kind.domain(), Type::RAW, Some(Protocol::from(protocol)))
            .map_err(|err| ChannelError::open(kind, err))?;
        // Not every family honors IP_HDRINCL; a refusal is not fatal.
        if let Err(err) = socket.set_header_included(true) {
            tracing::debug!(kind = %kind, %err, "IP_HDRINCL not set");
        }

        let fd = socket.as_raw_fd();
        tracing::debug!(kind = %kind, fd, "opened raw ip channel");
        self.ip_channels[kind.index()] = Some(socket);
        Ok(fd)
    }

    /// Borrow the open IP-layer socket for `kind`.
    pub fn ip_socket(&self, kind: SocketKind) -> Result<&Socket, ChannelError> {
        self.ip_channels[kind.index()]
            .as_ref()
            .ok_or(ChannelError::InvalidChannel(kind))
    }

    /// The link-layer backend, for frame transmission and receive setup.
    pub fn link(&mut self) -> &mut PlatformLinkLayer {
        &mut self.link
    }

    /// Close and remove exactly one channel. Fails with `InvalidChannel`
    /// if no such channel is open. For link-layer channels on per-interface
    /// platforms only the named interface's channel is removed.
    pub fn close(
        &mut self,
        kind: SocketKind,
        iface: &NetworkInterface,
    ) -> Result<(), ChannelError> {
        if kind.is_link_layer() {
            return self.link.close(iface);
        }
        let socket = self.ip_channels[kind.index()]
            .take()
            .ok_or(ChannelError::InvalidChannel(kind))?;
        close_raw_fd(socket.into_raw_fd(), kind)
    }

    /// Whether a live channel exists for `kind` (and `iface`, if
    /// link-layer).
    pub fn is_open(&self, kind: SocketKind, iface: &NetworkInterface) -> bool {
        if kind.is_link_layer() {
            self.link.is_open(iface)
        } else {
            self.ip_channels[kind.index()].is_some()
        }
    }
}

impl Drop for ChannelPool {
    fn drop(&mut self) {
        // Dropping the sockets closes them; nothing useful can be done
        // about a close failure here.
        self.link.close_all();
        tracing::debug!("channel pool torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_iface() -> NetworkInterface {
        NetworkInterface::first_usable().unwrap()
    }

    #[test]
    fn test_close_never_opened_kind_fails() {
        let mut pool = ChannelPool::new();
        let err = pool.close(SocketKind::Icmp, &test_iface()).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidChannel(SocketKind::Icmp)));
    }

    #[test]
    fn test_open_rejects_unmapped_kind_before_creating_anything() {
        let mut pool = ChannelPool::new();
        let err = pool.open_ip(SocketKind::LinkLayer).unwrap_err();
        assert!(matches!(err, ChannelError::UnknownSocketKind(_)));
    }

    #[test]
    fn test_ip_socket_requires_prior_open() {
        let pool = ChannelPool::new();
        assert!(matches!(
            pool.ip_socket(SocketKind::Ipv4Udp),
            Err(ChannelError::InvalidChannel(SocketKind::Ipv4Udp))
        ));
    }

    #[test]
    fn test_open_is_idempotent_and_close_removes_exactly_one() {
        let mut pool = ChannelPool::new();
        let iface = test_iface();
        let fd = match pool.open(SocketKind::Icmp, &iface) {
            Ok(fd) => fd,
            Err(ChannelError::Open { .. }) => {
                eprintln!("skipping: raw sockets unavailable (need CAP_NET_RAW)");
                return;
            }
            Err(err) => panic!("unexpected error: {err}"),
        };

        // Second open returns the cached channel, not a fresh descriptor.
        let fd_again = pool.open(SocketKind::Icmp, &iface).unwrap();
        assert_eq!(fd, fd_again);
        assert!(pool.is_open(SocketKind::Icmp, &iface));

        pool.close(SocketKind::Icmp, &iface).unwrap();
        assert!(!pool.is_open(SocketKind::Icmp, &iface));
        let err = pool.close(SocketKind::Icmp, &iface).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidChannel(SocketKind::Icmp)));
    }

    #[test]
    fn test_at_most_one_channel_per_kind() {
        let mut pool = ChannelPool::new();
        let iface = test_iface();
        if pool.open(SocketKind::Ipv4Udp, &iface).is_err() {
            eprintln!("skipping: raw sockets unavailable (need CAP_NET_RAW)");
            return;
        }

        // Opening other kinds must not disturb the first one's handle.
        let udp_fd = pool.open(SocketKind::Ipv4Udp, &iface).unwrap();
        let _ = pool.open(SocketKind::Ipv4Tcp, &iface);
        let _ = pool.open(SocketKind::Icmp, &iface);
        assert_eq!(pool.open(SocketKind::Ipv4Udp, &iface).unwrap(), udp_fd);

        // A kind is one slot: close then reopen may produce a new handle,
        // but there is never more than one live channel for the kind.
        pool.close(SocketKind::Ipv4Udp, &iface).unwrap();
        assert!(!pool.is_open(SocketKind::Ipv4Udp, &iface));
        assert!(pool.open(SocketKind::Ipv4Udp, &iface).is_ok());
        assert!(pool.is_open(SocketKind::Ipv4Udp, &iface));
    }
}
