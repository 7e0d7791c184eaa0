//! Packet sender: channel selection and transmit dispatch
//!
//! `PacketSender` is the engine's front door. It owns the channel pool,
//! picks link-layer vs IP-layer transmission from the PDU's declared
//! framing, and runs the receive-match loop when a reply is expected.
//! Everything is synchronous and blocking; a send returns when the OS
//! write completes, a receive blocks for at most the configured timeout.

use std::net::SocketAddr;

use pnet::datalink::MacAddr;
use socket2::SockAddr;

use crate::config::SenderConfig;
use crate::network::channel_pool::ChannelPool;
use crate::network::deadline::Timestamp;
use crate::network::errors::ChannelError;
use crate::network::interface::NetworkInterface;
use crate::network::link_layer::{LinkLayer, DEFAULT_READ_LEN};
use crate::network::pdu::{Pdu, LINK_FRAMINGS};
use crate::network::receive::recv_match_loop;
use crate::network::socket_kind::SocketKind;

/// Default receive timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: i64 = 2;

/// Transmit/receive engine over the channel pool.
///
/// Single-threaded: the pool is mutable state with no internal locking,
/// and nothing here may be entered concurrently. The receive
/// timeout is fixed for the sender's lifetime; the default interface can
/// be changed.
pub struct PacketSender {
    pool: ChannelPool,
    default_iface: NetworkInterface,
    timeout: Timestamp,
}

impl PacketSender {
    /// Build a sender with an explicit default interface and receive
    /// timeout (seconds plus microseconds, both non-negative).
    pub fn new(default_iface: NetworkInterface, timeout_secs: i64, timeout_usecs: i64) -> Self {
        PacketSender {
            pool: ChannelPool::new(),
            default_iface,
            timeout: Timestamp::new(timeout_secs, timeout_usecs),
        }
    }

    /// Build a sender from a [`SenderConfig`], resolving the configured
    /// interface name (or picking a default when none is named).
    pub fn from_config(config: &SenderConfig) -> Result<Self, ChannelError> {
        let iface = match &config.interface {
            Some(name) => NetworkInterface::from_name(name)?,
            None => NetworkInterface::first_usable()?,
        };
        Ok(PacketSender::new(
            iface,
            config.timeout_secs,
            config.timeout_usecs,
        ))
    }

    pub fn default_interface(&self) -> &NetworkInterface {
        &self.default_iface
    }

    pub fn set_default_interface(&mut self, iface: NetworkInterface) {
        self.default_iface = iface;
    }

    /// Open the channel for `kind` on the default interface, creating it
    /// if needed.
    pub fn open_channel(&mut self, kind: SocketKind) -> Result<(), ChannelError> {
        let iface = self.default_iface.clone();
        self.open_channel_on(kind, &iface)
    }

    /// Open the channel for `kind` on a specific interface.
    pub fn open_channel_on(
        &mut self,
        kind: SocketKind,
        iface: &NetworkInterface,
    ) -> Result<(), ChannelError> {
        self.pool.open(kind, iface).map(|_| ())
    }

    /// Close the channel for `kind` on the default interface.
    pub fn close_channel(&mut self, kind: SocketKind) -> Result<(), ChannelError> {
        let iface = self.default_iface.clone();
        self.close_channel_on(kind, &iface)
    }

    /// Close the channel for `kind` on a specific interface.
    pub fn close_channel_on(
        &mut self,
        kind: SocketKind,
        iface: &NetworkInterface,
    ) -> Result<(), ChannelError> {
        self.pool.close(kind, iface)
    }

    /// Transmit through the PDU's own dispatch hook on the default
    /// interface.
    pub fn send(&mut self, pdu: &mut dyn Pdu) -> Result<(), ChannelError> {
        let iface = self.default_iface.clone();
        pdu.send(self, &iface)
    }

    /// Transmit on a specific interface, picking the channel from the
    /// PDU's declared framing.
    ///
    /// The framing variants are checked most specific first; a PDU with no
    /// link framing falls back to its own [`Pdu::send`] hook, which in turn
    /// typically selects an IP-layer channel.
    pub fn send_on(
        &mut self,
        pdu: &mut dyn Pdu,
        iface: &NetworkInterface,
    ) -> Result<(), ChannelError> {
        for framing in LINK_FRAMINGS {
            if pdu.matches_framing(framing) {
                return self.send_link_layer(pdu, pdu.hw_destination(), iface);
            }
        }
        pdu.send(self, iface)
    }

    /// Transmit and wait for a matching reply on the default interface.
    pub fn send_recv(&mut self, pdu: &mut dyn Pdu) -> Option<Box<dyn Pdu>> {
        let iface = self.default_iface.clone();
        self.send_recv_on(pdu, &iface)
    }

    /// Transmit and wait for a matching reply on a specific interface.
    ///
    /// Returns `None` both when the wait times out and when the transmit
    /// itself fails: callers get one uniform "did we get an answer" check.
    /// Callers that must distinguish the two call [`PacketSender::send`]
    /// and the PDU's receive hook separately.
    pub fn send_recv_on(
        &mut self,
        pdu: &mut dyn Pdu,
        iface: &NetworkInterface,
    ) -> Option<Box<dyn Pdu>> {
        if let Err(err) = pdu.send(self, iface) {
            tracing::debug!(%err, "transmit failed, reporting no reply");
            return None;
        }
        pdu.recv_response(self, iface)
    }

    /// Serialize and transmit one link-layer frame, opening the channel on
    /// demand. An empty serialization is a silent no-op, not an error.
    pub fn send_link_layer(
        &mut self,
        pdu: &dyn Pdu,
        dest: MacAddr,
        iface: &NetworkInterface,
    ) -> Result<(), ChannelError> {
        self.pool.open(SocketKind::LinkLayer, iface)?;
        let frame = pdu.serialize();
        if frame.is_empty() {
            return Ok(());
        }
        self.pool.link().send_frame(iface, dest, &frame)
    }

    /// Serialize and transmit through the IP-layer channel for `kind`,
    /// opening it on demand. Raw IP sockets are unconnected, so the
    /// destination is attached at the write.
    pub fn send_ip_layer(
        &mut self,
        pdu: &dyn Pdu,
        dest: SocketAddr,
        kind: SocketKind,
    ) -> Result<(), ChannelError> {
        self.pool.open_ip(kind)?;
        let buffer = pdu.serialize();
        let socket = self.pool.ip_socket(kind)?;
        let written = socket
            .send_to(&buffer, &SockAddr::from(dest))
            .map_err(|err| ChannelError::write(kind, err))?;
        if written != buffer.len() {
            return Err(ChannelError::write(
                kind,
                format!("partial write: {written} of {} bytes", buffer.len()),
            ));
        }
        Ok(())
    }

    /// Wait for a reply to `pdu` on the link-layer channel for `iface`.
    pub fn recv_link_layer(
        &mut self,
        pdu: &dyn Pdu,
        iface: &NetworkInterface,
    ) -> Option<Box<dyn Pdu>> {
        let fd = match self.pool.open(SocketKind::LinkLayer, iface) {
            Ok(fd) => fd,
            Err(err) => {
                tracing::debug!(%err, "link channel unavailable, reporting no reply");
                return None;
            }
        };
        let read_len = self.pool.link().read_len(iface);
        recv_match_loop(
            &[fd],
            read_len,
            self.timeout,
            |data| pdu.matches_response(data),
            |data| pdu.response_from(data),
        )
        .flatten()
    }

    /// Wait for a reply to `pdu` on the IP-layer channel for `kind`.
    ///
    /// TCP and UDP raw listens also watch the ICMP channel, so a
    /// protocol- or port-unreachable notification can answer the request;
    /// whether such a frame is an acceptable reply is the matcher's call.
    pub fn recv_ip_layer(&mut self, pdu: &dyn Pdu, kind: SocketKind) -> Option<Box<dyn Pdu>> {
        let mut fds = match self.pool.open_ip(kind) {
            Ok(fd) => vec![fd],
            Err(err) => {
                tracing::debug!(%err, "ip channel unavailable, reporting no reply");
                return None;
            }
        };

        if matches!(kind, SocketKind::Ipv4Tcp | SocketKind::Ipv4Udp) {
            #[cfg(any(
                target_os = "freebsd",
                target_os = "netbsd",
                target_os = "openbsd",
                target_os = "dragonfly",
                target_os = "macos",
                target_os = "ios"
            ))]
            {
                tracing::warn!(
                    kind = %kind,
                    "network-layer receive for this kind is not supported on this platform"
                );
                return None;
            }

            #[cfg(not(any(
                target_os = "freebsd",
                target_os = "netbsd",
                target_os = "openbsd",
                target_os = "dragonfly",
                target_os = "macos",
                target_os = "ios"
            )))]
            match self.pool.open_ip(SocketKind::Icmp) {
                Ok(fd) => fds.push(fd),
                Err(err) => {
                    tracing::debug!(%err, "icmp companion channel unavailable, reporting no reply");
                    return None;
                }
            }
        }

        recv_match_loop(
            &fds,
            DEFAULT_READ_LEN,
            self.timeout,
            |data| pdu.matches_response(data),
            |data| pdu.response_from(data),
        )
        .flatten()
    }
}
