//! Logical socket kinds and their OS protocol mapping
//!
//! Every channel the engine opens belongs to exactly one `SocketKind`. The
//! IP-layer kinds map to a fixed OS protocol number used when creating the
//! raw socket; the link-layer kind has no mapping and goes through the
//! platform capture backend instead.

use std::fmt;

use socket2::Domain;

use crate::network::errors::ChannelError;

/// Number of entries in the pool's kind-indexed channel table.
pub const SOCKET_KIND_COUNT: usize = 6;

/// The closed set of channel categories the engine can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum SocketKind {
    /// Raw link-layer frames through the platform capture backend.
    LinkLayer = 0,
    /// Raw IPv4 socket carrying TCP segments.
    Ipv4Tcp = 1,
    /// Raw IPv4 socket carrying UDP datagrams.
    Ipv4Udp = 2,
    /// Raw IPv4 socket, caller supplies the full IP packet.
    Ipv4Raw = 3,
    /// Raw IPv6 socket, caller supplies the full packet.
    Ipv6Raw = 4,
    /// Raw IPv4 socket carrying ICMP messages.
    Icmp = 5,
}

impl SocketKind {
    /// The IP-layer kinds, in pool-table order.
    pub const IP_KINDS: [SocketKind; 5] = [
        SocketKind::Ipv4Tcp,
        SocketKind::Ipv4Udp,
        SocketKind::Ipv4Raw,
        SocketKind::Ipv6Raw,
        SocketKind::Icmp,
    ];

    /// OS protocol number used when opening the raw socket for this kind.
    ///
    /// The table is fixed and total over the IP-layer kinds; the link-layer
    /// kind has no mapping and is rejected here before any socket is
    /// created.
    pub fn protocol_number(self) -> Result<i32, ChannelError> {
        match self {
            SocketKind::Ipv4Tcp => Ok(libc::IPPROTO_TCP),
            SocketKind::Ipv4Udp => Ok(libc::IPPROTO_UDP),
            SocketKind::Ipv4Raw => Ok(libc::IPPROTO_RAW),
            SocketKind::Ipv6Raw => Ok(libc::IPPROTO_RAW),
            SocketKind::Icmp => Ok(libc::IPPROTO_ICMP),
            SocketKind::LinkLayer => Err(ChannelError::UnknownSocketKind(self)),
        }
    }

    /// Address family for the raw socket of this kind.
    pub fn domain(self) -> Domain {
        match self {
            SocketKind::Ipv6Raw => Domain::IPV6,
            _ => Domain::IPV4,
        }
    }

    /// Index of this kind in the pool's channel table.
    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Whether this kind goes through the link-layer capture backend.
    pub fn is_link_layer(self) -> bool {
        matches!(self, SocketKind::LinkLayer)
    }
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketKind::LinkLayer => write!(f, "link-layer"),
            SocketKind::Ipv4Tcp => write!(f, "ipv4-tcp"),
            SocketKind::Ipv4Udp => write!(f, "ipv4-udp"),
            SocketKind::Ipv4Raw => write!(f, "ipv4-raw"),
            SocketKind::Ipv6Raw => write!(f, "ipv6-raw"),
            SocketKind::Icmp => write!(f, "icmp"),
        }
    }
}
