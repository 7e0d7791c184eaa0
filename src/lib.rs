//! rawcast
//!
//! The transmit/receive engine of a packet-crafting library: given an
//! assembled PDU it delivers the serialized bytes onto the wire through the
//! correct OS channel, and, when a response is expected, waits for a
//! matching reply within a bounded time, across link-layer and IP-layer
//! raw socket backends.

pub mod cli;
pub mod config;
pub mod logging;
pub mod network;

pub use config::SenderConfig;
pub use network::errors::ChannelError;
pub use network::interface::NetworkInterface;
pub use network::pdu::{Framing, Pdu, RawPdu};
pub use network::sender::PacketSender;
pub use network::socket_kind::SocketKind;
