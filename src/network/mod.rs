//! Network engine: channels, dispatch, and the receive-match loop
//!
//! The pieces of the transmit/receive engine:
//! - `ChannelPool` owns the OS socket handles, opened lazily per socket kind
//! - `PacketSender` dispatches serialized PDUs to the right channel
//! - `recv_match_loop` multiplexes replies under one absolute deadline
//! - the `Pdu` trait is the capability the engine consumes

pub mod batch;
pub mod capability;
pub mod channel_pool;
pub mod deadline;
pub mod echo;
pub mod errors;
pub mod interface;
pub mod link_layer;
pub mod pdu;
pub mod receive;
pub mod sender;
pub mod socket_kind;

// Re-export commonly used types
pub use channel_pool::ChannelPool;
pub use errors::ChannelError;
pub use interface::NetworkInterface;
pub use pdu::{Framing, Pdu, RawPdu};
pub use receive::recv_match_loop;
pub use sender::{PacketSender, DEFAULT_TIMEOUT_SECS};
pub use socket_kind::{SocketKind, SOCKET_KIND_COUNT};
