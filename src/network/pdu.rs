//! PDU capability consumed by the engine
//!
//! The engine never inspects protocol fields itself: a PDU serializes to
//! bytes, declares its link-layer framing (if any), decides whether a
//! candidate reply answers it, and builds a typed reply from accepted
//! bytes. The self-dispatch hooks let a PDU re-enter the sender with its
//! own addressing, the way an IP-based PDU picks its raw socket kind and
//! destination.

use pnet::datalink::MacAddr;

use crate::network::errors::ChannelError;
use crate::network::interface::NetworkInterface;
use crate::network::sender::PacketSender;

/// Link-layer framings a PDU can declare. Checked by the dispatcher in
/// this order, most specific first, so a PDU that satisfies both a
/// specific framing and a looser default goes out with the specific one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Ethernet II frames.
    EthernetII,
    /// Raw IEEE 802.11 frames.
    Dot11,
    /// 802.11 frames with a RadioTap header.
    RadioTap,
    /// Legacy IEEE 802.3 frames.
    Ieee8023,
}

/// Dispatch order for the framing check.
pub(crate) const LINK_FRAMINGS: [Framing; 4] = [
    Framing::EthernetII,
    Framing::Dot11,
    Framing::RadioTap,
    Framing::Ieee8023,
];

/// An assembled protocol data unit the engine can transmit and, when a
/// response is expected, match replies for.
pub trait Pdu {
    /// Whether this PDU uses the given link-layer framing.
    fn matches_framing(&self, framing: Framing) -> bool {
        let _ = framing;
        false
    }

    /// Serialize to wire bytes. An empty buffer is a valid result and is
    /// skipped by the link-layer transmit path.
    fn serialize(&self) -> Vec<u8>;

    /// Whether `data` is a reply to this PDU.
    fn matches_response(&self, data: &[u8]) -> bool {
        let _ = data;
        false
    }

    /// Build a typed reply from accepted bytes.
    fn response_from(&self, data: &[u8]) -> Option<Box<dyn Pdu>> {
        let _ = data;
        None
    }

    /// Link-layer destination for framed transmission.
    fn hw_destination(&self) -> MacAddr {
        MacAddr::broadcast()
    }

    /// Transmit through `sender` with protocol-specific addressing. The
    /// dispatcher falls back to this hook when no link framing matches.
    fn send(
        &mut self,
        sender: &mut PacketSender,
        iface: &NetworkInterface,
    ) -> Result<(), ChannelError>;

    /// Wait for a reply through `sender` with protocol-specific channel
    /// selection. The default expects no reply.
    fn recv_response(
        &mut self,
        sender: &mut PacketSender,
        iface: &NetworkInterface,
    ) -> Option<Box<dyn Pdu>> {
        let _ = (sender, iface);
        None
    }
}

/// An opaque byte-buffer PDU.
///
/// Serves two jobs: the generic reply carrier built from accepted candidate
/// bytes, and a bring-your-own-bytes payload treated as a pre-framed
/// link-layer frame when transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPdu {
    data: Vec<u8>,
}

impl RawPdu {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        RawPdu { data: data.into() }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl Pdu for RawPdu {
    fn matches_framing(&self, framing: Framing) -> bool {
        framing == Framing::EthernetII
    }

    fn serialize(&self) -> Vec<u8> {
        self.data.clone()
    }

    fn send(
        &mut self,
        sender: &mut PacketSender,
        iface: &NetworkInterface,
    ) -> Result<(), ChannelError> {
        sender.send_link_layer(self, self.hw_destination(), iface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_pdu_serializes_verbatim() {
        let pdu = RawPdu::new(vec![1, 2, 3]);
        assert_eq!(pdu.serialize(), vec![1, 2, 3]);
        assert_eq!(pdu.data(), &[1, 2, 3]);
    }

    #[test]
    fn test_raw_pdu_is_ethernet_framed() {
        let pdu = RawPdu::new(Vec::new());
        assert!(pdu.matches_framing(Framing::EthernetII));
        assert!(!pdu.matches_framing(Framing::Ieee8023));
    }

    #[test]
    fn test_default_matcher_rejects_everything() {
        let pdu = RawPdu::new(vec![0xff]);
        assert!(!pdu.matches_response(b"anything"));
        assert!(pdu.response_from(b"anything").is_none());
    }
}
