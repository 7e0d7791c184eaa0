//! ICMP echo PDU
//!
//! A small, complete [`Pdu`] implementation used by the demo binary and the
//! integration tests: an IPv4 ICMP echo request whose reply matcher checks
//! the echoed identifier and sequence number. The raw ICMP channel delivers
//! replies with the IP header included, so matching starts at the IP layer.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{self, IcmpCode, IcmpPacket, IcmpTypes};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, Ipv4Packet, MutableIpv4Packet};
use pnet::packet::Packet;

use crate::network::errors::ChannelError;
use crate::network::interface::NetworkInterface;
use crate::network::pdu::{Pdu, RawPdu};
use crate::network::sender::PacketSender;
use crate::network::socket_kind::SocketKind;

const IPV4_HEADER_LEN: usize = 20;
const ICMP_HEADER_LEN: usize = 8;

/// An IPv4 ICMP echo request.
#[derive(Debug, Clone)]
pub struct IcmpEcho {
    target: Ipv4Addr,
    identifier: u16,
    sequence: u16,
    payload: Vec<u8>,
    ttl: u8,
}

impl IcmpEcho {
    pub fn new(target: Ipv4Addr, identifier: u16, sequence: u16) -> Self {
        IcmpEcho {
            target,
            identifier,
            sequence,
            payload: Vec::new(),
            ttl: 64,
        }
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn target(&self) -> Ipv4Addr {
        self.target
    }

    /// Build the full IP packet. Returns `None` only if the buffers cannot
    /// be framed, which the fixed sizing rules out.
    fn build(&self) -> Option<Vec<u8>> {
        let total_len = IPV4_HEADER_LEN + ICMP_HEADER_LEN + self.payload.len();
        let mut buffer = vec![0u8; total_len];

        {
            let mut ip_packet = MutableIpv4Packet::new(&mut buffer)?;
            ip_packet.set_version(4);
            ip_packet.set_header_length((IPV4_HEADER_LEN / 4) as u8);
            ip_packet.set_total_length(total_len as u16);
            ip_packet.set_ttl(self.ttl);
            ip_packet.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
            // Source left zeroed: the kernel fills it in under IP_HDRINCL.
            ip_packet.set_destination(self.target);
            let checksum = ipv4::checksum(&ip_packet.to_immutable());
            ip_packet.set_checksum(checksum);
        }

        {
            let mut echo = MutableEchoRequestPacket::new(&mut buffer[IPV4_HEADER_LEN..])?;
            echo.set_icmp_type(IcmpTypes::EchoRequest);
            echo.set_icmp_code(IcmpCode::new(0));
            echo.set_identifier(self.identifier);
            echo.set_sequence_number(self.sequence);
            echo.set_payload(&self.payload);
        }
        let checksum = icmp::checksum(&IcmpPacket::new(&buffer[IPV4_HEADER_LEN..])?);
        MutableEchoRequestPacket::new(&mut buffer[IPV4_HEADER_LEN..])?.set_checksum(checksum);

        Some(buffer)
    }
}

impl Pdu for IcmpEcho {
    fn serialize(&self) -> Vec<u8> {
        self.build().unwrap_or_default()
    }

    fn matches_response(&self, data: &[u8]) -> bool {
        let Some(ip_packet) = Ipv4Packet::new(data) else {
            return false;
        };
        if ip_packet.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
            return false;
        }
        let Some(reply) = EchoReplyPacket::new(ip_packet.payload()) else {
            return false;
        };
        reply.get_icmp_type() == IcmpTypes::EchoReply
            && reply.get_identifier() == self.identifier
            && reply.get_sequence_number() == self.sequence
    }

    fn response_from(&self, data: &[u8]) -> Option<Box<dyn Pdu>> {
        Some(Box::new(RawPdu::new(data)))
    }

    fn send(
        &mut self,
        sender: &mut PacketSender,
        _iface: &NetworkInterface,
    ) -> Result<(), ChannelError> {
        let dest = SocketAddr::new(IpAddr::V4(self.target), 0);
        sender.send_ip_layer(self, dest, SocketKind::Icmp)
    }

    fn recv_response(
        &mut self,
        sender: &mut PacketSender,
        _iface: &NetworkInterface,
    ) -> Option<Box<dyn Pdu>> {
        sender.recv_ip_layer(self, SocketKind::Icmp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Synthesize the reply the kernel would send back.
    fn echo_reply(identifier: u16, sequence: u16) -> Vec<u8> {
        let request = IcmpEcho::new(Ipv4Addr::LOCALHOST, identifier, sequence);
        let mut bytes = request.build().unwrap();
        // Flip the ICMP type to echo-reply and fix the checksum.
        bytes[IPV4_HEADER_LEN] = 0;
        bytes[IPV4_HEADER_LEN + 2] = 0;
        bytes[IPV4_HEADER_LEN + 3] = 0;
        let checksum = icmp::checksum(&IcmpPacket::new(&bytes[IPV4_HEADER_LEN..]).unwrap());
        bytes[IPV4_HEADER_LEN + 2..IPV4_HEADER_LEN + 4].copy_from_slice(&checksum.to_be_bytes());
        bytes
    }

    #[test]
    fn test_serializes_full_ip_packet() {
        let pdu = IcmpEcho::new(Ipv4Addr::new(192, 0, 2, 1), 0x1234, 7).payload(b"abcd".to_vec());
        let bytes = pdu.serialize();
        assert_eq!(bytes.len(), IPV4_HEADER_LEN + ICMP_HEADER_LEN + 4);

        let ip_packet = Ipv4Packet::new(&bytes).unwrap();
        assert_eq!(ip_packet.get_version(), 4);
        assert_eq!(ip_packet.get_destination(), Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!(ip_packet.get_next_level_protocol(), IpNextHeaderProtocols::Icmp);
        assert_eq!(ip_packet.get_total_length() as usize, bytes.len());
    }

    #[test]
    fn test_matches_its_own_reply() {
        let pdu = IcmpEcho::new(Ipv4Addr::LOCALHOST, 0xbeef, 3);
        assert!(pdu.matches_response(&echo_reply(0xbeef, 3)));
    }

    #[test]
    fn test_rejects_foreign_identifier_and_sequence() {
        let pdu = IcmpEcho::new(Ipv4Addr::LOCALHOST, 0xbeef, 3);
        assert!(!pdu.matches_response(&echo_reply(0xbee0, 3)));
        assert!(!pdu.matches_response(&echo_reply(0xbeef, 4)));
    }

    #[test]
    fn test_rejects_the_request_itself() {
        let pdu = IcmpEcho::new(Ipv4Addr::LOCALHOST, 1, 1);
        let request_bytes = pdu.serialize();
        assert!(!pdu.matches_response(&request_bytes));
    }

    #[test]
    fn test_rejects_garbage() {
        let pdu = IcmpEcho::new(Ipv4Addr::LOCALHOST, 1, 1);
        assert!(!pdu.matches_response(b""));
        assert!(!pdu.matches_response(&[0u8; 5]));
    }

    #[test]
    fn test_reply_factory_carries_the_bytes() {
        let pdu = IcmpEcho::new(Ipv4Addr::LOCALHOST, 1, 1);
        let reply_bytes = echo_reply(1, 1);
        let reply = pdu.response_from(&reply_bytes).unwrap();
        assert_eq!(reply.serialize(), reply_bytes);
    }
}
