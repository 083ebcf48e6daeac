use crate::l2_l3::{defs::CaptureError, ip::Ipv4Packet};
use crate::symbol::concrete::ConcreteSymbol;
use crate::tcp::packet::{TcpFlag, TcpPacket};
use anyhow::{Context, Result};
use log;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet as RawIpv4Packet;
use pnet::transport::{transport_channel, TransportChannelType, TransportSender};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr};

const TRANSPORT_BUFFER_SIZE: usize = 4096;

/// One best-effort transmission per call. No acknowledgment, no retry.
pub trait SegmentSender {
    fn send(&mut self, symbol: &ConcreteSymbol) -> Result<()>;
}

/// Printable filler for synthesized payloads. The content is never inspected.
pub fn random_payload(length: usize) -> Vec<u8> {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .filter(|b| b.is_ascii_alphabetic())
        .take(length)
        .collect()
}

/// Serializes `symbol` as a complete ipv4 datagram from `src` to `dst`.
pub fn build_datagram(symbol: &ConcreteSymbol, src: Ipv4Addr, dst: Ipv4Addr, identification: u16) -> Vec<u8> {
    let mut tcp_packet = TcpPacket::new();
    tcp_packet.src_addr = src.octets();
    tcp_packet.dst_addr = dst.octets();
    tcp_packet.local_port = symbol.source_port;
    tcp_packet.remote_port = symbol.destination_port;
    tcp_packet.seq_number = symbol.seq_number;
    tcp_packet.ack_number = symbol.ack_number;
    tcp_packet.reserved = symbol.reserved;
    tcp_packet.flag = TcpFlag::from(symbol.flags);
    tcp_packet.window_size = symbol.window;
    tcp_packet.urg_pointer = symbol.urgent_pointer;
    tcp_packet.payload = symbol.payload.clone();
    let segment = tcp_packet.create_packet();
    log::trace!("Built segment. {}", tcp_packet.print_general_info());

    Ipv4Packet::new_tcp(src, dst, identification, segment).create_packet()
}

pub fn interface_ipv4(interface_name: &str) -> Result<Ipv4Addr> {
    pnet_datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == interface_name)
        .context(format!("cannot find interface {interface_name:?}"))?
        .ips
        .iter()
        .find_map(|net| match net.ip() {
            IpAddr::V4(addr) => Some(addr),
            IpAddr::V6(_) => None,
        })
        .context(format!("interface {interface_name:?} has no ipv4 address"))
}

/// Sends datagrams through a raw layer-3 socket; the kernel does routing.
pub struct RawSocketSender {
    tx: TransportSender,
    src_addr: Ipv4Addr,
    dst_addr: Ipv4Addr,
    identification: u16,
}

impl RawSocketSender {
    pub fn new(src_addr: Ipv4Addr, dst_addr: Ipv4Addr) -> Result<Self> {
        let channel_type = TransportChannelType::Layer3(IpNextHeaderProtocols::Tcp);
        let (tx, _) = transport_channel(TRANSPORT_BUFFER_SIZE, channel_type)
            .map_err(|e| CaptureError::TransportFailed { reason: e.to_string() })?;
        log::info!("Opened raw sender {} -> {}.", src_addr, dst_addr);

        Ok(Self {
            tx,
            src_addr,
            dst_addr,
            identification: rand::thread_rng().gen(),
        })
    }
}

impl SegmentSender for RawSocketSender {
    fn send(&mut self, symbol: &ConcreteSymbol) -> Result<()> {
        self.identification = self.identification.wrapping_add(1);
        let datagram = build_datagram(symbol, self.src_addr, self.dst_addr, self.identification);
        let packet = RawIpv4Packet::new(&datagram).context("Datagram is shorter than an ipv4 header.")?;
        let sent = self
            .tx
            .send_to(packet, IpAddr::V4(self.dst_addr))
            .context(format!("Failed to send {} to {}.", symbol, self.dst_addr))?;
        log::debug!("Sent {} ({} bytes) to {}.", symbol, sent, self.dst_addr);

        Ok(())
    }
}

#[cfg(test)]
mod sender_tests {
    use super::*;
    use hex::decode;
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case(
        "S(500,0,0)",
        "45000028000040004006cdd5ac140a64ac140a6e04b007d0000001f4000000005002200014740000"
    )]
    #[case(
        "S(500,0,3)",
        "4500002b000040004006cdd2ac140a64ac140a6e04b007d0000001f40000000050022000922f0000414141"
    )]
    fn test_build_datagram(#[case] symbol: &str, #[case] expected_hex: &str) {
        let mut symbol = ConcreteSymbol::from_str(symbol).unwrap();
        symbol.source_port = 1200;
        symbol.destination_port = 2000;
        let datagram = build_datagram(
            &symbol,
            Ipv4Addr::new(172, 20, 10, 100),
            Ipv4Addr::new(172, 20, 10, 110),
            0,
        );

        assert_eq!(datagram, decode(expected_hex).unwrap());
    }

    #[test]
    fn test_random_payload() {
        let payload = random_payload(32);

        assert_eq!(payload.len(), 32);
        assert!(payload.iter().all(|b| b.is_ascii_alphabetic()));
        assert!(random_payload(0).is_empty());
    }
}
