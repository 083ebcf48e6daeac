use crate::l2_l3::defs::{CaptureError, EtherType};
use anyhow::{Context, Result};
use log;
use pnet_datalink::{self, Channel, DataLinkReceiver};
use std::io::ErrorKind;
use std::time::Duration;

const ETHERNET_HEADER_SIZE: usize = 14;

#[derive(Debug)]
pub struct EthernetPacket {
    pub dst: [u8; 6],
    pub src: [u8; 6],
    pub ethertype: u16,
    pub payload: Vec<u8>,
    pub valid: bool
}

impl EthernetPacket {
    pub fn new() -> Self {
        EthernetPacket {
            dst: [0; 6],
            src: [0; 6],
            ethertype: 0,
            payload: Vec::new(),
            valid: false
        }
    }

    pub fn read(&mut self, packet: &[u8]) -> Result<bool> {
        if packet.len() < ETHERNET_HEADER_SIZE {
            return Err(anyhow::anyhow!("Insufficient packet length. packet.len()={}", packet.len()));
        }
        self.dst = packet[0..6].try_into()?;
        self.src = packet[6..12].try_into()?;
        self.ethertype = u16::from_be_bytes(packet[12..14].try_into()?);
        self.payload = packet[ETHERNET_HEADER_SIZE..].to_vec();
        self.validate()?;

        Ok(self.valid)
    }

    pub fn validate(&mut self) -> Result<bool> {
        self.valid = true;
        if EtherType::from(self.ethertype) == EtherType::Unknown {
            log::trace!("Reading Unknown EtherType (0x{:x}) packet. Mark packet as invalid.", self.ethertype);
            self.valid = false;
        }

        Ok(self.valid)
    }

    pub fn create_packet(&self) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.extend_from_slice(&self.dst);
        packet.extend_from_slice(&self.src);
        packet.extend_from_slice(&self.ethertype.to_be_bytes());
        packet.extend_from_slice(&self.payload);

        packet
    }
}

/// Anything the capture loop can pull raw link-layer frames from.
///
/// `Ok(None)` means the read timed out without a frame, which gives the
/// caller a chance to check whether it should stop.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>>;
}

pub struct EthernetReceiver {
    rx: Box<dyn DataLinkReceiver>
}

impl EthernetReceiver {
    pub fn new(interface_name: &str, read_timeout: Duration) -> Result<Self> {
        let interfaces = pnet_datalink::interfaces();
        let interface = interfaces
            .into_iter()
            .find(|iface| iface.name == interface_name)
            .ok_or_else(|| CaptureError::OpenFailed {
                interface: interface_name.to_string(),
                reason: "no such interface".to_string()
            })?;
        let config = pnet_datalink::Config {
            read_timeout: Some(read_timeout),
            promiscuous: false,
            ..Default::default()
        };
        let rx = match pnet_datalink::channel(&interface, config) {
            Ok(Channel::Ethernet(_, rx)) => rx,
            Ok(_) => {
                return Err(CaptureError::OpenFailed {
                    interface: interface_name.to_string(),
                    reason: "ethernet channel is not available".to_string()
                }.into())
            }
            Err(e) => {
                return Err(CaptureError::OpenFailed {
                    interface: interface_name.to_string(),
                    reason: e.to_string()
                }.into())
            }
        };

        Ok(Self { rx })
    }
}

impl FrameSource for EthernetReceiver {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        match self.rx.next() {
            Ok(packet) => Ok(Some(packet.to_vec())),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(anyhow::Error::from(e)).context("Failed to receive packet"),
        }
    }
}

#[cfg(test)]
mod ethernet_tests {
    use super::*;
    use rstest::rstest;
    use hex::decode;

    #[rstest]
    #[case(
        // normal arp packet
        "010203040506bebeff74a57808060001080006040001bebeff74a578ac140a6effffffffffffac140a0a",
        [0x01, 0x02, 0x03, 0x04, 0x05, 0x06],
        [0xbe, 0xbe, 0xff, 0x74, 0xa5, 0x78],
        0x0806,
        "0001080006040001bebeff74a578ac140a6effffffffffffac140a0a",
        true
    )]
    #[case(
        // tcp syn+ack from 172.20.10.110:2000
        "5a9f4a65c41fbebeff74a578080045000028000040004006cdd5ac140a6eac140a6407d004b0000003e8000001f550122000107b0000",
        [0x5a, 0x9f, 0x4a, 0x65, 0xc4, 0x1f],
        [0xbe, 0xbe, 0xff, 0x74, 0xa5, 0x78],
        0x0800,
        "45000028000040004006cdd5ac140a6eac140a6407d004b0000003e8000001f550122000107b0000",
        true
    )]
    #[case(
        // Packet EtherType is 0x0000
        "010203040506bebeff74a57800000001080006040001bebeff74a578ac140a6effffffffffffac140a0a",
        [0x01, 0x02, 0x03, 0x04, 0x05, 0x06],
        [0xbe, 0xbe, 0xff, 0x74, 0xa5, 0x78],
        0x0000,
        "0001080006040001bebeff74a578ac140a6effffffffffffac140a0a",
        false
    )]
    fn test_ethernet_packet_read(
        #[case] encoded_packet: &str,
        #[case] expected_dst: [u8; 6],
        #[case] expected_src: [u8; 6],
        #[case] expected_ethertype: u16,
        #[case] encoded_payload: &str,
        #[case] expected_valid: bool
    ) {
        let packet_data = decode(encoded_packet).expect("Failed to decode hex string");
        let payload = decode(encoded_payload).expect("Failed to decode payload hex string");
        let mut packet = EthernetPacket::new();
        let _ = packet.read(&packet_data).expect("Failed to read packet");

        assert_eq!(packet.dst, expected_dst);
        assert_eq!(packet.src, expected_src);
        assert_eq!(packet.ethertype, expected_ethertype);
        assert_eq!(packet.payload, payload);
        assert_eq!(packet.valid, expected_valid);
        assert_eq!(packet.create_packet(), packet_data, "Recreated packet does not match the original data");
    }

    #[rstest]
    #[case("0102030405")]
    fn test_ethernet_packet_read_error(
        #[case] encoded_packet: &str,
    ) {
        let packet_data = decode(encoded_packet).expect("Failed to decode hex string");
        let mut packet = EthernetPacket::new();

        assert!(packet.read(&packet_data).is_err(), "Expected an error for insufficient packet length");
    }
}
