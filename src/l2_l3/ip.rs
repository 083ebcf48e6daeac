use crate::l2_l3::defs::Ipv4Type;
use anyhow::Result;
use log;
use std::net::Ipv4Addr;

const IPV4_HEADER_LENGTH_BASIC: usize = 20;
const IPV4_DEFAULT_TTL: u8 = 64;

// https://datatracker.ietf.org/doc/html/rfc791
//
//Bit 0: reserved, must be zero
//Bit 1: (DF) 0 = May Fragment,  1 = Don't Fragment.
//Bit 2: (MF) 0 = Last Fragment, 1 = More Fragments.
//
//    0   1   2
//  +---+---+---+
//  |   | D | M |
//  | 0 | F | F |
//  +---+---+---+
//

const IPV4_FLAG_DF: u8 = 0b010;

// https://datatracker.ietf.org/doc/html/rfc791
//
// 0                   1                   2                   3
// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |Version|  IHL  |Type of Service|          Total Length         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |         Identification        |Flags|      Fragment Offset    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  Time to Live |    Protocol   |         Header Checksum       |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                       Source Address                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                    Destination Address                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                    Options                    |    Padding    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
#[derive(Clone, Debug)]
pub struct Ipv4Packet {
    pub version: u8,           // 4 bit
    pub ihl: u8,               // 4 bit, in 32 bit words
    pub type_of_service: u8,
    pub length: u16,
    pub identification: u16,
    pub flags: u8,             // 3 bit
    pub frag_offset: u16,      // 13 bit
    pub ttl: u8,
    pub protocol: u8,
    pub header_checksum: u16,
    pub src_addr: [u8; 4],
    pub dst_addr: [u8; 4],
    pub options: Vec<u8>,      // raw, padding included
    pub payload: Vec<u8>,
    pub valid: bool
}

impl Ipv4Packet {
    pub fn new() -> Self {
        Self {
            version: 0,
            ihl: 0,
            type_of_service: 0,
            length: 0,
            identification: 0,
            flags: 0,
            frag_offset: 0,
            ttl: 0,
            protocol: 0,
            header_checksum: 0,
            src_addr: [0; 4],
            dst_addr: [0; 4],
            options: Vec::new(),
            payload: Vec::new(),
            valid: false
        }
    }

    /// Wraps an already serialized tcp segment into an unfragmentable datagram.
    pub fn new_tcp(src: Ipv4Addr, dst: Ipv4Addr, identification: u16, segment: Vec<u8>) -> Self {
        let mut packet = Self::new();
        packet.version = 4;
        packet.ihl = (IPV4_HEADER_LENGTH_BASIC / 4) as u8;
        packet.length = (IPV4_HEADER_LENGTH_BASIC + segment.len()) as u16;
        packet.identification = identification;
        packet.flags = IPV4_FLAG_DF;
        packet.ttl = IPV4_DEFAULT_TTL;
        packet.protocol = u8::from(Ipv4Type::TCP);
        packet.src_addr = src.octets();
        packet.dst_addr = dst.octets();
        packet.payload = segment;
        packet.header_checksum = packet.header_checksum();
        packet.valid = true;
        packet
    }

    pub fn header_length(&self) -> usize {
        self.ihl as usize * 4
    }

    /// Decodes a datagram captured from the wire.
    /// Fails on truncated headers and bad header checksums.
    pub fn read(&mut self, packet: &[u8]) -> Result<bool> {
        anyhow::ensure!(
            packet.len() >= IPV4_HEADER_LENGTH_BASIC,
            "Insufficient packet length for IPv4 Header. packet.len()={}",
            packet.len()
        );
        self.version = packet[0] >> 4;
        self.ihl = packet[0] & 0xf;
        let header_length = self.header_length();
        anyhow::ensure!(
            header_length >= IPV4_HEADER_LENGTH_BASIC && packet.len() >= header_length,
            "Invalid IPv4 header length. ihl={}, packet.len()={}",
            self.ihl,
            packet.len()
        );
        self.type_of_service = packet[1];
        self.length = u16::from_be_bytes([packet[2], packet[3]]);
        self.identification = u16::from_be_bytes([packet[4], packet[5]]);
        let flags_fragment = u16::from_be_bytes([packet[6], packet[7]]);
        self.flags = (flags_fragment >> 13) as u8;
        self.frag_offset = flags_fragment & 0x1fff;
        self.ttl = packet[8];
        self.protocol = packet[9];
        self.header_checksum = u16::from_be_bytes([packet[10], packet[11]]);
        self.src_addr = packet[12..16].try_into()?;
        self.dst_addr = packet[16..20].try_into()?;
        self.options = packet[IPV4_HEADER_LENGTH_BASIC..header_length].to_vec();
        // Ethernet pads short frames, so the total length bounds the payload.
        let end = (self.length as usize).clamp(header_length, packet.len());
        self.payload = packet[header_length..end].to_vec();
        self.validate()?;

        Ok(self.valid)
    }

    // One's complement sum over the header with the checksum field taken as zero.
    fn header_checksum(&self) -> u16 {
        let header = self.create_header();
        let mut sum: u32 = header
            .chunks(2)
            .enumerate()
            .filter(|(i, _)| *i != 5)
            .map(|(_, word)| u32::from(u16::from_be_bytes([word[0], *word.get(1).unwrap_or(&0)])))
            .sum();
        while (sum >> 16) > 0 {
            sum = (sum & 0xffff) + (sum >> 16);
        }

        !(sum as u16)
    }

    pub fn validate(&mut self) -> Result<bool> {
        self.valid = self.version == 4 && Ipv4Type::from(self.protocol) != Ipv4Type::Unknown;
        if !self.valid {
            log::debug!("Unexpected ip header. version={}, protocol={}.", self.version, self.protocol);
        }
        let expected_checksum = self.header_checksum();
        if self.header_checksum != expected_checksum && self.header_checksum != 0x0 {
            self.valid = false;
            anyhow::bail!(
                "IP Header has bad checksum 0x{:x}, expected 0x{:x}.",
                self.header_checksum,
                expected_checksum
            );
        }

        Ok(self.valid)
    }

    fn create_header(&self) -> Vec<u8> {
        let mut header = Vec::with_capacity(IPV4_HEADER_LENGTH_BASIC + self.options.len());
        header.push(self.version << 4 | self.ihl);
        header.push(self.type_of_service);
        header.extend_from_slice(&self.length.to_be_bytes());
        header.extend_from_slice(&self.identification.to_be_bytes());
        header.extend_from_slice(&((self.flags as u16) << 13 | self.frag_offset).to_be_bytes());
        header.push(self.ttl);
        header.push(self.protocol);
        header.extend_from_slice(&self.header_checksum.to_be_bytes());
        header.extend_from_slice(&self.src_addr);
        header.extend_from_slice(&self.dst_addr);
        header.extend_from_slice(&self.options);

        header
    }

    /// Serializes header and payload as they are. The checksum is not recomputed.
    pub fn create_packet(&self) -> Vec<u8> {
        let mut packet = self.create_header();
        packet.extend_from_slice(&self.payload);

        packet
    }
}
