use crate::l2_l3::{defs::Ipv4Type, ip::Ipv4Packet};
use anyhow::Result;
use bitflags::bitflags;
use log;
use std::net::Ipv4Addr;

// Tcp header max size is 60 (15*4) bytes because Max Data Offset is 15 (0b1111).
pub const TCP_HEADER_LENGTH_BASIC: usize = 20;

// https://datatracker.ietf.org/doc/html/rfc9293
// (NS is the experimental nonce sum bit of rfc3540, the lowest reserved bit.)
//
// 0                   1                   2                   3
// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |          Source Port          |       Destination Port        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                        Sequence Number                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                    Acknowledgment Number                      |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  Data |     |N|C|E|U|A|P|R|S|F|                               |
// | Offset|Rsrvd| |W|C|R|C|S|S|Y|I|            Window             |
// |       |     |S|R|E|G|K|H|T|N|N|                               |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |           Checksum            |         Urgent Pointer        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                           [Options]                           |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                                                               :
// :                             Data                              :
// :                                                               |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Default, Debug)]
pub struct TcpPacket {
    pub src_addr: [u8; 4], // pesudo header
    pub dst_addr: [u8; 4], // pesudo header
    pub protocol: u8,      // pesudo header
    pub tcp_length: u16,   // pesudo header
    pub local_port: u16,
    pub remote_port: u16,
    pub seq_number: u32,
    pub ack_number: u32,
    pub offset: u8,   // 4 bit (payload begins from 4*offset bytes)
    pub reserved: u8, // 3 bit
    pub flag: TcpFlag,
    pub window_size: u16,
    pub checksum: u16,
    pub urg_pointer: u16,
    pub option_raw: Vec<u8>,
    pub payload: Vec<u8>,
    pub valid: bool,
    pub checksum_ok: bool,
}

impl TcpPacket {
    pub fn new() -> Self {
        Self {
            option_raw: Vec::new(),
            payload: Vec::new(),
            ..Default::default()
        }
    }

    pub fn read(&mut self, ipv4_packet: &Ipv4Packet) -> Result<bool> {
        let tcp_len = ipv4_packet.payload.len();
        if tcp_len > 0xffff {
            anyhow::bail!(
                "TCP packet payload length is {}, must be smaller than 65536+1.",
                tcp_len
            );
        } else if tcp_len < TCP_HEADER_LENGTH_BASIC {
            anyhow::bail!(
                "TCP packet payload length is {}, must be larger than header length ({}).",
                tcp_len,
                TCP_HEADER_LENGTH_BASIC
            );
        } else {
            self.tcp_length = tcp_len as u16;
        }

        self.src_addr = ipv4_packet.src_addr;
        self.dst_addr = ipv4_packet.dst_addr;
        self.protocol = ipv4_packet.protocol;
        self.local_port = u16::from_be_bytes(ipv4_packet.payload[0..2].try_into()?);
        self.remote_port = u16::from_be_bytes(ipv4_packet.payload[2..4].try_into()?);
        self.seq_number = u32::from_be_bytes(ipv4_packet.payload[4..8].try_into()?);
        self.ack_number = u32::from_be_bytes(ipv4_packet.payload[8..12].try_into()?);
        let offset_flags = u16::from_be_bytes(ipv4_packet.payload[12..14].try_into()?);
        self.offset = (offset_flags >> 12) as u8;
        self.reserved = ((offset_flags >> 9) & 0b111) as u8;
        let offset_bytes = (self.offset as usize) * 4;
        anyhow::ensure!(
            tcp_len >= offset_bytes && offset_bytes >= TCP_HEADER_LENGTH_BASIC,
            "TCP packet payload length is {}, but header's data offset indicate {}.",
            tcp_len,
            offset_bytes
        );
        self.flag = TcpFlag::from_bits_truncate(offset_flags);
        self.window_size = u16::from_be_bytes(ipv4_packet.payload[14..16].try_into()?);
        self.checksum = u16::from_be_bytes(ipv4_packet.payload[16..18].try_into()?);
        self.urg_pointer = u16::from_be_bytes(ipv4_packet.payload[18..20].try_into()?);
        self.option_raw = ipv4_packet.payload[20..offset_bytes].to_vec();
        self.payload = ipv4_packet.payload[offset_bytes..].to_vec();
        self.validate()?;

        Ok(self.valid)
    }

    fn calc_header_checksum(&self) -> u16 {
        let mut packet = self.create_pseudo_header();
        packet.extend(self.create_header());
        packet.extend(&self.payload);
        if packet.len() % 2 != 0 {
            packet.push(0);
        }
        let mut checksum_tmp: u32 = 0;
        for i in (0..packet.len()).step_by(2) {
            let word = u16::from_be_bytes([packet[i], packet[i + 1]]);
            checksum_tmp += u32::from(word);
        }
        checksum_tmp -= self.checksum as u32;
        checksum_tmp = (checksum_tmp & 0xffff) + (checksum_tmp >> 16);
        while (checksum_tmp >> 16) > 0 {
            checksum_tmp = (checksum_tmp & 0xffff) + (checksum_tmp >> 16);
        }

        !(checksum_tmp as u16)
    }

    /// A checksum mismatch is recorded in `checksum_ok` but does not reject
    /// the segment: frames captured before checksum offload carry a partial sum.
    pub fn validate(&mut self) -> Result<bool> {
        self.valid = Ipv4Type::from(self.protocol) == Ipv4Type::TCP;
        if !self.valid {
            log::debug!("Reading non-TCP packet (proto {}) as TCP.", self.protocol);
        }
        let expected_checksum = self.calc_header_checksum();
        self.checksum_ok = self.checksum == expected_checksum;
        if !self.checksum_ok {
            log::debug!(
                "Tcp checksum is 0x{:x} but is expected 0x{:x}. Keeping the segment.",
                self.checksum,
                expected_checksum
            );
        }

        Ok(self.valid)
    }

    pub fn create_header(&self) -> Vec<u8> {
        let mut header = Vec::new();
        header.extend_from_slice(&self.local_port.to_be_bytes());
        header.extend_from_slice(&self.remote_port.to_be_bytes());
        header.extend_from_slice(&self.seq_number.to_be_bytes());
        header.extend_from_slice(&self.ack_number.to_be_bytes());

        let offset_flags = self.flag.bits()
            | ((self.reserved as u16 & 0b111) << 9)
            | ((self.offset as u16) << 12);
        header.extend_from_slice(&offset_flags.to_be_bytes());

        header.extend_from_slice(&self.window_size.to_be_bytes());
        header.extend_from_slice(&self.checksum.to_be_bytes());
        header.extend_from_slice(&self.urg_pointer.to_be_bytes());
        header.extend(&self.option_raw);

        header
    }

    fn create_pseudo_header(&self) -> Vec<u8> {
        let mut header = Vec::new();
        header.extend_from_slice(&self.src_addr);
        header.extend_from_slice(&self.dst_addr);
        header.extend_from_slice(&(self.protocol as u16).to_be_bytes());
        header.extend_from_slice(&self.tcp_length.to_be_bytes());

        header
    }

    /// Serializes the segment, filling in offset, length and checksum.
    pub fn create_packet(&mut self) -> Vec<u8> {
        self.set_packet_params();
        let mut packet = Vec::new();
        packet.extend_from_slice(&self.create_header());
        packet.extend_from_slice(&self.payload);

        packet
    }

    fn set_packet_params(&mut self) {
        self.protocol = u8::from(Ipv4Type::TCP);
        self.offset = ((TCP_HEADER_LENGTH_BASIC + self.option_raw.len()) / 4) as u8;
        self.tcp_length =
            (TCP_HEADER_LENGTH_BASIC + self.option_raw.len() + self.payload.len()) as u16;
        self.checksum = 0;
        self.checksum = self.calc_header_checksum();
    }

    pub fn print_general_info(&self) -> String {
        format!(
            "SEGINFO: SRC={}:{} DST={}:{} SEQ={} ACK={} LENGTH={} WND(RAW)={} FLAG={:?}",
            Ipv4Addr::from(self.src_addr),
            self.local_port,
            Ipv4Addr::from(self.dst_addr),
            self.remote_port,
            self.seq_number,
            self.ack_number,
            self.payload.len(),
            self.window_size,
            self.flag
        )
    }
}

bitflags! {
    #[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Hash)]
    pub struct TcpFlag: u16 {
        const FIN = 0b0_00_00_00_01; // No more data from sender.
        const SYN = 0b0_00_00_00_10; // Synchronize sequence numbers.
        const RST = 0b0_00_00_01_00; // Reset the connection.
        const PSH = 0b0_00_00_10_00; // Push function
        const ACK = 0b0_00_01_00_00; // Acknowledgment field
        const URG = 0b0_00_10_00_00; // Urgent pointer field
        const ECE = 0b0_01_00_00_00; // ECN-Echo
        const CWR = 0b0_10_00_00_00; // Congestion Window Reduced
        const NS  = 0b1_00_00_00_00; // ECN-nonce concealment protection
    }
}

#[cfg(test)]
mod tcp_tests {
    use super::*;
    use hex::decode;
    use rstest::rstest;

    #[rstest]
    #[case(
        "4500003450bf40008006ff4b0a000091ba0fe618d4a40050dd65a54700000000800220004cbb0000020405b40103030201010402",
        [10, 0, 0, 145],     // pesudo header src ip addr
        [186, 15, 230, 24],  // pesudo header dst ip addr
        32,                  // pesudo header tcp length
        54436,               // local port
        80,                  // remote port
        3714426183,          // sequence number
        0,                   // acknowledgment number
        8,                   // data offset
        TcpFlag::SYN,
        8192,                // window
        0x4cbb,              // checksum
        "020405b40103030201010402",
        ""
    )]
    #[case(
        "45000034000040003c06940bba0fe6180a0000910050d4a496d38404dd65a5488012390818cb0000020405b40101040201030301",
        [186, 15, 230, 24],  // pesudo header src ip addr
        [10, 0, 0, 145],     // pesudo header dst ip addr
        32,                  // pesudo header tcp length
        80,                  // local port
        54436,               // remote port
        2530444292,          // sequence number
        3714426184,          // acknowledgment number
        8,                   // data offset
        TcpFlag::SYN | TcpFlag::ACK,
        14600,               // window
        0x18cb,              // checksum
        "020405b40101040201030301",
        ""
    )]
    #[case(
        "4500002d000040004006cdd0ac140a6eac140a6407d004b0000003e9000001f650182000cc9b000068656c6c6f",
        [172, 20, 10, 110],  // pesudo header src ip addr
        [172, 20, 10, 100],  // pesudo header dst ip addr
        25,                  // pesudo header tcp length
        2000,                // local port
        1200,                // remote port
        1001,                // sequence number
        502,                 // acknowledgment number
        5,                   // data offset
        TcpFlag::PSH | TcpFlag::ACK,
        8192,                // window
        0xcc9b,              // checksum
        "",
        "68656c6c6f"
    )]
    fn test_tcp_packet_read(
        #[case] encoded_packet: &str,
        #[case] expected_src_addr: [u8; 4],
        #[case] expected_dst_addr: [u8; 4],
        #[case] expected_tcp_length: u16,
        #[case] expected_local_port: u16,
        #[case] expected_remote_port: u16,
        #[case] expected_seq_number: u32,
        #[case] expected_ack_number: u32,
        #[case] expected_data_offset: u8,
        #[case] expected_flag: TcpFlag,
        #[case] expected_window: u16,
        #[case] expected_checksum: u16,
        #[case] option_hex: &str,
        #[case] tcp_payload_hex: &str,
    ) {
        let packet_data = decode(encoded_packet).expect("Failed to decode hex string");
        let mut ipv4_packet = Ipv4Packet::new();
        assert!(
            ipv4_packet.read(&packet_data).is_ok(),
            "Failed to read IPv4 packet"
        );

        let mut tcp_packet = TcpPacket::new();
        let valid = tcp_packet
            .read(&ipv4_packet)
            .expect("TCP packet read failed when it should not have");

        assert!(valid);
        assert!(tcp_packet.checksum_ok);
        assert_eq!(tcp_packet.src_addr, expected_src_addr);
        assert_eq!(tcp_packet.dst_addr, expected_dst_addr);
        assert_eq!(tcp_packet.tcp_length, expected_tcp_length);
        assert_eq!(tcp_packet.local_port, expected_local_port);
        assert_eq!(tcp_packet.remote_port, expected_remote_port);
        assert_eq!(tcp_packet.seq_number, expected_seq_number);
        assert_eq!(tcp_packet.ack_number, expected_ack_number);
        assert_eq!(tcp_packet.offset, expected_data_offset);
        assert_eq!(tcp_packet.flag, expected_flag);
        assert_eq!(tcp_packet.window_size, expected_window);
        assert_eq!(tcp_packet.checksum, expected_checksum);
        assert_eq!(tcp_packet.option_raw, decode(option_hex).unwrap());
        assert_eq!(tcp_packet.payload, decode(tcp_payload_hex).unwrap());
    }

    #[rstest]
    // too short packet, missing bytes from checksum and payload
    #[case("4500003450bf40008006ff4b0a000091ba0fe618d4a40050dd65a54700000000800220004cbb0000020405b401030302010104")]
    // data offset 4 is shorter than the basic header
    #[case("45000028000040004006cdd5ac140a6eac140a6407d004b0000003e8000001f540122000107b0000")]
    fn test_tcp_packet_read_error(#[case] encoded_packet: &str) {
        let packet_data = decode(encoded_packet).expect("Failed to decode hex string");
        let mut ipv4_packet = Ipv4Packet::new();
        let _ = ipv4_packet.read(&packet_data);
        let mut tcp_packet = TcpPacket::new();
        let result = tcp_packet.read(&ipv4_packet);

        assert!(
            result.is_err(),
            "Expected an error for incorrect TCP packet"
        );
    }

    #[rstest]
    // last option byte is 01 but the checksum was computed over 02
    #[case("4500003450bf40008006ff4b0a000091ba0fe618d4a40050dd65a54700000000800220004cbb0000020405b40103030201010401")]
    // checksum left zero by the sender
    #[case("45000028000040004006cdd5ac140a6eac140a6407d004b0000003e8000001f550122000000000000")]
    fn test_tcp_packet_read_bad_checksum(#[case] encoded_packet: &str) {
        let packet_data = decode(encoded_packet).expect("Failed to decode hex string");
        let mut ipv4_packet = Ipv4Packet::new();
        ipv4_packet.read(&packet_data).expect("Failed to read IPv4 packet");
        let mut tcp_packet = TcpPacket::new();
        let valid = tcp_packet.read(&ipv4_packet).expect("Bad checksum should not reject the segment");

        assert!(valid);
        assert!(!tcp_packet.checksum_ok);
    }

    #[rstest]
    #[case(TcpFlag::SYN, "", "04b007d0000001f4000000005002200014740000")]
    #[case(TcpFlag::SYN, "414141", "04b007d0000001f40000000050022000922f0000414141")]
    fn test_tcp_packet_create(
        #[case] flag: TcpFlag,
        #[case] payload_hex: &str,
        #[case] expected_hex: &str,
    ) {
        let mut tcp_packet = TcpPacket::new();
        tcp_packet.src_addr = [172, 20, 10, 100];
        tcp_packet.dst_addr = [172, 20, 10, 110];
        tcp_packet.local_port = 1200;
        tcp_packet.remote_port = 2000;
        tcp_packet.seq_number = 500;
        tcp_packet.flag = flag;
        tcp_packet.window_size = 8192;
        tcp_packet.payload = decode(payload_hex).unwrap();

        assert_eq!(tcp_packet.create_packet(), decode(expected_hex).unwrap());
    }

    #[test]
    fn test_tcp_flag_ns_bit() {
        let mut tcp_packet = TcpPacket::new();
        tcp_packet.flag = TcpFlag::NS | TcpFlag::ACK;
        let header = tcp_packet.create_packet();

        assert_eq!(header[12], 0x51);
        assert_eq!(header[13], 0x10);
    }
}
