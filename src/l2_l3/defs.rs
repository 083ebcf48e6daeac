use thiserror::Error;

// https://www.iana.org/assignments/ieee-802-numbers/ieee-802-numbers.xhtml
#[derive(Debug, PartialEq)]
pub enum EtherType {
    // 16 bit
    IPv4 = 0x0800,
    ARP = 0x0806,
    Unknown
}

impl From<u16> for EtherType {
    fn from(value: u16) -> Self {
        match value {
            v if v == EtherType::IPv4 as u16 => EtherType::IPv4,
            v if v == EtherType::ARP as u16 => EtherType::ARP,
            _ => EtherType::Unknown
        }
    }
}

// https://www.iana.org/assignments/protocol-numbers/protocol-numbers.xhtml
#[derive(Debug, PartialEq)]
pub enum Ipv4Type {
    // 8 bit
    ICMP = 0x1,
    TCP = 0x6,
    UDP = 0x11,
    Unknown
}

impl From<u8> for Ipv4Type {
    fn from(value: u8) -> Self {
        match value {
            v if v == Ipv4Type::ICMP as u8 => Ipv4Type::ICMP,
            v if v == Ipv4Type::TCP as u8 => Ipv4Type::TCP,
            v if v == Ipv4Type::UDP as u8 => Ipv4Type::UDP,
            _ => Ipv4Type::Unknown
        }
    }
}

impl From<Ipv4Type> for u8 {
    fn from(e: Ipv4Type) -> Self {
        e as u8
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Cannot open capture on interface {interface}. {reason}")]
    OpenFailed {
        interface: String,
        reason: String
    },
    #[error("Capture source failed. {reason}")]
    SourceFailed {
        reason: String
    },
    #[error("Cannot open raw transport channel. {reason}")]
    TransportFailed {
        reason: String
    },
}
