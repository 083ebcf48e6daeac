use crate::symbol::abstract_symbol::AbstractSymbol;
use crate::symbol::defs::{SymbolError, SymbolFields, NULL_SYMBOL};
use crate::symbol::flags::FlagSet;
use crate::tcp::packet::TcpPacket;
use serde::{Serialize, Serializer};
use std::fmt::{self, Display};
use std::str::FromStr;

const DEFAULT_SOURCE_PORT: u16 = 20;
const DEFAULT_DESTINATION_PORT: u16 = 80;
const DEFAULT_WINDOW: u16 = 8192;
const FILLER_BYTE: u8 = b'A';

/// (source port, destination port) of a segment as seen on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct PortPair {
    pub source: u16,
    pub destination: u16,
}

impl PortPair {
    pub fn new(source: u16, destination: u16) -> Self {
        Self { source, destination }
    }

    /// The pair a reply to this segment travels on.
    pub fn reversed(&self) -> Self {
        Self::new(self.destination, self.source)
    }
}

impl Display for PortPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}->{}", self.source, self.destination)
    }
}

/// Fully specified wire-level view of one tcp segment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcreteSymbol {
    pub is_null: bool,
    pub source_port: u16,
    pub destination_port: u16,
    pub seq_number: u32,
    pub ack_number: u32,
    pub data_offset: Option<u8>,
    pub reserved: u8,
    pub flags: FlagSet,
    pub window: u16,
    pub checksum: Option<u16>,
    pub urgent_pointer: u16,
    #[serde(serialize_with = "serialize_payload")]
    pub payload: Vec<u8>,
}

impl Default for ConcreteSymbol {
    fn default() -> Self {
        Self {
            is_null: false,
            source_port: DEFAULT_SOURCE_PORT,
            destination_port: DEFAULT_DESTINATION_PORT,
            seq_number: 0,
            ack_number: 0,
            data_offset: None,
            reserved: 0,
            flags: FlagSet::new(),
            window: DEFAULT_WINDOW,
            checksum: None,
            urgent_pointer: 0,
            payload: Vec::new(),
        }
    }
}

impl ConcreteSymbol {
    pub fn null() -> Self {
        Self {
            is_null: true,
            ..Default::default()
        }
    }

    /// Builds the outbound segment for a symbol the translator has resolved.
    /// Returns `None` when seq or ack is still a wildcard.
    pub fn from_resolved(resolved: &AbstractSymbol, ports: PortPair, payload: Vec<u8>) -> Option<Self> {
        if !resolved.is_concretizable() {
            return None;
        }
        Some(Self {
            source_port: ports.source,
            destination_port: ports.destination,
            seq_number: resolved.seq_number?,
            ack_number: resolved.ack_number?,
            flags: resolved.flags,
            payload,
            ..Default::default()
        })
    }

    pub fn filler(length: usize) -> Vec<u8> {
        vec![FILLER_BYTE; length]
    }

    pub fn port_pair(&self) -> PortPair {
        PortPair::new(self.source_port, self.destination_port)
    }

    /// The abstract view at full precision, before any masking.
    pub fn to_abstract(&self) -> AbstractSymbol {
        if self.is_null {
            return AbstractSymbol::null();
        }
        AbstractSymbol::new(
            self.flags,
            Some(self.seq_number),
            Some(self.ack_number),
            Some(self.payload.len()),
        )
    }
}

impl From<&TcpPacket> for ConcreteSymbol {
    fn from(packet: &TcpPacket) -> Self {
        Self {
            is_null: false,
            source_port: packet.local_port,
            destination_port: packet.remote_port,
            seq_number: packet.seq_number,
            ack_number: packet.ack_number,
            data_offset: Some(packet.offset),
            reserved: packet.reserved,
            flags: FlagSet::from(packet.flag),
            window: packet.window_size,
            checksum: Some(packet.checksum),
            urgent_pointer: packet.urg_pointer,
            payload: packet.payload.clone(),
        }
    }
}

impl FromStr for ConcreteSymbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == NULL_SYMBOL {
            return Ok(Self::null());
        }
        let fields = SymbolFields::parse(s)?;
        let (seq, ack, len) = match (fields.seq, fields.ack, fields.len) {
            (Some(seq), Some(ack), Some(len)) => (seq, ack, len),
            _ => return Err(SymbolError::malformed(s, "concrete symbols cannot contain '?'")),
        };

        Ok(Self {
            seq_number: seq,
            ack_number: ack,
            flags: fields.flags,
            payload: Self::filler(len),
            ..Default::default()
        })
    }
}

impl Display for ConcreteSymbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_null {
            return write!(f, "{}", NULL_SYMBOL);
        }
        write!(
            f,
            "{}({},{},{})",
            self.flags,
            self.seq_number,
            self.ack_number,
            self.payload.len()
        )
    }
}

fn serialize_payload<S: Serializer>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(payload))
}
