#![allow(dead_code)]
use anyhow::Result;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tcp_adapter::{
    l2_l3::{defs::EtherType, ethernet::{EthernetPacket, FrameSource}},
    sender::{build_datagram, SegmentSender},
    symbol::{abstract_symbol::AbstractSymbol, concrete::ConcreteSymbol},
    translator::Translator,
};

pub const IUT_ADDR: Ipv4Addr = Ipv4Addr::new(172, 20, 10, 110);
pub const ADAPTER_ADDR: Ipv4Addr = Ipv4Addr::new(172, 20, 10, 100);
pub const IUT_PORT: u16 = 2000;
pub const ADAPTER_PORT: u16 = 1200;
pub const TIMEOUT: Duration = Duration::from_millis(300);

/// Capture source fed by the scripted implementation below.
pub struct ChannelSource {
    rx: Receiver<Vec<u8>>,
}

impl FrameSource for ChannelSource {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        match self.rx.recv_timeout(Duration::from_millis(10)) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }
}

/// Capture source whose interface is gone.
pub struct BrokenSource;

impl FrameSource for BrokenSource {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        anyhow::bail!("interface went down")
    }
}

/// Plays the implementation under test: every segment sent to it is
/// answered with the next scripted reply, put on the wire as an ethernet frame.
/// A reply may be sent more than once to mimic a retransmission.
pub struct ScriptedIut {
    tx: Sender<Vec<u8>>,
    replies: Vec<Vec<&'static str>>,
    pub sent: Vec<ConcreteSymbol>,
}

pub fn scripted_iut(replies: Vec<Vec<&'static str>>) -> (ScriptedIut, ChannelSource) {
    let (tx, rx) = mpsc::channel();
    (ScriptedIut { tx, replies, sent: Vec::new() }, ChannelSource { rx })
}

pub fn frame_from_iut(reply: &ConcreteSymbol) -> Vec<u8> {
    let mut ethernet_packet = EthernetPacket::new();
    ethernet_packet.dst = [0x5a, 0x9f, 0x4a, 0x65, 0xc4, 0x1f];
    ethernet_packet.src = [0xbe, 0xbe, 0xff, 0x74, 0xa5, 0x78];
    ethernet_packet.ethertype = EtherType::IPv4 as u16;
    ethernet_packet.payload = build_datagram(reply, IUT_ADDR, ADAPTER_ADDR, 0);
    ethernet_packet.create_packet()
}

impl SegmentSender for ScriptedIut {
    fn send(&mut self, symbol: &ConcreteSymbol) -> Result<()> {
        self.sent.push(symbol.clone());
        if self.replies.is_empty() {
            return Ok(());
        }
        for text in self.replies.remove(0) {
            let mut reply = ConcreteSymbol::from_str(text)?;
            reply.source_port = symbol.destination_port;
            reply.destination_port = symbol.source_port;
            self.tx.send(frame_from_iut(&reply))?;
        }
        Ok(())
    }
}

/// Resolves inputs from a fixed table; anything else keeps its wildcards.
#[derive(Default)]
pub struct TableTranslator {
    pub table: HashMap<String, (u32, u32)>,
    pub requests: Vec<String>,
}

impl TableTranslator {
    pub fn new(table: &[(&str, u32, u32)]) -> Self {
        Self {
            table: table.iter().map(|(k, s, a)| (k.to_string(), (*s, *a))).collect(),
            requests: Vec::new(),
        }
    }
}

impl Translator for TableTranslator {
    fn concretize(&mut self, symbol: &AbstractSymbol) -> Result<AbstractSymbol> {
        self.requests.push(format!("ABSTRACT {}", symbol));
        let mut resolved = symbol.clone();
        if let Some((seq, ack)) = self.table.get(&symbol.to_string()) {
            resolved.seq_number = Some(*seq);
            resolved.ack_number = Some(*ack);
        }
        Ok(resolved)
    }

    fn observe(&mut self, symbol: &ConcreteSymbol) -> Result<()> {
        self.requests.push(format!("CONCRETE {}", symbol));
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.requests.push("RESET".to_string());
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}
