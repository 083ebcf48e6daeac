use crate::l2_l3::{
    defs::{CaptureError, EtherType, Ipv4Type},
    ethernet::{EthernetPacket, FrameSource},
    ip::Ipv4Packet,
};
use crate::symbol::{
    concrete::{ConcreteSymbol, PortPair},
    flags::{Flag, FlagSet},
};
use crate::tcp::packet::TcpPacket;
use anyhow::{Context, Result};
use log;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

// The bounded wait checks for a response this many times, evenly spaced.
pub const WAIT_POLL_STEPS: u32 = 10;
pub const CAPTURE_READ_TIMEOUT: Duration = Duration::from_millis(100);

// Compact flag patterns (URG ignored) whose exact duplicates are always
// treated as retransmissions.
const BARE_CONTROL_PATTERNS: [&str; 7] = ["SA", "AS", "AF", "FA", "S", "P", "PA"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub ports: PortPair,
    pub seq: u32,
    pub ack: u32,
    pub flags: FlagSet,
}

impl Fingerprint {
    pub fn of(response: &ConcreteSymbol) -> Self {
        Self {
            ports: response.port_pair(),
            seq: response.seq_number,
            ack: response.ack_number,
            flags: response.flags,
        }
    }

    fn is_push_ack(&self) -> bool {
        self.flags.contains(Flag::Psh) && self.flags.contains(Flag::Ack)
    }
}

/// Accepted responses of the current session.
///
/// `history` only grows until the next reset. `last_responses` holds the
/// newest accepted response per port pair and is cleared before every send.
#[derive(Debug, Default)]
pub struct ResponseState {
    history: HashSet<Fingerprint>,
    last_responses: HashMap<PortPair, ConcreteSymbol>,
}

impl ResponseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_retransmission(&self, response: &ConcreteSymbol) -> bool {
        let fingerprint = Fingerprint::of(response);
        let pattern = fingerprint.flags.without(Flag::Urg).compact();
        let mut is_retransmission = self.history.contains(&fingerprint)
            && BARE_CONTROL_PATTERNS.contains(&pattern.as_str());

        // A data segment is identified by its sequence number. Its ack may have
        // moved on since the first copy, so the exact fingerprint is not enough.
        if !is_retransmission && fingerprint.is_push_ack() && !response.payload.is_empty() {
            is_retransmission = self.history.iter().any(|seen| {
                seen.ports == fingerprint.ports && seen.seq == fingerprint.seq && seen.is_push_ack()
            });
        }

        is_retransmission
    }

    /// Records `response` unless it is a retransmission. Returns whether it was accepted.
    pub fn accept(&mut self, response: ConcreteSymbol) -> bool {
        if self.is_retransmission(&response) {
            return false;
        }
        self.history.insert(Fingerprint::of(&response));
        self.last_responses.insert(response.port_pair(), response);
        true
    }

    pub fn last_response(&self, ports: PortPair) -> Option<&ConcreteSymbol> {
        self.last_responses.get(&ports)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn last_response_count(&self) -> usize {
        self.last_responses.len()
    }

    pub fn clear_last_responses(&mut self) {
        self.last_responses.clear();
    }

    pub fn clear(&mut self) {
        self.last_responses.clear();
        self.history.clear();
    }
}

/// Follows the traffic sent by the implementation under test.
///
/// The capture thread is the only writer of the response state; the query
/// side only reads it or clears it.
pub struct Tracker {
    iut_addr: Ipv4Addr,
    state: RwLock<ResponseState>,
    stopped: AtomicBool,
    // Set when the capture source dies, so waiters do not mistake it for quiescence.
    failure: Mutex<Option<String>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Tracker {
    pub fn new(iut_addr: Ipv4Addr) -> Arc<Self> {
        Arc::new(Self {
            iut_addr,
            state: RwLock::new(ResponseState::new()),
            stopped: AtomicBool::new(false),
            failure: Mutex::new(None),
            thread: Mutex::new(None),
        })
    }

    pub fn start(self: &Arc<Self>, source: Box<dyn FrameSource>) -> Result<()> {
        let mut thread_slot = self.thread.lock().unwrap();
        anyhow::ensure!(thread_slot.is_none(), "Tracker is already running.");
        self.stopped.store(false, Ordering::SeqCst);
        *self.failure.lock().unwrap() = None;
        let tracker = self.clone();
        let handle = thread::Builder::new()
            .name("tracker".to_string())
            .spawn(move || tracker.capture_thread(source))
            .context("Failed to spawn tracker capture thread.")?;
        *thread_slot = Some(handle);

        Ok(())
    }

    /// Ends the capture loop and waits for it. Must not race a pending wait.
    pub fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.lock().unwrap().take() {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("Tracker capture thread panicked."))?;
        }
        log::info!("Tracker stopped.");

        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Fails once the capture source has broken down.
    pub fn check_capture(&self) -> Result<()> {
        match self.failure.lock().unwrap().as_ref() {
            Some(reason) => Err(CaptureError::SourceFailed { reason: reason.clone() }.into()),
            None => Ok(()),
        }
    }

    fn capture_thread(&self, mut source: Box<dyn FrameSource>) {
        log::info!("Starting Tracker capture_thread. (ip src {})", self.iut_addr);
        while !self.is_stopped() {
            match source.next_frame() {
                Ok(Some(frame)) => {
                    if let Err(e) = self.handle_frame(&frame) {
                        log::debug!("Discarding captured frame. Err: {:?}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!("Capture source failed, tracker ends. Err: {:?}", e);
                    *self.failure.lock().unwrap() = Some(format!("{:#}", e));
                    break;
                }
            }
        }
        log::info!("Tracker capture_thread finished.");
    }

    /// Decodes one link-layer frame. Anything that is not tcp sent by the
    /// implementation under test is ignored.
    pub fn handle_frame(&self, frame: &[u8]) -> Result<()> {
        log::trace!("Frame captured: {}", hex::encode(frame));
        let mut ethernet_packet = EthernetPacket::new();
        if !ethernet_packet.read(frame)? || EtherType::from(ethernet_packet.ethertype) != EtherType::IPv4 {
            return Ok(());
        }
        let mut ipv4_packet = Ipv4Packet::new();
        if !ipv4_packet.read(&ethernet_packet.payload)? {
            return Ok(());
        }
        if Ipv4Type::from(ipv4_packet.protocol) != Ipv4Type::TCP
            || Ipv4Addr::from(ipv4_packet.src_addr) != self.iut_addr
        {
            return Ok(());
        }
        let mut tcp_packet = TcpPacket::new();
        tcp_packet.read(&ipv4_packet).context("Failed to read tcp segment.")?;
        log::trace!("Captured {}", tcp_packet.print_general_info());
        self.handle_segment(ConcreteSymbol::from(&tcp_packet));

        Ok(())
    }

    /// Classifies one captured response. Returns whether it was accepted.
    pub fn handle_segment(&self, response: ConcreteSymbol) -> bool {
        let description = format!("{} on {}", response, response.port_pair());
        let accepted = self.state.write().unwrap().accept(response);
        if accepted {
            log::debug!("Accepted response {}.", description);
        } else {
            log::debug!("Ignoring retransmission {}.", description);
        }
        accepted
    }

    pub fn last_response(&self, ports: PortPair) -> Option<ConcreteSymbol> {
        self.state.read().unwrap().last_response(ports).cloned()
    }

    /// Staircase poll: sleeps `timeout / 10` then checks, ten times at most.
    /// The first response found on `ports` wins. `Ok(None)` is quiescence;
    /// a dead capture source is an error instead.
    pub fn wait_for_response(&self, ports: PortPair, timeout: Duration) -> Result<Option<ConcreteSymbol>> {
        let step = timeout / WAIT_POLL_STEPS;
        for _ in 0..WAIT_POLL_STEPS {
            thread::sleep(step);
            if let Some(response) = self.last_response(ports) {
                return Ok(Some(response));
            }
            self.check_capture()?;
        }
        log::debug!("No response on {} within {:?}.", ports, timeout);
        Ok(None)
    }

    pub fn clear_last_response(&self) {
        self.state.write().unwrap().clear_last_responses();
    }

    pub fn reset(&self) {
        self.state.write().unwrap().clear();
    }

    pub fn history_len(&self) -> usize {
        self.state.read().unwrap().history_len()
    }

    pub fn last_response_count(&self) -> usize {
        self.state.read().unwrap().last_response_count()
    }
}
