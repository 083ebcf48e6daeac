use crate::oracle::OracleSink;
use crate::sender::{random_payload, SegmentSender};
use crate::symbol::{
    abstract_symbol::AbstractSymbol,
    concrete::{ConcreteSymbol, PortPair},
    pair::{AbstractOrderedPair, ConcreteOrderedPair},
};
use crate::tracker::Tracker;
use crate::translator::Translator;
use anyhow::{Context, Result};
use log;
use rand::Rng;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const SOURCE_PORT_RANGE: RangeInclusive<u16> = 1024..=65535;
pub const RESET_QUERY: &str = "R(?,?,?)";

pub fn random_source_port() -> u16 {
    rand::thread_rng().gen_range(SOURCE_PORT_RANGE)
}

/// Runs queries against the implementation under test, one symbol at a time.
pub struct Adapter<T: Translator, S: SegmentSender, O: OracleSink> {
    translator: T,
    sender: S,
    oracle: O,
    tracker: Arc<Tracker>,
    source_port: u16,
    destination_port: u16,
    timeout: Duration,
}

impl<T: Translator, S: SegmentSender, O: OracleSink> Adapter<T, S, O> {
    pub fn new(
        translator: T,
        sender: S,
        oracle: O,
        tracker: Arc<Tracker>,
        destination_port: u16,
        timeout: Duration,
    ) -> Self {
        Self {
            translator,
            sender,
            oracle,
            tracker,
            source_port: random_source_port(),
            destination_port,
            timeout,
        }
    }

    pub fn with_source_port(mut self, source_port: u16) -> Self {
        self.source_port = source_port;
        self
    }

    /// Ports of the segments this adapter sends.
    pub fn ports(&self) -> PortPair {
        PortPair::new(self.source_port, self.destination_port)
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    /// Answers a space separated query with one abstract output per input.
    /// A malformed token fails the whole query before anything is recorded.
    pub fn handle_query(&mut self, query: &str) -> Result<String> {
        let inputs = query
            .split(' ')
            .map(AbstractSymbol::from_str)
            .collect::<Result<Vec<_>, _>>()?;

        let mut abstract_pair = AbstractOrderedPair::new();
        let mut concrete_pair = ConcreteOrderedPair::new();
        for input in inputs {
            let (concrete_input, concrete_output, abstract_output) = self.process_symbol(&input)?;
            abstract_pair.push(input, abstract_output);
            concrete_pair.push(concrete_input, concrete_output);
        }

        let answer = abstract_pair
            .outputs
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        self.oracle
            .add(&abstract_pair, &concrete_pair)
            .context("Failed to store oracle record.")?;
        log::info!("Query {} answered {}", query, answer);

        Ok(answer)
    }

    fn process_symbol(&mut self, input: &AbstractSymbol) -> Result<(ConcreteSymbol, ConcreteSymbol, AbstractSymbol)> {
        if input.is_null {
            log::info!("{} is not sent.", input);
            return Ok((ConcreteSymbol::null(), ConcreteSymbol::null(), AbstractSymbol::null()));
        }
        let resolved = self.translator.concretize(input)?;
        let payload = random_payload(resolved.payload_length.unwrap_or(0));
        let concrete_input = match ConcreteSymbol::from_resolved(&resolved, self.ports(), payload) {
            Some(symbol) => symbol,
            None => {
                log::info!("{} has no concrete transition, nothing is sent.", input);
                return Ok((ConcreteSymbol::null(), ConcreteSymbol::null(), AbstractSymbol::null()));
            }
        };

        self.tracker.check_capture()?;
        self.tracker.clear_last_response();
        if let Err(e) = self.sender.send(&concrete_input) {
            log::warn!("Failed to send {}. Err: {:?}", concrete_input, e);
        }
        let response = self.tracker.wait_for_response(self.ports().reversed(), self.timeout)?;

        let (concrete_output, abstract_output) = match response {
            Some(response) => {
                self.translator.observe(&response)?;
                let mut abstract_output = response.to_abstract();
                abstract_output.mask_to(input);
                (response, abstract_output)
            }
            None => (ConcreteSymbol::null(), AbstractSymbol::null()),
        };
        log::info!(
            "abstract in: {}, concrete in: {}, concrete out: {}, abstract out: {}",
            input,
            concrete_input,
            concrete_output,
            abstract_output
        );

        Ok((concrete_input, concrete_output, abstract_output))
    }

    /// Aborts the current connection, forgets every tracked response and
    /// moves to a fresh source port.
    pub fn reset(&mut self) -> Result<()> {
        let answer = self.handle_query(RESET_QUERY)?;
        log::debug!("Reset segment answered {}.", answer);
        self.translator.reset()?;
        self.tracker.reset();
        self.source_port = random_source_port();
        log::info!("Adapter reset. New ports {}.", self.ports());

        Ok(())
    }

    /// Ends the capture loop and the translator. No wait may be in flight.
    pub fn stop(&mut self) -> Result<()> {
        self.tracker.stop()?;
        self.translator.stop()?;
        log::info!("Adapter stopped.");

        Ok(())
    }
}
