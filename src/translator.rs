use crate::symbol::{abstract_symbol::AbstractSymbol, concrete::ConcreteSymbol};
use anyhow::{Context, Result};
use log;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::str::FromStr;
use thiserror::Error;

const REQUEST_ABSTRACT: &str = "ABSTRACT";
const REQUEST_CONCRETE: &str = "CONCRETE";
const REQUEST_RESET: &str = "RESET";
// Reply of the concretizer when the requested transition has no valid numbers.
const REPLY_UNDEFINED: &str = "undefined";

#[derive(Error, Debug)]
pub enum TranslatorError {
    #[error("Translator is unavailable. {reason}")]
    Unavailable {
        reason: String
    },
}

/// Synchronous client of the component that owns sequence/ack numbering.
pub trait Translator {
    /// Resolves seq/ack of `symbol`. Either of them stays `None` when the
    /// transition cannot be concretized.
    fn concretize(&mut self, symbol: &AbstractSymbol) -> Result<AbstractSymbol>;
    /// Reports a segment the implementation actually sent.
    fn observe(&mut self, symbol: &ConcreteSymbol) -> Result<()>;
    fn reset(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}

/// Line based request/response translator over any duplex byte channel.
/// At most one request is outstanding at a time.
pub struct LineTranslator<R: BufRead, W: Write> {
    reader: R,
    writer: W,
    child: Option<Child>,
    closed: bool,
}

pub type ProcessTranslator = LineTranslator<BufReader<ChildStdout>, ChildStdin>;

impl<R: BufRead, W: Write> LineTranslator<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            child: None,
            closed: false,
        }
    }

    fn unavailable(&mut self, reason: String) -> anyhow::Error {
        self.closed = true;
        TranslatorError::Unavailable { reason }.into()
    }

    fn request(&mut self, line: &str) -> Result<String> {
        if self.closed {
            return Err(TranslatorError::Unavailable { reason: "channel already closed".to_string() }.into());
        }
        log::debug!("Translator request: {}", line);
        if let Err(e) = writeln!(self.writer, "{}", line).and_then(|_| self.writer.flush()) {
            return Err(self.unavailable(format!("Failed to write request. Err: {}", e)));
        }
        let mut reply = String::new();
        match self.reader.read_line(&mut reply) {
            Ok(0) => Err(self.unavailable("channel closed by peer".to_string())),
            Ok(_) => {
                let reply = reply.trim_end_matches(['\r', '\n']).to_string();
                log::debug!("Translator reply: {}", reply);
                Ok(reply)
            }
            Err(e) => Err(self.unavailable(format!("Failed to read reply. Err: {}", e))),
        }
    }
}

impl ProcessTranslator {
    /// Starts the concretizer as a child process talking over stdin/stdout.
    pub fn spawn(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next().context("Translator command is empty.")?;
        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .context(format!("Failed to execute translator {:?}.", command_line))?;
        let stdin = child.stdin.take().context("Cannot take stdin from translator.")?;
        let stdout = child.stdout.take().context("Cannot take stdout from translator.")?;
        log::info!("Started translator process (pid={}).", child.id());
        let mut translator = Self::new(BufReader::new(stdout), stdin);
        translator.child = Some(child);
        Ok(translator)
    }
}

impl<R: BufRead, W: Write> Translator for LineTranslator<R, W> {
    fn concretize(&mut self, symbol: &AbstractSymbol) -> Result<AbstractSymbol> {
        let reply = self.request(&format!("{} {}", REQUEST_ABSTRACT, symbol))?;
        if reply == REPLY_UNDEFINED {
            let mut unresolved = symbol.clone();
            unresolved.seq_number = None;
            unresolved.ack_number = None;
            return Ok(unresolved);
        }
        let resolved = AbstractSymbol::from_str(&reply)
            .context(format!("Translator answered {} with an invalid symbol.", symbol))?;
        Ok(resolved)
    }

    fn observe(&mut self, symbol: &ConcreteSymbol) -> Result<()> {
        self.request(&format!("{} {}", REQUEST_CONCRETE, symbol))?;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.request(REQUEST_RESET)?;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.closed = true;
        if let Some(mut child) = self.child.take() {
            log::info!("Stopping translator process (pid={}).", child.id());
            child.kill().context("Failed to kill translator process.")?;
            child.wait().context("Failed to wait translator process.")?;
        }
        Ok(())
    }
}

impl<R: BufRead, W: Write> Drop for LineTranslator<R, W> {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
