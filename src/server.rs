use crate::adapter::Adapter;
use crate::l2_l3::defs::CaptureError;
use crate::oracle::OracleSink;
use crate::sender::SegmentSender;
use crate::symbol::defs::SymbolError;
use crate::translator::{Translator, TranslatorError};
use anyhow::{Context, Result};
use log;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;

pub const STOP_COMMAND: &str = "STOP";
pub const RESET_COMMAND: &str = "RESET";

/// What a control session drives.
pub trait QueryHandler {
    fn handle_query(&mut self, query: &str) -> Result<String>;
    fn reset(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}

impl<T: Translator, S: SegmentSender, O: OracleSink> QueryHandler for Adapter<T, S, O> {
    fn handle_query(&mut self, query: &str) -> Result<String> {
        Adapter::handle_query(self, query)
    }

    fn reset(&mut self) -> Result<()> {
        Adapter::reset(self)
    }

    fn stop(&mut self) -> Result<()> {
        Adapter::stop(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed the connection or sent an empty line.
    Closed,
    /// `STOP` was received and the handler is torn down.
    Stopped,
}

/// Serves one line-oriented control session: one reply line per request line.
pub fn serve_session<H: QueryHandler, R: BufRead, W: Write>(
    handler: &mut H,
    mut reader: R,
    mut writer: W,
) -> Result<SessionEnd> {
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).context("Failed to read control line.")? == 0 {
            return Ok(SessionEnd::Closed);
        }
        let line = line.trim_end_matches(['\r', '\n']);
        log::debug!("Control line: {:?}", line);

        match line {
            "" => return Ok(SessionEnd::Closed),
            STOP_COMMAND => {
                handler.stop()?;
                writeln!(writer, "{}", STOP_COMMAND)?;
                writer.flush()?;
                return Ok(SessionEnd::Stopped);
            }
            RESET_COMMAND => {
                handler.reset()?;
                writeln!(writer, "{}", RESET_COMMAND)?;
            }
            query => {
                let answer = handler.handle_query(query)?;
                writeln!(writer, "{}", answer)?;
            }
        }
        writer.flush()?;
    }
}

/// Accepts control sessions one at a time until `STOP` or a fatal error.
pub fn run<H: QueryHandler>(handler: &mut H, listener: TcpListener) -> Result<()> {
    log::info!("Control server listening on {}.", listener.local_addr()?);
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("Failed to accept control connection. Err: {:?}", e);
                continue;
            }
        };
        let peer = stream.peer_addr()?;
        log::info!("Control session from {} opened.", peer);
        let reader = BufReader::new(stream.try_clone().context("Failed to clone control stream.")?);

        match serve_session(handler, reader, &stream) {
            Ok(SessionEnd::Stopped) => {
                log::info!("Control session from {} stopped the adapter.", peer);
                return Ok(());
            }
            Ok(SessionEnd::Closed) => log::info!("Control session from {} closed.", peer),
            Err(e) if e.downcast_ref::<TranslatorError>().is_some() => {
                log::error!("Translator is gone, shutting down. Err: {:?}", e);
                return Err(e);
            }
            Err(e) if e.downcast_ref::<CaptureError>().is_some() => {
                log::error!("Capture is gone, shutting down. Err: {:?}", e);
                return Err(e);
            }
            Err(e) if e.downcast_ref::<SymbolError>().is_some() => {
                log::warn!("Closing control session from {}. Err: {}", peer, e);
            }
            Err(e) => log::warn!("Control session from {} failed. Err: {:?}", peer, e),
        }
    }

    Ok(())
}
