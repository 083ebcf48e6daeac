use crate::symbol::flags::FlagSet;
use std::str::FromStr;
use thiserror::Error;

pub const NULL_SYMBOL: &str = "NIL";
pub const WILDCARD: &str = "?";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SymbolError {
    #[error("Malformed symbol {symbol:?}. {reason}")]
    Malformed {
        symbol: String,
        reason: String
    },
}

impl SymbolError {
    pub fn malformed(symbol: &str, reason: impl Into<String>) -> Self {
        SymbolError::Malformed { symbol: symbol.to_string(), reason: reason.into() }
    }
}

// Shared shape of both grammars: FLAGS(SEQ,ACK,LEN).
// Each numeric field is returned as None when it is the wildcard.
pub(crate) struct SymbolFields {
    pub flags: FlagSet,
    pub seq: Option<u32>,
    pub ack: Option<u32>,
    pub len: Option<usize>,
}

impl SymbolFields {
    pub(crate) fn parse(text: &str) -> Result<Self, SymbolError> {
        let open = text
            .find('(')
            .ok_or_else(|| SymbolError::malformed(text, "missing '('"))?;
        let body = text[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| SymbolError::malformed(text, "missing trailing ')'"))?;
        let flags = FlagSet::from_str(&text[..open])
            .map_err(|e| SymbolError::malformed(text, e.to_string()))?;
        let fields: Vec<&str> = body.split(',').collect();
        if fields.len() != 3 {
            return Err(SymbolError::malformed(
                text,
                format!("expected 3 fields but got {}", fields.len()),
            ));
        }

        Ok(Self {
            flags,
            seq: parse_field(text, fields[0])?
                .map(|v| u32::try_from(v).map_err(|_| SymbolError::malformed(text, "sequence number out of range")))
                .transpose()?,
            ack: parse_field(text, fields[1])?
                .map(|v| u32::try_from(v).map_err(|_| SymbolError::malformed(text, "acknowledgment number out of range")))
                .transpose()?,
            len: parse_field(text, fields[2])?
                .map(|v| usize::try_from(v).map_err(|_| SymbolError::malformed(text, "payload length out of range")))
                .transpose()?,
        })
    }
}

fn parse_field(symbol: &str, field: &str) -> Result<Option<u64>, SymbolError> {
    if field == WILDCARD {
        return Ok(None);
    }
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SymbolError::malformed(symbol, format!("field {:?} is neither a number nor '?'", field)));
    }
    field
        .parse::<u64>()
        .map(Some)
        .map_err(|e| SymbolError::malformed(symbol, format!("field {:?}: {}", field, e)))
}

pub(crate) fn format_field<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| WILDCARD.to_string(), |v| v.to_string())
}
