use crate::symbol::defs::{format_field, SymbolError, SymbolFields, NULL_SYMBOL};
use crate::symbol::flags::FlagSet;
use serde::Serialize;
use std::fmt::{self, Display};
use std::str::FromStr;

/// Harness-level view of one tcp step. `None` fields are wildcards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbstractSymbol {
    pub is_null: bool,
    pub flags: FlagSet,
    pub seq_number: Option<u32>,
    pub ack_number: Option<u32>,
    pub payload_length: Option<usize>,
}

impl AbstractSymbol {
    pub fn new(
        flags: FlagSet,
        seq_number: Option<u32>,
        ack_number: Option<u32>,
        payload_length: Option<usize>,
    ) -> Self {
        Self {
            is_null: false,
            flags,
            seq_number,
            ack_number,
            payload_length,
        }
    }

    pub fn null() -> Self {
        Self {
            is_null: true,
            ..Default::default()
        }
    }

    /// True when the translator resolved both numbers, so a segment can be sent.
    pub fn is_concretizable(&self) -> bool {
        !self.is_null && self.seq_number.is_some() && self.ack_number.is_some()
    }

    /// Drops every field the input left as a wildcard, so that an output is
    /// never more precise than the query that produced it.
    pub fn mask_to(&mut self, input: &AbstractSymbol) {
        if input.seq_number.is_none() {
            self.seq_number = None;
        }
        if input.ack_number.is_none() {
            self.ack_number = None;
        }
        if input.payload_length.is_none() {
            self.payload_length = None;
        }
    }
}

impl FromStr for AbstractSymbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == NULL_SYMBOL {
            return Ok(Self::null());
        }
        let fields = SymbolFields::parse(s)?;

        Ok(Self::new(fields.flags, fields.seq, fields.ack, fields.len))
    }
}

impl Display for AbstractSymbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_null {
            return write!(f, "{}", NULL_SYMBOL);
        }
        write!(
            f,
            "{}({},{},{})",
            self.flags,
            format_field(self.seq_number),
            format_field(self.ack_number),
            format_field(self.payload_length)
        )
    }
}

#[cfg(test)]
mod abstract_symbol_tests {
    use super::*;
    use crate::symbol::flags::Flag;
    use rstest::rstest;

    #[rstest]
    #[case("S(0,?,0)", &[Flag::Syn], Some(0), None, Some(0), "SYN(0,?,0)")]
    #[case("SA(?,?,?)", &[Flag::Syn, Flag::Ack], None, None, None, "SYN+ACK(?,?,?)")]
    #[case("S+A(1,2,3)", &[Flag::Syn, Flag::Ack], Some(1), Some(2), Some(3), "SYN+ACK(1,2,3)")]
    #[case("ACK+PSH(?,4294967295,10)", &[Flag::Ack, Flag::Psh], None, Some(u32::MAX), Some(10), "ACK+PSH(?,4294967295,10)")]
    #[case("R(?,?,?)", &[Flag::Rst], None, None, None, "RST(?,?,?)")]
    #[case("FA(100,200,0)", &[Flag::Fin, Flag::Ack], Some(100), Some(200), Some(0), "ACK+FIN(100,200,0)")]
    fn test_abstract_symbol_parse(
        #[case] text: &str,
        #[case] expected_flags: &[Flag],
        #[case] expected_seq: Option<u32>,
        #[case] expected_ack: Option<u32>,
        #[case] expected_len: Option<usize>,
        #[case] expected_text: &str,
    ) {
        let symbol = AbstractSymbol::from_str(text).expect("Failed to parse abstract symbol");

        assert!(!symbol.is_null);
        assert_eq!(symbol.flags, expected_flags.iter().copied().collect::<FlagSet>());
        assert_eq!(symbol.seq_number, expected_seq);
        assert_eq!(symbol.ack_number, expected_ack);
        assert_eq!(symbol.payload_length, expected_len);
        assert_eq!(symbol.to_string(), expected_text);
        // formatting may change the spelling but never the meaning
        assert_eq!(AbstractSymbol::from_str(&symbol.to_string()).unwrap(), symbol);
    }

    #[rstest]
    #[case("")]
    #[case("S")]
    #[case("S(0,0)")]
    #[case("S(0,0,0,0)")]
    #[case("S(0,0,0")]
    #[case("(0,0,0)")]
    #[case("X(0,0,0)")]
    #[case("S(-1,0,0)")]
    #[case("S(+1,0,0)")]
    #[case("S(a,0,0)")]
    #[case("S(0,,0)")]
    #[case("S(4294967296,0,0)")]
    #[case("S(0,0,0) ")]
    #[case("S(0,0,0)junk")]
    #[case("nil")]
    fn test_abstract_symbol_parse_error(#[case] text: &str) {
        let result = AbstractSymbol::from_str(text);

        assert!(
            matches!(result, Err(SymbolError::Malformed { .. })),
            "Expected a malformed symbol error for {:?}",
            text
        );
    }

    #[test]
    fn test_abstract_symbol_null() {
        let symbol = AbstractSymbol::from_str("NIL").unwrap();

        assert!(symbol.is_null);
        assert!(!symbol.is_concretizable());
        assert_eq!(symbol.to_string(), "NIL");
        assert_eq!(AbstractSymbol::null().to_string(), "NIL");
    }

    #[rstest]
    #[case("S(?,?,?)", "SA(10,20,0)", "SYN+ACK(?,?,?)")]
    #[case("S(0,?,0)", "SA(10,20,0)", "SYN+ACK(10,?,0)")]
    #[case("A(0,1,?)", "A(10,20,5)", "ACK(10,20,?)")]
    #[case("A(0,1,0)", "A(10,20,5)", "ACK(10,20,5)")]
    fn test_abstract_symbol_mask_to(
        #[case] input: &str,
        #[case] output: &str,
        #[case] expected: &str,
    ) {
        let input = AbstractSymbol::from_str(input).unwrap();
        let mut output = AbstractSymbol::from_str(output).unwrap();
        output.mask_to(&input);

        assert_eq!(output.to_string(), expected);
    }
}
