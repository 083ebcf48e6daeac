use crate::symbol::defs::SymbolError;
use crate::tcp::packet::TcpFlag;
use serde::{Serialize, Serializer};
use std::fmt::{self, Display};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Flag {
    Syn,
    Ack,
    Rst,
    Fin,
    Psh,
    Urg,
    Ece,
    Cwr,
    Ns,
}

// Order of the human readable form, e.g. SYN+ACK.
pub const FLAG_ORDER: [Flag; 9] = [
    Flag::Syn,
    Flag::Ack,
    Flag::Rst,
    Flag::Fin,
    Flag::Psh,
    Flag::Urg,
    Flag::Ece,
    Flag::Cwr,
    Flag::Ns,
];

// Order of the compact form, e.g. FA for FIN+ACK.
pub const COMPACT_ORDER: [Flag; 9] = [
    Flag::Fin,
    Flag::Syn,
    Flag::Rst,
    Flag::Psh,
    Flag::Ack,
    Flag::Urg,
    Flag::Ece,
    Flag::Cwr,
    Flag::Ns,
];

impl Flag {
    pub fn letter(self) -> char {
        match self {
            Flag::Syn => 'S',
            Flag::Ack => 'A',
            Flag::Rst => 'R',
            Flag::Fin => 'F',
            Flag::Psh => 'P',
            Flag::Urg => 'U',
            Flag::Ece => 'E',
            Flag::Cwr => 'C',
            Flag::Ns => 'N',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Flag::Syn => "SYN",
            Flag::Ack => "ACK",
            Flag::Rst => "RST",
            Flag::Fin => "FIN",
            Flag::Psh => "PSH",
            Flag::Urg => "URG",
            Flag::Ece => "ECE",
            Flag::Cwr => "CWR",
            Flag::Ns => "NS",
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        FLAG_ORDER.into_iter().find(|f| f.letter() == letter)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        FLAG_ORDER.into_iter().find(|f| f.name() == name)
    }

    fn bit(self) -> TcpFlag {
        match self {
            Flag::Syn => TcpFlag::SYN,
            Flag::Ack => TcpFlag::ACK,
            Flag::Rst => TcpFlag::RST,
            Flag::Fin => TcpFlag::FIN,
            Flag::Psh => TcpFlag::PSH,
            Flag::Urg => TcpFlag::URG,
            Flag::Ece => TcpFlag::ECE,
            Flag::Cwr => TcpFlag::CWR,
            Flag::Ns => TcpFlag::NS,
        }
    }
}

impl Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Set of tcp control flags, stored as the on-wire bits.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FlagSet(TcpFlag);

impl FlagSet {
    pub fn new() -> Self {
        Self(TcpFlag::empty())
    }

    pub fn contains(&self, flag: Flag) -> bool {
        self.0.contains(flag.bit())
    }

    pub fn insert(&mut self, flag: Flag) {
        self.0.insert(flag.bit());
    }

    pub fn remove(&mut self, flag: Flag) {
        self.0.remove(flag.bit());
    }

    pub fn without(mut self, flag: Flag) -> Self {
        self.remove(flag);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = Flag> + '_ {
        FLAG_ORDER.into_iter().filter(|f| self.contains(*f))
    }

    /// Single letters in F,S,R,P,A,U,E,C,N order, e.g. "SA" or "FA".
    pub fn compact(&self) -> String {
        COMPACT_ORDER
            .into_iter()
            .filter(|f| self.contains(*f))
            .map(Flag::letter)
            .collect()
    }

    /// Full names in canonical order joined by '+', e.g. "SYN+ACK".
    pub fn human(&self) -> String {
        self.iter().map(Flag::name).collect::<Vec<_>>().join("+")
    }
}

impl From<TcpFlag> for FlagSet {
    fn from(flag: TcpFlag) -> Self {
        Self(flag)
    }
}

impl From<FlagSet> for TcpFlag {
    fn from(flags: FlagSet) -> Self {
        flags.0
    }
}

impl FromIterator<Flag> for FlagSet {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        let mut flags = FlagSet::new();
        for flag in iter {
            flags.insert(flag);
        }
        flags
    }
}

impl FromStr for FlagSet {
    type Err = SymbolError;

    // A '+' separated part is either a full name (SYN) or a run of letters (SA).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(SymbolError::malformed(s, "no flags given"));
        }
        let mut flags = FlagSet::new();
        for part in s.split('+') {
            if part.is_empty() {
                return Err(SymbolError::malformed(s, "empty flag between '+'"));
            }
            if let Some(flag) = Flag::from_name(part) {
                flags.insert(flag);
                continue;
            }
            for letter in part.chars() {
                let flag = Flag::from_letter(letter).ok_or_else(|| {
                    SymbolError::malformed(s, format!("unknown flag {:?}", letter))
                })?;
                flags.insert(flag);
            }
        }

        Ok(flags)
    }
}

impl Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.human())
    }
}

impl fmt::Debug for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FlagSet({})", self.human())
    }
}

impl Serialize for FlagSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter().map(Flag::name))
    }
}
