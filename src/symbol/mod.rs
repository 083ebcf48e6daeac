pub mod abstract_symbol;
pub mod concrete;
pub mod defs;
pub mod flags;
pub mod pair;
