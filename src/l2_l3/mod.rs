pub mod defs;
pub mod ethernet;
pub mod ip;
