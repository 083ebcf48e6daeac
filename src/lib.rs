pub mod adapter;
pub mod config;
pub mod l2_l3;
pub mod oracle;
pub mod sender;
pub mod server;
pub mod symbol;
pub mod tcp;
pub mod tracker;
pub mod translator;
