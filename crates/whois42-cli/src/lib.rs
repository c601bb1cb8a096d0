//! # whois42-cli
//!
//! The `whois42d` binary: argument and config handling, logging setup,
//! listener selection and signal-driven shutdown around [`whois42_srv::Server`].

pub mod cli;

pub use cli::run;
