//! whois42-srv: the whois42d query server.
//!
//! Answers WHOIS queries from a registry of flat text records laid out as one
//! directory per object type, with one file per object.
//!
//! # Architecture
//!
//! - [`registry`] - record and CIDR directory access ([`RecordStore`], [`FsRegistry`])
//! - [`lookup`] - dispatches a classified query across the type catalog
//! - [`handler`] - one request line in, one response out, per connection
//! - [`server`] - accept loops, in-flight tracking and draining
//! - [`listeners`] - listening sockets inherited through socket activation
//!
//! # Protocol
//!
//! ```text
//! $ whois -h whois.dn42 172.23.136.1
//! % This is the dn42 whois query service.
//!
//! % Information related to 'route/172.23.136.0_23':
//! route:              172.23.136.0/23
//! ...
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod listeners;
pub mod lookup;
pub mod registry;
pub mod server;

// Re-exports for convenience.
pub use config::ServerConfig;
pub use error::SrvError;
pub use lookup::{LookupEngine, Record, Resolution};
pub use registry::{FsRegistry, NetworkEntry, RecordStore};
pub use server::{DrainReason, Server, ServerState};

/// Result type for whois42-srv operations.
pub type Result<T> = std::result::Result<T, SrvError>;
