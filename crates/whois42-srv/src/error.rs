//! Error types for the whois42d server.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in whois42-srv operations.
#[derive(Error, Debug)]
pub enum SrvError {
    /// Listener could not be bound.
    #[error("bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A listener failed in a way that stops it accepting connections.
    #[error("accept failed on {addr}: {source}")]
    Accept {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The registry data directory is missing or unreadable.
    #[error("cannot access '{}', should be in the registry repository: {source}", path.display())]
    Registry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Inherited socket-activation descriptor could not be adopted.
    #[error("socket activation error: {0}")]
    Activation(String),

    /// Configuration is invalid or missing required fields.
    #[error("config error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
