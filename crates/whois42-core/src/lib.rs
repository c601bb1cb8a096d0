//! Core types for the whois42d registry server.
//!
//! This crate provides the request-side building blocks shared by the server:
//!
//! - **Catalog**: the static, ordered table of registry object types
//! - **Query**: classification of object identifiers and request flag parsing
//! - **Errors**: request parsing failures via [`CoreError`]
//!
//! # Example
//!
//! ```rust
//! use whois42_core::{catalog, classify, AddressFamily};
//!
//! let query = classify("172.23.136.1");
//! assert_eq!(query.family(), Some(AddressFamily::V4));
//!
//! let query = classify("as4242420000");
//! let kinds: Vec<_> = catalog::matching_exact(&query).map(|(rule, _)| rule.name()).collect();
//! assert_eq!(kinds, ["aut-num", "as-set"]);
//! ```

#![doc(html_root_url = "https://docs.rs/whois42-core/2.0.0")]

pub mod catalog;
mod error;
pub mod query;

pub use catalog::{AddressFamily, MatchKind, ObjectTypeRule};
pub use error::{CoreError, Result};
pub use query::{classify, ClassifiedQuery, Request, ServerInfo};

/// Numeric protocol version reported by `-q version`.
pub const VERSION: u32 = 1;
