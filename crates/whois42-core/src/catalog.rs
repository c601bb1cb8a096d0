//! Registry object types and the rules that recognise their identifiers.
//!
//! The catalog is a fixed, declaration-ordered table. Order only matters for
//! output: when several types match the same identifier, their records are
//! returned in catalog order.

use crate::query::ClassifiedQuery;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// IP address family of a network object type or a parsed query address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// IPv4 (`inetnum`, `route`)
    V4,
    /// IPv6 (`inet6num`, `route6`)
    V6,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => write!(f, "ipv4"),
            Self::V6 => write!(f, "ipv6"),
        }
    }
}

/// How a rule classifies a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Pattern tested against the uppercased token
    ExactUpper,
    /// Pattern tested against the lowercased token
    ExactLower,
    /// Query must carry an IPv4 address
    NetworkV4,
    /// Query must carry an IPv6 address
    NetworkV6,
}

impl MatchKind {
    /// Returns true for the network (CIDR directory) kinds
    #[must_use]
    pub const fn is_network(self) -> bool {
        matches!(self, Self::NetworkV4 | Self::NetworkV6)
    }
}

// Exact rules own their pattern, network rules own none.
#[derive(Debug)]
enum Matcher {
    Upper(Regex),
    Lower(Regex),
    Network(AddressFamily),
}

/// One entry of the type catalog.
#[derive(Debug)]
pub struct ObjectTypeRule {
    name: &'static str,
    matcher: Matcher,
}

impl ObjectTypeRule {
    fn exact_upper(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            matcher: Matcher::Upper(compile(pattern)),
        }
    }

    fn exact_lower(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            matcher: Matcher::Lower(compile(pattern)),
        }
    }

    const fn network(name: &'static str, family: AddressFamily) -> Self {
        Self {
            name,
            matcher: Matcher::Network(family),
        }
    }

    /// Type name, which is also the registry subdirectory holding its records.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn kind(&self) -> MatchKind {
        match &self.matcher {
            Matcher::Upper(_) => MatchKind::ExactUpper,
            Matcher::Lower(_) => MatchKind::ExactLower,
            Matcher::Network(AddressFamily::V4) => MatchKind::NetworkV4,
            Matcher::Network(AddressFamily::V6) => MatchKind::NetworkV6,
        }
    }

    /// Identifier pattern; `None` for network rules.
    #[must_use]
    pub const fn pattern(&self) -> Option<&Regex> {
        match &self.matcher {
            Matcher::Upper(re) | Matcher::Lower(re) => Some(re),
            Matcher::Network(_) => None,
        }
    }

    /// Address family served by a network rule; `None` for exact rules.
    #[must_use]
    pub const fn family(&self) -> Option<AddressFamily> {
        match &self.matcher {
            Matcher::Network(family) => Some(*family),
            Matcher::Upper(_) | Matcher::Lower(_) => None,
        }
    }

    /// Tests an exact rule against the query and returns the record key on a match.
    ///
    /// The key is the case form the rule inspects. Network rules never match here.
    #[must_use]
    pub fn match_exact<'q>(&self, query: &'q ClassifiedQuery) -> Option<&'q str> {
        let (pattern, token) = match &self.matcher {
            Matcher::Upper(re) => (re, query.upper()),
            Matcher::Lower(re) => (re, query.lower()),
            Matcher::Network(_) => return None,
        };
        pattern.is_match(token).then_some(token)
    }

    /// Returns true if this network rule should be consulted for the query.
    #[must_use]
    pub fn accepts_network(&self, query: &ClassifiedQuery) -> bool {
        match (self.family(), query.family()) {
            (Some(rule), Some(addr)) => rule == addr,
            _ => false,
        }
    }
}

fn compile(pattern: &str) -> Regex {
    // Patterns are compile-time constants covered by the catalog tests.
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid catalog pattern {pattern:?}: {e}"))
}

/// The type catalog in declaration order.
pub fn catalog() -> &'static [ObjectTypeRule] {
    static CATALOG: OnceLock<Vec<ObjectTypeRule>> = OnceLock::new();
    CATALOG.get_or_init(|| {
        vec![
            ObjectTypeRule::exact_upper("aut-num", r"^AS([0123456789]+)$"),
            ObjectTypeRule::exact_lower("dns", r".dn42$"),
            ObjectTypeRule::exact_upper("person", r"-DN42$"),
            ObjectTypeRule::exact_upper("mntner", r"-MNT$"),
            ObjectTypeRule::exact_upper("schema", r"-SCHEMA$"),
            ObjectTypeRule::exact_upper("organisation", r"ORG-"),
            ObjectTypeRule::exact_upper("tinc-keyset", r"^SET-.+-TINC$"),
            ObjectTypeRule::exact_upper("tinc-key", r"-TINC$"),
            ObjectTypeRule::exact_upper("as-set", r"^AS"),
            ObjectTypeRule::exact_upper("route-set", r"^RS-"),
            ObjectTypeRule::network("inetnum", AddressFamily::V4),
            ObjectTypeRule::network("inet6num", AddressFamily::V6),
            ObjectTypeRule::network("route", AddressFamily::V4),
            ObjectTypeRule::network("route6", AddressFamily::V6),
            ObjectTypeRule::exact_upper("as-block", r"\d+_\d+"),
        ]
    })
}

/// Type names in catalog order, as listed by `-q types`.
pub fn names() -> impl Iterator<Item = &'static str> {
    catalog().iter().map(ObjectTypeRule::name)
}

/// Looks up a rule by type name.
pub fn find(name: &str) -> Option<&'static ObjectTypeRule> {
    catalog().iter().find(|rule| rule.name == name)
}

/// Every exact rule matching the query, paired with its record key, in catalog order.
pub fn matching_exact(
    query: &ClassifiedQuery,
) -> impl Iterator<Item = (&'static ObjectTypeRule, &str)> {
    catalog()
        .iter()
        .filter_map(move |rule| rule.match_exact(query).map(|key| (rule, key)))
}
