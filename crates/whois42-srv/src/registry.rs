//! Registry access: record bodies and network object directories.
//!
//! The registry is a directory tree with one subdirectory per object type.
//! Exact-match records are files named by their key. Network records are
//! files named by their CIDR block with `/` written as `_`, so
//! `172.23.136.0/23` lives in `route/172.23.136.0_23`.
//!
//! Nothing is cached: every lookup re-reads the filesystem, so concurrent
//! edits to the registry are visible to the next query.

use async_trait::async_trait;
use ipnet::IpNet;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Read-only view of a registry, keyed by object type and record key.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read the body of one record.
    ///
    /// A record that does not exist must be reported as
    /// [`io::ErrorKind::NotFound`].
    async fn fetch(&self, kind: &str, key: &str) -> io::Result<Vec<u8>>;

    /// List the record keys stored for one object type.
    async fn list(&self, kind: &str) -> io::Result<Vec<String>>;
}

/// Registry stored on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsRegistry {
    data_path: PathBuf,
}

impl FsRegistry {
    /// Registry rooted at `data_path` (the directory holding the type directories).
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
        }
    }

    #[must_use]
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }
}

// Keys come from client input; they must name a file inside the type directory.
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c| matches!(c, '/' | '\\' | '\0'))
}

#[async_trait]
impl RecordStore for FsRegistry {
    async fn fetch(&self, kind: &str, key: &str) -> io::Result<Vec<u8>> {
        if !is_plain_name(kind) || !is_plain_name(key) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{kind}/{key} is not a record name"),
            ));
        }
        tokio::fs::read(self.data_path.join(kind).join(key)).await
    }

    async fn list(&self, kind: &str) -> io::Result<Vec<String>> {
        let mut dir = tokio::fs::read_dir(self.data_path.join(kind)).await?;
        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => warn!(kind, entry = ?name, "skipping non UTF-8 registry entry"),
            }
        }
        Ok(names)
    }
}

/// Encode a CIDR block as a registry file name.
#[must_use]
pub fn encode_key(network: &IpNet) -> String {
    network.to_string().replace('/', "_")
}

/// Decode a registry file name back into CIDR notation.
#[must_use]
pub fn decode_key(key: &str) -> String {
    key.replace('_', "/")
}

/// A network object: its CIDR block and the file name it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEntry {
    network: IpNet,
    key: String,
}

impl NetworkEntry {
    /// Parse a registry file name; `None` if it does not encode a CIDR block.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        let network = decode_key(key).parse::<IpNet>().ok()?;
        Some(Self {
            network,
            key: key.to_owned(),
        })
    }

    #[must_use]
    pub const fn network(&self) -> IpNet {
        self.network
    }

    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.network.prefix_len()
    }

    /// On-disk key, exactly as listed.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns true if the address falls inside this block.
    ///
    /// Addresses of the other family are never contained.
    #[must_use]
    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.network.contains(addr)
    }
}

/// Build the ordered entry list from a directory listing.
///
/// Names are visited in lexical order and each parsed entry is inserted after
/// every entry with an equal or shorter prefix, so the result is sorted by
/// ascending prefix length and deterministic for a given listing.
/// Unparsable names are skipped.
pub fn sorted_entries<I>(kind: &str, names: I) -> Vec<NetworkEntry>
where
    I: IntoIterator<Item = String>,
{
    let mut names: Vec<String> = names.into_iter().collect();
    names.sort_unstable();

    let mut entries: Vec<NetworkEntry> = Vec::with_capacity(names.len());
    for name in names {
        let Some(entry) = NetworkEntry::from_key(&name) else {
            warn!(kind, entry = %name, "skipping invalid network entry");
            continue;
        };
        let at = entries.partition_point(|e| e.prefix_len() <= entry.prefix_len());
        entries.insert(at, entry);
    }
    entries
}

/// Load every network entry of one type, ordered by ascending prefix length.
pub async fn load_networks<S>(store: &S, kind: &str) -> io::Result<Vec<NetworkEntry>>
where
    S: RecordStore + ?Sized,
{
    let names = store.list(kind).await?;
    Ok(sorted_entries(kind, names))
}

/// Every network entry of one type that contains `addr`, least specific first.
///
/// A missing or unreadable directory is logged and yields no entries.
pub async fn matching_networks<S>(store: &S, kind: &str, addr: IpAddr) -> Vec<NetworkEntry>
where
    S: RecordStore + ?Sized,
{
    let entries = match load_networks(store, kind).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(kind, error = %e, "error reading network directory");
            return Vec::new();
        }
    };

    let matches: Vec<NetworkEntry> = entries
        .into_iter()
        .filter(|entry| entry.contains(&addr))
        .collect();
    debug!(kind, %addr, matches = matches.len(), "network lookup");
    matches
}
