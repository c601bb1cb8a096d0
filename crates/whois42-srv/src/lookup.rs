//! Lookup engine: resolves classified queries against the type catalog.

use crate::registry::{self, RecordStore};
use std::io;
use std::sync::Arc;
use tracing::{debug, error};
use whois42_core::{catalog, ClassifiedQuery};

/// One record selected for the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Object type name.
    pub kind: &'static str,
    /// Key the record is stored under.
    pub key: String,
    /// Raw record body.
    pub body: Vec<u8>,
}

impl Record {
    /// `<type>/<key>`, as shown in the response header.
    #[must_use]
    pub fn path(&self) -> String {
        format!("{}/{}", self.kind, self.key)
    }
}

/// Records matched by one request, in response order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    records: Vec<Record>,
}

impl Resolution {
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns true if at least one record was found.
    #[must_use]
    pub fn found(&self) -> bool {
        !self.records.is_empty()
    }

    fn extend(&mut self, other: Self) {
        self.records.extend(other.records);
    }
}

/// Walks the catalog for each query and fetches every matching record.
#[derive(Debug)]
pub struct LookupEngine<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for LookupEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RecordStore + ?Sized> LookupEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolve one identifier.
    ///
    /// Every catalog rule is applied, not only the first that matches, and
    /// records are returned in catalog order. Network rules contribute one
    /// record per enclosing block, least specific first.
    pub async fn resolve(&self, query: &ClassifiedQuery) -> Resolution {
        let mut records = Vec::new();

        for rule in catalog::catalog() {
            if rule.kind().is_network() {
                let Some(addr) = query.address().filter(|_| rule.accepts_network(query)) else {
                    continue;
                };
                for entry in registry::matching_networks(&*self.store, rule.name(), addr).await {
                    if let Some(body) = self.fetch(rule.name(), entry.key()).await {
                        records.push(Record {
                            kind: rule.name(),
                            key: entry.key().to_owned(),
                            body,
                        });
                    }
                }
            } else if let Some(key) = rule.match_exact(query) {
                if let Some(body) = self.fetch(rule.name(), key).await {
                    records.push(Record {
                        kind: rule.name(),
                        key: key.to_owned(),
                        body,
                    });
                }
            }
        }

        debug!(query = query.token(), records = records.len(), "resolved");
        Resolution { records }
    }

    /// Resolve several identifiers, concatenating their records in request order.
    pub async fn resolve_all(&self, queries: &[ClassifiedQuery]) -> Resolution {
        let mut resolution = Resolution::default();
        for query in queries {
            resolution.extend(self.resolve(query).await);
        }
        resolution
    }

    // A missing record is an ordinary miss; other failures are logged and
    // also treated as a miss so that nothing internal reaches the client.
    async fn fetch(&self, kind: &str, key: &str) -> Option<Vec<u8>> {
        match self.store.fetch(kind, key).await {
            Ok(body) => Some(body),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                error!(kind, key, error = %e, "error reading record");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FsRegistry;
    use async_trait::async_trait;
    use whois42_core::classify;

    fn write(root: &std::path::Path, kind: &str, key: &str, body: &str) {
        let dir = root.join(kind);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(key), body).unwrap();
    }

    fn paths(resolution: &Resolution) -> Vec<String> {
        resolution.records().iter().map(Record::path).collect()
    }

    fn engine(root: &std::path::Path) -> LookupEngine<FsRegistry> {
        LookupEngine::new(Arc::new(FsRegistry::new(root)))
    }

    #[tokio::test]
    async fn test_multiple_types_in_catalog_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "as-set", "AS4242420000", "as-set: AS4242420000\n");
        write(dir.path(), "aut-num", "AS4242420000", "aut-num: AS4242420000\n");

        let resolution = engine(dir.path()).resolve(&classify("as4242420000")).await;
        assert_eq!(
            paths(&resolution),
            ["aut-num/AS4242420000", "as-set/AS4242420000"]
        );
        assert_eq!(resolution.records()[0].body, b"aut-num: AS4242420000\n");
    }

    #[tokio::test]
    async fn test_pattern_match_without_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let resolution = engine(dir.path()).resolve(&classify("AS4242420000")).await;
        assert!(!resolution.found());
    }

    #[tokio::test]
    async fn test_no_rule_matches() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "mntner", "FOO-MNT", "mntner: FOO-MNT\n");
        let resolution = engine(dir.path()).resolve(&classify("hello")).await;
        assert!(!resolution.found());
        assert!(resolution.records().is_empty());
    }

    #[tokio::test]
    async fn test_network_types() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "inetnum", "172.20.0.0_14", "inetnum: 172.20.0.0 - 172.23.255.255\n");
        write(dir.path(), "route", "172.23.136.0_23", "route: 172.23.136.0/23\n");
        write(dir.path(), "route6", "fd42:d42:d42::_48", "route6: fd42:d42:d42::/48\n");

        let resolution = engine(dir.path()).resolve(&classify("172.23.136.1")).await;
        assert_eq!(
            paths(&resolution),
            ["inetnum/172.20.0.0_14", "route/172.23.136.0_23"]
        );

        let resolution = engine(dir.path()).resolve(&classify("fd42:d42:d42::1")).await;
        assert_eq!(paths(&resolution), ["route6/fd42:d42:d42::_48"]);
    }

    #[tokio::test]
    async fn test_resolve_all_concatenates() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "mntner", "FOO-MNT", "mntner: FOO-MNT\n");
        write(dir.path(), "person", "FOO-DN42", "person: Foo\n");

        let queries = [classify("foo-dn42"), classify("nothing"), classify("foo-mnt")];
        let resolution = engine(dir.path()).resolve_all(&queries).await;
        assert_eq!(paths(&resolution), ["person/FOO-DN42", "mntner/FOO-MNT"]);
    }

    struct BrokenStore;

    #[async_trait]
    impl RecordStore for BrokenStore {
        async fn fetch(&self, _kind: &str, _key: &str) -> io::Result<Vec<u8>> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }

        async fn list(&self, _kind: &str) -> io::Result<Vec<String>> {
            Ok(vec!["10.0.0.0_8".to_owned()])
        }
    }

    #[tokio::test]
    async fn test_read_errors_are_misses() {
        let engine = LookupEngine::new(Arc::new(BrokenStore));
        assert!(!engine.resolve(&classify("FOO-MNT")).await.found());
        assert!(!engine.resolve(&classify("10.1.2.3")).await.found());
    }
}
