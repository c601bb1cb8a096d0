//! Server configuration for whois42d.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a whois42d server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP listen address when no socket is inherited (default: [::]:43).
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Registry repository root; records are read from its `data/` directory.
    #[serde(default = "default_registry")]
    pub registry: PathBuf,

    /// Seconds without a new connection before a socket-activated server drains.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: f64,

    /// How often the idle timeout is checked (seconds).
    #[serde(default = "default_idle_check_interval")]
    pub idle_check_interval_secs: u64,

    /// Upper bound on a single accept call, and so on how long a stop request
    /// can go unnoticed (milliseconds).
    #[serde(default = "default_accept_deadline")]
    pub accept_deadline_ms: u64,

    /// How long a client has to send its request line (seconds).
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Longest accepted request line, newline included.
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            registry: default_registry(),
            idle_timeout_secs: default_idle_timeout(),
            idle_check_interval_secs: default_idle_check_interval(),
            accept_deadline_ms: default_accept_deadline(),
            read_timeout_secs: default_read_timeout(),
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| crate::SrvError::Config(e.to_string()))
        } else {
            Ok(Self::default())
        }
    }

    /// Directory holding one subdirectory per object type.
    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        self.registry.join("data")
    }

    /// Resolve and verify the registry data directory.
    pub fn check_data_path(&self) -> crate::Result<PathBuf> {
        let path = self.data_path();
        std::fs::metadata(&path).map_err(|source| crate::SrvError::Registry {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Idle timeout, rejecting negative or non-finite values.
    pub fn idle_timeout(&self) -> crate::Result<Duration> {
        Duration::try_from_secs_f64(self.idle_timeout_secs).map_err(|e| {
            crate::SrvError::Config(format!(
                "invalid idle timeout {}: {e}",
                self.idle_timeout_secs
            ))
        })
    }

    #[must_use]
    pub const fn idle_check_interval(&self) -> Duration {
        Duration::from_secs(self.idle_check_interval_secs)
    }

    #[must_use]
    pub const fn accept_deadline(&self) -> Duration {
        Duration::from_millis(self.accept_deadline_ms)
    }

    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

// Default value functions for serde.
fn default_listen() -> SocketAddr {
    SocketAddr::from((std::net::Ipv6Addr::UNSPECIFIED, 43))
}

fn default_registry() -> PathBuf {
    PathBuf::from(".")
}

const fn default_idle_timeout() -> f64 {
    10.0
}

const fn default_idle_check_interval() -> u64 {
    3
}

const fn default_accept_deadline() -> u64 {
    1000
}

const fn default_read_timeout() -> u64 {
    30
}

const fn default_max_request_bytes() -> usize {
    1024
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.listen.port(), 43);
        assert!(config.listen.ip().is_unspecified());
        assert_eq!(config.registry, PathBuf::from("."));
        assert_eq!(config.idle_timeout().unwrap(), Duration::from_secs(10));
        assert_eq!(config.idle_check_interval(), Duration::from_secs(3));
        assert_eq!(config.accept_deadline(), Duration::from_secs(1));
        assert_eq!(config.max_request_bytes, 1024);
    }

    #[test]
    fn test_config_serialization() {
        let config = ServerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.listen, config.listen);
        assert_eq!(parsed.registry, config.registry);
    }

    #[test]
    fn test_load_partial_toml() {
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        write!(
            tmpfile,
            r#"
            listen = "127.0.0.1:4343"
            registry = "/srv/registry"
            idle_timeout_secs = 2.5
            "#
        )
        .unwrap();

        let config = ServerConfig::load(tmpfile.path()).unwrap();
        assert_eq!(config.listen.port(), 4343);
        assert_eq!(config.data_path(), PathBuf::from("/srv/registry/data"));
        assert_eq!(config.idle_timeout().unwrap(), Duration::from_millis(2500));
        // Unset fields keep their defaults.
        assert_eq!(config.read_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.listen.port(), 43);
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        write!(tmpfile, "listen = 42").unwrap();
        let err = ServerConfig::load(tmpfile.path()).unwrap_err();
        assert!(matches!(err, crate::SrvError::Config(_)));
    }

    #[test]
    fn test_negative_idle_timeout_rejected() {
        let config = ServerConfig {
            idle_timeout_secs: -1.0,
            ..ServerConfig::default()
        };
        assert!(config.idle_timeout().is_err());
    }

    #[test]
    fn test_check_data_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            registry: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let err = config.check_data_path().unwrap_err();
        assert!(err.to_string().contains("should be in the registry repository"));

        std::fs::create_dir(dir.path().join("data")).unwrap();
        assert_eq!(config.check_data_path().unwrap(), dir.path().join("data"));
    }
}
