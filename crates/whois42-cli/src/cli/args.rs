//! Command-line argument definitions using clap.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use whois42_srv::ServerConfig;

/// WHOIS server for the dn42 registry
///
/// Answers one query per connection from the flat record files under
/// `<registry>/data`. Listening sockets passed through socket activation
/// (LISTEN_PID/LISTEN_FDS) are used instead of --address/--port; the server
/// then exits after --timeout seconds without a connection.
#[derive(Parser, Debug)]
#[command(name = "whois42d")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML config file; flags given here override its values
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to listen on ("*" for all addresses)
    #[arg(short, long)]
    pub address: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to the dn42 registry repository
    #[arg(short, long, env = "WHOIS42D_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// Idle seconds before a socket-activated server exits
    #[arg(short, long)]
    pub timeout: Option<f64>,

    /// Increase verbosity
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, mut config: ServerConfig) -> Result<ServerConfig> {
        if let Some(address) = &self.address {
            let ip = parse_address(address)?;
            config.listen = SocketAddr::new(ip, config.listen.port());
        }
        if let Some(port) = self.port {
            config.listen.set_port(port);
        }
        if let Some(registry) = &self.registry {
            config.registry.clone_from(registry);
        }
        if let Some(timeout) = self.timeout {
            config.idle_timeout_secs = timeout;
        }
        Ok(config)
    }
}

/// `*` (or an empty string) means every local address.
fn parse_address(address: &str) -> Result<IpAddr> {
    let address = address.trim();
    if address.is_empty() || address == "*" {
        return Ok(IpAddr::V6(Ipv6Addr::UNSPECIFIED));
    }
    address
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .with_context(|| format!("invalid listen address '{address}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("whois42d").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_untouched() {
        let config = parse(&[]).apply(ServerConfig::default()).unwrap();
        assert_eq!(config.listen, "[::]:43".parse().unwrap());
        assert!((config.idle_timeout_secs - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_flags_override_config() {
        let cli = parse(&[
            "--address",
            "127.0.0.1",
            "--port",
            "4343",
            "--registry",
            "/srv/registry",
            "--timeout",
            "2.5",
        ]);
        let config = cli.apply(ServerConfig::default()).unwrap();
        assert_eq!(config.listen, "127.0.0.1:4343".parse().unwrap());
        assert_eq!(config.registry, PathBuf::from("/srv/registry"));
        assert!((config.idle_timeout_secs - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_port_keeps_configured_address() {
        let base = ServerConfig {
            listen: "10.0.0.1:43".parse().unwrap(),
            ..ServerConfig::default()
        };
        let config = parse(&["-p", "4343"]).apply(base).unwrap();
        assert_eq!(config.listen, "10.0.0.1:4343".parse().unwrap());
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("*").unwrap(), IpAddr::V6(Ipv6Addr::UNSPECIFIED));
        assert_eq!(parse_address("[::1]").unwrap(), "::1".parse::<IpAddr>().unwrap());
        assert!(parse_address("whois.dn42").is_err());
    }
}
