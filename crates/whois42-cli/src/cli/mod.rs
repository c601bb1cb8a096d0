//! CLI argument parsing and server bootstrap.

pub mod args;

use anyhow::{Context, Result};
use args::Cli;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use whois42_core::VERSION;
use whois42_srv::{listeners, FsRegistry, Server, ServerConfig};

/// Run the whois42d server until a termination signal or idle timeout.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let idle_timeout = config.idle_timeout()?;
    let data = config.check_data_path()?;
    info!(version = VERSION, registry = %data.display(), "starting whois42d");

    let inherited = listeners::activated();
    let activated = !inherited.is_empty();
    let sockets = if activated {
        inherited
            .into_iter()
            .map(listeners::into_async)
            .collect::<whois42_srv::Result<Vec<TcpListener>>>()?
    } else {
        vec![listeners::bind(config.listen).await?]
    };

    let store = Arc::new(FsRegistry::new(data));
    let server = Arc::new(Server::new(store, &config).with_socket_activation(activated));

    let mut loops = JoinSet::new();
    for listener in sockets {
        loops.spawn(Arc::clone(&server).run(listener));
    }

    tokio::select! {
        reason = server.wait_for_drain(
            shutdown_signal(),
            idle_timeout,
            config.idle_check_interval(),
        ) => {
            info!(%reason, "draining");
        }
        Some(finished) = loops.join_next() => {
            let failure = match finished {
                Ok(Ok(())) => anyhow::anyhow!("accept loop exited unexpectedly"),
                Ok(Err(e)) => e.into(),
                Err(e) => anyhow::Error::new(e).context("accept loop panicked"),
            };
            error!(error = %failure, "listener failed");
            return Err(failure);
        }
    }

    server.shutdown().await;
    while let Some(finished) = loops.join_next().await {
        if let Ok(Err(e)) = finished {
            warn!(error = %e, "listener failed while draining");
        }
    }
    Ok(())
}

/// Config file values (or defaults) with command-line flags applied on top.
fn load_config(cli: &Cli) -> Result<ServerConfig> {
    let base = match &cli.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ServerConfig::default(),
    };
    cli.apply(base)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "unable to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_file_then_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen = \"127.0.0.1:4343\"").unwrap();
        writeln!(file, "idle_timeout_secs = 30.0").unwrap();

        let path = file.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["whois42d", "--config", path, "--port", "43"]).unwrap();
        let config = load_config(&cli).unwrap();

        assert_eq!(config.listen, "127.0.0.1:43".parse().unwrap());
        assert!((config.idle_timeout_secs - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bad_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen = 43").unwrap();

        let path = file.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["whois42d", "--config", path]).unwrap();
        assert!(load_config(&cli).is_err());
    }
}
