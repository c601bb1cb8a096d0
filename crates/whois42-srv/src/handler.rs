//! Per-connection request handling.
//!
//! One connection carries exactly one request line. The response is written
//! in full and the connection is closed.

use crate::lookup::LookupEngine;
use crate::registry::RecordStore;
use crate::ServerConfig;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tracing::{debug, info, warn};
use whois42_core::query::USAGE;
use whois42_core::{catalog, Request, ServerInfo, VERSION};

/// First lines of every response.
pub const BANNER: &str = "% This is the dn42 whois query service.\n\n";

/// Written when no record matched.
pub const NOT_FOUND: &str = "% 404\n";

/// Source descriptor returned by `-q sources`.
pub const SOURCES: &str = "DN42:3:N:0-0\n";

/// Bounds applied to reading a request.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub read_timeout: Duration,
    pub max_request_bytes: usize,
}

impl From<&ServerConfig> for ConnectionLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            read_timeout: config.read_timeout(),
            max_request_bytes: config.max_request_bytes,
        }
    }
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

/// Serve one connection: read the request line, answer it, close.
///
/// A connection that ends (or exceeds the length limit) before a newline gets
/// no response. Read and write failures are logged, never returned.
pub async fn handle_connection<S, C>(
    engine: &LookupEngine<S>,
    mut conn: C,
    peer: SocketAddr,
    limits: ConnectionLimits,
) where
    S: RecordStore + ?Sized,
    C: AsyncRead + AsyncWrite + Unpin,
{
    let line = match read_request(&mut conn, limits).await {
        Ok(Some(line)) => line,
        Ok(None) => {
            debug!(%peer, "connection closed without a request line");
            return;
        }
        Err(e) => {
            warn!(%peer, error = %e, "error reading request");
            return;
        }
    };

    info!(%peer, query = line.trim_end(), "whois query");
    let response = respond(engine, &line).await;

    if let Err(e) = write_response(&mut conn, &response).await {
        warn!(%peer, error = %e, "error writing response");
    }
}

async fn write_response<C>(conn: &mut C, response: &[u8]) -> io::Result<()>
where
    C: AsyncWrite + Unpin,
{
    conn.write_all(response).await?;
    conn.flush().await?;
    conn.shutdown().await
}

/// Read one newline-terminated request line.
///
/// Returns `Ok(None)` if the peer stops sending before a newline, including
/// when the line would exceed `max_request_bytes`.
pub async fn read_request<C>(
    conn: &mut C,
    limits: ConnectionLimits,
) -> io::Result<Option<String>>
where
    C: AsyncRead + Unpin,
{
    let limit = u64::try_from(limits.max_request_bytes).unwrap_or(u64::MAX);
    let mut reader = BufReader::new(conn.take(limit));
    let mut buf = Vec::new();

    let read = tokio::time::timeout(limits.read_timeout, reader.read_until(b'\n', &mut buf)).await;
    read.map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "timed out waiting for request"))??;

    if buf.last() != Some(&b'\n') {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Build the full response for one request line.
pub async fn respond<S>(engine: &LookupEngine<S>, line: &str) -> Vec<u8>
where
    S: RecordStore + ?Sized,
{
    let mut out = Vec::from(BANNER);

    let request = match Request::parse(line) {
        Ok(request) => request,
        Err(e) => {
            // Usage errors are echoed to help interactive clients.
            if !e.is_help() {
                out.extend_from_slice(format!("% {e}\n").as_bytes());
            }
            out.extend_from_slice(USAGE.as_bytes());
            return out;
        }
    };

    if let Some(info) = request.server_info() {
        write_server_info(&mut out, info);
        return out;
    }

    let resolution = engine.resolve_all(request.objects()).await;
    for record in resolution.records() {
        let header = format!("% Information related to '{}':\n", record.path());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&record.body);
        out.push(b'\n');
    }
    if !resolution.found() {
        out.extend_from_slice(NOT_FOUND.as_bytes());
    }
    out.push(b'\n');
    out
}

fn write_server_info(out: &mut Vec<u8>, info: &ServerInfo) {
    match info {
        ServerInfo::Version => {
            out.extend_from_slice(format!("% whois42d v{VERSION}\n").as_bytes());
        }
        ServerInfo::Sources => out.extend_from_slice(SOURCES.as_bytes()),
        ServerInfo::Types => {
            for name in catalog::names() {
                out.extend_from_slice(name.as_bytes());
                out.push(b'\n');
            }
        }
        ServerInfo::Unknown(what) => {
            out.extend_from_slice(format!("% unknown option {what}\n").as_bytes());
        }
    }
}
