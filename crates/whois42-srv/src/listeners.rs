//! Listening sockets: bound directly or inherited through socket activation.
//!
//! A supervisor using socket activation starts the process with the
//! listening sockets already open as descriptors `3..3 + LISTEN_FDS`, and sets
//! `LISTEN_PID` to the pid they are meant for.

use crate::SrvError;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::sys::socket::{getsockopt, sockopt, SockType};
use std::net::SocketAddr;
use std::os::unix::io::{FromRawFd, RawFd};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// First inherited descriptor.
pub const LISTEN_FDS_START: RawFd = 3;

/// Bind a listener on `addr`.
pub async fn bind(addr: SocketAddr) -> crate::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| SrvError::Bind { addr, source })?;
    info!(%addr, "TCP listener bound");
    Ok(listener)
}

/// Number of descriptors passed to this process, from the raw
/// `LISTEN_PID`/`LISTEN_FDS` values.
///
/// Zero unless `LISTEN_PID` names `own_pid` and `LISTEN_FDS` is a positive count.
#[must_use]
pub fn listen_fd_count(listen_pid: Option<&str>, listen_fds: Option<&str>, own_pid: u32) -> usize {
    let Some(pid) = listen_pid.and_then(|v| v.trim().parse::<u32>().ok()) else {
        return 0;
    };
    if pid != own_pid {
        return 0;
    }
    listen_fds
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0)
}

/// Take the TCP listeners passed by a socket-activation supervisor.
///
/// `LISTEN_PID` and `LISTEN_FDS` are removed from the environment either way
/// so child processes do not inherit them. Descriptors that are not
/// listening TCP sockets are closed and skipped.
#[must_use]
pub fn activated() -> Vec<std::net::TcpListener> {
    let listen_pid = std::env::var("LISTEN_PID").ok();
    let listen_fds = std::env::var("LISTEN_FDS").ok();
    std::env::remove_var("LISTEN_PID");
    std::env::remove_var("LISTEN_FDS");

    let count = listen_fd_count(
        listen_pid.as_deref(),
        listen_fds.as_deref(),
        std::process::id(),
    );

    (0..count)
        .filter_map(|offset| {
            let fd = LISTEN_FDS_START.checked_add(RawFd::try_from(offset).ok()?)?;
            adopt(fd)
        })
        .collect()
}

fn adopt(fd: RawFd) -> Option<std::net::TcpListener> {
    if let Err(e) = fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)) {
        warn!(fd, error = %e, "inherited descriptor is not usable");
        return None;
    }

    // SAFETY: the supervisor hands descriptors LISTEN_FDS_START.. to this
    // process and nothing else owns them; each one is adopted exactly once,
    // because `activated` clears LISTEN_PID/LISTEN_FDS before returning.
    #[allow(unsafe_code)]
    let listener = unsafe { std::net::TcpListener::from_raw_fd(fd) };

    let is_stream = matches!(getsockopt(&listener, sockopt::SockType), Ok(SockType::Stream));
    let is_listening = matches!(getsockopt(&listener, sockopt::AcceptConn), Ok(true));
    match listener.local_addr() {
        Ok(addr) if is_stream && is_listening => {
            info!(fd, %addr, "adopted socket-activated listener");
            Some(listener)
        }
        Ok(addr) => {
            warn!(fd, %addr, "inherited descriptor is not a listening TCP socket");
            None
        }
        Err(e) => {
            warn!(fd, error = %e, "inherited descriptor is not a TCP socket");
            None
        }
    }
}

/// Register an inherited listener with the tokio runtime.
pub fn into_async(listener: std::net::TcpListener) -> crate::Result<TcpListener> {
    listener.set_nonblocking(true)?;
    TcpListener::from_std(listener)
        .map_err(|e| SrvError::Activation(format!("cannot register listener: {e}")))
}
