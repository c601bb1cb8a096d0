//! Server lifecycle: accept loops, in-flight tracking and draining.
//!
//! ```text
//! Idle --run--> Accepting --shutdown--> Draining --all handlers done--> Stopped
//! ```
//!
//! Every listener gets its own accept loop, but all loops share one stop flag
//! and one in-flight counter, so a single [`Server::shutdown`] drains them all.
//! Stopping is cooperative: accept loops notice the flag within one accept
//! deadline, and connection handlers already running are always allowed to
//! finish.

use crate::handler::{handle_connection, ConnectionLimits};
use crate::lookup::LookupEngine;
use crate::registry::{FsRegistry, RecordStore};
use crate::{ServerConfig, SrvError};
use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Created, no accept loop started yet.
    Idle,
    /// At least one accept loop is running.
    Accepting,
    /// Stop requested; waiting for accept loops and handlers to finish.
    Draining,
    /// Every accept loop and handler has finished.
    Stopped,
}

impl ServerState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Accepting,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

/// Why [`Server::wait_for_drain`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReason {
    /// The shutdown future completed (a termination signal).
    Signal,
    /// A socket-activated server saw no connection for the idle timeout.
    IdleTimeout,
}

impl fmt::Display for DrainReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal => write!(f, "signal"),
            Self::IdleTimeout => write!(f, "idle timeout"),
        }
    }
}

/// Counts running accept loops and connection handlers.
#[derive(Debug, Default)]
struct ActiveWorkers {
    count: AtomicUsize,
    idle: Notify,
}

impl ActiveWorkers {
    fn enter(self: &Arc<Self>) -> WorkerGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        WorkerGuard(Arc::clone(self))
    }

    fn in_flight(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Decrements the in-flight count when dropped, including on panic.
struct WorkerGuard(Arc<ActiveWorkers>);

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// A whois server bound to one registry.
///
/// Shared as `Arc<Server>` between the accept loops, the handlers they spawn
/// and the task driving shutdown.
pub struct Server<S: ?Sized = FsRegistry> {
    engine: LookupEngine<S>,
    limits: ConnectionLimits,
    accept_deadline: Duration,
    socket_activation: bool,
    started: Instant,
    last_connection_ms: AtomicU64,
    stop: AtomicBool,
    state: AtomicU8,
    workers: Arc<ActiveWorkers>,
}

impl<S: ?Sized> fmt::Debug for Server<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("state", &self.state())
            .field("socket_activation", &self.socket_activation)
            .field("in_flight", &self.workers.in_flight())
            .finish_non_exhaustive()
    }
}

impl<S: ?Sized> Server<S> {
    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the listeners were inherited from a supervisor.
    pub const fn socket_activation(&self) -> bool {
        self.socket_activation
    }

    /// Accept loops plus connection handlers currently running.
    pub fn in_flight(&self) -> usize {
        self.workers.in_flight()
    }

    /// Time since the last accepted connection (or since start, if none).
    pub fn idle_for(&self) -> Duration {
        let now = millis_since(self.started);
        let last = self.last_connection_ms.load(Ordering::Acquire);
        Duration::from_millis(now.saturating_sub(last))
    }

    fn touch(&self) {
        self.last_connection_ms
            .fetch_max(millis_since(self.started), Ordering::AcqRel);
    }

    fn set_state(&self, state: ServerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Wait until the server should drain.
    ///
    /// Without socket activation this is just `shutdown`. With socket
    /// activation the idle time is also checked every `check_interval`, and
    /// the wait ends once no connection arrived for `idle_timeout`.
    pub async fn wait_for_drain<F>(
        &self,
        shutdown: F,
        idle_timeout: Duration,
        check_interval: Duration,
    ) -> DrainReason
    where
        F: Future<Output = ()>,
    {
        if !self.socket_activation {
            shutdown.await;
            return DrainReason::Signal;
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => return DrainReason::Signal,
                () = tokio::time::sleep(check_interval) => {
                    let idle = self.idle_for();
                    if idle >= idle_timeout {
                        info!(idle_secs = idle.as_secs_f64(), "idle timeout reached");
                        return DrainReason::IdleTimeout;
                    }
                }
            }
        }
    }

    /// Stop accepting and wait for every accept loop and handler to finish.
    ///
    /// Takes up to one accept deadline for the loops to notice, plus however
    /// long the in-flight lookups need.
    pub async fn shutdown(&self) {
        self.set_state(ServerState::Draining);
        self.stop.store(true, Ordering::Release);
        info!(
            in_flight = self.in_flight(),
            deadline = ?self.accept_deadline,
            "shutting listeners down"
        );
        self.workers.wait_idle().await;
        self.set_state(ServerState::Stopped);
        info!("server stopped");
    }
}

impl<S: RecordStore + ?Sized> Server<S> {
    /// Create a server answering from `store`.
    pub fn new(store: Arc<S>, config: &ServerConfig) -> Self {
        Self {
            engine: LookupEngine::new(store),
            limits: ConnectionLimits::from(config),
            accept_deadline: config.accept_deadline(),
            socket_activation: false,
            started: Instant::now(),
            last_connection_ms: AtomicU64::new(0),
            stop: AtomicBool::new(false),
            state: AtomicU8::new(ServerState::Idle as u8),
            workers: Arc::new(ActiveWorkers::default()),
        }
    }

    /// Mark the server as running on supervisor-provided listeners, which
    /// enables the idle timeout in [`Server::wait_for_drain`].
    #[must_use]
    pub fn with_socket_activation(mut self, enabled: bool) -> Self {
        self.socket_activation = enabled;
        self
    }
}

impl<S: RecordStore + ?Sized + 'static> Server<S> {
    /// Run the accept loop for one listener until shutdown.
    ///
    /// Each accept is bounded by the accept deadline so the stop flag is
    /// checked at least that often. Returns an error only when the listener
    /// itself fails; the listener is closed when this returns.
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> crate::Result<()> {
        let _guard = self.workers.enter();
        let _ = self.state.compare_exchange(
            ServerState::Idle as u8,
            ServerState::Accepting as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        let addr = listener
            .local_addr()
            .map_or_else(|_| String::from("unknown"), |a| a.to_string());
        info!(addr = %addr, "accepting connections");

        while !self.stop.load(Ordering::Acquire) {
            let Ok(accepted) = tokio::time::timeout(self.accept_deadline, listener.accept()).await
            else {
                continue;
            };

            match accepted {
                Ok((stream, peer)) => self.dispatch(stream, peer),
                Err(e) if is_connection_error(&e) => {
                    warn!(addr = %addr, error = %e, "connection failed during accept");
                }
                Err(source) => {
                    error!(addr = %addr, error = %source, "accept failed");
                    return Err(SrvError::Accept { addr, source });
                }
            }
        }

        info!(addr = %addr, "listener closed");
        Ok(())
    }

    fn dispatch(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let guard = self.workers.enter();
        self.touch();
        debug!(%peer, in_flight = self.in_flight(), "connection accepted");

        let server = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            handle_connection(&server.engine, stream, peer, server.limits).await;
        });
    }
}

// Failures of a single pending connection, not of the listener.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}

fn millis_since(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
