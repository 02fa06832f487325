//! The simulated TCP client: one per user.
//!
//! Each task invocation opens a connection to the target, holds it open for a
//! random whole number of seconds and closes it. Nothing is written or read.
//! A failed connect is reported as [`TaskOutcome::ConnectFailed`] after a
//! fixed backoff instead of being raised.

use churn_common::TaskConfig;
use rand::Rng;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::time::{sleep, timeout, Duration, Instant};
use tracing::debug;

/// Connections currently held open across all users.
pub static OPEN_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

struct HeldConnectionGuard;

impl HeldConnectionGuard {
    fn new() -> Self {
        OPEN_CONNECTIONS.fetch_add(1, Ordering::SeqCst);
        Self
    }
}

impl Drop for HeldConnectionGuard {
    fn drop(&mut self) {
        OPEN_CONNECTIONS.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Inclusive range of whole seconds a connection is held open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldRange {
    min_secs: u64,
    max_secs: u64,
}

impl HoldRange {
    pub fn new(a: u64, b: u64) -> Self {
        Self {
            min_secs: a.min(b),
            max_secs: a.max(b),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        Duration::from_secs(rng.gen_range(self.min_secs..=self.max_secs))
    }

    pub fn min(&self) -> Duration {
        Duration::from_secs(self.min_secs)
    }

    pub fn max(&self) -> Duration {
        Duration::from_secs(self.max_secs)
    }
}

/// Result of one task invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Connected, held for `hold`, closed.
    Completed {
        hold: Duration,
        connect: Duration,
        elapsed: Duration,
    },
    /// Connect failed; `elapsed` includes the backoff.
    ConnectFailed {
        kind: io::ErrorKind,
        elapsed: Duration,
    },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Completed { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match *self {
            TaskOutcome::Completed { elapsed, .. } => elapsed,
            TaskOutcome::ConnectFailed { elapsed, .. } => elapsed,
        }
    }
}

pub struct TcpClient {
    target: String,
    hold: HoldRange,
    backoff: Duration,
    connect_timeout: Option<Duration>,
    socket: Option<TcpSocket>,
}

impl TcpClient {
    pub fn new(target: impl Into<String>, config: &TaskConfig) -> Self {
        Self {
            target: target.into(),
            hold: HoldRange::new(config.min_hold_secs, config.max_hold_secs),
            backoff: config.backoff(),
            connect_timeout: config.connect_timeout(),
            socket: None,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn hold_range(&self) -> HoldRange {
        self.hold
    }

    /// Allocates the IPv4 stream socket the next task invocation will use.
    pub fn on_start(&mut self) -> io::Result<()> {
        self.socket = Some(TcpSocket::new_v4()?);
        Ok(())
    }

    /// Closes the pending socket, if any. Safe to call any number of times;
    /// returns whether there was one to close.
    pub fn on_stop(&mut self) -> bool {
        let closed = self.socket.take().is_some();
        if closed {
            debug!(target_addr = %self.target, "Closed unused socket");
        }
        closed
    }

    /// Connect, hold, close.
    ///
    /// Socket allocation errors are returned. Errors while resolving or
    /// connecting become [`TaskOutcome::ConnectFailed`] after the backoff.
    pub async fn connect_to_server(&mut self) -> io::Result<TaskOutcome> {
        let started = Instant::now();
        let socket = match self.socket.take() {
            Some(socket) => socket,
            None => TcpSocket::new_v4()?,
        };

        let stream = match self.connect(socket).await {
            Ok(stream) => stream,
            Err(e) => {
                debug!(target_addr = %self.target, error = %e, "Connect failed, backing off");
                sleep(self.backoff).await;
                return Ok(TaskOutcome::ConnectFailed {
                    kind: e.kind(),
                    elapsed: started.elapsed(),
                });
            }
        };
        let connect = started.elapsed();

        let _guard = HeldConnectionGuard::new();
        let hold = self.hold.sample(&mut rand::thread_rng());
        debug!(
            target_addr = %self.target,
            local = ?stream.local_addr().ok(),
            hold_secs = hold.as_secs(),
            "Connected, holding"
        );
        sleep(hold).await;
        drop(stream);

        Ok(TaskOutcome::Completed {
            hold,
            connect,
            elapsed: started.elapsed(),
        })
    }

    async fn connect(&self, socket: TcpSocket) -> io::Result<TcpStream> {
        let addr = self.resolve().await?;
        match self.connect_timeout {
            Some(limit) => match timeout(limit, socket.connect(addr)).await {
                Ok(res) => res,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connect timed out",
                )),
            },
            None => socket.connect(addr).await,
        }
    }

    /// First IPv4 address of the target; the socket is IPv4 only.
    async fn resolve(&self) -> io::Result<SocketAddr> {
        lookup_host(self.target.as_str())
            .await?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("no IPv4 address for {}", self.target),
                )
            })
    }
}
