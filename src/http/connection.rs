//! A single pooled transport to one `(host, port)`.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::BufStream;
use tokio::net::TcpStream;
use tokio::sync::MutexGuard;
use tokio::time::timeout;

use crate::error::{Error, Result};

/// Buffered socket carried by a connection.
pub type Transport = BufStream<TcpStream>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct Lease {
    references: usize,
    idle_since: Option<Instant>,
}

/// A live socket plus the bookkeeping the pool needs.
///
/// The reference count is 0 while the connection sits idle in the pool and 1 while a
/// call owns it. Apart from the initial acquisition in [`RealConnection::connect`],
/// it is only changed by [`ConnectionPool`](crate::pool::ConnectionPool) under its lock.
pub struct RealConnection {
    id: u64,
    host: String,
    port: u16,
    transport: tokio::sync::Mutex<Option<Transport>>,
    lease: Mutex<Lease>,
    closed: AtomicBool,
    reusable: AtomicBool,
}

impl RealConnection {
    /// Opens a TCP connection within `connect_timeout`. The result is already
    /// acquired (reference count 1).
    pub async fn connect(host: &str, port: u16, connect_timeout: Duration) -> Result<Arc<Self>> {
        let stream = timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| Error::Timeout {
                operation: "connect",
                elapsed: connect_timeout,
            })?
            .map_err(|source| Error::Connect {
                host: host.to_string(),
                port,
                source,
            })?;
        stream.set_nodelay(true)?;

        let connection = Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            host: host.to_string(),
            port,
            transport: tokio::sync::Mutex::new(Some(BufStream::new(stream))),
            lease: Mutex::new(Lease {
                references: 1,
                idle_since: None,
            }),
            closed: AtomicBool::new(false),
            reusable: AtomicBool::new(true),
        };

        tracing::debug!(id = connection.id, host, port, "Connection established");
        Ok(Arc::new(connection))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn matches(&self, host: &str, port: u16) -> bool {
        self.port == port && self.host.eq_ignore_ascii_case(host)
    }

    /// Exclusive access to the socket for one exchange. `None` once closed.
    pub async fn lock_transport(&self) -> MutexGuard<'_, Option<Transport>> {
        self.transport.lock().await
    }

    pub(crate) fn acquire(&self) {
        if let Ok(mut lease) = self.lease.lock() {
            lease.references += 1;
            lease.idle_since = None;
        }
    }

    pub(crate) fn release(&self) {
        if let Ok(mut lease) = self.lease.lock() {
            lease.references = lease.references.saturating_sub(1);
            if lease.references == 0 {
                lease.idle_since = Some(Instant::now());
            }
        }
    }

    pub fn references(&self) -> usize {
        self.lease.lock().map(|lease| lease.references).unwrap_or(0)
    }

    pub fn is_in_use(&self) -> bool {
        self.references() > 0
    }

    /// When the connection last became idle; `None` while in use.
    pub fn idle_since(&self) -> Option<Instant> {
        self.lease.lock().ok().and_then(|lease| lease.idle_since)
    }

    /// Prevents the connection from being pooled after the current exchange.
    pub fn mark_not_reusable(&self) {
        self.reusable.store(false, Ordering::Release);
    }

    pub fn is_reusable(&self) -> bool {
        self.reusable.load(Ordering::Acquire) && !self.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the socket. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // If an exchange holds the transport, the socket goes with the last reference.
        if let Ok(mut transport) = self.transport.try_lock() {
            transport.take();
        }
        tracing::debug!(id = self.id, host = %self.host, port = self.port, "Connection closed");
    }
}

impl fmt::Debug for RealConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealConnection")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("references", &self.references())
            .field("closed", &self.is_closed())
            .finish()
    }
}
