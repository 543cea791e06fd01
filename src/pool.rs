//! Connection pool
//!
//! Keeps idle HTTP/1.1 connections keyed by `(host, port)` so later calls can skip the
//! TCP handshake. A background task evicts connections that stay idle longer than the
//! keep-alive window, or the longest-idle one when there are too many idle connections.
//! The task starts on the first [`ConnectionPool::put`] and stops once the pool is
//! empty.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use crate::http::connection::RealConnection;

pub const DEFAULT_MAX_IDLE_CONNECTIONS: usize = 5;
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(5 * 60);

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleanup {
    /// A connection was evicted; scan again right away.
    Evicted,
    /// Nothing to evict before this much time has passed.
    Wait(Duration),
    /// The pool is empty; the eviction task should exit.
    Stop,
}

#[derive(Debug, Default)]
struct PoolState {
    connections: VecDeque<Arc<RealConnection>>,
    cleanup_running: bool,
}

#[derive(Debug)]
struct PoolInner {
    max_idle_connections: usize,
    keep_alive: Duration,
    state: Mutex<PoolState>,
}

#[derive(Debug, Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE_CONNECTIONS, DEFAULT_KEEP_ALIVE)
    }
}

impl ConnectionPool {
    pub fn new(max_idle_connections: usize, keep_alive: Duration) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                max_idle_connections,
                keep_alive,
                state: Mutex::new(PoolState::default()),
            }),
        }
    }

    pub fn keep_alive(&self) -> Duration {
        self.inner.keep_alive
    }

    pub fn max_idle_connections(&self) -> usize {
        self.inner.max_idle_connections
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Every critical section leaves the state consistent.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Finds an idle connection to `(host, port)` and acquires it.
    ///
    /// Closed entries met during the scan are dropped from the pool.
    pub fn get(&self, host: &str, port: u16) -> Option<Arc<RealConnection>> {
        let mut state = self.lock();
        state.connections.retain(|c| !c.is_closed());

        let connection = state
            .connections
            .iter()
            .find(|c| c.matches(host, port) && !c.is_in_use())?;
        connection.acquire();

        tracing::trace!(id = connection.id(), host, port, "Reusing pooled connection");
        Some(Arc::clone(connection))
    }

    /// Releases `connection` and keeps it for reuse.
    ///
    /// Connections that are closed or not reusable are closed and dropped instead.
    pub fn put(&self, connection: Arc<RealConnection>) {
        let mut state = self.lock();
        connection.release();

        if !connection.is_reusable() {
            state.connections.retain(|c| !Arc::ptr_eq(c, &connection));
            drop(state);
            connection.close();
            return;
        }

        if !state.connections.iter().any(|c| Arc::ptr_eq(c, &connection)) {
            state.connections.push_back(connection);
        }
        self.ensure_cleanup(&mut state);
    }

    /// Drops one reference without touching pool membership.
    pub fn release(&self, connection: &Arc<RealConnection>) {
        let _state = self.lock();
        connection.release();
    }

    /// Removes and closes a connection whose framing state is unknown.
    pub fn discard(&self, connection: &Arc<RealConnection>) {
        let mut state = self.lock();
        state.connections.retain(|c| !Arc::ptr_eq(c, connection));
        drop(state);
        connection.close();
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    pub fn idle_connection_count(&self) -> usize {
        self.lock()
            .connections
            .iter()
            .filter(|c| !c.is_in_use())
            .count()
    }

    pub fn is_cleanup_running(&self) -> bool {
        self.lock().cleanup_running
    }

    /// Closes and removes every connection.
    pub fn evict_all(&self) {
        let evicted: Vec<_> = self.lock().connections.drain(..).collect();
        for connection in evicted {
            connection.close();
        }
    }

    /// Runs one eviction pass as of `now`.
    pub fn cleanup(&self, now: Instant) -> Cleanup {
        let mut state = self.lock();

        let mut in_use = 0usize;
        let mut idle = 0usize;
        let mut longest_idle: Option<(usize, Duration)> = None;

        for (i, connection) in state.connections.iter().enumerate() {
            if connection.is_in_use() {
                in_use += 1;
                continue;
            }
            idle += 1;

            let idle_for = connection
                .idle_since()
                .map(|since| now.saturating_duration_since(since))
                .unwrap_or_default();
            if longest_idle.is_none_or(|(_, longest)| idle_for > longest) {
                longest_idle = Some((i, idle_for));
            }
        }

        match longest_idle {
            Some((i, idle_for))
                if idle_for > self.inner.keep_alive || idle > self.inner.max_idle_connections =>
            {
                if let Some(connection) = state.connections.remove(i) {
                    tracing::debug!(
                        id = connection.id(),
                        host = connection.host(),
                        port = connection.port(),
                        idle_for = ?idle_for,
                        "Evicting idle connection"
                    );
                    connection.close();
                }
                Cleanup::Evicted
            }
            Some((_, idle_for)) => Cleanup::Wait(self.inner.keep_alive - idle_for),
            None if in_use > 0 => Cleanup::Wait(self.inner.keep_alive),
            None => {
                state.cleanup_running = false;
                Cleanup::Stop
            }
        }
    }

    fn ensure_cleanup(&self, state: &mut PoolState) {
        if state.cleanup_running {
            return;
        }
        // Without a runtime the owner drives `cleanup` by hand.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        state.cleanup_running = true;
        handle.spawn(cleanup_loop(Arc::downgrade(&self.inner)));
    }
}

async fn cleanup_loop(pool: Weak<PoolInner>) {
    tracing::trace!("Connection pool cleanup started");
    loop {
        let Some(inner) = pool.upgrade() else {
            return;
        };
        let outcome = ConnectionPool { inner }.cleanup(Instant::now());

        match outcome {
            Cleanup::Evicted => continue,
            Cleanup::Wait(wait) => tokio::time::sleep(wait).await,
            Cleanup::Stop => {
                tracing::trace!("Connection pool empty, cleanup stopped");
                return;
            }
        }
    }
}
