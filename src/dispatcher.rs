//! Scheduling of asynchronous calls.
//!
//! The dispatcher caps how many asynchronous calls run at once, in total and per host.
//! Calls over either limit wait in a ready queue and are promoted as running calls
//! finish. Synchronous calls are only tracked so they can be counted and canceled.
//!
//! Tasks run on the Tokio runtime; concurrency is bounded here, not by the runtime.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;

use crate::call::AsyncCall;
use crate::error::{Error, Result};

pub const DEFAULT_MAX_REQUESTS: usize = 64;
pub const DEFAULT_MAX_REQUESTS_PER_HOST: usize = 5;

#[derive(Debug)]
struct RunningCall {
    id: u64,
    host: String,
    canceled: Arc<AtomicBool>,
}

#[derive(Debug)]
struct DispatcherState {
    max_requests: usize,
    max_requests_per_host: usize,
    ready_async: VecDeque<AsyncCall>,
    running_async: Vec<RunningCall>,
    running_sync: Vec<RunningCall>,
}

impl DispatcherState {
    fn running_for_host(&self, host: &str) -> usize {
        self.running_async.iter().filter(|c| c.host == host).count()
    }

    fn has_room_for(&self, host: &str) -> bool {
        self.running_async.len() < self.max_requests
            && self.running_for_host(host) < self.max_requests_per_host
    }

    fn start(&mut self, call: &AsyncCall) {
        self.running_async.push(RunningCall {
            id: call.id(),
            host: call.host().to_string(),
            canceled: call.cancel_flag(),
        });
    }

    /// Moves every ready call that fits under both limits to running.
    fn promote(&mut self) -> Vec<AsyncCall> {
        let mut promoted = Vec::new();
        let mut i = 0;
        while i < self.ready_async.len() {
            if self.running_async.len() >= self.max_requests {
                break;
            }
            if !self.has_room_for(self.ready_async[i].host()) {
                i += 1;
                continue;
            }
            if let Some(call) = self.ready_async.remove(i) {
                self.start(&call);
                promoted.push(call);
            }
        }
        promoted
    }
}

#[derive(Debug)]
pub struct Dispatcher {
    state: Mutex<DispatcherState>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_REQUESTS, DEFAULT_MAX_REQUESTS_PER_HOST)
    }

    /// Both limits are clamped to at least 1.
    pub fn with_limits(max_requests: usize, max_requests_per_host: usize) -> Self {
        Self {
            state: Mutex::new(DispatcherState {
                max_requests: max_requests.max(1),
                max_requests_per_host: max_requests_per_host.max(1),
                ready_async: VecDeque::new(),
                running_async: Vec::new(),
                running_sync: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DispatcherState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `call` now if both limits allow it, otherwise queues it.
    ///
    /// Fails with [`Error::NoRuntime`] outside a Tokio runtime; the call is dropped.
    pub(crate) fn enqueue(self: &Arc<Self>, call: AsyncCall) -> Result<()> {
        let handle = Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let mut state = self.lock();
        if state.has_room_for(call.host()) {
            state.start(&call);
            drop(state);
            self.spawn(&handle, call);
        } else {
            tracing::debug!(
                id = call.id(),
                host = call.host(),
                queued = state.ready_async.len() + 1,
                "Call queued"
            );
            state.ready_async.push_back(call);
        }
        Ok(())
    }

    pub(crate) fn finished_async(self: &Arc<Self>, id: u64) {
        let promoted = {
            let mut state = self.lock();
            state.running_async.retain(|c| c.id != id);
            state.promote()
        };
        self.spawn_all(promoted);
    }

    pub(crate) fn executed(&self, id: u64, canceled: Arc<AtomicBool>) {
        self.lock().running_sync.push(RunningCall {
            id,
            host: String::new(),
            canceled,
        });
    }

    pub(crate) fn finished_sync(&self, id: u64) {
        self.lock().running_sync.retain(|c| c.id != id);
    }

    fn spawn_all(self: &Arc<Self>, calls: Vec<AsyncCall>) {
        if calls.is_empty() {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            // Promoted outside a runtime: back to the head of the queue for the next promotion.
            let mut state = self.lock();
            for call in calls.into_iter().rev() {
                state.running_async.retain(|c| c.id != call.id());
                state.ready_async.push_front(call);
            }
            return;
        };
        for call in calls {
            tracing::debug!(id = call.id(), host = call.host(), "Call promoted");
            self.spawn(&handle, call);
        }
    }

    fn spawn(self: &Arc<Self>, handle: &Handle, call: AsyncCall) {
        let finished = Finished {
            dispatcher: Arc::clone(self),
            id: call.id(),
        };
        handle.spawn(async move {
            let _finished = finished;
            call.run().await;
        });
    }

    /// Cancels every queued and running call.
    pub fn cancel_all(&self) {
        let state = self.lock();
        for call in &state.ready_async {
            call.cancel_flag().store(true, Ordering::Release);
        }
        for call in state.running_async.iter().chain(&state.running_sync) {
            call.canceled.store(true, Ordering::Release);
        }
    }

    /// Running asynchronous plus running synchronous calls.
    pub fn running_calls_count(&self) -> usize {
        let state = self.lock();
        state.running_async.len() + state.running_sync.len()
    }

    pub fn queued_calls_count(&self) -> usize {
        self.lock().ready_async.len()
    }

    pub fn max_requests(&self) -> usize {
        self.lock().max_requests
    }

    pub fn max_requests_per_host(&self) -> usize {
        self.lock().max_requests_per_host
    }

    pub fn set_max_requests(self: &Arc<Self>, max_requests: usize) -> Result<()> {
        if max_requests < 1 {
            return Err(Error::InvalidConfig("max_requests must be at least 1"));
        }
        let promoted = {
            let mut state = self.lock();
            state.max_requests = max_requests;
            state.promote()
        };
        self.spawn_all(promoted);
        Ok(())
    }

    pub fn set_max_requests_per_host(self: &Arc<Self>, max_requests_per_host: usize) -> Result<()> {
        if max_requests_per_host < 1 {
            return Err(Error::InvalidConfig("max_requests_per_host must be at least 1"));
        }
        let promoted = {
            let mut state = self.lock();
            state.max_requests_per_host = max_requests_per_host;
            state.promote()
        };
        self.spawn_all(promoted);
        Ok(())
    }
}

/// Reports a finished async call even if its task panicked.
struct Finished {
    dispatcher: Arc<Dispatcher>,
    id: u64,
}

impl Drop for Finished {
    fn drop(&mut self) {
        self.dispatcher.finished_async(self.id);
    }
}
