//! A single execution of a request.
//!
//! A [`Call`] runs once, either awaited directly with [`Call::execute`] or scheduled on the
//! client's [`Dispatcher`](crate::dispatcher::Dispatcher) with [`Call::enqueue`].
//! Cancellation is cooperative: the flag is checked before the pipeline starts, before
//! each retry or follow-up, and before a callback fires. Work already on the wire is not
//! interrupted.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::client::Client;
use crate::error::{Error, Result};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::url::Address;
use crate::interceptor::{
    BridgeInterceptor, CallServerInterceptor, Chain, ConnectInterceptor, Interceptor,
    RetryAndFollowUpInterceptor,
};

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Created,
    Executing,
    Completed,
    Canceled,
}

/// Receives the outcome of an enqueued call. Exactly one method is invoked.
pub trait Callback: Send + 'static {
    fn on_response(self: Box<Self>, response: Response);

    fn on_failure(self: Box<Self>, error: Error);
}

/// Callback backed by a closure over the call's result. See [`callback_fn`].
pub struct FnCallback<F> {
    f: F,
}

pub fn callback_fn<F>(f: F) -> FnCallback<F>
where
    F: FnOnce(Result<Response>) + Send + 'static,
{
    FnCallback { f }
}

impl<F> Callback for FnCallback<F>
where
    F: FnOnce(Result<Response>) + Send + 'static,
{
    fn on_response(self: Box<Self>, response: Response) {
        (self.f)(Ok(response))
    }

    fn on_failure(self: Box<Self>, error: Error) {
        (self.f)(Err(error))
    }
}

#[derive(Debug)]
struct CallShared {
    state: Mutex<CallState>,
    canceled: Arc<AtomicBool>,
}

impl CallShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(CallState::Created),
            canceled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn state(&self) -> CallState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(CallState::Completed)
    }

    /// Moves `Created` to `Executing`; any other state is a second execution.
    fn begin(&self) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match *state {
            CallState::Created => {
                *state = CallState::Executing;
                Ok(())
            }
            _ => Err(Error::AlreadyExecuted),
        }
    }

    fn finish(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = if self.canceled.load(Ordering::Acquire) {
            CallState::Canceled
        } else {
            CallState::Completed
        };
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}

/// One request bound to one client.
pub struct Call {
    id: u64,
    client: Client,
    request: Request,
    shared: Arc<CallShared>,
}

impl Call {
    pub(crate) fn new(client: Client, request: Request) -> Self {
        Self {
            id: NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed),
            client,
            request,
            shared: Arc::new(CallShared::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn state(&self) -> CallState {
        self.shared.state()
    }

    pub fn is_executed(&self) -> bool {
        self.state() != CallState::Created
    }

    pub fn is_canceled(&self) -> bool {
        self.shared.is_canceled()
    }

    /// Requests cancellation. A response already on its way may still arrive.
    pub fn cancel(&self) {
        self.shared.canceled.store(true, Ordering::Release);
        tracing::debug!(id = self.id, url = self.request.url(), "Call canceled");
    }

    /// Runs the call on the current task and returns its response.
    ///
    /// Fails with [`Error::AlreadyExecuted`] if this call was executed or enqueued before.
    pub async fn execute(&self) -> Result<Response> {
        self.shared.begin()?;

        let dispatcher = Arc::clone(self.client.dispatcher());
        dispatcher.executed(self.id, Arc::clone(&self.shared.canceled));
        let _running = SyncRunning {
            client: &self.client,
            id: self.id,
        };

        let result = if self.shared.is_canceled() {
            Err(Error::Canceled)
        } else {
            response_with_interceptor_chain(
                &self.client,
                self.request.clone(),
                Arc::clone(&self.shared.canceled),
            )
            .await
        };

        self.shared.finish();
        result
    }

    /// Schedules the call on the client's dispatcher. `callback` runs on a Tokio worker.
    ///
    /// Fails with [`Error::AlreadyExecuted`] if this call was executed or enqueued before,
    /// and with [`Error::NoRuntime`] outside a Tokio runtime. `callback` is dropped in
    /// both cases.
    pub fn enqueue(&self, callback: impl Callback) -> Result<()> {
        self.shared.begin()?;

        let host = Address::from_url(self.request.url())
            .map(|address| address.host)
            .unwrap_or_default();

        let async_call = AsyncCall {
            id: self.id,
            host,
            client: self.client.clone(),
            request: self.request.clone(),
            shared: Arc::clone(&self.shared),
            callback: Box::new(callback),
        };
        self.client.dispatcher().enqueue(async_call).inspect_err(|_| {
            self.shared.finish();
        })
    }
}

/// A fresh, unexecuted call for the same request.
impl Clone for Call {
    fn clone(&self) -> Self {
        Call::new(self.client.clone(), self.request.clone())
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("id", &self.id)
            .field("request", &self.request)
            .field("state", &self.state())
            .finish()
    }
}

struct SyncRunning<'a> {
    client: &'a Client,
    id: u64,
}

impl Drop for SyncRunning<'_> {
    fn drop(&mut self) {
        self.client.dispatcher().finished_sync(self.id);
    }
}

/// A call handed to the dispatcher, together with its callback.
pub(crate) struct AsyncCall {
    id: u64,
    host: String,
    client: Client,
    request: Request,
    shared: Arc<CallShared>,
    callback: Box<dyn Callback>,
}

impl AsyncCall {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn host(&self) -> &str {
        &self.host
    }

    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shared.canceled)
    }

    pub(crate) async fn run(self) {
        let AsyncCall {
            id,
            client,
            request,
            shared,
            callback,
            ..
        } = self;

        let result = if shared.is_canceled() {
            Err(Error::Canceled)
        } else {
            response_with_interceptor_chain(&client, request, Arc::clone(&shared.canceled)).await
        };
        shared.finish();

        // A cancel that lands while the response is in flight still wins.
        let result = match result {
            Ok(response) if shared.is_canceled() => {
                if let Some(body) = response.body() {
                    body.close();
                }
                Err(Error::Canceled)
            }
            other => other,
        };

        match result {
            Ok(response) => callback.on_response(response),
            Err(e) => {
                tracing::debug!(id, error = %e, "Async call failed");
                callback.on_failure(e)
            }
        }
    }
}

impl fmt::Debug for AsyncCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncCall")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("url", &self.request.url())
            .finish()
    }
}

/// Runs `request` through application interceptors, the built-in stages and network
/// interceptors, in that order.
pub(crate) async fn response_with_interceptor_chain(
    client: &Client,
    request: Request,
    canceled: Arc<AtomicBool>,
) -> Result<Response> {
    let mut interceptors: Vec<Arc<dyn Interceptor>> = client.interceptors().to_vec();
    interceptors.push(Arc::new(RetryAndFollowUpInterceptor::new()));
    interceptors.push(Arc::new(BridgeInterceptor::new()));
    interceptors.push(Arc::new(ConnectInterceptor::new()));
    interceptors.extend(client.network_interceptors().iter().cloned());
    interceptors.push(Arc::new(CallServerInterceptor::new()));

    let chain = Chain::with_cancel_flag(interceptors.into(), request.clone(), client.clone(), canceled);
    chain.proceed(request).await
}
