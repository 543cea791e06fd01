use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::http::connection::RealConnection;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::interceptor::Interceptor;

/// The position of one call inside the interceptor list.
///
/// A chain is never advanced in place: [`Chain::proceed`] builds a new chain for the
/// next index, and each chain allows a single `proceed`.
pub struct Chain {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    index: usize,
    request: Request,
    client: Client,
    canceled: Arc<AtomicBool>,
    connection: Option<Arc<RealConnection>>,
    calls: AtomicUsize,
}

impl Chain {
    /// Root chain at index 0.
    pub fn new(interceptors: Arc<[Arc<dyn Interceptor>]>, request: Request, client: Client) -> Self {
        Self::with_cancel_flag(interceptors, request, client, Arc::new(AtomicBool::new(false)))
    }

    pub(crate) fn with_cancel_flag(
        interceptors: Arc<[Arc<dyn Interceptor>]>,
        request: Request,
        client: Client,
        canceled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            interceptors,
            index: 0,
            request,
            client,
            canceled,
            connection: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn connect_timeout(&self) -> Duration {
        self.client.config().connect_timeout()
    }

    pub fn read_timeout(&self) -> Duration {
        self.client.config().read_timeout()
    }

    pub fn write_timeout(&self) -> Duration {
        self.client.config().write_timeout()
    }

    /// The connection bound by the connect stage, visible to every later stage.
    pub fn connection(&self) -> Option<&Arc<RealConnection>> {
        self.connection.as_ref()
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Runs the interceptor at this chain's index with `request`.
    ///
    /// Fails with [`Error::ChainExhausted`] past the last interceptor and with
    /// [`Error::ProceedCalledTwice`] on a second call.
    pub async fn proceed(&self, request: Request) -> Result<Response> {
        let Some(interceptor) = self.interceptors.get(self.index) else {
            return Err(Error::ChainExhausted { index: self.index });
        };

        if self.calls.fetch_add(1, Ordering::AcqRel) > 0 {
            return Err(Error::ProceedCalledTwice {
                index: self.index.saturating_sub(1),
            });
        }

        let next = Chain {
            interceptors: Arc::clone(&self.interceptors),
            index: self.index + 1,
            request,
            client: self.client.clone(),
            canceled: Arc::clone(&self.canceled),
            connection: self.connection.clone(),
            calls: AtomicUsize::new(0),
        };

        interceptor.intercept(next).await
    }

    /// Same position with `connection` attached for the stages below.
    pub(crate) fn with_connection(&self, connection: Arc<RealConnection>) -> Chain {
        Chain {
            connection: Some(connection),
            ..self.copy_at_same_index()
        }
    }

    /// Same position with a fresh `proceed` allowance, one per follow-up attempt.
    pub(crate) fn next_attempt(&self) -> Chain {
        self.copy_at_same_index()
    }

    fn copy_at_same_index(&self) -> Chain {
        Chain {
            interceptors: Arc::clone(&self.interceptors),
            index: self.index,
            request: self.request.clone(),
            client: self.client.clone(),
            canceled: Arc::clone(&self.canceled),
            connection: self.connection.clone(),
            calls: AtomicUsize::new(0),
        }
    }
}
