//! Request pipeline
//!
//! A call runs through a fixed list of interceptors:
//!
//! ```text
//! [application interceptors]
//!   → RetryAndFollowUpInterceptor   retries and redirects
//!   → BridgeInterceptor             default headers, transparent gzip
//!   → ConnectInterceptor            pooled connection for (host, port)
//! [network interceptors]
//!   → CallServerInterceptor         HTTP/1.1 exchange on the socket
//! ```
//!
//! Each stage receives a [`Chain`] positioned just after itself. Calling
//! [`Chain::proceed`] builds a fresh chain for the next position and runs the next stage,
//! so the whole pipeline is a series of nested async calls and the response travels back
//! out through every stage in reverse order.

mod bridge;
mod call_server;
mod chain;
mod connect;
mod retry;

use std::future::Future;

use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::http::response::Response;

pub use bridge::BridgeInterceptor;
pub use call_server::{CallServerInterceptor, read_exactly};
pub use chain::Chain;
pub use connect::ConnectInterceptor;
pub use retry::{MAX_FOLLOW_UPS, RetryAndFollowUpInterceptor};

/// One stage of the pipeline.
///
/// An interceptor may rewrite `chain.request()` and call [`Chain::proceed`] once, answer
/// without proceeding, and rewrite the response on its way back.
pub trait Interceptor: Send + Sync {
    fn intercept<'a>(&'a self, chain: Chain) -> BoxFuture<'a, Result<Response>>;
}

/// Interceptor backed by an async closure. See [`interceptor_fn`].
pub struct FnInterceptor<F> {
    f: F,
}

/// Wraps `f` as an [`Interceptor`].
///
/// ```ignore
/// let logging = interceptor_fn(|chain: Chain| async move {
///     let request = chain.request().clone();
///     tracing::info!(%request, "sending");
///     chain.proceed(request).await
/// });
/// ```
pub fn interceptor_fn<F, Fut>(f: F) -> FnInterceptor<F>
where
    F: Fn(Chain) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    FnInterceptor { f }
}

impl<F, Fut> Interceptor for FnInterceptor<F>
where
    F: Fn(Chain) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    fn intercept<'a>(&'a self, chain: Chain) -> BoxFuture<'a, Result<Response>> {
        Box::pin((self.f)(chain))
    }
}
