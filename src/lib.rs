//! Courier - HTTP/1.1 client
//!
//! Core library: immutable request and response messages, an interceptor pipeline,
//! a pooled connection layer and a dispatcher bounding concurrent asynchronous calls.

pub mod call;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod pool;

pub use call::{Call, CallState, Callback, callback_fn};
pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use http::{Headers, Method, Request, RequestBody, RequestBuilder, Response, ResponseBody};
pub use interceptor::{Chain, Interceptor, interceptor_fn};
pub use pool::ConnectionPool;
