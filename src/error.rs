//! Error type shared by every stage of a call.
//!
//! Errors fall into three families:
//!
//! - **connection** errors (failed connect, reset, timeout, stale socket). The retry
//!   stage may re-attempt these when [`Error::is_recoverable`] says so.
//! - **protocol** errors (bad status line, bad chunk framing, truncated body). Always
//!   fatal: the framing on that socket can no longer be trusted.
//! - **policy** violations (a call executed twice, `proceed` called twice, too many
//!   follow-ups). Programming errors surfaced immediately.

use std::io;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    /// The peer closed the connection before sending a status line.
    #[error("connection closed before a response was received")]
    ConnectionClosed,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("body truncated: expected {expected} bytes, received {received}")]
    TruncatedBody { expected: usize, received: usize },

    #[error("call already executed")]
    AlreadyExecuted,

    #[error("interceptor chain exhausted at index {index}")]
    ChainExhausted { index: usize },

    #[error("interceptor at index {index} must call proceed() exactly once")]
    ProceedCalledTwice { index: usize },

    #[error("too many follow-up requests: {0}")]
    TooManyFollowUps(u32),

    #[error("body already consumed")]
    BodyConsumed,

    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),

    #[error("invalid url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// An async call was enqueued outside a Tokio runtime.
    #[error("no tokio runtime to run the call on")]
    NoRuntime,

    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("canceled")]
    Canceled,
}

impl Error {
    /// Whether a fresh attempt on a new (or different pooled) connection can succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Timeout { .. } | Error::ConnectionClosed => true,
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::TimedOut
            ),
            Error::Connect { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Whether the error is a programming mistake rather than a runtime condition.
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            Error::AlreadyExecuted
                | Error::ChainExhausted { .. }
                | Error::ProceedCalledTwice { .. }
                | Error::TooManyFollowUps(_)
        )
    }
}
