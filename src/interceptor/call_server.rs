//! The last stage: one HTTP/1.1 exchange on the bound connection.

use std::future::Future;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::future::BoxFuture;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::http::body::ResponseBody;
use crate::http::connection::RealConnection;
use crate::http::headers::Headers;
use crate::http::parser::{self, StatusLine};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder};
use crate::http::writer::RequestWriter;
use crate::interceptor::{Chain, Interceptor};

/// Default buffer size for reading bodies of unknown length
const BUFFER_SIZE: usize = 8192;

/// Longest status or header line accepted
const MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct CallServerInterceptor;

impl CallServerInterceptor {
    pub fn new() -> Self {
        Self
    }

    async fn run(chain: Chain) -> Result<Response> {
        let request = chain.request().clone();
        let connection = chain
            .connection()
            .cloned()
            .ok_or_else(|| Error::Protocol("no connection bound to the call".to_string()))?;

        let mut transport = connection.lock_transport().await;
        let stream = transport.as_mut().ok_or(Error::ConnectionClosed)?;

        RequestWriter::new(&request)?
            .write_to_stream(stream, chain.write_timeout())
            .await?;

        tracing::debug!(
            id = connection.id(),
            method = %request.method(),
            url = request.url(),
            "Request sent"
        );

        let response = read_response(stream, request, &connection, chain.read_timeout()).await?;

        tracing::debug!(
            id = connection.id(),
            code = response.code(),
            bytes = response.body().and_then(|b| b.content_length()).unwrap_or(0),
            "Response received"
        );

        Ok(response)
    }
}

impl Interceptor for CallServerInterceptor {
    fn intercept<'a>(&'a self, chain: Chain) -> BoxFuture<'a, Result<Response>> {
        Box::pin(Self::run(chain))
    }
}

async fn read_response<R>(
    stream: &mut R,
    request: Request,
    connection: &RealConnection,
    read_timeout: Duration,
) -> Result<Response>
where
    R: AsyncBufRead + Unpin,
{
    // Status line
    let status_line = read_line(stream, read_timeout)
        .await?
        .ok_or(Error::ConnectionClosed)?;
    let StatusLine { code, message, .. } = parser::parse_status_line(&status_line)?;

    // Headers
    let mut headers = Headers::new();
    let mut content_length: Option<usize> = None;
    loop {
        let line = read_line(stream, read_timeout)
            .await?
            .ok_or_else(|| Error::Protocol("connection closed inside headers".to_string()))?;
        if line.is_empty() {
            break;
        }

        let (name, value) = parser::parse_header_line(&line)?;
        if name.eq_ignore_ascii_case("Content-Length") {
            content_length = Some(parser::parse_content_length(&value)?);
        }
        headers.set(name, value);
    }

    if headers
        .get("Connection")
        .is_some_and(|v| v.eq_ignore_ascii_case("close"))
    {
        connection.mark_not_reusable();
    }

    let chunked = headers
        .get("Transfer-Encoding")
        .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"));

    // Body
    let body = if !has_body(request.method(), code) {
        Bytes::new()
    } else if chunked {
        read_chunked(stream, read_timeout).await?
    } else {
        match content_length {
            Some(0) => Bytes::new(),
            Some(length) => read_exactly(stream, length, read_timeout).await?,
            None => {
                // End of message is end of stream; the socket can't carry another one.
                connection.mark_not_reusable();
                read_to_end(stream, read_timeout).await?
            }
        }
    };

    let content_type = headers.get("Content-Type").map(str::to_string);

    ResponseBuilder::new()
        .request(request)
        .code(code)
        .message(message)
        .headers(headers)
        .body(ResponseBody::from_bytes(content_type, body))
        .build()
}

fn has_body(method: Method, code: u16) -> bool {
    method != Method::HEAD && !(100..200).contains(&code) && code != 204 && code != 304
}

/// Bounds a single read. Slow but steady bodies never time out as a whole.
async fn timed<F, T>(limit: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| Error::Timeout {
            operation: "read",
            elapsed: limit,
        })?
}

/// Reads one CRLF-terminated line without its terminator. `None` at end of stream.
async fn read_line<R>(stream: &mut R, read_timeout: Duration) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = timed(read_timeout, async {
        (&mut *stream)
            .take(MAX_LINE_LENGTH as u64 + 1)
            .read_until(b'\n', &mut line)
            .await
            .map_err(Error::from)
    })
    .await?;

    if n == 0 {
        return Ok(None);
    }
    if line.last() != Some(&b'\n') {
        return Err(if line.len() > MAX_LINE_LENGTH {
            Error::Protocol("response line too long".to_string())
        } else {
            Error::Protocol("connection closed mid-line".to_string())
        });
    }

    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }

    String::from_utf8(line)
        .map(Some)
        .map_err(|_| Error::Protocol("response head is not valid UTF-8".to_string()))
}

/// Reads exactly `length` bytes, however the transport splits them.
///
/// A single `read` may return fewer bytes than asked for, so this keeps reading until
/// `length` bytes arrived; each read gets its own `read_timeout`. The buffer grows with
/// the bytes received, never with the declared length. Ending early fails with
/// [`Error::TruncatedBody`].
pub async fn read_exactly<R>(reader: &mut R, length: usize, read_timeout: Duration) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut body = BytesMut::with_capacity(length.min(BUFFER_SIZE));
    let mut limited = (&mut *reader).take(length as u64);

    while body.len() < length {
        let n = timed(read_timeout, async {
            limited.read_buf(&mut body).await.map_err(Error::from)
        })
        .await?;
        if n == 0 {
            return Err(Error::TruncatedBody {
                expected: length,
                received: body.len(),
            });
        }
    }

    Ok(body.freeze())
}

async fn read_to_end<R>(reader: &mut R, read_timeout: Duration) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut body = BytesMut::with_capacity(BUFFER_SIZE);
    loop {
        let n = timed(read_timeout, async {
            reader.read_buf(&mut body).await.map_err(Error::from)
        })
        .await?;
        if n == 0 {
            break;
        }
    }
    Ok(body.freeze())
}

async fn read_chunked<R>(stream: &mut R, read_timeout: Duration) -> Result<Bytes>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = BytesMut::new();
    loop {
        let size_line = read_line(stream, read_timeout)
            .await?
            .ok_or_else(|| Error::Protocol("connection closed before chunk size".to_string()))?;
        let size = parser::parse_chunk_size(&size_line)?;

        if size == 0 {
            // Trailers, then the blank line ending the message.
            while let Some(line) = read_line(stream, read_timeout).await? {
                if line.is_empty() {
                    break;
                }
            }
            break;
        }

        body.extend_from_slice(&read_exactly(stream, size, read_timeout).await?);

        match read_line(stream, read_timeout).await? {
            Some(line) if line.is_empty() => {}
            _ => return Err(Error::Protocol("missing CRLF after chunk data".to_string())),
        }
    }
    Ok(body.freeze())
}
