use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::http::request::Request;
use crate::http::url;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Serializes the request line and header block, terminated by a blank line.
pub fn serialize_request_head(request: &Request) -> Result<Vec<u8>> {
    let mut buf = Vec::new();

    // Request line
    let request_line = format!(
        "{} {} {}\r\n",
        request.method(),
        url::request_target(request.url())?,
        HTTP_VERSION
    );
    buf.extend_from_slice(request_line.as_bytes());

    // Headers
    for (k, v) in request.header_map().iter() {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    Ok(buf)
}

pub struct RequestWriter<'a> {
    request: &'a Request,
    head: Vec<u8>,
    written: usize,
}

impl<'a> RequestWriter<'a> {
    pub fn new(request: &'a Request) -> Result<Self> {
        Ok(Self {
            request,
            head: serialize_request_head(request)?,
            written: 0,
        })
    }

    /// Writes the head, flushes, then streams the body if there is one.
    pub async fn write_to_stream<W>(&mut self, stream: &mut W, write_timeout: Duration) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        tokio::time::timeout(write_timeout, self.write_all(stream))
            .await
            .map_err(|_| Error::Timeout {
                operation: "write",
                elapsed: write_timeout,
            })?
    }

    async fn write_all<W>(&mut self, stream: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while self.written < self.head.len() {
            let n = stream.write(&self.head[self.written..]).await?;

            if n == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "connection closed while writing",
                )));
            }

            self.written += n;
        }
        stream.flush().await?;

        if let Some(body) = self.request.body() {
            body.write_to(stream).await?;
        }

        Ok(())
    }
}
