//! Request and response payloads.
//!
//! Both body kinds are either backed by bytes held in memory or by an [`AsyncRead`]
//! stream. Stream-backed bodies are single-use: a second write or read fails with
//! [`Error::BodyConsumed`].

use std::fmt;
use std::io::Cursor;
use std::sync::Mutex;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Boxed byte source used by stream-backed bodies.
pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

const CHUNK_SIZE: usize = 8192;

enum RequestSource {
    Bytes(Bytes),
    Stream(Mutex<Option<BodyReader>>),
}

/// Payload of an outgoing request.
pub struct RequestBody {
    content_type: Option<String>,
    content_length: Option<u64>,
    source: RequestSource,
}

impl RequestBody {
    pub fn from_bytes(content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            content_type: Some(content_type.into()),
            content_length: Some(bytes.len() as u64),
            source: RequestSource::Bytes(bytes),
        }
    }

    /// UTF-8 text body with the given media type.
    pub fn from_string(content_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self::from_bytes(content_type, content.into())
    }

    pub fn json(json: impl Into<String>) -> Self {
        Self::from_string("application/json; charset=utf-8", json)
    }

    pub fn form(form_data: impl Into<String>) -> Self {
        Self::from_string("application/x-www-form-urlencoded", form_data)
    }

    /// Stream-backed body. With `length == None` the body is sent chunked.
    pub fn from_reader<R>(content_type: Option<String>, reader: R, length: Option<u64>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            content_type,
            content_length: length,
            source: RequestSource::Stream(Mutex::new(Some(Box::new(reader)))),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Byte length of the body, `None` when unknown.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn is_one_shot(&self) -> bool {
        matches!(self.source, RequestSource::Stream(_))
    }

    /// Writes the body to `sink`, using chunked framing when the length is unknown.
    pub async fn write_to<W>(&self, sink: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        match &self.source {
            RequestSource::Bytes(bytes) => {
                sink.write_all(bytes).await?;
            }
            RequestSource::Stream(slot) => {
                let reader = take_slot(slot)?;
                match self.content_length {
                    Some(length) => write_fixed(reader, length, sink).await?,
                    None => write_chunked(reader, sink).await?,
                }
            }
        }
        sink.flush().await?;
        Ok(())
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBody")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("one_shot", &self.is_one_shot())
            .finish()
    }
}

async fn write_fixed<W>(reader: BodyReader, length: u64, sink: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut limited = reader.take(length);
    let copied = tokio::io::copy(&mut limited, sink).await?;
    if copied != length {
        return Err(Error::Protocol(format!(
            "request body ended after {copied} of {length} declared bytes"
        )));
    }
    Ok(())
}

async fn write_chunked<W>(mut reader: BodyReader, sink: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        sink.write_all(format!("{n:X}\r\n").as_bytes()).await?;
        sink.write_all(&buf[..n]).await?;
        sink.write_all(b"\r\n").await?;
    }
    sink.write_all(b"0\r\n\r\n").await?;
    Ok(())
}

enum ResponseSource {
    Bytes(Bytes),
    Stream(BodyReader),
}

/// Payload of an incoming response. Readable exactly once.
pub struct ResponseBody {
    content_type: Option<String>,
    content_length: Option<u64>,
    source: Mutex<Option<ResponseSource>>,
}

impl ResponseBody {
    pub fn from_bytes(content_type: Option<String>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            content_type,
            content_length: Some(bytes.len() as u64),
            source: Mutex::new(Some(ResponseSource::Bytes(bytes))),
        }
    }

    pub fn from_reader<R>(content_type: Option<String>, reader: R, length: Option<u64>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            content_type,
            content_length: length,
            source: Mutex::new(Some(ResponseSource::Stream(Box::new(reader)))),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Takes the underlying stream. Any later read fails with [`Error::BodyConsumed`].
    pub fn byte_stream(&self) -> Result<BodyReader> {
        match take_slot(&self.source)? {
            ResponseSource::Bytes(bytes) => Ok(Box::new(Cursor::new(bytes))),
            ResponseSource::Stream(reader) => Ok(reader),
        }
    }

    /// Reads the whole body into memory.
    pub async fn bytes(&self) -> Result<Bytes> {
        match take_slot(&self.source)? {
            ResponseSource::Bytes(bytes) => Ok(bytes),
            ResponseSource::Stream(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }

    /// Reads the whole body as text, replacing invalid UTF-8 sequences.
    pub async fn string(&self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Releases the underlying source. Closing an already consumed body is a no-op.
    pub fn close(&self) {
        if let Ok(mut slot) = self.source.lock() {
            slot.take();
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.source.lock().map(|slot| slot.is_none()).unwrap_or(true)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

fn take_slot<T>(slot: &Mutex<Option<T>>) -> Result<T> {
    slot.lock()
        .ok()
        .and_then(|mut guard| guard.take())
        .ok_or(Error::BodyConsumed)
}
