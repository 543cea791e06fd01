//! Parsing of the response head: status line, header lines and chunk-size lines.

use crate::error::Error;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    InvalidStatusLine,
    InvalidStatusCode,
    InvalidHeader,
    InvalidContentLength,
    InvalidChunkSize,
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Protocol(format!("{e:?}"))
    }
}

/// `HTTP/1.1 200 OK` split into its three parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: String,
    pub code: u16,
    pub message: String,
}

pub fn parse_status_line(line: &str) -> Result<StatusLine, ParseError> {
    let mut parts = line.splitn(3, ' ');

    let version = parts.next().ok_or(ParseError::InvalidStatusLine)?;
    if !version.starts_with("HTTP/") {
        return Err(ParseError::InvalidStatusLine);
    }

    let code = parts.next().ok_or(ParseError::InvalidStatusLine)?;
    if code.len() != 3 {
        return Err(ParseError::InvalidStatusCode);
    }
    let code = code.parse::<u16>().map_err(|_| ParseError::InvalidStatusCode)?;

    // The reason phrase is optional.
    let message = parts.next().unwrap_or("").trim().to_string();

    Ok(StatusLine {
        version: version.to_string(),
        code,
        message,
    })
}

pub fn parse_header_line(line: &str) -> Result<(String, String), ParseError> {
    let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ParseError::InvalidHeader);
    }
    Ok((key.to_string(), value.trim().to_string()))
}

pub fn parse_content_length(value: &str) -> Result<usize, ParseError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| ParseError::InvalidContentLength)
}

/// Parses the hex size that opens a chunk, ignoring chunk extensions.
pub fn parse_chunk_size(line: &str) -> Result<usize, ParseError> {
    let size = line.split(';').next().unwrap_or("").trim();
    usize::from_str_radix(size, 16).map_err(|_| ParseError::InvalidChunkSize)
}
