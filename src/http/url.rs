//! URL helpers: address extraction, request targets, `Host` values and redirect
//! resolution.

use url::{Position, Url};

use crate::error::{Error, Result};

/// Where a request's connection goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl Address {
    /// Extracts `(host, port)`; the port defaults to 80, or 443 for `https`.
    pub fn from_url(raw: &str) -> Result<Self> {
        let url = parse(raw)?;
        let host = url
            .host_str()
            .ok_or(Error::InvalidRequest("url has no host"))?
            .to_string();
        let secure = url.scheme() == "https";
        let port = url.port().unwrap_or(if secure { 443 } else { 80 });

        Ok(Self { host, port, secure })
    }
}

pub fn parse(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|source| Error::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}

/// The origin-form target written on the request line: path plus query.
pub fn request_target(raw: &str) -> Result<String> {
    let url = parse(raw)?;
    let target = &url[Position::BeforePath..Position::AfterQuery];
    if target.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(target.to_string())
    }
}

/// `Host` header value: the URL without its scheme and without anything from the
/// first `/` onward. An explicit port is kept.
pub fn host_header(raw: &str) -> String {
    let rest = raw
        .strip_prefix("http://")
        .or_else(|| raw.strip_prefix("https://"))
        .unwrap_or(raw);
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    rest[..end].to_string()
}

/// Resolves a `Location` header against the URL that produced it.
///
/// Handles absolute URLs, absolute paths (`/next`) and relative paths (`next`).
pub fn resolve(base: &str, location: &str) -> Result<String> {
    let base = parse(base)?;
    base.join(location)
        .map(String::from)
        .map_err(|source| Error::InvalidUrl {
            url: location.to_string(),
            source,
        })
}
