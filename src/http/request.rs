use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::http::body::RequestBody;
use crate::http::headers::Headers;
use crate::http::url::parse as parse_url;

/// HTTP request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Example
    ///
    /// ```
    /// # use courier::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable HTTP request.
///
/// Requests are cheap to clone: the body is shared behind an [`Arc`], so the same
/// request can be handed to retries and other tasks. Use [`Request::new_builder`] to
/// derive a modified copy.
#[derive(Debug, Clone)]
pub struct Request {
    url: String,
    method: Method,
    headers: Headers,
    body: Option<Arc<RequestBody>>,
}

impl Request {
    pub fn builder() -> RequestBuilder {
        RequestBuilder::new()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Returns a copy of the header map.
    pub fn headers(&self) -> Headers {
        self.headers.clone()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> Option<&Arc<RequestBody>> {
        self.body.as_ref()
    }

    pub fn new_builder(&self) -> RequestBuilder {
        RequestBuilder {
            url: Some(self.url.clone()),
            method: self.method,
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }

    pub(crate) fn header_map(&self) -> &Headers {
        &self.headers
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Builder for constructing Request objects.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    url: Option<String>,
    method: Method,
    headers: Headers,
    body: Option<Arc<RequestBody>>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            url: None,
            method: Method::GET,
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn method(mut self, method: Method, body: Option<RequestBody>) -> Self {
        self.method = method;
        self.body = body.map(Arc::new);
        self
    }

    pub fn get(self) -> Self {
        self.method(Method::GET, None)
    }

    pub fn head(self) -> Self {
        self.method(Method::HEAD, None)
    }

    pub fn post(self, body: RequestBody) -> Self {
        self.method(Method::POST, Some(body))
    }

    pub fn put(self, body: RequestBody) -> Self {
        self.method(Method::PUT, Some(body))
    }

    pub fn patch(self, body: RequestBody) -> Self {
        self.method(Method::PATCH, Some(body))
    }

    pub fn delete(self) -> Self {
        self.method(Method::DELETE, None)
    }

    /// Adds or replaces a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Alias of [`RequestBuilder::header`]; names are unique.
    pub fn add_header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.header(name, value)
    }

    pub fn remove_header(mut self, name: &str) -> Self {
        self.headers.remove(name);
        self
    }

    pub fn build(self) -> Result<Request> {
        let url = self.url.ok_or(Error::InvalidRequest("url missing"))?;
        parse_url(&url)?;

        Ok(Request {
            url,
            method: self.method,
            headers: self.headers,
            body: self.body,
        })
    }
}
