use std::fmt;

use crate::error::{Error, Result};
use crate::http::body::ResponseBody;
use crate::http::headers::Headers;
use crate::http::request::Request;

/// An immutable HTTP response.
///
/// Holds the request that produced it and, when the call went through redirects or
/// retries, the previous response in `prior_response`. Prior responses never carry a
/// body.
#[derive(Debug)]
pub struct Response {
    request: Request,
    code: u16,
    message: String,
    headers: Headers,
    body: Option<ResponseBody>,
    prior_response: Option<Box<Response>>,
}

impl Response {
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder::new()
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// `true` when the status code is in `[200, 300)`.
    pub fn is_successful(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.code, 300..=303 | 307 | 308)
    }

    /// Returns a copy of the header map.
    pub fn headers(&self) -> Headers {
        self.headers.clone()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> Option<&ResponseBody> {
        self.body.as_ref()
    }

    /// Detaches the body, leaving the response without one.
    pub fn take_body(&mut self) -> Option<ResponseBody> {
        self.body.take()
    }

    pub fn prior_response(&self) -> Option<&Response> {
        self.prior_response.as_deref()
    }

    /// Number of responses that preceded this one within the same call.
    pub fn prior_count(&self) -> usize {
        let mut count = 0;
        let mut current = self.prior_response();
        while let Some(prior) = current {
            count += 1;
            current = prior.prior_response();
        }
        count
    }

    pub fn new_builder(self) -> ResponseBuilder {
        ResponseBuilder {
            request: Some(self.request),
            code: Some(self.code),
            message: self.message,
            headers: self.headers,
            body: self.body,
            prior_response: self.prior_response,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.code, self.message, self.request.url())
    }
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```ignore
/// let response = ResponseBuilder::new()
///     .request(request)
///     .code(200)
///     .message("OK")
///     .header("Content-Type", "application/json")
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct ResponseBuilder {
    request: Option<Request>,
    code: Option<u16>,
    message: String,
    headers: Headers,
    body: Option<ResponseBody>,
    prior_response: Option<Box<Response>>,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(mut self, request: Request) -> Self {
        self.request = Some(request);
        self
    }

    pub fn code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Adds or replaces a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn remove_header(mut self, name: &str) -> Self {
        self.headers.remove(name);
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn body(mut self, body: ResponseBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Links the previous response of this call. Its body is closed and dropped.
    pub fn prior_response(mut self, mut prior: Response) -> Self {
        if let Some(body) = prior.take_body() {
            body.close();
        }
        self.prior_response = Some(Box::new(prior));
        self
    }

    pub fn build(self) -> Result<Response> {
        let request = self.request.ok_or(Error::InvalidRequest("response request missing"))?;
        let code = self.code.ok_or(Error::InvalidRequest("response code missing"))?;

        Ok(Response {
            request,
            code,
            message: self.message,
            headers: self.headers,
            body: self.body,
            prior_response: self.prior_response,
        })
    }
}
