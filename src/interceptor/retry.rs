//! Retries and follow-ups.
//!
//! # Responsibilities
//! - Re-attempt a request after a recoverable connection failure
//! - Follow 3xx redirects, rewriting method and body where HTTP requires it
//! - Resubmit on 408 and 503
//! - Bound the number of follow-ups so misconfigured servers cannot loop forever
//!
//! Each attempt re-runs every stage below this one, so headers are bridged again and a
//! connection is acquired again.

use futures_util::future::BoxFuture;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::http::url::{self, Address};
use crate::interceptor::{Chain, Interceptor};

/// Follow-ups allowed per call before failing with [`Error::TooManyFollowUps`].
pub const MAX_FOLLOW_UPS: u32 = 20;

#[derive(Debug, Default, Clone, Copy)]
pub struct RetryAndFollowUpInterceptor;

impl RetryAndFollowUpInterceptor {
    pub fn new() -> Self {
        Self
    }

    async fn run(chain: Chain) -> Result<Response> {
        let client = chain.client().clone();
        let mut request = chain.request().clone();
        let mut follow_ups = 0u32;
        let mut retries = 0u32;
        let mut prior: Option<Response> = None;

        loop {
            if chain.is_canceled() {
                return Err(Error::Canceled);
            }

            let attempt = chain.next_attempt();
            let response = match attempt.proceed(request.clone()).await {
                Ok(response) => response,
                Err(e) => {
                    if !can_retry(&client, &request, &e, retries) {
                        return Err(e);
                    }
                    retries += 1;
                    tracing::warn!(
                        method = %request.method(),
                        url = request.url(),
                        error = %e,
                        attempt = retries,
                        "Request failed, retrying"
                    );
                    continue;
                }
            };

            let response = match prior.take() {
                Some(prior) => response.new_builder().prior_response(prior).build()?,
                None => response,
            };

            let Some(follow_up) = follow_up_request(&client, &response)? else {
                return Ok(response);
            };

            follow_ups += 1;
            if follow_ups > MAX_FOLLOW_UPS {
                return Err(Error::TooManyFollowUps(follow_ups));
            }

            tracing::info!(
                code = response.code(),
                from = response.request().url(),
                to = follow_up.url(),
                follow_ups,
                "Following up"
            );
            request = follow_up;
            prior = Some(response);
        }
    }
}

impl Interceptor for RetryAndFollowUpInterceptor {
    fn intercept<'a>(&'a self, chain: Chain) -> BoxFuture<'a, Result<Response>> {
        Box::pin(Self::run(chain))
    }
}

fn can_retry(client: &Client, request: &Request, error: &Error, retries: u32) -> bool {
    if !client.config().retry_on_connection_failure || !error.is_recoverable() {
        return false;
    }
    if retries >= client.config().max_retries {
        return false;
    }
    // A one-shot body was already drained by the failed attempt.
    !request.body().is_some_and(|body| body.is_one_shot())
}

/// Builds the request that answers `response`, or `None` when the call is done.
pub fn follow_up_request(client: &Client, response: &Response) -> Result<Option<Request>> {
    let request = response.request();

    match response.code() {
        300..=303 | 307 | 308 => {
            if !client.config().follow_redirects {
                return Ok(None);
            }
            redirect_request(response)
        }
        // Authentication challenges are left to the caller.
        401 | 407 => Ok(None),
        408 | 503 => {
            if request.body().is_some_and(|body| body.is_one_shot()) {
                return Ok(None);
            }
            Ok(Some(request.clone()))
        }
        _ => Ok(None),
    }
}

fn redirect_request(response: &Response) -> Result<Option<Request>> {
    let request = response.request();
    let Some(location) = response.header("Location") else {
        return Ok(None);
    };
    let target = url::resolve(request.url(), location)?;

    let code = response.code();
    let method = request.method();
    let mut builder = request.new_builder().url(target.as_str());

    let downgrade = match code {
        303 => method != Method::HEAD,
        301 | 302 => method == Method::POST,
        _ => false,
    };
    if downgrade {
        builder = builder
            .method(Method::GET, None)
            .remove_header("Content-Type")
            .remove_header("Content-Length")
            .remove_header("Transfer-Encoding");
    } else if request.body().is_some_and(|body| body.is_one_shot()) {
        // 307/308 must resend the body, which a stream can't do twice.
        return Ok(None);
    }

    // Credentials stay with the origin that asked for them.
    if Address::from_url(request.url())? != Address::from_url(&target)? {
        builder = builder.remove_header("Authorization");
    }

    builder.build().map(Some)
}
