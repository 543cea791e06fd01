use std::io::Read;

use flate2::read::GzDecoder;
use futures_util::future::BoxFuture;

use crate::error::{Error, Result};
use crate::http::body::ResponseBody;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::url;
use crate::interceptor::{Chain, Interceptor};

/// Turns the caller's request into a network request and back.
///
/// Fills in `Content-Type`, `Content-Length` / `Transfer-Encoding`, `Host`,
/// `Connection`, `Accept-Encoding` and `User-Agent` when the caller left them out. When
/// it asked for gzip itself and the server used it, the body is decompressed before the
/// response goes further up.
#[derive(Debug, Default, Clone, Copy)]
pub struct BridgeInterceptor;

impl BridgeInterceptor {
    pub fn new() -> Self {
        Self
    }

    async fn run(chain: Chain) -> Result<Response> {
        let user_request = chain.request().clone();
        let mut builder = user_request.new_builder();

        if let Some(body) = user_request.body() {
            if let Some(content_type) = body.content_type() {
                if user_request.header("Content-Type").is_none() {
                    builder = builder.header("Content-Type", content_type);
                }
            }

            builder = match body.content_length() {
                Some(length) => builder
                    .header("Content-Length", length.to_string())
                    .remove_header("Transfer-Encoding"),
                None => builder
                    .header("Transfer-Encoding", "chunked")
                    .remove_header("Content-Length"),
            };
        }

        if user_request.header("Host").is_none() {
            builder = builder.header("Host", url::host_header(user_request.url()));
        }

        if user_request.header("Connection").is_none() {
            builder = builder.header("Connection", "Keep-Alive");
        }

        // Only decompress what we asked for ourselves.
        let transparent_gzip = user_request.header("Accept-Encoding").is_none();
        if transparent_gzip {
            builder = builder.header("Accept-Encoding", "gzip");
        }

        if user_request.header("User-Agent").is_none() {
            builder = builder.header("User-Agent", chain.client().config().user_agent.as_str());
        }

        let network_response = chain.proceed(builder.build()?).await?;

        let gzipped = network_response
            .header("Content-Encoding")
            .is_some_and(|encoding| encoding.eq_ignore_ascii_case("gzip"));

        if transparent_gzip && gzipped {
            return gunzip(network_response, user_request).await;
        }

        network_response.new_builder().request(user_request).build()
    }
}

impl Interceptor for BridgeInterceptor {
    fn intercept<'a>(&'a self, chain: Chain) -> BoxFuture<'a, Result<Response>> {
        Box::pin(Self::run(chain))
    }
}

async fn gunzip(mut response: Response, user_request: Request) -> Result<Response> {
    let body = response.take_body();
    let builder = response
        .new_builder()
        .request(user_request)
        .remove_header("Content-Encoding")
        .remove_header("Content-Length");

    // HEAD, 1xx, 204 and 304 carry the header but no bytes to inflate.
    let body = match body {
        Some(body) if body.content_length() != Some(0) => body,
        Some(empty) => return builder.body(empty).build(),
        None => return builder.build(),
    };
    let content_type = body.content_type().map(str::to_string);
    let compressed = body.bytes().await?;

    let mut decoded = Vec::with_capacity(compressed.len() * 2);
    GzDecoder::new(&compressed[..])
        .read_to_end(&mut decoded)
        .map_err(|e| Error::Protocol(format!("invalid gzip body: {e}")))?;

    tracing::trace!(
        compressed = compressed.len(),
        decompressed = decoded.len(),
        "Decompressed gzip response"
    );

    builder
        .body(ResponseBody::from_bytes(content_type, decoded))
        .build()
}
