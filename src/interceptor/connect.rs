use futures_util::future::BoxFuture;

use crate::error::{Error, Result};
use crate::http::connection::RealConnection;
use crate::http::response::Response;
use crate::http::url::Address;
use crate::interceptor::{Chain, Interceptor};

/// Binds a connection to the call.
///
/// Reuses an idle pooled connection to the request's `(host, port)` or opens a new one,
/// then hands it to the remaining stages through [`Chain::connection`]. After a
/// successful exchange the connection goes back to the pool; after any failure it is
/// discarded, since a half-written or half-read socket cannot be reused.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConnectInterceptor;

impl ConnectInterceptor {
    pub fn new() -> Self {
        Self
    }

    async fn run(chain: Chain) -> Result<Response> {
        let request = chain.request().clone();
        let address = Address::from_url(request.url())?;
        if address.secure {
            return Err(Error::UnsupportedScheme("https".to_string()));
        }

        let pool = chain.client().connection_pool().clone();
        let connection = match pool.get(&address.host, address.port) {
            Some(connection) => connection,
            None => {
                RealConnection::connect(&address.host, address.port, chain.connect_timeout())
                    .await?
            }
        };

        let connected = chain.with_connection(connection.clone());
        match connected.proceed(request).await {
            Ok(response) => {
                pool.put(connection);
                Ok(response)
            }
            Err(e) => {
                tracing::debug!(
                    id = connection.id(),
                    error = %e,
                    "Discarding connection after failed exchange"
                );
                pool.discard(&connection);
                Err(e)
            }
        }
    }
}

impl Interceptor for ConnectInterceptor {
    fn intercept<'a>(&'a self, chain: Chain) -> BoxFuture<'a, Result<Response>> {
        Box::pin(Self::run(chain))
    }
}
