use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::call::Call;
use crate::config::ClientConfig;
use crate::dispatcher::Dispatcher;
use crate::http::request::Request;
use crate::interceptor::Interceptor;
use crate::pool::ConnectionPool;

struct ClientInner {
    config: ClientConfig,
    dispatcher: Arc<Dispatcher>,
    pool: ConnectionPool,
    interceptors: Vec<Arc<dyn Interceptor>>,
    network_interceptors: Vec<Arc<dyn Interceptor>>,
}

/// Factory for calls, sharing one dispatcher and one connection pool.
///
/// Cloning is cheap; clones share everything.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        ClientBuilder::new().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Prepares `request` for execution.
    pub fn new_call(&self, request: Request) -> Call {
        Call::new(self.clone(), request)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    pub fn connection_pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.inner.interceptors
    }

    pub fn network_interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.inner.network_interceptors
    }

    /// A builder seeded with this client's settings, dispatcher and pool.
    pub fn new_builder(&self) -> ClientBuilder {
        ClientBuilder {
            config: self.inner.config.clone(),
            dispatcher: Some(Arc::clone(&self.inner.dispatcher)),
            pool: Some(self.inner.pool.clone()),
            interceptors: self.inner.interceptors.clone(),
            network_interceptors: self.inner.network_interceptors.clone(),
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .field("dispatcher", &self.inner.dispatcher)
            .field("pool", &self.inner.pool)
            .field("interceptors", &self.inner.interceptors.len())
            .field("network_interceptors", &self.inner.network_interceptors.len())
            .finish()
    }
}

pub struct ClientBuilder {
    config: ClientConfig,
    dispatcher: Option<Arc<Dispatcher>>,
    pool: Option<ConnectionPool>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    network_interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::from_config(&ClientConfig::default())
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            config: config.clone(),
            dispatcher: None,
            pool: None,
            interceptors: Vec::new(),
            network_interceptors: Vec::new(),
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    pub fn retry_on_connection_failure(mut self, retry: bool) -> Self {
        self.config.retry_on_connection_failure = retry;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Runs before retries and redirects, once per call.
    pub fn add_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Runs on the bound connection, once per network attempt.
    pub fn add_network_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.network_interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn connection_pool(mut self, pool: ConnectionPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn build(self) -> Client {
        let config = self.config;
        let dispatcher = self.dispatcher.unwrap_or_else(|| {
            Arc::new(Dispatcher::with_limits(
                config.max_requests,
                config.max_requests_per_host,
            ))
        });
        let pool = self
            .pool
            .unwrap_or_else(|| ConnectionPool::new(config.max_idle_connections, config.keep_alive()));

        Client {
            inner: Arc::new(ClientInner {
                config,
                dispatcher,
                pool,
                interceptors: self.interceptors,
                network_interceptors: self.network_interceptors,
            }),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
