//! Core client and middleware system.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;

use crate::config::ClientConfig;
use crate::errors::{HttpResult, configuration_error};
use crate::middleware::{LoggingMiddleware, RetryMiddleware, StatusCheckMiddleware};
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{Request, Response};

pub type Handler = Arc<dyn Fn(Request) -> BoxFuture<'static, HttpResult<Response>> + Send + Sync>;

/// A layer around request execution.
///
/// A layer that catches an error must either return that same error or raise
/// a new one carrying it as the cause.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: Request, next: Handler) -> HttpResult<Response>;
}

#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    middleware: Vec<Arc<dyn Middleware>>,
    config: Option<ClientConfig>,
}

impl Client {
    /// Client over `transport` with exactly the given middleware.
    pub fn new(transport: Arc<dyn Transport>, middleware: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            transport,
            middleware,
            config: None,
        }
    }

    /// Client over `transport` with the middleware stack `config` asks for.
    pub fn with_transport(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        let middleware = standard_middleware(&config);
        Self {
            transport,
            middleware,
            config: Some(config),
        }
    }

    pub fn from_config(config: ClientConfig) -> HttpResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Ok(Self::with_transport(transport, config))
    }

    pub fn from_env() -> HttpResult<Self> {
        Self::from_config(ClientConfig::from_env()?)
    }

    /// Appends an inner layer; the first layer added runs outermost.
    pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.middleware.push(middleware);
    }

    /// The config the middleware stack was built from. `None` for clients
    /// assembled with [`Client::new`].
    pub fn config(&self) -> Option<&ClientConfig> {
        self.config.as_ref()
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    pub async fn execute(&self, request: Request) -> HttpResult<Response> {
        let transport = self.transport.clone();
        let base: Handler = Arc::new(move |req| {
            let transport = transport.clone();
            Box::pin(async move { transport.send(req).await })
        });

        let handler = self
            .middleware
            .iter()
            .rev()
            .fold(base, |next, middleware| {
                let middleware = middleware.clone();
                Arc::new(move |req| {
                    let middleware = middleware.clone();
                    let next = next.clone();
                    Box::pin(async move { middleware.handle(req, next).await })
                })
            });

        handler(request).await
    }

    pub async fn get(&self, url: impl Into<String>) -> HttpResult<Response> {
        self.execute(Request::get(url)).await
    }

    pub async fn post(&self, url: impl Into<String>, body: impl Into<Bytes>) -> HttpResult<Response> {
        self.execute(Request::post(url).body(body)).await
    }
}

fn standard_middleware(config: &ClientConfig) -> Vec<Arc<dyn Middleware>> {
    let mut middleware: Vec<Arc<dyn Middleware>> = vec![Arc::new(LoggingMiddleware)];
    if config.retry.max_retries > 0 {
        middleware.push(Arc::new(RetryMiddleware::new(config.retry.clone())));
    }
    if config.throw_exceptions {
        middleware.push(Arc::new(StatusCheckMiddleware::from_config(config)));
    }
    middleware
}

static DEFAULT_CLIENT: OnceLock<Client> = OnceLock::new();

/// Get the module-level default client, initializing from environment variables.
pub fn default_client() -> HttpResult<&'static Client> {
    if let Some(client) = DEFAULT_CLIENT.get() {
        return Ok(client);
    }

    // A concurrent initialiser may have won; return whichever client was stored.
    let _ = DEFAULT_CLIENT.set(Client::from_env()?);
    DEFAULT_CLIENT
        .get()
        .ok_or_else(|| configuration_error("default_client", "default client unavailable"))
}

/// Install the module-level default client. Fails once a default exists,
/// whether it was set here or built lazily by [`default_client`].
pub fn set_default_client(client: Client) -> HttpResult<()> {
    DEFAULT_CLIENT
        .set(client)
        .map_err(|_| configuration_error("default_client", "default client already set"))
}
