//! HTTP request pipeline that reports failures as structured errors.
//!
//! Transports return every response they receive. Middleware decides what
//! counts as a failure and raises a [`HttpError`] whose [`HttpFailure`]
//! payload carries the status, headers, body and timing of the exchange.
//! Layers above either return that same error or wrap it with their own
//! payload, keeping the original reachable through the cause chain.

pub mod client;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod testing;
pub mod transport;
pub mod types;

pub use client::{Client, Handler, Middleware, default_client, set_default_client};
pub use config::{ClientConfig, ConfigError, RetryConfig};
pub use courier_error::{HasPayload, ResultExt, StructuredError};
pub use errors::{
    FailedResponse, HttpError, HttpFailure, HttpResult, TransportKind, status_of,
    transport_kind_of,
};
pub use middleware::{
    FnMiddleware, LoggingMiddleware, RetryMiddleware, RetryPolicy, StatusCheckMiddleware,
    StatusRetryPolicy,
};
pub use transport::{ReqwestTransport, Transport};
pub use types::{Headers, Request, Response};
