//! Standard middleware: status checking, retry and failure logging.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_error::StructuredError;
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::client::{Handler, Middleware};
use crate::config::{ClientConfig, RetryConfig, default_unexceptional_statuses};
use crate::errors::{
    HttpError, HttpFailure, HttpResult, TransportKind, status_error, status_of, transport_kind_of,
};
use crate::types::{Request, Response};

/// Raises [`HttpFailure::Status`] for responses outside the unexceptional set.
#[derive(Clone, Debug)]
pub struct StatusCheckMiddleware {
    unexceptional: BTreeSet<u16>,
    entire_message: bool,
}

impl StatusCheckMiddleware {
    pub fn new(unexceptional: BTreeSet<u16>, entire_message: bool) -> Self {
        Self {
            unexceptional,
            entire_message,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.unexceptional_statuses.clone(),
            config.throw_entire_message,
        )
    }

    pub fn is_unexceptional(&self, status: u16) -> bool {
        self.unexceptional.contains(&status)
    }
}

impl Default for StatusCheckMiddleware {
    fn default() -> Self {
        Self::new(default_unexceptional_statuses(), false)
    }
}

#[async_trait]
impl Middleware for StatusCheckMiddleware {
    async fn handle(&self, request: Request, next: Handler) -> HttpResult<Response> {
        let method = request.method.clone();
        let response = next(request).await?;
        if self.is_unexceptional(response.status) {
            return Ok(response);
        }
        Err(status_error(&method, response, self.entire_message))
    }
}

/// Decides whether a failed attempt is worth repeating.
pub trait RetryPolicy: Send + Sync {
    /// `attempt` is zero for the first failure.
    fn should_retry(&self, error: &HttpError, attempt: u32) -> bool;
}

impl<F> RetryPolicy for F
where
    F: Fn(&HttpError, u32) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &HttpError, attempt: u32) -> bool {
        self(error, attempt)
    }
}

/// Retries listed statuses plus connect and timeout failures, wherever they
/// sit in the cause chain.
#[derive(Clone, Debug)]
pub struct StatusRetryPolicy {
    retry_statuses: BTreeSet<u16>,
}

impl StatusRetryPolicy {
    pub fn new(retry_statuses: BTreeSet<u16>) -> Self {
        Self { retry_statuses }
    }
}

impl RetryPolicy for StatusRetryPolicy {
    fn should_retry(&self, error: &HttpError, _attempt: u32) -> bool {
        if let Some(status) = status_of(error) {
            return self.retry_statuses.contains(&status);
        }
        matches!(
            transport_kind_of(error),
            Some(TransportKind::Connect | TransportKind::Timeout)
        )
    }
}

pub struct RetryMiddleware {
    config: RetryConfig,
    policy: Arc<dyn RetryPolicy>,
}

impl RetryMiddleware {
    pub fn new(config: RetryConfig) -> Self {
        let policy = Arc::new(StatusRetryPolicy::new(config.retry_statuses.clone()));
        Self { config, policy }
    }

    pub fn with_policy(config: RetryConfig, policy: Arc<dyn RetryPolicy>) -> Self {
        Self { config, policy }
    }

    /// Non-idempotent methods such as POST repeat only when the config allows it.
    pub fn may_repeat(&self, request: &Request) -> bool {
        self.config.retry_non_idempotent || request.method.is_idempotent()
    }

    /// Backoff before retry number `attempt + 1`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt);
        self.config
            .base_delay
            .saturating_mul(factor)
            .min(self.config.max_delay)
    }

    fn exhausted(&self, request: &Request, attempts: u32, last: HttpError) -> HttpError {
        if !self.config.wrap_exhausted {
            return last;
        }
        StructuredError::wrap(
            format!(
                "courier: {} {} failed after {attempts} attempts",
                request.method, request.url
            ),
            HttpFailure::RetriesExhausted {
                method: request.method.to_string(),
                url: request.url.clone(),
                attempts,
            },
            last,
        )
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    async fn handle(&self, request: Request, next: Handler) -> HttpResult<Response> {
        let mut attempt: u32 = 0;
        loop {
            let error = match next(request.clone()).await {
                Ok(response) => {
                    if attempt > 0 {
                        info!(
                            method = %request.method,
                            url = %request.url,
                            attempt,
                            "request succeeded after retry"
                        );
                    }
                    return Ok(response);
                }
                Err(error) => error,
            };

            if !self.may_repeat(&request) {
                debug!(
                    method = %request.method,
                    url = %request.url,
                    status = ?status_of(&error),
                    "not retrying non-idempotent request"
                );
                return Err(error);
            }
            if !self.policy.should_retry(&error, attempt) {
                return Err(error);
            }

            if attempt >= self.config.max_retries {
                warn!(
                    method = %request.method,
                    url = %request.url,
                    attempts = attempt + 1,
                    status = ?status_of(&error),
                    "retries exhausted"
                );
                return Err(self.exhausted(&request, attempt + 1, error));
            }

            let delay = self.delay_for(attempt);
            warn!(
                method = %request.method,
                url = %request.url,
                attempt,
                status = ?status_of(&error),
                delay_ms = delay.as_millis() as u64,
                err = %error,
                "retrying request"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Logs failures and returns them unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(&self, request: Request, next: Handler) -> HttpResult<Response> {
        let method = request.method.clone();
        let url = request.url.clone();
        match next(request).await {
            Ok(response) => {
                debug!(
                    %method,
                    %url,
                    status = response.status,
                    elapsed_ms = response.elapsed.as_millis() as u64,
                    "request completed"
                );
                Ok(response)
            }
            Err(error) => {
                let chain = format!("{error:#}");
                warn!(
                    %method,
                    %url,
                    status = ?status_of(&error),
                    payload = ?error.payload(),
                    err = %chain,
                    "request failed"
                );
                Err(error)
            }
        }
    }
}

/// Middleware from a closure.
pub struct FnMiddleware<F> {
    f: F,
}

impl<F> FnMiddleware<F>
where
    F: Fn(Request, Handler) -> BoxFuture<'static, HttpResult<Response>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(Request, Handler) -> BoxFuture<'static, HttpResult<Response>> + Send + Sync,
{
    async fn handle(&self, request: Request, next: Handler) -> HttpResult<Response> {
        (self.f)(request, next).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::testing::{ScriptedTransport, response};

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..RetryConfig::default()
        }
    }

    fn client(transport: Arc<ScriptedTransport>, retry: RetryMiddleware) -> Client {
        Client::new(
            transport,
            vec![Arc::new(retry), Arc::new(StatusCheckMiddleware::default())],
        )
    }

    #[tokio::test(flavor = "current_thread")]
    async fn status_check_passes_unexceptional_statuses() {
        for status in [200, 204, 304, 307] {
            let transport = Arc::new(ScriptedTransport::new(vec![Ok(response(status, ""))]));
            let client = Client::new(transport, vec![Arc::new(StatusCheckMiddleware::default())]);
            let response = client.get("http://example.test").await.unwrap();
            assert_eq!(response.status, status);
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn status_check_raises_with_response_payload() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(response(503, "retry later"))]));
        let client = Client::new(
            transport,
            vec![Arc::new(StatusCheckMiddleware::new(
                default_unexceptional_statuses(),
                true,
            ))],
        );

        let err = client.get("http://example.test/jobs").await.unwrap_err();
        assert_eq!(err.message(), "courier: status 503 retry later");
        let HttpFailure::Status(failed) = err.payload() else {
            panic!("expected status payload");
        };
        assert_eq!(failed.status, 503);
        assert_eq!(failed.method, "GET");
        assert_eq!(failed.url, "http://example.test/jobs");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn retry_recovers_after_unavailable() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(response(503, "retry later")),
            Ok(response(503, "retry later")),
            Ok(response(200, "done")),
        ]));
        let client = client(transport.clone(), RetryMiddleware::new(fast_retry(3)));

        let response = client.get("http://example.test").await.unwrap();
        assert_eq!(response.body_text(), "done");
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn non_retryable_status_is_returned_immediately() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(response(404, "missing")),
            Ok(response(200, "unused")),
        ]));
        let client = client(transport.clone(), RetryMiddleware::new(fast_retry(3)));

        let err = client.get("http://example.test").await.unwrap_err();
        assert_eq!(err.payload().status(), Some(404));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn exhausted_retries_return_last_error_unwrapped() {
        let last = StructuredError::new(
            "courier: GET http://example.test failed: timed out",
            HttpFailure::Transport {
                method: "GET".to_string(),
                url: "http://example.test".to_string(),
                transport: TransportKind::Timeout,
                elapsed: Duration::from_secs(1),
            },
        );
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(response(502, "bad gateway")),
            Err(last.clone()),
        ]));
        let client = client(transport.clone(), RetryMiddleware::new(fast_retry(1)));

        let err = client.get("http://example.test").await.unwrap_err();
        assert!(err.same_payload(&last));
        assert!(!err.has_cause());
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn exhausted_retries_wrap_last_error_as_cause() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(response(503, "first")),
            Ok(response(503, "second")),
        ]));
        let retry = RetryMiddleware::new(RetryConfig {
            wrap_exhausted: true,
            ..fast_retry(1)
        });
        let client = client(transport, retry);

        let err = client.get("http://example.test/jobs").await.unwrap_err();
        assert_eq!(
            err.payload(),
            &HttpFailure::RetriesExhausted {
                method: "GET".to_string(),
                url: "http://example.test/jobs".to_string(),
                attempts: 2,
            }
        );
        assert_eq!(
            err.message(),
            "courier: GET http://example.test/jobs failed after 2 attempts"
        );
        assert_eq!(status_of(&err), Some(503));

        let last = err
            .cause()
            .and_then(|cause| cause.downcast_ref::<HttpError>())
            .expect("last failure should be the cause");
        assert_eq!(last.payload().body_text().as_deref(), Some("second"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn custom_policy_sees_attempt_number() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(response(500, "a")),
            Ok(response(500, "b")),
            Ok(response(500, "c")),
        ]));
        let policy = |error: &HttpError, attempt: u32| error.payload().status() == Some(500) && attempt < 1;
        let retry = RetryMiddleware::with_policy(fast_retry(5), Arc::new(policy));
        let client = client(transport.clone(), retry);

        let err = client.get("http://example.test").await.unwrap_err();
        assert_eq!(err.payload().body_text().as_deref(), Some("b"));
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let retry = RetryMiddleware::new(RetryConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            ..RetryConfig::default()
        });
        assert_eq!(retry.delay_for(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for(2), Duration::from_millis(400));
        assert_eq!(retry.delay_for(3), Duration::from_millis(500));
        assert_eq!(retry.delay_for(40), Duration::from_millis(500));
    }

    #[test]
    fn status_policy_retries_connect_but_not_configuration() {
        let policy = StatusRetryPolicy::new(BTreeSet::from([503]));
        let connect = StructuredError::new(
            "connect failed",
            HttpFailure::Transport {
                method: "GET".to_string(),
                url: "http://example.test".to_string(),
                transport: TransportKind::Connect,
                elapsed: Duration::ZERO,
            },
        );
        let config = crate::errors::configuration_error("key", "bad");
        assert!(policy.should_retry(&connect, 0));
        assert!(!policy.should_retry(&config, 0));
    }

    #[test]
    fn status_policy_retries_wrapped_connect_failure() {
        let policy = StatusRetryPolicy::new(BTreeSet::from([503]));
        let connect = StructuredError::new(
            "courier: GET http://example.test failed: connection failed",
            HttpFailure::Transport {
                method: "GET".to_string(),
                url: "http://example.test".to_string(),
                transport: TransportKind::Connect,
                elapsed: Duration::ZERO,
            },
        );
        let wrapped: HttpError = StructuredError::wrap(
            "courier: GET http://example.test abandoned",
            HttpFailure::RetriesExhausted {
                method: "GET".to_string(),
                url: "http://example.test".to_string(),
                attempts: 1,
            },
            connect,
        );
        assert!(policy.should_retry(&wrapped, 0));

        let request_failure = StructuredError::new(
            "courier: GET http://example.test failed: request error",
            HttpFailure::Transport {
                method: "GET".to_string(),
                url: "http://example.test".to_string(),
                transport: TransportKind::Request,
                elapsed: Duration::ZERO,
            },
        );
        assert!(!policy.should_retry(&request_failure, 0));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn post_is_not_retried_by_default() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(response(503, "busy")),
            Ok(response(201, "created")),
        ]));
        let client = client(transport.clone(), RetryMiddleware::new(fast_retry(3)));

        let err = client
            .post("http://example.test/orders", "order")
            .await
            .unwrap_err();
        assert_eq!(err.payload().status(), Some(503));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn post_is_retried_when_allowed() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(response(503, "busy")),
            Ok(response(201, "created")),
        ]));
        let retry = RetryMiddleware::new(RetryConfig {
            retry_non_idempotent: true,
            ..fast_retry(3)
        });
        let client = client(transport.clone(), retry);

        let response = client
            .post("http://example.test/orders", "order")
            .await
            .unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn fn_middleware_rewrites_request() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(response(200, "ok"))]));
        let auth = FnMiddleware::new(
            |request: Request, next: Handler| -> BoxFuture<'static, HttpResult<Response>> {
                next(request.header("authorization", "Bearer token"))
            },
        );
        let client = Client::new(transport.clone(), vec![Arc::new(auth)]);

        client.get("http://example.test").await.unwrap();
        let requests = transport.requests();
        assert_eq!(
            requests[0].headers.get("authorization").map(String::as_str),
            Some("Bearer token")
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn fn_middleware_wrap_keeps_status_failure_in_chain() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(response(500, "boom"))]));
        let wrapper = FnMiddleware::new(
            |request: Request, next: Handler| -> BoxFuture<'static, HttpResult<Response>> {
                Box::pin(async move {
                    let method = request.method.to_string();
                    let url = request.url.clone();
                    next(request).await.map_err(|err| {
                        StructuredError::wrap(
                            format!("courier: {method} {url} abandoned"),
                            HttpFailure::RetriesExhausted {
                                method,
                                url,
                                attempts: 1,
                            },
                            err,
                        )
                    })
                })
            },
        );
        let client = Client::new(
            transport,
            vec![Arc::new(wrapper), Arc::new(StatusCheckMiddleware::default())],
        );

        let err = client.get("http://example.test").await.unwrap_err();
        assert_eq!(err.message(), "courier: GET http://example.test abandoned");
        assert_eq!(err.payload().status(), None);

        let inner = err
            .chain()
            .skip(1)
            .find_map(|cause| cause.downcast_ref::<HttpError>())
            .expect("status failure should follow the wrapper");
        assert_eq!(inner.message(), "courier: status 500");
        assert_eq!(inner.payload().body_text().as_deref(), Some("boom"));
        assert_eq!(format!("{err:#}"), "courier: GET http://example.test abandoned: courier: status 500");
    }
}
