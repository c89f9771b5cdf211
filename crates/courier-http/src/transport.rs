//! Transport contract and the reqwest-backed implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use courier_error::StructuredError;

use crate::config::ClientConfig;
use crate::errors::{HttpError, HttpFailure, HttpResult, TransportKind};
use crate::types::{Headers, Request, Response};

/// Sends a request and returns the response, whatever its status.
///
/// Only failures to complete the exchange are errors here; interpreting the
/// status belongs to middleware.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, request: Request) -> HttpResult<Response>;
}

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> HttpResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|err| {
            StructuredError::wrap(
                "courier: failed to build http client",
                HttpFailure::Configuration {
                    key: "transport".to_string(),
                    reason: err.to_string(),
                },
                err,
            )
        })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    fn name(&self) -> &str {
        "reqwest"
    }

    async fn send(&self, request: Request) -> HttpResult<Response> {
        let started = Instant::now();

        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body.clone() {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| transport_error(&request, started.elapsed(), err))?;

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| transport_error(&request, started.elapsed(), err))?;

        Ok(Response {
            status,
            headers,
            body,
            elapsed: started.elapsed(),
            url,
        })
    }
}

fn transport_kind(err: &reqwest::Error) -> TransportKind {
    if err.is_timeout() {
        TransportKind::Timeout
    } else if err.is_connect() {
        TransportKind::Connect
    } else if err.is_body() || err.is_decode() {
        TransportKind::Body
    } else {
        TransportKind::Request
    }
}

fn transport_error(request: &Request, elapsed: Duration, err: reqwest::Error) -> HttpError {
    let transport = transport_kind(&err);
    StructuredError::wrap(
        format!(
            "courier: {} {} failed: {transport}",
            request.method, request.url
        ),
        HttpFailure::Transport {
            method: request.method.to_string(),
            url: request.url.clone(),
            transport,
            elapsed,
        },
        err,
    )
}
