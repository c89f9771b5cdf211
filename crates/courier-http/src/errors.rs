//! Failure payloads raised by the HTTP pipeline.
//!
//! Every failure surfaces as [`HttpError`], a [`StructuredError`] whose
//! payload is an [`HttpFailure`]. Callers branch on the payload; the message
//! is for people.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use courier_error::StructuredError;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::types::{Headers, Response, first_value};

pub type HttpError = StructuredError<HttpFailure>;

pub type HttpResult<T> = Result<T, HttpError>;

/// The response that made a request fail, as the transport received it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedResponse {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
    pub elapsed: Duration,
}

impl FailedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        first_value(&self.headers, name)
    }

    /// Lossy UTF-8 view of the body.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Connect,
    Timeout,
    /// The request could not be built or sent.
    Request,
    /// The response body could not be read.
    Body,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TransportKind::Connect => "connection failed",
            TransportKind::Timeout => "timed out",
            TransportKind::Request => "request error",
            TransportKind::Body => "body read failed",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HttpFailure {
    Status(FailedResponse),
    Transport {
        method: String,
        url: String,
        transport: TransportKind,
        elapsed: Duration,
    },
    RetriesExhausted {
        method: String,
        url: String,
        attempts: u32,
    },
    Configuration {
        key: String,
        reason: String,
    },
}

impl HttpFailure {
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpFailure::Status(response) => Some(response.status),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&Bytes> {
        match self {
            HttpFailure::Status(response) => Some(&response.body),
            _ => None,
        }
    }

    pub fn body_text(&self) -> Option<String> {
        match self {
            HttpFailure::Status(response) => Some(response.body_text()),
            _ => None,
        }
    }

    pub fn headers(&self) -> Option<&Headers> {
        match self {
            HttpFailure::Status(response) => Some(&response.headers),
            _ => None,
        }
    }

    pub fn transport_kind(&self) -> Option<TransportKind> {
        match self {
            HttpFailure::Transport { transport, .. } => Some(*transport),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.transport_kind() == Some(TransportKind::Timeout)
    }

    pub fn is_connect(&self) -> bool {
        self.transport_kind() == Some(TransportKind::Connect)
    }
}

/// Raise the error for a response whose status the caller treats as a failure.
///
/// With `entire_message` the response body is appended to the message.
pub fn status_error(method: &Method, response: Response, entire_message: bool) -> HttpError {
    let message = if entire_message {
        format!("courier: status {} {}", response.status, response.body_text())
    } else {
        format!("courier: status {}", response.status)
    };
    StructuredError::new(
        message,
        HttpFailure::Status(FailedResponse {
            method: method.to_string(),
            url: response.url,
            status: response.status,
            headers: response.headers,
            body: response.body,
            elapsed: response.elapsed,
        }),
    )
}

pub fn configuration_error(key: impl Into<String>, reason: impl Into<String>) -> HttpError {
    let key = key.into();
    let reason = reason.into();
    StructuredError::new(
        format!("courier: invalid configuration for {key}: {reason}"),
        HttpFailure::Configuration { key, reason },
    )
}

/// Status of the nearest failed response in the cause chain.
///
/// Wrapping layers don't hide the status from retry decisions.
pub fn status_of(error: &HttpError) -> Option<u16> {
    error
        .chain()
        .filter_map(|err| err.downcast_ref::<HttpError>())
        .find_map(|err| err.payload().status())
}

/// Transport classification of the nearest transport failure in the cause
/// chain.
pub fn transport_kind_of(error: &HttpError) -> Option<TransportKind> {
    error
        .chain()
        .filter_map(|err| err.downcast_ref::<HttpError>())
        .find_map(|err| err.payload().transport_kind())
}
