//! In-memory transport for exercising middleware without a network.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::{HttpResult, configuration_error};
use crate::transport::Transport;
use crate::types::{Headers, Request, Response};

/// Replays queued outcomes in order and records every request it sees.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    outcomes: Mutex<VecDeque<HttpResult<Response>>>,
    requests: Mutex<Vec<Request>>,
}

impl ScriptedTransport {
    pub fn new(outcomes: Vec<HttpResult<Response>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, outcome: HttpResult<Response>) {
        self.outcomes
            .lock()
            .expect("scripted outcomes mutex")
            .push_back(outcome);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .expect("scripted requests mutex")
            .clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, request: Request) -> HttpResult<Response> {
        let url = request.url.clone();
        self.requests
            .lock()
            .expect("scripted requests mutex")
            .push(request);
        let outcome = self
            .outcomes
            .lock()
            .expect("scripted outcomes mutex")
            .pop_front();
        match outcome {
            Some(Ok(mut response)) => {
                if response.url.is_empty() {
                    response.url = url;
                }
                Ok(response)
            }
            Some(Err(err)) => Err(err),
            None => Err(configuration_error("scripted", "no outcome queued")),
        }
    }
}

/// Response with the given status and body; the transport fills in the URL.
pub fn response(status: u16, body: &str) -> Response {
    Response {
        status,
        headers: Headers::new(),
        body: Bytes::copy_from_slice(body.as_bytes()),
        elapsed: Duration::from_millis(1),
        url: String::new(),
    }
}
