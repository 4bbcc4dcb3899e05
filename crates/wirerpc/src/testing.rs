//! Scripted transports for tests.
//!
//! [`StubTransport`] answers from a queue of canned outcomes and records every
//! request it was handed. Once the queue runs dry it stalls until the call is
//! canceled, which is how tests exercise timeouts and cancellation.

use std::collections::VecDeque;

use http::StatusCode;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::message::HttpRequest;
use crate::message::HttpResponse;
use crate::transport;
use crate::transport::Transport;

#[derive(Debug, Default)]
pub struct StubTransport {
    outcomes: Mutex<VecDeque<transport::Result<HttpResponse>>>,
    sent: Mutex<Vec<HttpRequest>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub async fn respond(&self, response: HttpResponse) {
        self.outcomes.lock().await.push_back(Ok(response));
    }

    /// Queues a JSON response with the given status.
    pub async fn respond_json(&self, status: u16, body: &str) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.respond(HttpResponse::new(status).with_body("application/json", body.to_string())).await;
    }

    /// Queues a transport failure.
    pub async fn fail(&self, error: transport::Error) {
        self.outcomes.lock().await.push_back(Err(error));
    }

    /// Every request sent so far, oldest first.
    pub async fn requests(&self) -> Vec<HttpRequest> {
        self.sent.lock().await.clone()
    }

    pub async fn last_request(&self) -> Option<HttpRequest> {
        self.sent.lock().await.last().cloned()
    }
}

#[async_trait::async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: HttpRequest, cancel: &CancellationToken) -> transport::Result<HttpResponse> {
        self.sent.lock().await.push(request);
        let next = self.outcomes.lock().await.pop_front();
        match next {
            Some(outcome) => outcome,
            None => {
                cancel.cancelled().await;
                Err(transport::Error::Canceled)
            }
        }
    }
}
