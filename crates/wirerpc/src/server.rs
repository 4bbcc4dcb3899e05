//! # In-Process Server
//!
//! [`HttpHandler`] routes HTTP requests to a [`Service`] through the same
//! bindings a client uses, so a contract can be served and tested without a
//! network. It also implements [`Transport`], which makes client/server
//! loopback a one-liner.
//!
//! ## Invariants
//! - **Total**: `handle` always produces a response. Routing, parsing and
//!   service failures are rendered with [`render_error`].
//! - **Negotiated**: Response and error bodies use the codec the request's
//!   `Accept` asks for, falling back to the primary codec.

use std::sync::Arc;

use http::header::ACCEPT;
use tokio_util::sync::CancellationToken;

use crate::binding;
use crate::binding::BindingTable;
use crate::binding::render_error;
use crate::codec::CodecSet;
use crate::fault::ServiceError;
use crate::message::HttpRequest;
use crate::message::HttpResponse;
use crate::service::CallContext;
use crate::service::Service;
use crate::transport;
use crate::transport::Transport;

/// Serves a [`Service`] over HTTP messages.
#[derive(Clone)]
pub struct HttpHandler {
    service: Arc<dyn Service>,
    bindings: Arc<BindingTable>,
    codecs: CodecSet,
}

impl HttpHandler {
    /// Compiles the bindings of the service's contract.
    pub fn new(service: Arc<dyn Service>) -> binding::Result<Self> {
        let bindings = BindingTable::compile(service.contract())?;
        Ok(Self { service, bindings: Arc::new(bindings), codecs: CodecSet::default() })
    }

    pub fn with_codecs(mut self, codecs: CodecSet) -> Self {
        self.codecs = codecs;
        self
    }

    pub async fn handle(&self, request: HttpRequest, cancel: &CancellationToken) -> HttpResponse {
        let accept = request.headers.get(ACCEPT).and_then(|v| v.to_str().ok());
        let codec = Arc::clone(self.codecs.negotiate(accept));

        let Some((binding, captures)) = self.bindings.route(&request) else {
            tracing::debug!(method = %request.method, path = %request.path, "no route");
            let error = ServiceError::not_found(format!("no operation for {} {}", request.method, request.path));
            return render_error(&error, codec.as_ref());
        };
        let operation = binding.operation();
        tracing::debug!(operation = %operation.name, "dispatching request");

        let dto = match binding.parse_request(&request, &captures, &self.codecs) {
            Ok(dto) => dto,
            Err(error) => return render_error(&error, codec.as_ref()),
        };
        let cx = CallContext { cancel: cancel.child_token(), headers: request.headers };
        let outcome = self
            .service
            .call(operation, dto, &cx)
            .await
            .and_then(|reply| binding.render_response(&reply, codec.as_ref()));
        match outcome {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(operation = %operation.name, code = %error.code(), "operation failed");
                render_error(&error, codec.as_ref())
            }
        }
    }
}

impl std::fmt::Debug for HttpHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpHandler")
            .field("contract", &self.bindings.contract().name())
            .field("codecs", &self.codecs)
            .finish()
    }
}

#[async_trait::async_trait]
impl Transport for HttpHandler {
    async fn send(&self, request: HttpRequest, cancel: &CancellationToken) -> transport::Result<HttpResponse> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(transport::Error::Canceled),
            response = self.handle(request, cancel) => Ok(response),
        }
    }
}
