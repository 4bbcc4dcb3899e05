//! # Client Dispatcher
//!
//! Turns `invoke(operation, request)` into one HTTP exchange and back.
//!
//! ## Lifecycle
//!
//! 1. Resolve the operation's compiled binding.
//! 2. Render the request DTO with the primary codec; advertise every codec in
//!    `Accept`.
//! 3. Run the aspect pipeline over the outgoing request.
//! 4. Send through the transport, racing the caller's token and the optional
//!    per-call timeout.
//! 5. Run the pipeline over the response, then resolve it against the
//!    binding's response mappings.
//!
//! ## Invariants
//! - **Two Variants**: Every failure, transport ones included, surfaces as a
//!   [`ServiceError`]. No call ends in a panic, except for invoking an
//!   operation the contract does not declare.
//! - **No Retries**: Each invocation sends at most one request.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::aspect::Aspect;
use crate::aspect::AspectContext;
use crate::aspect::Pipeline;
use crate::binding;
use crate::binding::BindingDescriptor;
use crate::binding::BindingTable;
use crate::codec::CodecSet;
use crate::contract::OperationDescriptor;
use crate::contract::ServiceContract;
use crate::dto::Dto;
use crate::fault::ServiceError;
use crate::fault::ServiceResult;
use crate::message::HttpRequest;
use crate::message::HttpResponse;
use crate::service::CallContext;
use crate::service::Service;
use crate::transport;
use crate::transport::Transport;

/// Dispatches operations of one contract over a transport.
#[derive(Clone)]
pub struct Client {
    bindings: Arc<BindingTable>,
    transport: Arc<dyn Transport>,
    codecs: CodecSet,
    pipeline: Pipeline,
    timeout: Option<Duration>,
}

impl Client {
    pub fn builder(contract: &Arc<ServiceContract>, transport: Arc<dyn Transport>) -> ClientBuilder {
        ClientBuilder {
            contract: Arc::clone(contract),
            transport,
            codecs: CodecSet::default(),
            pipeline: Pipeline::new(),
            timeout: None,
        }
    }

    /// The descriptor for `name`, exact match first, then case-insensitive.
    pub fn operation(&self, name: &str) -> Option<&Arc<OperationDescriptor>> {
        self.bindings.get(name).map(|b| b.operation())
    }

    pub fn codecs(&self) -> &CodecSet {
        &self.codecs
    }

    /// Invokes an operation by name.
    ///
    /// # Panics
    /// If the contract has no operation called `name`. Use [`Self::operation`]
    /// to check first.
    pub async fn invoke(&self, name: &str, request: Dto, cancel: &CancellationToken) -> ServiceResult<Dto> {
        let Some(binding) = self.bindings.get(name) else {
            panic!("operation '{}' is not part of contract '{}'", name, self.bindings.contract().name());
        };
        let cx = CallContext::new(cancel.clone());
        self.dispatch(binding, request, &cx).await
    }

    async fn dispatch(&self, binding: &BindingDescriptor, request: Dto, cx: &CallContext) -> ServiceResult<Dto> {
        let operation = binding.operation();
        let span = tracing::debug_span!("invoke", operation = %operation.name);
        async move {
            if cx.cancel.is_cancelled() {
                return Err(ServiceError::canceled());
            }

            let aspect_cx = AspectContext { operation, request: &request };
            let codec = self.codecs.primary().as_ref();
            let accept = self.codecs.accept_header();
            let mut message = binding.render_request(&request, codec, &accept)?;
            // context headers replace rendered ones but keep every value they carry
            for name in cx.headers.keys() {
                message.headers.remove(name);
            }
            for (name, value) in &cx.headers {
                message.headers.append(name.clone(), value.clone());
            }
            let message = self.pipeline.before_send(message, &aspect_cx)?;

            tracing::debug!(method = %message.method, target = %message.target(), "sending request");
            let response = tokio::select! {
                biased;
                _ = cx.cancel.cancelled() => return Err(ServiceError::canceled()),
                outcome = self.send(message, &cx.cancel) => outcome,
            }
            .map_err(|e| transport_failure(&operation.name, e))?;
            tracing::debug!(status = response.status.as_u16(), bytes = response.body.len(), "received response");

            let response = self.pipeline.after_receive(response, &aspect_cx)?;
            binding.resolve_response(&response, &self.codecs)
        }
        .instrument(span)
        .await
    }

    async fn send(&self, message: HttpRequest, cancel: &CancellationToken) -> transport::Result<HttpResponse> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.transport.send(message, cancel))
                .await
                .unwrap_or(Err(transport::Error::Timeout)),
            None => self.transport.send(message, cancel).await,
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("contract", &self.bindings.contract().name())
            .field("codecs", &self.codecs)
            .field("pipeline", &self.pipeline)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn transport_failure(operation: &str, err: transport::Error) -> ServiceError {
    tracing::debug!(operation, error = %err, "transport failed");
    match err {
        transport::Error::Timeout => ServiceError::timeout(format!("{}: {}", operation, err)),
        transport::Error::Canceled => ServiceError::canceled(),
        other => ServiceError::internal_error_for(&other),
    }
}

#[async_trait::async_trait]
impl Service for Client {
    fn contract(&self) -> &Arc<ServiceContract> {
        self.bindings.contract()
    }

    async fn call(&self, operation: &OperationDescriptor, request: Dto, cx: &CallContext) -> ServiceResult<Dto> {
        let binding = self.bindings.get(&operation.name).ok_or_else(|| {
            ServiceError::invalid_request(format!(
                "operation '{}' is not part of contract '{}'",
                operation.name,
                self.bindings.contract().name()
            ))
        })?;
        self.dispatch(binding, request, cx).await
    }
}

/// Configures a [`Client`].
pub struct ClientBuilder {
    contract: Arc<ServiceContract>,
    transport: Arc<dyn Transport>,
    codecs: CodecSet,
    pipeline: Pipeline,
    timeout: Option<Duration>,
}

impl ClientBuilder {
    /// Replaces the codec set. The primary codec writes request bodies.
    pub fn codecs(mut self, codecs: CodecSet) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn aspect(mut self, aspect: impl Aspect + 'static) -> Self {
        self.pipeline = self.pipeline.then(aspect);
        self
    }

    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Gives up on a call that has not completed within `limit`.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Compiles every binding of the contract.
    pub fn build(self) -> binding::Result<Client> {
        let bindings = BindingTable::compile(&self.contract)?;
        Ok(Client {
            bindings: Arc::new(bindings),
            transport: self.transport,
            codecs: self.codecs,
            pipeline: self.pipeline,
            timeout: self.timeout,
        })
    }
}
