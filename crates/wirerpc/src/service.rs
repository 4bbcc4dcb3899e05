//! # Services
//!
//! The uniform face of anything that answers operations: a remote [`Client`],
//! an in-process [`ServiceRegistry`], or a fixture-backed stub.
//!
//! ## Philosophy
//!
//! - **Explicit Registry**: Operations are bound to typed invoker closures once,
//!   by name, when the registry is built. Nothing is looked up by reflection.
//! - **Two Variants**: Every call ends in exactly one of a response DTO or a
//!   [`ServiceError`].
//!
//! [`Client`]: crate::client::Client

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use http::HeaderMap;
use http::HeaderName;
use http::HeaderValue;
use tokio_util::sync::CancellationToken;

use crate::contract::OperationDescriptor;
use crate::contract::ServiceContract;
use crate::dto::Dto;
use crate::fault::ServiceError;
use crate::fault::ServiceResult;

/// Registry construction errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The contract has no operation with this name.
    UnknownOperation(String),
    /// The operation already has an invoker.
    DuplicateInvoker(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnknownOperation(name) => write!(f, "operation '{}' is not part of the contract", name),
            Error::DuplicateInvoker(name) => write!(f, "operation '{}' is registered more than once", name),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Per-call context: the caller's cancellation token and extra headers.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub cancel: CancellationToken,
    pub headers: HeaderMap,
}

impl CallContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel, headers: HeaderMap::new() }
    }

    /// Adds a header value. Repeated names keep every value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Something that answers the operations of a contract.
#[async_trait::async_trait]
pub trait Service: Send + Sync {
    fn contract(&self) -> &Arc<ServiceContract>;

    async fn call(&self, operation: &OperationDescriptor, request: Dto, cx: &CallContext) -> ServiceResult<Dto>;

    /// Resolves `name` against the contract and calls it.
    ///
    /// # Errors
    /// `InvalidRequest` for names the contract does not declare.
    async fn call_by_name(&self, name: &str, request: Dto, cx: &CallContext) -> ServiceResult<Dto> {
        let operation = self
            .contract()
            .resolve(name)
            .cloned()
            .ok_or_else(|| ServiceError::invalid_request(format!("unknown operation '{}'", name)))?;
        self.call(&operation, request, cx).await
    }
}

type Invoker = Arc<dyn Fn(Dto, CallContext) -> BoxFuture<'static, ServiceResult<Dto>> + Send + Sync>;

/// An in-process service built from one closure per operation.
pub struct ServiceRegistry {
    contract: Arc<ServiceContract>,
    invokers: HashMap<String, Invoker>,
}

impl ServiceRegistry {
    pub fn builder(contract: &Arc<ServiceContract>) -> RegistryBuilder {
        RegistryBuilder { contract: Arc::clone(contract), invokers: Vec::new() }
    }

    pub fn is_registered(&self, operation: &str) -> bool {
        self.contract.resolve(operation).is_some_and(|op| self.invokers.contains_key(&op.name))
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("contract", &self.contract.name())
            .field("operations", &self.invokers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait::async_trait]
impl Service for ServiceRegistry {
    fn contract(&self) -> &Arc<ServiceContract> {
        &self.contract
    }

    async fn call(&self, operation: &OperationDescriptor, request: Dto, cx: &CallContext) -> ServiceResult<Dto> {
        if cx.cancel.is_cancelled() {
            return Err(ServiceError::canceled());
        }
        let invoker = self
            .contract
            .resolve(&operation.name)
            .and_then(|op| self.invokers.get(&op.name))
            .ok_or_else(|| ServiceError::internal_error(format!("{}: not implemented", operation.name)))?;
        invoker(request, cx.clone()).await
    }
}

/// Collects invokers for a [`ServiceRegistry`].
pub struct RegistryBuilder {
    contract: Arc<ServiceContract>,
    invokers: Vec<(String, Invoker)>,
}

impl RegistryBuilder {
    /// Registers the invoker for an operation.
    pub fn operation<F, Fut>(mut self, name: impl Into<String>, invoker: F) -> Self
    where
        F: Fn(Dto, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult<Dto>> + Send + 'static,
    {
        let invoker: Invoker = Arc::new(move |request, cx| Box::pin(invoker(request, cx)));
        self.invokers.push((name.into(), invoker));
        self
    }

    /// Checks every name against the contract.
    pub fn build(self) -> Result<ServiceRegistry> {
        let mut invokers = HashMap::new();
        for (name, invoker) in self.invokers {
            let op = self.contract.resolve(&name).ok_or_else(|| Error::UnknownOperation(name.clone()))?;
            if invokers.insert(op.name.clone(), invoker).is_some() {
                return Err(Error::DuplicateInvoker(op.name.clone()));
            }
        }
        Ok(ServiceRegistry { contract: self.contract, invokers })
    }
}
