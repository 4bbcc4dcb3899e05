//! # Aspects
//!
//! Cross-cutting hooks around every call: authentication headers, user agents,
//! test selectors. An aspect takes the in-flight message and hands back the
//! (possibly changed) message; a [`Pipeline`] chains them in order.
//!
//! ## Invariants
//! - **Ordered**: Aspects run in the order they were added, for both requests
//!   and responses.
//! - **Fail Closed**: A failing aspect aborts the call with `InternalError`.
//!   Nothing is sent after a `before_send` failure.

use std::sync::Arc;

use http::HeaderName;
use http::HeaderValue;
use http::header::AUTHORIZATION;
use http::header::USER_AGENT;

use crate::contract::OperationDescriptor;
use crate::dto::Dto;
use crate::fault::ServiceError;
use crate::fault::ServiceResult;
use crate::message::HttpRequest;
use crate::message::HttpResponse;

/// The error an aspect reports.
pub type AspectError = Box<dyn std::error::Error + Send + Sync>;

/// What an aspect may inspect about the call it is part of.
#[derive(Debug, Clone, Copy)]
pub struct AspectContext<'a> {
    pub operation: &'a OperationDescriptor,
    pub request: &'a Dto,
}

/// A hook on the request/response lifecycle. Hooks must not block.
pub trait Aspect: Send + Sync {
    fn before_send(&self, request: HttpRequest, cx: &AspectContext<'_>) -> Result<HttpRequest, AspectError>;

    fn after_receive(&self, response: HttpResponse, _cx: &AspectContext<'_>) -> Result<HttpResponse, AspectError> {
        Ok(response)
    }
}

/// An ordered chain of aspects.
#[derive(Clone, Default)]
pub struct Pipeline {
    aspects: Vec<Arc<dyn Aspect>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an aspect to the chain.
    pub fn then(mut self, aspect: impl Aspect + 'static) -> Self {
        self.aspects.push(Arc::new(aspect));
        self
    }

    pub fn then_shared(mut self, aspect: Arc<dyn Aspect>) -> Self {
        self.aspects.push(aspect);
        self
    }

    pub fn len(&self) -> usize {
        self.aspects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aspects.is_empty()
    }

    pub fn before_send(&self, request: HttpRequest, cx: &AspectContext<'_>) -> ServiceResult<HttpRequest> {
        self.aspects.iter().try_fold(request, |request, aspect| {
            aspect.before_send(request, cx).map_err(|e| failed(cx, "before send", e))
        })
    }

    pub fn after_receive(&self, response: HttpResponse, cx: &AspectContext<'_>) -> ServiceResult<HttpResponse> {
        self.aspects.iter().try_fold(response, |response, aspect| {
            aspect.after_receive(response, cx).map_err(|e| failed(cx, "after receive", e))
        })
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").field("aspects", &self.aspects.len()).finish()
    }
}

fn failed(cx: &AspectContext<'_>, stage: &str, err: AspectError) -> ServiceError {
    tracing::warn!(operation = %cx.operation.name, stage, error = %err, "aspect failed");
    ServiceError::internal_error(format!("aspect failed {}: {}", stage, err))
}

/// Sets a header on every request, replacing earlier values.
#[derive(Debug, Clone)]
pub struct SetHeader {
    name: String,
    value: String,
}

impl Aspect for SetHeader {
    fn before_send(&self, mut request: HttpRequest, _cx: &AspectContext<'_>) -> Result<HttpRequest, AspectError> {
        let name = HeaderName::from_bytes(self.name.as_bytes())?;
        let value = HeaderValue::from_str(&self.value)?;
        request.headers.insert(name, value);
        Ok(request)
    }
}

/// Sets `name: value` on every request.
pub fn header(name: impl Into<String>, value: impl Into<String>) -> SetHeader {
    SetHeader { name: name.into(), value: value.into() }
}

pub fn user_agent(value: impl Into<String>) -> SetHeader {
    header(USER_AGENT.as_str(), value)
}

/// Sets `Authorization: Bearer <token>`.
pub fn bearer_token(token: impl AsRef<str>) -> SetHeader {
    header(AUTHORIZATION.as_str(), format!("Bearer {}", token.as_ref()))
}

/// A request hook made from a closure.
pub struct FnAspect<F> {
    f: F,
}

impl<F> Aspect for FnAspect<F>
where
    F: Fn(HttpRequest, &AspectContext<'_>) -> Result<HttpRequest, AspectError> + Send + Sync,
{
    fn before_send(&self, request: HttpRequest, cx: &AspectContext<'_>) -> Result<HttpRequest, AspectError> {
        (self.f)(request, cx)
    }
}

pub fn from_fn<F>(f: F) -> FnAspect<F>
where
    F: Fn(HttpRequest, &AspectContext<'_>) -> Result<HttpRequest, AspectError> + Send + Sync,
{
    FnAspect { f }
}
