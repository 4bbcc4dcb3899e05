//! # Service Contracts
//!
//! The operations a service offers, as handed over by code generation: each
//! operation's name, request and response shapes, and its declarative HTTP
//! annotations.
//!
//! ## Philosophy
//!
//! - **Validated Once**: Names are checked when the contract is built. Lookups
//!   on the hot path never fail for structural reasons.
//! - **Deterministic Resolution**: Names are unique even ignoring ASCII case,
//!   so a case-insensitive lookup has at most one answer.

use std::collections::HashSet;
use std::sync::Arc;

use http::Method;

use crate::shape::Shape;

/// Contract construction errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An operation name is empty.
    EmptyOperationName,
    /// Two operations share a name (compared case-insensitively).
    DuplicateOperation(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::EmptyOperationName => write!(f, "operation names must not be empty"),
            Error::DuplicateOperation(name) => write!(f, "operation '{}' is declared more than once", name),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Where a message body comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BodySpec {
    /// No body.
    #[default]
    None,
    /// A single DTO-typed field is the whole body.
    Field(String),
    /// Every field not bound to the path, query, headers or flags.
    Remaining,
}

/// One declared response of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSpec {
    pub status: u16,
    pub body: BodySpec,
    /// Boolean response fields set to `true` when this response matches.
    pub flags: Vec<String>,
}

impl ResponseSpec {
    /// A response with the given status whose body carries the remaining fields.
    pub fn status(status: u16) -> Self {
        Self { status, body: BodySpec::Remaining, flags: Vec::new() }
    }

    pub fn no_body(mut self) -> Self {
        self.body = BodySpec::None;
        self
    }

    pub fn body_field(mut self, field: impl Into<String>) -> Self {
        self.body = BodySpec::Field(field.into());
        self
    }

    pub fn flag(mut self, field: impl Into<String>) -> Self {
        self.flags.push(field.into());
        self
    }
}

/// The HTTP annotations of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSpec {
    pub method: Method,
    /// Path template with `{field}` placeholders.
    pub path: String,
    /// `(field, parameter name)` pairs.
    pub query: Vec<(String, String)>,
    /// `(field, header name)` pairs.
    pub headers: Vec<(String, String)>,
    pub body: BodySpec,
    /// Declared responses, matched in order.
    pub responses: Vec<ResponseSpec>,
    /// `(field, header name)` pairs read from responses.
    pub response_headers: Vec<(String, String)>,
}

impl HttpSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: BodySpec::None,
            responses: Vec::new(),
            response_headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, field: impl Into<String>, name: impl Into<String>) -> Self {
        self.query.push((field.into(), name.into()));
        self
    }

    pub fn header(mut self, field: impl Into<String>, name: impl Into<String>) -> Self {
        self.headers.push((field.into(), name.into()));
        self
    }

    pub fn body_field(mut self, field: impl Into<String>) -> Self {
        self.body = BodySpec::Field(field.into());
        self
    }

    pub fn body_remaining(mut self) -> Self {
        self.body = BodySpec::Remaining;
        self
    }

    pub fn response(mut self, response: ResponseSpec) -> Self {
        self.responses.push(response);
        self
    }

    pub fn response_header(mut self, field: impl Into<String>, header: impl Into<String>) -> Self {
        self.response_headers.push((field.into(), header.into()));
        self
    }
}

/// A single operation of a contract.
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    pub name: String,
    pub request: Arc<Shape>,
    pub response: Arc<Shape>,
    pub http: HttpSpec,
}

/// An immutable set of operations.
#[derive(Debug, Clone)]
pub struct ServiceContract {
    name: String,
    operations: Vec<Arc<OperationDescriptor>>,
}

impl ServiceContract {
    pub fn builder(name: impl Into<String>) -> ContractBuilder {
        ContractBuilder { name: name.into(), operations: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Operations in declaration order.
    pub fn operations(&self) -> &[Arc<OperationDescriptor>] {
        &self.operations
    }

    /// Exact match first, then ASCII case-insensitive.
    pub fn resolve(&self, name: &str) -> Option<&Arc<OperationDescriptor>> {
        self.operations
            .iter()
            .find(|op| op.name == name)
            .or_else(|| self.operations.iter().find(|op| op.name.eq_ignore_ascii_case(name)))
    }
}

/// Collects operations for a [`ServiceContract`].
#[derive(Debug)]
pub struct ContractBuilder {
    name: String,
    operations: Vec<OperationDescriptor>,
}

impl ContractBuilder {
    pub fn operation(
        mut self,
        name: impl Into<String>,
        request: Arc<Shape>,
        response: Arc<Shape>,
        http: HttpSpec,
    ) -> Self {
        self.operations.push(OperationDescriptor { name: name.into(), request, response, http });
        self
    }

    /// Validates operation names and freezes the contract.
    pub fn build(self) -> Result<Arc<ServiceContract>> {
        let mut seen = HashSet::new();
        for op in &self.operations {
            if op.name.is_empty() {
                return Err(Error::EmptyOperationName);
            }
            if !seen.insert(op.name.to_ascii_lowercase()) {
                return Err(Error::DuplicateOperation(op.name.clone()));
            }
        }
        Ok(Arc::new(ServiceContract {
            name: self.name,
            operations: self.operations.into_iter().map(Arc::new).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty(name: &str) -> Arc<Shape> {
        Shape::empty(name)
    }

    #[test]
    fn test_resolve_exact_then_ignoring_case() {
        let contract = ServiceContract::builder("widgets")
            .operation("getWidget", empty("Req"), empty("Res"), HttpSpec::get("/widgets"))
            .build()
            .unwrap();
        assert_eq!(contract.resolve("getWidget").unwrap().name, "getWidget");
        assert_eq!(contract.resolve("GetWidget").unwrap().name, "getWidget");
        assert!(contract.resolve("deleteWidget").is_none());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = ServiceContract::builder("widgets")
            .operation("getWidget", empty("A"), empty("B"), HttpSpec::get("/a"))
            .operation("GetWidget", empty("A"), empty("B"), HttpSpec::get("/b"))
            .build()
            .unwrap_err();
        assert_eq!(err, Error::DuplicateOperation("GetWidget".into()));
    }

    #[test]
    fn test_http_spec_builder() {
        let spec = HttpSpec::post("/widgets/{id}")
            .query("verbose", "v")
            .header("ifMatch", "If-Match")
            .body_field("widget")
            .response(ResponseSpec::status(201).body_field("widget"))
            .response(ResponseSpec::status(304).no_body().flag("notModified"));
        assert_eq!(spec.method, Method::POST);
        assert_eq!(spec.body, BodySpec::Field("widget".into()));
        assert_eq!(spec.responses[1].flags, ["notModified"]);
        assert_eq!(spec.responses[1].body, BodySpec::None);
    }
}
