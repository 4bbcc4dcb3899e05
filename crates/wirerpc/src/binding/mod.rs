//! # HTTP Binding Engine
//!
//! Compiles an operation's [`HttpSpec`] into a [`BindingDescriptor`] and uses
//! it to move DTO values in and out of HTTP messages, in both directions.
//!
//! ## Philosophy
//!
//! - **Compile Once**: Every field reference is checked when the descriptor is
//!   built. Rendering and resolving never discover a broken annotation.
//! - **Stateless Calls**: A descriptor is shared read-only; each call owns its
//!   request and response.
//!
//! ## Invariants
//! - **Omit Absent**: Absent or null fields produce no query parameter and no
//!   header. A present empty string produces exactly one, with an empty value.
//! - **First Match Wins**: Response mappings are tried in declaration order.
//! - **Errors Never Escape Raw**: Every failure surfaces as a [`ServiceError`].

mod params;
mod path;

use std::collections::HashSet;
use std::sync::Arc;

use http::HeaderName;
use http::HeaderValue;
use http::StatusCode;
use http::header::ACCEPT;
use http::header::CONTENT_TYPE;
use indexmap::IndexMap;

use crate::codec::Codec;
use crate::codec::CodecSet;
use crate::codec::TreeStyle;
use crate::contract::BodySpec;
use crate::contract::OperationDescriptor;
use crate::contract::ServiceContract;
use crate::dto::Dto;
use crate::dto::FieldValue;
use crate::fault::ServiceError;
use crate::fault::ServiceResult;
use crate::message::HttpRequest;
use crate::message::HttpResponse;
use crate::shape::FieldShape;
use crate::shape::FieldType;
use crate::shape::Shape;
use crate::tree::TreeValue;

pub use params::format_scalar;
pub use params::parse_scalar;
pub use path::PathTemplate;

/// Binding compilation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An annotation names a field the shape does not declare.
    UnknownField { operation: String, field: String },
    /// A path, query or header field is not a scalar.
    NotScalar { operation: String, field: String },
    /// A response flag is not a boolean field.
    FlagNotBoolean { operation: String, field: String },
    /// A body field is not DTO-typed.
    BodyNotDto { operation: String, field: String },
    /// A field is bound to more than one place.
    BoundTwice { operation: String, field: String },
    /// A header name is not a valid HTTP header name.
    InvalidHeaderName { operation: String, header: String },
    /// The path template cannot be parsed.
    InvalidPath { operation: String, reason: String },
    /// The operation declares no responses.
    NoResponses { operation: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnknownField { operation, field } => {
                write!(f, "{}: binding refers to unknown field '{}'", operation, field)
            }
            Error::NotScalar { operation, field } => {
                write!(
                    f,
                    "{}: field '{}' is bound to the path, query or headers but is not a scalar",
                    operation, field
                )
            }
            Error::FlagNotBoolean { operation, field } => {
                write!(f, "{}: response flag '{}' is not a boolean field", operation, field)
            }
            Error::BodyNotDto { operation, field } => {
                write!(f, "{}: body field '{}' is not a DTO", operation, field)
            }
            Error::BoundTwice { operation, field } => {
                write!(f, "{}: field '{}' is bound more than once", operation, field)
            }
            Error::InvalidHeaderName { operation, header } => {
                write!(f, "{}: '{}' is not a valid header name", operation, header)
            }
            Error::InvalidPath { operation, reason } => {
                write!(f, "{}: invalid path template: {}", operation, reason)
            }
            Error::NoResponses { operation } => write!(f, "{}: no responses declared", operation),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A compiled message body.
#[derive(Debug, Clone)]
enum Body {
    None,
    Field { field: String, shape: Arc<Shape> },
    Remaining(Arc<Shape>),
}

/// A compiled response declaration.
#[derive(Debug, Clone)]
pub struct ResponseMapping {
    pub status: u16,
    pub flags: Vec<String>,
    body: Body,
}

impl ResponseMapping {
    /// The field carrying the whole body, if the body is a single field.
    pub fn body_field(&self) -> Option<&str> {
        match &self.body {
            Body::Field { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// A bound scalar: `(field, parameter or header name)`.
#[derive(Debug, Clone)]
struct Param<N> {
    field: String,
    name: N,
}

/// The compiled HTTP binding of one operation.
#[derive(Debug, Clone)]
pub struct BindingDescriptor {
    operation: Arc<OperationDescriptor>,
    path: PathTemplate,
    query: Vec<Param<String>>,
    headers: Vec<Param<HeaderName>>,
    body: Body,
    responses: Vec<ResponseMapping>,
    response_headers: Vec<Param<HeaderName>>,
}

/// Checks field references against one shape for one operation.
struct Checker<'a> {
    operation: &'a str,
    shape: &'a Shape,
    bound: HashSet<String>,
}

impl<'a> Checker<'a> {
    fn new(operation: &'a str, shape: &'a Shape) -> Self {
        Self { operation, shape, bound: HashSet::new() }
    }

    fn field(&self, field: &str) -> Result<&'a FieldType> {
        self.shape.field(field).map(|f| &f.ty).ok_or_else(|| Error::UnknownField {
            operation: self.operation.to_string(),
            field: field.to_string(),
        })
    }

    fn bind(&mut self, field: &str) -> Result<&'a FieldType> {
        let ty = self.field(field)?;
        if !self.bound.insert(field.to_string()) {
            return Err(Error::BoundTwice {
                operation: self.operation.to_string(),
                field: field.to_string(),
            });
        }
        Ok(ty)
    }

    fn scalar(&mut self, field: &str) -> Result<()> {
        if !self.bind(field)?.is_scalar() {
            return Err(Error::NotScalar {
                operation: self.operation.to_string(),
                field: field.to_string(),
            });
        }
        Ok(())
    }

    fn header_name(&self, header: &str) -> Result<HeaderName> {
        HeaderName::from_bytes(header.as_bytes()).map_err(|_| Error::InvalidHeaderName {
            operation: self.operation.to_string(),
            header: header.to_string(),
        })
    }

    fn body(&self, spec: &BodySpec, suffix: &str) -> Result<Body> {
        Ok(match spec {
            BodySpec::None => Body::None,
            BodySpec::Field(field) => match self.field(field)? {
                FieldType::Dto(shape) => {
                    Body::Field { field: field.clone(), shape: Arc::clone(shape) }
                }
                _ => {
                    return Err(Error::BodyNotDto {
                        operation: self.operation.to_string(),
                        field: field.clone(),
                    });
                }
            },
            BodySpec::Remaining => {
                let name = format!("{}{}", self.shape.name(), suffix);
                let unbound = |f: &FieldShape| !self.bound.contains(&f.name);
                Body::Remaining(self.shape.subset(name, &unbound))
            }
        })
    }
}

impl BindingDescriptor {
    /// Validates an operation's annotations and compiles them.
    pub fn compile(operation: Arc<OperationDescriptor>) -> Result<Self> {
        let spec = &operation.http;
        let name = operation.name.as_str();

        let path = PathTemplate::parse(&spec.path)
            .map_err(|reason| Error::InvalidPath { operation: name.to_string(), reason })?;

        let mut request = Checker::new(name, &operation.request);
        for field in path.fields() {
            request.scalar(field)?;
        }
        let mut query = Vec::new();
        for (field, param) in &spec.query {
            request.scalar(field)?;
            query.push(Param { field: field.clone(), name: param.clone() });
        }
        let mut headers = Vec::new();
        for (field, header) in &spec.headers {
            request.scalar(field)?;
            headers.push(Param { field: field.clone(), name: request.header_name(header)? });
        }
        if let BodySpec::Field(field) = &spec.body {
            request.bind(field)?;
        }
        let body = request.body(&spec.body, "Body")?;

        if spec.responses.is_empty() {
            return Err(Error::NoResponses { operation: name.to_string() });
        }
        let mut response = Checker::new(name, &operation.response);
        let mut response_headers = Vec::new();
        for (field, header) in &spec.response_headers {
            response.scalar(field)?;
            let header = response.header_name(header)?;
            response_headers.push(Param { field: field.clone(), name: header });
        }
        // flags may repeat across mappings, but never overlap other bindings
        let mut flags = HashSet::new();
        for mapping in &spec.responses {
            for flag in &mapping.flags {
                if !matches!(response.field(flag)?, FieldType::Boolean) {
                    return Err(Error::FlagNotBoolean {
                        operation: name.to_string(),
                        field: flag.clone(),
                    });
                }
                if flags.insert(flag.clone()) {
                    response.bind(flag)?;
                }
            }
        }
        let body_fields: HashSet<&String> = spec
            .responses
            .iter()
            .filter_map(|m| match &m.body {
                BodySpec::Field(field) => Some(field),
                _ => None,
            })
            .collect();
        for field in body_fields {
            response.bind(field)?;
        }
        let responses = spec
            .responses
            .iter()
            .map(|m| {
                let body = response.body(&m.body, "Content")?;
                Ok::<_, Error>(ResponseMapping { status: m.status, flags: m.flags.clone(), body })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { path, query, headers, body, responses, response_headers, operation })
    }

    pub fn operation(&self) -> &Arc<OperationDescriptor> {
        &self.operation
    }

    pub fn path(&self) -> &PathTemplate {
        &self.path
    }

    pub fn responses(&self) -> &[ResponseMapping] {
        &self.responses
    }

    // ------------------------------------------------------------------------
    //  CLIENT DIRECTION
    // ------------------------------------------------------------------------

    /// Renders a request DTO as an HTTP request.
    ///
    /// # Errors
    /// `InvalidRequest` when a path field is absent or a value cannot be
    /// written.
    pub fn render_request(
        &self,
        dto: &Dto,
        codec: &dyn Codec,
        accept: &str,
    ) -> ServiceResult<HttpRequest> {
        let op = &self.operation.name;
        let mut failure = None;
        let rendered = self.path.render(&mut |field| match dto.get(field).map(format_scalar) {
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                failure = Some(e);
                None
            }
            None => None,
        });
        let path = match (rendered, failure) {
            (_, Some(e)) => return Err(ServiceError::invalid_request(format!("{}: {}", op, e))),
            (Err(field), None) => {
                let message = format!("{}: path field '{}' is absent", op, field);
                return Err(ServiceError::invalid_request(message));
            }
            (Ok(path), None) => path,
        };

        let mut request = HttpRequest::new(self.operation.http.method.clone(), path);
        for param in &self.query {
            if let Some(text) = scalar_text(dto, &param.field, op)? {
                request.query.push((param.name.clone(), text));
            }
        }
        for param in &self.headers {
            if let Some(text) = scalar_text(dto, &param.field, op)? {
                let value = HeaderValue::from_str(&text).map_err(|_| {
                    let message =
                        format!("{}: field '{}' is not a valid header value", op, param.field);
                    ServiceError::invalid_request(message)
                })?;
                request.headers.append(param.name.clone(), value);
            }
        }

        let body = match &self.body {
            Body::None => None,
            Body::Field { field, .. } => dto.get_dto(field).cloned(),
            Body::Remaining(shape) => Some(dto.project(shape)),
        };
        if let Some(body) = body {
            let bytes = codec
                .encode(&body)
                .map_err(|e| {
                    let message = format!("{}: cannot encode request body: {}", op, e);
                    ServiceError::invalid_request(message)
                })?;
            request.headers.insert(CONTENT_TYPE, static_value(codec.media_type()));
            request.body = Some(bytes.into());
        }
        if let Ok(accept) = HeaderValue::from_str(accept) {
            request.headers.insert(ACCEPT, accept);
        }
        Ok(request)
    }

    /// Turns an HTTP response into the operation's outcome.
    pub fn resolve_response(
        &self,
        response: &HttpResponse,
        codecs: &CodecSet,
    ) -> ServiceResult<Dto> {
        let status = response.status.as_u16();
        let Some(mapping) = self.responses.iter().find(|m| m.status == status) else {
            if status >= 400 || status == 304 {
                return Err(error_from_response(response, codecs));
            }
            let message = format!("unexpected HTTP status {}", status);
            return Err(ServiceError::invalid_response(message));
        };

        let shape = &self.operation.response;
        let mut dto = Dto::new(shape);
        match &mapping.body {
            Body::None => {}
            Body::Field { field, shape } => {
                if !response.body.is_empty() {
                    dto.set(field.clone(), decode_response(response, shape, codecs)?);
                }
            }
            Body::Remaining(content) => dto.merge(decode_response(response, content, codecs)?),
        }
        for flag in &mapping.flags {
            dto.set(flag.clone(), true);
        }
        for param in &self.response_headers {
            let Some(text) = response.header(param.name.as_str()) else { continue };
            let value = parse_field(shape, &param.field, text).map_err(|e| {
                ServiceError::invalid_response(format!("header '{}': {}", param.name, e))
            })?;
            dto.set(param.field.clone(), value);
        }
        Ok(dto)
    }

    // ------------------------------------------------------------------------
    //  SERVER DIRECTION
    // ------------------------------------------------------------------------

    /// Matches a request's method and path, returning path captures.
    pub fn matches(&self, request: &HttpRequest) -> Option<Vec<(String, String)>> {
        if request.method != self.operation.http.method {
            return None;
        }
        self.path.capture(&request.segments()?)
    }

    /// Reads a request DTO from an HTTP request matched by [`Self::matches`].
    pub fn parse_request(
        &self,
        request: &HttpRequest,
        captures: &[(String, String)],
        codecs: &CodecSet,
    ) -> ServiceResult<Dto> {
        let shape = &self.operation.request;
        let mut dto = Dto::new(shape);
        let parse = |field: &str, text: &str| {
            parse_field(shape, field, text)
                .map_err(|e| ServiceError::invalid_request(format!("field '{}': {}", field, e)))
        };

        for (field, text) in captures {
            dto.set(field.clone(), parse(field, text)?);
        }
        for param in &self.query {
            if let Some(text) = request.query_param(&param.name) {
                dto.set(param.field.clone(), parse(&param.field, text)?);
            }
        }
        for param in &self.headers {
            if let Some(text) = request.header(param.name.as_str()) {
                dto.set(param.field.clone(), parse(&param.field, text)?);
            }
        }

        let body = request.body.as_deref().unwrap_or_default();
        match &self.body {
            Body::None => {}
            Body::Field { field, shape } => {
                if !body.is_empty() {
                    dto.set(field.clone(), decode_request(request, body, shape, codecs)?);
                }
            }
            Body::Remaining(content) => {
                let decoded = if body.is_empty() {
                    empty_body(content).map_err(|e| {
                        ServiceError::invalid_request(format!("invalid request body: {}", e))
                    })?
                } else {
                    decode_request(request, body, content, codecs)?
                };
                dto.merge(decoded);
            }
        }
        Ok(dto)
    }

    /// Picks the response mapping for a response DTO: the first mapping whose
    /// flags are all set, then the first flagless mapping whose body field is
    /// present, then the first flagless mapping.
    pub fn select_mapping(&self, dto: &Dto) -> Option<&ResponseMapping> {
        let flagged = self
            .responses
            .iter()
            .find(|m| !m.flags.is_empty() && m.flags.iter().all(|f| dto.get_bool(f) == Some(true)));
        let flagless = || self.responses.iter().filter(|m| m.flags.is_empty());
        flagged
            .or_else(|| flagless().find(|m| m.body_field().is_some_and(|f| dto.is_present(f))))
            .or_else(|| flagless().next())
    }

    /// Renders a response DTO as an HTTP response.
    pub fn render_response(&self, dto: &Dto, codec: &dyn Codec) -> ServiceResult<HttpResponse> {
        let op = &self.operation.name;
        let mapping = self
            .select_mapping(dto)
            .ok_or_else(|| {
                ServiceError::internal_error(format!("{}: no response mapping fits the result", op))
            })?;
        let status = StatusCode::from_u16(mapping.status)
            .map_err(|_| {
                ServiceError::internal_error(format!("{}: invalid status {}", op, mapping.status))
            })?;

        let mut response = HttpResponse::new(status);
        let body = match &mapping.body {
            Body::None => None,
            Body::Field { field, .. } => dto.get_dto(field).cloned(),
            Body::Remaining(shape) => Some(dto.project(shape)),
        };
        if let Some(body) = body {
            let bytes = codec
                .encode(&body)
                .map_err(|e| {
                    ServiceError::internal_error(format!("{}: cannot encode response: {}", op, e))
                })?;
            response = response.with_body(codec.media_type(), bytes);
        }
        for param in &self.response_headers {
            if let Some(text) = scalar_text(dto, &param.field, op)? {
                let value = HeaderValue::from_str(&text).map_err(|_| {
                    let message =
                        format!("{}: field '{}' is not a valid header value", op, param.field);
                    ServiceError::internal_error(message)
                })?;
                response.headers.append(param.name.clone(), value);
            }
        }
        Ok(response)
    }
}

/// Renders a service error as an HTTP response.
///
/// `NotModified` carries no body.
pub fn render_error(error: &ServiceError, codec: &dyn Codec) -> HttpResponse {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let response = HttpResponse::new(status);
    if status == StatusCode::NOT_MODIFIED {
        return response;
    }
    match codec.write_tree(&error.to_tree()) {
        Ok(bytes) => response.with_body(codec.media_type(), bytes),
        Err(e) => {
            tracing::warn!(error = %e, "cannot encode service error body");
            response
        }
    }
}

fn parse_field(shape: &Shape, field: &str, text: &str) -> std::result::Result<FieldValue, String> {
    match shape.field(field) {
        Some(f) => parse_scalar(text, &f.ty),
        None => Ok(FieldValue::String(text.to_string())),
    }
}

fn static_value(media_type: &'static str) -> HeaderValue {
    HeaderValue::from_static(media_type)
}

fn scalar_text(dto: &Dto, field: &str, op: &str) -> ServiceResult<Option<String>> {
    match dto.get(field) {
        None => Ok(None),
        Some(value) => {
            format_scalar(value).map_err(|e| {
                ServiceError::invalid_request(format!("{}: field '{}': {}", op, field, e))
            })
        }
    }
}

/// An empty body reads as an empty object.
fn empty_body(shape: &Arc<Shape>) -> crate::codec::Result<Dto> {
    crate::codec::dto_from_tree(&TreeValue::Map(IndexMap::new()), shape, &TreeStyle::JSON)
}

fn decode_response(
    response: &HttpResponse,
    shape: &Arc<Shape>,
    codecs: &CodecSet,
) -> ServiceResult<Dto> {
    if response.body.is_empty() {
        return empty_body(shape)
            .map_err(|e| ServiceError::invalid_response(format!("invalid response body: {}", e)));
    }
    let content_type = response
        .content_type()
        .ok_or_else(|| ServiceError::invalid_response("missing content type"))?;
    let codec = codecs
        .for_media_type(content_type)
        .ok_or_else(|| {
            ServiceError::invalid_response(format!("unsupported content type: {}", content_type))
        })?;
    codec
        .decode(&response.body, shape)
        .map_err(|e| ServiceError::invalid_response(format!("invalid response body: {}", e)))
}

fn decode_request(
    request: &HttpRequest,
    body: &[u8],
    shape: &Arc<Shape>,
    codecs: &CodecSet,
) -> ServiceResult<Dto> {
    let content_type = request
        .content_type()
        .ok_or_else(|| ServiceError::invalid_request("missing content type"))?;
    let codec = codecs
        .for_media_type(content_type)
        .ok_or_else(|| {
            ServiceError::invalid_request(format!("unsupported content type: {}", content_type))
        })?;
    codec
        .decode(body, shape)
        .map_err(|e| ServiceError::invalid_request(format!("invalid request body: {}", e)))
}

/// Classifies an error response. A body that does not parse as a service
/// error never fails the call; the status alone decides instead.
fn error_from_response(response: &HttpResponse, codecs: &CodecSet) -> ServiceError {
    let status = response.status.as_u16();
    let parsed = response
        .content_type()
        .filter(|_| !response.body.is_empty())
        .and_then(|ct| codecs.for_media_type(ct))
        .and_then(|codec| codec.read_tree(&response.body).ok())
        .and_then(|tree| ServiceError::from_tree(&tree));
    match parsed {
        Some(error) => error,
        None => {
            tracing::debug!(status, "synthesizing service error from status");
            ServiceError::for_status(status)
        }
    }
}

/// Compiled bindings for every operation of a contract.
#[derive(Debug, Clone)]
pub struct BindingTable {
    contract: Arc<ServiceContract>,
    bindings: Vec<Arc<BindingDescriptor>>,
}

impl BindingTable {
    pub fn compile(contract: &Arc<ServiceContract>) -> Result<Self> {
        let bindings = contract
            .operations()
            .iter()
            .map(|op| BindingDescriptor::compile(Arc::clone(op)).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { contract: Arc::clone(contract), bindings })
    }

    pub fn contract(&self) -> &Arc<ServiceContract> {
        &self.contract
    }

    /// Exact match first, then ASCII case-insensitive.
    pub fn get(&self, operation: &str) -> Option<&Arc<BindingDescriptor>> {
        self.bindings
            .iter()
            .find(|b| b.operation.name == operation)
            .or_else(|| {
                self.bindings.iter().find(|b| b.operation.name.eq_ignore_ascii_case(operation))
            })
    }

    /// The first binding that matches the request, with its path captures.
    pub fn route(
        &self,
        request: &HttpRequest,
    ) -> Option<(&Arc<BindingDescriptor>, Vec<(String, String)>)> {
        self.bindings.iter().find_map(|b| b.matches(request).map(|captures| (b, captures)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<BindingDescriptor>> {
        self.bindings.iter()
    }
}

#[cfg(test)]
mod tests;
