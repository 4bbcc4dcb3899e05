//! # Service Errors
//!
//! The error half of every service outcome. Codes are stable strings on the
//! wire and map to exactly one HTTP status each.
//!
//! ## Invariants
//! - **Total Mapping**: Every HTTP status classifies to some code. Statuses
//!   without an exact match classify to `InternalError`.
//! - **No Leaks**: Wrapping an arbitrary failure keeps its message and type
//!   category only. Backtraces and debug dumps never reach the wire.

use indexmap::IndexMap;

use crate::tree::TreeValue;

/// A canonical error code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidRequest,
    NotAuthenticated,
    NotAuthorized,
    NotFound,
    Conflict,
    RequestTooLarge,
    TooManyRequests,
    NotModified,
    Timeout,
    InvalidResponse,
    ServiceUnavailable,
    InternalError,
    /// The caller abandoned the call. Never produced by a server.
    Canceled,
    /// A contract-specific code, carried verbatim.
    Other(String),
}

const KNOWN: [ErrorCode; 13] = [
    ErrorCode::InvalidRequest,
    ErrorCode::NotAuthenticated,
    ErrorCode::NotAuthorized,
    ErrorCode::NotFound,
    ErrorCode::Conflict,
    ErrorCode::RequestTooLarge,
    ErrorCode::TooManyRequests,
    ErrorCode::NotModified,
    ErrorCode::Timeout,
    ErrorCode::InvalidResponse,
    ErrorCode::ServiceUnavailable,
    ErrorCode::InternalError,
    ErrorCode::Canceled,
];

impl ErrorCode {
    /// The wire string of the code.
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::InvalidRequest => "InvalidRequest",
            ErrorCode::NotAuthenticated => "NotAuthenticated",
            ErrorCode::NotAuthorized => "NotAuthorized",
            ErrorCode::NotFound => "NotFound",
            ErrorCode::Conflict => "Conflict",
            ErrorCode::RequestTooLarge => "RequestTooLarge",
            ErrorCode::TooManyRequests => "TooManyRequests",
            ErrorCode::NotModified => "NotModified",
            ErrorCode::Timeout => "Timeout",
            ErrorCode::InvalidResponse => "InvalidResponse",
            ErrorCode::ServiceUnavailable => "ServiceUnavailable",
            ErrorCode::InternalError => "InternalError",
            ErrorCode::Canceled => "Canceled",
            ErrorCode::Other(code) => code,
        }
    }

    /// Parses a wire string. Unrecognised strings become `Other`.
    pub fn parse(value: &str) -> Self {
        KNOWN
            .iter()
            .find(|code| code.as_str() == value)
            .cloned()
            .unwrap_or_else(|| ErrorCode::Other(value.to_string()))
    }

    /// The default HTTP status for this code.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::InvalidRequest => 400,
            ErrorCode::NotAuthenticated => 401,
            ErrorCode::NotAuthorized => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::Conflict => 409,
            ErrorCode::RequestTooLarge => 413,
            ErrorCode::TooManyRequests => 429,
            ErrorCode::NotModified => 304,
            ErrorCode::Timeout => 504,
            ErrorCode::InvalidResponse => 502,
            ErrorCode::ServiceUnavailable => 503,
            ErrorCode::InternalError | ErrorCode::Canceled | ErrorCode::Other(_) => 500,
        }
    }

    /// Classifies an HTTP status that arrived without an error body.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => ErrorCode::InvalidRequest,
            401 => ErrorCode::NotAuthenticated,
            403 => ErrorCode::NotAuthorized,
            404 => ErrorCode::NotFound,
            409 => ErrorCode::Conflict,
            413 => ErrorCode::RequestTooLarge,
            429 => ErrorCode::TooManyRequests,
            304 => ErrorCode::NotModified,
            504 => ErrorCode::Timeout,
            502 => ErrorCode::InvalidResponse,
            503 => ErrorCode::ServiceUnavailable,
            _ => ErrorCode::InternalError,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error outcome of a service call.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceError {
    code: ErrorCode,
    message: Option<String>,
    details: Option<TreeValue>,
    inner: Option<Box<ServiceError>>,
}

/// Success payload XOR error payload.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: Some(message.into()), details: None, inner: None }
    }

    /// An error carrying only a code.
    pub fn bare(code: ErrorCode) -> Self {
        Self { code, message: None, details: None, inner: None }
    }

    pub fn with_details(mut self, details: TreeValue) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_inner(mut self, inner: ServiceError) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn not_modified() -> Self {
        Self::bare(ErrorCode::NotModified)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidResponse, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn canceled() -> Self {
        Self::new(ErrorCode::Canceled, "the call was canceled")
    }

    /// Synthesizes an error from an HTTP status alone.
    pub fn for_status(status: u16) -> Self {
        Self::new(ErrorCode::from_http_status(status), format!("HTTP {}", status))
    }

    /// Wraps an arbitrary failure as `InternalError`.
    ///
    /// The message is the error's `Display`; `details.category` names its
    /// type. The `source` chain is not followed.
    pub fn internal_error_for(error: &(dyn std::error::Error + 'static)) -> Self {
        Self::internal_error(error.to_string()).with_details(TreeValue::map([(
            "category",
            TreeValue::String(category_of(error).to_string()),
        )]))
    }

    pub fn code(&self) -> &ErrorCode {
        &self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn details(&self) -> Option<&TreeValue> {
        self.details.as_ref()
    }

    pub fn inner(&self) -> Option<&ServiceError> {
        self.inner.as_deref()
    }

    /// The HTTP status this error is sent with.
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Writes the error as `{code, message?, details?, innerError?}`.
    pub fn to_tree(&self) -> TreeValue {
        let mut map = IndexMap::new();
        map.insert("code".to_string(), TreeValue::String(self.code.as_str().to_string()));
        if let Some(message) = &self.message {
            map.insert("message".to_string(), TreeValue::String(message.clone()));
        }
        if let Some(details) = &self.details {
            map.insert("details".to_string(), details.clone());
        }
        if let Some(inner) = &self.inner {
            map.insert("innerError".to_string(), inner.to_tree());
        }
        TreeValue::Map(map)
    }

    /// Reads an error tree. Keys match ignoring ASCII case.
    ///
    /// Returns `None` unless the tree is a map with a string `code`.
    pub fn from_tree(tree: &TreeValue) -> Option<Self> {
        let map = tree.as_map()?;
        let lookup = |key: &str| {
            map.get(key)
                .or_else(|| map.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v))
                .filter(|v| !matches!(v, TreeValue::Null))
        };

        let code = ErrorCode::parse(lookup("code")?.as_str()?);
        let message = lookup("message").and_then(TreeValue::as_str).map(str::to_string);
        let details = lookup("details").cloned();
        let inner = lookup("innerError").and_then(ServiceError::from_tree).map(Box::new);
        Some(Self { code, message, details, inner })
    }

    /// Semantic equality: same code, message, details and inner errors.
    /// Details compare with defaults collapsed.
    pub fn equivalent(&self, other: &ServiceError) -> bool {
        let details = match (&self.details, &other.details) {
            (Some(a), Some(b)) => a.equivalent_ignoring_defaults(b),
            (None, None) => true,
            (Some(v), None) | (None, Some(v)) => v.is_default(),
        };
        let inner = match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => a.equivalent(b),
            (None, None) => true,
            _ => false,
        };
        self.code == other.code && self.message == other.message && details && inner
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.code, message),
            None => write!(f, "{}", self.code),
        }
    }
}

impl std::error::Error for ServiceError {}

/// A coarse category for the error types this crate knows how to name.
fn category_of(error: &(dyn std::error::Error + 'static)) -> &'static str {
    if error.is::<crate::codec::Error>() {
        "MalformedPayload"
    } else if error.is::<crate::transport::Error>() {
        "TransportError"
    } else if error.is::<std::io::Error>() {
        "IoError"
    } else if error.is::<std::num::ParseIntError>() || error.is::<std::num::ParseFloatError>() {
        "ParseError"
    } else if error.is::<ServiceError>() {
        "ServiceError"
    } else {
        "Error"
    }
}
