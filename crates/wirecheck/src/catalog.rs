//! # Fixture Catalog
//!
//! A named, ordered collection of conformance fixtures, loaded once and
//! read-only afterwards.
//!
//! ## Format
//!
//! A JSON array of records, or an object whose `tests` key holds one:
//!
//! ```json
//! [
//!   { "name": "basicGet", "operation": "getWidget",
//!     "request": { "id": "red" },
//!     "response": { "widget": { "id": "red", "name": "Reddy" } } },
//!   { "name": "health", "httpRequest": { "method": "GET", "path": "/health" } }
//! ]
//! ```
//!
//! `test` is accepted for `name` and `method` for `operation`.
//!
//! ## Invariants
//! - **Unique Names**: No two fixtures share a name.
//! - **Unambiguous**: No two fixtures target the same operation with deeply
//!   equal request trees, so a request alone selects its fixture.
//! - **One Outcome**: Every operation fixture expects exactly one of a
//!   response or an error.

use std::collections::BTreeMap;
use std::collections::HashMap;

use http::Method;
use serde::Deserialize;
use wirerpc::TreeValue;

/// Catalog loading errors. All of them are detected at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The document is not valid JSON or does not have the fixture layout.
    Parse(String),
    /// Two fixtures share a name.
    DuplicateName(String),
    /// Two fixtures for one operation have deeply equal requests.
    Ambiguous { operation: String, first: String, second: String },
    /// A fixture has neither an operation nor a raw HTTP request.
    MissingOperation(String),
    /// An operation fixture does not expect exactly one of response or error.
    Expectation(String),
    /// A raw HTTP fixture has an unusable method.
    InvalidMethod { name: String, method: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Parse(msg) => write!(f, "cannot parse catalog: {}", msg),
            Error::DuplicateName(name) => write!(f, "duplicate test name '{}'", name),
            Error::Ambiguous { operation, first, second } => write!(
                f,
                "tests '{}' and '{}' send the same request to '{}'",
                first, second, operation
            ),
            Error::MissingOperation(name) => write!(f, "test '{}' names no operation", name),
            Error::Expectation(name) => {
                write!(f, "test '{}' must expect exactly one of a response or an error", name)
            }
            Error::InvalidMethod { name, method } => {
                write!(f, "test '{}' has invalid HTTP method '{}'", name, method)
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// The outcome an operation fixture expects.
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    Response(TreeValue),
    Error(TreeValue),
}

/// A literal HTTP request, sent as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHttpRequest {
    pub method: Method,
    /// Request target, path plus optional query string.
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

/// What a fixture exercises.
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    /// Invoke an operation and compare its outcome.
    Operation { operation: String, request: TreeValue, expected: Expectation },
    /// Send a literal request and require a 2xx status.
    Http(RawHttpRequest),
}

/// A named conformance fixture.
#[derive(Debug, Clone, PartialEq)]
pub struct ConformanceTestCase {
    pub name: String,
    pub check: Check,
}

impl ConformanceTestCase {
    pub fn operation(
        name: impl Into<String>,
        operation: impl Into<String>,
        request: TreeValue,
        expected: Expectation,
    ) -> Self {
        Self { name: name.into(), check: Check::Operation { operation: operation.into(), request, expected } }
    }

    pub fn http(name: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        let request = RawHttpRequest { method, path: path.into(), headers: BTreeMap::new(), body: None };
        Self { name: name.into(), check: Check::Http(request) }
    }

    /// The operation this fixture targets, if any.
    pub fn operation_name(&self) -> Option<&str> {
        match &self.check {
            Check::Operation { operation, .. } => Some(operation),
            Check::Http(_) => None,
        }
    }
}

// ============================================================================
//  WIRE FORMAT
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Document {
    List(Vec<Record>),
    Wrapped { tests: Vec<Record> },
}

#[derive(Debug, Deserialize)]
struct Record {
    #[serde(alias = "test")]
    name: String,
    #[serde(default, alias = "method")]
    operation: Option<String>,
    #[serde(default)]
    request: Option<serde_json::Value>,
    #[serde(default)]
    response: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default, rename = "httpRequest")]
    http_request: Option<RawRecord>,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    method: String,
    path: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    body: Option<String>,
}

impl Record {
    fn into_case(self) -> Result<ConformanceTestCase> {
        if let Some(raw) = self.http_request {
            let method = Method::from_bytes(raw.method.to_ascii_uppercase().as_bytes())
                .map_err(|_| Error::InvalidMethod { name: self.name.clone(), method: raw.method.clone() })?;
            let request = RawHttpRequest { method, path: raw.path, headers: raw.headers, body: raw.body };
            return Ok(ConformanceTestCase { name: self.name, check: Check::Http(request) });
        }

        let operation = self.operation.ok_or_else(|| Error::MissingOperation(self.name.clone()))?;
        let expected = match (self.response, self.error) {
            (Some(response), None) => Expectation::Response(TreeValue::from(response)),
            (None, Some(error)) => Expectation::Error(TreeValue::from(error)),
            _ => return Err(Error::Expectation(self.name)),
        };
        let request = self.request.map(TreeValue::from).unwrap_or_else(|| TreeValue::Map(Default::default()));
        Ok(ConformanceTestCase::operation(self.name, operation, request, expected))
    }
}

// ============================================================================
//  CATALOG
// ============================================================================

/// A validated, ordered fixture collection.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    cases: Vec<ConformanceTestCase>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    /// Validates and indexes `cases`, keeping their order.
    pub fn new(cases: Vec<ConformanceTestCase>) -> Result<Self> {
        let mut by_name = HashMap::new();
        for (index, case) in cases.iter().enumerate() {
            if by_name.insert(case.name.clone(), index).is_some() {
                return Err(Error::DuplicateName(case.name.clone()));
            }
        }

        for (i, a) in cases.iter().enumerate() {
            let Check::Operation { operation: op_a, request: req_a, .. } = &a.check else { continue };
            for b in &cases[i + 1..] {
                let Check::Operation { operation: op_b, request: req_b, .. } = &b.check else { continue };
                if op_a.eq_ignore_ascii_case(op_b) && req_a == req_b {
                    return Err(Error::Ambiguous {
                        operation: op_a.clone(),
                        first: a.name.clone(),
                        second: b.name.clone(),
                    });
                }
            }
        }

        tracing::debug!(fixtures = cases.len(), "catalog loaded");
        Ok(Self { cases, by_name })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(|e| Error::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let records = match serde_json::from_value(value).map_err(|e| Error::Parse(e.to_string()))? {
            Document::List(records) | Document::Wrapped { tests: records } => records,
        };
        let cases = records.into_iter().map(Record::into_case).collect::<Result<Vec<_>>>()?;
        Self::new(cases)
    }

    pub fn get(&self, name: &str) -> Option<&ConformanceTestCase> {
        self.by_name.get(name).map(|&index| &self.cases[index])
    }

    /// Fixtures in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &ConformanceTestCase> {
        self.cases.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cases.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}
