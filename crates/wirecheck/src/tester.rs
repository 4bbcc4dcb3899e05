//! # Conformance Tester
//!
//! Runs catalog fixtures against a [`Service`] and reports one verdict each.
//!
//! ## Lifecycle (per operation fixture)
//!
//! 1. Resolve the operation against the service's contract.
//! 2. Decode the literal request tree and require it to round-trip: back to
//!    the same tree, and through every extra codec to an equivalent DTO.
//! 3. Invoke the operation with the fixture name in the selector header,
//!    under a child of the run's cancellation token.
//! 4. Compare the outcome with the expectation, both as trees and as
//!    equivalent DTOs or errors.
//!
//! ## Invariants
//! - **Total**: A fixture that panics or fails unexpectedly is a `Fail` with
//!   the failure's category and message. A batch always completes.
//! - **Stateless**: Running the same catalog twice gives the same verdicts.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Context;
use anyhow::anyhow;
use futures::FutureExt;
use http::HeaderName;
use http::HeaderValue;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use wirerpc::CallContext;
use wirerpc::Codec;
use wirerpc::Dto;
use wirerpc::OperationDescriptor;
use wirerpc::Service;
use wirerpc::ServiceError;
use wirerpc::TreeValue;
use wirerpc::codec::JsonCodec;
use wirerpc::message::HttpRequest;
use wirerpc::transport::Transport;

use crate::catalog::Catalog;
use crate::catalog::Check;
use crate::catalog::ConformanceTestCase;
use crate::catalog::Expectation;
use crate::catalog::RawHttpRequest;
use crate::report::TestResult;
use crate::report::TestRun;

/// Carries the active fixture name to the service under test.
pub const TEST_SELECTOR_HEADER: &str = "x-wirecheck-test";

/// Runs fixtures from a [`Catalog`] against a service.
#[derive(Clone)]
pub struct ConformanceTester {
    catalog: Arc<Catalog>,
    service: Arc<dyn Service>,
    codec: Arc<dyn Codec>,
    round_trip: Vec<Arc<dyn Codec>>,
    http: Option<Arc<dyn Transport>>,
}

impl ConformanceTester {
    pub fn builder(catalog: Arc<Catalog>, service: Arc<dyn Service>) -> TesterBuilder {
        TesterBuilder {
            catalog,
            service,
            codec: Arc::new(JsonCodec::standard()),
            round_trip: Vec::new(),
            http: None,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Runs every fixture in catalog order.
    pub async fn run_all(&self, cancel: &CancellationToken) -> TestRun {
        let mut results = Vec::with_capacity(self.catalog.len());
        for case in self.catalog.iter() {
            results.push(self.run_case(case, cancel).await);
        }
        TestRun::new(results)
    }

    /// Runs the named fixtures in the given order. Unknown names fail.
    pub async fn run_tests(&self, names: &[&str], cancel: &CancellationToken) -> TestRun {
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            results.push(self.run_test(name, cancel).await);
        }
        TestRun::new(results)
    }

    pub async fn run_test(&self, name: &str, cancel: &CancellationToken) -> TestResult {
        match self.catalog.get(name) {
            Some(case) => self.run_case(case, cancel).await,
            None => {
                let result = TestResult::fail(name, format!("no test named '{}'", name));
                tracing::info!(test = name, "{}", result);
                result
            }
        }
    }

    async fn run_case(&self, case: &ConformanceTestCase, cancel: &CancellationToken) -> TestResult {
        let span = tracing::info_span!("fixture", test = %case.name);
        let cancel = cancel.child_token();

        let outcome = AssertUnwindSafe(self.execute(case, &cancel))
            .catch_unwind()
            .instrument(span.clone())
            .await;
        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                TestResult::fail(&case.name, format!("{}: {:#}", category_of(&err), err))
            }
            Err(panic) => {
                TestResult::fail(&case.name, format!("Panic: {}", panic_message(panic.as_ref())))
            }
        };
        span.in_scope(|| {
            if result.is_pass() {
                tracing::info!("{}", result);
            } else {
                tracing::warn!("{}", result);
            }
        });
        result
    }

    async fn execute(
        &self,
        case: &ConformanceTestCase,
        cancel: &CancellationToken,
    ) -> anyhow::Result<TestResult> {
        match &case.check {
            Check::Operation { operation, request, expected } => {
                self.check_operation(case, operation, request, expected, cancel).await
            }
            Check::Http(raw) => self.check_http(case, raw, cancel).await,
        }
    }

    // ------------------------------------------------------------------------
    //  OPERATION FIXTURES
    // ------------------------------------------------------------------------

    async fn check_operation(
        &self,
        case: &ConformanceTestCase,
        operation: &str,
        literal: &TreeValue,
        expected: &Expectation,
        cancel: &CancellationToken,
    ) -> anyhow::Result<TestResult> {
        let contract = self.service.contract();
        let op = contract
            .resolve(operation)
            .cloned()
            .ok_or_else(|| {
                anyhow!("operation '{}' is not part of contract '{}'", operation, contract.name())
            })?;

        let request = self.codec.from_tree(literal, &op.request).context("cannot decode request")?;
        if let Some(failure) = self.check_round_trip(case, literal, &request)? {
            return Ok(failure);
        }

        let selector =
            HeaderValue::from_str(&case.name).context("test name is not a valid header value")?;
        let cx = CallContext::new(cancel.clone())
            .with_header(HeaderName::from_static(TEST_SELECTOR_HEADER), selector);
        let outcome = self.service.call(&op, request, &cx).await;

        match (outcome, expected) {
            (Ok(actual), Expectation::Response(tree)) => {
                self.compare_response(case, &op, &actual, tree)
            }
            (Err(actual), Expectation::Error(tree)) => Ok(compare_error(case, &actual, tree)),
            (Ok(actual), Expectation::Error(tree)) => Ok(TestResult::fail(
                &case.name,
                mismatch("got valid response; expected error", tree, &self.codec.to_tree(&actual)?),
            )),
            (Err(actual), Expectation::Response(tree)) => Ok(TestResult::fail(
                &case.name,
                mismatch("got error; expected valid response", tree, &actual.to_tree()),
            )),
        }
    }

    fn check_round_trip(
        &self,
        case: &ConformanceTestCase,
        literal: &TreeValue,
        request: &Dto,
    ) -> anyhow::Result<Option<TestResult>> {
        let tree = self.codec.to_tree(request).context("cannot encode request")?;
        if tree != *literal {
            let message = mismatch("request does not round-trip", literal, &tree);
            return Ok(Some(TestResult::fail(&case.name, message)));
        }
        for codec in &self.round_trip {
            let bytes = codec
                .encode(request)
                .with_context(|| format!("cannot encode request as {}", codec.name()))?;
            let decoded = codec
                .decode(&bytes, request.shape())
                .with_context(|| format!("cannot decode request as {}", codec.name()))?;
            if !codec.equivalent(&decoded, request) {
                let heading = format!("request does not round-trip through {}", codec.name());
                let message = mismatch(&heading, literal, &self.codec.to_tree(&decoded)?);
                return Ok(Some(TestResult::fail(&case.name, message)));
            }
        }
        Ok(None)
    }

    fn compare_response(
        &self,
        case: &ConformanceTestCase,
        op: &OperationDescriptor,
        actual: &Dto,
        expected: &TreeValue,
    ) -> anyhow::Result<TestResult> {
        let actual_tree = self.codec.to_tree(actual).context("cannot encode response")?;
        let expected_dto = self
            .codec
            .from_tree(expected, &op.response)
            .context("cannot decode expected response")?;
        if actual_tree == *expected && self.codec.equivalent(actual, &expected_dto) {
            return Ok(TestResult::pass(&case.name));
        }
        Ok(TestResult::fail(&case.name, mismatch("response mismatch", expected, &actual_tree)))
    }

    // ------------------------------------------------------------------------
    //  RAW HTTP FIXTURES
    // ------------------------------------------------------------------------

    async fn check_http(
        &self,
        case: &ConformanceTestCase,
        raw: &RawHttpRequest,
        cancel: &CancellationToken,
    ) -> anyhow::Result<TestResult> {
        let transport =
            self.http.as_ref().context("no HTTP transport configured for raw requests")?;

        let mut request = HttpRequest::from_target(raw.method.clone(), &raw.path);
        for (name, value) in &raw.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid header name '{}'", name))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("invalid value for header '{}'", name))?;
            request.headers.append(name, value);
        }
        request.headers.insert(
            HeaderName::from_static(TEST_SELECTOR_HEADER),
            HeaderValue::from_str(&case.name).context("test name is not a valid header value")?,
        );
        request.body = raw.body.clone().map(Into::into);

        let response = transport.send(request, cancel).await.context("raw request failed")?;
        if response.is_success() {
            return Ok(TestResult::pass(&case.name));
        }
        let status = response.status.as_u16();
        let body = response.body_text();
        Ok(TestResult::fail(
            &case.name,
            format!("{} {} returned HTTP {}\n{}", raw.method, raw.path, status, body),
        ))
    }
}

impl std::fmt::Debug for ConformanceTester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConformanceTester")
            .field("fixtures", &self.catalog.len())
            .field("contract", &self.service.contract().name())
            .field("codec", &self.codec.name())
            .field("round_trip", &self.round_trip.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("http", &self.http.is_some())
            .finish()
    }
}

fn compare_error(
    case: &ConformanceTestCase,
    actual: &ServiceError,
    expected: &TreeValue,
) -> TestResult {
    let actual_tree = actual.to_tree();
    let equivalent = ServiceError::from_tree(expected).is_some_and(|e| e.equivalent(actual));
    if actual_tree == *expected && equivalent {
        return TestResult::pass(&case.name);
    }
    TestResult::fail(&case.name, mismatch("error mismatch", expected, &actual_tree))
}

fn mismatch(heading: &str, expected: &TreeValue, actual: &TreeValue) -> String {
    format!("{}\nexpected: {}\nactual: {}", heading, expected.render(), actual.render())
}

fn category_of(err: &anyhow::Error) -> &'static str {
    let root = err.root_cause();
    if root.is::<ServiceError>() {
        "ServiceError"
    } else if root.is::<wirerpc::codec::Error>() {
        "CodecError"
    } else if root.is::<wirerpc::transport::Error>() {
        "TransportError"
    } else if root.is::<http::header::InvalidHeaderValue>()
        || root.is::<http::header::InvalidHeaderName>()
    {
        "HeaderError"
    } else {
        "Error"
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Configures a [`ConformanceTester`].
pub struct TesterBuilder {
    catalog: Arc<Catalog>,
    service: Arc<dyn Service>,
    codec: Arc<dyn Codec>,
    round_trip: Vec<Arc<dyn Codec>>,
    http: Option<Arc<dyn Transport>>,
}

impl TesterBuilder {
    /// The codec whose tree form fixtures are written in. Standard JSON by default.
    pub fn tree_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Also require requests to survive an encode/decode through `codec`.
    pub fn round_trip(mut self, codec: Arc<dyn Codec>) -> Self {
        self.round_trip.push(codec);
        self
    }

    /// Transport for raw HTTP fixtures.
    pub fn http(mut self, transport: Arc<dyn Transport>) -> Self {
        self.http = Some(transport);
        self
    }

    pub fn build(self) -> ConformanceTester {
        ConformanceTester {
            catalog: self.catalog,
            service: self.service,
            codec: self.codec,
            round_trip: self.round_trip,
            http: self.http,
        }
    }
}
