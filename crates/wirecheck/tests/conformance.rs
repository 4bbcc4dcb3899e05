//! End-to-end conformance runs against in-process services.

use std::sync::Arc;

use http::Method;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wirecheck::Catalog;
use wirecheck::ConformanceTestCase;
use wirecheck::ConformanceTester;
use wirecheck::FixtureService;
use wirecheck::TEST_SELECTOR_HEADER;
use wirecheck::TestStatus;
use wirerpc::CallContext;
use wirerpc::Client;
use wirerpc::Dto;
use wirerpc::ErrorCode;
use wirerpc::FieldShape;
use wirerpc::FieldType;
use wirerpc::HttpHandler;
use wirerpc::HttpSpec;
use wirerpc::ResponseSpec;
use wirerpc::Service;
use wirerpc::ServiceContract;
use wirerpc::ServiceError;
use wirerpc::ServiceRegistry;
use wirerpc::Shape;
use wirerpc::codec::BinaryCodec;
use wirerpc::codec::JsonCodec;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn widget_shape() -> Arc<Shape> {
    Shape::new(
        "Widget",
        vec![FieldShape::new("id", FieldType::String).required(), FieldShape::new("name", FieldType::String)],
    )
    .unwrap()
}

fn widget_contract() -> Arc<ServiceContract> {
    let request = Shape::new(
        "GetWidgetRequest",
        vec![FieldShape::new("id", FieldType::String).required(), FieldShape::new("verbose", FieldType::Boolean)],
    )
    .unwrap();
    let response = Shape::new("GetWidgetResponse", vec![FieldShape::new("widget", FieldType::Dto(widget_shape()))])
        .unwrap();
    ServiceContract::builder("widgets")
        .operation(
            "getWidget",
            request,
            response,
            HttpSpec::get("/widgets/{id}")
                .query("verbose", "verbose")
                .response(ResponseSpec::status(200).body_field("widget")),
        )
        .build()
        .unwrap()
}

/// A widget service that names every widget `name`, except `missing`
/// (not found) and `boom` (panics).
fn widget_service(contract: &Arc<ServiceContract>, name: &'static str) -> Arc<dyn Service> {
    let op = Arc::clone(contract.resolve("getWidget").unwrap());
    let registry = ServiceRegistry::builder(contract)
        .operation("getWidget", move |request: Dto, _cx| {
            let op = Arc::clone(&op);
            async move {
                let id = request.get_str("id").unwrap_or_default().to_string();
                match id.as_str() {
                    "missing" => Err(ServiceError::not_found("no widget 'missing'")),
                    "boom" => panic!("widget exploded"),
                    _ => {
                        let widget = Dto::new(&widget_shape()).with("id", id.as_str()).with("name", name);
                        Ok(Dto::new(&op.response).with("widget", widget))
                    }
                }
            }
        })
        .build()
        .unwrap();
    Arc::new(registry)
}

fn catalog() -> Arc<Catalog> {
    let catalog = Catalog::from_value(json!({ "tests": [
        { "name": "basicGet", "operation": "getWidget",
          "request": { "id": "red" },
          "response": { "widget": { "id": "red", "name": "Reddy" } } },
        { "name": "verboseGet", "operation": "GetWidget",
          "request": { "id": "blue", "verbose": true },
          "response": { "widget": { "id": "blue", "name": "Reddy" } } },
        { "name": "missingWidget", "operation": "getWidget",
          "request": { "id": "missing" },
          "error": { "code": "NotFound", "message": "no widget 'missing'" } }
    ]}))
    .unwrap();
    Arc::new(catalog)
}

#[tokio::test]
async fn test_matching_service_passes() {
    init_tracing();
    let contract = widget_contract();
    let tester = ConformanceTester::builder(catalog(), widget_service(&contract, "Reddy"))
        .round_trip(Arc::new(BinaryCodec::new()))
        .round_trip(Arc::new(JsonCodec::legacy()))
        .build();

    let run = tester.run_all(&CancellationToken::new()).await;
    assert!(run.all_passed(), "{}", run);
    assert_eq!(run.passed(), 3);
    let names: Vec<_> = run.results().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["basicGet", "verboseGet", "missingWidget"]);
}

#[tokio::test]
async fn test_wrong_response_fails_with_both_trees() {
    let contract = widget_contract();
    let tester = ConformanceTester::builder(catalog(), widget_service(&contract, "WRONG")).build();

    let result = tester.run_test("basicGet", &CancellationToken::new()).await;
    assert_eq!(result.status, TestStatus::Fail);
    let message = result.message.unwrap();
    assert!(message.starts_with("response mismatch"), "{}", message);
    assert!(message.contains("Reddy"));
    assert!(message.contains("WRONG"));
}

#[tokio::test]
async fn test_success_when_error_expected() {
    let contract = widget_contract();
    let catalog = Catalog::from_value(json!([
        { "name": "expectNotFound", "operation": "getWidget",
          "request": { "id": "red" }, "error": { "code": "NotFound" } },
        { "name": "expectWidget", "operation": "getWidget",
          "request": { "id": "missing" }, "response": { "widget": { "id": "missing" } } }
    ]))
    .unwrap();
    let tester = ConformanceTester::builder(Arc::new(catalog), widget_service(&contract, "Reddy")).build();

    let run = tester.run_all(&CancellationToken::new()).await;
    assert_eq!(run.failed(), 2);
    let first = run.get("expectNotFound").unwrap().message.clone().unwrap();
    assert!(first.starts_with("got valid response; expected error"), "{}", first);
    assert!(first.contains("NotFound") && first.contains("Reddy"));
    let second = run.get("expectWidget").unwrap().message.clone().unwrap();
    assert!(second.starts_with("got error; expected valid response"), "{}", second);
}

#[tokio::test]
async fn test_subset_with_unknown_name() {
    let contract = widget_contract();
    let tester = ConformanceTester::builder(catalog(), widget_service(&contract, "Reddy")).build();

    let run = tester.run_tests(&["missingWidget", "noSuchTest", "basicGet"], &CancellationToken::new()).await;
    let statuses: Vec<_> = run.results().iter().map(|r| (r.name.as_str(), r.status)).collect();
    assert_eq!(
        statuses,
        [("missingWidget", TestStatus::Pass), ("noSuchTest", TestStatus::Fail), ("basicGet", TestStatus::Pass)]
    );
    assert_eq!(run.get("noSuchTest").unwrap().message.as_deref(), Some("no test named 'noSuchTest'"));
}

#[tokio::test]
async fn test_runs_are_idempotent() {
    let contract = widget_contract();
    let tester = ConformanceTester::builder(catalog(), widget_service(&contract, "WRONG")).build();

    let first = tester.run_all(&CancellationToken::new()).await;
    let second = tester.run_all(&CancellationToken::new()).await;
    assert_eq!(first, second);
    assert_eq!(first.failed(), 2);
}

#[tokio::test]
async fn test_misbehaving_fixtures_fail_without_aborting() {
    init_tracing();
    let contract = widget_contract();
    let catalog = Catalog::new(vec![
        ConformanceTestCase::operation(
            "explodes",
            "getWidget",
            json!({ "id": "boom" }).into(),
            wirecheck::catalog::Expectation::Response(json!({}).into()),
        ),
        ConformanceTestCase::operation(
            "unknownOperation",
            "listWidgets",
            json!({}).into(),
            wirecheck::catalog::Expectation::Response(json!({}).into()),
        ),
        ConformanceTestCase::operation(
            "lossyRequest",
            "getWidget",
            json!({ "id": "red", "color": "blue" }).into(),
            wirecheck::catalog::Expectation::Response(json!({}).into()),
        ),
        ConformanceTestCase::http("noTransport", Method::GET, "/widgets/red"),
        ConformanceTestCase::operation(
            "basicGet",
            "getWidget",
            json!({ "id": "red" }).into(),
            wirecheck::catalog::Expectation::Response(json!({ "widget": { "id": "red", "name": "Reddy" } }).into()),
        ),
    ])
    .unwrap();
    let tester = ConformanceTester::builder(Arc::new(catalog), widget_service(&contract, "Reddy")).build();

    let run = tester.run_all(&CancellationToken::new()).await;
    assert_eq!(run.results().len(), 5);
    assert_eq!(run.failed(), 4);
    assert!(run.get("basicGet").unwrap().is_pass());

    let message = |name: &str| run.get(name).unwrap().message.clone().unwrap();
    assert_eq!(message("explodes"), "Panic: widget exploded");
    assert!(message("unknownOperation").starts_with("Error: operation 'listWidgets' is not part of contract"));
    assert!(message("lossyRequest").starts_with("request does not round-trip"));
    assert!(message("noTransport").contains("no HTTP transport configured"));
}

#[tokio::test]
async fn test_raw_http_fixtures() {
    let contract = widget_contract();
    let handler = HttpHandler::new(widget_service(&contract, "Reddy")).unwrap();
    let catalog = Catalog::from_value(json!([
        { "name": "fetchRed", "httpRequest": { "method": "GET", "path": "/widgets/red?verbose=true" } },
        { "name": "fetchMissing", "httpRequest": { "method": "GET", "path": "/widgets/missing" } }
    ]))
    .unwrap();
    let tester = ConformanceTester::builder(Arc::new(catalog), widget_service(&contract, "Reddy"))
        .http(Arc::new(handler))
        .build();

    let run = tester.run_all(&CancellationToken::new()).await;
    assert!(run.get("fetchRed").unwrap().is_pass());
    let missing = run.get("fetchMissing").unwrap();
    assert_eq!(missing.status, TestStatus::Fail);
    let message = missing.message.as_deref().unwrap();
    assert!(message.contains("HTTP 404"), "{}", message);
    assert!(message.contains("no widget 'missing'"), "{}", message);
}

#[tokio::test]
async fn test_fixture_service_over_the_wire() {
    init_tracing();
    let contract = widget_contract();
    let catalog = catalog();
    let stub = Arc::new(FixtureService::new(&contract, Arc::clone(&catalog)));
    let handler = HttpHandler::new(stub).unwrap();
    let client = Client::builder(&contract, Arc::new(handler)).build().unwrap();

    let tester = ConformanceTester::builder(catalog, Arc::new(client)).build();
    let run = tester.run_all(&CancellationToken::new()).await;
    assert!(run.all_passed(), "{}", run);
    assert_eq!(run.exit_code(), 0);
}

#[tokio::test]
async fn test_fixture_service_requires_selector() {
    let contract = widget_contract();
    let stub = FixtureService::new(&contract, catalog());
    let op = Arc::clone(contract.resolve("getWidget").unwrap());
    let request = Dto::new(&op.request).with("id", "red");

    let err = stub.call(&op, request.clone(), &CallContext::default()).await.unwrap_err();
    assert_eq!(err.code(), &ErrorCode::InvalidRequest);
    assert!(err.message().unwrap().contains(TEST_SELECTOR_HEADER));

    let cx = CallContext::default().with_header(
        http::HeaderName::from_static(TEST_SELECTOR_HEADER),
        http::HeaderValue::from_static("missingWidget"),
    );
    let err = stub.call(&op, request, &cx).await.unwrap_err();
    assert_eq!(err.code(), &ErrorCode::InvalidRequest);
    assert_eq!(err.message(), Some("unexpected request for test 'missingWidget'"));
}
