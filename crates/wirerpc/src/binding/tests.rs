use super::*;
use crate::codec::BinaryCodec;
use crate::codec::JsonCodec;
use crate::contract::HttpSpec;
use crate::contract::ResponseSpec;
use crate::fault::ErrorCode;
use crate::shape::FieldShape;

use http::Method;
use serde_json::json;

fn widget_shape() -> Arc<Shape> {
    Shape::new(
        "Widget",
        vec![FieldShape::new("id", FieldType::String).required(), FieldShape::new("name", FieldType::String)],
    )
    .unwrap()
}

fn get_widget() -> Arc<OperationDescriptor> {
    let request = Shape::new(
        "GetWidgetRequest",
        vec![
            FieldShape::new("id", FieldType::String).required(),
            FieldShape::new("verbose", FieldType::Boolean),
            FieldShape::new("tag", FieldType::String),
            FieldShape::new("ifNoneMatch", FieldType::String),
        ],
    )
    .unwrap();
    let response = Shape::new(
        "GetWidgetResponse",
        vec![
            FieldShape::new("widget", FieldType::Dto(widget_shape())),
            FieldShape::new("notModified", FieldType::Boolean),
            FieldShape::new("etag", FieldType::String),
        ],
    )
    .unwrap();
    let http = HttpSpec::get("/widgets/{id}")
        .query("verbose", "verbose")
        .query("tag", "tag")
        .header("ifNoneMatch", "If-None-Match")
        .response(ResponseSpec::status(200).body_field("widget"))
        .response(ResponseSpec::status(304).no_body().flag("notModified"))
        .response_header("etag", "ETag");
    Arc::new(OperationDescriptor { name: "getWidget".into(), request, response, http })
}

fn create_widget() -> Arc<OperationDescriptor> {
    let request = Shape::new(
        "CreateWidgetRequest",
        vec![
            FieldShape::new("name", FieldType::String).required(),
            FieldShape::new("color", FieldType::String),
            FieldShape::new("dryRun", FieldType::Boolean),
        ],
    )
    .unwrap();
    let response = Shape::new(
        "CreateWidgetResponse",
        vec![FieldShape::new("id", FieldType::String), FieldShape::new("name", FieldType::String)],
    )
    .unwrap();
    let http = HttpSpec::post("/widgets")
        .header("dryRun", "X-Dry-Run")
        .body_remaining()
        .response(ResponseSpec::status(201));
    Arc::new(OperationDescriptor { name: "createWidget".into(), request, response, http })
}

fn json_codec() -> JsonCodec {
    JsonCodec::standard()
}

fn json_response(status: u16, body: serde_json::Value) -> HttpResponse {
    HttpResponse::new(StatusCode::from_u16(status).unwrap())
        .with_body("application/json", serde_json::to_vec(&body).unwrap())
}

// ============================================================================
//  RENDER
// ============================================================================

#[test]
fn test_render_omits_absent_and_keeps_empty() {
    let binding = BindingDescriptor::compile(get_widget()).unwrap();
    let op = binding.operation();
    let dto = Dto::new(&op.request).with("id", "red").with("tag", "");

    let request = binding.render_request(&dto, &json_codec(), "application/json").unwrap();
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.path, "/widgets/red");
    assert_eq!(request.query, vec![("tag".to_string(), String::new())]);
    assert!(request.headers.get("If-None-Match").is_none());
    assert!(request.body.is_none());
    assert_eq!(request.header("accept"), Some("application/json"));
}

#[test]
fn test_render_nulls_and_typed_values() {
    let binding = BindingDescriptor::compile(get_widget()).unwrap();
    let op = binding.operation();
    let dto = Dto::new(&op.request)
        .with("id", "a/b c")
        .with("verbose", true)
        .with_null("tag")
        .with("ifNoneMatch", "\"v1\"");

    let request = binding.render_request(&dto, &json_codec(), "application/json").unwrap();
    assert_eq!(request.path, "/widgets/a%2Fb%20c");
    assert_eq!(request.query, vec![("verbose".to_string(), "true".to_string())]);
    assert_eq!(request.header("if-none-match"), Some("\"v1\""));
    assert_eq!(request.target(), "/widgets/a%2Fb%20c?verbose=true");
}

#[test]
fn test_render_requires_path_fields() {
    let binding = BindingDescriptor::compile(get_widget()).unwrap();
    let dto = Dto::new(&binding.operation().request).with("tag", "x");
    let err = binding.render_request(&dto, &json_codec(), "application/json").unwrap_err();
    assert_eq!(err.code(), &ErrorCode::InvalidRequest);
    assert!(err.message().unwrap().contains("'id'"));
}

#[test]
fn test_render_remaining_body() {
    let binding = BindingDescriptor::compile(create_widget()).unwrap();
    let dto = Dto::new(&binding.operation().request)
        .with("name", "Reddy")
        .with("color", "red")
        .with("dryRun", false);

    let request = binding.render_request(&dto, &json_codec(), "application/json").unwrap();
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.header("x-dry-run"), Some("false"));
    assert_eq!(request.content_type(), Some("application/json"));
    let body: serde_json::Value = serde_json::from_slice(request.body.as_deref().unwrap()).unwrap();
    assert_eq!(body, json!({"name": "Reddy", "color": "red"}));
}

// ============================================================================
//  RESOLVE
// ============================================================================

#[test]
fn test_resolve_body_field_and_response_header() {
    let binding = BindingDescriptor::compile(get_widget()).unwrap();
    let response = json_response(200, json!({"id": "red", "name": "Reddy"}))
        .with_header(HeaderName::from_static("etag"), HeaderValue::from_static("v7"));

    let dto = binding.resolve_response(&response, &CodecSet::default()).unwrap();
    let widget = dto.get_dto("widget").unwrap();
    assert_eq!(widget.get_str("name"), Some("Reddy"));
    assert_eq!(dto.get_str("etag"), Some("v7"));
    assert!(!dto.is_present("notModified"));
}

#[test]
fn test_resolve_sets_flags_without_body() {
    let binding = BindingDescriptor::compile(get_widget()).unwrap();
    let response = HttpResponse::new(StatusCode::NOT_MODIFIED);
    let dto = binding.resolve_response(&response, &CodecSet::default()).unwrap();
    assert_eq!(dto.get_bool("notModified"), Some(true));
    assert!(!dto.is_present("widget"));
}

#[test]
fn test_resolve_first_match_wins() {
    let mut op = (*get_widget()).clone();
    op.http.responses.push(ResponseSpec::status(200).no_body().flag("notModified"));
    op.http.responses.swap(1, 2);
    let binding = BindingDescriptor::compile(Arc::new(op)).unwrap();

    let response = json_response(200, json!({"id": "red"}));
    let dto = binding.resolve_response(&response, &CodecSet::default()).unwrap();
    assert!(dto.is_present("widget"));
    assert!(!dto.is_present("notModified"));
}

#[test]
fn test_resolve_synthesizes_error_from_status() {
    let binding = BindingDescriptor::compile(get_widget()).unwrap();
    let response = HttpResponse::new(StatusCode::NOT_FOUND);
    let err = binding.resolve_response(&response, &CodecSet::default()).unwrap_err();
    assert_eq!(err.code(), &ErrorCode::NotFound);
    assert_eq!(err.message(), Some("HTTP 404"));
}

#[test]
fn test_resolve_parses_error_body() {
    let binding = BindingDescriptor::compile(get_widget()).unwrap();
    let response = json_response(409, json!({"code": "WidgetLocked", "message": "held by blue"}));
    let err = binding.resolve_response(&response, &CodecSet::default()).unwrap_err();
    assert_eq!(err.code(), &ErrorCode::Other("WidgetLocked".into()));
    assert_eq!(err.message(), Some("held by blue"));
}

#[test]
fn test_resolve_malformed_error_body_falls_back_to_status() {
    let binding = BindingDescriptor::compile(get_widget()).unwrap();
    let response = HttpResponse::new(StatusCode::BAD_GATEWAY).with_body("text/html", "<html>bad gateway</html>");
    let err = binding.resolve_response(&response, &CodecSet::default()).unwrap_err();
    assert_eq!(err.code(), &ErrorCode::InvalidResponse);
    assert_eq!(err.message(), Some("HTTP 502"));

    let response = HttpResponse::new(StatusCode::SERVICE_UNAVAILABLE).with_body("application/json", "{oops");
    let err = binding.resolve_response(&response, &CodecSet::default()).unwrap_err();
    assert_eq!(err.code(), &ErrorCode::ServiceUnavailable);
}

#[test]
fn test_resolve_content_type_failures() {
    let binding = BindingDescriptor::compile(get_widget()).unwrap();
    let codecs = CodecSet::default();

    let mut missing = json_response(200, json!({"id": "red"}));
    missing.headers.remove(CONTENT_TYPE);
    let err = binding.resolve_response(&missing, &codecs).unwrap_err();
    assert_eq!(err.code(), &ErrorCode::InvalidResponse);
    assert_eq!(err.message(), Some("missing content type"));

    let unsupported = HttpResponse::new(StatusCode::OK).with_body("text/plain", "red");
    let err = binding.resolve_response(&unsupported, &codecs).unwrap_err();
    assert!(err.message().unwrap().starts_with("unsupported content type"));

    let malformed = HttpResponse::new(StatusCode::OK).with_body("application/json", "{\"id\": 7}");
    let err = binding.resolve_response(&malformed, &codecs).unwrap_err();
    assert_eq!(err.code(), &ErrorCode::InvalidResponse);
    assert!(err.message().unwrap().contains("invalid response body"));
}

#[test]
fn test_resolve_unexpected_status() {
    let binding = BindingDescriptor::compile(get_widget()).unwrap();
    let response = HttpResponse::new(StatusCode::FOUND);
    let err = binding.resolve_response(&response, &CodecSet::default()).unwrap_err();
    assert_eq!(err.code(), &ErrorCode::InvalidResponse);
    assert_eq!(err.message(), Some("unexpected HTTP status 302"));
}

#[test]
fn test_resolve_reads_binary_bodies() {
    let binding = BindingDescriptor::compile(get_widget()).unwrap();
    let codec = BinaryCodec::new();
    let widget = Dto::new(&widget_shape()).with("id", "red");
    let response = HttpResponse::new(StatusCode::OK).with_body(codec.media_type(), codec.encode(&widget).unwrap());
    let dto = binding.resolve_response(&response, &CodecSet::default()).unwrap();
    assert!(dto.get_dto("widget").unwrap().equivalent(&widget));
}

// ============================================================================
//  COMPILE
// ============================================================================

fn compile_with(edit: impl FnOnce(&mut HttpSpec)) -> Result<BindingDescriptor> {
    let mut op = (*get_widget()).clone();
    edit(&mut op.http);
    BindingDescriptor::compile(Arc::new(op))
}

#[test]
fn test_compile_rejects_bad_annotations() {
    assert!(matches!(
        compile_with(|h| h.query.push(("nope".into(), "n".into()))),
        Err(Error::UnknownField { field, .. }) if field == "nope"
    ));
    assert!(matches!(
        compile_with(|h| h.query.push(("id".into(), "id".into()))),
        Err(Error::BoundTwice { field, .. }) if field == "id"
    ));
    assert!(matches!(
        compile_with(|h| h.responses[1].flags.push("etag".into())),
        Err(Error::FlagNotBoolean { .. })
    ));
    assert!(matches!(
        compile_with(|h| {
            h.response_headers.clear();
            h.responses[0].body = BodySpec::Field("etag".into());
        }),
        Err(Error::BodyNotDto { .. })
    ));
    assert!(matches!(
        compile_with(|h| h.response_headers.push(("widget".into(), "X-Widget".into()))),
        Err(Error::NotScalar { .. })
    ));
    assert!(matches!(compile_with(|h| h.responses.clear()), Err(Error::NoResponses { .. })));
    assert!(matches!(compile_with(|h| h.path = "/widgets/x{id}".into()), Err(Error::InvalidPath { .. })));
}

// ============================================================================
//  SERVER DIRECTION
// ============================================================================

#[test]
fn test_server_parses_what_client_renders() {
    let binding = BindingDescriptor::compile(get_widget()).unwrap();
    let codecs = CodecSet::default();
    let dto = Dto::new(&binding.operation().request)
        .with("id", "a/b")
        .with("verbose", true)
        .with("ifNoneMatch", "v1");

    let request = binding.render_request(&dto, &json_codec(), &codecs.accept_header()).unwrap();
    let captures = binding.matches(&request).unwrap();
    let parsed = binding.parse_request(&request, &captures, &codecs).unwrap();
    assert!(parsed.equivalent(&dto));

    let other = HttpRequest::new(Method::POST, "/widgets/red");
    assert!(binding.matches(&other).is_none());
}

#[test]
fn test_server_parses_remaining_body() {
    let binding = BindingDescriptor::compile(create_widget()).unwrap();
    let codecs = CodecSet::default();
    let dto = Dto::new(&binding.operation().request).with("name", "Reddy").with("dryRun", true);

    let request = binding.render_request(&dto, &BinaryCodec::new(), "application/json").unwrap();
    let captures = binding.matches(&request).unwrap();
    let parsed = binding.parse_request(&request, &captures, &codecs).unwrap();
    assert!(parsed.equivalent(&dto));

    let mut bad = request.clone();
    bad.body = Some("{}".into());
    bad.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let err = binding.parse_request(&bad, &captures, &codecs).unwrap_err();
    assert_eq!(err.code(), &ErrorCode::InvalidRequest);
}

#[test]
fn test_select_mapping_and_render_response() {
    let binding = BindingDescriptor::compile(get_widget()).unwrap();
    let shape = &binding.operation().response;

    let not_modified = Dto::new(shape).with("notModified", true).with("etag", "v2");
    let response = binding.render_response(&not_modified, &json_codec()).unwrap();
    assert_eq!(response.status, StatusCode::NOT_MODIFIED);
    assert!(response.body.is_empty());
    assert_eq!(response.header("etag"), Some("v2"));

    let found = Dto::new(shape).with("widget", Dto::new(&widget_shape()).with("id", "red"));
    let response = binding.render_response(&found, &json_codec()).unwrap();
    assert_eq!(response.status, StatusCode::OK);
    let round = binding.resolve_response(&response, &CodecSet::default()).unwrap();
    assert!(round.equivalent(&found));
}

#[test]
fn test_render_error() {
    let response = render_error(&ServiceError::not_found("no widget 'red'"), &json_codec());
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body, json!({"code": "NotFound", "message": "no widget 'red'"}));

    let response = render_error(&ServiceError::not_modified(), &json_codec());
    assert_eq!(response.status, StatusCode::NOT_MODIFIED);
    assert!(response.body.is_empty());
}

#[test]
fn test_binding_table_routes() {
    let contract = ServiceContract::builder("widgets")
        .operation("getWidget", get_widget().request.clone(), get_widget().response.clone(), get_widget().http.clone())
        .operation(
            "createWidget",
            create_widget().request.clone(),
            create_widget().response.clone(),
            create_widget().http.clone(),
        )
        .build()
        .unwrap();
    let table = BindingTable::compile(&contract).unwrap();

    assert_eq!(table.get("CreateWidget").unwrap().operation().name, "createWidget");
    let request = HttpRequest::from_target(Method::GET, "/widgets/red?verbose=false");
    let (binding, captures) = table.route(&request).unwrap();
    assert_eq!(binding.operation().name, "getWidget");
    assert_eq!(captures, vec![("id".to_string(), "red".to_string())]);
    assert!(table.route(&HttpRequest::new(Method::DELETE, "/widgets/red")).is_none());
}
