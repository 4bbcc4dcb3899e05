use super::*;
use crate::dto::FieldValue;
use crate::shape::FieldShape;
use crate::shape::FieldType;

use indexmap::IndexMap;
use serde_json::json;
use time::OffsetDateTime;

fn part_shape() -> Arc<Shape> {
    Shape::new(
        "Part",
        vec![FieldShape::new("sku", FieldType::String).required(), FieldShape::new("qty", FieldType::Int32)],
    )
    .unwrap()
}

fn order_shape() -> Arc<Shape> {
    Shape::new(
        "Order",
        vec![
            FieldShape::new("id", FieldType::String).required(),
            FieldShape::new("total", FieldType::Int64),
            FieldShape::new("ratio", FieldType::Double),
            FieldShape::new("paid", FieldType::Boolean),
            FieldShape::new("placed", FieldType::Timestamp),
            FieldShape::new("blob", FieldType::Bytes),
            FieldShape::new("state", FieldType::enumeration(["open", "closed"])),
            FieldShape::new("note", FieldType::String).nullable(),
            FieldShape::new("parts", FieldType::list(FieldType::Dto(part_shape()))),
            FieldShape::new("attrs", FieldType::map(FieldType::String)),
            FieldShape::new("extra", FieldType::Object),
        ],
    )
    .unwrap()
}

fn sample_order() -> Dto {
    let shape = order_shape();
    let part = Dto::new(&part_shape()).with("sku", "bolt").with("qty", 4);
    let mut attrs = IndexMap::new();
    attrs.insert("color".to_string(), FieldValue::from("red"));
    attrs.insert("gone".to_string(), FieldValue::Null);
    Dto::new(&shape)
        .with("id", "o-1")
        .with("total", 9_007_199_254_740_993i64)
        .with("ratio", 0.25)
        .with("paid", false)
        .with("placed", OffsetDateTime::from_unix_timestamp(1_714_566_600).unwrap())
        .with("blob", vec![0u8, 1, 2, 255])
        .with("state", FieldValue::Enum("open".into()))
        .with_null("note")
        .with("parts", FieldValue::List(vec![FieldValue::Dto(part)]))
        .with("attrs", FieldValue::Map(attrs))
        .with("extra", FieldValue::Object(TreeValue::from(json!({"k": [1, "two"], "none": null}))))
}

fn all_codecs() -> Vec<Arc<dyn Codec>> {
    vec![Arc::new(JsonCodec::standard()), Arc::new(JsonCodec::legacy()), Arc::new(BinaryCodec::new())]
}

// ============================================================================
//  ROUND TRIP
// ============================================================================

#[test]
fn test_round_trip_every_codec() -> Result<()> {
    let dto = sample_order();
    for codec in all_codecs() {
        let bytes = codec.encode(&dto)?;
        let back = codec.decode(&bytes, dto.shape())?;
        assert!(codec.equivalent(&back, &dto), "{} round trip", codec.name());
        assert!(back.equivalent(&codec.canonicalize(&dto)), "{} canonical form", codec.name());
    }
    Ok(())
}

#[test]
fn test_tree_round_trip_every_codec() -> Result<()> {
    let dto = sample_order();
    for codec in all_codecs() {
        let tree = codec.to_tree(&dto)?;
        let back = codec.from_tree(&tree, dto.shape())?;
        assert!(codec.equivalent(&back, &dto), "{} tree round trip", codec.name());
    }
    Ok(())
}

#[test]
fn test_absent_null_and_default_survive_standard_json() -> Result<()> {
    let codec = JsonCodec::standard();
    let shape = order_shape();
    let absent = Dto::new(&shape).with("id", "a");
    let null = absent.clone().with_null("note");
    let empty = absent.clone().with("note", "");

    for dto in [&absent, &null, &empty] {
        let back = codec.decode(&codec.encode(dto)?, &shape)?;
        assert_eq!(&back, dto);
    }
    Ok(())
}

#[test]
fn test_binary_keeps_bytes_raw() -> Result<()> {
    let codec = BinaryCodec::new();
    let dto = Dto::new(&order_shape()).with("id", "b").with("blob", vec![9u8, 8, 7]);
    let tree = codec.to_tree(&dto)?;
    assert_eq!(tree.get("blob"), Some(&TreeValue::Bytes(vec![9, 8, 7])));

    let json_tree = JsonCodec::standard().to_tree(&dto)?;
    assert_eq!(json_tree.get("blob"), Some(&TreeValue::from("CQgH")));
    Ok(())
}

// ============================================================================
//  LEGACY JSON
// ============================================================================

#[test]
fn test_legacy_sorts_keys_and_drops_nulls() -> Result<()> {
    let codec = JsonCodec::legacy();
    let dto = Dto::new(&order_shape()).with("paid", true).with("id", "x").with_null("note").with("total", 5i64);
    let text = String::from_utf8(codec.encode(&dto)?).unwrap();
    assert_eq!(text, r#"{"id":"x","paid":true,"total":"5"}"#);
    assert!(!codec.properties().preserves_null);
    Ok(())
}

#[test]
fn test_legacy_reads_keys_ignoring_case() -> Result<()> {
    let codec = JsonCodec::legacy();
    let dto = codec.decode(br#"{"ID":"x","Total":"12","Paid":true}"#, &order_shape())?;
    assert_eq!(dto.get_str("id"), Some("x"));
    assert_eq!(dto.get("total"), Some(&FieldValue::Int64(12)));
    assert_eq!(dto.get_bool("paid"), Some(true));

    // standard json is exact about names
    let err = JsonCodec::standard().decode(br#"{"ID":"x"}"#, &order_shape()).unwrap_err();
    assert!(matches!(err, Error::MalformedPayload(msg) if msg.contains("missing required field 'id'")));
    Ok(())
}

#[test]
fn test_legacy_accepts_text_json() {
    assert!(JsonCodec::legacy().accepts("text/json; charset=utf-8"));
    assert!(!JsonCodec::standard().accepts("text/json"));
    assert!(JsonCodec::standard().accepts("Application/JSON; charset=utf-8"));
}

#[test]
fn test_legacy_tree_matches_wire_for_nested_nulls() -> Result<()> {
    let codec = JsonCodec::legacy();
    let dto = sample_order();
    let tree = codec.to_tree(&dto)?;
    assert_eq!(tree.get("attrs"), Some(&TreeValue::from(json!({"color": "red"}))));
    assert_eq!(tree.get("extra"), Some(&TreeValue::from(json!({"k": [1, "two"]}))));

    let wire = codec.read_tree(&codec.encode(&dto)?)?;
    assert_eq!(wire.get("attrs"), tree.get("attrs"));
    assert_eq!(wire.get("extra"), tree.get("extra"));
    assert!(codec.equivalent(&codec.decode(&codec.encode(&dto)?, dto.shape())?, &dto));
    Ok(())
}

// ============================================================================
//  MALFORMED INPUT
// ============================================================================

#[test]
fn test_malformed_payloads() {
    let shape = order_shape();
    let json = JsonCodec::standard();

    assert!(matches!(json.decode(b"{not json", &shape), Err(Error::MalformedPayload(_))));
    assert!(matches!(json.decode(b"[1,2]", &shape), Err(Error::MalformedPayload(_))));
    assert!(matches!(json.decode(br#"{"id":"x","paid":"maybe"}"#, &shape), Err(Error::MalformedPayload(_))));
    assert!(matches!(
        json.decode(br#"{"id":"x","parts":[{"qty":1}]}"#, &shape),
        Err(Error::MalformedPayload(msg)) if msg.contains("sku")
    ));

    let binary = BinaryCodec::new();
    assert!(matches!(binary.decode(&[0xff, 0x00], &shape), Err(Error::MalformedPayload(_))));
}

#[test]
fn test_nesting_is_bounded() {
    let mut value = json!("leaf");
    for _ in 0..(MAX_DEPTH + 2) {
        value = json!([value]);
    }
    let tree = TreeValue::from(value);
    let codec = BinaryCodec::new();
    assert!(matches!(codec.write_tree(&tree), Err(Error::Unrepresentable(_))));
}

#[test]
fn test_unknown_properties_ignored() -> Result<()> {
    let dto = JsonCodec::standard().decode(br#"{"id":"x","surprise":[1,2,3]}"#, &order_shape())?;
    assert!(dto.equivalent(&Dto::new(&order_shape()).with("id", "x")));
    Ok(())
}

#[test]
fn test_non_finite_double_has_no_json_form() {
    let dto = Dto::new(&order_shape()).with("id", "x").with("ratio", f64::NAN);
    assert!(matches!(JsonCodec::standard().encode(&dto), Err(Error::Unrepresentable(_))));
    assert!(BinaryCodec::new().encode(&dto).is_ok());
}

// ============================================================================
//  CODEC SET
// ============================================================================

#[test]
fn test_codec_set_prefers_primary() {
    let set = CodecSet::new(Arc::new(JsonCodec::standard()))
        .with(Arc::new(JsonCodec::legacy()))
        .with(Arc::new(BinaryCodec::new()));

    assert_eq!(set.for_media_type("application/json").map(|c| c.name()), Some("json"));
    assert_eq!(set.for_media_type("text/json").map(|c| c.name()), Some("legacy-json"));
    assert_eq!(set.for_media_type("application/x-wirepack").map(|c| c.name()), Some("wirepack"));
    assert!(set.for_media_type("text/plain").is_none());
    assert_eq!(set.accept_header(), "application/json, application/x-wirepack");
}

#[test]
fn test_codec_set_negotiates_accept() {
    let set = CodecSet::default();
    assert_eq!(set.negotiate(None).name(), "json");
    assert_eq!(set.negotiate(Some("application/x-wirepack, application/json")).name(), "wirepack");
    assert_eq!(set.negotiate(Some("*/*")).name(), "json");
    assert_eq!(set.negotiate(Some("text/html")).name(), "json");
}
