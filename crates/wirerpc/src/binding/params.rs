//! Canonical string forms of scalar fields for paths, query parameters and
//! headers.
//!
//! Numbers use invariant formatting, booleans are `true`/`false`, timestamps
//! are RFC 3339, enums are their wire strings and bytes are base64.

use base64::Engine as _;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::dto::FieldValue;
use crate::shape::FieldType;

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Formats a scalar value. `Ok(None)` for null.
pub fn format_scalar(value: &FieldValue) -> Result<Option<String>, String> {
    let text = match value {
        FieldValue::Null => return Ok(None),
        FieldValue::String(s) | FieldValue::Enum(s) => s.clone(),
        FieldValue::Boolean(b) => b.to_string(),
        FieldValue::Int32(v) => v.to_string(),
        FieldValue::Int64(v) => v.to_string(),
        FieldValue::Double(v) if v.is_nan() => "NaN".to_string(),
        FieldValue::Double(v) if v.is_infinite() => {
            if *v > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
        }
        FieldValue::Double(v) => v.to_string(),
        FieldValue::Timestamp(ts) => ts.format(&Rfc3339).map_err(|e| e.to_string())?,
        FieldValue::Bytes(b) => BASE64.encode(b),
        FieldValue::Object(_) | FieldValue::Dto(_) | FieldValue::List(_) | FieldValue::Map(_) => {
            return Err("structured values have no single-string form".to_string());
        }
    };
    Ok(Some(text))
}

/// Parses the canonical string form of a scalar of type `ty`.
pub fn parse_scalar(text: &str, ty: &FieldType) -> Result<FieldValue, String> {
    match ty {
        FieldType::String => Ok(FieldValue::String(text.to_string())),
        FieldType::Enum(_) => Ok(FieldValue::Enum(text.to_string())),
        FieldType::Boolean => match text.to_ascii_lowercase().as_str() {
            "true" => Ok(FieldValue::Boolean(true)),
            "false" => Ok(FieldValue::Boolean(false)),
            _ => Err(format!("'{}' is not a boolean", text)),
        },
        FieldType::Int32 => text
            .parse()
            .map(FieldValue::Int32)
            .map_err(|e| format!("'{}' is not an int32: {}", text, e)),
        FieldType::Int64 => text
            .parse()
            .map(FieldValue::Int64)
            .map_err(|e| format!("'{}' is not an int64: {}", text, e)),
        FieldType::Double => text
            .parse()
            .map(FieldValue::Double)
            .map_err(|e| format!("'{}' is not a number: {}", text, e)),
        FieldType::Timestamp => OffsetDateTime::parse(text, &Rfc3339)
            .map(FieldValue::Timestamp)
            .map_err(|e| format!("'{}' is not an RFC 3339 timestamp: {}", text, e)),
        FieldType::Bytes => BASE64
            .decode(text)
            .map(FieldValue::Bytes)
            .map_err(|e| format!("'{}' is not base64: {}", text, e)),
        other => Err(format!("{} has no single-string form", other.describe())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_forms() {
        assert_eq!(format_scalar(&FieldValue::Double(1.5)).unwrap().as_deref(), Some("1.5"));
        assert_eq!(format_scalar(&FieldValue::Int64(-7)).unwrap().as_deref(), Some("-7"));
        assert_eq!(format_scalar(&FieldValue::Boolean(true)).unwrap().as_deref(), Some("true"));
        assert_eq!(format_scalar(&FieldValue::Enum("open".into())).unwrap().as_deref(), Some("open"));
        assert_eq!(format_scalar(&FieldValue::Bytes(vec![1, 2])).unwrap().as_deref(), Some("AQI="));
        assert_eq!(format_scalar(&FieldValue::Null).unwrap(), None);
        let ts = OffsetDateTime::from_unix_timestamp(0).unwrap();
        assert_eq!(format_scalar(&FieldValue::Timestamp(ts)).unwrap().as_deref(), Some("1970-01-01T00:00:00Z"));
    }

    #[test]
    fn test_parse_scalars() {
        assert_eq!(parse_scalar("42", &FieldType::Int32), Ok(FieldValue::Int32(42)));
        assert_eq!(parse_scalar("TRUE", &FieldType::Boolean), Ok(FieldValue::Boolean(true)));
        assert_eq!(parse_scalar("Infinity", &FieldType::Double), Ok(FieldValue::Double(f64::INFINITY)));
        assert!(parse_scalar("4x", &FieldType::Int64).is_err());
        assert!(parse_scalar("x", &FieldType::Object).is_err());
    }
}
