//! Conversion between DTO values and trees, parameterised by [`TreeStyle`].
//!
//! Reading is lenient about representation so that a tree produced by one
//! format can be read back under another: bytes accept raw leaves or base64
//! strings, integers accept numeric strings, timestamps are RFC 3339 strings.

use std::sync::Arc;

use base64::Engine as _;
use indexmap::IndexMap;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::Error;
use super::MAX_DEPTH;
use super::Result;
use super::TreeStyle;
use crate::dto::Dto;
use crate::dto::FieldValue;
use crate::shape::FieldType;
use crate::shape::Shape;
use crate::tree::Number;
use crate::tree::TreeValue;

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

pub(super) fn to_tree(dto: &Dto, style: &TreeStyle) -> Result<TreeValue> {
    dto_to_tree(dto, style, 0)
}

pub(super) fn from_tree(tree: &TreeValue, shape: &Arc<Shape>, style: &TreeStyle) -> Result<Dto> {
    dto_from_tree(tree, shape, style, 0)
}

fn dto_to_tree(dto: &Dto, style: &TreeStyle, depth: usize) -> Result<TreeValue> {
    if depth > MAX_DEPTH {
        return Err(Error::Unrepresentable(format!("nesting deeper than {} levels", MAX_DEPTH)));
    }
    let mut map = IndexMap::new();
    for (name, value) in dto.fields_in_order() {
        let tree = value_to_tree(value, style, depth + 1)?;
        if matches!(tree, TreeValue::Null) && !style.emit_null {
            continue;
        }
        map.insert(name.to_string(), tree);
    }
    Ok(TreeValue::Map(map))
}

fn value_to_tree(value: &FieldValue, style: &TreeStyle, depth: usize) -> Result<TreeValue> {
    if depth > MAX_DEPTH {
        return Err(Error::Unrepresentable(format!("nesting deeper than {} levels", MAX_DEPTH)));
    }
    Ok(match value {
        FieldValue::Null => TreeValue::Null,
        FieldValue::String(s) | FieldValue::Enum(s) => TreeValue::String(s.clone()),
        FieldValue::Boolean(b) => TreeValue::Bool(*b),
        FieldValue::Int32(v) => TreeValue::Number(Number::Int(i64::from(*v))),
        FieldValue::Int64(v) if style.int64_as_string => TreeValue::String(v.to_string()),
        FieldValue::Int64(v) => TreeValue::Number(Number::Int(*v)),
        FieldValue::Double(v) => TreeValue::Number(Number::Float(*v)),
        FieldValue::Timestamp(ts) => TreeValue::String(format_timestamp(ts)?),
        FieldValue::Bytes(b) if style.bytes_as_base64 => TreeValue::String(BASE64.encode(b)),
        FieldValue::Bytes(b) => TreeValue::Bytes(b.clone()),
        FieldValue::Object(tree) if style.emit_null => tree.clone(),
        FieldValue::Object(tree) => tree.without_null_entries(),
        FieldValue::Dto(dto) => dto_to_tree(dto, style, depth + 1)?,
        FieldValue::List(items) => TreeValue::List(
            items.iter().map(|v| value_to_tree(v, style, depth + 1)).collect::<Result<_>>()?,
        ),
        FieldValue::Map(map) => {
            let mut entries = IndexMap::with_capacity(map.len());
            for (key, value) in map {
                let tree = value_to_tree(value, style, depth + 1)?;
                if matches!(tree, TreeValue::Null) && !style.emit_null {
                    continue;
                }
                entries.insert(key.clone(), tree);
            }
            TreeValue::Map(entries)
        }
    })
}

/// RFC 3339 rendering of a timestamp.
pub(crate) fn format_timestamp(ts: &OffsetDateTime) -> Result<String> {
    ts.format(&Rfc3339).map_err(|e| Error::Unrepresentable(format!("timestamp: {}", e)))
}

fn dto_from_tree(tree: &TreeValue, shape: &Arc<Shape>, style: &TreeStyle, depth: usize) -> Result<Dto> {
    if depth > MAX_DEPTH {
        return Err(Error::MalformedPayload(format!("nesting deeper than {} levels", MAX_DEPTH)));
    }
    let TreeValue::Map(entries) = tree else {
        return Err(Error::MalformedPayload(format!(
            "expected an object for {}, found {}",
            shape.name(),
            tree.kind()
        )));
    };

    let mut dto = Dto::new(shape);
    for (key, value) in entries {
        let field = if style.case_insensitive_keys {
            shape.field_ignore_case(key)
        } else {
            shape.field(key)
        };
        // unknown properties are ignored
        let Some(field) = field else { continue };

        if matches!(value, TreeValue::Null) {
            if field.nullable {
                dto.set(field.name.clone(), FieldValue::Null);
            }
            continue;
        }
        let decoded = value_from_tree(value, &field.ty, style, depth + 1)
            .map_err(|e| in_field(e, shape.name(), &field.name))?;
        dto.set(field.name.clone(), decoded);
    }

    for field in shape.fields().iter().filter(|f| f.required) {
        if !dto.is_present(&field.name) {
            return Err(Error::MalformedPayload(format!(
                "missing required field '{}' of {}",
                field.name,
                shape.name()
            )));
        }
    }
    Ok(dto)
}

fn in_field(err: Error, shape: &str, field: &str) -> Error {
    match err {
        Error::MalformedPayload(msg) => Error::MalformedPayload(format!("{}.{}: {}", shape, field, msg)),
        other => other,
    }
}

fn mismatch(ty: &FieldType, tree: &TreeValue) -> Error {
    Error::MalformedPayload(format!("expected {}, found {}", ty.describe(), tree.kind()))
}

fn integral(tree: &TreeValue, ty: &FieldType) -> Result<i128> {
    match tree {
        TreeValue::Number(n) => n.as_i128().ok_or_else(|| mismatch(ty, tree)),
        TreeValue::String(s) => s
            .trim()
            .parse::<i128>()
            .map_err(|_| Error::MalformedPayload(format!("'{}' is not an integer", s))),
        _ => Err(mismatch(ty, tree)),
    }
}

fn value_from_tree(tree: &TreeValue, ty: &FieldType, style: &TreeStyle, depth: usize) -> Result<FieldValue> {
    if depth > MAX_DEPTH {
        return Err(Error::MalformedPayload(format!("nesting deeper than {} levels", MAX_DEPTH)));
    }
    if matches!(tree, TreeValue::Null) {
        return Ok(FieldValue::Null);
    }

    match ty {
        FieldType::String => match tree {
            TreeValue::String(s) => Ok(FieldValue::String(s.clone())),
            _ => Err(mismatch(ty, tree)),
        },
        FieldType::Enum(_) => match tree {
            TreeValue::String(s) => Ok(FieldValue::Enum(s.clone())),
            _ => Err(mismatch(ty, tree)),
        },
        FieldType::Boolean => match tree {
            TreeValue::Bool(b) => Ok(FieldValue::Boolean(*b)),
            TreeValue::String(s) if s == "true" => Ok(FieldValue::Boolean(true)),
            TreeValue::String(s) if s == "false" => Ok(FieldValue::Boolean(false)),
            _ => Err(mismatch(ty, tree)),
        },
        FieldType::Int32 => {
            let v = integral(tree, ty)?;
            i32::try_from(v)
                .map(FieldValue::Int32)
                .map_err(|_| Error::MalformedPayload(format!("{} is out of range for int32", v)))
        }
        FieldType::Int64 => {
            let v = integral(tree, ty)?;
            i64::try_from(v)
                .map(FieldValue::Int64)
                .map_err(|_| Error::MalformedPayload(format!("{} is out of range for int64", v)))
        }
        FieldType::Double => match tree {
            TreeValue::Number(n) => Ok(FieldValue::Double(n.as_f64())),
            TreeValue::String(s) => s
                .trim()
                .parse::<f64>()
                .map(FieldValue::Double)
                .map_err(|_| Error::MalformedPayload(format!("'{}' is not a number", s))),
            _ => Err(mismatch(ty, tree)),
        },
        FieldType::Timestamp => match tree {
            TreeValue::String(s) => OffsetDateTime::parse(s, &Rfc3339)
                .map(FieldValue::Timestamp)
                .map_err(|e| Error::MalformedPayload(format!("'{}' is not an RFC 3339 timestamp: {}", s, e))),
            _ => Err(mismatch(ty, tree)),
        },
        FieldType::Bytes => match tree {
            TreeValue::Bytes(b) => Ok(FieldValue::Bytes(b.clone())),
            TreeValue::String(s) => BASE64
                .decode(s)
                .map(FieldValue::Bytes)
                .map_err(|e| Error::MalformedPayload(format!("invalid base64: {}", e))),
            _ => Err(mismatch(ty, tree)),
        },
        FieldType::Object => Ok(FieldValue::Object(tree.clone())),
        FieldType::Dto(shape) => dto_from_tree(tree, shape, style, depth + 1).map(FieldValue::Dto),
        FieldType::List(inner) => match tree {
            TreeValue::List(items) => items
                .iter()
                .map(|item| value_from_tree(item, inner, style, depth + 1))
                .collect::<Result<Vec<_>>>()
                .map(FieldValue::List),
            _ => Err(mismatch(ty, tree)),
        },
        FieldType::Map(inner) => match tree {
            TreeValue::Map(entries) => entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), value_from_tree(v, inner, style, depth + 1)?)))
                .collect::<Result<IndexMap<_, _>>>()
                .map(FieldValue::Map),
            _ => Err(mismatch(ty, tree)),
        },
    }
}
