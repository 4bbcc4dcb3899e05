//! # DTO Values
//!
//! A structured record bound to its [`Shape`]. Each field is in exactly one of
//! three states: absent (no entry), null (`FieldValue::Null`), or present with
//! a value. The states are distinct and survive every codec that can
//! represent them.

use std::sync::Arc;

use indexmap::IndexMap;
use time::OffsetDateTime;

use crate::shape::AbsencePolicy;
use crate::shape::Shape;
use crate::tree::Number;
use crate::tree::TreeValue;

/// The value of a present field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Explicit null; only meaningful for nullable fields.
    Null,
    String(String),
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Timestamp(OffsetDateTime),
    Bytes(Vec<u8>),
    Enum(String),
    Object(TreeValue),
    Dto(Dto),
    List(Vec<FieldValue>),
    Map(IndexMap<String, FieldValue>),
}

impl FieldValue {
    fn as_number(&self) -> Option<Number> {
        match *self {
            FieldValue::Int32(v) => Some(Number::Int(i64::from(v))),
            FieldValue::Int64(v) => Some(Number::Int(v)),
            FieldValue::Double(v) => Some(Number::Float(v)),
            _ => None,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) | FieldValue::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this is the default value of its type.
    pub fn is_default(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Boolean(b) => !b,
            FieldValue::Int32(v) => *v == 0,
            FieldValue::Int64(v) => *v == 0,
            FieldValue::Double(v) => *v == 0.0,
            FieldValue::String(s) | FieldValue::Enum(s) => s.is_empty(),
            FieldValue::Bytes(b) => b.is_empty(),
            FieldValue::Timestamp(_) => false,
            FieldValue::Object(tree) => tree.is_default(),
            FieldValue::Dto(dto) => dto.fields.is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Map(map) => map.is_empty(),
        }
    }

    /// Semantic equality: numbers by value, enums against their wire strings,
    /// nested DTOs by [`Dto::equivalent`], maps as sets.
    pub fn equivalent(&self, other: &FieldValue) -> bool {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (self.as_text(), other.as_text()) {
            return a == b;
        }
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => true,
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => a == b,
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a == b,
            (FieldValue::Bytes(a), FieldValue::Bytes(b)) => a == b,
            (FieldValue::Object(a), FieldValue::Object(b)) => a == b,
            (FieldValue::Dto(a), FieldValue::Dto(b)) => a.equivalent(b),
            (FieldValue::List(a), FieldValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equivalent(y))
            }
            (FieldValue::Map(a), FieldValue::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.equivalent(w)))
            }
            _ => false,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int32(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int64(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Double(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Bytes(value)
    }
}

impl From<OffsetDateTime> for FieldValue {
    fn from(value: OffsetDateTime) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<Dto> for FieldValue {
    fn from(value: Dto) -> Self {
        FieldValue::Dto(value)
    }
}

/// A structured record bound to its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Dto {
    shape: Arc<Shape>,
    fields: IndexMap<String, FieldValue>,
}

impl Dto {
    /// Creates a record with every field absent.
    pub fn new(shape: &Arc<Shape>) -> Self {
        Self { shape: Arc::clone(shape), fields: IndexMap::new() }
    }

    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    /// Sets a field and returns the record, for chained construction.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a field to explicit null.
    pub fn with_null(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), FieldValue::Null);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Makes a field absent, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn is_present(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(FieldValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn get_dto(&self, name: &str) -> Option<&Dto> {
        match self.get(name) {
            Some(FieldValue::Dto(dto)) => Some(dto),
            _ => None,
        }
    }

    /// Present fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Present fields in the shape's declaration order, followed by any
    /// fields the shape does not declare.
    pub fn fields_in_order(&self) -> Vec<(&str, &FieldValue)> {
        let mut ordered: Vec<(&str, &FieldValue)> = self
            .shape
            .fields()
            .iter()
            .filter_map(|f| self.fields.get_key_value(f.name.as_str()))
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        ordered.extend(
            self.fields
                .iter()
                .filter(|(k, _)| self.shape.field(k).is_none())
                .map(|(k, v)| (k.as_str(), v)),
        );
        ordered
    }

    /// Moves the given field values into a record of another shape.
    pub fn project(&self, shape: &Arc<Shape>) -> Dto {
        let mut out = Dto::new(shape);
        for field in shape.fields() {
            if let Some(value) = self.fields.get(&field.name) {
                out.fields.insert(field.name.clone(), value.clone());
            }
        }
        out
    }

    /// Copies every present field of `other` into this record.
    pub fn merge(&mut self, other: Dto) {
        self.fields.extend(other.fields);
    }

    /// Returns a copy with explicit nulls turned into absence.
    ///
    /// Nulls go from fields, map values and map entries of object trees at
    /// any depth. List items are left alone.
    pub fn without_nulls(&self) -> Dto {
        fn is_null(value: &FieldValue) -> bool {
            matches!(value, FieldValue::Null | FieldValue::Object(TreeValue::Null))
        }
        fn strip(value: &FieldValue) -> FieldValue {
            match value {
                FieldValue::Dto(dto) => FieldValue::Dto(dto.without_nulls()),
                FieldValue::Object(tree) => FieldValue::Object(tree.without_null_entries()),
                FieldValue::List(items) => FieldValue::List(items.iter().map(strip).collect()),
                FieldValue::Map(map) => FieldValue::Map(
                    map.iter().filter(|(_, v)| !is_null(v)).map(|(k, v)| (k.clone(), strip(v))).collect(),
                ),
                other => other.clone(),
            }
        }
        Dto {
            shape: Arc::clone(&self.shape),
            fields: self
                .fields
                .iter()
                .filter(|(_, v)| !is_null(v))
                .map(|(k, v)| (k.clone(), strip(v)))
                .collect(),
        }
    }

    /// Semantic equality of two records.
    ///
    /// Every field present in either record must be present in both with
    /// equivalent values, except fields whose [`AbsencePolicy`] is
    /// `DefaultWhenAbsent`, where absence matches a present default.
    pub fn equivalent(&self, other: &Dto) -> bool {
        let names = self.fields.keys().chain(other.fields.keys().filter(|k| !self.fields.contains_key(*k)));
        for name in names {
            let policy = self
                .shape
                .field(name)
                .or_else(|| other.shape.field(name))
                .map(|f| f.absence)
                .unwrap_or_default();

            let same = match (self.fields.get(name), other.fields.get(name)) {
                (Some(a), Some(b)) => a.equivalent(b),
                (Some(v), None) | (None, Some(v)) => {
                    policy == AbsencePolicy::DefaultWhenAbsent && v.is_default()
                }
                (None, None) => true,
            };
            if !same {
                return false;
            }
        }
        true
    }
}
