//! # Shapes
//!
//! The field schema of a request or response DTO, as produced by code generation.
//! Shapes are validated once at construction and shared behind `Arc`.

use std::collections::HashSet;
use std::sync::Arc;

/// Shape construction errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Two fields share a name (compared case-insensitively).
    DuplicateField { shape: String, field: String },
    /// A field name is empty.
    EmptyFieldName { shape: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::DuplicateField { shape, field } => {
                write!(f, "shape '{}' declares field '{}' more than once", shape, field)
            }
            Error::EmptyFieldName { shape } => write!(f, "shape '{}' has a field with an empty name", shape),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// The declared type of a DTO field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Boolean,
    Int32,
    Int64,
    Double,
    /// RFC 3339 on text formats.
    Timestamp,
    Bytes,
    /// A closed set of wire strings. Unknown values are kept, not rejected.
    Enum(Arc<[String]>),
    /// Free-form structured data, carried as a tree.
    Object,
    Dto(Arc<Shape>),
    List(Box<FieldType>),
    Map(Box<FieldType>),
}

impl FieldType {
    /// Builds an enum type from its wire strings.
    pub fn enumeration<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        FieldType::Enum(values.into_iter().map(Into::into).collect())
    }

    pub fn list(inner: FieldType) -> Self {
        FieldType::List(Box::new(inner))
    }

    pub fn map(inner: FieldType) -> Self {
        FieldType::Map(Box::new(inner))
    }

    /// Whether values of this type have a single-string form (path, query, header).
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            FieldType::String
                | FieldType::Boolean
                | FieldType::Int32
                | FieldType::Int64
                | FieldType::Double
                | FieldType::Timestamp
                | FieldType::Bytes
                | FieldType::Enum(_)
        )
    }

    /// Short name used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            FieldType::String => "string".into(),
            FieldType::Boolean => "boolean".into(),
            FieldType::Int32 => "int32".into(),
            FieldType::Int64 => "int64".into(),
            FieldType::Double => "double".into(),
            FieldType::Timestamp => "timestamp".into(),
            FieldType::Bytes => "bytes".into(),
            FieldType::Enum(_) => "enum".into(),
            FieldType::Object => "object".into(),
            FieldType::Dto(shape) => shape.name().to_string(),
            FieldType::List(inner) => format!("{}[]", inner.describe()),
            FieldType::Map(inner) => format!("map<{}>", inner.describe()),
        }
    }
}

/// How a field's absence relates to its type's default value.
///
/// This is an explicit per-field decision: formats disagree on whether they
/// write defaults, so equivalence never guesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbsencePolicy {
    /// Absent and present-with-default are different states.
    #[default]
    Distinct,
    /// Absent means "the type's default"; the two are equivalent.
    DefaultWhenAbsent,
}

/// A single named field of a shape.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldShape {
    pub name: String,
    pub ty: FieldType,
    pub required: bool,
    pub nullable: bool,
    pub absence: AbsencePolicy,
}

impl FieldShape {
    /// An optional, non-nullable field with the `Distinct` absence policy.
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self { name: name.into(), ty, required: false, nullable: false, absence: AbsencePolicy::Distinct }
    }

    /// Decoding fails when a required field is missing.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// The field may carry an explicit `null`, distinct from absence.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default_when_absent(mut self) -> Self {
        self.absence = AbsencePolicy::DefaultWhenAbsent;
        self
    }
}

/// The ordered field schema of a DTO.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    name: String,
    fields: Vec<FieldShape>,
}

impl Shape {
    /// Validates and builds a shape.
    ///
    /// # Errors
    /// Fails on empty or duplicate field names. Names are compared
    /// case-insensitively so that lenient decoders stay unambiguous.
    pub fn new(name: impl Into<String>, fields: Vec<FieldShape>) -> Result<Arc<Self>> {
        let name = name.into();
        let mut seen = HashSet::new();
        for field in &fields {
            if field.name.is_empty() {
                return Err(Error::EmptyFieldName { shape: name });
            }
            if !seen.insert(field.name.to_ascii_lowercase()) {
                return Err(Error::DuplicateField { shape: name, field: field.name.clone() });
            }
        }
        Ok(Arc::new(Self { name, fields }))
    }

    /// A shape with no fields.
    pub fn empty(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { name: name.into(), fields: Vec::new() })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldShape] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldShape> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Exact match first, then ASCII case-insensitive.
    pub fn field_ignore_case(&self, name: &str) -> Option<&FieldShape> {
        self.field(name)
            .or_else(|| self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name)))
    }

    /// Derives a shape holding only the named fields, in declaration order.
    pub fn subset(&self, name: impl Into<String>, keep: &dyn Fn(&FieldShape) -> bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            fields: self.fields.iter().filter(|f| keep(f)).cloned().collect(),
        })
    }
}
