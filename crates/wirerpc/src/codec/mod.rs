//! # Wire Codecs
//!
//! Interchangeable encodings of DTO values. Every codec is a stateless
//! singleton that can describe a DTO as a [`TreeValue`] and turn trees into
//! bytes and back.
//!
//! ## Philosophy
//!
//! - **Trees In The Middle**: `encode` is `write_tree(to_tree(dto))` and `decode`
//!   is `from_tree(read_tree(bytes))`. Formats only differ in their tree view
//!   ([`TreeStyle`]) and their byte primitives.
//! - **Honest Properties**: A format that cannot represent a field state says so
//!   through [`CodecProperties`] and [`Codec::canonicalize`], so round-trip
//!   checks compare against what the format can actually carry.
//!
//! ## Invariants
//! - **Round Trip**: `decode(encode(dto))` is equivalent to `canonicalize(dto)`.
//! - **Bounded**: Nesting deeper than [`MAX_DEPTH`] is rejected in both directions.

mod binary;
mod json;
mod view;

use std::sync::Arc;

use crate::dto::Dto;
use crate::shape::Shape;
use crate::tree::TreeValue;

pub use binary::BinaryCodec;
pub use json::JsonCodec;

/// The maximum nesting depth of a payload.
pub const MAX_DEPTH: usize = 64;

/// Codec failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bytes are not valid for the format, or do not fit the requested shape.
    MalformedPayload(String),
    /// The value cannot be written in this format.
    Unrepresentable(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MalformedPayload(msg) => write!(f, "malformed payload: {}", msg),
            Error::Unrepresentable(msg) => write!(f, "unrepresentable value: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// How a format lays DTO values out as trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStyle {
    /// Bytes become base64 strings instead of raw byte leaves.
    pub bytes_as_base64: bool,
    /// Int64 values become decimal strings.
    pub int64_as_string: bool,
    /// Explicit nulls are written; otherwise they are omitted like absent fields.
    pub emit_null: bool,
    /// Property names are matched ignoring ASCII case when reading.
    pub case_insensitive_keys: bool,
}

impl TreeStyle {
    /// The style of plain JSON.
    pub const JSON: TreeStyle = TreeStyle {
        bytes_as_base64: true,
        int64_as_string: false,
        emit_null: true,
        case_insensitive_keys: false,
    };
}

/// Which field states a format can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecProperties {
    /// Absent fields stay absent.
    pub preserves_absence: bool,
    /// Explicit nulls stay distinct from absence.
    pub preserves_null: bool,
}

/// A wire format for DTO values.
///
/// Object safe, so formats are shared as `Arc<dyn Codec>`.
pub trait Codec: Send + Sync + 'static {
    /// Short, stable name for diagnostics.
    fn name(&self) -> &'static str;

    /// The media type written as `Content-Type`.
    fn media_type(&self) -> &'static str;

    /// Whether this codec reads payloads of the given media type.
    /// Parameters such as `charset` are ignored.
    fn accepts(&self, media_type: &str) -> bool {
        media_type_essence(media_type).eq_ignore_ascii_case(self.media_type())
    }

    fn properties(&self) -> CodecProperties;

    fn style(&self) -> TreeStyle;

    /// Writes a tree in this format.
    fn write_tree(&self, tree: &TreeValue) -> Result<Vec<u8>>;

    /// Reads a tree written in this format.
    fn read_tree(&self, bytes: &[u8]) -> Result<TreeValue>;

    fn to_tree(&self, dto: &Dto) -> Result<TreeValue> {
        view::to_tree(dto, &self.style())
    }

    fn from_tree(&self, tree: &TreeValue, shape: &Arc<Shape>) -> Result<Dto> {
        view::from_tree(tree, shape, &self.style())
    }

    fn encode(&self, dto: &Dto) -> Result<Vec<u8>> {
        self.write_tree(&self.to_tree(dto)?)
    }

    fn decode(&self, bytes: &[u8], shape: &Arc<Shape>) -> Result<Dto> {
        self.from_tree(&self.read_tree(bytes)?, shape)
    }

    /// The value this format would hand back after a round trip.
    fn canonicalize(&self, dto: &Dto) -> Dto {
        if self.properties().preserves_null {
            dto.clone()
        } else {
            dto.without_nulls()
        }
    }

    /// DTO equivalence as seen through this format.
    fn equivalent(&self, a: &Dto, b: &Dto) -> bool {
        self.canonicalize(a).equivalent(&self.canonicalize(b))
    }
}

/// Returns the media type without parameters, e.g. `application/json` for
/// `application/json; charset=utf-8`.
pub fn media_type_essence(value: &str) -> &str {
    value.split(';').next().unwrap_or(value).trim()
}

/// Converts a DTO to a tree using an explicit style.
pub fn dto_to_tree(dto: &Dto, style: &TreeStyle) -> Result<TreeValue> {
    view::to_tree(dto, style)
}

/// Reads a DTO of the given shape from a tree using an explicit style.
pub fn dto_from_tree(tree: &TreeValue, shape: &Arc<Shape>, style: &TreeStyle) -> Result<Dto> {
    view::from_tree(tree, shape, style)
}

/// An ordered set of codecs; the first is the primary.
#[derive(Clone)]
pub struct CodecSet {
    codecs: Vec<Arc<dyn Codec>>,
}

impl CodecSet {
    pub fn new(primary: Arc<dyn Codec>) -> Self {
        Self { codecs: vec![primary] }
    }

    /// Adds an alternate codec, consulted after the ones already present.
    pub fn with(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codecs.push(codec);
        self
    }

    pub fn primary(&self) -> &Arc<dyn Codec> {
        &self.codecs[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Codec>> {
        self.codecs.iter()
    }

    /// The codec that reads `media_type`, preferring the primary.
    pub fn for_media_type(&self, media_type: &str) -> Option<&Arc<dyn Codec>> {
        self.codecs.iter().find(|c| c.accepts(media_type))
    }

    /// The value of an `Accept` header listing every codec.
    pub fn accept_header(&self) -> String {
        let mut types: Vec<&str> = Vec::new();
        for codec in &self.codecs {
            if !types.contains(&codec.media_type()) {
                types.push(codec.media_type());
            }
        }
        types.join(", ")
    }

    /// Picks a codec for a response given the caller's `Accept` header.
    ///
    /// Media ranges are tried in the order listed; `*/*` and a missing header
    /// select the primary.
    pub fn negotiate(&self, accept: Option<&str>) -> &Arc<dyn Codec> {
        let Some(accept) = accept else {
            return self.primary();
        };
        for range in accept.split(',') {
            let range = media_type_essence(range);
            if range == "*/*" {
                return self.primary();
            }
            if let Some(codec) = self.for_media_type(range) {
                return codec;
            }
        }
        self.primary()
    }
}

impl Default for CodecSet {
    /// Standard JSON, with the binary format as an alternate.
    fn default() -> Self {
        CodecSet::new(Arc::new(JsonCodec::standard())).with(Arc::new(BinaryCodec::new()))
    }
}

impl std::fmt::Debug for CodecSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.codecs.iter().map(|c| c.name())).finish()
    }
}

#[cfg(test)]
mod tests;
