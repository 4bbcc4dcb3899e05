//! The binary format: trees written with `wirepack`.
//!
//! Bytes stay raw and every field state survives, so this codec is lossless.

use indexmap::IndexMap;

use wirepack::Decoder;
use wirepack::Encoder;
use wirepack::Tag;

use super::Codec;
use super::CodecProperties;
use super::Error;
use super::MAX_DEPTH;
use super::Result;
use super::TreeStyle;
use crate::tree::Number;
use crate::tree::TreeValue;

const MEDIA_TYPE: &str = "application/x-wirepack";

/// Wirepack encoding of DTO trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl BinaryCodec {
    pub const fn new() -> Self {
        BinaryCodec
    }
}

fn unrepresentable(err: wirepack::Error) -> Error {
    Error::Unrepresentable(err.to_string())
}

fn malformed(err: wirepack::Error) -> Error {
    Error::MalformedPayload(err.to_string())
}

fn encode_tree(enc: &mut Encoder, tree: &TreeValue, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::Unrepresentable(format!("nesting deeper than {} levels", MAX_DEPTH)));
    }

    match tree {
        TreeValue::Null => enc.null(),
        TreeValue::Bool(b) => enc.bool(*b),
        TreeValue::Number(Number::Int(v)) => enc.int(*v),
        TreeValue::Number(Number::UInt(v)) => enc.uint(*v),
        TreeValue::Number(Number::Float(v)) => enc.float(*v),
        TreeValue::String(s) => enc.str(s),
        TreeValue::Bytes(b) => enc.bytes(b),
        TreeValue::List(items) => {
            enc.list_begin().map_err(unrepresentable)?;
            for item in items {
                encode_tree(enc, item, depth + 1)?;
            }
            enc.list_end()
        }
        TreeValue::Map(map) => {
            enc.map_begin().map_err(unrepresentable)?;
            for (key, value) in map {
                enc.entry_begin(key).map_err(unrepresentable)?;
                encode_tree(enc, value, depth + 1)?;
                enc.entry_end().map_err(unrepresentable)?;
            }
            enc.map_end()
        }
    }
    .map_err(unrepresentable)
}

fn decode_tree(dec: &mut Decoder<'_>, depth: usize) -> Result<TreeValue> {
    if depth > MAX_DEPTH {
        return Err(Error::MalformedPayload(format!("nesting deeper than {} levels", MAX_DEPTH)));
    }

    let tree = match dec.peek_tag().map_err(malformed)? {
        Tag::Null => {
            dec.null().map_err(malformed)?;
            TreeValue::Null
        }
        Tag::True | Tag::False => TreeValue::Bool(dec.bool().map_err(malformed)?),
        Tag::Int => TreeValue::Number(Number::Int(dec.int().map_err(malformed)?)),
        Tag::UInt => TreeValue::Number(Number::UInt(dec.uint().map_err(malformed)?)),
        Tag::Float => TreeValue::Number(Number::Float(dec.float().map_err(malformed)?)),
        Tag::String => TreeValue::String(dec.str().map_err(malformed)?.to_string()),
        Tag::Bytes => TreeValue::Bytes(dec.bytes().map_err(malformed)?.to_vec()),
        Tag::List => {
            let mut iter = dec.list().map_err(malformed)?;
            let mut items = Vec::new();
            while let Some(mut item) = iter.next().map_err(malformed)? {
                items.push(decode_tree(&mut item, depth + 1)?);
                item.finish().map_err(malformed)?;
            }
            TreeValue::List(items)
        }
        Tag::Map => {
            let mut iter = dec.map().map_err(malformed)?;
            let mut map = IndexMap::new();
            while let Some((key, mut value)) = iter.next().map_err(malformed)? {
                let decoded = decode_tree(&mut value, depth + 1)?;
                value.finish().map_err(malformed)?;
                if map.insert(key.to_string(), decoded).is_some() {
                    return Err(Error::MalformedPayload(format!("duplicate key '{}'", key)));
                }
            }
            TreeValue::Map(map)
        }
        Tag::Entry => {
            return Err(Error::MalformedPayload("map entry outside of a map".into()));
        }
    };
    Ok(tree)
}

impl Codec for BinaryCodec {
    fn name(&self) -> &'static str {
        "wirepack"
    }

    fn media_type(&self) -> &'static str {
        MEDIA_TYPE
    }

    fn properties(&self) -> CodecProperties {
        CodecProperties { preserves_absence: true, preserves_null: true }
    }

    fn style(&self) -> TreeStyle {
        TreeStyle {
            bytes_as_base64: false,
            int64_as_string: false,
            emit_null: true,
            case_insensitive_keys: false,
        }
    }

    fn write_tree(&self, tree: &TreeValue) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        encode_tree(&mut enc, tree, 0)?;
        enc.into_bytes().map_err(unrepresentable)
    }

    fn read_tree(&self, bytes: &[u8]) -> Result<TreeValue> {
        let mut dec = Decoder::new(bytes);
        let tree = decode_tree(&mut dec, 0)?;
        dec.finish().map_err(malformed)?;
        Ok(tree)
    }
}
