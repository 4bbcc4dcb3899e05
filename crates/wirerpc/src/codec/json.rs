//! The two JSON flavors.
//!
//! `standard` writes properties in declaration order, keeps explicit nulls and
//! writes int64 as numbers. `legacy` mirrors older services: sorted keys,
//! int64 as strings, case-insensitive property names, and no way to say
//! `null` (null fields and null map entries are dropped on write, exactly
//! like absent ones).

use super::Codec;
use super::CodecProperties;
use super::Error;
use super::MAX_DEPTH;
use super::Result;
use super::TreeStyle;
use crate::tree::Number;
use crate::tree::TreeValue;

const JSON: &str = "application/json";
const TEXT_JSON: &str = "text/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Standard,
    Legacy,
}

/// A JSON codec in one of two flavors.
#[derive(Debug, Clone, Copy)]
pub struct JsonCodec {
    flavor: Flavor,
}

impl JsonCodec {
    pub const fn standard() -> Self {
        Self { flavor: Flavor::Standard }
    }

    pub const fn legacy() -> Self {
        Self { flavor: Flavor::Legacy }
    }

    fn to_json(&self, tree: &TreeValue, depth: usize) -> Result<serde_json::Value> {
        if depth > MAX_DEPTH {
            return Err(Error::Unrepresentable(format!("nesting deeper than {} levels", MAX_DEPTH)));
        }
        Ok(match tree {
            TreeValue::Number(Number::Float(v)) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .ok_or_else(|| Error::Unrepresentable(format!("{} has no JSON form", v)))?,
            TreeValue::List(items) => serde_json::Value::Array(
                items.iter().map(|v| self.to_json(v, depth + 1)).collect::<Result<_>>()?,
            ),
            TreeValue::Map(map) => {
                let mut entries: Vec<(&String, &TreeValue)> = map.iter().collect();
                if self.flavor == Flavor::Legacy {
                    entries.retain(|(_, v)| !matches!(v, TreeValue::Null));
                    entries.sort_by(|a, b| a.0.cmp(b.0));
                }
                let mut object = serde_json::Map::with_capacity(entries.len());
                for (key, value) in entries {
                    object.insert(key.clone(), self.to_json(value, depth + 1)?);
                }
                serde_json::Value::Object(object)
            }
            leaf => leaf.to_json(),
        })
    }
}

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        match self.flavor {
            Flavor::Standard => "json",
            Flavor::Legacy => "legacy-json",
        }
    }

    fn media_type(&self) -> &'static str {
        JSON
    }

    fn accepts(&self, media_type: &str) -> bool {
        let essence = super::media_type_essence(media_type);
        essence.eq_ignore_ascii_case(JSON)
            || (self.flavor == Flavor::Legacy && essence.eq_ignore_ascii_case(TEXT_JSON))
    }

    fn properties(&self) -> CodecProperties {
        CodecProperties {
            preserves_absence: true,
            preserves_null: self.flavor == Flavor::Standard,
        }
    }

    fn style(&self) -> TreeStyle {
        match self.flavor {
            Flavor::Standard => TreeStyle::JSON,
            Flavor::Legacy => TreeStyle {
                bytes_as_base64: true,
                int64_as_string: true,
                emit_null: false,
                case_insensitive_keys: true,
            },
        }
    }

    fn write_tree(&self, tree: &TreeValue) -> Result<Vec<u8>> {
        let value = self.to_json(tree, 0)?;
        serde_json::to_vec(&value).map_err(|e| Error::Unrepresentable(e.to_string()))
    }

    fn read_tree(&self, bytes: &[u8]) -> Result<TreeValue> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| Error::MalformedPayload(e.to_string()))?;
        Ok(TreeValue::from(value))
    }
}
