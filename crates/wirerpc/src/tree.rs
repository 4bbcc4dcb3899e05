//! # Tree Values
//!
//! The format-agnostic shape of a payload. Every codec can produce and consume
//! trees, which makes them the common ground for comparing what two formats
//! (or a fixture and a live service) actually said.
//!
//! ## Invariants
//! - **Value Equality**: Numbers compare by value, never by variant (`Int(1) == Float(1.0)`).
//! - **Order Blindness**: Maps compare as key/value sets; insertion order is only kept for rendering.

use indexmap::IndexMap;

/// A numeric tree leaf.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Number {
    /// Returns the value as `i128` when it is integral.
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Number::Int(v) => Some(i128::from(v)),
            Number::UInt(v) => Some(i128::from(v)),
            Number::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1.7e38 => Some(v as i128),
            Number::Float(_) => None,
        }
    }

    /// Returns the value as `f64`, possibly losing precision.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::Int(v) => v as f64,
            Number::UInt(v) => v as f64,
            Number::Float(v) => v,
        }
    }

    fn is_zero(&self) -> bool {
        self.as_f64() == 0.0
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Float(a), Number::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Number::Float(_), _) | (_, Number::Float(_)) => {
                match (self.as_i128(), other.as_i128()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            _ => self.as_i128() == other.as_i128(),
        }
    }
}

impl std::fmt::Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Number::Int(v) => write!(f, "{}", v),
            Number::UInt(v) => write!(f, "{}", v),
            Number::Float(v) => write!(f, "{}", v),
        }
    }
}

/// A format-agnostic structural value.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<TreeValue>),
    Map(IndexMap<String, TreeValue>),
}

impl TreeValue {
    /// Builds a map tree from `(key, value)` pairs, keeping their order.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, TreeValue)>) -> Self {
        TreeValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            TreeValue::Null => "null",
            TreeValue::Bool(_) => "bool",
            TreeValue::Number(_) => "number",
            TreeValue::String(_) => "string",
            TreeValue::Bytes(_) => "bytes",
            TreeValue::List(_) => "list",
            TreeValue::Map(_) => "map",
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, TreeValue>> {
        match self {
            TreeValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TreeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Looks up a key when this value is a map.
    pub fn get(&self, key: &str) -> Option<&TreeValue> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Whether this value is the "empty" member of its kind.
    ///
    /// `null`, `false`, `0`, `""`, empty bytes, `[]` and `{}` are all defaults.
    pub fn is_default(&self) -> bool {
        match self {
            TreeValue::Null => true,
            TreeValue::Bool(b) => !b,
            TreeValue::Number(n) => n.is_zero(),
            TreeValue::String(s) => s.is_empty(),
            TreeValue::Bytes(b) => b.is_empty(),
            TreeValue::List(items) => items.is_empty(),
            TreeValue::Map(map) => map.is_empty(),
        }
    }

    /// Returns a copy with every `null` map entry removed, at any depth.
    /// `null` list items are kept.
    pub fn without_null_entries(&self) -> TreeValue {
        match self {
            TreeValue::Map(map) => TreeValue::Map(
                map.iter()
                    .filter(|(_, v)| !matches!(v, TreeValue::Null))
                    .map(|(k, v)| (k.clone(), v.without_null_entries()))
                    .collect(),
            ),
            TreeValue::List(items) => TreeValue::List(items.iter().map(TreeValue::without_null_entries).collect()),
            other => other.clone(),
        }
    }

    /// Compares two trees treating default-valued map entries as absent.
    ///
    /// This is the lenient comparison for callers that do not care whether a
    /// format wrote `"count": 0` or left `count` out.
    pub fn equivalent_ignoring_defaults(&self, other: &TreeValue) -> bool {
        match (self, other) {
            (TreeValue::Map(a), TreeValue::Map(b)) => {
                let meaningful = |map: &IndexMap<String, TreeValue>| -> usize {
                    map.values().filter(|v| !v.is_default()).count()
                };
                if meaningful(a) != meaningful(b) {
                    return false;
                }
                a.iter().filter(|(_, v)| !v.is_default()).all(|(k, v)| {
                    b.get(k).is_some_and(|w| v.equivalent_ignoring_defaults(w))
                })
            }
            (TreeValue::List(a), TreeValue::List(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| x.equivalent_ignoring_defaults(y))
            }
            _ => self == other,
        }
    }

    /// Converts to a `serde_json::Value`. Bytes become base64 strings and
    /// non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use base64::Engine as _;
        match self {
            TreeValue::Null => serde_json::Value::Null,
            TreeValue::Bool(b) => serde_json::Value::Bool(*b),
            TreeValue::Number(Number::Int(v)) => serde_json::Value::from(*v),
            TreeValue::Number(Number::UInt(v)) => serde_json::Value::from(*v),
            TreeValue::Number(Number::Float(v)) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            TreeValue::String(s) => serde_json::Value::String(s.clone()),
            TreeValue::Bytes(b) => {
                serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(b))
            }
            TreeValue::List(items) => {
                serde_json::Value::Array(items.iter().map(TreeValue::to_json).collect())
            }
            TreeValue::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Renders the tree as indented JSON for diffs and failure messages.
    pub fn render(&self) -> String {
        serde_json::to_string_pretty(&self.to_json()).unwrap_or_else(|_| format!("{:?}", self))
    }
}

impl From<&serde_json::Value> for TreeValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => TreeValue::Null,
            serde_json::Value::Bool(b) => TreeValue::Bool(*b),
            serde_json::Value::Number(n) => TreeValue::Number(if let Some(v) = n.as_i64() {
                Number::Int(v)
            } else if let Some(v) = n.as_u64() {
                Number::UInt(v)
            } else {
                Number::Float(n.as_f64().unwrap_or(f64::NAN))
            }),
            serde_json::Value::String(s) => TreeValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                TreeValue::List(items.iter().map(TreeValue::from).collect())
            }
            serde_json::Value::Object(map) => TreeValue::Map(
                map.iter().map(|(k, v)| (k.clone(), TreeValue::from(v))).collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for TreeValue {
    fn from(value: serde_json::Value) -> Self {
        TreeValue::from(&value)
    }
}

impl From<&str> for TreeValue {
    fn from(value: &str) -> Self {
        TreeValue::String(value.to_string())
    }
}

impl From<bool> for TreeValue {
    fn from(value: bool) -> Self {
        TreeValue::Bool(value)
    }
}

impl From<i64> for TreeValue {
    fn from(value: i64) -> Self {
        TreeValue::Number(Number::Int(value))
    }
}
