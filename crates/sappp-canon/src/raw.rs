//! A JSON value tree that preserves object key order and duplicates, so
//! that [`crate::parse_canonical_bytes`] can reject duplicate keys before
//! they are silently collapsed by `serde_json::Value`'s own map.

use sappp_error::{CoreError, CoreResult, ErrorCode};
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use std::collections::HashSet;
use std::fmt;

pub(crate) enum RawValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<RawValue>),
    Object(Vec<(String, RawValue)>),
}

impl<'de> Deserialize<'de> for RawValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(RawValueVisitor)
    }
}

struct RawValueVisitor;

impl<'de> Visitor<'de> for RawValueVisitor {
    type Value = RawValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a valid JSON value")
    }

    fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
        Ok(RawValue::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
        Ok(RawValue::Number(v.into()))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
        Ok(RawValue::Number(v.into()))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
        Ok(RawValue::Number(
            serde_json::Number::from_f64(v).unwrap_or_else(|| 0.into()),
        ))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
        Ok(RawValue::String(v.to_owned()))
    }

    fn visit_string<E>(self, v: String) -> Result<Self::Value, E> {
        Ok(RawValue::String(v))
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(RawValue::Null)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E> {
        Ok(RawValue::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        Deserialize::deserialize(deserializer)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(RawValue::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut pairs = Vec::new();
        while let Some((k, v)) = map.next_entry::<String, RawValue>()? {
            pairs.push((k, v));
        }
        Ok(RawValue::Object(pairs))
    }
}

/// Convert a duplicate-preserving [`RawValue`] tree into a canonical
/// [`serde_json::Value`], failing on the first duplicate key or float
/// encountered, depth-first, left-to-right.
pub(crate) fn into_canonical(raw: RawValue, path: &str) -> CoreResult<serde_json::Value> {
    match raw {
        RawValue::Null => Ok(serde_json::Value::Null),
        RawValue::Bool(b) => Ok(serde_json::Value::Bool(b)),
        RawValue::Number(n) => {
            if n.is_f64() {
                return Err(CoreError::new(
                    ErrorCode::FloatInCanonical,
                    "floating point numbers are not allowed in canonical JSON",
                )
                .with_context("path", path));
            }
            Ok(serde_json::Value::Number(n))
        }
        RawValue::String(s) => Ok(serde_json::Value::String(s)),
        RawValue::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                out.push(into_canonical(item, &format!("{path}[{i}]"))?);
            }
            Ok(serde_json::Value::Array(out))
        }
        RawValue::Object(pairs) => {
            let mut seen = HashSet::with_capacity(pairs.len());
            let mut out = serde_json::Map::new();
            for (k, v) in pairs {
                if !seen.insert(k.clone()) {
                    return Err(CoreError::new(
                        ErrorCode::DuplicateKey,
                        "duplicate object key in canonical JSON",
                    )
                    .with_context("path", path)
                    .with_context("key", k));
                }
                let child = into_canonical(v, &format!("{path}.{k}"))?;
                out.insert(k, child);
            }
            Ok(serde_json::Value::Object(out))
        }
    }
}
