use std::fmt;
use std::sync::Arc;

use serde::de::{Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};

use super::{FieldMap, Val};

/// Visitor turning any self-describing document value into a `Val`.
struct ValVisitor;

impl<'de> Visitor<'de> for ValVisitor {
    type Value = Val;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a document value of any type")
    }

    fn visit_bool<E>(self, value: bool) -> Result<Val, E> {
        Ok(Val::Bool(value))
    }

    fn visit_i64<E>(self, value: i64) -> Result<Val, E> {
        Ok(Val::Int(value))
    }

    fn visit_u64<E>(self, value: u64) -> Result<Val, E> {
        Ok(Val::from(value))
    }

    fn visit_f64<E>(self, value: f64) -> Result<Val, E> {
        Ok(Val::Float(value))
    }

    fn visit_str<E>(self, value: &str) -> Result<Val, E> {
        Ok(Val::Str(Arc::from(value)))
    }

    fn visit_string<E>(self, value: String) -> Result<Val, E> {
        Ok(Val::Str(Arc::<str>::from(value)))
    }

    fn visit_none<E>(self) -> Result<Val, E> {
        Ok(Val::Nil)
    }

    fn visit_unit<E>(self) -> Result<Val, E> {
        Ok(Val::Nil)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Val, D::Error>
    where
        D: Deserializer<'de>,
    {
        Val::deserialize(deserializer)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Val, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut elements = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(elem) = seq.next_element::<Val>()? {
            elements.push(elem);
        }
        Ok(Val::List(Arc::new(elements)))
    }

    fn visit_map<M>(self, mut map_access: M) -> Result<Val, M::Error>
    where
        M: MapAccess<'de>,
    {
        let mut map = FieldMap::with_capacity_and_hasher(map_access.size_hint().unwrap_or(0), Default::default());
        while let Some((key, value)) = map_access.next_entry::<String, Val>()? {
            map.insert(Arc::<str>::from(key), value);
        }
        Ok(Val::Map(Arc::new(map)))
    }
}

impl<'de> Deserialize<'de> for Val {
    fn deserialize<D>(deserializer: D) -> Result<Val, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValVisitor)
    }
}

pub fn from_json_str(input: &str) -> anyhow::Result<Val> {
    serde_json::from_str::<Val>(input).map_err(|e| anyhow::anyhow!(e))
}

pub fn from_yaml_str(input: &str) -> anyhow::Result<Val> {
    serde_yaml::from_str::<Val>(input).map_err(|e| anyhow::anyhow!(e))
}

pub fn from_toml_str(input: &str) -> anyhow::Result<Val> {
    toml::from_str::<Val>(input).map_err(|e| anyhow::anyhow!(e))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
    Toml,
}

impl Format {
    /// Picks a format from a file extension, if it is one we know.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            "toml" => Some(Format::Toml),
            _ => None,
        }
    }
}

/// Guesses the document format from its content.
pub fn detect_format(input: &str) -> Format {
    let trimmed = input.trim();
    if trimmed.is_empty()
        || (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']') && !trimmed.contains("]\n"))
    {
        return Format::Json;
    }
    if serde_json::from_str::<serde_json::Value>(input).is_ok() {
        return Format::Json;
    }
    if toml::from_str::<toml::Value>(input).is_ok() {
        return Format::Toml;
    }
    Format::Yaml
}

pub fn parse_with_format(input: &str, format_override: Option<Format>) -> anyhow::Result<Val> {
    match format_override.unwrap_or_else(|| detect_format(input)) {
        Format::Json => from_json_str(input),
        Format::Yaml => from_yaml_str(input),
        Format::Toml => from_toml_str(input),
    }
}

/// Parses a document into a plain JSON tree, for loaders that walk it by hand.
pub fn parse_document(input: &str, format_override: Option<Format>) -> anyhow::Result<serde_json::Value> {
    Ok(match format_override.unwrap_or_else(|| detect_format(input)) {
        Format::Json => serde_json::from_str(input)?,
        Format::Yaml => serde_yaml::from_str(input)?,
        Format::Toml => toml::from_str(input)?,
    })
}
