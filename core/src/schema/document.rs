//! Schemas described as data.
//!
//! A document is `{ "root": <type>, "types": { name: <type>, ... } }`, read from
//! JSON, YAML or TOML. A `<type>` is either the name of an entry in `types`
//! or an object tagged by `"type"`. Named entries are reached through pointers,
//! so they may be referenced before they are defined and are shared wherever
//! they are used.

use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{Clause, Field, Filter, Hook, Schema};
use crate::val::{Format, Val, parse_document};

type Object = Map<String, Value>;

/// A loaded schema document.
#[derive(Debug, Clone)]
pub struct SchemaDocument {
    root: Schema,
    types: Vec<(String, Schema)>,
}

impl SchemaDocument {
    pub fn parse(input: &str, format: Option<Format>) -> Result<Self> {
        let value = parse_document(input, format)?;
        Self::from_value(&value)
    }

    pub fn from_value(doc: &Value) -> Result<Self> {
        let obj = doc
            .as_object()
            .ok_or_else(|| anyhow!("schema document must be an object"))?;
        let no_types = Object::new();
        let defs = match obj.get("types") {
            None => &no_types,
            Some(Value::Object(defs)) => defs,
            Some(_) => bail!("types: expected a table of named types"),
        };

        let loader = Loader {
            names: defs.keys().map(|name| (name.clone(), Schema::ptr())).collect(),
        };
        let mut types = Vec::with_capacity(defs.len());
        for (name, def) in defs {
            let schema = loader.node(def, &format!("types.{name}"))?;
            if let Some(ptr) = loader.names.get(name) {
                ptr.resolve(&schema)?;
            }
            types.push((name.clone(), schema));
        }

        let root = obj.get("root").ok_or_else(|| anyhow!("root: missing root type"))?;
        let root = loader.node(root, "root")?;
        tracing::debug!(types = types.len(), "loaded schema document");
        Ok(Self { root, types })
    }

    pub fn root(&self) -> &Schema {
        &self.root
    }

    /// Named type as declared under `types`.
    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.types.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(|(n, _)| n.as_str())
    }
}

struct Loader {
    names: FxHashMap<String, Schema>,
}

impl Loader {
    fn node(&self, value: &Value, path: &str) -> Result<Schema> {
        let obj = match value {
            Value::String(name) => return self.named(name, path),
            Value::Object(obj) => obj,
            _ => bail!("{path}: expected a type name or a type table"),
        };
        let tag = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("{path}: missing 'type' tag"))?;

        let schema = match tag {
            "bool" => Schema::boolean(),
            "byte" => Schema::byte(),
            "int" => Schema::int(width(obj, "width", path)?),
            "uint" => Schema::uint(width(obj, "width", path)?),
            "float" => Schema::float(opt_width(obj, "width", path)?.unwrap_or(32)),
            "fixed" => Schema::fixed(width(obj, "int", path)?, width(obj, "frac", path)?),
            "ufixed" => Schema::ufixed(width(obj, "int", path)?, width(obj, "frac", path)?),
            "string" => Schema::string(width(obj, "prefix", path)?),
            "pad" => Schema::pad(width(obj, "bits", path)?),
            "align" => Schema::align(width(obj, "bits", path)?),
            "const" => {
                let value = obj.get("value").ok_or_else(|| anyhow!("{path}: missing 'value'"))?;
                Schema::constant(to_val(value, &format!("{path}.value"))?)
            }
            "ptr" => {
                let name = string(obj, "to", path)?;
                Schema::ptr_to(&self.named(name, &format!("{path}.to"))?)
            }
            "struct" => Schema::structure(self.fields(obj, path)?),
            "host" => Schema::host(string(obj, "class", path)?, self.fields(obj, path)?),
            "array" => {
                let element = self.child(obj, "element", path)?;
                match obj.get("length") {
                    Some(Value::Number(n)) => {
                        let n = n
                            .as_u64()
                            .and_then(|n| usize::try_from(n).ok())
                            .ok_or_else(|| anyhow!("{path}.length: expected a non-negative integer"))?;
                        Schema::array(n, element)
                    }
                    Some(len @ (Value::String(_) | Value::Object(_))) => {
                        Schema::array_prefixed(self.node(len, &format!("{path}.length"))?, element)
                    }
                    Some(_) => bail!("{path}.length: length must be a number or a type"),
                    None => bail!("{path}: missing 'length'"),
                }
            }
            "vector" => {
                let name = string(obj, "length", path)?;
                let level = match obj.get("level") {
                    None => 1,
                    Some(v) => v
                        .as_u64()
                        .and_then(|n| usize::try_from(n).ok())
                        .ok_or_else(|| anyhow!("{path}.level: expected a non-negative integer"))?,
                };
                Schema::vector_at(name, level, self.child(obj, "element", path)?)
            }
            "union" => Schema::union(self.clauses(obj, path)?),
            other => bail!("{path}: unknown type tag '{other}'"),
        };
        attributes(schema, obj, path)
    }

    fn named(&self, name: &str, path: &str) -> Result<Schema> {
        if let Some(ptr) = self.names.get(name) {
            return Ok(ptr.clone());
        }
        // Parameterless tags may be written bare.
        match name {
            "bool" => Ok(Schema::boolean()),
            "byte" => Ok(Schema::byte()),
            _ => bail!("{path}: unknown type '{name}'"),
        }
    }

    fn child(&self, obj: &Object, key: &str, path: &str) -> Result<Schema> {
        let value = obj.get(key).ok_or_else(|| anyhow!("{path}: missing '{key}'"))?;
        self.node(value, &format!("{path}.{key}"))
    }

    fn fields(&self, obj: &Object, path: &str) -> Result<Vec<Field>> {
        let list = obj
            .get("fields")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("{path}: missing 'fields' list"))?;
        list.iter()
            .enumerate()
            .map(|(i, entry)| {
                let path = format!("{path}.fields[{i}]");
                let entry = entry
                    .as_object()
                    .ok_or_else(|| anyhow!("{path}: expected a field table"))?;
                let schema = self.child(entry, "type", &path)?;
                let mut field = match entry.get("key") {
                    None | Some(Value::Null) => Field::anonymous(schema),
                    Some(Value::String(key)) => Field::new(key.as_str(), schema),
                    Some(_) => bail!("{path}.key: expected a string"),
                };
                if let Some(when) = entry.get("when") {
                    field = field.when(predicate(when, &format!("{path}.when"))?);
                }
                if entry.contains_key("publish") {
                    field = field.publish(string(entry, "publish", &path)?);
                }
                Ok(field)
            })
            .collect()
    }

    fn clauses(&self, obj: &Object, path: &str) -> Result<Vec<Clause>> {
        let list = obj
            .get("clauses")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("{path}: missing 'clauses' list"))?;
        if list.is_empty() {
            bail!("{path}.clauses: a union needs at least one clause");
        }
        list.iter()
            .enumerate()
            .map(|(i, entry)| {
                let path = format!("{path}.clauses[{i}]");
                let entry = entry
                    .as_object()
                    .ok_or_else(|| anyhow!("{path}: expected a clause table"))?;
                let schema = self.child(entry, "type", &path)?;
                let mut clause = match entry.get("when") {
                    None => Clause::always(schema),
                    Some(when) => Clause::when(predicate(when, &format!("{path}.when"))?, schema),
                };
                if entry.contains_key("publish") {
                    clause = clause.publish(string(entry, "publish", &path)?);
                }
                Ok(clause)
            })
            .collect()
    }
}

fn attributes(mut schema: Schema, obj: &Object, path: &str) -> Result<Schema> {
    if let Some(when) = obj.get("when") {
        schema = schema.with_hook(predicate(when, &format!("{path}.when"))?);
    }
    if let Some(pairs) = obj.get("decode") {
        schema = schema.with_decode(lookup(pairs, &format!("{path}.decode"))?);
    }
    if let Some(pairs) = obj.get("encode") {
        schema = schema.with_encode(lookup(pairs, &format!("{path}.encode"))?);
    }
    if obj.contains_key("publish") {
        schema = schema.with_publish(string(obj, "publish", path)?);
    }
    Ok(schema)
}

/// `{field, level?, equals}` tests a property of an enclosing container;
/// `{scratch, equals}` tests a published value.
fn predicate(value: &Value, path: &str) -> Result<Hook> {
    let obj = value
        .as_object()
        .ok_or_else(|| anyhow!("{path}: expected a predicate table"))?;
    let equals = obj.get("equals").ok_or_else(|| anyhow!("{path}: missing 'equals'"))?;
    let expected = to_val(equals, &format!("{path}.equals"))?;

    if obj.contains_key("field") {
        let name: Arc<str> = Arc::from(string(obj, "field", path)?);
        let level = match obj.get("level") {
            None => 0,
            Some(v) => v
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| anyhow!("{path}.level: expected a non-negative integer"))?,
        };
        Ok(Hook::new(move |stack, _, _| {
            Ok(stack.field(level, &name).is_some_and(|v| v == expected))
        }))
    } else if obj.contains_key("scratch") {
        let key: Arc<str> = Arc::from(string(obj, "scratch", path)?);
        Ok(Hook::new(move |_, scratch, _| {
            Ok(scratch.get(&key).is_some_and(|v| *v == expected))
        }))
    } else {
        bail!("{path}: predicate needs 'field' or 'scratch'")
    }
}

fn lookup(value: &Value, path: &str) -> Result<Filter> {
    let pairs = value
        .as_array()
        .ok_or_else(|| anyhow!("{path}: expected a list of [from, to] pairs"))?;
    let mut table = Vec::with_capacity(pairs.len());
    for (i, pair) in pairs.iter().enumerate() {
        match pair.as_array().map(Vec::as_slice) {
            Some([from, to]) => table.push((to_val(from, path)?, to_val(to, path)?)),
            _ => bail!("{path}[{i}]: expected a [from, to] pair"),
        }
    }
    Ok(Filter::lookup(table))
}

fn to_val(value: &Value, path: &str) -> Result<Val> {
    Val::deserialize(value).map_err(|e| anyhow!("{path}: {e}"))
}

fn string<'a>(obj: &'a Object, key: &str, path: &str) -> Result<&'a str> {
    match obj.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => bail!("{path}.{key}: expected a string"),
        None => bail!("{path}: missing '{key}'"),
    }
}

fn opt_width(obj: &Object, key: &str, path: &str) -> Result<Option<u32>> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| anyhow!("{path}.{key}: expected a non-negative integer")),
    }
}

fn width(obj: &Object, key: &str, path: &str) -> Result<u32> {
    opt_width(obj, key, path)?.ok_or_else(|| anyhow!("{path}: missing '{key}'"))
}
