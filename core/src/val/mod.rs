use std::{fmt, sync::Arc};

use anyhow::{Result, anyhow};
use rustc_hash::FxHashMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::host::HostObject;

mod de;

pub use de::{
    Format, detect_format, from_json_str, from_toml_str, from_yaml_str, parse_document, parse_with_format,
};


pub type FieldMap = FxHashMap<Arc<str>, Val>;

/// Structured value produced by decoding and consumed by encoding.
///
/// Containers are reference counted and copy-on-write, so handing an input
/// value to the encoder never deep-copies it.
#[derive(Debug, Default, Clone)]
pub enum Val {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    /// Unsigned integer above `i64::MAX`; smaller values are always `Int`.
    Uint(u64),
    Float(f64),
    Str(Arc<str>),
    List(Arc<Vec<Val>>),
    Map(Arc<FieldMap>),
    /// Instance produced by the embedding application's host factory.
    Host(Arc<dyn HostObject>),
}

impl Val {
    pub fn empty_list() -> Self {
        Val::List(Arc::new(Vec::new()))
    }

    pub fn empty_map() -> Self {
        Val::Map(Arc::new(FieldMap::default()))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Nil => "Nil",
            Val::Bool(_) => "Bool",
            Val::Int(_) => "Int",
            Val::Uint(_) => "Uint",
            Val::Float(_) => "Float",
            Val::Str(_) => "String",
            Val::List(_) => "List",
            Val::Map(_) => "Map",
            Val::Host(_) => "Host",
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Val::Nil)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Val::Int(i) => Some(*i as f64),
            Val::Uint(u) => Some(*u as f64),
            Val::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Interprets the value as a loop bound: floored, with anything
    /// non-numeric or negative treated as zero.
    pub fn as_bound(&self) -> usize {
        match self {
            Val::Int(i) if *i > 0 => *i as usize,
            Val::Uint(u) => usize::try_from(*u).unwrap_or(usize::MAX),
            Val::Float(f) if f.is_finite() && *f >= 1.0 => f.floor() as usize,
            _ => 0,
        }
    }

    /// Number of elements for lists, strings (bytes) and maps.
    pub fn len(&self) -> usize {
        match self {
            Val::List(items) => items.len(),
            Val::Map(fields) => fields.len(),
            Val::Str(s) => s.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads a named property from a map or host object.
    pub fn field(&self, name: &str) -> Option<Val> {
        match self {
            Val::Map(fields) => fields.get(name).cloned(),
            Val::Host(obj) => obj.get(name),
            _ => None,
        }
    }

    pub fn index(&self, idx: usize) -> Option<&Val> {
        match self {
            Val::List(items) => items.get(idx),
            _ => None,
        }
    }

    pub fn set_field(&mut self, name: &Arc<str>, value: Val) -> Result<()> {
        match self {
            Val::Map(fields) => {
                Arc::make_mut(fields).insert(Arc::clone(name), value);
                Ok(())
            }
            Val::Host(obj) => {
                if Arc::get_mut(obj).is_none() {
                    *obj = Arc::from(obj.duplicate());
                }
                match Arc::get_mut(obj) {
                    Some(inner) => inner.set(name, value),
                    None => Err(anyhow!("host object '{}' is shared and cannot be updated", obj.class_name())),
                }
            }
            other => Err(anyhow!("cannot set field '{}' on {}", name, other.type_name())),
        }
    }

    /// Stores `value` at `idx`, growing the list with `Nil` as needed.
    pub fn set_index(&mut self, idx: usize, value: Val) -> Result<()> {
        match self {
            Val::List(items) => {
                let items = Arc::make_mut(items);
                if idx >= items.len() {
                    items.resize(idx + 1, Val::Nil);
                }
                items[idx] = value;
                Ok(())
            }
            other => Err(anyhow!("cannot index {} with [{}]", other.type_name(), idx)),
        }
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Nil, Val::Nil) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Int(a), Val::Int(b)) => a == b,
            (Val::Float(a), Val::Float(b)) => a == b,
            (Val::Int(a), Val::Float(b)) | (Val::Float(b), Val::Int(a)) => (*a as f64) == *b,
            (Val::Uint(a), Val::Uint(b)) => a == b,
            (Val::Uint(a), Val::Float(b)) | (Val::Float(b), Val::Uint(a)) => (*a as f64) == *b,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::List(a), Val::List(b)) => a == b,
            (Val::Map(a), Val::Map(b)) => a == b,
            (Val::Host(a), Val::Host(b)) => Arc::ptr_eq(a, b) || a.properties() == b.properties(),
            _ => false,
        }
    }
}

impl Serialize for Val {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Val::Nil => serializer.serialize_unit(),
            Val::Bool(b) => serializer.serialize_bool(*b),
            Val::Int(i) => serializer.serialize_i64(*i),
            Val::Uint(u) => serializer.serialize_u64(*u),
            Val::Float(f) => serializer.serialize_f64(*f),
            Val::Str(s) => serializer.serialize_str(s),
            Val::List(items) => (**items).serialize(serializer),
            Val::Map(fields) => {
                // Stable key order keeps printed documents diffable.
                let mut entries: Vec<_> = fields.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k.as_ref(), v)?;
                }
                map.end()
            }
            Val::Host(obj) => {
                let props = obj.properties();
                let mut map = serializer.serialize_map(Some(props.len() + 1))?;
                map.serialize_entry("__class", obj.class_name())?;
                for (k, v) in &props {
                    map.serialize_entry(k.as_ref(), v)?;
                }
                map.end()
            }
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Nil => write!(f, "nil"),
            Val::Bool(b) => write!(f, "{b}"),
            Val::Int(i) => write!(f, "{i}"),
            Val::Uint(u) => write!(f, "{u}"),
            Val::Float(fl) => write!(f, "{fl}"),
            Val::Str(s) => write!(f, "{s:?}"),
            Val::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Val::Map(fields) => {
                let mut keys: Vec<_> = fields.keys().collect();
                keys.sort();
                write!(f, "{{")?;
                for (i, k) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, fields[*k])?;
                }
                write!(f, "}}")
            }
            Val::Host(obj) => write!(f, "<{}>", obj.class_name()),
        }
    }
}

impl From<bool> for Val {
    fn from(b: bool) -> Self {
        Val::Bool(b)
    }
}

impl From<i64> for Val {
    fn from(i: i64) -> Self {
        Val::Int(i)
    }
}

impl From<i32> for Val {
    fn from(i: i32) -> Self {
        Val::Int(i as i64)
    }
}

impl From<u64> for Val {
    fn from(u: u64) -> Self {
        if u <= i64::MAX as u64 {
            Val::Int(u as i64)
        } else {
            Val::Uint(u)
        }
    }
}

impl From<f64> for Val {
    fn from(f: f64) -> Self {
        Val::Float(f)
    }
}

impl From<&str> for Val {
    fn from(s: &str) -> Self {
        Val::Str(Arc::from(s))
    }
}

impl From<String> for Val {
    fn from(s: String) -> Self {
        Val::Str(Arc::from(s))
    }
}

impl<T> From<Vec<T>> for Val
where
    T: Into<Val>,
{
    fn from(v: Vec<T>) -> Self {
        Val::List(Arc::new(v.into_iter().map(Into::into).collect()))
    }
}

impl<K, V> FromIterator<(K, V)> for Val
where
    K: AsRef<str>,
    V: Into<Val>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let fields: FieldMap = iter
            .into_iter()
            .map(|(k, v)| (Arc::from(k.as_ref()), v.into()))
            .collect();
        Val::Map(Arc::new(fields))
    }
}
