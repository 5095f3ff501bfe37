//! Schema model: the typed declaration tree a codec is compiled from.

use std::fmt;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;

use crate::val::Val;
use crate::vm::StackView;

pub mod document;


/// Run-wide mapping of publish keys to values.
pub type Scratch = FxHashMap<Arc<str>, Val>;

pub type Predicate = dyn Fn(&StackView<'_>, &Scratch, bool) -> Result<bool> + Send + Sync;

pub type FilterFn = dyn Fn(Val, &[u32]) -> Result<Val> + Send + Sync;

/// Predicate deciding whether a node (or union clause) is processed.
///
/// Receives the stack accessor, the scratch mapping and the scope's
/// "nothing matched yet" flag.
#[derive(Clone)]
pub struct Hook(Arc<Predicate>);

impl Hook {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&StackView<'_>, &Scratch, bool) -> Result<bool> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn check(&self, stack: &StackView<'_>, scratch: &Scratch, unmatched: bool) -> Result<bool> {
        (self.0)(stack, scratch, unmatched)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hook(<fn>)")
    }
}

/// Value transform applied after a read or before a write.
#[derive(Clone)]
pub enum Filter {
    Func(Arc<FilterFn>),
    /// Lookup table of `(from, to)` pairs; a miss yields `Nil`.
    Lookup(Arc<Vec<(Val, Val)>>),
}

impl Filter {
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(Val, &[u32]) -> Result<Val> + Send + Sync + 'static,
    {
        Filter::Func(Arc::new(f))
    }

    pub fn lookup<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<Val>,
        B: Into<Val>,
    {
        Filter::Lookup(Arc::new(pairs.into_iter().map(|(a, b)| (a.into(), b.into())).collect()))
    }

    pub fn apply(&self, value: Val, params: &[u32]) -> Result<Val> {
        match self {
            Filter::Func(f) => f(value, params),
            Filter::Lookup(pairs) => Ok(pairs
                .iter()
                .find(|(from, _)| *from == value)
                .map(|(_, to)| to.clone())
                .unwrap_or(Val::Nil)),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Func(_) => write!(f, "Filter(<fn>)"),
            Filter::Lookup(pairs) => write!(f, "Filter(lookup, {} entries)", pairs.len()),
        }
    }
}

/// Length of an `array`: fixed, or decoded/encoded by a nested node.
#[derive(Debug, Clone)]
pub enum Length {
    Const(usize),
    Node(Schema),
}

#[derive(Debug, Clone)]
pub struct Field {
    pub key: Option<Arc<str>>,
    pub schema: Schema,
    pub hook: Option<Hook>,
    pub publish: Option<Arc<str>>,
}

impl Field {
    pub fn new(key: impl Into<Arc<str>>, schema: Schema) -> Self {
        Self {
            key: Some(key.into()),
            schema,
            hook: None,
            publish: None,
        }
    }

    /// Field with no key; its value is dropped on decode and taken as `Nil` on encode.
    pub fn anonymous(schema: Schema) -> Self {
        Self {
            key: None,
            schema,
            hook: None,
            publish: None,
        }
    }

    pub fn when(mut self, hook: Hook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn publish(mut self, key: impl Into<Arc<str>>) -> Self {
        self.publish = Some(key.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct Clause {
    /// `None` selects unconditionally.
    pub when: Option<Hook>,
    pub schema: Schema,
    pub publish: Option<Arc<str>>,
}

impl Clause {
    pub fn when(hook: Hook, schema: Schema) -> Self {
        Self {
            when: Some(hook),
            schema,
            publish: None,
        }
    }

    pub fn always(schema: Schema) -> Self {
        Self {
            when: None,
            schema,
            publish: None,
        }
    }

    pub fn publish(mut self, key: impl Into<Arc<str>>) -> Self {
        self.publish = Some(key.into());
        self
    }
}

#[derive(Debug, Clone)]
pub enum Kind {
    /// Lazily resolved reference, allowing forward references.
    Ptr(OnceCell<Schema>),
    Pad(u32),
    Align(u32),
    Const(Val),
    Bool,
    Int(u32),
    Uint(u32),
    Byte,
    Float(u32),
    Fixed { int: u32, frac: u32 },
    Ufixed { int: u32, frac: u32 },
    /// Byte string preceded by an unsigned length of `prefix` bits.
    Str { prefix: u32 },
    Union(Vec<Clause>),
    Struct(Vec<Field>),
    Array { length: Length, element: Schema },
    /// Array whose length is the field `name` of the container `level` frames up.
    Vector { name: Arc<str>, level: usize, element: Schema },
    Host { class: Arc<str>, fields: Vec<Field> },
}

impl Kind {
    pub fn tag(&self) -> &'static str {
        match self {
            Kind::Ptr(_) => "ptr",
            Kind::Pad(_) => "pad",
            Kind::Align(_) => "align",
            Kind::Const(_) => "const",
            Kind::Bool => "bool",
            Kind::Int(_) => "int",
            Kind::Uint(_) => "uint",
            Kind::Byte => "byte",
            Kind::Float(_) => "float",
            Kind::Fixed { .. } => "fixed",
            Kind::Ufixed { .. } => "ufixed",
            Kind::Str { .. } => "string",
            Kind::Union(_) => "union",
            Kind::Struct(_) => "struct",
            Kind::Array { .. } => "array",
            Kind::Vector { .. } => "vector",
            Kind::Host { .. } => "host",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub kind: Kind,
    pub hook: Option<Hook>,
    pub decode: Option<Filter>,
    pub encode: Option<Filter>,
    pub publish: Option<Arc<str>>,
}

/// Identity of a schema node, stable for as long as the node is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Shared handle to an immutable schema node. Cloning keeps the identity,
/// so a handle used in several places is compiled once as a subroutine.
#[derive(Clone)]
pub struct Schema(Arc<SchemaNode>);

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            // Pointers may be cyclic; print only whether they are resolved.
            Kind::Ptr(cell) => write!(f, "ptr({})", if cell.get().is_some() { "resolved" } else { "unresolved" }),
            kind => kind.fmt(f),
        }
    }
}

impl Schema {
    pub fn new(kind: Kind) -> Self {
        Self(Arc::new(SchemaNode {
            kind,
            hook: None,
            decode: None,
            encode: None,
            publish: None,
        }))
    }

    pub fn id(&self) -> NodeId {
        NodeId(Arc::as_ptr(&self.0) as usize)
    }

    pub fn node(&self) -> &SchemaNode {
        &self.0
    }

    pub fn kind(&self) -> &Kind {
        &self.0.kind
    }

    fn modify(self, f: impl FnOnce(&mut SchemaNode)) -> Self {
        let mut node = Arc::try_unwrap(self.0).unwrap_or_else(|shared| (*shared).clone());
        f(&mut node);
        Self(Arc::new(node))
    }

    pub fn with_hook(self, hook: Hook) -> Self {
        self.modify(|n| n.hook = Some(hook))
    }

    pub fn with_decode(self, filter: Filter) -> Self {
        self.modify(|n| n.decode = Some(filter))
    }

    pub fn with_encode(self, filter: Filter) -> Self {
        self.modify(|n| n.encode = Some(filter))
    }

    pub fn with_publish(self, key: impl Into<Arc<str>>) -> Self {
        let key = key.into();
        self.modify(|n| n.publish = Some(key))
    }

    /// Unresolved pointer; bind it later with [`Schema::resolve`].
    pub fn ptr() -> Self {
        Self::new(Kind::Ptr(OnceCell::new()))
    }

    pub fn ptr_to(target: &Schema) -> Self {
        Self::new(Kind::Ptr(OnceCell::with_value(target.clone())))
    }

    pub fn resolve(&self, target: &Schema) -> Result<()> {
        match &self.0.kind {
            Kind::Ptr(cell) => cell
                .set(target.clone())
                .map_err(|_| anyhow!("pointer is already resolved")),
            other => bail!("cannot resolve a {} node", other.tag()),
        }
    }

    /// Target of a pointer, if this is one and it is resolved.
    pub fn target(&self) -> Option<&Schema> {
        match &self.0.kind {
            Kind::Ptr(cell) => cell.get(),
            _ => None,
        }
    }

    pub fn pad(bits: u32) -> Self {
        Self::new(Kind::Pad(bits))
    }

    pub fn align(bits: u32) -> Self {
        Self::new(Kind::Align(bits))
    }

    pub fn constant(value: impl Into<Val>) -> Self {
        Self::new(Kind::Const(value.into()))
    }

    pub fn boolean() -> Self {
        Self::new(Kind::Bool)
    }

    pub fn int(width: u32) -> Self {
        Self::new(Kind::Int(width))
    }

    pub fn uint(width: u32) -> Self {
        Self::new(Kind::Uint(width))
    }

    pub fn byte() -> Self {
        Self::new(Kind::Byte)
    }

    pub fn float(width: u32) -> Self {
        Self::new(Kind::Float(width))
    }

    pub fn fixed(int: u32, frac: u32) -> Self {
        Self::new(Kind::Fixed { int, frac })
    }

    pub fn ufixed(int: u32, frac: u32) -> Self {
        Self::new(Kind::Ufixed { int, frac })
    }

    pub fn string(prefix: u32) -> Self {
        Self::new(Kind::Str { prefix })
    }

    pub fn union(clauses: Vec<Clause>) -> Self {
        Self::new(Kind::Union(clauses))
    }

    pub fn structure(fields: Vec<Field>) -> Self {
        Self::new(Kind::Struct(fields))
    }

    pub fn array(length: usize, element: Schema) -> Self {
        Self::new(Kind::Array {
            length: Length::Const(length),
            element,
        })
    }

    /// Array whose element count is itself encoded by `length`.
    pub fn array_prefixed(length: Schema, element: Schema) -> Self {
        Self::new(Kind::Array {
            length: Length::Node(length),
            element,
        })
    }

    /// Array sized by the sibling field `name`.
    pub fn vector(name: impl Into<Arc<str>>, element: Schema) -> Self {
        Self::vector_at(name, 1, element)
    }

    pub fn vector_at(name: impl Into<Arc<str>>, level: usize, element: Schema) -> Self {
        Self::new(Kind::Vector {
            name: name.into(),
            level,
            element,
        })
    }

    pub fn host(class: impl Into<Arc<str>>, fields: Vec<Field>) -> Self {
        Self::new(Kind::Host {
            class: class.into(),
            fields,
        })
    }

    /// Nested nodes, in declaration order. Pointers yield their target.
    pub fn children(&self) -> Vec<(Option<Arc<str>>, Schema)> {
        match &self.0.kind {
            Kind::Ptr(cell) => cell.get().map(|t| (None, t.clone())).into_iter().collect(),
            Kind::Struct(fields) | Kind::Host { fields, .. } => {
                fields.iter().map(|f| (f.key.clone(), f.schema.clone())).collect()
            }
            Kind::Union(clauses) => clauses.iter().map(|c| (None, c.schema.clone())).collect(),
            Kind::Array { length, element } => {
                let mut out = Vec::with_capacity(2);
                if let Length::Node(len) = length {
                    out.push((Some(Arc::from("#length")), len.clone()));
                }
                out.push((Some(Arc::from("[]")), element.clone()));
                out
            }
            Kind::Vector { element, .. } => vec![(Some(Arc::from("[]")), element.clone())],
            _ => Vec::new(),
        }
    }
}
