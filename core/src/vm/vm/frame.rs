use std::sync::Arc;

use anyhow::Result;

use crate::val::Val;
use crate::vm::Key;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FrameKind {
    /// Holds the run's input or output value at index 0.
    Root,
    Container,
    /// Union scope; borrows the parent's container for its lifetime.
    Scope,
    /// One-slot frame a dynamic array length is computed in.
    Capture,
}

#[derive(Debug)]
pub(super) struct Frame {
    pub(super) container: Val,
    pub(super) key: Key,
    pub(super) bound: usize,
    /// Nothing in this scope has matched yet.
    pub(super) unmatched: bool,
    /// Container currently lent to a scope frame above.
    pub(super) lent: bool,
    pub(super) kind: FrameKind,
}

impl Frame {
    pub(super) fn root(value: Val) -> Self {
        Self::new(Val::List(Arc::new(vec![value])), Key::Index(0), FrameKind::Root)
    }

    pub(super) fn new(container: Val, key: Key, kind: FrameKind) -> Self {
        Self {
            container,
            key,
            bound: 0,
            unmatched: true,
            lent: false,
            kind,
        }
    }

    /// Value at the active key, `Nil` when absent.
    pub(super) fn get(&self) -> Val {
        match &self.key {
            Key::None => Val::Nil,
            Key::Name(name) => self.container.field(name).unwrap_or_default(),
            Key::Index(idx) => self.container.index(*idx).cloned().unwrap_or_default(),
        }
    }

    /// Stores at the active key. Without a key the value is dropped.
    pub(super) fn put(&mut self, value: Val) -> Result<()> {
        match &self.key {
            Key::None => Ok(()),
            Key::Name(name) => self.container.set_field(name, value),
            Key::Index(idx) => self.container.set_index(*idx, value),
        }
    }
}

/// Read-only view of the frame stack handed to hooks.
///
/// Level 0 is the active container, level 1 its parent and so on. Union
/// scopes share their parent's container and count as one level with it.
#[derive(Clone, Copy)]
pub struct StackView<'a> {
    current: &'a Frame,
    saved: &'a [Frame],
}

impl<'a> StackView<'a> {
    pub(super) fn new(current: &'a Frame, saved: &'a [Frame]) -> Self {
        Self { current, saved }
    }

    fn frames(self) -> impl Iterator<Item = &'a Frame> {
        std::iter::once(self.current)
            .chain(self.saved.iter().rev())
            .filter(|frame| !frame.lent)
    }

    /// Container `level` frames up, or `None` past the outermost one.
    pub fn level(&self, level: usize) -> Option<&'a Val> {
        self.frames()
            .nth(level)
            .filter(|frame| frame.kind != FrameKind::Root)
            .map(|frame| &frame.container)
    }

    /// Named property of the container `level` frames up.
    pub fn field(&self, level: usize, name: &str) -> Option<Val> {
        self.level(level).and_then(|container| container.field(name))
    }

    /// Number of levels visible to hooks.
    pub fn depth(&self) -> usize {
        self.frames().filter(|frame| frame.kind != FrameKind::Root).count()
    }

    /// Active keys from the root outwards, rendered as indexers.
    pub fn path(&self) -> String {
        self.saved
            .iter()
            .chain(std::iter::once(self.current))
            .filter(|frame| frame.kind == FrameKind::Container)
            .map(|frame| frame.key.to_string())
            .collect()
    }
}
