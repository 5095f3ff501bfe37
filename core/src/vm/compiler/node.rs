use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use rustc_hash::FxHashSet;

use crate::host::HostFactory;
use crate::schema::{Clause, Field, Kind, Length, NodeId, Schema, SchemaNode};
use crate::vm::{Addr, Container, Effect, Key, Op, Scalar};

use super::builder::ProgramBuilder;

/// Depth-first code generation for schema nodes.
pub(super) struct NodeGen<'c> {
    pub(super) b: ProgramBuilder,
    subroutines: FxHashSet<NodeId>,
    generating: Vec<NodeId>,
    resolving: Vec<NodeId>,
    path: Vec<String>,
    host_factory: Option<&'c Arc<dyn HostFactory>>,
}

impl<'c> NodeGen<'c> {
    pub(super) fn new(
        b: ProgramBuilder,
        subroutines: FxHashSet<NodeId>,
        host_factory: Option<&'c Arc<dyn HostFactory>>,
    ) -> Self {
        Self {
            b,
            subroutines,
            generating: Vec::new(),
            resolving: Vec::new(),
            path: Vec::new(),
            host_factory,
        }
    }

    fn fail(&self, msg: impl std::fmt::Display) -> Error {
        anyhow!("{}: {}", self.path.concat(), msg)
    }

    pub(super) fn root(&mut self, root: &Schema) -> Result<()> {
        self.path = vec!["root".to_string()];
        self.node(root)
    }

    pub(super) fn subroutine(&mut self, schema: &Schema, path: &str) -> Result<()> {
        let id = schema.id();
        self.path = vec![path.to_string()];
        self.b.mark_subroutine(id);
        self.generating.push(id);
        self.node_body(schema)?;
        self.generating.pop();
        self.b.emit_both(Op::Return);
        Ok(())
    }

    fn node(&mut self, schema: &Schema) -> Result<()> {
        let id = schema.id();
        if self.subroutines.contains(&id) && !self.generating.contains(&id) {
            self.b.emit_call(id);
            return Ok(());
        }
        self.node_body(schema)
    }

    fn node_body(&mut self, schema: &Schema) -> Result<()> {
        let node = schema.node();
        let guard = node.hook.as_ref().map(|hook| {
            self.b.emit_both(Op::Hook {
                hook: hook.clone(),
                skip: 0,
            })
        });

        match &node.kind {
            Kind::Ptr(cell) => {
                let target = cell.get().ok_or_else(|| self.fail("unresolved pointer"))?;
                if node.decode.is_some() || node.encode.is_some() {
                    return Err(self.fail("filters are not allowed on a pointer; attach them to its target"));
                }
                let target_id = target.id();
                if self.resolving.contains(&target_id) {
                    return Err(self.fail("pointer cycle: pointer is already being dereferenced"));
                }
                self.resolving.push(target_id);
                self.node(target)?;
                self.resolving.pop();
            }
            Kind::Pad(bits) => {
                let bits = *bits as usize;
                self.b.emit(Op::Effect(Effect::SkipPad(bits)), Op::Effect(Effect::FillPad(bits)));
            }
            Kind::Align(bits) => {
                if *bits == 0 {
                    return Err(self.fail("align requires a positive bit count"));
                }
                let bits = *bits as usize;
                self.b.emit(Op::Effect(Effect::SkipAlign(bits)), Op::Effect(Effect::FillAlign(bits)));
            }
            Kind::Const(value) => {
                self.b.emit(Op::Store(value.clone()), Op::Nop);
            }
            Kind::Bool => self.scalar(Scalar::Bool, node),
            Kind::Byte => self.scalar(Scalar::Byte, node),
            Kind::Int(width) => {
                self.check_width("int", *width)?;
                self.scalar(Scalar::Int(*width), node);
            }
            Kind::Uint(width) => {
                self.check_width("uint", *width)?;
                self.scalar(Scalar::Uint(*width), node);
            }
            Kind::Float(width) => {
                if !matches!(width, 32 | 64) {
                    return Err(self.fail(format!("float width must be 32 or 64, got {width}")));
                }
                self.scalar(Scalar::Float(*width), node);
            }
            Kind::Fixed { int, frac } => {
                self.check_width("fixed", int.saturating_add(*frac))?;
                self.scalar(Scalar::Fixed(*int, *frac), node);
            }
            Kind::Ufixed { int, frac } => {
                self.check_width("ufixed", int.saturating_add(*frac))?;
                self.scalar(Scalar::Ufixed(*int, *frac), node);
            }
            Kind::Str { prefix } => {
                self.check_width("string length prefix", *prefix)?;
                self.scalar(Scalar::Str(*prefix), node);
            }
            Kind::Union(clauses) => self.union(clauses)?,
            Kind::Struct(fields) => self.container(Container::Struct, node, |g| g.fields(fields))?,
            Kind::Host { class, fields } => {
                let factory = self
                    .host_factory
                    .cloned()
                    .ok_or_else(|| self.fail(format!("host class '{class}' used without a host factory")))?;
                let container = Container::Host {
                    class: Arc::clone(class),
                    factory,
                };
                self.container(container, node, |g| g.fields(fields))?;
            }
            Kind::Array { length, element } => self.container(Container::List, node, |g| {
                let head = match length {
                    Length::Const(n) => g.b.emit_both(Op::LoopConst { bound: *n, exit: 0 }),
                    Length::Node(len) => {
                        g.path.push("#length".to_string());
                        g.b.emit(
                            Op::EnterCapture { seed_len: false },
                            Op::EnterCapture { seed_len: true },
                        );
                        g.node(len)?;
                        g.b.emit_both(Op::ExitCapture);
                        g.path.pop();
                        g.b.emit_both(Op::LoopComputed { exit: 0 })
                    }
                };
                g.repeat(head, element)
            })?,
            Kind::Vector { name, level, element } => self.container(Container::List, node, |g| {
                let head = g.b.emit_both(Op::LoopField {
                    name: Arc::clone(name),
                    level: *level,
                    exit: 0,
                });
                g.repeat(head, element)
            })?,
        }

        if let Some(key) = &node.publish {
            self.b.emit_both(Op::Publish(Arc::clone(key)));
        }
        if let Some(at) = guard {
            let after = self.b.here();
            self.b.patch(at, after);
        }
        Ok(())
    }

    fn check_width(&self, what: &str, width: u32) -> Result<()> {
        if width == 0 || width > 64 {
            return Err(self.fail(format!("{what} requires a bit width in 1..=64, got {width}")));
        }
        Ok(())
    }

    fn scalar(&mut self, scalar: Scalar, node: &SchemaNode) {
        let params = scalar.params();
        self.b.emit(
            Op::Read {
                scalar,
                params: Arc::clone(&params),
                filter: node.decode.clone(),
            },
            Op::Write {
                scalar,
                params,
                filter: node.encode.clone(),
            },
        );
    }

    fn container(
        &mut self,
        container: Container,
        node: &SchemaNode,
        body: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        self.b.emit(
            Op::EnterNew(container.clone()),
            Op::EnterExisting {
                container,
                filter: node.encode.clone(),
            },
        );
        body(self)?;
        self.b.emit(
            Op::ExitContainer {
                filter: node.decode.clone(),
            },
            Op::ExitDiscard,
        );
        Ok(())
    }

    fn fields(&mut self, fields: &[Field]) -> Result<()> {
        for (i, field) in fields.iter().enumerate() {
            self.path.push(match &field.key {
                Some(key) => format!(".{key}"),
                None => format!(".<{i}>"),
            });
            let key = field.key.clone().map(Key::Name).unwrap_or_default();
            self.b.emit_both(Op::SetKey(key));
            let guard = field.hook.as_ref().map(|hook| {
                self.b.emit_both(Op::Hook {
                    hook: hook.clone(),
                    skip: 0,
                })
            });
            self.node(&field.schema)?;
            if let Some(key) = &field.publish {
                self.b.emit_both(Op::Publish(Arc::clone(key)));
            }
            if let Some(at) = guard {
                let after = self.b.here();
                self.b.patch(at, after);
            }
            self.path.pop();
        }
        Ok(())
    }

    /// Loop body for arrays and vectors; `head` is the loop-init instruction.
    fn repeat(&mut self, head: Addr, element: &Schema) -> Result<()> {
        let body = self.b.here();
        self.path.push("[]".to_string());
        self.node(element)?;
        self.path.pop();
        self.b.emit_both(Op::LoopNext { body });
        let exit = self.b.here();
        self.b.patch(head, exit);
        Ok(())
    }

    fn union(&mut self, clauses: &[Clause]) -> Result<()> {
        if clauses.is_empty() {
            return Err(self.fail("union requires at least one clause"));
        }
        self.b.emit_both(Op::EnterScope);
        let mut selects = Vec::with_capacity(clauses.len());
        for (i, clause) in clauses.iter().enumerate() {
            self.path.push(format!("<{i}>"));
            let at = match &clause.when {
                Some(hook) => self.b.emit_both(Op::Select {
                    hook: hook.clone(),
                    next: 0,
                    exit: 0,
                }),
                None => self.b.emit_both(Op::SelectAlways { exit: 0 }),
            };
            selects.push(at);
            self.node(&clause.schema)?;
            if let Some(key) = &clause.publish {
                self.b.emit_both(Op::Publish(Arc::clone(key)));
            }
            // A clause that matched falls through; the next select sees the
            // cleared flag and skips straight to the exit.
            if clause.when.is_some() {
                let next = self.b.here();
                self.b.patch_next(at, next);
            }
            self.path.pop();
        }
        let exit = self.b.here();
        for at in selects {
            self.b.patch_exit(at, exit);
        }
        self.b.emit_both(Op::ExitScope);
        Ok(())
    }
}
