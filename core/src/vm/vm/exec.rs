use std::mem;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};

use crate::schema::Filter;
use crate::val::Val;
use crate::vm::{Container, Effect, Key, Op, Scalar};

use super::Vm;
use super::frame::{Frame, FrameKind, StackView};

impl Vm<'_> {
    /// Runs the program to completion. `input` is the value to encode (ignored
    /// when decoding); the returned value is whatever ends up at the root.
    pub fn run(mut self, input: Val) -> Result<Val> {
        self.frame = Frame::root(input);
        let program = self.program;
        while self.pc < program.code.len() {
            let op = &program.code[self.pc];
            if let Err(err) = self.step(op) {
                let path = StackView::new(&self.frame, &self.saved).path();
                tracing::trace!(pc = self.pc, direction = ?program.direction, path = %path, "run halted: {err:#}");
                return Err(if path.is_empty() {
                    err
                } else {
                    err.context(format!("at {path}"))
                });
            }
        }
        if !self.saved.is_empty() {
            bail!("program ended with {} unclosed frames", self.saved.len());
        }
        Ok(self.frame.get())
    }

    fn step(&mut self, op: &Op) -> Result<()> {
        let mut next = self.pc + 1;
        match op {
            Op::Nop => {}
            Op::Read { scalar, params, filter } => {
                let value = self.read_scalar(*scalar)?;
                let value = apply(filter, value, params)?;
                self.frame.put(value)?;
            }
            Op::Write { scalar, params, filter } => {
                let value = match self.frame.get() {
                    Val::Nil => scalar.zero(),
                    value => value,
                };
                let value = apply(filter, value, params)?;
                self.write_scalar(*scalar, &value)?;
            }
            Op::Effect(effect) => match *effect {
                Effect::SkipPad(bits) => self.buffer.read_pad(bits)?,
                Effect::FillPad(bits) => self.buffer.write_pad(bits)?,
                Effect::SkipAlign(bits) => self.buffer.read_align(bits)?,
                Effect::FillAlign(bits) => self.buffer.write_align(bits)?,
            },
            Op::Store(value) => self.frame.put(value.clone())?,
            Op::EnterNew(container) => {
                let value = zero_container(container)?;
                self.push(Frame::new(value, Key::None, FrameKind::Container))?;
            }
            Op::EnterExisting { container, filter } => {
                let value = match self.frame.get() {
                    Val::Nil => zero_container(container)?,
                    value => value,
                };
                let value = apply(filter, value, &[])?;
                check_container(container, &value)?;
                self.push(Frame::new(value, Key::None, FrameKind::Container))?;
            }
            Op::EnterScope => {
                let container = mem::take(&mut self.frame.container);
                let key = self.frame.key.clone();
                self.frame.lent = true;
                self.push(Frame::new(container, key, FrameKind::Scope))?;
            }
            Op::EnterCapture { seed_len } => {
                let seed = if *seed_len {
                    Val::from(self.frame.container.len() as i64)
                } else {
                    Val::Nil
                };
                self.push(Frame::root(seed))?;
                self.frame.kind = FrameKind::Capture;
            }
            Op::SetKey(key) => self.frame.key = key.clone(),
            Op::ExitContainer { filter } => {
                let child = self.pop()?;
                let value = apply(filter, child.container, &[])?;
                self.frame.put(value)?;
            }
            Op::ExitDiscard => {
                self.pop()?;
            }
            Op::ExitScope => {
                let scope = self.pop()?;
                self.frame.container = scope.container;
                self.frame.lent = false;
            }
            Op::ExitCapture => {
                let capture = self.pop()?;
                self.frame.bound = capture.get().as_bound();
            }
            Op::LoopConst { bound, exit } => {
                next = self.begin_loop(*bound, *exit)?;
            }
            Op::LoopField { name, level, exit } => {
                let bound = self
                    .stack()
                    .field(*level, name)
                    .map(|v| v.as_bound())
                    .unwrap_or(0);
                next = self.begin_loop(bound, *exit)?;
            }
            Op::LoopComputed { exit } => {
                next = self.begin_loop(self.frame.bound, *exit)?;
            }
            Op::LoopNext { body } => {
                if let Key::Index(idx) = self.frame.key {
                    if idx + 1 < self.frame.bound {
                        self.frame.key = Key::Index(idx + 1);
                        next = *body;
                    }
                }
            }
            Op::Hook { hook, skip } => {
                let matched = hook.check(&self.stack(), &self.scratch, self.frame.unmatched)?;
                if matched {
                    self.frame.unmatched = false;
                } else {
                    next = *skip;
                }
            }
            Op::Select { hook, next: miss, exit } => {
                if !self.frame.unmatched {
                    next = *exit;
                } else if hook.check(&self.stack(), &self.scratch, true)? {
                    self.frame.unmatched = false;
                } else {
                    next = *miss;
                }
            }
            Op::SelectAlways { exit } => {
                if self.frame.unmatched {
                    self.frame.unmatched = false;
                } else {
                    next = *exit;
                }
            }
            Op::Publish(key) => {
                self.scratch.insert(Arc::clone(key), self.frame.get());
            }
            Op::Jump(addr) => next = *addr,
            Op::Call(addr) => {
                tracing::trace!(from = self.pc, to = addr, "call");
                self.returns.push(self.pc + 1);
                next = *addr;
            }
            Op::Return => {
                next = self
                    .returns
                    .pop()
                    .ok_or_else(|| anyhow!("return at {} without a matching call", self.pc))?;
            }
        }
        self.pc = next;
        Ok(())
    }

    fn push(&mut self, frame: Frame) -> Result<()> {
        if self.saved.len() + 1 >= self.options.max_depth {
            bail!("frame stack exceeds the maximum depth of {}", self.options.max_depth);
        }
        let parent = mem::replace(&mut self.frame, frame);
        self.saved.push(parent);
        Ok(())
    }

    fn pop(&mut self) -> Result<Frame> {
        let parent = self.saved.pop().ok_or_else(|| anyhow!("frame stack underflow"))?;
        Ok(mem::replace(&mut self.frame, parent))
    }

    /// Sets up the first iteration and returns where execution continues.
    fn begin_loop(&mut self, bound: usize, exit: usize) -> Result<usize> {
        if let Some(max) = self.options.max_iterations {
            if bound > max {
                bail!("loop bound {bound} exceeds the limit of {max} iterations");
            }
        }
        self.frame.bound = bound;
        self.frame.key = Key::Index(0);
        Ok(if bound == 0 { exit } else { self.pc + 1 })
    }

    fn read_scalar(&mut self, scalar: Scalar) -> Result<Val> {
        let buf = &mut *self.buffer;
        Ok(match scalar {
            Scalar::Bool => Val::Bool(buf.read_bool()?),
            Scalar::Int(width) => Val::Int(buf.read_int(width)?),
            Scalar::Uint(width) => Val::from(buf.read_uint(width)?),
            Scalar::Byte => Val::Int(buf.read_byte()? as i64),
            Scalar::Float(width) => Val::Float(buf.read_float(width)?),
            Scalar::Fixed(int, frac) => Val::Float(buf.read_fixed(int, frac)?),
            Scalar::Ufixed(int, frac) => Val::Float(buf.read_ufixed(int, frac)?),
            Scalar::Str(prefix) => {
                let bytes = buf.read_prefixed(prefix)?;
                let text = String::from_utf8(bytes).map_err(|_| anyhow!("string is not valid utf-8"))?;
                Val::from(text)
            }
        })
    }

    fn write_scalar(&mut self, scalar: Scalar, value: &Val) -> Result<()> {
        let buf = &mut *self.buffer;
        match scalar {
            Scalar::Bool => match value {
                Val::Bool(b) => buf.write_bool(*b),
                other => Err(mismatch("Bool", other)),
            },
            Scalar::Int(width) => buf.write_int(width, integral(value)?),
            Scalar::Uint(width) => buf.write_uint(width, unsigned(value)?),
            Scalar::Byte => {
                let v = unsigned(value)?;
                let byte = u8::try_from(v).map_err(|_| anyhow!("value {v} does not fit in a byte"))?;
                buf.write_byte(byte)
            }
            Scalar::Float(width) => buf.write_float(width, number(value)?),
            Scalar::Fixed(int, frac) => buf.write_fixed(int, frac, number(value)?),
            Scalar::Ufixed(int, frac) => buf.write_ufixed(int, frac, number(value)?),
            Scalar::Str(prefix) => match value {
                Val::Str(s) => buf.write_prefixed(prefix, s.as_bytes()),
                other => Err(mismatch("String", other)),
            },
        }
    }
}

fn apply(filter: &Option<Filter>, value: Val, params: &[u32]) -> Result<Val> {
    match filter {
        Some(filter) => filter.apply(value, params),
        None => Ok(value),
    }
}

fn zero_container(container: &Container) -> Result<Val> {
    match container {
        Container::Struct => Ok(Val::empty_map()),
        Container::List => Ok(Val::empty_list()),
        Container::Host { class, factory } => Ok(Val::Host(factory.instantiate(class)?)),
    }
}

fn check_container(container: &Container, value: &Val) -> Result<()> {
    match (container, value) {
        (Container::Struct, Val::Map(_)) | (Container::List, Val::List(_)) => Ok(()),
        (Container::Host { class, .. }, Val::Host(obj)) => {
            if obj.class_name() == class.as_ref() {
                Ok(())
            } else {
                bail!("expected host object of class '{class}', got '{}'", obj.class_name())
            }
        }
        (Container::Struct, other) => Err(mismatch("Map", other)),
        (Container::List, other) => Err(mismatch("List", other)),
        (Container::Host { class, .. }, other) => Err(mismatch(class, other)),
    }
}

fn mismatch(expected: &str, got: &Val) -> anyhow::Error {
    anyhow!("expected {expected}, got {}", got.type_name())
}

fn number(value: &Val) -> Result<f64> {
    value.as_number().ok_or_else(|| mismatch("number", value))
}

fn integral(value: &Val) -> Result<i64> {
    match value {
        Val::Int(i) => Ok(*i),
        Val::Uint(u) => bail!("value {u} does not fit in a signed integer"),
        Val::Float(f) if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 => Ok(*f as i64),
        Val::Float(f) => bail!("expected integer, got {f}"),
        other => Err(mismatch("integer", other)),
    }
}

fn unsigned(value: &Val) -> Result<u64> {
    match value {
        Val::Int(i) => u64::try_from(*i).map_err(|_| anyhow!("value {i} is negative")),
        Val::Uint(u) => Ok(*u),
        Val::Float(f) if f.fract() == 0.0 && *f >= 0.0 && *f < u64::MAX as f64 => Ok(*f as u64),
        Val::Float(f) => bail!("expected unsigned integer, got {f}"),
        other => Err(mismatch("unsigned integer", other)),
    }
}
