use std::fmt;
use std::sync::Arc;

use crate::host::HostFactory;
use crate::schema::{Filter, Hook};
use crate::val::Val;

/// Position in a program.
pub type Addr = usize;

/// Where the active frame reads and writes inside its container.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Key {
    #[default]
    None,
    Name(Arc<str>),
    Index(usize),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::None => Ok(()),
            Key::Name(name) => write!(f, "[{name:?}]"),
            Key::Index(idx) => write!(f, "[{idx}]"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Bool,
    Int(u32),
    Uint(u32),
    Byte,
    Float(u32),
    Fixed(u32, u32),
    Ufixed(u32, u32),
    Str(u32),
}

impl Scalar {
    /// Parameters handed to filters alongside the value.
    pub fn params(&self) -> Arc<[u32]> {
        match *self {
            Scalar::Bool => Arc::from([1u32]),
            Scalar::Byte => Arc::from([8u32]),
            Scalar::Int(w) | Scalar::Uint(w) | Scalar::Float(w) | Scalar::Str(w) => Arc::from([w]),
            Scalar::Fixed(i, f) | Scalar::Ufixed(i, f) => Arc::from([i, f]),
        }
    }

    pub fn zero(&self) -> Val {
        match self {
            Scalar::Bool => Val::Bool(false),
            Scalar::Int(_) | Scalar::Uint(_) | Scalar::Byte => Val::Int(0),
            Scalar::Float(_) | Scalar::Fixed(..) | Scalar::Ufixed(..) => Val::Float(0.0),
            Scalar::Str(_) => Val::Str(Arc::from("")),
        }
    }
}

/// Buffer-only effects with no value attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    SkipPad(usize),
    FillPad(usize),
    SkipAlign(usize),
    FillAlign(usize),
}

#[derive(Clone)]
pub enum Container {
    Struct,
    List,
    Host { class: Arc<str>, factory: Arc<dyn HostFactory> },
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Container::Struct => write!(f, "Struct"),
            Container::List => write!(f, "List"),
            Container::Host { class, .. } => write!(f, "Host({class})"),
        }
    }
}

/// One instruction. Decode and encode programs are emitted in lockstep, so an
/// address means the same schema position in both.
#[derive(Debug, Clone)]
pub enum Op {
    Nop,
    /// Decode a scalar, filter it, store it at the active key.
    Read {
        scalar: Scalar,
        params: Arc<[u32]>,
        filter: Option<Filter>,
    },
    /// Load the active key (zero-value when absent), filter it, encode it.
    Write {
        scalar: Scalar,
        params: Arc<[u32]>,
        filter: Option<Filter>,
    },
    Effect(Effect),
    /// Store a literal at the active key.
    Store(Val),
    /// Push a frame around a fresh empty container.
    EnterNew(Container),
    /// Push a frame around the value at the active key (or its zero-value).
    EnterExisting {
        container: Container,
        filter: Option<Filter>,
    },
    /// Push a frame that keeps the current container and key.
    EnterScope,
    /// Push a one-slot scratch frame for a length node. When `seed_len` is set
    /// the slot starts out holding the active container's element count.
    EnterCapture {
        seed_len: bool,
    },
    SetKey(Key),
    /// Pop, filter the finished container and store it in the parent.
    ExitContainer {
        filter: Option<Filter>,
    },
    /// Pop and drop the child container.
    ExitDiscard,
    /// Pop a scope frame, handing its container back to the parent.
    ExitScope,
    /// Pop a capture frame and keep its slot as the parent's loop bound.
    ExitCapture,
    LoopConst {
        bound: usize,
        exit: Addr,
    },
    LoopField {
        name: Arc<str>,
        level: usize,
        exit: Addr,
    },
    LoopComputed {
        exit: Addr,
    },
    LoopNext {
        body: Addr,
    },
    Hook {
        hook: Hook,
        skip: Addr,
    },
    Select {
        hook: Hook,
        next: Addr,
        exit: Addr,
    },
    SelectAlways {
        exit: Addr,
    },
    Publish(Arc<str>),
    Jump(Addr),
    Call(Addr),
    Return,
}

impl Op {
    /// Rewrites the forward target of a jump-like instruction.
    pub(crate) fn set_target(&mut self, target: Addr) -> bool {
        match self {
            Op::Jump(addr) | Op::Call(addr) => *addr = target,
            Op::LoopConst { exit, .. }
            | Op::LoopField { exit, .. }
            | Op::LoopComputed { exit }
            | Op::SelectAlways { exit } => *exit = target,
            Op::Hook { skip, .. } => *skip = target,
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Decode,
    Encode,
}

#[derive(Debug, Clone)]
pub struct Program {
    pub direction: Direction,
    pub code: Vec<Op>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

/// Compiled decode and encode programs for one schema.
#[derive(Debug, Clone)]
pub struct ProgramPair {
    pub decode: Program,
    pub encode: Program,
    /// Number of shared subroutine bodies.
    pub subroutines: usize,
}
