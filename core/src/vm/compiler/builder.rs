use rustc_hash::FxHashMap;

use crate::schema::NodeId;
use crate::vm::{Addr, Direction, Op, Program, ProgramPair};

/// Emits decode and encode instructions side by side and resolves forward
/// references once their targets are known.
pub(crate) struct ProgramBuilder {
    decode: Vec<Op>,
    encode: Vec<Op>,
    subroutine_addrs: FxHashMap<NodeId, Addr>,
    pending_calls: Vec<(Addr, NodeId)>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            decode: Vec::new(),
            encode: Vec::new(),
            subroutine_addrs: FxHashMap::default(),
            pending_calls: Vec::new(),
        }
    }

    /// Address the next emitted instruction will occupy.
    #[inline]
    pub fn here(&self) -> Addr {
        self.decode.len()
    }

    pub fn emit(&mut self, decode: Op, encode: Op) -> Addr {
        debug_assert_eq!(self.decode.len(), self.encode.len());
        let at = self.here();
        self.decode.push(decode);
        self.encode.push(encode);
        at
    }

    pub fn emit_both(&mut self, op: Op) -> Addr {
        self.emit(op.clone(), op)
    }

    /// Points the jump-like instruction at `at` (both columns) to `target`.
    pub fn patch(&mut self, at: Addr, target: Addr) {
        let d = self.decode[at].set_target(target);
        let e = self.encode[at].set_target(target);
        debug_assert!(d && e, "patched a non-jump instruction at {at}");
    }

    /// Resolves the "no match" edge of a union clause.
    pub fn patch_next(&mut self, at: Addr, target: Addr) {
        for op in [&mut self.decode[at], &mut self.encode[at]] {
            if let Op::Select { ref mut next, .. } = *op {
                *next = target;
            }
        }
    }

    /// Resolves the shared exit of a union clause, whichever form it has.
    pub fn patch_exit(&mut self, at: Addr, target: Addr) {
        for op in [&mut self.decode[at], &mut self.encode[at]] {
            match op {
                Op::Select { exit, .. } | Op::SelectAlways { exit } => *exit = target,
                _ => {}
            }
        }
    }

    pub fn mark_subroutine(&mut self, id: NodeId) {
        let at = self.here();
        self.subroutine_addrs.insert(id, at);
    }

    pub fn emit_call(&mut self, id: NodeId) -> Addr {
        let at = self.emit_both(Op::Call(0));
        self.pending_calls.push((at, id));
        at
    }

    /// Resolves call targets and freezes both programs.
    pub fn finish(mut self, subroutines: usize) -> anyhow::Result<ProgramPair> {
        let pending = std::mem::take(&mut self.pending_calls);
        for (at, id) in pending {
            let Some(&target) = self.subroutine_addrs.get(&id) else {
                anyhow::bail!("call at {at} refers to a subroutine that was never emitted");
            };
            self.patch(at, target);
        }
        Ok(ProgramPair {
            decode: Program {
                direction: Direction::Decode,
                code: self.decode,
            },
            encode: Program {
                direction: Direction::Encode,
                code: self.encode,
            },
            subroutines,
        })
    }
}
