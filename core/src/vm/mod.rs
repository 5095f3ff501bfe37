//! Schema compiler and register VM.
//!
//! A schema is compiled into two programs emitted in lockstep, one for decoding
//! and one for encoding. Shared subtrees become subroutines, and the VM runs
//! either program over an explicit frame stack.

mod analysis;
mod bytecode;
mod compiler;
#[allow(clippy::module_inception)]
mod vm;

pub use analysis::*;
pub use bytecode::*;
pub use compiler::*;
pub use vm::*;
