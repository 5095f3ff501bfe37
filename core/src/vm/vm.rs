mod exec;
mod frame;

use crate::buffer::BitBuffer;
use crate::options::CodecOptions;
use crate::schema::Scratch;
use crate::val::Val;
use crate::vm::{Addr, Program};

use frame::Frame;
pub use frame::StackView;

/// Register file for one run of a program.
///
/// Created fresh per decode/encode call, so a compiled codec can be shared
/// between threads while each run owns its own frames and scratch table.
pub struct Vm<'a> {
    program: &'a Program,
    buffer: &'a mut dyn BitBuffer,
    options: &'a CodecOptions,
    pc: Addr,
    frame: Frame,
    saved: Vec<Frame>,
    returns: Vec<Addr>,
    scratch: Scratch,
}

impl<'a> Vm<'a> {
    pub fn new(program: &'a Program, buffer: &'a mut dyn BitBuffer, options: &'a CodecOptions) -> Self {
        Self {
            program,
            buffer,
            options,
            pc: 0,
            frame: Frame::root(Val::Nil),
            saved: Vec::new(),
            returns: Vec::new(),
            scratch: Scratch::default(),
        }
    }

    /// Stack accessor over the current frame and its ancestors.
    pub fn stack(&self) -> StackView<'_> {
        StackView::new(&self.frame, &self.saved)
    }
}
