use std::sync::Arc;

use anyhow::Result;

use crate::buffer::{BitBuf, BitBuffer};
use crate::options::CodecOptions;
use crate::schema::Schema;
use crate::val::Val;
use crate::vm::{Compiler, ProgramPair, Vm};

/// A compiled schema. Immutable once built; every call runs on its own
/// register file, so one codec can serve many threads.
#[derive(Debug, Clone)]
pub struct Codec {
    schema: Schema,
    programs: Arc<ProgramPair>,
    options: CodecOptions,
}

impl Codec {
    pub(crate) fn from_parts(schema: Schema, programs: ProgramPair, options: CodecOptions) -> Self {
        Self {
            schema,
            programs: Arc::new(programs),
            options,
        }
    }

    /// Compiles with default options and no host factory.
    pub fn compile(schema: &Schema) -> Result<Self> {
        Compiler::new().compile(schema)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn programs(&self) -> &ProgramPair {
        &self.programs
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Val> {
        let mut buf = BitBuf::from_bytes(bytes);
        self.decode_from(&mut buf)
    }

    /// Decodes from the buffer's current position, leaving the cursor after
    /// the last bit read.
    pub fn decode_from(&self, buf: &mut dyn BitBuffer) -> Result<Val> {
        Vm::new(&self.programs.decode, buf, &self.options).run(Val::Nil)
    }

    pub fn encode(&self, value: &Val) -> Result<Vec<u8>> {
        let mut buf = BitBuf::new();
        self.encode_into(value, &mut buf)?;
        Ok(buf.into_bytes())
    }

    /// Encodes at the buffer's cursor. On error, bits written before the
    /// failing instruction stay in the buffer.
    pub fn encode_into(&self, value: &Val, buf: &mut dyn BitBuffer) -> Result<()> {
        Vm::new(&self.programs.encode, buf, &self.options).run(value.clone())?;
        Ok(())
    }
}
