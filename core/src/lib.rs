//! Bit-level binary codecs compiled from declarative schemas.
//!
//! A [`Schema`](schema::Schema) tree is compiled once by the
//! [`Compiler`](vm::Compiler) into a [`Codec`](codec::Codec) holding a pair of
//! bytecode programs; the codec then decodes bytes into [`Val`](val::Val)s and
//! encodes them back.

pub mod buffer;
pub mod codec;
pub mod host;
pub mod options;
pub mod schema;
pub mod val;
pub mod vm;

pub use codec::Codec;
pub use schema::Schema;
pub use val::Val;
