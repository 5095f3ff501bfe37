mod builder;
mod driver;
mod node;

pub use driver::Compiler;
