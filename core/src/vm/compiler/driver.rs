use std::sync::Arc;

use anyhow::{Result, bail};
use rustc_hash::FxHashSet;

use crate::codec::Codec;
use crate::host::HostFactory;
use crate::options::CodecOptions;
use crate::schema::Schema;
use crate::vm::{DependencyGraph, Op, ProgramPair};

use super::builder::ProgramBuilder;
use super::node::NodeGen;

/// Compiles a schema into a decode/encode program pair.
///
/// Layout of the emitted programs:
/// - a jump over the subroutine section (omitted when nothing is shared);
/// - one body per shared node, in first-visit order, each ending in `Return`;
/// - the main section generated depth-first from the root.
#[derive(Clone, Default)]
pub struct Compiler {
    host_factory: Option<Arc<dyn HostFactory>>,
    options: CodecOptions,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host_factory<F>(mut self, factory: F) -> Self
    where
        F: HostFactory + 'static,
    {
        self.host_factory = Some(Arc::new(factory));
        self
    }

    pub fn with_options(mut self, options: CodecOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    pub fn compile(&self, root: &Schema) -> Result<Codec> {
        let programs = self.compile_programs(root)?;
        Ok(Codec::from_parts(root.clone(), programs, self.options.clone()))
    }

    pub fn compile_programs(&self, root: &Schema) -> Result<ProgramPair> {
        let graph = DependencyGraph::analyze(root);
        if let Some(cycle) = graph.cycle() {
            bail!("{cycle}");
        }
        let shared = graph.subroutines();
        let ids: FxHashSet<_> = shared.iter().map(Schema::id).collect();
        let mut generator = NodeGen::new(ProgramBuilder::new(), ids, self.host_factory.as_ref());

        if !shared.is_empty() {
            let skip = generator.b.emit_both(Op::Jump(0));
            for sub in &shared {
                let path = graph.path_of(sub.id()).unwrap_or("root");
                generator.subroutine(sub, path)?;
            }
            let main = generator.b.here();
            generator.b.patch(skip, main);
        }

        generator.root(root)?;
        let programs = generator.b.finish(shared.len())?;
        tracing::debug!(
            nodes = graph.node_count(),
            subroutines = programs.subroutines,
            ops = programs.decode.len(),
            "compiled schema"
        );
        Ok(programs)
    }
}
