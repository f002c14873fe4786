//! streamgen compiles query-backed method descriptors into pipeline code.
//!
//! For each method, the parameter types become tables of a schema, a planning oracle turns the
//! method's query into a relational operator tree, and the tree is lowered into an ordered list of
//! lazy sequence statements. The methods of a class are then assembled, with shared marshalling
//! helpers, into a class unit that a renderer turns into source text.

mod ast;
mod ast_to_ir;
pub mod codegen;
pub mod descriptor;
pub mod ir;
pub mod logging;
pub mod lowering;
pub mod marshal;
pub mod oracle;
pub mod parser;
pub mod pipeline;
pub mod pipeline_interpreter;
mod pt_to_ast;
pub mod registry;
pub mod render;
pub mod row;
pub mod schema;
pub mod sql_type;
pub mod sql_value;
pub mod translator;
pub mod walker;

extern crate pest;
#[macro_use]
extern crate pest_derive;

use std::path::Path;

pub use descriptor::{ClassDescriptor, Descriptor, MethodDescriptor};
pub use oracle::{PlanOracle, PlanOutcome, SqlOracle};
pub use registry::TypeRegistry;
pub use render::{Renderer, RustRenderer};
pub use translator::{CompilerOptions, Translation, Translator};

/// Loads the descriptor file at `path`, registers the types it declares on top of `registry`, and
/// compiles it with the bundled SQL oracle. The rendered file name and text go to `sink`.
pub fn compile_file<R, F>(
    path: &Path,
    mut registry: TypeRegistry,
    options: CompilerOptions,
    renderer: &R,
    sink: F,
) -> Result<Translation, translator::Error>
where
    R: Renderer + ?Sized,
    F: FnOnce(&str, &str) -> Result<(), render::Error>,
{
    let descriptor = Descriptor::load(path)?;
    descriptor.register_types(&mut registry);
    Translator::new(SqlOracle::new(), registry)
        .with_options(options)
        .translate_and_render(&descriptor.class, renderer, sink)
}
