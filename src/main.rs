use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, Level};

use streamgen::{render, CompilerOptions, RustRenderer, TypeRegistry};

/// Compiles method descriptors into Rust pipeline code.
#[derive(Parser, Debug)]
#[command(name = "streamgen", version)]
struct Args {
    /// descriptor files to compile, one class each.
    #[arg(required = true)]
    descriptors: Vec<PathBuf>,

    /// where generated files are written.
    #[arg(short, long, default_value = "generated")]
    output_dir: PathBuf,

    /// fail when no method of a class compiles.
    #[arg(long)]
    deny_empty_class: bool,

    /// print generated code instead of writing files.
    #[arg(long)]
    stdout: bool,

    /// include source locations in log lines.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    streamgen::logging::init(Level::WARN, args.verbose);
    let options = CompilerOptions {
        deny_empty_class: args.deny_empty_class,
    };
    let renderer = RustRenderer::new();
    let mut dropped = 0;
    for path in &args.descriptors {
        let translation = streamgen::compile_file(
            path,
            TypeRegistry::new(),
            options.clone(),
            &renderer,
            |file_name, text| {
                if args.stdout {
                    print!("{}", text);
                    Ok(())
                } else {
                    render::persist(&args.output_dir.join(file_name), text)
                }
            },
        )
        .with_context(|| format!("compiling {}", path.display()))?;
        for f in &translation.failures {
            eprintln!("{}", f);
        }
        dropped += translation.failures.len();
        info!(
            "{}: {} methods",
            translation.class_unit.qualified_name(),
            translation.class_unit.methods.len()
        );
    }
    if dropped > 0 {
        bail!("{} methods could not be compiled", dropped);
    }
    Ok(())
}
