use std::path::PathBuf;
use std::process;

use clap::Args;

use kforge::config::{CodegenOptions, Lang, MemoryLayout, SpecializationMode, VectorLayout};
use kforge::kernel::lower::{create_kernel_lowering, lowering_for};
use kforge::pipeline;

use super::{load_mechanism, or_exit};

#[derive(Args)]
pub struct GenerateArgs {
    /// Mechanism records (JSON)
    pub input: PathBuf,
    /// Options file with [codegen] and [vector] sections
    #[arg(long, value_name = "PATH")]
    pub options: Option<PathBuf>,
    /// Output backend: loopy, c or opencl (default: the configured language)
    #[arg(long)]
    pub target: Option<String>,
    /// Specialization mode: fixed, hybrid or full
    #[arg(long)]
    pub specialization: Option<SpecializationMode>,
    /// Vector layout: none, wide or deep
    #[arg(long)]
    pub vector_layout: Option<VectorLayout>,
    /// Vector width
    #[arg(long)]
    pub vector_width: Option<usize>,
    /// Emit every Arrhenius tier in one branching kernel
    #[arg(long)]
    pub single_kernel: bool,
    /// Memory layout: row-major or column-major
    #[arg(long)]
    pub memory_layout: Option<MemoryLayout>,
    /// Language of the generated source: c or opencl
    #[arg(long)]
    pub lang: Option<Lang>,
    /// Use atomic updates for shared accumulation under deep vectorization
    #[arg(long)]
    pub atomics: bool,
    /// Print declarations instead of the full source
    #[arg(long)]
    pub header: bool,
    /// Also print host-side memory management code
    #[arg(long)]
    pub memory: bool,
    /// Write the source to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl GenerateArgs {
    /// Options file values, overridden by the flags given.
    fn options(&self) -> CodegenOptions {
        let mut opts = match &self.options {
            Some(path) => or_exit(CodegenOptions::load(path)),
            None => CodegenOptions::default(),
        };
        if let Some(mode) = self.specialization {
            opts.specialization = mode;
        }
        if let Some(layout) = self.vector_layout {
            opts.vector_layout = layout;
        }
        if self.vector_width.is_some() {
            opts.vector_width = self.vector_width;
        }
        if self.single_kernel {
            opts.split_rate_kernels = false;
        }
        if let Some(layout) = self.memory_layout {
            opts.memory_layout = layout;
        }
        if let Some(lang) = self.lang {
            opts.lang = lang;
        }
        if self.atomics {
            opts.use_atomics = true;
        }
        opts
    }
}

pub fn cmd_generate(args: GenerateArgs) {
    let opts = args.options();
    let lowering = match args.target.as_deref() {
        Some(name) => match create_kernel_lowering(name) {
            Some(l) => l,
            None => {
                eprintln!("error: unknown target '{}' (expected loopy, c or opencl)", name);
                process::exit(1);
            }
        },
        None => lowering_for(opts.lang),
    };

    let mech = load_mechanism(&args.input);
    let generated = or_exit(pipeline::generate(&mech, &opts));

    let mut text = if args.header {
        generated.composed.header(lowering.as_ref())
    } else {
        generated.composed.source(lowering.as_ref())
    };
    if args.memory {
        let manager = generated.memory(&opts);
        for section in [
            manager.definitions(),
            manager.allocations(),
            manager.transfers_in(),
            manager.transfers_out(),
            manager.frees(),
        ] {
            if !section.is_empty() {
                text.push('\n');
                text.push_str(&section.join("\n"));
                text.push('\n');
            }
        }
    }

    match args.output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, &text) {
                eprintln!("error: cannot write '{}': {}", path.display(), e);
                process::exit(1);
            }
            eprintln!(
                "Generated {} kernels -> {}",
                generated.composed.kernels.len(),
                path.display()
            );
        }
        None => print!("{}", text),
    }
}
