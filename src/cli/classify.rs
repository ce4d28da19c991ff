use std::path::PathBuf;

use clap::Args;

use kforge::config::{CodegenOptions, SpecializationMode};
use kforge::pipeline::{self, Summary};

use super::{load_mechanism, or_exit};

#[derive(Args)]
pub struct ClassifyArgs {
    /// Mechanism records (JSON)
    pub input: PathBuf,
    /// Specialization mode: fixed, hybrid or full
    #[arg(long, default_value = "hybrid")]
    pub specialization: SpecializationMode,
}

pub fn cmd_classify(args: ClassifyArgs) {
    let mech = load_mechanism(&args.input);
    let opts = CodegenOptions::default().with_specialization(args.specialization);
    let classification = or_exit(pipeline::classify(&mech, &opts));
    println!("{}", Summary(&classification));
}
