use clap::{Parser, Subcommand};

mod cli;

use cli::classify::{cmd_classify, ClassifyArgs};
use cli::generate::{cmd_generate, GenerateArgs};

#[derive(Parser)]
#[command(
    name = "kforge",
    version,
    about = "Reaction-rate kernel generator for chemical-kinetics mechanisms"
)]
struct Cli {
    /// Log pipeline stages (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate the composed rate-constant kernel
    Generate(GenerateArgs),
    /// Print rate-law groups and specialization tiers
    Classify(ClassifyArgs),
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Generate(args) => cmd_generate(args),
        Command::Classify(args) => cmd_classify(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
