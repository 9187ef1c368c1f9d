//! Model compiler CLI

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use viseme_trainer::{compile_model, find_recordings, init_logging, CompilerConfig};

#[derive(Parser)]
#[command(name = "compile-model")]
#[command(
    about = "Compiles speech (.wav) and labeled spans (.json) into a Gaussian binary model (.bin)",
    long_about = None
)]
struct Cli {
    /// Directory with paired .wav and .json input files
    #[arg(short, long, default_value = ".")]
    input: PathBuf,

    /// Output binary model file (.bin)
    #[arg(short, long)]
    output: PathBuf,

    /// Replace the output file if it exists
    #[arg(long = "override")]
    override_output: bool,

    /// Analysis hop in samples
    #[arg(long, default_value_t = 32)]
    hop: usize,
}

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    if cli.output.exists() && !cli.override_output {
        bail!(
            "Output file {:?} already exists. Use --override to replace it.",
            cli.output
        );
    }

    let pairs = find_recordings(&cli.input)?;
    println!("Recordings found:");
    for (wav, _) in &pairs {
        println!("  {}", wav.display());
    }

    let config = CompilerConfig {
        hop: cli.hop,
        ..Default::default()
    };
    let (bytes, stats) = compile_model(&pairs, &config)?;

    fs::write(&cli.output, &bytes)
        .with_context(|| format!("failed to write {:?}", cli.output))?;

    println!(
        "✓ Model written to {}: {} classes trained, {} skipped, {} training vectors",
        cli.output.display(),
        stats.classes_trained,
        stats.classes_skipped,
        stats.total_vectors
    );

    Ok(())
}
