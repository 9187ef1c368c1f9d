//! WAV downsampler CLI
//!
//! Resamples a WAV file to 16 kHz through the same streaming frame path
//! the classifier uses, so training audio matches runtime audio exactly.

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use viseme_classifier::{ProcessorConfig, ProcessorEvent, StreamProcessor, VadMode};
use viseme_trainer::dataset::FEED_BLOCK;
use viseme_trainer::{init_logging, read_wav_mono, write_wav_16k};

#[derive(Parser)]
#[command(name = "downsample")]
#[command(about = "Downsamples audio (.wav) into 16 kHz audio", long_about = None)]
struct Cli {
    /// Input file (.wav)
    #[arg(short, long)]
    input: PathBuf,

    /// Output file (.wav)
    #[arg(short, long)]
    output: PathBuf,

    /// Replace the output file if it exists
    #[arg(long = "override")]
    override_output: bool,
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

    let clip = read_wav_mono(&cli.input)?;
    println!(
        "Read {}: {} samples at {} Hz",
        cli.input.display(),
        clip.samples.len(),
        clip.sample_rate
    );

    let mut processor = StreamProcessor::new(ProcessorConfig {
        sample_rate: clip.sample_rate,
        frame_events: true,
        result_events: false,
        vad_mode: VadMode::Off,
        ..Default::default()
    })?;

    let mut pcm = Vec::new();
    for block in clip.samples.chunks(FEED_BLOCK) {
        processor.process(block, &mut |event| {
            if let ProcessorEvent::Frame { samples } = event {
                pcm.extend_from_slice(samples);
            }
        });
    }

    if pcm.is_empty() {
        bail!("Input too short to produce any output frames.");
    }

    write_wav_16k(&cli.output, &pcm)?;
    println!(
        "✓ Saved {} ({} samples at 16 kHz)",
        cli.output.display(),
        pcm.len()
    );

    Ok(())
}
