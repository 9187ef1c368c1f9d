//! Offline training tools for the viseme classifier
//!
//! Turns labeled recordings (WAV audio plus span JSON with phoneme/viseme
//! timestamps) into the binary Gaussian model the real-time classifier
//! loads, and downsamples arbitrary-rate WAV files to 16 kHz through the
//! same streaming path the classifier uses.

pub mod compiler;
pub mod dataset;
pub mod spans;
pub mod wav;

pub use compiler::{compile_model, find_recordings, CompileError, CompileStats, CompilerConfig};
pub use dataset::{collect_class_vectors, synthesize_silence, ClassVectors};
pub use spans::{load_spans, LabeledSpan, SpanError};
pub use wav::{read_wav_mono, write_wav_16k, MonoClip, WavError};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "viseme_trainer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
