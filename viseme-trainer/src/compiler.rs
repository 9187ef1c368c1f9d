//! Model compilation pipeline
//!
//! Drives the full offline path: pair WAV recordings with their span
//! files, stream each clip through the feature extractor, slice vectors
//! into per-class training sets, add the synthetic silence class, then
//! estimate and encode one Gaussian prototype per class.

use crate::dataset::{collect_class_vectors, synthesize_silence, ClassVectors};
use crate::spans::{load_spans, SpanError};
use crate::wav::{read_wav_mono, WavError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use viseme_classifier::{
    DataError, EstimatorConfig, ModelCodec, ProcessorConfig, ProcessorError, PrototypeEstimator,
    StreamProcessor, TrainingError, VadMode, SILENCE_LABEL, TRAINING_VECTOR_FLOOR, VISEME_SIL,
};

#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Wav(#[from] WavError),

    #[error(transparent)]
    Span(#[from] SpanError),

    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error(transparent)]
    Training(#[from] TrainingError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("failed to scan input: {0}")]
    Io(#[from] std::io::Error),

    #[error("no WAV recordings found in {0}")]
    NoRecordings(PathBuf),

    #[error("recording {0} has no span file {1}")]
    MissingSpans(PathBuf, PathBuf),

    #[error("{file}: sample rate {actual} Hz differs from the first recording ({expected} Hz)")]
    SampleRateMismatch {
        file: PathBuf,
        expected: u32,
        actual: u32,
    },

    #[error("no class reached the {floor}-vector training floor")]
    NoTrainableClasses { floor: usize },
}

/// Compilation settings.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Analysis hop in samples; dense by default for training coverage
    pub hop: usize,

    /// Number of synthetic silence-class vectors
    pub silence_count: usize,

    /// Seed for the synthetic silence generator
    pub silence_seed: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            hop: 32,
            silence_count: 5000,
            silence_seed: 0,
        }
    }
}

/// Per-run compilation statistics.
#[derive(Debug, Clone, Default)]
pub struct CompileStats {
    pub recordings: usize,
    pub classes_trained: usize,
    pub classes_skipped: usize,
    pub total_vectors: usize,
}

/// Find WAV recordings under a directory, paired with their span files
/// (same stem, `.json` extension). Sorted by path for a deterministic
/// class order.
pub fn find_recordings(input: &Path) -> Result<Vec<(PathBuf, PathBuf)>, CompileError> {
    let mut wavs: Vec<PathBuf> = fs::read_dir(input)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("wav"))
                .unwrap_or(false)
        })
        .collect();
    wavs.sort();

    if wavs.is_empty() {
        return Err(CompileError::NoRecordings(input.to_path_buf()));
    }

    let mut pairs = Vec::with_capacity(wavs.len());
    for wav in wavs {
        let json = wav.with_extension("json");
        if !json.exists() {
            return Err(CompileError::MissingSpans(wav, json));
        }
        pairs.push((wav, json));
    }
    Ok(pairs)
}

/// Compile paired recordings into binary model bytes.
pub fn compile_model(
    pairs: &[(PathBuf, PathBuf)],
    config: &CompilerConfig,
) -> Result<(Vec<u8>, CompileStats), CompileError> {
    let first = read_wav_mono(&pairs[0].0)?;

    let processor_config = ProcessorConfig {
        sample_rate: first.sample_rate,
        hop: config.hop,
        feature_events: true,
        result_events: false,
        vad_mode: VadMode::Off,
        ..Default::default()
    };
    let dim = processor_config.dim();
    let mut processor = StreamProcessor::new(processor_config)?;

    // Warm-up pass over the first clip settles the delta history before
    // any vector is attributed
    info!("Warm-up over {:?}", pairs[0].0);
    for block in first.samples.chunks(crate::dataset::FEED_BLOCK) {
        processor.process(block, &mut |_| {});
    }

    let mut classes: Vec<ClassVectors> = Vec::new();
    for (i, (wav, json)) in pairs.iter().enumerate() {
        info!("Processing {}/{}: {:?}", i + 1, pairs.len(), wav);

        let clip = read_wav_mono(wav)?;
        if clip.sample_rate != first.sample_rate {
            return Err(CompileError::SampleRateMismatch {
                file: wav.clone(),
                expected: first.sample_rate,
                actual: clip.sample_rate,
            });
        }
        let spans = load_spans(json)?;
        collect_class_vectors(&mut processor, &clip.samples, &spans, &mut classes);
    }

    classes.push(ClassVectors {
        label: SILENCE_LABEL.to_string(),
        viseme: VISEME_SIL,
        vectors: synthesize_silence(dim, config.silence_count, config.silence_seed),
    });

    for class in &classes {
        info!("Class '{}': {} vectors", class.label, class.vectors.len());
    }

    let estimator = PrototypeEstimator::new(EstimatorConfig {
        dim,
        ..Default::default()
    })?;
    let codec = ModelCodec::for_dim(dim)?;

    let mut stats = CompileStats {
        recordings: pairs.len(),
        ..Default::default()
    };
    let mut bytes = Vec::new();

    for class in &classes {
        stats.total_vectors += class.vectors.len();

        if class.vectors.len() < TRAINING_VECTOR_FLOOR {
            warn!(
                "Skipping '{}'/{} with {} vectors (floor is {})",
                class.label,
                class.viseme,
                class.vectors.len(),
                TRAINING_VECTOR_FLOOR
            );
            stats.classes_skipped += 1;
            continue;
        }

        let trained =
            match estimator.compute_prototype(&class.label, 0, class.viseme, &class.vectors) {
                Ok(trained) => trained,
                Err(TrainingError::SingularCovariance { label }) => {
                    warn!("Skipping '{}': covariance is singular", label);
                    stats.classes_skipped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

        bytes.extend(codec.encode(&trained.prototype)?);
        stats.classes_trained += 1;
        info!(
            "Prototype '{}' [{}] from {} vectors",
            class.label,
            viseme_classifier::VISEMES[class.viseme as usize],
            trained.sample_count
        );
    }

    if stats.classes_trained == 0 {
        return Err(CompileError::NoTrainableClasses {
            floor: TRAINING_VECTOR_FLOOR,
        });
    }

    Ok((bytes, stats))
}
