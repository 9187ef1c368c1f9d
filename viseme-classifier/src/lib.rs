//! Real-time viseme classification library
//!
//! Classifies short windows of speech audio into a fixed set of 15 mouth
//! shapes for lip-sync animation. The streaming path (feature extraction +
//! nearest-prototype classification) is synchronous and allocation-free so
//! it can run inside an audio callback; model training and persistence run
//! offline through the estimator and codec.

pub mod buffer;
pub mod classifier;
pub mod codec;
pub mod features;
pub mod labels;
pub mod processor;
pub mod training;

// Re-export main types
pub use buffer::SampleBuffer;
pub use classifier::{Classifier, ClassifierError, ModelUpdate, Prediction, Prototype};
pub use codec::{CodecConfig, DataError, ModelCodec};
pub use features::{FeatureError, FeatureFrame, MfccConfig, MfccExtractor};
pub use labels::{LabelTable, SILENCE_LABEL, VISEMES, VISEME_SIL};
pub use processor::{
    ProcessorConfig, ProcessorError, ProcessorEvent, ProcessorStats, StreamProcessor,
    UpdateOptions, VadMode,
};
pub use training::{
    EstimatorConfig, PrototypeEstimator, TrainedPrototype, TrainingError, TRAINING_VECTOR_FLOOR,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
