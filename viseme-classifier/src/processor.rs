//! Streaming analysis pipeline
//!
//! The stream processor reconciles the host's audio-callback block size
//! with the analysis window/hop, runs feature extraction and
//! classification per analysis step, and emits timestamped events. It is
//! driven synchronously by one caller thread, one `process` call per
//! callback; all buffers are sized at construction and no call on the
//! real-time path performs I/O or unbounded allocation.

use crate::buffer::SampleBuffer;
use crate::classifier::{Classifier, ModelUpdate};
use crate::features::{FeatureError, MfccConfig, MfccExtractor};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, trace};

/// Headroom beyond one window for incoming blocks.
const BLOCK_HEADROOM: usize = 4096;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("invalid processor configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Feature(#[from] FeatureError),
}

/// Voice-activity gating applied before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VadMode {
    /// Classify every analysis window
    Off,

    /// Report windows below the log-energy floor as "no mouth movement"
    /// without running the classifier
    Energy,
}

/// Stream processor configuration.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Sample rate of incoming PCM in Hz
    pub sample_rate: u32,

    /// Analysis window length in samples
    pub window: usize,

    /// Analysis hop in samples; must not exceed the window
    pub hop: usize,

    /// Emit a `Feature` event per analysis step
    pub feature_events: bool,

    /// Emit a `Frame` event per analysis step (hop resampled to the
    /// target rate; consumed by downsampling tooling)
    pub frame_events: bool,

    /// Emit a `Result` event per analysis step when a model is loaded
    pub result_events: bool,

    pub vad_mode: VadMode,

    /// Log-energy floor for `VadMode::Energy`
    pub vad_energy_floor: f32,

    /// Target rate for `Frame` events in Hz
    pub frame_target_rate: u32,

    /// Number of triangular mel filter bands
    pub mel_bands: usize,

    /// Number of base cepstral coefficients
    pub coeff_n: usize,

    /// Append the window log-energy to the feature vector
    pub include_energy: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        let mfcc = MfccConfig::default();
        Self {
            sample_rate: mfcc.sample_rate,
            window: mfcc.window,
            hop: 128,
            feature_events: false,
            frame_events: false,
            result_events: true,
            vad_mode: VadMode::Energy,
            vad_energy_floor: -5.0,
            frame_target_rate: 16000,
            mel_bands: mfcc.mel_bands,
            coeff_n: mfcc.coeff_n,
            include_energy: mfcc.include_energy,
        }
    }
}

impl ProcessorConfig {
    /// The extractor configuration implied by this processor config.
    pub fn mfcc(&self) -> MfccConfig {
        MfccConfig {
            sample_rate: self.sample_rate,
            window: self.window,
            mel_bands: self.mel_bands,
            coeff_n: self.coeff_n,
            include_energy: self.include_energy,
        }
    }

    /// Feature vector dimension produced per analysis step.
    pub fn dim(&self) -> usize {
        self.mfcc().dim()
    }

    pub fn validate(&self) -> Result<(), ProcessorError> {
        if self.hop == 0 {
            return Err(ProcessorError::InvalidConfig(
                "hop must be greater than 0".to_string(),
            ));
        }
        if self.hop > self.window {
            return Err(ProcessorError::InvalidConfig(format!(
                "hop ({}) must not exceed the window length ({})",
                self.hop, self.window
            )));
        }
        if self.frame_target_rate == 0 {
            return Err(ProcessorError::InvalidConfig(
                "frame_target_rate must be greater than 0".to_string(),
            ));
        }
        self.mfcc().validate()?;
        Ok(())
    }
}

/// One emitted analysis event.
///
/// Borrowed payloads point into the processor's scratch buffers and are
/// valid only until the next call that may overwrite them; a consumer that
/// must retain them across calls copies them out.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessorEvent<'a> {
    /// One feature vector per analysis step
    Feature {
        /// Seconds since the last timer reset
        t: f64,
        log_energy: f32,
        vector: &'a [f32],
    },

    /// The hop's worth of new audio resampled to the frame target rate
    Frame { samples: &'a [f32] },

    /// Classification outcome for the step's feature vector
    Result {
        t: f64,
        /// Winning viseme class, or `None` for silence/no mouth movement
        viseme: Option<u8>,
        distances: &'a [f32],
    },
}

/// Control messages applied by `update`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    /// Reset the running clock to zero. Buffered samples and the loaded
    /// model are untouched.
    pub timer_reset: bool,
}

/// Diagnostic counters.
#[derive(Debug, Clone)]
pub struct ProcessorStats {
    pub windows_processed: u64,
    pub buffered_samples: usize,
    pub model_prototypes: usize,
    pub clock_secs: f64,
}

/// Real-time streaming orchestrator.
pub struct StreamProcessor {
    config: ProcessorConfig,
    buffer: SampleBuffer,
    extractor: MfccExtractor,
    classifier: Classifier,
    pending_model: Option<ModelUpdate>,

    /// Samples consumed since the last timer reset
    clock_samples: u64,
    windows_processed: u64,

    window_scratch: Vec<f32>,
    frame_scratch: Vec<f32>,
    /// Source samples consumed / target samples emitted by the frame
    /// resampler, independent of the resettable clock
    frame_consumed: u64,
    frame_emitted: u64,
}

impl StreamProcessor {
    pub fn new(config: ProcessorConfig) -> Result<Self, ProcessorError> {
        config.validate()?;

        let extractor = MfccExtractor::new(config.mfcc())?;

        info!(
            "Creating stream processor: {} Hz, window {}, hop {}, D={}, vad {:?}",
            config.sample_rate,
            config.window,
            config.hop,
            config.dim(),
            config.vad_mode
        );

        let frame_capacity = (config.hop as u64 * config.frame_target_rate as u64)
            .div_ceil(config.sample_rate as u64) as usize
            + 2;

        Ok(Self {
            buffer: SampleBuffer::with_capacity(config.window + BLOCK_HEADROOM),
            extractor,
            classifier: Classifier::new(),
            pending_model: None,
            clock_samples: 0,
            windows_processed: 0,
            window_scratch: vec![0.0; config.window],
            frame_scratch: vec![0.0; frame_capacity],
            frame_consumed: 0,
            frame_emitted: 0,
            config,
        })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Ingest one PCM block of arbitrary length and run any analysis steps
    /// it completes, emitting events through `sink`.
    ///
    /// Synchronous and allocation-free; the emitted sequence depends only
    /// on the cumulative sample stream, not on how it is blocked.
    pub fn process(&mut self, block: &[f32], sink: &mut dyn FnMut(ProcessorEvent<'_>)) {
        let mut rest = block;
        while !rest.is_empty() {
            let written = self.buffer.write(rest);
            rest = &rest[written..];
            self.run_analysis_steps(sink);
        }
    }

    /// Apply control options. Effective immediately; the next emitted
    /// event after a timer reset carries timestamp zero.
    pub fn update(&mut self, options: UpdateOptions) {
        if options.timer_reset {
            self.clock_samples = 0;
            debug!("Timer reset");
        }
    }

    /// Queue a model replacement or extension. It takes effect atomically
    /// at the start of the next analysis step, never mid-step; buffered
    /// samples are undisturbed. A queued update replaces any earlier
    /// update that has not been applied yet.
    pub fn queue_model(&mut self, update: ModelUpdate) {
        debug!(
            "Model update queued: {} prototypes, reset={}",
            update.prototypes.len(),
            update.reset
        );
        self.pending_model = Some(update);
    }

    pub fn stats(&self) -> ProcessorStats {
        ProcessorStats {
            windows_processed: self.windows_processed,
            buffered_samples: self.buffer.len(),
            model_prototypes: self.classifier.len(),
            clock_secs: self.clock_samples as f64 / self.config.sample_rate as f64,
        }
    }

    /// Direct access to the embedded classifier, e.g. for loading a model
    /// before streaming starts.
    pub fn classifier_mut(&mut self) -> &mut Classifier {
        &mut self.classifier
    }

    fn run_analysis_steps(&mut self, sink: &mut dyn FnMut(ProcessorEvent<'_>)) {
        while self.buffer.len() >= self.config.window {
            if let Some(update) = self.pending_model.take() {
                let reset = update.reset;
                match self.classifier.import(update.prototypes, reset) {
                    Ok(()) => debug!(
                        "Model update applied: {} prototypes",
                        self.classifier.len()
                    ),
                    // All-or-nothing: a rejected update leaves the previous
                    // model in place and the stream keeps running
                    Err(e) => error!("Model update rejected: {}", e),
                }
            }

            let copied = self.buffer.peek_into(&mut self.window_scratch);
            debug_assert_eq!(copied, self.config.window);

            let t = self.clock_samples as f64 / self.config.sample_rate as f64;
            let log_energy = self.extractor.compute(&self.window_scratch).log_energy;
            trace!("Analysis step at t={:.4}s, log-energy {:.2}", t, log_energy);

            if self.config.feature_events {
                sink(ProcessorEvent::Feature {
                    t,
                    log_energy,
                    vector: self.extractor.features(),
                });
            }

            if self.config.frame_events {
                let emitted = self.resample_hop();
                if emitted > 0 {
                    sink(ProcessorEvent::Frame {
                        samples: &self.frame_scratch[..emitted],
                    });
                }
            } else {
                self.frame_consumed += self.config.hop as u64;
            }

            if self.config.result_events {
                if self.config.vad_mode == VadMode::Energy
                    && log_energy < self.config.vad_energy_floor
                {
                    sink(ProcessorEvent::Result {
                        t,
                        viseme: None,
                        distances: &[],
                    });
                } else if !self.classifier.is_empty() {
                    match self.classifier.predict(self.extractor.features()) {
                        Ok(prediction) => sink(ProcessorEvent::Result {
                            t,
                            viseme: prediction.viseme,
                            distances: prediction.distances,
                        }),
                        // Cannot happen with a consistent model; a defect,
                        // not a runtime condition: log and keep streaming
                        Err(e) => error!("Classification failed: {}", e),
                    }
                }
            }

            self.clock_samples += self.config.hop as u64;
            self.windows_processed += 1;
            self.buffer.skip(self.config.hop);
        }
    }

    /// Linearly resample the hop's worth of new audio (the oldest hop of
    /// the current window) to the frame target rate. The emitted/consumed
    /// counters carry the phase across steps so that concatenated frames
    /// reconstruct the stream without gaps or drift.
    fn resample_hop(&mut self) -> usize {
        let hop = self.config.hop;
        let source = &self.window_scratch[..hop];
        let step = self.config.sample_rate as f64 / self.config.frame_target_rate as f64;
        let consumed_after = (self.frame_consumed + hop as u64) as f64;

        let mut emitted = 0;
        loop {
            let position = (self.frame_emitted + emitted as u64) as f64 * step;
            if position >= consumed_after {
                break;
            }
            let offset = position - self.frame_consumed as f64;
            let index = offset as usize;
            let frac = (offset - index as f64) as f32;
            let s0 = source[index.min(hop - 1)];
            let s1 = source[(index + 1).min(hop - 1)];
            self.frame_scratch[emitted] = s0 + (s1 - s0) * frac;
            emitted += 1;
        }

        self.frame_consumed += hop as u64;
        self.frame_emitted += emitted as u64;
        emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Prototype;

    fn feature_config() -> ProcessorConfig {
        ProcessorConfig {
            feature_events: true,
            result_events: false,
            vad_mode: VadMode::Off,
            ..Default::default()
        }
    }

    fn tone(config: &ProcessorConfig, freq: f32, secs: f32) -> Vec<f32> {
        let count = (config.sample_rate as f32 * secs) as usize;
        (0..count)
            .map(|i| {
                let t = i as f32 / config.sample_rate as f32;
                0.4 * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect()
    }

    fn identity_prototype(label: &str, viseme: u8, mu: Vec<f32>) -> Prototype {
        let d = mu.len();
        let mut sigma_inv = vec![0.0; d * d];
        for i in 0..d {
            sigma_inv[i * d + i] = 1.0;
        }
        Prototype {
            label: label.to_string(),
            viseme,
            mu,
            sigma_inv,
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(ProcessorConfig::default().validate().is_ok());

        let mut config = ProcessorConfig::default();
        config.hop = config.window + 1;
        assert!(config.validate().is_err());

        let mut config = ProcessorConfig::default();
        config.hop = 0;
        assert!(config.validate().is_err());

        let mut config = ProcessorConfig::default();
        config.sample_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_event_count_matches_hop_arithmetic() {
        let config = feature_config();
        let mut processor = StreamProcessor::new(config.clone()).unwrap();

        let samples = tone(&config, 440.0, 1.0);
        let mut events = 0usize;
        processor.process(&samples, &mut |_| events += 1);

        // floor((len - window) / hop) + 1 analysis steps
        let expected = (samples.len() - config.window) / config.hop + 1;
        assert_eq!(events, expected);
        assert_eq!(processor.stats().windows_processed as usize, expected);
    }

    #[test]
    fn test_leftover_samples_carry_across_calls() {
        let config = feature_config();
        let mut processor = StreamProcessor::new(config.clone()).unwrap();

        // Half a window produces nothing
        let samples = tone(&config, 440.0, 1.0);
        let half = config.window / 2;
        let mut events = 0usize;
        processor.process(&samples[..half], &mut |_| events += 1);
        assert_eq!(events, 0);
        assert_eq!(processor.stats().buffered_samples, half);

        // The second half completes the first window
        processor.process(&samples[half..config.window], &mut |_| events += 1);
        assert_eq!(events, 1);
    }

    #[test]
    fn test_timestamps_increase_by_hop() {
        let config = feature_config();
        let mut processor = StreamProcessor::new(config.clone()).unwrap();

        let mut timestamps = Vec::new();
        processor.process(&tone(&config, 440.0, 0.5), &mut |event| {
            if let ProcessorEvent::Feature { t, .. } = event {
                timestamps.push(t);
            }
        });

        assert!(timestamps.len() > 2);
        assert_eq!(timestamps[0], 0.0);
        let hop_secs = config.hop as f64 / config.sample_rate as f64;
        for pair in timestamps.windows(2) {
            assert!((pair[1] - pair[0] - hop_secs).abs() < 1e-12);
        }
    }

    #[test]
    fn test_timer_reset_zeroes_next_timestamp() {
        let config = feature_config();
        let mut processor = StreamProcessor::new(config.clone()).unwrap();

        let samples = tone(&config, 440.0, 0.5);
        processor.process(&samples, &mut |_| {});
        assert!(processor.stats().clock_secs > 0.0);

        processor.update(UpdateOptions { timer_reset: true });

        let mut timestamps = Vec::new();
        processor.process(&samples, &mut |event| {
            if let ProcessorEvent::Feature { t, .. } = event {
                timestamps.push(t);
            }
        });
        assert_eq!(timestamps[0], 0.0);
        assert!(timestamps.windows(2).all(|p| p[1] > p[0]));
    }

    #[test]
    fn test_timer_reset_keeps_buffered_samples() {
        let config = feature_config();
        let mut processor = StreamProcessor::new(config.clone()).unwrap();

        processor.process(&tone(&config, 440.0, 0.01), &mut |_| {});
        let buffered = processor.stats().buffered_samples;
        assert!(buffered > 0);

        processor.update(UpdateOptions { timer_reset: true });
        assert_eq!(processor.stats().buffered_samples, buffered);
    }

    #[test]
    fn test_model_update_applies_between_steps() {
        let mut config = feature_config();
        config.result_events = true;
        let dim = config.dim();
        let mut processor = StreamProcessor::new(config.clone()).unwrap();

        // No model: feature events only
        let samples = tone(&config, 440.0, 0.2);
        let mut results = 0usize;
        processor.process(&samples, &mut |event| {
            if matches!(event, ProcessorEvent::Result { .. }) {
                results += 1;
            }
        });
        assert_eq!(results, 0);

        processor.queue_model(ModelUpdate {
            reset: true,
            prototypes: vec![identity_prototype("aa", 0, vec![0.0; dim])],
        });
        // Not applied until the next analysis step
        assert_eq!(processor.stats().model_prototypes, 0);

        processor.process(&samples, &mut |event| {
            if matches!(event, ProcessorEvent::Result { .. }) {
                results += 1;
            }
        });
        assert!(results > 0);
        assert_eq!(processor.stats().model_prototypes, 1);
    }

    #[test]
    fn test_rejected_model_update_keeps_previous_model() {
        let mut config = feature_config();
        config.result_events = true;
        let dim = config.dim();
        let mut processor = StreamProcessor::new(config.clone()).unwrap();
        let samples = tone(&config, 440.0, 0.2);

        processor.queue_model(ModelUpdate {
            reset: true,
            prototypes: vec![identity_prototype("aa", 0, vec![0.0; dim])],
        });
        processor.process(&samples, &mut |_| {});
        assert_eq!(processor.stats().model_prototypes, 1);

        // Wrong dimension: rejected whole, previous model kept
        processor.queue_model(ModelUpdate {
            reset: true,
            prototypes: vec![identity_prototype("E", 1, vec![0.0; dim + 1])],
        });
        processor.process(&samples, &mut |_| {});
        assert_eq!(processor.stats().model_prototypes, 1);
    }

    #[test]
    fn test_energy_vad_maps_quiet_windows_to_none() {
        let mut config = ProcessorConfig::default();
        config.vad_mode = VadMode::Energy;
        config.result_events = true;
        let dim = config.dim();
        let mut processor = StreamProcessor::new(config.clone()).unwrap();

        processor.queue_model(ModelUpdate {
            reset: true,
            prototypes: vec![identity_prototype("aa", 0, vec![0.0; dim])],
        });

        let silence = vec![0.0f32; config.sample_rate as usize / 4];
        let mut saw_result = false;
        processor.process(&silence, &mut |event| {
            if let ProcessorEvent::Result { viseme, distances, .. } = event {
                saw_result = true;
                assert_eq!(viseme, None);
                assert!(distances.is_empty());
            }
        });
        assert!(saw_result);
    }

    #[test]
    fn test_frame_events_resample_to_target_rate() {
        let mut config = feature_config();
        config.sample_rate = 48000;
        config.frame_events = true;
        config.feature_events = false;
        let mut processor = StreamProcessor::new(config.clone()).unwrap();

        let secs = 0.5;
        let samples = tone(&config, 440.0, secs);
        let mut frame_samples = 0usize;
        processor.process(&samples, &mut |event| {
            if let ProcessorEvent::Frame { samples } = event {
                frame_samples += samples.len();
            }
        });

        // Consumed source samples map to target-rate samples within one
        // hop of slack (the trailing partial window is never consumed)
        let consumed = processor.stats().windows_processed as usize * config.hop;
        let expected = consumed * config.frame_target_rate as usize / config.sample_rate as usize;
        assert!(
            (frame_samples as i64 - expected as i64).abs() <= 1,
            "expected ~{expected} samples, got {frame_samples}"
        );
    }

    #[test]
    fn test_large_block_is_fully_consumed() {
        let config = feature_config();
        let mut processor = StreamProcessor::new(config.clone()).unwrap();

        // Far larger than the ring capacity; must be chunked internally
        let samples = tone(&config, 300.0, 4.0);
        let mut events = 0usize;
        processor.process(&samples, &mut |_| events += 1);

        let expected = (samples.len() - config.window) / config.hop + 1;
        assert_eq!(events, expected);
    }
}
