//! Training dataset assembly
//!
//! Streams labeled clips through the real-time feature path and slices
//! the resulting vectors into per-class training sets, attributing each
//! vector to the span whose window contains its timestamp. The silence
//! class gets synthetic low-amplitude vectors instead of recorded audio.

use crate::spans::LabeledSpan;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};
use viseme_classifier::{ProcessorEvent, StreamProcessor, UpdateOptions};

/// Block size used when feeding clips to the processor, matching the
/// smallest real-time callback the pipeline must handle.
pub const FEED_BLOCK: usize = 128;

/// Feature vectors below this window log-energy carry no articulation
/// signal and are not attributed to any span.
pub const TRAINING_ENERGY_FLOOR: f32 = -5.0;

/// Training vectors accumulated for one phoneme class.
#[derive(Debug, Clone)]
pub struct ClassVectors {
    pub label: String,
    pub viseme: u8,
    pub vectors: Vec<Vec<f32>>,
}

/// Stream one labeled clip and append its feature vectors to the matching
/// classes. Classes keep first-seen order across clips; the processor's
/// clock is reset so span timestamps line up per clip.
pub fn collect_class_vectors(
    processor: &mut StreamProcessor,
    samples: &[f32],
    spans: &[LabeledSpan],
    classes: &mut Vec<ClassVectors>,
) {
    processor.update(UpdateOptions { timer_reset: true });

    let mut ndx = 0usize;
    let mut attributed = 0usize;

    for block in samples.chunks(FEED_BLOCK) {
        processor.process(block, &mut |event| {
            let ProcessorEvent::Feature {
                t,
                log_energy,
                vector,
            } = event
            else {
                return;
            };
            if log_energy < TRAINING_ENERGY_FLOOR {
                return;
            }

            let t_ms = t * 1000.0;
            while ndx < spans.len() && t_ms > spans[ndx].end_ms {
                ndx += 1;
            }
            let Some(span) = spans.get(ndx) else {
                return;
            };
            if t_ms < span.start_ms {
                return;
            }

            match classes.iter_mut().find(|c| c.label == span.phoneme) {
                Some(class) => class.vectors.push(vector.to_vec()),
                None => classes.push(ClassVectors {
                    label: span.phoneme.clone(),
                    viseme: span.viseme,
                    vectors: vec![vector.to_vec()],
                }),
            }
            attributed += 1;
            trace!("t={:.1}ms -> '{}'", t_ms, span.phoneme);
        });
    }

    debug!(
        "Clip attributed {} vectors across {} classes",
        attributed,
        classes.len()
    );
}

/// Generate synthetic low-amplitude vectors for the silence class.
/// Deterministic for a given seed.
pub fn synthesize_silence(dim: usize, count: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            (0..dim)
                .map(|_| (rng.gen::<f32>() - 0.5) / 10.0)
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;
    use viseme_classifier::{ProcessorConfig, VadMode};

    fn trainer_processor() -> StreamProcessor {
        StreamProcessor::new(ProcessorConfig {
            hop: 32,
            feature_events: true,
            result_events: false,
            vad_mode: VadMode::Off,
            ..Default::default()
        })
        .unwrap()
    }

    fn tone(sample_rate: u32, secs: f32) -> Vec<f32> {
        (0..(sample_rate as f32 * secs) as usize)
            .map(|i| 0.4 * (2.0 * PI * 440.0 * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn span(phoneme: &str, viseme: u8, start_ms: f64, end_ms: f64) -> LabeledSpan {
        LabeledSpan {
            phoneme: phoneme.to_string(),
            viseme,
            start_ms,
            end_ms,
        }
    }

    #[test]
    fn test_vectors_land_in_their_spans() {
        let mut processor = trainer_processor();
        let samples = tone(16000, 1.0);
        let spans = vec![span("a", 0, 0.0, 400.0), span("s", 6, 500.0, 900.0)];

        let mut classes = Vec::new();
        collect_class_vectors(&mut processor, &samples, &spans, &mut classes);

        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0].label, "a");
        assert_eq!(classes[1].label, "s");
        assert!(!classes[0].vectors.is_empty());
        assert!(!classes[1].vectors.is_empty());
        // The earlier, longer span collects more vectors
        assert!(classes[0].vectors.len() > classes[1].vectors.len() / 2);
    }

    #[test]
    fn test_gap_between_spans_is_unattributed() {
        let mut processor = trainer_processor();
        let samples = tone(16000, 1.0);
        // Spans cover 0-200ms and 800-1000ms; the 600ms gap yields nothing
        let spans = vec![span("a", 0, 0.0, 200.0), span("s", 6, 800.0, 1000.0)];

        let mut classes = Vec::new();
        collect_class_vectors(&mut processor, &samples, &spans, &mut classes);

        let total: usize = classes.iter().map(|c| c.vectors.len()).sum();
        // hop 32 at 16 kHz is 2ms per step; 400ms of covered audio is
        // roughly 200 steps, far below full coverage (~500)
        assert!(total < 250, "attributed {} vectors", total);
    }

    #[test]
    fn test_low_energy_windows_are_skipped() {
        let mut processor = trainer_processor();
        let samples = vec![0.0f32; 16000];
        let spans = vec![span("a", 0, 0.0, 1000.0)];

        let mut classes = Vec::new();
        collect_class_vectors(&mut processor, &samples, &spans, &mut classes);
        assert!(classes.is_empty());
    }

    #[test]
    fn test_classes_accumulate_across_clips() {
        let mut processor = trainer_processor();
        let samples = tone(16000, 0.5);
        let spans = vec![span("a", 0, 0.0, 500.0)];

        let mut classes = Vec::new();
        collect_class_vectors(&mut processor, &samples, &spans, &mut classes);
        let first = classes[0].vectors.len();

        // Second clip restarts the clock, so the same spans match again
        collect_class_vectors(&mut processor, &samples, &spans, &mut classes);
        assert_eq!(classes.len(), 1);
        assert!(classes[0].vectors.len() >= first * 2 - 2);
    }

    #[test]
    fn test_synthetic_silence_shape_and_range() {
        let vectors = synthesize_silence(39, 500, 7);
        assert_eq!(vectors.len(), 500);
        assert!(vectors.iter().all(|v| v.len() == 39));
        assert!(vectors
            .iter()
            .flatten()
            .all(|&x| (-0.05..=0.05).contains(&x)));
    }

    #[test]
    fn test_synthetic_silence_is_deterministic() {
        assert_eq!(synthesize_silence(5, 10, 42), synthesize_silence(5, 10, 42));
        assert_ne!(synthesize_silence(5, 10, 42), synthesize_silence(5, 10, 43));
    }
}
