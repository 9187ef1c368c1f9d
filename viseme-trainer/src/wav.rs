//! WAV file I/O
//!
//! Decodes PCM WAV files into mono f32 in [-1, 1], averaging channels,
//! and writes 16 kHz 16-bit mono output for downsampled audio.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum WavError {
    #[error("WAV I/O error: {0}")]
    Hound(#[from] hound::Error),

    #[error("unsupported WAV format: {0}")]
    Unsupported(String),
}

/// Decoded mono audio clip.
#[derive(Debug, Clone)]
pub struct MonoClip {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

/// Read a WAV file as mono f32 samples, averaging channels.
///
/// Accepts 16/24/32-bit integer PCM and 32-bit float.
pub fn read_wav_mono(path: &Path) -> Result<MonoClip, WavError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits @ (16 | 24 | 32)) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
        (format, bits) => {
            return Err(WavError::Unsupported(format!(
                "{:?} {}-bit (expected 16/24/32-bit int or 32-bit float)",
                format, bits
            )));
        }
    };

    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(WavError::Unsupported("zero channels".to_string()));
    }

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    debug!(
        "Read {:?}: {} Hz, {} channels, {} samples",
        path,
        spec.sample_rate,
        channels,
        samples.len()
    );

    Ok(MonoClip {
        sample_rate: spec.sample_rate,
        samples,
    })
}

/// Write mono f32 samples as a 16 kHz 16-bit PCM WAV file.
pub fn write_wav_16k(path: &Path, samples: &[f32]) -> Result<(), WavError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = if clamped < 0.0 {
            (clamped * 32768.0) as i16
        } else {
            (clamped * 32767.0) as i16
        };
        writer.write_sample(value)?;
    }
    writer.finalize()?;

    debug!("Wrote {:?}: {} samples at 16 kHz", path, samples.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");

        let samples: Vec<f32> = (0..1600)
            .map(|i| 0.5 * (i as f32 * 0.05).sin())
            .collect();
        write_wav_16k(&path, &samples).unwrap();

        let clip = read_wav_mono(&path).unwrap();
        assert_eq!(clip.sample_rate, 16000);
        assert_eq!(clip.samples.len(), samples.len());
        for (&a, &b) in clip.samples.iter().zip(&samples) {
            assert_relative_eq!(a, b, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_stereo_averages_to_mono() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");

        let spec = WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(16384i16).unwrap(); // left ~0.5
            writer.write_sample(-16384i16).unwrap(); // right ~-0.5
        }
        writer.finalize().unwrap();

        let clip = read_wav_mono(&path).unwrap();
        assert_eq!(clip.sample_rate, 44100);
        assert_eq!(clip.samples.len(), 100);
        for &s in &clip.samples {
            assert_relative_eq!(s, 0.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_clipping_is_clamped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hot.wav");

        write_wav_16k(&path, &[2.0, -2.0]).unwrap();
        let clip = read_wav_mono(&path).unwrap();
        assert_relative_eq!(clip.samples[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(clip.samples[1], -1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = read_wav_mono(Path::new("/nonexistent/file.wav"));
        assert!(matches!(result, Err(WavError::Hound(_))));
    }
}
