//! MFCC feature extraction
//!
//! Converts a fixed-length PCM window into a fixed-dimension feature vector:
//! Hann taper, FFT magnitude spectrum, mel filter bank, log energies, DCT-II,
//! then first- and second-order deltas from a short trailing history. All
//! scratch buffers are preallocated so a `compute` call never allocates.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Floor applied before taking logs, so silence yields a finite value.
const LOG_FLOOR: f32 = 1e-10;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("invalid feature configuration: {0}")]
    InvalidConfig(String),
}

/// Feature extractor configuration.
///
/// The window length doubles as the FFT size. The feature dimension is
/// `3 * coeff_n` (base coefficients plus deltas plus delta-deltas), with an
/// optional log-energy scalar appended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MfccConfig {
    /// Sample rate of the incoming PCM in Hz
    pub sample_rate: u32,

    /// Analysis window length in samples (also the FFT size)
    pub window: usize,

    /// Number of triangular mel filter bands
    pub mel_bands: usize,

    /// Number of base cepstral coefficients kept after the DCT
    pub coeff_n: usize,

    /// Append the window log-energy as an extra feature dimension
    pub include_energy: bool,
}

impl Default for MfccConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            window: 512,
            mel_bands: 26,
            coeff_n: 13,
            include_energy: false,
        }
    }
}

impl MfccConfig {
    /// Feature vector dimension produced by this configuration.
    pub fn dim(&self) -> usize {
        3 * self.coeff_n + usize::from(self.include_energy)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), FeatureError> {
        if self.sample_rate == 0 {
            return Err(FeatureError::InvalidConfig(
                "sample_rate must be greater than 0".to_string(),
            ));
        }

        if self.window < 2 {
            return Err(FeatureError::InvalidConfig(
                "window must be at least 2 samples".to_string(),
            ));
        }

        if self.coeff_n == 0 {
            return Err(FeatureError::InvalidConfig(
                "coeff_n must be greater than 0".to_string(),
            ));
        }

        if self.mel_bands < self.coeff_n {
            return Err(FeatureError::InvalidConfig(format!(
                "mel_bands ({}) must be at least coeff_n ({})",
                self.mel_bands, self.coeff_n
            )));
        }

        if self.mel_bands >= self.window / 2 {
            return Err(FeatureError::InvalidConfig(format!(
                "mel_bands ({}) must be below half the window length ({})",
                self.mel_bands,
                self.window / 2
            )));
        }

        Ok(())
    }
}

/// One analysis step's output. The vector borrows the extractor's internal
/// buffer and is valid only until the next `compute` call.
#[derive(Debug)]
pub struct FeatureFrame<'a> {
    pub vector: &'a [f32],
    pub log_energy: f32,
}

/// HTK mel scale.
fn hertz_to_mel(freq: f32) -> f32 {
    2595.0 * (1.0 + freq / 700.0).log10()
}

fn mel_to_hertz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filter bank, `mel_bands` rows of `window/2 + 1` weights.
fn build_mel_filters(config: &MfccConfig) -> Vec<f32> {
    let bins = config.window / 2 + 1;
    let bin_hz = config.sample_rate as f32 / config.window as f32;

    let mel_max = hertz_to_mel(config.sample_rate as f32 / 2.0);
    let mut edges = vec![0.0f32; config.mel_bands + 2];
    for (i, edge) in edges.iter_mut().enumerate() {
        *edge = mel_to_hertz(mel_max * i as f32 / (config.mel_bands + 1) as f32);
    }

    let mut filters = vec![0.0f32; config.mel_bands * bins];
    for m in 0..config.mel_bands {
        let (lo, center, hi) = (edges[m], edges[m + 1], edges[m + 2]);
        for k in 0..bins {
            let f = k as f32 * bin_hz;
            let weight = if f <= center {
                (f - lo) / (center - lo).max(1e-6)
            } else {
                (hi - f) / (hi - center).max(1e-6)
            };
            filters[m * bins + k] = weight.clamp(0.0, 1.0);
        }
    }

    filters
}

/// Orthonormal DCT-II matrix, `coeff_n` rows of `mel_bands` weights.
fn build_dct(coeff_n: usize, mel_bands: usize) -> Vec<f32> {
    let m = mel_bands as f32;
    let mut dct = vec![0.0f32; coeff_n * mel_bands];
    for i in 0..coeff_n {
        let scale = if i == 0 { (1.0 / m).sqrt() } else { (2.0 / m).sqrt() };
        for j in 0..mel_bands {
            let angle = std::f32::consts::PI * i as f32 * (j as f32 + 0.5) / m;
            dct[i * mel_bands + j] = scale * angle.cos();
        }
    }
    dct
}

fn build_hann(window: usize) -> Vec<f32> {
    (0..window)
        .map(|i| {
            let angle = 2.0 * std::f32::consts::PI * i as f32 / window as f32;
            0.5 * (1.0 - angle.cos())
        })
        .collect()
}

/// MFCC feature extractor.
///
/// Stateful only through the trailing delta history: given the same window
/// and the same history, the output is bit-identical.
pub struct MfccExtractor {
    config: MfccConfig,
    fft: Arc<dyn Fft<f32>>,
    hann: Vec<f32>,
    filters: Vec<f32>,
    dct: Vec<f32>,

    fft_buf: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    spectrum: Vec<f32>,
    mel_log: Vec<f32>,
    prev_coeffs: Vec<f32>,
    prev_delta: Vec<f32>,
    features: Vec<f32>,
}

impl MfccExtractor {
    pub fn new(config: MfccConfig) -> Result<Self, FeatureError> {
        config.validate()?;

        debug!(
            "Creating MFCC extractor: {} Hz, window {}, {} mel bands, {} coefficients (D={})",
            config.sample_rate,
            config.window,
            config.mel_bands,
            config.coeff_n,
            config.dim()
        );

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(config.window);
        let scratch_len = fft.get_inplace_scratch_len();

        Ok(Self {
            fft,
            hann: build_hann(config.window),
            filters: build_mel_filters(&config),
            dct: build_dct(config.coeff_n, config.mel_bands),
            fft_buf: vec![Complex::default(); config.window],
            fft_scratch: vec![Complex::default(); scratch_len],
            spectrum: vec![0.0; config.window / 2 + 1],
            mel_log: vec![0.0; config.mel_bands],
            prev_coeffs: vec![0.0; config.coeff_n],
            prev_delta: vec![0.0; config.coeff_n],
            features: vec![0.0; config.dim()],
            config,
        })
    }

    pub fn config(&self) -> &MfccConfig {
        &self.config
    }

    /// Feature vector dimension.
    pub fn dim(&self) -> usize {
        self.features.len()
    }

    /// The most recently computed feature vector.
    ///
    /// Valid only until the next `compute` call overwrites it.
    pub fn features(&self) -> &[f32] {
        &self.features
    }

    /// Compute the feature vector for one analysis window.
    ///
    /// `samples` must be exactly `config.window` long with amplitudes in
    /// [-1, 1]; that is the caller's contract and is only debug-asserted.
    pub fn compute(&mut self, samples: &[f32]) -> FeatureFrame<'_> {
        debug_assert_eq!(samples.len(), self.config.window);

        // Log of mean-square energy, floored so silence stays finite
        let mean_square =
            samples.iter().map(|&x| x * x).sum::<f32>() / self.config.window as f32;
        let log_energy = mean_square.max(LOG_FLOOR).ln();

        // Tapered FFT magnitude spectrum
        for (dst, (&x, &h)) in self.fft_buf.iter_mut().zip(samples.iter().zip(&self.hann)) {
            *dst = Complex::new(x * h, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.fft_buf, &mut self.fft_scratch);
        for (k, bin) in self.spectrum.iter_mut().enumerate() {
            *bin = self.fft_buf[k].norm();
        }

        // Log mel energies
        let bins = self.spectrum.len();
        for (m, out) in self.mel_log.iter_mut().enumerate() {
            let row = &self.filters[m * bins..(m + 1) * bins];
            let energy: f32 = row.iter().zip(&self.spectrum).map(|(&w, &s)| w * s).sum();
            *out = energy.max(LOG_FLOOR).ln();
        }

        // DCT-II decorrelation, then deltas against the trailing history
        let n = self.config.coeff_n;
        for i in 0..n {
            let row = &self.dct[i * self.config.mel_bands..(i + 1) * self.config.mel_bands];
            let c: f32 = row.iter().zip(&self.mel_log).map(|(&w, &e)| w * e).sum();

            let delta = c - self.prev_coeffs[i];
            let delta2 = delta - self.prev_delta[i];
            self.features[i] = c;
            self.features[n + i] = delta;
            self.features[2 * n + i] = delta2;
            self.prev_coeffs[i] = c;
            self.prev_delta[i] = delta;
        }

        if self.config.include_energy {
            self.features[3 * n] = log_energy;
        }

        FeatureFrame {
            vector: &self.features,
            log_energy,
        }
    }

    /// Clear the delta history.
    pub fn reset(&mut self) {
        self.prev_coeffs.fill(0.0);
        self.prev_delta.fill(0.0);
    }
}
