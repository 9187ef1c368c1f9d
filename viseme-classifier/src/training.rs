//! Offline prototype estimation
//!
//! Computes one Gaussian prototype per viseme class from labeled feature
//! vectors: per-dimension mean, unbiased sample covariance, shrinkage
//! regularization, then inversion. Runs offline with no real-time budget;
//! accumulation is done in f64 and narrowed to f32 at the end.

use crate::classifier::Prototype;
use crate::labels::VISEME_SIL;
use thiserror::Error;
use tracing::{debug, warn};

/// Observed floor for a usable class: callers should skip classes with
/// fewer vectors rather than train on them.
pub const TRAINING_VECTOR_FLOOR: usize = 100;

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("invalid estimator configuration: {0}")]
    InvalidConfig(String),

    #[error("need at least 2 vectors to estimate a covariance, got {0}")]
    TooFewVectors(usize),

    #[error("vector length {actual} does not match dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("viseme {0} is not a class in 0..=14")]
    InvalidViseme(u8),

    #[error("covariance for class '{label}' is singular even after regularization")]
    SingularCovariance { label: String },
}

/// Estimator configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorConfig {
    /// Feature vector dimension D
    pub dim: usize,

    /// Shrinkage weight toward the average-variance identity, in [0, 1)
    pub shrinkage: f64,

    /// Absolute ridge added to the diagonal before inversion
    pub ridge: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            dim: 39,
            shrinkage: 0.05,
            ridge: 1e-6,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), TrainingError> {
        if self.dim == 0 {
            return Err(TrainingError::InvalidConfig(
                "dim must be greater than 0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.shrinkage) {
            return Err(TrainingError::InvalidConfig(
                "shrinkage must be in [0, 1)".to_string(),
            ));
        }
        if self.ridge < 0.0 {
            return Err(TrainingError::InvalidConfig(
                "ridge must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// A computed prototype plus its provenance metadata.
#[derive(Debug, Clone)]
pub struct TrainedPrototype {
    pub prototype: Prototype,

    /// Opaque provenance tag passed through by the caller, unused by the
    /// mean/covariance computation
    pub group: u32,

    /// Number of training vectors behind this prototype
    pub sample_count: usize,
}

/// Per-class mean/covariance estimator.
pub struct PrototypeEstimator {
    config: EstimatorConfig,
}

impl PrototypeEstimator {
    pub fn new(config: EstimatorConfig) -> Result<Self, TrainingError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> EstimatorConfig {
        self.config
    }

    /// Compute one class prototype from its training vectors.
    ///
    /// The covariance is shrunk toward the average-variance identity before
    /// inversion, which guarantees invertibility for modest sample counts
    /// and near-zero-variance dimensions (e.g. synthetic silence data).
    pub fn compute_prototype(
        &self,
        label: &str,
        group: u32,
        viseme: u8,
        vectors: &[Vec<f32>],
    ) -> Result<TrainedPrototype, TrainingError> {
        let d = self.config.dim;
        let m = vectors.len();

        if viseme > VISEME_SIL {
            return Err(TrainingError::InvalidViseme(viseme));
        }
        if m < 2 {
            return Err(TrainingError::TooFewVectors(m));
        }
        for v in vectors {
            if v.len() != d {
                return Err(TrainingError::DimensionMismatch {
                    expected: d,
                    actual: v.len(),
                });
            }
        }
        if m < TRAINING_VECTOR_FLOOR {
            warn!(
                "Class '{}' has only {} training vectors (floor is {})",
                label, m, TRAINING_VECTOR_FLOOR
            );
        }

        // Per-dimension mean
        let mut mean = vec![0.0f64; d];
        for v in vectors {
            for (acc, &x) in mean.iter_mut().zip(v) {
                *acc += x as f64;
            }
        }
        for acc in &mut mean {
            *acc /= m as f64;
        }

        // Unbiased sample covariance, upper triangle then mirrored
        let mut cov = vec![0.0f64; d * d];
        for v in vectors {
            for i in 0..d {
                let di = v[i] as f64 - mean[i];
                for j in i..d {
                    cov[i * d + j] += di * (v[j] as f64 - mean[j]);
                }
            }
        }
        let norm = 1.0 / (m as f64 - 1.0);
        for i in 0..d {
            for j in i..d {
                let value = cov[i * d + j] * norm;
                cov[i * d + j] = value;
                cov[j * d + i] = value;
            }
        }

        // Shrink toward the average-variance identity, then ridge
        let avg_var = (0..d).map(|i| cov[i * d + i]).sum::<f64>() / d as f64;
        let lambda = self.config.shrinkage;
        for value in cov.iter_mut() {
            *value *= 1.0 - lambda;
        }
        for i in 0..d {
            cov[i * d + i] += lambda * avg_var + self.config.ridge;
        }

        let inverse = invert(&mut cov, d).ok_or_else(|| TrainingError::SingularCovariance {
            label: label.to_string(),
        })?;

        // Force exact symmetry on the narrowed output
        let mut sigma_inv = vec![0.0f32; d * d];
        for i in 0..d {
            for j in i..d {
                let value = (0.5 * (inverse[i * d + j] + inverse[j * d + i])) as f32;
                sigma_inv[i * d + j] = value;
                sigma_inv[j * d + i] = value;
            }
        }

        debug!("Prototype '{}' computed from {} vectors", label, m);

        Ok(TrainedPrototype {
            prototype: Prototype {
                label: label.to_string(),
                viseme,
                mu: mean.iter().map(|&x| x as f32).collect(),
                sigma_inv,
            },
            group,
            sample_count: m,
        })
    }
}

/// Gauss-Jordan inversion with partial pivoting. Returns `None` when a
/// pivot falls below epsilon, i.e. the matrix is numerically singular.
fn invert(matrix: &mut [f64], n: usize) -> Option<Vec<f64>> {
    const PIVOT_EPSILON: f64 = 1e-12;

    let mut inverse = vec![0.0f64; n * n];
    for i in 0..n {
        inverse[i * n + i] = 1.0;
    }

    for col in 0..n {
        // Largest remaining pivot in this column
        let mut pivot_row = col;
        let mut pivot_abs = matrix[col * n + col].abs();
        for row in col + 1..n {
            let candidate = matrix[row * n + col].abs();
            if candidate > pivot_abs {
                pivot_abs = candidate;
                pivot_row = row;
            }
        }
        if pivot_abs < PIVOT_EPSILON {
            return None;
        }

        if pivot_row != col {
            for k in 0..n {
                matrix.swap(col * n + k, pivot_row * n + k);
                inverse.swap(col * n + k, pivot_row * n + k);
            }
        }

        let pivot = matrix[col * n + col];
        for k in 0..n {
            matrix[col * n + k] /= pivot;
            inverse[col * n + k] /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = matrix[row * n + col];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                matrix[row * n + k] -= factor * matrix[col * n + k];
                inverse[row * n + k] -= factor * inverse[col * n + k];
            }
        }
    }

    Some(inverse)
}
