//! Nearest-prototype viseme classifier
//!
//! Holds a loaded set of Gaussian prototypes and classifies feature vectors
//! by Mahalanobis distance: the covariance-normalized squared distance lets
//! classes with different feature spread be compared on equal footing.

use crate::labels::VISEME_SIL;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("no model loaded")]
    NoModel,

    #[error("dimension mismatch: model dimension is {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("prototype '{label}' is malformed: {reason}")]
    MalformedPrototype { label: String, reason: String },
}

/// One class's statistical summary: mean and inverse covariance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prototype {
    /// Phoneme label, metadata only
    pub label: String,

    /// Viseme class in 0..=14 (14 = silence/neutral)
    pub viseme: u8,

    /// Per-dimension mean, length D
    pub mu: Vec<f32>,

    /// Inverse covariance, D×D row-major
    pub sigma_inv: Vec<f32>,
}

impl Prototype {
    pub fn dim(&self) -> usize {
        self.mu.len()
    }

    fn check(&self) -> Result<(), ClassifierError> {
        let d = self.dim();
        if self.sigma_inv.len() != d * d {
            return Err(ClassifierError::MalformedPrototype {
                label: self.label.clone(),
                reason: format!(
                    "sigma_inv has {} values, expected {}",
                    self.sigma_inv.len(),
                    d * d
                ),
            });
        }
        if self.viseme > VISEME_SIL {
            return Err(ClassifierError::MalformedPrototype {
                label: self.label.clone(),
                reason: format!("viseme {} out of range", self.viseme),
            });
        }
        Ok(())
    }
}

/// A model replacement or extension request.
#[derive(Debug, Clone)]
pub struct ModelUpdate {
    /// Discard the current model before installing the new prototypes
    pub reset: bool,

    pub prototypes: Vec<Prototype>,
}

/// Classification result.
///
/// `distances` is in model order and borrows the classifier's scratch
/// buffer; it is valid only until the next `predict` call.
#[derive(Debug)]
pub struct Prediction<'a> {
    /// Winning viseme class, or `None` when the nearest prototype is the
    /// silence class (no mouth movement)
    pub viseme: Option<u8>,

    /// Mahalanobis distance to every prototype, in model order
    pub distances: &'a [f32],
}

/// Nearest-prototype classifier store.
pub struct Classifier {
    prototypes: Vec<Prototype>,
    distances: Vec<f32>,
    diff: Vec<f32>,
}

impl Classifier {
    pub fn new() -> Self {
        Self {
            prototypes: Vec::new(),
            distances: Vec::new(),
            diff: Vec::new(),
        }
    }

    /// Install prototypes, either replacing the current model (`reset`) or
    /// appending to it. All-or-nothing: validation happens before any
    /// mutation, so a rejected update leaves the current model untouched.
    pub fn import(&mut self, prototypes: Vec<Prototype>, reset: bool) -> Result<(), ClassifierError> {
        let expected = if reset {
            prototypes.first().map(Prototype::dim)
        } else {
            self.dim().or_else(|| prototypes.first().map(Prototype::dim))
        };

        for p in &prototypes {
            p.check()?;
            if let Some(d) = expected {
                if p.dim() != d {
                    return Err(ClassifierError::DimensionMismatch {
                        expected: d,
                        actual: p.dim(),
                    });
                }
            }
        }

        if reset {
            self.prototypes.clear();
        }
        self.prototypes.extend(prototypes);
        self.distances.resize(self.prototypes.len(), 0.0);
        if let Some(d) = self.dim() {
            self.diff.resize(d, 0.0);
        }

        debug!(
            "Model imported: {} prototypes, D={:?}",
            self.prototypes.len(),
            self.dim()
        );
        Ok(())
    }

    /// Classify a feature vector against the loaded model.
    pub fn predict(&mut self, vector: &[f32]) -> Result<Prediction<'_>, ClassifierError> {
        let d = self.dim().ok_or(ClassifierError::NoModel)?;
        if vector.len() != d {
            return Err(ClassifierError::DimensionMismatch {
                expected: d,
                actual: vector.len(),
            });
        }

        let mut best = 0usize;
        let mut best_distance = f64::INFINITY;

        for (idx, p) in self.prototypes.iter().enumerate() {
            for (diff, (&v, &m)) in self.diff.iter_mut().zip(vector.iter().zip(&p.mu)) {
                *diff = v - m;
            }

            // (v - mu)^T * sigma_inv * (v - mu)
            let mut distance = 0.0f64;
            for i in 0..d {
                let row = &p.sigma_inv[i * d..(i + 1) * d];
                let dot: f64 = row
                    .iter()
                    .zip(&self.diff)
                    .map(|(&s, &x)| s as f64 * x as f64)
                    .sum();
                distance += self.diff[i] as f64 * dot;
            }

            self.distances[idx] = distance as f32;
            // Strict comparison keeps the earliest prototype on ties
            if distance < best_distance {
                best_distance = distance;
                best = idx;
            }
        }

        let winner = self.prototypes[best].viseme;
        Ok(Prediction {
            viseme: if winner == VISEME_SIL { None } else { Some(winner) },
            distances: &self.distances,
        })
    }

    /// Model dimension, if a model is loaded.
    pub fn dim(&self) -> Option<usize> {
        self.prototypes.first().map(Prototype::dim)
    }

    pub fn len(&self) -> usize {
        self.prototypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }

    /// Loaded prototypes in model order.
    pub fn prototypes(&self) -> &[Prototype] {
        &self.prototypes
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}
