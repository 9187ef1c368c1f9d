//! Binary model codec
//!
//! A model file is a raw concatenation of fixed-size records, each
//! `2 + D + D²` little-endian f32 values: label id, viseme class, mean,
//! then the inverse covariance flattened row-major. There is no header,
//! length prefix, or version tag; producer and consumer agree on the
//! geometry (and the label table) out of band.

use crate::classifier::Prototype;
use crate::labels::{LabelTable, VISEME_SIL};
use thiserror::Error;

/// Leading values of every record: label id and viseme class.
pub const RECORD_META_FLOATS: usize = 2;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("invalid codec configuration: {0}")]
    InvalidConfig(String),

    #[error("model file truncated: {len} bytes is not a multiple of the {stride}-byte record stride")]
    Truncated { len: usize, stride: usize },

    #[error("record has {actual} values, expected at least {expected}")]
    BadRecord { expected: usize, actual: usize },

    #[error("prototype dimension {actual} does not match codec dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("unknown phoneme label '{0}'")]
    UnknownLabel(String),

    #[error("label id {0} not in the label table")]
    BadLabelId(u32),

    #[error("viseme value {0} is not a class in 0..=14")]
    BadViseme(f32),
}

/// Record geometry: feature dimension and on-disk stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// Feature vector dimension D
    pub dim: usize,

    /// Record stride in f32 values; must be at least `2 + D + D²`.
    /// The default equals the record length, leaving no padding.
    pub stride: usize,
}

impl CodecConfig {
    pub fn for_dim(dim: usize) -> Self {
        Self {
            dim,
            stride: RECORD_META_FLOATS + dim + dim * dim,
        }
    }

    /// Number of f32 values in one record.
    pub fn record_len(&self) -> usize {
        RECORD_META_FLOATS + self.dim + self.dim * self.dim
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.dim == 0 {
            return Err(DataError::InvalidConfig("dim must be greater than 0".to_string()));
        }
        if self.stride < self.record_len() {
            return Err(DataError::InvalidConfig(format!(
                "stride {} is smaller than the record length {}",
                self.stride,
                self.record_len()
            )));
        }
        Ok(())
    }
}

/// Encoder/decoder for prototype records.
pub struct ModelCodec {
    config: CodecConfig,
    table: LabelTable,
}

impl ModelCodec {
    pub fn new(config: CodecConfig, table: LabelTable) -> Result<Self, DataError> {
        config.validate()?;
        Ok(Self { config, table })
    }

    /// Codec for the given dimension with the default label table.
    pub fn for_dim(dim: usize) -> Result<Self, DataError> {
        Self::new(CodecConfig::for_dim(dim), LabelTable::default())
    }

    pub fn config(&self) -> CodecConfig {
        self.config
    }

    /// Encode one prototype as a little-endian f32 record, padded to the
    /// configured stride.
    pub fn encode(&self, prototype: &Prototype) -> Result<Vec<u8>, DataError> {
        let d = self.config.dim;
        if prototype.dim() != d || prototype.sigma_inv.len() != d * d {
            return Err(DataError::DimensionMismatch {
                expected: d,
                actual: prototype.dim(),
            });
        }

        let label_id = self
            .table
            .id(&prototype.label)
            .ok_or_else(|| DataError::UnknownLabel(prototype.label.clone()))?;

        let mut bytes = Vec::with_capacity(self.config.stride * 4);
        let mut push = |v: f32| bytes.extend_from_slice(&v.to_le_bytes());

        push(label_id as f32);
        push(prototype.viseme as f32);
        for &v in &prototype.mu {
            push(v);
        }
        for &v in &prototype.sigma_inv {
            push(v);
        }
        bytes.resize(self.config.stride * 4, 0);

        Ok(bytes)
    }

    /// Decode one record from a slice of f32 values.
    pub fn decode_record(&self, values: &[f32]) -> Result<Prototype, DataError> {
        let record_len = self.config.record_len();
        if values.len() < record_len {
            return Err(DataError::BadRecord {
                expected: record_len,
                actual: values.len(),
            });
        }

        let label_id = values[0];
        if label_id < 0.0 || label_id.fract() != 0.0 {
            return Err(DataError::BadLabelId(label_id as u32));
        }
        let label = self
            .table
            .label(label_id as u32)
            .ok_or(DataError::BadLabelId(label_id as u32))?
            .to_string();

        let viseme = values[1];
        if viseme < 0.0 || viseme > VISEME_SIL as f32 || viseme.fract() != 0.0 {
            return Err(DataError::BadViseme(viseme));
        }

        let d = self.config.dim;
        let mu = values[RECORD_META_FLOATS..RECORD_META_FLOATS + d].to_vec();
        let sigma_inv = values[RECORD_META_FLOATS + d..record_len].to_vec();

        Ok(Prototype {
            label,
            viseme: viseme as u8,
            mu,
            sigma_inv,
        })
    }

    /// Decode an entire model file.
    ///
    /// A length that is not an exact multiple of the record stride means a
    /// partial record; the whole load is rejected before any record is read.
    pub fn decode_model(&self, bytes: &[u8]) -> Result<Vec<Prototype>, DataError> {
        let stride_bytes = self.config.stride * 4;
        if bytes.len() % stride_bytes != 0 {
            return Err(DataError::Truncated {
                len: bytes.len(),
                stride: stride_bytes,
            });
        }

        let mut values = vec![0.0f32; self.config.stride];
        let mut prototypes = Vec::with_capacity(bytes.len() / stride_bytes);
        for record in bytes.chunks_exact(stride_bytes) {
            for (v, raw) in values.iter_mut().zip(record.chunks_exact(4)) {
                *v = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            }
            prototypes.push(self.decode_record(&values)?);
        }

        Ok(prototypes)
    }

    /// Encode a whole model as concatenated records.
    pub fn encode_model(&self, prototypes: &[Prototype]) -> Result<Vec<u8>, DataError> {
        let mut bytes = Vec::with_capacity(prototypes.len() * self.config.stride * 4);
        for p in prototypes {
            bytes.extend(self.encode(p)?);
        }
        Ok(bytes)
    }
}
