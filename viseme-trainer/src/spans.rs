//! Labeled-span JSON parsing
//!
//! A span file is a JSON array of sections, each carrying a `ps` (or `vs`)
//! array of spans: `p` the phoneme (optional), `v` the viseme class, `t`
//! the onset in milliseconds, `d` the duration in milliseconds. Feature
//! vectors are attributed to the span whose widened window contains their
//! timestamp.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use viseme_classifier::{VISEMES, VISEME_SIL};

/// Leading widening of each span window in milliseconds, covering
/// articulation that starts ahead of the labeled onset.
pub const SPAN_LEAD_MS: f64 = 5.0;

#[derive(Error, Debug)]
pub enum SpanError {
    #[error("failed to read span file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid span JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct RawSection {
    #[serde(alias = "vs")]
    ps: Vec<RawSpan>,
}

#[derive(Debug, Deserialize)]
struct RawSpan {
    /// Phoneme label; the viseme name stands in when absent
    p: Option<String>,
    /// Viseme class; out-of-range values clamp to silence
    v: i32,
    /// Onset in milliseconds
    t: f64,
    /// Duration in milliseconds
    d: f64,
}

/// One labeled training span with its widened attribution window.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSpan {
    pub phoneme: String,
    pub viseme: u8,
    /// Window start in milliseconds: onset minus the lead
    pub start_ms: f64,
    /// Window end in milliseconds: onset plus half the duration
    pub end_ms: f64,
}

impl LabeledSpan {
    pub fn contains(&self, t_ms: f64) -> bool {
        t_ms >= self.start_ms && t_ms <= self.end_ms
    }
}

/// Load and flatten a span file into attribution windows, in file order.
pub fn load_spans(path: &Path) -> Result<Vec<LabeledSpan>, SpanError> {
    let data = fs::read_to_string(path)?;
    let sections: Vec<RawSection> = serde_json::from_str(&data)?;

    let spans: Vec<LabeledSpan> = sections
        .into_iter()
        .flat_map(|section| section.ps)
        .map(|raw| {
            let viseme = if raw.v < 0 || raw.v > VISEME_SIL as i32 {
                VISEME_SIL
            } else {
                raw.v as u8
            };
            let phoneme = raw
                .p
                .unwrap_or_else(|| VISEMES[viseme as usize].to_string());
            LabeledSpan {
                phoneme,
                viseme,
                start_ms: raw.t - SPAN_LEAD_MS,
                end_ms: raw.t + raw.d / 2.0,
            }
        })
        .collect();

    debug!("Loaded {} spans from {:?}", spans.len(), path);
    Ok(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_json(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_span_window_geometry() {
        let file = write_json(r#"[{"ps":[{"p":"a","v":0,"t":100.0,"d":80.0}]}]"#);
        let spans = load_spans(file.path()).unwrap();

        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].phoneme, "a");
        assert_eq!(spans[0].viseme, 0);
        assert_eq!(spans[0].start_ms, 95.0);
        assert_eq!(spans[0].end_ms, 140.0);
        assert!(spans[0].contains(95.0));
        assert!(spans[0].contains(140.0));
        assert!(!spans[0].contains(94.9));
        assert!(!spans[0].contains(140.1));
    }

    #[test]
    fn test_vs_alias_and_multiple_sections() {
        let file = write_json(
            r#"[
                {"vs":[{"p":"a","v":0,"t":0.0,"d":50.0},{"p":"s","v":6,"t":50.0,"d":50.0}]},
                {"ps":[{"p":"n","v":11,"t":200.0,"d":40.0}]}
            ]"#,
        );
        let spans = load_spans(file.path()).unwrap();
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[1].viseme, 6);
        assert_eq!(spans[2].phoneme, "n");
    }

    #[test]
    fn test_out_of_range_viseme_clamps_to_silence() {
        let file = write_json(r#"[{"ps":[{"v":99,"t":0.0,"d":10.0},{"v":-1,"t":10.0,"d":10.0}]}]"#);
        let spans = load_spans(file.path()).unwrap();
        assert_eq!(spans[0].viseme, VISEME_SIL);
        assert_eq!(spans[1].viseme, VISEME_SIL);
    }

    #[test]
    fn test_missing_phoneme_falls_back_to_viseme_name() {
        let file = write_json(r#"[{"ps":[{"v":3,"t":0.0,"d":10.0}]}]"#);
        let spans = load_spans(file.path()).unwrap();
        assert_eq!(spans[0].phoneme, "O");
    }

    #[test]
    fn test_malformed_json_is_error() {
        let file = write_json("not json");
        assert!(matches!(load_spans(file.path()), Err(SpanError::Json(_))));
    }
}
