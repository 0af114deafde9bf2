//! Tunable settings shared by the numerical routines and the output writers.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Numerical knobs for resampling, moments and the POD self-check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Uniform grid length is `oversample * original length` when resampling.
    pub oversample: usize,
    /// Quantum used by the spacing-equality test.
    pub uniform_tolerance: f64,
    /// Points dropped from each end of the extended grid in kz moments.
    pub kz_trim: usize,
    pub reconstruction_tolerance: f64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            oversample: 2,
            uniform_tolerance: 1e-6,
            kz_trim: 5,
            reconstruction_tolerance: 1e-6,
        }
    }
}

impl AnalysisSettings {
    pub fn validate(&self) -> Result<()> {
        if self.oversample == 0 {
            bail!("oversample must be at least 1.");
        }
        if self.uniform_tolerance <= 0.0 {
            bail!("uniform_tolerance must be positive.");
        }
        if self.reconstruction_tolerance <= 0.0 {
            bail!("reconstruction_tolerance must be positive.");
        }
        Ok(())
    }
}

/// Where processed tables go.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub emit_to_console: bool,
    /// Directory receiving the table files; `None` writes no files.
    pub emit_to_file: Option<PathBuf>,
}

/// Time window `(start, end)`.
///
/// Diagnostic averaging uses the open interval, snapshot selection the
/// closed one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if !(start.is_finite() && end.is_finite()) {
            bail!("Time window bounds must be finite.");
        }
        if end < start {
            bail!("Time window end ({end}) precedes start ({start}).");
        }
        Ok(Self { start, end })
    }

    pub fn contains_open(&self, t: f64) -> bool {
        self.start < t && t < self.end
    }

    pub fn contains_closed(&self, t: f64) -> bool {
        self.start <= t && t <= self.end
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: 999_999.0,
        }
    }
}
