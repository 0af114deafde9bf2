//! Readers and writers at the edge of the analysis: parameters, nrg diagnostic
//! series, field snapshots and flat text tables.

pub mod field;
pub mod nrg;
pub mod params;
pub mod table;

use crate::error::AnalysisError;
use anyhow::Result;

/// Maps a run number to its file suffix: `.dat` for names ending in `dat`,
/// otherwise `_` followed by the trailing digits zero-padded to four places.
pub fn run_suffix(run: &str) -> Result<String> {
    if run.ends_with("dat") {
        return Ok(".dat".to_string());
    }
    let digits: String = run
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if digits.is_empty() {
        return Err(AnalysisError::InvalidRunNumber(run.to_string()).into());
    }
    // Only the last four digits take part, as in `0123` from `run10123`.
    let tail = &digits[digits.len().saturating_sub(4)..];
    Ok(format!("_{tail:0>4}"))
}
