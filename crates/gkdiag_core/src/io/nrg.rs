use crate::error::AnalysisError;
use crate::quantity::NrgColumn;
use anyhow::{bail, Context, Result};
use ndarray::Array3;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

/// Per-species diagnostic time series of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct NrgSeries {
    pub times: Vec<f64>,
    /// `(species, time, column)`.
    pub values: Array3<f64>,
}

impl NrgSeries {
    pub fn n_spec(&self) -> usize {
        self.values.dim().0
    }
}

/// Supplies diagnostic time series by run suffix.
pub trait NrgSource {
    fn load(&self, suffix: &str, nspec: usize) -> Result<NrgSeries>;
}

/// Reads `nrg<suffix>` files from a directory.
#[derive(Debug, Clone)]
pub struct NrgDirectory {
    pub dir: PathBuf,
}

impl NrgDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl NrgSource for NrgDirectory {
    fn load(&self, suffix: &str, nspec: usize) -> Result<NrgSeries> {
        let path = self.dir.join(format!("nrg{suffix}"));
        let file = File::open(&path)
            .with_context(|| format!("Failed to open nrg file {}", path.display()))?;
        parse_nrg(BufReader::new(file), nspec)
            .with_context(|| format!("Failed to parse nrg file {}", path.display()))
    }
}

/// Parses the nrg text layout: a line holding the time, then one line of ten
/// values per species, repeated.
pub fn parse_nrg(reader: impl BufRead, nspec: usize) -> Result<NrgSeries> {
    if nspec == 0 {
        bail!("nspec must be at least 1.");
    }
    let mut times = Vec::new();
    let mut rows: Vec<[f64; NrgColumn::COUNT]> = Vec::new();
    let mut expect_time = true;
    let mut species_seen = 0usize;

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let values = trimmed
            .split_whitespace()
            .map(|tok| tok.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| AnalysisError::Parse {
                line: lineno + 1,
                message: err.to_string(),
            })?;

        if expect_time {
            if values.len() != 1 {
                bail!(AnalysisError::Parse {
                    line: lineno + 1,
                    message: format!("expected a time value, found {} columns", values.len()),
                });
            }
            times.push(values[0]);
            expect_time = false;
            species_seen = 0;
        } else {
            if values.len() != NrgColumn::COUNT {
                bail!(AnalysisError::Parse {
                    line: lineno + 1,
                    message: format!(
                        "expected {} columns, found {}",
                        NrgColumn::COUNT,
                        values.len()
                    ),
                });
            }
            let mut row = [0.0; NrgColumn::COUNT];
            row.copy_from_slice(&values);
            rows.push(row);
            species_seen += 1;
            if species_seen == nspec {
                expect_time = true;
            }
        }
    }

    if !expect_time {
        // Drop a trailing record truncated by a still-running simulation.
        times.pop();
        rows.truncate(times.len() * nspec);
    }

    let ntimes = times.len();
    let mut values = Array3::<f64>::zeros((nspec, ntimes, NrgColumn::COUNT));
    for (it, chunk) in rows.chunks(nspec).enumerate() {
        for (is, row) in chunk.iter().enumerate() {
            for (ic, &v) in row.iter().enumerate() {
                values[[is, it, ic]] = v;
            }
        }
    }

    Ok(NrgSeries { times, values })
}
