//! Flat whitespace-delimited tables with a single `# ` header line.

use crate::error::AnalysisError;
use crate::settings::OutputSettings;
use anyhow::{bail, Context, Result};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::PathBuf;

/// One table block; several blocks may share a file, separated by two blank lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub header: String,
    pub rows: Array2<f64>,
}

impl Table {
    pub fn new(header: impl Into<String>, rows: Array2<f64>) -> Self {
        Self {
            header: header.into(),
            rows,
        }
    }

    /// Builds a table from equally long columns.
    pub fn from_columns(header: impl Into<String>, columns: &[&[f64]]) -> Result<Self> {
        let nrows = columns.first().map(|c| c.len()).unwrap_or(0);
        for col in columns {
            if col.len() != nrows {
                bail!(AnalysisError::ShapeMismatch {
                    context: "table columns",
                    expected: nrows,
                    actual: col.len(),
                });
            }
        }
        let mut rows = Array2::<f64>::zeros((nrows, columns.len()));
        for (j, col) in columns.iter().enumerate() {
            for (i, &v) in col.iter().enumerate() {
                rows[[i, j]] = v;
            }
        }
        Ok(Self::new(header, rows))
    }

    pub fn write_to(&self, mut writer: impl Write) -> Result<()> {
        if !self.header.is_empty() {
            writeln!(writer, "# {}", self.header)?;
        }
        for row in self.rows.rows() {
            let line: Vec<String> = row.iter().map(|&v| format_e(v)).collect();
            writeln!(writer, "{}", line.join(" "))?;
        }
        Ok(())
    }

    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// `% E` formatting: sign or space, six decimals, at least two exponent digits.
pub fn format_e(value: f64) -> String {
    if !value.is_finite() {
        let text = if value.is_nan() {
            "NAN".to_string()
        } else if value > 0.0 {
            "INF".to_string()
        } else {
            "-INF".to_string()
        };
        return if text.starts_with('-') { text } else { format!(" {text}") };
    }
    let raw = format!("{:.6E}", value.abs());
    let (mantissa, exponent) = raw.split_once('E').unwrap_or((raw.as_str(), "0"));
    let exp: i32 = exponent.parse().unwrap_or(0);
    let sign = if value.is_sign_negative() && value != 0.0 { '-' } else { ' ' };
    let exp_sign = if exp < 0 { '-' } else { '+' };
    format!("{sign}{mantissa}E{exp_sign}{:02}", exp.abs())
}

/// Reads numeric rows, skipping `#` comments and blank lines.
pub fn read_table(reader: impl BufRead) -> Result<Array2<f64>> {
    let mut data = Vec::new();
    let mut ncols = None;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let row = trimmed
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| AnalysisError::Parse {
                line: lineno + 1,
                message: err.to_string(),
            })?;
        match ncols {
            None => ncols = Some(row.len()),
            Some(n) if n != row.len() => bail!(AnalysisError::Parse {
                line: lineno + 1,
                message: format!("expected {n} columns, found {}", row.len()),
            }),
            Some(_) => {}
        }
        data.extend(row);
    }
    let ncols = ncols.unwrap_or(0);
    let nrows = if ncols == 0 { 0 } else { data.len() / ncols };
    Ok(Array2::from_shape_vec((nrows, ncols), data)?)
}

/// `<tag>_ky<iky>_kx<kx><suffix>.dat`, indices zero-padded to three digits.
pub fn mode_file_name(tag: &str, iky: usize, kx_cent: i64, suffix: &str) -> String {
    format!("{tag}_ky{iky:03}_kx{kx_cent:03}{suffix}.dat")
}

impl OutputSettings {
    /// Sends the blocks to the console and/or `<dir>/<file_name>`.
    pub fn emit(&self, file_name: &str, blocks: &[Table]) -> Result<Option<PathBuf>> {
        if self.emit_to_console {
            for block in blocks {
                print!("{}", block.render()?);
            }
        }
        let Some(dir) = &self.emit_to_file else {
            return Ok(None);
        };
        let path = dir.join(file_name);
        let file = File::create(&path)
            .with_context(|| format!("Failed to create output file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        for (i, block) in blocks.iter().enumerate() {
            if i > 0 {
                writeln!(writer)?;
                writeln!(writer)?;
            }
            block.write_to(&mut writer)?;
        }
        writer.flush()?;
        tracing::info!(path = %path.display(), "wrote table");
        Ok(Some(path))
    }
}
