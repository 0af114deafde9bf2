//! Time and run averages of diagnostic fluxes and the quasilinear scaling
//! built from nonlinear flux spectra.

use crate::error::AnalysisError;
use crate::io::nrg::NrgSource;
use crate::io::params::ParameterFile;
use crate::io::table::{format_e, Table};
use crate::quantity::NrgColumn;
use crate::resample::interp;
use crate::settings::TimeWindow;
use crate::spectral::nonzero;
use anyhow::{bail, Context, Result};
use ndarray::{s, Array2, Array3, ArrayD, Axis};
use std::io::{BufRead, Write};

pub use crate::io::run_suffix;

/// Per-run time averages with the runs that had no sample in the window
/// removed.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeAverage {
    /// `(kept run, species, column)`.
    pub records: Array3<f64>,
    /// Positions in the run list that contributed a record.
    pub kept: Vec<usize>,
    /// Positions in the run list with no sample strictly inside the window.
    pub excluded: Vec<usize>,
}

/// Averages each run's series over the samples strictly inside `window`.
pub fn time_average(
    runs: &[String],
    window: &TimeWindow,
    nspec: usize,
    source: &impl NrgSource,
) -> Result<TimeAverage> {
    let mut kept = Vec::new();
    let mut excluded = Vec::new();
    let mut records: Vec<Array2<f64>> = Vec::new();

    for (irun, run) in runs.iter().enumerate() {
        let suffix = run_suffix(run)?;
        let series = source
            .load(&suffix, nspec)
            .with_context(|| format!("Loading diagnostics for run {run}"))?;
        if series.n_spec() != nspec {
            bail!(AnalysisError::ShapeMismatch {
                context: "nrg species",
                expected: nspec,
                actual: series.n_spec(),
            });
        }
        let inside: Vec<usize> = series
            .times
            .iter()
            .enumerate()
            .filter(|(_, &t)| window.contains_open(t))
            .map(|(i, _)| i)
            .collect();
        if inside.is_empty() {
            tracing::warn!(run = %suffix, "run has no times within range, skipping");
            excluded.push(irun);
            continue;
        }
        let mut mean = Array2::<f64>::zeros((nspec, NrgColumn::COUNT));
        for &it in &inside {
            mean += &series.values.slice(s![.., it, ..]);
        }
        mean /= inside.len() as f64;
        tracing::info!(run = %suffix, samples = inside.len(), "time averaged");
        records.push(mean);
        kept.push(irun);
    }

    let mut stacked = Array3::<f64>::zeros((records.len(), nspec, NrgColumn::COUNT));
    for (i, record) in records.iter().enumerate() {
        stacked.slice_mut(s![i, .., ..]).assign(record);
    }
    Ok(TimeAverage {
        records: stacked,
        kept,
        excluded,
    })
}

/// Picks `columns` out of `(run, species, 10)` records.
pub fn select_columns(records: &Array3<f64>, columns: &[NrgColumn]) -> Array3<f64> {
    let (nrun, nspec, _) = records.dim();
    Array3::from_shape_fn((nrun, nspec, columns.len()), |(r, sp, c)| {
        records[[r, sp, columns[c].index()]]
    })
}

/// Arithmetic mean over the leading (run) axis.
pub fn run_average(records: &ArrayD<f64>) -> Result<ArrayD<f64>> {
    if records.ndim() < 2 {
        bail!(AnalysisError::DimensionTooLow {
            required: 2,
            actual: records.ndim(),
        });
    }
    let nrun = records.len_of(Axis(0));
    if nrun == 0 {
        bail!("Cannot average over zero runs.");
    }
    Ok(records.sum_axis(Axis(0)) / nrun as f64)
}

fn parse_block(lines: &[(usize, String)]) -> Result<Array2<f64>> {
    let mut data = Vec::new();
    let mut ncols = None;
    for (lineno, line) in lines {
        let row = line
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| AnalysisError::Parse {
                line: *lineno,
                message: err.to_string(),
            })?;
        match ncols {
            None => ncols = Some(row.len()),
            Some(n) if n != row.len() => bail!(AnalysisError::Parse {
                line: *lineno,
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

/// Splits a spectrum file into the numeric blocks between `#` comment runs.
/// Malformed blocks are skipped with a warning, empty ones silently.
pub fn read_flux_spectra(reader: impl BufRead) -> Result<Vec<Array2<f64>>> {
    let mut blocks = Vec::new();
    let mut current: Vec<(usize, String)> = Vec::new();
    let flush = |current: &mut Vec<(usize, String)>, blocks: &mut Vec<Array2<f64>>| {
        if current.is_empty() {
            return;
        }
        match parse_block(current) {
            Ok(block) if block.nrows() > 0 => blocks.push(block),
            Ok(_) => {}
            Err(err) => tracing::warn!(first_line = current[0].0, "skipping malformed block: {err:#}"),
        }
        current.clear();
    };

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim_start().starts_with('#') {
            flush(&mut current, &mut blocks);
        } else if !line.trim().is_empty() {
            current.push((i + 1, line));
        }
    }
    flush(&mut current, &mut blocks);
    Ok(blocks)
}

/// The ky blocks of a spectrum file holding a kx and a ky block per species.
pub fn ky_spectra(blocks: &[Array2<f64>]) -> Vec<Array2<f64>> {
    blocks.iter().skip(1).step_by(2).cloned().collect()
}

/// Wavenumbers and one spectrum column with the first (zonal) row dropped.
fn spectrum_column(block: &Array2<f64>, column: usize) -> Result<(Vec<f64>, Vec<f64>)> {
    if block.ncols() <= column {
        bail!(AnalysisError::ShapeMismatch {
            context: "flux spectrum columns",
            expected: column + 1,
            actual: block.ncols(),
        });
    }
    if block.nrows() < 2 {
        bail!("Flux spectrum needs at least two rows.");
    }
    let k = block.slice(s![1.., 0]).to_vec();
    let v = block.slice(s![1.., column]).to_vec();
    Ok((k, v))
}

/// Nonlinear-to-quasilinear heat-flux ratio at the quasilinear wavenumbers.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeFunction {
    pub k: Vec<f64>,
    pub ratio: Vec<f64>,
}

impl ShapeFunction {
    pub fn to_table(&self) -> Result<Table> {
        Table::from_columns("ky ql_shape", &[&self.k, &self.ratio])
    }
}

/// Interpolates the nonlinear electrostatic heat flux onto the quasilinear
/// wavenumbers and divides by the quasilinear value.
pub fn create_shape(nl: &Array2<f64>, ql: &Array2<f64>) -> Result<ShapeFunction> {
    let column = NrgColumn::QEs.spectrum_column()?;
    let (k_nl, q_nl) = spectrum_column(nl, column)?;
    let (k_ql, q_ql) = spectrum_column(ql, column)?;
    let f = interp(&k_ql, &k_nl, &q_nl)?;
    let ratio = f.iter().zip(&q_ql).map(|(f, q)| f / q).collect();
    Ok(ShapeFunction { k: k_ql, ratio })
}

/// Per species and wavenumber: interpolated nonlinear flux over quasilinear
/// flux for each column.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientTable {
    pub species: Vec<String>,
    pub ky: Vec<f64>,
    pub columns: Vec<NrgColumn>,
    /// `(species, ky, column)`.
    pub values: Array3<f64>,
}

impl CoefficientTable {
    /// `nl_spectra` holds one ky spectrum per species; `ql_fluxes` is
    /// `(ky, species, column)` with the columns in `columns` order.
    pub fn build(
        species: Vec<String>,
        nl_spectra: &[Array2<f64>],
        ql_fluxes: &Array3<f64>,
        ky: Vec<f64>,
        columns: Vec<NrgColumn>,
    ) -> Result<Self> {
        let (nky, nspec, ncols) = ql_fluxes.dim();
        if nl_spectra.len() != species.len() || nspec != species.len() {
            bail!(AnalysisError::ShapeMismatch {
                context: "coefficient species",
                expected: species.len(),
                actual: nl_spectra.len().min(nspec),
            });
        }
        if nky != ky.len() {
            bail!(AnalysisError::ShapeMismatch {
                context: "coefficient wavenumbers",
                expected: ky.len(),
                actual: nky,
            });
        }
        if ncols != columns.len() {
            bail!(AnalysisError::ShapeMismatch {
                context: "coefficient columns",
                expected: columns.len(),
                actual: ncols,
            });
        }

        let mut values = Array3::<f64>::zeros((nspec, nky, ncols));
        for (isp, spectrum) in nl_spectra.iter().enumerate() {
            for (ic, column) in columns.iter().enumerate() {
                let (k_nl, f_nl) = spectrum_column(spectrum, column.spectrum_column()?)?;
                let nl_at_ky = interp(&ky, &k_nl, &f_nl)?;
                for (iky, nl) in nl_at_ky.iter().enumerate() {
                    values[[isp, iky, ic]] = nl / nonzero(ql_fluxes[[iky, isp, ic]]);
                }
            }
        }
        Ok(Self {
            species,
            ky,
            columns,
            values,
        })
    }

    fn header(&self) -> String {
        let labels: Vec<&str> = self.columns.iter().map(|c| c.label()).collect();
        format!("ky {}", labels.join(" "))
    }

    /// One `(ky, coefficients...)` table per species.
    pub fn to_tables(&self) -> Vec<Table> {
        self.species
            .iter()
            .enumerate()
            .map(|(isp, _)| {
                let mut rows = Array2::<f64>::zeros((self.ky.len(), self.columns.len() + 1));
                rows.column_mut(0).assign(&ndarray::ArrayView1::from(&self.ky[..]));
                rows.slice_mut(s![.., 1..]).assign(&self.values.slice(s![isp, .., ..]));
                Table::new(self.header(), rows)
            })
            .collect()
    }

    /// Writes every species table; the comment headers delimit the blocks.
    pub fn write_to(&self, mut writer: impl Write) -> Result<()> {
        for table in self.to_tables() {
            table.write_to(&mut writer)?;
        }
        Ok(())
    }

    fn first_column(&self, pick: fn(NrgColumn) -> bool) -> Result<usize> {
        self.columns
            .iter()
            .position(|&c| pick(c))
            .ok_or_else(|| anyhow::anyhow!("Coefficient table has no matching flux column."))
    }
}

/// A quasilinear run: its identifier, parameters and species order.
#[derive(Debug, Clone)]
pub struct QlRun {
    pub name: String,
    pub params: ParameterFile,
    pub species: Vec<String>,
    pub kymin: f64,
}

impl QlRun {
    pub fn from_parameters(name: impl Into<String>, params: ParameterFile) -> Result<Self> {
        let name = name.into();
        let nspec = params.get_usize("n_spec")?;
        let species = (1..=nspec)
            .map(|i| params.require(&format!("name{i}")).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        let kymin = params.get_f64("kymin")?;
        Ok(Self {
            name,
            params,
            species,
            kymin,
        })
    }
}

/// Writes `gamma_coef<n>` and `q_coef<n>` for every species of every run.
/// Every run is checked against the table's species order before anything is
/// written.
pub fn apply_coefficients(table: &CoefficientTable, runs: &mut [QlRun]) -> Result<()> {
    if runs.len() != table.ky.len() {
        bail!(AnalysisError::ShapeMismatch {
            context: "coefficient runs",
            expected: table.ky.len(),
            actual: runs.len(),
        });
    }
    for run in runs.iter() {
        if run.species.len() != table.species.len() {
            bail!(AnalysisError::SpeciesMismatch {
                run: run.name.clone(),
                expected: table.species.join(","),
                actual: run.species.join(","),
            });
        }
        for (expected, actual) in table.species.iter().zip(&run.species) {
            if expected != actual {
                bail!(AnalysisError::SpeciesMismatch {
                    run: run.name.clone(),
                    expected: expected.clone(),
                    actual: actual.clone(),
                });
            }
        }
    }

    let gamma = table.first_column(NrgColumn::is_particle_flux)?;
    let heat = table.first_column(NrgColumn::is_heat_flux)?;
    for (iky, run) in runs.iter_mut().enumerate() {
        for isp in 0..table.species.len() {
            let n = isp + 1;
            let g = format_e(table.values[[isp, iky, gamma]]);
            let q = format_e(table.values[[isp, iky, heat]]);
            run.params.set_species(n, "gamma_coef", g.trim())?;
            run.params.set_species(n, "q_coef", q.trim())?;
        }
        tracing::info!(run = %run.name, "applied QL coefficients");
    }
    Ok(())
}

/// Species name and its `(ky, fluxes...)` table.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesSpectrum {
    pub species: String,
    pub table: Table,
}

/// Collects the time-averaged fluxes of quasilinear runs into one spectrum per
/// species, keyed by each run's `kymin`. `averages` is `(run, species, column)`.
pub fn assemble_ql_spectrum(
    runs: &[QlRun],
    averages: &Array3<f64>,
    columns: &[NrgColumn],
) -> Result<Vec<SpeciesSpectrum>> {
    let Some(first) = runs.first() else {
        bail!("At least one quasilinear run is required.");
    };
    let (nrun, nspec, ncols) = averages.dim();
    if nrun != runs.len() {
        bail!(AnalysisError::ShapeMismatch {
            context: "spectrum runs",
            expected: runs.len(),
            actual: nrun,
        });
    }
    if nspec != first.species.len() || ncols != columns.len() {
        bail!(AnalysisError::ShapeMismatch {
            context: "spectrum fluxes",
            expected: first.species.len() * columns.len(),
            actual: nspec * ncols,
        });
    }
    let labels: Vec<&str> = columns.iter().map(|c| c.label()).collect();
    let header = format!("$k_y$ {}", labels.join(" "));
    Ok(first
        .species
        .iter()
        .enumerate()
        .map(|(isp, name)| {
            let mut rows = Array2::<f64>::zeros((nrun, ncols + 1));
            for (ir, run) in runs.iter().enumerate() {
                rows[[ir, 0]] = run.kymin;
            }
            rows.slice_mut(s![.., 1..]).assign(&averages.slice(s![.., isp, ..]));
            SpeciesSpectrum {
                species: name.clone(),
                table: Table::new(header.clone(), rows),
            }
        })
        .collect())
}
