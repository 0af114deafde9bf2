//! Proper orthogonal decomposition of `(time, z, x)` data.
//!
//! Space is flattened column-major (`z + nz * x`) and several quantities are
//! decomposed jointly by concatenating their flattened blocks along the
//! feature axis. Spatial modes are split back per quantity afterwards.

use crate::error::AnalysisError;
use crate::io::table::{mode_file_name, Table};
use crate::mode::{FieldSet, Mode};
use crate::quantity::{cumulative_header, Quantity};
use crate::settings::{AnalysisSettings, OutputSettings};
use crate::spectral::nonzero;
use anyhow::{anyhow, bail, Result};
use nalgebra::{DMatrix, SVD};
use ndarray::{s, Array3, Zip};
use num_complex::Complex64;

/// Density and temperature normalisations plus the coordinate factor entering
/// the E×B heat flux of one ky.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatFluxFactors {
    pub ky: f64,
    pub n0: f64,
    pub t0: f64,
    pub c_xy: f64,
}

/// `Q = 2 Re(-i n0 T0 ky phi / C_xy * conj(tpar / 2 + tperp + 3 dens / 2))`
/// for every `(index, z, x)`, optionally scaled per leading index.
///
/// The factor two accounts for the negative ky half that is not stored.
pub fn heat_flux(
    factors: &HeatFluxFactors,
    fields: &FieldSet,
    weights: Option<&[f64]>,
) -> Result<Array3<f64>> {
    let phi = fields.get(Quantity::Phi)?;
    let dens = fields.get(Quantity::Dens)?;
    let tpar = fields.get(Quantity::Tpar)?;
    let tperp = fields.get(Quantity::Tperp)?;
    for other in [dens, tpar, tperp] {
        if other.dim() != phi.dim() {
            bail!(AnalysisError::ShapeMismatch {
                context: "heat flux inputs",
                expected: phi.len(),
                actual: other.len(),
            });
        }
    }

    let prefactor = Complex64::new(0.0, -factors.n0 * factors.t0 * factors.ky / nonzero(factors.c_xy));
    let mut out = Array3::<f64>::zeros(phi.dim());
    Zip::from(&mut out)
        .and(phi)
        .and(dens)
        .and(tpar)
        .and(tperp)
        .for_each(|q, &p, &n, &tpa, &tpe| {
            let moments = tpa * 0.5 + tpe + n * 1.5;
            *q = 2.0 * (prefactor * p * moments.conj()).re;
        });

    if let Some(w) = weights {
        if w.len() != out.len_of(ndarray::Axis(0)) {
            bail!(AnalysisError::ShapeMismatch {
                context: "heat flux weights",
                expected: out.len_of(ndarray::Axis(0)),
                actual: w.len(),
            });
        }
        for (mut slab, &weight) in out.outer_iter_mut().zip(w) {
            slab *= weight;
        }
    }
    Ok(out)
}

/// Jacobian-weighted z average of the radial sum, one value per leading index.
pub fn surface_totals(q: &Array3<f64>, jacobian: &[f64]) -> Result<Vec<f64>> {
    let (_, nz, _) = q.dim();
    if jacobian.len() != nz {
        bail!(AnalysisError::ShapeMismatch {
            context: "jacobian",
            expected: nz,
            actual: jacobian.len(),
        });
    }
    let total = nonzero(jacobian.iter().sum());
    Ok(q.outer_iter()
        .map(|slab| {
            slab.rows()
                .into_iter()
                .zip(jacobian)
                .map(|(row, j)| row.sum() * j)
                .sum::<f64>()
                / total
        })
        .collect())
}

/// Decomposition `M = U diag(s) V^H` of the flattened data, modes sorted by
/// descending singular value.
#[derive(Debug, Clone)]
pub struct Pod {
    /// `(time, pod)`; columns are the temporal modes.
    pub temporal: DMatrix<Complex64>,
    pub singular_values: Vec<f64>,
    /// `(pod, feature)`; rows are the flattened spatial modes.
    pub spatial: DMatrix<Complex64>,
    labels: Vec<&'static str>,
    block: (usize, usize),
}

fn flatten_blocks(blocks: &[&Array3<Complex64>]) -> Result<(DMatrix<Complex64>, (usize, usize))> {
    let Some(first) = blocks.first() else {
        bail!("POD needs at least one quantity.");
    };
    let (nt, nz, nc) = first.dim();
    if nt == 0 || nz * nc == 0 {
        bail!("POD needs non-empty (time, z, x) data.");
    }
    for block in blocks {
        if block.dim() != (nt, nz, nc) {
            bail!(AnalysisError::ShapeMismatch {
                context: "POD blocks",
                expected: first.len(),
                actual: block.len(),
            });
        }
    }
    let width = nz * nc;
    let mut matrix = DMatrix::<Complex64>::zeros(nt, width * blocks.len());
    for (b, block) in blocks.iter().enumerate() {
        for ((t, z, x), &v) in block.indexed_iter() {
            matrix[(t, b * width + z + nz * x)] = v;
        }
    }
    Ok((matrix, (nz, nc)))
}

fn decompose(blocks: &[&Array3<Complex64>], labels: Vec<&'static str>) -> Result<Pod> {
    let (matrix, block) = flatten_blocks(blocks)?;
    let (nt, nfeat) = matrix.shape();
    let svd = SVD::new(matrix, true, true);
    let u = svd.u.ok_or_else(|| anyhow!("SVD did not produce temporal modes."))?;
    let v_t = svd.v_t.ok_or_else(|| anyhow!("SVD did not produce spatial modes."))?;
    let raw: Vec<f64> = svd.singular_values.iter().copied().collect();

    let mut order: Vec<usize> = (0..raw.len()).collect();
    order.sort_by(|&a, &b| raw[b].total_cmp(&raw[a]));
    let rank = order.len();

    let temporal = DMatrix::from_fn(nt, rank, |i, k| u[(i, order[k])]);
    let spatial = DMatrix::from_fn(rank, nfeat, |k, j| v_t[(order[k], j)]);
    let singular_values = order.iter().map(|&k| raw[k]).collect();

    tracing::debug!(ntimes = nt, features = nfeat, rank, "computed POD");
    Ok(Pod {
        temporal,
        singular_values,
        spatial,
        labels,
        block,
    })
}

/// POD of a single `(time, z, x)` array.
pub fn pod(var: &Array3<Complex64>) -> Result<Pod> {
    decompose(&[var], vec!["field"])
}

impl Pod {
    pub fn npods(&self) -> usize {
        self.singular_values.len()
    }

    pub fn nblocks(&self) -> usize {
        self.labels.len()
    }

    /// Spatial modes of block `b` reshaped to `(pod, z, x)`.
    pub fn spatial_block(&self, b: usize) -> Result<Array3<Complex64>> {
        if b >= self.nblocks() {
            bail!("Block {} out of range for {} quantities.", b, self.nblocks());
        }
        let (nz, nc) = self.block;
        let offset = b * nz * nc;
        Ok(Array3::from_shape_fn((self.npods(), nz, nc), |(k, z, x)| {
            self.spatial[(k, offset + z + nz * x)]
        }))
    }

    /// `sum_i s_i u_i v_i^H` over every mode.
    pub fn reconstruct(&self) -> DMatrix<Complex64> {
        let mut scaled = self.temporal.clone();
        for (k, &s) in self.singular_values.iter().enumerate() {
            for i in 0..scaled.nrows() {
                scaled[(i, k)] *= s;
            }
        }
        scaled * &self.spatial
    }

    /// Fails with [`AnalysisError::ReconstructionFailed`] when any entry of the
    /// reconstruction deviates from `originals` by more than `tolerance`.
    pub fn verify_reconstruction(&self, originals: &[&Array3<Complex64>], tolerance: f64) -> Result<()> {
        if originals.len() != self.nblocks() {
            bail!(AnalysisError::ShapeMismatch {
                context: "reconstruction blocks",
                expected: self.nblocks(),
                actual: originals.len(),
            });
        }
        let rebuilt = self.reconstruct();
        let (nz, nc) = self.block;
        for (b, (original, &label)) in originals.iter().zip(&self.labels).enumerate() {
            if original.dim() != (rebuilt.nrows(), nz, nc) {
                bail!(AnalysisError::ShapeMismatch {
                    context: "reconstruction shape",
                    expected: rebuilt.nrows() * nz * nc,
                    actual: original.len(),
                });
            }
            let max_error = original
                .indexed_iter()
                .map(|((t, z, x), v)| (rebuilt[(t, b * nz * nc + z + nz * x)] - v).norm())
                .fold(0.0, f64::max);
            if !(max_error <= tolerance) {
                bail!(AnalysisError::ReconstructionFailed {
                    quantity: label,
                    max_error,
                    tolerance,
                });
            }
        }
        Ok(())
    }

    /// Temporal mode `ipod` as `(re, im)` columns.
    pub fn temporal_mode(&self, ipod: usize) -> Result<(Vec<f64>, Vec<f64>)> {
        if ipod >= self.npods() {
            bail!("POD {} out of range for {} modes.", ipod, self.npods());
        }
        Ok(self.temporal.column(ipod).iter().map(|c| (c.re, c.im)).unzip())
    }
}

/// Joint POD of several quantities of one mode with the spatial modes split
/// back per quantity.
#[derive(Debug, Clone)]
pub struct CollectivePod {
    pub quantities: Vec<Quantity>,
    /// Whether only the connected radial columns took part.
    pub extend: bool,
    pub pod: Pod,
    /// `(pod, z, columns)` per quantity.
    pub modes: FieldSet,
}

fn pod_input(mode: &Mode, quantity: Quantity, extend: bool) -> Result<Array3<Complex64>> {
    let field = mode.field(quantity)?;
    if !extend {
        return Ok(field.clone());
    }
    let columns = mode.grid.kx_columns(mode.nx);
    let mut out = Array3::zeros((field.dim().0, mode.nz, columns.len()));
    for (m, &col) in columns.iter().enumerate() {
        out.slice_mut(s![.., .., m]).assign(&field.slice(s![.., .., col]));
    }
    Ok(out)
}

/// Restricts each quantity to the connected radial columns when `extend` is
/// set, uses every column otherwise.
pub fn collective_pod(mode: &Mode, quantities: &[Quantity], extend: bool) -> Result<CollectivePod> {
    if quantities.is_empty() {
        bail!("POD needs at least one quantity.");
    }
    let selected = quantities
        .iter()
        .map(|&q| pod_input(mode, q, extend))
        .collect::<Result<Vec<_>>>()?;

    let blocks: Vec<&Array3<Complex64>> = selected.iter().collect();
    let pod = decompose(&blocks, quantities.iter().map(|q| q.name()).collect())?;

    let mut modes = FieldSet::new();
    for (b, &q) in quantities.iter().enumerate() {
        modes.insert(q, pod.spatial_block(b)?);
    }
    tracing::info!(iky = mode.iky, npods = pod.npods(), extend, "collective POD");
    Ok(CollectivePod {
        quantities: quantities.to_vec(),
        extend,
        pod,
        modes,
    })
}

impl CollectivePod {
    /// Checks the decomposition against the mode it was taken from.
    pub fn verify_reconstruction(&self, mode: &Mode, tolerance: f64) -> Result<()> {
        let originals = self
            .quantities
            .iter()
            .map(|&q| pod_input(mode, q, self.extend))
            .collect::<Result<Vec<_>>>()?;
        let refs: Vec<&Array3<Complex64>> = originals.iter().collect();
        self.pod.verify_reconstruction(&refs, tolerance)
    }
}

impl Mode {
    /// Heat flux carried by each POD mode, weighted by `s_i^2`:
    /// `(pod, z, columns)`.
    pub fn modal_heat_flux(&self, pod: &CollectivePod) -> Result<Array3<f64>> {
        let weights: Vec<f64> = pod.pod.singular_values.iter().map(|s| s * s).collect();
        heat_flux(&self.heat_flux_factors(), &pod.modes, Some(&weights))
    }

    /// Surface-averaged heat flux of each POD mode.
    pub fn modal_heat_flux_per_pod(&self, pod: &CollectivePod) -> Result<Vec<f64>> {
        surface_totals(&self.modal_heat_flux(pod)?, &self.geometry.jacobian)
    }

    /// Sum over POD modes divided by the number of times; equals
    /// [`Mode::heat_flux_total`] over the same radial columns.
    pub fn modal_heat_flux_total(&self, pod: &CollectivePod) -> Result<f64> {
        let nt = pod.pod.temporal.nrows();
        Ok(self.modal_heat_flux_per_pod(pod)?.iter().sum::<f64>() / nt as f64)
    }

    /// Time mean of the surface-averaged heat flux over every radial column.
    pub fn heat_flux_total(&self) -> Result<f64> {
        let q = heat_flux(&self.heat_flux_factors(), &self.fields, None)?;
        let per_time = surface_totals(&q, &self.geometry.jacobian)?;
        Ok(per_time.iter().sum::<f64>() / per_time.len().max(1) as f64)
    }
}

/// Values and their normalised cumulative sum under the header for `tag`.
pub fn cumulative_table(values: &[f64], tag: &str) -> Result<Table> {
    let header = cumulative_header(tag)?;
    let total = nonzero(values.iter().sum());
    let cumulative: Vec<f64> = values
        .iter()
        .scan(0.0, |acc, v| {
            *acc += v;
            Some(*acc / total)
        })
        .collect();
    Table::from_columns(header, &[values, &cumulative])
}

fn check_pods(pods: &[usize], npods: usize) -> Result<()> {
    if let Some(&bad) = pods.iter().find(|&&p| p >= npods) {
        bail!("POD {} out of range for {} modes.", bad, npods);
    }
    Ok(())
}

/// Extended spatial structure of the selected modes, one block per
/// `(pod, quantity)`: `z_ext`, real and imaginary parts. With `normalise` each
/// profile is divided by its centre value and then by its peak magnitude.
pub fn pod_mode_tables(mode: &Mode, pod: &CollectivePod, pods: &[usize], normalise: bool) -> Result<Vec<Table>> {
    check_pods(pods, pod.pod.npods())?;
    let mut tables = Vec::with_capacity(pods.len() * pod.quantities.len());
    for &ipod in pods {
        for &q in &pod.quantities {
            let spatial = pod.modes.get(q)?;
            let mut profile = mode.extended_snapshot(spatial.slice(s![ipod, .., ..]))?;
            if normalise {
                let centre = profile[mode.grid.zero_ind];
                if centre != Complex64::new(0.0, 0.0) {
                    profile.iter_mut().for_each(|v| *v /= centre);
                }
                let peak = nonzero(profile.iter().map(|v| v.norm()).fold(0.0, f64::max));
                profile.iter_mut().for_each(|v| *v /= peak);
            }
            let (re, im): (Vec<f64>, Vec<f64>) = profile.iter().map(|c| (c.re, c.im)).unzip();
            tables.push(Table::from_columns(
                format!("{} POD {}", q.name(), ipod),
                &[&mode.grid.zgrid_ext, &re, &im],
            )?);
        }
    }
    Ok(tables)
}

/// Time traces of the selected temporal modes: time, real and imaginary parts.
pub fn pod_time_tables(times: &[f64], pod: &Pod, pods: &[usize]) -> Result<Vec<Table>> {
    check_pods(pods, pod.npods())?;
    pods.iter()
        .map(|&ipod| {
            let (re, im) = pod.temporal_mode(ipod)?;
            Table::from_columns(format!("time POD {ipod}"), &[times, &re, &im])
        })
        .collect()
}

/// Verifies the decomposition, then writes the singular-value table, the
/// normalised spatial modes and the time traces of `pods`.
pub fn output_pod(
    mode: &Mode,
    pod: &CollectivePod,
    pods: &[usize],
    settings: &AnalysisSettings,
    output: &OutputSettings,
) -> Result<()> {
    pod.verify_reconstruction(mode, settings.reconstruction_tolerance)?;
    let sv = cumulative_table(&pod.pod.singular_values, "sv")?;
    output.emit(&mode_file_name("sv", mode.iky, mode.kx_cent, ""), &[sv])?;
    let spatial = pod_mode_tables(mode, pod, pods, true)?;
    output.emit(&mode_file_name("pod", mode.iky, mode.kx_cent, "_norm"), &spatial)?;
    let temporal = pod_time_tables(&mode.times, &pod.pod, pods)?;
    output.emit(&mode_file_name("pod_time", mode.iky, mode.kx_cent, ""), &temporal)?;
    Ok(())
}

/// Cumulative table of the per-mode heat flux.
pub fn output_heat_flux(mode: &Mode, pod: &CollectivePod, output: &OutputSettings) -> Result<()> {
    let q = mode.modal_heat_flux_per_pod(pod)?;
    output.emit(&mode_file_name("q", mode.iky, mode.kx_cent, ""), &[cumulative_table(&q, "q")?])?;
    Ok(())
}
