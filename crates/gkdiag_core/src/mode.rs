//! The ballooning structure of one ky mode.
//!
//! A [`Mode`] is produced whole by [`build_mode`]: the connected grid is
//! derived from the parameters, every requested quantity is read over the
//! time window, and the result is never mutated afterwards.

use crate::error::AnalysisError;
use crate::geometry::Geometry;
use crate::grid::ConnectedGrid;
use crate::io::field::{times_in_window, FieldSource};
use crate::io::params::SimParameters;
use crate::pod::{heat_flux, HeatFluxFactors};
use crate::quantity::Quantity;
use crate::settings::TimeWindow;
use anyhow::{bail, Context, Result};
use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use num_complex::Complex64;
use std::sync::Arc;

/// One slot per [`Quantity`]; arrays are `(time or mode index, z, x)`.
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    slots: [Option<Array3<Complex64>>; Quantity::COUNT],
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, quantity: Quantity, data: Array3<Complex64>) {
        self.slots[quantity.index()] = Some(data);
    }

    pub fn get(&self, quantity: Quantity) -> Result<&Array3<Complex64>, AnalysisError> {
        self.slots[quantity.index()]
            .as_ref()
            .ok_or(AnalysisError::MissingQuantity(quantity.name()))
    }

    pub fn contains(&self, quantity: Quantity) -> bool {
        self.slots[quantity.index()].is_some()
    }

    pub fn quantities(&self) -> Vec<Quantity> {
        Quantity::ALL
            .iter()
            .copied()
            .filter(|q| self.contains(*q))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ModeRequest {
    pub iky: usize,
    pub kx_cent: i64,
    pub window: TimeWindow,
    pub quantities: Vec<Quantity>,
}

#[derive(Debug, Clone)]
pub struct Mode {
    pub iky: usize,
    pub ky: f64,
    pub kx_cent: i64,
    pub nx: usize,
    pub nz: usize,
    pub n0: f64,
    pub t0: f64,
    pub times: Vec<f64>,
    pub grid: ConnectedGrid,
    pub fields: FieldSet,
    pub geometry: Arc<Geometry>,
}

/// Reads the requested quantities of one ky mode over the closed time window.
pub fn build_mode(
    params: &SimParameters,
    source: &mut impl FieldSource,
    geometry: Arc<Geometry>,
    request: &ModeRequest,
) -> Result<Mode> {
    params.validate()?;
    if request.quantities.is_empty() {
        bail!("At least one quantity must be requested.");
    }
    if geometry.nz() != params.nz {
        bail!(AnalysisError::ShapeMismatch {
            context: "geometry poloidal grid",
            expected: params.nz,
            actual: geometry.nz(),
        });
    }

    let mut to_read: Vec<Quantity> = Vec::new();
    for &q in &request.quantities {
        let inputs: &[Quantity] = if q == Quantity::HeatFlux {
            &Quantity::HEAT_FLUX_INPUTS
        } else {
            std::slice::from_ref(&q)
        };
        for &input in inputs {
            if !source.provides(input) {
                bail!(AnalysisError::MissingQuantity(input.name()));
            }
            if !to_read.contains(&input) {
                to_read.push(input);
            }
        }
    }

    let times = times_in_window(source.times(), request.window.start, request.window.end);
    if times.is_empty() {
        bail!(
            "No snapshots between t = {} and t = {}.",
            request.window.start,
            request.window.end
        );
    }

    let grid = ConnectedGrid::build(params, request.iky, request.kx_cent)?;
    let (nt, nz, nx) = (times.len(), params.nz, params.nx);
    let mut buffers: Vec<Array3<Complex64>> = to_read
        .iter()
        .map(|_| Array3::zeros((nt, nz, nx)))
        .collect();

    for (it, &time) in times.iter().enumerate() {
        source
            .set_time(time)
            .with_context(|| format!("Selecting snapshot at t = {time}"))?;
        for (buffer, &q) in buffers.iter_mut().zip(&to_read) {
            let snapshot = source.read(q)?;
            let (snz, nky, snx) = snapshot.dim();
            if snz != nz || snx != nx {
                bail!(
                    "Snapshot of {} has shape ({}, {}, {}), expected ({}, _, {}).",
                    q,
                    snz,
                    nky,
                    snx,
                    nz,
                    nx
                );
            }
            // Linear scans store a single ky per file.
            let iy = if nky == 1 { 0 } else { request.iky };
            if iy >= nky {
                bail!("ky index {} out of range for {} stored modes.", iy, nky);
            }
            buffer
                .slice_mut(s![it, .., ..])
                .assign(&snapshot.slice(s![.., iy, ..]));
        }
    }

    let mut fields = FieldSet::new();
    for (buffer, q) in buffers.into_iter().zip(to_read) {
        fields.insert(q, buffer);
    }

    let ky = request.iky as f64 * params.kymin;
    if request.quantities.contains(&Quantity::HeatFlux) {
        let factors = HeatFluxFactors {
            ky,
            n0: params.dens1,
            t0: params.temp1,
            c_xy: geometry.c_xy_or_one(),
        };
        let q = heat_flux(&factors, &fields, None)?;
        fields.insert(Quantity::HeatFlux, q.mapv(|v| Complex64::new(v, 0.0)));
    }

    tracing::info!(
        iky = request.iky,
        kx_cent = request.kx_cent,
        ntimes = nt,
        nmodes = grid.nmodes(),
        "built mode"
    );

    Ok(Mode {
        iky: request.iky,
        ky,
        kx_cent: request.kx_cent,
        nx,
        nz,
        n0: params.dens1,
        t0: params.temp1,
        times,
        grid,
        fields,
        geometry,
    })
}

impl Mode {
    pub fn field(&self, quantity: Quantity) -> Result<&Array3<Complex64>> {
        Ok(self.fields.get(quantity)?)
    }

    pub fn heat_flux_factors(&self) -> HeatFluxFactors {
        HeatFluxFactors {
            ky: self.ky,
            n0: self.n0,
            t0: self.t0,
            c_xy: self.geometry.c_xy_or_one(),
        }
    }

    pub fn n_ext(&self) -> usize {
        self.nz * self.grid.nmodes()
    }

    /// Columns of `var` holding the connected modes. Arrays with exactly `nx`
    /// columns are full radial grids; arrays with one column per connected
    /// mode were selected already.
    fn connected_columns(&self, ncols: usize) -> Result<Vec<usize>> {
        let nmodes = self.grid.nmodes();
        if ncols == self.nx {
            Ok(self.grid.kx_columns(self.nx))
        } else if ncols == nmodes {
            Ok((0..nmodes).collect())
        } else {
            bail!(AnalysisError::ShapeMismatch {
                context: "radial columns",
                expected: self.nx,
                actual: ncols,
            })
        }
    }

    /// Stitches `(n, z, x)` data into `(n, z_ext)` with `z` varying fastest.
    pub fn extended(&self, var: &Array3<Complex64>) -> Result<Array2<Complex64>> {
        let (n, nz, ncols) = var.dim();
        if nz != self.nz {
            bail!(AnalysisError::ShapeMismatch {
                context: "poloidal points",
                expected: self.nz,
                actual: nz,
            });
        }
        let columns = self.connected_columns(ncols)?;
        let mut out = Array2::<Complex64>::zeros((n, self.n_ext()));
        for (m, (&col, &phase)) in columns.iter().zip(&self.grid.phase).enumerate() {
            for it in 0..n {
                for iz in 0..nz {
                    out[[it, iz + nz * m]] = var[[it, iz, col]] * phase;
                }
            }
        }
        Ok(out)
    }

    /// Extended structure of a single `(z, x)` snapshot.
    pub fn extended_snapshot(&self, var: ArrayView2<'_, Complex64>) -> Result<Vec<Complex64>> {
        let stacked = var.insert_axis(Axis(0)).to_owned();
        Ok(self.extended(&stacked)?.row(0).to_vec())
    }

    /// Snapshot normalised to its value at the grid centre (zero treated as
    /// one), either along the extended coordinate or summed over x.
    pub fn ballooning_profile(
        &self,
        var: ArrayView2<'_, Complex64>,
        extend: bool,
    ) -> Result<(Vec<Complex64>, Vec<f64>)> {
        let (pvar, norm, zgrid) = if extend {
            let pvar = self.extended_snapshot(var)?;
            let norm = pvar[self.grid.zero_ind];
            (pvar, norm, self.grid.zgrid_ext.clone())
        } else {
            let pvar: Vec<Complex64> = var.sum_axis(Axis(1)).to_vec();
            let norm = pvar[self.nz / 2];
            (pvar, norm, self.grid.zgrid.clone())
        };
        let norm = if norm == Complex64::new(0.0, 0.0) {
            Complex64::new(1.0, 0.0)
        } else {
            norm
        };
        Ok((pvar.into_iter().map(|v| v / norm).collect(), zgrid))
    }

    /// Sum over the radial index: `(time, z)`.
    pub fn sum_x(&self, quantity: Quantity) -> Result<Array2<Complex64>> {
        Ok(self.field(quantity)?.sum_axis(Axis(2)))
    }

    /// Jacobian-weighted average along the extended coordinate, per time.
    pub fn avg_z_field(&self, var: &Array3<Complex64>) -> Result<Vec<Complex64>> {
        let ext = self.extended(var)?;
        let jac = self.geometry.tiled_jacobian(self.grid.nmodes());
        let total: f64 = jac.iter().sum();
        Ok(ext
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .zip(&jac)
                    .map(|(v, w)| *v * *w)
                    .sum::<Complex64>()
                    / total
            })
            .collect())
    }

    /// Time mean at each extended grid point.
    pub fn avg_t_field(&self, var: &Array3<Complex64>) -> Result<Vec<Complex64>> {
        let ext = self.extended(var)?;
        let nt = ext.nrows();
        if nt == 0 {
            bail!("Cannot average an empty time series.");
        }
        Ok(ext.sum_axis(Axis(0)).iter().map(|v| *v / nt as f64).collect())
    }

    /// `2 pi / lx` times the time mean of the Jacobian-weighted z average of
    /// the first radial column.
    pub fn mean_tzx(&self, var: &Array3<Complex64>, lx: f64) -> Result<Complex64> {
        let (nt, nz, _) = var.dim();
        if nt == 0 {
            bail!("Cannot average an empty time series.");
        }
        let jac = &self.geometry.jacobian;
        if jac.len() != nz {
            bail!(AnalysisError::ShapeMismatch {
                context: "jacobian",
                expected: nz,
                actual: jac.len(),
            });
        }
        let total: f64 = jac.iter().sum();
        let mut acc = Complex64::new(0.0, 0.0);
        for it in 0..nt {
            let zavg: Complex64 = (0..nz).map(|iz| var[[it, iz, 0]] * jac[iz]).sum::<Complex64>() / total;
            acc += zavg;
        }
        Ok(2.0 * std::f64::consts::PI / lx * acc / nt as f64)
    }
}

/// Sum over x of `quantity`, then over every mode: `(time, z)`.
pub fn sum_modes(modes: &[Mode], quantity: Quantity) -> Result<Array2<Complex64>> {
    let Some(first) = modes.first() else {
        bail!("At least one mode is required.");
    };
    let mut total = first.sum_x(quantity)?;
    for mode in &modes[1..] {
        let part = mode.sum_x(quantity)?;
        if part.dim() != total.dim() {
            bail!("Modes disagree on (time, z) shape for {}.", quantity);
        }
        total += &part;
    }
    Ok(total)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::correlation::{autocorrelate_tz, correlation_length};
    use crate::io::field::MemoryFieldSource;
    use crate::io::params::Precision;
    use crate::settings::AnalysisSettings;
    use crate::spectral::{kz_mean, kz_rms};

    pub(crate) fn local_params(nx: usize, nz: usize, nexc: usize) -> SimParameters {
        SimParameters {
            kymin: 0.1,
            nexc,
            nx,
            nz,
            species: vec!["ions".into(), "electrons".into()],
            precision: Precision::Double,
            lx: 50.0,
            temp1: 1.0,
            dens1: 1.0,
            global: None,
        }
    }

    pub(crate) fn flat_geometry(nz: usize) -> Arc<Geometry> {
        Arc::new(Geometry::new(vec![1.0; nz], vec![1.0; nz]).expect("geometry"))
    }

    /// Snapshots `(z, ky=1, x)` produced by `f(t, z, x)`.
    pub(crate) fn source_from(
        times: &[f64],
        nz: usize,
        nx: usize,
        quantities: &[Quantity],
        f: impl Fn(Quantity, usize, usize, usize) -> Complex64,
    ) -> MemoryFieldSource {
        let mut source = MemoryFieldSource::new(times.to_vec());
        for &q in quantities {
            let snaps = (0..times.len())
                .map(|it| Array3::from_shape_fn((nz, 1, nx), |(iz, _, ix)| f(q, it, iz, ix)))
                .collect();
            source.insert(q, snaps).expect("insert");
        }
        source
    }

    fn request(quantities: Vec<Quantity>) -> ModeRequest {
        ModeRequest {
            iky: 1,
            kx_cent: 0,
            window: TimeWindow::new(0.0, 10.0).expect("window"),
            quantities,
        }
    }

    #[test]
    fn build_mode_reads_window_and_stitches_modes() {
        let times = [0.0, 1.0, 2.0, 20.0];
        let (nz, nx) = (4, 8);
        let mut source = source_from(&times, nz, nx, &[Quantity::Phi], |_, it, iz, ix| {
            Complex64::new((100 * it + 10 * ix + iz) as f64, 0.0)
        });
        let params = local_params(nx, nz, 2);
        let mode = build_mode(&params, &mut source, flat_geometry(nz), &request(vec![Quantity::Phi]))
            .expect("mode");
        assert_eq!(mode.times, vec![0.0, 1.0, 2.0]);
        assert_eq!(mode.grid.kx_modes, vec![-2, 0, 2]);

        let ext = mode.extended(mode.field(Quantity::Phi).expect("phi")).expect("extended");
        assert_eq!(ext.dim(), (3, 12));
        // First connected mode is kx = -2 (column 6) with phase (-1)^-1.
        assert!((ext[[1, 0]] - Complex64::new(-160.0, 0.0)).norm() < 1e-12);
        assert!((ext[[1, 5]] - Complex64::new(101.0, 0.0)).norm() < 1e-12);
        assert!((ext[[1, 11]] - Complex64::new(-123.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn missing_quantity_is_caught_at_construction() {
        let mut source = source_from(&[0.0], 4, 8, &[Quantity::Phi], |_, _, _, _| Complex64::new(1.0, 0.0));
        let params = local_params(8, 4, 2);
        let err = build_mode(&params, &mut source, flat_geometry(4), &request(vec![Quantity::HeatFlux]))
            .expect_err("moments missing");
        assert_eq!(
            err.downcast_ref::<AnalysisError>(),
            Some(&AnalysisError::MissingQuantity("dens"))
        );
    }

    #[test]
    fn unloaded_quantity_is_reported_on_access() {
        let mut source = source_from(&[0.0], 4, 8, &[Quantity::Phi], |_, _, _, _| Complex64::new(1.0, 0.0));
        let params = local_params(8, 4, 2);
        let mode = build_mode(&params, &mut source, flat_geometry(4), &request(vec![Quantity::Phi]))
            .expect("mode");
        assert!(mode.field(Quantity::Apar).is_err());
        assert_eq!(mode.fields.quantities(), vec![Quantity::Phi]);
    }

    #[test]
    fn ballooning_profile_is_normalised_at_centre() {
        let mut source = source_from(&[0.0], 4, 8, &[Quantity::Phi], |_, _, iz, ix| {
            Complex64::new(1.0 + iz as f64, ix as f64)
        });
        let params = local_params(8, 4, 2);
        let mode = build_mode(&params, &mut source, flat_geometry(4), &request(vec![Quantity::Phi]))
            .expect("mode");
        let phi = mode.field(Quantity::Phi).expect("phi");
        let (profile, zgrid) = mode
            .ballooning_profile(phi.slice(s![0, .., ..]), true)
            .expect("profile");
        assert_eq!(profile.len(), zgrid.len());
        assert!((profile[mode.grid.zero_ind] - Complex64::new(1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn zero_centre_value_does_not_divide_by_zero() {
        let mut source = source_from(&[0.0], 4, 8, &[Quantity::Phi], |_, _, _, _| Complex64::new(0.0, 0.0));
        let params = local_params(8, 4, 2);
        let mode = build_mode(&params, &mut source, flat_geometry(4), &request(vec![Quantity::Phi]))
            .expect("mode");
        let phi = mode.field(Quantity::Phi).expect("phi");
        let (profile, _) = mode
            .ballooning_profile(phi.slice(s![0, .., ..]), false)
            .expect("profile");
        assert!(profile.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn sum_modes_adds_radial_sums() {
        let mut source = source_from(&[0.0, 1.0], 2, 4, &[Quantity::Phi], |_, _, _, _| Complex64::new(1.0, 0.0));
        let params = local_params(4, 2, 1);
        let mode = build_mode(&params, &mut source, flat_geometry(2), &request(vec![Quantity::Phi]))
            .expect("mode");
        let total = sum_modes(&[mode.clone(), mode], Quantity::Phi).expect("sum");
        assert_eq!(total.dim(), (2, 2));
        assert!((total[[1, 1]] - Complex64::new(8.0, 0.0)).norm() < 1e-12);
    }

    const NT: usize = 32;
    const DT: f64 = 0.25;

    fn shaped_geometry(nz: usize) -> Arc<Geometry> {
        let jacobian = (0..nz).map(|iz| 1.0 + 0.5 * iz as f64 / nz as f64).collect();
        let bfield = (0..nz).map(|iz| 1.0 + 0.1 * iz as f64).collect();
        Arc::new(Geometry::new(jacobian, bfield).expect("geometry"))
    }

    /// Frequency bin of each connected radial column.
    const COLUMN_BINS: [(usize, usize); 3] = [(6, 4), (0, 1), (2, 2)];

    fn bin_omega(bin: usize) -> f64 {
        2.0 * std::f64::consts::PI * bin as f64 / (NT as f64 * DT)
    }

    fn amplitude(iz: usize, ix: usize) -> f64 {
        1.0 + 0.25 * ((iz + ix) % 3) as f64
    }

    /// kx = -2, 0, 2 on an 8-point radial grid, each column oscillating at its
    /// own frequency over a non-uniform jacobian.
    fn connected_mode() -> Mode {
        let (nz, nx) = (8, 8);
        let times: Vec<f64> = (0..NT).map(|i| i as f64 * DT).collect();
        let mut source = source_from(&times, nz, nx, &[Quantity::Phi], |_, it, iz, ix| {
            match COLUMN_BINS.iter().find(|(col, _)| *col == ix) {
                Some(&(_, bin)) => Complex64::from_polar(amplitude(iz, ix), bin_omega(bin) * times[it]),
                None => Complex64::new(0.0, 0.0),
            }
        });
        let params = local_params(nx, nz, 2);
        build_mode(&params, &mut source, shaped_geometry(nz), &request(vec![Quantity::Phi])).expect("mode")
    }

    /// Columns 6, 0, 2 laid end to end with phases -1, 1, -1.
    fn stitched_by_hand(var: &Array3<Complex64>) -> Array2<Complex64> {
        let (nt, nz, _) = var.dim();
        let phases = [-1.0, 1.0, -1.0];
        Array2::from_shape_fn((nt, 3 * nz), |(it, i)| {
            let m = i / nz;
            var[[it, i % nz, COLUMN_BINS[m].0]] * phases[m]
        })
    }

    #[test]
    fn extended_field_matches_hand_stitching() {
        let mode = connected_mode();
        assert_eq!(mode.grid.kx_modes, vec![-2, 0, 2]);
        let phi = mode.field(Quantity::Phi).expect("phi");
        let ext = mode.extended(phi).expect("extended");
        for (a, b) in ext.iter().zip(stitched_by_hand(phi).iter()) {
            assert!((a - b).norm() < 1e-12);
        }
    }

    #[test]
    fn frequency_moments_weight_connected_lanes_by_jacobian() {
        let mode = connected_mode();
        let phi = mode.field(Quantity::Phi).expect("phi");
        let settings = AnalysisSettings::default();
        let jac = &mode.geometry.jacobian;
        let (mut num, mut num2, mut den) = (0.0, 0.0, 0.0);
        for &(col, bin) in &COLUMN_BINS {
            let omega = bin_omega(bin);
            for (iz, j) in jac.iter().enumerate() {
                let p = amplitude(iz, col).powi(2) * j;
                num += omega * p;
                num2 += omega * omega * p;
                den += p;
            }
        }
        let mean = mode.mean_frequency_tz(phi, &settings).expect("mean");
        assert!((mean - num / den).abs() < 1e-9, "{mean} vs {}", num / den);
        let rms = mode.rms_frequency_tz(phi, &settings).expect("rms");
        assert!((rms - (num2 / den).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn frequency_spectrum_averages_over_tiled_jacobian() {
        let mode = connected_mode();
        let phi = mode.field(Quantity::Phi).expect("phi");
        let (omegas, spec) = mode
            .frequency_spectrum(phi, &AnalysisSettings::default())
            .expect("spectrum");
        let target = bin_omega(1);
        let index = omegas
            .iter()
            .position(|w| (w - target).abs() < 1e-9)
            .expect("bin present");
        let jac = &mode.geometry.jacobian;
        let total: f64 = 3.0 * jac.iter().sum::<f64>();
        let power: f64 = jac
            .iter()
            .enumerate()
            .map(|(iz, j)| j * (NT as f64 * amplitude(iz, 0)).powi(2))
            .sum();
        assert!((spec[index] - power / total).abs() < 1e-9 * spec[index]);
    }

    #[test]
    fn kz_moments_follow_hand_stitched_field() {
        let mode = connected_mode();
        let phi = mode.field(Quantity::Phi).expect("phi");
        let settings = AnalysisSettings::default();
        let ext = stitched_by_hand(phi);
        let mean = kz_mean(&mode, ext.view(), None, &settings)
            .expect("mean")
            .combine_mean(None)
            .expect("combine");
        let rms = kz_rms(&mode, ext.view(), None, &settings)
            .expect("rms")
            .combine_rms(None)
            .expect("combine");
        assert!((mode.mean_kz_tz(phi, &settings).expect("mean tz") - mean).abs() < 1e-12);
        let rms_tz = mode.rms_kz_tz(phi, &settings).expect("rms tz");
        assert!((rms_tz - rms).abs() < 1e-12);
        assert!(rms_tz.is_finite() && rms_tz > 0.0);
    }

    #[test]
    fn z_and_time_averages_run_on_extended_grid() {
        let mode = connected_mode();
        let phi = mode.field(Quantity::Phi).expect("phi");
        let ext = stitched_by_hand(phi);
        let nz = mode.nz;
        let jac_ext: Vec<f64> = (0..3 * nz).map(|i| mode.geometry.jacobian[i % nz]).collect();
        let total: f64 = jac_ext.iter().sum();

        let zavg = mode.avg_z_field(phi).expect("z average");
        assert_eq!(zavg.len(), NT);
        for (it, value) in zavg.iter().enumerate() {
            let expected = (0..3 * nz).map(|i| ext[[it, i]] * jac_ext[i]).sum::<Complex64>() / total;
            assert!((value - expected).norm() < 1e-12);
        }

        let tavg = mode.avg_t_field(phi).expect("t average");
        assert_eq!(tavg.len(), 3 * nz);
        for (i, value) in tavg.iter().enumerate() {
            let expected = ext.column(i).sum() / NT as f64;
            assert!((value - expected).norm() < 1e-12);
        }
    }

    #[test]
    fn mean_tzx_averages_first_radial_column() {
        let mode = connected_mode();
        let nz = mode.nz;
        let var = Array3::from_shape_fn((2, nz, mode.nx), |(_, iz, ix)| {
            if ix == 0 {
                Complex64::new(iz as f64 + 1.0, 0.0)
            } else {
                Complex64::new(5.0, 5.0)
            }
        });
        let jac = &mode.geometry.jacobian;
        let zavg = jac.iter().enumerate().map(|(iz, j)| j * (iz as f64 + 1.0)).sum::<f64>()
            / jac.iter().sum::<f64>();
        let lx = 50.0;
        let value = mode.mean_tzx(&var, lx).expect("mean");
        assert!((value - Complex64::new(2.0 * std::f64::consts::PI / lx * zavg, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn mode_correlation_matches_hand_stitched_field() {
        let mode = connected_mode();
        let phi = mode.field(Quantity::Phi).expect("phi");
        let settings = AnalysisSettings::default();
        let reference = autocorrelate_tz(&stitched_by_hand(phi), &mode.times, &mode.grid.zgrid_ext, None, &settings)
            .expect("reference");
        let tz = mode.autocorrelate(phi, &settings).expect("correlation");
        assert_eq!(tz.corr.dim(), (NT, 3 * mode.nz));
        for (a, b) in tz.corr.iter().zip(reference.corr.iter()) {
            assert!((a - b).norm() < 1e-12);
        }

        let (time, length) = mode.correlation_scales(phi, &settings).expect("scales");
        let expected_time = correlation_length(&reference.time_lags, &reference.corr, Axis(0), None).expect("time");
        let expected_length = correlation_length(&reference.z_lags, &reference.corr, Axis(1), None).expect("length");
        assert!((time - expected_time).abs() < 1e-12);
        assert!((length - expected_length).abs() < 1e-12);
    }
}
