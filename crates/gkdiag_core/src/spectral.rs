//! Frequency and parallel-wavenumber spectra of mode data.
//!
//! Every moment routine returns [`Moments`]: the per-lane moment together
//! with the spectral power it was normalised by. Keeping the power lets a
//! caller combine moments taken at different averaging stages (time first or
//! space first) without recomputing the transform.

use crate::error::AnalysisError;
use crate::geometry::Geometry;
use crate::mode::Mode;
use crate::resample::{is_uniform, linear_resample, Lerp};
use crate::settings::AnalysisSettings;
use anyhow::{bail, Result};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use num_complex::Complex64;
use rustfft::{FftDirection, FftPlanner};
use std::f64::consts::PI;

/// Per-lane moments and the (optionally weighted) power normalising them.
#[derive(Debug, Clone, PartialEq)]
pub struct Moments {
    pub values: Vec<f64>,
    pub power: Vec<f64>,
}

impl Moments {
    fn weighted_power(&self, weights: Option<&[f64]>) -> Result<Vec<f64>> {
        match weights {
            None => Ok(self.power.clone()),
            Some(w) => {
                if w.len() != self.power.len() {
                    bail!(AnalysisError::ShapeMismatch {
                        context: "moment weights",
                        expected: self.power.len(),
                        actual: w.len(),
                    });
                }
                Ok(self.power.iter().zip(w).map(|(p, w)| p * w).collect())
            }
        }
    }

    /// Power-weighted mean of the moments.
    pub fn combine_mean(&self, weights: Option<&[f64]>) -> Result<f64> {
        let w = self.weighted_power(weights)?;
        let num: f64 = self.values.iter().zip(&w).map(|(v, w)| v * w).sum();
        Ok(num / nonzero(w.iter().sum()))
    }

    /// Square root of the power-weighted mean of the squared moments.
    pub fn combine_rms(&self, weights: Option<&[f64]>) -> Result<f64> {
        let w = self.weighted_power(weights)?;
        let num: f64 = self.values.iter().zip(&w).map(|(v, w)| v * v * w).sum();
        Ok((num / nonzero(w.iter().sum())).sqrt())
    }
}

pub(crate) fn nonzero(value: f64) -> f64 {
    if value == 0.0 {
        1.0
    } else {
        value
    }
}

/// Forward FFT of every lane along `axis` (unnormalised, numpy convention).
pub fn fft_along(data: &Array2<Complex64>, axis: Axis) -> Array2<Complex64> {
    transform_along(data, axis, FftDirection::Forward)
}

/// Unnormalised transform of every lane along `axis` in `direction`.
pub(crate) fn transform_along(
    data: &Array2<Complex64>,
    axis: Axis,
    direction: FftDirection,
) -> Array2<Complex64> {
    let n = data.len_of(axis);
    let mut out = data.to_owned();
    if n == 0 {
        return out;
    }
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft(n, direction);
    let mut buffer = vec![Complex64::new(0.0, 0.0); n];
    for mut lane in out.lanes_mut(axis) {
        for (b, v) in buffer.iter_mut().zip(lane.iter()) {
            *b = *v;
        }
        fft.process(&mut buffer);
        for (v, b) in lane.iter_mut().zip(&buffer) {
            *v = *b;
        }
    }
    out
}

/// Sample frequencies of an `n`-point transform with spacing `d`.
pub fn fftfreq(n: usize, d: f64) -> Vec<f64> {
    let scale = 1.0 / (n as f64 * d);
    let positive = (n + 1) / 2;
    (0..n)
        .map(|i| {
            if i < positive {
                i as f64 * scale
            } else {
                (i as f64 - n as f64) * scale
            }
        })
        .collect()
}

/// Moves the zero-frequency entry to the centre.
pub fn fftshift<T: Clone>(values: &[T]) -> Vec<T> {
    let n = values.len();
    (0..n).map(|j| values[(j + n - n / 2) % n].clone()).collect()
}

fn fftshift_axis(data: &Array2<Complex64>, axis: Axis) -> Array2<Complex64> {
    let n = data.len_of(axis);
    let mut out = data.clone();
    for j in 0..n {
        let src = (j + n - n / 2) % n;
        out.index_axis_mut(axis, j).assign(&data.index_axis(axis, src));
    }
    out
}

/// Transform along the time axis and the time axis it was taken on.
#[derive(Debug, Clone)]
pub struct FrequencyTransform {
    pub spectrum: Array2<Complex64>,
    pub times: Vec<f64>,
    /// Angular frequencies in FFT order.
    pub omegas: Vec<f64>,
}

/// Direct FFT when `times` is uniform, otherwise linear resampling to
/// `settings.oversample` times as many points first.
pub fn frequency_transform(
    times: &[f64],
    data: &Array2<Complex64>,
    axis: Axis,
    settings: &AnalysisSettings,
) -> Result<FrequencyTransform> {
    settings.validate()?;
    if data.len_of(axis) != times.len() {
        bail!(AnalysisError::ShapeMismatch {
            context: "time axis",
            expected: times.len(),
            actual: data.len_of(axis),
        });
    }
    if times.len() < 2 {
        bail!("Frequency analysis requires at least two samples.");
    }
    let (times_used, resampled) = if is_uniform(times, settings.uniform_tolerance) {
        (times.to_vec(), None)
    } else {
        let (uniform, lin) = linear_resample(times, data, axis, settings.oversample)?;
        (uniform, Some(lin))
    };
    let spectrum = fft_along(resampled.as_ref().unwrap_or(data), axis);
    let dt = times_used[1] - times_used[0];
    let omegas = fftfreq(times_used.len(), dt)
        .into_iter()
        .map(|f| 2.0 * PI * f)
        .collect();
    Ok(FrequencyTransform {
        spectrum,
        times: times_used,
        omegas,
    })
}

/// Zero-centred transform and frequencies.
pub fn centered_transform(
    times: &[f64],
    data: &Array2<Complex64>,
    axis: Axis,
    settings: &AnalysisSettings,
) -> Result<FrequencyTransform> {
    let raw = frequency_transform(times, data, axis, settings)?;
    Ok(FrequencyTransform {
        spectrum: fftshift_axis(&raw.spectrum, axis),
        times: raw.times,
        omegas: fftshift(&raw.omegas),
    })
}

fn lane_weights(weights: Option<&[f64]>, nlanes: usize) -> Result<Vec<f64>> {
    match weights {
        None => Ok(vec![1.0; nlanes]),
        Some(w) if w.len() == nlanes => Ok(w.to_vec()),
        Some(w) => bail!(AnalysisError::ShapeMismatch {
            context: "lane weights",
            expected: nlanes,
            actual: w.len(),
        }),
    }
}

/// Mean angular frequency `sum(w |f|^2) / sum(|f|^2)` of every lane along `axis`.
///
/// `weights` (one per lane) scale the returned power.
pub fn mean_frequency(
    times: &[f64],
    data: &Array2<Complex64>,
    axis: Axis,
    weights: Option<&[f64]>,
    settings: &AnalysisSettings,
) -> Result<Moments> {
    let transform = frequency_transform(times, data, axis, settings)?;
    frequency_moments(&transform, axis, weights, false)
}

/// RMS angular frequency `sqrt(sum |w f|^2 / sum |f|^2)` of every lane.
pub fn rms_frequency(
    times: &[f64],
    data: &Array2<Complex64>,
    axis: Axis,
    weights: Option<&[f64]>,
    settings: &AnalysisSettings,
) -> Result<Moments> {
    let transform = centered_transform(times, data, axis, settings)?;
    frequency_moments(&transform, axis, weights, true)
}

fn frequency_moments(
    transform: &FrequencyTransform,
    axis: Axis,
    weights: Option<&[f64]>,
    rms: bool,
) -> Result<Moments> {
    let lanes = transform.spectrum.lanes(axis);
    let nlanes = transform.spectrum.len() / transform.omegas.len().max(1);
    let w = lane_weights(weights, nlanes)?;
    let mut values = Vec::with_capacity(nlanes);
    let mut power = Vec::with_capacity(nlanes);
    for (lane, weight) in lanes.into_iter().zip(w) {
        let mut num = 0.0;
        let mut den = 0.0;
        for (f, &omega) in lane.iter().zip(&transform.omegas) {
            let p = f.norm_sqr();
            num += if rms { omega * omega * p } else { omega * p };
            den += p;
        }
        let ratio = num / nonzero(den);
        values.push(if rms { ratio.sqrt() } else { ratio });
        power.push(den * weight);
    }
    Ok(Moments { values, power })
}

/// Shifted angular frequencies and `sum_c w_c |f(omega, c)|^2 / sum_c w_c`
/// for `(time, space)` data.
pub fn frequency_spectrum(
    times: &[f64],
    data: &Array2<Complex64>,
    weights: Option<&[f64]>,
    settings: &AnalysisSettings,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let transform = centered_transform(times, data, Axis(0), settings)?;
    let w = lane_weights(weights, data.ncols())?;
    let total = nonzero(w.iter().sum());
    let spec = transform
        .spectrum
        .rows()
        .into_iter()
        .map(|row| row.iter().zip(&w).map(|(f, w)| f.norm_sqr() * w).sum::<f64>() / total)
        .collect();
    Ok((transform.omegas, spec))
}

fn stencil<T: Lerp>(f: &[T], terms: &[(usize, f64)], scale: f64) -> T {
    terms
        .iter()
        .fold(T::zero(), |acc, &(i, c)| acc + f[i] * (c * scale))
}

fn uniform_spacing(f_len: usize, grid: &[f64]) -> Result<f64> {
    if f_len != grid.len() {
        bail!(AnalysisError::ShapeMismatch {
            context: "finite-difference grid",
            expected: grid.len(),
            actual: f_len,
        });
    }
    if grid.len() < 5 {
        bail!("Fourth-order differences need at least five points.");
    }
    let h = grid[1] - grid[0];
    if h <= 0.0 {
        bail!(AnalysisError::NotStrictlyIncreasing { index: 1 });
    }
    Ok(h)
}

/// First derivative, fourth order in the interior, second order at the two
/// outermost points on each side.
pub fn fd_d1_o4<T: Lerp>(f: &[T], grid: &[f64]) -> Result<Vec<T>> {
    let h = uniform_spacing(f.len(), grid)?;
    let n = f.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let d = match i {
            0 => stencil(f, &[(0, -3.0), (1, 4.0), (2, -1.0)], 0.5 / h),
            1 => stencil(f, &[(0, -1.0), (2, 1.0)], 0.5 / h),
            _ if i == n - 2 => stencil(f, &[(n - 3, -1.0), (n - 1, 1.0)], 0.5 / h),
            _ if i == n - 1 => stencil(f, &[(n - 3, 1.0), (n - 2, -4.0), (n - 1, 3.0)], 0.5 / h),
            _ => stencil(
                f,
                &[(i - 2, 1.0), (i - 1, -8.0), (i + 1, 8.0), (i + 2, -1.0)],
                1.0 / (12.0 * h),
            ),
        };
        out.push(d);
    }
    Ok(out)
}

/// Second derivative with the same stencil layout as [`fd_d1_o4`].
pub fn fd_d2_o4<T: Lerp>(f: &[T], grid: &[f64]) -> Result<Vec<T>> {
    let h = uniform_spacing(f.len(), grid)?;
    let n = f.len();
    let h2 = 1.0 / (h * h);
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let d = match i {
            0 => stencil(f, &[(0, 2.0), (1, -5.0), (2, 4.0), (3, -1.0)], h2),
            1 => stencil(f, &[(0, 1.0), (1, -2.0), (2, 1.0)], h2),
            _ if i == n - 2 => stencil(f, &[(n - 3, 1.0), (n - 2, -2.0), (n - 1, 1.0)], h2),
            _ if i == n - 1 => stencil(
                f,
                &[(n - 4, -1.0), (n - 3, 4.0), (n - 2, -5.0), (n - 1, 2.0)],
                h2,
            ),
            _ => stencil(
                f,
                &[(i - 2, -1.0), (i - 1, 16.0), (i, -30.0), (i + 1, 16.0), (i + 2, -1.0)],
                h2 / 12.0,
            ),
        };
        out.push(d);
    }
    Ok(out)
}

/// Trapezoidal integral of `y` over `x`.
pub fn trapz(y: &[f64], x: &[f64]) -> f64 {
    y.windows(2)
        .zip(x.windows(2))
        .map(|(y, x)| 0.5 * (y[0] + y[1]) * (x[1] - x[0]))
        .sum()
}

/// Mean parallel wavenumber of each row of extended `(n, z_ext)` data:
/// `int(d|f|^2/dz / (J B pi) J) / int(|f|^2 J)` over the trimmed grid.
pub fn kz_mean(
    mode: &Mode,
    var_ext: ArrayView2<'_, Complex64>,
    weights: Option<&[f64]>,
    settings: &AnalysisSettings,
) -> Result<Moments> {
    kz_moments(mode, var_ext, weights, settings, false)
}

/// RMS parallel wavenumber: `sqrt(int(|df/dz / (J B pi)|^2 J) / int(|f|^2 J))`.
pub fn kz_rms(
    mode: &Mode,
    var_ext: ArrayView2<'_, Complex64>,
    weights: Option<&[f64]>,
    settings: &AnalysisSettings,
) -> Result<Moments> {
    kz_moments(mode, var_ext, weights, settings, true)
}

fn kz_moments(
    mode: &Mode,
    var_ext: ArrayView2<'_, Complex64>,
    weights: Option<&[f64]>,
    settings: &AnalysisSettings,
    rms: bool,
) -> Result<Moments> {
    settings.validate()?;
    let zgrid = &mode.grid.zgrid_ext;
    let n_ext = zgrid.len();
    if var_ext.ncols() != n_ext {
        bail!(AnalysisError::ShapeMismatch {
            context: "extended grid",
            expected: n_ext,
            actual: var_ext.ncols(),
        });
    }
    let trim = settings.kz_trim;
    if n_ext < 2 * trim + 2 {
        bail!(
            "Extended grid of {} points is too short to trim {} points per side.",
            n_ext,
            trim
        );
    }
    let nmodes = mode.grid.nmodes();
    let jac = mode.geometry.tiled_jacobian(nmodes);
    let jac_b_pi = mode.geometry.tiled_jac_b_pi(nmodes);
    let w = lane_weights(weights, var_ext.nrows())?;
    let range = trim..n_ext - trim;
    let zg = &zgrid[range.clone()];

    let mut values = Vec::with_capacity(var_ext.nrows());
    let mut power = Vec::with_capacity(var_ext.nrows());
    for (row, weight) in var_ext.rows().into_iter().zip(w) {
        let f: Vec<Complex64> = row.to_vec();
        let (num_integrand, den_integrand): (Vec<f64>, Vec<f64>) = if rms {
            let df = fd_d1_o4(&f, zgrid)?;
            range
                .clone()
                .map(|i| {
                    let d = df[i] / jac_b_pi[i];
                    (d.norm_sqr() * jac[i], f[i].norm_sqr() * jac[i])
                })
                .unzip()
        } else {
            let g: Vec<f64> = f.iter().map(|v| v.norm_sqr()).collect();
            let dg = fd_d1_o4(&g, zgrid)?;
            range
                .clone()
                .map(|i| (dg[i] / jac_b_pi[i] * jac[i], g[i] * jac[i]))
                .unzip()
        };
        let num = trapz(&num_integrand, zg);
        let den = trapz(&den_integrand, zg);
        let ratio = num / nonzero(den);
        values.push(if rms { ratio.sqrt() } else { ratio });
        power.push(den * weight);
    }
    Ok(Moments { values, power })
}

impl Mode {
    /// Power-weighted mean kz over every time of `var`.
    pub fn mean_kz_tz(&self, var: &Array3<Complex64>, settings: &AnalysisSettings) -> Result<f64> {
        let ext = self.extended(var)?;
        kz_mean(self, ext.view(), None, settings)?.combine_mean(None)
    }

    pub fn rms_kz_tz(&self, var: &Array3<Complex64>, settings: &AnalysisSettings) -> Result<f64> {
        let ext = self.extended(var)?;
        kz_rms(self, ext.view(), None, settings)?.combine_rms(None)
    }

    /// Mean frequency averaged along the field line with Jacobian × power weights.
    pub fn mean_frequency_tz(&self, var: &Array3<Complex64>, settings: &AnalysisSettings) -> Result<f64> {
        let ext = self.extended(var)?;
        let jac = self.geometry.tiled_jacobian(self.grid.nmodes());
        mean_frequency(&self.times, &ext, Axis(0), Some(&jac), settings)?.combine_mean(None)
    }

    pub fn rms_frequency_tz(&self, var: &Array3<Complex64>, settings: &AnalysisSettings) -> Result<f64> {
        let ext = self.extended(var)?;
        let jac = self.geometry.tiled_jacobian(self.grid.nmodes());
        rms_frequency(&self.times, &ext, Axis(0), Some(&jac), settings)?.combine_rms(None)
    }

    /// [`frequency_spectrum`] of the extended field, Jacobian-weighted along
    /// the field line.
    pub fn frequency_spectrum(
        &self,
        var: &Array3<Complex64>,
        settings: &AnalysisSettings,
    ) -> Result<(Vec<f64>, Vec<f64>)> {
        let ext = self.extended(var)?;
        let jac = self.geometry.tiled_jacobian(self.grid.nmodes());
        frequency_spectrum(&self.times, &ext, Some(&jac), settings)
    }
}

/// Flux-surface average of `k_perp^2` for one `(z, x)` snapshot,
/// differentiating along x.
pub fn kperp2_average(
    field: ArrayView2<'_, Complex64>,
    xgrid: &[f64],
    ky: f64,
    geometry: &Geometry,
) -> Result<f64> {
    let Some(metric) = &geometry.metric else {
        bail!("Geometry has no metric coefficients.");
    };
    let (nz, nx) = field.dim();
    if nz != geometry.nz() {
        bail!(AnalysisError::ShapeMismatch {
            context: "kperp poloidal points",
            expected: geometry.nz(),
            actual: nz,
        });
    }
    let mut acc = Complex64::new(0.0, 0.0);
    for (iz, row) in field.rows().into_iter().enumerate() {
        let f = row.to_vec();
        let d1 = fd_d1_o4(&f, xgrid)?;
        let d2 = fd_d2_o4(&f, xgrid)?;
        for ix in 0..nx {
            let kperp2 = Complex64::new(metric.gxx[iz] * d2[ix].norm(), 0.0)
                + d1[ix] * (2.0 * metric.gxy[iz] * ky)
                + Complex64::new(metric.gyy[iz] * ky * ky, 0.0);
            acc += kperp2 * geometry.jacobian[iz];
        }
    }
    let total: f64 = geometry.jacobian.iter().sum::<f64>() * nx as f64;
    Ok((acc / nonzero(total)).norm())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::tests::{flat_geometry, local_params, source_from};
    use crate::mode::{build_mode, ModeRequest};
    use crate::quantity::Quantity;
    use crate::settings::TimeWindow;

    fn exp_series(times: &[f64], omega: f64) -> Array2<Complex64> {
        Array2::from_shape_fn((times.len(), 1), |(i, _)| Complex64::from_polar(1.0, omega * times[i]))
    }

    #[test]
    fn fftfreq_matches_numpy_layout() {
        assert_eq!(fftfreq(4, 1.0), vec![0.0, 0.25, -0.5, -0.25]);
        assert_eq!(fftfreq(5, 0.5), vec![0.0, 0.4, 0.8, -0.8, -0.4]);
        assert_eq!(fftshift(&[0, 1, 2, -2, -1]), vec![-2, -1, 0, 1, 2]);
        assert_eq!(fftshift(&[0, 1, -2, -1]), vec![-2, -1, 0, 1]);
    }

    #[test]
    fn mean_frequency_recovers_pure_exponential() {
        let n = 64;
        let dt = 0.125;
        let times: Vec<f64> = (0..n).map(|i| i as f64 * dt).collect();
        let omega = 2.0 * PI * 5.0 / (n as f64 * dt);
        let data = exp_series(&times, omega);
        let moments = mean_frequency(&times, &data, Axis(0), None, &AnalysisSettings::default())
            .expect("moments");
        assert!((moments.values[0] - omega).abs() < 1e-9);
        assert!((moments.power[0] - (n * n) as f64).abs() < 1e-6);
    }

    #[test]
    fn rms_frequency_of_cosine_is_its_frequency() {
        let n = 128;
        let dt = 0.0625;
        let times: Vec<f64> = (0..n).map(|i| i as f64 * dt).collect();
        let omega = 2.0 * PI * 7.0 / (n as f64 * dt);
        let data = Array2::from_shape_fn((n, 2), |(i, j)| {
            Complex64::new((omega * times[i]).cos() * (j + 1) as f64, 0.0)
        });
        let moments = rms_frequency(&times, &data, Axis(0), None, &AnalysisSettings::default())
            .expect("moments");
        for value in &moments.values {
            assert!((value - omega).abs() < 1e-9);
        }
        assert!((moments.combine_rms(None).expect("combine") - omega).abs() < 1e-9);
    }

    #[test]
    fn nonuniform_sampling_matches_resampled_reference() {
        let n = 40;
        let times: Vec<f64> = (0..n)
            .map(|i| {
                let t = i as f64 * 0.25;
                if i % 3 == 1 { t + 0.05 } else { t }
            })
            .collect();
        let omega = 1.7;
        let data = exp_series(&times, omega);
        let settings = AnalysisSettings::default();
        let transform = frequency_transform(&times, &data, Axis(0), &settings).expect("transform");
        assert_eq!(transform.times.len(), 2 * n);

        let (uniform, reference) = linear_resample(&times, &data, Axis(0), 2).expect("resample");
        let direct = fft_along(&reference, Axis(0));
        for (a, b) in transform.spectrum.iter().zip(direct.iter()) {
            assert!((a - b).norm() < 1e-9);
        }
        let peak = transform
            .spectrum
            .column(0)
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
            .map(|(i, _)| transform.omegas[i])
            .expect("non-empty");
        let span = uniform[uniform.len() - 1] - uniform[0];
        let bin = 2.0 * PI / span;
        assert!((peak - omega).abs() <= bin);
    }

    #[test]
    fn axis_one_moments_run_per_row() {
        let n = 32;
        let times: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let omega = 2.0 * PI * 3.0 / n as f64;
        let data = exp_series(&times, omega).reversed_axes();
        let moments = mean_frequency(&times, &data, Axis(1), None, &AnalysisSettings::default())
            .expect("moments");
        assert_eq!(moments.values.len(), 1);
        assert!((moments.values[0] - omega).abs() < 1e-9);
    }

    #[test]
    fn derivatives_are_exact_for_low_order_polynomials() {
        let grid: Vec<f64> = (0..9).map(|i| 0.5 * i as f64).collect();
        let f: Vec<f64> = grid.iter().map(|x| x * x).collect();
        let d1 = fd_d1_o4(&f, &grid).expect("d1");
        let d2 = fd_d2_o4(&f, &grid).expect("d2");
        for (i, x) in grid.iter().enumerate() {
            assert!((d1[i] - 2.0 * x).abs() < 1e-10, "d1 at {i}");
            assert!((d2[i] - 2.0).abs() < 1e-10, "d2 at {i}");
        }
    }

    #[test]
    fn trapz_integrates_linear_function() {
        assert!((trapz(&[0.0, 1.0, 2.0], &[0.0, 1.0, 2.0]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn kz_moments_follow_parallel_structure() {
        let (nz, nx) = (32, 4);
        let params = local_params(nx, nz, 4);
        let times = [0.0, 1.0];
        // Single connected mode (step 4 reaches nx/2): phi = exp(i k z pi).
        let k = 2.0;
        let mut source = source_from(&times, nz, nx, &[Quantity::Phi], |_, _, iz, ix| {
            if ix == 0 {
                let z = -1.0 + 2.0 * iz as f64 / nz as f64;
                Complex64::from_polar(1.0, k * PI * z)
            } else {
                Complex64::new(0.0, 0.0)
            }
        });
        let request = ModeRequest {
            iky: 1,
            kx_cent: 0,
            window: TimeWindow::new(0.0, 1.0).expect("window"),
            quantities: vec![Quantity::Phi],
        };
        let mode = build_mode(&params, &mut source, flat_geometry(nz), &request).expect("mode");
        assert_eq!(mode.grid.nmodes(), 1);
        let settings = AnalysisSettings::default();
        let ext = mode.extended(mode.field(Quantity::Phi).expect("phi")).expect("ext");

        let rms = kz_rms(&mode, ext.view(), None, &settings).expect("rms");
        // d/dz of exp(i k pi z) divided by pi gives magnitude k.
        for v in &rms.values {
            assert!((v - k).abs() < 2e-2, "rms kz = {v}");
        }
        let mean = kz_mean(&mode, ext.view(), None, &settings).expect("mean");
        for v in &mean.values {
            assert!(v.abs() < 1e-9, "|phi|^2 is flat, got {v}");
        }
        let combined = mode.rms_kz_tz(mode.field(Quantity::Phi).expect("phi"), &settings).expect("tz");
        assert!((combined - k).abs() < 2e-2);
    }

    #[test]
    fn moments_combine_with_power_weights() {
        let moments = Moments {
            values: vec![1.0, 3.0],
            power: vec![1.0, 3.0],
        };
        assert!((moments.combine_mean(None).expect("mean") - 2.5).abs() < 1e-12);
        assert!((moments.combine_mean(Some(&[3.0, 1.0])).expect("mean") - 2.0).abs() < 1e-12);
        assert!((moments.combine_rms(None).expect("rms") - 7.0_f64.sqrt()).abs() < 1e-12);
        assert!(moments.combine_mean(Some(&[1.0])).is_err());
    }

    #[test]
    fn frequency_spectrum_peaks_at_signal_frequency() {
        let n = 64;
        let times: Vec<f64> = (0..n).map(|i| i as f64 * 0.25).collect();
        let omega = -2.0 * PI * 4.0 / (n as f64 * 0.25);
        let data = exp_series(&times, omega);
        let (omegas, spec) = frequency_spectrum(&times, &data, None, &AnalysisSettings::default())
            .expect("spectrum");
        let peak = spec
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| omegas[i])
            .expect("peak");
        assert!((peak - omega).abs() < 1e-9);
        assert!(omegas.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn kperp_reduces_to_ky_for_radially_flat_field() {
        let nz = 4;
        let nx = 8;
        let geometry = Geometry::new(vec![1.0; nz], vec![1.0; nz])
            .expect("geometry")
            .with_metric(crate::geometry::Metric {
                gxx: vec![1.0; nz],
                gxy: vec![0.0; nz],
                gyy: vec![2.0; nz],
            })
            .expect("metric");
        let field = Array2::from_elem((nz, nx), Complex64::new(1.0, 0.0));
        let xgrid: Vec<f64> = (0..nx).map(|i| i as f64).collect();
        let kperp2 = kperp2_average(field.view(), &xgrid, 0.5, &geometry).expect("kperp");
        assert!((kperp2 - 0.5).abs() < 1e-12);
    }
}
