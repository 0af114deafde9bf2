//! Normalised autocorrelation and the correlation lengths and times derived
//! from it.
//!
//! Both domains are brought onto uniform grids first (see [`crate::resample`]);
//! lag coordinates are the uniform coordinates shifted so their midpoint sits
//! at zero lag.

use crate::error::AnalysisError;
use crate::mode::Mode;
use crate::resample::{is_uniform, linear_resample, resample_series};
use crate::settings::AnalysisSettings;
use crate::spectral::{fft_along, nonzero, transform_along};
use anyhow::{bail, Result};
use ndarray::{s, Array2, Array3, Axis};
use num_complex::Complex64;
use rustfft::FftDirection;

/// Two-dimensional autocorrelation in `(time lag, z lag)`.
#[derive(Debug, Clone)]
pub struct TzCorrelation {
    pub time_lags: Vec<f64>,
    pub z_lags: Vec<f64>,
    pub corr: Array2<Complex64>,
}

/// Non-negative-lag autocorrelation of every row, one length per row.
#[derive(Debug, Clone)]
pub struct RowCorrelation {
    pub lags: Vec<f64>,
    pub corr: Array2<Complex64>,
    pub lengths: Vec<f64>,
}

type Resampled = (Vec<f64>, Array2<Complex64>, Option<Array2<f64>>);

fn uniform_along(
    coords: &[f64],
    data: Array2<Complex64>,
    weights: Option<Array2<f64>>,
    axis: Axis,
    settings: &AnalysisSettings,
) -> Result<Resampled> {
    if is_uniform(coords, settings.uniform_tolerance) {
        return Ok((coords.to_vec(), data, weights));
    }
    let (uniform, data) = linear_resample(coords, &data, axis, settings.oversample)?;
    let weights = match weights {
        Some(w) => Some(linear_resample(coords, &w, axis, settings.oversample)?.1),
        None => None,
    };
    Ok((uniform, data, weights))
}

fn recentre(coords: &[f64]) -> Vec<f64> {
    let mid = coords[coords.len() / 2];
    coords.iter().map(|c| c - mid).collect()
}

/// Population standard deviation of complex samples.
fn std_dev(data: &Array2<Complex64>) -> f64 {
    let n = data.len() as f64;
    let mean = data.sum() / n;
    (data.iter().map(|v| (*v - mean).norm_sqr()).sum::<f64>() / n).sqrt()
}

/// Centre part of the full 2-D cross-correlation `sum f[n + lag] conj(g[n])`,
/// same shape as `f`. Entry `(i, j)` holds lag `(i - n0/2, j - n1/2)`.
fn correlate_same(f: &Array2<Complex64>, g: &Array2<Complex64>) -> Array2<Complex64> {
    let (n0, n1) = f.dim();
    let (p0, p1) = (2 * n0 - 1, 2 * n1 - 1);
    let padded = |a: &Array2<Complex64>| {
        let mut out = Array2::<Complex64>::zeros((p0, p1));
        out.slice_mut(s![..n0, ..n1]).assign(a);
        fft_along(&fft_along(&out, Axis(0)), Axis(1))
    };
    let (fs, gs) = (padded(f), padded(g));
    let cross = &fs * &gs.mapv(|v| v.conj());
    let circular = transform_along(
        &transform_along(&cross, Axis(0), FftDirection::Inverse),
        Axis(1),
        FftDirection::Inverse,
    );
    let scale = (p0 * p1) as f64;

    Array2::from_shape_fn((n0, n1), |(i, j)| {
        let a = (i as isize - (n0 / 2) as isize).rem_euclid(p0 as isize) as usize;
        let b = (j as isize - (n1 / 2) as isize).rem_euclid(p1 as isize) as usize;
        circular[[a, b]] / scale
    })
}

/// Autocorrelation of `(time, z)` data. With weights the field is correlated
/// against `g = w f / sum(w)`; the result is divided by `size * std(f) * std(g)`.
pub fn autocorrelate_tz(
    field: &Array2<Complex64>,
    times: &[f64],
    zgrid: &[f64],
    weights: Option<&Array2<f64>>,
    settings: &AnalysisSettings,
) -> Result<TzCorrelation> {
    settings.validate()?;
    let (nt, nz) = field.dim();
    if nt != times.len() {
        bail!(AnalysisError::ShapeMismatch {
            context: "correlation time axis",
            expected: times.len(),
            actual: nt,
        });
    }
    if nz != zgrid.len() {
        bail!(AnalysisError::ShapeMismatch {
            context: "correlation z axis",
            expected: zgrid.len(),
            actual: nz,
        });
    }
    if let Some(w) = weights {
        if w.dim() != field.dim() {
            bail!(AnalysisError::ShapeMismatch {
                context: "correlation weights",
                expected: field.len(),
                actual: w.len(),
            });
        }
    }
    if nt < 2 || nz < 2 {
        bail!("Autocorrelation needs at least two points along each axis.");
    }

    let (times_u, data, w) = uniform_along(times, field.clone(), weights.cloned(), Axis(0), settings)?;
    let (z_u, data, w) = uniform_along(zgrid, data, w, Axis(1), settings)?;
    let weighted = match w {
        Some(w) => {
            let total = nonzero(w.sum());
            Some(&data * &w.mapv(|x| Complex64::new(x / total, 0.0)))
        }
        None => None,
    };
    let g = weighted.as_ref().unwrap_or(&data);

    let norm = nonzero(data.len() as f64 * std_dev(&data) * std_dev(g));
    let corr = correlate_same(&data, g).mapv(|v| v / norm);

    tracing::debug!(nt = times_u.len(), nz = z_u.len(), "computed tz autocorrelation");

    Ok(TzCorrelation {
        time_lags: recentre(&times_u),
        z_lags: recentre(&z_u),
        corr,
    })
}

/// Riemann sum of the real correlation over non-negative lags along `axis`,
/// taken through the zero lag of the other axis.
pub fn correlation_length(
    lags: &[f64],
    corr: &Array2<Complex64>,
    axis: Axis,
    weights: Option<&[f64]>,
) -> Result<f64> {
    if axis.index() > 1 {
        bail!("Axis {} out of range for 2-d correlation.", axis.index());
    }
    let n = corr.len_of(axis);
    if lags.len() != n {
        bail!(AnalysisError::ShapeMismatch {
            context: "correlation lags",
            expected: n,
            actual: lags.len(),
        });
    }
    if n < 2 {
        bail!("Correlation length needs at least two lags.");
    }
    let other = Axis(1 - axis.index());
    let line = corr.index_axis(other, corr.len_of(other) / 2);
    let n2 = n / 2;
    let positive: Vec<f64> = line.iter().skip(n2).map(|c| c.re).collect();
    let dlag = lags[1] - lags[0];

    let total = match weights {
        None => positive.iter().sum::<f64>(),
        Some(w) => {
            if w.len() != n {
                bail!(AnalysisError::ShapeMismatch {
                    context: "correlation length weights",
                    expected: n,
                    actual: w.len(),
                });
            }
            let w = &w[n2..];
            let avg = positive.iter().zip(w).map(|(c, w)| c * w).sum::<f64>() / nonzero(w.iter().sum());
            avg * n2 as f64
        }
    };
    Ok(total * dlag)
}

/// Direct autocorrelation of every lane along `axis` for lags `0..N/2`, each
/// lag divided by its overlap count and normalised to one at zero lag.
pub fn autocorrelate_rows(
    field: &Array2<Complex64>,
    domain: &[f64],
    axis: Axis,
    weights: Option<&[f64]>,
    settings: &AnalysisSettings,
) -> Result<RowCorrelation> {
    settings.validate()?;
    if field.len_of(axis) != domain.len() {
        bail!(AnalysisError::ShapeMismatch {
            context: "row correlation domain",
            expected: domain.len(),
            actual: field.len_of(axis),
        });
    }
    if let Some(w) = weights {
        if w.len() != domain.len() {
            bail!(AnalysisError::ShapeMismatch {
                context: "row correlation weights",
                expected: domain.len(),
                actual: w.len(),
            });
        }
    }
    if domain.len() < 2 {
        bail!("Autocorrelation needs at least two samples.");
    }

    let (coords, data, w) = if is_uniform(domain, settings.uniform_tolerance) {
        (domain.to_vec(), field.to_owned(), weights.map(<[f64]>::to_vec))
    } else {
        let (coords, data) = linear_resample(domain, field, axis, settings.oversample)?;
        let w = match weights {
            Some(w) => Some(resample_series(domain, w, settings.oversample)?.1),
            None => None,
        };
        (coords, data, w)
    };

    let n = coords.len();
    let n2 = n / 2;
    let dx = coords[1] - coords[0];
    let lanes = data.lanes(axis);
    let nlanes = data.len() / n;
    let mut corr = Array2::<Complex64>::zeros((nlanes, n2));
    let mut lengths = Vec::with_capacity(nlanes);

    for (row, lane) in lanes.into_iter().enumerate() {
        let signal = lane.to_vec();
        // Weights sit on the unshifted factor only.
        let weighted: Vec<Complex64> = match &w {
            Some(w) => signal.iter().zip(w).map(|(v, w)| *v * *w).collect(),
            None => signal.clone(),
        };
        let mut values: Vec<Complex64> = (0..n2)
            .map(|k| {
                let sum: Complex64 = (0..n - k).map(|i| signal[i + k] * weighted[i].conj()).sum();
                sum / (n - k) as f64
            })
            .collect();
        let norm = nonzero(values[0].re);
        for v in values.iter_mut() {
            *v /= norm;
        }
        lengths.push(dx * values.iter().map(|v| v.re).sum::<f64>());
        for (k, v) in values.into_iter().enumerate() {
            corr[[row, k]] = v;
        }
    }

    Ok(RowCorrelation {
        lags: (0..n2).map(|k| k as f64 * dx).collect(),
        corr,
        lengths,
    })
}

impl Mode {
    /// Autocorrelation of the extended field over `(time, z_ext)`.
    pub fn autocorrelate(&self, var: &Array3<Complex64>, settings: &AnalysisSettings) -> Result<TzCorrelation> {
        let ext = self.extended(var)?;
        autocorrelate_tz(&ext, &self.times, &self.grid.zgrid_ext, None, settings)
    }

    /// Correlation time and parallel correlation length of `var`.
    pub fn correlation_scales(&self, var: &Array3<Complex64>, settings: &AnalysisSettings) -> Result<(f64, f64)> {
        let tz = self.autocorrelate(var, settings)?;
        let time = correlation_length(&tz.time_lags, &tz.corr, Axis(0), None)?;
        let length = correlation_length(&tz.z_lags, &tz.corr, Axis(1), None)?;
        Ok((time, length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn brute_force_same(f: &Array2<Complex64>, g: &Array2<Complex64>) -> Array2<Complex64> {
        let (n0, n1) = f.dim();
        Array2::from_shape_fn((n0, n1), |(i, j)| {
            let da = i as isize - (n0 / 2) as isize;
            let db = j as isize - (n1 / 2) as isize;
            let mut acc = Complex64::new(0.0, 0.0);
            for a in 0..n0 as isize {
                for b in 0..n1 as isize {
                    let (x, y) = (a + da, b + db);
                    if x >= 0 && y >= 0 && x < n0 as isize && y < n1 as isize {
                        acc += f[[x as usize, y as usize]] * g[[a as usize, b as usize]].conj();
                    }
                }
            }
            acc
        })
    }

    #[test]
    fn fft_correlation_matches_direct_sum() {
        let f = Array2::from_shape_fn((5, 4), |(i, j)| {
            Complex64::new((i * 3 + j) as f64 * 0.3 - 1.0, (i as f64 - j as f64) * 0.2)
        });
        let fast = correlate_same(&f, &f);
        let slow = brute_force_same(&f, &f);
        for (a, b) in fast.iter().zip(slow.iter()) {
            assert!((a - b).norm() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn weighted_tz_correlation_uses_normalised_weights_on_one_side() {
        let times = [0.0, 0.5, 1.0, 1.5];
        let zgrid = [-1.0, 0.0, 1.0];
        let field = Array2::from_shape_fn((4, 3), |(i, j)| {
            Complex64::new((i as f64 * 0.9 + j as f64).cos(), 0.3 * i as f64 - 0.2 * j as f64)
        });
        let weights = Array2::from_shape_fn((4, 3), |(_, j)| [1.0, 3.0, 2.0][j]);
        let tz = autocorrelate_tz(&field, &times, &zgrid, Some(&weights), &AnalysisSettings::default())
            .expect("correlation");

        let total: f64 = weights.sum();
        let g = Array2::from_shape_fn((4, 3), |(i, j)| field[[i, j]] * (weights[[i, j]] / total));
        let norm = field.len() as f64 * std_dev(&field) * std_dev(&g);
        let reference = brute_force_same(&field, &g).mapv(|v| v / norm);
        for (a, b) in tz.corr.iter().zip(reference.iter()) {
            assert!((a - b).norm() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn zero_mean_wave_peaks_at_one() {
        let (nt, nz) = (16, 16);
        let times: Vec<f64> = (0..nt).map(|i| i as f64 * 0.5).collect();
        let zgrid: Vec<f64> = (0..nz).map(|i| -1.0 + 2.0 * i as f64 / nz as f64).collect();
        let field = Array2::from_shape_fn((nt, nz), |(i, j)| {
            Complex64::from_polar(1.0, 2.0 * PI * (i as f64 / nt as f64 + 2.0 * j as f64 / nz as f64))
        });
        let tz = autocorrelate_tz(&field, &times, &zgrid, None, &AnalysisSettings::default())
            .expect("correlation");
        assert_eq!(tz.corr.dim(), (nt, nz));
        assert!((tz.corr[[nt / 2, nz / 2]] - Complex64::new(1.0, 0.0)).norm() < 1e-9);
        assert_eq!(tz.time_lags[nt / 2], 0.0);
        assert_eq!(tz.z_lags[nz / 2], 0.0);
    }

    #[test]
    fn nonuniform_time_axis_is_resampled() {
        let times = [0.0, 1.0, 1.5, 3.0];
        let zgrid = [0.0, 0.5, 1.0];
        let field = Array2::from_shape_fn((4, 3), |(i, j)| Complex64::new((i + j) as f64, 0.0));
        let weights = Array2::from_elem((4, 3), 2.0);
        let tz = autocorrelate_tz(&field, &times, &zgrid, Some(&weights), &AnalysisSettings::default())
            .expect("correlation");
        assert_eq!(tz.corr.dim(), (8, 3));
        assert_eq!(tz.time_lags.len(), 8);
        assert!(tz.corr.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn zero_field_does_not_divide_by_zero() {
        let field = Array2::<Complex64>::zeros((4, 4));
        let axis = [0.0, 1.0, 2.0, 3.0];
        let tz = autocorrelate_tz(&field, &axis, &axis, None, &AnalysisSettings::default())
            .expect("correlation");
        assert!(tz.corr.iter().all(|c| c.is_finite()));
        let rows = autocorrelate_rows(&field, &axis, Axis(0), None, &AnalysisSettings::default())
            .expect("rows");
        assert!(rows.lengths.iter().all(|l| *l == 0.0));
    }

    #[test]
    fn constant_correlation_integrates_to_half_domain() {
        let corr = Array2::from_elem((6, 3), Complex64::new(1.0, 0.0));
        let lags: Vec<f64> = (0..6).map(|i| (i as f64 - 3.0) * 0.5).collect();
        let length = correlation_length(&lags, &corr, Axis(0), None).expect("length");
        assert!((length - 1.5).abs() < 1e-12);
        let weighted = correlation_length(&lags, &corr, Axis(0), Some(&[1.0; 6])).expect("weighted");
        assert!((weighted - 1.5).abs() < 1e-12);
        assert!(correlation_length(&lags[..5], &corr, Axis(0), None).is_err());
    }

    #[test]
    fn row_correlation_starts_at_one() {
        let domain: Vec<f64> = (0..10).map(|i| i as f64 * 0.25).collect();
        let field = Array2::from_shape_fn((3, 10), |(r, i)| {
            Complex64::new((i as f64 * 0.7 + r as f64).sin() + 0.1, r as f64 * 0.3)
        });
        let rows = autocorrelate_rows(&field, &domain, Axis(1), None, &AnalysisSettings::default())
            .expect("rows");
        assert_eq!(rows.corr.dim(), (3, 5));
        assert_eq!(rows.lags, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        for r in 0..3 {
            assert_eq!(rows.corr[[r, 0]], Complex64::new(1.0, 0.0));
        }
    }

    #[test]
    fn constant_rows_have_full_half_length() {
        let domain = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let field = Array2::from_elem((6, 2), Complex64::new(3.0, -1.0));
        let rows = autocorrelate_rows(&field, &domain, Axis(0), Some(&[2.0; 6]), &AnalysisSettings::default())
            .expect("rows");
        assert_eq!(rows.lengths.len(), 2);
        for length in rows.lengths {
            assert!((length - 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn weighted_rows_weight_the_unshifted_factor() {
        let domain = [0.0, 1.0, 2.0, 3.0];
        let field = Array2::from_shape_fn((1, 4), |(_, i)| Complex64::new(i as f64 + 1.0, 0.0));
        let weights = [1.0, 2.0, 1.0, 2.0];
        let rows = autocorrelate_rows(&field, &domain, Axis(1), Some(&weights), &AnalysisSettings::default())
            .expect("rows");
        // lag 0: (1 + 8 + 9 + 32) / 4; lag 1: (2 + 12 + 12) / 3.
        let lag1 = (26.0 / 3.0) / 12.5;
        assert_eq!(rows.corr.dim(), (1, 2));
        assert!((rows.corr[[0, 0]] - Complex64::new(1.0, 0.0)).norm() < 1e-12);
        assert!((rows.corr[[0, 1]] - Complex64::new(lag1, 0.0)).norm() < 1e-12);
        assert!((rows.lengths[0] - (1.0 + lag1)).abs() < 1e-12);
    }
}
