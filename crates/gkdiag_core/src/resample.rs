//! Linear resampling of non-uniformly sampled data onto a uniform grid.

use crate::error::AnalysisError;
use anyhow::{bail, Result};
use ndarray::{Array, ArrayBase, ArrayView1, Axis, Data, Dimension, Zip};
use num_traits::Zero;
use std::ops::{Add, Mul};

/// Values that can be linearly interpolated with real weights.
pub trait Lerp: Copy + Zero + Add<Output = Self> + Mul<f64, Output = Self> {}

impl<T: Copy + Zero + Add<Output = T> + Mul<f64, Output = T>> Lerp for T {}

/// Spacing-equality test on `floor(diff / tol)`.
pub fn is_uniform(coords: &[f64], tol: f64) -> bool {
    if coords.len() < 3 {
        return true;
    }
    let first = ((coords[1] - coords[0]) / tol).floor();
    coords
        .windows(2)
        .all(|w| ((w[1] - w[0]) / tol).floor() == first)
}

/// `n` evenly spaced points from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

pub fn check_strictly_increasing(coords: &[f64]) -> Result<()> {
    for (i, w) in coords.windows(2).enumerate() {
        if !(w[1] > w[0]) {
            bail!(AnalysisError::NotStrictlyIncreasing { index: i + 1 });
        }
    }
    Ok(())
}

/// Bracketing index and weight of `x` in `coords`, clamped to the ends.
fn bracket(coords: &[f64], x: f64) -> (usize, f64) {
    let n = coords.len();
    let upper = coords.partition_point(|&c| c <= x);
    let lo = upper.saturating_sub(1).min(n - 2);
    let w = ((x - coords[lo]) / (coords[lo + 1] - coords[lo])).clamp(0.0, 1.0);
    (lo, w)
}

/// Resamples `data` along `axis` onto `oversample * len` uniform points
/// spanning the first to the last coordinate.
pub fn linear_resample<S, D, T>(
    coords: &[f64],
    data: &ArrayBase<S, D>,
    axis: Axis,
    oversample: usize,
) -> Result<(Vec<f64>, Array<T, D>)>
where
    S: Data<Elem = T>,
    D: Dimension,
    T: Lerp,
{
    let n = coords.len();
    if axis.index() >= data.ndim() {
        bail!("Axis {} out of range for {}-d data.", axis.index(), data.ndim());
    }
    if data.len_of(axis) != n {
        bail!(AnalysisError::ShapeMismatch {
            context: "resample axis",
            expected: n,
            actual: data.len_of(axis),
        });
    }
    if n < 2 {
        bail!("Resampling requires at least two samples.");
    }
    if oversample == 0 {
        bail!("oversample must be at least 1.");
    }
    check_strictly_increasing(coords)?;

    let samples = oversample * n;
    let uniform = linspace(coords[0], coords[n - 1], samples);
    let brackets: Vec<(usize, f64)> = uniform.iter().map(|&x| bracket(coords, x)).collect();

    let mut shape = data.raw_dim();
    shape[axis.index()] = samples;
    let mut out = Array::<T, D>::zeros(shape);

    Zip::from(out.lanes_mut(axis))
        .and(data.lanes(axis))
        .for_each(|mut dst, src| {
            for (k, &(lo, w)) in brackets.iter().enumerate() {
                dst[k] = src[lo] * (1.0 - w) + src[lo + 1] * w;
            }
        });

    tracing::debug!(from = n, to = samples, "resampled onto uniform grid");
    Ok((uniform, out))
}

/// One-dimensional convenience wrapper over [`linear_resample`].
pub fn resample_series<T: Lerp>(coords: &[f64], values: &[T], oversample: usize) -> Result<(Vec<f64>, Vec<T>)> {
    let view = ArrayView1::from(values);
    let (uniform, out) = linear_resample(coords, &view, Axis(0), oversample)?;
    Ok((uniform, out.to_vec()))
}

/// Piecewise-linear interpolation at `x_new`, holding the end values outside
/// the sampled range.
pub fn interp(x_new: &[f64], x: &[f64], y: &[f64]) -> Result<Vec<f64>> {
    if x.len() != y.len() {
        bail!(AnalysisError::ShapeMismatch {
            context: "interp",
            expected: x.len(),
            actual: y.len(),
        });
    }
    match x.len() {
        0 => bail!("Interpolation requires at least one sample."),
        1 => return Ok(vec![y[0]; x_new.len()]),
        _ => {}
    }
    check_strictly_increasing(x)?;
    Ok(x_new
        .iter()
        .map(|&xi| {
            if xi <= x[0] {
                y[0]
            } else if xi >= x[x.len() - 1] {
                y[y.len() - 1]
            } else {
                let (lo, w) = bracket(x, xi);
                y[lo] * (1.0 - w) + y[lo + 1] * w
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use num_complex::Complex64;

    #[test]
    fn uniformity_uses_quantised_spacing() {
        assert!(is_uniform(&[0.0, 0.5, 1.0, 1.5], 1e-6));
        assert!(!is_uniform(&[0.0, 0.5, 1.2, 1.5], 1e-6));
        assert!(is_uniform(&[1.0, 1.25, 1.5, 1.75], 1e-6));
    }

    #[test]
    fn resampling_doubles_length_and_is_exact_for_linear_data() {
        let coords = [0.0, 1.0, 3.0, 4.0];
        let data = array![[0.0, 10.0], [1.0, 11.0], [3.0, 13.0], [4.0, 14.0]];
        let (uniform, out) = linear_resample(&coords, &data, Axis(0), 2).expect("resample");
        assert_eq!(uniform.len(), 8);
        assert_eq!(out.dim(), (8, 2));
        for (i, &x) in uniform.iter().enumerate() {
            assert!((out[[i, 0]] - x).abs() < 1e-12);
            assert!((out[[i, 1]] - (x + 10.0)).abs() < 1e-12);
        }
    }

    #[test]
    fn resampling_along_last_axis_handles_complex_values() {
        let coords = [0.0, 2.0, 3.0];
        let mut data = Array2::<Complex64>::zeros((1, 3));
        for (j, &x) in coords.iter().enumerate() {
            data[[0, j]] = Complex64::new(x, -2.0 * x);
        }
        let (uniform, out) = linear_resample(&coords, &data, Axis(1), 3).expect("resample");
        assert_eq!(out.dim(), (1, 9));
        for (k, &x) in uniform.iter().enumerate() {
            assert!((out[[0, k]] - Complex64::new(x, -2.0 * x)).norm() < 1e-12);
        }
    }

    #[test]
    fn decreasing_coordinates_fail() {
        let data = array![1.0, 2.0, 3.0];
        let err = linear_resample(&[0.0, 2.0, 1.0], &data, Axis(0), 2).expect_err("not increasing");
        assert_eq!(
            err.downcast_ref::<AnalysisError>(),
            Some(&AnalysisError::NotStrictlyIncreasing { index: 2 })
        );
    }

    #[test]
    fn interp_clamps_outside_range() {
        let out = interp(&[-1.0, 0.5, 1.5, 9.0], &[0.0, 1.0, 2.0], &[0.0, 2.0, 6.0]).expect("interp");
        assert_eq!(out, vec![0.0, 1.0, 4.0, 6.0]);
    }
}
