//! Connected radial modes and the extended ballooning coordinate of one ky.
//!
//! A ky mode couples radial wavenumbers separated by `nexc * iky`; stitching
//! those modes together end to end (each multiplied by its phase factor)
//! yields one continuous structure along the field line, parameterised by the
//! extended coordinate `z/pi` running over `[-N, N)` for `N` connected modes.

use crate::io::params::SimParameters;
use anyhow::{bail, Result};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedGrid {
    pub step: i64,
    pub kx_modes: Vec<i64>,
    pub zgrid: Vec<f64>,
    pub zgrid_ext: Vec<f64>,
    pub zero_ind: usize,
    pub phase: Vec<Complex64>,
}

/// Step between connected radial modes; the zonal mode connects to every kx.
pub fn radial_step(iky: usize, nexc: usize) -> i64 {
    if iky == 0 {
        1
    } else {
        (nexc * iky) as i64
    }
}

/// Offsets `0, ±step, ±2 step, ...` strictly inside `nx / 2`, shifted by `kx_cent`.
pub fn connected_modes(iky: usize, kx_cent: i64, nexc: usize, nx: usize) -> Result<Vec<i64>> {
    if nx == 0 {
        bail!("nx must be positive.");
    }
    let step = radial_step(iky, nexc);
    if step <= 0 {
        bail!("Connection step must be positive (nexc = {nexc}).");
    }
    let nx = nx as i64;
    let mut offsets = Vec::new();
    let mut offset = 0i64;
    // |offset| < nx / 2 on the real line.
    while 2 * offset < nx {
        offsets.push(offset);
        if offset != 0 {
            offsets.push(-offset);
        }
        offset += step;
    }
    offsets.sort_unstable();
    Ok(offsets.into_iter().map(|o| o + kx_cent).collect())
}

/// Phase connecting consecutive radial modes: `exp(-2 pi i n0 q0)` for global
/// runs, `-1` otherwise.
pub fn connection_phase(params: &SimParameters) -> Complex64 {
    match params.global {
        Some(global) => Complex64::from_polar(1.0, -2.0 * PI * global.n0_global * global.q0),
        None => Complex64::new(-1.0, 0.0),
    }
}

impl ConnectedGrid {
    /// Mode `kx = kx_cent + p * step` carries `connection_phase^p`: one factor
    /// per connection crossed from the centre, so every neighbouring pair
    /// differs by exactly one phase factor however many modes are stitched.
    pub fn build(params: &SimParameters, iky: usize, kx_cent: i64) -> Result<Self> {
        let kx_modes = connected_modes(iky, kx_cent, params.nexc, params.nx)?;
        let step = radial_step(iky, params.nexc);
        let nz = params.nz;
        let nmodes = kx_modes.len();

        let zgrid: Vec<f64> = (0..nz).map(|i| -1.0 + 2.0 * i as f64 / nz as f64).collect();
        let zgrid_ext: Vec<f64> = (0..nz * nmodes)
            .map(|i| -(nmodes as f64) + 2.0 * i as f64 / nz as f64)
            .collect();
        let zero_ind = zgrid_ext.len() / 2;

        let base = connection_phase(params);
        let norm = step.max(1);
        let phase = kx_modes
            .iter()
            .map(|&kx| {
                let connections = ((kx - kx_cent) / norm) as i32;
                base.powi(connections)
            })
            .collect();

        tracing::debug!(iky, kx_cent, step, nmodes, "built connected grid");

        Ok(Self {
            step,
            kx_modes,
            zgrid,
            zgrid_ext,
            zero_ind,
            phase,
        })
    }

    pub fn nmodes(&self) -> usize {
        self.kx_modes.len()
    }

    /// Array column of each connected mode (negative kx wrap around).
    pub fn kx_columns(&self, nx: usize) -> Vec<usize> {
        self.kx_modes
            .iter()
            .map(|&kx| kx.rem_euclid(nx as i64) as usize)
            .collect()
    }
}
