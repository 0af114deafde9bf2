//! The `gkdiag_core` crate post-processes gyrokinetic simulation output.
//!
//! Key components:
//! - **Grid**: connected radial modes and the extended ballooning coordinate of one ky.
//! - **Mode**: immutable bundle of a ky's fields over a time window, built by `build_mode`.
//! - **Spectral**: frequency and parallel-wavenumber moments, with resampling of
//!   non-uniform time traces.
//! - **Correlation**: autocorrelation and correlation lengths and times.
//! - **POD**: SVD-based decomposition with a reconstruction check and modal heat flux.
//! - **Flux**: time/run averages of nrg diagnostics and quasilinear coefficients.
pub mod correlation;
pub mod error;
pub mod flux;
pub mod geometry;
pub mod grid;
pub mod io;
pub mod mode;
pub mod pod;
pub mod quantity;
pub mod resample;
pub mod settings;
pub mod spectral;
