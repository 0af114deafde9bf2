use crate::error::AnalysisError;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Metric coefficients needed by the perpendicular-wavenumber average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub gxx: Vec<f64>,
    pub gxy: Vec<f64>,
    pub gyy: Vec<f64>,
}

/// Geometric factors on the base poloidal grid, shared by every mode of a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub jacobian: Vec<f64>,
    pub bfield: Vec<f64>,
    /// Coordinate-system factor dividing the E×B heat flux; 1 when absent.
    pub c_xy: Option<f64>,
    pub metric: Option<Metric>,
}

impl Geometry {
    pub fn new(jacobian: Vec<f64>, bfield: Vec<f64>) -> Result<Self> {
        if jacobian.is_empty() {
            bail!("Geometry requires at least one poloidal point.");
        }
        if bfield.len() != jacobian.len() {
            bail!(AnalysisError::ShapeMismatch {
                context: "geometry bfield",
                expected: jacobian.len(),
                actual: bfield.len(),
            });
        }
        Ok(Self {
            jacobian,
            bfield,
            c_xy: None,
            metric: None,
        })
    }

    pub fn with_c_xy(mut self, c_xy: f64) -> Self {
        self.c_xy = Some(c_xy);
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Result<Self> {
        let nz = self.nz();
        for (name, values) in [("gxx", &metric.gxx), ("gxy", &metric.gxy), ("gyy", &metric.gyy)] {
            if values.len() != nz {
                bail!("Metric component {name} has {} points, expected {nz}.", values.len());
            }
        }
        self.metric = Some(metric);
        Ok(self)
    }

    pub fn nz(&self) -> usize {
        self.jacobian.len()
    }

    pub fn c_xy_or_one(&self) -> f64 {
        self.c_xy.unwrap_or(1.0)
    }

    /// Jacobian repeated once per connected mode, matching the extended grid.
    pub fn tiled_jacobian(&self, ncopies: usize) -> Vec<f64> {
        tile(&self.jacobian, ncopies)
    }

    /// `jacobian * bfield * pi`, tiled along the extended grid.
    pub fn tiled_jac_b_pi(&self, ncopies: usize) -> Vec<f64> {
        let base: Vec<f64> = self
            .jacobian
            .iter()
            .zip(&self.bfield)
            .map(|(j, b)| j * b * std::f64::consts::PI)
            .collect();
        tile(&base, ncopies)
    }
}

fn tile(values: &[f64], ncopies: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len() * ncopies);
    for _ in 0..ncopies {
        out.extend_from_slice(values);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiling_repeats_base_grid() {
        let geom = Geometry::new(vec![1.0, 2.0], vec![1.0, 0.5]).expect("geometry");
        assert_eq!(geom.tiled_jacobian(3), vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
        let jbp = geom.tiled_jac_b_pi(1);
        assert!((jbp[0] - std::f64::consts::PI).abs() < 1e-12);
        assert!((jbp[1] - std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(Geometry::new(vec![1.0, 2.0], vec![1.0]).is_err());
        let geom = Geometry::new(vec![1.0], vec![1.0]).expect("geometry");
        let metric = Metric {
            gxx: vec![1.0],
            gxy: vec![0.0, 0.0],
            gyy: vec![1.0],
        };
        assert!(geom.with_metric(metric).is_err());
    }
}
