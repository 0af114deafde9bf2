use crate::quantity::Quantity;
use anyhow::{anyhow, bail, Result};
use ndarray::Array3;
use num_complex::Complex64;
use std::collections::BTreeMap;

/// Complex field/moment snapshots for one simulation case.
///
/// `read` returns the array for the current time indexed `(z, ky, x)`.
pub trait FieldSource {
    fn times(&self) -> &[f64];

    fn set_time(&mut self, time: f64) -> Result<()>;

    fn provides(&self, quantity: Quantity) -> bool;

    fn read(&mut self, quantity: Quantity) -> Result<Array3<Complex64>>;
}

/// Snapshots held in memory, keyed by time index.
#[derive(Debug, Clone, Default)]
pub struct MemoryFieldSource {
    times: Vec<f64>,
    data: BTreeMap<Quantity, Vec<Array3<Complex64>>>,
    current: usize,
}

impl MemoryFieldSource {
    pub fn new(times: Vec<f64>) -> Self {
        Self {
            times,
            data: BTreeMap::new(),
            current: 0,
        }
    }

    /// Registers one snapshot per time for `quantity`.
    pub fn insert(&mut self, quantity: Quantity, snapshots: Vec<Array3<Complex64>>) -> Result<()> {
        if snapshots.len() != self.times.len() {
            bail!(
                "Expected {} snapshots for {}, got {}.",
                self.times.len(),
                quantity,
                snapshots.len()
            );
        }
        self.data.insert(quantity, snapshots);
        Ok(())
    }
}

impl FieldSource for MemoryFieldSource {
    fn times(&self) -> &[f64] {
        &self.times
    }

    fn set_time(&mut self, time: f64) -> Result<()> {
        self.current = self
            .times
            .iter()
            .position(|&t| t == time)
            .ok_or_else(|| anyhow!("Time {time} is not available."))?;
        Ok(())
    }

    fn provides(&self, quantity: Quantity) -> bool {
        self.data.contains_key(&quantity)
    }

    fn read(&mut self, quantity: Quantity) -> Result<Array3<Complex64>> {
        let snapshots = self
            .data
            .get(&quantity)
            .ok_or_else(|| anyhow!("Quantity {quantity} is not available."))?;
        Ok(snapshots[self.current].clone())
    }
}

/// Times inside the closed window `[start, end]`.
pub fn times_in_window(times: &[f64], start: f64, end: f64) -> Vec<f64> {
    times
        .iter()
        .copied()
        .filter(|&t| start <= t && t <= end)
        .collect()
}
