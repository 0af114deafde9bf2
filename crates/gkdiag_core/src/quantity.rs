//! Static lookup tables for the physical quantities handled by the analysis.

use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Field and moment quantities that can be loaded for a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantity {
    Phi,
    Apar,
    Bpar,
    Dens,
    Tpar,
    Tperp,
    /// Derived from phi and the moments, never read directly.
    HeatFlux,
}

impl Quantity {
    pub const COUNT: usize = 7;

    pub const ALL: [Quantity; Quantity::COUNT] = [
        Quantity::Phi,
        Quantity::Apar,
        Quantity::Bpar,
        Quantity::Dens,
        Quantity::Tpar,
        Quantity::Tperp,
        Quantity::HeatFlux,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Quantity::Phi => "phi",
            Quantity::Apar => "apar",
            Quantity::Bpar => "bpar",
            Quantity::Dens => "dens",
            Quantity::Tpar => "tpar",
            Quantity::Tperp => "tperp",
            Quantity::HeatFlux => "q",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Quantity::Phi => r"$\Phi$",
            Quantity::Apar => r"$A_\parallel$",
            Quantity::Bpar => r"$B_\parallel$",
            Quantity::Dens => "$n$",
            Quantity::Tpar => r"$T_\parallel$",
            Quantity::Tperp => r"$T_\perp$",
            Quantity::HeatFlux => "$Q$",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, AnalysisError> {
        Quantity::ALL
            .iter()
            .copied()
            .find(|q| q.name() == name)
            .ok_or_else(|| AnalysisError::UnknownKey(name.to_string()))
    }

    /// Electromagnetic fields come from the field file, the rest from moments.
    pub fn is_field(self) -> bool {
        matches!(self, Quantity::Phi | Quantity::Apar | Quantity::Bpar)
    }

    /// Inputs needed to derive the heat flux.
    pub const HEAT_FLUX_INPUTS: [Quantity; 4] =
        [Quantity::Phi, Quantity::Dens, Quantity::Tpar, Quantity::Tperp];
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The ten per-species columns of an nrg diagnostic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NrgColumn {
    DensitySquared,
    UparSquared,
    Tpar,
    Tperp,
    GammaEs,
    GammaEm,
    QEs,
    QEm,
    PiEs,
    PiEm,
}

impl NrgColumn {
    pub const COUNT: usize = 10;

    pub const ALL: [NrgColumn; NrgColumn::COUNT] = [
        NrgColumn::DensitySquared,
        NrgColumn::UparSquared,
        NrgColumn::Tpar,
        NrgColumn::Tperp,
        NrgColumn::GammaEs,
        NrgColumn::GammaEm,
        NrgColumn::QEs,
        NrgColumn::QEm,
        NrgColumn::PiEs,
        NrgColumn::PiEm,
    ];

    /// Default flux selection used by the averaging driver (Γes, Γem, Qes, Qem).
    pub const FLUXES: [NrgColumn; 4] = [
        NrgColumn::GammaEs,
        NrgColumn::GammaEm,
        NrgColumn::QEs,
        NrgColumn::QEm,
    ];

    /// Column order used for QL coefficients (Γes, Qes, Γem, Qem).
    pub const QL_FLUXES: [NrgColumn; 4] = [
        NrgColumn::GammaEs,
        NrgColumn::QEs,
        NrgColumn::GammaEm,
        NrgColumn::QEm,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Result<Self, AnalysisError> {
        NrgColumn::ALL
            .get(index)
            .copied()
            .ok_or_else(|| AnalysisError::UnknownKey(format!("nrg column {index}")))
    }

    pub fn label(self) -> &'static str {
        match self {
            NrgColumn::DensitySquared => r"$|n|^2$",
            NrgColumn::UparSquared => r"$|u_\parallel|^2$",
            NrgColumn::Tpar => r"$T_\parallel$",
            NrgColumn::Tperp => r"$T_\perp$",
            NrgColumn::GammaEs => r"$\Gamma_\text{es}^x$",
            NrgColumn::GammaEm => r"$\Gamma_\text{em}^x$",
            NrgColumn::QEs => r"$Q_\text{es}^x$",
            NrgColumn::QEm => r"$Q_\text{em}^x$",
            NrgColumn::PiEs => r"$\Pi_\text{es}^x$",
            NrgColumn::PiEm => r"$\Pi_\text{em}^x$",
        }
    }

    /// Column holding the same flux in a flux-spectrum block
    /// (`k, Γes, Qes, Πes, Γem, Qem, Πem`).
    pub fn spectrum_column(self) -> Result<usize, AnalysisError> {
        match self {
            NrgColumn::GammaEs => Ok(1),
            NrgColumn::QEs => Ok(2),
            NrgColumn::PiEs => Ok(3),
            NrgColumn::GammaEm => Ok(4),
            NrgColumn::QEm => Ok(5),
            NrgColumn::PiEm => Ok(6),
            other => Err(AnalysisError::UnknownKey(format!(
                "{other:?} has no flux-spectrum column"
            ))),
        }
    }

    pub fn is_particle_flux(self) -> bool {
        matches!(self, NrgColumn::GammaEs | NrgColumn::GammaEm)
    }

    pub fn is_heat_flux(self) -> bool {
        matches!(self, NrgColumn::QEs | NrgColumn::QEm)
    }
}

/// Header for the cumulative-sum tables.
pub fn cumulative_header(tag: &str) -> Result<&'static str, AnalysisError> {
    match tag {
        "sv" => Ok("Singular values"),
        "q" => Ok("Heat flux"),
        other => Err(AnalysisError::UnknownKey(other.to_string())),
    }
}
