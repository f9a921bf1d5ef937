// ─────────────────────────────────────────────────────────────────────
// LHC Optics Core — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::error::{OpticsError, OpticsResult};
use serde::{Deserialize, Serialize};

/// Top-level numerical configuration for optics, tracking and matching.
/// Every field is optional in JSON and falls back to its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpticsConfig {
    #[serde(default)]
    pub twiss: TwissConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwissConfig {
    /// Momentum step for dispersion and chromaticity finite differences.
    #[serde(default = "default_delta_chrom")]
    pub delta_chrom: f64,
    /// Closed-orbit fixed-point tolerance on |x|, |px|, |y|, |py|.
    #[serde(default = "default_co_tolerance")]
    pub co_tolerance: f64,
    #[serde(default = "default_co_max_iterations")]
    pub co_max_iterations: usize,
    /// Maximum |M^T J M - J| accepted for the one-turn matrix.
    #[serde(default = "default_symplectic_tolerance")]
    pub symplectic_tolerance: f64,
    /// Off-diagonal 2x2 block norm above which coupling is reported.
    #[serde(default = "default_coupling_warning")]
    pub coupling_warning: f64,
}

fn default_delta_chrom() -> f64 {
    1e-4
}
fn default_co_tolerance() -> f64 {
    1e-13
}
fn default_co_max_iterations() -> usize {
    30
}
fn default_symplectic_tolerance() -> f64 {
    1e-9
}
fn default_coupling_warning() -> f64 {
    1e-6
}

impl Default for TwissConfig {
    fn default() -> Self {
        TwissConfig {
            delta_chrom: default_delta_chrom(),
            co_tolerance: default_co_tolerance(),
            co_max_iterations: default_co_max_iterations(),
            symplectic_tolerance: default_symplectic_tolerance(),
            coupling_warning: default_coupling_warning(),
        }
    }
}

impl TwissConfig {
    pub fn validate(&self) -> OpticsResult<()> {
        if !self.delta_chrom.is_finite() || self.delta_chrom <= 0.0 || self.delta_chrom > 0.1 {
            return Err(OpticsError::ConfigError(
                "twiss.delta_chrom must be finite and in (0, 0.1]".to_string(),
            ));
        }
        if !self.co_tolerance.is_finite() || self.co_tolerance <= 0.0 {
            return Err(OpticsError::ConfigError(
                "twiss.co_tolerance must be finite and > 0".to_string(),
            ));
        }
        if self.co_max_iterations == 0 {
            return Err(OpticsError::ConfigError(
                "twiss.co_max_iterations must be >= 1".to_string(),
            ));
        }
        if !self.symplectic_tolerance.is_finite() || self.symplectic_tolerance <= 0.0 {
            return Err(OpticsError::ConfigError(
                "twiss.symplectic_tolerance must be finite and > 0".to_string(),
            ));
        }
        if !self.coupling_warning.is_finite() || self.coupling_warning < 0.0 {
            return Err(OpticsError::ConfigError(
                "twiss.coupling_warning must be finite and >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Transverse radius beyond which a particle is lost regardless of apertures.
    #[serde(default = "default_global_aperture_m")]
    pub global_aperture_m: f64,
    /// Ensembles with at least this many particles are tracked in parallel.
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,
}

fn default_global_aperture_m() -> f64 {
    1.0
}
fn default_parallel_threshold() -> usize {
    64
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            global_aperture_m: default_global_aperture_m(),
            parallel_threshold: default_parallel_threshold(),
        }
    }
}

impl TrackingConfig {
    pub fn validate(&self) -> OpticsResult<()> {
        if !self.global_aperture_m.is_finite() || self.global_aperture_m <= 0.0 {
            return Err(OpticsError::ConfigError(
                "tracking.global_aperture_m must be finite and > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Singular values below `sv_cutoff_rel * sigma_max` are truncated.
    #[serde(default = "default_sv_cutoff_rel")]
    pub sv_cutoff_rel: f64,
}

fn default_max_iterations() -> usize {
    20
}
fn default_sv_cutoff_rel() -> f64 {
    1e-10
}

impl Default for MatchingConfig {
    fn default() -> Self {
        MatchingConfig {
            max_iterations: default_max_iterations(),
            sv_cutoff_rel: default_sv_cutoff_rel(),
        }
    }
}

impl MatchingConfig {
    pub fn validate(&self) -> OpticsResult<()> {
        if self.max_iterations == 0 {
            return Err(OpticsError::ConfigError(
                "matching.max_iterations must be >= 1".to_string(),
            ));
        }
        if !self.sv_cutoff_rel.is_finite() || !(0.0..1.0).contains(&self.sv_cutoff_rel) {
            return Err(OpticsError::ConfigError(
                "matching.sv_cutoff_rel must be finite and in [0, 1)".to_string(),
            ));
        }
        Ok(())
    }
}

impl OpticsConfig {
    /// Load from a JSON file and validate every section.
    pub fn from_file(path: &str) -> OpticsResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> OpticsResult<()> {
        self.twiss.validate()?;
        self.tracking.validate()?;
        self.matching.validate()
    }
}
