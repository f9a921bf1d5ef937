// ─────────────────────────────────────────────────────────────────────
// LHC Optics Core — Errors
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpticsError {
    #[error("Name already present in lattice: {0}")]
    DuplicateName(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("Invalid aperture polygon: {0}")]
    InvalidPolygon(String),

    #[error("No stable periodic optics: {0}")]
    OpticsNotFound(String),

    #[error("Matching did not converge after {iterations} iterations, residuals={residuals:?}")]
    MatchingDidNotConverge {
        iterations: usize,
        residuals: Vec<f64>,
    },

    #[error("Singular matching Jacobian: rank {rank} < {targets} targets, residuals={residuals:?}")]
    SingularJacobian {
        rank: usize,
        targets: usize,
        residuals: Vec<f64>,
    },

    #[error("Invalid knob binding: {0}")]
    InvalidBinding(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Linear algebra error: {0}")]
    LinAlg(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OpticsError {
    pub fn element_not_found(name: &str) -> Self {
        OpticsError::NotFound {
            kind: "Element",
            name: name.to_string(),
        }
    }

    pub fn knob_not_found(name: &str) -> Self {
        OpticsError::NotFound {
            kind: "Knob",
            name: name.to_string(),
        }
    }

    /// Residual vector carried by a matching failure, if any.
    pub fn residuals(&self) -> Option<&[f64]> {
        match self {
            OpticsError::MatchingDidNotConverge { residuals, .. }
            | OpticsError::SingularJacobian { residuals, .. } => Some(residuals),
            _ => None,
        }
    }
}

pub type OpticsResult<T> = Result<T, OpticsError>;
