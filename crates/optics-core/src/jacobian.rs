// ─────────────────────────────────────────────────────────────────────
// LHC Optics Core — Finite-Difference Jacobian
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Forward-difference Jacobian of a vector model over knob values.
//!
//! Columns are independent model evaluations and run in parallel; each one
//! perturbs a single knob by its own step:
//!   J[i][k] = (f_i(x + h_k e_k) - f_i(x)) / h_k

use ndarray::Array2;
use optics_types::error::{OpticsError, OpticsResult};
use rayon::prelude::*;

/// Reject steps that cannot produce a finite-difference column.
pub fn validate_steps(steps: &[f64]) -> OpticsResult<()> {
    for (k, &h) in steps.iter().enumerate() {
        if !h.is_finite() || h == 0.0 {
            return Err(OpticsError::ConfigError(format!(
                "jacobian step {k} must be finite and non-zero, got {h}"
            )));
        }
    }
    Ok(())
}

/// Jacobian of `model` at `x`, given the already evaluated `base = model(x)`.
pub fn compute_fd_jacobian<F>(
    x: &[f64],
    steps: &[f64],
    base: &[f64],
    model: F,
) -> OpticsResult<Array2<f64>>
where
    F: Fn(&[f64]) -> OpticsResult<Vec<f64>> + Sync,
{
    if x.len() != steps.len() {
        return Err(OpticsError::ConfigError(format!(
            "jacobian length mismatch: x={}, steps={}",
            x.len(),
            steps.len()
        )));
    }
    validate_steps(steps)?;

    let columns: Vec<Vec<f64>> = (0..x.len())
        .into_par_iter()
        .map(|col| {
            let h = steps[col];
            let mut perturbed = x.to_vec();
            perturbed[col] += h;
            let f = model(&perturbed)?;
            if f.len() != base.len() {
                return Err(OpticsError::LinAlg(format!(
                    "model returned {} values, expected {}",
                    f.len(),
                    base.len()
                )));
            }
            Ok(f.iter().zip(base).map(|(fp, b)| (fp - b) / h).collect())
        })
        .collect::<OpticsResult<_>>()?;

    Ok(Array2::from_shape_fn((base.len(), x.len()), |(i, k)| {
        columns[k][i]
    }))
}
