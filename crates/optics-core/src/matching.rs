// ─────────────────────────────────────────────────────────────────────
// LHC Optics Core — Orbit-Bump Matching
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Newton matching of knob values to optics targets over an open range.
//!
//! Residuals are `weight * (observable - value) / tol`; a target is met when
//! its residual is within [-1, 1]. Each iteration estimates the Jacobian by
//! forward differences and steps by the truncated pseudo-inverse, which
//! gives the minimum-norm update when there are more knobs than targets.
//! Knob updates are applied to the lattice as they happen and are kept on
//! failure.

use crate::jacobian::{compute_fd_jacobian, validate_steps};
use crate::lattice::Lattice;
use crate::twiss::{twiss_open, TwissColumn, TwissInit};
use ndarray::Array1;
use optics_math::linalg::pinv_truncated;
use optics_types::config::{MatchingConfig, TwissConfig};
use optics_types::error::{OpticsError, OpticsResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Observable {
    X,
    Px,
    Y,
    Py,
    Betx,
    Bety,
    Alfx,
    Alfy,
    Dx,
    Dpx,
    Dy,
    Dpy,
    Mux,
    Muy,
}

impl Observable {
    pub fn column(self) -> TwissColumn {
        match self {
            Observable::X => TwissColumn::X,
            Observable::Px => TwissColumn::Px,
            Observable::Y => TwissColumn::Y,
            Observable::Py => TwissColumn::Py,
            Observable::Betx => TwissColumn::Betx,
            Observable::Bety => TwissColumn::Bety,
            Observable::Alfx => TwissColumn::Alfx,
            Observable::Alfy => TwissColumn::Alfy,
            Observable::Dx => TwissColumn::Dx,
            Observable::Dpx => TwissColumn::Dpx,
            Observable::Dy => TwissColumn::Dy,
            Observable::Dpy => TwissColumn::Dpy,
            Observable::Mux => TwissColumn::Mux,
            Observable::Muy => TwissColumn::Muy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub observable: Observable,
    /// Row name in the open-range table.
    pub at: String,
    pub value: f64,
    pub tol: f64,
    pub weight: f64,
}

impl Target {
    pub fn new(observable: Observable, at: &str, value: f64, tol: f64) -> Self {
        Target {
            observable,
            at: at.to_string(),
            value,
            tol,
            weight: 1.0,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    fn validate(&self) -> OpticsResult<()> {
        if !self.value.is_finite() {
            return Err(OpticsError::ConfigError(format!(
                "target {:?} at '{}' value must be finite",
                self.observable, self.at
            )));
        }
        if !self.tol.is_finite() || self.tol <= 0.0 {
            return Err(OpticsError::ConfigError(format!(
                "target {:?} at '{}' tol must be finite and > 0, got {}",
                self.observable, self.at, self.tol
            )));
        }
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(OpticsError::ConfigError(format!(
                "target {:?} at '{}' weight must be finite and > 0, got {}",
                self.observable, self.at, self.weight
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vary {
    pub knob: String,
    /// Finite-difference step.
    pub step: f64,
}

impl Vary {
    pub fn new(knob: &str, step: f64) -> Self {
        Vary {
            knob: knob.to_string(),
            step,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchProblem {
    pub ele_start: String,
    pub ele_stop: String,
    pub init: TwissInit,
    pub vary: Vec<Vary>,
    pub targets: Vec<Target>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Residual evaluations performed, including the final one.
    pub iterations: usize,
    pub knob_values: Vec<(String, f64)>,
    pub residuals: Vec<f64>,
    /// Largest |residual| per iteration.
    pub residual_history: Vec<f64>,
}

fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0_f64, |m, v| m.max(v.abs()))
}

fn is_met(residuals: &[f64]) -> bool {
    residuals.iter().all(|r| r.abs() <= 1.0)
}

fn evaluate(
    lattice: &Lattice,
    problem: &MatchProblem,
    twiss_config: &TwissConfig,
) -> OpticsResult<Vec<f64>> {
    let table = twiss_open(
        lattice,
        &problem.ele_start,
        &problem.ele_stop,
        &problem.init,
        twiss_config,
    )?;
    problem
        .targets
        .iter()
        .map(|t| {
            let observed = table.row(&t.at)?.get(t.observable.column());
            Ok(t.weight * (observed - t.value) / t.tol)
        })
        .collect()
}

fn apply_knobs(lattice: &mut Lattice, vary: &[Vary], values: &[f64]) -> OpticsResult<()> {
    for (v, &value) in vary.iter().zip(values) {
        lattice.set_knob(&v.knob, value)?;
    }
    Ok(())
}

fn validate_problem(lattice: &Lattice, problem: &MatchProblem) -> OpticsResult<()> {
    if problem.vary.is_empty() {
        return Err(OpticsError::ConfigError(
            "matching needs at least one knob to vary".to_string(),
        ));
    }
    if problem.targets.is_empty() {
        return Err(OpticsError::ConfigError(
            "matching needs at least one target".to_string(),
        ));
    }
    for v in &problem.vary {
        lattice.knob(&v.knob)?;
    }
    let steps: Vec<f64> = problem.vary.iter().map(|v| v.step).collect();
    validate_steps(&steps)?;
    problem.targets.iter().try_for_each(Target::validate)
}

/// Drive the knobs in `problem.vary` until every target is met.
///
/// The lattice keeps the last applied knob values whether or not the run
/// converges.
pub fn match_knobs(
    lattice: &mut Lattice,
    problem: &MatchProblem,
    twiss_config: &TwissConfig,
    config: &MatchingConfig,
) -> OpticsResult<MatchResult> {
    config.validate()?;
    twiss_config.validate()?;
    validate_problem(lattice, problem)?;

    let steps: Vec<f64> = problem.vary.iter().map(|v| v.step).collect();
    let mut x = problem
        .vary
        .iter()
        .map(|v| lattice.knob(&v.knob))
        .collect::<OpticsResult<Vec<f64>>>()?;
    let mut residual_history = Vec::with_capacity(config.max_iterations);
    let mut residuals = Vec::new();

    for iter in 1..=config.max_iterations {
        residuals = evaluate(lattice, problem, twiss_config)?;
        let worst = max_abs(&residuals);
        residual_history.push(worst);
        debug!(iteration = iter, max_residual = worst, "matching iteration");

        if is_met(&residuals) {
            info!(
                iterations = iter,
                knobs = problem.vary.len(),
                targets = problem.targets.len(),
                "matching converged"
            );
            return Ok(MatchResult {
                iterations: iter,
                knob_values: problem
                    .vary
                    .iter()
                    .map(|v| v.knob.clone())
                    .zip(x.iter().copied())
                    .collect(),
                residuals,
                residual_history,
            });
        }
        if iter == config.max_iterations {
            break;
        }

        let base = lattice.clone();
        let jac = compute_fd_jacobian(&x, &steps, &residuals, |trial_x| {
            let mut trial = base.clone();
            apply_knobs(&mut trial, &problem.vary, trial_x)?;
            evaluate(&trial, problem, twiss_config)
        })?;

        let (pinv, rank) = pinv_truncated(&jac, config.sv_cutoff_rel);
        if rank < problem.targets.len() {
            return Err(OpticsError::SingularJacobian {
                rank,
                targets: problem.targets.len(),
                residuals,
            });
        }
        let dx = pinv.dot(&Array1::from(residuals.clone()));
        for (xi, d) in x.iter_mut().zip(dx.iter()) {
            *xi -= d;
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(OpticsError::LinAlg(
                "matching update produced non-finite knob values".to_string(),
            ));
        }
        apply_knobs(lattice, &problem.vary, &x)?;
    }

    warn!(
        iterations = config.max_iterations,
        max_residual = max_abs(&residuals),
        "matching stopped at iteration cap"
    );
    Err(OpticsError::MatchingDidNotConverge {
        iterations: config.max_iterations,
        residuals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Slot;
    use crate::fodo::FodoRingSpec;
    use crate::twiss::twiss;
    use optics_types::constants::LHC_INJECTION_P0C_EV;
    use optics_types::state::ReferenceParticle;

    const BUMP_CORRECTORS: [&str; 4] = ["mcb.6f", "mcb.7f", "mcb.8f", "mcb.9f"];

    fn ring() -> Lattice {
        let mut lat = FodoRingSpec::default()
            .build(ReferenceParticle::proton(LHC_INJECTION_P0C_EV).unwrap())
            .unwrap();
        for (i, corr) in BUMP_CORRECTORS.iter().enumerate() {
            let knob = format!("kb{i}");
            lat.define_knob(&knob, 0.0).unwrap();
            lat.bind_knob(&knob, corr, Slot::HKick, 1.0).unwrap();
        }
        lat
    }

    fn bump_problem(lat: &Lattice, vary: Vec<Vary>) -> MatchProblem {
        let tw = twiss(lat, &TwissConfig::default()).unwrap();
        MatchProblem {
            ele_start: "qf.6".to_string(),
            ele_stop: "d1.9".to_string(),
            init: TwissInit::from_row(tw.row("qf.6").unwrap()),
            vary,
            targets: vec![
                Target::new(Observable::X, "ip5", 1.5e-3, 1e-8),
                Target::new(Observable::Px, "ip5", 0.0, 1e-9),
                Target::new(Observable::X, "d1.9", 0.0, 1e-8),
                Target::new(Observable::Px, "d1.9", 0.0, 1e-9),
            ],
        }
    }

    fn four_knobs() -> Vec<Vary> {
        (0..4).map(|i| Vary::new(&format!("kb{i}"), 1e-6)).collect()
    }

    #[test]
    fn test_bump_converges_and_meets_targets() {
        let mut lat = ring();
        let problem = bump_problem(&lat, four_knobs());
        let result = match_knobs(
            &mut lat,
            &problem,
            &TwissConfig::default(),
            &MatchingConfig::default(),
        )
        .unwrap();
        assert!(result.iterations <= 5, "iterations {}", result.iterations);
        assert!(result.residuals.iter().all(|r| r.abs() <= 1.0));

        let tw = twiss_open(&lat, "qf.6", "d1.9", &problem.init, &TwissConfig::default()).unwrap();
        assert!((tw.row("ip5").unwrap().x - 1.5e-3).abs() <= 1e-8);
        assert!(tw.row("d1.9").unwrap().x.abs() <= 1e-8);
        assert!(tw.row("d1.9").unwrap().px.abs() <= 1e-9);
        assert_eq!(result.knob_values.len(), 4);
        for (name, value) in &result.knob_values {
            assert_eq!(lat.knob(name).unwrap(), *value);
        }
    }

    #[test]
    fn test_rerun_after_solution_takes_one_iteration() {
        let mut lat = ring();
        let problem = bump_problem(&lat, four_knobs());
        let cfg = MatchingConfig::default();
        match_knobs(&mut lat, &problem, &TwissConfig::default(), &cfg).unwrap();
        let again = match_knobs(&mut lat, &problem, &TwissConfig::default(), &cfg).unwrap();
        assert_eq!(again.iterations, 1);
        assert_eq!(again.residual_history.len(), 1);
    }

    #[test]
    fn test_redundant_knobs_are_singular() {
        let mut lat = ring();
        lat.define_knob("kb0_twin", 0.0).unwrap();
        lat.bind_knob("kb0_twin", "mcb.6f", Slot::HKick, 1.0).unwrap();
        let vary = vec![
            Vary::new("kb0", 1e-6),
            Vary::new("kb0_twin", 1e-6),
            Vary::new("kb2", 1e-6),
            Vary::new("kb3", 1e-6),
        ];
        let problem = bump_problem(&lat, vary);
        let err = match_knobs(
            &mut lat,
            &problem,
            &TwissConfig::default(),
            &MatchingConfig::default(),
        )
        .unwrap_err();
        match err {
            OpticsError::SingularJacobian {
                rank,
                targets,
                residuals,
            } => {
                assert_eq!(targets, 4);
                assert!(rank < 4);
                assert_eq!(residuals.len(), 4);
            }
            other => panic!("expected SingularJacobian, got {other:?}"),
        }
    }

    #[test]
    fn test_too_few_knobs_are_singular() {
        let mut lat = ring();
        let problem = bump_problem(&lat, four_knobs()[..2].to_vec());
        let err = match_knobs(
            &mut lat,
            &problem,
            &TwissConfig::default(),
            &MatchingConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, OpticsError::SingularJacobian { rank: 2, .. }));
    }

    #[test]
    fn test_iteration_cap_reports_residuals() {
        let mut lat = ring();
        let problem = bump_problem(&lat, four_knobs());
        let cfg = MatchingConfig {
            max_iterations: 1,
            ..MatchingConfig::default()
        };
        let err = match_knobs(&mut lat, &problem, &TwissConfig::default(), &cfg).unwrap_err();
        assert!(matches!(
            err,
            OpticsError::MatchingDidNotConverge { iterations: 1, .. }
        ));
        let residuals = err.residuals().unwrap();
        assert_eq!(residuals.len(), 4);
        assert!((residuals[0] + 1.5e-3 / 1e-8).abs() < 1.0);
    }

    #[test]
    fn test_weight_scales_residuals_and_acceptance() {
        let mut lat = ring();
        let mut problem = bump_problem(&lat, four_knobs());
        let tw_cfg = TwissConfig::default();
        match_knobs(&mut lat, &problem, &tw_cfg, &MatchingConfig::default()).unwrap();

        // Pin every target to the matched optics, then move the first one
        // 1.5 tolerances away.
        let table = twiss_open(&lat, "qf.6", "d1.9", &problem.init, &tw_cfg).unwrap();
        for t in problem.targets.iter_mut() {
            t.value = table.row(&t.at).unwrap().get(t.observable.column());
        }
        problem.targets[0].value -= 1.5 * problem.targets[0].tol;

        let one_pass = MatchingConfig {
            max_iterations: 1,
            ..MatchingConfig::default()
        };
        let knobs_before: Vec<f64> = (0..4).map(|i| lat.knob(&format!("kb{i}")).unwrap()).collect();
        let err = match_knobs(&mut lat, &problem, &tw_cfg, &one_pass).unwrap_err();
        let residuals = err.residuals().unwrap();
        assert!((residuals[0] - 1.5).abs() < 1e-6, "residual {}", residuals[0]);

        problem.targets[0] = problem.targets[0].clone().with_weight(0.5);
        let result = match_knobs(&mut lat, &problem, &tw_cfg, &one_pass).unwrap();
        assert_eq!(result.iterations, 1);
        assert!((result.residuals[0] - 0.75).abs() < 1e-6, "residual {}", result.residuals[0]);
        assert!(result.residuals[1..].iter().all(|r| r.abs() < 1e-6));
        let knobs_after: Vec<f64> = (0..4).map(|i| lat.knob(&format!("kb{i}")).unwrap()).collect();
        assert_eq!(knobs_before, knobs_after);
    }

    #[test]
    fn test_weight_multiplies_reported_residuals() {
        let one_pass = MatchingConfig {
            max_iterations: 1,
            ..MatchingConfig::default()
        };
        let mut lat = ring();
        let plain = bump_problem(&lat, four_knobs());
        let mut weighted = plain.clone();
        weighted.targets[0] = weighted.targets[0].clone().with_weight(2.0);

        let base = match_knobs(&mut lat, &plain, &TwissConfig::default(), &one_pass)
            .unwrap_err()
            .residuals()
            .unwrap()
            .to_vec();
        let scaled = match_knobs(&mut lat, &weighted, &TwissConfig::default(), &one_pass)
            .unwrap_err()
            .residuals()
            .unwrap()
            .to_vec();
        assert!((scaled[0] - 2.0 * base[0]).abs() < 1e-9 * base[0].abs());
        assert_eq!(&scaled[1..], &base[1..]);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let mut lat = ring();
        let tw = TwissConfig::default();
        let cfg = MatchingConfig::default();

        let mut problem = bump_problem(&lat, four_knobs());
        problem.vary[0].step = 0.0;
        assert!(matches!(
            match_knobs(&mut lat, &problem, &tw, &cfg),
            Err(OpticsError::ConfigError(_))
        ));

        let mut problem = bump_problem(&lat, four_knobs());
        problem.targets[1].tol = -1.0;
        assert!(match_knobs(&mut lat, &problem, &tw, &cfg).is_err());

        let mut problem = bump_problem(&lat, four_knobs());
        problem.targets[2] = problem.targets[2].clone().with_weight(0.0);
        assert!(matches!(
            match_knobs(&mut lat, &problem, &tw, &cfg),
            Err(OpticsError::ConfigError(_))
        ));

        let mut problem = bump_problem(&lat, four_knobs());
        problem.vary.push(Vary::new("no_such_knob", 1e-6));
        assert!(matches!(
            match_knobs(&mut lat, &problem, &tw, &cfg),
            Err(OpticsError::NotFound { kind: "Knob", .. })
        ));

        let mut problem = bump_problem(&lat, four_knobs());
        problem.targets[0].at = "qf.12".to_string();
        assert!(matches!(
            match_knobs(&mut lat, &problem, &tw, &cfg),
            Err(OpticsError::NotFound { .. })
        ));
    }
}
