//! Matched Gaussian bunch generation.
//!
//! Normalized coordinates `(u, v)` are standard normal; physical ones are
//! `x = x_co + sqrt(beta eps) u + D delta` and
//! `px = px_co + sqrt(eps / beta) (v - alpha u) + D' delta`, with the
//! geometric emittance `eps = nemitt / (beta0 gamma0)`.

use crate::particles::Particles;
use crate::twiss::{TwissRow, TwissTable};
use optics_types::error::{OpticsError, OpticsResult};
use optics_types::state::PhaseSpace;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BunchSpec {
    pub nemitt_x: f64,
    pub nemitt_y: f64,
    pub sigma_z: f64,
    pub sigma_delta: f64,
    pub num_particles: usize,
}

impl BunchSpec {
    fn validate(&self) -> OpticsResult<()> {
        let fields = [
            ("nemitt_x", self.nemitt_x),
            ("nemitt_y", self.nemitt_y),
            ("sigma_z", self.sigma_z),
            ("sigma_delta", self.sigma_delta),
        ];
        for (label, v) in fields {
            if !v.is_finite() || v < 0.0 {
                return Err(OpticsError::ConfigError(format!(
                    "bunch {label} must be finite and >= 0, got {v}"
                )));
            }
        }
        Ok(())
    }
}

fn matched_state<R: Rng + ?Sized>(
    row: &TwissRow,
    eps_x: f64,
    eps_y: f64,
    spec: &BunchSpec,
    rng: &mut R,
) -> PhaseSpace {
    let mut normal = || -> f64 { StandardNormal.sample(&mut *rng) };
    let (ux, vx, uy, vy) = (normal(), normal(), normal(), normal());
    let zeta = spec.sigma_z * normal();
    let delta = spec.sigma_delta * normal();

    let (sbx, sby) = ((row.betx * eps_x).sqrt(), (row.bety * eps_y).sqrt());
    PhaseSpace {
        x: row.x + sbx * ux + row.dx * delta,
        px: row.px + (sbx / row.betx) * (vx - row.alfx * ux) + row.dpx * delta,
        y: row.y + sby * uy + row.dy * delta,
        py: row.py + (sby / row.bety) * (vy - row.alfy * uy) + row.dpy * delta,
        zeta: row.zeta + zeta,
        delta: row.delta + delta,
    }
}

/// Bunch matched to the optics at the first row of `twiss`. Deterministic
/// for a seeded `rng`.
pub fn matched_gaussian_bunch<R: Rng + ?Sized>(
    twiss: &TwissTable,
    spec: &BunchSpec,
    rng: &mut R,
) -> OpticsResult<Particles> {
    spec.validate()?;
    let row = twiss.rows().first().ok_or_else(|| {
        OpticsError::ConfigError("cannot match a bunch to an empty twiss table".to_string())
    })?;
    let bg = twiss.reference.beta_gamma0();
    let (eps_x, eps_y) = (spec.nemitt_x / bg, spec.nemitt_y / bg);

    let states: Vec<PhaseSpace> = (0..spec.num_particles)
        .map(|_| matched_state(row, eps_x, eps_y, spec, &mut *rng))
        .collect();
    debug!(
        num_particles = spec.num_particles,
        eps_x, eps_y, "matched gaussian bunch generated"
    );
    Particles::new(states, twiss.reference)
}
