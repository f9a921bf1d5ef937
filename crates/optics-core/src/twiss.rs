// ─────────────────────────────────────────────────────────────────────
// LHC Optics Core — Twiss Propagator
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Closed orbit, linear optics and chromatic properties.
//!
//! Ring mode finds the closed orbit by Newton iteration on the one-turn map,
//! derives periodic beta/alpha from the uncoupled 2x2 blocks of the one-turn
//! matrix and propagates them element by element:
//!
//!   beta1  = M11² beta - 2 M11 M12 alpha + M12² gamma
//!   alpha1 = -M11 M21 beta + (M11 M22 + M12 M21) alpha - M12 M22 gamma
//!   dmu    = atan2(M12, M11 beta - M12 alpha) / 2π
//!
//! Dispersion is the central difference of the orbits at `delta ± Δ`;
//! chromaticity repeats the periodic solution at `delta ± Δ`.

use crate::lattice::Lattice;
use ndarray::{Array1, Array2};
use optics_math::linalg::{eig_2x2, solve_dense};
use optics_math::symplectic::{
    block2, coupling_norm, identity4, mat_mul4, symplecticity_error, Matrix4,
};
use optics_types::config::TwissConfig;
use optics_types::constants::END_POINT;
use optics_types::error::{OpticsError, OpticsResult};
use optics_types::state::{PhaseSpace, ReferenceParticle};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, info, warn};

/// Smallest |sin mu| accepted for a periodic solution.
const MIN_SIN_MU: f64 = 1e-10;
/// Closed-orbit iteration accepts a round-off plateau within this factor
/// of the tolerance.
const CO_STAGNATION_FACTOR: f64 = 100.0;

/// Initial optics for an open-range computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TwissInit {
    pub particle: PhaseSpace,
    pub betx: f64,
    pub alfx: f64,
    pub bety: f64,
    pub alfy: f64,
    pub dx: f64,
    pub dpx: f64,
    pub dy: f64,
    pub dpy: f64,
    pub mux: f64,
    pub muy: f64,
}

impl TwissInit {
    /// On-axis, dispersion-free start with the given Courant-Snyder functions.
    pub fn new(betx: f64, alfx: f64, bety: f64, alfy: f64) -> Self {
        TwissInit {
            particle: PhaseSpace::default(),
            betx,
            alfx,
            bety,
            alfy,
            dx: 0.0,
            dpx: 0.0,
            dy: 0.0,
            dpy: 0.0,
            mux: 0.0,
            muy: 0.0,
        }
    }

    /// Start from a row of a previously computed table.
    pub fn from_row(row: &TwissRow) -> Self {
        TwissInit {
            particle: row.state(),
            betx: row.betx,
            alfx: row.alfx,
            bety: row.bety,
            alfy: row.alfy,
            dx: row.dx,
            dpx: row.dpx,
            dy: row.dy,
            dpy: row.dpy,
            mux: row.mux,
            muy: row.muy,
        }
    }

    fn validate(&self) -> OpticsResult<()> {
        for (label, v) in [("betx", self.betx), ("bety", self.bety)] {
            if !v.is_finite() || v <= 0.0 {
                return Err(OpticsError::ConfigError(format!(
                    "twiss init {label} must be finite and > 0, got {v}"
                )));
            }
        }
        let rest = [
            self.alfx, self.alfy, self.dx, self.dpx, self.dy, self.dpy, self.mux, self.muy,
        ];
        if rest.iter().any(|v| !v.is_finite()) || !self.particle.is_finite() {
            return Err(OpticsError::ConfigError(
                "twiss init values must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Optics at one element entrance. Phases are in units of 2π.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwissRow {
    pub name: String,
    pub s: f64,
    pub x: f64,
    pub px: f64,
    pub y: f64,
    pub py: f64,
    pub zeta: f64,
    pub delta: f64,
    pub betx: f64,
    pub bety: f64,
    pub alfx: f64,
    pub alfy: f64,
    pub gamx: f64,
    pub gamy: f64,
    pub dx: f64,
    pub dpx: f64,
    pub dy: f64,
    pub dpy: f64,
    pub mux: f64,
    pub muy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TwissColumn {
    S,
    X,
    Px,
    Y,
    Py,
    Zeta,
    Delta,
    Betx,
    Bety,
    Alfx,
    Alfy,
    Gamx,
    Gamy,
    Dx,
    Dpx,
    Dy,
    Dpy,
    Mux,
    Muy,
}

impl TwissRow {
    pub fn get(&self, column: TwissColumn) -> f64 {
        match column {
            TwissColumn::S => self.s,
            TwissColumn::X => self.x,
            TwissColumn::Px => self.px,
            TwissColumn::Y => self.y,
            TwissColumn::Py => self.py,
            TwissColumn::Zeta => self.zeta,
            TwissColumn::Delta => self.delta,
            TwissColumn::Betx => self.betx,
            TwissColumn::Bety => self.bety,
            TwissColumn::Alfx => self.alfx,
            TwissColumn::Alfy => self.alfy,
            TwissColumn::Gamx => self.gamx,
            TwissColumn::Gamy => self.gamy,
            TwissColumn::Dx => self.dx,
            TwissColumn::Dpx => self.dpx,
            TwissColumn::Dy => self.dy,
            TwissColumn::Dpy => self.dpy,
            TwissColumn::Mux => self.mux,
            TwissColumn::Muy => self.muy,
        }
    }

    pub fn state(&self) -> PhaseSpace {
        PhaseSpace {
            x: self.x,
            px: self.px,
            y: self.y,
            py: self.py,
            zeta: self.zeta,
            delta: self.delta,
        }
    }
}

/// Betatron beam size at one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamSigma {
    pub name: String,
    pub s: f64,
    pub sigma_x: f64,
    pub sigma_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwissTable {
    rows: Vec<TwissRow>,
    /// Total horizontal phase advance (ring: tune including integer part).
    pub qx: f64,
    pub qy: f64,
    pub dqx: Option<f64>,
    pub dqy: Option<f64>,
    pub momentum_compaction_factor: Option<f64>,
    /// Path length covered by the table.
    pub circumference: f64,
    pub periodic: bool,
    pub reference: ReferenceParticle,
    lattice_revision: u64,
}

impl TwissTable {
    pub fn rows(&self) -> &[TwissRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn lattice_revision(&self) -> u64 {
        self.lattice_revision
    }

    /// True while the lattice has not been mutated since this table was built.
    pub fn is_current(&self, lattice: &Lattice) -> bool {
        self.lattice_revision == lattice.revision()
    }

    pub fn row_index(&self, name: &str) -> OpticsResult<usize> {
        self.rows
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| OpticsError::element_not_found(name))
    }

    pub fn row(&self, name: &str) -> OpticsResult<&TwissRow> {
        Ok(&self.rows[self.row_index(name)?])
    }

    /// Rows with `s0 <= s <= s1`.
    pub fn rows_in_s_range(&self, s0: f64, s1: f64) -> Vec<&TwissRow> {
        self.rows.iter().filter(|r| r.s >= s0 && r.s <= s1).collect()
    }

    pub fn column(&self, column: TwissColumn) -> Vec<f64> {
        self.rows.iter().map(|r| r.get(column)).collect()
    }

    /// Closed-orbit state at the first row.
    pub fn particle_on_co(&self) -> PhaseSpace {
        self.rows
            .first()
            .map(TwissRow::state)
            .unwrap_or_default()
    }

    pub fn fractional_tunes(&self) -> (f64, f64) {
        (self.qx.rem_euclid(1.0), self.qy.rem_euclid(1.0))
    }

    /// `1 / sqrt(alpha_c)` for a positive momentum compaction, `None` otherwise.
    pub fn gamma_transition(&self) -> Option<f64> {
        self.momentum_compaction_factor
            .filter(|&a| a > 0.0)
            .map(|a| 1.0 / a.sqrt())
    }

    /// Per-row betatron sizes for normalized emittances `nemitt_x, nemitt_y`.
    pub fn betatron_sigmas(&self, nemitt_x: f64, nemitt_y: f64) -> OpticsResult<Vec<BeamSigma>> {
        for (label, v) in [("nemitt_x", nemitt_x), ("nemitt_y", nemitt_y)] {
            if !v.is_finite() || v < 0.0 {
                return Err(OpticsError::ConfigError(format!(
                    "{label} must be finite and >= 0, got {v}"
                )));
            }
        }
        let bg = self.reference.beta_gamma0();
        let (ex, ey) = (nemitt_x / bg, nemitt_y / bg);
        Ok(self
            .rows
            .iter()
            .map(|r| BeamSigma {
                name: r.name.clone(),
                s: r.s,
                sigma_x: (r.betx * ex).sqrt(),
                sigma_y: (r.bety * ey).sqrt(),
            })
            .collect())
    }

    /// Table seen by a beam travelling the line in the opposite direction.
    pub fn reverse(&self) -> TwissTable {
        let (s_first, s_last) = match (self.rows.first(), self.rows.last()) {
            (Some(a), Some(b)) => (a.s, b.s),
            _ => (0.0, 0.0),
        };
        let (mux_total, muy_total) = self
            .rows
            .last()
            .map(|r| (r.mux, r.muy))
            .unwrap_or((0.0, 0.0));
        let rows = self
            .rows
            .iter()
            .rev()
            .map(|r| TwissRow {
                name: r.name.clone(),
                s: s_first + s_last - r.s,
                x: -r.x,
                px: r.px,
                y: r.y,
                py: -r.py,
                zeta: r.zeta,
                delta: r.delta,
                betx: r.betx,
                bety: r.bety,
                alfx: -r.alfx,
                alfy: -r.alfy,
                gamx: r.gamx,
                gamy: r.gamy,
                dx: -r.dx,
                dpx: r.dpx,
                dy: r.dy,
                dpy: -r.dpy,
                mux: mux_total - r.mux,
                muy: muy_total - r.muy,
            })
            .collect();
        TwissTable {
            rows,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PlaneOptics {
    beta: f64,
    alpha: f64,
    mu: f64,
}

impl PlaneOptics {
    fn gamma(&self) -> f64 {
        (1.0 + self.alpha * self.alpha) / self.beta
    }

    fn propagate(&self, m: &[[f64; 2]; 2]) -> Self {
        let (m11, m12, m21, m22) = (m[0][0], m[0][1], m[1][0], m[1][1]);
        let (b, a, g) = (self.beta, self.alpha, self.gamma());
        PlaneOptics {
            beta: m11 * m11 * b - 2.0 * m11 * m12 * a + m12 * m12 * g,
            alpha: -m11 * m21 * b + (m11 * m22 + m12 * m21) * a - m12 * m22 * g,
            mu: self.mu + m12.atan2(m11 * b - m12 * a) / (2.0 * PI),
        }
    }
}

/// Transverse state after one pass of `lattice[start..stop]`, and the
/// accumulated Jacobian.
fn track_with_matrix(
    lattice: &Lattice,
    start: usize,
    stop: usize,
    initial: &PhaseSpace,
) -> OpticsResult<(PhaseSpace, Matrix4)> {
    let mut p = *initial;
    let mut m = identity4();
    for (i, el) in lattice.elements()[start..stop].iter().enumerate() {
        let r = el.transverse_matrix(&p);
        el.track(&mut p);
        if !p.is_finite() {
            return Err(map_singularity(lattice, start + i));
        }
        m = mat_mul4(&r, &m);
    }
    Ok((p, m))
}

fn map_singularity(lattice: &Lattice, index: usize) -> OpticsError {
    OpticsError::OpticsNotFound(format!(
        "map singularity at element '{}'",
        lattice.name_at(index).unwrap_or("?")
    ))
}

/// Closed orbit at fixed `delta` and the one-turn matrix around it.
pub fn find_closed_orbit(
    lattice: &Lattice,
    delta: f64,
    config: &TwissConfig,
) -> OpticsResult<(PhaseSpace, Matrix4)> {
    let n = lattice.len();
    let mut guess = PhaseSpace::on_momentum(delta);
    let mut prev_err = f64::INFINITY;

    for iteration in 0..config.co_max_iterations {
        let (end, one_turn) = track_with_matrix(lattice, 0, n, &guess)?;
        let t0 = guess.transverse();
        let t1 = end.transverse();
        let residual: Vec<f64> = t1.iter().zip(t0.iter()).map(|(a, b)| a - b).collect();
        let err = residual.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        debug!(iteration, delta, err, "closed orbit search");

        let plateau = err <= CO_STAGNATION_FACTOR * config.co_tolerance && err >= 0.5 * prev_err;
        if err <= config.co_tolerance || plateau {
            return Ok((guess, one_turn));
        }
        prev_err = err;

        let a = Array2::from_shape_fn((4, 4), |(i, j)| {
            one_turn[i][j] - if i == j { 1.0 } else { 0.0 }
        });
        let rhs = Array1::from_iter(residual.iter().map(|v| -v));
        let step = solve_dense(&a, &rhs).map_err(|e| {
            OpticsError::OpticsNotFound(format!("closed-orbit Newton step failed: {e}"))
        })?;
        let mut t = t0;
        for k in 0..4 {
            t[k] += step[k];
        }
        guess.set_transverse(t);
    }

    Err(OpticsError::OpticsNotFound(format!(
        "closed orbit at delta={delta} not found within {} iterations",
        config.co_max_iterations
    )))
}

fn periodic_plane(b: &[[f64; 2]; 2], plane: &str) -> OpticsResult<PlaneOptics> {
    let [l1, l2] = eig_2x2(b);
    let lambda = if l1.im >= 0.0 { l1 } else { l2 };
    if !lambda.im.is_finite() || lambda.im <= MIN_SIN_MU {
        return Err(OpticsError::OpticsNotFound(format!(
            "{plane} motion unstable or on resonance, one-turn trace = {:.6}",
            b[0][0] + b[1][1]
        )));
    }
    let mut mu = lambda.im.atan2(lambda.re);
    if b[0][1] < 0.0 {
        mu = 2.0 * PI - mu;
    }
    let sin_mu = mu.sin();
    let beta = b[0][1] / sin_mu;
    let alpha = (b[0][0] - b[1][1]) / (2.0 * sin_mu);
    if !beta.is_finite() || beta <= 0.0 || !alpha.is_finite() {
        return Err(OpticsError::OpticsNotFound(format!(
            "{plane} periodic solution degenerate: beta={beta}, alpha={alpha}"
        )));
    }
    Ok(PlaneOptics {
        beta,
        alpha,
        mu: 0.0,
    })
}

struct PeriodicSolution {
    orbit: PhaseSpace,
    x: PlaneOptics,
    y: PlaneOptics,
}

fn periodic_solution(
    lattice: &Lattice,
    delta: f64,
    config: &TwissConfig,
) -> OpticsResult<PeriodicSolution> {
    let (orbit, one_turn) = find_closed_orbit(lattice, delta, config)?;
    let symplectic_err = symplecticity_error(&one_turn);
    if symplectic_err > config.symplectic_tolerance {
        return Err(OpticsError::OpticsNotFound(format!(
            "one-turn matrix not symplectic: error {symplectic_err:.3e}"
        )));
    }
    let coupling = coupling_norm(&one_turn);
    if coupling > config.coupling_warning {
        warn!(coupling, delta, "one-turn matrix is coupled, using uncoupled blocks");
    }
    Ok(PeriodicSolution {
        orbit,
        x: periodic_plane(&block2(&one_turn, 0, 0), "horizontal")?,
        y: periodic_plane(&block2(&one_turn, 1, 1), "vertical")?,
    })
}

struct Propagation {
    rows: Vec<TwissRow>,
    orbit: PhaseSpace,
    x: PlaneOptics,
    y: PlaneOptics,
}

/// Element-by-element propagation over `start..stop`, with a closing row at
/// the entrance of `stop`. `chromatic` holds the orbits at `delta ± Δ`.
#[allow(clippy::too_many_arguments)]
fn propagate(
    lattice: &Lattice,
    start: usize,
    stop: usize,
    mut orbit: PhaseSpace,
    mut chromatic: Option<[PhaseSpace; 2]>,
    delta_chrom: f64,
    mut x: PlaneOptics,
    mut y: PlaneOptics,
) -> OpticsResult<Propagation> {
    let s_positions = lattice.s_positions();
    let elements = lattice.elements();
    let mut rows = Vec::with_capacity(stop - start + 1);

    let make_row = |i: usize,
                    orbit: &PhaseSpace,
                    chromatic: &Option<[PhaseSpace; 2]>,
                    x: &PlaneOptics,
                    y: &PlaneOptics| {
        let (dx, dpx, dy, dpy) = match chromatic {
            Some([plus, minus]) => {
                let scale = 1.0 / (2.0 * delta_chrom);
                (
                    (plus.x - minus.x) * scale,
                    (plus.px - minus.px) * scale,
                    (plus.y - minus.y) * scale,
                    (plus.py - minus.py) * scale,
                )
            }
            None => (0.0, 0.0, 0.0, 0.0),
        };
        TwissRow {
            name: lattice.name_at(i).unwrap_or(END_POINT).to_string(),
            s: s_positions[i],
            x: orbit.x,
            px: orbit.px,
            y: orbit.y,
            py: orbit.py,
            zeta: orbit.zeta,
            delta: orbit.delta,
            betx: x.beta,
            bety: y.beta,
            alfx: x.alpha,
            alfy: y.alpha,
            gamx: x.gamma(),
            gamy: y.gamma(),
            dx,
            dpx,
            dy,
            dpy,
            mux: x.mu,
            muy: y.mu,
        }
    };

    for i in start..stop {
        rows.push(make_row(i, &orbit, &chromatic, &x, &y));
        let el = &elements[i];
        let m = el.transverse_matrix(&orbit);
        el.track(&mut orbit);
        if let Some([plus, minus]) = chromatic.as_mut() {
            el.track(plus);
            el.track(minus);
            if !plus.is_finite() || !minus.is_finite() {
                return Err(map_singularity(lattice, i));
            }
        }
        if !orbit.is_finite() {
            return Err(map_singularity(lattice, i));
        }
        x = x.propagate(&block2(&m, 0, 0));
        y = y.propagate(&block2(&m, 1, 1));
    }
    rows.push(make_row(stop, &orbit, &chromatic, &x, &y));

    Ok(Propagation { rows, orbit, x, y })
}

struct OffMomentum {
    orbit: PhaseSpace,
    qx: f64,
    qy: f64,
    zeta_slip: f64,
}

fn off_momentum(lattice: &Lattice, delta: f64, config: &TwissConfig) -> OpticsResult<OffMomentum> {
    let sol = periodic_solution(lattice, delta, config)?;
    let prop = propagate(lattice, 0, lattice.len(), sol.orbit, None, 1.0, sol.x, sol.y)?;
    Ok(OffMomentum {
        orbit: sol.orbit,
        qx: prop.x.mu,
        qy: prop.y.mu,
        zeta_slip: prop.orbit.zeta - sol.orbit.zeta,
    })
}

/// Periodic optics of an on-momentum ring.
pub fn twiss(lattice: &Lattice, config: &TwissConfig) -> OpticsResult<TwissTable> {
    twiss_ring(lattice, 0.0, config)
}

/// Periodic optics of the full ring at momentum offset `delta0`.
pub fn twiss_ring(lattice: &Lattice, delta0: f64, config: &TwissConfig) -> OpticsResult<TwissTable> {
    config.validate()?;
    if lattice.is_empty() {
        return Err(OpticsError::ConfigError(
            "cannot compute twiss of an empty lattice".to_string(),
        ));
    }
    let dc = config.delta_chrom;
    if !delta0.is_finite() || 1.0 + delta0 - dc <= 0.0 {
        return Err(OpticsError::ConfigError(format!(
            "delta0 must be finite and > -1 + delta_chrom, got {delta0}"
        )));
    }

    let center = periodic_solution(lattice, delta0, config)?;
    let (plus, minus) = rayon::join(
        || off_momentum(lattice, delta0 + dc, config),
        || off_momentum(lattice, delta0 - dc, config),
    );
    let (plus, minus) = (plus?, minus?);

    let n = lattice.len();
    let prop = propagate(
        lattice,
        0,
        n,
        center.orbit,
        Some([plus.orbit, minus.orbit]),
        dc,
        center.x,
        center.y,
    )?;

    let circumference = lattice.circumference();
    let dqx = (plus.qx - minus.qx) / (2.0 * dc);
    let dqy = (plus.qy - minus.qy) / (2.0 * dc);
    let momentum_compaction_factor = if circumference > 0.0 {
        Some(-(plus.zeta_slip - minus.zeta_slip) / (2.0 * dc * circumference))
    } else {
        None
    };

    info!(
        qx = prop.x.mu,
        qy = prop.y.mu,
        dqx,
        dqy,
        alpha_c = ?momentum_compaction_factor,
        elements = n,
        "ring twiss computed"
    );

    Ok(TwissTable {
        rows: prop.rows,
        qx: prop.x.mu,
        qy: prop.y.mu,
        dqx: Some(dqx),
        dqy: Some(dqy),
        momentum_compaction_factor,
        circumference,
        periodic: true,
        reference: *lattice.reference(),
        lattice_revision: lattice.revision(),
    })
}

/// Optics over `ele_start..ele_stop` from supplied initial conditions.
///
/// Rows run from `ele_start` to `ele_stop` inclusive, the last one at the
/// entrance of `ele_stop`. `qx, qy` are the phase advances over the range.
pub fn twiss_open(
    lattice: &Lattice,
    ele_start: &str,
    ele_stop: &str,
    init: &TwissInit,
    config: &TwissConfig,
) -> OpticsResult<TwissTable> {
    config.validate()?;
    init.validate()?;
    let start = lattice.index_of(ele_start)?;
    let stop = lattice.position_of(ele_stop)?;
    if stop < start {
        return Err(OpticsError::ConfigError(format!(
            "ele_stop '{ele_stop}' precedes ele_start '{ele_start}'"
        )));
    }
    let dc = config.delta_chrom;
    if 1.0 + init.particle.delta - dc <= 0.0 {
        return Err(OpticsError::ConfigError(format!(
            "init delta must be > -1 + delta_chrom, got {}",
            init.particle.delta
        )));
    }

    let shifted = |sign: f64| {
        let mut p = init.particle;
        p.x += sign * dc * init.dx;
        p.px += sign * dc * init.dpx;
        p.y += sign * dc * init.dy;
        p.py += sign * dc * init.dpy;
        p.delta += sign * dc;
        p
    };
    let x0 = PlaneOptics {
        beta: init.betx,
        alpha: init.alfx,
        mu: init.mux,
    };
    let y0 = PlaneOptics {
        beta: init.bety,
        alpha: init.alfy,
        mu: init.muy,
    };
    let prop = propagate(
        lattice,
        start,
        stop,
        init.particle,
        Some([shifted(1.0), shifted(-1.0)]),
        dc,
        x0,
        y0,
    )?;

    let s = lattice.s_positions();
    debug!(ele_start, ele_stop, rows = prop.rows.len(), "open-range twiss computed");

    Ok(TwissTable {
        rows: prop.rows,
        qx: prop.x.mu - init.mux,
        qy: prop.y.mu - init.muy,
        dqx: None,
        dqy: None,
        momentum_compaction_factor: None,
        circumference: s[stop] - s[start],
        periodic: false,
        reference: *lattice.reference(),
        lattice_revision: lattice.revision(),
    })
}
