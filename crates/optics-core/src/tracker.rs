// ─────────────────────────────────────────────────────────────────────
// LHC Optics Core — Tracking Engine
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Multi-turn element-by-element tracking with aperture losses.
//!
//! Particles are independent: each one is pushed through its full turn plan
//! on its own, optionally in parallel with rayon. Results do not depend on
//! the thread count.

use crate::lattice::Lattice;
use crate::monitor::{Coordinate, MonitorPlacement, TurnByTurnMonitor};
use crate::particles::{Particle, Particles};
use crate::twiss::TwissTable;
use optics_math::fft::fractional_tune;
use optics_types::config::TrackingConfig;
use optics_types::constants::C_LIGHT;
use optics_types::error::{OpticsError, OpticsResult};
use optics_types::state::PhaseSpace;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackOptions {
    pub num_turns: usize,
    pub ele_start: Option<String>,
    pub ele_stop: Option<String>,
}

impl TrackOptions {
    pub fn turns(num_turns: usize) -> Self {
        TrackOptions {
            num_turns,
            ..Default::default()
        }
    }

    pub fn from_element(mut self, name: &str) -> Self {
        self.ele_start = Some(name.to_string());
        self
    }

    pub fn until_element(mut self, name: &str) -> Self {
        self.ele_stop = Some(name.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossHotspot {
    pub index: usize,
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackReport {
    pub num_particles: usize,
    pub num_turns: usize,
    /// Cumulative number of lost particles at the end of each tracked turn.
    pub lost_per_turn: Vec<usize>,
    pub lost_fraction: f64,
    pub most_lossy_element: Option<LossHotspot>,
}

/// Element range of each turn, precomputed once per call.
struct TurnPlan {
    ranges: Vec<(usize, usize)>,
}

struct MonitorSite {
    element: usize,
    placement: MonitorPlacement,
    start: usize,
    stop: usize,
}

struct Sample {
    monitor: usize,
    slot: usize,
    state: PhaseSpace,
}

fn resolve_plan(lattice: &Lattice, options: &TrackOptions) -> OpticsResult<(usize, usize)> {
    let n = lattice.len();
    let start = match &options.ele_start {
        Some(name) => lattice.index_of(name)?,
        None => 0,
    };
    let stop = match &options.ele_stop {
        Some(name) => lattice.position_of(name)?,
        None => n,
    };
    if options.num_turns == 1 && stop <= start {
        return Err(OpticsError::ConfigError(format!(
            "single-turn tracking needs ele_stop after ele_start (start={start}, stop={stop})"
        )));
    }
    Ok((start, stop))
}

fn validate_monitors(
    lattice: &Lattice,
    monitors: &[TurnByTurnMonitor],
    num_particles: usize,
) -> OpticsResult<Vec<MonitorSite>> {
    monitors
        .iter()
        .map(|m| {
            if m.num_particles() != num_particles {
                return Err(OpticsError::ConfigError(format!(
                    "monitor '{}' sized for {} particles, ensemble has {}",
                    m.element(),
                    m.num_particles(),
                    num_particles
                )));
            }
            m.check_buffers()?;
            Ok(MonitorSite {
                element: lattice.index_of(m.element())?,
                placement: m.placement(),
                start: m.start_at_turn(),
                stop: m.stop_at_turn(),
            })
        })
        .collect()
}

fn aperture_ok(lattice: &Lattice, index: usize, state: &PhaseSpace, global: f64) -> bool {
    if !state.is_finite() || state.x.abs() > global || state.y.abs() > global {
        return false;
    }
    match lattice.elements()[index].aperture() {
        Some(poly) => poly.contains(state.x, state.y),
        None => true,
    }
}

fn sample(
    sites: &[MonitorSite],
    element: usize,
    placement: MonitorPlacement,
    turn: usize,
    state: &PhaseSpace,
    out: &mut Vec<Sample>,
) {
    for (monitor, site) in sites.iter().enumerate() {
        if site.element == element
            && site.placement == placement
            && (site.start..=site.stop).contains(&turn)
        {
            out.push(Sample {
                monitor,
                slot: turn - site.start,
                state: *state,
            });
        }
    }
}

fn track_one(
    lattice: &Lattice,
    particle: &mut Particle,
    plan: &TurnPlan,
    sites: &[MonitorSite],
    global_aperture: f64,
) -> Vec<Sample> {
    let mut samples = Vec::new();
    if !particle.alive {
        return samples;
    }
    let n = lattice.len();
    let elements = lattice.elements();
    let first_turn = particle.at_turn;
    for (k, &(lo, hi)) in plan.ranges.iter().enumerate() {
        let turn = first_turn + k;
        particle.at_turn = turn;
        for i in lo..hi {
            particle.at_element = i;
            sample(sites, i, MonitorPlacement::BeforeElement, turn, &particle.state, &mut samples);
            elements[i].track(&mut particle.state);
            if !aperture_ok(lattice, i, &particle.state, global_aperture) {
                particle.mark_lost(i, turn);
                return samples;
            }
            sample(sites, i, MonitorPlacement::AfterElement, turn, &particle.state, &mut samples);
        }
        particle.at_element = hi;
        if hi == n {
            particle.at_element = 0;
            particle.at_turn = turn + 1;
        }
    }
    samples
}

/// Track `particles` through `lattice` for `options.num_turns` turns.
///
/// Turn 0 starts at `ele_start`, every later turn starts at the first
/// element, and the last turn stops before `ele_stop`. Monitors are filled
/// at their element for every turn inside their window.
pub fn track(
    lattice: &Lattice,
    particles: &mut Particles,
    options: &TrackOptions,
    monitors: &mut [TurnByTurnMonitor],
    config: &TrackingConfig,
) -> OpticsResult<TrackReport> {
    config.validate()?;
    if options.num_turns == 0 {
        return Err(OpticsError::ConfigError(
            "num_turns must be >= 1".to_string(),
        ));
    }
    if lattice.is_empty() {
        return Err(OpticsError::ConfigError(
            "cannot track through an empty lattice".to_string(),
        ));
    }
    let (start, stop) = resolve_plan(lattice, options)?;
    let sites = validate_monitors(lattice, monitors, particles.len())?;

    let n = lattice.len();
    let first_turn = particles
        .iter()
        .filter(|p| p.alive)
        .map(|p| p.at_turn)
        .min()
        .unwrap_or(0);
    let ranges: Vec<(usize, usize)> = (0..options.num_turns)
        .map(|k| {
            let lo = if k == 0 { start } else { 0 };
            let hi = if k + 1 == options.num_turns { stop } else { n };
            (lo, hi.max(lo))
        })
        .collect();
    let plan = TurnPlan { ranges };
    let global = config.global_aperture_m;
    let lost_before = particles.num_lost();

    let samples: Vec<Vec<Sample>> = if particles.len() >= config.parallel_threshold {
        particles
            .as_mut_slice()
            .par_iter_mut()
            .map(|p| track_one(lattice, p, &plan, &sites, global))
            .collect()
    } else {
        particles
            .as_mut_slice()
            .iter_mut()
            .map(|p| track_one(lattice, p, &plan, &sites, global))
            .collect()
    };

    for (pidx, list) in samples.iter().enumerate() {
        for s in list {
            monitors[s.monitor].record(pidx, s.slot, &s.state);
        }
    }

    let s = lattice.s_positions();
    let path: f64 = plan.ranges.iter().map(|&(lo, hi)| s[hi] - s[lo]).sum();
    particles.t_ref_s += path / (particles.reference.beta0() * C_LIGHT);

    let lost_at: Vec<usize> = particles
        .iter()
        .filter_map(|p| p.lost_at_turn)
        .collect();
    let lost_per_turn: Vec<usize> = (0..options.num_turns)
        .map(|k| {
            let turn = first_turn + k;
            lost_at.iter().filter(|&&t| t <= turn).count().max(lost_before)
        })
        .collect();

    let most_lossy_element = particles
        .most_lossy_element()
        .map(|(index, count)| LossHotspot {
            index,
            name: lattice.name_at(index).unwrap_or("?").to_string(),
            count,
        });

    let report = TrackReport {
        num_particles: particles.len(),
        num_turns: options.num_turns,
        lost_per_turn,
        lost_fraction: particles.lost_fraction(),
        most_lossy_element,
    };
    info!(
        particles = report.num_particles,
        turns = report.num_turns,
        lost = particles.num_lost(),
        hotspot = ?report.most_lossy_element.as_ref().map(|h| h.name.as_str()),
        "tracking finished"
    );
    Ok(report)
}

/// Tunes from turn-by-turn tracking of one particle offset from the closed
/// orbit, as a cross-check of the Twiss tunes. Returns fractional tunes in
/// `[0, 0.5]`.
pub fn measure_tunes(
    lattice: &Lattice,
    twiss: &TwissTable,
    amplitude: (f64, f64),
    num_turns: usize,
    config: &TrackingConfig,
) -> OpticsResult<(f64, f64)> {
    if !twiss.periodic {
        return Err(OpticsError::ConfigError(
            "tune measurement needs a periodic twiss table".to_string(),
        ));
    }
    let first = lattice
        .name_at(0)
        .ok_or_else(|| OpticsError::ConfigError("empty lattice".to_string()))?
        .to_string();
    let mut state = twiss.particle_on_co();
    state.x += amplitude.0;
    state.y += amplitude.1;
    let mut particles = Particles::from_template(state, 1, twiss.reference)?;
    let mut monitor = [TurnByTurnMonitor::new(
        &first,
        0,
        num_turns.saturating_sub(1),
        1,
        MonitorPlacement::BeforeElement,
    )?];
    track(
        lattice,
        &mut particles,
        &TrackOptions::turns(num_turns),
        &mut monitor,
        config,
    )?;
    if particles.num_lost() > 0 {
        return Err(OpticsError::ConfigError(format!(
            "tune probe lost at element {:?} on turn {:?}",
            particles.as_slice()[0].lost_at_element,
            particles.as_slice()[0].lost_at_turn
        )));
    }
    let qx = fractional_tune(&monitor[0].particle_series(0, Coordinate::X))?;
    let qy = fractional_tune(&monitor[0].particle_series(0, Coordinate::Y))?;
    debug!(qx, qy, num_turns, "measured tunes");
    Ok((qx, qy))
}
