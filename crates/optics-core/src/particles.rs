// ─────────────────────────────────────────────────────────────────────
// LHC Optics Core — Particle Ensembles
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Macro-particle ensembles for tracking.
//!
//! A particle is alive until the tracker marks it lost; lost particles keep
//! their state at the loss point and are never tracked again.

use optics_types::error::{OpticsError, OpticsResult};
use optics_types::state::{PhaseSpace, ReferenceParticle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub state: PhaseSpace,
    pub alive: bool,
    /// Index of the next element to traverse.
    pub at_element: usize,
    pub at_turn: usize,
    pub lost_at_element: Option<usize>,
    pub lost_at_turn: Option<usize>,
}

impl Particle {
    pub fn new(state: PhaseSpace) -> Self {
        Particle {
            state,
            alive: true,
            at_element: 0,
            at_turn: 0,
            lost_at_element: None,
            lost_at_turn: None,
        }
    }

    pub(crate) fn mark_lost(&mut self, element: usize, turn: usize) {
        self.alive = false;
        self.lost_at_element = Some(element);
        self.lost_at_turn = Some(turn);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particles {
    particles: Vec<Particle>,
    pub reference: ReferenceParticle,
    /// Reference time of flight accumulated by tracking [s].
    pub t_ref_s: f64,
}

fn validate_state(state: &PhaseSpace, idx: usize) -> OpticsResult<()> {
    if !state.is_finite() {
        return Err(OpticsError::ConfigError(format!(
            "particle {idx} has non-finite coordinates"
        )));
    }
    if state.delta <= -1.0 {
        return Err(OpticsError::ConfigError(format!(
            "particle {idx} delta must be > -1, got {}",
            state.delta
        )));
    }
    Ok(())
}

impl Particles {
    pub fn new(states: Vec<PhaseSpace>, reference: ReferenceParticle) -> OpticsResult<Self> {
        for (i, s) in states.iter().enumerate() {
            validate_state(s, i)?;
        }
        Ok(Particles {
            particles: states.into_iter().map(Particle::new).collect(),
            reference,
            t_ref_s: 0.0,
        })
    }

    /// `num_particles` copies of one state.
    pub fn from_template(
        state: PhaseSpace,
        num_particles: usize,
        reference: ReferenceParticle,
    ) -> OpticsResult<Self> {
        Self::new(vec![state; num_particles], reference)
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Particle> {
        self.particles.get(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Particle> {
        self.particles.iter()
    }

    pub fn as_slice(&self) -> &[Particle] {
        &self.particles
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn states(&self) -> Vec<PhaseSpace> {
        self.particles.iter().map(|p| p.state).collect()
    }

    pub fn num_alive(&self) -> usize {
        self.particles.iter().filter(|p| p.alive).count()
    }

    pub fn num_lost(&self) -> usize {
        self.len() - self.num_alive()
    }

    pub fn lost_fraction(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.num_lost() as f64 / self.len() as f64
        }
    }

    /// Lost particles, in ensemble order.
    pub fn filter_lost(&self) -> Vec<&Particle> {
        self.particles.iter().filter(|p| !p.alive).collect()
    }

    /// Loss count per element index.
    pub fn losses_by_element(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for el in self.particles.iter().filter_map(|p| p.lost_at_element) {
            *counts.entry(el).or_insert(0) += 1;
        }
        counts
    }

    /// Element with the most losses; ties go to the lowest index.
    pub fn most_lossy_element(&self) -> Option<(usize, usize)> {
        self.losses_by_element()
            .into_iter()
            .fold(None, |best, (el, count)| match best {
                Some((_, c)) if c >= count => best,
                _ => Some((el, count)),
            })
    }
}
