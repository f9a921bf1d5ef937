// ─────────────────────────────────────────────────────────────────────
// LHC Optics Core — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::constants::PROTON_MASS_EV;
use crate::error::{OpticsError, OpticsResult};
use serde::{Deserialize, Serialize};

/// Six-dimensional phase-space coordinates of one particle.
///
/// `px`, `py` are transverse momenta normalized to the reference momentum,
/// `zeta = s - beta0 c t` and `delta` is the relative momentum deviation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PhaseSpace {
    pub x: f64,
    pub px: f64,
    pub y: f64,
    pub py: f64,
    pub zeta: f64,
    pub delta: f64,
}

impl PhaseSpace {
    pub fn on_momentum(delta: f64) -> Self {
        PhaseSpace {
            delta,
            ..Default::default()
        }
    }

    pub fn to_array(&self) -> [f64; 6] {
        [self.x, self.px, self.y, self.py, self.zeta, self.delta]
    }

    pub fn from_array(a: [f64; 6]) -> Self {
        PhaseSpace {
            x: a[0],
            px: a[1],
            y: a[2],
            py: a[3],
            zeta: a[4],
            delta: a[5],
        }
    }

    /// Transverse part `(x, px, y, py)`.
    pub fn transverse(&self) -> [f64; 4] {
        [self.x, self.px, self.y, self.py]
    }

    pub fn set_transverse(&mut self, t: [f64; 4]) {
        self.x = t[0];
        self.px = t[1];
        self.y = t[2];
        self.py = t[3];
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// Reference particle: species and design momentum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ReferenceParticleData", into = "ReferenceParticleData")]
pub struct ReferenceParticle {
    pub mass0_ev: f64,
    pub p0c_ev: f64,
    pub q0: f64,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct ReferenceParticleData {
    mass0_ev: f64,
    p0c_ev: f64,
    q0: f64,
}

impl TryFrom<ReferenceParticleData> for ReferenceParticle {
    type Error = OpticsError;

    fn try_from(d: ReferenceParticleData) -> OpticsResult<Self> {
        ReferenceParticle::new(d.mass0_ev, d.p0c_ev, d.q0)
    }
}

impl From<ReferenceParticle> for ReferenceParticleData {
    fn from(p: ReferenceParticle) -> Self {
        ReferenceParticleData {
            mass0_ev: p.mass0_ev,
            p0c_ev: p.p0c_ev,
            q0: p.q0,
        }
    }
}

impl ReferenceParticle {
    pub fn new(mass0_ev: f64, p0c_ev: f64, q0: f64) -> OpticsResult<Self> {
        if !mass0_ev.is_finite() || mass0_ev <= 0.0 {
            return Err(OpticsError::ConfigError(
                "reference mass0_ev must be finite and > 0".to_string(),
            ));
        }
        if !p0c_ev.is_finite() || p0c_ev <= 0.0 {
            return Err(OpticsError::ConfigError(
                "reference p0c_ev must be finite and > 0".to_string(),
            ));
        }
        if !q0.is_finite() || q0 == 0.0 {
            return Err(OpticsError::ConfigError(
                "reference q0 must be finite and non-zero".to_string(),
            ));
        }
        Ok(ReferenceParticle {
            mass0_ev,
            p0c_ev,
            q0,
        })
    }

    pub fn proton(p0c_ev: f64) -> OpticsResult<Self> {
        Self::new(PROTON_MASS_EV, p0c_ev, 1.0)
    }

    pub fn energy0_ev(&self) -> f64 {
        (self.p0c_ev * self.p0c_ev + self.mass0_ev * self.mass0_ev).sqrt()
    }

    pub fn gamma0(&self) -> f64 {
        self.energy0_ev() / self.mass0_ev
    }

    pub fn beta0(&self) -> f64 {
        self.p0c_ev / self.energy0_ev()
    }

    /// `beta0 * gamma0`, the factor between normalized and geometric emittance.
    pub fn beta_gamma0(&self) -> f64 {
        self.p0c_ev / self.mass0_ev
    }
}
