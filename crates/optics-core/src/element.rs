// ─────────────────────────────────────────────────────────────────────
// LHC Optics Core — Beamline Elements
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Element catalog and per-element maps.
//!
//! Coordinates are `(x, px, y, py, zeta, delta)` with `px, py` normalized
//! to the reference momentum, so the slope is `x' = px / (1 + delta)`.
//! Thick elements are hard-edge and chromatic; `Multipole` is a thin kick.

use crate::aperture::Polygon;
use optics_math::symplectic::{identity4, Matrix4};
use optics_types::error::{OpticsError, OpticsResult};
use optics_types::state::PhaseSpace;
use serde::{Deserialize, Serialize};

/// Below this |k| a thick lens is treated as a drift.
const MIN_FOCUSING: f64 = 1e-14;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ElementKind {
    Marker,
    Monitor,
    Drift { length: f64 },
    /// Normal quadrupole; `k1 > 0` focuses horizontally.
    Quadrupole { length: f64, k1: f64 },
    /// Sector dipole bending towards negative x for `angle > 0`.
    Bend { length: f64, angle: f64 },
    Multipole { k1l: f64, k2l: f64, hkick: f64, vkick: f64 },
}

/// Knob-settable element parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Slot {
    K1,
    K1L,
    K2L,
    HKick,
    VKick,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    kind: ElementKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aperture: Option<Polygon>,
}

impl Element {
    pub fn new(kind: ElementKind) -> Self {
        Element {
            kind,
            aperture: None,
        }
    }

    pub fn marker() -> Self {
        Self::new(ElementKind::Marker)
    }

    pub fn monitor() -> Self {
        Self::new(ElementKind::Monitor)
    }

    pub fn drift(length: f64) -> Self {
        Self::new(ElementKind::Drift { length })
    }

    pub fn quadrupole(length: f64, k1: f64) -> Self {
        Self::new(ElementKind::Quadrupole { length, k1 })
    }

    pub fn bend(length: f64, angle: f64) -> Self {
        Self::new(ElementKind::Bend { length, angle })
    }

    /// Thin orbit corrector.
    pub fn corrector(hkick: f64, vkick: f64) -> Self {
        Self::new(ElementKind::Multipole {
            k1l: 0.0,
            k2l: 0.0,
            hkick,
            vkick,
        })
    }

    pub fn sextupole(k2l: f64) -> Self {
        Self::new(ElementKind::Multipole {
            k1l: 0.0,
            k2l,
            hkick: 0.0,
            vkick: 0.0,
        })
    }

    /// Zero-length aperture element (chamber or obstacle cross-section).
    pub fn limit(polygon: Polygon) -> Self {
        Self::marker().with_aperture(polygon)
    }

    pub fn with_aperture(mut self, polygon: Polygon) -> Self {
        self.aperture = Some(polygon);
        self
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn aperture(&self) -> Option<&Polygon> {
        self.aperture.as_ref()
    }

    pub fn length(&self) -> f64 {
        match self.kind {
            ElementKind::Drift { length }
            | ElementKind::Quadrupole { length, .. }
            | ElementKind::Bend { length, .. } => length,
            ElementKind::Marker | ElementKind::Monitor | ElementKind::Multipole { .. } => 0.0,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            ElementKind::Marker if self.aperture.is_some() => "LimitPolygon",
            ElementKind::Marker => "Marker",
            ElementKind::Monitor => "Monitor",
            ElementKind::Drift { .. } => "Drift",
            ElementKind::Quadrupole { .. } => "Quadrupole",
            ElementKind::Bend { .. } => "Bend",
            ElementKind::Multipole { .. } => "Multipole",
        }
    }

    pub fn is_quadrupole(&self) -> bool {
        match self.kind {
            ElementKind::Quadrupole { .. } => true,
            ElementKind::Multipole { k1l, .. } => k1l != 0.0,
            _ => false,
        }
    }

    /// Check that lengths and strengths are usable.
    pub fn validate(&self) -> OpticsResult<()> {
        let finite = |label: &str, v: f64| -> OpticsResult<()> {
            if v.is_finite() {
                Ok(())
            } else {
                Err(OpticsError::ConfigError(format!(
                    "{} {label} must be finite, got {v}",
                    self.type_name()
                )))
            }
        };
        match self.kind {
            ElementKind::Marker | ElementKind::Monitor => {}
            ElementKind::Drift { length } => finite("length", length)?,
            ElementKind::Quadrupole { length, k1 } => {
                finite("length", length)?;
                finite("k1", k1)?;
            }
            ElementKind::Bend { length, angle } => {
                finite("length", length)?;
                finite("angle", angle)?;
                if angle != 0.0 && length <= 0.0 {
                    return Err(OpticsError::ConfigError(format!(
                        "Bend with angle {angle} needs length > 0, got {length}"
                    )));
                }
            }
            ElementKind::Multipole {
                k1l,
                k2l,
                hkick,
                vkick,
            } => {
                finite("k1l", k1l)?;
                finite("k2l", k2l)?;
                finite("hkick", hkick)?;
                finite("vkick", vkick)?;
            }
        }
        if self.length() < 0.0 {
            return Err(OpticsError::ConfigError(format!(
                "{} length must be >= 0, got {}",
                self.type_name(),
                self.length()
            )));
        }
        Ok(())
    }

    /// Current value of a knob-settable parameter, `None` if this element
    /// kind has no such slot.
    pub fn param(&self, slot: Slot) -> Option<f64> {
        match (&self.kind, slot) {
            (ElementKind::Quadrupole { k1, .. }, Slot::K1) => Some(*k1),
            (ElementKind::Multipole { k1l, .. }, Slot::K1L) => Some(*k1l),
            (ElementKind::Multipole { k2l, .. }, Slot::K2L) => Some(*k2l),
            (ElementKind::Multipole { hkick, .. }, Slot::HKick) => Some(*hkick),
            (ElementKind::Multipole { vkick, .. }, Slot::VKick) => Some(*vkick),
            _ => None,
        }
    }

    pub(crate) fn param_mut(&mut self, slot: Slot) -> Option<&mut f64> {
        match (&mut self.kind, slot) {
            (ElementKind::Quadrupole { k1, .. }, Slot::K1) => Some(k1),
            (ElementKind::Multipole { k1l, .. }, Slot::K1L) => Some(k1l),
            (ElementKind::Multipole { k2l, .. }, Slot::K2L) => Some(k2l),
            (ElementKind::Multipole { hkick, .. }, Slot::HKick) => Some(hkick),
            (ElementKind::Multipole { vkick, .. }, Slot::VKick) => Some(vkick),
            _ => None,
        }
    }

    /// Apply the element map in place.
    pub fn track(&self, p: &mut PhaseSpace) {
        match self.kind {
            ElementKind::Marker | ElementKind::Monitor => {}
            ElementKind::Drift { length } => track_drift(p, length),
            ElementKind::Quadrupole { length, k1 } => {
                let opd = 1.0 + p.delta;
                let bx = thick_block(k1 / opd, length, opd);
                let by = thick_block(-k1 / opd, length, opd);
                let (x, px) = apply_block(&bx, p.x, p.px);
                let (y, py) = apply_block(&by, p.y, p.py);
                p.x = x;
                p.px = px;
                p.y = y;
                p.py = py;
            }
            ElementKind::Bend { length, angle } => {
                if angle == 0.0 {
                    track_drift(p, length);
                    return;
                }
                let opd = 1.0 + p.delta;
                let h = angle / length;
                let x_p = p.delta / h;
                let w = h / opd.sqrt();
                let (s, c) = (w * length).sin_cos();
                let slope = p.px / opd;
                let x_int = x_p * length + (p.x - x_p) * s / w + slope * (1.0 - c) / (w * w);

                let bx = thick_block(h * h / opd, length, opd);
                let (xb, pxb) = apply_block(&bx, p.x - x_p, p.px);
                p.x = x_p + xb;
                p.px = pxb;
                p.y += length * p.py / opd;
                p.zeta -= h * x_int;
            }
            ElementKind::Multipole {
                k1l,
                k2l,
                hkick,
                vkick,
            } => {
                let (x, y) = (p.x, p.y);
                p.px += hkick - k1l * x - 0.5 * k2l * (x * x - y * y);
                p.py += vkick + k1l * y + k2l * x * y;
            }
        }
    }

    /// Jacobian of the transverse map at `p`, with `delta` held fixed.
    pub fn transverse_matrix(&self, p: &PhaseSpace) -> Matrix4 {
        let mut m = identity4();
        match self.kind {
            ElementKind::Marker | ElementKind::Monitor => {}
            ElementKind::Drift { length } => {
                let opd = 1.0 + p.delta;
                m[0][1] = length / opd;
                m[2][3] = length / opd;
            }
            ElementKind::Quadrupole { length, k1 } => {
                let opd = 1.0 + p.delta;
                set_block(&mut m, 0, &thick_block(k1 / opd, length, opd));
                set_block(&mut m, 1, &thick_block(-k1 / opd, length, opd));
            }
            ElementKind::Bend { length, angle } => {
                let opd = 1.0 + p.delta;
                if angle == 0.0 {
                    m[0][1] = length / opd;
                } else {
                    let h = angle / length;
                    set_block(&mut m, 0, &thick_block(h * h / opd, length, opd));
                }
                m[2][3] = length / opd;
            }
            ElementKind::Multipole { k1l, k2l, .. } => {
                m[1][0] = -k1l - k2l * p.x;
                m[1][2] = k2l * p.y;
                m[3][0] = k2l * p.y;
                m[3][2] = k1l + k2l * p.x;
            }
        }
        m
    }
}

fn track_drift(p: &mut PhaseSpace, length: f64) {
    let opd = 1.0 + p.delta;
    let xp = p.px / opd;
    let yp = p.py / opd;
    p.x += length * xp;
    p.y += length * yp;
    p.zeta -= 0.5 * length * (xp * xp + yp * yp);
}

/// Linear map of `u'' = -k u` over `length`, in `(u, pu)` with `pu = opd u'`.
fn thick_block(k: f64, length: f64, opd: f64) -> [[f64; 2]; 2] {
    if k > MIN_FOCUSING {
        let w = k.sqrt();
        let (s, c) = (w * length).sin_cos();
        [[c, s / (w * opd)], [-opd * w * s, c]]
    } else if k < -MIN_FOCUSING {
        let w = (-k).sqrt();
        let (s, c) = ((w * length).sinh(), (w * length).cosh());
        [[c, s / (w * opd)], [opd * w * s, c]]
    } else {
        [[1.0, length / opd], [0.0, 1.0]]
    }
}

fn apply_block(b: &[[f64; 2]; 2], u: f64, pu: f64) -> (f64, f64) {
    (b[0][0] * u + b[0][1] * pu, b[1][0] * u + b[1][1] * pu)
}

fn set_block(m: &mut Matrix4, plane: usize, b: &[[f64; 2]; 2]) {
    let r = 2 * plane;
    m[r][r] = b[0][0];
    m[r][r + 1] = b[0][1];
    m[r + 1][r] = b[1][0];
    m[r + 1][r + 1] = b[1][1];
}
