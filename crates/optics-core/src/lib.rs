// ─────────────────────────────────────────────────────────────────────
// LHC Optics Core
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Beam-optics engine for circular colliders.
//!
//! Lattice model and knobs, periodic and open-range Twiss, survey,
//! multi-turn tracking with aperture losses, and orbit-bump matching.

pub mod aperture;
pub mod bunch;
pub mod collider;
pub mod element;
pub mod fodo;
pub mod jacobian;
pub mod lattice;
pub mod matching;
pub mod monitor;
pub mod particles;
pub mod survey;
pub mod tracker;
pub mod twiss;
