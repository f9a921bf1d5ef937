// ─────────────────────────────────────────────────────────────────────
// LHC Optics Core — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Speed of light in vacuum (m/s)
pub const C_LIGHT: f64 = 299_792_458.0;

/// Proton rest energy (eV)
pub const PROTON_MASS_EV: f64 = 938.272_088_16e6;

/// LHC injection momentum (eV/c)
pub const LHC_INJECTION_P0C_EV: f64 = 450.0e9;

/// Name of the synthetic row appended after the last element.
pub const END_POINT: &str = "_end_point";
