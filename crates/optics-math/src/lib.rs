//! Mathematical primitives for the LHC optics core.

pub mod fft;
pub mod linalg;
pub mod symplectic;
