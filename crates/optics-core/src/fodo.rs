//! Reference FODO ring used for commissioning studies, benches and tests.
//!
//! Each cell is `QF CORR BPM SEXT D MB D QD CORR BPM SEXT D MB D`; the bend
//! angles of all cells sum to 2π. Markers `ip1` and `ip5` sit at the start of
//! the first cell and of the middle cell.

use crate::element::Element;
use crate::lattice::Lattice;
use optics_types::error::{OpticsError, OpticsResult};
use optics_types::state::ReferenceParticle;
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FodoRingSpec {
    pub cells: usize,
    pub quad_length: f64,
    pub k1: f64,
    pub bend_length: f64,
    pub drift_length: f64,
    pub k2l_focusing: f64,
    pub k2l_defocusing: f64,
}

impl Default for FodoRingSpec {
    fn default() -> Self {
        FodoRingSpec {
            cells: 16,
            quad_length: 1.0,
            k1: 0.165,
            bend_length: 6.0,
            drift_length: 0.5,
            k2l_focusing: 0.0,
            k2l_defocusing: 0.0,
        }
    }
}

impl FodoRingSpec {
    pub fn cell_length(&self) -> f64 {
        2.0 * self.quad_length + 4.0 * self.drift_length + 2.0 * self.bend_length
    }

    pub fn build(&self, reference: ReferenceParticle) -> OpticsResult<Lattice> {
        if self.cells < 2 {
            return Err(OpticsError::ConfigError(format!(
                "FODO ring needs at least 2 cells, got {}",
                self.cells
            )));
        }
        let angle = 2.0 * PI / (2 * self.cells) as f64;
        let mut lat = Lattice::new(reference);
        for i in 0..self.cells {
            if i == 0 {
                lat.push("ip1", Element::marker())?;
            }
            if i == self.cells / 2 {
                lat.push("ip5", Element::marker())?;
            }
            lat.push(format!("qf.{i}"), Element::quadrupole(self.quad_length, self.k1))?;
            lat.push(format!("mcb.{i}f"), Element::corrector(0.0, 0.0))?;
            lat.push(format!("bpm.{i}f"), Element::monitor())?;
            lat.push(format!("ms.{i}f"), Element::sextupole(self.k2l_focusing))?;
            lat.push(format!("d1.{i}"), Element::drift(self.drift_length))?;
            lat.push(format!("mb.{i}a"), Element::bend(self.bend_length, angle))?;
            lat.push(format!("d2.{i}"), Element::drift(self.drift_length))?;
            lat.push(format!("qd.{i}"), Element::quadrupole(self.quad_length, -self.k1))?;
            lat.push(format!("mcb.{i}d"), Element::corrector(0.0, 0.0))?;
            lat.push(format!("bpm.{i}d"), Element::monitor())?;
            lat.push(format!("ms.{i}d"), Element::sextupole(self.k2l_defocusing))?;
            lat.push(format!("d3.{i}"), Element::drift(self.drift_length))?;
            lat.push(format!("mb.{i}b"), Element::bend(self.bend_length, angle))?;
            lat.push(format!("d4.{i}"), Element::drift(self.drift_length))?;
        }
        Ok(lat)
    }
}
