//! Planar geometric layout of a beamline.
//!
//! `theta` is the heading in the horizontal plane, measured from +Z; a bend
//! with positive angle turns the reference orbit towards negative X.

use crate::element::ElementKind;
use crate::lattice::Lattice;
use optics_types::constants::END_POINT;
use optics_types::error::OpticsResult;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyRow {
    pub name: String,
    pub s: f64,
    pub x: f64,
    pub z: f64,
    pub theta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyTable {
    rows: Vec<SurveyRow>,
}

impl SurveyTable {
    pub fn rows(&self) -> &[SurveyRow] {
        &self.rows
    }

    pub fn row(&self, name: &str) -> Option<&SurveyRow> {
        self.rows.iter().find(|r| r.name == name)
    }

    /// Distance between the first and last rows.
    pub fn closure_error(&self) -> f64 {
        match (self.rows.first(), self.rows.last()) {
            (Some(a), Some(b)) => (b.x - a.x).hypot(b.z - a.z),
            _ => 0.0,
        }
    }

    /// Layout of a line surveyed in the opposite direction, expressed in the
    /// frame of the forward line. Rows are reversed and `s → s_total − s`.
    /// Like [`crate::twiss::TwissTable::reverse`], `x` is mirrored; the heading
    /// is mirrored and turned by π. Each row stays at the entrance of its
    /// element in the new direction of travel, so names shift by one row.
    pub fn reverse(&self) -> SurveyTable {
        let (s_first, s_last) = match (self.rows.first(), self.rows.last()) {
            (Some(a), Some(b)) => (a.s, b.s),
            _ => return self.clone(),
        };
        let n = self.rows.len();
        let names = self.rows[..n - 1]
            .iter()
            .rev()
            .map(|r| r.name.clone())
            .chain(std::iter::once(self.rows[n - 1].name.clone()));
        let rows = self
            .rows
            .iter()
            .rev()
            .zip(names)
            .map(|(r, name)| SurveyRow {
                name,
                s: s_first + s_last - r.s,
                x: -r.x,
                z: r.z,
                theta: -r.theta - PI,
            })
            .collect();
        SurveyTable { rows }
    }
}

/// Survey at every element entrance plus the end point. With `element0`,
/// the layout is moved so that element sits at the origin heading along +Z.
pub fn survey(lattice: &Lattice, element0: Option<&str>) -> OpticsResult<SurveyTable> {
    let mut rows = Vec::with_capacity(lattice.len() + 1);
    let (mut x, mut z, mut theta, mut s) = (0.0_f64, 0.0_f64, 0.0_f64, 0.0_f64);

    for (name, el) in lattice.element_names().iter().zip(lattice.elements()) {
        rows.push(SurveyRow {
            name: name.clone(),
            s,
            x,
            z,
            theta,
        });
        let length = el.length();
        let (dx_local, dz_local, dtheta) = match *el.kind() {
            ElementKind::Bend { angle, .. } if angle != 0.0 => {
                let rho = length / angle;
                (rho * (angle.cos() - 1.0), rho * angle.sin(), angle)
            }
            _ => (0.0, length, 0.0),
        };
        let (sin_t, cos_t) = theta.sin_cos();
        x += dx_local * cos_t + dz_local * sin_t;
        z += -dx_local * sin_t + dz_local * cos_t;
        theta -= dtheta;
        s += length;
    }
    rows.push(SurveyRow {
        name: END_POINT.to_string(),
        s,
        x,
        z,
        theta,
    });

    if let Some(name) = element0 {
        let origin = rows[lattice.index_of(name)?].clone();
        let (sin0, cos0) = origin.theta.sin_cos();
        for r in rows.iter_mut() {
            let (dx, dz) = (r.x - origin.x, r.z - origin.z);
            r.x = dx * cos0 - dz * sin0;
            r.z = dx * sin0 + dz * cos0;
            r.theta -= origin.theta;
        }
    }

    Ok(SurveyTable { rows })
}
