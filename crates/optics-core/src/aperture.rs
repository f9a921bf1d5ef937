// ─────────────────────────────────────────────────────────────────────
// LHC Optics Core — Aperture Polygons
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Transverse aperture boundaries.
//!
//! A polygon is a closed, simple, possibly non-convex boundary in the
//! `(x, y)` plane. Points on an edge count as inside.

use optics_types::error::{OpticsError, OpticsResult};
use serde::{Deserialize, Serialize};

/// Relative collinearity tolerance for the on-edge test.
const ON_EDGE_REL_TOL: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PolygonData", into = "PolygonData")]
pub struct Polygon {
    x_vertices: Vec<f64>,
    y_vertices: Vec<f64>,
}

/// Serialized form; restored polygons go through [`Polygon::new`].
#[derive(Serialize, Deserialize)]
struct PolygonData {
    x_vertices: Vec<f64>,
    y_vertices: Vec<f64>,
}

impl TryFrom<PolygonData> for Polygon {
    type Error = OpticsError;

    fn try_from(data: PolygonData) -> OpticsResult<Self> {
        Polygon::new(data.x_vertices, data.y_vertices)
    }
}

impl From<Polygon> for PolygonData {
    fn from(polygon: Polygon) -> Self {
        PolygonData {
            x_vertices: polygon.x_vertices,
            y_vertices: polygon.y_vertices,
        }
    }
}

impl Polygon {
    /// Build from separate vertex arrays, as delivered by aperture loaders.
    pub fn new(x_vertices: Vec<f64>, y_vertices: Vec<f64>) -> OpticsResult<Self> {
        if x_vertices.len() != y_vertices.len() {
            return Err(OpticsError::InvalidPolygon(format!(
                "vertex array length mismatch: x={}, y={}",
                x_vertices.len(),
                y_vertices.len()
            )));
        }
        let n = x_vertices.len();
        if n < 3 {
            return Err(OpticsError::InvalidPolygon(format!(
                "polygon needs at least 3 vertices, got {n}"
            )));
        }
        for i in 0..n {
            if !x_vertices[i].is_finite() || !y_vertices[i].is_finite() {
                return Err(OpticsError::InvalidPolygon(format!(
                    "vertex {i} is not finite"
                )));
            }
        }
        for i in 0..n {
            let j = (i + 1) % n;
            if x_vertices[i] == x_vertices[j] && y_vertices[i] == y_vertices[j] {
                return Err(OpticsError::InvalidPolygon(format!(
                    "vertices {i} and {j} coincide, edge has zero length"
                )));
            }
        }
        Ok(Polygon {
            x_vertices,
            y_vertices,
        })
    }

    pub fn from_points(points: &[(f64, f64)]) -> OpticsResult<Self> {
        let (xs, ys) = points.iter().copied().unzip();
        Self::new(xs, ys)
    }

    /// Axis-aligned rectangle centred on `(x0, y0)`.
    pub fn rectangle(x0: f64, y0: f64, half_width: f64, half_height: f64) -> OpticsResult<Self> {
        Self::from_points(&[
            (x0 - half_width, y0 - half_height),
            (x0 + half_width, y0 - half_height),
            (x0 + half_width, y0 + half_height),
            (x0 - half_width, y0 + half_height),
        ])
    }

    pub fn len(&self) -> usize {
        self.x_vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x_vertices.is_empty()
    }

    pub fn x_vertices(&self) -> &[f64] {
        &self.x_vertices
    }

    pub fn y_vertices(&self) -> &[f64] {
        &self.y_vertices
    }

    /// Signed shoelace area; positive for counter-clockwise vertex order.
    pub fn signed_area(&self) -> f64 {
        let n = self.len();
        let mut acc = 0.0;
        for i in 0..n {
            let j = (i + 1) % n;
            acc += self.x_vertices[i] * self.y_vertices[j] - self.x_vertices[j] * self.y_vertices[i];
        }
        0.5 * acc
    }

    /// Closed-region point test: crossing number, with edges counted inside.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        if !x.is_finite() || !y.is_finite() {
            return false;
        }
        let n = self.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = (self.x_vertices[i], self.y_vertices[i]);
            let (xj, yj) = (self.x_vertices[j], self.y_vertices[j]);

            if on_segment(x, y, xj, yj, xi, yi) {
                return true;
            }
            if (yi > y) != (yj > y) {
                let x_cross = xi + (y - yi) * (xj - xi) / (yj - yi);
                if x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

fn on_segment(px: f64, py: f64, ax: f64, ay: f64, bx: f64, by: f64) -> bool {
    let ex = bx - ax;
    let ey = by - ay;
    let len2 = ex * ex + ey * ey;
    let cross = ex * (py - ay) - ey * (px - ax);
    if cross.abs() > ON_EDGE_REL_TOL * len2 {
        return false;
    }
    let t = (px - ax) * ex + (py - ay) * ey;
    (0.0..=len2).contains(&t)
}
