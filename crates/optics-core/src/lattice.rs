// ─────────────────────────────────────────────────────────────────────
// LHC Optics Core — Lattice Model
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Ordered, name-addressable beamline with knob bindings.
//!
//! Element names are unique within a lattice. Every mutation bumps the
//! lattice revision so derived tables can detect that they are stale.

use crate::element::{Element, Slot};
use optics_types::constants::END_POINT;
use optics_types::error::{OpticsError, OpticsResult};
use optics_types::state::ReferenceParticle;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Where to place a new element.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertAt {
    Index(usize),
    Before(String),
    After(String),
}

/// One knob-to-parameter coupling: `param += coefficient * Δknob`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnobBinding {
    pub element: String,
    pub slot: Slot,
    pub coefficient: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Knob {
    pub value: f64,
    pub bindings: Vec<KnobBinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "LatticeData", into = "LatticeData")]
pub struct Lattice {
    reference: ReferenceParticle,
    names: Vec<String>,
    elements: Vec<Element>,
    index: HashMap<String, usize>,
    knobs: BTreeMap<String, Knob>,
    revision: u64,
}

/// Serialized form; the name index and revision are rebuilt on load.
#[derive(Serialize, Deserialize)]
struct LatticeData {
    reference: ReferenceParticle,
    elements: Vec<NamedElement>,
    #[serde(default)]
    knobs: BTreeMap<String, Knob>,
}

#[derive(Serialize, Deserialize)]
struct NamedElement {
    name: String,
    #[serde(flatten)]
    element: Element,
}

impl TryFrom<LatticeData> for Lattice {
    type Error = OpticsError;

    fn try_from(data: LatticeData) -> OpticsResult<Self> {
        let mut lattice = Lattice::new(data.reference);
        for entry in data.elements {
            lattice.push(entry.name, entry.element)?;
        }
        for (name, knob) in data.knobs {
            lattice.define_knob(&name, knob.value)?;
            for b in knob.bindings {
                lattice.bind_knob(&name, &b.element, b.slot, b.coefficient)?;
            }
        }
        lattice.revision = 0;
        Ok(lattice)
    }
}

impl From<Lattice> for LatticeData {
    fn from(lattice: Lattice) -> Self {
        LatticeData {
            reference: lattice.reference,
            elements: lattice
                .names
                .into_iter()
                .zip(lattice.elements)
                .map(|(name, element)| NamedElement { name, element })
                .collect(),
            knobs: lattice.knobs,
        }
    }
}

impl PartialEq for Lattice {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
            && self.names == other.names
            && self.elements == other.elements
            && self.knobs == other.knobs
    }
}

impl Lattice {
    pub fn new(reference: ReferenceParticle) -> Self {
        Lattice {
            reference,
            names: Vec::new(),
            elements: Vec::new(),
            index: HashMap::new(),
            knobs: BTreeMap::new(),
            revision: 0,
        }
    }

    pub fn from_elements<I, S>(reference: ReferenceParticle, elements: I) -> OpticsResult<Self>
    where
        I: IntoIterator<Item = (S, Element)>,
        S: Into<String>,
    {
        let mut lattice = Lattice::new(reference);
        for (name, element) in elements {
            lattice.push(name, element)?;
        }
        Ok(lattice)
    }

    pub fn reference(&self) -> &ReferenceParticle {
        &self.reference
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn element_names(&self) -> &[String] {
        &self.names
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Append at the end of the line.
    pub fn push(&mut self, name: impl Into<String>, element: Element) -> OpticsResult<usize> {
        let at = self.len();
        self.insert(InsertAt::Index(at), name, element)
    }

    pub fn insert(
        &mut self,
        at: InsertAt,
        name: impl Into<String>,
        element: Element,
    ) -> OpticsResult<usize> {
        let name = name.into();
        if name.is_empty() || name == END_POINT {
            return Err(OpticsError::ConfigError(format!(
                "element name '{name}' is reserved or empty"
            )));
        }
        if self.index.contains_key(&name) {
            return Err(OpticsError::DuplicateName(name));
        }
        element.validate()?;

        let position = match at {
            InsertAt::Index(i) => {
                if i > self.len() {
                    return Err(OpticsError::ConfigError(format!(
                        "insert index {i} out of range for lattice of {} elements",
                        self.len()
                    )));
                }
                i
            }
            InsertAt::Before(ref anchor) => self.index_of(anchor)?,
            InsertAt::After(ref anchor) => self.index_of(anchor)? + 1,
        };

        self.names.insert(position, name);
        self.elements.insert(position, element);
        self.reindex_from(position);
        self.revision += 1;
        Ok(position)
    }

    /// Remove an element; knob bindings that pointed at it are dropped.
    pub fn remove(&mut self, name: &str) -> OpticsResult<Element> {
        let position = self.index_of(name)?;
        self.index.remove(name);
        self.names.remove(position);
        let element = self.elements.remove(position);
        self.reindex_from(position);
        for knob in self.knobs.values_mut() {
            knob.bindings.retain(|b| b.element != name);
        }
        self.revision += 1;
        Ok(element)
    }

    fn reindex_from(&mut self, start: usize) {
        for (i, name) in self.names.iter().enumerate().skip(start) {
            self.index.insert(name.clone(), i);
        }
    }

    pub fn index_of(&self, name: &str) -> OpticsResult<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| OpticsError::element_not_found(name))
    }

    /// Like `index_of`, but also resolves the end-point marker to `len()`.
    pub fn position_of(&self, name: &str) -> OpticsResult<usize> {
        if name == END_POINT {
            Ok(self.len())
        } else {
            self.index_of(name)
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> OpticsResult<&Element> {
        Ok(&self.elements[self.index_of(name)?])
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn circumference(&self) -> f64 {
        self.elements.iter().map(Element::length).sum()
    }

    /// Entrance position of each element, plus the end point.
    pub fn s_positions(&self) -> Vec<f64> {
        let mut s = Vec::with_capacity(self.len() + 1);
        let mut acc = 0.0;
        s.push(acc);
        for el in &self.elements {
            acc += el.length();
            s.push(acc);
        }
        s
    }

    pub fn names_matching<F>(&self, predicate: F) -> Vec<String>
    where
        F: Fn(&str, &Element) -> bool,
    {
        self.names
            .iter()
            .zip(&self.elements)
            .filter(|(n, e)| predicate(n, e))
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Elements whose entrance lies within `half_width_m` of `center`'s
    /// entrance, measured around the ring.
    pub fn elements_within<F>(
        &self,
        center: &str,
        half_width_m: f64,
        predicate: F,
    ) -> OpticsResult<Vec<String>>
    where
        F: Fn(&str, &Element) -> bool,
    {
        if !half_width_m.is_finite() || half_width_m < 0.0 {
            return Err(OpticsError::ConfigError(format!(
                "half_width_m must be finite and >= 0, got {half_width_m}"
            )));
        }
        let s = self.s_positions();
        let s_center = s[self.index_of(center)?];
        let circumference = s[self.len()];
        Ok((0..self.len())
            .filter(|&i| {
                let d = (s[i] - s_center).abs();
                d.min(circumference - d) <= half_width_m
            })
            .filter(|&i| predicate(&self.names[i], &self.elements[i]))
            .map(|i| self.names[i].clone())
            .collect())
    }

    // ── Knobs ────────────────────────────────────────────────────────

    pub fn define_knob(&mut self, name: &str, value: f64) -> OpticsResult<()> {
        if self.knobs.contains_key(name) {
            return Err(OpticsError::DuplicateName(name.to_string()));
        }
        if !value.is_finite() {
            return Err(OpticsError::ConfigError(format!(
                "knob '{name}' value must be finite"
            )));
        }
        self.knobs.insert(
            name.to_string(),
            Knob {
                value,
                bindings: Vec::new(),
            },
        );
        Ok(())
    }

    /// Couple a knob to an element parameter. The current parameter value is
    /// taken as consistent with the current knob value.
    pub fn bind_knob(
        &mut self,
        knob: &str,
        element: &str,
        slot: Slot,
        coefficient: f64,
    ) -> OpticsResult<()> {
        let target = self.get(element)?;
        if target.param(slot).is_none() {
            return Err(OpticsError::InvalidBinding(format!(
                "{} '{element}' has no {slot:?} parameter",
                target.type_name()
            )));
        }
        if !coefficient.is_finite() {
            return Err(OpticsError::InvalidBinding(format!(
                "coefficient for '{knob}' -> '{element}' must be finite"
            )));
        }
        let entry = self
            .knobs
            .get_mut(knob)
            .ok_or_else(|| OpticsError::knob_not_found(knob))?;
        entry.bindings.push(KnobBinding {
            element: element.to_string(),
            slot,
            coefficient,
        });
        Ok(())
    }

    pub fn knob(&self, name: &str) -> OpticsResult<f64> {
        self.knobs
            .get(name)
            .map(|k| k.value)
            .ok_or_else(|| OpticsError::knob_not_found(name))
    }

    pub fn has_knob(&self, name: &str) -> bool {
        self.knobs.contains_key(name)
    }

    pub fn knob_names(&self) -> Vec<&str> {
        self.knobs.keys().map(String::as_str).collect()
    }

    pub fn set_knob(&mut self, name: &str, value: f64) -> OpticsResult<()> {
        if !value.is_finite() {
            return Err(OpticsError::ConfigError(format!(
                "knob '{name}' value must be finite, got {value}"
            )));
        }
        let knob = self
            .knobs
            .get_mut(name)
            .ok_or_else(|| OpticsError::knob_not_found(name))?;
        let change = value - knob.value;
        knob.value = value;
        for b in &knob.bindings {
            let Some(&i) = self.index.get(&b.element) else {
                continue;
            };
            if let Some(param) = self.elements[i].param_mut(b.slot) {
                *param += b.coefficient * change;
            }
        }
        self.revision += 1;
        debug!(knob = name, value, change, "knob set");
        Ok(())
    }

    /// Set an element parameter directly, bypassing knobs.
    pub fn set_param(&mut self, element: &str, slot: Slot, value: f64) -> OpticsResult<()> {
        if !value.is_finite() {
            return Err(OpticsError::ConfigError(format!(
                "{element}.{slot:?} must be finite, got {value}"
            )));
        }
        let i = self.index_of(element)?;
        let type_name = self.elements[i].type_name();
        let param = self.elements[i].param_mut(slot).ok_or_else(|| {
            OpticsError::InvalidBinding(format!("{type_name} '{element}' has no {slot:?} parameter"))
        })?;
        *param = value;
        self.revision += 1;
        Ok(())
    }
}
