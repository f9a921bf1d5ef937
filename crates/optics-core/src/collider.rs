//! Multi-beamline container.
//!
//! Beamlines never share mutable state; a knob only crosses beams when it
//! has been linked explicitly.

use crate::lattice::Lattice;
use optics_types::error::{OpticsError, OpticsResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collider {
    lines: BTreeMap<String, Lattice>,
    #[serde(default)]
    linked_knobs: BTreeSet<String>,
}

impl Collider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_line(&mut self, name: &str, lattice: Lattice) -> OpticsResult<()> {
        if self.lines.contains_key(name) {
            return Err(OpticsError::DuplicateName(name.to_string()));
        }
        self.lines.insert(name.to_string(), lattice);
        Ok(())
    }

    pub fn line(&self, name: &str) -> OpticsResult<&Lattice> {
        self.lines.get(name).ok_or_else(|| OpticsError::NotFound {
            kind: "Beamline",
            name: name.to_string(),
        })
    }

    pub fn line_mut(&mut self, name: &str) -> OpticsResult<&mut Lattice> {
        self.lines.get_mut(name).ok_or_else(|| OpticsError::NotFound {
            kind: "Beamline",
            name: name.to_string(),
        })
    }

    pub fn line_names(&self) -> Vec<&str> {
        self.lines.keys().map(String::as_str).collect()
    }

    /// Make `name` a cross-beam knob. It must exist on at least one line.
    pub fn link_knob(&mut self, name: &str) -> OpticsResult<()> {
        if !self.lines.values().any(|l| l.has_knob(name)) {
            return Err(OpticsError::knob_not_found(name));
        }
        self.linked_knobs.insert(name.to_string());
        Ok(())
    }

    pub fn is_linked(&self, name: &str) -> bool {
        self.linked_knobs.contains(name)
    }

    /// Set a knob on `line`; a linked knob is also set on every other line
    /// that defines it. Returns the names of the lines that changed.
    pub fn set_knob(&mut self, line: &str, name: &str, value: f64) -> OpticsResult<Vec<String>> {
        self.line_mut(line)?.set_knob(name, value)?;
        let mut updated = vec![line.to_string()];
        if self.linked_knobs.contains(name) {
            for (other, lattice) in self.lines.iter_mut() {
                if other != line && lattice.has_knob(name) {
                    lattice.set_knob(name, value)?;
                    updated.push(other.clone());
                }
            }
            info!(knob = name, value, lines = ?updated, "linked knob set");
        }
        Ok(updated)
    }
}
