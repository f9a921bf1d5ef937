//! Turn-by-turn phase-space recorder.
//!
//! Buffers are sized at construction for `num_particles` and the turn window
//! `[start_at_turn, stop_at_turn]`; the tracker validates the ensemble size
//! and buffer shapes before it writes. Unrecorded cells hold 0.0, so readers
//! go through `recorded`.

use ndarray::{Array2, Array3, ArrayView2, Axis};
use optics_types::error::{OpticsError, OpticsResult};
use optics_types::state::PhaseSpace;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorPlacement {
    BeforeElement,
    AfterElement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coordinate {
    X = 0,
    Px = 1,
    Y = 2,
    Py = 3,
    Zeta = 4,
    Delta = 5,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MonitorData", into = "MonitorData")]
pub struct TurnByTurnMonitor {
    element: String,
    start_at_turn: usize,
    stop_at_turn: usize,
    num_particles: usize,
    placement: MonitorPlacement,
    /// (particle, turn slot, coordinate)
    data: Array3<f64>,
    recorded: Array2<bool>,
}

#[derive(Serialize, Deserialize)]
struct MonitorData {
    element: String,
    start_at_turn: usize,
    stop_at_turn: usize,
    num_particles: usize,
    placement: MonitorPlacement,
    data: Array3<f64>,
    recorded: Array2<bool>,
}

impl TryFrom<MonitorData> for TurnByTurnMonitor {
    type Error = OpticsError;

    fn try_from(d: MonitorData) -> OpticsResult<Self> {
        if d.stop_at_turn < d.start_at_turn {
            return Err(OpticsError::ConfigError(format!(
                "monitor '{}' window inverted: start {} > stop {}",
                d.element, d.start_at_turn, d.stop_at_turn
            )));
        }
        let monitor = TurnByTurnMonitor {
            element: d.element,
            start_at_turn: d.start_at_turn,
            stop_at_turn: d.stop_at_turn,
            num_particles: d.num_particles,
            placement: d.placement,
            data: d.data,
            recorded: d.recorded,
        };
        monitor.check_buffers()?;
        Ok(monitor)
    }
}

impl From<TurnByTurnMonitor> for MonitorData {
    fn from(m: TurnByTurnMonitor) -> Self {
        MonitorData {
            element: m.element,
            start_at_turn: m.start_at_turn,
            stop_at_turn: m.stop_at_turn,
            num_particles: m.num_particles,
            placement: m.placement,
            data: m.data,
            recorded: m.recorded,
        }
    }
}

impl TurnByTurnMonitor {
    pub fn new(
        element: &str,
        start_at_turn: usize,
        stop_at_turn: usize,
        num_particles: usize,
        placement: MonitorPlacement,
    ) -> OpticsResult<Self> {
        if stop_at_turn < start_at_turn {
            return Err(OpticsError::ConfigError(format!(
                "monitor '{element}' window inverted: start {start_at_turn} > stop {stop_at_turn}"
            )));
        }
        let capacity = stop_at_turn - start_at_turn + 1;
        Ok(TurnByTurnMonitor {
            element: element.to_string(),
            start_at_turn,
            stop_at_turn,
            num_particles,
            placement,
            data: Array3::zeros((num_particles, capacity, 6)),
            recorded: Array2::from_elem((num_particles, capacity), false),
        })
    }

    pub fn element(&self) -> &str {
        &self.element
    }

    pub fn placement(&self) -> MonitorPlacement {
        self.placement
    }

    pub fn start_at_turn(&self) -> usize {
        self.start_at_turn
    }

    pub fn stop_at_turn(&self) -> usize {
        self.stop_at_turn
    }

    pub fn num_particles(&self) -> usize {
        self.num_particles
    }

    pub fn capacity(&self) -> usize {
        self.stop_at_turn - self.start_at_turn + 1
    }

    /// Buffers must be `(num_particles, capacity, 6)` and
    /// `(num_particles, capacity)`.
    pub fn check_buffers(&self) -> OpticsResult<()> {
        let capacity = self.capacity();
        if self.data.dim() != (self.num_particles, capacity, 6)
            || self.recorded.dim() != (self.num_particles, capacity)
        {
            return Err(OpticsError::ConfigError(format!(
                "monitor '{}' buffers {:?}/{:?} do not fit {} particles x {} turns",
                self.element,
                self.data.dim(),
                self.recorded.dim(),
                self.num_particles,
                capacity
            )));
        }
        Ok(())
    }

    /// Buffer slot for an absolute turn, if inside the window.
    pub fn slot(&self, turn: usize) -> Option<usize> {
        (self.start_at_turn..=self.stop_at_turn)
            .contains(&turn)
            .then(|| turn - self.start_at_turn)
    }

    pub(crate) fn record(&mut self, particle: usize, slot: usize, state: &PhaseSpace) {
        for (k, v) in state.to_array().into_iter().enumerate() {
            self.data[[particle, slot, k]] = v;
        }
        self.recorded[[particle, slot]] = true;
    }

    /// (particle, turn slot) view of one coordinate; unrecorded cells are 0.0.
    pub fn coordinate(&self, coordinate: Coordinate) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(2), coordinate as usize)
    }

    pub fn recorded(&self) -> &Array2<bool> {
        &self.recorded
    }

    /// Recorded samples of one particle, in turn order.
    pub fn particle_series(&self, particle: usize, coordinate: Coordinate) -> Vec<f64> {
        if particle >= self.num_particles {
            return Vec::new();
        }
        (0..self.capacity())
            .filter(|&t| self.recorded[[particle, t]])
            .map(|t| self.data[[particle, t, coordinate as usize]])
            .collect()
    }
}
