//! Contact lifecycle events
//!
//! Narrowphase reports which body and shape pairs touched this step; diffing
//! that set against the previous step's yields begin/end transitions. Events
//! accumulate in a world-owned queue that the caller drains between steps,
//! so no callbacks run inside the solver.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::equations::ShapeRef;

/// A simulation event produced during `World::step`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// Two bodies started touching this step
    BeginContact { body_a: u32, body_b: u32 },
    /// Two previously touching bodies separated
    EndContact { body_a: u32, body_b: u32 },
    /// Two specific shapes started touching
    BeginShapeContact { shape_a: ShapeRef, shape_b: ShapeRef },
    /// Two previously touching shapes separated
    EndShapeContact { shape_a: ShapeRef, shape_b: ShapeRef },
    /// Per-body contact notification, fired every step a pair is in contact
    Collide { body: u32, other: u32, normal: Vec3 },
}

/// Tracks an overlap set across two steps and reports the difference.
///
/// Keys must be produced in canonical order by the caller; duplicates within
/// one step are fine and get collapsed.
#[derive(Debug)]
pub(crate) struct OverlapKeeper<K> {
    current: Vec<K>,
    previous: Vec<K>,
}

impl<K> Default for OverlapKeeper<K> {
    fn default() -> Self {
        Self {
            current: Vec::new(),
            previous: Vec::new(),
        }
    }
}

impl<K: Ord + Copy> OverlapKeeper<K> {
    pub fn observe(&mut self, key: K) {
        self.current.push(key);
    }

    /// Finish the step: report keys that appeared and keys that vanished,
    /// then make the current set the baseline for the next step.
    pub fn step_diff(&mut self, mut on_new: impl FnMut(K), mut on_gone: impl FnMut(K)) {
        self.current.sort_unstable();
        self.current.dedup();
        for key in &self.current {
            if self.previous.binary_search(key).is_err() {
                on_new(*key);
            }
        }
        for key in &self.previous {
            if self.current.binary_search(key).is_err() {
                on_gone(*key);
            }
        }
        std::mem::swap(&mut self.current, &mut self.previous);
        self.current.clear();
    }
}
