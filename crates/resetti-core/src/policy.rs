//! Wall resource policies: concurrent-reset admission, CPU affinity
//! classes, and pointer-to-grid mapping.
//!
//! Pure functions over phase snapshots. The wall frontend owns the
//! lock/freeze flags and feeds them in.

use crate::types::{AffinityClass, InstancePhase, PhaseState};

/// Number of instances currently regenerating a world.
pub fn resetting_count(states: &[PhaseState]) -> usize {
    states.iter().filter(|s| s.phase.is_resetting()).count()
}

/// Whether the resetting count exceeds `cap`. A cap of 0 disables
/// admission control.
pub fn exceeds_reset_cap(states: &[PhaseState], cap: usize) -> bool {
    cap != 0 && resetting_count(states) > cap
}

/// Affinity class an instance should move to after a phase change.
///
/// `None` means keep the current class. `Ingame` is never reclassified
/// here: playing an instance assigns `Active` explicitly.
pub fn affinity_for(state: &PhaseState, locked: bool, low_threshold: u8) -> Option<AffinityClass> {
    match state.phase {
        InstancePhase::Ingame => None,
        phase if locked && phase != InstancePhase::Idle => Some(AffinityClass::High),
        InstancePhase::Generating => Some(AffinityClass::High),
        InstancePhase::Preview if state.progress >= low_threshold => Some(AffinityClass::Low),
        InstancePhase::Preview => None,
        InstancePhase::Idle => Some(AffinityClass::Idle),
        InstancePhase::Dirt => None,
    }
}

/// Layout of the instance grid shown on the wall projector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallGrid {
    pub columns: u32,
    pub rows: u32,
    pub count: usize,
}

impl WallGrid {
    /// Grid for `count` instances; `columns` defaults to ceil(sqrt(count)).
    pub fn new(count: usize, columns: Option<u32>) -> Self {
        let count_u32 = u32::try_from(count).unwrap_or(u32::MAX).max(1);
        let columns = columns
            .filter(|c| *c > 0)
            .unwrap_or_else(|| ceil_sqrt(count_u32))
            .min(count_u32);
        let rows = count_u32.div_ceil(columns);
        Self {
            columns,
            rows,
            count,
        }
    }

    /// Instance id under pointer `(x, y)` on a `width`x`height` projector.
    pub fn cell_at(&self, x: i32, y: i32, width: u32, height: u32) -> Option<usize> {
        if x < 0 || y < 0 || width == 0 || height == 0 {
            return None;
        }
        let (x, y) = (x as u32, y as u32);
        if x >= width || y >= height {
            return None;
        }
        let col = x / (width / self.columns).max(1);
        let row = y / (height / self.rows).max(1);
        if col >= self.columns || row >= self.rows {
            return None;
        }
        let id = (row * self.columns + col) as usize;
        (id < self.count).then_some(id)
    }
}

fn ceil_sqrt(n: u32) -> u32 {
    let mut root = 1;
    while root * root < n {
        root += 1;
    }
    root
}
