//! Instance registry and phase transition policy.
//!
//! Owns the mutable per-instance phase and the "which instance is active"
//! flag. Pure and deterministic: the clock is passed in, and any IO the
//! caller must perform (auto-pause macro, reset key) is returned as data.
//! Callers wrap the registry in a single lock and release it before doing
//! that IO.

use std::time::{Duration, Instant};

use crate::log_reader::{RawPhase, RawUpdate};
use crate::types::{InstancePhase, PhaseState};

/// Preview progress above which a reset is refused.
pub const MAX_RESET_PROGRESS: u8 = 85;

/// Offset added to every synthetic input timestamp so it lands after any
/// user input issued at the same moment.
pub const TIMESTAMP_OFFSET_MS: u32 = 20;

/// Result of applying a raw log update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub state: PhaseState,
    /// Whether phase or progress changed. Unchanged updates must not be
    /// forwarded downstream.
    pub changed: bool,
    /// The caller must send the F3+Escape pause macro to the instance.
    pub autopause: bool,
}

/// Which binding a reset must press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    /// Leave the WorldPreview screen.
    Preview,
    /// Atum "Create New World".
    World,
}

/// Why a reset was refused. Expected and frequent; not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetRejection {
    UnknownInstance,
    Dirt,
    NearlyGenerated { progress: u8 },
    GracePeriod { remaining: Duration },
}

/// What the caller must do for an accepted reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetPlan {
    pub kind: ResetKind,
    /// The instance was the active one and has been deactivated.
    pub was_active: bool,
}

#[derive(Debug, Clone)]
pub struct Registry {
    states: Vec<PhaseState>,
    /// Last synthetic input timestamp sent to each instance window.
    timestamps: Vec<u32>,
    active: Option<usize>,
    /// Minimum dwell time in Preview before a reset; `None` disables it.
    grace_period: Option<Duration>,
}

impl Registry {
    pub fn new(count: usize, grace_period: Option<Duration>) -> Self {
        Self {
            states: vec![PhaseState::default(); count],
            timestamps: vec![0; count],
            active: None,
            grace_period: grace_period.filter(|g| !g.is_zero()),
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state(&self, id: usize) -> Option<PhaseState> {
        self.states.get(id).copied()
    }

    /// Copy of every instance state, for IO done after the lock is released.
    pub fn snapshot(&self) -> Vec<PhaseState> {
        self.states.clone()
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    /// Apply a raw log update to instance `id`.
    ///
    /// Returns `None` for an unknown instance or a batch without information.
    pub fn apply_raw(&mut self, id: usize, raw: RawUpdate, now: Instant) -> Option<Applied> {
        if !raw.was_updated() {
            return None;
        }
        let is_active = self.active == Some(id);
        let current = *self.states.get(id)?;

        // A pause on the world being played (LAN, Escape) must never
        // demote the active session.
        if raw.phase == Some(RawPhase::World) && current.phase == InstancePhase::Ingame {
            return Some(Applied {
                state: current,
                changed: false,
                autopause: false,
            });
        }

        let phase = match raw.phase {
            None => current.phase,
            Some(RawPhase::Generating) => InstancePhase::Generating,
            Some(RawPhase::Preview) => InstancePhase::Preview,
            Some(RawPhase::Dirt) => InstancePhase::Dirt,
            Some(RawPhase::World) if is_active => InstancePhase::Ingame,
            Some(RawPhase::World) => InstancePhase::Idle,
        };
        let mut next = PhaseState {
            phase,
            progress: raw.progress.unwrap_or(current.progress).min(100),
            last_preview: current.last_preview,
        };
        if phase == InstancePhase::Preview && current.phase != InstancePhase::Preview {
            next.last_preview = Some(now);
        }

        let changed = next.phase != current.phase || next.progress != current.progress;
        if !changed {
            return Some(Applied {
                state: current,
                changed: false,
                autopause: false,
            });
        }
        self.states[id] = next;
        Some(Applied {
            state: next,
            changed: true,
            autopause: phase == InstancePhase::Idle && current.phase != InstancePhase::Idle,
        })
    }

    /// Decide whether instance `id` may be reset right now.
    pub fn check_reset(&self, id: usize, now: Instant) -> Result<ResetKind, ResetRejection> {
        let state = self.states.get(id).ok_or(ResetRejection::UnknownInstance)?;
        match state.phase {
            InstancePhase::Dirt => return Err(ResetRejection::Dirt),
            InstancePhase::Preview if state.progress > MAX_RESET_PROGRESS => {
                return Err(ResetRejection::NearlyGenerated {
                    progress: state.progress,
                });
            }
            _ => {}
        }
        if let (Some(grace), Some(entered)) = (self.grace_period, state.last_preview) {
            let elapsed = now.saturating_duration_since(entered);
            if elapsed < grace {
                return Err(ResetRejection::GracePeriod {
                    remaining: grace - elapsed,
                });
            }
        }
        Ok(match state.phase {
            InstancePhase::Preview => ResetKind::Preview,
            _ => ResetKind::World,
        })
    }

    /// Check and commit a reset.
    ///
    /// The instance is marked `Generating` at once so admission control
    /// counts it before the log catches up, and loses active status if it
    /// had it.
    pub fn begin_reset(&mut self, id: usize, now: Instant) -> Result<ResetPlan, ResetRejection> {
        let kind = self.check_reset(id, now)?;
        let was_active = self.active == Some(id);
        if was_active {
            self.active = None;
        }
        let state = &mut self.states[id];
        state.phase = InstancePhase::Generating;
        state.progress = 0;
        Ok(ResetPlan { kind, was_active })
    }

    /// Mark `id` as the active, in-game instance.
    ///
    /// Returns the previously active instance, which is demoted to `Idle`
    /// so that at most one instance is ever in game.
    pub fn play(&mut self, id: usize) -> Option<usize> {
        if id >= self.states.len() {
            return None;
        }
        let previous = self.active.filter(|prev| *prev != id);
        if let Some(prev) = previous {
            if self.states[prev].phase == InstancePhase::Ingame {
                self.states[prev].phase = InstancePhase::Idle;
            }
        }
        self.active = Some(id);
        self.states[id].phase = InstancePhase::Ingame;
        previous
    }

    /// Allocate a non-decreasing input timestamp for instance `id`.
    pub fn stamp(&mut self, id: usize, requested: u32) -> u32 {
        let Some(last) = self.timestamps.get_mut(id) else {
            return requested;
        };
        let stamped = requested.saturating_add(TIMESTAMP_OFFSET_MS).max(*last);
        *last = stamped;
        stamped
    }
}
