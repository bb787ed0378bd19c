use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use crate::error::BindError;

/// X11 window identifier.
pub type WindowHandle = u32;

// ─── Keys ─────────────────────────────────────────────────────────

/// An X11 keycode (evdev code + 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key(pub u8);

/// Named keys understood in profiles and in `options.txt`. Lowercase.
const KEY_NAMES: &[(&str, u8)] = &[
    ("escape", 9),
    ("esc", 9),
    ("1", 10),
    ("2", 11),
    ("3", 12),
    ("4", 13),
    ("5", 14),
    ("6", 15),
    ("7", 16),
    ("8", 17),
    ("9", 18),
    ("0", 19),
    ("minus", 20),
    ("equal", 21),
    ("backspace", 22),
    ("tab", 23),
    ("q", 24),
    ("w", 25),
    ("e", 26),
    ("r", 27),
    ("t", 28),
    ("y", 29),
    ("u", 30),
    ("i", 31),
    ("o", 32),
    ("p", 33),
    ("return", 36),
    ("enter", 36),
    ("ctrl", 37),
    ("control", 37),
    ("a", 38),
    ("s", 39),
    ("d", 40),
    ("f", 41),
    ("g", 42),
    ("h", 43),
    ("j", 44),
    ("k", 45),
    ("l", 46),
    ("grave", 49),
    ("shift", 50),
    ("z", 52),
    ("x", 53),
    ("c", 54),
    ("v", 55),
    ("b", 56),
    ("n", 57),
    ("m", 58),
    ("alt", 64),
    ("space", 65),
    ("f1", 67),
    ("f2", 68),
    ("f3", 69),
    ("f4", 70),
    ("f5", 71),
    ("f6", 72),
    ("f7", 73),
    ("f8", 74),
    ("f9", 75),
    ("f10", 76),
    ("f11", 95),
    ("f12", 96),
    ("super", 133),
];

impl Key {
    pub const ESCAPE: Self = Self(9);
    pub const F1: Self = Self(67);
    pub const F3: Self = Self(69);
    pub const F6: Self = Self(72);
    pub const H: Self = Self(43);

    /// Look up a key by name (`"F6"`, `"shift"`, `"code24"`). Case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        if let Some(raw) = lower.strip_prefix("code") {
            return raw.parse::<u8>().ok().filter(|c| *c >= 8).map(Self);
        }
        KEY_NAMES
            .iter()
            .find(|(n, _)| *n == lower)
            .map(|(_, code)| Self(*code))
    }

    pub fn code(self) -> u8 {
        self.0
    }
}

impl FromStr for Key {
    type Err = BindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| BindError::UnknownKey(s.to_string()))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match KEY_NAMES.iter().find(|(_, code)| *code == self.0) {
            Some((name, _)) => f.write_str(name),
            None => write!(f, "code{}", self.0),
        }
    }
}

// ─── Phase ────────────────────────────────────────────────────────

/// Coarse lifecycle state of an instance.
///
/// The variants are not ordered by value; which transitions are legal is
/// decided by the registry and the reset policy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstancePhase {
    #[default]
    Idle,
    Generating,
    Preview,
    Ingame,
    /// The world was left and is being saved; resetting now would be lost.
    Dirt,
}

impl InstancePhase {
    pub const ALL: [Self; 5] = [
        Self::Idle,
        Self::Generating,
        Self::Preview,
        Self::Ingame,
        Self::Dirt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Generating => "generating",
            Self::Preview => "preview",
            Self::Ingame => "ingame",
            Self::Dirt => "dirt",
        }
    }

    /// Whether the instance is regenerating a world (counts toward the
    /// concurrent reset cap).
    pub fn is_resetting(self) -> bool {
        matches!(self, Self::Generating | Self::Preview)
    }
}

impl fmt::Display for InstancePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase plus the auxiliary fields derived from the log.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PhaseState {
    pub phase: InstancePhase,
    /// World generation progress in percent (0..=100).
    pub progress: u8,
    /// When the instance last entered `Preview` from another phase.
    pub last_preview: Option<Instant>,
}

impl PhaseState {
    pub fn new(phase: InstancePhase) -> Self {
        Self {
            phase,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress.min(100);
        self
    }
}

// ─── Instance ─────────────────────────────────────────────────────

/// Immutable metadata for a discovered instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    /// Dense, zero-based instance id.
    pub id: usize,
    pub pid: u32,
    pub wid: WindowHandle,
    pub dir: PathBuf,
    /// Minor game version (`16` for 1.16.1).
    pub version: u32,
    /// Atum "Create New World" key.
    pub reset_key: Key,
    /// WorldPreview "Leave Preview" key.
    pub preview_key: Key,
}

impl InstanceInfo {
    /// Path of the log file tailed for state detection.
    pub fn log_path(&self) -> PathBuf {
        log_path_for(&self.dir)
    }
}

pub fn log_path_for(dir: &Path) -> PathBuf {
    dir.join("logs").join("latest.log")
}

/// A phase change produced by the event coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Update {
    pub id: usize,
    pub state: PhaseState,
}

// ─── Affinity ─────────────────────────────────────────────────────

/// CPU core-mask tier applied to an instance process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AffinityClass {
    Idle,
    Low,
    High,
    Active,
}

impl AffinityClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Low => "low",
            Self::High => "high",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for AffinityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
