//! Profile configuration loaded from TOML.
//!
//! Profiles live at `$XDG_CONFIG_HOME/resetti/<name>.toml`. Every field has
//! a default so an empty file is a valid (if not very useful) profile.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::action::ActionList;
use crate::bind::Bind;
use crate::error::{BindError, ConfigError};

pub const MAX_POLL_RATE: u32 = 1000;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    /// File holding the running reset count. Counting is off without it.
    #[serde(default)]
    pub reset_count: Option<PathBuf>,
    /// Input polling rate in Hz.
    #[serde(default = "default_poll_rate")]
    pub poll_rate: u32,
    /// Press Escape when playing an instance to unpause it.
    #[serde(default = "default_true")]
    pub unpause_focus: bool,
    #[serde(default)]
    pub obs: ObsConfig,
    #[serde(default)]
    pub wall: WallConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
    #[serde(default)]
    pub keybinds: Vec<KeybindDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_obs_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WallConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Minimum time in Preview before a wall reset is accepted.
    #[serde(default)]
    pub grace_period_ms: u64,
    /// After resetting the played instance, jump to an idle locked one.
    #[serde(default)]
    pub goto_locked: bool,
    /// Press F1 (hide HUD) when playing an instance with `unpause_focus`.
    #[serde(default)]
    pub use_f1: bool,
    #[serde(default)]
    pub stretch_windows: bool,
    /// Geometry used while an instance is shown on the wall.
    #[serde(default = "default_stretch")]
    pub stretch: Rect,
    /// Geometry used while an instance is played.
    #[serde(default = "default_unstretch")]
    pub unstretch: Rect,
    /// Window name of the OBS projector showing the wall scene.
    #[serde(default = "default_projector")]
    pub projector: String,
    /// Grid columns; defaults to ceil(sqrt(instances)).
    #[serde(default)]
    pub columns: Option<u32>,
    #[serde(default)]
    pub perf: PerfConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerfConfig {
    /// Suspend instances that sit idle on the wall.
    #[serde(default)]
    pub freeze_idle: bool,
    #[serde(default = "default_freeze_delay_ms")]
    pub freeze_delay_ms: u64,
    /// Maximum instances regenerating at once; 0 disables the cap.
    #[serde(default)]
    pub concurrent_resets: usize,
    #[serde(default = "default_force_freeze_delay_ms")]
    pub force_freeze_delay_ms: u64,
    /// Preview progress at which an instance drops to the low class.
    #[serde(default = "default_low_threshold")]
    pub low_threshold: u8,
    #[serde(default)]
    pub affinity: Option<AffinityConfig>,
}

/// CPU indices for each affinity class.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AffinityConfig {
    pub idle: Vec<usize>,
    pub low: Vec<usize>,
    pub high: Vec<usize>,
    pub active: Vec<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HooksConfig {
    pub reset: Option<String>,
    pub wall_play: Option<String>,
    pub wall_reset: Option<String>,
    pub wall_lock: Option<String>,
    pub wall_unlock: Option<String>,
}

/// A keybind as written in the profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeybindDef {
    pub bind: String,
    #[serde(default)]
    pub ingame: Vec<String>,
    #[serde(default)]
    pub wall: Vec<String>,
}

/// A parsed keybind with its actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keybind {
    pub bind: Bind,
    pub actions: ActionList,
}

fn default_poll_rate() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

fn default_obs_port() -> u16 {
    4455
}

fn default_projector() -> String {
    "Projector".to_string()
}

fn default_stretch() -> Rect {
    Rect {
        x: 0,
        y: 0,
        w: 1920,
        h: 300,
    }
}

fn default_unstretch() -> Rect {
    Rect {
        x: 0,
        y: 0,
        w: 1920,
        h: 1080,
    }
}

fn default_freeze_delay_ms() -> u64 {
    500
}

fn default_force_freeze_delay_ms() -> u64 {
    500
}

fn default_low_threshold() -> u8 {
    50
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_obs_port(),
            password: None,
        }
    }
}

impl Default for WallConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            grace_period_ms: 0,
            goto_locked: false,
            use_f1: false,
            stretch_windows: false,
            stretch: default_stretch(),
            unstretch: default_unstretch(),
            projector: default_projector(),
            columns: None,
            perf: PerfConfig::default(),
        }
    }
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            freeze_idle: false,
            freeze_delay_ms: default_freeze_delay_ms(),
            concurrent_resets: 0,
            force_freeze_delay_ms: default_force_freeze_delay_ms(),
            low_threshold: default_low_threshold(),
            affinity: None,
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            reset_count: None,
            poll_rate: default_poll_rate(),
            unpause_focus: true,
            obs: ObsConfig::default(),
            wall: WallConfig::default(),
            hooks: HooksConfig::default(),
            keybinds: Vec::new(),
        }
    }
}

impl Profile {
    /// Read, parse and validate a profile file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let profile: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_POLL_RATE).contains(&self.poll_rate) {
            return Err(ConfigError::Invalid(format!(
                "poll_rate must be within 1..={MAX_POLL_RATE}, got {}",
                self.poll_rate
            )));
        }
        if self.wall.enabled && !self.obs.enabled {
            return Err(ConfigError::Invalid(
                "wall mode requires obs.enabled".to_string(),
            ));
        }
        if self.wall.perf.low_threshold > 100 {
            return Err(ConfigError::Invalid(
                "wall.perf.low_threshold is a percentage".to_string(),
            ));
        }
        if let Some(aff) = &self.wall.perf.affinity {
            for (name, cpus) in [
                ("idle", &aff.idle),
                ("low", &aff.low),
                ("high", &aff.high),
                ("active", &aff.active),
            ] {
                if cpus.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "wall.perf.affinity.{name} has no cpus"
                    )));
                }
            }
        }
        self.keybinds()?;
        Ok(())
    }

    /// Parse every keybind and its actions, in declaration order.
    pub fn keybinds(&self) -> Result<Vec<Keybind>, ConfigError> {
        self.keybinds
            .iter()
            .map(|def| {
                let keybind_err = |source: BindError| ConfigError::Keybind {
                    bind: def.bind.clone(),
                    source,
                };
                let bind: Bind = def.bind.parse().map_err(keybind_err)?;
                let actions = ActionList::parse(&def.ingame, &def.wall).map_err(keybind_err)?;
                Ok(Keybind { bind, actions })
            })
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.poll_rate.max(1)))
    }

    pub fn grace_period(&self) -> Option<Duration> {
        (self.wall.enabled && self.wall.grace_period_ms > 0)
            .then(|| Duration::from_millis(self.wall.grace_period_ms))
    }
}

/// Path of the named profile under the user config directory.
pub fn profile_path(name: &str) -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("resetti").join(format!("{name}.toml")))
}

fn config_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(|home| PathBuf::from(home).join(".config"))
        .ok_or(ConfigError::NoConfigDir)
}
