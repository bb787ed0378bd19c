//! Error types for the pure core.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BindError {
    #[error("unknown key: {0}")]
    UnknownKey(String),

    #[error("unknown mouse button: {0}")]
    UnknownButton(String),

    #[error("empty keybind")]
    Empty,

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("action {action} takes an instance number from 1, got {value}")]
    InvalidActionTarget { action: String, value: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read profile {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse profile {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("keybind {bind:?}: {source}")]
    Keybind { bind: String, source: BindError },

    #[error("invalid profile: {0}")]
    Invalid(String),

    #[error("no config directory (set XDG_CONFIG_HOME or HOME)")]
    NoConfigDir,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("no instances found")]
    NoInstances,

    #[error("no instance with id 0")]
    NoInstanceZero,

    #[error("instances do not have sequential ids (expected {expected}, found {found})")]
    NonSequential { expected: usize, found: usize },

    #[error("options.txt binds {option} to unknown key {value:?}")]
    UnknownOptionKey { option: String, value: String },
}

/// Umbrella error for callers that do not care which core step failed.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("log reader io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by a window, scene, or process collaborator.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{tool} failed: {message}")]
    Command { tool: String, message: String },

    #[error("unexpected output from {tool}: {output:?}")]
    Parse { tool: String, output: String },

    #[error("no window named {0:?}")]
    WindowNotFound(String),

    #[error("process {pid}: {source}")]
    Process { pid: u32, source: std::io::Error },

    #[error("scene backend disconnected")]
    Disconnected,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
