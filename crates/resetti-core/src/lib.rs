//! resetti-core: instance phases, log-driven state detection, and the
//! pure policies (reset legality, admission control, CPU affinity, input
//! resolution) behind the resetti runtime.
//!
//! Nothing in this crate performs window, protocol, or process IO; the
//! collaborator contracts live in [`backend`] and are implemented by the
//! `resetti-x11`, `resetti-obs`, and `resetti-runtime` crates.

pub mod action;
pub mod backend;
pub mod bind;
pub mod config;
pub mod discovery;
pub mod error;
pub mod log_reader;
pub mod policy;
pub mod registry;
pub mod types;

pub use action::{Action, ActionList};
pub use backend::{ProcessControl, SceneBackend, WindowBackend};
pub use bind::{Bind, Input, InputResolver, Keymap, PointerState, resolve_bind};
pub use config::{Keybind, Profile, Rect};
pub use error::{BackendError, BindError, ConfigError, CoreError, DiscoveryError};
pub use log_reader::{RawPhase, RawUpdate, StateReader};
pub use policy::WallGrid;
pub use registry::{Applied, Registry, ResetKind, ResetPlan, ResetRejection};
pub use types::{AffinityClass, InstanceInfo, InstancePhase, Key, PhaseState, Update, WindowHandle};
