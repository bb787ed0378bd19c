//! resetti-x11: window primitives and instance discovery over X11.
//!
//! Talks to the X server through `xdotool` and `xinput` subprocesses behind
//! a mock-injectable [`CommandRunner`]. No policy lives here; this crate is
//! a pure IO boundary.

pub mod backend;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod keysym;

pub use backend::XdoBackend;
pub use discovery::{FindError, find_instances};
pub use error::X11Error;
pub use executor::{CommandRunner, SubprocessRunner};
