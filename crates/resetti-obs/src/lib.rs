//! resetti-obs: OBS websocket (protocol v5) scene control.
//!
//! [`ObsClient`] performs the handshake and request/response exchange.
//! [`ObsHandle`] wraps a client in a background task so scene switches never
//! block the caller; failed requests are logged and a lost connection ends
//! the task with an error.

pub mod client;
pub mod error;
pub mod handle;
pub mod protocol;

pub use client::ObsClient;
pub use error::ObsError;
pub use handle::{ObsHandle, spawn};
