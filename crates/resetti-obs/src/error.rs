//! Error types for the OBS client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObsError {
    #[error("obs websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("obs connection closed")]
    Closed,

    #[error("obs sent malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("obs handshake failed: {0}")]
    Handshake(String),

    #[error("obs requires a password but none is configured")]
    PasswordRequired,

    #[error("{request} failed (code {code}): {comment}")]
    Request {
        request: String,
        code: i64,
        comment: String,
    },

    #[error("obs response to {0} is missing data")]
    MissingData(String),
}

impl ObsError {
    /// Whether the connection is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::WebSocket(_) | Self::Closed | Self::Handshake(_) | Self::PasswordRequired
        )
    }
}
