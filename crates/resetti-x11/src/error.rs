//! Error types for the X11 backend.

use resetti_core::BackendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum X11Error {
    #[error("{program} failed: {detail}")]
    CommandFailed { program: String, detail: String },

    #[error("unexpected {program} output: {output:?}")]
    ParseError { program: String, output: String },

    #[error("no keysym for key {0}")]
    NoKeysym(String),

    #[error("x11 io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<X11Error> for BackendError {
    fn from(e: X11Error) -> Self {
        match e {
            X11Error::CommandFailed { program, detail } => BackendError::Command {
                tool: program,
                message: detail,
            },
            X11Error::ParseError { program, output } => BackendError::Parse {
                tool: program,
                output,
            },
            X11Error::NoKeysym(key) => BackendError::Command {
                tool: "xdotool".to_string(),
                message: format!("no keysym for key {key}"),
            },
            X11Error::Io(e) => BackendError::Io(e),
        }
    }
}
