use std::path::PathBuf;

use crate::state::SessionState;

/// Errors surfaced to callers of a debugging session
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation has no meaning for a debug adapter session
    #[error("{0} is not supported by debug adapter sessions")]
    NotSupported(&'static str),

    #[error("cannot {operation} a session that is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("no launch configuration is active for {}", .0.display())]
    NoActiveConfiguration(PathBuf),

    /// The adapter went away before the handshake finished
    #[error("debug adapter closed the connection while {0}")]
    Disconnected(&'static str),

    #[error(transparent)]
    Transport(#[from] transport::Error),

    #[error(transparent)]
    Configuration(#[from] launch_configuration::ConfigurationError),
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
