//! Error types for the transport and protocol client

use std::io;
use std::path::PathBuf;

use crate::message::Seq;

/// Errors raised while decoding a single frame.
///
/// A frame error never leaves the reader in the middle of a frame, so the next frame can
/// still be read unless [`Error::is_recoverable`] says otherwise.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid UTF-8 in header")]
    InvalidUtf8,

    #[error("malformed Content-Length header value {0:?}")]
    MalformedContentLength(String),

    #[error("missing Content-Length header")]
    MissingContentLength,

    #[error("message size {size} exceeds maximum allowed {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("JSON deserialization failed: {0}")]
    JsonDeserialize(#[source] serde_json::Error),

    #[error("JSON serialization failed: {0}")]
    JsonSerialize(#[source] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The adapter process could not be created
    #[error("failed to launch debug adapter {}", command.display())]
    LaunchFailure {
        command: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The peer sent something that cannot be honoured, e.g. a response nobody waits for
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The adapter answered with `success: false`
    #[error("request {command} (seq {seq}) failed: {}", message.as_deref().unwrap_or("no message"))]
    RequestFailed {
        command: String,
        seq: Seq,
        message: Option<String>,
    },

    /// The client was stopped while the request was outstanding
    #[error("request {command} (seq {seq}) abandoned")]
    RequestAbandoned { command: String, seq: Seq },

    /// Tried to send through a client that has already stopped
    #[error("client stopped")]
    ClientStopped,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl Error {
    /// Whether the inbound stream can keep going after this error.
    ///
    /// Frame-level problems are recoverable; a broken pipe or I/O failure is not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Codec(
                CodecError::InvalidUtf8
                    | CodecError::MalformedContentLength(_)
                    | CodecError::MissingContentLength
                    | CodecError::JsonDeserialize(_)
            ) | Error::ProtocolViolation(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
