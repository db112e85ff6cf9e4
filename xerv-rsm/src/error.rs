//! Error types for replicated state machine operations.
//!
//! Only recoverable conditions live here. Contract violations that could
//! cause replicas to diverge abort instead of returning an error.

use thiserror::Error;

/// Result type for replicated state machine operations.
pub type RsmResult<T> = std::result::Result<T, RsmError>;

/// Errors that can occur while operating a managed state machine.
#[derive(Debug, Error)]
pub enum RsmError {
    /// The managed state machine has already been destroyed.
    #[error("raft cluster already closed")]
    ClusterClosed,

    /// A write persisted fewer bytes than requested.
    #[error("short write: expected {expected} bytes, wrote {written}")]
    ShortWrite {
        /// Number of bytes that should have been written.
        expected: usize,
        /// Number of bytes actually written.
        written: usize,
    },

    /// The operation observed the stop signal and gave up.
    #[error("snapshot operation stopped")]
    Stopped,

    /// The snapshot header is missing, truncated or corrupt.
    #[error("invalid snapshot header: {cause}")]
    SnapshotHeader {
        /// Description of the problem.
        cause: String,
    },

    /// The snapshot payload does not match what its header recorded.
    #[error("invalid snapshot payload: {cause}")]
    SnapshotPayload {
        /// Description of the mismatch.
        cause: String,
    },

    /// The serialized session section could not be decoded.
    #[error("invalid session data: {cause}")]
    SessionData {
        /// Description of the problem.
        cause: String,
    },

    /// The user state machine reported a failure.
    #[error("state machine error: {cause}")]
    StateMachine {
        /// Message from the user state machine.
        cause: String,
    },

    /// A raw component identifier did not map to a known component.
    #[error("unknown component identifier {0}")]
    UnknownComponent(u64),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RsmError {
    /// Create a state machine error from any displayable cause.
    pub fn state_machine(cause: impl ToString) -> Self {
        RsmError::StateMachine {
            cause: cause.to_string(),
        }
    }

    /// Create a session data error.
    pub fn session_data(cause: impl Into<String>) -> Self {
        RsmError::SessionData {
            cause: cause.into(),
        }
    }

    /// Whether this error was caused by the stop signal.
    pub fn is_stopped(&self) -> bool {
        matches!(self, RsmError::Stopped)
    }
}

impl From<serde_json::Error> for RsmError {
    fn from(e: serde_json::Error) -> Self {
        RsmError::Config(e.to_string())
    }
}
