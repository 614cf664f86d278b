//! Error types for the RPC gateway.

use serde::{Deserialize, Serialize};
use tangle_engine::TangleError;

/// Wire status code reported with every failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    /// The requested milestone or message does not exist.
    NotFound,
    /// The request itself is malformed.
    InvalidArgument,
    /// Temporarily unable to serve the request; retrying later may succeed.
    Unavailable,
    /// The node hit an inconsistency; retrying will not help.
    Internal,
}

/// Errors surfaced by gateway operations, on the server and the client.
#[derive(Debug, thiserror::Error)]
pub enum InxError {
    /// Missing milestone or message.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed caller input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Node not synced, parents not solid, or operation aborted.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Internal fault (integrity, serialization, storage).
    #[error("internal error: {0}")]
    Internal(String),

    /// Socket failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    /// A frame exceeded the size limit.
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge {
        /// Announced frame length.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// The server answered with an error frame.
    #[error("{code:?}: {message}")]
    Remote {
        /// Status code reported by the server.
        code: StatusCode,
        /// Diagnostic message reported by the server.
        message: String,
    },

    /// The server answered with a frame of the wrong kind.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl InxError {
    /// The status code reported to callers for this error.
    pub fn code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NotFound,
            Self::InvalidArgument(_) => StatusCode::InvalidArgument,
            Self::Unavailable(_) => StatusCode::Unavailable,
            Self::Remote { code, .. } => *code,
            Self::Internal(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::FrameTooLarge { .. }
            | Self::ConnectionClosed
            | Self::UnexpectedResponse(_) => StatusCode::Internal,
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        self.code() == StatusCode::Unavailable
    }

    /// The diagnostic message sent on the wire (without the code prefix).
    pub fn message(&self) -> String {
        match self {
            Self::NotFound(m)
            | Self::InvalidArgument(m)
            | Self::Unavailable(m)
            | Self::Internal(m) => m.clone(),
            Self::Remote { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<TangleError> for InxError {
    fn from(err: TangleError) -> Self {
        match err {
            TangleError::NodeNotSynced
            | TangleError::ParentsNotSolid { .. }
            | TangleError::OperationAborted => Self::Unavailable(err.to_string()),
            TangleError::ParentsNotGiven => Self::InvalidArgument(err.to_string()),
            TangleError::MilestoneNotFound(_) | TangleError::MessageNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<tangle_store::StoreError> for InxError {
    fn from(err: tangle_store::StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<tangle_types::TypesError> for InxError {
    fn from(err: tangle_types::TypesError) -> Self {
        Self::Internal(err.to_string())
    }
}
