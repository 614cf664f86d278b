//! Error types for the shared data model.

/// Errors produced while encoding, decoding or parsing ledger types.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// Postcard serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A hex-encoded identifier could not be parsed.
    #[error("invalid identifier {input:?}: {reason}")]
    InvalidId {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl From<postcard::Error> for TypesError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
