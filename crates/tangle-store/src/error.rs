//! Error types for ledger storage operations.

use tangle_types::TypesError;

/// Errors that can occur while reading or writing ledger state.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Fjall database error.
    #[error("fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    /// I/O error (e.g. while creating a temporary database directory).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] postcard::Error),

    /// Error from the shared data model (id computation, payload encoding).
    #[error("types error: {0}")]
    Types(#[from] TypesError),

    /// A ledger mutation tried to consume an output that is not unspent.
    #[error("output {0} is not unspent")]
    OutputNotUnspent(tangle_types::OutputId),
}
