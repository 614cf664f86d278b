//! Shared types and identifiers for the tangle node.
//!
//! This crate defines the ledger data model used across the workspace:
//! identifiers ([`MessageId`], [`MilestoneId`], [`OutputId`]), the
//! content-addressed [`Message`] and its [`Payload`] variants, the signed
//! [`MilestonePayload`] checkpoint, the persisted [`Milestone`] record and
//! per-message [`MessageMetadata`].
//!
//! Every content digest is `blake3(postcard(value))`.

mod error;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use error::TypesError;

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Create an ID by hashing arbitrary data with BLAKE3.
            pub fn from_data(data: &[u8]) -> Self {
                Self(blake3::hash(data).into())
            }

            /// Return the raw 32-byte representation.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = TypesError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim_start_matches("0x");
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(s, &mut bytes).map_err(|e| TypesError::InvalidId {
                    input: s.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Self(bytes))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

define_id!(
    /// Content-addressed identifier for a message: `blake3(postcard(message))`.
    MessageId
);

define_id!(
    /// Content-addressed identifier for a milestone payload:
    /// `blake3(payload.serialize())`.
    MilestoneId
);

impl MessageId {
    /// The all-zero id, used as the implicit genesis solid entry point.
    pub const EMPTY: MessageId = MessageId([0u8; 32]);
}

/// 32-byte merkle digest produced by the white-flag computation.
pub type MerkleRoot = [u8; 32];

// ---------------------------------------------------------------------------
// Milestone index
// ---------------------------------------------------------------------------

/// Monotonically increasing index of a confirmation checkpoint.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct MilestoneIndex(pub u32);

impl MilestoneIndex {
    /// The index that follows this one.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Big-endian encoding, used as an ordered storage key.
    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl From<u32> for MilestoneIndex {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

impl fmt::Display for MilestoneIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Ledger outputs
// ---------------------------------------------------------------------------

/// Identifies one output of a transaction: the carrying message plus the
/// output position.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OutputId {
    /// Message that created the output.
    pub message_id: MessageId,
    /// Position within the transaction's outputs.
    pub index: u16,
}

impl OutputId {
    /// Create a new output id.
    pub fn new(message_id: MessageId, index: u16) -> Self {
        Self { message_id, index }
    }

    /// Fixed-width storage key: 32-byte message id followed by the
    /// big-endian index.
    pub fn to_key(&self) -> [u8; 34] {
        let mut key = [0u8; 34];
        key[..32].copy_from_slice(self.message_id.as_bytes());
        key[32..].copy_from_slice(&self.index.to_be_bytes());
        key
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.message_id, self.index)
    }
}

impl fmt::Debug for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputId({self})")
    }
}

/// An amount of tokens locked to an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    /// Owner address.
    pub address: [u8; 32],
    /// Token amount.
    pub amount: u64,
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Value transfer: consumes unspent outputs and creates new ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPayload {
    /// Outputs being spent.
    pub inputs: Vec<OutputId>,
    /// Outputs being created, addressed as `(message_id, position)`.
    pub outputs: Vec<Output>,
}

/// One signature over a milestone payload.
///
/// Stored as two 32-byte halves because serde doesn't derive for `[u8; 64]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneSignature {
    /// Ed25519 public key of the signer.
    pub public_key: [u8; 32],
    /// First half of the signature.
    pub signature_r: [u8; 32],
    /// Second half of the signature.
    pub signature_s: [u8; 32],
}

/// Signed checkpoint embedded in a milestone message.
///
/// Signatures are checked once, when the message is ingested. Everything
/// downstream treats the payload as trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestonePayload {
    /// Milestone index.
    pub index: MilestoneIndex,
    /// Unix timestamp (seconds).
    pub timestamp: u32,
    /// ID of the milestone this one builds on.
    pub previous_milestone_id: MilestoneId,
    /// Messages this milestone directly approves.
    pub parents: Vec<MessageId>,
    /// Digest over every message confirmed by this milestone.
    pub confirmed_merkle_root: MerkleRoot,
    /// Digest over the messages whose mutations were applied.
    pub applied_merkle_root: MerkleRoot,
    /// Issuer signatures.
    pub signatures: Vec<MilestoneSignature>,
}

impl MilestonePayload {
    /// Serialize to the canonical binary form without re-validating.
    pub fn serialize(&self) -> Result<Vec<u8>, TypesError> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Decode a payload from its canonical binary form.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, TypesError> {
        Ok(postcard::from_bytes(bytes)?)
    }

    /// Compute the content digest of this payload.
    pub fn id(&self) -> Result<MilestoneId, TypesError> {
        Ok(MilestoneId::from_data(&self.serialize()?))
    }
}

/// The optional payload carried by a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Ledger mutation.
    Transaction(TransactionPayload),
    /// Confirmation checkpoint.
    Milestone(MilestonePayload),
    /// Opaque data with no ledger effect.
    TaggedData {
        /// Application tag.
        tag: Vec<u8>,
        /// Arbitrary data.
        data: Vec<u8>,
    },
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A content-addressed unit of ledger data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Messages directly referenced by this one (DAG edges).
    pub parents: Vec<MessageId>,
    /// Optional payload.
    pub payload: Option<Payload>,
}

impl Message {
    /// Create a message with the given parents and payload.
    pub fn new(parents: Vec<MessageId>, payload: Option<Payload>) -> Self {
        Self { parents, payload }
    }

    /// Serialize the message to postcard bytes.
    pub fn serialize(&self) -> Result<Vec<u8>, TypesError> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Compute the content-addressed id of this message.
    pub fn id(&self) -> Result<MessageId, TypesError> {
        Ok(MessageId::from_data(&self.serialize()?))
    }

    /// The embedded milestone payload, if any.
    pub fn milestone(&self) -> Option<&MilestonePayload> {
        match &self.payload {
            Some(Payload::Milestone(ms)) => Some(ms),
            _ => None,
        }
    }

    /// The embedded transaction payload, if any.
    pub fn transaction(&self) -> Option<&TransactionPayload> {
        match &self.payload {
            Some(Payload::Transaction(tx)) => Some(tx),
            _ => None,
        }
    }
}

/// Persisted milestone record: which message carries the checkpoint for
/// a given index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    /// Milestone index.
    pub index: MilestoneIndex,
    /// Unix timestamp (seconds).
    pub timestamp: u32,
    /// Message embedding the milestone payload.
    pub message_id: MessageId,
}

/// Why a referenced message's transaction was not applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictReason {
    /// No conflict.
    #[default]
    None,
    /// An input was unknown or already spent by an earlier milestone.
    InputUtxoNotFound,
    /// An input was spent by an earlier message of the same milestone.
    InputAlreadySpentInThisMilestone,
    /// Input and output amounts do not balance.
    InputOutputSumMismatch,
    /// The transaction is malformed, e.g. it has more outputs than an
    /// [`OutputId`] can address.
    SemanticValidationFailed,
}

/// Mutable per-message bookkeeping kept next to the immutable message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Whether the whole ancestry of the message is known.
    pub solid: bool,
    /// Milestone that confirmed this message, if any.
    pub referenced_by: Option<MilestoneIndex>,
    /// Conflict outcome recorded at confirmation.
    pub conflict: ConflictReason,
}
