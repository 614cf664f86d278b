//! Wire protocol of the gateway.
//!
//! Every frame is a postcard-encoded [`InxRequest`] or [`InxResponse`]
//! behind a 4-byte big-endian length prefix (see [`crate::transport`]).

use serde::{Deserialize, Serialize};
use tangle_types::{MerkleRoot, MessageId, MilestoneId, MilestoneIndex};

use crate::error::StatusCode;

/// Identifying fields of a milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneInfo {
    /// Digest of the raw milestone payload.
    pub milestone_id: MilestoneId,
    /// Milestone index.
    pub milestone_index: MilestoneIndex,
    /// Milestone timestamp (unix seconds).
    pub milestone_timestamp: u32,
}

/// A materialized milestone: info plus the raw payload bytes.
///
/// `milestone_info.milestone_id == blake3(raw)` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InxMilestone {
    /// Identifying fields.
    pub milestone_info: MilestoneInfo,
    /// Canonical serialization of the milestone payload.
    pub raw: Vec<u8>,
}

/// Input of `ComputeWhiteFlag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhiteFlagRequest {
    /// Index of the candidate milestone.
    pub milestone_index: MilestoneIndex,
    /// Timestamp of the candidate milestone.
    pub milestone_timestamp: u32,
    /// Parents of the candidate milestone.
    pub parents: Vec<MessageId>,
    /// ID of the previous milestone.
    pub previous_milestone_id: MilestoneId,
}

/// Output of `ComputeWhiteFlag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhiteFlagResponse {
    /// Digest over every referenced message.
    pub confirmed_merkle_root: MerkleRoot,
    /// Digest over the messages whose mutations were applied.
    pub applied_merkle_root: MerkleRoot,
}

/// Output of `ReadNodeStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Whether the node is synced.
    pub is_synced: bool,
    /// Highest milestone index received.
    pub latest_milestone_index: MilestoneIndex,
    /// Highest milestone index confirmed.
    pub confirmed_milestone_index: MilestoneIndex,
}

/// Requests a client can send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InxRequest {
    /// Read one confirmed milestone.
    ReadMilestone {
        /// Index to read.
        milestone_index: MilestoneIndex,
    },
    /// Stream every newly received milestone. Takes over the connection.
    ListenToLatestMilestone,
    /// Stream every newly confirmed milestone. Takes over the connection.
    ListenToConfirmedMilestone,
    /// Compute the merkle roots of a candidate milestone.
    ComputeWhiteFlag(WhiteFlagRequest),
    /// Read sync status and milestone pointers.
    ReadNodeStatus,
}

impl InxRequest {
    /// Operation name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadMilestone { .. } => "ReadMilestone",
            Self::ListenToLatestMilestone => "ListenToLatestMilestone",
            Self::ListenToConfirmedMilestone => "ListenToConfirmedMilestone",
            Self::ComputeWhiteFlag(_) => "ComputeWhiteFlag",
            Self::ReadNodeStatus => "ReadNodeStatus",
        }
    }
}

/// Responses the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InxResponse {
    /// A milestone (unary read or one stream item).
    Milestone(InxMilestone),
    /// Result of `ComputeWhiteFlag`.
    WhiteFlag(WhiteFlagResponse),
    /// Result of `ReadNodeStatus`.
    NodeStatus(NodeStatus),
    /// The call failed. Ends a stream.
    Error {
        /// Error category.
        code: StatusCode,
        /// Diagnostic message.
        message: String,
    },
}
