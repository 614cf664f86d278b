//! Turning cached milestones into wire milestones.

use tangle_store::{CachedMilestone, Storage};
use tangle_types::{MilestoneId, MilestoneIndex};

use crate::error::InxError;
use crate::message::{InxMilestone, MilestoneInfo};

/// Materialize a milestone handle into its wire form.
///
/// Takes ownership of `milestone` and releases it before returning, on
/// success and on every error path. The carrier message is acquired and
/// released here as well.
///
/// The payload is serialized as stored, without re-validation: it was
/// validated when the carrier message was ingested.
pub fn milestone_for_cached_milestone(
    storage: &Storage,
    milestone: CachedMilestone,
) -> Result<InxMilestone, InxError> {
    let index = milestone.index;
    let message_id = milestone.message_id;
    let timestamp = milestone.timestamp;
    milestone.release();

    let message = storage.acquire_message(&message_id)?.ok_or_else(|| {
        InxError::NotFound(format!(
            "message {message_id} of milestone {index} not found"
        ))
    })?;

    let Some(payload) = message.milestone() else {
        return Err(InxError::Internal(format!(
            "message {message_id} of milestone {index} carries no milestone payload"
        )));
    };

    let raw = payload.serialize()?;
    let milestone_id = MilestoneId::from_data(&raw);

    Ok(InxMilestone {
        milestone_info: MilestoneInfo {
            milestone_id,
            milestone_index: index,
            milestone_timestamp: timestamp,
        },
        raw,
    })
}

/// Acquire the milestone at `index` and materialize it.
pub fn milestone_for_index(storage: &Storage, index: MilestoneIndex) -> Result<InxMilestone, InxError> {
    let milestone = storage
        .acquire_milestone(index)?
        .ok_or_else(|| InxError::NotFound(format!("milestone {index} not found")))?;
    milestone_for_cached_milestone(storage, milestone)
}
