//! Milestone confirmation engine.
//!
//! The [`Tangle`] owns the cached object store, the node's sync state and
//! the node-wide ledger lock. It runs the white-flag computation
//! ([`whiteflag`]) for candidate milestones and confirms received
//! milestones, announcing every change on the [`ConfirmationEventBus`].

pub mod error;
pub mod events;
pub mod tangle;
pub mod whiteflag;

pub use error::TangleError;
pub use events::{
    ConfirmationEvent, ConfirmationEventBus, ConfirmationKind, Subscription, SubscriptionId,
};
pub use tangle::{SyncStatus, Tangle, TangleConfig};
pub use whiteflag::{WhiteFlagCandidate, WhiteFlagMutations, compute_white_flag_mutations};

#[cfg(test)]
mod tests;
