//! Walks over the message DAG below a set of parents.
//!
//! Two passes share the same stop rules:
//!
//! 1. [`Walker::check_solidity`]: every ancestor must be locally known, unless the
//!    walk can stop earlier at a solid entry point, an already referenced
//!    message or a message flagged solid.
//! 2. [`Walker::confirmation_order`]: depth-first post-order over the messages not
//!    yet referenced by a milestone. Parents are visited in the given
//!    order, each message's own parents in stored order, and a message is
//!    emitted after all of its unconfirmed ancestors.

use std::collections::HashSet;

use tangle_store::{CachedMessage, Storage};
use tangle_types::MessageId;
use tokio::sync::watch;

use crate::error::TangleError;

/// Outcome of the stop rules for one message.
enum Visit {
    /// Already confirmed or part of the snapshot: do not descend.
    Stop,
    /// Not confirmed yet.
    Unconfirmed {
        /// Whether the ancestry was already found complete.
        solid: bool,
    },
}

pub(crate) struct Walker<'a> {
    storage: &'a Storage,
    abort: &'a watch::Receiver<bool>,
}

impl<'a> Walker<'a> {
    pub(crate) fn new(storage: &'a Storage, abort: &'a watch::Receiver<bool>) -> Self {
        Self { storage, abort }
    }

    fn check_abort(&self) -> Result<(), TangleError> {
        if *self.abort.borrow() {
            return Err(TangleError::OperationAborted);
        }
        Ok(())
    }

    fn is_entry_point(&self, id: &MessageId) -> Result<bool, TangleError> {
        Ok(*id == MessageId::EMPTY || self.storage.store().is_solid_entry_point(id)?)
    }

    fn classify(&self, id: &MessageId) -> Result<Visit, TangleError> {
        if self.is_entry_point(id)? {
            return Ok(Visit::Stop);
        }
        match self.storage.store().get_metadata(id)? {
            Some(meta) if meta.referenced_by.is_some() => Ok(Visit::Stop),
            Some(meta) => Ok(Visit::Unconfirmed { solid: meta.solid }),
            None => Ok(Visit::Unconfirmed { solid: false }),
        }
    }

    /// Verify that the whole unconfirmed past cone of `parents` is known.
    pub(crate) fn check_solidity(&self, parents: &[MessageId]) -> Result<(), TangleError> {
        let mut visited = HashSet::new();
        let mut stack: Vec<MessageId> = parents.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            self.check_abort()?;
            if !visited.insert(id) {
                continue;
            }
            match self.classify(&id)? {
                Visit::Stop | Visit::Unconfirmed { solid: true } => continue,
                Visit::Unconfirmed { solid: false } => {}
            }
            let Some(message) = self.storage.acquire_message(&id)? else {
                return Err(TangleError::ParentsNotSolid { missing: id });
            };
            stack.extend(message.parents.iter().rev().copied());
        }
        Ok(())
    }

    /// Unconfirmed messages below `parents` in confirmation order.
    ///
    /// The returned handles keep the messages cached for the rest of the
    /// computation; they are released when the vector is dropped.
    pub(crate) fn confirmation_order(
        &self,
        parents: &[MessageId],
    ) -> Result<Vec<CachedMessage>, TangleError> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        // (message, parents already pushed)
        let mut stack: Vec<(MessageId, Option<CachedMessage>)> =
            parents.iter().rev().map(|id| (*id, None)).collect();

        while let Some((id, expanded)) = stack.pop() {
            self.check_abort()?;

            if let Some(message) = expanded {
                order.push(message);
                continue;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Visit::Stop = self.classify(&id)? {
                continue;
            }
            let Some(message) = self.storage.acquire_message(&id)? else {
                return Err(TangleError::ParentsNotSolid { missing: id });
            };
            let own_parents: Vec<MessageId> = message.parents.iter().rev().copied().collect();
            stack.push((id, Some(message)));
            stack.extend(own_parents.into_iter().map(|p| (p, None)));
        }
        Ok(order)
    }
}
