//! Transient view of the unspent-output set used while walking a milestone
//! cone. Nothing here touches persistent state.

use std::collections::{HashMap, HashSet};

use tangle_store::{StoreError, TangleStore};
use tangle_types::{ConflictReason, MessageId, Output, OutputId, TransactionPayload};

/// Outputs a single transaction may create: positions must fit a `u16`.
const MAX_OUTPUTS: usize = u16::MAX as usize + 1;

/// Scratch overlay on top of the persisted unspent outputs.
pub(crate) struct LedgerOverlay<'a> {
    store: &'a dyn TangleStore,
    /// Outputs created by transactions applied so far, in creation order.
    created: Vec<(OutputId, Output)>,
    created_index: HashMap<OutputId, Output>,
    /// Persisted outputs consumed so far, in consumption order.
    consumed: Vec<OutputId>,
    /// Every output spent in this milestone (persisted or created).
    spent: HashSet<OutputId>,
}

impl<'a> LedgerOverlay<'a> {
    pub(crate) fn new(store: &'a dyn TangleStore) -> Self {
        Self {
            store,
            created: Vec::new(),
            created_index: HashMap::new(),
            consumed: Vec::new(),
            spent: HashSet::new(),
        }
    }

    /// Check `tx` against the overlay and apply it if it does not conflict.
    ///
    /// A conflicting transaction leaves the overlay unchanged.
    pub(crate) fn apply(
        &mut self,
        message_id: MessageId,
        tx: &TransactionPayload,
    ) -> Result<ConflictReason, StoreError> {
        if tx.outputs.len() > MAX_OUTPUTS {
            return Ok(ConflictReason::SemanticValidationFailed);
        }

        let mut seen = HashSet::with_capacity(tx.inputs.len());
        let mut input_sum: u64 = 0;

        for input in &tx.inputs {
            if !seen.insert(*input) {
                return Ok(ConflictReason::InputUtxoNotFound);
            }
            if self.spent.contains(input) {
                return Ok(ConflictReason::InputAlreadySpentInThisMilestone);
            }
            let output = match self.created_index.get(input) {
                Some(output) => *output,
                None => match self.store.get_unspent_output(input)? {
                    Some(output) => output,
                    None => return Ok(ConflictReason::InputUtxoNotFound),
                },
            };
            let Some(sum) = input_sum.checked_add(output.amount) else {
                return Ok(ConflictReason::InputOutputSumMismatch);
            };
            input_sum = sum;
        }

        let output_sum = tx
            .outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.amount));
        if output_sum != Some(input_sum) {
            return Ok(ConflictReason::InputOutputSumMismatch);
        }

        for input in &tx.inputs {
            self.spent.insert(*input);
            if self.created_index.remove(input).is_some() {
                self.created.retain(|(id, _)| id != input);
            } else {
                self.consumed.push(*input);
            }
        }
        for (position, output) in (0..=u16::MAX).zip(&tx.outputs) {
            let id = OutputId::new(message_id, position);
            self.created.push((id, *output));
            self.created_index.insert(id, *output);
        }

        Ok(ConflictReason::None)
    }

    /// The accumulated changes: `(created, consumed)`.
    pub(crate) fn into_changes(self) -> (Vec<(OutputId, Output)>, Vec<OutputId>) {
        (self.created, self.consumed)
    }
}
