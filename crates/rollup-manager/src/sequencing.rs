//! Batch sequencing bookkeeping
//!
//! Rollups report sequenced batches by calling back with their new hash
//! chain head. Each call writes exactly one checkpoint at the cumulative batch
//! index it reached; checkpoints are never rewritten and link back to the
//! previous one so the fee controller can walk them.

use crate::error::{Result, RollupManagerError};
use crate::events::Event;
use crate::manager::RollupManager;
use crate::types::*;

impl RollupManager {
    fn rollup_id_for_caller(&self, ctx: &CallContext) -> Result<RollupId> {
        self.registry
            .rollup_id_by_address(&ctx.caller)
            .ok_or_else(|| RollupManagerError::NotARegisteredRollup(format!("0x{}", hex::encode(ctx.caller))))
    }

    /// Record `new_sequenced_batches` appended by the calling rollup
    ///
    /// `forced_batches` of them came from the forced path and are taken off
    /// the global pending count. Returns the new last sequenced batch.
    pub fn on_sequence_batches(
        &mut self,
        ctx: &CallContext,
        new_sequenced_batches: u64,
        forced_batches: u64,
        new_acc_input_hash: Hash,
    ) -> Result<BatchNum> {
        self.ensure_not_emergency()?;
        let rollup_id = self.rollup_id_for_caller(ctx)?;

        if new_sequenced_batches == 0 {
            return Err(RollupManagerError::ZeroBatches);
        }
        if forced_batches > self.total_pending_forced_batches {
            return Err(RollupManagerError::ForcedBatchesUnderflow {
                requested: forced_batches,
                pending: self.total_pending_forced_batches,
            });
        }

        let total_sequenced_batches = self
            .total_sequenced_batches
            .checked_add(new_sequenced_batches)
            .ok_or(RollupManagerError::BatchCountOverflow)?;
        let previous_last_batch_sequenced = self.rollup(rollup_id)?.last_batch_sequenced;
        let new_last_batch_sequenced = previous_last_batch_sequenced
            .checked_add(new_sequenced_batches)
            .ok_or(RollupManagerError::BatchCountOverflow)?;

        self.total_sequenced_batches = total_sequenced_batches;
        self.total_pending_forced_batches -= forced_batches;

        let rollup = self.rollup_mut(rollup_id)?;
        rollup.last_batch_sequenced = new_last_batch_sequenced;
        rollup.sequenced_batches.insert(
            new_last_batch_sequenced,
            SequencedBatchData {
                acc_input_hash: new_acc_input_hash,
                sequenced_timestamp: ctx.now,
                previous_last_batch_sequenced,
            },
        );

        tracing::info!(
            rollup_id,
            batches = new_sequenced_batches,
            forced = forced_batches,
            last_batch_sequenced = new_last_batch_sequenced,
            acc_input_hash = %short_hex(&new_acc_input_hash),
            "batches sequenced"
        );

        self.try_consolidate_pending_state(rollup_id, ctx.now)?;

        self.emit(Event::OnSequenceBatches {
            rollup_id,
            last_batch_sequenced: new_last_batch_sequenced,
        });
        Ok(new_last_batch_sequenced)
    }

    /// The calling rollup queued a batch on its forced path
    pub fn on_force_batch(&mut self, ctx: &CallContext) -> Result<u64> {
        self.ensure_not_emergency()?;
        let rollup_id = self.rollup_id_for_caller(ctx)?;

        self.total_pending_forced_batches = self
            .total_pending_forced_batches
            .checked_add(1)
            .ok_or(RollupManagerError::BatchCountOverflow)?;

        tracing::info!(
            rollup_id,
            pending = self.total_pending_forced_batches,
            "forced batch queued"
        );
        self.emit(Event::ForceBatch {
            rollup_id,
            total_pending_forced_batches: self.total_pending_forced_batches,
        });
        Ok(self.total_pending_forced_batches)
    }
}
