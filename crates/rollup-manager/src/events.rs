//! Events emitted by successful calls
//!
//! Appended in call order and drained by whoever drives the manager
//! (an indexer, the CLI, tests).

use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount, BatchNum, ChainId, Hash, RollupId, RollupTypeId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    AddRollupType {
        rollup_type_id: RollupTypeId,
        verifier: Address,
        fork_id: u64,
        compatibility_id: u8,
        genesis: Hash,
    },
    ObsoleteRollupType {
        rollup_type_id: RollupTypeId,
    },
    CreateRollup {
        rollup_id: RollupId,
        rollup_type_id: RollupTypeId,
        rollup_contract: Address,
        chain_id: ChainId,
    },
    AddExistingRollup {
        rollup_id: RollupId,
        fork_id: u64,
        rollup_contract: Address,
        chain_id: ChainId,
        compatibility_id: u8,
    },
    UpdateRollup {
        rollup_id: RollupId,
        new_rollup_type_id: RollupTypeId,
        last_verified_batch_before_upgrade: BatchNum,
    },
    OnSequenceBatches {
        rollup_id: RollupId,
        last_batch_sequenced: BatchNum,
    },
    ForceBatch {
        rollup_id: RollupId,
        total_pending_forced_batches: u64,
    },
    VerifyBatches {
        rollup_id: RollupId,
        final_batch: BatchNum,
        state_root: Hash,
        exit_root: Hash,
        aggregator: Address,
        trusted: bool,
    },
    ConsolidatePendingState {
        rollup_id: RollupId,
        final_batch: BatchNum,
        state_root: Hash,
        exit_root: Hash,
        pending_state_num: u64,
    },
    ProveNonDeterministicPendingState {
        rollup_id: RollupId,
        stored_state_root: Hash,
        proved_state_root: Hash,
    },
    OverridePendingState {
        rollup_id: RollupId,
        final_batch: BatchNum,
        state_root: Hash,
        exit_root: Hash,
        aggregator: Address,
    },
    EmergencyStateActivated,
    EmergencyStateDeactivated,
    SetTrustedAggregatorTimeout {
        timeout: u64,
    },
    SetPendingStateTimeout {
        timeout: u64,
    },
    SetMultiplierBatchFee {
        multiplier: u16,
    },
    SetVerifyBatchTimeTarget {
        target: u64,
    },
    SetBatchFee {
        batch_fee: Amount,
    },
}
