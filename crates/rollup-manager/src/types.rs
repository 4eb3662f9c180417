//! Core types for the rollup manager
//!
//! The manager does not execute batches. It only records what was sequenced,
//! what has been proven, and what is final, for every registered rollup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 32-byte hash
pub type Hash = [u8; 32];

/// 20-byte account identity (callers, rollup contracts, verifiers)
pub type Address = [u8; 20];

/// Dense rollup identifier, first rollup is 1
pub type RollupId = u32;

/// Rollup type identifier, first type is 1
pub type RollupTypeId = u32;

/// Chain identifier, globally unique across rollups
pub type ChainId = u64;

/// Batch index inside one rollup
pub type BatchNum = u64;

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// Reward / fee amount in base units (18 decimals)
pub type Amount = u128;

/// Number of 32-byte words in a succinct proof
pub const PROOF_WORDS: usize = 24;

/// Opaque succinct proof, interpreted only by the verifier
pub type Proof = [Hash; PROOF_WORDS];

/// Zero hash constant
pub const ZERO_HASH: Hash = [0u8; 32];

/// Zero address constant
pub const ZERO_ADDRESS: Address = [0u8; 20];

// ============================================================================
// Call context
// ============================================================================

/// Who is calling and when
///
/// Every mutating operation receives one of these instead of reading
/// ambient globals, so replays are deterministic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub now: Timestamp,
}

impl CallContext {
    pub fn new(caller: Address, now: Timestamp) -> Self {
        Self { caller, now }
    }
}

// ============================================================================
// Registry types
// ============================================================================

/// Immutable rollup template
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupType {
    /// Consensus implementation every instance of this type runs
    pub consensus_implementation: Address,
    /// Verifier used to check proofs for instances of this type
    pub verifier: Address,
    /// Fork identifier committed into every proof
    pub fork_id: u64,
    /// Instances may only be upgraded between types sharing this id
    pub compatibility_id: u8,
    /// State root at batch 0
    pub genesis: Hash,
    pub description: String,
    /// Obsolete types can no longer be instantiated
    pub obsolete: bool,
}

/// Checkpoint written once per sequencing call
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedBatchData {
    /// Hash chain head after this batch
    pub acc_input_hash: Hash,
    /// When the batches were appended
    pub sequenced_timestamp: Timestamp,
    /// Previous checkpoint index (backward link)
    pub previous_last_batch_sequenced: BatchNum,
}

/// Provisionally accepted verification result
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingState {
    pub timestamp: Timestamp,
    pub last_verified_batch: BatchNum,
    pub exit_root: Hash,
    pub state_root: Hash,
}

/// Live rollup instance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupData {
    /// Identity the rollup uses when calling back into the manager
    pub rollup_contract: Address,
    pub chain_id: ChainId,
    pub verifier: Address,
    pub fork_id: u64,
    /// 0 for rollups migrated with `add_existing_rollup`
    pub rollup_type_id: RollupTypeId,
    pub compatibility_id: u8,
    /// Consolidated state roots, only checkpointed batches are present
    pub batch_num_to_state_root: BTreeMap<BatchNum, Hash>,
    pub sequenced_batches: BTreeMap<BatchNum, SequencedBatchData>,
    pub pending_state_transitions: BTreeMap<u64, PendingState>,
    pub last_local_exit_root: Hash,
    pub last_batch_sequenced: BatchNum,
    pub last_verified_batch: BatchNum,
    pub last_pending_state: u64,
    pub last_pending_state_consolidated: u64,
    pub last_verified_batch_before_upgrade: BatchNum,
}

impl RollupData {
    /// Fresh rollup seeded with its genesis root at batch 0
    pub fn new(
        rollup_contract: Address,
        chain_id: ChainId,
        verifier: Address,
        fork_id: u64,
        rollup_type_id: RollupTypeId,
        compatibility_id: u8,
        genesis: Hash,
    ) -> Self {
        let mut batch_num_to_state_root = BTreeMap::new();
        batch_num_to_state_root.insert(0, genesis);

        Self {
            rollup_contract,
            chain_id,
            verifier,
            fork_id,
            rollup_type_id,
            compatibility_id,
            batch_num_to_state_root,
            sequenced_batches: BTreeMap::new(),
            pending_state_transitions: BTreeMap::new(),
            last_local_exit_root: ZERO_HASH,
            last_batch_sequenced: 0,
            last_verified_batch: 0,
            last_pending_state: 0,
            last_pending_state_consolidated: 0,
            last_verified_batch_before_upgrade: 0,
        }
    }

    /// Latest verified batch, pending or consolidated
    pub fn effective_last_verified_batch(&self) -> BatchNum {
        if self.last_pending_state > 0 {
            self.pending_state_transitions
                .get(&self.last_pending_state)
                .map(|p| p.last_verified_batch)
                .unwrap_or(self.last_verified_batch)
        } else {
            self.last_verified_batch
        }
    }

    /// Consolidated root at `batch`, `None` when the batch was never a tip
    pub fn state_root_at(&self, batch: BatchNum) -> Option<Hash> {
        self.batch_num_to_state_root.get(&batch).copied()
    }

    /// Hash chain head recorded at checkpoint `batch`
    pub fn acc_input_hash_at(&self, batch: BatchNum) -> Option<Hash> {
        self.sequenced_batches.get(&batch).map(|b| b.acc_input_hash)
    }

    /// Whether pending state `num` is queued and old enough to become final
    pub fn is_pending_state_consolidable(
        &self,
        num: u64,
        pending_state_timeout: u64,
        now: Timestamp,
    ) -> bool {
        if num <= self.last_pending_state_consolidated || num > self.last_pending_state {
            return false;
        }
        self.pending_state_transitions
            .get(&num)
            .map_or(false, |p| p.timestamp.saturating_add(pending_state_timeout) <= now)
    }

}

// ============================================================================
// Helper functions
// ============================================================================

/// Hex rendering for log fields
pub fn short_hex(bytes: &[u8]) -> String {
    let full = hex::encode(bytes);
    if full.len() > 12 {
        format!("0x{}…", &full[..12])
    } else {
        format!("0x{}", full)
    }
}

/// Parse a `0x`-prefixed or bare hex string into a fixed-width array
pub fn parse_fixed_hex<const N: usize>(s: &str) -> Result<[u8; N], hex::FromHexError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let mut out = [0u8; N];
    hex::decode_to_slice(trimmed, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rollup() -> RollupData {
        RollupData::new([1u8; 20], 1001, [2u8; 20], 7, 1, 0, [0xAA; 32])
    }

    #[test]
    fn test_genesis_seeded() {
        let r = rollup();
        assert_eq!(r.state_root_at(0), Some([0xAA; 32]));
        assert_eq!(r.effective_last_verified_batch(), 0);
        assert_eq!(r.last_pending_state, 0);
    }

    #[test]
    fn test_effective_tip_prefers_pending() {
        let mut r = rollup();
        r.last_verified_batch = 3;
        r.pending_state_transitions.insert(1, PendingState {
            timestamp: 100,
            last_verified_batch: 9,
            exit_root: ZERO_HASH,
            state_root: [1u8; 32],
        });
        r.last_pending_state = 1;
        assert_eq!(r.effective_last_verified_batch(), 9);

        r.last_pending_state = 0;
        assert_eq!(r.effective_last_verified_batch(), 3);
    }

    #[test]
    fn test_consolidable_window() {
        let mut r = rollup();
        r.pending_state_transitions.insert(1, PendingState {
            timestamp: 100,
            ..Default::default()
        });
        r.last_pending_state = 1;
        assert!(!r.is_pending_state_consolidable(1, 50, 149));
        assert!(r.is_pending_state_consolidable(1, 50, 150));
        assert!(!r.is_pending_state_consolidable(2, 0, 1_000));

        r.last_pending_state_consolidated = 1;
        assert!(!r.is_pending_state_consolidable(1, 50, 1_000));
    }

    #[test]
    fn test_parse_fixed_hex() {
        let a: Address = parse_fixed_hex("0x0101010101010101010101010101010101010101").unwrap();
        assert_eq!(a, [1u8; 20]);
        assert!(parse_fixed_hex::<20>("0x01").is_err());
    }
}
