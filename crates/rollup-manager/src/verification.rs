//! Proof-gated verification and the pending-state protocol
//!
//! A verified transition either becomes final at once (trusted aggregator,
//! or a zero pending-state timeout) or is queued as a pending state that
//! consolidates after `pending_state_timeout`. Pending states can be
//! challenged with a second valid proof reaching a different root from the
//! same starting point, which halts the system.
//!
//! Every entry point validates, checks the proof and pays the reward before
//! it mutates anything, so a failed call leaves no trace.

use num_bigint::BigUint;
use sha2::{Digest, Sha256};

use crate::access::Role;
use crate::emergency::HALT_AGGREGATION_TIMEOUT;
use crate::error::{Result, RollupManagerError};
use crate::events::Event;
use crate::manager::RollupManager;
use crate::types::*;

/// Largest batch span a single untrusted verification may cover
pub const MAX_VERIFY_BATCHES: u64 = 1000;

/// BN254 scalar field modulus, big-endian
const SNARK_SCALAR_FIELD: [u8; 32] = [
    0x30, 0x64, 0x4e, 0x72, 0xe1, 0x31, 0xa0, 0x29, 0xb8, 0x50, 0x45, 0xb6, 0x81, 0x81, 0x58, 0x5d,
    0x28, 0x33, 0xe8, 0x48, 0x79, 0xb9, 0x70, 0x91, 0x43, 0xe1, 0xf5, 0x93, 0xf0, 0x00, 0x00, 0x01,
];

pub fn snark_scalar_field() -> BigUint {
    BigUint::from_bytes_be(&SNARK_SCALAR_FIELD)
}

/// Claimed transition of one rollup from `init_batch` to `final_batch`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateTransition {
    /// Pending state the transition starts from, 0 to start from a
    /// consolidated root
    pub pending_state_num: u64,
    pub init_batch: BatchNum,
    pub final_batch: BatchNum,
    pub new_local_exit_root: Hash,
    pub new_state_root: Hash,
}

/// Everything a proof commits to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnarkInput {
    pub aggregator: Address,
    pub old_state_root: Hash,
    pub old_acc_input_hash: Hash,
    pub init_batch: BatchNum,
    pub chain_id: ChainId,
    pub fork_id: u64,
    pub new_state_root: Hash,
    pub new_acc_input_hash: Hash,
    pub new_local_exit_root: Hash,
    pub final_batch: BatchNum,
}

impl SnarkInput {
    pub const ENCODED_LEN: usize = 20 + 32 * 5 + 8 * 4;

    /// Packed big-endian encoding, field order is part of the proof format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_LEN);
        out.extend_from_slice(&self.aggregator);
        out.extend_from_slice(&self.old_state_root);
        out.extend_from_slice(&self.old_acc_input_hash);
        out.extend_from_slice(&self.init_batch.to_be_bytes());
        out.extend_from_slice(&self.chain_id.to_be_bytes());
        out.extend_from_slice(&self.fork_id.to_be_bytes());
        out.extend_from_slice(&self.new_state_root);
        out.extend_from_slice(&self.new_acc_input_hash);
        out.extend_from_slice(&self.new_local_exit_root);
        out.extend_from_slice(&self.final_batch.to_be_bytes());
        out
    }

    /// SHA-256 of the encoding reduced into the scalar field
    pub fn public_input(&self) -> BigUint {
        let digest = Sha256::digest(self.to_bytes());
        BigUint::from_bytes_be(&digest) % snark_scalar_field()
    }
}

/// Build the proof input for `transition`, checking that both ends have
/// sequencing checkpoints
fn build_snark_input(
    rollup: &RollupData,
    aggregator: Address,
    old_state_root: Hash,
    transition: &StateTransition,
) -> Result<SnarkInput> {
    let old_acc_input_hash = match rollup.acc_input_hash_at(transition.init_batch) {
        Some(hash) => hash,
        None if transition.init_batch == 0 => ZERO_HASH,
        None => return Err(RollupManagerError::OldAccInputHashMissing(transition.init_batch)),
    };
    let new_acc_input_hash = rollup
        .acc_input_hash_at(transition.final_batch)
        .ok_or(RollupManagerError::NewAccInputHashMissing(transition.final_batch))?;

    Ok(SnarkInput {
        aggregator,
        old_state_root,
        old_acc_input_hash,
        init_batch: transition.init_batch,
        chain_id: rollup.chain_id,
        fork_id: rollup.fork_id,
        new_state_root: transition.new_state_root,
        new_acc_input_hash,
        new_local_exit_root: transition.new_local_exit_root,
        final_batch: transition.final_batch,
    })
}

/// Root the transition starts from
///
/// A pending start must exist and certify exactly `init_batch`. A
/// consolidated start must not lie beyond `tip` and must have a recorded root.
fn resolve_old_state_root(rollup: &RollupData, transition: &StateTransition, tip: BatchNum) -> Result<Hash> {
    let num = transition.pending_state_num;
    if num != 0 {
        if num > rollup.last_pending_state {
            return Err(RollupManagerError::PendingStateNotFound(num));
        }
        let pending = rollup
            .pending_state_transitions
            .get(&num)
            .ok_or(RollupManagerError::PendingStateNotFound(num))?;
        if pending.last_verified_batch != transition.init_batch {
            return Err(RollupManagerError::InitBatchMismatch {
                expected: pending.last_verified_batch,
                got: transition.init_batch,
            });
        }
        return Ok(pending.state_root);
    }

    if transition.init_batch > tip {
        return Err(RollupManagerError::InitBatchAboveTip {
            init: transition.init_batch,
            tip,
        });
    }
    rollup
        .state_root_at(transition.init_batch)
        .ok_or(RollupManagerError::OldStateRootMissing(transition.init_batch))
}

impl RollupManager {
    /// Proof input an aggregator calling with `ctx` must prove for `transition`
    pub fn snark_input(
        &self,
        ctx: &CallContext,
        rollup_id: RollupId,
        transition: &StateTransition,
    ) -> Result<SnarkInput> {
        let rollup = self.rollup(rollup_id)?;
        let old_state_root =
            resolve_old_state_root(rollup, transition, rollup.effective_last_verified_batch())?;
        build_snark_input(rollup, ctx.caller, old_state_root, transition)
    }

    fn check_proof(&self, rollup: &RollupData, input: &SnarkInput, proof: &Proof) -> Result<()> {
        let verifier = self.verifiers.get(&rollup.verifier).ok_or_else(|| {
            RollupManagerError::VerifierNotFound(format!("0x{}", hex::encode(rollup.verifier)))
        })?;
        if !verifier.verify_proof(proof, &input.public_input()) {
            return Err(RollupManagerError::InvalidProof);
        }
        Ok(())
    }

    /// Validate a transition against the effective tip, check its proof and
    /// pay the aggregator. Returns the tip the transition extends.
    fn verify_and_reward(
        &mut self,
        ctx: &CallContext,
        rollup_id: RollupId,
        transition: &StateTransition,
        beneficiary: &Address,
        proof: &Proof,
    ) -> Result<BatchNum> {
        let rollup = self.rollup(rollup_id)?;

        if transition.init_batch < rollup.last_verified_batch_before_upgrade {
            return Err(RollupManagerError::InitBatchBeforeUpgrade {
                init: transition.init_batch,
                boundary: rollup.last_verified_batch_before_upgrade,
            });
        }

        let tip = rollup.effective_last_verified_batch();
        let old_state_root = resolve_old_state_root(rollup, transition, tip)?;
        if transition.final_batch <= tip {
            return Err(RollupManagerError::FinalBatchNotAboveTip {
                final_batch: transition.final_batch,
                tip,
            });
        }

        let input = build_snark_input(rollup, ctx.caller, old_state_root, transition)?;
        self.check_proof(rollup, &input, proof)?;

        let new_batches = transition.final_batch - tip;
        let total_verified_batches = self
            .total_verified_batches
            .checked_add(new_batches)
            .ok_or(RollupManagerError::BatchCountOverflow)?;
        let reward = self.reward_per_batch().saturating_mul(new_batches as Amount);
        self.ledger
            .transfer(beneficiary, reward)
            .map_err(RollupManagerError::RewardTransferFailed)?;

        self.total_verified_batches = total_verified_batches;
        self.last_aggregation_timestamp = ctx.now;
        if let Some(consensus) = self.consensus.get(&rollup_id) {
            consensus.on_verify_batches(transition.final_batch, transition.new_state_root, &ctx.caller);
        }

        tracing::info!(
            rollup_id,
            init_batch = transition.init_batch,
            final_batch = transition.final_batch,
            new_batches,
            reward,
            aggregator = %short_hex(&ctx.caller),
            "batches verified"
        );
        Ok(tip)
    }

    /// Make `final_batch` the consolidated tip and restart pending numbering
    ///
    /// Stored entries stay readable until a new entry takes their number.
    fn finalize_batches(
        &mut self,
        rollup_id: RollupId,
        final_batch: BatchNum,
        state_root: Hash,
        exit_root: Hash,
    ) -> Result<()> {
        let rollup = self.rollup_mut(rollup_id)?;
        rollup.last_verified_batch = final_batch;
        rollup.batch_num_to_state_root.insert(final_batch, state_root);
        rollup.last_local_exit_root = exit_root;
        if rollup.last_pending_state > 0 {
            rollup.last_pending_state = 0;
            rollup.last_pending_state_consolidated = 0;
        }

        self.publish_exit_root();
        Ok(())
    }

    /// Verify batches after the trusted aggregator had its window
    pub fn verify_batches(
        &mut self,
        ctx: &CallContext,
        rollup_id: RollupId,
        transition: &StateTransition,
        beneficiary: Address,
        proof: &Proof,
    ) -> Result<()> {
        self.ensure_not_emergency()?;

        let rollup = self.rollup(rollup_id)?;
        let sequenced_at = rollup
            .sequenced_batches
            .get(&transition.final_batch)
            .map_or(0, |checkpoint| checkpoint.sequenced_timestamp);
        let ready_at = sequenced_at.saturating_add(self.trusted_aggregator_timeout);
        if ready_at > ctx.now {
            return Err(RollupManagerError::TrustedAggregatorTimeoutNotExpired { ready_at });
        }

        let span = transition.final_batch.saturating_sub(transition.init_batch);
        if span > MAX_VERIFY_BATCHES {
            return Err(RollupManagerError::ExceedMaxVerifyBatches {
                span,
                max: MAX_VERIFY_BATCHES,
            });
        }

        let old_tip = self.verify_and_reward(ctx, rollup_id, transition, &beneficiary, proof)?;

        let rollup = self
            .registry
            .rollup(rollup_id)
            .ok_or(RollupManagerError::RollupNotFound(rollup_id))?;
        self.fee.update(rollup, old_tip, transition.final_batch, ctx.now);

        if self.pending_state_timeout == 0 {
            self.finalize_batches(
                rollup_id,
                transition.final_batch,
                transition.new_state_root,
                transition.new_local_exit_root,
            )?;
        } else {
            self.try_consolidate_pending_state(rollup_id, ctx.now)?;

            let rollup = self.rollup_mut(rollup_id)?;
            rollup.last_pending_state += 1;
            let num = rollup.last_pending_state;
            rollup.pending_state_transitions.insert(
                num,
                PendingState {
                    timestamp: ctx.now,
                    last_verified_batch: transition.final_batch,
                    exit_root: transition.new_local_exit_root,
                    state_root: transition.new_state_root,
                },
            );
            tracing::debug!(rollup_id, pending_state_num = num, "pending state queued");
        }

        self.emit(Event::VerifyBatches {
            rollup_id,
            final_batch: transition.final_batch,
            state_root: transition.new_state_root,
            exit_root: transition.new_local_exit_root,
            aggregator: ctx.caller,
            trusted: false,
        });
        Ok(())
    }

    /// Verify batches as the trusted aggregator, final immediately
    pub fn verify_batches_trusted(
        &mut self,
        ctx: &CallContext,
        rollup_id: RollupId,
        transition: &StateTransition,
        beneficiary: Address,
        proof: &Proof,
    ) -> Result<()> {
        self.access.ensure(Role::TrustedAggregator, ctx)?;
        self.ensure_not_emergency()?;

        self.verify_and_reward(ctx, rollup_id, transition, &beneficiary, proof)?;
        self.finalize_batches(
            rollup_id,
            transition.final_batch,
            transition.new_state_root,
            transition.new_local_exit_root,
        )?;

        self.emit(Event::VerifyBatches {
            rollup_id,
            final_batch: transition.final_batch,
            state_root: transition.new_state_root,
            exit_root: transition.new_local_exit_root,
            aggregator: ctx.caller,
            trusted: true,
        });
        Ok(())
    }

    /// Consolidate what has aged past the timeout
    ///
    /// Pending entries are queued in time order, so the midpoint of the
    /// unconsolidated range being old enough means everything before it is
    /// too. Jumps there when possible, else takes one step.
    pub(crate) fn try_consolidate_pending_state(&mut self, rollup_id: RollupId, now: Timestamp) -> Result<()> {
        let rollup = self.rollup(rollup_id)?;
        if rollup.last_pending_state <= rollup.last_pending_state_consolidated {
            return Ok(());
        }

        let next = rollup.last_pending_state_consolidated + 1;
        if !rollup.is_pending_state_consolidable(next, self.pending_state_timeout, now) {
            return Ok(());
        }

        let mid = next + (rollup.last_pending_state - next) / 2;
        let target = if rollup.is_pending_state_consolidable(mid, self.pending_state_timeout, now) {
            mid
        } else {
            next
        };
        self.consolidate(rollup_id, target)
    }

    /// Make pending state `num` final
    ///
    /// The trusted aggregator may consolidate any queued entry at any time,
    /// including while halted. Anyone else needs the entry to have aged
    /// past the timeout.
    pub fn consolidate_pending_state(
        &mut self,
        ctx: &CallContext,
        rollup_id: RollupId,
        pending_state_num: u64,
    ) -> Result<()> {
        let rollup = self.rollup(rollup_id)?;
        if pending_state_num <= rollup.last_pending_state_consolidated
            || pending_state_num > rollup.last_pending_state
        {
            return Err(RollupManagerError::InvalidPendingStateNum(pending_state_num));
        }

        if !self.access.has_role(Role::TrustedAggregator, &ctx.caller) {
            self.ensure_not_emergency()?;
            if !rollup.is_pending_state_consolidable(pending_state_num, self.pending_state_timeout, ctx.now) {
                return Err(RollupManagerError::PendingStateNotConsolidable(pending_state_num));
            }
        }

        self.consolidate(rollup_id, pending_state_num)
    }

    fn consolidate(&mut self, rollup_id: RollupId, pending_state_num: u64) -> Result<()> {
        let rollup = self.rollup_mut(rollup_id)?;
        let pending = *rollup
            .pending_state_transitions
            .get(&pending_state_num)
            .ok_or(RollupManagerError::PendingStateNotFound(pending_state_num))?;

        rollup.last_verified_batch = pending.last_verified_batch;
        rollup
            .batch_num_to_state_root
            .insert(pending.last_verified_batch, pending.state_root);
        rollup.last_local_exit_root = pending.exit_root;
        rollup.last_pending_state_consolidated = pending_state_num;

        tracing::info!(
            rollup_id,
            pending_state_num,
            final_batch = pending.last_verified_batch,
            state_root = %short_hex(&pending.state_root),
            "pending state consolidated"
        );

        self.publish_exit_root();
        self.emit(Event::ConsolidatePendingState {
            rollup_id,
            final_batch: pending.last_verified_batch,
            state_root: pending.state_root,
            exit_root: pending.exit_root,
            pending_state_num,
        });
        Ok(())
    }

    /// Check a valid proof that reaches a different root than pending state
    /// `final_pending_state_num`. Returns the stored root it contradicts.
    fn prove_distinct_pending_state(
        &self,
        ctx: &CallContext,
        rollup_id: RollupId,
        transition: &StateTransition,
        final_pending_state_num: u64,
        proof: &Proof,
    ) -> Result<Hash> {
        let rollup = self.rollup(rollup_id)?;
        let old_state_root = resolve_old_state_root(rollup, transition, rollup.last_verified_batch)?;

        if final_pending_state_num <= transition.pending_state_num
            || final_pending_state_num > rollup.last_pending_state
            || final_pending_state_num <= rollup.last_pending_state_consolidated
        {
            return Err(RollupManagerError::FinalPendingStateNumInvalid(final_pending_state_num));
        }
        let stored = rollup
            .pending_state_transitions
            .get(&final_pending_state_num)
            .ok_or(RollupManagerError::FinalPendingStateNumInvalid(final_pending_state_num))?;
        if stored.last_verified_batch != transition.final_batch {
            return Err(RollupManagerError::FinalBatchMismatch {
                expected: stored.last_verified_batch,
                got: transition.final_batch,
            });
        }

        let input = build_snark_input(rollup, ctx.caller, old_state_root, transition)?;
        self.check_proof(rollup, &input, proof)?;

        if stored.state_root == transition.new_state_root {
            return Err(RollupManagerError::RootsIdentical);
        }
        Ok(stored.state_root)
    }

    /// Show that a pending state is contradicted by another valid proof,
    /// halting the system
    pub fn prove_non_deterministic_pending_state(
        &mut self,
        ctx: &CallContext,
        rollup_id: RollupId,
        transition: &StateTransition,
        final_pending_state_num: u64,
        proof: &Proof,
    ) -> Result<()> {
        self.ensure_not_emergency()?;
        let stored_state_root =
            self.prove_distinct_pending_state(ctx, rollup_id, transition, final_pending_state_num, proof)?;

        tracing::warn!(
            rollup_id,
            final_pending_state_num,
            stored = %short_hex(&stored_state_root),
            proved = %short_hex(&transition.new_state_root),
            "non-deterministic pending state"
        );
        self.emit(Event::ProveNonDeterministicPendingState {
            rollup_id,
            stored_state_root,
            proved_state_root: transition.new_state_root,
        });
        self.enter_emergency_state()
    }

    /// Replace a contradicted pending state with the proved root
    ///
    /// Also resets the trusted aggregator window to its maximum, so the
    /// trusted aggregator keeps control until parameters are lowered again.
    pub fn override_pending_state(
        &mut self,
        ctx: &CallContext,
        rollup_id: RollupId,
        transition: &StateTransition,
        final_pending_state_num: u64,
        proof: &Proof,
    ) -> Result<()> {
        self.access.ensure(Role::TrustedAggregator, ctx)?;
        self.prove_distinct_pending_state(ctx, rollup_id, transition, final_pending_state_num, proof)?;

        self.finalize_batches(
            rollup_id,
            transition.final_batch,
            transition.new_state_root,
            transition.new_local_exit_root,
        )?;
        if let Some(consensus) = self.consensus.get(&rollup_id) {
            consensus.on_verify_batches(transition.final_batch, transition.new_state_root, &ctx.caller);
        }
        self.trusted_aggregator_timeout = HALT_AGGREGATION_TIMEOUT;

        tracing::warn!(
            rollup_id,
            final_batch = transition.final_batch,
            state_root = %short_hex(&transition.new_state_root),
            "pending state overridden"
        );
        self.emit(Event::OverridePendingState {
            rollup_id,
            final_batch: transition.final_batch,
            state_root: transition.new_state_root,
            exit_root: transition.new_local_exit_root,
            aggregator: ctx.caller,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::collaborators::RewardLedger;
    use crate::devnet::{rollup_address, Devnet, ADMIN, GENESIS, OUTSIDER};
    use crate::memory::RecordingConsensus;

    const AGGREGATOR: Address = [0xA6; 20];

    fn transition(pending_state_num: u64, init_batch: BatchNum, final_batch: BatchNum, root: u8) -> StateTransition {
        StateTransition {
            pending_state_num,
            init_batch,
            final_batch,
            new_local_exit_root: [root.wrapping_add(0x80); 32],
            new_state_root: [root; 32],
        }
    }

    /// Devnet with one rollup sequenced up to batch 3 at t=100
    fn sequenced(trusted_timeout: u64, pending_timeout: u64) -> (Devnet, RollupId) {
        let mut net = Devnet::with_timeouts(trusted_timeout, pending_timeout).unwrap();
        let rollup_id = net.create_rollup(1001).unwrap();
        net.sequence(rollup_id, 3, 100).unwrap();
        (net, rollup_id)
    }

    #[test]
    fn test_snark_input_layout() {
        let input = SnarkInput {
            aggregator: [1u8; 20],
            old_state_root: [2u8; 32],
            old_acc_input_hash: [3u8; 32],
            init_batch: 4,
            chain_id: 5,
            fork_id: 6,
            new_state_root: [7u8; 32],
            new_acc_input_hash: [8u8; 32],
            new_local_exit_root: [9u8; 32],
            final_batch: 10,
        };
        let bytes = input.to_bytes();
        assert_eq!(bytes.len(), 212);
        assert_eq!(bytes.len(), SnarkInput::ENCODED_LEN);
        assert_eq!(&bytes[..20], &[1u8; 20]);
        assert_eq!(&bytes[84..92], &4u64.to_be_bytes());
        assert_eq!(&bytes[204..], &10u64.to_be_bytes());
        assert!(input.public_input() < snark_scalar_field());
    }

    #[test]
    fn test_scalar_field_value() {
        let expected = BigUint::parse_bytes(
            b"21888242871839275222246405745257275088548364400416034343698204186575808495617",
            10,
        )
        .unwrap();
        assert_eq!(snark_scalar_field(), expected);
    }

    #[test]
    fn test_trusted_verify_finalizes() {
        let (mut net, rollup_id) = sequenced(HALT_AGGREGATION_TIMEOUT, HALT_AGGREGATION_TIMEOUT);
        let t = transition(0, 0, 3, 0x33);
        net.verify_trusted(ADMIN, rollup_id, &t, 110).unwrap();

        let rollup = net.manager.rollup(rollup_id).unwrap();
        assert_eq!(rollup.last_verified_batch, 3);
        assert_eq!(rollup.state_root_at(3), Some([0x33; 32]));
        assert_eq!(rollup.last_pending_state, 0);
        assert_eq!(net.sink.latest(), Some(net.manager.rollup_exit_root()));
        assert_eq!(net.manager.total_verified_batches(), 3);
        assert_eq!(net.manager.last_aggregation_timestamp(), 110);
        assert_eq!(net.consensus[&rollup_id].last_verified(), Some((3, [0x33; 32])));
    }

    #[test]
    fn test_trusted_verify_requires_role() {
        let (mut net, rollup_id) = sequenced(0, 0);
        let t = transition(0, 0, 3, 0x33);
        let err = net.verify_trusted(OUTSIDER, rollup_id, &t, 110).unwrap_err();
        assert!(matches!(
            err,
            RollupManagerError::MissingRole { role: Role::TrustedAggregator, .. }
        ));
    }

    #[test]
    fn test_untrusted_waits_for_trusted_window() {
        let (mut net, rollup_id) = sequenced(1_000, 500);
        let t = transition(0, 0, 3, 0x33);

        assert_eq!(
            net.verify(AGGREGATOR, rollup_id, &t, 1_099),
            Err(RollupManagerError::TrustedAggregatorTimeoutNotExpired { ready_at: 1_100 })
        );

        net.verify(AGGREGATOR, rollup_id, &t, 1_100).unwrap();
        let rollup = net.manager.rollup(rollup_id).unwrap();
        assert_eq!(rollup.last_pending_state, 1);
        assert_eq!(rollup.last_verified_batch, 0);
        assert_eq!(net.manager.last_verified_batch(rollup_id).unwrap(), 3);
        assert_eq!(
            net.manager.pending_state(rollup_id, 1).unwrap().map(|p| p.state_root),
            Some([0x33; 32])
        );
    }

    #[test]
    fn test_unknown_final_checkpoint_uses_zero_timestamp() {
        let (mut net, rollup_id) = sequenced(1_000, 0);
        let t = transition(0, 0, 2, 0x22);
        let proof = [[0u8; 32]; PROOF_WORDS];
        let mut attempt = |now| {
            net.manager
                .verify_batches(&CallContext::new(AGGREGATOR, now), rollup_id, &t, AGGREGATOR, &proof)
        };
        assert_eq!(
            attempt(999),
            Err(RollupManagerError::TrustedAggregatorTimeoutNotExpired { ready_at: 1_000 })
        );
        // past the window the missing checkpoint is caught by the input builder
        assert_eq!(attempt(1_000), Err(RollupManagerError::NewAccInputHashMissing(2)));
    }

    #[test]
    fn test_zero_pending_timeout_finalizes_immediately() {
        let (mut net, rollup_id) = sequenced(0, 0);
        net.verify(AGGREGATOR, rollup_id, &transition(0, 0, 3, 0x33), 200).unwrap();

        let rollup = net.manager.rollup(rollup_id).unwrap();
        assert_eq!(rollup.last_verified_batch, 3);
        assert_eq!(rollup.last_pending_state, 0);
        assert_eq!(rollup.last_local_exit_root, [0xB3; 32]);
    }

    #[test]
    fn test_span_limit() {
        let mut net = Devnet::with_timeouts(0, 0).unwrap();
        let rollup_id = net.create_rollup(1001).unwrap();
        net.sequence(rollup_id, MAX_VERIFY_BATCHES + 1, 100).unwrap();

        let t = transition(0, 0, MAX_VERIFY_BATCHES + 1, 0x44);
        assert_eq!(
            net.verify(AGGREGATOR, rollup_id, &t, 200),
            Err(RollupManagerError::ExceedMaxVerifyBatches {
                span: MAX_VERIFY_BATCHES + 1,
                max: MAX_VERIFY_BATCHES
            })
        );
        // trusted path has no span limit
        net.verify_trusted(ADMIN, rollup_id, &t, 200).unwrap();
    }

    #[test]
    fn test_bad_proof_leaves_no_trace() {
        let (mut net, rollup_id) = sequenced(0, 0);
        let t = transition(0, 0, 3, 0x33);
        let before = net.manager.snapshot();

        let result = net
            .manager
            .verify_batches(&CallContext::new(AGGREGATOR, 200), rollup_id, &t, AGGREGATOR, &[[0u8; 32]; PROOF_WORDS]);
        assert_eq!(result, Err(RollupManagerError::InvalidProof));
        assert_eq!(net.manager.snapshot(), before);
        assert!(net.ledger.transfers().is_empty());
    }

    #[test]
    fn test_proof_bound_to_aggregator() {
        let (mut net, rollup_id) = sequenced(0, 0);
        let t = transition(0, 0, 3, 0x33);
        let proof = net.prove(OUTSIDER, rollup_id, &t).unwrap();
        assert_eq!(
            net.manager
                .verify_batches(&CallContext::new(AGGREGATOR, 200), rollup_id, &t, AGGREGATOR, &proof),
            Err(RollupManagerError::InvalidProof)
        );
    }

    #[test]
    fn test_final_must_pass_tip() {
        let (mut net, rollup_id) = sequenced(0, 0);
        net.verify(AGGREGATOR, rollup_id, &transition(0, 0, 3, 0x33), 200).unwrap();
        assert_eq!(
            net.verify(AGGREGATOR, rollup_id, &transition(0, 3, 3, 0x34), 201),
            Err(RollupManagerError::FinalBatchNotAboveTip { final_batch: 3, tip: 3 })
        );
        assert_eq!(
            net.verify(AGGREGATOR, rollup_id, &transition(0, 1, 3, 0x34), 201),
            Err(RollupManagerError::OldStateRootMissing(1))
        );
    }

    #[test]
    fn test_reward_paid_per_new_batch() {
        let (mut net, rollup_id) = sequenced(0, 0);
        net.ledger.deposit(3_000);
        net.verify(AGGREGATOR, rollup_id, &transition(0, 0, 3, 0x33), 200).unwrap();
        assert_eq!(net.ledger.transfers(), vec![(AGGREGATOR, 3_000)]);
        assert_eq!(net.ledger.balance(), 0);
    }

    #[test]
    fn test_failed_reward_transfer_aborts() {
        let (mut net, rollup_id) = sequenced(0, 0);
        net.ledger.deposit(3_000);
        net.ledger.fail_transfers(true);
        let before = net.manager.snapshot();
        assert!(matches!(
            net.verify(AGGREGATOR, rollup_id, &transition(0, 0, 3, 0x33), 200),
            Err(RollupManagerError::RewardTransferFailed(_))
        ));
        assert_eq!(net.manager.snapshot(), before);
    }

    #[test]
    fn test_chain_from_pending_state() {
        let (mut net, rollup_id) = sequenced(0, 1_000);
        net.verify(AGGREGATOR, rollup_id, &transition(0, 0, 3, 0x33), 200).unwrap();
        net.sequence(rollup_id, 2, 300).unwrap();

        // must start at the pending tip
        assert_eq!(
            net.verify(AGGREGATOR, rollup_id, &transition(1, 2, 5, 0x55), 400),
            Err(RollupManagerError::InitBatchMismatch { expected: 3, got: 2 })
        );
        assert_eq!(
            net.verify(AGGREGATOR, rollup_id, &transition(2, 3, 5, 0x55), 400),
            Err(RollupManagerError::PendingStateNotFound(2))
        );
        net.verify(AGGREGATOR, rollup_id, &transition(1, 3, 5, 0x55), 400).unwrap();

        let rollup = net.manager.rollup(rollup_id).unwrap();
        assert_eq!(rollup.last_pending_state, 2);
        assert_eq!(rollup.effective_last_verified_batch(), 5);
    }

    #[test]
    fn test_consolidate_permissionless_after_timeout() {
        let (mut net, rollup_id) = sequenced(0, 1_000);
        net.verify(AGGREGATOR, rollup_id, &transition(0, 0, 3, 0x33), 200).unwrap();

        let outsider = |now| CallContext::new(OUTSIDER, now);
        assert_eq!(
            net.manager.consolidate_pending_state(&outsider(1_199), rollup_id, 1),
            Err(RollupManagerError::PendingStateNotConsolidable(1))
        );
        net.manager.consolidate_pending_state(&outsider(1_200), rollup_id, 1).unwrap();
        assert_eq!(net.manager.rollup(rollup_id).unwrap().last_verified_batch, 3);

        assert_eq!(
            net.manager.consolidate_pending_state(&outsider(1_201), rollup_id, 1),
            Err(RollupManagerError::InvalidPendingStateNum(1))
        );
    }

    #[test]
    fn test_trusted_consolidation_ignores_age_and_halt() {
        let (mut net, rollup_id) = sequenced(0, 1_000);
        net.verify(AGGREGATOR, rollup_id, &transition(0, 0, 3, 0x33), 200).unwrap();
        net.manager.activate_emergency_state(&CallContext::new(ADMIN, 201)).unwrap();

        assert_eq!(
            net.manager.consolidate_pending_state(&CallContext::new(OUTSIDER, 5_000), rollup_id, 1),
            Err(RollupManagerError::EmergencyHalted)
        );
        net.manager
            .consolidate_pending_state(&CallContext::new(ADMIN, 202), rollup_id, 1)
            .unwrap();
        assert_eq!(net.manager.rollup(rollup_id).unwrap().last_pending_state_consolidated, 1);
    }

    #[test]
    fn test_sequencing_consolidates_aged_entries() {
        let (mut net, rollup_id) = sequenced(0, 1_000);
        net.verify(AGGREGATOR, rollup_id, &transition(0, 0, 3, 0x33), 200).unwrap();
        net.sequence(rollup_id, 1, 1_200).unwrap();

        let rollup = net.manager.rollup(rollup_id).unwrap();
        assert_eq!(rollup.last_pending_state_consolidated, 1);
        assert_eq!(rollup.last_verified_batch, 3);
        let events = net.manager.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::ConsolidatePendingState { pending_state_num: 1, .. })));
    }

    #[test]
    fn test_prove_distinct_roots_identical() {
        let (mut net, rollup_id) = sequenced(0, 1_000);
        let t = transition(0, 0, 3, 0x33);
        net.verify(AGGREGATOR, rollup_id, &t, 200).unwrap();

        let proof = net.prove(OUTSIDER, rollup_id, &t).unwrap();
        assert_eq!(
            net.manager.prove_non_deterministic_pending_state(
                &CallContext::new(OUTSIDER, 300),
                rollup_id,
                &t,
                1,
                &proof
            ),
            Err(RollupManagerError::RootsIdentical)
        );
        assert!(!net.manager.is_emergency_state());
    }

    #[test]
    fn test_prove_distinct_halts() {
        let (mut net, rollup_id) = sequenced(0, 1_000);
        net.verify(AGGREGATOR, rollup_id, &transition(0, 0, 3, 0x33), 200).unwrap();

        let forged = transition(0, 0, 3, 0x99);
        let proof = net.prove(OUTSIDER, rollup_id, &forged).unwrap();
        net.manager
            .prove_non_deterministic_pending_state(&CallContext::new(OUTSIDER, 300), rollup_id, &forged, 1, &proof)
            .unwrap();

        assert!(net.manager.is_emergency_state());
        assert!(net.bridge.is_halted());
        let events = net.manager.drain_events();
        assert!(events.contains(&Event::ProveNonDeterministicPendingState {
            rollup_id,
            stored_state_root: [0x33; 32],
            proved_state_root: [0x99; 32],
        }));
        assert_eq!(events.last(), Some(&Event::EmergencyStateActivated));
    }

    #[test]
    fn test_prove_distinct_index_checks() {
        let (mut net, rollup_id) = sequenced(0, 1_000);
        net.verify(AGGREGATOR, rollup_id, &transition(0, 0, 3, 0x33), 200).unwrap();
        let ctx = CallContext::new(OUTSIDER, 300);
        let proof = [[0u8; 32]; PROOF_WORDS];

        assert_eq!(
            net.manager
                .prove_non_deterministic_pending_state(&ctx, rollup_id, &transition(0, 0, 3, 0x99), 2, &proof),
            Err(RollupManagerError::FinalPendingStateNumInvalid(2))
        );
        assert_eq!(
            net.manager
                .prove_non_deterministic_pending_state(&ctx, rollup_id, &transition(0, 0, 2, 0x99), 1, &proof),
            Err(RollupManagerError::FinalBatchMismatch { expected: 3, got: 2 })
        );
    }

    #[test]
    fn test_override_replaces_root() {
        let (mut net, rollup_id) = sequenced(0, 1_000);
        net.verify(AGGREGATOR, rollup_id, &transition(0, 0, 3, 0x33), 200).unwrap();

        let forged = transition(0, 0, 3, 0x99);
        let proof = net.prove(OUTSIDER, rollup_id, &forged).unwrap();
        net.manager
            .prove_non_deterministic_pending_state(&CallContext::new(OUTSIDER, 300), rollup_id, &forged, 1, &proof)
            .unwrap();

        let proof = net.prove(ADMIN, rollup_id, &forged).unwrap();
        assert!(matches!(
            net.manager
                .override_pending_state(&CallContext::new(OUTSIDER, 400), rollup_id, &forged, 1, &proof),
            Err(RollupManagerError::MissingRole { .. })
        ));
        net.manager
            .override_pending_state(&CallContext::new(ADMIN, 400), rollup_id, &forged, 1, &proof)
            .unwrap();

        let rollup = net.manager.rollup(rollup_id).unwrap();
        assert_eq!(rollup.last_verified_batch, 3);
        assert_eq!(rollup.state_root_at(3), Some([0x99; 32]));
        assert_eq!(rollup.last_pending_state, 0);
        assert_eq!(rollup.last_pending_state_consolidated, 0);
        assert_eq!(net.manager.trusted_aggregator_timeout(), HALT_AGGREGATION_TIMEOUT);
        assert_eq!(net.consensus[&rollup_id].last_verified(), Some((3, [0x99; 32])));
    }

    #[test]
    fn test_upgrade_boundary() {
        let (mut net, rollup_id) = sequenced(0, 0);
        net.verify_trusted(ADMIN, rollup_id, &transition(0, 0, 3, 0x33), 110).unwrap();
        net.upgrade_rollup(rollup_id).unwrap();
        net.sequence(rollup_id, 2, 200).unwrap();

        assert_eq!(
            net.verify(AGGREGATOR, rollup_id, &transition(0, 0, 5, 0x55), 300),
            Err(RollupManagerError::InitBatchBeforeUpgrade { init: 0, boundary: 3 })
        );
        net.verify(AGGREGATOR, rollup_id, &transition(0, 3, 5, 0x55), 300).unwrap();
    }

    #[test]
    fn test_init_above_tip_rejected_before_root_lookup() {
        let (mut net, rollup_id) = sequenced(0, 0);
        net.verify_trusted(ADMIN, rollup_id, &transition(0, 0, 3, 0x33), 110).unwrap();
        net.sequence(rollup_id, 2, 200).unwrap();

        assert_eq!(
            net.verify(AGGREGATOR, rollup_id, &transition(0, 4, 5, 0x55), 300),
            Err(RollupManagerError::InitBatchAboveTip { init: 4, tip: 3 })
        );
    }

    #[test]
    fn test_pending_entries_survive_queue_reset() {
        let (mut net, rollup_id) = sequenced(0, 1_000);
        net.verify(AGGREGATOR, rollup_id, &transition(0, 0, 3, 0x33), 200).unwrap();
        net.sequence(rollup_id, 2, 300).unwrap();
        net.verify_trusted(ADMIN, rollup_id, &transition(0, 0, 5, 0x55), 310).unwrap();

        let rollup = net.manager.rollup(rollup_id).unwrap();
        assert_eq!(rollup.last_pending_state, 0);
        assert_eq!(rollup.last_verified_batch, 5);
        let kept = net.manager.pending_state(rollup_id, 1).unwrap().unwrap();
        assert_eq!(kept.state_root, [0x33; 32]);
        assert_eq!(kept.last_verified_batch, 3);
        // a reset entry is history, not a consolidation candidate
        assert!(!net.manager.is_pending_state_consolidable(rollup_id, 1, 5_000).unwrap());

        net.sequence(rollup_id, 1, 400).unwrap();
        net.verify(AGGREGATOR, rollup_id, &transition(0, 5, 6, 0x66), 500).unwrap();
        let renumbered = net.manager.pending_state(rollup_id, 1).unwrap().unwrap();
        assert_eq!(renumbered.state_root, [0x66; 32]);
        assert_eq!(net.manager.last_verified_batch(rollup_id).unwrap(), 6);
    }

    #[test]
    fn test_non_determinism_from_pending_start() {
        let (mut net, rollup_id) = sequenced(0, 1_000);
        net.verify(AGGREGATOR, rollup_id, &transition(0, 0, 3, 0x33), 200).unwrap();
        net.sequence(rollup_id, 2, 300).unwrap();
        net.verify(AGGREGATOR, rollup_id, &transition(1, 3, 5, 0x55), 400).unwrap();

        let forged = transition(1, 3, 5, 0x77);
        let input = net
            .manager
            .snark_input(&CallContext::new(OUTSIDER, 500), rollup_id, &forged)
            .unwrap();
        assert_eq!(input.old_state_root, [0x33; 32]);

        let ctx = CallContext::new(OUTSIDER, 500);
        let proof = net.prove(OUTSIDER, rollup_id, &forged).unwrap();
        assert_eq!(
            net.manager
                .prove_non_deterministic_pending_state(&ctx, rollup_id, &transition(1, 2, 5, 0x77), 2, &proof),
            Err(RollupManagerError::InitBatchMismatch { expected: 3, got: 2 })
        );
        net.manager
            .prove_non_deterministic_pending_state(&ctx, rollup_id, &forged, 2, &proof)
            .unwrap();
        assert!(net.manager.is_emergency_state());
        assert!(net.manager.drain_events().contains(&Event::ProveNonDeterministicPendingState {
            rollup_id,
            stored_state_root: [0x55; 32],
            proved_state_root: [0x77; 32],
        }));

        let proof = net.prove(ADMIN, rollup_id, &forged).unwrap();
        net.manager
            .override_pending_state(&CallContext::new(ADMIN, 600), rollup_id, &forged, 2, &proof)
            .unwrap();
        let rollup = net.manager.rollup(rollup_id).unwrap();
        assert_eq!(rollup.last_verified_batch, 5);
        assert_eq!(rollup.state_root_at(5), Some([0x77; 32]));
        assert_eq!(rollup.last_pending_state, 0);
    }

    #[test]
    fn test_failed_non_determinism_proof_leaves_no_trace() {
        let (mut net, rollup_id) = sequenced(0, 1_000);
        net.verify(AGGREGATOR, rollup_id, &transition(0, 0, 3, 0x33), 200).unwrap();
        net.manager.drain_events();
        let before = net.manager.snapshot();

        let forged = transition(0, 0, 3, 0x99);
        let stolen = net.prove(ADMIN, rollup_id, &forged).unwrap();
        assert_eq!(
            net.manager
                .prove_non_deterministic_pending_state(&CallContext::new(OUTSIDER, 300), rollup_id, &forged, 1, &stolen),
            Err(RollupManagerError::InvalidProof)
        );
        assert_eq!(net.manager.snapshot(), before);
        assert!(net.manager.drain_events().is_empty());
        assert!(!net.bridge.is_halted());
    }

    #[test]
    fn test_missing_verifier_rejected() {
        let mut net = Devnet::with_timeouts(0, 0).unwrap();
        let admin = CallContext::new(ADMIN, 0);
        let rollup_type_id = net
            .manager
            .add_rollup_type(
                &admin,
                RollupType {
                    consensus_implementation: [0xC0; 20],
                    verifier: [0x77; 20],
                    fork_id: 1,
                    compatibility_id: 0,
                    genesis: GENESIS,
                    description: "unregistered verifier".to_string(),
                    obsolete: false,
                },
            )
            .unwrap();
        let rollup_id = net
            .manager
            .create_rollup(&admin, rollup_type_id, 2002, rollup_address(2002), Arc::new(RecordingConsensus::new()))
            .unwrap();
        net.sequence(rollup_id, 3, 100).unwrap();

        let before = net.manager.snapshot();
        assert_eq!(
            net.verify(AGGREGATOR, rollup_id, &transition(0, 0, 3, 0x33), 200),
            Err(RollupManagerError::VerifierNotFound(format!("0x{}", hex::encode([0x77u8; 20]))))
        );
        assert_eq!(net.manager.snapshot(), before);
    }
}
