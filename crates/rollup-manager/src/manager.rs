//! Rollup manager state
//!
//! One context object owns everything shared between rollups: the registry,
//! global counters, the fee policy, timeouts and the emergency flag. Every
//! operation takes `&mut self` plus a `CallContext`, so calls are applied one
//! at a time and each either fully succeeds or leaves the state untouched.
//!
//! The operations themselves live next to the component they belong to:
//! `registry.rs`, `sequencing.rs`, `verification.rs`, `emergency.rs` and
//! `governance.rs` each add an `impl RollupManager` block.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::access::AccessControl;
use crate::collaborators::{EmergencyListener, ExitRootSink, ProofVerifier, RewardLedger, RollupConsensus};
use crate::config::{ConfigError, ManagerConfig};
use crate::error::{Result, RollupManagerError};
use crate::events::Event;
use crate::exit_root::{compute_rollup_exit_root, exit_root_siblings};
use crate::fee::{reward_per_batch, FeeController};
use crate::registry::RollupRegistry;
use crate::types::*;

/// Multi-rollup verification and finality manager
pub struct RollupManager {
    pub(crate) registry: RollupRegistry,
    pub(crate) access: AccessControl,
    pub(crate) fee: FeeController,

    pub(crate) total_sequenced_batches: u64,
    pub(crate) total_verified_batches: u64,
    pub(crate) total_pending_forced_batches: u64,
    pub(crate) trusted_aggregator_timeout: u64,
    pub(crate) pending_state_timeout: u64,
    pub(crate) last_aggregation_timestamp: Timestamp,
    pub(crate) is_emergency_state: bool,

    pub(crate) verifiers: HashMap<Address, Arc<dyn ProofVerifier>>,
    pub(crate) consensus: HashMap<RollupId, Arc<dyn RollupConsensus>>,
    pub(crate) ledger: Arc<dyn RewardLedger>,
    pub(crate) exit_root_sink: Arc<dyn ExitRootSink>,
    pub(crate) emergency_listeners: Vec<Arc<dyn EmergencyListener>>,

    events: Vec<Event>,
}

impl RollupManager {
    /// Manager with no rollups, parameters taken from `config`
    pub fn new(
        config: &ManagerConfig,
        ledger: Arc<dyn RewardLedger>,
        exit_root_sink: Arc<dyn ExitRootSink>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            registry: RollupRegistry::new(),
            access: config.access_control()?,
            fee: config.fee_controller(),
            total_sequenced_batches: 0,
            total_verified_batches: 0,
            total_pending_forced_batches: 0,
            trusted_aggregator_timeout: config.trusted_aggregator_timeout,
            pending_state_timeout: config.pending_state_timeout,
            last_aggregation_timestamp: 0,
            is_emergency_state: false,
            verifiers: HashMap::new(),
            consensus: HashMap::new(),
            ledger,
            exit_root_sink,
            emergency_listeners: Vec::new(),
            events: Vec::new(),
        })
    }

    /// Make a verifier available under `address`
    pub fn register_verifier(&mut self, address: Address, verifier: Arc<dyn ProofVerifier>) {
        self.verifiers.insert(address, verifier);
    }

    /// Add a collaborator that halts together with the manager
    pub fn register_emergency_listener(&mut self, listener: Arc<dyn EmergencyListener>) {
        self.emergency_listeners.push(listener);
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    /// Take every event emitted since the last drain
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn registry(&self) -> &RollupRegistry {
        &self.registry
    }

    pub fn rollup(&self, rollup_id: RollupId) -> Result<&RollupData> {
        self.registry
            .rollup(rollup_id)
            .ok_or(RollupManagerError::RollupNotFound(rollup_id))
    }

    pub(crate) fn rollup_mut(&mut self, rollup_id: RollupId) -> Result<&mut RollupData> {
        self.registry
            .rollup_mut(rollup_id)
            .ok_or(RollupManagerError::RollupNotFound(rollup_id))
    }

    pub fn rollup_type(&self, rollup_type_id: RollupTypeId) -> Option<&RollupType> {
        self.registry.rollup_type(rollup_type_id)
    }

    pub fn rollup_id_by_chain(&self, chain_id: ChainId) -> Option<RollupId> {
        self.registry.rollup_id_by_chain(chain_id)
    }

    pub fn rollup_id_by_address(&self, address: &Address) -> Option<RollupId> {
        self.registry.rollup_id_by_address(address)
    }

    pub fn rollup_count(&self) -> u32 {
        self.registry.rollup_count()
    }

    pub fn rollup_type_count(&self) -> u32 {
        self.registry.rollup_type_count()
    }

    /// Effective tip: the newest pending state if any, else consolidated
    pub fn last_verified_batch(&self, rollup_id: RollupId) -> Result<BatchNum> {
        Ok(self.rollup(rollup_id)?.effective_last_verified_batch())
    }

    pub fn is_pending_state_consolidable(&self, rollup_id: RollupId, pending_state_num: u64, now: Timestamp) -> Result<bool> {
        Ok(self
            .rollup(rollup_id)?
            .is_pending_state_consolidable(pending_state_num, self.pending_state_timeout, now))
    }

    pub fn state_root_at(&self, rollup_id: RollupId, batch: BatchNum) -> Result<Option<Hash>> {
        Ok(self.rollup(rollup_id)?.state_root_at(batch))
    }

    pub fn sequenced_batch(&self, rollup_id: RollupId, batch: BatchNum) -> Result<Option<SequencedBatchData>> {
        Ok(self.rollup(rollup_id)?.sequenced_batches.get(&batch).copied())
    }

    pub fn pending_state(&self, rollup_id: RollupId, pending_state_num: u64) -> Result<Option<PendingState>> {
        Ok(self
            .rollup(rollup_id)?
            .pending_state_transitions
            .get(&pending_state_num)
            .copied())
    }

    pub fn batch_fee(&self) -> Amount {
        self.fee.batch_fee
    }

    pub fn forced_batch_fee(&self) -> Amount {
        self.fee.forced_batch_fee()
    }

    pub fn fee_controller(&self) -> &FeeController {
        &self.fee
    }

    /// Reward per batch from the current pool balance
    pub fn reward_per_batch(&self) -> Amount {
        reward_per_batch(
            self.ledger.balance(),
            self.total_sequenced_batches,
            self.total_verified_batches,
        )
    }

    /// Aggregated root over every rollup's local exit root
    pub fn rollup_exit_root(&self) -> Hash {
        compute_rollup_exit_root(&self.registry.local_exit_roots())
    }

    /// Sibling path of a rollup's local exit root in the aggregated tree
    pub fn local_exit_root_siblings(&self, rollup_id: RollupId) -> Result<Vec<Hash>> {
        let leaves = self.registry.local_exit_roots();
        rollup_id
            .checked_sub(1)
            .and_then(|index| exit_root_siblings(&leaves, index as usize))
            .ok_or(RollupManagerError::RollupNotFound(rollup_id))
    }

    pub fn latest_global_root(&self) -> Hash {
        self.exit_root_sink.latest_global_root()
    }

    pub fn total_sequenced_batches(&self) -> u64 {
        self.total_sequenced_batches
    }

    pub fn total_verified_batches(&self) -> u64 {
        self.total_verified_batches
    }

    pub fn total_pending_forced_batches(&self) -> u64 {
        self.total_pending_forced_batches
    }

    pub fn trusted_aggregator_timeout(&self) -> u64 {
        self.trusted_aggregator_timeout
    }

    pub fn pending_state_timeout(&self) -> u64 {
        self.pending_state_timeout
    }

    pub fn last_aggregation_timestamp(&self) -> Timestamp {
        self.last_aggregation_timestamp
    }

    pub fn is_emergency_state(&self) -> bool {
        self.is_emergency_state
    }

    /// Serializable copy of all bookkeeping
    pub fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            rollup_types: self.registry.rollup_types().map(|(_, t)| t.clone()).collect(),
            rollups: self.registry.rollups().map(|(_, r)| r.clone()).collect(),
            total_sequenced_batches: self.total_sequenced_batches,
            total_verified_batches: self.total_verified_batches,
            total_pending_forced_batches: self.total_pending_forced_batches,
            fee: self.fee.clone(),
            trusted_aggregator_timeout: self.trusted_aggregator_timeout,
            pending_state_timeout: self.pending_state_timeout,
            last_aggregation_timestamp: self.last_aggregation_timestamp,
            is_emergency_state: self.is_emergency_state,
            rollup_exit_root: self.rollup_exit_root(),
        }
    }

    /// Recompute the aggregated exit root and hand it to the sink
    pub(crate) fn publish_exit_root(&self) -> Hash {
        let root = self.rollup_exit_root();
        self.exit_root_sink.update_exit_root(root);
        tracing::debug!(rollup_exit_root = %short_hex(&root), "exit root published");
        root
    }
}

/// Point-in-time view for audits and the CLI
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSnapshot {
    /// Index `i` is type `i + 1`
    pub rollup_types: Vec<RollupType>,
    /// Index `i` is rollup `i + 1`
    pub rollups: Vec<RollupData>,
    pub total_sequenced_batches: u64,
    pub total_verified_batches: u64,
    pub total_pending_forced_batches: u64,
    pub fee: FeeController,
    pub trusted_aggregator_timeout: u64,
    pub pending_state_timeout: u64,
    pub last_aggregation_timestamp: Timestamp,
    pub is_emergency_state: bool,
    pub rollup_exit_root: Hash,
}

impl ManagerSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
