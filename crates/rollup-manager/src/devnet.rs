//! Local devnet
//!
//! A manager wired to the in-memory collaborators, one admin holding every
//! role, and a shared verifier. Drives rollups through sequencing and
//! verification the way their consensus contracts and aggregators would.
//! Used by the CLI simulation and by tests.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::access::Role;
use crate::config::{ConfigError, ManagerConfig};
use crate::error::Result;
use crate::hash_chain::{BatchData, InputHashChain};
use crate::manager::RollupManager;
use crate::memory::*;
use crate::types::*;
use crate::verification::StateTransition;

/// Holds every role
pub const ADMIN: Address = [0xAD; 20];

/// Holds no role
pub const OUTSIDER: Address = [0x0E; 20];

/// Address the shared verifier is registered under
pub const VERIFIER: Address = [0xF1; 20];

/// Genesis root of every devnet rollup
pub const GENESIS: Hash = [0x11; 32];

const GWEI: Amount = 1_000_000_000;

/// Manager plus handles on its collaborators
pub struct Devnet {
    pub manager: RollupManager,
    pub ledger: Arc<InMemoryLedger>,
    pub sink: Arc<RecordingExitRootSink>,
    pub bridge: Arc<RecordingBridge>,
    pub consensus: HashMap<RollupId, Arc<RecordingConsensus>>,
    rollup_type_id: RollupTypeId,
    chains: HashMap<RollupId, InputHashChain>,
}

impl Devnet {
    pub fn new(config: ManagerConfig) -> std::result::Result<Self, ConfigError> {
        let config = Role::ALL
            .iter()
            .fold(config, |config, role| config.with_role(*role, &ADMIN));

        let ledger = Arc::new(InMemoryLedger::new(0));
        let sink = Arc::new(RecordingExitRootSink::new());
        let bridge = Arc::new(RecordingBridge::new());

        let mut manager = RollupManager::new(&config, ledger.clone(), sink.clone())?;
        manager.register_verifier(VERIFIER, Arc::new(InputCommitmentVerifier));
        manager.register_emergency_listener(bridge.clone());

        let rollup_type_id = manager.add_rollup_type(&CallContext::new(ADMIN, 0), devnet_rollup_type(1))?;

        Ok(Self {
            manager,
            ledger,
            sink,
            bridge,
            consensus: HashMap::new(),
            rollup_type_id,
            chains: HashMap::new(),
        })
    }

    /// Default parameters with the two aggregation timeouts replaced
    pub fn with_timeouts(
        trusted_aggregator_timeout: u64,
        pending_state_timeout: u64,
    ) -> std::result::Result<Self, ConfigError> {
        Self::new(ManagerConfig {
            trusted_aggregator_timeout,
            pending_state_timeout,
            ..Default::default()
        })
    }

    /// Create a rollup on the devnet type for `chain_id`
    pub fn create_rollup(&mut self, chain_id: ChainId) -> Result<RollupId> {
        let consensus = Arc::new(RecordingConsensus::new());
        let rollup_id = self.manager.create_rollup(
            &CallContext::new(ADMIN, 0),
            self.rollup_type_id,
            chain_id,
            rollup_address(chain_id),
            consensus.clone(),
        )?;
        self.consensus.insert(rollup_id, consensus);
        self.chains.insert(rollup_id, InputHashChain::new());
        Ok(rollup_id)
    }

    /// Move a rollup onto a freshly added type with the next fork id
    pub fn upgrade_rollup(&mut self, rollup_id: RollupId) -> Result<RollupTypeId> {
        let ctx = CallContext::new(ADMIN, 0);
        let rollup = self.manager.rollup(rollup_id)?;
        let rollup_contract = rollup.rollup_contract;
        let fork_id = rollup.fork_id + 1;

        let new_type = self.manager.add_rollup_type(&ctx, devnet_rollup_type(fork_id))?;
        self.manager.update_rollup(&ctx, &rollup_contract, new_type)?;
        Ok(new_type)
    }

    pub fn rollup_address(&self, rollup_id: RollupId) -> Result<Address> {
        Ok(self.manager.rollup(rollup_id)?.rollup_contract)
    }

    /// Sequence `batches` synthetic batches as the rollup itself
    pub fn sequence(&mut self, rollup_id: RollupId, batches: u64, now: Timestamp) -> Result<BatchNum> {
        let rollup = self.manager.rollup(rollup_id)?;
        let sequencer = rollup.rollup_contract;
        let first = rollup.last_batch_sequenced + 1;
        let global_exit_root = self.manager.latest_global_root();

        let mut chain = self.chains.get(&rollup_id).cloned().unwrap_or_default();
        for batch_num in first..first + batches {
            let mut transactions = rollup_id.to_be_bytes().to_vec();
            transactions.extend_from_slice(&batch_num.to_be_bytes());
            chain.append(
                &BatchData::from_transactions(&transactions, global_exit_root, now),
                &sequencer,
            );
        }

        let last = self
            .manager
            .on_sequence_batches(&CallContext::new(sequencer, now), batches, 0, chain.head())?;
        self.chains.insert(rollup_id, chain);
        Ok(last)
    }

    /// Transition from the effective tip to the last sequenced batch
    pub fn next_transition(&self, rollup_id: RollupId) -> Result<StateTransition> {
        let rollup = self.manager.rollup(rollup_id)?;
        let final_batch = rollup.last_batch_sequenced;
        Ok(StateTransition {
            pending_state_num: rollup.last_pending_state,
            init_batch: rollup.effective_last_verified_batch(),
            final_batch,
            new_local_exit_root: synthetic_root(b"exit", rollup_id, final_batch),
            new_state_root: synthetic_root(b"state", rollup_id, final_batch),
        })
    }

    /// Proof the shared verifier accepts from `aggregator`
    pub fn prove(&self, aggregator: Address, rollup_id: RollupId, transition: &StateTransition) -> Result<Proof> {
        let input = self
            .manager
            .snark_input(&CallContext::new(aggregator, 0), rollup_id, transition)?;
        Ok(commitment_proof(&input.public_input()))
    }

    /// Untrusted verification, reward paid to the aggregator
    pub fn verify(
        &mut self,
        aggregator: Address,
        rollup_id: RollupId,
        transition: &StateTransition,
        now: Timestamp,
    ) -> Result<()> {
        let proof = self.prove(aggregator, rollup_id, transition)?;
        self.manager
            .verify_batches(&CallContext::new(aggregator, now), rollup_id, transition, aggregator, &proof)
    }

    pub fn verify_trusted(
        &mut self,
        aggregator: Address,
        rollup_id: RollupId,
        transition: &StateTransition,
        now: Timestamp,
    ) -> Result<()> {
        let proof = self.prove(aggregator, rollup_id, transition)?;
        self.manager
            .verify_batches_trusted(&CallContext::new(aggregator, now), rollup_id, transition, aggregator, &proof)
    }
}

fn devnet_rollup_type(fork_id: u64) -> RollupType {
    RollupType {
        consensus_implementation: [0xC0; 20],
        verifier: VERIFIER,
        fork_id,
        compatibility_id: 0,
        genesis: GENESIS,
        description: format!("devnet fork {}", fork_id),
        obsolete: false,
    }
}

/// Rollup contract address for a chain id
pub fn rollup_address(chain_id: ChainId) -> Address {
    let mut address = [0xC0; 20];
    address[12..].copy_from_slice(&chain_id.to_be_bytes());
    address
}

fn synthetic_root(domain: &[u8], rollup_id: RollupId, batch: BatchNum) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(domain);
    hasher.update(rollup_id.to_be_bytes());
    hasher.update(batch.to_be_bytes());
    hasher.finalize().into()
}

// ============================================================================
// Simulation
// ============================================================================

/// Scripted run parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub rollups: u32,
    pub rounds: u32,
    pub batches_per_round: u64,
    pub seconds_per_round: u64,
    /// Initial reward pool in gwei
    pub reward_pool_gwei: u64,
    /// First chain id, the rest are consecutive
    pub first_chain_id: ChainId,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rollups: 2,
            rounds: 10,
            batches_per_round: 5,
            seconds_per_round: 600,
            reward_pool_gwei: 1_000_000_000,
            first_chain_id: 1001,
        }
    }
}

/// Config file read by the CLI: manager parameters plus a `simulation` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationFile {
    #[serde(flatten)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl SimulationFile {
    pub fn from_yaml_str(s: &str) -> std::result::Result<Self, ConfigError> {
        let file: Self = serde_yaml::from_str(s)?;
        file.manager.validate()?;
        Ok(file)
    }

    pub fn load(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }
}

/// Outcome of a simulation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub rounds: u32,
    pub trusted_verifications: u64,
    pub untrusted_verifications: u64,
    pub consolidations: u64,
    pub rewards_paid: Amount,
    pub initial_batch_fee: Amount,
    pub final_batch_fee: Amount,
    pub total_sequenced_batches: u64,
    pub total_verified_batches: u64,
    pub rollup_exit_root: Hash,
}

/// Aggregator without special roles
pub const PERMISSIONLESS_AGGREGATOR: Address = [0xA6; 20];

impl Devnet {
    /// Run `sim` rounds: every rollup sequences, then the trusted
    /// aggregator verifies while its window is open and a permissionless
    /// aggregator verifies after it expired.
    pub fn run_simulation(&mut self, sim: &SimulationConfig) -> Result<SimulationReport> {
        self.ledger.deposit(sim.reward_pool_gwei as Amount * GWEI);

        let mut rollup_ids = Vec::with_capacity(sim.rollups as usize);
        for i in 0..sim.rollups {
            rollup_ids.push(self.create_rollup(sim.first_chain_id + i as ChainId)?);
        }

        let initial_batch_fee = self.manager.batch_fee();
        let mut trusted_verifications = 0;
        let mut untrusted_verifications = 0;
        let mut consolidations = 0;

        for round in 0..sim.rounds {
            let now = (round as u64 + 1) * sim.seconds_per_round;

            for &rollup_id in &rollup_ids {
                self.sequence(rollup_id, sim.batches_per_round, now)?;
            }

            // verification lands half a round after sequencing
            let verify_at = now + sim.seconds_per_round / 2;
            for &rollup_id in &rollup_ids {
                let transition = self.next_transition(rollup_id)?;
                let window_closes = self
                    .manager
                    .sequenced_batch(rollup_id, transition.final_batch)?
                    .map_or(0, |c| c.sequenced_timestamp)
                    .saturating_add(self.manager.trusted_aggregator_timeout());

                if window_closes <= verify_at {
                    self.verify(PERMISSIONLESS_AGGREGATOR, rollup_id, &transition, verify_at)?;
                    untrusted_verifications += 1;
                } else {
                    self.verify_trusted(ADMIN, rollup_id, &transition, verify_at)?;
                    trusted_verifications += 1;
                }
            }

            consolidations += self
                .manager
                .drain_events()
                .iter()
                .filter(|e| matches!(e, crate::events::Event::ConsolidatePendingState { .. }))
                .count() as u64;

            tracing::info!(
                round,
                batch_fee = self.manager.batch_fee(),
                rollup_exit_root = %short_hex(&self.manager.rollup_exit_root()),
                "round complete"
            );
        }

        Ok(SimulationReport {
            rounds: sim.rounds,
            trusted_verifications,
            untrusted_verifications,
            consolidations,
            rewards_paid: self.ledger.total_paid(),
            initial_batch_fee,
            final_batch_fee: self.manager.batch_fee(),
            total_sequenced_batches: self.manager.total_sequenced_batches(),
            total_verified_batches: self.manager.total_verified_batches(),
            rollup_exit_root: self.manager.rollup_exit_root(),
        })
    }
}
