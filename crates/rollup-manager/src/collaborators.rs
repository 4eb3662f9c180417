//! External capabilities the manager depends on
//!
//! None of these are implemented here for real. The proof system, the reward
//! token, the global exit root contract, per-rollup consensus and the bridge
//! are all somebody else's problem; the manager only talks to them through
//! these traits. `memory.rs` has in-process versions for tests and the CLI.

use num_bigint::BigUint;

use crate::types::{Address, Amount, BatchNum, Hash, Proof};

/// Succinct proof check for one verifier key
pub trait ProofVerifier: Send + Sync {
    /// `public_input` is already reduced into the scalar field
    fn verify_proof(&self, proof: &Proof, public_input: &BigUint) -> bool;
}

/// Reward pool paying aggregators
pub trait RewardLedger: Send + Sync {
    /// Pool balance held by the manager
    fn balance(&self) -> Amount;

    fn transfer(&self, to: &Address, amount: Amount) -> Result<(), String>;
}

/// Consumer of the aggregated rollup exit root
pub trait ExitRootSink: Send + Sync {
    fn update_exit_root(&self, rollup_exit_root: Hash);

    fn latest_global_root(&self) -> Hash;
}

/// Per-rollup consensus instance notified on every verification
pub trait RollupConsensus: Send + Sync {
    fn on_verify_batches(&self, final_batch: BatchNum, new_state_root: Hash, aggregator: &Address);
}

/// Anything that must freeze together with the manager (bridges)
pub trait EmergencyListener: Send + Sync {
    fn activate_emergency_state(&self);

    fn deactivate_emergency_state(&self);
}
