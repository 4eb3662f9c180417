//! In-process collaborators
//!
//! Stand-ins for the proof system, reward token, global exit root contract,
//! rollup consensus and bridge. They record every call so tests can assert
//! on them, and back the CLI simulation.

use num_bigint::BigUint;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::collaborators::{EmergencyListener, ExitRootSink, ProofVerifier, RewardLedger, RollupConsensus};
use crate::types::*;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Public input as a left-padded 32-byte word
fn input_word(public_input: &BigUint) -> Hash {
    let bytes = public_input.to_bytes_be();
    let mut word = ZERO_HASH;
    let len = bytes.len().min(32);
    word[32 - len..].copy_from_slice(&bytes[bytes.len() - len..]);
    word
}

/// Proof accepted by [`InputCommitmentVerifier`] for `public_input`
pub fn commitment_proof(public_input: &BigUint) -> Proof {
    let mut proof = [ZERO_HASH; PROOF_WORDS];
    proof[0] = input_word(public_input);
    proof
}

/// Accepts a proof whose first word commits to the public input
///
/// Not sound. Exercises everything around the proof check without a
/// proving system.
#[derive(Debug, Default)]
pub struct InputCommitmentVerifier;

impl ProofVerifier for InputCommitmentVerifier {
    fn verify_proof(&self, proof: &Proof, public_input: &BigUint) -> bool {
        proof[0] == input_word(public_input)
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    balance: Amount,
    transfers: Vec<(Address, Amount)>,
    fail_transfers: bool,
}

/// Reward pool held in memory
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new(balance: Amount) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                balance,
                ..Default::default()
            }),
        }
    }

    pub fn deposit(&self, amount: Amount) {
        let mut state = lock(&self.state);
        state.balance = state.balance.saturating_add(amount);
    }

    /// Make every following transfer fail
    pub fn fail_transfers(&self, fail: bool) {
        lock(&self.state).fail_transfers = fail;
    }

    pub fn transfers(&self) -> Vec<(Address, Amount)> {
        lock(&self.state).transfers.clone()
    }

    pub fn total_paid(&self) -> Amount {
        lock(&self.state).transfers.iter().map(|(_, amount)| amount).sum()
    }
}

impl RewardLedger for InMemoryLedger {
    fn balance(&self) -> Amount {
        lock(&self.state).balance
    }

    fn transfer(&self, to: &Address, amount: Amount) -> Result<(), String> {
        let mut state = lock(&self.state);
        if state.fail_transfers {
            return Err("transfers disabled".to_string());
        }
        if amount > state.balance {
            return Err(format!("insufficient balance: {} < {}", state.balance, amount));
        }
        state.balance -= amount;
        state.transfers.push((*to, amount));
        Ok(())
    }
}

/// Exit root sink keeping every root it was handed
#[derive(Debug, Default)]
pub struct RecordingExitRootSink {
    roots: Mutex<Vec<Hash>>,
}

impl RecordingExitRootSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<Hash> {
        lock(&self.roots).last().copied()
    }

    pub fn updates(&self) -> usize {
        lock(&self.roots).len()
    }
}

impl ExitRootSink for RecordingExitRootSink {
    fn update_exit_root(&self, rollup_exit_root: Hash) {
        lock(&self.roots).push(rollup_exit_root);
    }

    fn latest_global_root(&self) -> Hash {
        self.latest().unwrap_or(ZERO_HASH)
    }
}

/// Consensus instance recording verification callbacks
#[derive(Debug, Default)]
pub struct RecordingConsensus {
    verified: Mutex<Vec<(BatchNum, Hash, Address)>>,
}

impl RecordingConsensus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last `(final_batch, state_root)` the manager reported
    pub fn last_verified(&self) -> Option<(BatchNum, Hash)> {
        lock(&self.verified).last().map(|(batch, root, _)| (*batch, *root))
    }
}

impl RollupConsensus for RecordingConsensus {
    fn on_verify_batches(&self, final_batch: BatchNum, new_state_root: Hash, aggregator: &Address) {
        lock(&self.verified).push((final_batch, new_state_root, *aggregator));
    }
}

/// Bridge that only tracks whether it is halted
#[derive(Debug, Default)]
pub struct RecordingBridge {
    halted: Mutex<bool>,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_halted(&self) -> bool {
        *lock(&self.halted)
    }
}

impl EmergencyListener for RecordingBridge {
    fn activate_emergency_state(&self) {
        *lock(&self.halted) = true;
    }

    fn deactivate_emergency_state(&self) {
        *lock(&self.halted) = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commitment_proof_accepted() {
        let input = BigUint::from(0xDEADBEEFu64);
        let proof = commitment_proof(&input);
        let verifier = InputCommitmentVerifier;
        assert!(verifier.verify_proof(&proof, &input));
        assert!(!verifier.verify_proof(&proof, &BigUint::from(1u8)));
        assert_eq!(&proof[0][28..], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_ledger_balance_and_failures() {
        let ledger = InMemoryLedger::new(100);
        ledger.transfer(&[1u8; 20], 40).unwrap();
        assert_eq!(ledger.balance(), 60);
        assert!(ledger.transfer(&[1u8; 20], 61).is_err());

        ledger.fail_transfers(true);
        assert!(ledger.transfer(&[1u8; 20], 0).is_err());
        assert_eq!(ledger.total_paid(), 40);
    }

    #[test]
    fn test_sink_and_bridge() {
        let sink = RecordingExitRootSink::new();
        assert_eq!(sink.latest_global_root(), ZERO_HASH);
        sink.update_exit_root([4u8; 32]);
        assert_eq!(sink.latest(), Some([4u8; 32]));
        assert_eq!(sink.updates(), 1);

        let bridge = RecordingBridge::new();
        bridge.activate_emergency_state();
        assert!(bridge.is_halted());
        bridge.deactivate_emergency_state();
        assert!(!bridge.is_halted());
    }
}
