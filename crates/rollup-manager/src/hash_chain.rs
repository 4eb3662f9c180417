//! Accumulated input hash chain
//!
//! Each rollup commits to everything it ever sequenced through a running
//! Keccak-256 chain:
//!
//! ```text
//! acc[n] = keccak(acc[n-1] ‖ transactions_hash ‖ global_exit_root ‖ timestamp ‖ sequencer)
//! ```
//!
//! The manager never recomputes the chain, it only stores the head the rollup
//! reports at each checkpoint. Proofs bind the heads at both ends of the
//! verified range, which is what ties a state transition to the sequenced data.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::types::{Address, Hash, Timestamp, ZERO_HASH};

/// One sequenced batch as committed into the chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchData {
    /// Hash of the raw transaction bytes
    pub transactions_hash: Hash,
    /// Global exit root the batch was built against
    pub global_exit_root: Hash,
    /// Batch timestamp
    pub timestamp: Timestamp,
}

impl BatchData {
    /// Batch built from raw transaction bytes
    pub fn from_transactions(transactions: &[u8], global_exit_root: Hash, timestamp: Timestamp) -> Self {
        Self {
            transactions_hash: Keccak256::digest(transactions).into(),
            global_exit_root,
            timestamp,
        }
    }
}

/// Next chain head after appending `batch`
pub fn next_acc_input_hash(previous: &Hash, batch: &BatchData, sequencer: &Address) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(previous);
    hasher.update(&batch.transactions_hash);
    hasher.update(&batch.global_exit_root);
    hasher.update(&batch.timestamp.to_be_bytes());
    hasher.update(sequencer);
    hasher.finalize().into()
}

/// Running chain head for one rollup
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputHashChain {
    head: Hash,
    len: u64,
}

impl Default for InputHashChain {
    fn default() -> Self {
        Self::new()
    }
}

impl InputHashChain {
    /// Empty chain, head is the zero hash
    pub fn new() -> Self {
        Self { head: ZERO_HASH, len: 0 }
    }

    pub fn head(&self) -> Hash {
        self.head
    }

    /// Number of batches folded in
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn append(&mut self, batch: &BatchData, sequencer: &Address) -> Hash {
        self.head = next_acc_input_hash(&self.head, batch, sequencer);
        self.len += 1;
        self.head
    }

    /// Fold a whole sequence, returns the new head
    pub fn extend<'a, I>(&mut self, batches: I, sequencer: &Address) -> Hash
    where
        I: IntoIterator<Item = &'a BatchData>,
    {
        for batch in batches {
            self.append(batch, sequencer);
        }
        self.head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn batch(i: u8) -> BatchData {
        BatchData::from_transactions(&[i; 16], [i; 32], 1_700_000_000 + i as u64)
    }

    #[test]
    fn test_chain_changes_every_append() {
        let mut chain = InputHashChain::new();
        let sequencer = [7u8; 20];
        let mut seen = vec![chain.head()];
        for i in 0..4 {
            let head = chain.append(&batch(i), &sequencer);
            assert!(!seen.contains(&head));
            seen.push(head);
        }
        assert_eq!(chain.len(), 4);
    }

    #[test]
    fn test_sequencer_is_bound() {
        let b = batch(1);
        assert_ne!(
            next_acc_input_hash(&ZERO_HASH, &b, &[1u8; 20]),
            next_acc_input_hash(&ZERO_HASH, &b, &[2u8; 20])
        );
    }

    #[test]
    fn test_extend_matches_append() {
        let sequencer = [3u8; 20];
        let batches: Vec<_> = (0..3).map(batch).collect();

        let mut a = InputHashChain::new();
        for b in &batches {
            a.append(b, &sequencer);
        }
        let mut b = InputHashChain::new();
        b.extend(&batches, &sequencer);
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn prop_head_is_deterministic(
            prev in any::<[u8; 32]>(),
            txs in proptest::collection::vec(any::<u8>(), 0..64),
            ger in any::<[u8; 32]>(),
            ts in any::<u64>(),
            seq in any::<[u8; 20]>(),
        ) {
            let b = BatchData::from_transactions(&txs, ger, ts);
            prop_assert_eq!(
                next_acc_input_hash(&prev, &b, &seq),
                next_acc_input_hash(&prev, &b.clone(), &seq)
            );
        }
    }
}
