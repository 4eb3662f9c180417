//! Rollup exit root aggregation
//!
//! Sequential (left-filled) Keccak-256 merkle tree of depth 32 whose leaves
//! are every rollup's last local exit root in id order. Missing siblings are
//! the zero hash of their level:
//!
//! ```text
//! z[0]   = 0x00..00
//! z[i+1] = keccak(z[i] ‖ z[i])
//! ```
//!
//! Recomputed from scratch on every consolidation. Rollup counts are small,
//! so there is no incremental tree.

use sha3::{Digest, Keccak256};

use crate::types::{Hash, ZERO_HASH};

/// Depth of the rollup exit tree
pub const EXIT_TREE_DEPTH: usize = 32;

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Zero hashes for levels `0..depth`
pub fn zero_hashes(depth: usize) -> Vec<Hash> {
    let mut zeros = Vec::with_capacity(depth);
    let mut current = ZERO_HASH;
    for _ in 0..depth {
        zeros.push(current);
        current = hash_pair(&current, &current);
    }
    zeros
}

/// Root over `leaves`, all-zero when there are none
pub fn compute_rollup_exit_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return ZERO_HASH;
    }

    let mut nodes = leaves.to_vec();
    let mut zero = ZERO_HASH;
    let mut remaining_levels = EXIT_TREE_DEPTH;

    while nodes.len() > 1 {
        let next_level: Vec<Hash> = nodes
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_pair(left, right),
                [last] => hash_pair(last, &zero),
                _ => unreachable!("chunks(2) yields one or two nodes"),
            })
            .collect();

        nodes = next_level;
        zero = hash_pair(&zero, &zero);
        remaining_levels -= 1;
    }

    // Everything right of the filled subtree is empty
    let mut root = nodes[0];
    for _ in 0..remaining_levels {
        root = hash_pair(&root, &zero);
        zero = hash_pair(&zero, &zero);
    }

    root
}

/// Root recomputed from a leaf and its siblings, used to check inclusion
pub fn root_from_siblings(index: usize, leaf: Hash, siblings: &[Hash]) -> Hash {
    let mut node = leaf;
    let mut rest = index;
    for sibling in siblings {
        node = if rest & 1 == 0 {
            hash_pair(&node, sibling)
        } else {
            hash_pair(sibling, &node)
        };
        rest >>= 1;
    }
    node
}

/// Sibling path for `leaves[index]` in the same tree `compute_rollup_exit_root` builds
pub fn exit_root_siblings(leaves: &[Hash], index: usize) -> Option<Vec<Hash>> {
    if index >= leaves.len() {
        return None;
    }

    let zeros = zero_hashes(EXIT_TREE_DEPTH);
    let mut siblings = Vec::with_capacity(EXIT_TREE_DEPTH);
    let mut nodes = leaves.to_vec();
    let mut rest = index;

    for zero in zeros.iter() {
        let sibling = nodes.get(rest ^ 1).copied().unwrap_or(*zero);
        siblings.push(sibling);

        nodes = nodes
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_pair(left, right),
                [last] => hash_pair(last, zero),
                _ => unreachable!("chunks(2) yields one or two nodes"),
            })
            .collect();
        rest >>= 1;
    }

    Some(siblings)
}
