//! Merkle root over an ordered list of message ids.
//!
//! RFC 6962 tree shape with BLAKE3 as the hash:
//!
//! - empty list: `H("")`
//! - leaf: `H(0x00 || message_id)`
//! - node: `H(0x01 || left || right)`, where the left subtree holds the
//!   largest power of two strictly smaller than the number of leaves.
//!
//! Domain-separating leaves from nodes keeps a leaf from being passed off
//! as an inner node.

use tangle_types::{MerkleRoot, MessageId};

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Compute the merkle root of `ids` in the given order.
pub fn merkle_root(ids: &[MessageId]) -> MerkleRoot {
    if ids.is_empty() {
        return blake3::hash(b"").into();
    }
    subtree_root(ids)
}

fn subtree_root(ids: &[MessageId]) -> MerkleRoot {
    if let [id] = ids {
        return leaf_hash(id);
    }
    let split = largest_power_of_two_below(ids.len());
    let left = subtree_root(&ids[..split]);
    let right = subtree_root(&ids[split..]);
    node_hash(&left, &right)
}

fn leaf_hash(id: &MessageId) -> MerkleRoot {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(id.as_bytes());
    hasher.finalize().into()
}

fn node_hash(left: &MerkleRoot, right: &MerkleRoot) -> MerkleRoot {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Largest power of two strictly smaller than `n` (`n >= 2`).
fn largest_power_of_two_below(n: usize) -> usize {
    debug_assert!(n >= 2);
    let mut k = 1;
    while k << 1 < n {
        k <<= 1;
    }
    k
}
