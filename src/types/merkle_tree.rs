//! Merkle roots over ordered transaction ids.
//!
//! - the empty list maps to SHA3-256 of the empty string
//! - a single leaf is its own root
//! - on odd levels the last node is paired with itself
//!
//! Interior nodes are domain separated from leaves, and the reduction runs
//! in place over the leaf vector.

use crate::core::transaction::Transaction;
use crate::types::hash::Hash;

const MERKLE_NODE_PREFIX: &[u8] = b"MERKLE_NODE";

pub struct MerkleTree;

impl MerkleTree {
    /// Root of a block with no transactions.
    pub fn empty_root() -> Hash {
        Hash::sha3().finalize()
    }

    fn hash_pair(left: &Hash, right: &Hash) -> Hash {
        let mut h = Hash::sha3();
        h.update(MERKLE_NODE_PREFIX);
        h.update(left.as_slice());
        h.update(right.as_slice());
        h.finalize()
    }

    /// Computes the root of `nodes`, consuming the vector as scratch space.
    pub fn from_raw(mut nodes: Vec<Hash>) -> Hash {
        if nodes.is_empty() {
            return Self::empty_root();
        }

        let mut len = nodes.len();
        while len > 1 {
            let mut write = 0;
            for read in (0..len).step_by(2) {
                let right = if read + 1 < len { read + 1 } else { read };
                nodes[write] = Self::hash_pair(&nodes[read], &nodes[right]);
                write += 1;
            }
            len = write;
        }

        nodes[0]
    }

    /// Root over `tx.id(chain_id)` for every transaction, in block order.
    pub fn from_transactions(txs: &[Transaction], chain_id: u64) -> Hash {
        Self::from_raw(txs.iter().map(|tx| tx.id(chain_id)).collect())
    }
}
