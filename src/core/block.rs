//! Block and header structures.

use crate::core::transaction::Transaction;
use crate::crypto::key_pair::Signature;
use crate::types::address::Address;
use crate::types::encoding::Encode;
use crate::types::hash::{Hash, HashBuilder};
use crate::types::merkle_tree::MerkleTree;
use remitchain_derive::BinaryCodec;
use std::time::{SystemTime, UNIX_EPOCH};

/// Block header. The field order is part of the canonical encoding.
#[derive(Clone, Debug, PartialEq, Eq, BinaryCodec)]
pub struct Header {
    /// Position in the chain (genesis = 0)
    pub index: u64,
    /// Hash of the parent block, zero for genesis
    pub previous_hash: Hash,
    /// Unix time in milliseconds
    pub timestamp: u64,
    /// Root of the merkle tree over the transaction ids
    pub merkle_root: Hash,
    /// Receives fees and the block reward
    pub producer: Address,
}

impl Header {
    /// Hasher primed with the block-hash domain tag and this header. The
    /// proof is the only part of the block hash left to append, so miners
    /// clone this once per attempt instead of re-encoding the header.
    pub(crate) fn hash_prefix(&self, chain_id: u64) -> HashBuilder {
        let mut h = Hash::sha3();
        h.update(b"BLOCK");
        chain_id.encode(&mut h);
        self.encode(&mut h);
        h
    }

    /// Hash of the header without its proof; this is what a proof-of-stake
    /// producer signs.
    pub fn seal_hash(&self, chain_id: u64) -> Hash {
        let mut h = Hash::sha3();
        h.update(b"BLOCK_SEAL");
        chain_id.encode(&mut h);
        self.encode(&mut h);
        h.finalize()
    }
}

/// Evidence that the producer was entitled to extend the chain.
#[derive(Clone, Debug, PartialEq, Eq, BinaryCodec)]
pub enum Proof {
    /// Nonce making the block hash meet the difficulty target.
    Work { nonce: u64 },
    /// Producer's signature over the header's seal hash.
    Stake { signature: Signature },
}

/// An immutable block. Validated once on arrival and never modified.
#[derive(Clone, Debug, PartialEq, Eq, BinaryCodec)]
pub struct Block {
    pub header: Header,
    pub proof: Proof,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Deterministic first block. Every node with the same parameters builds
    /// a byte-identical genesis.
    pub fn genesis() -> Self {
        Self {
            header: Header {
                index: 0,
                previous_hash: Hash::zero(),
                timestamp: 0,
                merkle_root: MerkleTree::empty_root(),
                producer: Address::zero(),
            },
            proof: Proof::Work { nonce: 0 },
            transactions: Vec::new(),
        }
    }

    /// Chain-bound block hash over the header and the proof.
    ///
    /// For proof-of-work blocks this is the value compared against the
    /// difficulty target.
    pub fn hash(&self, chain_id: u64) -> Hash {
        Self::hash_parts(&self.header, &self.proof, chain_id)
    }

    pub(crate) fn hash_parts(header: &Header, proof: &Proof, chain_id: u64) -> Hash {
        let mut h = header.hash_prefix(chain_id);
        proof.encode(&mut h);
        h.finalize()
    }

    pub fn index(&self) -> u64 {
        self.header.index
    }

    /// Merkle root recomputed from the carried transactions.
    pub fn computed_merkle_root(&self, chain_id: u64) -> Hash {
        MerkleTree::from_transactions(&self.transactions, chain_id)
    }
}

/// Current Unix time in milliseconds. A clock before the epoch reads as 0.
pub fn timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
