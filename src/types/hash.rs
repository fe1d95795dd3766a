//! 32-byte SHA3-256 digests.

use crate::types::encoding::EncodeSink;
use remitchain_derive::BinaryCodec;
use sha3::{Digest, Sha3_256};
use std::fmt;

pub const HASH_LEN: usize = 32;

/// SHA3-256 digest used for transaction ids, block hashes, Merkle nodes,
/// escrow ids and hash locks.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, BinaryCodec)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    /// All-zero hash, the `previous_hash` of the genesis block.
    pub const fn zero() -> Hash {
        Hash([0u8; HASH_LEN])
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }


    /// Starts an incremental SHA3-256 computation.
    pub fn sha3() -> HashBuilder {
        HashBuilder::new()
    }

    /// First four bytes in hex, for log lines.
    pub fn short(&self) -> String {
        self.0[..4].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({self})")
    }
}

/// Incremental SHA3-256 hasher.
///
/// Implements [`EncodeSink`], so any `Encode` value can be streamed straight
/// into it. `Clone` lets the miner hash a fixed header prefix once and fork
/// the state for every nonce.
#[derive(Clone, Default)]
pub struct HashBuilder {
    hasher: Sha3_256,
}

impl HashBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Builder-style `update`.
    pub fn chain(mut self, data: &[u8]) -> Self {
        self.update(data);
        self
    }

    pub fn finalize(self) -> Hash {
        Hash(self.hasher.finalize().into())
    }
}

impl EncodeSink for HashBuilder {
    fn write(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }
}
