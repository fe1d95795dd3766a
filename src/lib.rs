//! Account ledger with hash-locked remittances.
//!
//! Provides the chain and its state transition, proof-of-work and
//! proof-of-stake block production, cryptography and the canonical codec.

pub mod consensus;
pub mod core;
pub mod crypto;
pub mod storage;
pub mod types;
pub mod utils;
