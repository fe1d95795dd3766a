//! Test utilities for ledger testing.

#[cfg(test)]
pub mod utils {
    use crate::core::params::{ChainParams, GenesisAllocation};
    use crate::core::transaction::{Transaction, TxPayload};
    use crate::crypto;
    use crate::crypto::key_pair::PrivateKey;
    use crate::types::address::Address;
    use crate::types::bytes::Bytes;
    use crate::types::hash::{HASH_LEN, Hash};
    use rand_core::{OsRng, RngCore};

    pub fn random_hash() -> Hash {
        let mut value = [0u8; HASH_LEN];
        OsRng.fill_bytes(&mut value);
        Hash(value)
    }

    /// Deterministic key number `n`, so tests can refer to the same account
    /// from several places. `n` must not be 0.
    pub fn key(n: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[n; 32]).expect("non-zero scalar below the curve order")
    }

    /// Parameters for fast tests: low difficulty, no stake lock.
    pub fn test_params(allocations: Vec<GenesisAllocation>) -> ChainParams {
        let mut params = ChainParams::dev_with_allocations(allocations);
        params.pow.difficulty = 8;
        params.staking.min_lock_blocks = 0;
        params
    }

    pub fn pay(
        key: &PrivateKey,
        to: Address,
        amount: u128,
        fee: u128,
        nonce: u64,
        chain_id: u64,
    ) -> Transaction {
        Transaction::builder(TxPayload::Pay { recipient: to })
            .amount(amount)
            .fee(fee)
            .nonce(nonce)
            .sign(key, chain_id)
    }

    pub fn stake(key: &PrivateKey, amount: u128, fee: u128, nonce: u64, chain_id: u64) -> Transaction {
        Transaction::builder(TxPayload::Stake)
            .amount(amount)
            .fee(fee)
            .nonce(nonce)
            .sign(key, chain_id)
    }

    pub fn unstake(key: &PrivateKey, amount: u128, fee: u128, nonce: u64, chain_id: u64) -> Transaction {
        Transaction::builder(TxPayload::Unstake)
            .amount(amount)
            .fee(fee)
            .nonce(nonce)
            .sign(key, chain_id)
    }

    /// Opens an escrow locked to `sha3(secret)`.
    pub fn open_remit(
        key: &PrivateKey,
        to: Address,
        secret: &[u8],
        amount: u128,
        fee: u128,
        nonce: u64,
        chain_id: u64,
    ) -> Transaction {
        Transaction::builder(TxPayload::OpenRemit {
            recipient: to,
            hash_lock: crypto::hash_lock(secret),
        })
        .amount(amount)
        .fee(fee)
        .nonce(nonce)
        .sign(key, chain_id)
    }

    pub fn claim(
        key: &PrivateKey,
        escrow_id: Hash,
        preimage: &[u8],
        fee: u128,
        nonce: u64,
        chain_id: u64,
    ) -> Transaction {
        Transaction::builder(TxPayload::ClaimRemit {
            escrow_id,
            preimage: Bytes::new(preimage),
        })
        .fee(fee)
        .nonce(nonce)
        .sign(key, chain_id)
    }
}
