//! Signed ledger transactions.

use crate::crypto;
use crate::crypto::key_pair::{PrivateKey, Signature};
use crate::types::address::Address;
use crate::types::bytes::Bytes;
use crate::types::encoding::Encode;
use crate::types::hash::Hash;
use remitchain_derive::BinaryCodec;
use std::fmt;

/// Kind-specific part of a transaction.
///
/// The tag order is part of the canonical encoding and must not change.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub enum TxPayload {
    /// Transfers `amount` to `recipient`.
    Pay { recipient: Address },
    /// Locks `amount` of the sender's balance as stake.
    Stake,
    /// Returns `amount` of stake to the sender's balance.
    Unstake,
    /// Moves `amount` into an escrow that `recipient` can claim by revealing
    /// a preimage of `hash_lock`.
    OpenRemit { recipient: Address, hash_lock: Hash },
    /// Releases an open escrow to its recipient.
    ClaimRemit { escrow_id: Hash, preimage: Bytes },
}

/// Payload tag without its fields, for logs and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    Pay,
    Stake,
    Unstake,
    OpenRemit,
    ClaimRemit,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionKind::Pay => "PAY",
            TransactionKind::Stake => "STAKE",
            TransactionKind::Unstake => "UNSTAKE",
            TransactionKind::OpenRemit => "OPEN_REMIT",
            TransactionKind::ClaimRemit => "CLAIM_REMIT",
        };
        f.write_str(name)
    }
}

impl TxPayload {
    pub fn kind(&self) -> TransactionKind {
        match self {
            TxPayload::Pay { .. } => TransactionKind::Pay,
            TxPayload::Stake => TransactionKind::Stake,
            TxPayload::Unstake => TransactionKind::Unstake,
            TxPayload::OpenRemit { .. } => TransactionKind::OpenRemit,
            TxPayload::ClaimRemit { .. } => TransactionKind::ClaimRemit,
        }
    }
}

/// A signed transaction. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct Transaction {
    pub sender: Address,
    /// Value moved by the transaction; must be zero for claims.
    pub amount: u128,
    /// Credited to the producer of the including block.
    pub fee: u128,
    /// Must equal the sender's account nonce at inclusion time.
    pub nonce: u64,
    pub payload: TxPayload,
    /// Schnorr signature over [`Transaction::id`].
    pub signature: Signature,
}

impl Transaction {
    /// Starts building a transaction with the given payload. Amount, fee and
    /// nonce default to zero.
    pub fn builder(payload: TxPayload) -> TransactionBuilder {
        TransactionBuilder {
            payload,
            amount: 0,
            fee: 0,
            nonce: 0,
        }
    }

    pub fn kind(&self) -> TransactionKind {
        self.payload.kind()
    }

    /// Chain-bound identifier over every field except the signature.
    ///
    /// This is also the message the sender signs, and the id of the escrow
    /// an `OPEN_REMIT` creates.
    pub fn id(&self, chain_id: u64) -> Hash {
        Self::id_from_parts(
            chain_id,
            &self.sender,
            self.amount,
            self.fee,
            self.nonce,
            &self.payload,
        )
    }

    /// Checks the signature against `sender`.
    pub fn verify(&self, chain_id: u64) -> bool {
        crypto::verify(
            &self.signature,
            self.id(chain_id).as_slice(),
            &self.sender,
        )
    }

    fn id_from_parts(
        chain_id: u64,
        sender: &Address,
        amount: u128,
        fee: u128,
        nonce: u64,
        payload: &TxPayload,
    ) -> Hash {
        let mut h = Hash::sha3();
        h.update(b"TX");
        chain_id.encode(&mut h);
        sender.encode(&mut h);
        amount.encode(&mut h);
        fee.encode(&mut h);
        nonce.encode(&mut h);
        payload.encode(&mut h);
        h.finalize()
    }
}

/// Collects the unsigned fields of a transaction, then signs it.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    payload: TxPayload,
    amount: u128,
    fee: u128,
    nonce: u64,
}

impl TransactionBuilder {
    pub fn amount(mut self, amount: u128) -> Self {
        self.amount = amount;
        self
    }

    pub fn fee(mut self, fee: u128) -> Self {
        self.fee = fee;
        self
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Signs with `key`; the sender is the key's address.
    pub fn sign(self, key: &PrivateKey, chain_id: u64) -> Transaction {
        let sender = key.address();
        let id = Transaction::id_from_parts(
            chain_id,
            &sender,
            self.amount,
            self.fee,
            self.nonce,
            &self.payload,
        );
        Transaction {
            sender,
            amount: self.amount,
            fee: self.fee,
            nonce: self.nonce,
            payload: self.payload,
            signature: key.sign(id.as_slice()),
        }
    }
}
