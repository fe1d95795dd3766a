//! Transaction and block validation rules.
//!
//! [`TransactionValidator`] decides whether a single transaction may be
//! applied to a given state; [`BlockValidator`] checks a whole block against
//! the chain tip and returns the state writes it would make. Neither mutates
//! anything: committing is left to the chain.

use crate::consensus::pos::{self, ValidatorSet};
use crate::consensus::pow;
use crate::core::block::{Block, Header, Proof};
use crate::core::params::{ChainParams, StakingParams};
use crate::core::transaction::{Transaction, TxPayload};
use crate::storage::state::{
    ApplyContext, LedgerState, State, StateOverlay, StateWrites, apply_transaction, credit,
};
use crate::types::address::Address;
use crate::types::encoding::DecodeError;
use crate::types::hash::Hash;
use remitchain_derive::Error;

/// Why a transaction was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("signature does not match the sender")]
    SignatureInvalid,

    #[error("nonce mismatch: expected {expected}, got {actual}")]
    NonceMismatch { expected: u64, actual: u64 },

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u128, available: u128 },

    #[error("insufficient stake: required {required}, staked {staked}")]
    InsufficientStake { required: u128, staked: u128 },

    #[error("escrow {0} not found")]
    EscrowNotFound(Hash),

    #[error("preimage does not open escrow {0}")]
    PreimageMismatch(Hash),

    #[error("escrow {0} already claimed")]
    EscrowAlreadyClaimed(Hash),

    #[error("invalid amount or fee")]
    InvalidAmount,

    #[error("stake locked until block {unlock_height}")]
    StakeLocked { unlock_height: u64 },

    #[error("slashed validators cannot unstake")]
    ValidatorSlashed,

    #[error("transaction {0} already pending")]
    AlreadyPending(Hash),

    #[error("transaction pool is full")]
    PoolFull,

    #[error("malformed transaction encoding: {0}")]
    Encoding(#[from] DecodeError),
}

/// Why a block was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("merkle root mismatch: computed {expected}, header has {actual}")]
    MerkleRootMismatch { expected: Hash, actual: Hash },

    #[error("block {index} does not extend tip {tip_index}")]
    ChainLinkageMismatch { index: u64, tip_index: u64 },

    #[error("insufficient proof of work: required {required} zero bits, got {actual}")]
    ProofOfWorkInsufficient { required: u32, actual: u32 },

    #[error("no eligible validator")]
    NoEligibleValidator,

    #[error("producer {producer} was not selected, expected {selected}")]
    ValidatorNotSelected { producer: Address, selected: Address },

    #[error("invalid consensus proof")]
    ConsensusProofInvalid,

    #[error("transaction {position} rejected: {source}")]
    Transaction {
        position: usize,
        source: TransactionError,
    },

    #[error("block reward overflows the producer balance")]
    RewardOverflow,

    #[error("first block is not the genesis block")]
    GenesisMismatch,

    #[error("malformed block encoding: {0}")]
    Encoding(#[from] DecodeError),
}

/// Index and hash of the block a new block must extend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tip {
    pub index: u64,
    pub hash: Hash,
}

/// Stateless transaction checks against a state view.
pub struct TransactionValidator<'a> {
    chain_id: u64,
    staking: &'a StakingParams,
}

impl<'a> TransactionValidator<'a> {
    pub fn new(params: &'a ChainParams) -> Self {
        Self {
            chain_id: params.chain_id,
            staking: &params.staking,
        }
    }

    /// Checks `tx` for inclusion in the block at `height`. The first failing
    /// rule is reported:
    ///
    /// 1. signature
    /// 2. exact nonce
    /// 3. balance, stake and escrow rules for the payload kind
    /// 4. amount shape (claims carry no amount, everything else a positive
    ///    one, and `amount + fee` fits in a `u128`)
    pub fn validate(
        &self,
        tx: &Transaction,
        state: &dyn State,
        height: u64,
    ) -> Result<(), TransactionError> {
        if !tx.verify(self.chain_id) {
            return Err(TransactionError::SignatureInvalid);
        }

        let account = state.account(&tx.sender);
        if tx.nonce != account.nonce() {
            return Err(TransactionError::NonceMismatch {
                expected: account.nonce(),
                actual: tx.nonce,
            });
        }

        // Saturating keeps the balance checks meaningful; overflow itself is
        // reported by the amount rule below.
        let total = tx.amount.saturating_add(tx.fee);
        let require_balance = |required: u128| {
            if account.balance() < required {
                Err(TransactionError::InsufficientBalance {
                    required,
                    available: account.balance(),
                })
            } else {
                Ok(())
            }
        };

        match &tx.payload {
            TxPayload::Pay { .. } | TxPayload::Stake | TxPayload::OpenRemit { .. } => {
                require_balance(total)?;
            }
            TxPayload::Unstake => {
                if account.staked() < tx.amount {
                    return Err(TransactionError::InsufficientStake {
                        required: tx.amount,
                        staked: account.staked(),
                    });
                }
                if account.balance().saturating_add(tx.amount) < tx.fee {
                    return Err(TransactionError::InsufficientBalance {
                        required: tx.fee,
                        available: account.balance(),
                    });
                }
                if account.is_slashed() && !self.staking.allow_unstake_while_slashed {
                    return Err(TransactionError::ValidatorSlashed);
                }
                let unlock_height = account
                    .stake_height()
                    .saturating_add(self.staking.min_lock_blocks);
                if height < unlock_height {
                    return Err(TransactionError::StakeLocked { unlock_height });
                }
            }
            TxPayload::ClaimRemit {
                escrow_id,
                preimage,
            } => {
                let escrow = state
                    .escrow(escrow_id)
                    .ok_or(TransactionError::EscrowNotFound(*escrow_id))?;
                escrow.check_claim(preimage)?;
                require_balance(tx.fee)?;
            }
        }

        let amount_ok = match tx.payload {
            TxPayload::ClaimRemit { .. } => tx.amount == 0,
            _ => tx.amount > 0,
        };
        if !amount_ok || tx.amount.checked_add(tx.fee).is_none() {
            return Err(TransactionError::InvalidAmount);
        }

        Ok(())
    }
}

/// Full block checks, shared by locally produced and ingested blocks.
pub struct BlockValidator<'a> {
    params: &'a ChainParams,
}

impl<'a> BlockValidator<'a> {
    pub fn new(params: &'a ChainParams) -> Self {
        Self { params }
    }

    /// Validates `block` as the successor of `tip` over the committed tip
    /// `state` and returns the writes that applying it produces.
    ///
    /// Order: merkle root, linkage, consensus proof, then every transaction
    /// replayed in order on an overlay, followed by the block reward.
    pub fn validate_block(
        &self,
        block: &Block,
        tip: Tip,
        state: &LedgerState,
    ) -> Result<StateWrites, BlockError> {
        let computed = block.computed_merkle_root(self.params.chain_id);
        if computed != block.header.merkle_root {
            return Err(BlockError::MerkleRootMismatch {
                expected: computed,
                actual: block.header.merkle_root,
            });
        }

        self.check_linkage(&block.header, tip)?;
        self.check_proof(block, state)?;
        self.replay(block, state)
    }

    pub fn check_linkage(&self, header: &Header, tip: Tip) -> Result<(), BlockError> {
        if tip.index.checked_add(1) != Some(header.index) || header.previous_hash != tip.hash {
            return Err(BlockError::ChainLinkageMismatch {
                index: header.index,
                tip_index: tip.index,
            });
        }
        Ok(())
    }

    /// Checks the proof in isolation. For proof-of-stake the producer must
    /// have signed the seal hash and be the validator selected from `state`
    /// for the slot after `previous_hash`.
    pub fn check_proof(&self, block: &Block, state: &LedgerState) -> Result<(), BlockError> {
        let chain_id = self.params.chain_id;
        match &block.proof {
            Proof::Work { .. } => pow::verify_work(block, chain_id, self.params.pow.difficulty)?,
            Proof::Stake { signature } => {
                if !pos::verify_seal(signature, &block.header, chain_id) {
                    return Err(BlockError::ConsensusProofInvalid);
                }
                let set = ValidatorSet::from_state(state);
                let seed = pos::selection_seed(&block.header.previous_hash);
                let selected = set.select(&seed).ok_or(BlockError::NoEligibleValidator)?;
                if selected != block.header.producer {
                    return Err(BlockError::ValidatorNotSelected {
                        producer: block.header.producer,
                        selected,
                    });
                }
            }
        }
        Ok(())
    }

    fn replay(&self, block: &Block, state: &LedgerState) -> Result<StateWrites, BlockError> {
        let validator = TransactionValidator::new(self.params);
        let ctx = ApplyContext {
            chain_id: self.params.chain_id,
            producer: block.header.producer,
            height: block.header.index,
        };

        let mut overlay = StateOverlay::new(state);
        for (position, tx) in block.transactions.iter().enumerate() {
            validator
                .validate(tx, &overlay, ctx.height)
                .and_then(|()| apply_transaction(&mut overlay, tx, &ctx))
                .map_err(|source| BlockError::Transaction { position, source })?;
        }

        credit(&mut overlay, ctx.producer, self.block_reward(&block.proof))
            .map_err(|_| BlockError::RewardOverflow)?;

        Ok(overlay.into_writes())
    }

    pub fn block_reward(&self, proof: &Proof) -> u128 {
        match proof {
            Proof::Work { .. } => self.params.rewards.pow_block_reward,
            Proof::Stake { .. } => self.params.rewards.pos_block_reward,
        }
    }
}
