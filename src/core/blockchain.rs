//! The chain: blocks, committed state and slashing evidence.

use crate::consensus::pos::{self, SlashReason, SlashingRecord, SlashingTracker, ValidatorSet};
use crate::core::account::Account;
use crate::core::block::{Block, Header, Proof, timestamp_now};
use crate::core::escrow::Escrow;
use crate::core::params::ChainParams;
use crate::core::transaction::Transaction;
use crate::core::validator::{BlockError, BlockValidator, Tip, TransactionValidator};
use crate::storage::state::{ApplyContext, LedgerState, State, StateOverlay, apply_transaction};
use crate::types::address::Address;
use crate::types::hash::Hash;
use crate::types::merkle_tree::MerkleTree;
use crate::{debug, info, warn};

/// Append-only block sequence with the state it produces.
///
/// Not synchronised; [`crate::core::ledger::Ledger`] wraps it in a mutex.
pub struct Blockchain {
    params: ChainParams,
    blocks: Vec<Block>,
    /// `hashes[i]` is the hash of `blocks[i]`.
    hashes: Vec<Hash>,
    state: LedgerState,
    slashing: SlashingTracker,
}

impl Blockchain {
    /// Creates a chain holding only the genesis block, with the genesis
    /// allocations credited.
    pub fn new(params: ChainParams) -> Self {
        let genesis = Block::genesis();
        let hash = genesis.hash(params.chain_id);
        info!(
            "Initializing blockchain with genesis block: chain_id={} hash={} allocations={}",
            params.chain_id,
            hash,
            params.genesis.allocations.len()
        );

        Self {
            state: LedgerState::from_genesis(&params.genesis),
            params,
            blocks: vec![genesis],
            hashes: vec![hash],
            slashing: SlashingTracker::new(),
        }
    }

    /// Rebuilds a chain by validating `blocks` from genesis.
    ///
    /// Slashing is not recorded in blocks, so a chain that saw slashing
    /// replays to a different state unless its records are supplied through
    /// [`Blockchain::validate_chain`].
    pub fn from_blocks(params: ChainParams, blocks: Vec<Block>) -> Result<Self, BlockError> {
        Self::replay(params, blocks, &[])
    }

    fn replay(
        params: ChainParams,
        blocks: Vec<Block>,
        slashings: &[SlashingRecord],
    ) -> Result<Self, BlockError> {
        let mut blocks = blocks.into_iter();
        if blocks.next() != Some(Block::genesis()) {
            return Err(BlockError::GenesisMismatch);
        }

        let mut chain = Self::new(params);
        for block in blocks {
            let writes = BlockValidator::new(&chain.params).validate_block(
                &block,
                chain.tip(),
                &chain.state,
            )?;
            chain.state.commit(writes);
            chain.push(block);

            let height = chain.height();
            for record in slashings.iter().filter(|r| r.applied_at == height) {
                chain
                    .state
                    .slash(&record.validator, chain.params.staking.slash_bps);
            }
        }
        Ok(chain)
    }

    /// Replays this chain's blocks, and the slashes applied along the way,
    /// against a fresh genesis state. Returns the first failure.
    pub fn validate_chain(&self) -> Result<(), BlockError> {
        Self::replay(
            self.params.clone(),
            self.blocks.clone(),
            self.slashing.records(),
        )
        .map(|_| ())
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn tip(&self) -> Tip {
        Tip {
            index: self.height(),
            hash: self.tip_hash(),
        }
    }

    pub fn tip_hash(&self) -> Hash {
        self.hashes.last().copied().unwrap_or_default()
    }

    pub fn tip_block(&self) -> &Block {
        // Never empty: the genesis block is pushed on construction.
        &self.blocks[self.blocks.len() - 1]
    }

    /// Index of the tip block.
    pub fn height(&self) -> u64 {
        self.blocks.len() as u64 - 1
    }

    pub fn block(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Block hashes from genesis to tip.
    pub fn chain_summary(&self) -> Vec<Hash> {
        self.hashes.clone()
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn account(&self, address: &Address) -> Account {
        self.state.account(address)
    }

    pub fn escrow(&self, id: &Hash) -> Option<Escrow> {
        self.state.escrow(id)
    }

    /// Validators eligible for the next slot.
    pub fn validators(&self) -> ValidatorSet {
        ValidatorSet::from_state(&self.state)
    }

    pub fn slashing_records(&self) -> &[SlashingRecord] {
        self.slashing.records()
    }

    /// Applies `pending` in order on an overlay of the tip state, as the
    /// block at `tip + 1` produced by `producer` would. Each transaction is
    /// validated against the state left by the ones already kept and skipped
    /// if it fails. Returns the overlay and the kept transactions.
    pub fn stage<'a>(
        &'a self,
        pending: &[Transaction],
        producer: Address,
    ) -> (StateOverlay<'a>, Vec<Transaction>) {
        let index = self.height() + 1;
        let chain_id = self.params.chain_id;
        let validator = TransactionValidator::new(&self.params);
        let ctx = ApplyContext {
            chain_id,
            producer,
            height: index,
        };

        let mut block_overlay = StateOverlay::new(&self.state);
        let mut transactions = Vec::new();
        for tx in pending {
            let writes = {
                let mut tx_overlay = StateOverlay::new(&block_overlay);
                let applied = validator
                    .validate(tx, &tx_overlay, index)
                    .and_then(|()| apply_transaction(&mut tx_overlay, tx, &ctx));
                if let Err(e) = applied {
                    debug!("Skipping transaction={} for block {index}: {e}", tx.id(chain_id));
                    continue;
                }
                tx_overlay.into_writes()
            };
            block_overlay.commit(writes);
            transactions.push(tx.clone());
        }
        (block_overlay, transactions)
    }

    /// Builds the header and transaction list of the next block from
    /// `pending` (see [`Blockchain::stage`]). The header carries no proof yet.
    pub fn assemble(&self, pending: &[Transaction], producer: Address) -> (Header, Vec<Transaction>) {
        let tip = self.tip();
        let (_, transactions) = self.stage(pending, producer);
        let header = Header {
            index: tip.index + 1,
            previous_hash: tip.hash,
            // Keep timestamps monotonic even if the local clock steps back.
            timestamp: timestamp_now().max(self.tip_block().header.timestamp),
            merkle_root: MerkleTree::from_transactions(&transactions, self.params.chain_id),
            producer,
        };
        (header, transactions)
    }

    /// Validates `block` against the tip and, if it passes, commits its state
    /// writes and appends it in one step. On failure nothing changes except
    /// that slashing evidence carried by the block is acted on.
    pub fn accept_block(&mut self, block: Block) -> Result<(), BlockError> {
        let validator = BlockValidator::new(&self.params);
        match validator.validate_block(&block, self.tip(), &self.state) {
            Ok(writes) => {
                self.state.commit(writes);
                let sealed = match &block.proof {
                    Proof::Stake { .. } => Some((
                        block.header.index,
                        block.header.producer,
                        block.header.seal_hash(self.params.chain_id),
                    )),
                    Proof::Work { .. } => None,
                };
                self.push(block);
                self.slashing
                    .forget_before(self.height().saturating_sub(pos::EVIDENCE_WINDOW));

                if let Some((index, producer, seal)) = sealed
                    && let Some(first) = self.slashing.observe(index, producer, seal)
                {
                    self.slash(producer, index, SlashReason::DoubleSign { first, second: seal });
                }
                Ok(())
            }
            Err(err) => {
                warn!(
                    "Rejected block index={} producer={}: {err}",
                    block.header.index, block.header.producer
                );
                self.collect_evidence(&block, &err);
                Err(err)
            }
        }
    }

    fn push(&mut self, block: Block) {
        let hash = block.hash(self.params.chain_id);
        info!(
            "Adding block to the chain: index={} hash={} producer={} transactions={}",
            block.header.index,
            hash,
            block.header.producer,
            block.transactions.len()
        );
        self.blocks.push(block);
        self.hashes.push(hash);
    }

    /// Slashes the producer of a rejected proof-of-stake block when its seal
    /// is valid and either conflicts with an earlier seal for the same index
    /// or the block was correctly selected but invalid.
    fn collect_evidence(&mut self, block: &Block, err: &BlockError) {
        let Proof::Stake { signature } = &block.proof else {
            return;
        };
        let chain_id = self.params.chain_id;
        if !pos::verify_seal(signature, &block.header, chain_id) {
            return;
        }

        // Seals are tracked only for eligible validators near the tip.
        let (index, producer) = (block.header.index, block.header.producer);
        let tip = self.height();
        if index > tip + 1
            || index + pos::EVIDENCE_WINDOW < tip
            || !self.validators().contains(&producer)
        {
            return;
        }

        let seal = block.header.seal_hash(chain_id);
        if let Some(first) = self.slashing.observe(index, producer, seal) {
            self.slash(producer, index, SlashReason::DoubleSign { first, second: seal });
            return;
        }

        // The seal covers the header only, so a body that does not match the
        // signed Merkle root may have been altered in transit.
        let content_fault = matches!(
            err,
            BlockError::Transaction { .. } | BlockError::RewardOverflow
        );
        let validator = BlockValidator::new(&self.params);
        if content_fault
            && validator.check_linkage(&block.header, self.tip()).is_ok()
            && validator.check_proof(block, &self.state).is_ok()
        {
            self.slash(producer, index, SlashReason::InvalidBlock);
        }
    }

    fn slash(&mut self, validator: Address, index: u64, reason: SlashReason) {
        if !self.slashing.first_offence(index, validator) {
            return;
        }
        let amount = self.state.slash(&validator, self.params.staking.slash_bps);
        warn!("Slashed validator={validator} index={index} reason={reason} burned={amount}");
        self.slashing.record(SlashingRecord {
            validator,
            index,
            reason,
            amount,
            applied_at: self.height(),
        });
    }
}
