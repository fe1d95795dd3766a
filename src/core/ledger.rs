//! Thread-safe entry point tying the chain, the pending pool and block
//! production together.
//!
//! All chain mutations happen under one mutex. Proof-of-work search runs
//! outside it on a snapshot of the next block; once a nonce is found the lock
//! is taken again, the tip is re-checked and the block goes through the full
//! validator before it is committed.

use crate::consensus::ConsensusError;
use crate::consensus::pos::{self, SlashingRecord};
use crate::consensus::pow::{CancelToken, Miner, MiningOutcome, SealTemplate};
use crate::core::account::AccountView;
use crate::core::block::Block;
use crate::core::blockchain::Blockchain;
use crate::core::escrow::Escrow;
use crate::core::params::ChainParams;
use crate::core::transaction::Transaction;
use crate::core::validator::{BlockError, Tip, TransactionError, TransactionValidator};
use crate::crypto::key_pair::PrivateKey;
use crate::storage::state::{ApplyContext, State, StateOverlay, StateWrites, apply_transaction};
use crate::storage::txpool::TxPool;
use crate::types::address::Address;
use crate::types::encoding::Decode;
use crate::types::hash::Hash;
use crate::{info, warn};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// How the local node seals the block it produces.
#[derive(Clone, Debug)]
pub enum ProductionPolicy {
    ProofOfWork,
    /// Seal with this key; it must belong to the producer address.
    ProofOfStake(PrivateKey),
}

/// The pending pool applied on top of the tip state.
struct PendingState {
    tip: Hash,
    writes: StateWrites,
}

pub struct Ledger {
    params: ChainParams,
    chain: Mutex<Blockchain>,
    pool: TxPool,
    /// Built lazily after each tip change and extended by every accepted
    /// submission. Only touched with the chain lock held.
    pending: Mutex<Option<PendingState>>,
    /// Tokens of in-flight proof-of-work searches.
    searches: Mutex<Vec<CancelToken>>,
}

impl Ledger {
    pub fn new(params: ChainParams) -> Self {
        Self::from_chain(Blockchain::new(params))
    }

    /// Wraps an existing chain, e.g. one rebuilt with [`Blockchain::from_blocks`].
    pub fn from_chain(chain: Blockchain) -> Self {
        let params = chain.params().clone();
        Self {
            pool: TxPool::new(Some(params.pool_capacity), params.chain_id),
            params,
            chain: Mutex::new(chain),
            pending: Mutex::new(None),
            searches: Mutex::new(Vec::new()),
        }
    }

    fn chain(&self) -> MutexGuard<'_, Blockchain> {
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, Option<PendingState>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn searches(&self) -> MutexGuard<'_, Vec<CancelToken>> {
        self.searches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Validates `tx` against the tip state with every pending transaction
    /// applied first, then queues it. Returns the transaction id.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<Hash, TransactionError> {
        let chain = self.chain();
        let id = tx.id(self.params.chain_id);
        if self.pool.contains(id) {
            return Err(TransactionError::AlreadyPending(id));
        }

        let tip = chain.tip_hash();
        let ctx = ApplyContext {
            chain_id: self.params.chain_id,
            producer: Address::zero(),
            height: chain.height() + 1,
        };
        let mut pending = self.pending();
        let writes = match pending.take() {
            Some(cached) if cached.tip == tip => cached.writes,
            _ => chain
                .stage(&self.pool.snapshot(), Address::zero())
                .0
                .into_writes(),
        };

        let mut overlay = StateOverlay::new(chain.state());
        overlay.commit(writes.clone());
        let staged = TransactionValidator::new(&self.params)
            .validate(&tx, &overlay, ctx.height)
            .and_then(|()| apply_transaction(&mut overlay, &tx, &ctx));
        if let Err(e) = staged {
            *pending = Some(PendingState { tip, writes });
            return Err(e);
        }

        let kind = tx.kind();
        match self.pool.append(tx) {
            Ok(id) => {
                *pending = Some(PendingState {
                    tip,
                    writes: overlay.into_writes(),
                });
                info!("Accepted transaction={id} kind={kind} pending={}", self.pool.len());
                Ok(id)
            }
            Err(e) => {
                *pending = Some(PendingState { tip, writes });
                Err(e)
            }
        }
    }

    /// Produces the next block from the pending pool and appends it.
    ///
    /// Proof-of-work blocks are mined without holding the chain lock; if the
    /// tip moves in the meantime the search is cancelled or its result is
    /// discarded. Proof-of-stake production fails unless `producer` is the
    /// validator selected for the slot.
    pub fn produce_block(
        &self,
        producer: Address,
        policy: ProductionPolicy,
    ) -> Result<Block, ConsensusError> {
        match policy {
            ProductionPolicy::ProofOfWork => self.mine_block(producer),
            ProductionPolicy::ProofOfStake(key) => self.forge_block(producer, &key),
        }
    }

    fn mine_block(&self, producer: Address) -> Result<Block, ConsensusError> {
        let token = CancelToken::new();
        let (template, transactions) = {
            let chain = self.chain();
            let (header, transactions) = chain.assemble(&self.pool.snapshot(), producer);
            self.searches().push(token.clone());
            (SealTemplate::new(header, self.params.chain_id), transactions)
        };

        let miner = Miner::new(&self.params.pow);
        info!(
            "Mining block index={} transactions={} difficulty={}",
            template.header().index,
            transactions.len(),
            miner.difficulty()
        );
        let outcome = miner.mine(&template, &token);
        self.searches().retain(|t| !t.same_as(&token));

        match outcome {
            MiningOutcome::Found { nonce, .. } => {
                let block = template.into_block(nonce, transactions);
                let mut chain = self.chain();
                if chain.tip_hash() != block.header.previous_hash {
                    warn!(
                        "Discarding mined block index={}: tip moved to {}",
                        block.header.index,
                        chain.tip_hash()
                    );
                    return Err(ConsensusError::StaleTip);
                }
                chain.accept_block(block.clone())?;
                self.on_tip_advanced(&chain, &block);
                Ok(block)
            }
            MiningOutcome::Cancelled => Err(ConsensusError::Cancelled),
            MiningOutcome::Exhausted => Err(ConsensusError::Exhausted),
        }
    }

    fn forge_block(&self, producer: Address, key: &PrivateKey) -> Result<Block, ConsensusError> {
        if key.address() != producer {
            return Err(ConsensusError::ProducerKeyMismatch(producer));
        }

        let mut chain = self.chain();
        let seed = pos::selection_seed(&chain.tip_hash());
        let selected = chain
            .validators()
            .select(&seed)
            .ok_or(ConsensusError::NoEligibleValidator)?;
        if selected != producer {
            return Err(ConsensusError::ValidatorNotSelected { producer, selected });
        }

        let (header, transactions) = chain.assemble(&self.pool.snapshot(), producer);
        let block = Block {
            proof: pos::seal(key, &header, self.params.chain_id),
            header,
            transactions,
        };
        chain.accept_block(block.clone())?;
        self.on_tip_advanced(&chain, &block);
        Ok(block)
    }

    /// Validates and appends a block produced elsewhere.
    pub fn ingest_block(&self, block: Block) -> Result<(), BlockError> {
        let mut chain = self.chain();
        chain.accept_block(block.clone())?;
        self.on_tip_advanced(&chain, &block);
        Ok(())
    }

    /// Decodes a block from its canonical encoding and ingests it.
    pub fn ingest_block_bytes(&self, bytes: &[u8]) -> Result<(), BlockError> {
        let block = Block::from_bytes(bytes)?;
        self.ingest_block(block)
    }

    fn on_tip_advanced(&self, chain: &Blockchain, block: &Block) {
        let included: Vec<Hash> = block
            .transactions
            .iter()
            .map(|tx| tx.id(self.params.chain_id))
            .collect();
        self.pool.remove_batch(&included);
        self.pool.prune(chain.state());
        *self.pending() = None;

        for token in self.searches().drain(..) {
            token.cancel();
        }
    }

    /// Cancels every in-flight proof-of-work search. Returns how many were
    /// running.
    pub fn cancel_mining(&self) -> usize {
        let mut searches = self.searches();
        for token in searches.iter() {
            token.cancel();
        }
        let count = searches.len();
        searches.clear();
        count
    }

    pub fn get_account(&self, address: &Address) -> AccountView {
        self.chain().account(address).view()
    }

    pub fn get_chain_summary(&self) -> Vec<Hash> {
        self.chain().chain_summary()
    }

    pub fn get_escrow(&self, id: &Hash) -> Option<Escrow> {
        self.chain().escrow(id)
    }

    pub fn slashing_records(&self) -> Vec<SlashingRecord> {
        self.chain().slashing_records().to_vec()
    }

    pub fn pending_len(&self) -> usize {
        self.pool.len()
    }

    pub fn tip(&self) -> Tip {
        self.chain().tip()
    }

    pub fn height(&self) -> u64 {
        self.chain().height()
    }

    /// Replays the whole chain from genesis. See [`Blockchain::validate_chain`].
    pub fn validate_chain(&self) -> Result<(), BlockError> {
        self.chain().validate_chain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::pow::leading_zero_bits;
    use crate::core::params::GenesisAllocation;
    use crate::core::transaction::TxPayload;
    use crate::crypto;
    use crate::types::encoding::Encode;
    use crate::utils::test_utils::utils::{claim, key, open_remit, pay, stake, test_params};
    use std::sync::Arc;
    use std::thread;

    fn ledger_with(balances: &[(u8, u128)]) -> Ledger {
        let allocations = balances
            .iter()
            .map(|(k, b)| GenesisAllocation::new(key(*k).address(), *b))
            .collect();
        Ledger::new(test_params(allocations))
    }

    fn chain_id(ledger: &Ledger) -> u64 {
        ledger.params().chain_id
    }

    fn mine(ledger: &Ledger, producer: Address) -> Block {
        ledger
            .produce_block(producer, ProductionPolicy::ProofOfWork)
            .unwrap()
    }

    #[test]
    fn submit_then_mine_applies_payment() {
        let ledger = ledger_with(&[(1, 1_000)]);
        let id = chain_id(&ledger);
        let tx = pay(&key(1), key(2).address(), 100, 3, 0, id);
        let tx_id = ledger.submit_transaction(tx).unwrap();
        assert_eq!(ledger.pending_len(), 1);

        let block = mine(&ledger, key(9).address());
        assert_eq!(block.transactions[0].id(id), tx_id);
        assert_eq!(ledger.pending_len(), 0);
        assert_eq!(ledger.height(), 1);

        let alice = ledger.get_account(&key(1).address());
        assert_eq!(alice.balance, 897);
        assert_eq!(alice.nonce, 1);
        assert_eq!(ledger.get_account(&key(2).address()).balance, 100);
        assert_eq!(
            ledger.get_account(&key(9).address()).balance,
            3 + ledger.params().rewards.pow_block_reward
        );
    }

    #[test]
    fn faucet_funds_new_account_which_then_pays() {
        let ledger = ledger_with(&[(1, 1_000)]);
        let id = chain_id(&ledger);
        let (x, y) = (key(5), key(6));
        assert_eq!(ledger.get_account(&x.address()).balance, 0);
        assert_eq!(ledger.get_account(&x.address()).nonce, 0);

        ledger
            .submit_transaction(pay(&key(1), x.address(), 200, 1, 0, id))
            .unwrap();
        mine(&ledger, key(9).address());
        assert_eq!(ledger.get_account(&x.address()).balance, 200);

        ledger
            .submit_transaction(pay(&x, y.address(), 50, 2, 0, id))
            .unwrap();
        mine(&ledger, key(9).address());

        let x_view = ledger.get_account(&x.address());
        assert_eq!(x_view.nonce, 1);
        assert_eq!(x_view.balance, 148);
        assert_eq!(ledger.get_account(&y.address()).balance, 50);
        assert_eq!(ledger.get_chain_summary().len(), 3);
    }

    #[test]
    fn produced_pow_block_meets_difficulty() {
        let ledger = ledger_with(&[]);
        let block = mine(&ledger, key(9).address());
        let difficulty = ledger.params().pow.difficulty;
        assert!(difficulty > 0);
        assert!(leading_zero_bits(&block.hash(chain_id(&ledger))) >= difficulty);
        assert_eq!(ledger.get_chain_summary()[1], block.hash(chain_id(&ledger)));
    }

    #[test]
    fn submission_sees_pending_transactions() {
        let ledger = ledger_with(&[(1, 100)]);
        let id = chain_id(&ledger);
        ledger
            .submit_transaction(pay(&key(1), key(2).address(), 60, 0, 0, id))
            .unwrap();
        ledger
            .submit_transaction(pay(&key(1), key(2).address(), 30, 0, 1, id))
            .unwrap();
        assert_eq!(
            ledger.submit_transaction(pay(&key(1), key(2).address(), 30, 0, 2, id)),
            Err(TransactionError::InsufficientBalance {
                required: 30,
                available: 10
            })
        );
        assert_eq!(
            ledger.submit_transaction(pay(&key(1), key(2).address(), 1, 0, 5, id)),
            Err(TransactionError::NonceMismatch {
                expected: 2,
                actual: 5
            })
        );
    }

    #[test]
    fn pending_state_extends_per_submission_and_resets_on_new_tip() {
        let ledger = ledger_with(&[(1, 100)]);
        let id = chain_id(&ledger);
        let alice = key(1).address();
        ledger
            .submit_transaction(pay(&key(1), key(2).address(), 10, 1, 0, id))
            .unwrap();
        assert!(
            ledger
                .submit_transaction(pay(&key(1), key(2).address(), 500, 0, 1, id))
                .is_err()
        );
        ledger
            .submit_transaction(pay(&key(1), key(2).address(), 20, 1, 1, id))
            .unwrap();

        {
            let pending = ledger.pending();
            let cached = pending.as_ref().unwrap();
            assert_eq!(cached.tip, ledger.chain().tip_hash());
            let (_, sender) = cached
                .writes
                .accounts
                .iter()
                .find(|(address, _)| *address == alice)
                .unwrap();
            assert_eq!(sender.nonce(), 2);
            assert_eq!(sender.balance(), 68);
        }

        mine(&ledger, key(9).address());
        assert!(ledger.pending().is_none());
        assert_eq!(ledger.get_account(&alice).nonce, 2);
        ledger
            .submit_transaction(pay(&key(1), key(2).address(), 1, 0, 2, id))
            .unwrap();
    }

    #[test]
    fn duplicate_submission_rejected() {
        let ledger = ledger_with(&[(1, 100)]);
        let tx = pay(&key(1), key(2).address(), 1, 0, 0, chain_id(&ledger));
        let tx_id = ledger.submit_transaction(tx.clone()).unwrap();
        assert_eq!(
            ledger.submit_transaction(tx),
            Err(TransactionError::AlreadyPending(tx_id))
        );
    }

    #[test]
    fn concurrent_submissions_keep_nonces_consistent() {
        let ledger = Arc::new(ledger_with(&[(1, 1_000), (2, 1_000), (3, 1_000)]));
        let id = chain_id(&ledger);
        let handles: Vec<_> = (1..=3u8)
            .map(|sender| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for nonce in 0..5 {
                        let tx = pay(&key(sender), key(7).address(), 10, 1, nonce, id);
                        ledger.submit_transaction(tx).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(ledger.pending_len(), 15);

        let block = mine(&ledger, key(9).address());
        assert_eq!(block.transactions.len(), 15);
        assert_eq!(ledger.get_account(&key(7).address()).balance, 150);
        for sender in 1..=3u8 {
            let account = ledger.get_account(&key(sender).address());
            assert_eq!(account.nonce, 5);
            assert_eq!(account.balance, 1_000 - 55);
        }
    }

    #[test]
    fn remittance_flow() {
        let ledger = ledger_with(&[(1, 1_000), (2, 5)]);
        let id = chain_id(&ledger);
        let open = open_remit(&key(1), key(2).address(), b"4321", 300, 2, 0, id);
        let escrow_id = ledger.submit_transaction(open).unwrap();
        mine(&ledger, key(9).address());

        let escrow = ledger.get_escrow(&escrow_id).unwrap();
        assert!(escrow.is_open());
        assert_eq!(escrow.hash_lock, crypto::hash_lock(b"4321"));
        assert_eq!(ledger.get_account(&key(1).address()).balance, 698);

        assert_eq!(
            ledger.submit_transaction(claim(&key(2), escrow_id, b"0000", 1, 0, id)),
            Err(TransactionError::PreimageMismatch(escrow_id))
        );
        ledger
            .submit_transaction(claim(&key(2), escrow_id, b"4321", 1, 0, id))
            .unwrap();
        mine(&ledger, key(9).address());

        assert!(!ledger.get_escrow(&escrow_id).unwrap().is_open());
        assert_eq!(ledger.get_account(&key(2).address()).balance, 304);
        assert_eq!(
            ledger.submit_transaction(claim(&key(2), escrow_id, b"4321", 1, 1, id)),
            Err(TransactionError::EscrowAlreadyClaimed(escrow_id))
        );
    }

    #[test]
    fn pos_production_by_selected_validator() {
        let ledger = ledger_with(&[(1, 1_000)]);
        let id = chain_id(&ledger);
        ledger
            .submit_transaction(stake(&key(1), 500, 0, 0, id))
            .unwrap();
        mine(&ledger, key(9).address());
        assert_eq!(ledger.get_account(&key(1).address()).staked, 500);

        let block = ledger
            .produce_block(key(1).address(), ProductionPolicy::ProofOfStake(key(1)))
            .unwrap();
        assert!(matches!(block.proof, crate::core::block::Proof::Stake { .. }));
        assert_eq!(ledger.height(), 2);
    }

    #[test]
    fn pos_production_rejects_wrong_key() {
        let ledger = ledger_with(&[(1, 1_000)]);
        assert_eq!(
            ledger.produce_block(key(1).address(), ProductionPolicy::ProofOfStake(key(2))),
            Err(ConsensusError::ProducerKeyMismatch(key(1).address()))
        );
    }

    #[test]
    fn pos_production_without_validators() {
        let ledger = ledger_with(&[(1, 1_000)]);
        assert_eq!(
            ledger.produce_block(key(1).address(), ProductionPolicy::ProofOfStake(key(1))),
            Err(ConsensusError::NoEligibleValidator)
        );
    }

    #[test]
    fn pos_production_by_unselected_validator() {
        let ledger = ledger_with(&[(1, 1_000), (2, 1_000)]);
        let id = chain_id(&ledger);
        ledger.submit_transaction(stake(&key(1), 10, 0, 0, id)).unwrap();
        mine(&ledger, key(9).address());

        let err = ledger
            .produce_block(key(2).address(), ProductionPolicy::ProofOfStake(key(2)))
            .unwrap_err();
        assert_eq!(
            err,
            ConsensusError::ValidatorNotSelected {
                producer: key(2).address(),
                selected: key(1).address()
            }
        );
        assert_eq!(ledger.height(), 1);
    }

    #[test]
    fn stale_mining_result_is_discarded() {
        let mut params = test_params(vec![]);
        params.pow.difficulty = 0;
        let ledger = Ledger::new(params.clone());
        let other = Ledger::new(params);

        // Build a block on the same tip elsewhere, ingest it here, then try
        // to commit a block mined against the old tip.
        let (header, txs) = ledger.chain().assemble(&[], key(8).address());
        let template = SealTemplate::new(header, ledger.params().chain_id);
        let remote = other.produce_block(key(9).address(), ProductionPolicy::ProofOfWork).unwrap();
        ledger.ingest_block(remote).unwrap();

        let stale = template.into_block(0, txs);
        assert!(matches!(
            ledger.ingest_block(stale),
            Err(BlockError::ChainLinkageMismatch { .. })
        ));
        assert_eq!(ledger.height(), 1);
    }

    #[test]
    fn tip_advance_cancels_running_search() {
        let mut params = test_params(vec![]);
        params.pow.difficulty = 250;
        let ledger = Arc::new(Ledger::new(params.clone()));

        let miner = {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || ledger.produce_block(key(8).address(), ProductionPolicy::ProofOfWork))
        };
        while ledger.searches().is_empty() {
            thread::yield_now();
        }

        let mut easy = params;
        easy.pow.difficulty = 0;
        let remote = Ledger::new(easy)
            .produce_block(key(9).address(), ProductionPolicy::ProofOfWork)
            .unwrap();
        // The block was mined at difficulty 0, so it fails the local check,
        // but a rejected block must not cancel anything.
        assert!(ledger.ingest_block(remote).is_err());
        assert_eq!(ledger.searches().len(), 1);

        assert_eq!(ledger.cancel_mining(), 1);
        assert_eq!(miner.join().unwrap(), Err(ConsensusError::Cancelled));
        assert_eq!(ledger.height(), 0);
    }

    #[test]
    fn exhausted_budget_reported() {
        let mut params = test_params(vec![]);
        params.pow.difficulty = 250;
        params.pow.max_attempts = Some(64);
        let ledger = Ledger::new(params);
        assert_eq!(
            ledger.produce_block(key(8).address(), ProductionPolicy::ProofOfWork),
            Err(ConsensusError::Exhausted)
        );
        assert!(ledger.searches().is_empty());
    }

    #[test]
    fn ingest_block_bytes_round_trip_and_garbage() {
        let source = ledger_with(&[(1, 1_000)]);
        let id = chain_id(&source);
        source
            .submit_transaction(pay(&key(1), key(2).address(), 10, 0, 0, id))
            .unwrap();
        let block = mine(&source, key(9).address());

        let sink = ledger_with(&[(1, 1_000)]);
        sink.ingest_block_bytes(block.to_bytes().as_slice()).unwrap();
        assert_eq!(sink.get_chain_summary(), source.get_chain_summary());
        assert_eq!(sink.get_account(&key(2).address()).balance, 10);

        assert!(matches!(
            sink.ingest_block_bytes(&[1, 2, 3]),
            Err(BlockError::Encoding(_))
        ));
    }

    #[test]
    fn ingested_block_clears_included_pending() {
        let source = ledger_with(&[(1, 1_000)]);
        let sink = ledger_with(&[(1, 1_000)]);
        let id = chain_id(&source);
        let tx = pay(&key(1), key(2).address(), 10, 0, 0, id);
        source.submit_transaction(tx.clone()).unwrap();
        sink.submit_transaction(tx).unwrap();

        let block = mine(&source, key(9).address());
        sink.ingest_block(block).unwrap();
        assert_eq!(sink.pending_len(), 0);
    }

    #[test]
    fn double_sign_through_ingest_is_slashed() {
        let ledger = ledger_with(&[(1, 1_000)]);
        let id = chain_id(&ledger);
        ledger.submit_transaction(stake(&key(1), 400, 0, 0, id)).unwrap();
        mine(&ledger, key(9).address());

        let first = ledger
            .produce_block(key(1).address(), ProductionPolicy::ProofOfStake(key(1)))
            .unwrap();
        let mut second = first.clone();
        second.header.timestamp += 1;
        second.proof = pos::seal(&key(1), &second.header, id);
        assert!(ledger.ingest_block(second).is_err());

        let records = ledger.slashing_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].validator, key(1).address());
        let account = ledger.get_account(&key(1).address());
        assert_eq!(account.staked, 200);
        assert!(account.slashed);
        assert_eq!(
            ledger.produce_block(key(1).address(), ProductionPolicy::ProofOfStake(key(1))),
            Err(ConsensusError::NoEligibleValidator)
        );
        assert_eq!(ledger.validate_chain(), Ok(()));
    }

    #[test]
    fn unsigned_payload_change_rejected() {
        let ledger = ledger_with(&[(1, 1_000)]);
        let mut tx = pay(&key(1), key(2).address(), 10, 0, 0, chain_id(&ledger));
        tx.payload = TxPayload::Pay {
            recipient: key(3).address(),
        };
        assert_eq!(
            ledger.submit_transaction(tx),
            Err(TransactionError::SignatureInvalid)
        );
        assert_eq!(ledger.pending_len(), 0);
    }
}
