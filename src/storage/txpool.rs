//! Pending transactions awaiting block inclusion.
//!
//! Transactions are kept in arrival order; block assembly takes them front
//! to back. A hash index gives lock-free duplicate checks.

use crate::core::transaction::Transaction;
use crate::core::validator::TransactionError;
use crate::storage::state::State;
use crate::types::hash::Hash;
use crate::warn;
use dashmap::DashMap;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default transaction pool capacity.
pub const TXPOOL_CAPACITY: usize = 10_000;

/// Thread-safe FIFO of pending transactions.
pub struct TxPool {
    chain_id: u64,
    capacity: usize,
    /// Arrival order; the id is cached next to each transaction.
    queue: Mutex<VecDeque<(Hash, Transaction)>>,
    index: DashMap<Hash, ()>,
}

impl TxPool {
    /// Creates a pool holding at most `capacity` transactions
    /// (`TXPOOL_CAPACITY` if `None`).
    pub fn new(capacity: Option<usize>, chain_id: u64) -> Self {
        Self {
            chain_id,
            capacity: capacity.unwrap_or(TXPOOL_CAPACITY).max(1),
            queue: Mutex::new(VecDeque::new()),
            index: DashMap::new(),
        }
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<(Hash, Transaction)>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contains(&self, hash: Hash) -> bool {
        self.index.contains_key(&hash)
    }

    pub fn len(&self) -> usize {
        self.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }

    /// Queues `transaction` and returns its id.
    pub fn append(&self, transaction: Transaction) -> Result<Hash, TransactionError> {
        let hash = transaction.id(self.chain_id);
        let mut queue = self.queue();

        if self.index.contains_key(&hash) {
            return Err(TransactionError::AlreadyPending(hash));
        }
        if queue.len() >= self.capacity {
            warn!("Transaction pool full, dropping transaction={hash}");
            return Err(TransactionError::PoolFull);
        }

        self.index.insert(hash, ());
        queue.push_back((hash, transaction));
        Ok(hash)
    }

    /// Pending transactions in arrival order.
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.queue().iter().map(|(_, tx)| tx.clone()).collect()
    }

    /// Removes the given ids, typically the transactions of a new block.
    pub fn remove_batch(&self, hashes: &[Hash]) {
        if hashes.is_empty() {
            return;
        }
        let drop: HashSet<&Hash> = hashes.iter().collect();
        let mut queue = self.queue();
        queue.retain(|(hash, _)| {
            if drop.contains(hash) {
                self.index.remove(hash);
                false
            } else {
                true
            }
        });
    }

    /// Drops transactions whose nonce has already been used according to
    /// `state`. Returns how many were dropped.
    pub fn prune(&self, state: &dyn State) -> usize {
        let mut queue = self.queue();
        let before = queue.len();
        queue.retain(|(hash, tx)| {
            let stale = tx.nonce < state.account(&tx.sender).nonce();
            if stale {
                self.index.remove(hash);
            }
            !stale
        });
        before - queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::account::Account;
    use crate::storage::state::LedgerState;
    use crate::utils::test_utils::utils::{key, pay};

    const CHAIN_ID: u64 = 9;

    #[test]
    fn fifo_order_preserved() {
        let pool = TxPool::new(None, CHAIN_ID);
        let txs: Vec<_> = (0..5)
            .map(|n| pay(&key(1), key(2).address(), 1, 0, n, CHAIN_ID))
            .collect();
        for tx in txs.iter().rev() {
            pool.append(tx.clone()).unwrap();
        }
        let snapshot = pool.snapshot();
        let nonces: Vec<u64> = snapshot.iter().map(|tx| tx.nonce).collect();
        assert_eq!(nonces, vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn duplicate_rejected() {
        let pool = TxPool::new(None, CHAIN_ID);
        let tx = pay(&key(1), key(2).address(), 1, 0, 0, CHAIN_ID);
        let hash = pool.append(tx.clone()).unwrap();
        assert!(pool.contains(hash));
        assert_eq!(pool.append(tx), Err(TransactionError::AlreadyPending(hash)));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn capacity_enforced() {
        let pool = TxPool::new(Some(2), CHAIN_ID);
        for n in 0..2 {
            pool.append(pay(&key(1), key(2).address(), 1, 0, n, CHAIN_ID))
                .unwrap();
        }
        assert_eq!(
            pool.append(pay(&key(1), key(2).address(), 1, 0, 2, CHAIN_ID)),
            Err(TransactionError::PoolFull)
        );
    }

    #[test]
    fn remove_batch_clears_index() {
        let pool = TxPool::new(None, CHAIN_ID);
        let a = pool
            .append(pay(&key(1), key(2).address(), 1, 0, 0, CHAIN_ID))
            .unwrap();
        let b = pool
            .append(pay(&key(1), key(2).address(), 1, 0, 1, CHAIN_ID))
            .unwrap();
        pool.remove_batch(&[a]);
        assert!(!pool.contains(a));
        assert!(pool.contains(b));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn prune_drops_consumed_nonces() {
        let pool = TxPool::new(None, CHAIN_ID);
        for n in 0..3 {
            pool.append(pay(&key(1), key(2).address(), 1, 0, n, CHAIN_ID))
                .unwrap();
        }
        let mut state = LedgerState::new();
        let mut account = Account::new(10);
        account.increment_nonce();
        account.increment_nonce();
        state.put_account(key(1).address(), account);

        assert_eq!(pool.prune(&state), 2);
        let remaining = pool.snapshot();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].nonce, 2);
    }
}
