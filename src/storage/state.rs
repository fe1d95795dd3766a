//! Account and escrow state.
//!
//! [`LedgerState`] is the committed state at the chain tip. [`StateOverlay`]
//! buffers writes on top of any [`State`] so a block (or a single
//! transaction during assembly) can be applied tentatively: merging the
//! overlay's writes commits it, dropping the overlay rolls it back.

use crate::core::account::Account;
use crate::core::escrow::Escrow;
use crate::core::params::GenesisSpec;
use crate::core::transaction::{Transaction, TxPayload};
use crate::core::validator::TransactionError;
use crate::types::address::Address;
use crate::types::hash::Hash;
use std::collections::{BTreeMap, HashMap};

/// Read/write access to accounts and escrows.
pub trait State {
    /// Account at `address`, or the empty account if none was ever stored.
    fn account(&self, address: &Address) -> Account;
    fn escrow(&self, id: &Hash) -> Option<Escrow>;
    fn put_account(&mut self, address: Address, account: Account);
    fn put_escrow(&mut self, escrow: Escrow);

    /// Stores every write collected by an overlay.
    fn commit(&mut self, writes: StateWrites) {
        for (address, account) in writes.accounts {
            self.put_account(address, account);
        }
        for escrow in writes.escrows {
            self.put_escrow(escrow);
        }
    }
}

/// Writes drained from a [`StateOverlay`], ordered by key.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StateWrites {
    pub accounts: Vec<(Address, Account)>,
    pub escrows: Vec<Escrow>,
}

/// Where and by whom a transaction is being applied.
#[derive(Debug, Clone, Copy)]
pub struct ApplyContext {
    pub chain_id: u64,
    /// Receives the fee.
    pub producer: Address,
    /// Index of the block containing the transaction.
    pub height: u64,
}

/// Applies `tx` to `state`.
///
/// Callers validate first; the checked arithmetic here only turns a skipped
/// validation into an error instead of corrupting balances. On error the
/// state may hold partial writes, so callers apply into an overlay.
pub fn apply_transaction(
    state: &mut dyn State,
    tx: &Transaction,
    ctx: &ApplyContext,
) -> Result<(), TransactionError> {
    let mut sender = state.account(&tx.sender);
    let total = tx
        .amount
        .checked_add(tx.fee)
        .ok_or(TransactionError::InvalidAmount)?;

    match &tx.payload {
        TxPayload::Pay { recipient } => {
            sender.debit(total)?;
            sender.increment_nonce();
            state.put_account(tx.sender, sender);

            let mut to = state.account(recipient);
            to.credit(tx.amount)?;
            state.put_account(*recipient, to);
        }
        TxPayload::Stake => {
            sender.debit(tx.fee)?;
            sender.lock_stake(tx.amount, ctx.height)?;
            sender.increment_nonce();
            state.put_account(tx.sender, sender);
        }
        TxPayload::Unstake => {
            sender.release_stake(tx.amount)?;
            sender.debit(tx.fee)?;
            sender.increment_nonce();
            state.put_account(tx.sender, sender);
        }
        TxPayload::OpenRemit {
            recipient,
            hash_lock,
        } => {
            sender.debit(total)?;
            sender.increment_nonce();
            state.put_account(tx.sender, sender);

            let id = tx.id(ctx.chain_id);
            state.put_escrow(Escrow::open(
                id,
                tx.sender,
                *recipient,
                tx.amount,
                *hash_lock,
            ));
        }
        TxPayload::ClaimRemit {
            escrow_id,
            preimage,
        } => {
            let mut escrow = state
                .escrow(escrow_id)
                .ok_or(TransactionError::EscrowNotFound(*escrow_id))?;
            escrow.claim(preimage)?;

            sender.debit(tx.fee)?;
            sender.increment_nonce();
            state.put_account(tx.sender, sender);

            let mut to = state.account(&escrow.recipient);
            to.credit(escrow.amount)?;
            state.put_account(escrow.recipient, to);
            state.put_escrow(escrow);
        }
    }

    credit(state, ctx.producer, tx.fee)
}

/// Adds `amount` to the balance at `address`.
pub fn credit(state: &mut dyn State, address: Address, amount: u128) -> Result<(), TransactionError> {
    if amount == 0 {
        return Ok(());
    }
    let mut account = state.account(&address);
    account.credit(amount)?;
    state.put_account(address, account);
    Ok(())
}

/// Committed state at the chain tip.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LedgerState {
    accounts: HashMap<Address, Account>,
    escrows: HashMap<Hash, Escrow>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State holding only the genesis allocations.
    pub fn from_genesis(genesis: &GenesisSpec) -> Self {
        Self {
            accounts: genesis.initial_accounts().into_iter().collect(),
            escrows: HashMap::new(),
        }
    }

    /// All stored accounts, in no particular order.
    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }

    /// Burns `bps` basis points of the stake at `address` and flags it.
    /// Returns the amount burned.
    pub fn slash(&mut self, address: &Address, bps: u16) -> u128 {
        let account = self.accounts.entry(*address).or_default();
        account.slash(bps)
    }
}

impl State for LedgerState {
    fn account(&self, address: &Address) -> Account {
        self.accounts.get(address).cloned().unwrap_or_default()
    }

    fn escrow(&self, id: &Hash) -> Option<Escrow> {
        self.escrows.get(id).cloned()
    }

    fn put_account(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, account);
    }

    fn put_escrow(&mut self, escrow: Escrow) {
        self.escrows.insert(escrow.id, escrow);
    }
}

/// Buffers writes while reading through to `base` for untouched keys.
pub struct StateOverlay<'a> {
    base: &'a dyn State,
    accounts: BTreeMap<Address, Account>,
    escrows: BTreeMap<Hash, Escrow>,
}

impl<'a> StateOverlay<'a> {
    pub fn new(base: &'a dyn State) -> Self {
        Self {
            base,
            accounts: BTreeMap::new(),
            escrows: BTreeMap::new(),
        }
    }

    /// Consumes the overlay and returns its pending writes.
    pub fn into_writes(self) -> StateWrites {
        StateWrites {
            accounts: self.accounts.into_iter().collect(),
            escrows: self.escrows.into_values().collect(),
        }
    }
}

impl State for StateOverlay<'_> {
    fn account(&self, address: &Address) -> Account {
        match self.accounts.get(address) {
            Some(account) => account.clone(),
            None => self.base.account(address),
        }
    }

    fn escrow(&self, id: &Hash) -> Option<Escrow> {
        match self.escrows.get(id) {
            Some(escrow) => Some(escrow.clone()),
            None => self.base.escrow(id),
        }
    }

    fn put_account(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, account);
    }

    fn put_escrow(&mut self, escrow: Escrow) {
        self.escrows.insert(escrow.id, escrow);
    }
}
