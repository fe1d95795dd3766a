use crate::core::validator::TransactionError;
use remitchain_derive::BinaryCodec;

/// Per-address ledger state.
///
/// Accounts exist implicitly: reading an unknown address yields
/// `Account::default()`, and an account is stored the first time a
/// transaction touches it. Accounts are never removed.
#[derive(BinaryCodec, Clone, Debug, Default, PartialEq, Eq)]
pub struct Account {
    /// Spendable balance in the smallest unit.
    balance: u128,
    /// Count of transactions applied from this address; the next valid
    /// transaction must carry exactly this value.
    nonce: u64,
    /// Amount locked for proof-of-stake selection.
    staked: u128,
    /// Set by slashing; cleared once the stake has been fully withdrawn.
    slashed: bool,
    /// Index of the block that last added stake.
    stake_height: u64,
}

/// Read-only snapshot returned to callers outside the core.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccountView {
    pub balance: u128,
    pub nonce: u64,
    pub staked: u128,
    pub slashed: bool,
}

impl Account {
    pub fn new(balance: u128) -> Self {
        Self {
            balance,
            ..Self::default()
        }
    }

    pub fn balance(&self) -> u128 {
        self.balance
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn staked(&self) -> u128 {
        self.staked
    }

    pub fn is_slashed(&self) -> bool {
        self.slashed
    }

    pub fn stake_height(&self) -> u64 {
        self.stake_height
    }

    pub fn view(&self) -> AccountView {
        AccountView {
            balance: self.balance,
            nonce: self.nonce,
            staked: self.staked,
            slashed: self.slashed,
        }
    }

    pub(crate) fn increment_nonce(&mut self) {
        self.nonce += 1;
    }

    pub(crate) fn credit(&mut self, amount: u128) -> Result<(), TransactionError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(TransactionError::InvalidAmount)?;
        Ok(())
    }

    pub(crate) fn debit(&mut self, amount: u128) -> Result<(), TransactionError> {
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or(TransactionError::InsufficientBalance {
                required: amount,
                available: self.balance,
            })?;
        Ok(())
    }

    /// Moves `amount` from balance into stake.
    pub(crate) fn lock_stake(&mut self, amount: u128, height: u64) -> Result<(), TransactionError> {
        let staked = self
            .staked
            .checked_add(amount)
            .ok_or(TransactionError::InvalidAmount)?;
        self.debit(amount)?;
        self.staked = staked;
        self.stake_height = height;
        Ok(())
    }

    /// Moves `amount` from stake back into balance. Withdrawing the last of
    /// the stake clears the slashed flag.
    pub(crate) fn release_stake(&mut self, amount: u128) -> Result<(), TransactionError> {
        let staked = self
            .staked
            .checked_sub(amount)
            .ok_or(TransactionError::InsufficientStake {
                required: amount,
                staked: self.staked,
            })?;
        self.credit(amount)?;
        self.staked = staked;
        if self.staked == 0 {
            self.slashed = false;
        }
        Ok(())
    }

    /// Burns `bps` basis points of the current stake and marks the account
    /// slashed. Returns the amount burned.
    pub(crate) fn slash(&mut self, bps: u16) -> u128 {
        let bps = u128::from(bps.min(10_000));
        // Split to avoid overflowing `staked * bps` for very large stakes.
        let burned = (self.staked / 10_000) * bps + (self.staked % 10_000) * bps / 10_000;
        self.staked -= burned;
        self.slashed = true;
        burned
    }
}
