//! Chain parameters and genesis allocations.
//!
//! Everything that two nodes must agree on to accept each other's blocks
//! lives here, next to process-local knobs (mining threads, attempt budgets,
//! pool capacity) that only affect the local node.

use crate::core::account::Account;
use crate::storage::txpool::TXPOOL_CAPACITY;
use crate::types::address::Address;

/// Proof-of-work settings.
#[derive(Clone, Debug)]
pub struct PowParams {
    /// Required number of leading zero bits in a block hash. Static.
    pub difficulty: u32,
    /// Worker threads used by the local miner.
    pub threads: usize,
    /// Attempts after which a search gives up; `None` searches until found
    /// or cancelled.
    pub max_attempts: Option<u64>,
}

/// Staking and slashing policy.
#[derive(Clone, Debug)]
pub struct StakingParams {
    /// Share of the current stake burned per offence, in basis points.
    pub slash_bps: u16,
    /// Whether a slashed validator may still withdraw what is left.
    pub allow_unstake_while_slashed: bool,
    /// Blocks that must pass after the last STAKE before an UNSTAKE.
    pub min_lock_blocks: u64,
}

/// Amounts minted to the producer of each block, on top of fees.
#[derive(Clone, Debug)]
pub struct RewardParams {
    pub pow_block_reward: u128,
    pub pos_block_reward: u128,
}

/// A genesis balance.
#[derive(Clone, Debug)]
pub struct GenesisAllocation {
    pub address: Address,
    pub balance: u128,
}

impl GenesisAllocation {
    pub fn new(address: Address, balance: u128) -> Self {
        Self { address, balance }
    }
}

#[derive(Clone, Debug, Default)]
pub struct GenesisSpec {
    pub allocations: Vec<GenesisAllocation>,
}

impl GenesisSpec {
    /// Initial accounts sorted by address. Duplicate entries are summed.
    pub fn initial_accounts(&self) -> Vec<(Address, Account)> {
        let mut accounts: Vec<(Address, u128)> = Vec::with_capacity(self.allocations.len());
        for alloc in &self.allocations {
            match accounts.iter_mut().find(|(addr, _)| *addr == alloc.address) {
                Some((_, balance)) => *balance = balance.saturating_add(alloc.balance),
                None => accounts.push((alloc.address, alloc.balance)),
            }
        }
        accounts.sort_unstable_by_key(|(addr, _)| *addr);
        accounts
            .into_iter()
            .map(|(addr, balance)| (addr, Account::new(balance)))
            .collect()
    }
}

/// Chain-wide parameters.
#[derive(Clone, Debug)]
pub struct ChainParams {
    /// Domain separator for every transaction id and block hash.
    pub chain_id: u64,
    pub pow: PowParams,
    pub staking: StakingParams,
    pub rewards: RewardParams,
    /// Maximum number of pending transactions.
    pub pool_capacity: usize,
    pub genesis: GenesisSpec,
}

impl Default for PowParams {
    fn default() -> Self {
        Self {
            difficulty: 16,
            threads: 1,
            max_attempts: None,
        }
    }
}

impl Default for StakingParams {
    fn default() -> Self {
        Self {
            slash_bps: 5_000,
            allow_unstake_while_slashed: true,
            min_lock_blocks: 0,
        }
    }
}

impl Default for RewardParams {
    fn default() -> Self {
        Self {
            pow_block_reward: 50_000_000,
            pos_block_reward: 1_000_000,
        }
    }
}

impl ChainParams {
    /// Development parameters with the given genesis allocations.
    pub fn dev_with_allocations(allocations: Vec<GenesisAllocation>) -> Self {
        Self {
            chain_id: 1337,
            pow: PowParams::default(),
            staking: StakingParams::default(),
            rewards: RewardParams::default(),
            pool_capacity: TXPOOL_CAPACITY,
            genesis: GenesisSpec { allocations },
        }
    }

    /// Development parameters with an empty genesis.
    pub fn dev() -> Self {
        Self::dev_with_allocations(Vec::new())
    }
}
