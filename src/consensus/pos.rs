//! Stake-weighted producer selection, block seals and slashing evidence.

use crate::core::block::{Header, Proof};
use crate::crypto;
use crate::crypto::key_pair::{PrivateKey, Signature};
use crate::storage::state::LedgerState;
use crate::types::address::Address;
use crate::types::hash::Hash;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Validators eligible for selection, keyed by address so iteration is in
/// ascending address order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatorSet {
    stakes: BTreeMap<Address, u128>,
    total: u128,
}

impl ValidatorSet {
    /// Accounts with positive stake that are not slashed.
    pub fn from_state(state: &LedgerState) -> Self {
        Self::from_stakes(
            state
                .accounts()
                .filter(|(_, account)| !account.is_slashed())
                .map(|(address, account)| (*address, account.staked())),
        )
    }

    /// Builds a set from `(address, stake)` pairs, skipping zero stakes.
    pub fn from_stakes(stakes: impl IntoIterator<Item = (Address, u128)>) -> Self {
        let stakes: BTreeMap<Address, u128> =
            stakes.into_iter().filter(|(_, stake)| *stake > 0).collect();
        let total = stakes.values().fold(0u128, |acc, s| acc.saturating_add(*s));
        Self { stakes, total }
    }

    pub fn is_empty(&self) -> bool {
        self.stakes.is_empty()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.stakes.contains_key(address)
    }

    /// Picks the validator for `seed`: the first 16 bytes read big-endian,
    /// reduced modulo the total stake, land in one validator's cumulative
    /// stake interval.
    pub fn select(&self, seed: &Hash) -> Option<Address> {
        if self.total == 0 {
            return None;
        }

        let mut head = [0u8; 16];
        head.copy_from_slice(&seed.0[..16]);
        let point = u128::from_be_bytes(head) % self.total;

        let mut cumulative: u128 = 0;
        for (address, stake) in &self.stakes {
            cumulative = cumulative.saturating_add(*stake);
            if point < cumulative {
                return Some(*address);
            }
        }
        None
    }
}

/// Seed for the slot following `previous_hash`.
pub fn selection_seed(previous_hash: &Hash) -> Hash {
    Hash::sha3()
        .chain(b"POS_SEED")
        .chain(previous_hash.as_slice())
        .finalize()
}

/// Signs the header's seal hash.
pub fn seal(key: &PrivateKey, header: &Header, chain_id: u64) -> Proof {
    Proof::Stake {
        signature: key.sign(header.seal_hash(chain_id).as_slice()),
    }
}

/// Checks that `signature` is the header producer's signature over the
/// seal hash.
pub fn verify_seal(signature: &Signature, header: &Header, chain_id: u64) -> bool {
    crypto::verify(
        signature,
        header.seal_hash(chain_id).as_slice(),
        &header.producer,
    )
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlashReason {
    /// Two different headers signed for the same index.
    DoubleSign { first: Hash, second: Hash },
    /// A correctly sealed block that failed validation.
    InvalidBlock,
}

impl fmt::Display for SlashReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlashReason::DoubleSign { first, second } => {
                write!(f, "double sign ({} vs {})", first.short(), second.short())
            }
            SlashReason::InvalidBlock => write!(f, "invalid block"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashingRecord {
    pub validator: Address,
    /// Index of the offending header.
    pub index: u64,
    pub reason: SlashReason,
    /// Stake burned.
    pub amount: u128,
    /// Chain height at which the slash was applied to the state.
    pub applied_at: u64,
}

/// Blocks behind the tip for which seals are kept as double-sign evidence.
pub const EVIDENCE_WINDOW: u64 = 64;

/// Evidence collected from signed proof-of-stake headers.
#[derive(Debug, Default)]
pub struct SlashingTracker {
    /// First seal hash seen for each `(index, producer)`.
    seen: HashMap<(u64, Address), Hash>,
    /// Offences already punished, so a replayed offence is not slashed twice.
    punished: HashSet<(u64, Address)>,
    records: Vec<SlashingRecord>,
}

impl SlashingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers a validly signed header. Returns the seal hash of an earlier,
    /// different header by the same producer at the same index.
    pub fn observe(&mut self, index: u64, producer: Address, seal: Hash) -> Option<Hash> {
        match self.seen.entry((index, producer)) {
            Entry::Occupied(entry) if *entry.get() != seal => Some(*entry.get()),
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                entry.insert(seal);
                None
            }
        }
    }

    /// Returns `true` the first time an offence at `(index, producer)` is
    /// reported.
    pub fn first_offence(&mut self, index: u64, producer: Address) -> bool {
        self.punished.insert((index, producer))
    }

    /// Drops seals and punished offences for indices below `index`.
    pub fn forget_before(&mut self, index: u64) {
        self.seen.retain(|(i, _), _| *i >= index);
        self.punished.retain(|(i, _)| *i >= index);
    }

    #[cfg(test)]
    pub(crate) fn seen_len(&self) -> usize {
        self.seen.len()
    }

    pub fn record(&mut self, record: SlashingRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[SlashingRecord] {
        &self.records
    }
}
