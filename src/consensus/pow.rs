//! Proof-of-work search and verification.
//!
//! A search walks nonces upward from 0 until the block hash has at least
//! `difficulty` leading zero bits, the caller cancels it, or the attempt
//! budget runs out. Verification is a single hash.

use crate::core::block::{Block, Header, Proof};
use crate::core::params::PowParams;
use crate::core::transaction::Transaction;
use crate::core::validator::BlockError;
use crate::types::encoding::Encode;
use crate::types::hash::{Hash, HashBuilder};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Attempts between two polls of the cancellation flag.
pub const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Number of leading zero bits in `hash`, most significant byte first.
pub fn leading_zero_bits(hash: &Hash) -> u32 {
    let mut bits = 0;
    for byte in hash.0 {
        if byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}

pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
    leading_zero_bits(hash) >= difficulty
}

/// Shared flag that abandons a running search.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Whether both tokens control the same search.
    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// How a search ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MiningOutcome {
    Found { nonce: u64, hash: Hash },
    /// The token was cancelled before a nonce was found.
    Cancelled,
    /// The attempt budget (or the nonce space) ran out.
    Exhausted,
}

/// Header being mined, with the hash state up to the proof precomputed.
#[derive(Clone)]
pub struct SealTemplate {
    header: Header,
    prefix: HashBuilder,
}

impl SealTemplate {
    pub fn new(header: Header, chain_id: u64) -> Self {
        let prefix = header.hash_prefix(chain_id);
        Self { header, prefix }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Block hash the header would have with `Proof::Work { nonce }`.
    pub fn hash_with(&self, nonce: u64) -> Hash {
        let mut h = self.prefix.clone();
        Proof::Work { nonce }.encode(&mut h);
        h.finalize()
    }

    pub fn into_block(self, nonce: u64, transactions: Vec<Transaction>) -> Block {
        Block {
            header: self.header,
            proof: Proof::Work { nonce },
            transactions,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Miner {
    difficulty: u32,
    threads: usize,
    max_attempts: Option<u64>,
}

impl Miner {
    pub fn new(params: &PowParams) -> Self {
        Self {
            difficulty: params.difficulty,
            threads: params.threads.max(1),
            max_attempts: params.max_attempts,
        }
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Searches for a nonce. With several threads, worker `i` tries
    /// `i, i + threads, ...` and the lowest nonce found is returned.
    pub fn mine(&self, template: &SealTemplate, cancel: &CancelToken) -> MiningOutcome {
        let stop = AtomicBool::new(false);
        let threads = self.threads as u64;
        let budget = self.max_attempts.map(|max| max.div_ceil(threads));

        let found = if threads == 1 {
            self.search(template, cancel, &stop, 0, 1, budget)
        } else {
            let stop = &stop;
            thread::scope(|s| {
                let workers: Vec<_> = (0..threads)
                    .map(|start| {
                        s.spawn(move || self.search(template, cancel, stop, start, threads, budget))
                    })
                    .collect();
                workers
                    .into_iter()
                    .filter_map(|w| w.join().ok().flatten())
                    .min_by_key(|(nonce, _)| *nonce)
            })
        };

        match found {
            Some((nonce, hash)) => MiningOutcome::Found { nonce, hash },
            None if cancel.is_cancelled() => MiningOutcome::Cancelled,
            None => MiningOutcome::Exhausted,
        }
    }

    fn search(
        &self,
        template: &SealTemplate,
        cancel: &CancelToken,
        stop: &AtomicBool,
        start: u64,
        stride: u64,
        budget: Option<u64>,
    ) -> Option<(u64, Hash)> {
        let mut nonce = start;
        let mut attempts: u64 = 0;
        loop {
            if attempts % CANCEL_CHECK_INTERVAL == 0
                && (cancel.is_cancelled() || stop.load(Ordering::Relaxed))
            {
                return None;
            }
            if budget.is_some_and(|max| attempts >= max) {
                return None;
            }

            let hash = template.hash_with(nonce);
            if meets_difficulty(&hash, self.difficulty) {
                stop.store(true, Ordering::Relaxed);
                return Some((nonce, hash));
            }

            attempts += 1;
            nonce = nonce.checked_add(stride)?;
        }
    }

}

/// Recomputes the block hash and checks it against `difficulty`.
pub fn verify_work(block: &Block, chain_id: u64, difficulty: u32) -> Result<(), BlockError> {
    if !matches!(block.proof, Proof::Work { .. }) {
        return Err(BlockError::ConsensusProofInvalid);
    }
    let actual = leading_zero_bits(&block.hash(chain_id));
    if actual < difficulty {
        return Err(BlockError::ProofOfWorkInsufficient {
            required: difficulty,
            actual,
        });
    }
    Ok(())
}
