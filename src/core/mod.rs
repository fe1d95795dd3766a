//! Core ledger data structures and the rules that connect them.
//!
//! - `Account` / `Escrow`: per-address balances and hash-locked remittances
//! - `Transaction`: the five signed operations that change state
//! - `Block` / `Header`: transaction batches linked by hash and sealed by a proof
//! - `Blockchain`: the append-only chain with its committed state
//! - `Ledger`: the thread-safe facade used by callers

pub mod account;
pub mod block;
pub mod blockchain;
pub mod escrow;
pub mod ledger;
pub mod params;
pub mod transaction;
pub mod validator;
