//! Ledger state and pending transactions.
//!
//! - [`state`]: the [`State`](state::State) trait, the in-memory
//!   [`LedgerState`](state::LedgerState), copy-on-write overlays and the
//!   per-transaction state transition
//! - [`txpool`]: pending transactions awaiting inclusion

pub mod state;
pub mod txpool;
