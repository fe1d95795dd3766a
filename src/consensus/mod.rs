//! Block production engines.
//!
//! - [`pow`]: nonce search and difficulty checks
//! - [`pos`]: stake-weighted producer selection, seals and slashing evidence

pub mod pos;
pub mod pow;

use crate::core::validator::BlockError;
use crate::types::address::Address;
use remitchain_derive::Error;

/// Why a local production attempt did not extend the chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    #[error("no validator has stake")]
    NoEligibleValidator,

    #[error("{producer} was not selected for this slot, {selected} was")]
    ValidatorNotSelected { producer: Address, selected: Address },

    #[error("signing key does not belong to producer {0}")]
    ProducerKeyMismatch(Address),

    #[error("mining was cancelled")]
    Cancelled,

    #[error("mining attempt budget exhausted")]
    Exhausted,

    #[error("chain tip moved while mining")]
    StaleTip,

    #[error("produced block rejected: {0}")]
    Block(#[from] BlockError),
}
