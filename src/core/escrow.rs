use crate::core::validator::TransactionError;
use crate::crypto::hash_lock;
use crate::types::address::Address;
use crate::types::hash::Hash;
use remitchain_derive::BinaryCodec;

#[derive(BinaryCodec, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscrowStatus {
    Open,
    Claimed,
}

/// Funds locked by an `OPEN_REMIT` until the recipient's `CLAIM_REMIT`
/// reveals a preimage of `hash_lock`.
///
/// The only transition is `Open -> Claimed`, performed once by [`Escrow::claim`].
#[derive(BinaryCodec, Clone, Debug, PartialEq, Eq)]
pub struct Escrow {
    /// Id of the opening transaction.
    pub id: Hash,
    pub sender: Address,
    pub recipient: Address,
    pub amount: u128,
    pub hash_lock: Hash,
    status: EscrowStatus,
}

impl Escrow {
    pub fn open(
        id: Hash,
        sender: Address,
        recipient: Address,
        amount: u128,
        hash_lock: Hash,
    ) -> Self {
        Self {
            id,
            sender,
            recipient,
            amount,
            hash_lock,
            status: EscrowStatus::Open,
        }
    }

    pub fn status(&self) -> EscrowStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == EscrowStatus::Open
    }

    /// Status first, then the lock: a claimed escrow reports
    /// `EscrowAlreadyClaimed` whatever preimage is offered.
    pub fn check_claim(&self, preimage: &[u8]) -> Result<(), TransactionError> {
        if !self.is_open() {
            return Err(TransactionError::EscrowAlreadyClaimed(self.id));
        }
        if hash_lock(preimage) != self.hash_lock {
            return Err(TransactionError::PreimageMismatch(self.id));
        }
        Ok(())
    }

    pub(crate) fn claim(&mut self, preimage: &[u8]) -> Result<(), TransactionError> {
        self.check_claim(preimage)?;
        self.status = EscrowStatus::Claimed;
        Ok(())
    }
}
