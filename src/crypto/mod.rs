//! Hashing and signature primitives.
//!
//! All functions here are pure and fail closed: a signature that does not
//! check out yields `false`, never a panic.

pub mod key_pair;

use crate::crypto::key_pair::Signature;
use crate::types::address::{ADDRESS_SIZE, Address};
use crate::types::hash::{HASH_LEN, Hash};
use k256::schnorr::VerifyingKey;

/// `SHA3-256(x-only key)[12..32]`.
pub fn derive_address(key: &VerifyingKey) -> Address {
    let full = digest(&key.to_bytes());
    let mut out = [0u8; ADDRESS_SIZE];
    out.copy_from_slice(&full.0[HASH_LEN - ADDRESS_SIZE..]);
    Address(out)
}

/// Checks that `signature` was produced over `message` by the key behind
/// `address`.
pub fn verify(signature: &Signature, message: &[u8], address: &Address) -> bool {
    signature.signer.address == *address && signature.signer.verify(message, &signature.value)
}

/// Plain SHA3-256.
pub fn digest(bytes: &[u8]) -> Hash {
    Hash::sha3().chain(bytes).finalize()
}

/// Escrow lock for `secret`: plain SHA3-256 with no domain tag.
pub fn hash_lock(secret: &[u8]) -> Hash {
    digest(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_pair::PrivateKey;

    #[test]
    fn address_is_tail_of_key_digest() {
        let key = PrivateKey::from_bytes(&[9u8; 32]).unwrap();
        let public = key.public_key();
        let full = digest(&public.key.to_bytes());
        assert_eq!(public.address.0, full.0[12..]);
        assert_eq!(derive_address(&public.key), public.address);
    }

    #[test]
    fn verify_accepts_matching_address() {
        let key = PrivateKey::new();
        let sig = key.sign(b"msg");
        assert!(verify(&sig, b"msg", &key.address()));
    }

    #[test]
    fn verify_rejects_other_address() {
        let key = PrivateKey::new();
        let other = PrivateKey::new();
        let sig = key.sign(b"msg");
        assert!(!verify(&sig, b"msg", &other.address()));
    }

    #[test]
    fn verify_rejects_swapped_signer() {
        // Valid signature from `key`, but the envelope claims `other` signed it.
        let key = PrivateKey::new();
        let other = PrivateKey::new();
        let mut sig = key.sign(b"msg");
        sig.signer = other.public_key();
        assert!(!verify(&sig, b"msg", &other.address()));
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let key = PrivateKey::new();
        let sig = key.sign(b"msg");
        assert!(!verify(&sig, b"msg2", &key.address()));
    }

    #[test]
    fn hash_lock_is_plain_sha3() {
        assert_eq!(hash_lock(b"open sesame"), digest(b"open sesame"));
        assert_ne!(hash_lock(b"open sesame"), hash_lock(b"open sesame!"));
    }
}
