//! Schnorr (BIP340) key pairs on secp256k1.

use crate::crypto::derive_address;
use crate::types::address::Address;
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use k256::schnorr::signature::{Signer, Verifier};
use k256::schnorr::{Signature as SchnorrSignature, SigningKey, VerifyingKey};
use rand_core::OsRng;
use std::fmt;

/// Length of an x-only public key on the wire.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Length of a BIP340 signature on the wire.
pub const SIGNATURE_LEN: usize = 64;

/// Signing key for transactions and proof-of-stake block seals.
///
/// Never encoded; key storage lives outside this crate.
#[derive(Clone)]
pub struct PrivateKey {
    key: SigningKey,
}

/// Verifying key together with the address derived from it.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub key: VerifyingKey,
    pub address: Address,
}

/// A signature plus the key that produced it.
///
/// BIP340 keys cannot be recovered from a signature, so the signer's key
/// travels with it; verification checks that this key hashes to the
/// claimed address before checking the signature itself.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Signature {
    pub signer: PublicKey,
    pub value: SchnorrSignature,
}

impl PrivateKey {
    /// Generates a key from OS entropy.
    pub fn new() -> Self {
        Self {
            key: SigningKey::random(&mut OsRng),
        }
    }

    /// Returns `None` when `bytes` is not a valid secp256k1 scalar.
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        SigningKey::from_bytes(bytes).ok().map(|key| Self { key })
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_verifying_key(*self.key.verifying_key())
    }

    pub fn address(&self) -> Address {
        self.public_key().address
    }

    /// Signs `data` and wraps the result with this key's public half.
    pub fn sign(&self, data: &[u8]) -> Signature {
        Signature {
            signer: self.public_key(),
            value: self.key.sign(data),
        }
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({})", self.address())
    }
}

impl PublicKey {
    pub fn from_verifying_key(key: VerifyingKey) -> Self {
        Self {
            key,
            address: derive_address(&key),
        }
    }

    pub fn verify(&self, data: &[u8], signature: &SchnorrSignature) -> bool {
        self.key.verify(data, signature).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.address)
    }
}

impl Encode for PublicKey {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.key.to_bytes());
    }
}

impl Decode for PublicKey {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = <[u8; PUBLIC_KEY_LEN]>::decode(input)?;
        let key = VerifyingKey::from_bytes(&bytes).map_err(|_| DecodeError::InvalidValue)?;
        Ok(Self::from_verifying_key(key))
    }
}

impl Encode for Signature {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.signer.encode(out);
        out.write(&self.value.to_bytes());
    }
}

impl Decode for Signature {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let signer = PublicKey::decode(input)?;
        let bytes = <[u8; SIGNATURE_LEN]>::decode(input)?;
        let value =
            SchnorrSignature::try_from(bytes.as_slice()).map_err(|_| DecodeError::InvalidValue)?;
        Ok(Self { signer, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let key = PrivateKey::new();
        let sig = key.sign(b"payload");
        assert_eq!(sig.signer, key.public_key());
        assert!(key.public_key().verify(b"payload", &sig.value));
        assert!(!key.public_key().verify(b"other", &sig.value));
    }

    #[test]
    fn from_bytes_is_deterministic() {
        let a = PrivateKey::from_bytes(&[5u8; 32]).unwrap();
        let b = PrivateKey::from_bytes(&[5u8; 32]).unwrap();
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn from_bytes_rejects_zero_scalar() {
        assert!(PrivateKey::from_bytes(&[0u8; 32]).is_none());
    }

    #[test]
    fn signature_wire_size() {
        let sig = PrivateKey::new().sign(b"x");
        let bytes = sig.to_bytes();
        assert_eq!(bytes.len(), PUBLIC_KEY_LEN + SIGNATURE_LEN);
        assert_eq!(Signature::from_bytes(&bytes).unwrap(), sig);
    }

    #[test]
    fn decoded_public_key_recomputes_address() {
        let key = PrivateKey::new();
        let decoded = PublicKey::from_bytes(&key.public_key().to_bytes()).unwrap();
        assert_eq!(decoded.address, key.address());
    }

    #[test]
    fn invalid_public_key_bytes_rejected() {
        // x = 0 is not on the curve
        let mut bytes = vec![0u8; PUBLIC_KEY_LEN];
        bytes.extend_from_slice(&[1u8; SIGNATURE_LEN]);
        assert_eq!(Signature::from_bytes(&bytes), Err(DecodeError::InvalidValue));
    }
}
