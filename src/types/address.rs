//! 20-byte account addresses derived from public keys.

use remitchain_derive::BinaryCodec;
use std::fmt;

pub const ADDRESS_SIZE: usize = 20;

/// Account identifier: the last 20 bytes of SHA3-256 over the x-only public
/// key (see `crypto::derive_address`).
///
/// `Ord` gives the ascending order used when walking the validator set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, BinaryCodec)]
pub struct Address(pub [u8; ADDRESS_SIZE]);

impl Address {
    /// The all-zero address, used as the genesis producer.
    pub const fn zero() -> Self {
        Address([0u8; ADDRESS_SIZE])
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Parses 40 hex characters, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.len() != ADDRESS_SIZE * 2 || !s.is_ascii() {
            return None;
        }
        let mut out = [0u8; ADDRESS_SIZE];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Address(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let addr = Address([0x1f; ADDRESS_SIZE]);
        let text = addr.to_string();
        assert_eq!(text.len(), 2 + ADDRESS_SIZE * 2);
        assert_eq!(Address::from_hex(&text), Some(addr));
        assert_eq!(Address::from_hex(&text[2..]), Some(addr));
    }

    #[test]
    fn from_hex_rejects_bad_input() {
        assert_eq!(Address::from_hex("0x1234"), None);
        assert_eq!(Address::from_hex(&"zz".repeat(ADDRESS_SIZE)), None);
    }

    #[test]
    fn ordering_is_bytewise() {
        let mut low = [0u8; ADDRESS_SIZE];
        low[0] = 1;
        let mut high = [0u8; ADDRESS_SIZE];
        high[0] = 2;
        assert!(Address(low) < Address(high));
        assert!(Address::zero() < Address(low));
    }
}
