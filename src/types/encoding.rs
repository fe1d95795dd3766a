//! Canonical binary encoding.
//!
//! Every hash and every signature in the ledger is computed over bytes
//! produced here, so this layout is a compatibility contract:
//!
//! - integers: little-endian, fixed width (`u128` amounts are 16 bytes)
//! - `usize`: encoded as `u64`
//! - `bool`: one byte, 0 or 1
//! - `Vec<T>`, `String`, `Bytes`: `u64` length prefix, then the elements
//! - `Option<T>`: tag byte (0 = none, 1 = some), then the value
//! - `[u8; N]` (hashes, addresses): raw bytes, no prefix
//! - derived structs: fields in declaration order
//! - derived enums: `u8` tag, then the variant's fields
//!
//! Decoding is strict: truncated input, unknown tags, out-of-range bools,
//! oversized length prefixes and trailing bytes are all rejected.

use crate::types::bytes::Bytes;
use remitchain_derive::Error;

/// Maximum element count accepted for a length-prefixed sequence.
pub const MAX_SEQUENCE_LEN: usize = 1 << 20;

/// Destination for encoded bytes (buffers, hashers, size counters).
pub trait EncodeSink {
    fn write(&mut self, bytes: &[u8]);
}

/// Counts bytes without storing them, used to size buffers up front.
#[derive(Default)]
pub struct SizeCounter {
    len: usize,
}

impl SizeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl EncodeSink for SizeCounter {
    fn write(&mut self, bytes: &[u8]) {
        self.len += bytes.len();
    }
}

impl EncodeSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

impl EncodeSink for Bytes {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

pub trait Encode {
    fn encode<S: EncodeSink>(&self, out: &mut S);

    /// Encodes into a buffer allocated with the exact encoded size.
    fn to_bytes(&self) -> Bytes {
        let mut counter = SizeCounter::new();
        self.encode(&mut counter);

        let mut out = Bytes::with_capacity(counter.len());
        self.encode(&mut out);
        out
    }

    /// Number of bytes `encode` would write.
    fn encoded_len(&self) -> usize {
        let mut counter = SizeCounter::new();
        self.encode(&mut counter);
        counter.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("invalid value")]
    InvalidValue,
    #[error("unknown variant tag {0}")]
    UnknownTag(u8),
    #[error("length prefix {0} exceeds the allowed maximum")]
    LengthOverflow(u64),
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
}

pub trait Decode: Sized {
    /// Decodes one value and advances `input` past it.
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError>;

    /// Decodes a value that must span all of `data`.
    fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let mut input = data;
        let value = Self::decode(&mut input)?;
        if !input.is_empty() {
            return Err(DecodeError::TrailingBytes(input.len()));
        }
        Ok(value)
    }
}

/// Splits `n` bytes off the front of `input`.
pub(crate) fn read_bytes<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], DecodeError> {
    if input.len() < n {
        return Err(DecodeError::UnexpectedEof);
    }
    let (head, rest) = input.split_at(n);
    *input = rest;
    Ok(head)
}

/// Reads a `u64` length prefix and checks it against [`MAX_SEQUENCE_LEN`].
pub(crate) fn read_len(input: &mut &[u8]) -> Result<usize, DecodeError> {
    let len = u64::decode(input)?;
    match usize::try_from(len) {
        Ok(n) if n <= MAX_SEQUENCE_LEN => Ok(n),
        _ => Err(DecodeError::LengthOverflow(len)),
    }
}

macro_rules! impl_le_int {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn encode<S: EncodeSink>(&self, out: &mut S) {
                    out.write(&self.to_le_bytes());
                }
            }

            impl Decode for $t {
                fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
                    const WIDTH: usize = std::mem::size_of::<$t>();
                    let mut buf = [0u8; WIDTH];
                    buf.copy_from_slice(read_bytes(input, WIDTH)?);
                    Ok(<$t>::from_le_bytes(buf))
                }
            }
        )*
    };
}

impl_le_int!(u8, u16, u32, u64, u128);

impl Encode for usize {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        (*self as u64).encode(out);
    }
}

impl Decode for usize {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let v = u64::decode(input)?;
        usize::try_from(v).map_err(|_| DecodeError::LengthOverflow(v))
    }
}

impl Encode for bool {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[u8::from(*self)]);
    }
}

impl Decode for bool {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        for item in self {
            item.encode(out);
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = read_len(input)?;
        // Reservation bounded by the remaining input, not the claimed length.
        let mut items = Vec::with_capacity(len.min(input.len()));
        for _ in 0..len {
            items.push(T::decode(input)?);
        }
        Ok(items)
    }
}

impl Encode for String {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.as_str().encode(out);
    }
}

impl Encode for &str {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        out.write(self.as_bytes());
    }
}

impl Decode for String {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = read_len(input)?;
        let raw = read_bytes(input, len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidValue)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        match self {
            None => 0u8.encode(out),
            Some(v) => {
                1u8.encode(out);
                v.encode(out);
            }
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(input)?)),
            tag => Err(DecodeError::UnknownTag(tag)),
        }
    }
}

impl<const N: usize> Encode for [u8; N] {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(self);
    }
}

impl<const N: usize> Decode for [u8; N] {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(read_bytes(input, N)?);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u128_amounts_are_sixteen_little_endian_bytes() {
        let amount: u128 = 50_000_000;
        let bytes = amount.to_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..4], &50_000_000u32.to_le_bytes());
        assert!(bytes[4..].iter().all(|b| *b == 0));
        assert_eq!(u128::from_bytes(&bytes).unwrap(), amount);
    }

    #[test]
    fn u64_is_little_endian() {
        let bytes = 0x0102_0304_0506_0708u64.to_bytes();
        assert_eq!(bytes.as_slice(), &[8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn every_integer_width_decodes_and_rejects_short_input() {
        assert_eq!(u8::from_bytes(&[0x7F]), Ok(0x7F));
        assert_eq!(u16::from_bytes(&[0x34, 0x12]), Ok(0x1234));
        assert_eq!(u32::from_bytes(&[4, 3, 2, 1]), Ok(0x0102_0304));
        assert_eq!(u64::from_bytes(&7u64.to_le_bytes()), Ok(7));
        assert_eq!(u128::from_bytes(&u128::MAX.to_le_bytes()), Ok(u128::MAX));

        assert_eq!(u16::from_bytes(&[1]), Err(DecodeError::UnexpectedEof));
        assert_eq!(u32::from_bytes(&[1, 2, 3]), Err(DecodeError::UnexpectedEof));
        assert_eq!(u128::from_bytes(&[0; 15]), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn to_bytes_allocates_exact_size() {
        let data: Vec<u64> = vec![1, 2, 3];
        let bytes = data.to_bytes();
        assert_eq!(bytes.len(), 8 + 3 * 8);
        assert_eq!(data.encoded_len(), bytes.len());
    }

    #[test]
    fn vec_has_u64_length_prefix() {
        let bytes = vec![0xAAu8, 0xBB].to_bytes();
        assert_eq!(&bytes[..8], &2u64.to_le_bytes());
        assert_eq!(&bytes[8..], &[0xAA, 0xBB]);
    }

    #[test]
    fn oversized_length_prefix_rejected() {
        let prefix = (MAX_SEQUENCE_LEN as u64 + 1).to_bytes();
        assert_eq!(
            Vec::<u8>::from_bytes(&prefix),
            Err(DecodeError::LengthOverflow(MAX_SEQUENCE_LEN as u64 + 1))
        );
    }

    #[test]
    fn length_prefix_longer_than_input_is_eof() {
        let mut bytes = 10u64.to_bytes().to_vec();
        bytes.extend_from_slice(&[1, 2, 3]);
        assert_eq!(Vec::<u8>::from_bytes(&bytes), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn bool_rejects_values_other_than_zero_and_one() {
        assert_eq!(bool::from_bytes(&[1]), Ok(true));
        assert_eq!(bool::from_bytes(&[0]), Ok(false));
        assert_eq!(bool::from_bytes(&[2]), Err(DecodeError::InvalidValue));
    }

    #[test]
    fn option_tags() {
        assert_eq!(None::<u64>.to_bytes().as_slice(), &[0]);
        let some = Some(7u64).to_bytes();
        assert_eq!(some[0], 1);
        assert_eq!(Option::<u64>::from_bytes(&some), Ok(Some(7)));
        assert_eq!(Option::<u64>::from_bytes(&[9]), Err(DecodeError::UnknownTag(9)));
    }

    #[test]
    fn strings_are_utf8_with_prefix() {
        let bytes = "héllo".to_string().to_bytes();
        assert_eq!(&bytes[..8], &6u64.to_le_bytes());
        assert_eq!(String::from_bytes(&bytes).unwrap(), "héllo");

        let mut invalid = 2u64.to_bytes().to_vec();
        invalid.extend_from_slice(&[0xC3, 0x28]);
        assert_eq!(String::from_bytes(&invalid), Err(DecodeError::InvalidValue));
    }

    #[test]
    fn fixed_arrays_have_no_prefix() {
        let arr = [9u8; 4];
        assert_eq!(arr.to_bytes().as_slice(), &arr);
        assert_eq!(<[u8; 4]>::from_bytes(&arr), Ok(arr));
        assert_eq!(<[u8; 4]>::from_bytes(&arr[..3]), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn trailing_bytes_rejected() {
        assert_eq!(u8::from_bytes(&[1, 2, 3]), Err(DecodeError::TrailingBytes(2)));
    }

    #[test]
    fn decode_advances_the_cursor() {
        let mut input: &[u8] = &[1, 2, 0, 0, 0, 0, 0, 0, 0, 0xFF];
        assert_eq!(u8::decode(&mut input), Ok(1));
        assert_eq!(u64::decode(&mut input), Ok(2));
        assert_eq!(input, &[0xFF]);
    }
}
