//! Primitive value types and the canonical codec.
//!
//! - [`hash::Hash`]: SHA3-256 digests
//! - [`address::Address`]: 20-byte account identifiers
//! - [`bytes::Bytes`]: shared variable-length payloads
//! - [`encoding`]: the `Encode`/`Decode` wire format every hash is computed over
//! - [`merkle_tree::MerkleTree`]: transaction roots

pub mod address;
pub mod bytes;
pub mod encoding;
pub mod hash;
pub mod merkle_tree;
