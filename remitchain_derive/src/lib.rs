//! Derive macros for the remitchain crate.
//!
//! - `#[derive(BinaryCodec)]` implements the canonical `Encode`/`Decode` pair
//! - `#[derive(Error)]` implements `Display`, `Error` and optional `From` conversions

mod binary_codec;
mod error;

use proc_macro::TokenStream;

/// Implements `Encode` and `Decode` using the canonical wire layout.
#[proc_macro_derive(BinaryCodec)]
pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    binary_codec::derive_binary_codec(input)
}

/// Implements `Display` and `Error` from `#[error("...")]` attributes.
#[proc_macro_derive(Error, attributes(error, source, from))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
