//! `#[derive(BinaryCodec)]`.
//!
//! Layout produced by the generated code:
//! - structs: every field in declaration order, no framing
//! - enums: one `u8` tag (explicit discriminant or previous + 1), then the
//!   variant's fields in declaration order
//!
//! Field values are written through their own `Encode` impls, so integer
//! width, endianness and length prefixes are decided by
//! `crate::types::encoding`, not here.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{Data, DataEnum, DeriveInput, Expr, Fields, Lit, parse_macro_input};

pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let (encode_body, decode_body) = match &input.data {
        Data::Struct(data) => struct_bodies(&data.fields),
        Data::Enum(data) => enum_bodies(data)?,
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "BinaryCodec cannot be derived for unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                #encode_body
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            fn decode(
                input: &mut &[u8],
            ) -> ::std::result::Result<Self, crate::types::encoding::DecodeError> {
                #decode_body
            }
        }
    })
}

/// Binding pattern, binding names and decode constructor for a field list.
struct FieldShape {
    pattern: TokenStream2,
    bindings: Vec<syn::Ident>,
    constructor: TokenStream2,
}

fn field_shape(fields: &Fields) -> FieldShape {
    let bindings: Vec<syn::Ident> = (0..fields.len())
        .map(|i| format_ident!("__field{}", i))
        .collect();
    let decodes: Vec<TokenStream2> = bindings
        .iter()
        .map(|_| quote! { crate::types::encoding::Decode::decode(input)? })
        .collect();

    match fields {
        Fields::Named(named) => {
            let idents: Vec<_> = named.named.iter().map(|f| &f.ident).collect();
            FieldShape {
                pattern: quote! { { #(#idents: #bindings),* } },
                constructor: quote! { { #(#idents: #decodes),* } },
                bindings,
            }
        }
        Fields::Unnamed(_) => FieldShape {
            pattern: quote! { ( #(#bindings),* ) },
            constructor: quote! { ( #(#decodes),* ) },
            bindings,
        },
        Fields::Unit => FieldShape {
            pattern: TokenStream2::new(),
            constructor: TokenStream2::new(),
            bindings,
        },
    }
}

fn encode_bindings(bindings: &[syn::Ident]) -> TokenStream2 {
    quote! {
        #(crate::types::encoding::Encode::encode(#bindings, out);)*
    }
}

fn struct_bodies(fields: &Fields) -> (TokenStream2, TokenStream2) {
    let FieldShape {
        pattern,
        bindings,
        constructor,
    } = field_shape(fields);
    let writes = encode_bindings(&bindings);

    let encode = quote! {
        let _ = &out;
        let Self #pattern = self;
        #writes
    };
    let decode = quote! {
        let _ = &input;
        Ok(Self #constructor)
    };
    (encode, decode)
}

fn enum_bodies(data: &DataEnum) -> syn::Result<(TokenStream2, TokenStream2)> {
    let tags = variant_tags(data)?;

    let mut encode_arms = Vec::with_capacity(data.variants.len());
    let mut decode_arms = Vec::with_capacity(data.variants.len());

    for (variant, tag) in data.variants.iter().zip(tags) {
        let ident = &variant.ident;
        let FieldShape {
            pattern,
            bindings,
            constructor,
        } = field_shape(&variant.fields);
        let writes = encode_bindings(&bindings);

        encode_arms.push(quote! {
            Self::#ident #pattern => {
                crate::types::encoding::Encode::encode(&#tag, out);
                #writes
            }
        });
        decode_arms.push(quote! {
            #tag => Ok(Self::#ident #constructor),
        });
    }

    let encode = quote! {
        match self {
            #(#encode_arms)*
        }
    };
    let decode = quote! {
        let tag: u8 = crate::types::encoding::Decode::decode(input)?;
        match tag {
            #(#decode_arms)*
            _ => Err(crate::types::encoding::DecodeError::UnknownTag(tag)),
        }
    };
    Ok((encode, decode))
}

/// Resolves the `u8` tag of every variant, honouring explicit discriminants.
fn variant_tags(data: &DataEnum) -> syn::Result<Vec<u8>> {
    let mut tags = Vec::with_capacity(data.variants.len());
    let mut next: Option<u8> = Some(0);

    for variant in &data.variants {
        let tag = match &variant.discriminant {
            Some((_, expr)) => literal_tag(expr)?,
            None => next.ok_or_else(|| {
                syn::Error::new_spanned(variant, "BinaryCodec supports at most 256 variants")
            })?,
        };
        tags.push(tag);
        next = tag.checked_add(1);
    }

    Ok(tags)
}

fn literal_tag(expr: &Expr) -> syn::Result<u8> {
    if let Expr::Lit(expr_lit) = expr
        && let Lit::Int(int) = &expr_lit.lit
    {
        return int.base10_parse::<u8>();
    }
    Err(syn::Error::new_spanned(
        expr,
        "BinaryCodec discriminants must be integer literals that fit in a u8",
    ))
}
