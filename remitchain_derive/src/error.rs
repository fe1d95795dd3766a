//! `#[derive(Error)]` for error enums and structs.
//!
//! ```ignore
//! #[derive(Debug, remitchain_derive::Error)]
//! pub enum BlockError {
//!     #[error("merkle root mismatch")]
//!     MerkleRootMismatch,
//!     #[error("nonce mismatch: expected {expected}, got {actual}")]
//!     NonceMismatch { expected: u64, actual: u64 },
//!     #[error("transaction {position} rejected: {source}")]
//!     Transaction { position: usize, source: TransactionError },
//!     #[error("malformed block encoding: {0}")]
//!     Encoding(#[from] DecodeError),
//! }
//! ```
//!
//! Rules:
//! - every variant (or the struct itself) carries `#[error("...")]`
//! - `{0}`, `{1}` refer to tuple fields, `{name}` to named fields; format
//!   specs such as `{actual:?}` work too
//! - a field marked `#[source]`, marked `#[from]`, or named `source` is
//!   returned from `Error::source`
//! - `#[from]` on the only field of a variant also generates `From<FieldType>`

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, format_ident, quote};
use syn::{Data, DeriveInput, Fields, Lit, Meta, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut display_arms = Vec::new();
    let mut source_arms = Vec::new();
    let mut from_impls = Vec::new();
    let variant_count;

    match &input.data {
        Data::Enum(data) => {
            variant_count = data.variants.len();
            for variant in &data.variants {
                let message = error_message(&variant.attrs, variant)?;
                let ident = &variant.ident;
                let path = quote! { Self::#ident };
                let fields = ErrorFields::new(&variant.fields, &message)?;

                display_arms.push(fields.display_arm(&path));
                source_arms.extend(fields.source_arm(&path));
                if let Some((ty, construct)) = fields.from_conversion(&path) {
                    from_impls.push(quote! {
                        impl #impl_generics ::std::convert::From<#ty> for #name #ty_generics #where_clause {
                            fn from(value: #ty) -> Self {
                                #construct
                            }
                        }
                    });
                }
            }
        }
        Data::Struct(data) => {
            variant_count = 1;
            let message = error_message(&input.attrs, &input.ident)?;
            let path = quote! { Self };
            let fields = ErrorFields::new(&data.fields, &message)?;
            display_arms.push(fields.display_arm(&path));
            source_arms.extend(fields.source_arm(&path));
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Error cannot be derived for unions",
            ));
        }
    }

    let source_fn = if source_arms.is_empty() {
        TokenStream2::new()
    } else {
        let fallback = if source_arms.len() < variant_count {
            quote! { _ => None, }
        } else {
            TokenStream2::new()
        };
        quote! {
            fn source(&self) -> Option<&(dyn ::std::error::Error + 'static)> {
                match self {
                    #(#source_arms)*
                    #fallback
                }
            }
        }
    };

    let display_body = if display_arms.is_empty() {
        quote! { match *self {} }
    } else {
        quote! {
            match self {
                #(#display_arms)*
            }
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #display_body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {
            #source_fn
        }

        #(#from_impls)*
    })
}

struct ErrorField {
    /// Field name for named fields, `None` for tuple fields.
    ident: Option<syn::Ident>,
    binding: syn::Ident,
    ty: syn::Type,
    in_message: bool,
    is_source: bool,
    is_from: bool,
}

struct ErrorFields {
    tuple: bool,
    unit: bool,
    fields: Vec<ErrorField>,
    message: String,
}

impl ErrorFields {
    fn new(fields: &Fields, message: &str) -> syn::Result<Self> {
        let tuple = matches!(fields, Fields::Unnamed(_));
        let unit = matches!(fields, Fields::Unit);
        let message = if tuple {
            positional_to_named(message, fields.len())
        } else {
            message.to_string()
        };

        let mut out = Vec::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            let binding = match &field.ident {
                Some(ident) => format_ident!("__{}", ident),
                None => format_ident!("f{}", i),
            };
            let placeholder = match &field.ident {
                Some(ident) => ident.to_string(),
                None => binding.to_string(),
            };
            let is_from = field.attrs.iter().any(|a| a.path().is_ident("from"));
            let is_source = is_from
                || field.attrs.iter().any(|a| a.path().is_ident("source"))
                || field.ident.as_ref().is_some_and(|ident| ident == "source");

            out.push(ErrorField {
                ident: field.ident.clone(),
                binding,
                ty: field.ty.clone(),
                in_message: mentions(&message, &placeholder),
                is_source,
                is_from,
            });
        }

        if out.iter().any(|f| f.is_from) && out.len() != 1 {
            return Err(syn::Error::new_spanned(
                fields,
                "#[from] is only supported on variants with exactly one field",
            ));
        }

        Ok(Self {
            tuple,
            unit,
            fields: out,
            message,
        })
    }

    fn display_arm(&self, path: &TokenStream2) -> TokenStream2 {
        let message = &self.message;
        let used: Vec<&ErrorField> = self.fields.iter().filter(|f| f.in_message).collect();

        let pattern = self.pattern(|f| f.in_message);
        let args = used.iter().map(|f| {
            let binding = &f.binding;
            let name = match &f.ident {
                Some(ident) => ident.clone(),
                None => binding.clone(),
            };
            quote! { #name = #binding }
        });

        quote! {
            #path #pattern => write!(f, #message #(, #args)*),
        }
    }

    fn source_arm(&self, path: &TokenStream2) -> Option<TokenStream2> {
        let source = self.fields.iter().find(|f| f.is_source)?;
        let binding = &source.binding;
        let pattern = self.pattern(|f| f.is_source);
        Some(quote! {
            #path #pattern => Some(#binding as &(dyn ::std::error::Error + 'static)),
        })
    }

    fn from_conversion(&self, path: &TokenStream2) -> Option<(syn::Type, TokenStream2)> {
        let field = self.fields.iter().find(|f| f.is_from)?;
        let construct = match &field.ident {
            Some(ident) => quote! { #path { #ident: value } },
            None => quote! { #path(value) },
        };
        Some((field.ty.clone(), construct))
    }

    /// Builds a match pattern binding only the fields selected by `keep`.
    fn pattern(&self, keep: impl Fn(&ErrorField) -> bool) -> TokenStream2 {
        if self.unit {
            return TokenStream2::new();
        }
        if self.tuple {
            let parts = self.fields.iter().map(|f| {
                if keep(f) {
                    f.binding.to_token_stream()
                } else {
                    quote! { _ }
                }
            });
            return quote! { ( #(#parts),* ) };
        }
        let parts = self.fields.iter().filter(|f| keep(f)).map(|f| {
            let ident = &f.ident;
            let binding = &f.binding;
            quote! { #ident: #binding }
        });
        quote! { { #(#parts,)* .. } }
    }
}

fn mentions(message: &str, placeholder: &str) -> bool {
    message.contains(&format!("{{{placeholder}}}")) || message.contains(&format!("{{{placeholder}:"))
}

/// Rewrites `{0}` / `{0:?}` into `{f0}` / `{f0:?}` so tuple fields can be
/// passed as named format arguments.
fn positional_to_named(message: &str, field_count: usize) -> String {
    let mut result = message.to_string();
    for i in (0..field_count).rev() {
        result = result
            .replace(&format!("{{{i}}}"), &format!("{{f{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{f{i}:"));
    }
    result
}

fn error_message<T: ToTokens>(attrs: &[syn::Attribute], target: &T) -> syn::Result<String> {
    let attr = attrs
        .iter()
        .find(|a| a.path().is_ident("error"))
        .ok_or_else(|| {
            syn::Error::new_spanned(target, "missing #[error(\"...\")] display message")
        })?;

    let Meta::List(list) = &attr.meta else {
        return Err(syn::Error::new_spanned(
            &attr.meta,
            "expected #[error(\"message\")]",
        ));
    };

    match syn::parse2::<Lit>(list.tokens.clone()) {
        Ok(Lit::Str(lit)) => Ok(lit.value()),
        _ => Err(syn::Error::new_spanned(
            &attr.meta,
            "#[error] takes a single string literal",
        )),
    }
}
