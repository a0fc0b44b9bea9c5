//! Derive macros for ufacade
//!
//! `#[derive(Facade)]` turns a unit struct into an accessor for one binding key.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, LitStr, Type};

/// Generates the `Facade` trait implementation for a type
///
/// ```ignore
/// #[derive(Facade)]
/// #[facade(key = "understand.field-provider", target = dyn Forward)]
/// pub struct UnderstandFieldProvider;
/// ```
#[proc_macro_derive(Facade, attributes(facade))]
pub fn derive_facade(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut key: Option<LitStr> = None;
    let mut target: Option<Type> = None;

    // Parse #[facade(key = "...", target = ...)]
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("facade")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("key") {
                key = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("target") {
                target = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("expected `key` or `target`"))
            }
        })?;
    }

    let key = key.ok_or_else(|| {
        syn::Error::new_spanned(name, "missing #[facade(key = \"...\")] attribute")
    })?;
    if key.value().is_empty() {
        return Err(syn::Error::new_spanned(&key, "facade key must not be empty"));
    }
    let target = target.ok_or_else(|| {
        syn::Error::new_spanned(name, "missing #[facade(target = ...)] attribute")
    })?;

    Ok(quote! {
        impl #impl_generics ::ufacade::Facade for #name #ty_generics #where_clause {
            type Target = #target;

            fn accessor_key() -> &'static str {
                #key
            }
        }
    })
}
