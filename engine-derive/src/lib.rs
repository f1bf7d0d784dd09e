//! `#[derive(Engine)]`: implements `aw_engine::Engine` for a struct that holds
//! its `EngineSpec` in a field (`spec` unless `#[engine(spec = "...")]`).

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::Data;
use syn::DeriveInput;
use syn::Fields;
use syn::Ident;
use syn::LitStr;
use syn::parse_macro_input;
use syn::spanned::Spanned;

#[proc_macro_derive(Engine, attributes(engine))]
pub fn derive_engine(item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);

    let spec_field = match spec_field(&input) {
        Ok(field) => field,
        Err(err) => return err.into_compile_error().into(),
    };

    let ident = &input.ident;
    let (impl_generics, type_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::aw_engine::Engine for #ident #type_generics #where_clause {
            fn spec(&self) -> &::aw_engine::EngineSpec {
                &self.#spec_field
            }
        }
    };

    expanded.into()
}

fn spec_field(input: &DeriveInput) -> syn::Result<Ident> {
    let mut name = Ident::new("spec", Span::call_site());

    for attr in &input.attrs {
        if !attr.path().is_ident("engine") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("spec") {
                let lit: LitStr = meta.value()?.parse()?;
                name = Ident::new(&lit.value(), lit.span());
                Ok(())
            } else {
                Err(meta.error("expected `spec = \"field\"` in #[engine(...)]"))
            }
        })?;
    }

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(
            input.span(),
            "#[derive(Engine)] can only be used with structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new(
            data.fields.span(),
            "#[derive(Engine)] needs a struct with named fields",
        ));
    };

    if fields
        .named
        .iter()
        .filter_map(|field| field.ident.as_ref())
        .any(|field| field == &name)
    {
        Ok(name)
    } else {
        Err(syn::Error::new(
            name.span(),
            format!("no field `{name}` holding the engine spec"),
        ))
    }
}
