//! Proc macros for `versioned-entity`.
//!
//! Provides two macros:
//!
//! - **`#[versioned_shape]`** — Attribute macro that implements `Shape` for a
//!   serde struct, tagging it with its version number.
//!
//! - **`#[upgrade]`** — Attribute macro that turns a typed upgrade function
//!   into a `(version, VersionDef)` pair ready to register on an entity.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, punctuated::Punctuated, token::Comma, ItemFn, ItemStruct, Meta};

/// Read `key = <integer>` pairs from an attribute argument list.
///
/// Every key must appear in `allowed`. Returns the values in the order of
/// `allowed`, `None` for keys that were not given.
fn int_args(
    args: &Punctuated<Meta, Comma>,
    allowed: &[&str],
) -> Result<Vec<Option<u32>>, syn::Error> {
    let mut values = vec![None; allowed.len()];

    for meta in args {
        let nv = match meta {
            Meta::NameValue(nv) => nv,
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "expected `key = value` attribute argument",
                ))
            }
        };
        let key = nv
            .path
            .get_ident()
            .map(|i| i.to_string())
            .unwrap_or_default();
        let slot = match allowed.iter().position(|a| *a == key) {
            Some(slot) => slot,
            None => {
                return Err(syn::Error::new_spanned(
                    &nv.path,
                    format!("unknown attribute `{key}`"),
                ))
            }
        };
        match &nv.value {
            syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Int(lit),
                ..
            }) => values[slot] = Some(lit.base10_parse()?),
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    format!("`{key}` must be an integer literal"),
                ))
            }
        }
    }

    Ok(values)
}

fn missing(name: &str) -> TokenStream {
    syn::Error::new(
        proc_macro2::Span::call_site(),
        format!("missing required attribute `{name}`"),
    )
    .to_compile_error()
    .into()
}

/// Attribute macro that marks a serde struct as the shape of one version.
///
/// # Attributes
///
/// - `version = N` — **Required.** The version number.
///
/// # Generated Implementations
///
/// - `versioned_entity::Shape` with `VERSION = N`
///
/// # Example
///
/// ```ignore
/// use versioned_entity::versioned_shape;
/// use serde::{Serialize, Deserialize};
///
/// #[versioned_shape(version = 1)]
/// #[derive(Debug, Serialize, Deserialize)]
/// struct EnvironmentV1 {
///     name: String,
///     variables: Vec<VariableV1>,
/// }
/// ```
#[proc_macro_attribute]
pub fn versioned_shape(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemStruct);
    let args = parse_macro_input!(attr with Punctuated::<Meta, Comma>::parse_terminated);

    let version = match int_args(&args, &["version"]) {
        Ok(values) => values[0],
        Err(e) => return e.to_compile_error().into(),
    };
    let version = match version {
        Some(v) => v,
        None => return missing("version"),
    };

    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        #input

        impl #impl_generics versioned_entity::Shape for #struct_name #ty_generics #where_clause {
            const VERSION: u32 = #version;
        }
    };

    expanded.into()
}

/// Attribute macro that wraps a typed upgrade function into a version definition.
///
/// The function must take a single argument (the previous version's data) and
/// return the next version's data. Both types must implement `Serialize` and
/// `DeserializeOwned`. The returned type's serde shape becomes the schema of
/// the target version.
///
/// # Attributes
///
/// - `from = N` — **Required.** Source version.
/// - `to = N + 1` — **Required.** Target version. Must directly follow `from`.
///
/// # Generated Code
///
/// Keeps the function as written and adds `{fn_name}_version()`, returning
/// `(to, VersionDef)` for `EntityBuilder::entry`.
///
/// # Example
///
/// ```ignore
/// use versioned_entity::upgrade;
///
/// #[upgrade(from = 1, to = 2)]
/// fn mask_variables(old: EnvironmentV1) -> EnvironmentV2 {
///     EnvironmentV2 {
///         name: old.name,
///         variables: old.variables.into_iter().map(VariableV2::from).collect(),
///     }
/// }
/// // Generates: fn mask_variables_version() -> (u32, versioned_entity::VersionDef)
/// ```
#[proc_macro_attribute]
pub fn upgrade(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    let args = parse_macro_input!(attr with Punctuated::<Meta, Comma>::parse_terminated);

    let (from_version, to_version) = match int_args(&args, &["from", "to"]) {
        Ok(values) => (values[0], values[1]),
        Err(e) => return e.to_compile_error().into(),
    };
    let from_ver = match from_version {
        Some(v) => v,
        None => return missing("from"),
    };
    let to_ver = match to_version {
        Some(v) => v,
        None => return missing("to"),
    };

    if from_ver.checked_add(1) != Some(to_ver) {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            format!("upgrade must go to the next version: expected `to = {}`", from_ver as u64 + 1),
        )
        .to_compile_error()
        .into();
    }

    let fn_name = &input.sig.ident;

    if input.sig.inputs.len() != 1 {
        return syn::Error::new_spanned(
            &input.sig,
            "upgrade function must take exactly one argument",
        )
        .to_compile_error()
        .into();
    }

    // Extract the input type from the function signature
    let input_type = match input.sig.inputs.first() {
        Some(syn::FnArg::Typed(pat_type)) => &pat_type.ty,
        _ => {
            return syn::Error::new_spanned(
                &input.sig,
                "upgrade function must take exactly one argument",
            )
            .to_compile_error()
            .into();
        }
    };

    // Extract the output type
    let output_type = match &input.sig.output {
        syn::ReturnType::Type(_, ty) => ty,
        syn::ReturnType::Default => {
            return syn::Error::new_spanned(&input.sig, "upgrade function must have a return type")
                .to_compile_error()
                .into();
        }
    };

    let vis = &input.vis;
    let version_fn = syn::Ident::new(&format!("{fn_name}_version"), fn_name.span());

    let expanded = quote! {
        #input

        /// Version definition produced by this upgrade, keyed by its target version.
        #vis fn #version_fn() -> (u32, versioned_entity::VersionDef) {
            (
                #to_ver,
                versioned_entity::VersionDef::typed_upgrade::<#input_type, #output_type, _>(#fn_name),
            )
        }
    };

    expanded.into()
}
