use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{Ident, ItemFn};

/// Proc macro to denote a Scenario
///
/// The annotated function is the iteration body: it takes no arguments, returns nothing, and
/// is run in a loop by every VU. The macro replaces it with a function of the same name that
/// returns a [`Scenario`](../surge/scenario/struct.Scenario.html), which is configured with
/// `.options(...)` and then awaited.
///
/// # Example
/// ```ignore
/// use surge::prelude::*;
///
/// #[scenario]
/// async fn my_scenario() {
///     let res = http::get("http://localhost:8000/").await;
///     check(&res, &[("is ok", &|r: &Response| r.status() == 200)]);
/// }
/// ```
#[proc_macro_attribute]
pub fn scenario(attr: TokenStream, item: TokenStream) -> TokenStream {
    match scenario_internal(attr, item) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn scenario_internal(_attr: TokenStream, item: TokenStream) -> syn::Result<TokenStream2> {
    let input = syn::parse::<ItemFn>(item)?;

    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = input;

    if sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            sig.fn_token,
            "#[scenario] must be applied to an `async fn`",
        ));
    }
    if !sig.inputs.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.inputs,
            "#[scenario] functions take no arguments",
        ));
    }

    let stmts = &block.stmts;

    let new_name = Ident::new(&format!("__surge_{}", sig.ident), Span::call_site());
    let mut new_sig = sig.clone();
    new_sig.ident = new_name.clone();

    let mut scen_sig = sig.clone();
    let scen_name = sig.ident.clone();
    scen_sig.asyncness = None;
    scen_sig.output = syn::parse2(quote! {
        -> impl ::surge::scenario::ConfigurableScenario<::surge::scenario::RunResult>
    })?;

    Ok(quote! {
        #(#attrs)* #vis #scen_sig {
            ::surge::scenario::Scenario::new(stringify!(#scen_name), #new_name)
        }

        #[doc(hidden)]
        #(#attrs)* #vis #new_sig {
            #(#stmts)*
        }
    })
}
