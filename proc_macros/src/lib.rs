use proc_macro2::TokenStream;
use quote::quote;
use syn::parse_macro_input;

/// Marks a struct whose missing trait methods are forwarded to its `dyn Trait`
/// field by the `auto-decorator` generator. The struct itself is left as is.
#[proc_macro_attribute]
pub fn decorator(
    args: proc_macro::TokenStream,
    input: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let args = TokenStream::from(args);
    let item = parse_macro_input!(input as syn::Item);

    decorator_impl(args, item).into()
}

fn decorator_impl(args: TokenStream, item: syn::Item) -> TokenStream {
    if !args.is_empty() {
        let error = syn::Error::new_spanned(args, "#[decorator] takes no arguments");
        return TokenStream::from_iter([error.into_compile_error(), quote!(#item)]);
    }

    match item {
        syn::Item::Struct(_) => quote!(#item),
        other => {
            let error =
                syn::Error::new_spanned(&other, "#[decorator] can only be applied to structs");
            TokenStream::from_iter([error.into_compile_error(), quote!(#other)])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn structs_pass_through_unchanged() {
        let item: syn::Item = parse_quote! {
            pub struct MaskLogger { original: Box<dyn Logger> }
        };
        let expanded = decorator_impl(TokenStream::new(), item.clone());
        assert_eq!(expanded.to_string(), quote!(#item).to_string());
    }

    #[test]
    fn other_items_are_rejected() {
        let item: syn::Item = parse_quote! {
            pub trait Logger { fn error(&self, message: &str); }
        };
        let expanded = decorator_impl(TokenStream::new(), item).to_string();
        assert!(expanded.contains("compile_error"));
        assert!(expanded.contains("can only be applied to structs"));
    }

    #[test]
    fn arguments_are_rejected() {
        let item: syn::Item = parse_quote!(struct Plain;);
        let expanded = decorator_impl(quote!(verbose), item).to_string();
        assert!(expanded.contains("takes no arguments"));
    }
}
