use proc_macro::TokenStream;
use quote::quote;
use syn::parse::Parser;
use syn::{DeriveInput, Expr, Lit, Meta};

struct KindedVariant {
    ident: syn::Ident,
    kind: proc_macro2::TokenStream,
    summary: Option<String>,
    fields: syn::Fields,
}

pub(crate) fn error_kind_derive_impl(input: DeriveInput) -> TokenStream {
    let name = &input.ident;

    let data_enum = match input.data {
        syn::Data::Enum(data_enum) => data_enum,
        _ => {
            return syn::Error::new_spanned(name, "ErrorKind can only be derived for enums")
                .to_compile_error()
                .into();
        }
    };

    let mut variants = Vec::new();
    for variant in data_enum.variants {
        let mut kind = None;
        let mut summary = None;

        for attr in &variant.attrs {
            if !attr.path().is_ident("error_kind") {
                continue;
            }
            if let Meta::List(meta_list) = &attr.meta {
                let parsed = syn::punctuated::Punctuated::<Expr, syn::Token![,]>::parse_terminated
                    .parse2(meta_list.tokens.clone());

                if let Ok(args) = parsed {
                    for (i, expr) in args.into_iter().enumerate() {
                        match expr {
                            Expr::Path(path) if i == 0 => {
                                let path = &path.path;
                                kind = Some(quote! { ::backoffice::ErrorKind::#path });
                            }
                            Expr::Lit(lit) if i == 1 => {
                                if let Lit::Str(str_lit) = &lit.lit {
                                    summary = Some(str_lit.value());
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        match kind {
            Some(kind) => variants.push(KindedVariant {
                ident: variant.ident,
                kind,
                summary,
                fields: variant.fields,
            }),
            None => {
                return syn::Error::new_spanned(
                    &variant.ident,
                    "every variant needs an #[error_kind(..)] attribute",
                )
                .to_compile_error()
                .into();
            }
        }
    }

    let kind_arms = variants.iter().map(|v| {
        let ident = &v.ident;
        let kind = &v.kind;
        match &v.fields {
            syn::Fields::Unit => quote! { Self::#ident => #kind, },
            syn::Fields::Unnamed(_) => quote! { Self::#ident(..) => #kind, },
            syn::Fields::Named(_) => quote! { Self::#ident { .. } => #kind, },
        }
    });

    let summary_arms = variants.iter().map(|v| {
        let ident = &v.ident;
        match &v.fields {
            syn::Fields::Unit => {
                let summary_expr = match &v.summary {
                    Some(msg) => quote! { #msg.to_string() },
                    None => quote! { self.to_string() },
                };
                quote! { Self::#ident => #summary_expr, }
            }
            syn::Fields::Unnamed(fields) => {
                let field_names: Vec<syn::Ident> = (0..fields.unnamed.len())
                    .map(|i| {
                        syn::Ident::new(&format!("__self_{}", i), proc_macro2::Span::call_site())
                    })
                    .collect();

                let summary_expr = match &v.summary {
                    Some(msg) => {
                        let msg = prefix_numbers_in_braces(msg);
                        quote! { format!(#msg) }
                    }
                    None => quote! { self.to_string() },
                };

                quote! {
                    #[allow(unused_variables)]
                    Self::#ident(#(#field_names),*) => #summary_expr,
                }
            }
            syn::Fields::Named(fields) => {
                let field_names: Vec<&syn::Ident> =
                    fields.named.iter().filter_map(|f| f.ident.as_ref()).collect();

                let summary_expr = match &v.summary {
                    Some(msg) => quote! { format!(#msg) },
                    None => quote! { self.to_string() },
                };

                quote! {
                    #[allow(unused_variables)]
                    Self::#ident { #(#field_names),* } => #summary_expr,
                }
            }
        }
    });

    let expanded = quote! {
        impl #name {
            pub fn kind(&self) -> ::backoffice::ErrorKind {
                match self {
                    #(#kind_arms)*
                }
            }

            pub fn summary(&self) -> String {
                match self {
                    #(#summary_arms)*
                }
            }
        }
    };

    TokenStream::from(expanded)
}

/// Rewrites `{0}` style placeholders to the `__self_0` bindings used in tuple arms.
fn prefix_numbers_in_braces(input: &str) -> String {
    let mut result = String::new();
    let mut inside_braces = false;

    for c in input.chars() {
        if c == '{' {
            inside_braces = true;
            result.push(c);
        } else if c == '}' {
            inside_braces = false;
            result.push(c);
        } else if inside_braces && c.is_ascii_digit() {
            result.push_str("__self_");
            result.push(c);
        } else {
            result.push(c);
        }
    }

    result
}
