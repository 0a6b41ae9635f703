// #[reflect] proc-macro implementation
//
// Generates a Reflect impl that registers constructors and methods with
// tether_core's TypeBuilder.

use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use syn::meta::ParseNestedMeta;
use syn::{Attribute, FnArg, ImplItem, ImplItemFn, ItemImpl, LitStr, Pat, Result, ReturnType, Type};

/// Arguments of `#[reflect(...)]`
#[derive(Default)]
pub struct ReflectArgs {
    name: Option<LitStr>,
}

impl ReflectArgs {
    pub fn parse(&mut self, meta: ParseNestedMeta<'_>) -> Result<()> {
        if meta.path.is_ident("name") {
            self.name = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("unsupported reflect property, expected `name`"))
        }
    }
}

enum Receiver {
    Shared,
    Mutable,
}

struct Member {
    managed_name: String,
    ident: syn::Ident,
    params: Vec<Type>,
    kind: MemberKind,
}

enum MemberKind {
    Constructor { fallible: bool },
    Method(Receiver),
}

/// Expands the #[reflect] attribute macro.
///
/// Input: inherent impl block
/// Output: the impl block (marker attributes removed) + `impl Reflect`
pub fn expand_reflect(args: ReflectArgs, mut item: ItemImpl) -> Result<TokenStream> {
    if let Some((_, path, _)) = &item.trait_ {
        return Err(syn::Error::new_spanned(
            path,
            "#[reflect] must be applied to an inherent impl block",
        ));
    }
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &item.generics,
            "Generic types cannot be reflected",
        ));
    }

    let self_ty = item.self_ty.clone();
    let type_name = match args.name {
        Some(name) => name,
        None => LitStr::new(&type_ident(&self_ty)?, Span::call_site()),
    };

    let mut members = Vec::new();
    for impl_item in &mut item.items {
        if let ImplItem::Fn(func) = impl_item {
            if let Some(member) = collect_member(func)? {
                members.push(member);
            }
        }
    }

    let registrations = members.iter().map(generate_registration);

    Ok(quote! {
        #item

        impl ::tether_core::reflect::Reflect for #self_ty {
            fn describe() -> ::tether_core::reflect::TypeDescriptor {
                ::tether_core::reflect::TypeBuilder::<Self>::new(#type_name)
                    #(#registrations)*
                    .build()
            }
        }
    })
}

fn type_ident(ty: &Type) -> Result<String> {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|seg| seg.ident.to_string())
            .ok_or_else(|| syn::Error::new_spanned(ty, "Expected a type name")),
        _ => Err(syn::Error::new_spanned(
            ty,
            "Only named types can be reflected",
        )),
    }
}

/// Inspect one associated function, stripping our marker attributes
fn collect_member(func: &mut ImplItemFn) -> Result<Option<Member>> {
    let is_constructor = take_flag(&mut func.attrs, "constructor");
    let rename = take_rename(&mut func.attrs)?;
    let sig = &func.sig;

    if sig.asyncness.is_some() {
        if is_constructor {
            return Err(syn::Error::new_spanned(sig, "Async constructors are not supported"));
        }
        return Ok(None);
    }

    let mut receiver = None;
    let mut params = Vec::new();
    for input in &sig.inputs {
        match input {
            FnArg::Receiver(recv) => {
                if recv.reference.is_none() {
                    if is_constructor {
                        return Err(syn::Error::new_spanned(recv, "Constructors cannot take self"));
                    }
                    if matches!(func.vis, syn::Visibility::Public(_)) {
                        return Err(syn::Error::new_spanned(
                            recv,
                            "Reflected methods must take &self or &mut self",
                        ));
                    }
                    return Ok(None);
                }
                receiver = Some(if recv.mutability.is_some() {
                    Receiver::Mutable
                } else {
                    Receiver::Shared
                });
            }
            FnArg::Typed(pat_type) => {
                if !matches!(&*pat_type.pat, Pat::Ident(_) | Pat::Wild(_)) {
                    return Err(syn::Error::new_spanned(
                        &pat_type.pat,
                        "Only simple identifiers are supported as arguments",
                    ));
                }
                params.push((*pat_type.ty).clone());
            }
        }
    }

    let ident = sig.ident.clone();
    if is_constructor {
        if receiver.is_some() {
            return Err(syn::Error::new_spanned(sig, "Constructors cannot take self"));
        }
        if rename.is_some() {
            return Err(syn::Error::new_spanned(sig, "Constructors cannot be renamed"));
        }
        let fallible = match &sig.output {
            ReturnType::Default => {
                return Err(syn::Error::new_spanned(sig, "Constructors must return Self"));
            }
            ReturnType::Type(_, ty) => returns_result(ty),
        };
        return Ok(Some(Member {
            managed_name: String::new(),
            ident,
            params,
            kind: MemberKind::Constructor { fallible },
        }));
    }

    let (Some(receiver), syn::Visibility::Public(_)) = (receiver, &func.vis) else {
        return Ok(None);
    };

    Ok(Some(Member {
        managed_name: rename.unwrap_or_else(|| pascal_case(&ident.to_string())),
        ident,
        params,
        kind: MemberKind::Method(receiver),
    }))
}

fn take_flag(attrs: &mut Vec<Attribute>, name: &str) -> bool {
    let before = attrs.len();
    attrs.retain(|attr| !attr.path().is_ident(name));
    attrs.len() != before
}

fn take_rename(attrs: &mut Vec<Attribute>) -> Result<Option<String>> {
    let Some(pos) = attrs.iter().position(|attr| attr.path().is_ident("rename")) else {
        return Ok(None);
    };
    let attr = attrs.remove(pos);
    let name: LitStr = attr.parse_args()?;
    if name.value().is_empty() {
        return Err(syn::Error::new_spanned(name, "Method name cannot be empty"));
    }
    Ok(Some(name.value()))
}

fn returns_result(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|seg| seg.ident == "Result"),
        _ => false,
    }
}

/// `increment_by` -> `IncrementBy`
pub fn pascal_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn generate_registration(member: &Member) -> TokenStream {
    let ident = &member.ident;
    let tags = member.params.iter().map(|ty| {
        quote! { <#ty as ::tether_core::value::ManagedType>::TAG }
    });

    let arg_names: Vec<_> = (0..member.params.len())
        .map(|i| format_ident!("arg{}", i))
        .collect();
    let args_ident = if member.params.is_empty() {
        format_ident!("_args")
    } else {
        format_ident!("args")
    };
    let extractions = member
        .params
        .iter()
        .zip(&arg_names)
        .enumerate()
        .map(|(i, (ty, name))| {
            quote! {
                let #name = <#ty as ::tether_core::value::ManagedType>::from_managed(&#args_ident[#i])?;
            }
        });

    match &member.kind {
        MemberKind::Constructor { fallible } => {
            let call = quote! { Self::#ident(#(#arg_names),*) };
            let result = if *fallible {
                call
            } else {
                quote! { Ok(#call) }
            };
            quote! {
                .constructor(&[#(#tags),*], |#args_ident: &[::tether_core::value::ManagedValue]| {
                    #(#extractions)*
                    #result
                })
            }
        }
        MemberKind::Method(receiver) => {
            let name = &member.managed_name;
            let this = match receiver {
                Receiver::Shared => quote! { &*this },
                Receiver::Mutable => quote! { this },
            };
            quote! {
                .method(#name, &[#(#tags),*], |this: &mut Self, #args_ident: &[::tether_core::value::ManagedValue]| {
                    #(#extractions)*
                    ::tether_core::value::IntoReturn::into_return(Self::#ident(#this, #(#arg_names),*))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("increment"), "Increment");
        assert_eq!(pascal_case("increment_by"), "IncrementBy");
        assert_eq!(pascal_case("_private_ish"), "PrivateIsh");
        assert_eq!(pascal_case("get2d"), "Get2d");
    }

    #[test]
    fn test_collects_public_methods_in_order() {
        let item: ItemImpl = parse_quote! {
            impl Counter {
                #[constructor]
                pub fn new() -> Self { Counter { count: 0 } }
                pub fn increment(&mut self) { self.count += 1; }
                fn helper(&self) {}
                #[rename("Get")]
                pub fn value(&self) -> i64 { self.count }
                pub fn consume(self) {}
            }
        };
        let err = expand_reflect(ReflectArgs::default(), item).unwrap_err();
        assert!(err.to_string().contains("&self or &mut self"));

        let mut item: ItemImpl = parse_quote! {
            impl Counter {
                #[constructor]
                pub fn new() -> Self { Counter { count: 0 } }
                pub fn increment(&mut self) { self.count += 1; }
                fn helper(&self) {}
                #[rename("Get")]
                pub fn value(&self) -> i64 { self.count }
                pub fn reset() {}
            }
        };
        let mut names = Vec::new();
        for impl_item in &mut item.items {
            if let ImplItem::Fn(func) = impl_item {
                if let Some(member) = collect_member(func).unwrap() {
                    names.push(match member.kind {
                        MemberKind::Constructor { .. } => ".ctor".to_string(),
                        MemberKind::Method(_) => member.managed_name,
                    });
                }
            }
        }
        assert_eq!(names, vec![".ctor", "Increment", "Get"]);

        // Marker attributes are stripped from the emitted impl
        let emitted = quote!(#item).to_string();
        assert!(!emitted.contains("constructor"));
        assert!(!emitted.contains("rename"));
    }

    #[test]
    fn test_fallible_constructor_detected() {
        let mut func: ImplItemFn = parse_quote! {
            #[constructor]
            pub fn open(path: NativePtr) -> Result<Self, Fault> { todo!() }
        };
        let member = collect_member(&mut func).unwrap().unwrap();
        assert!(matches!(member.kind, MemberKind::Constructor { fallible: true }));
        assert_eq!(member.params.len(), 1);
    }

    #[test]
    fn test_rejects_trait_impl() {
        let item: ItemImpl = parse_quote! {
            impl Default for Counter {
                fn default() -> Self { Counter { count: 0 } }
            }
        };
        assert!(expand_reflect(ReflectArgs::default(), item).is_err());
    }

    #[test]
    fn test_expansion_uses_type_builder() {
        let item: ItemImpl = parse_quote! {
            impl Counter {
                #[constructor]
                pub fn new() -> Self { Counter { count: 0 } }
                pub fn add(&mut self, amount: i32) { self.count += amount as i64; }
            }
        };
        let tokens = expand_reflect(ReflectArgs::default(), item).unwrap().to_string();
        assert!(tokens.contains("TypeBuilder"));
        assert!(tokens.contains("\"Counter\""));
        assert!(tokens.contains("\"Add\""));
    }
}
