// tether-native: expose Rust types to the Tether bridge
//
// Provides the #[reflect] attribute, which turns an inherent impl block
// into a reflected managed type: constructors, methods in declaration
// order, and their declared parameter kinds.
//
// Example:
// ```
// use tether_native::reflect;
//
// #[derive(Default)]
// pub struct Counter {
//     count: i64,
// }
//
// #[reflect(name = "Demo.Counter")]
// impl Counter {
//     #[constructor]
//     pub fn new() -> Self {
//         Self::default()
//     }
//
//     pub fn increment(&mut self) {
//         self.count += 1;
//     }
// }
// ```

use proc_macro::TokenStream;
use syn::{parse_macro_input, ItemImpl};

mod reflect;

/// Generates a `tether_core::reflect::Reflect` impl from an impl block.
///
/// - `#[constructor]` marks an associated function returning `Self` or
///   `Result<Self, Fault>` as a constructor.
/// - Every `pub` method taking `&self` or `&mut self` is exported, in
///   declaration order. Its managed name is the PascalCase form of the Rust
///   name unless `#[rename("Name")]` says otherwise.
/// - Parameter types must implement `ManagedType`; return types must
///   implement `IntoReturn`.
///
/// The managed type name defaults to the Rust type name; set it with
/// `#[reflect(name = "Namespace.Type")]`.
///
/// # Example
///
/// ```ignore
/// #[reflect(name = "Demo.Counter")]
/// impl Counter {
///     #[constructor]
///     pub fn starting_at(start: i64) -> Self {
///         Counter { count: start }
///     }
///
///     #[rename("Get")]
///     pub fn value(&self) -> i64 {
///         self.count
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn reflect(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = reflect::ReflectArgs::default();
    let parser = syn::meta::parser(|meta| args.parse(meta));
    parse_macro_input!(attr with parser);

    let input = parse_macro_input!(item as ItemImpl);
    reflect::expand_reflect(args, input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
