//! Reflection for managed types
//!
//! Provides descriptors built once per type, name-based type resolution,
//! and the internal calls modules publish for reflected bodies.

mod descriptor;
mod internal;
mod registry;

pub use descriptor::{
    ConstructorFn, ConstructorInfo, MethodFn, MethodInfo, Reflect, TypeBuilder, TypeDescriptor,
};
pub(crate) use descriptor::format_signature;
pub use internal::{internal_call, lookup as lookup_internal_call, qualified_name, uploaded_count, InternalCall};
pub use registry::{
    ContextSummary, ModuleLoadStatus, ModuleSummary, TypeModule, TypeRegistry, TypeResolver,
    DEFAULT_CONTEXT,
};
