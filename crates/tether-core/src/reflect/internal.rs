//! Internal calls
//!
//! Native function pointers a host hands to managed code. Each one is
//! declared on a [`TypeModule`](super::TypeModule) under its class and
//! member name, and becomes visible to reflected bodies once the module
//! uploads them. Lookups use the qualified name `Class+Member, Module`.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::value::NativePtr;

static UPLOADED: Lazy<RwLock<FxHashMap<String, NativePtr>>> = Lazy::new(Default::default);

/// Qualified name an internal call is published under
pub fn qualified_name(class_name: &str, member: &str, module: &str) -> String {
    format!("{}+{}, {}", class_name, member, module)
}

/// One native function declared for managed code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalCall {
    name: String,
    function: NativePtr,
}

impl InternalCall {
    pub(crate) fn new(name: String, function: NativePtr) -> Self {
        Self { name, function }
    }

    /// Qualified name (`Class+Member, Module`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Native entry point
    pub fn function(&self) -> NativePtr {
        self.function
    }
}

/// Publish `calls`, replacing earlier uploads of the same names.
pub(crate) fn upload(calls: &[InternalCall]) -> usize {
    let mut table = UPLOADED.write();
    for call in calls {
        if table.insert(call.name.clone(), call.function).is_some() {
            log::debug!("[tether] Internal call '{}' replaced", call.name);
        }
    }
    calls.len()
}

/// Look up an uploaded internal call by qualified name
pub fn lookup(qualified: &str) -> Option<NativePtr> {
    UPLOADED.read().get(qualified).copied()
}

/// Look up an uploaded internal call by its parts.
///
/// Reflected bodies call this to reach native code, then cast the pointer
/// to the function type the host registered.
pub fn internal_call(class_name: &str, member: &str, module: &str) -> Option<NativePtr> {
    lookup(&qualified_name(class_name, member, module))
}

/// Number of uploaded internal calls
pub fn uploaded_count() -> usize {
    UPLOADED.read().len()
}
