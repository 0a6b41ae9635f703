//! Type resolution
//!
//! Types are grouped into modules, and modules are loaded into named load
//! contexts. The dispatcher only sees the [`TypeResolver`] contract; the
//! [`TypeRegistry`] is the resolver used by default.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::descriptor::{Reflect, TypeDescriptor};
use super::internal::{self, InternalCall};
use crate::value::NativePtr;

/// Name of the context modules load into unless told otherwise
pub const DEFAULT_CONTEXT: &str = "Default";

/// Resolves type names to descriptors
pub trait TypeResolver: Send + Sync {
    /// Look up a type by its fully-qualified name
    fn find_type(&self, name: &str) -> Option<Arc<TypeDescriptor>>;

    /// Summaries of every load context, for startup diagnostics
    fn contexts(&self) -> Vec<ContextSummary> {
        Vec::new()
    }
}

/// Outcome of loading a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleLoadStatus {
    /// Module loaded and its types indexed
    Success,
    /// Module has no name
    InvalidModule,
    /// A module with the same full name is already in the context
    AlreadyLoaded,
}

impl std::fmt::Display for ModuleLoadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ModuleLoadStatus::Success => "Success",
            ModuleLoadStatus::InvalidModule => "InvalidModule",
            ModuleLoadStatus::AlreadyLoaded => "AlreadyLoaded",
        };
        f.write_str(text)
    }
}

/// Diagnostic view of one loaded module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSummary {
    /// `Name, Version=x.y.z`
    pub full_name: String,
    /// How the load went
    pub status: ModuleLoadStatus,
    /// Type names cached at load time; empty unless the load succeeded
    pub types: Vec<String>,
}

/// Diagnostic view of one load context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSummary {
    /// Context name
    pub name: String,
    /// Modules loaded into it, in load order
    pub modules: Vec<ModuleSummary>,
}

impl ContextSummary {
    /// Full names of the modules, in load order
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.full_name.as_str()).collect()
    }
}

/// A named, versioned group of types (an "assembly")
#[derive(Debug, Clone)]
pub struct TypeModule {
    name: String,
    version: String,
    types: Vec<Arc<TypeDescriptor>>,
    internal_calls: Vec<InternalCall>,
}

impl TypeModule {
    /// Create an empty module
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            types: Vec::new(),
            internal_calls: Vec::new(),
        }
    }

    /// Declare a native function managed code may call as
    /// `class_name.member`. A null pointer is skipped.
    pub fn add_internal_call(
        &mut self,
        class_name: &str,
        member: &str,
        function: NativePtr,
    ) -> &mut Self {
        let name = internal::qualified_name(class_name, member, &self.name);
        if function.is_null() {
            log::warn!("[tether] Internal call '{}' has a null entry point; skipped", name);
            return self;
        }
        self.internal_calls.push(InternalCall::new(name, function));
        self
    }

    /// Builder form of [`TypeModule::add_internal_call`]
    pub fn with_internal_call(mut self, class_name: &str, member: &str, function: NativePtr) -> Self {
        self.add_internal_call(class_name, member, function);
        self
    }

    /// Internal calls declared so far
    pub fn internal_calls(&self) -> &[InternalCall] {
        &self.internal_calls
    }

    /// Publish the declared internal calls so reflected bodies can find
    /// them with [`internal_call`](super::internal_call). Returns how many
    /// were published.
    pub fn upload_internal_calls(&self) -> usize {
        let count = internal::upload(&self.internal_calls);
        log::debug!(
            "[tether] Uploaded {} internal call(s) for '{}'",
            count,
            self.full_name()
        );
        count
    }

    /// Add a hand-built descriptor
    pub fn add_type(&mut self, desc: TypeDescriptor) -> &mut Self {
        self.types.push(Arc::new(desc));
        self
    }

    /// Add a reflected Rust type
    pub fn with_type<T: Reflect>(mut self) -> Self {
        self.types.push(Arc::new(T::describe()));
        self
    }

    /// Module name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// `Name, Version=x.y.z`
    pub fn full_name(&self) -> String {
        format!("{}, Version={}", self.name, self.version)
    }

    /// Types declared by the module
    pub fn types(&self) -> &[Arc<TypeDescriptor>] {
        &self.types
    }
}

struct LoadedModule {
    module: Arc<TypeModule>,
    status: ModuleLoadStatus,
    types: Vec<String>,
}

impl LoadedModule {
    fn summary(&self) -> ModuleSummary {
        ModuleSummary {
            full_name: self.module.full_name(),
            status: self.status,
            types: self.types.clone(),
        }
    }
}

struct LoadContext {
    name: String,
    modules: Vec<LoadedModule>,
}

#[derive(Default)]
struct RegistryInner {
    contexts: Vec<LoadContext>,
    by_name: FxHashMap<String, Arc<TypeDescriptor>>,
}

/// Default [`TypeResolver`]: modules in load contexts, indexed by type name.
///
/// Modules can be loaded at any time, including after the registry has been
/// handed to a bridge.
#[derive(Default)]
pub struct TypeRegistry {
    inner: RwLock<RegistryInner>,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a module into the default context
    pub fn load_module(&self, module: TypeModule) -> ModuleLoadStatus {
        self.load_module_into(DEFAULT_CONTEXT, module)
    }

    /// Load a module into the named context, creating it on first use.
    ///
    /// The module is recorded whatever the outcome; its types are indexed
    /// only on success. When two modules declare the same type name, the
    /// first one loaded keeps it.
    pub fn load_module_into(&self, context: &str, module: TypeModule) -> ModuleLoadStatus {
        let mut inner = self.inner.write();
        let module = Arc::new(module);
        let full_name = module.full_name();

        let already_loaded = inner
            .contexts
            .iter()
            .filter(|c| c.name == context)
            .flat_map(|c| c.modules.iter())
            .any(|m| m.status == ModuleLoadStatus::Success && m.module.full_name() == full_name);

        let status = if module.name().is_empty() {
            ModuleLoadStatus::InvalidModule
        } else if already_loaded {
            ModuleLoadStatus::AlreadyLoaded
        } else {
            ModuleLoadStatus::Success
        };

        let loaded = if status == ModuleLoadStatus::Success {
            Self::index_types(&mut inner, &module);
            LoadedModule {
                types: module.types().iter().map(|d| d.name().to_string()).collect(),
                module,
                status,
            }
        } else {
            log::warn!("[tether] Module '{}' not loaded: {}", full_name, status);
            LoadedModule {
                module,
                status,
                types: Vec::new(),
            }
        };

        match inner.contexts.iter_mut().find(|c| c.name == context) {
            Some(ctx) => ctx.modules.push(loaded),
            None => inner.contexts.push(LoadContext {
                name: context.to_string(),
                modules: vec![loaded],
            }),
        }
        status
    }

    fn index_types(inner: &mut RegistryInner, module: &TypeModule) {
        for desc in module.types() {
            if inner.by_name.contains_key(desc.name()) {
                log::warn!(
                    "[tether] Type '{}' from '{}' shadowed by an earlier module",
                    desc.name(),
                    module.full_name()
                );
                continue;
            }
            inner
                .by_name
                .insert(desc.name().to_string(), Arc::clone(desc));
        }
    }

    /// Number of resolvable type names
    pub fn type_count(&self) -> usize {
        self.inner.read().by_name.len()
    }
}

impl TypeResolver for TypeRegistry {
    fn find_type(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.inner.read().by_name.get(name).cloned()
    }

    fn contexts(&self) -> Vec<ContextSummary> {
        self.inner
            .read()
            .contexts
            .iter()
            .map(|ctx| ContextSummary {
                name: ctx.name.clone(),
                modules: ctx.modules.iter().map(LoadedModule::summary).collect(),
            })
            .collect()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.type_count())
            .finish()
    }
}
