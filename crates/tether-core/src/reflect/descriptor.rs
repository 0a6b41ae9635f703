//! Type, constructor and method descriptors
//!
//! A [`TypeDescriptor`] is the reflected view of one managed type: its
//! constructors and its methods in declaration order, each with declared
//! parameter kinds and a type-erased body. Descriptors are built once per
//! type, by hand through [`TypeBuilder`] or by the `#[reflect]` attribute.

use std::any::{type_name, Any};
use std::sync::Arc;

use crate::exception::Fault;
use crate::heap::ObjectState;
use crate::value::{ManagedValue, TypeTag};

/// Type-erased constructor body
pub type ConstructorFn = Arc<dyn Fn(&[ManagedValue]) -> Result<ObjectState, Fault> + Send + Sync>;

/// Type-erased method body
pub type MethodFn = Arc<
    dyn Fn(&mut (dyn Any + Send), &[ManagedValue]) -> Result<Option<ManagedValue>, Fault>
        + Send
        + Sync,
>;

/// One reflected constructor
#[derive(Clone)]
pub struct ConstructorInfo {
    params: Vec<TypeTag>,
    body: ConstructorFn,
}

impl ConstructorInfo {
    /// Declared parameter kinds
    pub fn params(&self) -> &[TypeTag] {
        &self.params
    }

    /// Number of declared parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Run the body with already-coerced arguments
    pub fn call(&self, args: &[ManagedValue]) -> Result<ObjectState, Fault> {
        (self.body)(args)
    }
}

impl std::fmt::Debug for ConstructorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstructorInfo")
            .field("params", &self.params)
            .finish()
    }
}

/// One reflected instance method
#[derive(Clone)]
pub struct MethodInfo {
    name: String,
    params: Vec<TypeTag>,
    body: MethodFn,
}

impl MethodInfo {
    /// Method name as native callers spell it
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter kinds
    pub fn params(&self) -> &[TypeTag] {
        &self.params
    }

    /// Number of declared parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Run the body against `receiver` with already-coerced arguments
    pub fn call(
        &self,
        receiver: &mut (dyn Any + Send),
        args: &[ManagedValue],
    ) -> Result<Option<ManagedValue>, Fault> {
        (self.body)(receiver, args)
    }

    /// `Name(int, double)` style signature for messages
    pub fn signature(&self) -> String {
        format_signature(&self.name, &self.params)
    }
}

impl std::fmt::Debug for MethodInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodInfo")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

pub(crate) fn format_signature(name: &str, params: &[TypeTag]) -> String {
    let params: Vec<&str> = params.iter().map(|t| t.name()).collect();
    format!("{}({})", name, params.join(", "))
}

/// Reflected metadata for a managed type
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    name: String,
    constructors: Vec<ConstructorInfo>,
    methods: Vec<MethodInfo>,
}

impl TypeDescriptor {
    /// Fully-qualified type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Constructors in declaration order
    pub fn constructors(&self) -> &[ConstructorInfo] {
        &self.constructors
    }

    /// Methods in declaration order (the enumeration order used for
    /// first-match selection)
    pub fn methods(&self) -> &[MethodInfo] {
        &self.methods
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builds a [`TypeDescriptor`] for the Rust type `T` that holds object state.
///
/// # Example
///
/// ```ignore
/// let counter = TypeBuilder::<Counter>::new("Demo.Counter")
///     .constructor(&[], |_| Ok(Counter::default()))
///     .method("Increment", &[], |this, _| {
///         this.count += 1;
///         Ok(None)
///     })
///     .build();
/// ```
pub struct TypeBuilder<T> {
    name: String,
    constructors: Vec<ConstructorInfo>,
    methods: Vec<MethodInfo>,
    _state: std::marker::PhantomData<fn() -> T>,
}

impl<T: Any + Send> TypeBuilder<T> {
    /// Start a descriptor named `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constructors: Vec::new(),
            methods: Vec::new(),
            _state: std::marker::PhantomData,
        }
    }

    /// Add a constructor taking `params`
    pub fn constructor<F>(mut self, params: &[TypeTag], body: F) -> Self
    where
        F: Fn(&[ManagedValue]) -> Result<T, Fault> + Send + Sync + 'static,
    {
        let body: ConstructorFn = Arc::new(move |args: &[ManagedValue]| {
            body(args).map(|state| Box::new(state) as ObjectState)
        });
        self.constructors.push(ConstructorInfo {
            params: params.to_vec(),
            body,
        });
        self
    }

    /// Add an instance method taking `params`
    pub fn method<F>(mut self, name: impl Into<String>, params: &[TypeTag], body: F) -> Self
    where
        F: Fn(&mut T, &[ManagedValue]) -> Result<Option<ManagedValue>, Fault>
            + Send
            + Sync
            + 'static,
    {
        let body: MethodFn = Arc::new(move |receiver: &mut (dyn Any + Send), args: &[ManagedValue]| {
            let this = receiver.downcast_mut::<T>().ok_or_else(|| {
                Fault::new(format!("Receiver is not a {}", type_name::<T>()))
            })?;
            body(this, args)
        });
        self.methods.push(MethodInfo {
            name: name.into(),
            params: params.to_vec(),
            body,
        });
        self
    }

    /// Finish the descriptor
    pub fn build(self) -> TypeDescriptor {
        TypeDescriptor {
            name: self.name,
            constructors: self.constructors,
            methods: self.methods,
        }
    }
}

/// A Rust type that can describe itself as a managed type.
///
/// Usually implemented by `#[tether_native::reflect]`.
pub trait Reflect: Any + Send + Sized {
    /// Build the type's descriptor
    fn describe() -> TypeDescriptor;
}
