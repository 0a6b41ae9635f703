//! Tether Core
//!
//! Lets native code drive managed objects through opaque handles:
//! - Tagged-value marshaling of native argument lists
//! - Generational handle table with owning and weak handles
//! - Managed heap with collection of unrooted objects
//! - Reflection registry and name/arity dispatch
//! - Exception bridge delivering fault reports to a native callback

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod dispatch;
pub mod exception;
pub mod handles;
pub mod heap;
pub mod interop;
pub mod marshal;
pub mod reflect;
pub mod request;
pub mod value;

mod bridge;

pub use bridge::Bridge;
pub use config::{BridgeOptions, ConfigError};
pub use dispatch::{DispatchError, Dispatcher};
pub use exception::{ExceptionBridge, ExceptionCallback, Fault};
pub use handles::{HandleError, HandleMode, HandleTable, ObjectHandle};
pub use heap::{ManagedHeap, ManagedObject, ObjectRef};
pub use interop::{InteropError, InteropString};
pub use marshal::{ArgumentPack, EncodedArgs, MarshalError};
pub use reflect::{
    ModuleLoadStatus, Reflect, TypeBuilder, TypeDescriptor, TypeModule, TypeRegistry, TypeResolver,
};
pub use request::{CreateRequest, ObjectCreateInfo};
pub use value::{IntoReturn, ManagedType, ManagedValue, NativePtr, TypeTag};

/// Errors surfaced at the boundary
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Argument decoding failed
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// Handle was invalid or stale
    #[error(transparent)]
    Handle(#[from] HandleError),

    /// Member lookup or argument binding failed
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Interop string could not be read
    #[error(transparent)]
    Interop(#[from] InteropError),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A constructor or method body raised a fault
    #[error("Exception has been thrown by the target of an invocation: {target}")]
    Invocation {
        /// Signature of the member that faulted
        target: String,
        /// The managed fault
        source: Fault,
    },

    /// A panic escaped an export body
    #[error("Panic in {export}: {message}")]
    Panic {
        /// Export that panicked
        export: &'static str,
        /// Panic payload text
        message: String,
    },

    /// Null creation request pointer
    #[error("Object creation request is null")]
    NullRequest,
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
