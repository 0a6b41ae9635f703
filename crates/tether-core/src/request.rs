//! Object creation requests
//!
//! `ObjectCreateInfo` is the C layout native callers fill in for
//! `tether_create_object`; [`CreateRequest`] is its decoded, owned form.

use std::ffi::c_void;

use crate::handles::HandleMode;
use crate::interop::InteropString;
use crate::marshal::{ArgumentPack, EncodedArgs};
use crate::value::ManagedValue;
use crate::BridgeError;

/// Native description of an object to construct.
///
/// Field order is part of the ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ObjectCreateInfo {
    /// Fully-qualified managed type name
    pub type_name: InteropString,
    /// Issue a weak handle instead of an owning one
    pub is_weak_ref: bool,
    /// One address per argument
    pub parameters: *const *const c_void,
    /// One tag per argument
    pub parameter_types: *const i32,
    /// Argument count
    pub length: i32,
}

impl ObjectCreateInfo {
    /// Describe a construction from Rust-owned parts.
    ///
    /// The result borrows `type_name` and `args`; both must outlive every
    /// use of it.
    pub fn new(type_name: &InteropString, mode: HandleMode, args: &ArgumentPack) -> Self {
        Self {
            type_name: *type_name,
            is_weak_ref: mode == HandleMode::Weak,
            parameters: args.values(),
            parameter_types: args.tags(),
            length: args.count(),
        }
    }
}

/// A decoded creation request
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    /// Type to construct
    pub type_name: String,
    /// Handle kind to issue
    pub mode: HandleMode,
    /// Decoded constructor arguments
    pub args: Vec<ManagedValue>,
}

impl CreateRequest {
    /// Decode a native request, copying everything it references.
    ///
    /// A request whose parameter buffers are null asks for the
    /// parameterless constructor, whatever its length says.
    ///
    /// # Safety
    /// `info` must be null or point to a valid `ObjectCreateInfo` whose
    /// string and argument buffers satisfy [`EncodedArgs::from_raw`] and
    /// [`InteropString::as_str`].
    pub unsafe fn read(info: *const ObjectCreateInfo) -> Result<Self, BridgeError> {
        let info = info.as_ref().ok_or(BridgeError::NullRequest)?;

        let type_name = info.type_name.to_string()?;
        let args = if info.parameters.is_null() || info.parameter_types.is_null() {
            if info.length > 0 {
                log::debug!(
                    "[tether] {} requested with {} argument(s) but no buffers; using default constructor",
                    type_name,
                    info.length
                );
            }
            Vec::new()
        } else {
            EncodedArgs::from_raw(info.parameter_types, info.parameters, info.length)?.decode()?
        };
        let mode = if info.is_weak_ref {
            HandleMode::Weak
        } else {
            HandleMode::Owning
        };

        Ok(Self {
            type_name,
            mode,
            args,
        })
    }
}
