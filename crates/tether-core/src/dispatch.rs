//! Dynamic dispatch
//!
//! Turns a type name or method name plus decoded arguments into a call on a
//! reflected body. Constructors go through overload resolution; methods are
//! matched by name and arity only, and the first match in declaration order
//! wins.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::exception::Fault;
use crate::heap::{ManagedHeap, ObjectRef};
use crate::reflect::{format_signature, ConstructorInfo, MethodInfo, TypeDescriptor, TypeResolver};
use crate::value::{ManagedValue, TypeTag};
use crate::BridgeError;

/// Member lookup and argument binding failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// No constructor accepts the argument list
    #[error("No constructor on '{type_name}' accepts {arity} argument(s)")]
    MissingConstructor {
        /// Requested type
        type_name: String,
        /// Argument count supplied
        arity: usize,
    },

    /// Two or more constructors match equally well
    #[error("Ambiguous constructor call on '{type_name}': {candidates:?}")]
    AmbiguousMatch {
        /// Requested type
        type_name: String,
        /// Signatures of the tied candidates
        candidates: Vec<String>,
    },

    /// No method with this name and parameter count
    #[error("Method '{method}' with {arity} parameter(s) not found on '{type_name}'")]
    MissingMethod {
        /// Runtime type of the receiver
        type_name: String,
        /// Requested method name
        method: String,
        /// Argument count supplied
        arity: usize,
    },

    /// An argument cannot be converted to its declared kind
    #[error("Argument {index} of {target}: expected {expected}, got {got}")]
    ArgumentMismatch {
        /// Signature of the selected member
        target: String,
        /// Argument position
        index: usize,
        /// Declared parameter kind
        expected: TypeTag,
        /// Kind actually supplied
        got: TypeTag,
    },
}

/// Reflection-based dispatcher over a [`TypeResolver`]
#[derive(Clone)]
pub struct Dispatcher {
    resolver: Arc<dyn TypeResolver>,
}

impl Dispatcher {
    /// Create a dispatcher resolving types through `resolver`
    pub fn new(resolver: Arc<dyn TypeResolver>) -> Self {
        Self { resolver }
    }

    /// The resolver in use
    pub fn resolver(&self) -> &Arc<dyn TypeResolver> {
        &self.resolver
    }

    /// Construct an instance of `type_name` on `heap`.
    ///
    /// An unknown type name is not an error: it yields `Ok(None)`.
    pub fn construct(
        &self,
        heap: &Mutex<ManagedHeap>,
        type_name: &str,
        args: &[ManagedValue],
    ) -> Result<Option<ObjectRef>, BridgeError> {
        let Some(type_desc) = self.resolver.find_type(type_name) else {
            log::warn!("[tether] Unable to find type '{}'", type_name);
            return Ok(None);
        };

        let ctor = select_constructor(&type_desc, args)?;
        let bound = bind(
            || constructor_signature(&type_desc, ctor),
            ctor.params(),
            args,
        )?;

        let state = run_body(
            || constructor_signature(&type_desc, ctor),
            || ctor.call(&bound),
        )?;

        // The heap lock is only taken once the body has returned
        let object = heap.lock().allocate(type_desc, state);
        Ok(Some(object))
    }

    /// Invoke `method` on `object`, returning the body's result
    pub fn invoke(
        &self,
        object: &ObjectRef,
        method: &str,
        args: &[ManagedValue],
    ) -> Result<Option<ManagedValue>, BridgeError> {
        let type_desc = object.type_desc();
        let info = find_method(type_desc, method, args.len()).ok_or_else(|| {
            DispatchError::MissingMethod {
                type_name: type_desc.name().to_string(),
                method: method.to_string(),
                arity: args.len(),
            }
        })?;

        let target = || format!("{}.{}", type_desc.name(), info.signature());
        let bound = bind(target, info.params(), args)?;

        run_body(target, || {
            let mut state = object.lock();
            info.call(&mut **state, &bound)
        })
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

/// First method in declaration order with this exact name and parameter count
pub fn find_method<'a>(type_desc: &'a TypeDescriptor, name: &str, arity: usize) -> Option<&'a MethodInfo> {
    type_desc
        .methods()
        .iter()
        .find(|m| m.name() == name && m.arity() == arity)
}

/// Pick the constructor for `args`.
///
/// Without arguments this is the parameterless constructor. Otherwise every
/// constructor of matching arity whose parameters accept the arguments is a
/// candidate, and the one with the most exact kind matches wins.
pub fn select_constructor<'a>(
    type_desc: &'a TypeDescriptor,
    args: &[ManagedValue],
) -> Result<&'a ConstructorInfo, DispatchError> {
    let missing = || DispatchError::MissingConstructor {
        type_name: type_desc.name().to_string(),
        arity: args.len(),
    };

    if args.is_empty() {
        return type_desc
            .constructors()
            .iter()
            .find(|c| c.arity() == 0)
            .ok_or_else(missing);
    }

    let mut best: Vec<&ConstructorInfo> = Vec::new();
    let mut best_score = 0;
    for ctor in type_desc.constructors().iter().filter(|c| c.arity() == args.len()) {
        let Some(score) = exact_matches(ctor.params(), args) else {
            continue;
        };
        if best.is_empty() || score > best_score {
            best_score = score;
            best.clear();
            best.push(ctor);
        } else if score == best_score {
            best.push(ctor);
        }
    }

    match best.as_slice() {
        [] => Err(missing()),
        [only] => Ok(*only),
        tied => Err(DispatchError::AmbiguousMatch {
            type_name: type_desc.name().to_string(),
            candidates: tied
                .iter()
                .map(|c| constructor_signature(type_desc, c))
                .collect(),
        }),
    }
}

/// Count of exact kind matches, or `None` if any argument is incompatible
fn exact_matches(params: &[TypeTag], args: &[ManagedValue]) -> Option<usize> {
    let mut exact = 0;
    for (param, arg) in params.iter().zip(args) {
        if arg.tag() == *param {
            exact += 1;
        } else if !arg.tag().widens_to(*param) {
            return None;
        }
    }
    Some(exact)
}

fn bind(
    target: impl Fn() -> String,
    params: &[TypeTag],
    args: &[ManagedValue],
) -> Result<Vec<ManagedValue>, DispatchError> {
    params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (&expected, &arg))| {
            arg.coerce(expected).ok_or_else(|| DispatchError::ArgumentMismatch {
                target: target(),
                index,
                expected,
                got: arg.tag(),
            })
        })
        .collect()
}

fn run_body<R>(
    target: impl Fn() -> String,
    body: impl FnOnce() -> Result<R, Fault>,
) -> Result<R, BridgeError> {
    let result = catch_unwind(AssertUnwindSafe(body))
        .unwrap_or_else(|payload| Err(Fault::from_panic(&*payload)));
    result.map_err(|source| BridgeError::Invocation {
        target: target(),
        source,
    })
}

fn constructor_signature(type_desc: &TypeDescriptor, ctor: &ConstructorInfo) -> String {
    format_signature(&format!("{}..ctor", type_desc.name()), ctor.params())
}
