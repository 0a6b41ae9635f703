use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{BridgeOptions, MAX_HANDLE_CAPACITY};
use crate::dispatch::Dispatcher;
use crate::exception::{panic_message, ExceptionBridge};
use crate::handles::{HandleError, HandleMode, HandleTable, ObjectHandle};
use crate::heap::{CollectStats, HeapStats, ManagedHeap, ObjectRef};
use crate::reflect::{ContextSummary, TypeResolver};
use crate::request::CreateRequest;
use crate::value::ManagedValue;
use crate::BridgeError;

/// The composed bridge: heap, handle table, dispatcher and exception bridge.
///
/// Every operation takes `&self`; a bridge can be shared between threads.
pub struct Bridge {
    options: BridgeOptions,
    heap: Mutex<ManagedHeap>,
    handles: HandleTable,
    dispatcher: Dispatcher,
    exceptions: ExceptionBridge,
}

impl Bridge {
    /// Create a bridge with default options
    pub fn new(resolver: Arc<dyn TypeResolver>) -> Self {
        Self::with_options(BridgeOptions::default(), resolver)
    }

    /// Create a bridge with explicit options.
    ///
    /// `handle_capacity` is clamped to [`MAX_HANDLE_CAPACITY`] even when the
    /// options were never validated.
    pub fn with_options(options: BridgeOptions, resolver: Arc<dyn TypeResolver>) -> Self {
        Self {
            heap: Mutex::new(ManagedHeap::new(options.gc_threshold)),
            handles: HandleTable::with_capacity(options.handle_capacity.min(MAX_HANDLE_CAPACITY)),
            dispatcher: Dispatcher::new(resolver),
            exceptions: ExceptionBridge::new(),
            options,
        }
    }

    /// Options the bridge was built with
    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Process-wide fault reporting
    pub fn exceptions(&self) -> &ExceptionBridge {
        &self.exceptions
    }

    /// Type resolver backing the dispatcher
    pub fn resolver(&self) -> &Arc<dyn TypeResolver> {
        self.dispatcher.resolver()
    }

    /// Construct `type_name` and issue a handle for it.
    ///
    /// `Ok(None)` means the type is unknown.
    pub fn create_object(
        &self,
        type_name: &str,
        args: &[ManagedValue],
        mode: HandleMode,
    ) -> Result<Option<ObjectHandle>, BridgeError> {
        let Some(object) = self.dispatcher.construct(&self.heap, type_name, args)? else {
            return Ok(None);
        };
        Ok(Some(self.handles.register(&object, mode)?))
    }

    /// Construct from a decoded native request
    pub fn create_from_request(&self, request: &CreateRequest) -> Result<Option<ObjectHandle>, BridgeError> {
        self.create_object(&request.type_name, &request.args, request.mode)
    }

    /// Release a handle
    pub fn destroy_object(&self, handle: ObjectHandle) -> Result<(), BridgeError> {
        Ok(self.handles.release(handle)?)
    }

    /// Call `method` on the object behind `handle`
    pub fn invoke_method(
        &self,
        handle: ObjectHandle,
        method: &str,
        args: &[ManagedValue],
    ) -> Result<Option<ManagedValue>, BridgeError> {
        let object = self.resolve(handle)?;
        self.dispatcher.invoke(&object, method, args)
    }

    /// The object behind `handle`
    pub fn resolve(&self, handle: ObjectHandle) -> Result<ObjectRef, BridgeError> {
        Ok(self.handles.resolve(handle)?)
    }

    /// Interpret a raw native token; zero is invalid
    pub fn handle_from_raw(&self, raw: usize) -> Result<ObjectHandle, BridgeError> {
        ObjectHandle::from_raw(raw).ok_or(BridgeError::Handle(HandleError::Invalid(raw)))
    }

    /// Run a collection now
    pub fn collect_garbage(&self) -> CollectStats {
        self.heap.lock().collect()
    }

    /// Heap statistics
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.lock().stats()
    }

    /// Number of live handles
    pub fn live_handles(&self) -> usize {
        self.handles.len()
    }

    /// Log every load context and its modules
    pub fn diagnose(&self) -> Vec<ContextSummary> {
        let contexts = self.resolver().contexts();
        for context in &contexts {
            log::info!("[tether] Name: {}", context.name);
            log::info!("[tether] Assemblies: {}", context.modules.len());
            for module in &context.modules {
                log::info!(
                    "[tether] \tName: {} ({}, {} type(s))",
                    module.full_name,
                    module.status,
                    module.types.len()
                );
            }
        }
        contexts
    }

    /// Run one boundary call.
    ///
    /// Errors and panics from `call` are reported through the exception
    /// bridge and replaced by `fallback`; nothing unwinds out of here.
    pub fn guarded<T>(
        &self,
        export: &'static str,
        fallback: T,
        call: impl FnOnce(&Self) -> Result<T, BridgeError>,
    ) -> T {
        let error = match catch_unwind(AssertUnwindSafe(|| call(self))) {
            Ok(Ok(value)) => return value,
            Ok(Err(err)) => err,
            Err(payload) => BridgeError::Panic {
                export,
                message: panic_message(&*payload),
            },
        };

        log::debug!("[tether] {} failed: {}", export, error);
        self.exceptions.report(&error);
        fallback
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("options", &self.options)
            .field("handles", &self.handles)
            .field("exceptions", &self.exceptions)
            .finish_non_exhaustive()
    }
}
