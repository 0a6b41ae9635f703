//! C boundary exports for the Tether bridge
//!
//! Native hosts drive managed objects through these functions:
//! - ABI-stable (only C-compatible types cross the boundary)
//! - Handles are opaque `usize` tokens; zero is the invalid handle
//! - No fault ever unwinds into the caller; faults are delivered to the
//!   registered exception callback and the export returns its failure value
//!
//! All exports share one process-global [`Bridge`]. A Rust host registers
//! its types by calling [`install`] before the first boundary call;
//! otherwise an empty bridge configured from `TETHER_CONFIG` is created on
//! first use.

use std::ffi::{c_char, c_void, CStr};

use once_cell::sync::OnceCell;
use tether_core::{
    BridgeOptions, CreateRequest, EncodedArgs, ExceptionCallback, InteropString,
    ObjectCreateInfo, ObjectHandle, TypeRegistry,
};

pub use tether_core::Bridge;

static BRIDGE: OnceCell<Bridge> = OnceCell::new();

// ============================================================================
// Global Bridge
// ============================================================================

/// Install the process-global bridge.
///
/// Fails, handing the bridge back, if one is already in place (installed
/// earlier or created by a previous boundary call).
pub fn install(bridge: Bridge) -> Result<(), Bridge> {
    BRIDGE.set(bridge)
}

/// The process-global bridge, created with defaults on first use
pub fn bridge() -> &'static Bridge {
    BRIDGE.get_or_init(default_bridge)
}

fn default_bridge() -> Bridge {
    let options = BridgeOptions::from_env().unwrap_or_else(|e| {
        log::warn!("[tether] Ignoring configuration: {}", e);
        BridgeOptions::default()
    });
    Bridge::with_options(options, std::sync::Arc::new(TypeRegistry::new()))
}

fn init_logging(filter: &str) {
    let env = env_logger::Env::default().default_filter_or(filter);
    if env_logger::Builder::from_env(env).try_init().is_err() {
        log::debug!("[tether] Logger already installed");
    }
}

// ============================================================================
// Boundary Exports
// ============================================================================

/// Install logging and log every load context and its modules
///
/// # Example (C)
/// ```c
/// tether_initialize();
/// ```
#[no_mangle]
pub extern "C" fn tether_initialize() {
    bridge().guarded("tether_initialize", (), |b| {
        init_logging(&b.options().log_filter);
        if b.options().diagnostics {
            b.diagnose();
        }
        Ok(())
    })
}

/// Register the fault callback, replacing any previous one
///
/// # Arguments
/// * `callback` - Receives one formatted report per fault; NULL unregisters
///
/// The string passed to the callback is freed when the callback returns;
/// copy it to keep it.
///
/// # Example (C)
/// ```c
/// void on_fault(InteropString message) {
///     fprintf(stderr, "managed fault: %s\n", message.data);
/// }
///
/// tether_set_exception_callback(on_fault);
/// ```
#[no_mangle]
pub extern "C" fn tether_set_exception_callback(callback: Option<ExceptionCallback>) {
    let previous = bridge().exceptions().set_callback(callback);
    log::debug!(
        "[tether] Exception callback {} (previously {})",
        if callback.is_some() { "set" } else { "cleared" },
        if previous.is_some() { "set" } else { "unset" }
    );
}

/// Construct an object and return a handle to it
///
/// # Arguments
/// * `info` - Type name, handle mode and constructor arguments
///
/// # Returns
/// * Non-zero handle on success
/// * 0 if the type is unknown (not reported) or construction faulted
///   (reported)
///
/// # Safety
/// `info` must be NULL or point to a valid `ObjectCreateInfo` whose name and
/// argument buffers are valid for the duration of the call.
///
/// # Example (C)
/// ```c
/// int32_t start = 10;
/// const void* values[] = { &start };
/// int32_t tags[] = { TETHER_TAG_INT };
/// ObjectCreateInfo info = { name, false, values, tags, 1 };
/// uintptr_t counter = tether_create_object(&info);
/// ```
#[no_mangle]
pub unsafe extern "C" fn tether_create_object(info: *const ObjectCreateInfo) -> usize {
    bridge().guarded("tether_create_object", 0, |b| {
        let request = unsafe { CreateRequest::read(info) }?;
        let handle = b.create_from_request(&request)?;
        Ok(handle.map_or(0, ObjectHandle::into_raw))
    })
}

/// Release a handle
///
/// # Arguments
/// * `handle` - Handle from `tether_create_object()`
///
/// Releasing an unknown or already-released handle is a reported fault.
#[no_mangle]
pub extern "C" fn tether_destroy_object(handle: usize) {
    bridge().guarded("tether_destroy_object", (), |b| {
        b.destroy_object(b.handle_from_raw(handle)?)
    })
}

/// Invoke a method by name on the object behind `handle`
///
/// # Arguments
/// * `handle` - Handle from `tether_create_object()`
/// * `method` - Method name
/// * `tags` - One type tag per argument, or NULL
/// * `values` - One value address per argument, or NULL
/// * `count` - Argument count
///
/// The method's return value is discarded. Faults are reported.
///
/// # Safety
/// `method` must be a valid NUL-terminated string, and the argument buffers
/// must hold `count` entries whose addresses are readable at their tag's
/// width.
#[no_mangle]
pub unsafe extern "C" fn tether_invoke_method(
    handle: usize,
    method: InteropString,
    tags: *const i32,
    values: *const *const c_void,
    count: i32,
) {
    bridge().guarded("tether_invoke_method", (), |b| {
        let handle = b.handle_from_raw(handle)?;
        let method = unsafe { method.as_str() }?;
        let args = unsafe { EncodedArgs::from_raw(tags, values, count)?.decode() }?;
        b.invoke_method(handle, method, &args)?;
        Ok(())
    })
}

// ============================================================================
// Interop Strings
// ============================================================================

/// Copy a NUL-terminated native string into a bridge-owned string
///
/// # Returns
/// * A string to be freed with `tether_string_free()`
/// * A null string if `text` is NULL
///
/// Invalid UTF-8 is replaced with U+FFFD.
///
/// # Safety
/// `text` must be NULL or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn tether_string_new(text: *const c_char) -> InteropString {
    if text.is_null() {
        return InteropString::null();
    }
    InteropString::from_str(&CStr::from_ptr(text).to_string_lossy())
}

/// Free a string returned by `tether_string_new()`
///
/// # Safety
/// The string must come from `tether_string_new()` and must not be used
/// afterwards. Freeing a null string is a no-op.
#[no_mangle]
pub unsafe extern "C" fn tether_string_free(text: InteropString) {
    text.free();
}

/// Get the bridge version string
///
/// # Returns
/// Static NUL-terminated version string (do not free)
#[no_mangle]
pub extern "C" fn tether_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}

// ============================================================================
// Tests
// ============================================================================
