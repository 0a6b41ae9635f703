//! Exception bridge
//!
//! Managed-side faults never unwind into native code. Every boundary export
//! funnels its error into [`ExceptionBridge::report`], which renders the
//! error chain (plus a backtrace when one was captured) and hands the text
//! to the single process-wide native callback, if any.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt::Write as _;

use parking_lot::RwLock;

use crate::interop::InteropString;

/// Native receiver of formatted fault reports.
///
/// The string is only valid for the duration of the call.
pub type ExceptionCallback = extern "C" fn(InteropString);

// ============================================================================
// Fault
// ============================================================================

/// An error raised by managed code (a constructor or method body).
///
/// Captures a backtrace at construction when `RUST_BACKTRACE` or
/// `RUST_LIB_BACKTRACE` enables it.
#[derive(Debug)]
pub struct Fault {
    message: String,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Fault {
    /// Create a fault with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            backtrace: Backtrace::capture(),
        }
    }

    /// Create a fault wrapping an inner error
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
            backtrace: Backtrace::capture(),
        }
    }

    /// Create a fault from a caught panic payload
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::new(format!("panicked: {}", panic_message(payload)))
    }

    /// The fault's own message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Backtrace captured at the raise site
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for Fault {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn Error + 'static))
    }
}

/// Extract the text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

// ============================================================================
// Formatting
// ============================================================================

/// Render an error the way it is delivered to native code.
///
/// ```text
/// <error>
/// Caused by:
///     0: <source>
///     1: <source of source>
/// Stack backtrace:
/// <frames>
/// ```
pub fn format_report(error: &(dyn Error + 'static)) -> String {
    let mut out = error.to_string();
    let mut backtrace = find_backtrace(error);

    let mut source = error.source();
    if source.is_some() {
        out.push_str("\nCaused by:");
    }
    let mut depth = 0;
    while let Some(cause) = source {
        let _ = write!(out, "\n    {}: {}", depth, cause);
        if backtrace.is_none() {
            backtrace = find_backtrace(cause);
        }
        source = cause.source();
        depth += 1;
    }

    if let Some(bt) = backtrace {
        let _ = write!(out, "\nStack backtrace:\n{}", bt);
    }
    out
}

fn find_backtrace<'a>(error: &'a (dyn Error + 'static)) -> Option<&'a Backtrace> {
    error
        .downcast_ref::<Fault>()
        .map(Fault::backtrace)
        .filter(|bt| bt.status() == BacktraceStatus::Captured)
}

// ============================================================================
// Exception Bridge
// ============================================================================

/// Process-wide fault reporting state.
///
/// Registration is last-writer-wins; `None` means faults are dropped after
/// capture.
#[derive(Default)]
pub struct ExceptionBridge {
    callback: RwLock<Option<ExceptionCallback>>,
}

impl ExceptionBridge {
    /// Create a bridge with no callback registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the registered callback, returning the previous one
    pub fn set_callback(&self, callback: Option<ExceptionCallback>) -> Option<ExceptionCallback> {
        std::mem::replace(&mut *self.callback.write(), callback)
    }

    /// The currently registered callback
    pub fn callback(&self) -> Option<ExceptionCallback> {
        *self.callback.read()
    }

    /// Format `error` and deliver it to the registered callback.
    ///
    /// Returns whether a callback received the report. Never panics on the
    /// reporting path itself.
    pub fn report(&self, error: &(dyn Error + 'static)) -> bool {
        // Copy out so the callback may re-register without deadlocking
        let Some(callback) = self.callback() else {
            log::debug!("[tether] Dropping unobserved fault: {}", error);
            return false;
        };

        let message = InteropString::from_str(&format_report(error));
        callback(message);
        unsafe { message.free() };
        true
    }
}

impl std::fmt::Debug for ExceptionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionBridge")
            .field("registered", &self.callback().is_some())
            .finish()
    }
}
