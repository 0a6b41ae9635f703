//! Interop strings
//!
//! Strings cross the boundary as NUL-terminated UTF-8 behind a single
//! pointer. Whoever allocates a string through [`InteropString::from_str`]
//! must release it exactly once with [`InteropString::free`].

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

/// Errors converting an interop string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InteropError {
    /// The string pointer was null where text was required
    #[error("Null string reference")]
    NullString,

    /// The bytes were not valid UTF-8
    #[error("Invalid UTF-8 in interop string: {0}")]
    InvalidUtf8(String),
}

/// A native-readable string, `#[repr(C)]` so it can be passed by value.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteropString {
    data: *mut c_char,
}

// The pointer is only dereferenced through the unsafe accessors below.
unsafe impl Send for InteropString {}
unsafe impl Sync for InteropString {}

impl InteropString {
    /// The null string
    pub const fn null() -> Self {
        Self {
            data: ptr::null_mut(),
        }
    }

    /// Allocate a copy of `s`.
    ///
    /// Interior NUL bytes cannot be represented and are replaced with U+FFFD.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        let c_str = match CString::new(s) {
            Ok(c_str) => c_str,
            Err(_) => CString::new(s.replace('\0', "\u{FFFD}"))
                .unwrap_or_default(),
        };
        Self {
            data: c_str.into_raw(),
        }
    }

    /// Wrap a native-owned NUL-terminated buffer without copying.
    ///
    /// The result must not be passed to [`InteropString::free`].
    pub fn borrowed(data: *const c_char) -> Self {
        Self {
            data: data as *mut c_char,
        }
    }

    /// Raw pointer to the NUL-terminated bytes
    pub fn as_ptr(&self) -> *const c_char {
        self.data
    }

    /// Check if this is the null string
    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// Borrow the text.
    ///
    /// # Safety
    /// The pointer must be null or point to a NUL-terminated buffer that
    /// stays alive for the returned lifetime.
    pub unsafe fn as_str<'a>(&self) -> Result<&'a str, InteropError> {
        if self.data.is_null() {
            return Err(InteropError::NullString);
        }

        CStr::from_ptr(self.data)
            .to_str()
            .map_err(|e| InteropError::InvalidUtf8(e.to_string()))
    }

    /// Copy the text into an owned `String`.
    ///
    /// # Safety
    /// Same contract as [`InteropString::as_str`].
    pub unsafe fn to_string(&self) -> Result<String, InteropError> {
        self.as_str().map(str::to_owned)
    }

    /// Release a string allocated by [`InteropString::from_str`].
    /// Freeing the null string is a no-op.
    ///
    /// # Safety
    /// The string must have come from `from_str` and must not be used or
    /// freed again afterwards.
    pub unsafe fn free(self) {
        if !self.data.is_null() {
            drop(CString::from_raw(self.data));
        }
    }
}

impl Default for InteropString {
    fn default() -> Self {
        Self::null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_lifecycle() {
        let s = InteropString::from_str("Demo.Counter");
        assert!(!s.is_null());
        assert_eq!(unsafe { s.as_str() }.unwrap(), "Demo.Counter");
        unsafe { s.free() };
    }

    #[test]
    fn test_interior_nul_replaced() {
        let s = InteropString::from_str("a\0b");
        assert_eq!(unsafe { s.to_string() }.unwrap(), "a\u{FFFD}b");
        unsafe { s.free() };
    }

    #[test]
    fn test_null_string() {
        let s = InteropString::null();
        assert_eq!(unsafe { s.as_str() }, Err(InteropError::NullString));
        // Freeing null is a no-op
        unsafe { s.free() };
    }

    #[test]
    fn test_borrowed_native_buffer() {
        let raw = b"Increment\0";
        let s = InteropString::borrowed(raw.as_ptr() as *const c_char);
        assert_eq!(unsafe { s.as_str() }.unwrap(), "Increment");
    }

    #[test]
    fn test_invalid_utf8() {
        let raw = b"\xff\xfe\0";
        let s = InteropString::borrowed(raw.as_ptr() as *const c_char);
        assert!(matches!(
            unsafe { s.as_str() },
            Err(InteropError::InvalidUtf8(_))
        ));
    }
}
