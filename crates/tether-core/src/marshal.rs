//! Tagged-value marshaling
//!
//! Native callers describe an argument list as two parallel arrays: one
//! `i32` [`TypeTag`] per argument and one address per argument. For scalar
//! tags the address points at the raw native value; for the pointer tag the
//! address *is* the value. Decoding is positional and policy-free: the tag
//! stream is trusted, never checked against the target signature.

use std::ffi::c_void;
use std::ptr;

use crate::value::{ManagedValue, TypeTag};

/// Errors raised while decoding a native argument list
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarshalError {
    /// Tag value outside the wire vocabulary
    #[error("Unknown argument type tag {tag}{}", position_suffix(.index))]
    UnknownTag {
        /// Argument position, when known
        index: Option<usize>,
        /// Raw tag value
        tag: i32,
    },

    /// Scalar tag paired with a null value address
    #[error("Null value address for {tag} argument at position {index}")]
    NullValue {
        /// Argument position
        index: usize,
        /// Declared tag
        tag: TypeTag,
    },

    /// Argument count below zero
    #[error("Invalid argument count {0}")]
    NegativeCount(i32),

    /// Positive count with a missing tag or value buffer
    #[error("Null argument buffers for {count} argument(s)")]
    NullBuffers {
        /// Declared argument count
        count: i32,
    },
}

fn position_suffix(index: &Option<usize>) -> String {
    index
        .map(|i| format!(" at position {}", i))
        .unwrap_or_default()
}

/// Decode one native value.
///
/// Scalars are read unaligned at their native width. `Bool` is one byte,
/// non-zero meaning true. `Pointer` returns `raw` itself.
///
/// # Safety
/// For scalar tags, `raw` must be null or valid for reads of `tag.width()`
/// bytes.
pub unsafe fn decode(tag: TypeTag, raw: *const c_void) -> Result<ManagedValue, MarshalError> {
    decode_at(0, tag, raw)
}

unsafe fn decode_at(
    index: usize,
    tag: TypeTag,
    raw: *const c_void,
) -> Result<ManagedValue, MarshalError> {
    if tag == TypeTag::Pointer {
        return Ok(ManagedValue::Pointer(raw as usize));
    }

    if raw.is_null() {
        return Err(MarshalError::NullValue { index, tag });
    }

    let value = match tag {
        TypeTag::SByte => ManagedValue::SByte(ptr::read_unaligned(raw as *const i8)),
        TypeTag::Byte => ManagedValue::Byte(ptr::read_unaligned(raw as *const u8)),
        TypeTag::Short => ManagedValue::Short(ptr::read_unaligned(raw as *const i16)),
        TypeTag::UShort => ManagedValue::UShort(ptr::read_unaligned(raw as *const u16)),
        TypeTag::Int => ManagedValue::Int(ptr::read_unaligned(raw as *const i32)),
        TypeTag::UInt => ManagedValue::UInt(ptr::read_unaligned(raw as *const u32)),
        TypeTag::Long => ManagedValue::Long(ptr::read_unaligned(raw as *const i64)),
        TypeTag::ULong => ManagedValue::ULong(ptr::read_unaligned(raw as *const u64)),
        TypeTag::Float => ManagedValue::Float(ptr::read_unaligned(raw as *const f32)),
        TypeTag::Double => ManagedValue::Double(ptr::read_unaligned(raw as *const f64)),
        TypeTag::Bool => ManagedValue::Bool(ptr::read_unaligned(raw as *const u8) != 0),
        TypeTag::Pointer => unreachable!("pointer tag handled above"),
    };
    Ok(value)
}

// ============================================================================
// Encoded Argument Lists
// ============================================================================

/// Borrowed view over a native `(tags, values, count)` argument list.
///
/// Valid for one boundary call; nothing here outlives the native buffers.
#[derive(Debug, Clone, Copy)]
pub struct EncodedArgs<'a> {
    tags: &'a [i32],
    values: &'a [*const c_void],
}

impl<'a> EncodedArgs<'a> {
    /// An empty argument list
    pub fn empty() -> Self {
        Self {
            tags: &[],
            values: &[],
        }
    }

    /// Wrap native buffers.
    ///
    /// A zero count yields an empty list whatever the buffers hold. A
    /// negative count, or a positive count with either buffer null, is an
    /// error: the declared arity must reach the dispatcher intact.
    ///
    /// # Safety
    /// When both buffers are non-null and `count > 0`, each must be valid for
    /// `count` reads for the lifetime `'a`.
    pub unsafe fn from_raw(
        tags: *const i32,
        values: *const *const c_void,
        count: i32,
    ) -> Result<Self, MarshalError> {
        if count < 0 {
            return Err(MarshalError::NegativeCount(count));
        }

        if count == 0 {
            return Ok(Self::empty());
        }

        if tags.is_null() || values.is_null() {
            return Err(MarshalError::NullBuffers { count });
        }

        let len = count as usize;
        Ok(Self {
            tags: std::slice::from_raw_parts(tags, len),
            values: std::slice::from_raw_parts(values, len),
        })
    }

    /// Number of encoded arguments
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Check if there are no arguments
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Decode every argument in order.
    ///
    /// # Safety
    /// Every scalar-tagged address must be valid for reads of its width.
    pub unsafe fn decode(&self) -> Result<Vec<ManagedValue>, MarshalError> {
        let mut decoded = Vec::with_capacity(self.len());
        for (index, (&raw_tag, &raw)) in self.tags.iter().zip(self.values.iter()).enumerate() {
            let tag = TypeTag::try_from(raw_tag).map_err(|_| MarshalError::UnknownTag {
                index: Some(index),
                tag: raw_tag,
            })?;
            decoded.push(decode_at(index, tag, raw)?);
        }
        Ok(decoded)
    }
}

// ============================================================================
// Argument Packs (encoding side)
// ============================================================================

/// Owned argument list in native layout.
///
/// Used by Rust hosts that play the native role: values are stored in stable
/// 8-byte cells, and [`ArgumentPack::tags`] / [`ArgumentPack::values`] expose
/// the parallel arrays a boundary call expects.
#[derive(Debug, Default)]
pub struct ArgumentPack {
    tags: Vec<i32>,
    // Backing storage for the scalar addresses in `values`
    #[allow(dead_code)]
    cells: Vec<Box<u64>>,
    values: Vec<*const c_void>,
}

impl ArgumentPack {
    /// Create an empty pack
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value in its native representation
    pub fn push(&mut self, value: ManagedValue) -> &mut Self {
        let cell = Box::new(encode_scalar(value));
        let addr = match value {
            ManagedValue::Pointer(addr) => addr as *const c_void,
            _ => &*cell as *const u64 as *const c_void,
        };

        self.tags.push(value.tag() as i32);
        self.values.push(addr);
        self.cells.push(cell);
        self
    }

    /// Append a raw tag/address pair without interpretation
    pub fn push_raw(&mut self, tag: i32, addr: *const c_void) -> &mut Self {
        self.tags.push(tag);
        self.values.push(addr);
        self
    }

    /// Pointer to the tag array, or null when empty
    pub fn tags(&self) -> *const i32 {
        if self.tags.is_empty() {
            ptr::null()
        } else {
            self.tags.as_ptr()
        }
    }

    /// Pointer to the value-address array, or null when empty
    pub fn values(&self) -> *const *const c_void {
        if self.values.is_empty() {
            ptr::null()
        } else {
            self.values.as_ptr()
        }
    }

    /// Argument count in wire form
    pub fn count(&self) -> i32 {
        self.tags.len() as i32
    }

    /// Borrow as an encoded list
    pub fn as_encoded(&self) -> EncodedArgs<'_> {
        EncodedArgs {
            tags: &self.tags,
            values: &self.values,
        }
    }
}

fn encode_scalar(value: ManagedValue) -> u64 {
    let mut bytes = [0u8; 8];
    match value {
        ManagedValue::SByte(v) => bytes[..1].copy_from_slice(&v.to_ne_bytes()),
        ManagedValue::Byte(v) => bytes[0] = v,
        ManagedValue::Short(v) => bytes[..2].copy_from_slice(&v.to_ne_bytes()),
        ManagedValue::UShort(v) => bytes[..2].copy_from_slice(&v.to_ne_bytes()),
        ManagedValue::Int(v) => bytes[..4].copy_from_slice(&v.to_ne_bytes()),
        ManagedValue::UInt(v) => bytes[..4].copy_from_slice(&v.to_ne_bytes()),
        ManagedValue::Long(v) => bytes.copy_from_slice(&v.to_ne_bytes()),
        ManagedValue::ULong(v) => bytes.copy_from_slice(&v.to_ne_bytes()),
        ManagedValue::Float(v) => bytes[..4].copy_from_slice(&v.to_ne_bytes()),
        ManagedValue::Double(v) => bytes.copy_from_slice(&v.to_ne_bytes()),
        ManagedValue::Bool(v) => bytes[0] = v as u8,
        ManagedValue::Pointer(_) => {}
    }
    u64::from_ne_bytes(bytes)
}
