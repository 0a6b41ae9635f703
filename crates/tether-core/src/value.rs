//! Managed scalar values and their wire tags
//!
//! Every argument that crosses the boundary is described by a [`TypeTag`]
//! and, once decoded, carried as a [`ManagedValue`]. Tags also serve as the
//! declared parameter kinds of reflected constructors and methods.

use crate::exception::Fault;
use crate::marshal::MarshalError;

// ============================================================================
// Type Tags
// ============================================================================

/// Scalar kind of one encoded argument.
///
/// The discriminants are the wire encoding and must not be reordered.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// Signed 8-bit integer
    SByte = 0,
    /// Unsigned 8-bit integer
    Byte = 1,
    /// Signed 16-bit integer
    Short = 2,
    /// Unsigned 16-bit integer
    UShort = 3,
    /// Signed 32-bit integer
    Int = 4,
    /// Unsigned 32-bit integer
    UInt = 5,
    /// Signed 64-bit integer
    Long = 6,
    /// Unsigned 64-bit integer
    ULong = 7,
    /// 32-bit float
    Float = 8,
    /// 64-bit float
    Double = 9,
    /// One-byte boolean, non-zero is true
    Bool = 10,
    /// Opaque native pointer or previously issued handle
    Pointer = 11,
}

impl TypeTag {
    /// All tags in wire order
    pub const ALL: [TypeTag; 12] = [
        TypeTag::SByte,
        TypeTag::Byte,
        TypeTag::Short,
        TypeTag::UShort,
        TypeTag::Int,
        TypeTag::UInt,
        TypeTag::Long,
        TypeTag::ULong,
        TypeTag::Float,
        TypeTag::Double,
        TypeTag::Bool,
        TypeTag::Pointer,
    ];

    /// Width in bytes of the native value behind an argument address.
    ///
    /// `Pointer` has no backing buffer: the address itself is the value.
    pub fn width(self) -> usize {
        match self {
            TypeTag::SByte | TypeTag::Byte | TypeTag::Bool => 1,
            TypeTag::Short | TypeTag::UShort => 2,
            TypeTag::Int | TypeTag::UInt | TypeTag::Float => 4,
            TypeTag::Long | TypeTag::ULong | TypeTag::Double => 8,
            TypeTag::Pointer => 0,
        }
    }

    /// Human-readable kind name used in fault messages
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::SByte => "sbyte",
            TypeTag::Byte => "byte",
            TypeTag::Short => "short",
            TypeTag::UShort => "ushort",
            TypeTag::Int => "int",
            TypeTag::UInt => "uint",
            TypeTag::Long => "long",
            TypeTag::ULong => "ulong",
            TypeTag::Float => "float",
            TypeTag::Double => "double",
            TypeTag::Bool => "bool",
            TypeTag::Pointer => "pointer",
        }
    }

    /// Whether a value of this kind may be passed where `target` is declared
    /// without loss (identity included).
    pub fn widens_to(self, target: TypeTag) -> bool {
        use TypeTag::*;

        if self == target {
            return true;
        }

        match self {
            SByte => matches!(target, Short | Int | Long | Float | Double),
            Byte => matches!(
                target,
                Short | UShort | Int | UInt | Long | ULong | Float | Double
            ),
            Short => matches!(target, Int | Long | Float | Double),
            UShort => matches!(target, Int | UInt | Long | ULong | Float | Double),
            Int => matches!(target, Long | Float | Double),
            UInt => matches!(target, Long | ULong | Float | Double),
            Long | ULong => matches!(target, Float | Double),
            Float => matches!(target, Double),
            Double | Bool | Pointer => false,
        }
    }
}

impl TryFrom<i32> for TypeTag {
    type Error = MarshalError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        usize::try_from(raw)
            .ok()
            .and_then(|idx| TypeTag::ALL.get(idx).copied())
            .ok_or(MarshalError::UnknownTag { index: None, tag: raw })
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Managed Values
// ============================================================================

/// A decoded scalar, boxed for the managed side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ManagedValue {
    /// Signed 8-bit integer
    SByte(i8),
    /// Unsigned 8-bit integer
    Byte(u8),
    /// Signed 16-bit integer
    Short(i16),
    /// Unsigned 16-bit integer
    UShort(u16),
    /// Signed 32-bit integer
    Int(i32),
    /// Unsigned 32-bit integer
    UInt(u32),
    /// Signed 64-bit integer
    Long(i64),
    /// Unsigned 64-bit integer
    ULong(u64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// Boolean
    Bool(bool),
    /// Raw native address, passed through untouched
    Pointer(usize),
}

impl ManagedValue {
    /// Wire tag for this value
    pub fn tag(&self) -> TypeTag {
        match self {
            ManagedValue::SByte(_) => TypeTag::SByte,
            ManagedValue::Byte(_) => TypeTag::Byte,
            ManagedValue::Short(_) => TypeTag::Short,
            ManagedValue::UShort(_) => TypeTag::UShort,
            ManagedValue::Int(_) => TypeTag::Int,
            ManagedValue::UInt(_) => TypeTag::UInt,
            ManagedValue::Long(_) => TypeTag::Long,
            ManagedValue::ULong(_) => TypeTag::ULong,
            ManagedValue::Float(_) => TypeTag::Float,
            ManagedValue::Double(_) => TypeTag::Double,
            ManagedValue::Bool(_) => TypeTag::Bool,
            ManagedValue::Pointer(_) => TypeTag::Pointer,
        }
    }

    /// Convert to the declared parameter kind `target`, if the widening rules
    /// allow it. Returns `None` for narrowing or unrelated kinds.
    pub fn coerce(self, target: TypeTag) -> Option<ManagedValue> {
        if !self.tag().widens_to(target) {
            return None;
        }

        if self.tag() == target {
            return Some(self);
        }

        let coerced = match target {
            TypeTag::Short => ManagedValue::Short(self.as_i64()? as i16),
            TypeTag::UShort => ManagedValue::UShort(self.as_u64()? as u16),
            TypeTag::Int => ManagedValue::Int(self.as_i64()? as i32),
            TypeTag::UInt => ManagedValue::UInt(self.as_u64()? as u32),
            TypeTag::Long => ManagedValue::Long(self.as_i64()?),
            TypeTag::ULong => ManagedValue::ULong(self.as_u64()?),
            TypeTag::Float => ManagedValue::Float(self.as_f64()? as f32),
            TypeTag::Double => ManagedValue::Double(self.as_f64()?),
            _ => return None,
        };
        Some(coerced)
    }

    fn as_i64(self) -> Option<i64> {
        match self {
            ManagedValue::SByte(v) => Some(v as i64),
            ManagedValue::Byte(v) => Some(v as i64),
            ManagedValue::Short(v) => Some(v as i64),
            ManagedValue::UShort(v) => Some(v as i64),
            ManagedValue::Int(v) => Some(v as i64),
            ManagedValue::UInt(v) => Some(v as i64),
            ManagedValue::Long(v) => Some(v),
            _ => None,
        }
    }

    fn as_u64(self) -> Option<u64> {
        match self {
            ManagedValue::Byte(v) => Some(v as u64),
            ManagedValue::UShort(v) => Some(v as u64),
            ManagedValue::UInt(v) => Some(v as u64),
            ManagedValue::ULong(v) => Some(v),
            _ => None,
        }
    }

    fn as_f64(self) -> Option<f64> {
        match self {
            ManagedValue::Float(v) => Some(v as f64),
            ManagedValue::Double(v) => Some(v),
            ManagedValue::ULong(v) => Some(v as f64),
            other => other.as_i64().map(|v| v as f64),
        }
    }
}

impl std::fmt::Display for ManagedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagedValue::SByte(v) => write!(f, "{}", v),
            ManagedValue::Byte(v) => write!(f, "{}", v),
            ManagedValue::Short(v) => write!(f, "{}", v),
            ManagedValue::UShort(v) => write!(f, "{}", v),
            ManagedValue::Int(v) => write!(f, "{}", v),
            ManagedValue::UInt(v) => write!(f, "{}", v),
            ManagedValue::Long(v) => write!(f, "{}", v),
            ManagedValue::ULong(v) => write!(f, "{}", v),
            ManagedValue::Float(v) => write!(f, "{}", v),
            ManagedValue::Double(v) => write!(f, "{}", v),
            ManagedValue::Bool(v) => write!(f, "{}", v),
            ManagedValue::Pointer(v) => write!(f, "{:#x}", v),
        }
    }
}

// ============================================================================
// Rust Conversions
// ============================================================================

/// Raw native address argument.
///
/// Wraps the `Pointer` tag so reflected signatures can tell it apart from a
/// 64-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NativePtr(pub usize);

impl NativePtr {
    /// The address as a raw pointer
    pub fn as_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    /// Whether the address is zero
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// A Rust type with a fixed managed scalar representation.
///
/// Implemented for every scalar a reflected constructor or method may take.
pub trait ManagedType: Sized {
    /// Declared parameter kind
    const TAG: TypeTag;

    /// Extract from an already-coerced argument
    fn from_managed(value: &ManagedValue) -> Result<Self, Fault>;

    /// Box as a managed value
    fn into_managed(self) -> ManagedValue;
}

macro_rules! impl_managed_type {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ManagedType for $ty {
                const TAG: TypeTag = TypeTag::$variant;

                fn from_managed(value: &ManagedValue) -> Result<Self, Fault> {
                    match value.coerce(TypeTag::$variant) {
                        Some(ManagedValue::$variant(v)) => Ok(v),
                        _ => Err(Fault::new(format!(
                            "Type mismatch: expected {}, got {}",
                            TypeTag::$variant,
                            value.tag()
                        ))),
                    }
                }

                fn into_managed(self) -> ManagedValue {
                    ManagedValue::$variant(self)
                }
            }

            impl IntoReturn for $ty {
                fn into_return(self) -> Result<Option<ManagedValue>, Fault> {
                    Ok(Some(self.into_managed()))
                }
            }
        )*
    };
}

impl_managed_type! {
    i8 => SByte,
    u8 => Byte,
    i16 => Short,
    u16 => UShort,
    i32 => Int,
    u32 => UInt,
    i64 => Long,
    u64 => ULong,
    f32 => Float,
    f64 => Double,
    bool => Bool,
}

impl ManagedType for NativePtr {
    const TAG: TypeTag = TypeTag::Pointer;

    fn from_managed(value: &ManagedValue) -> Result<Self, Fault> {
        match value {
            ManagedValue::Pointer(addr) => Ok(NativePtr(*addr)),
            other => Err(Fault::new(format!(
                "Type mismatch: expected pointer, got {}",
                other.tag()
            ))),
        }
    }

    fn into_managed(self) -> ManagedValue {
        ManagedValue::Pointer(self.0)
    }
}

/// Conversion of a reflected body's return value.
///
/// `()` means no value; `Result<T, Fault>` propagates the fault.
pub trait IntoReturn {
    /// Convert to an optional managed value or a fault
    fn into_return(self) -> Result<Option<ManagedValue>, Fault>;
}

impl IntoReturn for () {
    fn into_return(self) -> Result<Option<ManagedValue>, Fault> {
        Ok(None)
    }
}

impl IntoReturn for NativePtr {
    fn into_return(self) -> Result<Option<ManagedValue>, Fault> {
        Ok(Some(self.into_managed()))
    }
}

impl<T: IntoReturn> IntoReturn for Result<T, Fault> {
    fn into_return(self) -> Result<Option<ManagedValue>, Fault> {
        self.and_then(IntoReturn::into_return)
    }
}
