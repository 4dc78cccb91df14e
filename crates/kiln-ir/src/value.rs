//! Values that cross the native call boundary.
//!
//! [`OpaqueValue`] is what the bridge hands to an execution context for
//! each argument. [`NativeValue`] is what comes back. Neither carries any
//! managed-runtime meaning on its own; the tags only record which managed
//! category a pointer was validated against.

use std::fmt;

/// Element type of a managed primitive or reference array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Object,
}

impl ElementKind {
    pub const ALL: [ElementKind; 9] = [
        ElementKind::Boolean,
        ElementKind::Byte,
        ElementKind::Char,
        ElementKind::Short,
        ElementKind::Int,
        ElementKind::Long,
        ElementKind::Float,
        ElementKind::Double,
        ElementKind::Object,
    ];

    /// Descriptor letter used in managed array class names (`[I`, `[J`, ...).
    ///
    /// Object arrays have no single letter; they are recognised by prefix.
    pub fn descriptor(self) -> Option<char> {
        match self {
            ElementKind::Boolean => Some('Z'),
            ElementKind::Byte => Some('B'),
            ElementKind::Char => Some('C'),
            ElementKind::Short => Some('S'),
            ElementKind::Int => Some('I'),
            ElementKind::Long => Some('J'),
            ElementKind::Float => Some('F'),
            ElementKind::Double => Some('D'),
            ElementKind::Object => None,
        }
    }

    /// The opaque struct tag native code declares arrays of this kind with.
    pub fn struct_tag(self) -> &'static str {
        match self {
            ElementKind::Boolean => "_jbooleanArray",
            ElementKind::Byte => "_jbyteArray",
            ElementKind::Char => "_jcharArray",
            ElementKind::Short => "_jshortArray",
            ElementKind::Int => "_jintArray",
            ElementKind::Long => "_jlongArray",
            ElementKind::Float => "_jfloatArray",
            ElementKind::Double => "_jdoubleArray",
            ElementKind::Object => "_jobjectArray",
        }
    }

    pub fn from_struct_tag(tag: &str) -> Option<ElementKind> {
        ElementKind::ALL.into_iter().find(|k| k.struct_tag() == tag)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Boolean => "boolean",
            ElementKind::Byte => "byte",
            ElementKind::Char => "char",
            ElementKind::Short => "short",
            ElementKind::Int => "int",
            ElementKind::Long => "long",
            ElementKind::Float => "float",
            ElementKind::Double => "double",
            ElementKind::Object => "object",
        };
        write!(f, "{name}[]")
    }
}

/// Which managed category a pointer argument stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpaqueTag {
    ManagedObject,
    ManagedString,
    ManagedClass,
    ManagedArray(ElementKind),
    EnvironmentContext,
}

impl fmt::Display for OpaqueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpaqueTag::ManagedObject => f.write_str("object"),
            OpaqueTag::ManagedString => f.write_str("string"),
            OpaqueTag::ManagedClass => f.write_str("class"),
            OpaqueTag::ManagedArray(kind) => write!(f, "{kind}"),
            OpaqueTag::EnvironmentContext => f.write_str("environment"),
        }
    }
}

/// One native call argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpaqueValue {
    /// Raw two's complement bits, already truncated to `bits`.
    Integer { bits: u16, value: u128 },
    Pointer { tag: OpaqueTag, address: u64 },
}

impl OpaqueValue {
    /// Builds an integer argument, keeping only the low `bits` bits.
    pub fn integer(bits: u16, value: i64) -> Self {
        OpaqueValue::Integer {
            bits,
            value: truncate(value as i128 as u128, bits),
        }
    }

    pub fn pointer(tag: OpaqueTag, address: u64) -> Self {
        OpaqueValue::Pointer { tag, address }
    }

    /// Raw bits as written into a call slot.
    pub fn raw_bits(&self) -> u128 {
        match *self {
            OpaqueValue::Integer { value, .. } => value,
            OpaqueValue::Pointer { address, .. } => address as u128,
        }
    }
}

/// The raw result of a native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeValue {
    Void,
    /// Raw bits of an integer return, truncated to `bits`.
    Integer { bits: u16, value: u128 },
    Address(u64),
    /// Raw IEEE bits of a floating point return.
    Float { bits: u16, raw: u64 },
}

impl NativeValue {
    /// Interprets an integer result at its declared width.
    pub fn as_i64(&self, signed: bool) -> Option<i64> {
        match *self {
            NativeValue::Integer { bits, value } if bits <= 64 => {
                Some(if signed {
                    sign_extend(value, bits) as i64
                } else {
                    value as u64 as i64
                })
            }
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<u64> {
        match *self {
            NativeValue::Address(address) => Some(address),
            _ => None,
        }
    }
}

pub fn truncate(value: u128, bits: u16) -> u128 {
    if bits >= 128 {
        value
    } else {
        value & ((1u128 << bits) - 1)
    }
}

pub fn sign_extend(value: u128, bits: u16) -> i128 {
    if bits == 0 || bits >= 128 {
        return value as i128;
    }
    let shift = 128 - bits as u32;
    ((value << shift) as i128) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arguments_keep_low_bits() {
        assert_eq!(
            OpaqueValue::integer(8, 300),
            OpaqueValue::Integer { bits: 8, value: 44 }
        );
        assert_eq!(
            OpaqueValue::integer(16, -1),
            OpaqueValue::Integer { bits: 16, value: 0xffff }
        );
        assert_eq!(
            OpaqueValue::integer(128, -1),
            OpaqueValue::Integer { bits: 128, value: u128::MAX }
        );
    }

    #[test]
    fn results_read_back_with_sign() {
        let byte = NativeValue::Integer { bits: 8, value: 0xff };
        assert_eq!(byte.as_i64(true), Some(-1));
        assert_eq!(byte.as_i64(false), Some(255));
        assert_eq!(NativeValue::Address(8).as_i64(true), None);
        assert_eq!(NativeValue::Integer { bits: 128, value: 1 }.as_i64(true), None);
    }

    #[test]
    fn array_tags_round_trip() {
        for kind in ElementKind::ALL {
            assert_eq!(ElementKind::from_struct_tag(kind.struct_tag()), Some(kind));
        }
        assert_eq!(ElementKind::from_struct_tag("_jobject"), None);
        assert_eq!(ElementKind::Long.descriptor(), Some('J'));
    }
}
