use std::fmt;

/// A C integer type.
///
/// Types with the same width are kept apart because decorated names tell
/// them apart (`long` is `l`, `long long` is `x`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntKind {
    Bool,
    Char,
    SChar,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Int128,
    UInt128,
}

impl IntKind {
    pub fn bits(self) -> u16 {
        match self {
            IntKind::Bool | IntKind::Char | IntKind::SChar | IntKind::UChar => 8,
            IntKind::Short | IntKind::UShort => 16,
            IntKind::Int | IntKind::UInt => 32,
            IntKind::Long | IntKind::ULong | IntKind::LongLong | IntKind::ULongLong => 64,
            IntKind::Int128 | IntKind::UInt128 => 128,
        }
    }

    /// `char` is signed, as on x86-64 and the usual aarch64 hosts.
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            IntKind::Char
                | IntKind::SChar
                | IntKind::Short
                | IntKind::Int
                | IntKind::Long
                | IntKind::LongLong
                | IntKind::Int128
        )
    }

    pub fn spelling(self) -> &'static str {
        match self {
            IntKind::Bool => "bool",
            IntKind::Char => "char",
            IntKind::SChar => "signed char",
            IntKind::UChar => "unsigned char",
            IntKind::Short => "short",
            IntKind::UShort => "unsigned short",
            IntKind::Int => "int",
            IntKind::UInt => "unsigned int",
            IntKind::Long => "long",
            IntKind::ULong => "unsigned long",
            IntKind::LongLong => "long long",
            IntKind::ULongLong => "unsigned long long",
            IntKind::Int128 => "__int128",
            IntKind::UInt128 => "unsigned __int128",
        }
    }

    /// Rank used by the usual arithmetic conversions.
    pub fn rank(self) -> u8 {
        match self {
            IntKind::Bool => 0,
            IntKind::Char | IntKind::SChar | IntKind::UChar => 1,
            IntKind::Short | IntKind::UShort => 2,
            IntKind::Int | IntKind::UInt => 3,
            IntKind::Long | IntKind::ULong => 4,
            IntKind::LongLong | IntKind::ULongLong => 5,
            IntKind::Int128 | IntKind::UInt128 => 6,
        }
    }

    /// The unsigned type of the same rank.
    pub fn to_unsigned(self) -> IntKind {
        match self {
            IntKind::Char | IntKind::SChar => IntKind::UChar,
            IntKind::Short => IntKind::UShort,
            IntKind::Int => IntKind::UInt,
            IntKind::Long => IntKind::ULong,
            IntKind::LongLong => IntKind::ULongLong,
            IntKind::Int128 => IntKind::UInt128,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatKind {
    Float,
    Double,
}

impl FloatKind {
    pub fn bits(self) -> u16 {
        match self {
            FloatKind::Float => 32,
            FloatKind::Double => 64,
        }
    }
}

/// A native type as declared in the compiled source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NativeType {
    Void,
    Int(IntKind),
    Float(FloatKind),
    Pointer(Box<NativeType>),
    /// A named struct; only ever seen behind a pointer.
    Struct(String),
    /// A function designator; the value is its entry address.
    Function,
}

impl NativeType {
    pub const INT: NativeType = NativeType::Int(IntKind::Int);

    pub fn pointer_to(pointee: NativeType) -> NativeType {
        NativeType::Pointer(Box::new(pointee))
    }

    pub fn opaque(tag: &str) -> NativeType {
        NativeType::pointer_to(NativeType::Struct(tag.to_string()))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, NativeType::Void)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, NativeType::Int(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, NativeType::Pointer(_) | NativeType::Function)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, NativeType::Float(_))
    }

    /// Scalars are the types that fit in one native register.
    pub fn is_scalar(&self) -> bool {
        self.is_integer() || self.is_pointer() || self.is_float()
    }

    pub fn int_kind(&self) -> Option<IntKind> {
        match self {
            NativeType::Int(kind) => Some(*kind),
            _ => None,
        }
    }

    /// The struct tag this pointer points at, if any.
    pub fn pointee_struct(&self) -> Option<&str> {
        match self {
            NativeType::Pointer(inner) => match inner.as_ref() {
                NativeType::Struct(tag) => Some(tag),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeType::Void => f.write_str("void"),
            NativeType::Int(kind) => f.write_str(kind.spelling()),
            NativeType::Float(FloatKind::Float) => f.write_str("float"),
            NativeType::Float(FloatKind::Double) => f.write_str("double"),
            NativeType::Pointer(inner) => write!(f, "{inner} *"),
            NativeType::Struct(tag) => write!(f, "struct {tag}"),
            NativeType::Function => f.write_str("function"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_and_signs() {
        assert_eq!(IntKind::UChar.bits(), 8);
        assert!(!IntKind::UChar.is_signed());
        assert!(IntKind::Char.is_signed());
        assert_eq!(IntKind::ULongLong.bits(), 64);
        assert_eq!(IntKind::Int128.bits(), 128);
        assert_eq!(IntKind::Long.to_unsigned(), IntKind::ULong);
    }

    #[test]
    fn display_spells_c_types() {
        assert_eq!(NativeType::INT.to_string(), "int");
        assert_eq!(NativeType::opaque("_jstring").to_string(), "struct _jstring *");
        assert_eq!(
            NativeType::pointer_to(NativeType::Int(IntKind::UInt)).to_string(),
            "unsigned int *"
        );
    }

    #[test]
    fn pointee_struct_only_for_struct_pointers() {
        assert_eq!(NativeType::opaque("JNIEnv_").pointee_struct(), Some("JNIEnv_"));
        assert_eq!(NativeType::pointer_to(NativeType::INT).pointee_struct(), None);
        assert_eq!(NativeType::INT.pointee_struct(), None);
    }
}
