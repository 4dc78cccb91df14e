//! Classifies native parameter and return types into bridgeable categories.
//!
//! Descriptors are computed once, when a module's catalog is built, and the
//! bridge only ever consults the precomputed values.

use kiln_ir::{ElementKind, IntKind, NativeType, OpaqueTag};
use kiln_source::ClassNames;
use std::fmt;

/// How a parameter is marshaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Integer { bits: u16, signed: bool },
    /// `bool`/`_Bool`: any nonzero managed value becomes `true`.
    Boolean,
    ManagedObject,
    ManagedString,
    ManagedClass,
    ManagedArray(ElementKind),
    EnvironmentContext,
    Unsupported,
}

/// How a native result becomes a managed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnRule {
    Void,
    /// Sign- or zero-extend to 64 bits and box.
    BoxInteger { bits: u16, signed: bool },
    /// The pointer already is a managed reference.
    PassThrough(OpaqueTag),
    /// The call runs but the result is discarded.
    Drop,
    /// Wider than a machine word; refused before the call.
    Unsupported,
}

/// Opaque struct tags with a managed meaning. Array tags come from
/// [`ElementKind::from_struct_tag`].
const OPAQUE_TAGS: &[(&str, OpaqueTag)] = &[
    ("_jobject", OpaqueTag::ManagedObject),
    ("_jstring", OpaqueTag::ManagedString),
    ("_jclass", OpaqueTag::ManagedClass),
    ("JNIEnv_", OpaqueTag::EnvironmentContext),
];

pub fn opaque_tag(struct_tag: &str) -> Option<OpaqueTag> {
    OPAQUE_TAGS
        .iter()
        .find(|(name, _)| *name == struct_tag)
        .map(|(_, tag)| *tag)
        .or_else(|| ElementKind::from_struct_tag(struct_tag).map(OpaqueTag::ManagedArray))
}

pub fn classify(ty: &NativeType) -> TypeDescriptor {
    match ty {
        NativeType::Int(IntKind::Bool) => TypeDescriptor::Boolean,
        NativeType::Int(kind) => TypeDescriptor::Integer {
            bits: kind.bits(),
            signed: kind.is_signed(),
        },
        NativeType::Pointer(_) => match ty.pointee_struct().and_then(opaque_tag) {
            Some(OpaqueTag::ManagedObject) => TypeDescriptor::ManagedObject,
            Some(OpaqueTag::ManagedString) => TypeDescriptor::ManagedString,
            Some(OpaqueTag::ManagedClass) => TypeDescriptor::ManagedClass,
            Some(OpaqueTag::ManagedArray(kind)) => TypeDescriptor::ManagedArray(kind),
            Some(OpaqueTag::EnvironmentContext) => TypeDescriptor::EnvironmentContext,
            None => TypeDescriptor::Unsupported,
        },
        _ => TypeDescriptor::Unsupported,
    }
}

pub fn return_rule(ty: &NativeType) -> ReturnRule {
    if ty.is_void() {
        return ReturnRule::Void;
    }
    match classify(ty) {
        TypeDescriptor::Integer { bits, .. } if bits > 64 => ReturnRule::Unsupported,
        TypeDescriptor::Integer { bits, signed } => ReturnRule::BoxInteger { bits, signed },
        TypeDescriptor::Boolean => ReturnRule::BoxInteger { bits: 8, signed: false },
        TypeDescriptor::ManagedObject => ReturnRule::PassThrough(OpaqueTag::ManagedObject),
        TypeDescriptor::ManagedString => ReturnRule::PassThrough(OpaqueTag::ManagedString),
        TypeDescriptor::ManagedClass => ReturnRule::PassThrough(OpaqueTag::ManagedClass),
        TypeDescriptor::ManagedArray(kind) => ReturnRule::PassThrough(OpaqueTag::ManagedArray(kind)),
        TypeDescriptor::EnvironmentContext | TypeDescriptor::Unsupported => ReturnRule::Drop,
    }
}

impl TypeDescriptor {
    /// The class a non-null argument must have, spelled for error messages.
    /// `None` when any reference is accepted.
    pub fn expected_class(&self, names: &ClassNames) -> Option<String> {
        match self {
            TypeDescriptor::ManagedString => Some(names.string_class.clone()),
            TypeDescriptor::ManagedClass => Some(names.class_class.clone()),
            TypeDescriptor::ManagedArray(kind) => Some(match kind.descriptor() {
                Some(letter) => format!("{}{letter}", names.array_prefix),
                None => format!("{}L...", names.array_prefix),
            }),
            _ => None,
        }
    }

    /// Whether a reference of runtime class `class_name` may be passed.
    ///
    /// Object arrays accept reference arrays and arrays of arrays.
    pub fn accepts_class(&self, class_name: &str, names: &ClassNames) -> bool {
        match self {
            TypeDescriptor::ManagedString => class_name == names.string_class,
            TypeDescriptor::ManagedClass => class_name == names.class_class,
            TypeDescriptor::ManagedArray(kind) => {
                let Some(rest) = class_name.strip_prefix(names.array_prefix.as_str()) else {
                    return false;
                };
                match kind.descriptor() {
                    Some(letter) => rest.len() == letter.len_utf8() && rest.starts_with(letter),
                    None => rest.starts_with('L') || rest.starts_with(names.array_prefix.as_str()),
                }
            }
            _ => true,
        }
    }

    /// The opaque tag a validated pointer argument carries.
    pub fn opaque_tag(&self) -> Option<OpaqueTag> {
        match self {
            TypeDescriptor::ManagedObject => Some(OpaqueTag::ManagedObject),
            TypeDescriptor::ManagedString => Some(OpaqueTag::ManagedString),
            TypeDescriptor::ManagedClass => Some(OpaqueTag::ManagedClass),
            TypeDescriptor::ManagedArray(kind) => Some(OpaqueTag::ManagedArray(*kind)),
            TypeDescriptor::EnvironmentContext => Some(OpaqueTag::EnvironmentContext),
            TypeDescriptor::Integer { .. } | TypeDescriptor::Boolean | TypeDescriptor::Unsupported => None,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Integer { bits, signed: true } => write!(f, "i{bits}"),
            TypeDescriptor::Integer { bits, signed: false } => write!(f, "u{bits}"),
            TypeDescriptor::Boolean => f.write_str("bool"),
            TypeDescriptor::ManagedObject => f.write_str("object"),
            TypeDescriptor::ManagedString => f.write_str("string"),
            TypeDescriptor::ManagedClass => f.write_str("class"),
            TypeDescriptor::ManagedArray(kind) => write!(f, "{kind}"),
            TypeDescriptor::EnvironmentContext => f.write_str("environment"),
            TypeDescriptor::Unsupported => f.write_str("unsupported"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_ir::FloatKind;

    #[test]
    fn integers_keep_width_and_sign() {
        assert_eq!(
            classify(&NativeType::Int(IntKind::UChar)),
            TypeDescriptor::Integer { bits: 8, signed: false }
        );
        assert_eq!(
            classify(&NativeType::Int(IntKind::Long)),
            TypeDescriptor::Integer { bits: 64, signed: true }
        );
        assert_eq!(classify(&NativeType::Int(IntKind::Bool)), TypeDescriptor::Boolean);
        assert_eq!(
            return_rule(&NativeType::Int(IntKind::Bool)),
            ReturnRule::BoxInteger { bits: 8, signed: false }
        );
    }

    #[test]
    fn opaque_pointers_use_the_table() {
        assert_eq!(classify(&NativeType::opaque("_jstring")), TypeDescriptor::ManagedString);
        assert_eq!(classify(&NativeType::opaque("_jclass")), TypeDescriptor::ManagedClass);
        assert_eq!(classify(&NativeType::opaque("JNIEnv_")), TypeDescriptor::EnvironmentContext);
        assert_eq!(
            classify(&NativeType::opaque("_jintArray")),
            TypeDescriptor::ManagedArray(ElementKind::Int)
        );
        assert_eq!(
            classify(&NativeType::opaque("_jobjectArray")),
            TypeDescriptor::ManagedArray(ElementKind::Object)
        );
        assert_eq!(classify(&NativeType::opaque("sockaddr")), TypeDescriptor::Unsupported);
        assert_eq!(
            classify(&NativeType::pointer_to(NativeType::Int(IntKind::Char))),
            TypeDescriptor::Unsupported
        );
        assert_eq!(classify(&NativeType::Float(FloatKind::Double)), TypeDescriptor::Unsupported);
    }

    #[test]
    fn return_rules() {
        assert_eq!(return_rule(&NativeType::Void), ReturnRule::Void);
        assert_eq!(
            return_rule(&NativeType::Int(IntKind::Int)),
            ReturnRule::BoxInteger { bits: 32, signed: true }
        );
        assert_eq!(return_rule(&NativeType::Int(IntKind::Int128)), ReturnRule::Unsupported);
        assert_eq!(
            return_rule(&NativeType::opaque("_jstring")),
            ReturnRule::PassThrough(OpaqueTag::ManagedString)
        );
        assert_eq!(return_rule(&NativeType::opaque("JNIEnv_")), ReturnRule::Drop);
        assert_eq!(return_rule(&NativeType::Float(FloatKind::Float)), ReturnRule::Drop);
        assert_eq!(
            return_rule(&NativeType::pointer_to(NativeType::Int(IntKind::Int))),
            ReturnRule::Drop
        );
    }

    #[test]
    fn array_classes() {
        let names = ClassNames::default();
        let ints = TypeDescriptor::ManagedArray(ElementKind::Int);
        assert!(ints.accepts_class("[I", &names));
        assert!(!ints.accepts_class("[J", &names));
        assert!(!ints.accepts_class("[[I", &names));
        assert_eq!(ints.expected_class(&names).as_deref(), Some("[I"));

        let objects = TypeDescriptor::ManagedArray(ElementKind::Object);
        assert!(objects.accepts_class("[Ljava.lang.String;", &names));
        assert!(objects.accepts_class("[[I", &names));
        assert!(!objects.accepts_class("[I", &names));
        assert!(!objects.accepts_class("java.lang.Object", &names));
    }

    #[test]
    fn string_and_class_names_come_from_config() {
        let names = ClassNames {
            string_class: "System.String".to_string(),
            ..ClassNames::default()
        };
        assert!(TypeDescriptor::ManagedString.accepts_class("System.String", &names));
        assert!(!TypeDescriptor::ManagedString.accepts_class("java.lang.String", &names));
        assert!(TypeDescriptor::ManagedObject.accepts_class("anything", &names));
    }
}
