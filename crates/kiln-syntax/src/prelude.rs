//! Type names brought in by the built-in headers.

use crate::preprocess::Header;
use kiln_ir::{ElementKind, FloatKind, IntKind, NativeType};

fn int(kind: IntKind) -> NativeType {
    NativeType::Int(kind)
}

/// Typedefs declared by `header`, as name and underlying type.
pub fn typedefs(header: Header) -> Vec<(String, NativeType)> {
    let mut defs: Vec<(String, NativeType)> = Vec::new();
    let mut add = |name: &str, ty: NativeType| defs.push((name.to_string(), ty));
    match header {
        Header::Jni => {
            add("jboolean", int(IntKind::UChar));
            add("jbyte", int(IntKind::SChar));
            add("jchar", int(IntKind::UShort));
            add("jshort", int(IntKind::Short));
            add("jint", int(IntKind::Int));
            add("jlong", int(IntKind::Long));
            add("jsize", int(IntKind::Int));
            add("jfloat", NativeType::Float(FloatKind::Float));
            add("jdouble", NativeType::Float(FloatKind::Double));
            add("jobject", NativeType::opaque("_jobject"));
            add("jclass", NativeType::opaque("_jclass"));
            add("jstring", NativeType::opaque("_jstring"));
            add("jthrowable", NativeType::opaque("_jthrowable"));
            add("jarray", NativeType::opaque("_jarray"));
            add("jmethodID", NativeType::opaque("_jmethodID"));
            add("jfieldID", NativeType::opaque("_jfieldID"));
            for kind in ElementKind::ALL {
                let tag = kind.struct_tag();
                // "_jintArray" is typedef'd as "jintArray"
                add(&tag[1..], NativeType::opaque(tag));
            }
            add("JNIEnv", NativeType::Struct("JNIEnv_".to_string()));
            add("JavaVM", NativeType::Struct("JavaVM_".to_string()));
        }
        Header::StdInt => {
            add("int8_t", int(IntKind::SChar));
            add("uint8_t", int(IntKind::UChar));
            add("int16_t", int(IntKind::Short));
            add("uint16_t", int(IntKind::UShort));
            add("int32_t", int(IntKind::Int));
            add("uint32_t", int(IntKind::UInt));
            add("int64_t", int(IntKind::Long));
            add("uint64_t", int(IntKind::ULong));
            add("intptr_t", int(IntKind::Long));
            add("uintptr_t", int(IntKind::ULong));
            add("intmax_t", int(IntKind::Long));
            add("uintmax_t", int(IntKind::ULong));
        }
        Header::StdDef => {
            add("size_t", int(IntKind::ULong));
            add("ptrdiff_t", int(IntKind::Long));
        }
        Header::StdBool => {}
    }
    defs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jni_array_typedefs() {
        let defs = typedefs(Header::Jni);
        let find = |name: &str| defs.iter().find(|(n, _)| n == name).map(|(_, t)| t.clone());
        assert_eq!(find("jintArray"), Some(NativeType::opaque("_jintArray")));
        assert_eq!(find("jobjectArray"), Some(NativeType::opaque("_jobjectArray")));
        assert_eq!(find("jlong"), Some(NativeType::Int(IntKind::Long)));
        assert_eq!(find("int32_t"), None);
    }
}
