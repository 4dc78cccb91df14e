//! Itanium C++ name decoration for the types Kiln sources can declare.
//!
//! Only what free functions need: the function name, then every parameter
//! type with `K` for `const`, `P` for pointers, length-prefixed struct
//! names and substitutions (`S_`, `S0_`, `S1_` ...) for repeated
//! compound types.

use crate::ast::TypeName;
use kiln_ir::{FloatKind, IntKind, NativeType};

/// Decorated name of a C++ free function.
pub fn decorate(name: &str, params: &[TypeName]) -> String {
    let mut out = format!("_Z{}{}", name.len(), name);
    if params.is_empty() {
        out.push('v');
        return out;
    }
    let mut mangler = Mangler::default();
    for param in params {
        // Top-level qualifiers are not part of the function type.
        let mut levels = param.const_levels.clone();
        if let Some(last) = levels.last_mut() {
            *last = false;
        }
        out.push_str(&mangler.encode(&param.ty, &levels));
    }
    out
}

fn builtin_code(kind: IntKind) -> char {
    match kind {
        IntKind::Bool => 'b',
        IntKind::Char => 'c',
        IntKind::SChar => 'a',
        IntKind::UChar => 'h',
        IntKind::Short => 's',
        IntKind::UShort => 't',
        IntKind::Int => 'i',
        IntKind::UInt => 'j',
        IntKind::Long => 'l',
        IntKind::ULong => 'm',
        IntKind::LongLong => 'x',
        IntKind::ULongLong => 'y',
        IntKind::Int128 => 'n',
        IntKind::UInt128 => 'o',
    }
}

#[derive(Default)]
struct Mangler {
    /// Full, unsubstituted encodings of the candidates seen so far.
    substitutions: Vec<String>,
}

impl Mangler {
    fn encode(&mut self, ty: &NativeType, levels: &[bool]) -> String {
        let key = canonical(ty, levels);
        if let Some(index) = self.substitutions.iter().position(|s| *s == key) {
            return substitution(index);
        }
        let (is_const, inner_levels) = split_levels(levels);
        if is_const {
            let mut unqualified = inner_levels.to_vec();
            unqualified.push(false);
            let encoded = format!("K{}", self.encode(ty, &unqualified));
            self.substitutions.push(key);
            return encoded;
        }
        match ty {
            NativeType::Pointer(pointee) => {
                let encoded = format!("P{}", self.encode(pointee, inner_levels));
                self.substitutions.push(key);
                encoded
            }
            NativeType::Struct(tag) => {
                self.substitutions.push(key.clone());
                key
            }
            // Builtin types are never substitution candidates.
            _ => key,
        }
    }
}

fn split_levels(levels: &[bool]) -> (bool, &[bool]) {
    match levels.split_last() {
        Some((last, rest)) => (*last, rest),
        None => (false, &[]),
    }
}

fn canonical(ty: &NativeType, levels: &[bool]) -> String {
    let (is_const, inner_levels) = split_levels(levels);
    let qualifier = if is_const { "K" } else { "" };
    let body = match ty {
        NativeType::Void => "v".to_string(),
        NativeType::Int(kind) => builtin_code(*kind).to_string(),
        NativeType::Float(FloatKind::Float) => "f".to_string(),
        NativeType::Float(FloatKind::Double) => "d".to_string(),
        NativeType::Pointer(pointee) => format!("P{}", canonical(pointee, inner_levels)),
        NativeType::Struct(tag) => format!("{}{}", tag.len(), tag),
        NativeType::Function => "Fvv".to_string(),
    };
    format!("{qualifier}{body}")
}

fn substitution(index: usize) -> String {
    if index == 0 {
        return "S_".to_string();
    }
    let mut n = index - 1;
    let mut digits = Vec::new();
    loop {
        let digit = (n % 36) as u8;
        digits.push(if digit < 10 {
            b'0' + digit
        } else {
            b'A' + digit - 10
        });
        n /= 36;
        if n == 0 {
            break;
        }
    }
    digits.reverse();
    format!("S{}_", String::from_utf8_lossy(&digits))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(ty: NativeType) -> TypeName {
        let mut depth = 0;
        let mut cursor = &ty;
        while let NativeType::Pointer(inner) = cursor {
            depth += 1;
            cursor = inner;
        }
        TypeName {
            ty,
            const_levels: vec![false; depth + 1],
            spelling: String::new(),
            span: (0, 0).into(),
        }
    }

    #[test]
    fn builtin_parameters() {
        let params = [ty(NativeType::INT), ty(NativeType::Int(IntKind::Long))];
        assert_eq!(decorate("add", &params), "_Z3addil");
        assert_eq!(decorate("f", &[]), "_Z1fv");
        assert_eq!(
            decorate("u", &[ty(NativeType::Int(IntKind::UChar)), ty(NativeType::Int(IntKind::ULongLong))]),
            "_Z1uhy"
        );
    }

    #[test]
    fn repeated_opaque_pointers_use_substitutions() {
        let env = ty(NativeType::pointer_to(NativeType::Struct("JNIEnv_".into())));
        let object = ty(NativeType::opaque("_jobject"));
        let class = ty(NativeType::opaque("_jclass"));
        let string = ty(NativeType::opaque("_jstring"));
        let int = ty(NativeType::INT);
        let params = [
            env,
            object.clone(),
            object.clone(),
            class.clone(),
            string.clone(),
            int,
            class.clone(),
            string,
            class,
            object,
        ];
        assert_eq!(
            decorate("objectMangling", &params),
            "_Z14objectManglingP7JNIEnv_P8_jobjectS2_P7_jclassP8_jstringiS4_S6_S4_S2_"
        );
    }

    #[test]
    fn const_pointee_is_a_candidate() {
        let mut text = ty(NativeType::pointer_to(NativeType::Int(IntKind::Char)));
        text.const_levels = vec![true, false];
        assert_eq!(decorate("puts", &[text.clone(), text]), "_Z4putsPKcS0_");
    }

    #[test]
    fn top_level_const_is_ignored() {
        let mut value = ty(NativeType::INT);
        value.const_levels = vec![true];
        assert_eq!(decorate("id", &[value]), "_Z2idi");
    }

    #[test]
    fn substitution_numbering() {
        assert_eq!(substitution(0), "S_");
        assert_eq!(substitution(1), "S0_");
        assert_eq!(substitution(11), "SA_");
        assert_eq!(substitution(37), "S10_");
    }
}
