use crate::NativeError;
use cranelift_codegen::ir::{
    types::{self, Type},
    AbiParam, Signature,
};
use cranelift_codegen::isa::TargetIsa;
use kiln_ir::{Builtin, FloatKind, FunctionDef, IntKind, NativeType};

/// Translates a native type into a Cranelift IR type.
///
/// Returns `None` for `void`. Bare struct types never appear as values.
pub fn translate_type(ty: &NativeType, isa: &dyn TargetIsa) -> Result<Option<Type>, NativeError> {
    match ty {
        NativeType::Void => Ok(None),
        NativeType::Int(kind) => Ok(Some(int_type(*kind))),
        NativeType::Float(FloatKind::Float) => Ok(Some(types::F32)),
        NativeType::Float(FloatKind::Double) => Ok(Some(types::F64)),
        NativeType::Pointer(_) | NativeType::Function => Ok(Some(isa.pointer_type())),
        NativeType::Struct(tag) => Err(NativeError::TypeError(format!(
            "struct {tag} cannot be passed by value"
        ))),
    }
}

/// Like [`translate_type`], for positions where `void` is not a value.
pub fn value_type(ty: &NativeType, isa: &dyn TargetIsa) -> Result<Type, NativeError> {
    translate_type(ty, isa)?
        .ok_or_else(|| NativeError::TypeError("'void' is not a value type".to_string()))
}

pub fn int_type(kind: IntKind) -> Type {
    match kind.bits() {
        8 => types::I8,
        16 => types::I16,
        32 => types::I32,
        64 => types::I64,
        _ => types::I128,
    }
}

/// Sub-word integers are extended to a full register at call boundaries,
/// the way the C ABI expects.
fn abi_param(ty: &NativeType, cl_ty: Type) -> AbiParam {
    let param = AbiParam::new(cl_ty);
    match ty {
        NativeType::Int(kind) if kind.bits() < 32 => {
            if kind.is_signed() {
                param.sext()
            } else {
                param.uext()
            }
        }
        _ => param,
    }
}

fn signature_of<'t>(
    params: impl IntoIterator<Item = &'t NativeType>,
    ret: &NativeType,
    isa: &dyn TargetIsa,
) -> Result<Signature, NativeError> {
    let mut sig = Signature::new(isa.default_call_conv());
    for param in params {
        let cl_ty = value_type(param, isa)?;
        sig.params.push(abi_param(param, cl_ty));
    }
    if let Some(cl_ty) = translate_type(ret, isa)? {
        sig.returns.push(abi_param(ret, cl_ty));
    }
    Ok(sig)
}

/// The C signature of a compiled function.
pub fn translate_signature(def: &FunctionDef, isa: &dyn TargetIsa) -> Result<Signature, NativeError> {
    signature_of(def.params.iter().map(|p| &p.ty), &def.ret, isa)
}

/// The host signature of a builtin, environment pointer first.
pub fn builtin_signature(builtin: Builtin, isa: &dyn TargetIsa) -> Result<Signature, NativeError> {
    let env = NativeType::opaque("JNIEnv_");
    let params = builtin.params();
    signature_of(std::iter::once(&env).chain(params.iter()), &builtin.ret(), isa)
}

/// Width in bytes of a value of this type in memory.
pub fn byte_width(ty: &NativeType) -> usize {
    match ty {
        NativeType::Void | NativeType::Struct(_) => 0,
        NativeType::Int(kind) => usize::from(kind.bits() / 8),
        NativeType::Float(kind) => usize::from(kind.bits() / 8),
        NativeType::Pointer(_) | NativeType::Function => std::mem::size_of::<usize>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_codegen::settings;

    fn host_isa() -> std::sync::Arc<dyn TargetIsa> {
        let flags = settings::Flags::new(settings::builder());
        cranelift_native::builder().unwrap().finish(flags).unwrap()
    }

    #[test]
    fn integer_widths() {
        let isa = host_isa();
        let long = NativeType::Int(IntKind::Long);
        assert_eq!(translate_type(&long, isa.as_ref()).unwrap(), Some(types::I64));
        assert_eq!(
            translate_type(&NativeType::Int(IntKind::Bool), isa.as_ref()).unwrap(),
            Some(types::I8)
        );
        assert_eq!(
            translate_type(&NativeType::Int(IntKind::UInt128), isa.as_ref()).unwrap(),
            Some(types::I128)
        );
        assert_eq!(translate_type(&NativeType::Void, isa.as_ref()).unwrap(), None);
    }

    #[test]
    fn pointers_use_the_host_width() {
        let isa = host_isa();
        let object = NativeType::opaque("_jobject");
        assert_eq!(
            translate_type(&object, isa.as_ref()).unwrap(),
            Some(isa.pointer_type())
        );
        assert!(translate_type(&NativeType::Struct("_jobject".into()), isa.as_ref()).is_err());
    }

    #[test]
    fn builtin_signatures_lead_with_the_environment() {
        let isa = host_isa();
        let sig = builtin_signature(Builtin::CallLongCallback, isa.as_ref()).unwrap();
        assert_eq!(sig.params.len(), 3);
        assert_eq!(sig.params[0].value_type, isa.pointer_type());
        assert_eq!(sig.returns[0].value_type, types::I64);
    }

    #[test]
    fn byte_widths() {
        assert_eq!(byte_width(&NativeType::Int(IntKind::Short)), 2);
        assert_eq!(byte_width(&NativeType::Float(FloatKind::Double)), 8);
        assert_eq!(byte_width(&NativeType::Void), 0);
    }
}
