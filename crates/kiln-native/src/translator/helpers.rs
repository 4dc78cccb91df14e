// Helpers for declaring host functions and emitting constants.

use crate::translator::types::builtin_signature;
use crate::NativeError;
use cranelift_codegen::ir::{types, FuncRef, Function, InstBuilder, Type, Value};
use cranelift_codegen::isa::TargetIsa;
use cranelift_frontend::FunctionBuilder;
use cranelift_jit::JITModule;
use cranelift_module::{Linkage, Module};
use kiln_ir::Builtin;

/// Declares the host implementation of an environment builtin.
/// The implementation lives in [`crate::shims`] and is bound by symbol.
pub fn declare_builtin_fn(
    jit_module: &mut JITModule,
    func: &mut Function,
    builtin: Builtin,
    isa: &dyn TargetIsa,
) -> Result<FuncRef, NativeError> {
    let sig = builtin_signature(builtin, isa)?;
    let sig_ref = func.import_signature(sig);
    let func_id = jit_module
        .declare_function(builtin.symbol(), Linkage::Import, &func.dfg.signatures[sig_ref])
        .map_err(|e| NativeError::FunctionDeclarationError(format!("{}: {e}", builtin.symbol())))?;
    Ok(jit_module.declare_func_in_func(func_id, func))
}

/// Emits an integer constant of type `ty`, keeping only the bits that fit.
pub fn int_const(builder: &mut FunctionBuilder, ty: Type, value: i128) -> Value {
    if ty == types::I128 {
        let lo = builder.ins().iconst(types::I64, value as i64);
        let hi = builder.ins().iconst(types::I64, (value >> 64) as i64);
        return builder.ins().iconcat(lo, hi);
    }
    let bits = ty.bits();
    let masked = if bits >= 64 {
        value as i64
    } else {
        ((value as u128) & ((1u128 << bits) - 1)) as i64
    };
    builder.ins().iconst(ty, masked)
}

/// Zero of any value type.
pub fn zero(builder: &mut FunctionBuilder, ty: Type) -> Value {
    match ty {
        types::F32 => builder.ins().f32const(0.0),
        types::F64 => builder.ins().f64const(0.0),
        _ => int_const(builder, ty, 0),
    }
}
