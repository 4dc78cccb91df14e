//! Uniform entry points for compiled functions.
//!
//! Every compiled function gets a trampoline with the fixed host signature
//! [`TrampolineFn`]: it loads each argument from an array of [`Slot`]s,
//! calls the function with its real C signature, and stores the result into
//! a return slot. That keeps the host side free of per-signature
//! `transmute`s.

use crate::translator::types::{translate_type, value_type};
use crate::NativeError;
use cranelift_codegen::ir::{AbiParam, Function, InstBuilder, MemFlags, Signature, UserFuncName};
use cranelift_codegen::isa::TargetIsa;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::JITModule;
use cranelift_module::{FuncId, Linkage, Module};
use kiln_ir::FunctionDef;

pub const SLOT_SIZE: usize = 16;

/// One argument or return value, stored as native-endian bytes at the
/// value's own width.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slot([u8; SLOT_SIZE]);

/// `fn(args, ret)` as generated by [`define_trampoline`].
pub type TrampolineFn = unsafe extern "C" fn(*const Slot, *mut Slot);

impl Slot {
    /// Stores the low `width` bytes of `raw`.
    pub fn encode(raw: u128, width: usize) -> Slot {
        let mut slot = Slot::default();
        match width {
            1 => slot.0[..1].copy_from_slice(&(raw as u8).to_ne_bytes()),
            2 => slot.0[..2].copy_from_slice(&(raw as u16).to_ne_bytes()),
            4 => slot.0[..4].copy_from_slice(&(raw as u32).to_ne_bytes()),
            8 => slot.0[..8].copy_from_slice(&(raw as u64).to_ne_bytes()),
            16 => slot.0.copy_from_slice(&raw.to_ne_bytes()),
            _ => {}
        }
        slot
    }

    /// Reads back a value of `width` bytes, zero-extended.
    pub fn decode(&self, width: usize) -> u128 {
        let bytes = &self.0;
        match width {
            1 => u128::from(bytes[0]),
            2 => u128::from(u16::from_ne_bytes([bytes[0], bytes[1]])),
            4 => u128::from(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            8 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[..8]);
                u128::from(u64::from_ne_bytes(raw))
            }
            16 => u128::from_ne_bytes(*bytes),
            _ => 0,
        }
    }
}

/// Declares and defines the trampoline for `def`, which was declared as
/// `target`.
pub fn define_trampoline(
    jit_module: &mut JITModule,
    isa: &dyn TargetIsa,
    def: &FunctionDef,
    target: FuncId,
    index: usize,
) -> Result<FuncId, NativeError> {
    let pointer_type = isa.pointer_type();
    let mut sig = Signature::new(isa.default_call_conv());
    sig.params.push(AbiParam::new(pointer_type));
    sig.params.push(AbiParam::new(pointer_type));

    let name = format!("__kiln_trampoline_{index}");
    let func_id = jit_module
        .declare_function(&name, Linkage::Local, &sig)
        .map_err(|e| NativeError::FunctionDeclarationError(format!("{name}: {e}")))?;

    let mut func_builder_ctx = FunctionBuilderContext::new();
    let mut func = Function::with_name_signature(UserFuncName::user(0, func_id.as_u32()), sig);
    {
        let mut builder = FunctionBuilder::new(&mut func, &mut func_builder_ctx);
        let entry_block = builder.create_block();
        builder.append_block_params_for_function_params(entry_block);
        builder.switch_to_block(entry_block);
        builder.seal_block(entry_block);
        let (args, ret) = {
            let params = builder.block_params(entry_block);
            (params[0], params[1])
        };

        let mut values = Vec::with_capacity(def.params.len());
        for (i, param) in def.params.iter().enumerate() {
            let ty = value_type(&param.ty, isa)?;
            let offset = i32::try_from(i * SLOT_SIZE)
                .map_err(|_| NativeError::CompilationError(format!("too many parameters in '{}'", def.name)))?;
            values.push(builder.ins().load(ty, MemFlags::trusted(), args, offset));
        }

        let callee = jit_module.declare_func_in_func(target, builder.func);
        let call = builder.ins().call(callee, &values);
        if translate_type(&def.ret, isa)?.is_some() {
            let result = builder.inst_results(call)[0];
            builder.ins().store(MemFlags::trusted(), result, ret, 0);
        }
        builder.ins().return_(&[]);
        builder.finalize();
    }

    let mut ctx = jit_module.make_context();
    ctx.func = func;
    jit_module.define_function(func_id, &mut ctx)?;
    jit_module.clear_context(&mut ctx);
    Ok(func_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_values_keep_their_width() {
        let slot = Slot::encode(0x1_ff, 1);
        assert_eq!(slot.decode(1), 0xff);

        let slot = Slot::encode(u128::MAX, 4);
        assert_eq!(slot.decode(4), 0xffff_ffff);
    }

    #[test]
    fn wide_values_fill_the_slot() {
        let value = (7u128 << 64) | 9;
        assert_eq!(Slot::encode(value, 16).decode(16), value);
        assert_eq!(Slot::encode(value, 8).decode(8), 9);
    }

    #[test]
    fn slots_are_aligned_for_any_scalar() {
        assert_eq!(std::mem::align_of::<Slot>(), 16);
        assert_eq!(std::mem::size_of::<Slot>(), SLOT_SIZE);
    }
}
