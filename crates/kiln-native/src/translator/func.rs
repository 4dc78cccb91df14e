use crate::translator::context::{is_terminated, TranslationContext};
use crate::translator::helpers::zero;
use crate::translator::stmt::translate_stmts;
use crate::translator::types::{translate_signature, translate_type};
use crate::NativeError;
use cranelift_codegen::ir::{Function, InstBuilder, UserFuncName};
use cranelift_codegen::isa::TargetIsa;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::JITModule;
use cranelift_module::FuncId;
use kiln_ir::FunctionDef;

/// Translates one function of an intermediate unit into Cranelift IR.
///
/// `function_ids` holds the declared id of every function in the unit, by
/// index, so calls and address-of can refer to functions defined later.
pub fn translate_function_body(
    def: &FunctionDef,
    func_id: FuncId,
    function_ids: &[FuncId],
    func_builder_ctx: &mut FunctionBuilderContext,
    jit_module: &mut JITModule,
    isa: &dyn TargetIsa,
) -> Result<Function, NativeError> {
    let signature = translate_signature(def, isa)?;
    let mut func = Function::with_name_signature(UserFuncName::user(0, func_id.as_u32()), signature);
    let mut builder = FunctionBuilder::new(&mut func, func_builder_ctx);
    let mut ctx = TranslationContext::new(def, function_ids, isa);

    let entry_block = builder.create_block();
    builder.append_block_params_for_function_params(entry_block);
    builder.switch_to_block(entry_block);
    builder.seal_block(entry_block);
    ctx.declare_locals(&mut builder, entry_block)?;

    translate_stmts(&mut builder, &mut ctx, jit_module, &def.body)?;

    // Falling off the end of a non-void function returns zero.
    if !is_terminated(&builder) {
        match translate_type(&def.ret, isa)? {
            Some(ty) => {
                let value = zero(&mut builder, ty);
                builder.ins().return_(&[value]);
            }
            None => {
                builder.ins().return_(&[]);
            }
        }
    }

    builder.finalize();
    Ok(func)
}
