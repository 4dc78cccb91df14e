use crate::translator::context::TranslationContext;
use crate::translator::helpers::int_const;
use crate::translator::types::value_type;
use crate::NativeError;
use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{types, InstBuilder, Type, Value};
use cranelift_frontend::FunctionBuilder;
use cranelift_jit::JITModule;
use kiln_ir::{BinaryOp, Callee, CompareOp, Expr, ExprKind, IntKind, NativeType, UnaryOp};

/// Translates an expression that may have no value (`void` calls,
/// conversions to `void`, comma expressions ending in either).
pub fn translate_expr(
    builder: &mut FunctionBuilder,
    ctx: &mut TranslationContext,
    jit_module: &mut JITModule,
    expr: &Expr,
) -> Result<Option<Value>, NativeError> {
    match &expr.kind {
        ExprKind::Convert(operand) if expr.ty.is_void() => {
            translate_expr(builder, ctx, jit_module, operand)?;
            Ok(None)
        }
        ExprKind::Call { callee, args } => translate_call(builder, ctx, jit_module, callee, args),
        ExprKind::Comma(lhs, rhs) => {
            translate_expr(builder, ctx, jit_module, lhs)?;
            translate_expr(builder, ctx, jit_module, rhs)
        }
        ExprKind::Conditional { cond, then, otherwise } if expr.ty.is_void() => {
            translate_conditional(builder, ctx, jit_module, cond, then, otherwise, None)
        }
        _ => translate_value(builder, ctx, jit_module, expr).map(Some),
    }
}

/// Translates an expression that must produce a value.
pub fn translate_value(
    builder: &mut FunctionBuilder,
    ctx: &mut TranslationContext,
    jit_module: &mut JITModule,
    expr: &Expr,
) -> Result<Value, NativeError> {
    match &expr.kind {
        ExprKind::IntConst(value) => {
            let ty = value_type(&expr.ty, ctx.isa)?;
            Ok(int_const(builder, ty, *value))
        }
        ExprKind::Null => Ok(builder.ins().iconst(ctx.pointer_type(), 0)),
        ExprKind::Local(local) => {
            let (var, _) = ctx.variable(*local)?;
            Ok(builder.use_var(var))
        }
        ExprKind::Assign { local, value } => {
            let (var, _) = ctx.variable(*local)?;
            let value = translate_value(builder, ctx, jit_module, value)?;
            builder.def_var(var, value);
            Ok(value)
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let lhs = translate_value(builder, ctx, jit_module, lhs)?;
            let rhs = translate_value(builder, ctx, jit_module, rhs)?;
            Ok(translate_binary(builder, *op, lhs, rhs, is_signed(&expr.ty)))
        }
        ExprKind::Compare { op, lhs, rhs } => {
            let signed = is_signed(&lhs.ty);
            let lhs = translate_value(builder, ctx, jit_module, lhs)?;
            let rhs = translate_value(builder, ctx, jit_module, rhs)?;
            let flag = builder.ins().icmp(int_cc(*op, signed), lhs, rhs);
            let ty = value_type(&expr.ty, ctx.isa)?;
            Ok(widen_flag(builder, flag, ty))
        }
        ExprKind::Unary { op, operand } => {
            let value = translate_value(builder, ctx, jit_module, operand)?;
            Ok(match op {
                UnaryOp::Neg => builder.ins().ineg(value),
                UnaryOp::BitNot => builder.ins().bnot(value),
                UnaryOp::Not => {
                    let operand_ty = builder.func.dfg.value_type(value);
                    let zero = int_const(builder, operand_ty, 0);
                    let flag = builder.ins().icmp(IntCC::Equal, value, zero);
                    let ty = value_type(&expr.ty, ctx.isa)?;
                    widen_flag(builder, flag, ty)
                }
            })
        }
        ExprKind::LogicalAnd(lhs, rhs) => translate_logical(builder, ctx, jit_module, true, lhs, rhs, &expr.ty),
        ExprKind::LogicalOr(lhs, rhs) => translate_logical(builder, ctx, jit_module, false, lhs, rhs, &expr.ty),
        ExprKind::Conditional { cond, then, otherwise } => {
            let ty = value_type(&expr.ty, ctx.isa)?;
            translate_conditional(builder, ctx, jit_module, cond, then, otherwise, Some(ty))?
                .ok_or_else(|| NativeError::TypeError("conditional produced no value".to_string()))
        }
        ExprKind::Convert(operand) => {
            let value = translate_value(builder, ctx, jit_module, operand)?;
            convert(builder, ctx, value, &operand.ty, &expr.ty)
        }
        ExprKind::Call { callee, args } => translate_call(builder, ctx, jit_module, callee, args)?
            .ok_or_else(|| NativeError::TypeError("call to a void function used as a value".to_string())),
        ExprKind::FunctionAddress(index) => {
            let func_ref = ctx.callee(builder, jit_module, *index)?;
            Ok(builder.ins().func_addr(ctx.pointer_type(), func_ref))
        }
        ExprKind::Comma(lhs, rhs) => {
            translate_expr(builder, ctx, jit_module, lhs)?;
            translate_value(builder, ctx, jit_module, rhs)
        }
        ExprKind::Update { local, delta, post } => {
            let (var, ty) = ctx.variable(*local)?;
            let old = builder.use_var(var);
            let step = int_const(builder, ty, i128::from(*delta));
            let mut new = builder.ins().iadd(old, step);
            if ctx.local_type(*local)? == &NativeType::Int(IntKind::Bool) {
                new = truth(builder, new);
            }
            builder.def_var(var, new);
            Ok(if *post { old } else { new })
        }
    }
}

fn translate_call(
    builder: &mut FunctionBuilder,
    ctx: &mut TranslationContext,
    jit_module: &mut JITModule,
    callee: &Callee,
    args: &[Expr],
) -> Result<Option<Value>, NativeError> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(translate_value(builder, ctx, jit_module, arg)?);
    }
    let func_ref = match callee {
        Callee::Function(index) => ctx.callee(builder, jit_module, *index)?,
        Callee::Builtin(builtin) => ctx.builtin(builder, jit_module, *builtin)?,
    };
    let call = builder.ins().call(func_ref, &values);
    Ok(builder.inst_results(call).first().copied())
}

/// Integer division and remainder never trap: dividing by zero yields
/// zero, and `MIN / -1` wraps to `MIN` with a remainder of zero.
fn translate_binary(builder: &mut FunctionBuilder, op: BinaryOp, lhs: Value, rhs: Value, signed: bool) -> Value {
    match op {
        BinaryOp::Add => builder.ins().iadd(lhs, rhs),
        BinaryOp::Sub => builder.ins().isub(lhs, rhs),
        BinaryOp::Mul => builder.ins().imul(lhs, rhs),
        BinaryOp::Div | BinaryOp::Rem => guarded_division(builder, op == BinaryOp::Div, lhs, rhs, signed),
        BinaryOp::Shl => builder.ins().ishl(lhs, rhs),
        BinaryOp::Shr if signed => builder.ins().sshr(lhs, rhs),
        BinaryOp::Shr => builder.ins().ushr(lhs, rhs),
        BinaryOp::BitAnd => builder.ins().band(lhs, rhs),
        BinaryOp::BitOr => builder.ins().bor(lhs, rhs),
        BinaryOp::BitXor => builder.ins().bxor(lhs, rhs),
    }
}

fn guarded_division(builder: &mut FunctionBuilder, quotient: bool, lhs: Value, rhs: Value, signed: bool) -> Value {
    let ty = builder.func.dfg.value_type(lhs);
    let zero = int_const(builder, ty, 0);
    let one = int_const(builder, ty, 1);
    let by_zero = builder.ins().icmp(IntCC::Equal, rhs, zero);
    if !signed {
        let divisor = builder.ins().select(by_zero, one, rhs);
        let raw = if quotient {
            builder.ins().udiv(lhs, divisor)
        } else {
            builder.ins().urem(lhs, divisor)
        };
        return builder.ins().select(by_zero, zero, raw);
    }
    let minus_one = int_const(builder, ty, -1);
    let by_minus_one = builder.ins().icmp(IntCC::Equal, rhs, minus_one);
    let trapping = builder.ins().bor(by_zero, by_minus_one);
    let divisor = builder.ins().select(trapping, one, rhs);
    let (raw, negated) = if quotient {
        (builder.ins().sdiv(lhs, divisor), builder.ins().ineg(lhs))
    } else {
        (builder.ins().srem(lhs, divisor), zero)
    };
    let result = builder.ins().select(by_minus_one, negated, raw);
    builder.ins().select(by_zero, zero, result)
}

fn translate_logical(
    builder: &mut FunctionBuilder,
    ctx: &mut TranslationContext,
    jit_module: &mut JITModule,
    is_and: bool,
    lhs: &Expr,
    rhs: &Expr,
    result: &NativeType,
) -> Result<Value, NativeError> {
    let ty = value_type(result, ctx.isa)?;
    let lhs = translate_value(builder, ctx, jit_module, lhs)?;
    let lhs = truth(builder, lhs);

    let rhs_block = builder.create_block();
    let merge_block = builder.create_block();
    builder.append_block_param(merge_block, ty);

    let short_circuit = int_const(builder, ty, if is_and { 0 } else { 1 });
    if is_and {
        builder.ins().brif(lhs, rhs_block, &[], merge_block, &[short_circuit]);
    } else {
        builder.ins().brif(lhs, merge_block, &[short_circuit], rhs_block, &[]);
    }

    builder.switch_to_block(rhs_block);
    builder.seal_block(rhs_block);
    let rhs = translate_value(builder, ctx, jit_module, rhs)?;
    let rhs = truth(builder, rhs);
    let rhs = widen_flag(builder, rhs, ty);
    builder.ins().jump(merge_block, &[rhs]);

    builder.switch_to_block(merge_block);
    builder.seal_block(merge_block);
    Ok(builder.block_params(merge_block)[0])
}

fn translate_conditional(
    builder: &mut FunctionBuilder,
    ctx: &mut TranslationContext,
    jit_module: &mut JITModule,
    cond: &Expr,
    then: &Expr,
    otherwise: &Expr,
    ty: Option<Type>,
) -> Result<Option<Value>, NativeError> {
    let cond = translate_value(builder, ctx, jit_module, cond)?;
    let cond = branch_condition(builder, cond);

    let then_block = builder.create_block();
    let else_block = builder.create_block();
    let merge_block = builder.create_block();
    if let Some(ty) = ty {
        builder.append_block_param(merge_block, ty);
    }
    builder.ins().brif(cond, then_block, &[], else_block, &[]);

    for (block, arm) in [(then_block, then), (else_block, otherwise)] {
        builder.switch_to_block(block);
        builder.seal_block(block);
        let value = translate_expr(builder, ctx, jit_module, arm)?;
        match (ty, value) {
            (Some(_), Some(value)) => builder.ins().jump(merge_block, &[value]),
            (Some(_), None) => {
                return Err(NativeError::TypeError("conditional arm produced no value".to_string()))
            }
            (None, _) => builder.ins().jump(merge_block, &[]),
        };
    }

    builder.switch_to_block(merge_block);
    builder.seal_block(merge_block);
    Ok(ty.map(|_| builder.block_params(merge_block)[0]))
}

/// Converts between native types. Conversions to `bool` test for nonzero;
/// other integer and pointer conversions extend or truncate by the source
/// type's signedness.
pub fn convert(
    builder: &mut FunctionBuilder,
    ctx: &TranslationContext,
    value: Value,
    from: &NativeType,
    to: &NativeType,
) -> Result<Value, NativeError> {
    let to_ty = value_type(to, ctx.isa)?;
    let from_ty = builder.func.dfg.value_type(value);
    if *to == NativeType::Int(IntKind::Bool) && *from != NativeType::Int(IntKind::Bool) {
        return Ok(truth(builder, value));
    }
    match (from.is_float(), to.is_float()) {
        (false, false) => Ok(resize_int(builder, value, from_ty, to_ty, is_signed(from))),
        (true, true) if from_ty == to_ty => Ok(value),
        (true, true) if to_ty == types::F64 => Ok(builder.ins().fpromote(to_ty, value)),
        (true, true) => Ok(builder.ins().fdemote(to_ty, value)),
        _ => Err(NativeError::Unimplemented(format!(
            "conversion from '{from}' to '{to}'"
        ))),
    }
}

fn resize_int(builder: &mut FunctionBuilder, value: Value, from: Type, to: Type, signed: bool) -> Value {
    if from == to {
        value
    } else if from.bits() < to.bits() {
        if signed {
            builder.ins().sextend(to, value)
        } else {
            builder.ins().uextend(to, value)
        }
    } else {
        builder.ins().ireduce(to, value)
    }
}

/// `1` if the value is nonzero, else `0`, as an `i8`.
pub fn truth(builder: &mut FunctionBuilder, value: Value) -> Value {
    let ty = builder.func.dfg.value_type(value);
    let zero = int_const(builder, ty, 0);
    builder.ins().icmp(IntCC::NotEqual, value, zero)
}

/// A value `brif` can branch on.
pub fn branch_condition(builder: &mut FunctionBuilder, value: Value) -> Value {
    if builder.func.dfg.value_type(value) == types::I128 {
        truth(builder, value)
    } else {
        value
    }
}

fn widen_flag(builder: &mut FunctionBuilder, flag: Value, ty: Type) -> Value {
    if ty == types::I8 {
        flag
    } else {
        builder.ins().uextend(ty, flag)
    }
}

fn is_signed(ty: &NativeType) -> bool {
    ty.int_kind().map_or(false, IntKind::is_signed)
}

fn int_cc(op: CompareOp, signed: bool) -> IntCC {
    match (op, signed) {
        (CompareOp::Eq, _) => IntCC::Equal,
        (CompareOp::Ne, _) => IntCC::NotEqual,
        (CompareOp::Lt, true) => IntCC::SignedLessThan,
        (CompareOp::Le, true) => IntCC::SignedLessThanOrEqual,
        (CompareOp::Gt, true) => IntCC::SignedGreaterThan,
        (CompareOp::Ge, true) => IntCC::SignedGreaterThanOrEqual,
        (CompareOp::Lt, false) => IntCC::UnsignedLessThan,
        (CompareOp::Le, false) => IntCC::UnsignedLessThanOrEqual,
        (CompareOp::Gt, false) => IntCC::UnsignedGreaterThan,
        (CompareOp::Ge, false) => IntCC::UnsignedGreaterThanOrEqual,
    }
}
