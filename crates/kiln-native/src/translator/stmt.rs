use crate::translator::context::{is_terminated, switch_to_unreachable, LoopTargets, TranslationContext};
use crate::translator::expr::{branch_condition, translate_expr, translate_value};
use crate::NativeError;
use cranelift_codegen::ir::InstBuilder;
use cranelift_frontend::FunctionBuilder;
use cranelift_jit::JITModule;
use kiln_ir::{Expr, Stmt};

pub fn translate_stmts(
    builder: &mut FunctionBuilder,
    ctx: &mut TranslationContext,
    jit_module: &mut JITModule,
    stmts: &[Stmt],
) -> Result<(), NativeError> {
    for stmt in stmts {
        translate_stmt(builder, ctx, jit_module, stmt)?;
    }
    Ok(())
}

fn translate_stmt(
    builder: &mut FunctionBuilder,
    ctx: &mut TranslationContext,
    jit_module: &mut JITModule,
    stmt: &Stmt,
) -> Result<(), NativeError> {
    match stmt {
        Stmt::Expr(expr) => {
            translate_expr(builder, ctx, jit_module, expr)?;
        }
        Stmt::Return(value) => {
            match value {
                Some(expr) if !ctx.def.ret.is_void() => {
                    let value = translate_value(builder, ctx, jit_module, expr)?;
                    builder.ins().return_(&[value]);
                }
                Some(expr) => {
                    translate_expr(builder, ctx, jit_module, expr)?;
                    builder.ins().return_(&[]);
                }
                None => {
                    builder.ins().return_(&[]);
                }
            }
            switch_to_unreachable(builder);
        }
        Stmt::If { cond, then, otherwise } => translate_if(builder, ctx, jit_module, cond, then, otherwise)?,
        Stmt::Loop {
            cond,
            body,
            step,
            test_first,
        } => translate_loop(builder, ctx, jit_module, cond.as_ref(), body, step.as_ref(), *test_first)?,
        Stmt::Break => {
            let targets = ctx.innermost_loop()?;
            builder.ins().jump(targets.exit_block, &[]);
            switch_to_unreachable(builder);
        }
        Stmt::Continue => {
            let targets = ctx.innermost_loop()?;
            builder.ins().jump(targets.continue_block, &[]);
            switch_to_unreachable(builder);
        }
        Stmt::Block(stmts) => translate_stmts(builder, ctx, jit_module, stmts)?,
    }
    Ok(())
}

fn translate_if(
    builder: &mut FunctionBuilder,
    ctx: &mut TranslationContext,
    jit_module: &mut JITModule,
    cond: &Expr,
    then: &[Stmt],
    otherwise: &[Stmt],
) -> Result<(), NativeError> {
    let cond = translate_value(builder, ctx, jit_module, cond)?;
    let cond = branch_condition(builder, cond);

    let then_block = builder.create_block();
    let else_block = builder.create_block();
    let merge_block = builder.create_block();
    builder.ins().brif(cond, then_block, &[], else_block, &[]);

    for (block, stmts) in [(then_block, then), (else_block, otherwise)] {
        builder.switch_to_block(block);
        builder.seal_block(block);
        translate_stmts(builder, ctx, jit_module, stmts)?;
        if !is_terminated(builder) {
            builder.ins().jump(merge_block, &[]);
        }
    }

    builder.switch_to_block(merge_block);
    builder.seal_block(merge_block);
    Ok(())
}

/// Layout:
///
/// ```text
/// header:  brif cond, body, exit      (jump body when there is no cond)
/// body:    ...; jump step
/// step:    step expr; jump header
/// exit:
/// ```
///
/// `do`/`while` loops enter at `body` instead of `header`.
fn translate_loop(
    builder: &mut FunctionBuilder,
    ctx: &mut TranslationContext,
    jit_module: &mut JITModule,
    cond: Option<&Expr>,
    body: &[Stmt],
    step: Option<&Expr>,
    test_first: bool,
) -> Result<(), NativeError> {
    let header_block = builder.create_block();
    let body_block = builder.create_block();
    let step_block = builder.create_block();
    let exit_block = builder.create_block();

    builder
        .ins()
        .jump(if test_first { header_block } else { body_block }, &[]);

    builder.switch_to_block(header_block);
    match cond {
        Some(cond) => {
            let cond = translate_value(builder, ctx, jit_module, cond)?;
            let cond = branch_condition(builder, cond);
            builder.ins().brif(cond, body_block, &[], exit_block, &[]);
        }
        None => {
            builder.ins().jump(body_block, &[]);
        }
    }

    builder.switch_to_block(body_block);
    builder.seal_block(body_block);
    ctx.push_loop(LoopTargets {
        continue_block: step_block,
        exit_block,
    });
    let translated = translate_stmts(builder, ctx, jit_module, body);
    ctx.pop_loop();
    translated?;
    if !is_terminated(builder) {
        builder.ins().jump(step_block, &[]);
    }

    builder.switch_to_block(step_block);
    builder.seal_block(step_block);
    if let Some(step) = step {
        translate_expr(builder, ctx, jit_module, step)?;
    }
    builder.ins().jump(header_block, &[]);
    builder.seal_block(header_block);

    builder.switch_to_block(exit_block);
    builder.seal_block(exit_block);
    Ok(())
}
