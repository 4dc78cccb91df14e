use crate::translator::helpers::{declare_builtin_fn, zero};
use crate::translator::types::value_type;
use crate::NativeError;
use cranelift_codegen::entity::EntityRef;
use cranelift_codegen::ir::{Block, FuncRef, Type};
use cranelift_codegen::isa::TargetIsa;
use cranelift_frontend::{FunctionBuilder, Variable};
use cranelift_jit::JITModule;
use cranelift_module::{FuncId, Module};
use kiln_ir::{Builtin, FunctionDef, FunctionIndex, LocalId, NativeType};
use rustc_hash::FxHashMap;

/// Where `break` and `continue` jump inside the innermost loop.
#[derive(Debug, Clone, Copy)]
pub struct LoopTargets {
    pub continue_block: Block,
    pub exit_block: Block,
}

/// State kept while translating one function body.
///
/// Tracks:
/// - the Cranelift variable behind every local slot
/// - the loops enclosing the current statement
/// - callee and builtin references already imported into this function
pub struct TranslationContext<'ctx> {
    pub def: &'ctx FunctionDef,
    pub isa: &'ctx dyn TargetIsa,
    function_ids: &'ctx [FuncId],
    variables: Vec<(Variable, Type)>,
    loops: Vec<LoopTargets>,
    callees: FxHashMap<FunctionIndex, FuncRef>,
    builtins: FxHashMap<Builtin, FuncRef>,
}

impl<'ctx> TranslationContext<'ctx> {
    pub fn new(def: &'ctx FunctionDef, function_ids: &'ctx [FuncId], isa: &'ctx dyn TargetIsa) -> Self {
        Self {
            def,
            isa,
            function_ids,
            variables: Vec::new(),
            loops: Vec::new(),
            callees: FxHashMap::default(),
            builtins: FxHashMap::default(),
        }
    }

    pub fn pointer_type(&self) -> Type {
        self.isa.pointer_type()
    }

    /// Declares one variable per local slot. Parameters are bound to the
    /// entry block's parameters, every other local starts at zero.
    pub fn declare_locals(&mut self, builder: &mut FunctionBuilder, entry: Block) -> Result<(), NativeError> {
        let params = builder.block_params(entry).to_vec();
        for (index, local) in self.def.locals.iter().enumerate() {
            let ty = value_type(&local.ty, self.isa)?;
            let var = Variable::new(index);
            builder.declare_var(var, ty);
            let initial = match params.get(index) {
                Some(param) => *param,
                None => zero(builder, ty),
            };
            builder.def_var(var, initial);
            self.variables.push((var, ty));
        }
        Ok(())
    }

    pub fn variable(&self, local: LocalId) -> Result<(Variable, Type), NativeError> {
        self.variables.get(local.index()).copied().ok_or_else(|| {
            NativeError::CompilationError(format!(
                "local #{} is not declared in '{}'",
                local.0, self.def.name
            ))
        })
    }

    pub fn local_type(&self, local: LocalId) -> Result<&'ctx NativeType, NativeError> {
        self.def.local_type(local).ok_or_else(|| {
            NativeError::CompilationError(format!(
                "local #{} is not declared in '{}'",
                local.0, self.def.name
            ))
        })
    }

    pub fn push_loop(&mut self, targets: LoopTargets) {
        self.loops.push(targets);
    }

    pub fn pop_loop(&mut self) {
        self.loops.pop();
    }

    pub fn innermost_loop(&self) -> Result<LoopTargets, NativeError> {
        self.loops
            .last()
            .copied()
            .ok_or_else(|| NativeError::CompilationError("'break' or 'continue' outside a loop".to_string()))
    }

    /// Reference to another compiled function, imported on first use.
    pub fn callee(
        &mut self,
        builder: &mut FunctionBuilder,
        jit_module: &mut JITModule,
        index: FunctionIndex,
    ) -> Result<FuncRef, NativeError> {
        if let Some(func_ref) = self.callees.get(&index) {
            return Ok(*func_ref);
        }
        let func_id = *self
            .function_ids
            .get(index)
            .ok_or_else(|| NativeError::CompilationError(format!("no function at index {index}")))?;
        let func_ref = jit_module.declare_func_in_func(func_id, builder.func);
        self.callees.insert(index, func_ref);
        Ok(func_ref)
    }

    /// Reference to a builtin's host implementation, imported on first use.
    pub fn builtin(
        &mut self,
        builder: &mut FunctionBuilder,
        jit_module: &mut JITModule,
        builtin: Builtin,
    ) -> Result<FuncRef, NativeError> {
        if let Some(func_ref) = self.builtins.get(&builtin) {
            return Ok(*func_ref);
        }
        let func_ref = declare_builtin_fn(jit_module, builder.func, builtin, self.isa)?;
        self.builtins.insert(builtin, func_ref);
        Ok(func_ref)
    }
}

/// Whether the block the builder is positioned in already ends in a
/// terminator.
pub fn is_terminated(builder: &FunctionBuilder) -> bool {
    match builder.current_block() {
        Some(block) => builder
            .func
            .layout
            .last_inst(block)
            .map_or(false, |inst| builder.func.dfg.insts[inst].opcode().is_terminator()),
        None => true,
    }
}

/// Continues in a fresh block with no predecessors. Code following a
/// `return`, `break` or `continue` lands here and is never executed.
pub fn switch_to_unreachable(builder: &mut FunctionBuilder) {
    let block = builder.create_block();
    builder.switch_to_block(block);
    builder.seal_block(block);
}

