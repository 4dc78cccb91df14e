use crate::shims;
use crate::trampoline::{define_trampoline, Slot, TrampolineFn};
use crate::translator::func::translate_function_body;
use crate::translator::types::{byte_width, translate_signature};
use crate::NativeError;
use cranelift_codegen::isa::TargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::FunctionBuilderContext;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, FuncId, Linkage, Module};
use kiln_ir::{IntermediateUnit, NativeType, NativeValue, OpaqueValue};
use kiln_source::OptLevel;
use std::fmt;
use std::sync::Arc;

/// A function that has been compiled to machine code.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    /// Decorated name.
    pub name: String,
    /// Entry point with the function's own C signature.
    pub entry: *const u8,
    trampoline: *const u8,
    pub params: Vec<NativeType>,
    pub ret: NativeType,
}

/// Builds host ISAs and turns intermediate units into [`JitProgram`]s.
#[derive(Debug, Clone)]
pub struct JitEngine {
    opt_level: OptLevel,
}

impl JitEngine {
    /// Creates an engine for the host. Fails when Cranelift cannot target
    /// the machine we are running on.
    pub fn new(opt_level: OptLevel) -> Result<Self, NativeError> {
        build_isa(opt_level)?;
        Ok(Self { opt_level })
    }

    /// Optimisation level used for units that do not name their own.
    pub fn opt_level(&self) -> OptLevel {
        self.opt_level
    }

    /// Compiles every function of `unit` and makes it callable.
    pub fn prepare(&self, unit: &IntermediateUnit) -> Result<JitProgram, NativeError> {
        let opt_level = unit.opt_level.unwrap_or(self.opt_level);
        let isa = build_isa(opt_level)?;

        let mut builder = JITBuilder::with_isa(isa.clone(), default_libcall_names());
        for (symbol, address) in shims::symbols() {
            builder.symbol(symbol, address);
        }
        let mut jit_module = JITModule::new(builder);

        match compile_unit(&mut jit_module, unit, isa.as_ref()) {
            Ok(functions) => {
                log::debug!(
                    "{}: {} function(s) ready at opt level {}",
                    unit.file_name,
                    functions.len(),
                    opt_level.as_setting()
                );
                Ok(JitProgram {
                    jit_module: Some(jit_module),
                    functions,
                })
            }
            Err(err) => {
                // SAFETY: nothing from this module has been handed out.
                unsafe { jit_module.free_memory() };
                Err(err)
            }
        }
    }
}

fn build_isa(opt_level: OptLevel) -> Result<Arc<dyn TargetIsa>, NativeError> {
    let mut flag_builder = settings::builder();
    flag_builder.set("is_pic", "false")?;
    // Enable verifier passes in debug builds
    #[cfg(debug_assertions)]
    flag_builder.set("enable_verifier", "true")?;
    flag_builder.set("opt_level", opt_level.as_setting())?;
    let flags = settings::Flags::new(flag_builder);

    let isa_builder = cranelift_native::builder()
        .map_err(|e| NativeError::IsaSetupError(format!("Host target lookup failed: {}", e)))?;
    isa_builder
        .finish(flags)
        .map_err(|e| NativeError::IsaSetupError(format!("ISA construction failed: {}", e)))
}

fn compile_unit(
    jit_module: &mut JITModule,
    unit: &IntermediateUnit,
    isa: &dyn TargetIsa,
) -> Result<Vec<CompiledFunction>, NativeError> {
    // PHASE 1: Declare every function so bodies can refer to later ones.
    let mut function_ids: Vec<FuncId> = Vec::with_capacity(unit.functions.len());
    for def in &unit.functions {
        let sig = translate_signature(def, isa)?;
        let func_id = jit_module
            .declare_function(&def.name, Linkage::Export, &sig)
            .map_err(|e| NativeError::FunctionDeclarationError(format!("{}: {e}", def.name)))?;
        function_ids.push(func_id);
    }

    // PHASE 2: Define bodies.
    let mut func_builder_ctx = FunctionBuilderContext::new();
    for (def, func_id) in unit.functions.iter().zip(&function_ids) {
        let mut ctx = jit_module.make_context();
        ctx.func = translate_function_body(def, *func_id, &function_ids, &mut func_builder_ctx, jit_module, isa)?;
        log::trace!("{}:\n{}", def.name, ctx.func.display());
        jit_module.define_function(*func_id, &mut ctx)?;
        jit_module.clear_context(&mut ctx);
    }

    // PHASE 3: One trampoline per function.
    let mut trampoline_ids = Vec::with_capacity(unit.functions.len());
    for (index, (def, func_id)) in unit.functions.iter().zip(&function_ids).enumerate() {
        trampoline_ids.push(define_trampoline(jit_module, isa, def, *func_id, index)?);
    }

    jit_module.finalize_definitions()?;

    Ok(unit
        .functions
        .iter()
        .zip(function_ids.iter().zip(&trampoline_ids))
        .map(|(def, (func_id, trampoline_id))| CompiledFunction {
            name: def.name.clone(),
            entry: jit_module.get_finalized_function(*func_id),
            trampoline: jit_module.get_finalized_function(*trampoline_id),
            params: def.params.iter().map(|p| p.ty.clone()).collect(),
            ret: def.ret.clone(),
        })
        .collect())
}

/// Machine code for one intermediate unit.
///
/// The code stays mapped until [`JitProgram::release`] or drop. Entry
/// addresses handed out earlier dangle after that.
pub struct JitProgram {
    jit_module: Option<JITModule>,
    functions: Vec<CompiledFunction>,
}

// Manual Debug implementation since JITModule doesn't implement Debug
impl fmt::Debug for JitProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JitProgram")
            .field("functions", &self.functions)
            .field("jit_module", &self.jit_module.as_ref().map(|_| "[JITModule]"))
            .finish()
    }
}

impl JitProgram {
    /// Compiled functions, in the unit's order.
    pub fn functions(&self) -> &[CompiledFunction] {
        if self.jit_module.is_some() {
            &self.functions
        } else {
            &[]
        }
    }

    pub fn function(&self, index: usize) -> Option<&CompiledFunction> {
        self.functions().get(index)
    }

    pub fn find(&self, name: &str) -> Option<(usize, &CompiledFunction)> {
        self.functions().iter().enumerate().find(|(_, f)| f.name == name)
    }

    pub fn is_released(&self) -> bool {
        self.jit_module.is_none()
    }

    /// Calls the function at `index`.
    ///
    /// Each argument is written at the width of the matching parameter.
    ///
    /// # Safety
    ///
    /// The compiled code runs unchecked. Pointer arguments must be valid for
    /// whatever the code does with them; in particular an environment
    /// pointer must point to an [`kiln_ir::EnvironmentFrame`] that outlives
    /// the call.
    pub unsafe fn call(&self, index: usize, args: &[OpaqueValue]) -> Result<NativeValue, NativeError> {
        if self.is_released() {
            return Err(NativeError::Released);
        }
        let function = self.functions.get(index).ok_or(NativeError::UnknownFunction(index))?;
        if args.len() != function.params.len() {
            return Err(NativeError::ArgumentCount {
                name: function.name.clone(),
                expected: function.params.len(),
                actual: args.len(),
            });
        }
        let slots: Vec<Slot> = args
            .iter()
            .zip(&function.params)
            .map(|(arg, ty)| Slot::encode(arg.raw_bits(), byte_width(ty)))
            .collect();
        let mut ret = Slot::default();
        let trampoline: TrampolineFn = std::mem::transmute(function.trampoline);
        trampoline(slots.as_ptr(), &mut ret);
        Ok(decode_return(&ret, &function.ret))
    }

    /// Unmaps the machine code. Safe to call more than once.
    pub fn release(&mut self) {
        if let Some(jit_module) = self.jit_module.take() {
            // SAFETY: `call` refuses to run once the module is gone, and
            // callers were told entry addresses die with the program.
            unsafe { jit_module.free_memory() };
        }
    }
}

impl Drop for JitProgram {
    fn drop(&mut self) {
        self.release();
    }
}

fn decode_return(slot: &Slot, ret: &NativeType) -> NativeValue {
    let width = byte_width(ret);
    match ret {
        NativeType::Void | NativeType::Struct(_) => NativeValue::Void,
        NativeType::Int(kind) => NativeValue::Integer {
            bits: kind.bits(),
            value: slot.decode(width),
        },
        NativeType::Pointer(_) | NativeType::Function => NativeValue::Address(slot.decode(width) as u64),
        NativeType::Float(kind) => NativeValue::Float {
            bits: kind.bits(),
            raw: slot.decode(width) as u64,
        },
    }
}
