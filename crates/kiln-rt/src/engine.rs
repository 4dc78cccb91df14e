//! The two collaborators a [`Session`](crate::Session) compiles with.
//!
//! [`SyntaxFrontend`] and [`CraneliftEngine`] are the production
//! implementations; tests substitute their own.

use crate::EngineError;
use kiln_ir::{IntermediateUnit, NativeValue, OpaqueValue};
use kiln_native::{JitEngine, JitProgram};
use kiln_source::{Diagnostics, OptLevel};

/// What the front-end produced for one source file.
#[derive(Debug)]
pub struct FrontendOutput {
    /// `None` when the source had fatal errors.
    pub unit: Option<IntermediateUnit>,
    pub diagnostics: Diagnostics,
}

pub trait CompilerFrontend {
    fn compile_to_unit(&self, file_name: &str, source: &str, flags: &[String]) -> FrontendOutput;
}

/// One function an execution context can call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeFunction {
    pub index: usize,
    pub name: String,
    pub entry: u64,
}

pub trait ExecutionEngine {
    fn prepare(&self, unit: &IntermediateUnit) -> Result<Box<dyn ExecutionContext>, EngineError>;
}

/// Loaded native code for one module.
pub trait ExecutionContext {
    /// Every callable function, in definition order. Empty once released.
    fn functions(&self) -> Vec<NativeFunction>;

    /// Calls `function` synchronously.
    ///
    /// # Safety
    ///
    /// `args` must match the function's parameters, and pointer arguments
    /// must stay valid for the duration of the call.
    unsafe fn call(&self, function: &NativeFunction, args: &[OpaqueValue]) -> Result<NativeValue, EngineError>;

    fn release(&mut self);
}

/// The `kiln-syntax` front-end.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntaxFrontend;

impl CompilerFrontend for SyntaxFrontend {
    fn compile_to_unit(&self, file_name: &str, source: &str, flags: &[String]) -> FrontendOutput {
        match kiln_syntax::compile_to_unit(file_name, source, flags) {
            Ok((unit, diagnostics)) => FrontendOutput {
                unit: Some(unit),
                diagnostics,
            },
            Err(diagnostics) => FrontendOutput { unit: None, diagnostics },
        }
    }
}

/// JIT compiles units with Cranelift for the host machine.
#[derive(Debug, Clone, Copy)]
pub struct CraneliftEngine {
    opt_level: OptLevel,
}

impl CraneliftEngine {
    pub fn new(opt_level: OptLevel) -> Self {
        Self { opt_level }
    }
}

impl ExecutionEngine for CraneliftEngine {
    fn prepare(&self, unit: &IntermediateUnit) -> Result<Box<dyn ExecutionContext>, EngineError> {
        let program = JitEngine::new(self.opt_level)
            .and_then(|engine| engine.prepare(unit))
            .map_err(|err| EngineError::Unavailable(err.to_string()))?;
        Ok(Box::new(JitContext { program }))
    }
}

#[derive(Debug)]
struct JitContext {
    program: JitProgram,
}

impl ExecutionContext for JitContext {
    fn functions(&self) -> Vec<NativeFunction> {
        self.program
            .functions()
            .iter()
            .enumerate()
            .map(|(index, function)| NativeFunction {
                index,
                name: function.name.clone(),
                entry: function.entry as u64,
            })
            .collect()
    }

    unsafe fn call(&self, function: &NativeFunction, args: &[OpaqueValue]) -> Result<NativeValue, EngineError> {
        Ok(self.program.call(function.index, args)?)
    }

    fn release(&mut self) {
        self.program.release();
    }
}
