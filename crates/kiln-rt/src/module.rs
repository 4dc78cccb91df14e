use crate::catalog::{self, FunctionHandle};
use crate::engine::{CompilerFrontend, ExecutionContext, ExecutionEngine};
use crate::session::ModuleId;
use crate::{EngineError, InvokeError};
use kiln_source::{Diagnostic, Diagnostics, KilnConfig, SourceFile};
use rustc_hash::FxHashMap;
use std::fmt;

/// Whether a module can run its functions.
pub enum ExecutionState {
    Ready(Box<dyn ExecutionContext>),
    /// The source compiled but no native code could be produced.
    Unusable { reason: String },
    /// The source did not compile.
    Empty,
}

impl fmt::Debug for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionState::Ready(_) => f.write_str("Ready"),
            ExecutionState::Unusable { reason } => f.debug_struct("Unusable").field("reason", reason).finish(),
            ExecutionState::Empty => f.write_str("Empty"),
        }
    }
}

/// One compilation: its diagnostics, its functions and the loaded code.
#[derive(Debug)]
pub struct CompiledModule {
    id: ModuleId,
    file_name: String,
    source: String,
    flags: Vec<String>,
    diagnostics: Diagnostics,
    rendered: String,
    functions: Vec<FunctionHandle>,
    by_name: FxHashMap<String, usize>,
    state: ExecutionState,
}

impl CompiledModule {
    pub(crate) fn build(
        id: ModuleId,
        file_name: &str,
        source: &str,
        flags: Vec<String>,
        frontend: &dyn CompilerFrontend,
        engine: &dyn ExecutionEngine,
        config: &KilnConfig,
    ) -> CompiledModule {
        let output = frontend.compile_to_unit(file_name, source, &flags);
        let mut diagnostics = output.diagnostics;

        let (functions, state) = match output.unit {
            None => (Vec::new(), ExecutionState::Empty),
            Some(mut unit) => {
                if unit.opt_level.is_none() {
                    unit.opt_level = Some(config.compile.opt_level);
                }
                match engine.prepare(&unit) {
                    Ok(context) => {
                        let natives = context.functions();
                        (catalog::build(id, &unit, natives), ExecutionState::Ready(context))
                    }
                    Err(err) => {
                        let reason = match err {
                            EngineError::Unavailable(reason) => reason,
                            other => other.to_string(),
                        };
                        log::warn!("{file_name}: cannot create execution engine: {reason}");
                        diagnostics.push(Diagnostic::warning(format!("cannot create execution engine: {reason}")));
                        (catalog::build(id, &unit, Vec::new()), ExecutionState::Unusable { reason })
                    }
                }
            }
        };

        let rendered = diagnostics.render(&SourceFile::new(file_name, source));
        let by_name = functions
            .iter()
            .enumerate()
            .map(|(index, function)| (function.name().to_string(), index))
            .collect();
        log::info!(
            "compiled {file_name} as {id}: {} function(s), {} error(s), {} warning(s)",
            functions.len(),
            diagnostics.error_count(),
            diagnostics.warning_count()
        );

        CompiledModule {
            id,
            file_name: file_name.to_string(),
            source: source.to_string(),
            flags,
            diagnostics,
            rendered,
            functions,
            by_name,
            state,
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }

    /// All diagnostics rendered as `file:line:col: severity: message` lines.
    pub fn diagnostics(&self) -> &str {
        &self.rendered
    }

    pub fn diagnostic_list(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Defined functions in declaration order.
    pub fn functions(&self) -> &[FunctionHandle] {
        &self.functions
    }

    pub fn function(&self, index: usize) -> Option<&FunctionHandle> {
        self.functions.get(index)
    }

    pub fn function_by_name(&self, name: &str) -> Option<&FunctionHandle> {
        self.by_name.get(name).map(|&index| &self.functions[index])
    }

    /// The first decorated name that contains `simple_name`.
    pub fn find_similar(&self, simple_name: &str) -> Option<&str> {
        self.functions
            .iter()
            .map(FunctionHandle::name)
            .find(|name| name.contains(simple_name))
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn is_usable(&self) -> bool {
        matches!(self.state, ExecutionState::Ready(_))
    }

    pub(crate) fn context(&self) -> Result<&dyn ExecutionContext, InvokeError> {
        match &self.state {
            ExecutionState::Ready(context) => Ok(context.as_ref()),
            ExecutionState::Unusable { reason } => Err(InvokeError::EngineUnavailable {
                module: self.id,
                reason: reason.clone(),
            }),
            ExecutionState::Empty => Err(InvokeError::EngineUnavailable {
                module: self.id,
                reason: "the module did not compile".to_string(),
            }),
        }
    }

    pub(crate) fn release(&mut self) {
        if let ExecutionState::Ready(context) = &mut self.state {
            context.release();
        }
        self.state = ExecutionState::Empty;
    }
}

impl fmt::Display for CompiledModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeModule <{}>", self.id)
    }
}
