use crate::catalog::FunctionHandle;
use crate::engine::{CompilerFrontend, CraneliftEngine, ExecutionEngine, SyntaxFrontend};
use crate::module::CompiledModule;
use crate::SessionError;
use kiln_source::KilnConfig;
use slab::Slab;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Flags that ask for output the JIT cannot produce.
const UNSUPPORTED_FLAGS: &[&str] = &["-g", "-pg"];

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Identifies a module within a [`Session`].
///
/// Slab slots are reused, so every module also gets a fresh generation; an
/// id whose generation no longer matches is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId {
    pub index: usize,
    pub generation: u64,
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId {
    pub module: ModuleId,
    pub index: usize,
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/fn#{}", self.module, self.index)
    }
}

#[derive(Debug)]
struct ModuleSlot {
    generation: u64,
    module: CompiledModule,
}

/// Owns every compiled module and the collaborators that produce them.
pub struct Session {
    modules: Slab<ModuleSlot>,
    config: KilnConfig,
    frontend: Box<dyn CompilerFrontend>,
    engine: Box<dyn ExecutionEngine>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("modules", &self.modules.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_config(KilnConfig::default())
    }

    /// A session compiling with `kiln-syntax` and Cranelift.
    pub fn with_config(config: KilnConfig) -> Self {
        let engine = CraneliftEngine::new(config.compile.opt_level);
        Self::with_collaborators(config, Box::new(SyntaxFrontend), Box::new(engine))
    }

    pub fn with_collaborators(
        config: KilnConfig,
        frontend: Box<dyn CompilerFrontend>,
        engine: Box<dyn ExecutionEngine>,
    ) -> Self {
        Self {
            modules: Slab::new(),
            config,
            frontend,
            engine,
        }
    }

    pub fn config(&self) -> &KilnConfig {
        &self.config
    }

    /// Compiles `source` into a new module.
    ///
    /// Source errors do not fail the call; they are recorded in the module's
    /// diagnostics and leave it without functions. Only malformed requests
    /// are errors.
    pub fn compile<S: AsRef<str>>(
        &mut self,
        file_name: Option<&str>,
        source: &str,
        flags: &[S],
    ) -> Result<ModuleId, SessionError> {
        let flags: Vec<String> = flags.iter().map(|flag| flag.as_ref().to_string()).collect();
        if let Some(flag) = flags.iter().find(|flag| UNSUPPORTED_FLAGS.contains(&flag.trim())) {
            return Err(SessionError::UnsupportedFlag(flag.trim().to_string()));
        }
        let file_name = file_name.unwrap_or(self.config.compile.file_name.as_str()).to_string();

        let id = ModuleId {
            index: self.modules.vacant_key(),
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        };
        log::debug!("compiling {file_name} as {id} with flags {flags:?}");
        let module = CompiledModule::build(
            id,
            &file_name,
            source,
            flags,
            self.frontend.as_ref(),
            self.engine.as_ref(),
            &self.config,
        );
        let index = self.modules.insert(ModuleSlot {
            generation: id.generation,
            module,
        });
        debug_assert_eq!(index, id.index);
        Ok(id)
    }

    /// Like [`Session::compile`], with the configured default flags in
    /// front of `flags` and the configured file name.
    pub fn compile_with_defaults<S: AsRef<str>>(&mut self, source: &str, flags: &[S]) -> Result<ModuleId, SessionError> {
        let all: Vec<String> = self
            .config
            .compile
            .flags
            .iter()
            .cloned()
            .chain(flags.iter().map(|flag| flag.as_ref().to_string()))
            .collect();
        self.compile(None, source, &all)
    }

    pub fn module(&self, id: ModuleId) -> Result<&CompiledModule, SessionError> {
        match self.modules.get(id.index) {
            Some(slot) if slot.generation == id.generation => Ok(&slot.module),
            _ => Err(SessionError::StaleModule(id)),
        }
    }

    pub fn functions(&self, id: ModuleId) -> Result<&[FunctionHandle], SessionError> {
        Ok(self.module(id)?.functions())
    }

    pub fn function(&self, id: FunctionId) -> Result<&FunctionHandle, SessionError> {
        self.module(id.module)?
            .function(id.index)
            .ok_or(SessionError::UnknownFunction {
                module: id.module,
                index: id.index,
            })
    }

    pub fn function_by_name(&self, id: ModuleId, name: &str) -> Result<Option<FunctionId>, SessionError> {
        Ok(self.module(id)?.function_by_name(name).map(FunctionHandle::id))
    }

    pub fn find_similar(&self, id: ModuleId, simple_name: &str) -> Result<Option<&str>, SessionError> {
        Ok(self.module(id)?.find_similar(simple_name))
    }

    /// Releases a module's native code. Its ids are stale afterwards.
    pub fn dispose(&mut self, id: ModuleId) -> Result<(), SessionError> {
        match self.modules.get(id.index) {
            Some(slot) if slot.generation == id.generation => {}
            _ => return Err(SessionError::StaleModule(id)),
        }
        let mut slot = self.modules.remove(id.index);
        slot.module.release();
        log::debug!("disposed {id}");
        Ok(())
    }

    /// Number of live modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
