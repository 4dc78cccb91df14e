use cranelift_codegen::settings::SetError;
use thiserror::Error;

/// Errors that can occur while preparing or calling native code.
#[derive(Error, Debug)]
pub enum NativeError {
    #[error("Failed during Cranelift code generation: {0}")]
    CraneliftGen(#[from] cranelift_codegen::CodegenError),

    #[error("Failed during module processing: {0}")]
    CraneliftModule(#[from] cranelift_module::ModuleError),

    #[error("Unsupported host architecture or features")]
    UnsupportedHost,

    #[error("Failed to configure Cranelift settings: {0}")]
    SettingsError(#[from] SetError),

    #[error("ISA setup failed: {0}")]
    IsaSetupError(String),

    #[error("Function declaration failed in module: {0}")]
    FunctionDeclarationError(String),

    #[error("Function definition failed in module: {0}")]
    CompilationError(String),

    #[error("Feature not yet implemented: {0}")]
    Unimplemented(String),

    #[error("Type error during translation: {0}")]
    TypeError(String),

    #[error("No compiled function at index {0}")]
    UnknownFunction(usize),

    #[error("'{name}' takes {expected} argument(s), {actual} given")]
    ArgumentCount {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Native code has already been released")]
    Released,
}
