use crate::session::{FunctionId, ModuleId};
use kiln_native::NativeError;
use thiserror::Error;

/// Errors reported by an execution engine or one of its contexts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("cannot create execution engine: {0}")]
    Unavailable(String),

    #[error("native call failed: {0}")]
    CallFailed(String),

    #[error("execution context has been released")]
    Released,
}

impl From<NativeError> for EngineError {
    fn from(err: NativeError) -> Self {
        match err {
            NativeError::Released => EngineError::Released,
            NativeError::UnknownFunction(_) | NativeError::ArgumentCount { .. } => {
                EngineError::CallFailed(err.to_string())
            }
            other => EngineError::Unavailable(other.to_string()),
        }
    }
}

/// Request errors of the [`Session`](crate::Session). Source problems are
/// never reported this way; they end up in the module's diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("unsupported compiler flag '{0}'")]
    UnsupportedFlag(String),

    #[error("module {0} has been disposed")]
    StaleModule(ModuleId),

    #[error("module {module} has no function #{index}")]
    UnknownFunction { module: ModuleId, index: usize },
}

/// Why an invocation did not produce a result.
///
/// Validation errors are raised before any native code runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    #[error("function handle {0} refers to a disposed module")]
    StaleHandle(FunctionId),

    #[error("module {module} has no usable execution engine: {reason}")]
    EngineUnavailable { module: ModuleId, reason: String },

    #[error("'{function}' expects {expected} argument(s) but {actual} were given")]
    ArgumentCount {
        function: String,
        expected: usize,
        actual: usize,
    },

    #[error("argument {position} of '{function}': {message}")]
    UnsupportedArgument {
        function: String,
        position: usize,
        message: String,
    },

    #[error("argument {position} of '{function}': expected {expected} but got {actual}")]
    TypeMismatch {
        function: String,
        position: usize,
        expected: String,
        actual: String,
    },

    #[error("'{function}' returns '{ty}', which has no managed representation")]
    UnsupportedReturn { function: String, ty: String },

    #[error("exception raised during native call: {0}")]
    PendingException(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
