//! Cranelift JIT backend: turns an [`kiln_ir::IntermediateUnit`] into
//! callable machine code in the current process.

pub mod backend;
pub mod error;
pub mod shims;
pub mod trampoline;
pub mod translator;

// --- Exports ---
pub use backend::{CompiledFunction, JitEngine, JitProgram};
pub use error::NativeError;
pub use trampoline::Slot;
