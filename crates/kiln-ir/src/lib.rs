//! Shared vocabulary between the Kiln front-end, the execution engine and the
//! invocation bridge.
//!
//! - [`types`]: native C types as the front-end sees them
//! - [`unit`]: the typed intermediate unit the front-end hands to the engine
//! - [`builtins`]: environment functions native code can call back through
//! - [`env`]: the host side of the environment pointer
//! - [`value`]: opaque call values and raw native results

pub mod builtins;
pub mod env;
pub mod types;
pub mod unit;
pub mod value;

pub use builtins::Builtin;
pub use env::{EnvironmentFrame, HostCallbacks};
pub use types::{FloatKind, IntKind, NativeType};
pub use unit::{
    BinaryOp, Callee, CompareOp, Expr, ExprKind, FunctionDef, FunctionIndex, IntermediateUnit,
    Local, LocalId, Param, Stmt, UnaryOp,
};
pub use value::{ElementKind, NativeValue, OpaqueTag, OpaqueValue};
