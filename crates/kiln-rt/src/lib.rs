//! Compiles C and C++ source at runtime and calls the result from a managed
//! runtime.
//!
//! A [`Session`] owns every [`CompiledModule`]. Compiling never fails on bad
//! source; the module carries diagnostics and an empty catalog instead. The
//! [`Bridge`] checks managed arguments against each function's precomputed
//! [`TypeDescriptor`]s, makes the native call and converts the result back.
//!
//! ```no_run
//! use kiln_rt::{Bridge, ManagedRuntime, ObjectRef, Session};
//! use kiln_source::ClassNames;
//!
//! struct Longs;
//!
//! impl ManagedRuntime for Longs {
//!     fn long_value(&self, value: ObjectRef) -> Option<i64> {
//!         Some(value.0 as i64)
//!     }
//!     fn class_name(&self, _value: ObjectRef) -> String {
//!         "java.lang.Long".to_string()
//!     }
//!     fn box_long(&self, value: i64) -> ObjectRef {
//!         ObjectRef(value as u64)
//!     }
//! }
//!
//! let mut session = Session::new();
//! let module = session
//!     .compile(None, r#"extern "C" long add(long a, long b) { return a + b; }"#, &[] as &[&str])
//!     .unwrap();
//! let add = session.function_by_name(module, "add").unwrap().unwrap();
//! let bridge = Bridge::new(Longs, ClassNames::default());
//! let sum = bridge.invoke(&session, add, &[ObjectRef(2), ObjectRef(3)]).unwrap();
//! assert_eq!(sum, Some(ObjectRef(5)));
//! ```

pub mod bridge;
pub mod catalog;
pub mod engine;
pub mod environment;
pub mod error;
pub mod module;
pub mod resolver;
pub mod runtime;
pub mod session;

pub use bridge::Bridge;
pub use catalog::{FunctionHandle, ParamDescriptor};
pub use engine::{
    CompilerFrontend, CraneliftEngine, ExecutionContext, ExecutionEngine, FrontendOutput, NativeFunction,
    SyntaxFrontend,
};
pub use environment::Environment;
pub use error::{EngineError, InvokeError, SessionError};
pub use module::{CompiledModule, ExecutionState};
pub use resolver::{ReturnRule, TypeDescriptor};
pub use runtime::{ManagedRuntime, ObjectRef};
pub use session::{FunctionId, ModuleId, Session};
