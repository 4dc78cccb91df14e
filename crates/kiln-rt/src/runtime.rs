//! What the bridge needs from the managed runtime.

use crate::environment::Environment;
use std::fmt;

/// An opaque reference handed out by the managed runtime.
///
/// The bridge never looks inside it; it only passes the word to native code
/// and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectRef(pub u64);

impl ObjectRef {
    pub const NULL: ObjectRef = ObjectRef(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn address(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("null")
        } else {
            write!(f, "ref@{:#x}", self.0)
        }
    }
}

/// Capability interface of the managed runtime.
///
/// `long_value` and `class_name` drive argument marshaling, `box_long`
/// converts integer returns. The remaining methods back the environment
/// builtins and have conservative defaults.
pub trait ManagedRuntime {
    /// The integer value of `value`, or `None` when it has no integer
    /// coercion.
    fn long_value(&self, value: ObjectRef) -> Option<i64>;

    /// Runtime class name of a non-null reference.
    fn class_name(&self, value: ObjectRef) -> String;

    /// Boxes a native integer result.
    fn box_long(&self, value: i64) -> ObjectRef;

    fn is_null(&self, value: ObjectRef) -> bool {
        value.is_null()
    }

    /// Length of a managed array, `None` if `value` is not an array.
    fn array_length(&self, _value: ObjectRef) -> Option<i32> {
        None
    }

    /// Calls the managed callable `target` with one integer argument.
    ///
    /// `env` can be used to invoke further native functions while the
    /// current one is still on the stack.
    fn call_back(&self, _env: &Environment<'_>, target: ObjectRef, _argument: i64) -> Result<i64, String> {
        Err(format!("{target} is not callable"))
    }
}
