//! The environment capability handed to native code for one invocation.

use crate::bridge::invoke_with;
use crate::runtime::{ManagedRuntime, ObjectRef};
use crate::session::{FunctionId, Session};
use crate::InvokeError;
use kiln_ir::HostCallbacks;
use kiln_source::ClassNames;
use std::cell::RefCell;

/// Per-call state behind a `JNIEnv*` argument.
///
/// Lives on the bridge's stack for exactly one native call. Managed
/// callbacks receive it and can [`invoke`](Environment::invoke) further
/// native functions through it.
pub struct Environment<'a> {
    session: &'a Session,
    runtime: &'a dyn ManagedRuntime,
    names: &'a ClassNames,
    pending: RefCell<Option<String>>,
}

impl<'a> Environment<'a> {
    pub(crate) fn new(session: &'a Session, runtime: &'a dyn ManagedRuntime, names: &'a ClassNames) -> Self {
        Self {
            session,
            runtime,
            names,
            pending: RefCell::new(None),
        }
    }

    pub fn session(&self) -> &'a Session {
        self.session
    }

    pub fn runtime(&self) -> &'a dyn ManagedRuntime {
        self.runtime
    }

    /// Invokes another native function while the current one is running.
    pub fn invoke(&self, function: FunctionId, args: &[ObjectRef]) -> Result<Option<ObjectRef>, InvokeError> {
        invoke_with(self.session, self.runtime, self.names, function, args)
    }

    pub(crate) fn take_pending(&self) -> Option<String> {
        self.pending.borrow_mut().take()
    }
}

impl HostCallbacks for Environment<'_> {
    fn long_value(&self, object: u64) -> Result<i64, String> {
        let object = ObjectRef(object);
        if self.runtime.is_null(object) {
            return Err("null reference has no integer value".to_string());
        }
        self.runtime
            .long_value(object)
            .ok_or_else(|| format!("{} has no integer value", self.runtime.class_name(object)))
    }

    fn box_long(&self, value: i64) -> Result<u64, String> {
        Ok(self.runtime.box_long(value).address())
    }

    fn call_long_callback(&self, target: u64, value: i64) -> Result<i64, String> {
        let target = ObjectRef(target);
        if self.runtime.is_null(target) {
            return Err("callback target is null".to_string());
        }
        self.runtime.call_back(self, target, value)
    }

    fn array_length(&self, array: u64) -> Result<i32, String> {
        let array = ObjectRef(array);
        if self.runtime.is_null(array) {
            return Err("null reference is not an array".to_string());
        }
        self.runtime
            .array_length(array)
            .ok_or_else(|| format!("{} is not an array", self.runtime.class_name(array)))
    }

    fn exception_pending(&self) -> bool {
        self.pending.borrow().is_some()
    }

    fn raise(&self, message: String) {
        let mut pending = self.pending.borrow_mut();
        if pending.is_none() {
            log::debug!("exception raised in native call: {message}");
            *pending = Some(message);
        } else {
            log::debug!("exception already pending, dropping: {message}");
        }
    }
}
