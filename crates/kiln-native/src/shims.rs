//! Host implementations of the environment builtins.
//!
//! Compiled code calls these through its environment pointer. Each shim
//! recovers the [`EnvironmentFrame`] of the running call and forwards to the
//! host's [`HostCallbacks`]. A failing callback becomes a pending exception
//! and the shim returns zero; while an exception is pending, every builtin
//! except `GetVersion` and `ExceptionCheck` is skipped.
//!
//! Panics never unwind into native frames.

use kiln_ir::builtins::ENVIRONMENT_VERSION;
use kiln_ir::{Builtin, EnvironmentFrame, HostCallbacks};
use std::panic::{self, AssertUnwindSafe};

/// The symbol and address of every builtin, for binding into a JIT module.
pub fn symbols() -> [(&'static str, *const u8); 6] {
    Builtin::ALL.map(|builtin| (builtin.symbol(), address(builtin)))
}

fn address(builtin: Builtin) -> *const u8 {
    match builtin {
        Builtin::GetVersion => kiln_env_get_version as *const u8,
        Builtin::LongValue => kiln_env_long_value as *const u8,
        Builtin::BoxLong => kiln_env_box_long as *const u8,
        Builtin::CallLongCallback => kiln_env_call_long_callback as *const u8,
        Builtin::GetArrayLength => kiln_env_get_array_length as *const u8,
        Builtin::ExceptionCheck => kiln_env_exception_check as *const u8,
    }
}

fn with_host<T: Default>(
    env: usize,
    builtin: Builtin,
    f: impl FnOnce(&dyn HostCallbacks) -> Result<T, String>,
) -> T {
    // SAFETY: compiled code only ever receives the address of a frame that
    // the caller keeps alive for the whole native call.
    let Some(frame) = (unsafe { EnvironmentFrame::from_address(env as u64) }) else {
        log::warn!("{} called with a null environment", builtin.name());
        return T::default();
    };
    let host = frame.callbacks();
    if host.exception_pending() {
        log::trace!("{} skipped: exception pending", builtin.name());
        return T::default();
    }
    match panic::catch_unwind(AssertUnwindSafe(|| f(host))) {
        Ok(Ok(value)) => value,
        Ok(Err(message)) => {
            host.raise(message);
            T::default()
        }
        Err(_) => {
            host.raise(format!("{} panicked in the host", builtin.name()));
            T::default()
        }
    }
}

extern "C" fn kiln_env_get_version(_env: usize) -> i32 {
    ENVIRONMENT_VERSION
}

extern "C" fn kiln_env_long_value(env: usize, object: usize) -> i64 {
    with_host(env, Builtin::LongValue, |host| host.long_value(object as u64))
}

extern "C" fn kiln_env_box_long(env: usize, value: i64) -> usize {
    with_host(env, Builtin::BoxLong, |host| {
        host.box_long(value).map(|object| object as usize)
    })
}

extern "C" fn kiln_env_call_long_callback(env: usize, target: usize, value: i64) -> i64 {
    with_host(env, Builtin::CallLongCallback, |host| {
        host.call_long_callback(target as u64, value)
    })
}

extern "C" fn kiln_env_get_array_length(env: usize, array: usize) -> i32 {
    with_host(env, Builtin::GetArrayLength, |host| host.array_length(array as u64))
}

extern "C" fn kiln_env_exception_check(env: usize) -> u8 {
    // SAFETY: see `with_host`.
    match unsafe { EnvironmentFrame::from_address(env as u64) } {
        Some(frame) => u8::from(frame.callbacks().exception_pending()),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct Host {
        raised: RefCell<Option<String>>,
        calls: Cell<usize>,
    }

    impl HostCallbacks for Host {
        fn long_value(&self, object: u64) -> Result<i64, String> {
            self.calls.set(self.calls.get() + 1);
            if object == 0 {
                Err("null object".to_string())
            } else {
                Ok(object as i64 * 10)
            }
        }
        fn box_long(&self, _value: i64) -> Result<u64, String> {
            panic!("allocation failed")
        }
        fn call_long_callback(&self, _target: u64, value: i64) -> Result<i64, String> {
            Ok(-value)
        }
        fn array_length(&self, _array: u64) -> Result<i32, String> {
            Ok(3)
        }
        fn exception_pending(&self) -> bool {
            self.raised.borrow().is_some()
        }
        fn raise(&self, message: String) {
            *self.raised.borrow_mut() = Some(message);
        }
    }

    #[test]
    fn builtins_forward_to_the_host() {
        let host = Host::default();
        let frame = EnvironmentFrame::new(&host);
        let env = frame.as_address() as usize;
        assert_eq!(kiln_env_long_value(env, 4), 40);
        assert_eq!(kiln_env_call_long_callback(env, 1, 5), -5);
        assert_eq!(kiln_env_get_array_length(env, 1), 3);
        assert_eq!(kiln_env_get_version(env), ENVIRONMENT_VERSION);
        assert_eq!(kiln_env_exception_check(env), 0);
    }

    #[test]
    fn failures_become_pending_and_block_later_calls() {
        let host = Host::default();
        let frame = EnvironmentFrame::new(&host);
        let env = frame.as_address() as usize;
        assert_eq!(kiln_env_long_value(env, 0), 0);
        assert_eq!(host.raised.borrow().as_deref(), Some("null object"));
        assert_eq!(kiln_env_exception_check(env), 1);

        assert_eq!(kiln_env_long_value(env, 4), 0);
        assert_eq!(host.calls.get(), 1);
        assert_eq!(kiln_env_get_version(env), ENVIRONMENT_VERSION);
    }

    #[test]
    fn host_panics_are_contained() {
        let host = Host::default();
        let frame = EnvironmentFrame::new(&host);
        assert_eq!(kiln_env_box_long(frame.as_address() as usize, 1), 0);
        assert!(host.raised.borrow().as_deref().unwrap().contains("BoxLong"));
    }

    #[test]
    fn every_builtin_has_a_symbol() {
        let symbols = symbols();
        for (builtin, (symbol, address)) in Builtin::ALL.iter().zip(symbols) {
            assert_eq!(builtin.symbol(), symbol);
            assert!(!address.is_null());
        }
    }
}
