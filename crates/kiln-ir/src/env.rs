//! The environment native code receives as its `JNIEnv*` argument.
//!
//! Compiled code never looks inside the environment. It passes the pointer
//! straight back to the engine's builtin implementations, which turn it into
//! an [`EnvironmentFrame`] and forward to the host's [`HostCallbacks`].

/// Services the managed side offers to native code during one call.
///
/// Failures are returned as exception messages; the engine records them as
/// pending and the builtin yields a zero result.
pub trait HostCallbacks {
    /// Unboxes a managed long.
    fn long_value(&self, object: u64) -> Result<i64, String>;
    /// Boxes a long into a new managed object.
    fn box_long(&self, value: i64) -> Result<u64, String>;
    /// Calls the managed `long -> long` function held by `target`.
    fn call_long_callback(&self, target: u64, value: i64) -> Result<i64, String>;
    fn array_length(&self, array: u64) -> Result<i32, String>;
    fn exception_pending(&self) -> bool;
    /// Records a pending exception.
    fn raise(&self, message: String);
}

/// What an environment pointer points at.
///
/// A frame only lives for the duration of one native call, so its address
/// is only meaningful while that call is on the stack.
#[repr(C)]
pub struct EnvironmentFrame<'a> {
    callbacks: &'a dyn HostCallbacks,
}

impl<'a> EnvironmentFrame<'a> {
    pub fn new(callbacks: &'a dyn HostCallbacks) -> Self {
        Self { callbacks }
    }

    pub fn callbacks(&self) -> &'a dyn HostCallbacks {
        self.callbacks
    }

    /// The address passed to native code as the environment pointer.
    pub fn as_address(&self) -> u64 {
        self as *const Self as u64
    }

    /// Recovers a frame from an environment pointer.
    ///
    /// # Safety
    ///
    /// `address` must come from [`EnvironmentFrame::as_address`] on a frame
    /// that is still alive, and the returned reference must not outlive it.
    pub unsafe fn from_address<'f>(address: u64) -> Option<&'f EnvironmentFrame<'f>> {
        (address as *const EnvironmentFrame<'f>).as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        raised: RefCell<Vec<String>>,
    }

    impl HostCallbacks for Recorder {
        fn long_value(&self, object: u64) -> Result<i64, String> {
            Ok(object as i64)
        }
        fn box_long(&self, value: i64) -> Result<u64, String> {
            Ok(value as u64)
        }
        fn call_long_callback(&self, _target: u64, value: i64) -> Result<i64, String> {
            Ok(value + 1)
        }
        fn array_length(&self, _array: u64) -> Result<i32, String> {
            Err("not an array".to_string())
        }
        fn exception_pending(&self) -> bool {
            !self.raised.borrow().is_empty()
        }
        fn raise(&self, message: String) {
            self.raised.borrow_mut().push(message);
        }
    }

    #[test]
    fn frame_survives_an_address_round_trip() {
        let recorder = Recorder::default();
        let frame = EnvironmentFrame::new(&recorder);
        let address = frame.as_address();
        let recovered = unsafe { EnvironmentFrame::from_address(address) }.unwrap();
        assert_eq!(recovered.callbacks().call_long_callback(0, 41), Ok(42));
        recovered.callbacks().raise("boom".to_string());
        assert!(recorder.exception_pending());
    }

    #[test]
    fn null_address_has_no_frame() {
        assert!(unsafe { EnvironmentFrame::from_address(0) }.is_none());
    }
}
