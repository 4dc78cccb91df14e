#![allow(dead_code)]

use kiln_rt::{Environment, FunctionId, ManagedRuntime, ModuleId, ObjectRef, Session};
use std::cell::RefCell;
use std::rc::Rc;

pub const NO_FLAGS: &[&str] = &[];

pub type Callback = Rc<dyn Fn(&Environment<'_>, i64) -> Result<i64, String>>;

#[derive(Clone)]
pub enum Value {
    Long(i64),
    Str(String),
    Class(String),
    Array { class: String, length: i32 },
    Callable(Callback),
}

/// A tiny managed heap. References are slot numbers plus one, so zero stays
/// the null reference.
#[derive(Default)]
pub struct Heap {
    objects: RefCell<Vec<Value>>,
}

impl Heap {
    pub fn alloc(&self, value: Value) -> ObjectRef {
        let mut objects = self.objects.borrow_mut();
        objects.push(value);
        ObjectRef(objects.len() as u64)
    }

    pub fn long(&self, value: i64) -> ObjectRef {
        self.alloc(Value::Long(value))
    }

    pub fn string(&self, text: &str) -> ObjectRef {
        self.alloc(Value::Str(text.to_string()))
    }

    pub fn class(&self, name: &str) -> ObjectRef {
        self.alloc(Value::Class(name.to_string()))
    }

    pub fn array(&self, class: &str, length: i32) -> ObjectRef {
        self.alloc(Value::Array {
            class: class.to_string(),
            length,
        })
    }

    pub fn callable(&self, f: impl Fn(&Environment<'_>, i64) -> Result<i64, String> + 'static) -> ObjectRef {
        self.alloc(Value::Callable(Rc::new(f)))
    }

    pub fn get(&self, object: ObjectRef) -> Option<Value> {
        let index = usize::try_from(object.0).ok()?.checked_sub(1)?;
        self.objects.borrow().get(index).cloned()
    }

    /// The long held by `object`; panics for anything else.
    pub fn long_of(&self, object: Option<ObjectRef>) -> i64 {
        match object.and_then(|o| self.get(o)) {
            Some(Value::Long(value)) => value,
            _ => panic!("expected a boxed long, got {object:?}"),
        }
    }
}

impl ManagedRuntime for Heap {
    fn long_value(&self, value: ObjectRef) -> Option<i64> {
        match self.get(value)? {
            Value::Long(long) => Some(long),
            _ => None,
        }
    }

    fn class_name(&self, value: ObjectRef) -> String {
        match self.get(value) {
            Some(Value::Long(_)) => "java.lang.Long".to_string(),
            Some(Value::Str(_)) => "java.lang.String".to_string(),
            Some(Value::Class(_)) => "java.lang.Class".to_string(),
            Some(Value::Array { class, .. }) => class,
            Some(Value::Callable(_)) => "java.util.function.LongUnaryOperator".to_string(),
            None => "null".to_string(),
        }
    }

    fn box_long(&self, value: i64) -> ObjectRef {
        self.long(value)
    }

    fn array_length(&self, value: ObjectRef) -> Option<i32> {
        match self.get(value)? {
            Value::Array { length, .. } => Some(length),
            _ => None,
        }
    }

    fn call_back(&self, env: &Environment<'_>, target: ObjectRef, argument: i64) -> Result<i64, String> {
        match self.get(target) {
            Some(Value::Callable(f)) => f(env, argument),
            _ => Err(format!("{} is not callable", self.class_name(target))),
        }
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Compiles `source` as `code.cpp` and fails the test on any error.
pub fn compile(session: &mut Session, source: &str) -> ModuleId {
    let module = session.compile(None, source, NO_FLAGS).expect("request should be valid");
    let compiled = session.module(module).unwrap();
    assert!(!compiled.has_errors(), "unexpected errors:\n{}", compiled.diagnostics());
    module
}

pub fn function(session: &Session, module: ModuleId, name: &str) -> FunctionId {
    session
        .function_by_name(module, name)
        .unwrap()
        .unwrap_or_else(|| panic!("no function named {name}"))
}
