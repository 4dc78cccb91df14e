use kiln_ir::{EnvironmentFrame, HostCallbacks, NativeValue, OpaqueTag, OpaqueValue};
use kiln_native::{JitEngine, JitProgram, NativeError};
use kiln_source::OptLevel;
use kiln_syntax::compile_to_unit;
use std::cell::RefCell;

/// Compiles `source` as a C++ file and JITs it.
fn jit(source: &str) -> JitProgram {
    let (unit, _) = compile_to_unit("code.cpp", source, &[] as &[&str])
        .unwrap_or_else(|d| panic!("compile failed: {d:?}"));
    JitEngine::new(OptLevel::Speed)
        .expect("host should be supported")
        .prepare(&unit)
        .expect("prepare should succeed")
}

fn call_i64(program: &JitProgram, name: &str, args: &[OpaqueValue]) -> i64 {
    let (index, function) = program.find(name).unwrap_or_else(|| panic!("no function {name}"));
    let signed = function.ret.int_kind().map_or(true, |k| k.is_signed());
    let value = unsafe { program.call(index, args) }.expect("call should succeed");
    value.as_i64(signed).expect("integer result")
}

fn long(value: i64) -> OpaqueValue {
    OpaqueValue::integer(64, value)
}

fn int(value: i64) -> OpaqueValue {
    OpaqueValue::integer(32, value)
}

#[test]
fn test_add_longs() {
    let program = jit(r#"extern "C" long add(long a, long b) { return a + b; }"#);
    assert_eq!(call_i64(&program, "add", &[long(2), long(3)]), 5);
    assert_eq!(call_i64(&program, "add", &[long(i64::MAX), long(1)]), i64::MIN);
}

#[test]
fn test_division_never_traps() {
    let program = jit(
        r#"
        extern "C" int quot(int a, int b) { return a / b; }
        extern "C" int rem(int a, int b) { return a % b; }
        extern "C" unsigned int uquot(unsigned int a, unsigned int b) { return a / b; }
    "#,
    );
    assert_eq!(call_i64(&program, "quot", &[int(7), int(2)]), 3);
    assert_eq!(call_i64(&program, "quot", &[int(-7), int(2)]), -3);
    assert_eq!(call_i64(&program, "quot", &[int(7), int(0)]), 0);
    assert_eq!(call_i64(&program, "quot", &[int(i32::MIN as i64), int(-1)]), i32::MIN as i64);
    assert_eq!(call_i64(&program, "rem", &[int(-7), int(2)]), -1);
    assert_eq!(call_i64(&program, "rem", &[int(7), int(0)]), 0);
    assert_eq!(call_i64(&program, "rem", &[int(i32::MIN as i64), int(-1)]), 0);
    assert_eq!(call_i64(&program, "uquot", &[int(-2), int(2)]), 0x7fff_ffff);
}

#[test]
fn test_loops_and_control_flow() {
    let program = jit(
        r#"
        extern "C" long factorial(int n) {
            long result = 1;
            for (int i = 2; i <= n; i++) {
                result *= i;
            }
            return result;
        }
        extern "C" int odd_sum(int n) {
            int sum = 0;
            int i = 0;
            while (1) {
                i++;
                if (i > n) break;
                if (i % 2 == 0) continue;
                sum += i;
            }
            return sum;
        }
        extern "C" int countdown(int n) {
            int steps = 0;
            do { n--; steps++; } while (n > 0);
            return steps;
        }
    "#,
    );
    assert_eq!(call_i64(&program, "factorial", &[int(10)]), 3_628_800);
    assert_eq!(call_i64(&program, "odd_sum", &[int(10)]), 25);
    assert_eq!(call_i64(&program, "countdown", &[int(0)]), 1);
    assert_eq!(call_i64(&program, "countdown", &[int(4)]), 4);
}

#[test]
fn test_recursion_and_forward_calls() {
    let program = jit(
        r#"
        int fib(int n);
        extern "C" int run(int n) { return fib(n); }
        int fib(int n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); }
    "#,
    );
    assert_eq!(call_i64(&program, "run", &[int(20)]), 6765);
    assert_eq!(program.functions().len(), 2);
}

#[test]
fn test_short_circuit_skips_the_right_operand() {
    let program = jit(
        r#"
        extern "C" int guarded(int a, int b) { return b != 0 && a / b > 1; }
        extern "C" bool either(int a, int b) { return a || b; }
    "#,
    );
    assert_eq!(call_i64(&program, "guarded", &[int(9), int(0)]), 0);
    assert_eq!(call_i64(&program, "guarded", &[int(9), int(3)]), 1);
    let (index, _) = program.find("either").unwrap();
    let result = unsafe { program.call(index, &[int(0), int(5)]) }.unwrap();
    assert_eq!(result, NativeValue::Integer { bits: 8, value: 1 });
}

#[test]
fn test_narrow_results_keep_their_width() {
    let program = jit(
        r#"
        extern "C" unsigned char low(int x) { return x; }
        extern "C" signed char small(int x) { return x; }
        extern "C" void nothing(int x) { }
    "#,
    );
    assert_eq!(call_i64(&program, "low", &[int(511)]), 255);
    assert_eq!(call_i64(&program, "small", &[int(255)]), -1);
    let (index, _) = program.find("nothing").unwrap();
    assert_eq!(unsafe { program.call(index, &[int(1)]) }.unwrap(), NativeValue::Void);
}

#[test]
fn test_function_address_matches_entry() {
    let program = jit(
        r#"
        extern "C" long square(long x) { return x * x; }
        extern "C" long address() { return (long) square; }
    "#,
    );
    let (_, square) = program.find("square").unwrap();
    let address = call_i64(&program, "address", &[]);
    assert_eq!(address as u64, square.entry as u64);
}

#[test]
fn test_argument_count_is_checked() {
    let program = jit(r#"extern "C" int id(int x) { return x; }"#);
    let err = unsafe { program.call(0, &[]) }.unwrap_err();
    assert!(matches!(err, NativeError::ArgumentCount { expected: 1, actual: 0, .. }), "{err}");
    assert!(matches!(unsafe { program.call(7, &[]) }, Err(NativeError::UnknownFunction(7))));
}

#[test]
fn test_released_program_refuses_calls() {
    let mut program = jit(r#"extern "C" int id(int x) { return x; }"#);
    assert_eq!(call_i64(&program, "id", &[int(4)]), 4);
    program.release();
    program.release();
    assert!(program.is_released());
    assert!(program.functions().is_empty());
    assert!(matches!(unsafe { program.call(0, &[int(4)]) }, Err(NativeError::Released)));
}

#[derive(Default)]
struct Host {
    raised: RefCell<Option<String>>,
}

impl HostCallbacks for Host {
    fn long_value(&self, object: u64) -> Result<i64, String> {
        if object == 0 {
            Err("java.lang.NullPointerException".to_string())
        } else {
            Ok(object as i64)
        }
    }
    fn box_long(&self, value: i64) -> Result<u64, String> {
        Ok(value as u64)
    }
    fn call_long_callback(&self, _target: u64, value: i64) -> Result<i64, String> {
        Ok(value * 3)
    }
    fn array_length(&self, _array: u64) -> Result<i32, String> {
        Ok(0)
    }
    fn exception_pending(&self) -> bool {
        self.raised.borrow().is_some()
    }
    fn raise(&self, message: String) {
        self.raised.replace(Some(message));
    }
}

#[test]
fn test_environment_builtins_reach_the_host() {
    let program = jit(
        r#"
        #include <jni.h>
        extern "C" jint version(JNIEnv* env) { return env->GetVersion(); }
        extern "C" jlong triple(JNIEnv* env, jobject f, jlong x) {
            return env->CallLongCallback(f, x);
        }
        extern "C" jlong unbox(JNIEnv* env, jobject o) {
            jlong v = env->LongValue(o);
            if (env->ExceptionCheck()) return -1;
            return v;
        }
    "#,
    );
    let host = Host::default();
    let frame = EnvironmentFrame::new(&host);
    let env = OpaqueValue::pointer(OpaqueTag::EnvironmentContext, frame.as_address());
    let object = |address| OpaqueValue::pointer(OpaqueTag::ManagedObject, address);

    assert_eq!(
        call_i64(&program, "version", &[env]),
        i64::from(kiln_ir::builtins::ENVIRONMENT_VERSION)
    );
    assert_eq!(call_i64(&program, "triple", &[env, object(8), long(7)]), 21);
    assert_eq!(call_i64(&program, "unbox", &[env, object(40)]), 40);
    assert_eq!(call_i64(&program, "unbox", &[env, object(0)]), -1);
    assert_eq!(
        host.raised.borrow().as_deref(),
        Some("java.lang.NullPointerException")
    );
}

#[test]
fn test_opt_level_none_compiles_too() {
    let (unit, _) = compile_to_unit("code.cpp", r#"extern "C" int one() { return 1; }"#, &["-O0"])
        .unwrap();
    let program = JitEngine::new(OptLevel::Speed).unwrap().prepare(&unit).unwrap();
    assert_eq!(call_i64(&program, "one", &[]), 1);
}
