mod common;

use common::{compile, function, init_logger, Heap, NO_FLAGS};
use kiln_rt::{Bridge, ExecutionState, SessionError, Session};
use kiln_source::{ClassNames, KilnConfig, OptLevel};
use std::io::Write;

#[test]
fn test_syntax_errors_leave_the_module_empty() {
    init_logger();
    let mut session = Session::new();
    let module = session.compile(None, "int f() { return 1 }", NO_FLAGS).unwrap();
    let compiled = session.module(module).unwrap();

    assert!(compiled.has_errors());
    assert!(compiled.functions().is_empty());
    assert!(matches!(compiled.state(), ExecutionState::Empty));
    assert!(
        compiled
            .diagnostics()
            .starts_with("code.cpp:1:20: error: expected ';' after return statement"),
        "{}",
        compiled.diagnostics()
    );
    assert_eq!(compiled.diagnostic_list().error_count(), 1);
}

#[test]
fn test_cxx_names_are_decorated() {
    init_logger();
    let mut session = Session::new();
    let module = compile(
        &mut session,
        r#"
        int twice(int x) { return x * 2; }
        extern "C" int plain(int x) { return twice(x); }
    "#,
    );

    let names: Vec<&str> = session.functions(module).unwrap().iter().map(|f| f.name()).collect();
    assert_eq!(names, vec!["_Z5twicei", "plain"]);
    assert_eq!(session.find_similar(module, "twice").unwrap(), Some("_Z5twicei"));
    assert_eq!(session.find_similar(module, "thrice").unwrap(), None);
    assert_eq!(session.function_by_name(module, "twice").unwrap(), None);

    let twice = function(&session, module, "_Z5twicei");
    let handle = session.function(twice).unwrap();
    assert_eq!(handle.source_name(), "twice");
    assert_eq!(handle.params()[0].spelling, "int");
    assert_ne!(handle.entry_address(), 0);
    assert_eq!(handle.to_string(), format!("NativeFunction '_Z5twicei' <{:#x}>", handle.entry_address()));

    let bridge = Bridge::new(Heap::default(), ClassNames::default());
    let heap = bridge.runtime();
    assert_eq!(heap.long_of(bridge.invoke(&session, twice, &[heap.long(21)]).unwrap()), 42);
}

#[test]
fn test_debug_flags_are_request_errors() {
    let mut session = Session::new();
    assert_eq!(
        session.compile(None, "int f() { return 0; }", &["-O2", "-g"]),
        Err(SessionError::UnsupportedFlag("-g".to_string()))
    );
    assert!(session.is_empty());

    // Unknown flags are source-level problems, reported as diagnostics.
    let module = session.compile(None, "int f() { return 0; }", &["--bogus"]).unwrap();
    let compiled = session.module(module).unwrap();
    assert!(compiled.has_errors());
    assert!(compiled.diagnostics().contains("unknown argument: '--bogus'"));
}

#[test]
fn test_define_flags_reach_the_source() {
    init_logger();
    let mut session = Session::new();
    let source = r#"extern "C" long scale(long x) { return x * FACTOR; }"#;
    let module = session.compile(None, source, &["-DFACTOR=3"]).unwrap();
    assert!(!session.module(module).unwrap().has_errors());

    let scale = function(&session, module, "scale");
    let bridge = Bridge::new(Heap::default(), ClassNames::default());
    let heap = bridge.runtime();
    assert_eq!(heap.long_of(bridge.invoke(&session, scale, &[heap.long(4)]).unwrap()), 12);

    let undefined = session.compile(None, source, NO_FLAGS).unwrap();
    assert!(session.module(undefined).unwrap().has_errors());
}

#[test]
fn test_werror_makes_warnings_fatal() {
    let mut session = Session::new();
    let source = "int f(int x) { if (x) return 1; }";

    let lenient = session.compile(None, source, NO_FLAGS).unwrap();
    let compiled = session.module(lenient).unwrap();
    assert!(!compiled.has_errors());
    assert_eq!(compiled.functions().len(), 1);
    assert!(compiled.diagnostics().contains("warning: non-void function does not return a value"));

    let strict = session.compile(None, source, &["-Werror"]).unwrap();
    let compiled = session.module(strict).unwrap();
    assert!(compiled.has_errors());
    assert!(compiled.functions().is_empty());
}

#[test]
fn test_modules_dispose_independently() {
    let mut session = Session::new();
    let first = compile(&mut session, "int one() { return 1; }");
    let second = compile(&mut session, "int two() { return 2; }");
    assert_eq!(session.len(), 2);
    assert_eq!(session.module(first).unwrap().to_string(), format!("NativeModule <{first}>"));

    session.dispose(first).unwrap();
    assert_eq!(session.dispose(first), Err(SessionError::StaleModule(first)));
    assert!(matches!(session.functions(first), Err(SessionError::StaleModule(_))));
    assert_eq!(session.functions(second).unwrap().len(), 1);
    assert_eq!(session.len(), 1);
}

#[test]
fn test_configuration_supplies_defaults() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kiln.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        r#"
[compile]
file_name = "native.c"
flags = ["-DBASE=40"]
opt_level = "none"
"#
    )
    .unwrap();

    let config = KilnConfig::load(&path).unwrap();
    assert_eq!(config.compile.opt_level, OptLevel::None);
    let mut session = Session::with_config(config);
    let module = session
        .compile_with_defaults("long answer(long x) { return BASE + x; }", &["-w"])
        .unwrap();

    let compiled = session.module(module).unwrap();
    assert!(!compiled.has_errors(), "{}", compiled.diagnostics());
    assert_eq!(compiled.file_name(), "native.c");
    assert_eq!(compiled.flags(), ["-DBASE=40", "-w"]);

    // C functions keep their plain names.
    let answer = function(&session, module, "answer");
    let bridge = Bridge::from_config(Heap::default(), session.config());
    let heap = bridge.runtime();
    assert_eq!(heap.long_of(bridge.invoke(&session, answer, &[heap.long(2)]).unwrap()), 42);
}

#[test]
fn test_runaway_nesting_leaves_the_module_empty() {
    let mut session = Session::new();
    let source = format!("int f(int a) {{ return {}a; }}", "(".repeat(100_000));
    let module = session.compile(None, &source, NO_FLAGS).unwrap();
    let compiled = session.module(module).unwrap();

    assert!(compiled.has_errors());
    assert!(compiled.functions().is_empty());
    assert!(compiled
        .diagnostics()
        .contains("error: bracket nesting level exceeded maximum of 256"));
}
