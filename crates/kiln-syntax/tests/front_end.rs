use kiln_ir::{Builtin, Callee, ExprKind, IntKind, IntermediateUnit, NativeType, Stmt};
use kiln_source::{Diagnostics, OptLevel, SourceFile};
use kiln_syntax::compile_to_unit;

const NO_FLAGS: &[&str] = &[];

fn compile(source: &str) -> Result<(IntermediateUnit, Diagnostics), Diagnostics> {
    compile_to_unit("code.cpp", source, NO_FLAGS)
}

fn messages(diagnostics: &Diagnostics) -> Vec<String> {
    diagnostics.iter().map(|d| d.message.clone()).collect()
}

fn errors_of(source: &str) -> Vec<String> {
    match compile(source) {
        Ok(_) => panic!("expected compile errors for:\n{source}"),
        Err(diagnostics) => messages(&diagnostics),
    }
}

fn names(unit: &IntermediateUnit) -> Vec<&str> {
    unit.functions.iter().map(|f| f.name.as_str()).collect()
}

#[test]
fn test_extern_c_function_keeps_plain_name() {
    let source = r#"
        #include <jni.h>
        extern "C" JNIEXPORT jlong JNICALL add(jlong a, jlong b) { return a + b; }
    "#;
    let (unit, warnings) = compile(source).unwrap();
    assert!(warnings.is_empty());
    assert_eq!(names(&unit), vec!["add"]);
    let add = &unit.functions[0];
    assert_eq!(add.source_name, "add");
    assert_eq!(add.params[0].spelling, "jlong");
    assert_eq!(add.params[0].ty, NativeType::Int(IntKind::Long));
    assert_eq!(add.ret_spelling, "jlong");
}

#[test]
fn test_cxx_functions_are_decorated() {
    let source = r#"
        #include <jni.h>
        jint twice(jint x) { return x * 2; }
        jlong objectMangling(JNIEnv* env, jobject a, jobject b, jclass c, jstring d, jint e,
                             jclass f, jstring g, jclass h, jobject i) { return e; }
        int main() { return twice(2); }
    "#;
    let (unit, _) = compile(source).unwrap();
    assert_eq!(
        names(&unit),
        vec![
            "_Z5twicei",
            "_Z14objectManglingP7JNIEnv_P8_jobjectS2_P7_jclassP8_jstringiS4_S6_S4_S2_",
            "main",
        ]
    );
}

#[test]
fn test_overloads_resolve_by_arity() {
    let source = r#"
        int f(int a) { return a; }
        int f(int a, int b) { return a + b; }
        int g() { return f(1) + f(1, 2); }
    "#;
    let (unit, _) = compile(source).unwrap();
    assert_eq!(names(&unit), vec!["_Z1fi", "_Z1fii", "_Z1gv"]);
}

#[test]
fn test_c_sources_are_never_decorated() {
    let (unit, _) = compile_to_unit("code.c", "int add(int a, int b) { return a + b; }", NO_FLAGS).unwrap();
    assert_eq!(names(&unit), vec!["add"]);
}

#[test]
fn test_syntax_error_renders_with_position() {
    let source = "int f() { return 1 }";
    let diagnostics = compile(source).unwrap_err();
    let file = SourceFile::new("code.cpp", source);
    let rendered = diagnostics.render(&file);
    assert!(
        rendered.starts_with("code.cpp:1:20: error: expected ';' after return statement"),
        "{rendered}"
    );
    assert!(rendered.ends_with("1 error generated.\n"), "{rendered}");
}

#[test]
fn test_semantic_errors_are_collected() {
    let errors = errors_of(
        r#"
        int f(int a, int b) { return a + b; }
        int g() {
            int x = y;
            break;
            return f(1);
        }
    "#,
    );
    assert_eq!(
        errors,
        vec![
            "use of undeclared identifier 'y'",
            "'break' statement not in loop or switch statement",
            "too few arguments to function call, expected 2, have 1",
        ]
    );
}

#[test]
fn test_prototype_without_body_is_undefined() {
    let errors = errors_of("int g(int); int f() { return g(1); }");
    assert_eq!(errors, vec!["undefined reference to 'g'"]);
}

#[test]
fn test_redefinition_and_conflicts() {
    let errors = errors_of(
        r#"
        extern "C" int f(int a) { return a; }
        extern "C" int f(int a) { return a; }
        extern "C" long f(int a);
    "#,
    );
    assert_eq!(
        errors,
        vec!["redefinition of 'f'", "conflicting types for 'f'"]
    );
}

#[test]
fn test_floating_point_arithmetic_is_rejected() {
    let errors = errors_of("double f(double a) { return a + 1; }");
    assert_eq!(errors, vec!["floating-point arithmetic is not supported"]);
}

#[test]
fn test_floating_point_values_pass_through() {
    let (unit, _) = compile("double same(double a) { double b = a; return b; }").unwrap();
    assert_eq!(unit.functions[0].ret, NativeType::Float(kiln_ir::FloatKind::Double));
}

#[test]
fn test_missing_return_warns_and_flags_control_it() {
    let source = "int f(int x) { if (x) return 1; }";
    let (_, warnings) = compile(source).unwrap();
    assert_eq!(
        messages(&warnings),
        vec!["non-void function does not return a value in all control paths"]
    );

    let (_, silenced) = compile_to_unit("code.cpp", source, &["-w"]).unwrap();
    assert!(silenced.is_empty());

    let promoted = compile_to_unit("code.cpp", source, &["-Werror"]).unwrap_err();
    assert!(promoted.has_errors());
    assert_eq!(promoted.error_count(), 1);
}

#[test]
fn test_main_returns_zero_implicitly() {
    let (unit, warnings) = compile("int main() { }").unwrap();
    assert!(warnings.is_empty());
    assert!(matches!(
        unit.functions[0].body.last(),
        Some(Stmt::Return(Some(_)))
    ));
}

#[test]
fn test_define_flags_reach_the_source() {
    let source = "int f() { return VALUE + 1; }";
    assert!(compile_to_unit("code.cpp", source, &["-DVALUE=41"]).is_ok());
    assert_eq!(errors_of(source), vec!["use of undeclared identifier 'VALUE'"]);
}

#[test]
fn test_bad_flags_fail_before_parsing() {
    let diagnostics = compile_to_unit("code.cpp", "int f() { return 0; }", &["--bogus"]).unwrap_err();
    assert_eq!(messages(&diagnostics), vec!["unknown argument: '--bogus'"]);

    let diagnostics = compile_to_unit("code.cpp", "int f() { return 0; }", &["extra.cpp"]).unwrap_err();
    assert_eq!(
        messages(&diagnostics),
        vec!["no such file or directory: 'extra.cpp'"]
    );
}

#[test]
fn test_opt_level_flag_is_recorded() {
    let (unit, _) = compile_to_unit("code.cpp", "int f() { return 0; }", &["-O2"]).unwrap();
    assert_eq!(unit.opt_level, Some(OptLevel::Speed));
    let (unit, _) = compile("int f() { return 0; }").unwrap();
    assert_eq!(unit.opt_level, None);
}

#[test]
fn test_missing_header_is_fatal() {
    let errors = errors_of("#include <vector>\nint f() { return 0; }");
    assert_eq!(errors, vec!["'vector' file not found"]);
}

#[test]
fn test_environment_calls_lower_to_builtins() {
    let source = r#"
        #include <jni.h>
        extern "C" jint version(JNIEnv* env) { return env->GetVersion(); }
        extern "C" jlong unbox(JNIEnv* env, jobject o) { return LongValue(env, o); }
    "#;
    let (unit, _) = compile(source).unwrap();
    for function in &unit.functions {
        let Some(Stmt::Return(Some(value))) = function.body.first() else {
            panic!("expected a return in {}", function.name);
        };
        let call = match &value.kind {
            ExprKind::Convert(inner) => &inner.kind,
            other => other,
        };
        assert!(
            matches!(call, ExprKind::Call { callee: Callee::Builtin(_), .. }),
            "{call:?}"
        );
    }
    let Some(Stmt::Return(Some(value))) = unit.functions[1].body.first() else {
        unreachable!()
    };
    assert!(matches!(
        &value.kind,
        ExprKind::Call {
            callee: Callee::Builtin(Builtin::LongValue),
            args
        } if args.len() == 2
    ));
}

#[test]
fn test_c_style_environment_calls() {
    let source = r#"
        #include <jni.h>
        jint version(JNIEnv* env) { return (*env)->GetVersion(env); }
    "#;
    assert!(compile_to_unit("code.c", source, NO_FLAGS).is_ok());
}

#[test]
fn test_function_names_convert_to_addresses() {
    let source = r#"
        #include <jni.h>
        extern "C" jlong square(jlong x) { return x * x; }
        extern "C" jlong address() { return (jlong) square; }
    "#;
    let (unit, _) = compile(source).unwrap();
    let Some(Stmt::Return(Some(value))) = unit.functions[1].body.first() else {
        panic!("expected a return");
    };
    let ExprKind::Convert(inner) = &value.kind else {
        panic!("expected a conversion, got {value:?}");
    };
    assert_eq!(inner.kind, ExprKind::FunctionAddress(0));
}

#[test]
fn test_null_comparisons() {
    let source = r#"
        #include <jni.h>
        extern "C" jboolean test(JNIEnv* env) { return env != 0; }
        extern "C" jboolean isNull(jstring s) { return s == NULL; }
        extern "C" jboolean same(jobject a, jstring b) { return a == b || a == nullptr; }
    "#;
    let (_, warnings) = compile(source).unwrap();
    assert!(warnings.is_empty(), "{warnings:?}");
}

#[test]
fn test_runaway_nesting_is_a_diagnostic() {
    let source = format!("int f(int a) {{ return {}a; }}", "(".repeat(100_000));
    assert_eq!(
        errors_of(&source),
        vec!["bracket nesting level exceeded maximum of 256".to_string()]
    );
    assert!(errors_of(&"(".repeat(100_000)).len() == 1);
}
