//! Diagnostic behavior: error reporting, cascade suppression, warnings.

use opal_common::diag::{DiagnosticSink, Severity};

fn diagnostics(source: &str) -> Vec<(Severity, String)> {
    let mut sink = DiagnosticSink::new();
    let program = opal_parser::parse(source, &mut sink);
    opal_sema::analyze(&program, &mut sink);
    sink.into_vec()
        .into_iter()
        .map(|d| (d.severity, d.message))
        .collect()
}

fn errors(source: &str) -> Vec<String> {
    diagnostics(source)
        .into_iter()
        .filter(|(s, _)| *s == Severity::Error)
        .map(|(_, m)| m)
        .collect()
}

fn warnings(source: &str) -> Vec<String> {
    diagnostics(source)
        .into_iter()
        .filter(|(s, _)| *s == Severity::Warning)
        .map(|(_, m)| m)
        .collect()
}

#[test]
fn unresolved_identifier() {
    let errs = errors("fun f(): Int = missing\n");
    assert_eq!(errs.len(), 1);
    assert!(errs[0].contains("unresolved identifier `missing`"));
}

#[test]
fn error_type_suppresses_cascades() {
    // `missing` is unknown; the arithmetic and the return check must not
    // pile further diagnostics on top.
    let errs = errors("fun f(): Int = missing + 1 * 2\n");
    assert_eq!(errs.len(), 1, "cascading errors not suppressed: {errs:?}");
}

#[test]
fn type_mismatch_reported_once() {
    let errs = errors("fun f(): Int = \"text\"\n");
    assert_eq!(errs.len(), 1);
    assert!(errs[0].contains("expected `Int`"));
    assert!(errs[0].contains("found `String`"));
}

#[test]
fn nullable_receiver_requires_safe_call() {
    let errs = errors("fun f(s: String?): Int = s.length\n");
    assert_eq!(errs.len(), 1);
    assert!(errs[0].contains("may be null"));
}

#[test]
fn unnecessary_safe_call_is_warning() {
    let warns = warnings("fun f(s: String): Int? = s?.length\n");
    assert!(warns.iter().any(|w| w.contains("unnecessary safe call")));
}

#[test]
fn assignment_to_immutable() {
    let errs = errors("fun f() {\n    val x = 1\n    x = 2\n}\n");
    assert!(errs.iter().any(|e| e.contains("immutable")));
}

#[test]
fn condition_must_be_boolean() {
    let errs = errors("fun f(n: Int) {\n    if (n) {\n        println(n)\n    }\n}\n");
    assert!(errs.iter().any(|e| e.contains("Boolean")));
}

#[test]
fn unknown_type_reported() {
    let errs = errors("fun f(x: Wibble): Unit {}\n");
    assert!(errs.iter().any(|e| e.contains("unknown type `Wibble`")));
}

#[test]
fn arity_mismatch() {
    let errs = errors("fun g(a: Int, b: Int): Int = a + b\nfun f(): Int = g(1)\n");
    assert_eq!(errs.len(), 1);
    assert!(
        errs[0].contains("missing argument") || errs[0].contains("expects"),
        "unexpected message: {}",
        errs[0]
    );
}

#[test]
fn named_argument_mapping() {
    // Named arguments can reorder; unknown names reject the call.
    let ok = errors("fun g(a: Int, b: String): String = b + a\nfun f(): String = g(b = \"x\", a = 1)\n");
    assert!(ok.is_empty(), "named reorder should type-check: {ok:?}");

    let bad = errors("fun g(a: Int): Int = a\nfun f(): Int = g(c = 1)\n");
    assert!(!bad.is_empty());
}

#[test]
fn default_arguments_fill_missing() {
    let errs = errors("fun greet(name: String = \"world\"): String = name\nfun f(): String = greet()\n");
    assert!(errs.is_empty(), "{errs:?}");
}

#[test]
fn when_non_exhaustive_enum() {
    let source = "enum class Color { RED, GREEN, BLUE }\nfun f(c: Color): Int = when (c) {\n    Color.RED -> 1\n    Color.GREEN -> 2\n}\n";
    let errs = errors(source);
    assert_eq!(errs.len(), 1);
    assert!(errs[0].contains("BLUE"), "should name the missing entry: {}", errs[0]);
}

#[test]
fn when_exhaustive_enum_is_clean() {
    let source = "enum class Color { RED, GREEN }\nfun f(c: Color): Int = when (c) {\n    Color.RED -> 1\n    Color.GREEN -> 2\n}\n";
    assert!(errors(source).is_empty());
}

#[test]
fn when_sealed_hierarchy_exhaustiveness() {
    let source = "sealed class Shape\nclass Circle(val r: Double) : Shape\nclass Rect(val w: Double, val h: Double) : Shape\nfun area(s: Shape): Double = when (s) {\n    is Circle -> 3.14 * s.r * s.r\n    else -> 0.0\n}\n";
    assert!(errors(source).is_empty());

    let missing = "sealed class Shape\nclass Circle(val r: Double) : Shape\nclass Rect(val w: Double, val h: Double) : Shape\nfun area(s: Shape): Double = when (s) {\n    is Circle -> 1.0\n}\n";
    let errs = errors(missing);
    assert!(errs.iter().any(|e| e.contains("Rect")));
}

#[test]
fn unreachable_code_warning() {
    let warns = warnings("fun f(): Int {\n    return 1\n    println(2)\n}\n");
    assert!(warns.iter().any(|w| w.contains("unreachable")));
}

#[test]
fn unused_variable_warning() {
    let warns = warnings("fun f() {\n    val unused = 1\n}\n");
    assert!(warns.iter().any(|w| w.contains("`unused`")));
}

#[test]
fn underscore_prefixed_locals_are_exempt() {
    let warns = warnings("fun f() {\n    val _scratch = 1\n}\n");
    assert!(warns.is_empty(), "{warns:?}");
}

#[test]
fn break_outside_loop() {
    let errs = errors("fun f() {\n    break\n}\n");
    assert!(errs.iter().any(|e| e.contains("`break` outside")));
}

#[test]
fn guard_else_must_exit() {
    let errs = errors("fun f(s: String?) {\n    guard s != null else { println(\"no\") }\n}\n");
    assert!(errs.iter().any(|e| e.contains("guard")));
}

#[test]
fn missing_return_on_some_path() {
    let errs = errors("fun f(n: Int): Int {\n    if (n > 0) {\n        return n\n    }\n}\n");
    assert!(errs.iter().any(|e| e.contains("every path")));
}

#[test]
fn duplicate_declaration_in_scope() {
    let errs = errors("fun f() {\n    val x = 1\n    val x = 2\n    println(x)\n}\n");
    assert!(errs.iter().any(|e| e.contains("already declared")));
}

#[test]
fn propagate_requires_result_context() {
    let errs = errors("fun parse(s: String): Result<Int, String> = Ok(1)\nfun f(s: String): Int = parse(s)?\n");
    assert!(errs.iter().any(|e| e.contains("Result")));
}

#[test]
fn throw_requires_throwable() {
    let errs = errors("fun f() {\n    throw \"nope\"\n}\n");
    assert!(errs.iter().any(|e| e.contains("Throwable")));
}

#[test]
fn override_consistency() {
    let source = "open class Base {\n    fun greet(): String = \"base\"\n}\nclass Child : Base {\n    fun nothingToOverride(): Int = 1\n}\n";
    assert!(errors(source).is_empty());

    let bad = "open class Base\nclass Child : Base {\n    override fun greet(): String = \"x\"\n}\n";
    let errs = errors(bad);
    assert!(errs.iter().any(|e| e.contains("overrides nothing")));
}
