//! Type inference and resolution behavior.

use opal_common::diag::DiagnosticSink;
use opal_sema::{Analysis, Type};

fn analyze_clean(source: &str) -> Analysis {
    let mut sink = DiagnosticSink::new();
    let program = opal_parser::parse(source, &mut sink);
    let analysis = opal_sema::analyze(&program, &mut sink);
    let errors: Vec<_> = sink
        .iter()
        .filter(|d| d.severity == opal_common::diag::Severity::Error)
        .collect();
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    analysis
}

/// Type of the expression body of the last function in the program.
fn last_fun_body_type(source: &str) -> Type {
    let mut sink = DiagnosticSink::new();
    let program = opal_parser::parse(source, &mut sink);
    let analysis = opal_sema::analyze(&program, &mut sink);
    let fun = program
        .decls
        .iter()
        .rev()
        .find_map(|d| match d {
            opal_parser::ast::Decl::Fun(f) => Some(f),
            _ => None,
        })
        .expect("no function");
    match fun.body.as_ref().expect("no body") {
        opal_parser::ast::FunBody::Expr(e) => analysis.type_of(e.id),
        opal_parser::ast::FunBody::Block(_) => panic!("expected expression body"),
    }
}

#[test]
fn numeric_promotion_in_arithmetic() {
    assert_eq!(
        last_fun_body_type("fun f(a: Int, b: Long): Long = a + b\n"),
        Type::long()
    );
    assert_eq!(
        last_fun_body_type("fun f(a: Int, b: Double): Double = a * b\n"),
        Type::double()
    );
}

#[test]
fn string_concat_is_syntactic() {
    assert_eq!(
        last_fun_body_type("fun f(a: Int): String = \"n=\" + a\n"),
        Type::string()
    );
    assert_eq!(
        last_fun_body_type("fun f(a: Int): String = a + \"!\"\n"),
        Type::string()
    );
}

#[test]
fn safe_call_makes_result_nullable() {
    assert_eq!(
        last_fun_body_type("fun f(s: String?): Int? = s?.length\n"),
        Type::int().with_nullable(true)
    );
}

#[test]
fn elvis_strips_nullability() {
    assert_eq!(
        last_fun_body_type("fun f(s: String?): String = s ?: \"fallback\"\n"),
        Type::string()
    );
}

#[test]
fn elvis_with_diverging_rhs() {
    assert_eq!(
        last_fun_body_type("fun f(s: String?): String = s ?: error(\"nope\")\n"),
        Type::string()
    );
}

#[test]
fn not_null_assertion_strips_nullability() {
    assert_eq!(
        last_fun_body_type("fun f(s: String?): String = s!!\n"),
        Type::string()
    );
}

#[test]
fn lambda_parameter_inferred_from_expected_type() {
    let analysis = analyze_clean("fun f(xs: List<Int>): List<Int> = xs.map { it * 2 }\n");
    // The map result type must come out as List<Int> via R binding.
    let list_int = Type::list(Type::int());
    assert!(
        analysis.types.values().any(|t| *t == list_int),
        "no List<Int> anywhere in the type table"
    );
}

#[test]
fn generic_fold_binds_accumulator() {
    assert_eq!(
        last_fun_body_type("fun f(xs: List<Int>): Int = xs.fold(0) { acc, x -> acc + x }\n"),
        Type::int()
    );
}

#[test]
fn val_type_inferred_from_initializer() {
    let source = "fun f(): Long {\n    val x = 10L\n    return x\n}\n";
    analyze_clean(source);
}

#[test]
fn range_types() {
    assert_eq!(
        last_fun_body_type("fun f(): IntRange = 1..10\n"),
        Type::class("IntRange")
    );
    assert_eq!(
        last_fun_body_type("fun f(a: Long): LongRange = 1L..a\n"),
        Type::class("LongRange")
    );
}

#[test]
fn pair_from_to_operator() {
    assert_eq!(
        last_fun_body_type("fun f(): Pair<String, Int> = \"a\" to 1\n"),
        Type::pair(Type::string(), Type::int())
    );
}

#[test]
fn when_expression_joins_branches() {
    let source = "fun f(n: Int): String = when {\n    n < 0 -> \"neg\"\n    else -> \"pos\"\n}\n";
    assert_eq!(last_fun_body_type(source), Type::string());
}

#[test]
fn collection_literal_element_inference() {
    assert_eq!(
        last_fun_body_type("fun f(): List<Int> = [1, 2, 3]\n"),
        Type::list(Type::int())
    );
    assert_eq!(
        last_fun_body_type("fun f(): Map<String, Int> = [\"a\": 1]\n"),
        Type::map(Type::string(), Type::int())
    );
}

#[test]
fn extension_function_receiver() {
    let source = "fun Int.squared(): Int = this * this\nfun f(n: Int): Int = n.squared()\n";
    assert_eq!(last_fun_body_type(source), Type::int());
}

#[test]
fn expression_body_return_inferred_in_order() {
    let source = "fun base(): Int = 41\nfun f(): Int = base() + 1\n";
    analyze_clean(source);
}

#[test]
fn smart_cast_after_null_check() {
    let source =
        "fun f(s: String?): Int {\n    if (s != null) {\n        return s.length\n    }\n    return 0\n}\n";
    analyze_clean(source);
}

#[test]
fn guard_narrows_following_statements() {
    let source =
        "fun f(s: String?): Int {\n    guard s != null else { return 0 }\n    return s.length\n}\n";
    analyze_clean(source);
}

#[test]
fn data_class_destructuring() {
    let source = "data class Point(val x: Int, val y: Int)\nfun f(p: Point): Int {\n    val (a, b) = p\n    return a + b\n}\n";
    analyze_clean(source);
}

#[test]
fn enum_entry_access() {
    let source = "enum class Color { RED, GREEN }\nfun f(): Color = Color.RED\n";
    assert_eq!(last_fun_body_type(source), Type::class("Color"));
}

#[test]
fn pipeline_typing() {
    let source = "fun double(n: Int): Int = n * 2\nfun f(n: Int): Int = n |> double\n";
    assert_eq!(last_fun_body_type(source), Type::int());
}

#[test]
fn pipeline_with_placeholder() {
    let source = "fun clamp(n: Int, hi: Int): Int = min(n, hi)\nfun f(n: Int): Int = n |> clamp(_, 10)\n";
    assert_eq!(last_fun_body_type(source), Type::int());
}

#[test]
fn error_propagation_unwraps_result() {
    let source = "fun parse(s: String): Result<Int, String> = Ok(s.toInt())\nfun f(s: String): Result<Int, String> = Ok(parse(s)? + 1)\n";
    analyze_clean(source);
}
