//! Declaration-site variance checking.

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

fn variance_warnings(source: &str) -> Vec<String> {
    diagnostics(source)
        .into_iter()
        .filter(|(severity, message)| {
            *severity == Severity::Warning && message.contains("position")
        })
        .map(|(_, message)| message)
        .collect()
}

#[test]
fn covariant_box_is_clean() {
    // `T` appears only in OUT positions.
    let source = "class Box<out T>(val v: T) { fun get(): T = v }\n";
    let diags = diagnostics(source);
    assert!(diags.is_empty(), "expected no diagnostics, got {diags:?}");
}

#[test]
fn contravariant_return_warns() {
    let source = "fun bad<in T>(): T\n";
    let warnings = variance_warnings(source);
    assert_eq!(warnings.len(), 1, "expected exactly one variance warning");
    assert!(
        warnings[0].contains("`in T`") && warnings[0].contains("covariant"),
        "warning should name `in T` in a covariant position: {}",
        warnings[0]
    );
}

#[test]
fn covariant_param_position_warns() {
    let source = "class Sink<out T> { fun put(value: T): Unit {} }\n";
    let warnings = variance_warnings(source);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("`out T`"));
    assert!(warnings[0].contains("contravariant"));
}

#[test]
fn var_property_is_invariant_position() {
    let source = "class Cell<out T>(var v: T)\n";
    let warnings = variance_warnings(source);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("invariant"));
}

#[test]
fn contravariant_consumer_is_clean() {
    let source = "class Consumer<in T> { fun accept(value: T): Unit {} }\n";
    assert!(variance_warnings(source).is_empty());
}

#[test]
fn function_type_parameter_flips_position() {
    // `(T) -> Unit` as a method parameter puts T back into OUT position,
    // which is fine for `out T`.
    let source = "class Emitter<out T> { fun each(action: (T) -> Unit): Unit {} }\n";
    assert!(variance_warnings(source).is_empty());
}

#[test]
fn in_annotated_argument_flips() {
    // Comparable<in T>-style: `in T` use-site argument flips OUT back to
    // IN, so a declared `in T` is accepted there.
    let source = "class Checker<in T> { fun comparator(): Box<in T> = error(\"x\")\n}\nclass Box<in U>\n";
    assert!(variance_warnings(source).is_empty());
}

#[test]
fn variance_is_a_warning_not_an_error() {
    let source = "fun bad<in T>(): T\n";
    let diags = diagnostics(source);
    assert!(diags
        .iter()
        .all(|(severity, _)| *severity != Severity::Error));
}
