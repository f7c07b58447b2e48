// Opal parser -- owned AST + hand-written recursive descent.

pub mod ast;
mod parser;

use opal_common::diag::DiagnosticSink;
use opal_lexer::Lexer;

use ast::Program;
use parser::Parser;

/// Parse a compilation unit. Diagnostics (lexical and syntactic) accumulate
/// in `sink`; the returned program contains error-recovery nodes where
/// parsing failed.
pub fn parse(source: &str, sink: &mut DiagnosticSink) -> Program {
    let tokens = Lexer::tokenize(source, sink);
    let mut parser = Parser::new(tokens, source, sink, 0);
    parser.parse_program()
}

#[cfg(test)]
mod tests {
    use super::ast::*;
    use super::*;

    fn parse_ok(source: &str) -> Program {
        let mut sink = DiagnosticSink::new();
        let program = parse(source, &mut sink);
        assert!(
            !sink.has_errors(),
            "unexpected parse errors: {:?}",
            sink.iter().collect::<Vec<_>>()
        );
        program
    }

    fn parse_errs(source: &str) -> (Program, Vec<String>) {
        let mut sink = DiagnosticSink::new();
        let program = parse(source, &mut sink);
        let messages = sink.iter().map(|d| d.message.clone()).collect();
        (program, messages)
    }

    /// First declaration as a function, or panic.
    fn first_fun(program: &Program) -> &FunDecl {
        match &program.decls[0] {
            Decl::Fun(f) => f,
            other => panic!("expected function, got {other:?}"),
        }
    }

    /// The single expression of an expression-bodied function.
    fn fun_body_expr(program: &Program) -> &Expr {
        match first_fun(program).body.as_ref().unwrap() {
            FunBody::Expr(e) => e,
            FunBody::Block(_) => panic!("expected expression body"),
        }
    }

    #[test]
    fn parse_package_and_imports() {
        let program = parse_ok("package demo.app\nimport lib.io.File\nimport lib.util.*\nimport lib.net.Socket as Sock\n");
        assert_eq!(program.package.as_ref().unwrap().name.dotted(), "demo.app");
        assert_eq!(program.imports.len(), 3);
        assert!(!program.imports[0].wildcard);
        assert!(program.imports[1].wildcard);
        assert_eq!(program.imports[2].alias.as_ref().unwrap().name, "Sock");
    }

    #[test]
    fn parse_simple_function() {
        let program = parse_ok("fun add(a: Int, b: Int): Int = a + b\n");
        let f = first_fun(&program);
        assert_eq!(f.name.name, "add");
        assert_eq!(f.params.len(), 2);
        assert!(f.return_type.is_some());
    }

    #[test]
    fn parse_extension_function_receiver() {
        let program = parse_ok("fun Int.squared(): Int = this * this\n");
        let f = first_fun(&program);
        assert!(f.receiver.is_some());
        assert_eq!(f.name.name, "squared");
    }

    #[test]
    fn parse_class_with_variance_and_primary_ctor() {
        let program = parse_ok("class Box<out T>(val v: T) { fun get(): T = v }\n");
        let Decl::Class(class) = &program.decls[0] else {
            panic!("expected class");
        };
        assert_eq!(class.type_params.len(), 1);
        assert_eq!(class.type_params[0].variance, Variance::Out);
        assert_eq!(class.primary_params.len(), 1);
        assert_eq!(class.primary_params[0].property, Some(false));
        assert_eq!(class.members.len(), 1);
    }

    #[test]
    fn parse_enum_with_members() {
        let program =
            parse_ok("enum class Color(val rgb: Int) { RED(1), GREEN(2); fun hex(): Int = rgb }\n");
        let Decl::Enum(e) = &program.decls[0] else {
            panic!("expected enum");
        };
        assert_eq!(e.entries.len(), 2);
        assert_eq!(e.entries[0].name.name, "RED");
        assert_eq!(e.members.len(), 1);
    }

    #[test]
    fn pipeline_binds_below_elvis() {
        // `a ?: b |> f` must parse as `(a ?: b) |> f`.
        let program = parse_ok("fun t(a: Int?, b: Int): Int = a ?: b |> f\n");
        let body = fun_body_expr(&program);
        let ExprKind::Pipeline { lhs, .. } = &body.kind else {
            panic!("expected pipeline at the top, got {:?}", body.kind);
        };
        assert!(matches!(lhs.kind, ExprKind::Elvis { .. }));
    }

    #[test]
    fn generic_call_vs_comparison() {
        // `f<Int>(x)` is a generic call; `a < b` stays a comparison.
        let program = parse_ok("fun t1(x: Int): Int = f<Int>(x)\nfun t2(a: Int, b: Int): Bool = a < b\n");
        let ExprKind::Call { type_args, .. } = &fun_body_expr(&program).kind else {
            panic!("expected call");
        };
        assert_eq!(type_args.len(), 1);
        let Decl::Fun(f2) = &program.decls[1] else { panic!() };
        let FunBody::Expr(body2) = f2.body.as_ref().unwrap() else { panic!() };
        assert!(matches!(
            body2.kind,
            ExprKind::Binary { op: BinaryOp::Lt, .. }
        ));
    }

    #[test]
    fn trailing_lambda_attaches_to_call() {
        let program = parse_ok("fun t(xs: List<Int>): List<Int> = xs.map { it * 2 }\n");
        let ExprKind::Call { callee, args, .. } = &fun_body_expr(&program).kind else {
            panic!("expected call");
        };
        assert!(matches!(callee.kind, ExprKind::Member { .. }));
        assert_eq!(args.len(), 1);
        assert!(matches!(args[0].value.kind, ExprKind::Lambda { .. }));
    }

    #[test]
    fn trailing_lambda_after_paren_args() {
        let program = parse_ok("fun t(xs: List<Int>): Int = xs.fold(0) { acc, x -> acc + x }\n");
        let ExprKind::Call { args, .. } = &fun_body_expr(&program).kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        let ExprKind::Lambda { params, .. } = &args[1].value.kind else {
            panic!("expected lambda");
        };
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn when_with_subject_binding() {
        let program = parse_ok(
            "fun t(n: Int): Int = when (val x = n * 2) {\n    1, 2 -> x\n    in 3..10 -> 0\n    else -> 1\n}\n",
        );
        let ExprKind::When(when) = &fun_body_expr(&program).kind else {
            panic!("expected when");
        };
        let subject = when.subject.as_ref().unwrap();
        assert_eq!(subject.binding.as_ref().unwrap().name, "x");
        assert_eq!(when.branches.len(), 3);
        assert_eq!(when.branches[0].conditions.len(), 2);
        assert!(matches!(
            when.branches[1].conditions[0],
            WhenCondition::In { negated: false, .. }
        ));
        assert!(matches!(when.branches[2].conditions[0], WhenCondition::Else));
    }

    #[test]
    fn safe_call_elvis_notnull_propagate() {
        let program = parse_ok("fun t(s: String?): Int = s?.length ?: 0\n");
        let ExprKind::Elvis { lhs, .. } = &fun_body_expr(&program).kind else {
            panic!("expected elvis");
        };
        assert!(matches!(lhs.kind, ExprKind::SafeMember { .. }));

        let program = parse_ok("fun t2(s: String?): Int = s!!.length\n");
        let ExprKind::Member { target, .. } = &fun_body_expr(&program).kind else {
            panic!("expected member");
        };
        assert!(matches!(target.kind, ExprKind::NotNull { .. }));

        let program = parse_ok("fun t3(r: Result): Int = parse(r)?\n");
        assert!(matches!(
            fun_body_expr(&program).kind,
            ExprKind::Propagate { .. }
        ));
    }

    #[test]
    fn ternary_with_spaced_question() {
        let program = parse_ok("fun t(c: Bool): Int = c ? 1 : 2\n");
        assert!(matches!(
            fun_body_expr(&program).kind,
            ExprKind::Conditional { .. }
        ));
    }

    #[test]
    fn safe_index_requires_adjacency() {
        let program = parse_ok("fun t(xs: List<Int>?): Int? = xs?[0]\n");
        assert!(matches!(
            fun_body_expr(&program).kind,
            ExprKind::SafeIndex { .. }
        ));
    }

    #[test]
    fn slice_from_range_index() {
        let program = parse_ok("fun t(xs: List<Int>): List<Int> = xs[1..<3]\n");
        let ExprKind::Slice { inclusive, .. } = &fun_body_expr(&program).kind else {
            panic!("expected slice");
        };
        assert!(!inclusive);
    }

    #[test]
    fn range_with_step() {
        let program = parse_ok("fun t(): Int = sum(1..10 step 2)\n");
        let ExprKind::Call { args, .. } = &fun_body_expr(&program).kind else {
            panic!("expected call");
        };
        let ExprKind::Range { step, .. } = &args[0].value.kind else {
            panic!("expected range");
        };
        assert!(step.is_some());
    }

    #[test]
    fn collection_literals() {
        let program = parse_ok("fun t(): Int = use3([1, 2], [\"a\": 1], #{1, 2})\n");
        let ExprKind::Call { args, .. } = &fun_body_expr(&program).kind else {
            panic!("expected call");
        };
        let kinds: Vec<_> = args
            .iter()
            .map(|a| match &a.value.kind {
                ExprKind::CollectionLiteral { kind, .. } => *kind,
                other => panic!("expected collection literal, got {other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![CollectionKind::List, CollectionKind::Map, CollectionKind::Set]
        );
    }

    #[test]
    fn string_interpolation_subparse() {
        let program = parse_ok("fun greet(name: String): String = \"hello ${name.trim()}!\"\n");
        let ExprKind::StringInterp { parts } = &fun_body_expr(&program).kind else {
            panic!("expected interpolation");
        };
        assert_eq!(parts.len(), 3);
        let InterpPart::Expr(e) = &parts[1] else {
            panic!("expected expression part");
        };
        assert!(matches!(e.kind, ExprKind::Call { .. }));
        // Sub-parsed spans are absolute into the original source.
        assert!(e.span.start > 30);
    }

    #[test]
    fn named_and_spread_args() {
        let program = parse_ok("fun t(): Int = f(1, b = 2, *rest)\n");
        let ExprKind::Call { args, .. } = &fun_body_expr(&program).kind else {
            panic!("expected call");
        };
        assert!(args[0].name.is_none());
        assert_eq!(args[1].name.as_ref().unwrap().name, "b");
        assert!(args[2].spread);
    }

    #[test]
    fn labeled_loop_with_break() {
        let program = parse_ok(
            "fun t() {\n    outer@ for (i in 1..3) {\n        while (true) { break@outer }\n    }\n}\n",
        );
        let FunBody::Block(body) = first_fun(&program).body.as_ref().unwrap() else {
            panic!();
        };
        let Stmt::For(for_stmt) = &body.stmts[0] else {
            panic!("expected for, got {:?}", body.stmts[0]);
        };
        assert_eq!(for_stmt.label.as_ref().unwrap().name, "outer");
    }

    #[test]
    fn guard_statement_promotes_softly() {
        let program = parse_ok("fun t(x: Int?) {\n    guard x != null else { return }\n    guard(x)\n}\n");
        let FunBody::Block(body) = first_fun(&program).body.as_ref().unwrap() else {
            panic!();
        };
        assert!(matches!(body.stmts[0], Stmt::Guard(_)));
        // A plain call to a function named `guard` is not promoted.
        assert!(matches!(body.stmts[1], Stmt::Expr(_)));
    }

    #[test]
    fn use_statement() {
        let program = parse_ok("fun t() {\n    use (f = open(\"x\")) {\n        f.read()\n    }\n}\n");
        let FunBody::Block(body) = first_fun(&program).body.as_ref().unwrap() else {
            panic!();
        };
        let Stmt::Use(use_stmt) = &body.stmts[0] else {
            panic!("expected use statement");
        };
        assert_eq!(use_stmt.bindings.len(), 1);
        assert_eq!(use_stmt.bindings[0].name.name, "f");
    }

    #[test]
    fn method_reference_and_constructor_ref() {
        let program = parse_ok("fun t(): Int = apply(Builder::new, obj::render)\n");
        let ExprKind::Call { args, .. } = &fun_body_expr(&program).kind else {
            panic!();
        };
        let ExprKind::MethodRef { is_constructor, .. } = &args[0].value.kind else {
            panic!("expected method ref");
        };
        assert!(is_constructor);
        let ExprKind::MethodRef { is_constructor, .. } = &args[1].value.kind else {
            panic!("expected method ref");
        };
        assert!(!is_constructor);
    }

    #[test]
    fn newline_continues_method_chain() {
        let program = parse_ok("fun t(xs: List<Int>): Int = xs\n    .filter { it > 0 }\n    .size\n");
        assert!(matches!(
            fun_body_expr(&program).kind,
            ExprKind::Member { .. }
        ));
    }

    #[test]
    fn newline_terminates_statement() {
        let program = parse_ok("fun t() {\n    val a = 1\n    val b = 2\n}\n");
        let FunBody::Block(body) = first_fun(&program).body.as_ref().unwrap() else {
            panic!();
        };
        assert_eq!(body.stmts.len(), 2);
    }

    #[test]
    fn destructuring_declaration() {
        let program = parse_ok("fun t(p: Pair) {\n    val (a, _, c) = p\n}\n");
        let FunBody::Block(body) = first_fun(&program).body.as_ref().unwrap() else {
            panic!();
        };
        let Stmt::Decl(decl) = &body.stmts[0] else { panic!() };
        let Decl::Destructuring(d) = decl.as_ref() else {
            panic!("expected destructuring");
        };
        assert_eq!(d.names.len(), 3);
        assert!(d.names[1].is_none());
    }

    #[test]
    fn secondary_constructor_and_init() {
        let program = parse_ok(
            "class P(val x: Int) {\n    init { check(x) }\n    constructor(other: P) : this(other.x) { log() }\n}\n",
        );
        let Decl::Class(class) = &program.decls[0] else { panic!() };
        assert!(matches!(class.members[0], Member::Init(_)));
        let Member::Constructor(ctor) = &class.members[1] else {
            panic!("expected constructor");
        };
        assert!(matches!(
            ctor.delegation.as_ref().unwrap().kind,
            DelegationKind::This
        ));
    }

    #[test]
    fn object_and_companion() {
        let program = parse_ok("object Registry { fun get(): Int = 1 }\nclass C { companion object { val id: Int = 7 } }\n");
        assert!(matches!(program.decls[0], Decl::Object(_)));
        let Decl::Class(class) = &program.decls[1] else { panic!() };
        let Member::Object(companion) = &class.members[0] else {
            panic!("expected companion");
        };
        assert!(companion.is_companion);
    }

    #[test]
    fn recovery_continues_after_error() {
        let (program, messages) = parse_errs("fun bad( {\n}\nfun good(): Int = 1\n");
        assert!(!messages.is_empty());
        // The parser recovered and still saw the next declaration.
        assert!(program
            .decls
            .iter()
            .any(|d| matches!(d, Decl::Fun(f) if f.name.name == "good")));
    }

    #[test]
    fn node_spans_nest_within_parents() {
        let program = parse_ok("fun t(a: Int): Int = (a + 1) * 2\n");
        let f = first_fun(&program);
        let body = fun_body_expr(&program);
        assert!(f.span.contains(body.span));
        if let ExprKind::Binary { lhs, rhs, .. } = &body.kind {
            assert!(body.span.contains(lhs.span));
            assert!(body.span.contains(rhs.span));
        }
    }

    #[test]
    fn ast_serializes_to_json() {
        let program = parse_ok("fun id(x: Int): Int = x\n");
        let json = serde_json::to_string(&program).expect("AST is serializable");
        assert!(json.contains("\"name\":\"id\""));
    }

    #[test]
    fn node_ids_are_unique() {
        let program = parse_ok("fun t(a: Int): Int = a + a * a\n");
        let mut seen = std::collections::HashSet::new();
        fn walk(e: &Expr, seen: &mut std::collections::HashSet<u32>) {
            assert!(seen.insert(e.id.0), "duplicate node id {:?}", e.id);
            if let ExprKind::Binary { lhs, rhs, .. } = &e.kind {
                walk(lhs, seen);
                walk(rhs, seen);
            }
        }
        walk(fun_body_expr(&program), &mut seen);
        assert!(seen.len() >= 5);
    }

    #[test]
    fn where_clause_merges_bounds() {
        let program = parse_ok("fun <T> max(a: T, b: T): T where T : Comparable = a\n");
        let f = first_fun(&program);
        assert!(f.type_params[0].upper_bound.is_some());
    }

    #[test]
    fn typealias_decl() {
        let program = parse_ok("typealias Handler = (Int) -> Unit\n");
        let Decl::TypeAlias(alias) = &program.decls[0] else { panic!() };
        assert_eq!(alias.name.name, "Handler");
        assert!(matches!(alias.ty.kind, TypeRefKind::Function { .. }));
    }
}
