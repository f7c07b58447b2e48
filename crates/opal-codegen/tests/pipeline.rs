//! End-to-end lowering + optimization scenarios over real source.

use opal_codegen::mir::opt::{self, LocalCse, MirPass, StrengthReduction};
use opal_codegen::mir::{InstExtra, MirBinOp, MirFunction, MirModule, Op, Terminator};
use opal_common::diag::DiagnosticSink;

fn compile(source: &str) -> MirModule {
    let mut sink = DiagnosticSink::new();
    let program = opal_parser::parse(source, &mut sink);
    let analysis = opal_sema::analyze(&program, &mut sink);
    let errors: Vec<_> = sink
        .iter()
        .filter(|d| d.severity == opal_common::diag::Severity::Error)
        .collect();
    assert!(errors.is_empty(), "compile errors: {errors:?}");
    let mut counter = 0;
    opal_codegen::compile_to_mir(&program, &analysis, &mut counter)
}

fn compile_unoptimized(source: &str) -> MirModule {
    let mut sink = DiagnosticSink::new();
    let program = opal_parser::parse(source, &mut sink);
    let analysis = opal_sema::analyze(&program, &mut sink);
    assert!(!sink.has_errors());
    let mut counter = 0;
    opal_codegen::compile_to_unoptimized_mir(&program, &analysis, &mut counter)
}

fn find_function<'m>(module: &'m MirModule, name: &str) -> &'m MirFunction {
    module
        .functions
        .iter()
        .find(|f| f.name == name)
        .unwrap_or_else(|| panic!("no function `{name}`"))
}

fn invokes_of<'f>(function: &'f MirFunction, callee: &str) -> Vec<&'f InstExtra> {
    function
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter(|i| i.op.is_invoke())
        .map(|i| &i.extra)
        .filter(|e| matches!(e, InstExtra::Method(m) if m.name == callee))
        .collect()
}

// ── S5: tail-call elimination ──────────────────────────────────────────

#[test]
fn tail_recursive_sum_becomes_a_jump() {
    let module = compile(
        "fun sum(n: Int, acc: Int): Int = if (n <= 0) acc else sum(n - 1, acc + n)\n",
    );
    let sum = find_function(&module, "sum");

    assert!(
        invokes_of(sum, "sum").is_empty(),
        "no self-invocation may remain:\n{sum}"
    );
    let tail_calls: Vec<_> = sum
        .blocks
        .iter()
        .filter(|b| matches!(b.terminator, Terminator::TailCall { .. }))
        .collect();
    assert_eq!(tail_calls.len(), 1, "exactly one TailCall:\n{sum}");
    let Terminator::TailCall { entry } = tail_calls[0].terminator else {
        unreachable!()
    };
    assert_eq!(entry, sum.body_start);
}

// ── S6: CSE + strength reduction ───────────────────────────────────────

#[test]
fn cse_merges_duplicate_multiplies() {
    let mut module = compile_unoptimized("fun f(a: Int, b: Int): Int = (a * 2) + (a * 2)\n");
    let f = module
        .functions
        .iter_mut()
        .find(|f| f.name == "f")
        .unwrap();
    LocalCse.run(f);
    let muls = f
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter(|i| i.extra == InstExtra::BinOp(MirBinOp::Mul))
        .count();
    assert_eq!(muls, 1, "exactly one BINARY MUL after CSE:\n{f}");
    let adds = f
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter(|i| i.extra == InstExtra::BinOp(MirBinOp::Add))
        .count();
    assert!(adds >= 1, "the final BINARY ADD remains");
}

#[test]
fn strength_reduction_rewrites_times_two() {
    let mut module = compile_unoptimized("fun f(a: Int, b: Int): Int = (a * 2) + (a * 2)\n");
    let f = module
        .functions
        .iter_mut()
        .find(|f| f.name == "f")
        .unwrap();
    StrengthReduction.run(f);
    let muls = f
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter(|i| i.extra == InstExtra::BinOp(MirBinOp::Mul))
        .count();
    assert_eq!(muls, 0, "x * 2 becomes x + x:\n{f}");
    // The rewritten adds read the parameter twice.
    let param_adds = f
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter(|i| i.extra == InstExtra::BinOp(MirBinOp::Add) && i.operands == vec![0, 0])
        .count();
    assert_eq!(param_adds, 2);
}

// ── S7: when cascade CFG ───────────────────────────────────────────────

#[test]
fn when_over_int_produces_branch_cascade_with_merge() {
    let module = compile(
        "fun label(n: Int): String = when (n) {\n    1, 2 -> \"small\"\n    in 3..10 -> \"mid\"\n    else -> \"big\"\n}\n",
    );
    let label = find_function(&module, "label");

    let strings: Vec<&str> = label
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter_map(|i| match &i.extra {
            InstExtra::Const(opal_codegen::mir::ConstValue::Str(s)) => Some(s.as_str()),
            _ => None,
        })
        .collect();
    for expected in ["small", "mid", "big"] {
        assert!(
            strings.contains(&expected),
            "missing terminal constant {expected:?}:\n{label}"
        );
    }

    let branches = label
        .blocks
        .iter()
        .filter(|b| matches!(b.terminator, Terminator::Branch { .. }))
        .count();
    assert!(
        branches >= 2,
        "equality tests and the range test branch:\n{label}"
    );

    let returns = label
        .blocks
        .iter()
        .filter(|b| matches!(b.terminator, Terminator::Return { value } if value >= 0))
        .count();
    assert_eq!(returns, 1, "the branches join into a single return:\n{label}");
}

// ── Structural invariants ──────────────────────────────────────────────

const INVARIANT_SOURCES: &[&str] = &[
    "fun f(a: Int, b: Int): Int = (a * 2) + (a * 2)\n",
    "fun sum(n: Int, acc: Int): Int = if (n <= 0) acc else sum(n - 1, acc + n)\n",
    "fun loop(n: Int): Int {\n    var total = 0\n    for (i in 1..n) {\n        total = total + i\n    }\n    return total\n}\n",
    "fun risky(s: String): Int {\n    try {\n        return s.toInt()\n    } catch (e: Exception) {\n        return 0\n    } finally {\n        println(\"done\")\n    }\n}\n",
    "fun labels(n: Int): String = when (n) {\n    1 -> \"one\"\n    else -> \"other\"\n}\n",
];

fn check_invariants(function: &MirFunction) {
    let n = function.blocks.len() as u32;
    // Block ids are dense and self-describing.
    for (i, block) in function.blocks.iter().enumerate() {
        assert_eq!(block.id, i as u32, "dense ids in {}", function.name);
        // Every terminator target exists.
        for succ in block.terminator.successors() {
            assert!(succ < n, "target bb{succ} out of range in:\n{function}");
        }
    }
    assert!(function.body_start < n.max(1));
    // Exception table sanity.
    for entry in &function.try_catch {
        assert!(entry.try_start < entry.try_end, "{function}");
        assert!(entry.try_end <= n, "{function}");
        assert!(entry.handler < n, "{function}");
    }
    // Frame size covers every referenced register.
    let frame = function.frame_size();
    for block in &function.blocks {
        for inst in &block.instructions {
            for operand in &inst.operands {
                assert!(*operand < frame);
            }
            if inst.dest >= 0 {
                assert!((inst.dest as u32) < frame);
            }
        }
    }
}

#[test]
fn terminator_targets_and_exception_tables_are_well_formed() {
    for source in INVARIANT_SOURCES {
        let mut sink = DiagnosticSink::new();
        let program = opal_parser::parse(source, &mut sink);
        let analysis = opal_sema::analyze(&program, &mut sink);
        assert!(!sink.has_errors(), "invariant source must compile: {source}");
        let mut counter = 0;
        let module = opal_codegen::compile_to_mir(&program, &analysis, &mut counter);
        for function in &module.functions {
            check_invariants(function);
        }
        for class in &module.classes {
            for method in &class.methods {
                check_invariants(method);
            }
        }
    }
}

#[test]
fn optimizer_is_idempotent() {
    let sources = [
        "fun f(a: Int, b: Int): Int = (a * 2) + (a * 2)\n",
        "fun sum(n: Int, acc: Int): Int = if (n <= 0) acc else sum(n - 1, acc + n)\n",
        "fun loop(n: Int): Int {\n    var total = 0\n    for (i in 1..n) {\n        total = total + i\n    }\n    return total\n}\n",
    ];
    for source in sources {
        let module = compile(source);
        for function in &module.functions {
            let mut again = function.clone();
            opt::optimize_function(&mut again);
            assert_eq!(
                function.blocks, again.blocks,
                "second optimization run must not change {}:\nfirst:\n{}\nsecond:\n{}",
                function.name, function, again
            );
            assert_eq!(function.try_catch, again.try_catch);
            assert_eq!(function.body_start, again.body_start);
        }
    }
}

#[test]
fn loop_compiles_with_header_and_back_edge() {
    let module = compile(
        "fun total(n: Int): Int {\n    var total = 0\n    for (i in 1..n) {\n        total = total + i\n    }\n    return total\n}\n",
    );
    let total = find_function(&module, "total");
    // Some block branches back to an earlier block (the loop back edge,
    // possibly through the LICM pre-header).
    let has_back_edge = total.blocks.iter().any(|b| {
        b.terminator
            .successors()
            .iter()
            .any(|succ| *succ <= b.id && matches!(b.terminator, Terminator::Goto { .. } | Terminator::Branch { .. }))
    });
    assert!(has_back_edge, "expected a loop back edge:\n{total}");
}

#[test]
fn try_catch_registers_exception_entries() {
    let module = compile(
        "fun risky(s: String): Int {\n    try {\n        return s.toInt()\n    } catch (e: Exception) {\n        return 0\n    }\n}\n",
    );
    let risky = find_function(&module, "risky");
    assert_eq!(risky.try_catch.len(), 1, "{risky}");
    assert_eq!(risky.try_catch[0].exception_type, "java/lang/Exception");
}

#[test]
fn lambda_classes_are_numbered_by_the_pipeline_counter() {
    let mut sink = DiagnosticSink::new();
    let source = "fun f(xs: List<Int>): List<Int> = xs.map { it * 2 }\n";
    let program = opal_parser::parse(source, &mut sink);
    let analysis = opal_sema::analyze(&program, &mut sink);
    assert!(!sink.has_errors());

    // Two invocations against one counter: numbering continues.
    let mut counter = 0;
    let first = opal_codegen::compile_to_mir(&program, &analysis, &mut counter);
    let second = opal_codegen::compile_to_mir(&program, &analysis, &mut counter);
    let first_names: Vec<&str> = first
        .classes
        .iter()
        .filter(|c| c.name.starts_with("$Lambda$"))
        .map(|c| c.name.as_str())
        .collect();
    let second_names: Vec<&str> = second
        .classes
        .iter()
        .filter(|c| c.name.starts_with("$Lambda$"))
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(first_names, vec!["$Lambda$0"]);
    assert_eq!(second_names, vec!["$Lambda$1"]);
}

#[test]
fn extension_function_lowers_to_static_with_receiver_param() {
    let module = compile("fun Int.squared(): Int = this * this\nfun f(n: Int): Int = n.squared()\n");
    let squared = find_function(&module, "squared");
    assert!(squared.is_static);
    assert_eq!(squared.params.len(), 1, "receiver becomes a parameter");
    assert_eq!(squared.params[0].name, "this");
    assert_eq!(
        module.extension_metadata[0].receiver, "Int",
        "extension metadata survives to the module"
    );
}
