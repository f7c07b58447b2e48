//! Compilation pipeline orchestration.
//!
//! One [`Compiler`] instance owns one pipeline's cross-invocation state:
//! the lambda-class counter. Compiling a source unit runs lex -> parse ->
//! sema -> HIR -> MIR -> pass pipeline in strict sequence; each stage's
//! input is released as soon as the next representation exists. Artifacts
//! are produced only when no error-severity diagnostic was collected
//! during lexing, parsing, or semantic analysis.

pub mod report;

use opal_codegen::emit::{Backend, TextBackend};
use opal_common::diag::{Diagnostic, DiagnosticSink};
use rustc_hash::FxHashMap;

/// The result of compiling one source unit.
#[derive(Debug)]
pub struct Compilation {
    pub diagnostics: Vec<Diagnostic>,
    /// Present only when no error diagnostic occurred.
    pub artifacts: Option<FxHashMap<String, Vec<u8>>>,
}

impl Compilation {
    pub fn has_errors(&self) -> bool {
        self.artifacts.is_none()
    }
}

/// A compilation pipeline instance.
///
/// Reusing one compiler across units (REPL-style) keeps `$Lambda$N`
/// numbering monotonic, so emitted closure classes never collide.
#[derive(Debug, Default)]
pub struct Compiler {
    lambda_counter: u32,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile with the in-tree MIR text backend.
    pub fn compile(&mut self, source: &str, file: &str) -> Compilation {
        self.compile_with_backend(source, file, &mut TextBackend)
    }

    /// Compile against a caller-supplied backend.
    pub fn compile_with_backend(
        &mut self,
        source: &str,
        _file: &str,
        backend: &mut dyn Backend,
    ) -> Compilation {
        let mut sink = DiagnosticSink::new();

        let program = opal_parser::parse(source, &mut sink);
        let analysis = opal_sema::analyze(&program, &mut sink);

        // Lowering and the optimizer pipeline run regardless of errors
        // (errored subtrees degrade to placeholders); only code emission
        // is gated on a clean diagnostic set.
        let module = opal_codegen::compile_to_mir(&program, &analysis, &mut self.lambda_counter);
        // The tree-shaped representations are no longer needed.
        drop(program);
        drop(analysis);

        let artifacts = if sink.has_errors() {
            None
        } else {
            Some(backend.emit(&module))
        };
        Compilation {
            diagnostics: sink.into_vec(),
            artifacts,
        }
    }

    /// Diagnostics only -- no code generation.
    pub fn check(&mut self, source: &str, _file: &str) -> Vec<Diagnostic> {
        let mut sink = DiagnosticSink::new();
        let program = opal_parser::parse(source, &mut sink);
        opal_sema::analyze(&program, &mut sink);
        sink.into_vec()
    }

    /// Optimized MIR as text (the `--emit mir` surface).
    pub fn emit_mir(&mut self, source: &str, _file: &str) -> Result<String, Vec<Diagnostic>> {
        let mut sink = DiagnosticSink::new();
        let program = opal_parser::parse(source, &mut sink);
        let analysis = opal_sema::analyze(&program, &mut sink);
        if sink.has_errors() {
            return Err(sink.into_vec());
        }
        let module = opal_codegen::compile_to_mir(&program, &analysis, &mut self.lambda_counter);
        let mut out = String::new();
        for function in &module.functions {
            out.push_str(&function.to_string());
            out.push('\n');
        }
        for class in &module.classes {
            for method in &class.methods {
                out.push_str(&method.to_string());
                out.push('\n');
            }
        }
        Ok(out)
    }
}
