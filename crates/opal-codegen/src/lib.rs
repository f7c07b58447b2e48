// Opal code generation: HIR + MIR lowering and the MIR pass pipeline.

pub mod descriptor;
pub mod emit;
pub mod hir;
pub mod mir;

use opal_parser::ast::Program;
use opal_sema::Analysis;

use mir::MirModule;

/// Lower an analyzed program all the way to optimized MIR.
///
/// `lambda_counter` is owned by the pipeline instance and increments per
/// lowered lambda, so repeated invocations (REPL-style reuse) never collide
/// on `$Lambda$N` class names.
pub fn compile_to_mir(
    program: &Program,
    analysis: &Analysis,
    lambda_counter: &mut u32,
) -> MirModule {
    let mut hir = hir::lower::lower(program, analysis, lambda_counter);
    hir::opt::optimize(&mut hir);
    let mut module = mir::lower::lower(&hir);
    mir::opt::optimize_module(&mut module);
    module
}

/// Lower without running the MIR pass pipeline (tests and `--emit mir`
/// comparisons).
pub fn compile_to_unoptimized_mir(
    program: &Program,
    analysis: &Analysis,
    lambda_counter: &mut u32,
) -> MirModule {
    let mut hir = hir::lower::lower(program, analysis, lambda_counter);
    hir::opt::optimize(&mut hir);
    mir::lower::lower(&hir)
}
