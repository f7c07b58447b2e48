//! The MIR pass pipeline.
//!
//! Passes run per function in a fixed order: dead-block elimination,
//! loop-invariant code motion, tail-call elimination, strength reduction,
//! local CSE, peephole, block merging, and a final dead-block cleanup.
//! Each pass consumes the function in place; none retains references
//! afterwards. The pipeline is idempotent: a second run leaves the MIR
//! structurally unchanged.

pub mod block_merge;
pub mod cse;
pub mod dead_blocks;
pub mod licm;
pub mod peephole;
pub mod strength;
pub mod tailcall;

use super::{MirFunction, MirModule};

pub use block_merge::BlockMerging;
pub use cse::LocalCse;
pub use dead_blocks::DeadBlockElimination;
pub use licm::LoopInvariantCodeMotion;
pub use peephole::Peephole;
pub use strength::StrengthReduction;
pub use tailcall::TailCallElimination;

/// One optimization pass over a single function.
pub trait MirPass {
    fn name(&self) -> &'static str;
    fn run(&self, function: &mut MirFunction);
}

/// The fixed pass order.
pub fn passes() -> Vec<Box<dyn MirPass>> {
    vec![
        Box::new(DeadBlockElimination),
        Box::new(LoopInvariantCodeMotion),
        Box::new(TailCallElimination),
        Box::new(StrengthReduction),
        Box::new(LocalCse),
        Box::new(Peephole),
        Box::new(BlockMerging),
        Box::new(DeadBlockElimination),
    ]
}

pub fn optimize_function(function: &mut MirFunction) {
    for pass in passes() {
        pass.run(function);
        function.invalidate_frame_size();
    }
}

pub fn optimize_module(module: &mut MirModule) {
    for function in module.functions.iter_mut() {
        optimize_function(function);
    }
    for class in module.classes.iter_mut() {
        for method in class.methods.iter_mut() {
            optimize_function(method);
        }
    }
}

/// Reverse-postorder over reachable blocks starting at `body_start`.
pub(crate) fn reverse_postorder(function: &MirFunction) -> Vec<u32> {
    let n = function.blocks.len();
    let mut visited = vec![false; n];
    let mut postorder = Vec::with_capacity(n);
    // Iterative DFS with an explicit "children done" marker.
    let mut stack: Vec<(u32, bool)> = vec![(function.body_start, false)];
    while let Some((block, done)) = stack.pop() {
        if done {
            postorder.push(block);
            continue;
        }
        if visited[block as usize] {
            continue;
        }
        visited[block as usize] = true;
        stack.push((block, true));
        for succ in function.blocks[block as usize].terminator.successors() {
            if !visited[succ as usize] {
                stack.push((succ, false));
            }
        }
    }
    postorder.reverse();
    postorder
}
