//! Loop-invariant code motion.
//!
//! Dominators come from the iterative meet-over-predecessors formulation.
//! A back-edge is `t -> h` where `h` dominates `t`; its natural loop is the
//! set of blocks that can reach `t` without passing through `h`, plus `h`.
//! Loops sharing a header are merged. Invariant instructions -- pure ops
//! whose destination is defined exactly once in the loop and whose operands
//! are loop-invariant (to a fixed point) -- move into a fresh pre-header
//! that takes over all external edges into the header.

use rustc_hash::{FxHashMap, FxHashSet};

use super::{reverse_postorder, MirPass};
use crate::mir::{BasicBlock, MirFunction, Op, Terminator};

pub struct LoopInvariantCodeMotion;

impl MirPass for LoopInvariantCodeMotion {
    fn name(&self) -> &'static str {
        "loop-invariant-code-motion"
    }

    fn run(&self, function: &mut MirFunction) {
        if function.blocks.len() < 2 {
            return;
        }
        let doms = dominators(function);
        let rpo = reverse_postorder(function);

        // Back edges, grouped by header (loops sharing a header merge).
        // TailCall edges are parameter rebinds, not structural loops; the
        // pipeline must stay idempotent after tail-call elimination.
        let mut loops: FxHashMap<u32, FxHashSet<u32>> = FxHashMap::default();
        for &t in &rpo {
            let terminator = &function.blocks[t as usize].terminator;
            if matches!(terminator, Terminator::TailCall { .. }) {
                continue;
            }
            for h in terminator.successors() {
                if doms[t as usize].contains(&h) {
                    let body = natural_loop(function, h, t);
                    loops.entry(h).or_default().extend(body);
                }
            }
        }

        let mut headers: Vec<u32> = loops.keys().copied().collect();
        headers.sort_unstable();
        for header in headers {
            let body = &loops[&header];
            hoist_loop(function, header, body);
        }
    }
}

/// Dominator sets by iterative meet over predecessors in RPO.
fn dominators(function: &MirFunction) -> Vec<FxHashSet<u32>> {
    let n = function.blocks.len();
    let preds = function.predecessors();
    let rpo = reverse_postorder(function);
    let entry = function.body_start;

    let all: FxHashSet<u32> = (0..n as u32).collect();
    let mut doms: Vec<FxHashSet<u32>> = vec![all; n];
    doms[entry as usize] = std::iter::once(entry).collect();

    let mut changed = true;
    while changed {
        changed = false;
        for &b in &rpo {
            if b == entry {
                continue;
            }
            let mut meet: Option<FxHashSet<u32>> = None;
            for &p in &preds[b as usize] {
                meet = Some(match meet {
                    None => doms[p as usize].clone(),
                    Some(acc) => acc.intersection(&doms[p as usize]).copied().collect(),
                });
            }
            let mut new = meet.unwrap_or_default();
            new.insert(b);
            if new != doms[b as usize] {
                doms[b as usize] = new;
                changed = true;
            }
        }
    }
    doms
}

/// Blocks that reach `tail` without passing through `header`, plus the
/// header itself.
fn natural_loop(function: &MirFunction, header: u32, tail: u32) -> FxHashSet<u32> {
    let preds = function.predecessors();
    let mut body: FxHashSet<u32> = std::iter::once(header).collect();
    let mut stack = vec![tail];
    while let Some(b) = stack.pop() {
        if body.insert(b) {
            for &p in &preds[b as usize] {
                stack.push(p);
            }
        }
    }
    body
}

/// Ops that may be hoisted when their inputs are invariant.
fn hoistable(op: Op) -> bool {
    op.is_const()
        || matches!(
            op,
            Op::Move | Op::Binary | Op::Unary | Op::TypeCheck | Op::TypeCast
        )
}

fn hoist_loop(function: &mut MirFunction, header: u32, body: &FxHashSet<u32>) {
    // Definition counts inside the loop.
    let mut loop_defs: FxHashMap<u32, u32> = FxHashMap::default();
    for &b in body {
        for inst in &function.blocks[b as usize].instructions {
            if inst.dest >= 0 {
                *loop_defs.entry(inst.dest as u32).or_default() += 1;
            }
        }
    }

    // Fixed-point marking of invariant instructions, identified by
    // (block, index).
    let mut invariant: FxHashSet<(u32, usize)> = FxHashSet::default();
    let mut invariant_dests: FxHashSet<u32> = FxHashSet::default();
    let mut blocks_sorted: Vec<u32> = body.iter().copied().collect();
    blocks_sorted.sort_unstable();

    loop {
        let mut changed = false;
        for &b in &blocks_sorted {
            for (idx, inst) in function.blocks[b as usize].instructions.iter().enumerate() {
                if invariant.contains(&(b, idx)) {
                    continue;
                }
                if !hoistable(inst.op) || inst.dest < 0 {
                    continue;
                }
                if loop_defs.get(&(inst.dest as u32)).copied().unwrap_or(0) != 1 {
                    continue;
                }
                let operands_invariant = inst.operands.iter().all(|operand| {
                    loop_defs.get(operand).copied().unwrap_or(0) == 0
                        || invariant_dests.contains(operand)
                });
                if operands_invariant {
                    invariant.insert((b, idx));
                    invariant_dests.insert(inst.dest as u32);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    if invariant.is_empty() {
        return;
    }

    // Collect the moved instructions in block/index order.
    let mut moved = Vec::new();
    for &b in &blocks_sorted {
        let block = &mut function.blocks[b as usize];
        let mut idx = 0usize;
        let mut kept = Vec::with_capacity(block.instructions.len());
        for inst in block.instructions.drain(..) {
            if invariant.contains(&(b, idx)) {
                moved.push(inst);
            } else {
                kept.push(inst);
            }
            idx += 1;
        }
        block.instructions = kept;
    }

    // Pre-header: takes over every edge into the header from outside the
    // loop, then falls through to the header.
    let pre_id = function.blocks.len() as u32;
    for block in function.blocks.iter_mut() {
        if body.contains(&block.id) {
            continue;
        }
        block
            .terminator
            .retarget(|t| if t == header { pre_id } else { t });
    }
    if function.body_start == header {
        function.body_start = pre_id;
    }
    function.blocks.push(BasicBlock {
        id: pre_id,
        instructions: moved,
        terminator: Terminator::Goto { target: header },
    });
    function.invalidate_frame_size();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::*;
    use opal_common::span::Span;

    fn sp() -> Span {
        Span::point(0)
    }

    /// while (i < n) { k = x * y; i = i + 1 }  -- `k` is invariant.
    fn loop_function() -> MirFunction {
        let mut f = MirFunction::new("t", "Module", MirType::Void);
        let x = f.new_local("x", MirType::Int);
        let y = f.new_local("y", MirType::Int);
        let i = f.new_local("i", MirType::Int);
        let n = f.new_local("n", MirType::Int);
        let k = f.new_local("k", MirType::Int);
        let c = f.new_local("c", MirType::Boolean);
        let one = f.new_local("one", MirType::Int);

        // bb0: entry -> bb1 (header)
        f.blocks.push(BasicBlock {
            id: 0,
            instructions: vec![],
            terminator: Terminator::Goto { target: 1 },
        });
        // bb1: c = i < n; branch c bb2 bb3
        f.blocks.push(BasicBlock {
            id: 1,
            instructions: vec![Inst::new(
                Op::Binary,
                c as i32,
                vec![i, n],
                InstExtra::BinOp(MirBinOp::Lt),
                sp(),
            )],
            terminator: Terminator::Branch {
                cond: c,
                then_bb: 2,
                else_bb: 3,
                fused: None,
            },
        });
        // bb2: k = x * y; one = 1; i = i + one; goto bb1
        f.blocks.push(BasicBlock {
            id: 2,
            instructions: vec![
                Inst::new(
                    Op::Binary,
                    k as i32,
                    vec![x, y],
                    InstExtra::BinOp(MirBinOp::Mul),
                    sp(),
                ),
                Inst::new(
                    Op::ConstInt,
                    one as i32,
                    vec![],
                    InstExtra::Const(ConstValue::Int(1)),
                    sp(),
                ),
                Inst::new(
                    Op::Binary,
                    i as i32,
                    vec![i, one],
                    InstExtra::BinOp(MirBinOp::Add),
                    sp(),
                ),
            ],
            terminator: Terminator::Goto { target: 1 },
        });
        // bb3: return
        f.blocks.push(BasicBlock {
            id: 3,
            instructions: vec![],
            terminator: Terminator::Return { value: -1 },
        });
        f
    }

    #[test]
    fn hoists_invariant_multiply_into_preheader() {
        let mut f = loop_function();
        LoopInvariantCodeMotion.run(&mut f);

        // A pre-header was appended and bb0 now enters through it.
        assert_eq!(f.blocks.len(), 5);
        let pre = &f.blocks[4];
        assert_eq!(pre.terminator, Terminator::Goto { target: 1 });
        assert!(
            pre.instructions
                .iter()
                .any(|i| i.op == Op::Binary && i.extra == InstExtra::BinOp(MirBinOp::Mul)),
            "k = x * y should be hoisted"
        );
        assert_eq!(f.blocks[0].terminator, Terminator::Goto { target: 4 });
        // The back edge still targets the header directly.
        assert_eq!(f.blocks[2].terminator, Terminator::Goto { target: 1 });
        // The multiply left the loop body.
        assert!(!f.blocks[2]
            .instructions
            .iter()
            .any(|i| i.extra == InstExtra::BinOp(MirBinOp::Mul)));
    }

    #[test]
    fn variant_instructions_stay() {
        let mut f = loop_function();
        LoopInvariantCodeMotion.run(&mut f);
        // i = i + one is variant (i defined in loop, used by itself).
        assert!(f.blocks[2]
            .instructions
            .iter()
            .any(|i| i.extra == InstExtra::BinOp(MirBinOp::Add)));
    }

    #[test]
    fn no_loop_no_change() {
        let mut f = MirFunction::new("t", "Module", MirType::Void);
        f.blocks.push(BasicBlock {
            id: 0,
            instructions: vec![],
            terminator: Terminator::Return { value: -1 },
        });
        let before = f.blocks.len();
        LoopInvariantCodeMotion.run(&mut f);
        assert_eq!(f.blocks.len(), before);
    }
}
