//! Peephole cleanups.
//!
//! Three local rewrites, in order: (a) dead pure instructions are removed
//! to a fixed point (`DIV`/`MOD` and `INDEX_GET` are kept because they can
//! fault); (b) a MOVE whose source is defined once and used once in the
//! same block collapses into its definition, provided the destination is
//! not read between the definition and the MOVE; (c) a comparison feeding
//! a branch condition (single-def, single-use) fuses into the branch's
//! compare slot and the comparison instruction disappears.

use rustc_hash::FxHashMap;

use super::MirPass;
use crate::mir::{FusedCompare, Inst, InstExtra, MirFunction, Op, Terminator};

pub struct Peephole;

impl MirPass for Peephole {
    fn name(&self) -> &'static str {
        "peephole"
    }

    fn run(&self, function: &mut MirFunction) {
        remove_dead_instructions(function);
        collapse_redundant_moves(function);
        fuse_branch_compares(function);
        function.invalidate_frame_size();
    }
}

/// Whether removing this instruction (when its result is unused) is safe.
fn removable_when_dead(inst: &Inst) -> bool {
    match inst.op {
        op if op.is_const() => true,
        Op::Move | Op::Unary | Op::TypeCheck | Op::TypeCast => true,
        // Division and remainder can fault on zero.
        Op::Binary => match inst.extra {
            InstExtra::BinOp(op) => !op.can_fault(),
            _ => false,
        },
        // INDEX_GET can fault on a bad index; everything else either has
        // side effects or reads memory we do not track.
        _ => false,
    }
}

fn use_counts(function: &MirFunction) -> FxHashMap<u32, u32> {
    let mut uses: FxHashMap<u32, u32> = FxHashMap::default();
    for block in &function.blocks {
        for inst in &block.instructions {
            for operand in &inst.operands {
                *uses.entry(*operand).or_default() += 1;
            }
        }
        for operand in block.terminator.operands() {
            *uses.entry(operand).or_default() += 1;
        }
    }
    uses
}

fn remove_dead_instructions(function: &mut MirFunction) {
    loop {
        let uses = use_counts(function);
        let mut removed = false;
        for block in function.blocks.iter_mut() {
            block.instructions.retain(|inst| {
                let dead = inst.dest >= 0
                    && uses.get(&(inst.dest as u32)).copied().unwrap_or(0) == 0
                    && removable_when_dead(inst);
                if dead {
                    removed = true;
                }
                !dead
            });
        }
        if !removed {
            break;
        }
    }
}

fn collapse_redundant_moves(function: &mut MirFunction) {
    // Whole-function definition counts decide eligibility.
    let mut def_counts: FxHashMap<u32, u32> = FxHashMap::default();
    for block in &function.blocks {
        for inst in &block.instructions {
            if inst.dest >= 0 {
                *def_counts.entry(inst.dest as u32).or_default() += 1;
            }
        }
    }
    let uses = use_counts(function);

    for block in function.blocks.iter_mut() {
        let mut i = 0;
        while i < block.instructions.len() {
            let inst = &block.instructions[i];
            if inst.op != Op::Move || inst.dest < 0 {
                i += 1;
                continue;
            }
            let dest = inst.dest as u32;
            let [src] = inst.operands[..] else {
                i += 1;
                continue;
            };
            if src == dest {
                block.instructions.remove(i);
                continue;
            }
            if def_counts.get(&src) != Some(&1) || uses.get(&src) != Some(&1) {
                i += 1;
                continue;
            }
            // Find the in-block definition of src before the move.
            let def_idx = block.instructions[..i]
                .iter()
                .position(|d| d.dest == src as i32);
            let Some(def_idx) = def_idx else {
                i += 1;
                continue;
            };
            // Safety: the destination must not be read between the
            // definition and the MOVE.
            let dest_read_between = block.instructions[def_idx + 1..i]
                .iter()
                .any(|mid| mid.operands.contains(&dest));
            if dest_read_between {
                i += 1;
                continue;
            }
            block.instructions[def_idx].dest = dest as i32;
            block.instructions.remove(i);
        }
    }
}

fn fuse_branch_compares(function: &mut MirFunction) {
    let mut def_counts: FxHashMap<u32, u32> = FxHashMap::default();
    for block in &function.blocks {
        for inst in &block.instructions {
            if inst.dest >= 0 {
                *def_counts.entry(inst.dest as u32).or_default() += 1;
            }
        }
    }
    let uses = use_counts(function);

    for block in function.blocks.iter_mut() {
        let Terminator::Branch { cond, fused, .. } = &mut block.terminator else {
            continue;
        };
        if fused.is_some() {
            continue;
        }
        let cond = *cond;
        if def_counts.get(&cond) != Some(&1) || uses.get(&cond) != Some(&1) {
            continue;
        }
        let Some(def_idx) = block
            .instructions
            .iter()
            .position(|inst| inst.dest == cond as i32)
        else {
            continue;
        };
        let def = &block.instructions[def_idx];
        if def.op != Op::Binary {
            continue;
        }
        let InstExtra::BinOp(op) = def.extra else {
            continue;
        };
        if !op.is_comparison() {
            continue;
        }
        let [lhs, rhs] = def.operands[..] else {
            continue;
        };
        *fused = Some(FusedCompare { op, lhs, rhs });
        block.instructions.remove(def_idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::*;
    use opal_common::span::Span;

    fn sp() -> Span {
        Span::point(0)
    }

    #[test]
    fn dead_constants_are_removed_to_fixpoint() {
        let mut f = MirFunction::new("t", "Module", MirType::Int);
        let a = f.new_local("a", MirType::Int);
        f.params = f.locals.clone();
        let dead1 = f.new_local("dead1", MirType::Int);
        let dead2 = f.new_local("dead2", MirType::Int);
        f.blocks.push(BasicBlock {
            id: 0,
            instructions: vec![
                Inst::new(
                    Op::ConstInt,
                    dead1 as i32,
                    vec![],
                    InstExtra::Const(ConstValue::Int(1)),
                    sp(),
                ),
                // dead2 uses dead1: removable only after dead2 goes.
                Inst::new(
                    Op::Binary,
                    dead2 as i32,
                    vec![dead1, dead1],
                    InstExtra::BinOp(MirBinOp::Add),
                    sp(),
                ),
            ],
            terminator: Terminator::Return { value: a as i32 },
        });
        Peephole.run(&mut f);
        assert!(f.blocks[0].instructions.is_empty());
    }

    #[test]
    fn faulting_instructions_survive_deadness() {
        let mut f = MirFunction::new("t", "Module", MirType::Int);
        let a = f.new_local("a", MirType::Int);
        let b = f.new_local("b", MirType::Int);
        f.params = f.locals.clone();
        let unused = f.new_local("unused", MirType::Int);
        f.blocks.push(BasicBlock {
            id: 0,
            instructions: vec![Inst::new(
                Op::Binary,
                unused as i32,
                vec![a, b],
                InstExtra::BinOp(MirBinOp::Div),
                sp(),
            )],
            terminator: Terminator::Return { value: a as i32 },
        });
        Peephole.run(&mut f);
        assert_eq!(f.blocks[0].instructions.len(), 1, "div can fault; keep it");
    }

    #[test]
    fn redundant_move_collapses_into_definition() {
        let mut f = MirFunction::new("t", "Module", MirType::Int);
        let a = f.new_local("a", MirType::Int);
        f.params = f.locals.clone();
        let t = f.new_local("t", MirType::Int);
        let r = f.new_local("r", MirType::Int);
        f.blocks.push(BasicBlock {
            id: 0,
            instructions: vec![
                Inst::new(
                    Op::Binary,
                    t as i32,
                    vec![a, a],
                    InstExtra::BinOp(MirBinOp::Add),
                    sp(),
                ),
                Inst::new(Op::Move, r as i32, vec![t], InstExtra::None, sp()),
            ],
            terminator: Terminator::Return { value: r as i32 },
        });
        Peephole.run(&mut f);
        assert_eq!(f.blocks[0].instructions.len(), 1);
        assert_eq!(f.blocks[0].instructions[0].dest, r as i32);
    }

    #[test]
    fn compare_fuses_into_branch() {
        let mut f = MirFunction::new("t", "Module", MirType::Int);
        let a = f.new_local("a", MirType::Int);
        let b = f.new_local("b", MirType::Int);
        f.params = f.locals.clone();
        let c = f.new_local("c", MirType::Boolean);
        f.blocks.push(BasicBlock {
            id: 0,
            instructions: vec![Inst::new(
                Op::Binary,
                c as i32,
                vec![a, b],
                InstExtra::BinOp(MirBinOp::Lt),
                sp(),
            )],
            terminator: Terminator::Branch {
                cond: c,
                then_bb: 1,
                else_bb: 2,
                fused: None,
            },
        });
        f.blocks.push(BasicBlock {
            id: 1,
            instructions: vec![],
            terminator: Terminator::Return { value: a as i32 },
        });
        f.blocks.push(BasicBlock {
            id: 2,
            instructions: vec![],
            terminator: Terminator::Return { value: b as i32 },
        });
        Peephole.run(&mut f);
        assert!(f.blocks[0].instructions.is_empty(), "compare deleted");
        let Terminator::Branch { fused: Some(fc), .. } = &f.blocks[0].terminator else {
            panic!("expected fused branch");
        };
        assert_eq!(fc.op, MirBinOp::Lt);
        assert_eq!((fc.lhs, fc.rhs), (a, b));
    }

    #[test]
    fn multi_use_compare_is_not_fused() {
        let mut f = MirFunction::new("t", "Module", MirType::Boolean);
        let a = f.new_local("a", MirType::Int);
        f.params = f.locals.clone();
        let c = f.new_local("c", MirType::Boolean);
        f.blocks.push(BasicBlock {
            id: 0,
            instructions: vec![Inst::new(
                Op::Binary,
                c as i32,
                vec![a, a],
                InstExtra::BinOp(MirBinOp::Eq),
                sp(),
            )],
            terminator: Terminator::Branch {
                cond: c,
                then_bb: 1,
                else_bb: 1,
                fused: None,
            },
        });
        // Second use of `c` as the return value.
        f.blocks.push(BasicBlock {
            id: 1,
            instructions: vec![],
            terminator: Terminator::Return { value: c as i32 },
        });
        Peephole.run(&mut f);
        assert_eq!(f.blocks[0].instructions.len(), 1, "compare must stay");
    }
}
