//! Straight-line block merging.
//!
//! When A ends in `Goto B`, B's only predecessor is A, neither block is
//! referenced by the exception table, and neither is the entry block, B's
//! instructions and terminator are folded into A. The same index is
//! re-checked afterwards so chains collapse in one pass; the emptied
//! blocks are left for the final dead-block sweep.

use rustc_hash::FxHashSet;

use super::MirPass;
use crate::mir::{MirFunction, Terminator};

pub struct BlockMerging;

impl MirPass for BlockMerging {
    fn name(&self) -> &'static str {
        "block-merging"
    }

    fn run(&self, function: &mut MirFunction) {
        let mut exception_blocks: FxHashSet<u32> = FxHashSet::default();
        for entry in &function.try_catch {
            exception_blocks.insert(entry.try_start);
            exception_blocks.insert(entry.try_end);
            exception_blocks.insert(entry.handler);
        }
        let entry = function.body_start;

        let mut i = 0;
        while i < function.blocks.len() {
            let a = function.blocks[i].id;
            let Terminator::Goto { target: b } = function.blocks[i].terminator else {
                i += 1;
                continue;
            };
            if a == b
                || a == entry
                || b == entry
                || exception_blocks.contains(&a)
                || exception_blocks.contains(&b)
            {
                i += 1;
                continue;
            }
            // B must have exactly one predecessor: A.
            let preds = function.predecessors();
            if preds[b as usize].len() != 1 {
                i += 1;
                continue;
            }

            // Concatenate B into A; B becomes unreachable and is cleaned
            // up by the trailing dead-block pass.
            let (b_insts, b_term) = {
                let bb = &mut function.blocks[b as usize];
                (
                    std::mem::take(&mut bb.instructions),
                    std::mem::replace(&mut bb.terminator, Terminator::Unreachable),
                )
            };
            let ab = &mut function.blocks[i];
            ab.instructions.extend(b_insts);
            ab.terminator = b_term;
            // Re-check the same index: A may now end in another Goto.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::opt::DeadBlockElimination;
    use crate::mir::*;
    use opal_common::span::Span;

    fn sp() -> Span {
        Span::point(0)
    }

    fn const_inst(dest: u32, value: i64) -> Inst {
        Inst::new(
            Op::ConstInt,
            dest as i32,
            vec![],
            InstExtra::Const(ConstValue::Int(value)),
            sp(),
        )
    }

    #[test]
    fn goto_chain_collapses() {
        let mut f = MirFunction::new("t", "Module", MirType::Int);
        let a = f.new_local("a", MirType::Int);
        let b = f.new_local("b", MirType::Int);
        let c = f.new_local("c", MirType::Int);
        f.blocks = vec![
            BasicBlock {
                id: 0,
                instructions: vec![],
                terminator: Terminator::Goto { target: 1 },
            },
            BasicBlock {
                id: 1,
                instructions: vec![const_inst(a, 1)],
                terminator: Terminator::Goto { target: 2 },
            },
            BasicBlock {
                id: 2,
                instructions: vec![const_inst(b, 2)],
                terminator: Terminator::Goto { target: 3 },
            },
            BasicBlock {
                id: 3,
                instructions: vec![const_inst(c, 3)],
                terminator: Terminator::Return { value: c as i32 },
            },
        ];
        BlockMerging.run(&mut f);
        DeadBlockElimination.run(&mut f);
        // bb1 absorbed bb2 and bb3 (bb0 is the entry and never merges).
        assert_eq!(f.blocks.len(), 2);
        assert_eq!(f.blocks[1].instructions.len(), 3);
        assert!(matches!(
            f.blocks[1].terminator,
            Terminator::Return { .. }
        ));
    }

    #[test]
    fn diamond_join_is_not_merged() {
        let mut f = MirFunction::new("t", "Module", MirType::Void);
        let cond = f.new_local("c", MirType::Boolean);
        f.blocks = vec![
            BasicBlock {
                id: 0,
                instructions: vec![],
                terminator: Terminator::Branch {
                    cond,
                    then_bb: 1,
                    else_bb: 2,
                    fused: None,
                },
            },
            BasicBlock {
                id: 1,
                instructions: vec![],
                terminator: Terminator::Goto { target: 3 },
            },
            BasicBlock {
                id: 2,
                instructions: vec![],
                terminator: Terminator::Goto { target: 3 },
            },
            BasicBlock {
                id: 3,
                instructions: vec![],
                terminator: Terminator::Return { value: -1 },
            },
        ];
        let before = f.blocks.len();
        BlockMerging.run(&mut f);
        DeadBlockElimination.run(&mut f);
        // The join block has two predecessors; nothing merges.
        assert_eq!(f.blocks.len(), before);
    }

    #[test]
    fn exception_referenced_blocks_stay_separate() {
        let mut f = MirFunction::new("t", "Module", MirType::Void);
        f.blocks = vec![
            BasicBlock {
                id: 0,
                instructions: vec![],
                terminator: Terminator::Goto { target: 1 },
            },
            BasicBlock {
                id: 1,
                instructions: vec![],
                terminator: Terminator::Goto { target: 2 },
            },
            BasicBlock {
                id: 2,
                instructions: vec![],
                terminator: Terminator::Return { value: -1 },
            },
        ];
        let exc = f.new_local("e", MirType::object("java/lang/Exception"));
        f.try_catch.push(TryCatchEntry {
            try_start: 1,
            try_end: 2,
            handler: 2,
            exception_type: "java/lang/Exception".into(),
            exception_local: exc,
        });
        BlockMerging.run(&mut f);
        assert_eq!(f.blocks.len(), 3, "try bounds must not merge away");
    }
}
