//! Strength reduction.
//!
//! For locals defined exactly once by an integer constant: `x * 2` becomes
//! `x + x`, and `x * c` for a larger power of two becomes `x << log2(c)`.

use rustc_hash::FxHashMap;

use super::MirPass;
use crate::mir::{ConstValue, Inst, InstExtra, MirBinOp, MirFunction, MirType, Op};

pub struct StrengthReduction;

impl MirPass for StrengthReduction {
    fn name(&self) -> &'static str {
        "strength-reduction"
    }

    fn run(&self, function: &mut MirFunction) {
        // Single-definition integer-constant locals.
        let mut def_counts: FxHashMap<u32, u32> = FxHashMap::default();
        let mut const_values: FxHashMap<u32, i64> = FxHashMap::default();
        for block in &function.blocks {
            for inst in &block.instructions {
                if inst.dest < 0 {
                    continue;
                }
                *def_counts.entry(inst.dest as u32).or_default() += 1;
                if matches!(inst.op, Op::ConstInt | Op::ConstLong) {
                    if let InstExtra::Const(ConstValue::Int(v) | ConstValue::Long(v)) = &inst.extra
                    {
                        const_values.insert(inst.dest as u32, *v);
                    }
                }
            }
        }
        const_values.retain(|local, _| def_counts.get(local) == Some(&1));

        // Rewrites: (block, index, multiplicand, constant).
        let mut rewrites: Vec<(usize, usize, u32, i64)> = Vec::new();
        for (bi, block) in function.blocks.iter().enumerate() {
            for (ii, inst) in block.instructions.iter().enumerate() {
                if inst.op != Op::Binary || inst.extra != InstExtra::BinOp(MirBinOp::Mul) {
                    continue;
                }
                let [a, b] = inst.operands[..] else { continue };
                let (x, c) = if let Some(&c) = const_values.get(&b) {
                    (a, c)
                } else if let Some(&c) = const_values.get(&a) {
                    (b, c)
                } else {
                    continue;
                };
                if c == 2 || (c > 2 && (c & (c - 1)) == 0) {
                    rewrites.push((bi, ii, x, c));
                }
            }
        }

        // Apply back-to-front so indices stay valid when inserting.
        for (bi, ii, x, c) in rewrites.into_iter().rev() {
            if c == 2 {
                let inst = &mut function.blocks[bi].instructions[ii];
                inst.extra = InstExtra::BinOp(MirBinOp::Add);
                inst.operands = vec![x, x];
            } else {
                let shift_amount = c.trailing_zeros() as i64;
                let span = function.blocks[bi].instructions[ii].span;
                let shift = function.new_local("$shift", MirType::Int);
                let shift_const = Inst::new(
                    Op::ConstInt,
                    shift as i32,
                    vec![],
                    InstExtra::Const(ConstValue::Int(shift_amount)),
                    span,
                );
                let inst = &mut function.blocks[bi].instructions[ii];
                inst.extra = InstExtra::BinOp(MirBinOp::Shl);
                inst.operands = vec![x, shift];
                function.blocks[bi].instructions.insert(ii, shift_const);
            }
        }
        function.invalidate_frame_size();
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

    fn mul_by(constant: i64) -> MirFunction {
        let mut f = MirFunction::new("t", "Module", MirType::Int);
        let x = f.new_local("x", MirType::Int);
        f.params = f.locals.clone();
        let c = f.new_local("c", MirType::Int);
        let r = f.new_local("r", MirType::Int);
        f.blocks.push(BasicBlock {
            id: 0,
            instructions: vec![
                Inst::new(
                    Op::ConstInt,
                    c as i32,
                    vec![],
                    InstExtra::Const(ConstValue::Int(constant)),
                    sp(),
                ),
                Inst::new(
                    Op::Binary,
                    r as i32,
                    vec![x, c],
                    InstExtra::BinOp(MirBinOp::Mul),
                    sp(),
                ),
            ],
            terminator: Terminator::Return { value: r as i32 },
        });
        f
    }

    #[test]
    fn times_two_becomes_add() {
        let mut f = mul_by(2);
        StrengthReduction.run(&mut f);
        let inst = &f.blocks[0].instructions[1];
        assert_eq!(inst.extra, InstExtra::BinOp(MirBinOp::Add));
        assert_eq!(inst.operands, vec![0, 0]);
    }

    #[test]
    fn times_eight_becomes_shift() {
        let mut f = mul_by(8);
        StrengthReduction.run(&mut f);
        // A shift-amount constant was inserted before the rewritten mul.
        let insts = &f.blocks[0].instructions;
        assert_eq!(insts.len(), 3);
        assert_eq!(
            insts[1].extra,
            InstExtra::Const(ConstValue::Int(3)),
            "log2(8) == 3"
        );
        assert_eq!(insts[2].extra, InstExtra::BinOp(MirBinOp::Shl));
    }

    #[test]
    fn times_three_is_untouched() {
        let mut f = mul_by(3);
        StrengthReduction.run(&mut f);
        assert_eq!(
            f.blocks[0].instructions[1].extra,
            InstExtra::BinOp(MirBinOp::Mul)
        );
    }

    #[test]
    fn multi_def_constant_is_not_folded() {
        let mut f = mul_by(2);
        // A second definition of the constant local disqualifies it.
        let c = 1u32;
        f.blocks[0].instructions.push(Inst::new(
            Op::ConstInt,
            c as i32,
            vec![],
            InstExtra::Const(ConstValue::Int(5)),
            sp(),
        ));
        StrengthReduction.run(&mut f);
        assert_eq!(
            f.blocks[0].instructions[1].extra,
            InstExtra::BinOp(MirBinOp::Mul)
        );
    }
}
