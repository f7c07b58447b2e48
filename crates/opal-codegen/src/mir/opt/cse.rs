//! Local common-subexpression elimination by value numbering.
//!
//! Numbering is per block, with a single-predecessor continuation: a block
//! with exactly one predecessor starts from a clone of that predecessor's
//! exit state, extending straight-line CSE across block boundaries.
//!
//! A whole-function constant-alias map canonicalizes operands first: a
//! single-definition constant local equal to an earlier constant local
//! becomes an alias of the earlier one, and single-definition MOVEs inherit
//! their source's alias. Keys cover constants (tag + bit pattern),
//! `BINARY(op, l, r)`, and `INDEX_GET(target, index)`. Hits rewrite the
//! instruction to a MOVE from the earlier local. Side-effecting
//! instructions invalidate all `INDEX_GET` entries.

use rustc_hash::FxHashMap;

use super::{reverse_postorder, MirPass};
use crate::mir::{InstExtra, MirBinOp, MirFunction, Op};

pub struct LocalCse;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Const(u8, u64),
    Binary(MirBinOp, u32, u32),
    IndexGet(u32, u32),
}

impl MirPass for LocalCse {
    fn name(&self) -> &'static str {
        "local-cse"
    }

    fn run(&self, function: &mut MirFunction) {
        let alias = constant_aliases(function);
        let canon = |local: u32| -> u32 {
            let mut current = local;
            while let Some(&next) = alias.get(&current) {
                if next == current {
                    break;
                }
                current = next;
            }
            current
        };

        // Multi-definition locals cannot participate as available values.
        let mut def_counts: FxHashMap<u32, u32> = FxHashMap::default();
        for block in &function.blocks {
            for inst in &block.instructions {
                if inst.dest >= 0 {
                    *def_counts.entry(inst.dest as u32).or_default() += 1;
                }
            }
        }
        let single_def = |local: u32| def_counts.get(&local) == Some(&1);

        let preds = function.predecessors();
        let order = reverse_postorder(function);
        let mut exit_states: Vec<Option<FxHashMap<Key, u32>>> =
            vec![None; function.blocks.len()];

        for &b in &order {
            let mut state: FxHashMap<Key, u32> = match preds[b as usize].as_slice() {
                // Sole predecessor already processed: continue its state.
                [p] => exit_states[*p as usize].clone().unwrap_or_default(),
                _ => FxHashMap::default(),
            };

            let block = &mut function.blocks[b as usize];
            for inst in block.instructions.iter_mut() {
                // Invalidation first: stores and calls may alias any index.
                if inst.op.has_side_effects() {
                    state.retain(|key, _| !matches!(key, Key::IndexGet(_, _)));
                }

                let key = match inst.op {
                    op if op.is_const() => {
                        let InstExtra::Const(value) = &inst.extra else {
                            continue;
                        };
                        let (tag, bits) = value.key();
                        Some(Key::Const(tag, bits))
                    }
                    Op::Binary => {
                        let InstExtra::BinOp(op) = inst.extra else {
                            continue;
                        };
                        // Faulting ops are never merged.
                        if op.can_fault() {
                            None
                        } else {
                            let [l, r] = inst.operands[..] else { continue };
                            Some(Key::Binary(op, canon(l), canon(r)))
                        }
                    }
                    Op::IndexGet => {
                        let [t, i] = inst.operands[..] else { continue };
                        Some(Key::IndexGet(canon(t), canon(i)))
                    }
                    _ => None,
                };

                let Some(key) = key else { continue };
                if inst.dest < 0 || !single_def(inst.dest as u32) {
                    continue;
                }
                match state.get(&key) {
                    Some(&existing) if existing != inst.dest as u32 => {
                        inst.op = Op::Move;
                        inst.operands = vec![existing];
                        inst.extra = InstExtra::None;
                    }
                    Some(_) => {}
                    None => {
                        state.insert(key, inst.dest as u32);
                    }
                }
            }
            exit_states[b as usize] = Some(state);
        }
        function.invalidate_frame_size();
    }
}

/// Whole-function constant interning: later single-definition constants
/// alias the first local holding the same value; single-definition MOVEs
/// inherit their source's alias.
fn constant_aliases(function: &MirFunction) -> FxHashMap<u32, u32> {
    let mut def_counts: FxHashMap<u32, u32> = FxHashMap::default();
    for block in &function.blocks {
        for inst in &block.instructions {
            if inst.dest >= 0 {
                *def_counts.entry(inst.dest as u32).or_default() += 1;
            }
        }
    }

    let mut first_const: FxHashMap<(u8, u64), u32> = FxHashMap::default();
    let mut alias: FxHashMap<u32, u32> = FxHashMap::default();
    for block in &function.blocks {
        for inst in &block.instructions {
            if inst.dest < 0 || def_counts.get(&(inst.dest as u32)) != Some(&1) {
                continue;
            }
            let dest = inst.dest as u32;
            if inst.op.is_const() {
                if let InstExtra::Const(value) = &inst.extra {
                    let key = value.key();
                    match first_const.get(&key) {
                        Some(&first) if first != dest => {
                            alias.insert(dest, first);
                        }
                        Some(_) => {}
                        None => {
                            first_const.insert(key, dest);
                        }
                    }
                }
            } else if inst.op == Op::Move {
                // A single-definition MOVE inherits its source's alias
                // (only when the source has one).
                if let [src] = inst.operands[..] {
                    if let Some(&target) = alias.get(&src) {
                        alias.insert(dest, target);
                    }
                }
            }
        }
    }
    alias
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::*;
    use opal_common::span::Span;

    fn sp() -> Span {
        Span::point(0)
    }

    /// fun f(a, b) = (a * 2) + (a * 2)
    fn double_mul() -> MirFunction {
        let mut f = MirFunction::new("f", "Module", MirType::Int);
        let a = f.new_local("a", MirType::Int);
        let _b = f.new_local("b", MirType::Int);
        f.params = f.locals.clone();
        let c2a = f.new_local("c2a", MirType::Int);
        let t1 = f.new_local("t1", MirType::Int);
        let c2b = f.new_local("c2b", MirType::Int);
        let t2 = f.new_local("t2", MirType::Int);
        let sum = f.new_local("sum", MirType::Int);
        f.blocks.push(BasicBlock {
            id: 0,
            instructions: vec![
                Inst::new(
                    Op::ConstInt,
                    c2a as i32,
                    vec![],
                    InstExtra::Const(ConstValue::Int(2)),
                    sp(),
                ),
                Inst::new(
                    Op::Binary,
                    t1 as i32,
                    vec![a, c2a],
                    InstExtra::BinOp(MirBinOp::Mul),
                    sp(),
                ),
                Inst::new(
                    Op::ConstInt,
                    c2b as i32,
                    vec![],
                    InstExtra::Const(ConstValue::Int(2)),
                    sp(),
                ),
                Inst::new(
                    Op::Binary,
                    t2 as i32,
                    vec![a, c2b],
                    InstExtra::BinOp(MirBinOp::Mul),
                    sp(),
                ),
                Inst::new(
                    Op::Binary,
                    sum as i32,
                    vec![t1, t2],
                    InstExtra::BinOp(MirBinOp::Add),
                    sp(),
                ),
            ],
            terminator: Terminator::Return { value: sum as i32 },
        });
        f
    }

    #[test]
    fn duplicate_subexpression_becomes_move() {
        let mut f = double_mul();
        LocalCse.run(&mut f);
        let insts = &f.blocks[0].instructions;
        // Exactly one surviving multiply.
        let muls = insts
            .iter()
            .filter(|i| i.extra == InstExtra::BinOp(MirBinOp::Mul))
            .count();
        assert_eq!(muls, 1, "second `a * 2` must be value-numbered away");
        // The second computation is now a move from the first.
        let t2_def = insts.iter().find(|i| i.dest == 5).unwrap();
        assert_eq!(t2_def.op, Op::Move);
        assert_eq!(t2_def.operands, vec![3]);
    }

    #[test]
    fn constant_interning_feeds_value_numbering() {
        // The duplicate `2` aliases the first one, which is exactly what
        // lets the second multiply's key match.
        let f = double_mul();
        let alias = constant_aliases(&f);
        assert_eq!(alias.get(&4), Some(&2));
    }

    #[test]
    fn cross_block_continuation_with_single_pred() {
        let mut f = double_mul();
        // Split: move the last two instructions into a second block.
        let tail: Vec<Inst> = f.blocks[0].instructions.split_off(3);
        f.blocks[0].terminator = Terminator::Goto { target: 1 };
        f.blocks.push(BasicBlock {
            id: 1,
            instructions: tail,
            terminator: Terminator::Return { value: 6 },
        });
        LocalCse.run(&mut f);
        let t2_def = f.blocks[1].instructions.iter().find(|i| i.dest == 5).unwrap();
        assert_eq!(t2_def.op, Op::Move, "state continues across the sole predecessor");
    }

    #[test]
    fn stores_invalidate_index_loads() {
        let mut f = MirFunction::new("g", "Module", MirType::Int);
        let list = f.new_local("list", MirType::object("opal/rt/List"));
        let idx = f.new_local("i", MirType::Int);
        f.params = f.locals.clone();
        let v1 = f.new_local("v1", MirType::Int);
        let v2 = f.new_local("v2", MirType::Int);
        let sum = f.new_local("sum", MirType::Int);
        f.blocks.push(BasicBlock {
            id: 0,
            instructions: vec![
                Inst::new(Op::IndexGet, v1 as i32, vec![list, idx], InstExtra::None, sp()),
                Inst::new(Op::IndexSet, -1, vec![list, idx, v1], InstExtra::None, sp()),
                Inst::new(Op::IndexGet, v2 as i32, vec![list, idx], InstExtra::None, sp()),
                Inst::new(
                    Op::Binary,
                    sum as i32,
                    vec![v1, v2],
                    InstExtra::BinOp(MirBinOp::Add),
                    sp(),
                ),
            ],
            terminator: Terminator::Return { value: sum as i32 },
        });
        LocalCse.run(&mut f);
        let gets = f.blocks[0]
            .instructions
            .iter()
            .filter(|i| i.op == Op::IndexGet)
            .count();
        assert_eq!(gets, 2, "the store must invalidate the first load");
    }

    #[test]
    fn faulting_division_is_never_merged() {
        let mut f = MirFunction::new("h", "Module", MirType::Int);
        let a = f.new_local("a", MirType::Int);
        let b = f.new_local("b", MirType::Int);
        f.params = f.locals.clone();
        let d1 = f.new_local("d1", MirType::Int);
        let d2 = f.new_local("d2", MirType::Int);
        let sum = f.new_local("sum", MirType::Int);
        f.blocks.push(BasicBlock {
            id: 0,
            instructions: vec![
                Inst::new(
                    Op::Binary,
                    d1 as i32,
                    vec![a, b],
                    InstExtra::BinOp(MirBinOp::Div),
                    sp(),
                ),
                Inst::new(
                    Op::Binary,
                    d2 as i32,
                    vec![a, b],
                    InstExtra::BinOp(MirBinOp::Div),
                    sp(),
                ),
                Inst::new(
                    Op::Binary,
                    sum as i32,
                    vec![d1, d2],
                    InstExtra::BinOp(MirBinOp::Add),
                    sp(),
                ),
            ],
            terminator: Terminator::Return { value: sum as i32 },
        });
        LocalCse.run(&mut f);
        let divs = f.blocks[0]
            .instructions
            .iter()
            .filter(|i| i.extra == InstExtra::BinOp(MirBinOp::Div))
            .count();
        assert_eq!(divs, 2);
    }
}
