//! Self-tail-call elimination.
//!
//! A block whose terminator returns the result of an immediately preceding
//! self-call (directly, or through one trailing MOVE, or via a Goto to an
//! empty return block) is rewritten: the call disappears, every argument is
//! staged into a fresh temporary and then moved onto the parameter local
//! (two phases, so argument expressions that read parameters are not
//! clobbered mid-rebind), and the terminator becomes `TailCall` to the body
//! start. Owners match strictly: a method only eliminates calls on its own
//! class, a top-level function only calls through the synthetic module
//! owner.

use super::MirPass;
use crate::mir::{Inst, InstExtra, MirFunction, Op, Terminator};

pub struct TailCallElimination;

impl MirPass for TailCallElimination {
    fn name(&self) -> &'static str {
        "tail-call-elimination"
    }

    fn run(&self, function: &mut MirFunction) {
        let arity = function.params.len();
        let param_indices: Vec<u32> = function.params.iter().map(|p| p.index).collect();
        let entry = function.body_start;

        for b in 0..function.blocks.len() {
            let Some(ret_value) = returned_value(function, b) else {
                continue;
            };

            // Find the trailing call (possibly through one MOVE).
            let insts = &function.blocks[b].instructions;
            let (call_idx, has_move) = match insts.last() {
                Some(last)
                    if last.op == Op::Move
                        && ret_value >= 0
                        && last.dest == ret_value
                        && insts.len() >= 2 =>
                {
                    (insts.len() - 2, true)
                }
                Some(_) if !insts.is_empty() => (insts.len() - 1, false),
                _ => continue,
            };
            let call = &insts[call_idx];
            if !matches!(call.op, Op::InvokeStatic | Op::InvokeVirtual) {
                continue;
            }
            let InstExtra::Method(method) = &call.extra else {
                continue;
            };
            if method.name != function.name || method.owner != function.owner {
                continue;
            }
            if call.operands.len() != arity {
                continue;
            }
            // The call result must be what the block returns.
            if has_move {
                let move_inst = &insts[insts.len() - 1];
                if move_inst.operands != [call.dest as u32] {
                    continue;
                }
            } else if ret_value >= 0 && call.dest != ret_value {
                continue;
            }

            // Rewrite: stage arguments into temporaries, then rebind the
            // parameters, then jump back to the entry.
            let args: Vec<u32> = call.operands.clone();
            let span = call.span;
            let mut staged = Vec::with_capacity(arity);
            for i in 0..arity {
                let ty = function.params[i].ty.clone();
                let temp = function.new_local(format!("$tail{i}"), ty);
                staged.push(temp);
            }

            let block = &mut function.blocks[b];
            block.instructions.truncate(call_idx);
            for (i, &arg) in args.iter().enumerate() {
                block.instructions.push(Inst::new(
                    Op::Move,
                    staged[i] as i32,
                    vec![arg],
                    InstExtra::None,
                    span,
                ));
            }
            for (i, &param) in param_indices.iter().enumerate() {
                block.instructions.push(Inst::new(
                    Op::Move,
                    param as i32,
                    vec![staged[i]],
                    InstExtra::None,
                    span,
                ));
            }
            block.terminator = Terminator::TailCall { entry };
        }
        function.invalidate_frame_size();
    }
}

/// The value a block ultimately returns: directly, or through a Goto to an
/// empty block ending in Return. `None` when the block does not return.
fn returned_value(function: &MirFunction, b: usize) -> Option<i32> {
    match &function.blocks[b].terminator {
        Terminator::Return { value } => Some(*value),
        Terminator::Goto { target } => {
            let target = &function.blocks[*target as usize];
            if !target.instructions.is_empty() {
                return None;
            }
            match &target.terminator {
                Terminator::Return { value } => Some(*value),
                _ => None,
            }
        }
        _ => None,
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

    /// fun sum(n, acc) = if (n <= 0) acc else sum(n - 1, acc + n)
    fn sum_function() -> MirFunction {
        let mut f = MirFunction::new("sum", "Module", MirType::Int);
        let n = f.new_local("n", MirType::Int);
        let acc = f.new_local("acc", MirType::Int);
        f.params = f.locals.clone();
        let zero = f.new_local("zero", MirType::Int);
        let c = f.new_local("c", MirType::Boolean);
        let one = f.new_local("one", MirType::Int);
        let n1 = f.new_local("n1", MirType::Int);
        let a1 = f.new_local("a1", MirType::Int);
        let r = f.new_local("r", MirType::Int);

        f.blocks.push(BasicBlock {
            id: 0,
            instructions: vec![
                Inst::new(
                    Op::ConstInt,
                    zero as i32,
                    vec![],
                    InstExtra::Const(ConstValue::Int(0)),
                    sp(),
                ),
                Inst::new(
                    Op::Binary,
                    c as i32,
                    vec![n, zero],
                    InstExtra::BinOp(MirBinOp::Le),
                    sp(),
                ),
            ],
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
            terminator: Terminator::Return { value: acc as i32 },
        });
        f.blocks.push(BasicBlock {
            id: 2,
            instructions: vec![
                Inst::new(
                    Op::ConstInt,
                    one as i32,
                    vec![],
                    InstExtra::Const(ConstValue::Int(1)),
                    sp(),
                ),
                Inst::new(
                    Op::Binary,
                    n1 as i32,
                    vec![n, one],
                    InstExtra::BinOp(MirBinOp::Sub),
                    sp(),
                ),
                Inst::new(
                    Op::Binary,
                    a1 as i32,
                    vec![acc, n],
                    InstExtra::BinOp(MirBinOp::Add),
                    sp(),
                ),
                Inst::new(
                    Op::InvokeStatic,
                    r as i32,
                    vec![n1, a1],
                    InstExtra::Method(MethodRef {
                        owner: "Module".into(),
                        name: "sum".into(),
                        descriptor: "(II)I".into(),
                    }),
                    sp(),
                ),
            ],
            terminator: Terminator::Return { value: r as i32 },
        });
        f
    }

    #[test]
    fn self_tail_call_becomes_jump() {
        let mut f = sum_function();
        TailCallElimination.run(&mut f);

        // No remaining self-invocation.
        let any_call = f
            .blocks
            .iter()
            .flat_map(|b| &b.instructions)
            .any(|i| i.op.is_invoke());
        assert!(!any_call, "the self-call must be eliminated");

        // The recursive block now jumps to the body start.
        assert_eq!(f.blocks[2].terminator, Terminator::TailCall { entry: 0 });
    }

    #[test]
    fn arguments_rebind_through_temporaries() {
        let mut f = sum_function();
        let arity = f.params.len();
        TailCallElimination.run(&mut f);

        let insts = &f.blocks[2].instructions;
        let moves: Vec<&Inst> = insts.iter().filter(|i| i.op == Op::Move).collect();
        assert_eq!(moves.len(), arity * 2, "stage + rebind moves per argument");
        // The last moves write exactly the parameter locals, in order.
        let rebind: Vec<i32> = moves[arity..].iter().map(|m| m.dest).collect();
        assert_eq!(rebind, vec![0, 1]);
        // Staging temporaries are fresh locals, not parameters.
        for m in &moves[..arity] {
            assert!(m.dest as u32 >= arity as u32);
        }
    }

    #[test]
    fn call_to_other_function_is_kept() {
        let mut f = sum_function();
        // Rename the callee so it is no longer a self-call.
        for block in f.blocks.iter_mut() {
            for inst in block.instructions.iter_mut() {
                if let InstExtra::Method(m) = &mut inst.extra {
                    m.name = "other".into();
                }
            }
        }
        TailCallElimination.run(&mut f);
        let any_call = f
            .blocks
            .iter()
            .flat_map(|b| &b.instructions)
            .any(|i| i.op.is_invoke());
        assert!(any_call);
    }

    #[test]
    fn goto_to_empty_return_block_counts() {
        let mut f = sum_function();
        // Reroute bb2 through an empty forwarding block.
        f.blocks[2].terminator = Terminator::Goto { target: 3 };
        let r = f.blocks[2].instructions.last().unwrap().dest;
        f.blocks.push(BasicBlock {
            id: 3,
            instructions: vec![],
            terminator: Terminator::Return { value: r },
        });
        TailCallElimination.run(&mut f);
        assert_eq!(f.blocks[2].terminator, Terminator::TailCall { entry: 0 });
    }

    #[test]
    fn owner_mismatch_is_not_eliminated() {
        let mut f = sum_function();
        for block in f.blocks.iter_mut() {
            for inst in block.instructions.iter_mut() {
                if let InstExtra::Method(m) = &mut inst.extra {
                    m.owner = "other/Owner".into();
                }
            }
        }
        TailCallElimination.run(&mut f);
        assert!(matches!(
            f.blocks[2].terminator,
            Terminator::Return { .. }
        ));
    }
}
