//! Dead-block elimination.
//!
//! Reachability is a BFS from the entry block plus every exception-table
//! root (`try_start`, `try_end`, `handler`); anything not reached is
//! removed and the remaining blocks are renumbered densely.

use super::MirPass;
use crate::mir::MirFunction;

pub struct DeadBlockElimination;

impl MirPass for DeadBlockElimination {
    fn name(&self) -> &'static str {
        "dead-block-elimination"
    }

    fn run(&self, function: &mut MirFunction) {
        let n = function.blocks.len();
        if n == 0 {
            return;
        }

        let mut reachable = vec![false; n];
        let mut queue: Vec<u32> = vec![function.body_start];
        for entry in &function.try_catch {
            queue.push(entry.try_start);
            if (entry.try_end as usize) < n {
                queue.push(entry.try_end);
            }
            queue.push(entry.handler);
        }

        while let Some(block) = queue.pop() {
            let idx = block as usize;
            if idx >= n || reachable[idx] {
                continue;
            }
            reachable[idx] = true;
            for succ in function.blocks[idx].terminator.successors() {
                queue.push(succ);
            }
        }

        if reachable.iter().all(|r| *r) {
            return;
        }

        // Dense renumbering of the surviving blocks.
        let mut remap = vec![u32::MAX; n];
        let mut next = 0u32;
        for (old, keep) in reachable.iter().enumerate() {
            if *keep {
                remap[old] = next;
                next += 1;
            }
        }

        let mut old_blocks = std::mem::take(&mut function.blocks);
        for (old_id, mut block) in old_blocks.drain(..).enumerate() {
            if !reachable[old_id] {
                continue;
            }
            block.id = remap[old_id];
            block.terminator.retarget(|t| remap[t as usize]);
            function.blocks.push(block);
        }

        function.body_start = remap[function.body_start as usize];
        for entry in function.try_catch.iter_mut() {
            entry.try_start = remap[entry.try_start as usize];
            entry.handler = remap[entry.handler as usize];
            entry.try_end = if (entry.try_end as usize) < n {
                remap[entry.try_end as usize]
            } else {
                function.blocks.len() as u32
            };
        }
        function.invalidate_frame_size();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::*;
    use opal_common::span::Span;

    fn goto(target: u32) -> Terminator {
        Terminator::Goto { target }
    }

    fn block(id: u32, terminator: Terminator) -> BasicBlock {
        BasicBlock {
            id,
            instructions: Vec::new(),
            terminator,
        }
    }

    #[test]
    fn removes_unreachable_and_renumbers() {
        let mut f = MirFunction::new("t", "Module", MirType::Void);
        f.blocks = vec![
            block(0, goto(2)),
            block(1, goto(2)), // unreachable
            block(2, Terminator::Return { value: -1 }),
        ];
        DeadBlockElimination.run(&mut f);
        assert_eq!(f.blocks.len(), 2);
        assert_eq!(f.blocks[0].id, 0);
        assert_eq!(f.blocks[1].id, 1);
        assert_eq!(f.blocks[0].terminator, goto(1));
    }

    #[test]
    fn exception_roots_stay_alive() {
        let mut f = MirFunction::new("t", "Module", MirType::Void);
        f.blocks = vec![
            block(0, Terminator::Return { value: -1 }),
            // Handler: unreachable by normal flow.
            block(1, Terminator::Return { value: -1 }),
        ];
        f.try_catch.push(TryCatchEntry {
            try_start: 0,
            try_end: 1,
            handler: 1,
            exception_type: "java/lang/Exception".into(),
            exception_local: 0,
        });
        DeadBlockElimination.run(&mut f);
        assert_eq!(f.blocks.len(), 2, "handler must not be removed");
    }

    #[test]
    fn no_reachable_block_is_removed() {
        let mut f = MirFunction::new("t", "Module", MirType::Void);
        let cond = f.new_local("c", MirType::Boolean);
        f.blocks = vec![
            block(
                0,
                Terminator::Branch {
                    cond,
                    then_bb: 1,
                    else_bb: 2,
                    fused: None,
                },
            ),
            block(1, goto(3)),
            block(2, goto(3)),
            block(3, Terminator::Return { value: -1 }),
        ];
        let before = f.blocks.len();
        DeadBlockElimination.run(&mut f);
        assert_eq!(f.blocks.len(), before);
        let _ = Span::point(0);
    }
}
