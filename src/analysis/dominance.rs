//! Dominance analysis.
//!
//! The dominator tree is computed by the standard iterative dataflow
//! algorithm over a reverse postorder of the control-flow graph.
//! Blocks unreachable from the entry are outside the tree; nothing
//! dominates into or out of them.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::function::Function;
use crate::ir::module::Module;
use crate::ir::{BlockId, Definition, InstId};

use super::FunctionAnalysis;

/// The dominator tree of a function, together with the instruction
/// positions needed to answer use/def dominance queries.
pub struct DominatorTree {
    entry: Option<BlockId>,
    idom: FxHashMap<BlockId, BlockId>,
    reachable: FxHashSet<BlockId>,
    instruction_positions: FxHashMap<InstId, (BlockId, usize)>,
}

impl DominatorTree {
    /// Whether the block is reachable from the entry.
    pub fn contains(&self, block: BlockId) -> bool {
        self.reachable.contains(&block)
    }

    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        if Some(block) == self.entry {
            return None;
        }
        self.idom.get(&block).copied()
    }

    /// Reflexive block dominance.
    pub fn dominates(&self, dominator: BlockId, block: BlockId) -> bool {
        if !self.contains(dominator) || !self.contains(block) {
            return false;
        }
        let mut current = block;
        loop {
            if current == dominator {
                return true;
            }
            if Some(current) == self.entry {
                return false;
            }
            current = match self.idom.get(&current) {
                Some(parent) => *parent,
                None => return false,
            };
        }
    }

    pub fn strictly_dominates(&self, dominator: BlockId, block: BlockId) -> bool {
        dominator != block && self.dominates(dominator, block)
    }

    /// Whether the definition is available at the user: same-block
    /// definitions must come earlier, cross-block ones must come from
    /// a strictly dominating block, block arguments dominate their
    /// whole block, and globals dominate everything.
    pub fn properly_dominates(&self, definition: &Definition, user: InstId) -> bool {
        let (user_block, user_index) = match self.instruction_positions.get(&user) {
            Some(position) => *position,
            None => return false,
        };
        match definition {
            Definition::Argument(arg) => {
                arg.block == user_block || self.strictly_dominates(arg.block, user_block)
            }
            Definition::Instruction(id) => {
                match self.instruction_positions.get(id) {
                    Some((def_block, def_index)) => {
                        if *def_block == user_block {
                            def_index < &user_index
                        } else {
                            self.strictly_dominates(*def_block, user_block)
                        }
                    }
                    None => false,
                }
            }
            Definition::Variable(_) | Definition::Function(_) => true,
        }
    }
}

pub struct DominanceAnalysis;

impl FunctionAnalysis for DominanceAnalysis {
    type Result = DominatorTree;
    const NAME: &'static str = "dominance";

    fn run(function: &Function, _module: &Module) -> DominatorTree {
        let mut instruction_positions = FxHashMap::default();
        for block in function.blocks() {
            for (index, id) in function.block(block).instructions().iter().enumerate() {
                instruction_positions.insert(*id, (block, index));
            }
        }

        let entry = match function.entry() {
            Some(entry) => entry,
            None => {
                return DominatorTree {
                    entry: None,
                    idom: FxHashMap::default(),
                    reachable: FxHashSet::default(),
                    instruction_positions,
                }
            }
        };

        let successors = |block: BlockId| -> Vec<BlockId> {
            function
                .block(block)
                .instructions()
                .last()
                .map(|id| function.instruction(*id).kind.branch_targets())
                .unwrap_or_default()
        };

        // Reverse postorder over the reachable subgraph.
        let mut postorder = Vec::new();
        let mut visited = FxHashSet::default();
        let mut stack = vec![(entry, 0usize)];
        visited.insert(entry);
        while let Some((block, next_child)) = stack.pop() {
            let children = successors(block);
            if next_child < children.len() {
                stack.push((block, next_child + 1));
                let child = children[next_child];
                if visited.insert(child) {
                    stack.push((child, 0));
                }
            } else {
                postorder.push(block);
            }
        }
        let order: Vec<BlockId> = postorder.into_iter().rev().collect();
        let rpo_number: FxHashMap<BlockId, usize> = order
            .iter()
            .enumerate()
            .map(|(index, block)| (*block, index))
            .collect();

        let mut predecessors: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for block in &order {
            for successor in successors(*block) {
                if rpo_number.contains_key(&successor) {
                    predecessors.entry(successor).or_default().push(*block);
                }
            }
        }

        let intersect = |idom: &FxHashMap<BlockId, BlockId>, a: BlockId, b: BlockId| {
            let mut a = a;
            let mut b = b;
            while a != b {
                while rpo_number[&a] > rpo_number[&b] {
                    a = idom[&a];
                }
                while rpo_number[&b] > rpo_number[&a] {
                    b = idom[&b];
                }
            }
            a
        };

        let mut idom: FxHashMap<BlockId, BlockId> = FxHashMap::default();
        idom.insert(entry, entry);
        let mut changed = true;
        while changed {
            changed = false;
            for block in order.iter().skip(1) {
                let mut new_idom = None;
                for predecessor in predecessors.get(block).into_iter().flatten() {
                    if !idom.contains_key(predecessor) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        Some(current) => intersect(&idom, current, *predecessor),
                        None => *predecessor,
                    });
                }
                if let Some(new_idom) = new_idom {
                    if idom.get(block) != Some(&new_idom) {
                        idom.insert(*block, new_idom);
                        changed = true;
                    }
                }
            }
        }

        DominatorTree {
            entry: Some(entry),
            idom,
            reachable: visited,
            instruction_positions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::Builder;
    use crate::ir::instruction::InstructionKind;
    use crate::ir::intrinsics::IntrinsicRegistry;
    use crate::ir::module::Stage;
    use crate::ir::types::Type;
    use crate::ir::{Literal, Use};
    use std::rc::Rc;

    #[test]
    fn test_diamond_dominance() {
        let mut b = Builder::new("m", Stage::Raw, Rc::new(IntrinsicRegistry::default()));
        let f = b.function("f", vec![Type::Bool], Type::Void);
        let entry = b.block(f, "entry", vec![(Some("c".to_string()), Type::Bool)]);
        let left = b.block(f, "left", vec![]);
        let right = b.block(f, "right", vec![]);
        let join = b.block(f, "join", vec![]);

        let condition = b.argument(f, entry, 0);
        b.append(
            f,
            entry,
            None,
            InstructionKind::Conditional {
                condition,
                then_block: left,
                then_arguments: vec![],
                else_block: right,
                else_arguments: vec![],
            },
        );
        b.append(f, left, None, InstructionKind::Branch(join, vec![]));
        b.append(f, right, None, InstructionKind::Branch(join, vec![]));
        b.append(f, join, None, InstructionKind::Return(None));
        let module = b.finish();

        let tree = module.function(f).analysis::<DominanceAnalysis>(&module);
        assert!(tree.contains(join));
        assert!(tree.dominates(entry, join));
        assert!(tree.strictly_dominates(entry, left));
        assert!(!tree.dominates(left, join));
        assert!(!tree.dominates(right, left));
        assert_eq!(tree.immediate_dominator(join), Some(entry));
    }

    #[test]
    fn test_unreachable_block_is_outside() {
        let mut b = Builder::new("m", Stage::Raw, Rc::new(IntrinsicRegistry::default()));
        let f = b.function("f", vec![], Type::Void);
        let entry = b.block(f, "entry", vec![]);
        let orphan = b.block(f, "orphan", vec![]);
        b.append(f, entry, None, InstructionKind::Return(None));
        b.append(f, orphan, None, InstructionKind::Return(None));
        let module = b.finish();

        let tree = module.function(f).analysis::<DominanceAnalysis>(&module);
        assert!(tree.contains(entry));
        assert!(!tree.contains(orphan));
        assert!(!tree.dominates(entry, orphan));
    }

    #[test]
    fn test_same_block_ordering() {
        let i32_ty = Type::scalar(crate::ir::shape::DataType::Int(32));
        let mut b = Builder::new("m", Stage::Raw, Rc::new(IntrinsicRegistry::default()));
        let f = b.function("f", vec![], i32_ty.clone());
        let entry = b.block(f, "entry", vec![]);
        let first = b.append(
            f,
            entry,
            Some("a"),
            InstructionKind::Literal(
                Literal::Scalar(crate::ir::ScalarLiteral::Int(1)),
                i32_ty.clone(),
            ),
        );
        let second = b.append(
            f,
            entry,
            None,
            InstructionKind::Return(Some(Use::Definition(
                crate::ir::Definition::Instruction(first),
            ))),
        );
        let module = b.finish();

        let tree = module.function(f).analysis::<DominanceAnalysis>(&module);
        assert!(tree.properly_dominates(&Definition::Instruction(first), second));
        assert!(!tree.properly_dominates(&Definition::Instruction(second), first));
    }
}
