//! Dead code elimination.
//!
//! Worklist driven: an instruction is removed when it has no users,
//! its side-effect summary is `None`, and it is not a terminator.
//! Removing an instruction re-enqueues the instructions that produced
//! its operands, since they may have just lost their last user. The
//! analyses are re-requested every round; the version-stamped caches
//! make that free between mutations and correct across them.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::analysis::{DataFlowGraphAnalysis, SideEffectAnalysis};
use crate::ir::module::Module;
use crate::ir::{Definition, FuncId, InstId};

use super::Transform;

pub struct DeadCodeElimination;

impl Transform for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn description(&self) -> &'static str {
        "Removes pure instructions whose results are never used"
    }

    fn apply(&self, module: &mut Module, function: FuncId) -> bool {
        let mut changed = false;
        let mut worklist: VecDeque<InstId> =
            module.function(function).body_instructions().into();
        let mut enqueued: FxHashSet<InstId> = worklist.iter().copied().collect();

        while let Some(id) = worklist.pop_front() {
            enqueued.remove(&id);
            {
                let f = module.function(function);
                if f.instruction(id).parent().is_none() {
                    continue;
                }
                if f.instruction(id).kind.is_terminator() {
                    continue;
                }
                let effects = module.analysis::<SideEffectAnalysis>();
                if !effects.is_pure(function, id) {
                    continue;
                }
                let dataflow = f.analysis::<DataFlowGraphAnalysis>(module);
                if !dataflow.is_unused(&Definition::Instruction(id)) {
                    continue;
                }
            }

            // Former operand producers may have lost their last user.
            let producers: Vec<InstId> = module
                .function(function)
                .instruction(id)
                .kind
                .operands()
                .iter()
                .filter_map(|operand| match operand.as_definition() {
                    Some(Definition::Instruction(producer)) => Some(producer),
                    _ => None,
                })
                .collect();

            module.function_mut(function).remove_instruction(id);
            changed = true;
            log::trace!("dce removed instruction {} in function {}", id.0, function.0);

            for producer in producers {
                if enqueued.insert(producer) {
                    worklist.push_back(producer);
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::Builder;
    use crate::ir::instruction::{InstructionKind, NumericBinaryOp};
    use crate::ir::intrinsics::IntrinsicRegistry;
    use crate::ir::module::Stage;
    use crate::ir::shape::DataType;
    use crate::ir::types::Type;
    use crate::ir::{Literal, ScalarLiteral};
    use std::rc::Rc;

    fn i32_ty() -> Type {
        Type::scalar(DataType::Int(32))
    }

    #[test]
    fn test_removes_unused_literal() {
        let mut b = Builder::new("m", Stage::Raw, Rc::new(IntrinsicRegistry::default()));
        let f = b.function("bar", vec![], i32_ty());
        let entry = b.block(f, "entry", vec![]);
        let live = b.append(
            f,
            entry,
            None,
            InstructionKind::Literal(Literal::Scalar(ScalarLiteral::Int(1)), i32_ty()),
        );
        let dead = b.append(
            f,
            entry,
            None,
            InstructionKind::Literal(Literal::Scalar(ScalarLiteral::Int(2)), i32_ty()),
        );
        b.append(
            f,
            entry,
            None,
            InstructionKind::Return(Some(b.value(live))),
        );
        let mut module = b.finish();

        let dce = DeadCodeElimination;
        assert!(dce.apply(&mut module, f));
        assert!(module.function(f).instruction(dead).parent().is_none());
        assert!(module.function(f).instruction(live).parent().is_some());
        // A second run reaches a fixed point.
        assert!(!dce.apply(&mut module, f));
    }

    #[test]
    fn test_removes_chains() {
        let mut b = Builder::new("m", Stage::Raw, Rc::new(IntrinsicRegistry::default()));
        let f = b.function("f", vec![], Type::Void);
        let entry = b.block(f, "entry", vec![]);
        let a = b.append(
            f,
            entry,
            Some("a"),
            InstructionKind::Literal(Literal::Scalar(ScalarLiteral::Int(1)), i32_ty()),
        );
        let sum = b.append(
            f,
            entry,
            Some("sum"),
            InstructionKind::NumericBinary(NumericBinaryOp::Add, b.value(a), b.value(a)),
        );
        b.append(f, entry, None, InstructionKind::Return(None));
        let mut module = b.finish();

        assert!(DeadCodeElimination.apply(&mut module, f));
        // The whole chain is gone: `sum` was unused, and removing it
        // orphaned `a`.
        assert!(module.function(f).instruction(sum).parent().is_none());
        assert!(module.function(f).instruction(a).parent().is_none());
        assert_eq!(module.function(f).body_instructions().len(), 1);
    }

    #[test]
    fn test_keeps_effectful_instructions() {
        let mut b = Builder::new("m", Stage::Raw, Rc::new(IntrinsicRegistry::default()));
        let f = b.function("f", vec![], Type::Void);
        let entry = b.block(f, "entry", vec![]);
        let value = b.append(
            f,
            entry,
            Some("v"),
            InstructionKind::Literal(Literal::Scalar(ScalarLiteral::Int(7)), i32_ty()),
        );
        let slot = b.append(
            f,
            entry,
            Some("p"),
            InstructionKind::AllocateStack(i32_ty(), 1),
        );
        let store = b.append(
            f,
            entry,
            None,
            InstructionKind::Store {
                value: b.value(value),
                destination: b.value(slot),
            },
        );
        b.append(f, entry, None, InstructionKind::Return(None));
        let mut module = b.finish();

        assert!(!DeadCodeElimination.apply(&mut module, f));
        assert!(module.function(f).instruction(store).parent().is_some());
        assert!(module.function(f).instruction(value).parent().is_some());
        assert!(module.function(f).instruction(slot).parent().is_some());
    }
}
