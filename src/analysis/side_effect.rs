//! Side-effect summaries.
//!
//! An instruction's summary distinguishes `None` from any effect. An
//! instruction is effect-free iff its kind does not write memory, it
//! is not a terminator, and it does not invoke an effectful function
//! or intrinsic. Function-level effects are propagated over the call
//! graph to a fixed point; external and adjoint declarations are
//! assumed effectful, as are indirect calls.

use rustc_hash::FxHashSet;

use crate::ir::instruction::InstructionKind;
use crate::ir::module::Module;
use crate::ir::{Definition, FuncId, InstId, Use};

use super::ModuleAnalysis;

/// Minimal effect summary of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    Some,
}

pub struct SideEffects {
    effectful_functions: FxHashSet<FuncId>,
    effectful_instructions: FxHashSet<(FuncId, InstId)>,
}

impl SideEffects {
    pub fn effect(&self, function: FuncId, instruction: InstId) -> Effect {
        if self
            .effectful_instructions
            .contains(&(function, instruction))
        {
            Effect::Some
        } else {
            Effect::None
        }
    }

    pub fn is_pure(&self, function: FuncId, instruction: InstId) -> bool {
        self.effect(function, instruction) == Effect::None
    }

    pub fn function_has_effects(&self, function: FuncId) -> bool {
        self.effectful_functions.contains(&function)
    }
}

fn callee(kind: &InstructionKind) -> Option<&Use> {
    match kind {
        InstructionKind::Apply { callee, .. } => Some(callee),
        _ => None,
    }
}

pub struct SideEffectAnalysis;

impl ModuleAnalysis for SideEffectAnalysis {
    type Result = SideEffects;
    const NAME: &'static str = "side-effects";

    fn run(module: &Module) -> SideEffects {
        let mut effectful_functions: FxHashSet<FuncId> = module
            .functions()
            .filter(|(_, f)| f.is_declaration())
            .map(|(id, _)| id)
            .collect();

        // Propagate effects over the call graph to a fixed point.
        let mut changed = true;
        while changed {
            changed = false;
            for (id, function) in module.functions() {
                if effectful_functions.contains(&id) {
                    continue;
                }
                let mut effectful = false;
                'blocks: for block in function.blocks() {
                    for inst in function.block(block).instructions() {
                        let kind = &function.instruction(*inst).kind;
                        if kind.must_write_to_memory() {
                            effectful = true;
                            break 'blocks;
                        }
                        if let InstructionKind::Builtin(key, _) = kind {
                            let intrinsic = module.intrinsics().intrinsic(key);
                            if intrinsic.map(|i| i.has_side_effects()).unwrap_or(true) {
                                effectful = true;
                                break 'blocks;
                            }
                        }
                        if let Some(callee) = callee(kind) {
                            let direct = matches!(
                                callee.as_definition(),
                                Some(Definition::Function(target))
                                    if !effectful_functions.contains(&target)
                            );
                            if !direct {
                                effectful = true;
                                break 'blocks;
                            }
                        }
                    }
                }
                if effectful {
                    effectful_functions.insert(id);
                    changed = true;
                }
            }
        }

        let mut effectful_instructions = FxHashSet::default();
        for (id, function) in module.functions() {
            for inst in function.body_instructions() {
                let kind = &function.instruction(inst).kind;
                let mut effectful = kind.must_write_to_memory() || kind.is_terminator();
                if let InstructionKind::Builtin(key, _) = kind {
                    let intrinsic = module.intrinsics().intrinsic(key);
                    effectful |= intrinsic.map(|i| i.has_side_effects()).unwrap_or(true);
                }
                if let Some(callee) = callee(kind) {
                    effectful |= match callee.as_definition() {
                        Some(Definition::Function(target)) => {
                            effectful_functions.contains(&target)
                        }
                        _ => true,
                    };
                }
                if effectful {
                    effectful_instructions.insert((id, inst));
                }
            }
        }

        SideEffects {
            effectful_functions,
            effectful_instructions,
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
    use crate::ir::shape::DataType;
    use crate::ir::types::Type;
    use crate::ir::{Literal, ScalarLiteral};
    use std::rc::Rc;

    #[test]
    fn test_store_is_effectful_and_literal_is_not() {
        let i32_ty = Type::scalar(DataType::Int(32));
        let mut b = Builder::new("m", Stage::Raw, Rc::new(IntrinsicRegistry::default()));
        let f = b.function("f", vec![], Type::Void);
        let entry = b.block(f, "entry", vec![]);
        let lit = b.append(
            f,
            entry,
            Some("v"),
            InstructionKind::Literal(Literal::Scalar(ScalarLiteral::Int(1)), i32_ty.clone()),
        );
        let slot = b.append(
            f,
            entry,
            Some("p"),
            InstructionKind::AllocateStack(i32_ty.clone(), 1),
        );
        let store = b.append(
            f,
            entry,
            None,
            InstructionKind::Store {
                value: b.value(lit),
                destination: b.value(slot),
            },
        );
        let ret = b.append(f, entry, None, InstructionKind::Return(None));
        let module = b.finish();

        let effects = module.analysis::<SideEffectAnalysis>();
        assert_eq!(effects.effect(f, lit), Effect::None);
        assert_eq!(effects.effect(f, slot), Effect::None);
        assert_eq!(effects.effect(f, store), Effect::Some);
        assert_eq!(effects.effect(f, ret), Effect::Some);
        assert!(effects.function_has_effects(f));
    }

    #[test]
    fn test_call_to_pure_function_is_pure() {
        let i32_ty = Type::scalar(DataType::Int(32));
        let mut b = Builder::new("m", Stage::Raw, Rc::new(IntrinsicRegistry::default()));

        let pure = b.function("pure", vec![], i32_ty.clone());
        let pure_entry = b.block(pure, "entry", vec![]);
        let one = b.append(
            pure,
            pure_entry,
            Some("one"),
            InstructionKind::Literal(Literal::Scalar(ScalarLiteral::Int(1)), i32_ty.clone()),
        );
        b.append(
            pure,
            pure_entry,
            None,
            InstructionKind::Return(Some(b.value(one))),
        );

        let caller = b.function("caller", vec![], i32_ty.clone());
        let entry = b.block(caller, "entry", vec![]);
        let call = b.append(
            caller,
            entry,
            Some("r"),
            InstructionKind::Apply {
                callee: crate::ir::Use::Definition(crate::ir::Definition::Function(pure)),
                arguments: vec![],
            },
        );
        b.append(
            caller,
            entry,
            None,
            InstructionKind::Return(Some(b.value(call))),
        );
        let module = b.finish();

        let effects = module.analysis::<SideEffectAnalysis>();
        assert!(!effects.function_has_effects(pure));
        assert!(!effects.function_has_effects(caller));
        assert_eq!(effects.effect(caller, call), Effect::None);
    }
}
