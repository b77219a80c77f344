//! Literal broadcasting promotion.
//!
//! Broadcastable instructions (numeric binary, boolean binary,
//! compare) broadcast their operand shapes, so a scalar value never
//! needs to be materialised at tensor type. This pass rewrites any
//! tensor-typed operand that is a scalar literal — written inline or
//! produced by a `literal` instruction — into a scalar-typed literal
//! use of the same value. Result types are unchanged; later passes see
//! syntactically identical scalars, which enables CSE.

use crate::ir::instruction::InstructionKind;
use crate::ir::module::Module;
use crate::ir::types::Type;
use crate::ir::{Definition, FuncId, InstId, Literal, Use};

use super::Transform;

pub struct LiteralBroadcastingPromotion;

/// A scalar-payload literal at tensor type, or a reference to a
/// `literal` instruction holding one, rewrites to the scalar form.
fn promoted(module: &Module, function: FuncId, operand: &Use) -> Option<Use> {
    let scalar_payload = |literal: &Literal| {
        matches!(literal, Literal::Scalar(_) | Literal::Bool(_))
    };
    match operand {
        Use::Literal(ty, literal) if scalar_payload(literal) => {
            let (shape, dtype) = ty.unaliased(module).tensor_type()?;
            if shape.is_scalar() {
                return None;
            }
            Some(Use::Literal(Type::scalar(dtype), literal.clone()))
        }
        Use::Definition(Definition::Instruction(id)) => {
            let instruction = module.function(function).instruction(*id);
            match &instruction.kind {
                InstructionKind::Literal(literal, _) if scalar_payload(literal) => {
                    let (_, dtype) = instruction.ty.unaliased(module).tensor_type()?;
                    Some(Use::Literal(Type::scalar(dtype), literal.clone()))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn promote_instruction(module: &Module, function: FuncId, id: InstId) -> Option<InstructionKind> {
    let promote_pair = |a: &Use, b: &Use| -> Option<(Use, Use)> {
        let pa = promoted(module, function, a);
        let pb = promoted(module, function, b);
        if pa.is_none() && pb.is_none() {
            return None;
        }
        Some((
            pa.unwrap_or_else(|| a.clone()),
            pb.unwrap_or_else(|| b.clone()),
        ))
    };
    match &module.function(function).instruction(id).kind {
        InstructionKind::NumericBinary(op, a, b) => {
            let (a, b) = promote_pair(a, b)?;
            Some(InstructionKind::NumericBinary(*op, a, b))
        }
        InstructionKind::BooleanBinary(op, a, b) => {
            let (a, b) = promote_pair(a, b)?;
            Some(InstructionKind::BooleanBinary(*op, a, b))
        }
        InstructionKind::Compare(op, a, b) => {
            let (a, b) = promote_pair(a, b)?;
            Some(InstructionKind::Compare(*op, a, b))
        }
        _ => None,
    }
}

impl Transform for LiteralBroadcastingPromotion {
    fn name(&self) -> &'static str {
        "broadcast-promotion"
    }

    fn description(&self) -> &'static str {
        "Rewrites scalar literals at tensor type into scalar-typed literals"
    }

    fn apply(&self, module: &mut Module, function: FuncId) -> bool {
        let mut changed = false;
        for id in module.function(function).body_instructions() {
            if let Some(kind) = promote_instruction(module, function, id) {
                let ty = module.function(function).instruction(id).ty.clone();
                // Broadcasting still produces the original shape, so
                // the result type is preserved.
                module.function_mut(function).replace_kind(id, kind, ty);
                changed = true;
            }
        }
        changed
    }
}
