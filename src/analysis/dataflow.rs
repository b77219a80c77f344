//! Data-flow graph: the user set of every definition in a function.

use rustc_hash::FxHashMap;

use crate::ir::function::Function;
use crate::ir::module::Module;
use crate::ir::{Definition, InstId};

use super::FunctionAnalysis;

/// Per-definition user lists, built in one sweep over the function's
/// attached instructions.
pub struct DataFlowGraph {
    users: FxHashMap<Definition, Vec<InstId>>,
}

impl DataFlowGraph {
    /// The instructions using a definition, in layout order.
    pub fn users(&self, definition: &Definition) -> &[InstId] {
        self.users
            .get(definition)
            .map(|users| users.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_unused(&self, definition: &Definition) -> bool {
        self.users(definition).is_empty()
    }
}

pub struct DataFlowGraphAnalysis;

impl FunctionAnalysis for DataFlowGraphAnalysis {
    type Result = DataFlowGraph;
    const NAME: &'static str = "dataflow-graph";

    fn run(function: &Function, _module: &Module) -> DataFlowGraph {
        let mut users: FxHashMap<Definition, Vec<InstId>> = FxHashMap::default();
        for id in function.body_instructions() {
            for operand in function.instruction(id).kind.operands() {
                if let Some(definition) = operand.as_definition() {
                    let list = users.entry(definition).or_default();
                    if !list.contains(&id) {
                        list.push(id);
                    }
                }
            }
        }
        DataFlowGraph { users }
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

    #[test]
    fn test_users_are_collected() {
        let i32_ty = Type::scalar(DataType::Int(32));
        let mut b = Builder::new("m", Stage::Raw, Rc::new(IntrinsicRegistry::default()));
        let f = b.function("f", vec![], i32_ty.clone());
        let entry = b.block(f, "entry", vec![]);
        let lit = b.append(
            f,
            entry,
            Some("v"),
            InstructionKind::Literal(Literal::Scalar(ScalarLiteral::Int(2)), i32_ty.clone()),
        );
        let sum = b.append(
            f,
            entry,
            Some("sum"),
            InstructionKind::NumericBinary(NumericBinaryOp::Add, b.value(lit), b.value(lit)),
        );
        b.append(
            f,
            entry,
            None,
            InstructionKind::Return(Some(b.value(sum))),
        );
        let module = b.finish();

        let graph = module
            .function(f)
            .analysis::<DataFlowGraphAnalysis>(&module);
        assert_eq!(graph.users(&Definition::Instruction(lit)), &[sum]);
        assert_eq!(graph.users(&Definition::Instruction(sum)).len(), 1);
        assert!(!graph.is_unused(&Definition::Instruction(lit)));
    }
}
