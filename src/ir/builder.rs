//! Construction API for building IR in memory.
//!
//! The builder owns the module under construction and wires parent
//! references and inferred types as units are appended. Transforms and
//! tests build IR through it rather than assembling containers by
//! hand.

use std::rc::Rc;

use super::function::{Argument, BasicBlock, DeclarationKind, Function};
use super::instruction::{Instruction, InstructionKind};
use super::intrinsics::IntrinsicRegistry;
use super::module::{Module, Stage, Variable};
use super::types::Type;
use super::{ArgId, BlockId, Definition, FuncId, InstId, Use, VarId};

pub struct Builder {
    module: Module,
}

impl Builder {
    pub fn new(name: impl Into<String>, stage: Stage, intrinsics: Rc<IntrinsicRegistry>) -> Self {
        Builder {
            module: Module::new(name, stage, intrinsics),
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.module
    }

    pub fn finish(self) -> Module {
        self.module
    }

    /// Adds a function definition shell; blocks come next.
    pub fn function(
        &mut self,
        name: impl Into<String>,
        argument_types: Vec<Type>,
        return_type: Type,
    ) -> FuncId {
        self.module
            .add_function(Function::new(Some(name.into()), argument_types, return_type))
    }

    /// Adds a bodyless function with a declaration kind.
    pub fn declaration(
        &mut self,
        name: impl Into<String>,
        argument_types: Vec<Type>,
        return_type: Type,
        kind: DeclarationKind,
    ) -> FuncId {
        self.module.add_function(Function::declaration(
            Some(name.into()),
            argument_types,
            return_type,
            kind,
        ))
    }

    pub fn variable(&mut self, name: impl Into<String>, ty: Type) -> VarId {
        self.module.add_variable(Variable::new(Some(name.into()), ty))
    }

    /// Appends a block with the given arguments to a function.
    pub fn block(
        &mut self,
        function: FuncId,
        name: impl Into<String>,
        arguments: Vec<(Option<String>, Type)>,
    ) -> BlockId {
        let arguments = arguments
            .into_iter()
            .map(|(name, ty)| Argument::new(name, ty))
            .collect();
        self.module
            .function_mut(function)
            .append_block(BasicBlock::new(Some(name.into()), arguments))
    }

    /// The use of a block argument.
    pub fn argument(&self, _function: FuncId, block: BlockId, index: usize) -> Use {
        Use::Definition(Definition::Argument(ArgId { block, index }))
    }

    /// The use of an instruction's result.
    pub fn value(&self, id: InstId) -> Use {
        Use::Definition(Definition::Instruction(id))
    }

    /// Appends an instruction, deriving its type from the kind.
    pub fn append(
        &mut self,
        function: FuncId,
        block: BlockId,
        name: Option<&str>,
        kind: InstructionKind,
    ) -> InstId {
        let ty = kind.infer_type(&self.module, self.module.function(function));
        let instruction = Instruction::new(name.map(str::to_string), kind, ty);
        self.module
            .function_mut(function)
            .append_instruction(block, instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::shape::DataType;
    use crate::ir::{Literal, ScalarLiteral};

    #[test]
    fn test_builder_infers_types() {
        let mut builder = Builder::new("m", Stage::Raw, Rc::new(IntrinsicRegistry::default()));
        let i32_ty = Type::scalar(DataType::Int(32));
        let f = builder.function("f", vec![], i32_ty.clone());
        let entry = builder.block(f, "entry", vec![]);
        let lit = builder.append(
            f,
            entry,
            Some("v"),
            InstructionKind::Literal(Literal::Scalar(ScalarLiteral::Int(3)), i32_ty.clone()),
        );
        assert_eq!(builder.module().function(f).instruction(lit).ty, i32_ty);

        let ret = builder.append(
            f,
            entry,
            None,
            InstructionKind::Return(Some(builder.value(lit))),
        );
        assert_eq!(builder.module().function(f).instruction(ret).ty, Type::Void);
    }
}
