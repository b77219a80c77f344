//! Functions, basic blocks, and block arguments.
//!
//! A function owns two arenas: one for basic blocks and one for
//! instructions. Block order is a separate index list so blocks can be
//! inserted at arbitrary positions without renumbering; instruction
//! order lives in each block. Removing an instruction detaches it from
//! its block and clears its parent back-reference, after which it is
//! no longer a valid use target.

use crate::analysis::PassManager;

use super::instruction::{Instruction, InstructionKind};
use super::module::Module;
use super::types::Type;
use super::{BlockId, Definition, FuncId, InstId, Use};

/// Function attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Inline,
    NoInline,
    Export,
}

impl Attribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Inline => "inline",
            Attribute::NoInline => "noinline",
            Attribute::Export => "export",
        }
    }

    pub fn from_name(name: &str) -> Option<Attribute> {
        match name {
            "inline" => Some(Attribute::Inline),
            "noinline" => Some(Attribute::NoInline),
            "export" => Some(Attribute::Export),
            _ => None,
        }
    }
}

/// The differentiation configuration of an adjoint declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjointConfiguration {
    /// The function being differentiated.
    pub primal: FuncId,
    /// Which primal result to differentiate (tuple element index; 0
    /// for a non-tuple result).
    pub source_index: usize,
    /// Primal arguments to produce gradients for.
    pub argument_indices: Vec<usize>,
    /// Primal results passed back in as checkpointed arguments.
    pub kept_indices: Vec<usize>,
    /// Whether the adjoint takes an explicit seed argument.
    pub seedable: bool,
}

/// Why a function has no body.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclarationKind {
    /// Defined outside the module.
    External,
    /// Derived from a primal function by differentiation.
    Adjoint(AdjointConfiguration),
}

/// A basic block argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: Option<String>,
    pub ty: Type,
}

impl Argument {
    pub fn new(name: Option<String>, ty: Type) -> Self {
        Argument { name, ty }
    }
}

/// A basic block: ordered arguments and an ordered instruction list.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub name: Option<String>,
    arguments: Vec<Argument>,
    instructions: Vec<InstId>,
}

impl BasicBlock {
    pub fn new(name: Option<String>, arguments: Vec<Argument>) -> Self {
        BasicBlock {
            name,
            arguments,
            instructions: Vec::new(),
        }
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn instructions(&self) -> &[InstId] {
        &self.instructions
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }
}

/// A function: either a declaration (no blocks, a declaration kind)
/// or a definition (at least an entry block, every block terminated).
#[derive(Debug, Clone)]
pub struct Function {
    pub name: Option<String>,
    pub argument_types: Vec<Type>,
    pub return_type: Type,
    pub attributes: Vec<Attribute>,
    pub declaration_kind: Option<DeclarationKind>,
    /// Block ids in layout order.
    order: Vec<BlockId>,
    blocks: Vec<BasicBlock>,
    instructions: Vec<Instruction>,
    version: u64,
    pub(crate) passes: PassManager,
}

impl Function {
    pub fn new(name: Option<String>, argument_types: Vec<Type>, return_type: Type) -> Self {
        Function {
            name,
            argument_types,
            return_type,
            attributes: Vec::new(),
            declaration_kind: None,
            order: Vec::new(),
            blocks: Vec::new(),
            instructions: Vec::new(),
            version: 0,
            passes: PassManager::new(),
        }
    }

    pub fn declaration(
        name: Option<String>,
        argument_types: Vec<Type>,
        return_type: Type,
        kind: DeclarationKind,
    ) -> Self {
        let mut function = Function::new(name, argument_types, return_type);
        function.declaration_kind = Some(kind);
        function
    }

    /// The function's own type.
    pub fn ty(&self) -> Type {
        Type::Function(
            self.argument_types.clone(),
            Box::new(self.return_type.clone()),
        )
    }

    /// A function is a declaration iff it has no body and carries a
    /// declaration kind.
    pub fn is_declaration(&self) -> bool {
        self.order.is_empty() && self.declaration_kind.is_some()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Bumps the mutation version, invalidating cached analyses of
    /// this function.
    pub fn touch(&mut self) {
        self.version += 1;
    }

    // --- Blocks ---

    /// Block ids in layout order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.order.iter().copied()
    }

    pub fn block_count(&self) -> usize {
        self.order.len()
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.order.first().copied()
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        self.touch();
        &mut self.blocks[id.0]
    }

    /// The block's position in layout order.
    pub fn block_index(&self, id: BlockId) -> Option<usize> {
        self.order.iter().position(|b| *b == id)
    }

    pub fn block_at_index(&self, index: usize) -> Option<BlockId> {
        self.order.get(index).copied()
    }

    pub fn append_block(&mut self, block: BasicBlock) -> BlockId {
        self.insert_block(block, self.order.len())
    }

    pub fn insert_block(&mut self, block: BasicBlock, at: usize) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(block);
        self.order.insert(at.min(self.order.len()), id);
        self.touch();
        id
    }

    pub fn block_named(&self, name: &str) -> Option<BlockId> {
        self.order
            .iter()
            .copied()
            .find(|id| self.blocks[id.0].name.as_deref() == Some(name))
    }

    // --- Instructions ---

    pub fn instruction(&self, id: InstId) -> &Instruction {
        &self.instructions[id.0]
    }

    pub fn instruction_mut(&mut self, id: InstId) -> &mut Instruction {
        self.touch();
        &mut self.instructions[id.0]
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Every instruction currently attached to a block, in layout
    /// order.
    pub fn body_instructions(&self) -> Vec<InstId> {
        self.order
            .iter()
            .flat_map(|b| self.blocks[b.0].instructions.iter().copied())
            .collect()
    }

    /// Appends an instruction to a block, wiring the parent
    /// back-reference.
    pub fn append_instruction(&mut self, block: BlockId, mut instruction: Instruction) -> InstId {
        let id = InstId(self.instructions.len());
        instruction.parent = Some(block);
        self.instructions.push(instruction);
        self.blocks[block.0].instructions.push(id);
        self.touch();
        id
    }

    /// Detaches an instruction from its block. The arena slot remains
    /// but the instruction is no longer a valid use target.
    pub fn remove_instruction(&mut self, id: InstId) {
        if let Some(parent) = self.instructions[id.0].parent.take() {
            self.blocks[parent.0].instructions.retain(|i| *i != id);
        }
        self.touch();
    }

    /// The block and in-block position of an attached instruction.
    pub fn instruction_position(&self, id: InstId) -> Option<(BlockId, usize)> {
        let parent = self.instructions[id.0].parent?;
        let index = self.blocks[parent.0]
            .instructions
            .iter()
            .position(|i| *i == id)?;
        Some((parent, index))
    }

    pub fn instruction_named(&self, name: &str) -> Option<InstId> {
        self.instructions
            .iter()
            .enumerate()
            .find(|(_, i)| i.parent.is_some() && i.name.as_deref() == Some(name))
            .map(|(i, _)| InstId(i))
    }

    /// Replaces an instruction's kind and type in place.
    pub fn replace_kind(&mut self, id: InstId, kind: InstructionKind, ty: Type) {
        let instruction = &mut self.instructions[id.0];
        instruction.kind = kind;
        instruction.ty = ty;
        self.touch();
    }

    /// Allocates a fresh local name: `base`, then `base_0`, `base_1`,
    /// ... until unused by any block, argument, or instruction.
    pub fn fresh_name(&self, base: &str) -> String {
        let used = |candidate: &str| -> bool {
            self.blocks.iter().any(|b| {
                b.name.as_deref() == Some(candidate)
                    || b.arguments
                        .iter()
                        .any(|a| a.name.as_deref() == Some(candidate))
            }) || self
                .instructions
                .iter()
                .any(|i| i.name.as_deref() == Some(candidate))
        };
        if !used(base) {
            return base.to_string();
        }
        let mut counter = 0usize;
        loop {
            let candidate = format!("{}_{}", base, counter);
            if !used(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }
}

impl PartialEq for Function {
    /// Structural equality, ignoring analysis caches and versions.
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.argument_types == other.argument_types
            && self.return_type == other.return_type
            && self.attributes == other.attributes
            && self.declaration_kind == other.declaration_kind
            && self.order == other.order
            && self.blocks == other.blocks
            && self.instructions == other.instructions
    }
}

impl Module {
    /// Deep-copies a function under a fresh name derived from `base`.
    ///
    /// Blocks and instructions are duplicated arena-for-arena, so
    /// block and instruction ids in the clone mirror the source and
    /// every internal reference stays within the clone. Recursive
    /// references to the source function are rewired to the clone.
    pub fn clone_function(&mut self, source: FuncId, base: &str) -> FuncId {
        let fresh = self.fresh_global_name(base);
        let mut clone = self.function(source).clone();
        clone.name = Some(fresh);
        clone.passes = PassManager::new();
        clone.version = 0;

        let clone_id = FuncId(self.function_count());
        let source_use = Use::Definition(Definition::Function(source));
        let clone_use = Use::Definition(Definition::Function(clone_id));
        for instruction in &mut clone.instructions {
            instruction.kind = instruction.kind.substituting(&clone_use, &source_use);
        }
        self.add_function(clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::shape::DataType;

    fn i32_scalar() -> Type {
        Type::scalar(DataType::Int(32))
    }

    #[test]
    fn test_block_order_and_insertion() {
        let mut function = Function::new(Some("f".into()), vec![], Type::Void);
        let a = function.append_block(BasicBlock::new(Some("a".into()), vec![]));
        let c = function.append_block(BasicBlock::new(Some("c".into()), vec![]));
        let b = function.insert_block(BasicBlock::new(Some("b".into()), vec![]), 1);
        assert_eq!(function.blocks().collect::<Vec<_>>(), vec![a, b, c]);
        assert_eq!(function.block_index(b), Some(1));
        assert_eq!(function.entry(), Some(a));
        assert_eq!(function.block_named("c"), Some(c));
    }

    #[test]
    fn test_instruction_removal_detaches() {
        let mut function = Function::new(Some("f".into()), vec![], i32_scalar());
        let entry = function.append_block(BasicBlock::new(Some("entry".into()), vec![]));
        let inst = function.append_instruction(
            entry,
            Instruction::new(
                Some("v".into()),
                InstructionKind::Literal(
                    crate::ir::Literal::Scalar(crate::ir::ScalarLiteral::Int(1)),
                    i32_scalar(),
                ),
                i32_scalar(),
            ),
        );
        assert_eq!(function.instruction_position(inst), Some((entry, 0)));
        let before = function.version();
        function.remove_instruction(inst);
        assert!(function.version() > before);
        assert_eq!(function.instruction_position(inst), None);
        assert!(function.block(entry).instructions().is_empty());
        assert_eq!(function.instruction_named("v"), None);
    }

    #[test]
    fn test_fresh_name() {
        let mut function = Function::new(Some("f".into()), vec![], Type::Void);
        function.append_block(BasicBlock::new(Some("entry".into()), vec![]));
        assert_eq!(function.fresh_name("entry"), "entry_0");
        assert_eq!(function.fresh_name("other"), "other");
    }
}
