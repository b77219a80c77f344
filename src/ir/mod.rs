//! # Tela Intermediate Representation
//!
//! The in-memory IR: a module owns global variables, functions, and
//! nominal types; a function owns basic blocks and instructions; a
//! basic block owns arguments and an ordered instruction sequence.
//!
//! Cross-references between IR units (operand uses, branch
//! destinations, nominal type references) are arena indices, never
//! owning pointers. Every unit is owned by exactly one parent, and
//! containers maintain the parent back-references on insertion and
//! removal.

pub mod builder;
pub mod function;
pub mod instruction;
pub mod intrinsics;
pub mod module;
pub mod print;
pub mod shape;
pub mod types;

use self::function::Function;
use self::module::Module;
use self::types::Type;

/// Index of a function in its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub usize);

/// Index of a global variable in its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

/// Index of a basic block in its function's block arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

/// Index of an instruction in its function's instruction arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub usize);

/// An argument is addressed by its block and its position within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgId {
    pub block: BlockId,
    pub index: usize,
}

/// Handle to a type alias in the module's alias table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AliasId(pub usize);

/// Handle to a nominal struct type in the module's struct table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructId(pub usize);

/// Handle to a nominal enum type in the module's enum table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumId(pub usize);

/// A scalar literal payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarLiteral {
    Int(i64),
    Float(f64),
}

impl ScalarLiteral {
    pub fn is_integral(&self) -> bool {
        matches!(self, ScalarLiteral::Int(_))
    }
}

/// A literal value. Aggregate literals nest further uses, so a literal
/// can reference instructions and arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// An unspecified value of the carrying type.
    Undefined,
    /// The additive identity of the carrying type.
    Zero,
    /// The null pointer or box.
    Null,
    Bool(bool),
    Scalar(ScalarLiteral),
    Tensor(Vec<Use>),
    Tuple(Vec<Use>),
    Array(Vec<Use>),
    Struct(Vec<(String, Use)>),
    Enum(String, Vec<Use>),
}

impl Literal {
    /// Aggregate literals are the ones that may nest uses; they are
    /// only permitted as the payload of a `literal` instruction.
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Literal::Tensor(_)
                | Literal::Tuple(_)
                | Literal::Array(_)
                | Literal::Struct(_)
                | Literal::Enum(..)
        )
    }

    /// The uses nested directly in this literal.
    pub fn nested_uses(&self) -> Vec<&Use> {
        match self {
            Literal::Tensor(elements) | Literal::Tuple(elements) | Literal::Array(elements) => {
                elements.iter().collect()
            }
            Literal::Struct(fields) => fields.iter().map(|(_, u)| u).collect(),
            Literal::Enum(_, operands) => operands.iter().collect(),
            _ => Vec::new(),
        }
    }
}

/// Something that defines a value: a block argument, an instruction,
/// a global variable, or a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Definition {
    Argument(ArgId),
    Instruction(InstId),
    Variable(VarId),
    Function(FuncId),
}

/// An operand: either a typed literal or a reference to a definition.
/// Equality is structural.
#[derive(Debug, Clone, PartialEq)]
pub enum Use {
    Literal(Type, Literal),
    Definition(Definition),
}

impl Use {
    pub fn scalar_int(value: i64, ty: Type) -> Use {
        Use::Literal(ty, Literal::Scalar(ScalarLiteral::Int(value)))
    }

    pub fn definition(def: Definition) -> Use {
        Use::Definition(def)
    }

    pub fn as_definition(&self) -> Option<Definition> {
        match self {
            Use::Definition(def) => Some(*def),
            Use::Literal(..) => None,
        }
    }

    /// The type this operand carries. Literals carry their type
    /// directly; definitions are resolved through their containers.
    /// A variable use has the pointer type of its declared type.
    pub fn ty(&self, module: &Module, function: &Function) -> Type {
        match self {
            Use::Literal(ty, _) => ty.clone(),
            Use::Definition(Definition::Argument(arg)) => {
                if function.block_index(arg.block).is_none() {
                    return Type::Invalid;
                }
                function
                    .block(arg.block)
                    .arguments()
                    .get(arg.index)
                    .map(|a| a.ty.clone())
                    .unwrap_or(Type::Invalid)
            }
            Use::Definition(Definition::Instruction(inst)) => {
                if inst.0 >= function.instruction_count() {
                    return Type::Invalid;
                }
                function.instruction(*inst).ty.clone()
            }
            Use::Definition(Definition::Variable(var)) => {
                Type::Pointer(Box::new(module.variable(*var).ty.clone()))
            }
            Use::Definition(Definition::Function(func)) => module.function(*func).ty(),
        }
    }
}
