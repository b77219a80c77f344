//! # Instruction Set
//!
//! All instruction kinds in the Tela IR, with the operations that are
//! derived from the shape of each kind:
//!
//! - **Type inference**: every kind yields its result type or
//!   [`Type::Invalid`] when its preconditions do not hold.
//! - **Operand enumeration**: the ordered list of uses, including
//!   uses nested in aggregate literals and in dynamic element keys.
//! - **Substitution**: pointwise use replacement, and terminator
//!   retargeting for CFG edits.
//!
//! The enumeration and substitution operations are both built on one
//! exhaustive traversal (`map_uses`), so a new kind only has to be
//! handled once.

use super::module::Module;
use super::shape::{DataType, TensorShape};
use super::types::{ElementKey, Type};
use super::{BlockId, Literal, ScalarLiteral, Use};

use super::function::Function;

/// Elementwise numeric unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericUnaryOp {
    Tanh,
    Log,
    Exp,
    Negate,
    Sign,
    Square,
    Sqrt,
    Rsqrt,
    Ceil,
    Floor,
    Round,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
}

impl NumericUnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            NumericUnaryOp::Tanh => "tanh",
            NumericUnaryOp::Log => "log",
            NumericUnaryOp::Exp => "exp",
            NumericUnaryOp::Negate => "negate",
            NumericUnaryOp::Sign => "sign",
            NumericUnaryOp::Square => "square",
            NumericUnaryOp::Sqrt => "sqrt",
            NumericUnaryOp::Rsqrt => "rsqrt",
            NumericUnaryOp::Ceil => "ceil",
            NumericUnaryOp::Floor => "floor",
            NumericUnaryOp::Round => "round",
            NumericUnaryOp::Sin => "sin",
            NumericUnaryOp::Cos => "cos",
            NumericUnaryOp::Tan => "tan",
            NumericUnaryOp::Asin => "asin",
            NumericUnaryOp::Acos => "acos",
            NumericUnaryOp::Atan => "atan",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "tanh" => NumericUnaryOp::Tanh,
            "log" => NumericUnaryOp::Log,
            "exp" => NumericUnaryOp::Exp,
            "negate" => NumericUnaryOp::Negate,
            "sign" => NumericUnaryOp::Sign,
            "square" => NumericUnaryOp::Square,
            "sqrt" => NumericUnaryOp::Sqrt,
            "rsqrt" => NumericUnaryOp::Rsqrt,
            "ceil" => NumericUnaryOp::Ceil,
            "floor" => NumericUnaryOp::Floor,
            "round" => NumericUnaryOp::Round,
            "sin" => NumericUnaryOp::Sin,
            "cos" => NumericUnaryOp::Cos,
            "tan" => NumericUnaryOp::Tan,
            "asin" => NumericUnaryOp::Asin,
            "acos" => NumericUnaryOp::Acos,
            "atan" => NumericUnaryOp::Atan,
            _ => return None,
        })
    }
}

/// Elementwise numeric binary operations. Operand shapes broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericBinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Min,
    Max,
}

impl NumericBinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            NumericBinaryOp::Add => "add",
            NumericBinaryOp::Subtract => "subtract",
            NumericBinaryOp::Multiply => "multiply",
            NumericBinaryOp::Divide => "divide",
            NumericBinaryOp::Modulo => "modulo",
            NumericBinaryOp::Power => "power",
            NumericBinaryOp::Min => "min",
            NumericBinaryOp::Max => "max",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "add" => NumericBinaryOp::Add,
            "subtract" => NumericBinaryOp::Subtract,
            "multiply" => NumericBinaryOp::Multiply,
            "divide" => NumericBinaryOp::Divide,
            "modulo" => NumericBinaryOp::Modulo,
            "power" => NumericBinaryOp::Power,
            "min" => NumericBinaryOp::Min,
            "max" => NumericBinaryOp::Max,
            _ => return None,
        })
    }
}

/// Elementwise boolean binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanBinaryOp {
    And,
    Or,
}

impl BooleanBinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BooleanBinaryOp::And => "and",
            BooleanBinaryOp::Or => "or",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "and" => BooleanBinaryOp::And,
            "or" => BooleanBinaryOp::Or,
            _ => return None,
        })
    }
}

/// Elementwise comparisons; the result data type is boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Equal,
    NotEqual,
}

impl ComparisonOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::LessThan => "lessThan",
            ComparisonOp::LessThanOrEqual => "lessThanOrEqual",
            ComparisonOp::GreaterThan => "greaterThan",
            ComparisonOp::GreaterThanOrEqual => "greaterThanOrEqual",
            ComparisonOp::Equal => "equal",
            ComparisonOp::NotEqual => "notEqual",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "lessThan" => ComparisonOp::LessThan,
            "lessThanOrEqual" => ComparisonOp::LessThanOrEqual,
            "greaterThan" => ComparisonOp::GreaterThan,
            "greaterThanOrEqual" => ComparisonOp::GreaterThanOrEqual,
            "equal" => ComparisonOp::Equal,
            "notEqual" => ComparisonOp::NotEqual,
            _ => return None,
        })
    }
}

/// How a combining operation folds tensor elements.
#[derive(Debug, Clone, PartialEq)]
pub enum ReductionCombinator {
    /// A first-class combinator of type `(s, s) -> s` where `s` is a
    /// scalar tensor of the reduced data type.
    Function(Use),
    Boolean(BooleanBinaryOp),
    Numeric(NumericBinaryOp),
    /// An intrinsic, referenced by its registry key.
    NumericBuiltin(String),
}

/// Window padding for `reduceWindow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// Valid windows only.
    None,
    /// Both sides padded by `(window - 1) / 2` first.
    Half,
}

/// An instruction kind and its operands. Result types are derived,
/// never stored here.
#[derive(Debug, Clone, PartialEq)]
pub enum InstructionKind {
    /// A literal of an explicitly given type. A scalar payload with a
    /// tensor type is a broadcast literal.
    Literal(Literal, Type),
    NumericUnary(NumericUnaryOp, Use),
    NumericBinary(NumericBinaryOp, Use, Use),
    BooleanBinary(BooleanBinaryOp, Use, Use),
    Compare(ComparisonOp, Use, Use),
    Not(Use),
    /// Matrix multiplication, or the inner product of two identical
    /// vectors.
    Dot(Use, Use),
    Concatenate(Vec<Use>, usize),
    Transpose(Use),
    Reverse(Use, Vec<usize>),
    /// Slice of the leading dimension, bounds inclusive.
    Slice(Use, usize, usize),
    /// A fresh tensor of the given shape drawn uniformly between two
    /// scalar bounds.
    Random(TensorShape, Use, Use),
    /// Elementwise choice between `left` and `right` by boolean flags.
    Select(Use, Use, Use),
    Reduce {
        combinator: ReductionCombinator,
        operand: Use,
        initial: Use,
        dimensions: Vec<usize>,
    },
    Scan {
        combinator: ReductionCombinator,
        operand: Use,
        dimensions: Vec<usize>,
    },
    ReduceWindow {
        combinator: ReductionCombinator,
        operand: Use,
        initial: Use,
        dimensions: TensorShape,
        strides: Vec<usize>,
        padding: Padding,
    },
    Convolve {
        operand: Use,
        kernel: Use,
        strides: Option<Vec<usize>>,
        padding: Option<Vec<(usize, usize)>>,
        left_dilation: Option<Vec<usize>>,
        right_dilation: Option<Vec<usize>>,
        groups: Option<usize>,
    },
    Rank(Use),
    Shape(Use),
    UnitCount(Use),
    PadShape(Use, usize),
    SqueezeShape(Use, usize),
    ShapeCast(Use, TensorShape),
    BitCast(Use, Type),
    DataTypeCast(Use, DataType),
    Extract {
        source: Use,
        keys: Vec<ElementKey>,
    },
    Insert {
        source: Use,
        destination: Use,
        keys: Vec<ElementKey>,
    },
    Apply {
        callee: Use,
        arguments: Vec<Use>,
    },
    AllocateStack(Type, usize),
    AllocateHeap(Type, Use),
    AllocateBox(Type),
    ProjectBox(Use),
    Load(Use),
    Store {
        value: Use,
        destination: Use,
    },
    ElementPointer(Use, Vec<ElementKey>),
    Copy {
        source: Use,
        destination: Use,
        count: Use,
    },
    CreateStack,
    DestroyStack(Use),
    Push {
        value: Use,
        stack: Use,
    },
    Pop(Type, Use),
    Retain(Use),
    Release(Use),
    Deallocate(Use),
    Branch(BlockId, Vec<Use>),
    Conditional {
        condition: Use,
        then_block: BlockId,
        then_arguments: Vec<Use>,
        else_block: BlockId,
        else_arguments: Vec<Use>,
    },
    BranchEnum(Use, Vec<(String, BlockId)>),
    Return(Option<Use>),
    Trap,
    /// An intrinsic call; the string is the registry key.
    Builtin(String, Vec<Use>),
}

/// A single instruction: an optional name, a kind, the type derived
/// from the kind (stored at construction; the verifier re-derives and
/// compares), and the parent block back-reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub name: Option<String>,
    pub kind: InstructionKind,
    pub ty: Type,
    pub(crate) parent: Option<BlockId>,
}

impl Instruction {
    pub fn new(name: Option<String>, kind: InstructionKind, ty: Type) -> Self {
        Instruction {
            name,
            kind,
            ty,
            parent: None,
        }
    }

    pub fn parent(&self) -> Option<BlockId> {
        self.parent
    }
}

fn map_use(u: &Use, f: &mut impl FnMut(&Use) -> Use) -> Use {
    match f(u) {
        Use::Literal(ty, literal) => Use::Literal(ty, map_literal(&literal, f)),
        other => other,
    }
}

fn map_literal(literal: &Literal, f: &mut impl FnMut(&Use) -> Use) -> Literal {
    match literal {
        Literal::Tensor(elements) => {
            Literal::Tensor(elements.iter().map(|u| map_use(u, f)).collect())
        }
        Literal::Tuple(elements) => {
            Literal::Tuple(elements.iter().map(|u| map_use(u, f)).collect())
        }
        Literal::Array(elements) => {
            Literal::Array(elements.iter().map(|u| map_use(u, f)).collect())
        }
        Literal::Struct(fields) => Literal::Struct(
            fields
                .iter()
                .map(|(n, u)| (n.clone(), map_use(u, f)))
                .collect(),
        ),
        Literal::Enum(case, operands) => Literal::Enum(
            case.clone(),
            operands.iter().map(|u| map_use(u, f)).collect(),
        ),
        other => other.clone(),
    }
}

fn map_keys(keys: &[ElementKey], f: &mut impl FnMut(&Use) -> Use) -> Vec<ElementKey> {
    keys.iter()
        .map(|key| match key {
            ElementKey::Value(u) => ElementKey::Value(map_use(u, f)),
            other => other.clone(),
        })
        .collect()
}

fn map_combinator(
    combinator: &ReductionCombinator,
    f: &mut impl FnMut(&Use) -> Use,
) -> ReductionCombinator {
    match combinator {
        ReductionCombinator::Function(u) => ReductionCombinator::Function(map_use(u, f)),
        other => other.clone(),
    }
}

impl InstructionKind {
    /// Rebuilds the kind with `f` applied to every use position,
    /// including uses nested in aggregate literals, dynamic element
    /// keys, and reduction combinators. The single traversal that
    /// `operands` and `substituting` are derived from.
    pub fn map_uses(&self, f: &mut impl FnMut(&Use) -> Use) -> InstructionKind {
        use InstructionKind::*;
        match self {
            Literal(literal, ty) => Literal(map_literal(literal, f), ty.clone()),
            NumericUnary(op, v) => NumericUnary(*op, map_use(v, f)),
            NumericBinary(op, a, b) => NumericBinary(*op, map_use(a, f), map_use(b, f)),
            BooleanBinary(op, a, b) => BooleanBinary(*op, map_use(a, f), map_use(b, f)),
            Compare(op, a, b) => Compare(*op, map_use(a, f), map_use(b, f)),
            Not(v) => Not(map_use(v, f)),
            Dot(a, b) => Dot(map_use(a, f), map_use(b, f)),
            Concatenate(vs, axis) => {
                Concatenate(vs.iter().map(|u| map_use(u, f)).collect(), *axis)
            }
            Transpose(v) => Transpose(map_use(v, f)),
            Reverse(v, dims) => Reverse(map_use(v, f), dims.clone()),
            Slice(v, lower, upper) => Slice(map_use(v, f), *lower, *upper),
            Random(shape, lo, hi) => Random(shape.clone(), map_use(lo, f), map_use(hi, f)),
            Select(l, r, flags) => Select(map_use(l, f), map_use(r, f), map_use(flags, f)),
            Reduce {
                combinator,
                operand,
                initial,
                dimensions,
            } => Reduce {
                combinator: map_combinator(combinator, f),
                operand: map_use(operand, f),
                initial: map_use(initial, f),
                dimensions: dimensions.clone(),
            },
            Scan {
                combinator,
                operand,
                dimensions,
            } => Scan {
                combinator: map_combinator(combinator, f),
                operand: map_use(operand, f),
                dimensions: dimensions.clone(),
            },
            ReduceWindow {
                combinator,
                operand,
                initial,
                dimensions,
                strides,
                padding,
            } => ReduceWindow {
                combinator: map_combinator(combinator, f),
                operand: map_use(operand, f),
                initial: map_use(initial, f),
                dimensions: dimensions.clone(),
                strides: strides.clone(),
                padding: *padding,
            },
            Convolve {
                operand,
                kernel,
                strides,
                padding,
                left_dilation,
                right_dilation,
                groups,
            } => Convolve {
                operand: map_use(operand, f),
                kernel: map_use(kernel, f),
                strides: strides.clone(),
                padding: padding.clone(),
                left_dilation: left_dilation.clone(),
                right_dilation: right_dilation.clone(),
                groups: *groups,
            },
            Rank(v) => Rank(map_use(v, f)),
            Shape(v) => Shape(map_use(v, f)),
            UnitCount(v) => UnitCount(map_use(v, f)),
            PadShape(v, at) => PadShape(map_use(v, f), *at),
            SqueezeShape(v, at) => SqueezeShape(map_use(v, f), *at),
            ShapeCast(v, shape) => ShapeCast(map_use(v, f), shape.clone()),
            BitCast(v, ty) => BitCast(map_use(v, f), ty.clone()),
            DataTypeCast(v, dtype) => DataTypeCast(map_use(v, f), *dtype),
            Extract { source, keys } => Extract {
                source: map_use(source, f),
                keys: map_keys(keys, f),
            },
            Insert {
                source,
                destination,
                keys,
            } => Insert {
                source: map_use(source, f),
                destination: map_use(destination, f),
                keys: map_keys(keys, f),
            },
            Apply { callee, arguments } => Apply {
                callee: map_use(callee, f),
                arguments: arguments.iter().map(|u| map_use(u, f)).collect(),
            },
            AllocateStack(ty, count) => AllocateStack(ty.clone(), *count),
            AllocateHeap(ty, count) => AllocateHeap(ty.clone(), map_use(count, f)),
            AllocateBox(ty) => AllocateBox(ty.clone()),
            ProjectBox(v) => ProjectBox(map_use(v, f)),
            Load(p) => Load(map_use(p, f)),
            Store { value, destination } => Store {
                value: map_use(value, f),
                destination: map_use(destination, f),
            },
            ElementPointer(p, keys) => ElementPointer(map_use(p, f), map_keys(keys, f)),
            Copy {
                source,
                destination,
                count,
            } => Copy {
                source: map_use(source, f),
                destination: map_use(destination, f),
                count: map_use(count, f),
            },
            CreateStack => CreateStack,
            DestroyStack(s) => DestroyStack(map_use(s, f)),
            Push { value, stack } => Push {
                value: map_use(value, f),
                stack: map_use(stack, f),
            },
            Pop(ty, s) => Pop(ty.clone(), map_use(s, f)),
            Retain(b) => Retain(map_use(b, f)),
            Release(b) => Release(map_use(b, f)),
            Deallocate(p) => Deallocate(map_use(p, f)),
            Branch(block, args) => {
                Branch(*block, args.iter().map(|u| map_use(u, f)).collect())
            }
            Conditional {
                condition,
                then_block,
                then_arguments,
                else_block,
                else_arguments,
            } => Conditional {
                condition: map_use(condition, f),
                then_block: *then_block,
                then_arguments: then_arguments.iter().map(|u| map_use(u, f)).collect(),
                else_block: *else_block,
                else_arguments: else_arguments.iter().map(|u| map_use(u, f)).collect(),
            },
            BranchEnum(v, cases) => BranchEnum(map_use(v, f), cases.clone()),
            Return(v) => Return(v.as_ref().map(|u| map_use(u, f))),
            Trap => Trap,
            Builtin(key, arguments) => Builtin(
                key.clone(),
                arguments.iter().map(|u| map_use(u, f)).collect(),
            ),
        }
    }

    /// The ordered operand list, including uses nested in aggregate
    /// literals and element keys.
    pub fn operands(&self) -> Vec<Use> {
        let mut operands = Vec::new();
        self.map_uses(&mut |u| {
            operands.push(u.clone());
            u.clone()
        });
        operands
    }

    /// Pointwise replacement of every position equal to `old` with
    /// `new`; all other positions are untouched.
    pub fn substituting(&self, new: &Use, old: &Use) -> InstructionKind {
        self.map_uses(&mut |u| if u == old { new.clone() } else { u.clone() })
    }

    /// Retargets branch destinations equal to `old` to `new`, in
    /// `branch`, both arms of `conditional`, and `branchEnum`.
    pub fn substituting_branches(&self, old: BlockId, new: BlockId) -> InstructionKind {
        let retarget = |b: BlockId| if b == old { new } else { b };
        match self {
            InstructionKind::Branch(block, args) => {
                InstructionKind::Branch(retarget(*block), args.clone())
            }
            InstructionKind::Conditional {
                condition,
                then_block,
                then_arguments,
                else_block,
                else_arguments,
            } => InstructionKind::Conditional {
                condition: condition.clone(),
                then_block: retarget(*then_block),
                then_arguments: then_arguments.clone(),
                else_block: retarget(*else_block),
                else_arguments: else_arguments.clone(),
            },
            InstructionKind::BranchEnum(v, cases) => InstructionKind::BranchEnum(
                v.clone(),
                cases
                    .iter()
                    .map(|(case, block)| (case.clone(), retarget(*block)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Successor blocks of a terminator; empty for non-terminators,
    /// `return`, and `trap`.
    pub fn branch_targets(&self) -> Vec<BlockId> {
        match self {
            InstructionKind::Branch(block, _) => vec![*block],
            InstructionKind::Conditional {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            InstructionKind::BranchEnum(_, cases) => {
                cases.iter().map(|(_, block)| *block).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstructionKind::Branch(..)
                | InstructionKind::Conditional { .. }
                | InstructionKind::BranchEnum(..)
                | InstructionKind::Return(..)
                | InstructionKind::Trap
        )
    }

    /// Kinds that mutate memory or a runtime resource. Allocation and
    /// `random` are not writers: an unused allocation or draw is
    /// removable.
    pub fn must_write_to_memory(&self) -> bool {
        matches!(
            self,
            InstructionKind::Store { .. }
                | InstructionKind::Copy { .. }
                | InstructionKind::Push { .. }
                | InstructionKind::Pop(..)
                | InstructionKind::DestroyStack(..)
                | InstructionKind::Retain(..)
                | InstructionKind::Release(..)
                | InstructionKind::Deallocate(..)
        )
    }

    /// The surface opcode this kind prints as.
    pub fn opcode(&self) -> &'static str {
        use InstructionKind::*;
        match self {
            Literal(..) => "literal",
            NumericUnary(op, _) => op.as_str(),
            NumericBinary(op, ..) => op.as_str(),
            BooleanBinary(op, ..) => op.as_str(),
            Compare(op, ..) => op.as_str(),
            Not(..) => "not",
            Dot(..) => "dot",
            Concatenate(..) => "concatenate",
            Transpose(..) => "transpose",
            Reverse(..) => "reverse",
            Slice(..) => "slice",
            Random(..) => "random",
            Select(..) => "select",
            Reduce { .. } => "reduce",
            Scan { .. } => "scan",
            ReduceWindow { .. } => "reduceWindow",
            Convolve { .. } => "convolve",
            Rank(..) => "rank",
            Shape(..) => "shape",
            UnitCount(..) => "unitCount",
            PadShape(..) => "padShape",
            SqueezeShape(..) => "squeezeShape",
            ShapeCast(..) => "shapeCast",
            BitCast(..) => "bitCast",
            DataTypeCast(..) => "dataTypeCast",
            Extract { .. } => "extract",
            Insert { .. } => "insert",
            Apply { .. } => "apply",
            AllocateStack(..) => "allocateStack",
            AllocateHeap(..) => "allocateHeap",
            AllocateBox(..) => "allocateBox",
            ProjectBox(..) => "projectBox",
            Load(..) => "load",
            Store { .. } => "store",
            ElementPointer(..) => "elementPointer",
            Copy { .. } => "copy",
            CreateStack => "createStack",
            DestroyStack(..) => "destroyStack",
            Push { .. } => "push",
            Pop(..) => "pop",
            Retain(..) => "retain",
            Release(..) => "release",
            Deallocate(..) => "deallocate",
            Branch(..) => "branch",
            Conditional { .. } => "conditional",
            BranchEnum(..) => "branchEnum",
            Return(..) => "return",
            Trap => "trap",
            Builtin(..) => "builtin",
        }
    }
}

fn tensor_of(u: &Use, module: &Module, function: &Function) -> Option<(TensorShape, DataType)> {
    u.ty(module, function).unaliased(module).tensor_type()
}

fn scalar_of(
    u: &Use,
    module: &Module,
    function: &Function,
) -> Option<DataType> {
    match tensor_of(u, module, function) {
        Some((shape, dtype)) if shape.is_scalar() => Some(dtype),
        _ => None,
    }
}

fn distinct_in_range(dimensions: &[usize], rank: usize) -> bool {
    dimensions.iter().all(|d| *d < rank)
        && dimensions
            .iter()
            .enumerate()
            .all(|(i, d)| !dimensions[..i].contains(d))
}

fn combinator_matches(
    combinator: &ReductionCombinator,
    dtype: DataType,
    module: &Module,
    function: &Function,
) -> bool {
    match combinator {
        ReductionCombinator::Function(u) => {
            let scalar = Type::scalar(dtype);
            u.ty(module, function).unaliased(module)
                == Type::Function(vec![scalar.clone(), scalar.clone()], Box::new(scalar))
        }
        ReductionCombinator::Boolean(_) => dtype.is_bool(),
        ReductionCombinator::Numeric(_) => dtype.is_numeric(),
        ReductionCombinator::NumericBuiltin(key) => {
            dtype.is_numeric() && module.intrinsics().intrinsic(key).is_some()
        }
    }
}

fn is_literal_one(u: &Use) -> bool {
    matches!(
        u,
        Use::Literal(_, Literal::Scalar(ScalarLiteral::Int(1)))
    )
}

fn keys_well_typed(keys: &[ElementKey], module: &Module, function: &Function) -> bool {
    keys.iter().all(|key| match key {
        ElementKey::Value(u) => matches!(
            tensor_of(u, module, function),
            Some((shape, DataType::Int(_))) if shape.is_scalar()
        ),
        _ => true,
    })
}

fn element_at(
    ty: &Type,
    keys: &[ElementKey],
    module: &Module,
    function: &Function,
) -> Option<Type> {
    if !keys_well_typed(keys, module, function) {
        return None;
    }
    ty.element_type(keys, module)
}

impl InstructionKind {
    /// Derives this kind's result type, or [`Type::Invalid`] when a
    /// precondition does not hold.
    pub fn infer_type(&self, module: &Module, function: &Function) -> Type {
        self.try_infer(module, function).unwrap_or(Type::Invalid)
    }

    fn try_infer(&self, module: &Module, function: &Function) -> Option<Type> {
        use InstructionKind::*;
        match self {
            Literal(_, ty) => ty.is_valid(module).then(|| ty.clone()),
            NumericUnary(_, v) => {
                let (shape, dtype) = tensor_of(v, module, function)?;
                dtype.is_numeric().then(|| Type::tensor(shape, dtype))
            }
            NumericBinary(_, a, b) => {
                let (sa, da) = tensor_of(a, module, function)?;
                let (sb, db) = tensor_of(b, module, function)?;
                (da == db && da.is_numeric())
                    .then(|| sa.broadcast(&sb).map(|s| Type::tensor(s, da)))?
            }
            BooleanBinary(_, a, b) => {
                let (sa, da) = tensor_of(a, module, function)?;
                let (sb, db) = tensor_of(b, module, function)?;
                (da == db && da.is_bool())
                    .then(|| sa.broadcast(&sb).map(|s| Type::tensor(s, DataType::Bool)))?
            }
            Compare(_, a, b) => {
                let (sa, da) = tensor_of(a, module, function)?;
                let (sb, db) = tensor_of(b, module, function)?;
                (da == db && da.is_numeric())
                    .then(|| sa.broadcast(&sb).map(|s| Type::tensor(s, DataType::Bool)))?
            }
            Not(v) => {
                let (shape, dtype) = tensor_of(v, module, function)?;
                dtype
                    .is_bool()
                    .then(|| Type::tensor(shape, DataType::Bool))
            }
            Dot(a, b) => {
                let (sa, da) = tensor_of(a, module, function)?;
                let (sb, db) = tensor_of(b, module, function)?;
                if da != db || !da.is_numeric() {
                    return None;
                }
                if let Some(shape) = sa.matrix_multiplied(&sb) {
                    Some(Type::tensor(shape, da))
                } else if sa.is_vector() && sa == sb {
                    Some(Type::scalar(da))
                } else {
                    None
                }
            }
            Concatenate(operands, axis) => {
                let (mut shape, dtype) = tensor_of(operands.first()?, module, function)?;
                if *axis >= shape.rank() {
                    return None;
                }
                for operand in &operands[1..] {
                    let (s, d) = tensor_of(operand, module, function)?;
                    if d != dtype {
                        return None;
                    }
                    shape = shape.concatenating(&s, *axis)?;
                }
                Some(Type::tensor(shape, dtype))
            }
            Transpose(v) => {
                let (shape, dtype) = tensor_of(v, module, function)?;
                Some(Type::tensor(shape.transpose(), dtype))
            }
            Reverse(v, dimensions) => {
                let (shape, dtype) = tensor_of(v, module, function)?;
                distinct_in_range(dimensions, shape.rank())
                    .then(|| Type::tensor(shape, dtype))
            }
            Slice(v, lower, upper) => {
                let (shape, dtype) = tensor_of(v, module, function)?;
                if shape.rank() == 0 || lower > upper || *upper >= shape[0] {
                    return None;
                }
                let mut dimensions = shape.dimensions().to_vec();
                dimensions[0] = upper - lower + 1;
                Some(Type::tensor(TensorShape::new(dimensions), dtype))
            }
            Random(shape, lo, hi) => {
                let dl = scalar_of(lo, module, function)?;
                let dh = scalar_of(hi, module, function)?;
                (dl == dh && dl.is_numeric()).then(|| Type::tensor(shape.clone(), dl))
            }
            Select(left, right, flags) => {
                let (sl, dl) = tensor_of(left, module, function)?;
                let (sr, dr) = tensor_of(right, module, function)?;
                let (sf, df) = tensor_of(flags, module, function)?;
                if dl != dr || !df.is_bool() {
                    return None;
                }
                let shape = sl.broadcast(&sr)?.broadcast(&sf)?;
                Some(Type::tensor(shape, dl))
            }
            Reduce {
                combinator,
                operand,
                initial,
                dimensions,
            } => {
                let (shape, dtype) = tensor_of(operand, module, function)?;
                if !distinct_in_range(dimensions, shape.rank())
                    || scalar_of(initial, module, function) != Some(dtype)
                    || !combinator_matches(combinator, dtype, module, function)
                {
                    return None;
                }
                Some(Type::tensor(shape.dropping_dimensions(dimensions), dtype))
            }
            Scan {
                combinator,
                operand,
                dimensions,
            } => {
                let (shape, dtype) = tensor_of(operand, module, function)?;
                (distinct_in_range(dimensions, shape.rank())
                    && combinator_matches(combinator, dtype, module, function))
                .then(|| Type::tensor(shape, dtype))
            }
            ReduceWindow {
                combinator,
                operand,
                initial,
                dimensions,
                strides,
                padding,
            } => {
                let (shape, dtype) = tensor_of(operand, module, function)?;
                let rank = shape.rank();
                if dimensions.rank() != rank
                    || strides.len() != rank
                    || strides.iter().any(|s| *s == 0)
                    || scalar_of(initial, module, function) != Some(dtype)
                    || !combinator_matches(combinator, dtype, module, function)
                {
                    return None;
                }
                let mut output = Vec::with_capacity(rank);
                for i in 0..rank {
                    let window = dimensions[i];
                    if window == 0 {
                        return None;
                    }
                    let base = match padding {
                        Padding::None => shape[i],
                        Padding::Half => shape[i] + 2 * ((window - 1) / 2),
                    };
                    if window > base {
                        return None;
                    }
                    output.push((base - window) / strides[i] + 1);
                }
                Some(Type::tensor(TensorShape::new(output), dtype))
            }
            Convolve {
                operand,
                kernel,
                strides,
                padding,
                left_dilation,
                right_dilation,
                groups,
            } => {
                let (shape, dtype) = tensor_of(operand, module, function)?;
                let (kernel_shape, kernel_dtype) = tensor_of(kernel, module, function)?;
                let rank = shape.rank();
                if rank < 3 || kernel_shape.rank() != rank || dtype != kernel_dtype {
                    return None;
                }
                let n = rank - 2;
                let strides = strides.clone().unwrap_or_else(|| vec![1; n]);
                let padding = padding.clone().unwrap_or_else(|| vec![(0, 0); n]);
                let left_dilation = left_dilation.clone().unwrap_or_else(|| vec![1; n]);
                let right_dilation = right_dilation.clone().unwrap_or_else(|| vec![1; n]);
                let groups = groups.unwrap_or(1);
                if strides.len() != n
                    || padding.len() != n
                    || left_dilation.len() != n
                    || right_dilation.len() != n
                    || strides.iter().any(|s| *s == 0)
                    || left_dilation.iter().any(|d| *d == 0)
                    || right_dilation.iter().any(|d| *d == 0)
                    || groups == 0
                    || groups > kernel_shape[0]
                    || shape[1] != kernel_shape[1] * groups
                {
                    return None;
                }
                let mut output = Vec::with_capacity(rank);
                output.push(shape[0]);
                output.push((kernel_shape[0] / groups) * groups);
                for i in 0..n {
                    if shape[i + 2] == 0 || kernel_shape[i + 2] == 0 {
                        return None;
                    }
                    let dilated_base = (shape[i + 2] - 1) * left_dilation[i] + 1;
                    let padded_dilated_base = padding[i].0 + dilated_base + padding[i].1;
                    let dilated_window = (kernel_shape[i + 2] - 1) * right_dilation[i] + 1;
                    output.push(if dilated_window > padded_dilated_base {
                        0
                    } else {
                        (padded_dilated_base - dilated_window) / strides[i] + 1
                    });
                }
                Some(Type::tensor(TensorShape::new(output), dtype))
            }
            Rank(v) | UnitCount(v) => {
                tensor_of(v, module, function)?;
                Some(Type::scalar(DataType::Int(64)))
            }
            Shape(v) => {
                let (shape, _) = tensor_of(v, module, function)?;
                Some(Type::tensor(
                    TensorShape::new(vec![shape.rank()]),
                    DataType::Int(64),
                ))
            }
            PadShape(v, at) => {
                let (shape, dtype) = tensor_of(v, module, function)?;
                (*at <= shape.rank()).then(|| Type::tensor(shape.padding_dimension(*at), dtype))
            }
            SqueezeShape(v, at) => {
                let (shape, dtype) = tensor_of(v, module, function)?;
                (*at < shape.rank() && shape[*at] == 1)
                    .then(|| Type::tensor(shape.dropping_dimension(*at), dtype))
            }
            ShapeCast(v, target) => {
                let (shape, dtype) = tensor_of(v, module, function)?;
                (shape.contiguous_size() == target.contiguous_size())
                    .then(|| Type::tensor(target.clone(), dtype))
            }
            BitCast(_, ty) => ty.is_valid(module).then(|| ty.clone()),
            DataTypeCast(v, target) => {
                let (shape, dtype) = tensor_of(v, module, function)?;
                dtype
                    .can_cast(target)
                    .then(|| Type::tensor(shape, *target))
            }
            Extract { source, keys } => {
                element_at(&source.ty(module, function), keys, module, function)
            }
            Insert {
                source,
                destination,
                keys,
            } => {
                let destination_ty = destination.ty(module, function);
                let element = element_at(&destination_ty, keys, module, function)?;
                source
                    .ty(module, function)
                    .conforms_to(&element, module)
                    .then_some(destination_ty)
            }
            Apply { callee, arguments } => {
                let (parameters, result) = match callee.ty(module, function).unaliased(module) {
                    Type::Function(parameters, result) => (parameters, result),
                    Type::Pointer(pointee) => match *pointee {
                        Type::Function(parameters, result) => (parameters, result),
                        _ => return None,
                    },
                    _ => return None,
                };
                if parameters.len() != arguments.len() {
                    return None;
                }
                for (parameter, argument) in parameters.iter().zip(arguments) {
                    if !argument
                        .ty(module, function)
                        .conforms_to(parameter, module)
                    {
                        return None;
                    }
                }
                Some(*result)
            }
            AllocateStack(ty, count) => {
                (ty.is_valid(module) && *count > 0)
                    .then(|| Type::Pointer(Box::new(ty.clone())))
            }
            AllocateHeap(ty, count) => {
                (ty.is_valid(module)
                    && scalar_of(count, module, function) == Some(DataType::Int(64)))
                .then(|| Type::Pointer(Box::new(ty.clone())))
            }
            AllocateBox(ty) => ty
                .is_valid(module)
                .then(|| Type::Box(Box::new(ty.clone()))),
            ProjectBox(v) => match v.ty(module, function).unaliased(module) {
                Type::Box(element) => Some(Type::Pointer(element)),
                _ => None,
            },
            Load(p) => match p.ty(module, function).unaliased(module) {
                Type::Pointer(element) => Some(*element),
                _ => None,
            },
            Store { value, destination } => {
                match destination.ty(module, function).unaliased(module) {
                    Type::Pointer(element) => value
                        .ty(module, function)
                        .conforms_to(&element, module)
                        .then_some(Type::Void),
                    _ => None,
                }
            }
            ElementPointer(p, keys) => match p.ty(module, function).unaliased(module) {
                Type::Pointer(element) => {
                    element_at(&element, keys, module, function).map(|t| Type::Pointer(Box::new(t)))
                }
                _ => None,
            },
            Copy {
                source,
                destination,
                count,
            } => {
                let element = |u: &Use| match u.ty(module, function).unaliased(module) {
                    Type::Pointer(element) => Some((*element, false)),
                    Type::Box(element) => Some((*element, true)),
                    _ => None,
                };
                let (from, from_boxed) = element(source)?;
                let (to, to_boxed) = element(destination)?;
                if from != to || scalar_of(count, module, function) != Some(DataType::Int(64)) {
                    return None;
                }
                if (from_boxed || to_boxed) && !is_literal_one(count) {
                    // Copying through a box moves exactly one payload.
                    return None;
                }
                Some(Type::Void)
            }
            CreateStack => Some(Type::Stack),
            DestroyStack(s) => {
                (s.ty(module, function).unaliased(module) == Type::Stack).then_some(Type::Void)
            }
            Push { stack, .. } => {
                (stack.ty(module, function).unaliased(module) == Type::Stack)
                    .then_some(Type::Void)
            }
            Pop(ty, s) => (ty.is_valid(module)
                && s.ty(module, function).unaliased(module) == Type::Stack)
                .then(|| ty.clone()),
            Retain(b) | Release(b) => {
                matches!(b.ty(module, function).unaliased(module), Type::Box(_))
                    .then_some(Type::Void)
            }
            Deallocate(p) => matches!(
                p.ty(module, function).unaliased(module),
                Type::Pointer(_) | Type::Box(_)
            )
            .then_some(Type::Void),
            Branch(block, arguments) => {
                block_accepts(*block, arguments, module, function).then_some(Type::Void)
            }
            Conditional {
                condition,
                then_block,
                then_arguments,
                else_block,
                else_arguments,
            } => (condition.ty(module, function).unaliased(module) == Type::Bool
                && block_accepts(*then_block, then_arguments, module, function)
                && block_accepts(*else_block, else_arguments, module, function))
            .then_some(Type::Void),
            BranchEnum(v, cases) => {
                let id = match v.ty(module, function).unaliased(module) {
                    Type::Enum(id) => id,
                    _ => return None,
                };
                for (case, block) in cases {
                    let associated = module.enum_type(id).case(case)?.to_vec();
                    if block.0 >= function.block_count() {
                        return None;
                    }
                    let block = function.block(*block);
                    if block.arguments().len() != associated.len()
                        || !block
                            .arguments()
                            .iter()
                            .zip(&associated)
                            .all(|(a, t)| a.ty.conforms_to(t, module))
                    {
                        return None;
                    }
                }
                Some(Type::Void)
            }
            Return(value) => {
                let matches = match value {
                    Some(v) => v
                        .ty(module, function)
                        .conforms_to(&function.return_type, module),
                    None => function.return_type.is_void(),
                };
                matches.then_some(Type::Void)
            }
            Trap => Some(Type::Void),
            Builtin(key, arguments) => {
                let intrinsic = module.intrinsics().intrinsic(key)?;
                let argument_types: Vec<Type> = arguments
                    .iter()
                    .map(|u| u.ty(module, function))
                    .collect();
                let result = intrinsic.result_type(&argument_types);
                (!result.is_invalid()).then_some(result)
            }
        }
    }
}

fn block_accepts(
    block: BlockId,
    arguments: &[Use],
    module: &Module,
    function: &Function,
) -> bool {
    if block.0 >= function.block_count() {
        return false;
    }
    let parameters = function.block(block).arguments();
    parameters.len() == arguments.len()
        && parameters
            .iter()
            .zip(arguments)
            .all(|(p, a)| a.ty(module, function).conforms_to(&p.ty, module))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::function::BasicBlock;
    use crate::ir::intrinsics::IntrinsicRegistry;
    use crate::ir::module::{Module, Stage};
    use crate::ir::{ArgId, Definition};
    use std::rc::Rc;

    fn context() -> (Module, Function) {
        let module = Module::new("t", Stage::Raw, Rc::new(IntrinsicRegistry::default()));
        let mut function = Function::new(Some("f".into()), vec![], Type::Void);
        function.append_block(BasicBlock::new(Some("entry".into()), vec![]));
        (module, function)
    }

    fn i32_scalar() -> Type {
        Type::scalar(DataType::Int(32))
    }

    fn tensor(dims: &[usize], dtype: DataType) -> Type {
        Type::tensor(TensorShape::new(dims.to_vec()), dtype)
    }

    fn lit(value: i64, ty: Type) -> Use {
        Use::Literal(ty, Literal::Scalar(ScalarLiteral::Int(value)))
    }

    #[test]
    fn test_numeric_binary_broadcasts() {
        let (module, function) = context();
        let kind = InstructionKind::NumericBinary(
            NumericBinaryOp::Add,
            lit(1, tensor(&[2, 2], DataType::Int(32))),
            lit(2, i32_scalar()),
        );
        assert_eq!(
            kind.infer_type(&module, &function),
            tensor(&[2, 2], DataType::Int(32))
        );

        let mismatched = InstructionKind::NumericBinary(
            NumericBinaryOp::Add,
            lit(1, tensor(&[2, 3], DataType::Int(32))),
            lit(2, tensor(&[4, 3], DataType::Int(32))),
        );
        assert_eq!(mismatched.infer_type(&module, &function), Type::Invalid);
    }

    #[test]
    fn test_compare_yields_bool() {
        let (module, function) = context();
        let scalar = InstructionKind::Compare(
            ComparisonOp::Equal,
            lit(1, i32_scalar()),
            lit(2, i32_scalar()),
        );
        assert_eq!(scalar.infer_type(&module, &function), Type::Bool);

        let wide = InstructionKind::Compare(
            ComparisonOp::LessThan,
            lit(1, tensor(&[4], DataType::Int(32))),
            lit(2, i32_scalar()),
        );
        assert_eq!(
            wide.infer_type(&module, &function),
            tensor(&[4], DataType::Bool)
        );
    }

    #[test]
    fn test_dot() {
        let (module, function) = context();
        let matrices = InstructionKind::Dot(
            lit(0, tensor(&[2, 3], DataType::Float(crate::ir::shape::FloatPrecision::Single))),
            lit(0, tensor(&[3, 4], DataType::Float(crate::ir::shape::FloatPrecision::Single))),
        );
        assert_eq!(
            matrices.infer_type(&module, &function),
            tensor(&[2, 4], DataType::Float(crate::ir::shape::FloatPrecision::Single))
        );

        let vectors = InstructionKind::Dot(
            lit(0, tensor(&[5], DataType::Int(32))),
            lit(0, tensor(&[5], DataType::Int(32))),
        );
        assert_eq!(vectors.infer_type(&module, &function), i32_scalar());

        let invalid = InstructionKind::Dot(
            lit(0, tensor(&[5], DataType::Int(32))),
            lit(0, tensor(&[4], DataType::Int(32))),
        );
        assert_eq!(invalid.infer_type(&module, &function), Type::Invalid);
    }

    #[test]
    fn test_concatenate() {
        let (module, function) = context();
        let kind = InstructionKind::Concatenate(
            vec![
                lit(0, tensor(&[2, 3], DataType::Int(32))),
                lit(0, tensor(&[4, 3], DataType::Int(32))),
            ],
            0,
        );
        assert_eq!(
            kind.infer_type(&module, &function),
            tensor(&[6, 3], DataType::Int(32))
        );

        let bad_axis = InstructionKind::Concatenate(
            vec![lit(0, tensor(&[2, 3], DataType::Int(32)))],
            2,
        );
        assert_eq!(bad_axis.infer_type(&module, &function), Type::Invalid);
    }

    #[test]
    fn test_convolve_shape() {
        let (module, function) = context();
        let kind = InstructionKind::Convolve {
            operand: lit(0, tensor(&[1, 4, 8, 8], DataType::Int(32))),
            kernel: lit(0, tensor(&[8, 2, 3, 3], DataType::Int(32))),
            strides: Some(vec![1, 1]),
            padding: Some(vec![(1, 1), (1, 1)]),
            left_dilation: Some(vec![1, 1]),
            right_dilation: Some(vec![1, 1]),
            groups: Some(2),
        };
        assert_eq!(
            kind.infer_type(&module, &function),
            tensor(&[1, 8, 8, 8], DataType::Int(32))
        );

        let bad_groups = InstructionKind::Convolve {
            operand: lit(0, tensor(&[1, 4, 8, 8], DataType::Int(32))),
            kernel: lit(0, tensor(&[8, 2, 3, 3], DataType::Int(32))),
            strides: Some(vec![1, 1]),
            padding: Some(vec![(1, 1), (1, 1)]),
            left_dilation: Some(vec![1, 1]),
            right_dilation: Some(vec![1, 1]),
            groups: Some(3),
        };
        assert_eq!(bad_groups.infer_type(&module, &function), Type::Invalid);

        let defaulted = InstructionKind::Convolve {
            operand: lit(0, tensor(&[1, 2, 5], DataType::Int(32))),
            kernel: lit(0, tensor(&[3, 2, 2], DataType::Int(32))),
            strides: None,
            padding: None,
            left_dilation: None,
            right_dilation: None,
            groups: None,
        };
        assert_eq!(
            defaulted.infer_type(&module, &function),
            tensor(&[1, 3, 4], DataType::Int(32))
        );
    }

    #[test]
    fn test_reduce_drops_dimensions() {
        let (module, function) = context();
        let kind = InstructionKind::Reduce {
            combinator: ReductionCombinator::Numeric(NumericBinaryOp::Add),
            operand: lit(0, tensor(&[2, 3, 4], DataType::Int(32))),
            initial: lit(0, i32_scalar()),
            dimensions: vec![0, 2],
        };
        assert_eq!(
            kind.infer_type(&module, &function),
            tensor(&[3], DataType::Int(32))
        );

        let duplicate_dims = InstructionKind::Reduce {
            combinator: ReductionCombinator::Numeric(NumericBinaryOp::Add),
            operand: lit(0, tensor(&[2, 3], DataType::Int(32))),
            initial: lit(0, i32_scalar()),
            dimensions: vec![0, 0],
        };
        assert_eq!(duplicate_dims.infer_type(&module, &function), Type::Invalid);
    }

    #[test]
    fn test_reduce_window() {
        let (module, function) = context();
        let kind = InstructionKind::ReduceWindow {
            combinator: ReductionCombinator::Numeric(NumericBinaryOp::Max),
            operand: lit(0, tensor(&[8, 8], DataType::Int(32))),
            initial: lit(0, i32_scalar()),
            dimensions: TensorShape::new(vec![2, 2]),
            strides: vec![2, 2],
            padding: Padding::None,
        };
        assert_eq!(
            kind.infer_type(&module, &function),
            tensor(&[4, 4], DataType::Int(32))
        );
    }

    #[test]
    fn test_memory_kinds() {
        let (module, function) = context();
        let p = lit(0, Type::Pointer(Box::new(i32_scalar())));
        assert_eq!(
            InstructionKind::Load(p.clone()).infer_type(&module, &function),
            i32_scalar()
        );
        assert_eq!(
            InstructionKind::Store {
                value: lit(1, i32_scalar()),
                destination: p.clone(),
            }
            .infer_type(&module, &function),
            Type::Void
        );
        assert_eq!(
            InstructionKind::Store {
                value: lit(1, Type::Bool),
                destination: p,
            }
            .infer_type(&module, &function),
            Type::Invalid
        );
        assert_eq!(
            InstructionKind::AllocateStack(i32_scalar(), 0).infer_type(&module, &function),
            Type::Invalid
        );
        assert_eq!(
            InstructionKind::AllocateBox(i32_scalar()).infer_type(&module, &function),
            Type::Box(Box::new(i32_scalar()))
        );
    }

    #[test]
    fn test_substitution_is_local() {
        let (_, function) = context();
        let old = Use::Definition(Definition::Argument(ArgId {
            block: BlockId(0),
            index: 0,
        }));
        let new = lit(7, i32_scalar());
        let kind = InstructionKind::NumericBinary(
            NumericBinaryOp::Add,
            old.clone(),
            lit(1, i32_scalar()),
        );
        let substituted = kind.substituting(&new, &old);
        match substituted {
            InstructionKind::NumericBinary(NumericBinaryOp::Add, a, b) => {
                assert_eq!(a, new);
                assert_eq!(b, lit(1, i32_scalar()));
            }
            _ => panic!("substitution changed the kind"),
        }
        let _ = function;
    }

    #[test]
    fn test_substitution_reaches_nested_literals() {
        let old = lit(1, i32_scalar());
        let new = lit(9, i32_scalar());
        let kind = InstructionKind::Literal(
            Literal::Tuple(vec![old.clone(), lit(2, i32_scalar())]),
            Type::Tuple(vec![i32_scalar(), i32_scalar()]),
        );
        let substituted = kind.substituting(&new, &old);
        match substituted {
            InstructionKind::Literal(Literal::Tuple(elements), _) => {
                assert_eq!(elements[0], new);
                assert_eq!(elements[1], lit(2, i32_scalar()));
            }
            _ => panic!("expected a tuple literal"),
        }
    }

    #[test]
    fn test_operands_include_nested_uses() {
        let nested = lit(1, i32_scalar());
        let kind = InstructionKind::Literal(
            Literal::Array(vec![nested.clone()]),
            Type::Array(1, Box::new(i32_scalar())),
        );
        assert_eq!(kind.operands(), vec![nested]);

        let key_use = lit(0, Type::scalar(DataType::Int(64)));
        let source = lit(0, tensor(&[4], DataType::Int(32)));
        let kind = InstructionKind::Extract {
            source: source.clone(),
            keys: vec![ElementKey::Value(key_use.clone())],
        };
        assert_eq!(kind.operands(), vec![source, key_use]);
    }

    #[test]
    fn test_branch_substitution() {
        let kind = InstructionKind::Conditional {
            condition: lit(1, Type::Bool),
            then_block: BlockId(1),
            then_arguments: vec![],
            else_block: BlockId(2),
            else_arguments: vec![],
        };
        let retargeted = kind.substituting_branches(BlockId(2), BlockId(3));
        assert_eq!(retargeted.branch_targets(), vec![BlockId(1), BlockId(3)]);
        assert!(retargeted.is_terminator());
    }
}
