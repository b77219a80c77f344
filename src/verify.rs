//! Semantic verifier.
//!
//! Verification is all-or-nothing: the first violated invariant is
//! returned as a [`VerificationError`] carrying the offending node's
//! name or description. Checks run module → function → block →
//! instruction; instruction checks re-derive each result type and
//! compare it against the stored one, and every operand definition
//! must properly dominate its user.

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::analysis::dominance::DominatorTree;
use crate::analysis::DominanceAnalysis;
use crate::ir::function::{AdjointConfiguration, DeclarationKind, Function};
use crate::ir::instruction::{Instruction, InstructionKind};
use crate::ir::module::Module;
use crate::ir::print::print_type;
use crate::ir::types::Type;
use crate::ir::{BlockId, Definition, FuncId, InstId, Literal, ScalarLiteral, Use};

/// Violated invariants, each carrying the offending node.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerificationError {
    #[error("illegal identifier name {name:?}")]
    IllegalName { name: String },
    #[error("type ${name} is declared more than once")]
    RedeclaredType { name: String },
    #[error("global @{name} is declared more than once")]
    RedeclaredGlobal { name: String },
    #[error("type {name} is invalid in {context}")]
    InvalidType { name: String, context: String },
    #[error("opaque type used in the definition of @{function}")]
    OpaqueTypeInDefinition { function: String },
    #[error("declaration @{function} cannot have a body")]
    DeclarationCannotHaveBody { function: String },
    #[error("function @{function} has no entry block and no declaration kind")]
    MissingEntryBlock { function: String },
    #[error("adjoint configuration of @{function} is invalid")]
    AdjointConfigurationInvalid { function: String },
    #[error("adjoint @{function} does not match the type synthesised from its primal")]
    AdjointSignatureMismatch { function: String },
    #[error("entry block arguments of @{function} do not match its argument types")]
    EntryArgumentMismatch { function: String },
    #[error("block '{block} has no terminator")]
    MissingTerminator { block: String },
    #[error("terminator in the middle of block '{block}")]
    TerminatorNotAtEnd { block: String },
    #[error("argument %{name} is declared more than once in block '{block}")]
    RedeclaredArgument { name: String, block: String },
    #[error("instruction %{name} is declared more than once in block '{block}")]
    RedeclaredInstruction { name: String, block: String },
    #[error("instruction {instruction} is not attached to the block listing it")]
    InstructionParentMismatch { instruction: String },
    #[error("void instruction {instruction} must be unnamed")]
    NamedVoidValue { instruction: String },
    #[error("use of {used} in {user} does not dominate the user")]
    UseBeforeDef { used: String, user: String },
    #[error("dangling use of {used} in {user}")]
    DanglingUse { used: String, user: String },
    #[error("aggregate literal operand outside a literal instruction in {instruction}")]
    NestedAggregateLiteral { instruction: String },
    #[error("literal does not match its type in {instruction}")]
    LiteralTypeMismatch { instruction: String },
    #[error("enum case ?{case} is not defined by ${enum_name}")]
    EnumCaseNotFound { case: String, enum_name: String },
    #[error("unknown intrinsic \"{name}\"")]
    UnknownIntrinsic { name: String },
    #[error("branch arguments in {instruction} do not match the destination block")]
    BranchArgumentMismatch { instruction: String },
    #[error("return in @{function} does not match the return type")]
    ReturnTypeMismatch { function: String },
    #[error("ill-typed {opcode} instruction {instruction}")]
    InvalidInstruction { opcode: String, instruction: String },
    #[error("instruction {instruction} is typed {stored} but infers to {inferred}")]
    TypeMismatch {
        instruction: String,
        stored: String,
        inferred: String,
    },
}

type Result<T> = std::result::Result<T, VerificationError>;

/// Identifier names: `[A-Za-z_][A-Za-z0-9_.]*`.
fn legal_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn check_name(name: &str) -> Result<()> {
    if legal_name(name) {
        Ok(())
    } else {
        Err(VerificationError::IllegalName {
            name: name.to_string(),
        })
    }
}

fn function_label(module: &Module, func: FuncId) -> String {
    module
        .function(func)
        .name
        .clone()
        .unwrap_or_else(|| func.0.to_string())
}

fn block_label(function: &Function, block: BlockId) -> String {
    function
        .block(block)
        .name
        .clone()
        .unwrap_or_else(|| function.block_index(block).unwrap_or(block.0).to_string())
}

fn instruction_label(function: &Function, id: InstId) -> String {
    match &function.instruction(id).name {
        Some(name) => format!("%{}", name),
        None => match function.instruction_position(id) {
            Some((block, position)) => format!(
                "%{}.{}",
                function.block_index(block).unwrap_or(block.0),
                position
            ),
            None => format!("%<detached {}>", id.0),
        },
    }
}

fn definition_label(function: &Function, definition: &Definition) -> String {
    match definition {
        Definition::Argument(arg) => format!("%{}^{}", arg.block.0, arg.index),
        Definition::Instruction(id) => instruction_label(function, *id),
        Definition::Variable(id) => format!("@<variable {}>", id.0),
        Definition::Function(id) => format!("@<function {}>", id.0),
    }
}

/// Verifies a whole module; the first violated invariant aborts.
pub fn verify_module(module: &Module) -> Result<()> {
    let mut type_names = FxHashSet::default();
    for (_, alias) in module.aliases() {
        check_name(&alias.name)?;
        if !type_names.insert(alias.name.clone()) {
            return Err(VerificationError::RedeclaredType {
                name: alias.name.clone(),
            });
        }
        if let Some(underlying) = &alias.underlying {
            if !underlying.is_valid(module) {
                return Err(VerificationError::InvalidType {
                    name: print_type(module, underlying),
                    context: format!("type alias ${}", alias.name),
                });
            }
        }
    }
    for (_, s) in module.structs() {
        check_name(&s.name)?;
        if !type_names.insert(s.name.clone()) {
            return Err(VerificationError::RedeclaredType {
                name: s.name.clone(),
            });
        }
        let mut fields = FxHashSet::default();
        for (field, ty) in &s.fields {
            check_name(field)?;
            if !fields.insert(field.clone()) {
                return Err(VerificationError::RedeclaredType {
                    name: format!("{}.{}", s.name, field),
                });
            }
            if !ty.is_valid(module) {
                return Err(VerificationError::InvalidType {
                    name: print_type(module, ty),
                    context: format!("field #{} of ${}", field, s.name),
                });
            }
        }
    }
    for (_, e) in module.enums() {
        check_name(&e.name)?;
        if !type_names.insert(e.name.clone()) {
            return Err(VerificationError::RedeclaredType {
                name: e.name.clone(),
            });
        }
        let mut cases = FxHashSet::default();
        for (case, associated) in &e.cases {
            check_name(case)?;
            if !cases.insert(case.clone()) {
                return Err(VerificationError::RedeclaredType {
                    name: format!("{}.{}", e.name, case),
                });
            }
            for ty in associated {
                if !ty.is_valid(module) {
                    return Err(VerificationError::InvalidType {
                        name: print_type(module, ty),
                        context: format!("case ?{} of ${}", case, e.name),
                    });
                }
            }
        }
    }

    let mut global_names = FxHashSet::default();
    for (_, variable) in module.variables() {
        if let Some(name) = &variable.name {
            check_name(name)?;
            if !global_names.insert(name.clone()) {
                return Err(VerificationError::RedeclaredGlobal { name: name.clone() });
            }
        }
        if !variable.ty.is_valid(module) {
            return Err(VerificationError::InvalidType {
                name: print_type(module, &variable.ty),
                context: "global variable".to_string(),
            });
        }
    }
    for (_, function) in module.functions() {
        if let Some(name) = &function.name {
            check_name(name)?;
            if !global_names.insert(name.clone()) {
                return Err(VerificationError::RedeclaredGlobal { name: name.clone() });
            }
        }
    }

    for (id, _) in module.functions() {
        verify_function(module, id)?;
    }
    Ok(())
}

/// Verifies one function.
pub fn verify_function(module: &Module, func: FuncId) -> Result<()> {
    let function = module.function(func);
    let label = function_label(module, func);

    for ty in function
        .argument_types
        .iter()
        .chain(std::iter::once(&function.return_type))
    {
        if !ty.is_valid(module) {
            return Err(VerificationError::InvalidType {
                name: print_type(module, ty),
                context: format!("signature of @{}", label),
            });
        }
    }

    match &function.declaration_kind {
        Some(kind) => {
            if function.block_count() > 0 {
                return Err(VerificationError::DeclarationCannotHaveBody { function: label });
            }
            if let DeclarationKind::Adjoint(config) = kind {
                check_adjoint(module, function, config, &label)?;
            }
            Ok(())
        }
        None => {
            if function.block_count() == 0 {
                return Err(VerificationError::MissingEntryBlock { function: label });
            }
            if function
                .argument_types
                .iter()
                .chain(std::iter::once(&function.return_type))
                .any(|t| t.contains_opaque(module))
            {
                return Err(VerificationError::OpaqueTypeInDefinition { function: label });
            }
            let entry = function.entry().expect("definition has an entry block");
            let entry_types: Vec<&Type> = function
                .block(entry)
                .arguments()
                .iter()
                .map(|a| &a.ty)
                .collect();
            if entry_types.len() != function.argument_types.len()
                || entry_types
                    .iter()
                    .zip(&function.argument_types)
                    .any(|(a, b)| *a != b)
            {
                return Err(VerificationError::EntryArgumentMismatch { function: label });
            }

            let dominance = function.analysis::<DominanceAnalysis>(module);
            for block in function.blocks() {
                verify_block(module, func, block, dominance.as_ref())?;
            }
            Ok(())
        }
    }
}

/// Synthesises the expected adjoint type from the primal and the
/// differentiation configuration, then compares.
fn check_adjoint(
    module: &Module,
    function: &Function,
    config: &AdjointConfiguration,
    label: &str,
) -> Result<()> {
    if config.primal.0 >= module.function_count() {
        return Err(VerificationError::AdjointConfigurationInvalid {
            function: label.to_string(),
        });
    }
    let primal = module.function(config.primal);
    let invalid = || VerificationError::AdjointConfigurationInvalid {
        function: label.to_string(),
    };

    let result_element = |index: usize| -> Result<Type> {
        match &primal.return_type {
            Type::Tuple(elements) => elements.get(index).cloned().ok_or_else(invalid),
            other if index == 0 => Ok(other.clone()),
            _ => Err(invalid()),
        }
    };

    if config.argument_indices.is_empty()
        || config
            .argument_indices
            .iter()
            .any(|i| *i >= primal.argument_types.len())
    {
        return Err(invalid());
    }

    let mut expected_arguments = primal.argument_types.clone();
    if config.seedable {
        expected_arguments.push(result_element(config.source_index)?);
    }
    for kept in &config.kept_indices {
        expected_arguments.push(result_element(*kept)?);
    }
    let expected_result = if config.argument_indices.len() == 1 {
        primal.argument_types[config.argument_indices[0]].clone()
    } else {
        Type::Tuple(
            config
                .argument_indices
                .iter()
                .map(|i| primal.argument_types[*i].clone())
                .collect(),
        )
    };
    let expected = Type::Function(expected_arguments, Box::new(expected_result));
    if function.ty() != expected {
        return Err(VerificationError::AdjointSignatureMismatch {
            function: label.to_string(),
        });
    }
    Ok(())
}

fn verify_block(
    module: &Module,
    func: FuncId,
    block: BlockId,
    dominance: &DominatorTree,
) -> Result<()> {
    let function = module.function(func);
    let b = function.block(block);
    let label = block_label(function, block);

    if let Some(name) = &b.name {
        check_name(name)?;
    }
    let mut names = FxHashSet::default();
    for argument in b.arguments() {
        if let Some(name) = &argument.name {
            check_name(name)?;
            if !names.insert(name.clone()) {
                return Err(VerificationError::RedeclaredArgument {
                    name: name.clone(),
                    block: label.clone(),
                });
            }
        }
        if !argument.ty.is_valid(module) {
            return Err(VerificationError::InvalidType {
                name: print_type(module, &argument.ty),
                context: format!("argument of '{}", label),
            });
        }
    }

    let instructions = b.instructions();
    match instructions.last() {
        Some(last) if function.instruction(*last).kind.is_terminator() => {}
        _ => {
            return Err(VerificationError::MissingTerminator { block: label });
        }
    }
    for id in &instructions[..instructions.len() - 1] {
        if function.instruction(*id).kind.is_terminator() {
            return Err(VerificationError::TerminatorNotAtEnd { block: label });
        }
    }

    for id in instructions {
        let instruction = function.instruction(*id);
        if instruction.parent() != Some(block) {
            return Err(VerificationError::InstructionParentMismatch {
                instruction: instruction_label(function, *id),
            });
        }
        if let Some(name) = &instruction.name {
            check_name(name)?;
            if !names.insert(name.clone()) {
                return Err(VerificationError::RedeclaredInstruction {
                    name: name.clone(),
                    block: label.clone(),
                });
            }
        }
        verify_instruction(module, func, *id, dominance)?;
    }
    Ok(())
}

fn verify_instruction(
    module: &Module,
    func: FuncId,
    id: InstId,
    dominance: &DominatorTree,
) -> Result<()> {
    let function = module.function(func);
    let instruction = function.instruction(id);
    let label = instruction_label(function, id);

    if instruction.ty.is_void() && instruction.name.is_some() {
        return Err(VerificationError::NamedVoidValue { instruction: label });
    }

    let is_literal_kind = matches!(instruction.kind, InstructionKind::Literal(..));
    for operand in instruction.kind.operands() {
        match &operand {
            Use::Literal(ty, literal) => {
                if literal.is_aggregate() && !is_literal_kind {
                    return Err(VerificationError::NestedAggregateLiteral {
                        instruction: label.clone(),
                    });
                }
                if !ty.is_valid(module) {
                    return Err(VerificationError::InvalidType {
                        name: print_type(module, ty),
                        context: format!("operand of {}", label),
                    });
                }
            }
            Use::Definition(definition) => {
                check_definition(module, function, definition, &label)?;
                if !dominance.properly_dominates(definition, id) {
                    return Err(VerificationError::UseBeforeDef {
                        used: definition_label(function, definition),
                        user: label.clone(),
                    });
                }
            }
        }
    }

    check_kind(module, func, function, instruction, &label)?;

    let inferred = instruction.kind.infer_type(module, function);
    if inferred.is_invalid() {
        return Err(VerificationError::InvalidInstruction {
            opcode: instruction.kind.opcode().to_string(),
            instruction: label,
        });
    }
    if inferred != instruction.ty {
        return Err(VerificationError::TypeMismatch {
            instruction: label,
            stored: print_type(module, &instruction.ty),
            inferred: print_type(module, &inferred),
        });
    }
    Ok(())
}

fn check_definition(
    module: &Module,
    function: &Function,
    definition: &Definition,
    user: &str,
) -> Result<()> {
    let dangling = || VerificationError::DanglingUse {
        used: definition_label(function, definition),
        user: user.to_string(),
    };
    match definition {
        Definition::Argument(arg) => {
            if function.block_index(arg.block).is_none()
                || arg.index >= function.block(arg.block).arguments().len()
            {
                return Err(dangling());
            }
        }
        Definition::Instruction(id) => {
            if id.0 >= function.instruction_count()
                || function.instruction(*id).parent().is_none()
            {
                return Err(dangling());
            }
        }
        Definition::Variable(id) => {
            if id.0 >= module.variable_count() {
                return Err(dangling());
            }
        }
        Definition::Function(id) => {
            if id.0 >= module.function_count() {
                return Err(dangling());
            }
        }
    }
    Ok(())
}

/// Kind-specific invariants that deserve a more precise error than
/// the generic ill-typed fallback.
fn check_kind(
    module: &Module,
    func: FuncId,
    function: &Function,
    instruction: &Instruction,
    label: &str,
) -> Result<()> {
    match &instruction.kind {
        InstructionKind::Literal(literal, ty) => {
            check_literal(module, function, literal, ty, label)
        }
        InstructionKind::Builtin(key, _) => {
            if module.intrinsics().intrinsic(key).is_none() {
                return Err(VerificationError::UnknownIntrinsic { name: key.clone() });
            }
            Ok(())
        }
        InstructionKind::Branch(block, arguments) => {
            check_branch_arguments(module, function, *block, arguments, label)
        }
        InstructionKind::Conditional {
            then_block,
            then_arguments,
            else_block,
            else_arguments,
            ..
        } => {
            check_branch_arguments(module, function, *then_block, then_arguments, label)?;
            check_branch_arguments(module, function, *else_block, else_arguments, label)
        }
        InstructionKind::BranchEnum(operand, cases) => {
            let ty = operand.ty(module, function).unaliased(module);
            if let Type::Enum(id) = ty {
                let enum_type = module.enum_type(id);
                for (case, _) in cases {
                    if enum_type.case(case).is_none() {
                        return Err(VerificationError::EnumCaseNotFound {
                            case: case.clone(),
                            enum_name: enum_type.name.clone(),
                        });
                    }
                }
            }
            Ok(())
        }
        InstructionKind::Return(value) => {
            let matches = match value {
                Some(v) => v
                    .ty(module, function)
                    .conforms_to(&function.return_type, module),
                None => function.return_type.is_void(),
            };
            if !matches {
                return Err(VerificationError::ReturnTypeMismatch {
                    function: function_label(module, func),
                });
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn check_branch_arguments(
    module: &Module,
    function: &Function,
    block: BlockId,
    arguments: &[Use],
    label: &str,
) -> Result<()> {
    if function.block_index(block).is_none() {
        return Err(VerificationError::BranchArgumentMismatch {
            instruction: label.to_string(),
        });
    }
    let parameters = function.block(block).arguments();
    if parameters.len() != arguments.len() {
        return Err(VerificationError::BranchArgumentMismatch {
            instruction: label.to_string(),
        });
    }
    for (parameter, argument) in parameters.iter().zip(arguments) {
        if !parameter
            .ty
            .conforms_to(&argument.ty(module, function), module)
        {
            return Err(VerificationError::BranchArgumentMismatch {
                instruction: label.to_string(),
            });
        }
    }
    Ok(())
}

fn check_literal(
    module: &Module,
    function: &Function,
    literal: &Literal,
    ty: &Type,
    label: &str,
) -> Result<()> {
    let mismatch = || VerificationError::LiteralTypeMismatch {
        instruction: label.to_string(),
    };
    let ty = ty.unaliased(module);
    match literal {
        Literal::Undefined => Ok(()),
        Literal::Zero => match ty.tensor_type() {
            Some((_, dtype)) if dtype.is_numeric() => Ok(()),
            _ => Err(mismatch()),
        },
        Literal::Null => match ty {
            Type::Pointer(_) | Type::Box(_) => Ok(()),
            _ => Err(mismatch()),
        },
        Literal::Bool(_) => match ty.tensor_type() {
            Some((_, dtype)) if dtype.is_bool() => Ok(()),
            _ => Err(mismatch()),
        },
        Literal::Scalar(scalar) => match ty.tensor_type() {
            Some((_, dtype)) => {
                let fits = match scalar {
                    ScalarLiteral::Int(_) => dtype.is_numeric(),
                    ScalarLiteral::Float(_) => matches!(
                        dtype,
                        crate::ir::shape::DataType::Float(_)
                    ),
                };
                if fits {
                    Ok(())
                } else {
                    Err(mismatch())
                }
            }
            None => Err(mismatch()),
        },
        Literal::Tensor(elements) => match ty.tensor_type() {
            Some((shape, dtype)) if shape.rank() > 0 && shape[0] == elements.len() => {
                let element_ty = Type::tensor(shape.dropping_dimension(0), dtype);
                for element in elements {
                    check_element(module, function, element, &element_ty, label)?;
                }
                Ok(())
            }
            _ => Err(mismatch()),
        },
        Literal::Tuple(elements) => match &ty {
            Type::Tuple(types) if types.len() == elements.len() => {
                for (element, expected) in elements.iter().zip(types) {
                    check_element(module, function, element, expected, label)?;
                }
                Ok(())
            }
            _ => Err(mismatch()),
        },
        Literal::Array(elements) => match &ty {
            Type::Array(count, element_ty) if *count == elements.len() => {
                for element in elements {
                    check_element(module, function, element, element_ty, label)?;
                }
                Ok(())
            }
            _ => Err(mismatch()),
        },
        Literal::Struct(fields) => match &ty {
            Type::Struct(id) => {
                let struct_type = module.struct_type(*id);
                if struct_type.fields.len() != fields.len() {
                    return Err(mismatch());
                }
                for ((name, element), (expected_name, expected_ty)) in
                    fields.iter().zip(&struct_type.fields)
                {
                    if name != expected_name {
                        return Err(mismatch());
                    }
                    check_element(module, function, element, expected_ty, label)?;
                }
                Ok(())
            }
            _ => Err(mismatch()),
        },
        Literal::Enum(case, operands) => match &ty {
            Type::Enum(id) => {
                let enum_type = module.enum_type(*id);
                let associated = enum_type.case(case).ok_or_else(|| {
                    VerificationError::EnumCaseNotFound {
                        case: case.clone(),
                        enum_name: enum_type.name.clone(),
                    }
                })?;
                if associated.len() != operands.len() {
                    return Err(mismatch());
                }
                let associated = associated.to_vec();
                for (operand, expected) in operands.iter().zip(&associated) {
                    check_element(module, function, operand, expected, label)?;
                }
                Ok(())
            }
            _ => Err(mismatch()),
        },
    }
}

fn check_element(
    module: &Module,
    function: &Function,
    element: &Use,
    expected: &Type,
    label: &str,
) -> Result<()> {
    if !element
        .ty(module, function)
        .conforms_to(expected, module)
    {
        return Err(VerificationError::LiteralTypeMismatch {
            instruction: label.to_string(),
        });
    }
    if let Use::Literal(ty, literal) = element {
        check_literal(module, function, literal, ty, label)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::Builder;
    use crate::ir::intrinsics::IntrinsicRegistry;
    use crate::ir::module::Stage;
    use crate::ir::shape::DataType;
    use std::rc::Rc;

    fn i32_scalar() -> Type {
        Type::scalar(DataType::Int(32))
    }

    fn builder() -> Builder {
        Builder::new("v", Stage::Raw, Rc::new(IntrinsicRegistry::default()))
    }

    #[test]
    fn test_missing_terminator() {
        let mut b = builder();
        let f = b.function("f", vec![], i32_scalar());
        let entry = b.block(f, "entry", vec![]);
        b.append(
            f,
            entry,
            Some("v"),
            InstructionKind::Literal(
                Literal::Scalar(ScalarLiteral::Int(1)),
                i32_scalar(),
            ),
        );
        let module = b.finish();
        assert!(matches!(
            verify_module(&module),
            Err(VerificationError::MissingTerminator { .. })
        ));
    }

    #[test]
    fn test_named_void_value() {
        let mut b = builder();
        let f = b.function("f", vec![], Type::Void);
        let entry = b.block(f, "entry", vec![]);
        b.append(f, entry, Some("oops"), InstructionKind::Return(None));
        let module = b.finish();
        assert!(matches!(
            verify_module(&module),
            Err(VerificationError::NamedVoidValue { .. })
        ));
    }

    #[test]
    fn test_entry_argument_mismatch() {
        let mut b = builder();
        let f = b.function("f", vec![i32_scalar()], Type::Void);
        let entry = b.block(f, "entry", vec![]);
        b.append(f, entry, None, InstructionKind::Return(None));
        let module = b.finish();
        assert!(matches!(
            verify_module(&module),
            Err(VerificationError::EntryArgumentMismatch { .. })
        ));
    }

    #[test]
    fn test_illegal_name() {
        let mut b = builder();
        let f = b.function("bad name", vec![], Type::Void);
        let entry = b.block(f, "entry", vec![]);
        b.append(f, entry, None, InstructionKind::Return(None));
        let module = b.finish();
        assert!(matches!(
            verify_module(&module),
            Err(VerificationError::IllegalName { .. })
        ));
    }

    #[test]
    fn test_dangling_use_after_removal() {
        let mut b = builder();
        let f = b.function("f", vec![], i32_scalar());
        let entry = b.block(f, "entry", vec![]);
        let dead = b.append(
            f,
            entry,
            Some("dead"),
            InstructionKind::Literal(
                Literal::Scalar(ScalarLiteral::Int(1)),
                i32_scalar(),
            ),
        );
        b.append(
            f,
            entry,
            None,
            InstructionKind::Return(Some(b.value(dead))),
        );
        let mut module = b.finish();
        module.function_mut(f).remove_instruction(dead);
        assert!(matches!(
            verify_module(&module),
            Err(VerificationError::DanglingUse { .. })
        ));
    }

    #[test]
    fn test_nested_aggregate_outside_literal() {
        let mut b = builder();
        let f = b.function("f", vec![], Type::Void);
        let entry = b.block(f, "entry", vec![]);
        let tuple_ty = Type::Tuple(vec![i32_scalar()]);
        let aggregate = Use::Literal(
            tuple_ty,
            Literal::Tuple(vec![Use::scalar_int(1, i32_scalar())]),
        );
        b.append(
            f,
            entry,
            Some("x"),
            InstructionKind::Extract {
                source: aggregate,
                keys: vec![crate::ir::types::ElementKey::Index(0)],
            },
        );
        b.append(f, entry, None, InstructionKind::Return(None));
        let module = b.finish();
        assert!(matches!(
            verify_module(&module),
            Err(VerificationError::NestedAggregateLiteral { .. })
        ));
    }

    #[test]
    fn test_verifies_well_formed_module() {
        let mut b = builder();
        let f = b.function("f", vec![i32_scalar()], i32_scalar());
        let entry = b.block(f, "entry", vec![(Some("x".to_string()), i32_scalar())]);
        let x = b.argument(f, entry, 0);
        b.append(f, entry, None, InstructionKind::Return(Some(x)));
        let module = b.finish();
        assert_eq!(verify_module(&module), Ok(()));
    }
}
