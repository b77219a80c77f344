//! Parsing of the textual IR: a lexer producing located tokens and a
//! two-phase LL parser materialising a fully-typed module.

pub mod lexer;
pub mod parser;

pub use lexer::{lex, LexicalError};
pub use parser::{ParseError, Parser};

use std::rc::Rc;

use crate::error::Result;
use crate::ir::intrinsics::IntrinsicRegistry;
use crate::ir::module::{Module, Stage};

/// Parses IR text into a module with the given intrinsic registry.
pub fn parse_module(source: &str, intrinsics: Rc<IntrinsicRegistry>) -> Result<Module> {
    let tokens = lex(source)?;
    let module = Module::new("", Stage::Raw, intrinsics);
    let parsed = Parser::new(&tokens, module).parse()?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::function::{Attribute, DeclarationKind};
    use crate::ir::instruction::{InstructionKind, NumericBinaryOp};
    use crate::ir::module::GlobalRef;
    use crate::ir::shape::DataType;
    use crate::ir::types::Type;
    use crate::ir::{Definition, FuncId, Use};

    fn parse(source: &str) -> Module {
        parse_module(source, Rc::new(IntrinsicRegistry::default())).expect("parsing failed")
    }

    fn parse_err(source: &str) -> crate::error::TelaError {
        parse_module(source, Rc::new(IntrinsicRegistry::default()))
            .expect_err("parsing should fail")
    }

    fn i32_ty() -> Type {
        Type::scalar(DataType::Int(32))
    }

    #[test]
    fn test_parse_identity_function() {
        let module = parse(
            "module \"m\"\nstage raw\nfunc @f: (i32) -> i32 { 'entry(%x: i32): return %x: i32 }",
        );
        assert_eq!(module.name, "m");
        assert_eq!(module.stage, Stage::Raw);
        assert_eq!(module.function_count(), 1);
        let function = module.function(FuncId(0));
        assert_eq!(function.name.as_deref(), Some("f"));
        assert_eq!(function.argument_types, vec![i32_ty()]);
        assert_eq!(function.return_type, i32_ty());
        assert_eq!(function.block_count(), 1);
        let entry = function.entry().unwrap();
        assert_eq!(function.block(entry).arguments().len(), 1);
        let ret = function.block(entry).instructions()[0];
        assert!(matches!(
            function.instruction(ret).kind,
            InstructionKind::Return(Some(_))
        ));
    }

    #[test]
    fn test_parse_nominal_types() {
        let module = parse(
            "module \"m\"\nstage raw\n\
             type $Index = i64\n\
             type $Opaque\n\
             struct $Point { #x: f32, #y: f32 }\n\
             enum $Maybe { ?none, ?some(i32) }\n",
        );
        let (_, alias) = module.aliases().next().unwrap();
        assert_eq!(alias.name, "Index");
        assert_eq!(alias.underlying, Some(Type::scalar(DataType::Int(64))));
        let opaque = module.aliases().nth(1).unwrap().1;
        assert_eq!(opaque.underlying, None);
        let (_, point) = module.structs().next().unwrap();
        assert_eq!(point.fields.len(), 2);
        assert_eq!(point.fields[0].0, "x");
        let (_, maybe) = module.enums().next().unwrap();
        assert_eq!(maybe.cases.len(), 2);
        assert_eq!(maybe.case("some"), Some(&[i32_ty()][..]));
    }

    #[test]
    fn test_parse_variables_and_anonymous_globals() {
        let module = parse(
            "module \"m\"\nstage raw\n\
             var @counter: i64\n\
             func @f: () -> void { 'entry: return }\n",
        );
        assert_eq!(module.variable_count(), 1);
        assert!(matches!(
            module.global_by_index(0),
            Some(GlobalRef::Variable(_))
        ));
        assert!(matches!(
            module.global_by_index(1),
            Some(GlobalRef::Function(_))
        ));
    }

    #[test]
    fn test_parse_forward_function_reference() {
        let module = parse(
            "module \"m\"\nstage raw\n\
             func @caller: () -> i32 {\n\
             'entry:\n\
                 %r = apply @callee: () -> i32 ()\n\
                 return %r: i32\n\
             }\n\
             func @callee: () -> i32 {\n\
             'entry:\n\
                 %0.0 = literal 7: i32\n\
                 return %0.0: i32\n\
             }\n",
        );
        let caller = module.function(FuncId(0));
        let entry = caller.entry().unwrap();
        let call = caller.block(entry).instructions()[0];
        match &caller.instruction(call).kind {
            InstructionKind::Apply { callee, .. } => {
                assert_eq!(
                    callee,
                    &Use::Definition(Definition::Function(FuncId(1)))
                );
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_parse_forward_instruction_reference() {
        // A use may point forward within its own block; the verifier,
        // not the parser, rejects the undominated use.
        let module = parse(
            "module \"m\"\nstage raw\n\
             func @g: () -> i32 { 'entry: return %0.1: i32 ; %0.1 = literal 0: i32 }",
        );
        let function = module.function(FuncId(0));
        let entry = function.entry().unwrap();
        assert_eq!(function.block(entry).instruction_count(), 2);
        let ret = function.block(entry).instructions()[0];
        assert!(matches!(
            function.instruction(ret).kind,
            InstructionKind::Return(Some(_))
        ));
        let lit = function.block(entry).instructions()[1];
        assert_eq!(function.instruction(lit).ty, i32_ty());
    }

    #[test]
    fn test_parse_attributes_and_extern() {
        let module = parse(
            "module \"m\"\nstage raw\n\
             !inline\n\
             func @f: () -> void { 'entry: return }\n\
             [extern] func @g: (i32) -> i32\n",
        );
        assert_eq!(module.function(FuncId(0)).attributes, vec![Attribute::Inline]);
        let g = module.function(FuncId(1));
        assert!(g.is_declaration());
        assert_eq!(g.declaration_kind, Some(DeclarationKind::External));
    }

    #[test]
    fn test_parse_adjoint_declaration() {
        let module = parse(
            "module \"m\"\nstage raw\n\
             func @f: (f32) -> f32 { 'entry(%x: f32): return %x: f32 }\n\
             [adjoint @f from 0 wrt 0 seedable] func @df: (f32, f32) -> f32\n",
        );
        let df = module.function(FuncId(1));
        match &df.declaration_kind {
            Some(DeclarationKind::Adjoint(config)) => {
                assert_eq!(config.primal, FuncId(0));
                assert_eq!(config.argument_indices, vec![0]);
                assert!(config.seedable);
            }
            other => panic!("unexpected declaration kind {:?}", other),
        }
    }

    #[test]
    fn test_parse_tensor_instructions() {
        let module = parse(
            "module \"m\"\nstage raw\n\
             func @f: (tensor<2x2 x i32>) -> tensor<2x2 x i32> {\n\
             'entry(%x: tensor<2x2 x i32>):\n\
                 %sum = add %x: tensor<2x2 x i32>, 3: tensor<2x2 x i32>\n\
                 %t = transpose %sum: tensor<2x2 x i32>\n\
                 return %t: tensor<2x2 x i32>\n\
             }\n",
        );
        let function = module.function(FuncId(0));
        let entry = function.entry().unwrap();
        let sum = function.block(entry).instructions()[0];
        assert!(matches!(
            function.instruction(sum).kind,
            InstructionKind::NumericBinary(NumericBinaryOp::Add, ..)
        ));
    }

    #[test]
    fn test_parse_rejects_undefined_identifier() {
        let err = parse_err(
            "module \"m\"\nstage raw\nfunc @f: () -> i32 { 'entry: return %nope: i32 }",
        );
        assert!(matches!(
            err,
            crate::error::TelaError::Parse(ParseError::UndefinedIdentifier { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_type_mismatch_annotation() {
        let err = parse_err(
            "module \"m\"\nstage raw\nfunc @f: (i32) -> i32 { 'entry(%x: i32): return %x: f32 }",
        );
        assert!(matches!(
            err,
            crate::error::TelaError::Parse(ParseError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_variable_after_function() {
        let err = parse_err(
            "module \"m\"\nstage raw\n\
             func @f: () -> void { 'entry: return }\n\
             var @late: i32\n",
        );
        assert!(matches!(
            err,
            crate::error::TelaError::Parse(ParseError::VariableAfterFunction { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_type_after_values() {
        let err = parse_err(
            "module \"m\"\nstage raw\n\
             var @g: i32\n\
             type $T = i32\n",
        );
        assert!(matches!(
            err,
            crate::error::TelaError::Parse(ParseError::TypeDeclarationNotBeforeValues { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_non_function_type() {
        let err = parse_err("module \"m\"\nstage raw\nfunc @f: i32\n");
        assert!(matches!(
            err,
            crate::error::TelaError::Parse(ParseError::NotFunctionType { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_bad_anonymous_indices() {
        let err = parse_err(
            "module \"m\"\nstage raw\nfunc @2: () -> void { 'entry: return }\n",
        );
        assert!(matches!(
            err,
            crate::error::TelaError::Parse(ParseError::InvalidFunctionIndex { .. })
        ));

        let err = parse_err(
            "module \"m\"\nstage raw\nfunc @f: () -> void { '1: return }\n",
        );
        assert!(matches!(
            err,
            crate::error::TelaError::Parse(ParseError::InvalidBasicBlockIndex { .. })
        ));

        let err = parse_err(
            "module \"m\"\nstage raw\n\
             func @f: () -> i32 { 'entry: %0.1 = literal 0: i32 ; return %0.1: i32 }\n",
        );
        assert!(matches!(
            err,
            crate::error::TelaError::Parse(ParseError::InvalidInstructionIndex { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_unfilled_forward_reference() {
        let err = parse_err(
            "module \"m\"\nstage raw\n\
             func @f: () -> i32 { 'entry: return %0.5: i32 }\n",
        );
        assert!(matches!(
            err,
            crate::error::TelaError::Parse(ParseError::InvalidInstructionIndex { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_named_void_value() {
        let err = parse_err(
            "module \"m\"\nstage raw\nfunc @f: () -> void { 'entry: %r = return }\n",
        );
        assert!(matches!(
            err,
            crate::error::TelaError::Parse(ParseError::CannotNameVoidValue { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_declaration_with_body() {
        let err = parse_err(
            "module \"m\"\nstage raw\n[extern] func @f: () -> void { 'entry: return }\n",
        );
        assert!(matches!(
            err,
            crate::error::TelaError::Parse(ParseError::DeclarationCannotHaveBody { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_undefined_intrinsic() {
        let err = parse_err(
            "module \"m\"\nstage raw\n\
             func @f: (f32) -> f32 {\n\
             'entry(%x: f32):\n\
                 %r = builtin \"nonsense\" (%x: f32)\n\
                 return %r: f32\n\
             }\n",
        );
        assert!(matches!(
            err,
            crate::error::TelaError::Parse(ParseError::UndefinedIntrinsic { .. })
        ));
    }

    #[test]
    fn test_parse_builtin_intrinsic() {
        let module = parse(
            "module \"m\"\nstage raw\n\
             func @f: (f32) -> f32 {\n\
             'entry(%x: f32):\n\
                 %r = builtin \"relu\" (%x: f32)\n\
                 return %r: f32\n\
             }\n",
        );
        let function = module.function(FuncId(0));
        let entry = function.entry().unwrap();
        let call = function.block(entry).instructions()[0];
        assert!(matches!(
            &function.instruction(call).kind,
            InstructionKind::Builtin(key, _) if key == "relu"
        ));
    }

    #[test]
    fn test_parse_control_flow() {
        let module = parse(
            "module \"m\"\nstage raw\n\
             func @f: (bool) -> i32 {\n\
             'entry(%c: bool):\n\
                 conditional %c: bool then 'yes() else 'no()\n\
             'yes:\n\
                 branch 'join(1: i32)\n\
             'no:\n\
                 branch 'join(0: i32)\n\
             'join(%v: i32):\n\
                 return %v: i32\n\
             }\n",
        );
        let function = module.function(FuncId(0));
        assert_eq!(function.block_count(), 4);
        let join = function.block_named("join").unwrap();
        assert_eq!(function.block(join).arguments().len(), 1);
    }
}
