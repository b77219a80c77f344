//! # Tela
//!
//! A tensor-oriented, SSA-form compiler intermediate representation:
//! an in-memory IR with basic-block arguments instead of phi nodes, a
//! textual surface syntax with a hand-written lexer and LL parser, a
//! semantic verifier, and a pass framework with version-invalidated
//! analysis caching.
//!
//! ```rust
//! use std::rc::Rc;
//! use tela::ir::intrinsics::IntrinsicRegistry;
//! use tela::parser::parse_module;
//! use tela::verify::verify_module;
//!
//! let source = "module \"demo\"\nstage raw\n\
//!     func @id: (i32) -> i32 { 'entry(%x: i32): return %x: i32 }";
//! let module = parse_module(source, Rc::new(IntrinsicRegistry::default())).unwrap();
//! verify_module(&module).unwrap();
//! assert_eq!(module.function_count(), 1);
//! ```

pub mod analysis;
pub mod error;
pub mod ir;
pub mod parser;
pub mod transform;
pub mod verify;

// Re-export the core IR surface for easier access.
pub use error::{Result, TelaError};
pub use ir::builder::Builder;
pub use ir::function::{Argument, BasicBlock, DeclarationKind, Function};
pub use ir::instruction::{Instruction, InstructionKind};
pub use ir::intrinsics::{IntrinsicOp, IntrinsicRegistry};
pub use ir::module::{EnumType, Module, Stage, StructType, TypeAlias, Variable};
pub use ir::print::print_module;
pub use ir::shape::{DataType, TensorShape};
pub use ir::types::Type;
pub use ir::{Definition, Literal, Use};
pub use parser::parse_module;
pub use transform::{Transform, TransformPipeline};
pub use verify::verify_module;
