//! Intrinsic registry.
//!
//! Intrinsics are externally registered builtin operations, keyed by
//! an opcode string. The registry is an explicit collaborator injected
//! at module construction; there is no process-wide table. The
//! verifier requires every `builtin` opcode to round-trip through the
//! module's registry.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::shape::DataType;
use super::types::Type;

/// One intrinsic operation.
pub trait IntrinsicOp {
    /// The registry key, and the spelling in the textual syntax.
    fn opcode(&self) -> &'static str;

    /// The result type for the given argument types, or
    /// [`Type::Invalid`] when the arguments do not fit.
    fn result_type(&self, argument_types: &[Type]) -> Type;

    fn has_side_effects(&self) -> bool {
        false
    }
}

/// A name-keyed table of intrinsics.
pub struct IntrinsicRegistry {
    table: FxHashMap<&'static str, Rc<dyn IntrinsicOp>>,
}

impl IntrinsicRegistry {
    pub fn empty() -> Self {
        IntrinsicRegistry {
            table: FxHashMap::default(),
        }
    }

    pub fn register(&mut self, intrinsic: Rc<dyn IntrinsicOp>) {
        self.table.insert(intrinsic.opcode(), intrinsic);
    }

    pub fn intrinsic(&self, name: &str) -> Option<Rc<dyn IntrinsicOp>> {
        self.table.get(name).cloned()
    }
}

impl std::fmt::Debug for IntrinsicRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.table.keys().collect();
        names.sort();
        f.debug_struct("IntrinsicRegistry")
            .field("intrinsics", &names)
            .finish()
    }
}

/// An elementwise numeric intrinsic: one numeric tensor in, the same
/// type out.
struct NumericElementwise {
    opcode: &'static str,
}

impl IntrinsicOp for NumericElementwise {
    fn opcode(&self) -> &'static str {
        self.opcode
    }

    fn result_type(&self, argument_types: &[Type]) -> Type {
        match argument_types {
            [only] => match only.tensor_type() {
                Some((_, dtype)) if dtype.is_numeric() => only.clone(),
                _ => Type::Invalid,
            },
            _ => Type::Invalid,
        }
    }
}

/// Scalar minimum/maximum over two operands of one numeric data type;
/// usable as a `reduce` combinator.
struct ScalarExtremum {
    opcode: &'static str,
}

impl IntrinsicOp for ScalarExtremum {
    fn opcode(&self) -> &'static str {
        self.opcode
    }

    fn result_type(&self, argument_types: &[Type]) -> Type {
        match argument_types {
            [a, b] if a == b => match a.tensor_type() {
                Some((shape, dtype)) if shape.is_scalar() && dtype.is_numeric() => a.clone(),
                _ => Type::Invalid,
            },
            _ => Type::Invalid,
        }
    }
}

impl Default for IntrinsicRegistry {
    /// The stock registry: elementwise activations plus scalar
    /// extrema.
    fn default() -> Self {
        let mut registry = IntrinsicRegistry::empty();
        registry.register(Rc::new(NumericElementwise { opcode: "softmax" }));
        registry.register(Rc::new(NumericElementwise { opcode: "sigmoid" }));
        registry.register(Rc::new(NumericElementwise { opcode: "relu" }));
        registry.register(Rc::new(ScalarExtremum {
            opcode: "scalarMin",
        }));
        registry.register(Rc::new(ScalarExtremum {
            opcode: "scalarMax",
        }));
        registry
    }
}
