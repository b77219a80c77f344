//! # Type System
//!
//! Types classify every value in the IR. Scalars are rank-0 tensors;
//! the surface syntax writes them as their bare data type (`i32`,
//! `f64`). A rank-0 boolean tensor canonicalises to [`Type::Bool`], so
//! the boolean scalar has exactly one representation.
//!
//! Nominal types (structs, enums, aliases) are referenced by shared
//! identity: a `Type` holds a handle into the owning module's tables,
//! never a structural copy. Canonicalisation, validity, and element
//! lookup therefore take the module as context.

use rustc_hash::FxHashSet;

use super::module::Module;
use super::shape::{DataType, TensorShape};
use super::{AliasId, EnumId, StructId, Use};

/// A step in an element path: a constant index, a struct field name,
/// or a dynamic index value.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKey {
    /// Applies to tuples and arrays (component selection) and to
    /// tensors (drops the leading dimension).
    Index(usize),
    /// Applies to structs.
    Name(String),
    /// A dynamic index with an integer data type; applies to tensors
    /// and arrays.
    Value(Use),
}

/// The type of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// The result type of an ill-formed instruction.
    Invalid,
    Void,
    /// The scalar boolean; also the canonical form of a rank-0
    /// boolean tensor.
    Bool,
    Tensor(TensorShape, DataType),
    Tuple(Vec<Type>),
    Array(usize, Box<Type>),
    Pointer(Box<Type>),
    Box(Box<Type>),
    Function(Vec<Type>, Box<Type>),
    Struct(StructId),
    Enum(EnumId),
    Alias(AliasId),
    /// An opaque runtime stack supporting push/pop.
    Stack,
}

impl Type {
    /// Builds a tensor type, canonicalising the rank-0 boolean tensor
    /// to [`Type::Bool`].
    pub fn tensor(shape: TensorShape, dtype: DataType) -> Type {
        if shape.is_scalar() && dtype.is_bool() {
            Type::Bool
        } else {
            Type::Tensor(shape, dtype)
        }
    }

    pub fn scalar(dtype: DataType) -> Type {
        Type::tensor(TensorShape::scalar(), dtype)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Type::Invalid)
    }

    /// The shape and data type, when this is a tensor (including the
    /// canonical boolean scalar).
    pub fn tensor_type(&self) -> Option<(TensorShape, DataType)> {
        match self {
            Type::Tensor(shape, dtype) => Some((shape.clone(), *dtype)),
            Type::Bool => Some((TensorShape::scalar(), DataType::Bool)),
            _ => None,
        }
    }

    /// A rank-0 tensor.
    pub fn is_scalar(&self) -> bool {
        match self.tensor_type() {
            Some((shape, _)) => shape.is_scalar(),
            None => false,
        }
    }

    /// Recursively replaces aliases by their underlying types. Opaque
    /// aliases remain unchanged; alias cycles resolve to
    /// [`Type::Invalid`].
    pub fn unaliased(&self, module: &Module) -> Type {
        self.unalias_guarded(module, &mut FxHashSet::default())
    }

    fn unalias_guarded(&self, module: &Module, visiting: &mut FxHashSet<AliasId>) -> Type {
        match self {
            Type::Alias(id) => {
                if !visiting.insert(*id) {
                    return Type::Invalid;
                }
                let resolved = match module.alias(*id).underlying.as_ref() {
                    Some(underlying) => underlying.unalias_guarded(module, visiting),
                    None => self.clone(),
                };
                visiting.remove(id);
                resolved
            }
            Type::Tuple(elements) => Type::Tuple(
                elements
                    .iter()
                    .map(|t| t.unalias_guarded(module, visiting))
                    .collect(),
            ),
            Type::Array(count, element) => Type::Array(
                *count,
                Box::new(element.unalias_guarded(module, visiting)),
            ),
            Type::Pointer(element) => {
                Type::Pointer(Box::new(element.unalias_guarded(module, visiting)))
            }
            Type::Box(element) => Type::Box(Box::new(element.unalias_guarded(module, visiting))),
            Type::Function(arguments, result) => Type::Function(
                arguments
                    .iter()
                    .map(|t| t.unalias_guarded(module, visiting))
                    .collect(),
                Box::new(result.unalias_guarded(module, visiting)),
            ),
            other => other.clone(),
        }
    }

    /// A type is valid when all component types are valid and every
    /// alias handle resolves without cycling. Opaque aliases are valid
    /// here; whether opacity is permitted depends on the position and
    /// is checked by the verifier.
    pub fn is_valid(&self, module: &Module) -> bool {
        self.valid_guarded(module, &mut FxHashSet::default())
    }

    fn valid_guarded(&self, module: &Module, visiting: &mut FxHashSet<AliasId>) -> bool {
        match self {
            Type::Invalid => false,
            Type::Alias(id) => {
                if !visiting.insert(*id) {
                    return false;
                }
                let valid = match module.alias(*id).underlying.as_ref() {
                    Some(underlying) => underlying.valid_guarded(module, visiting),
                    None => true,
                };
                visiting.remove(id);
                valid
            }
            Type::Tuple(elements) => elements.iter().all(|t| t.valid_guarded(module, visiting)),
            Type::Array(_, element) | Type::Pointer(element) | Type::Box(element) => {
                element.valid_guarded(module, visiting)
            }
            Type::Function(arguments, result) => {
                arguments.iter().all(|t| t.valid_guarded(module, visiting))
                    && result.valid_guarded(module, visiting)
            }
            _ => true,
        }
    }

    /// Whether the type mentions an opaque alias anywhere. Opaque
    /// aliases may only appear in function declarations.
    pub fn contains_opaque(&self, module: &Module) -> bool {
        match self {
            Type::Alias(id) => match module.alias(*id).underlying.as_ref() {
                Some(underlying) => underlying.contains_opaque(module),
                None => true,
            },
            Type::Tuple(elements) => elements.iter().any(|t| t.contains_opaque(module)),
            Type::Array(_, element) | Type::Pointer(element) | Type::Box(element) => {
                element.contains_opaque(module)
            }
            Type::Function(arguments, result) => {
                arguments.iter().any(|t| t.contains_opaque(module))
                    || result.contains_opaque(module)
            }
            _ => false,
        }
    }

    /// Conformance is equality after canonicalisation. Kept as a
    /// named operation so the relation can widen later without
    /// touching call sites.
    pub fn conforms_to(&self, other: &Type, module: &Module) -> bool {
        self.unaliased(module) == other.unaliased(module)
    }

    /// Looks up the element type at a key path. `None` when the path
    /// is ill-formed for this type.
    pub fn element_type<'k>(
        &self,
        keys: impl IntoIterator<Item = &'k ElementKey>,
        module: &Module,
    ) -> Option<Type> {
        let mut current = self.unaliased(module);
        for key in keys {
            current = current.stepped(key, module)?;
        }
        Some(current)
    }

    fn stepped(&self, key: &ElementKey, module: &Module) -> Option<Type> {
        match (self, key) {
            (Type::Tuple(elements), ElementKey::Index(i)) => {
                elements.get(*i).map(|t| t.unaliased(module))
            }
            (Type::Array(count, element), ElementKey::Index(i)) if i < count => {
                Some(element.unaliased(module))
            }
            (Type::Array(_, element), ElementKey::Value(_)) => Some(element.unaliased(module)),
            (Type::Tensor(shape, dtype), ElementKey::Index(i))
                if shape.rank() > 0 && *i < shape[0] =>
            {
                Some(Type::tensor(shape.dropping_dimension(0), *dtype))
            }
            (Type::Tensor(shape, dtype), ElementKey::Value(_)) if shape.rank() > 0 => {
                Some(Type::tensor(shape.dropping_dimension(0), *dtype))
            }
            (Type::Struct(id), ElementKey::Name(name)) => module
                .struct_type(*id)
                .field(name)
                .map(|t| t.unaliased(module)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::intrinsics::IntrinsicRegistry;
    use crate::ir::module::{Stage, StructType, TypeAlias};
    use std::rc::Rc;

    fn test_module() -> Module {
        Module::new("types", Stage::Raw, Rc::new(IntrinsicRegistry::default()))
    }

    fn i32_scalar() -> Type {
        Type::scalar(DataType::Int(32))
    }

    #[test]
    fn test_bool_canonicalisation() {
        assert_eq!(
            Type::tensor(TensorShape::scalar(), DataType::Bool),
            Type::Bool
        );
        assert_eq!(
            Type::Bool.tensor_type(),
            Some((TensorShape::scalar(), DataType::Bool))
        );
        assert!(Type::Bool.is_scalar());
        assert!(i32_scalar().is_scalar());
        assert!(!Type::tensor(TensorShape::new(vec![2]), DataType::Bool).is_scalar());
    }

    #[test]
    fn test_unaliased_resolves_chains() {
        let mut module = test_module();
        let inner = module.add_alias(TypeAlias::new("Inner", Some(i32_scalar())));
        let outer = module.add_alias(TypeAlias::new(
            "Outer",
            Some(Type::Alias(inner)),
        ));
        assert_eq!(Type::Alias(outer).unaliased(&module), i32_scalar());
        assert!(Type::Alias(outer).is_valid(&module));
    }

    #[test]
    fn test_opaque_alias_stays() {
        let mut module = test_module();
        let opaque = module.add_alias(TypeAlias::new("Opaque", None));
        assert_eq!(
            Type::Alias(opaque).unaliased(&module),
            Type::Alias(opaque)
        );
        assert!(Type::Alias(opaque).is_valid(&module));
        assert!(Type::Alias(opaque).contains_opaque(&module));
    }

    #[test]
    fn test_alias_cycle_is_invalid() {
        let mut module = test_module();
        let a = module.add_alias(TypeAlias::new("A", None));
        let b = module.add_alias(TypeAlias::new("B", Some(Type::Alias(a))));
        module.alias_mut(a).underlying = Some(Type::Alias(b));
        assert!(!Type::Alias(a).is_valid(&module));
        assert_eq!(Type::Alias(a).unaliased(&module), Type::Invalid);
    }

    #[test]
    fn test_element_type_paths() {
        let mut module = test_module();
        let point = module.add_struct(StructType::new(
            "Point",
            vec![
                ("x".to_string(), i32_scalar()),
                ("y".to_string(), i32_scalar()),
            ],
        ));

        let tuple = Type::Tuple(vec![Type::Struct(point), Type::Bool]);
        assert_eq!(
            tuple.element_type(&[ElementKey::Index(0), ElementKey::Name("y".into())], &module),
            Some(i32_scalar())
        );
        assert_eq!(
            tuple.element_type(&[ElementKey::Index(1)], &module),
            Some(Type::Bool)
        );
        assert_eq!(tuple.element_type(&[ElementKey::Index(2)], &module), None);
        assert_eq!(
            tuple.element_type(&[ElementKey::Name("x".into())], &module),
            None
        );

        let matrix = Type::tensor(TensorShape::new(vec![4, 3]), DataType::Int(32));
        assert_eq!(
            matrix.element_type(&[ElementKey::Index(2)], &module),
            Some(Type::tensor(TensorShape::new(vec![3]), DataType::Int(32)))
        );
        assert_eq!(matrix.element_type(&[ElementKey::Index(4)], &module), None);

        let array = Type::Array(5, Box::new(i32_scalar()));
        assert_eq!(
            array.element_type(&[ElementKey::Index(4)], &module),
            Some(i32_scalar())
        );
        assert_eq!(array.element_type(&[ElementKey::Index(5)], &module), None);
    }

    #[test]
    fn test_conformance_unaliases() {
        let mut module = test_module();
        let alias = module.add_alias(TypeAlias::new("Int", Some(i32_scalar())));
        assert!(Type::Alias(alias).conforms_to(&i32_scalar(), &module));
        assert!(!Type::Alias(alias).conforms_to(&Type::Bool, &module));
    }
}
