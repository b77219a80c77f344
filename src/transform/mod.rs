//! Transformation passes.
//!
//! Transforms mutate IR and report whether anything changed; they do
//! not fail. Mutating a container bumps its version, which invalidates
//! every cached analysis of that container (and, through the module's
//! aggregate version, of the module), so a transform re-requests the
//! analyses it needs after each mutation. Passes can be composed into
//! a [`TransformPipeline`] and looked up by name for the driver.

mod broadcast;
mod dce;
mod hoist;

pub use broadcast::LiteralBroadcastingPromotion;
pub use dce::DeadCodeElimination;
pub use hoist::hoist_predecessors;

use crate::ir::module::Module;
use crate::ir::FuncId;

/// A transformation over one function.
pub trait Transform {
    /// Unique name for this transform, also its driver spelling.
    fn name(&self) -> &'static str;

    /// Description of what this transform does.
    fn description(&self) -> &'static str;

    /// Applies the transform. Returns true if any changes were made.
    fn apply(&self, module: &mut Module, function: FuncId) -> bool;
}

/// Statistics about a pipeline run.
#[derive(Debug, Default)]
pub struct TransformStats {
    /// Number of transform applications performed.
    pub transforms_run: usize,
    /// Number of applications that made changes.
    pub transforms_changed: usize,
}

/// An ordered list of transforms applied function by function.
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        TransformPipeline {
            transforms: Vec::new(),
        }
    }

    pub fn add_transform<T: Transform + 'static>(mut self, transform: T) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    pub fn transform_names(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Resolves a driver pass name.
    pub fn by_name(name: &str) -> Option<Box<dyn Transform>> {
        match name {
            "dce" => Some(Box::new(DeadCodeElimination)),
            "broadcast-promotion" => Some(Box::new(LiteralBroadcastingPromotion)),
            _ => None,
        }
    }

    pub fn apply_to_function(&self, module: &mut Module, function: FuncId) -> TransformStats {
        let mut stats = TransformStats::default();
        for transform in &self.transforms {
            stats.transforms_run += 1;
            let changed = transform.apply(module, function);
            if changed {
                stats.transforms_changed += 1;
            }
            log::debug!(
                "transform {} on function {}: changed = {}",
                transform.name(),
                function.0,
                changed
            );
        }
        stats
    }

    pub fn apply_to_module(&self, module: &mut Module) -> TransformStats {
        let mut stats = TransformStats::default();
        let functions: Vec<FuncId> = module.functions().map(|(id, _)| id).collect();
        for function in functions {
            if module.function(function).is_declaration() {
                continue;
            }
            let function_stats = self.apply_to_function(module, function);
            stats.transforms_run += function_stats.transforms_run;
            stats.transforms_changed += function_stats.transforms_changed;
        }
        stats
    }
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::Builder;
    use crate::ir::instruction::InstructionKind;
    use crate::ir::intrinsics::IntrinsicRegistry;
    use crate::ir::module::Stage;
    use crate::ir::types::Type;
    use std::rc::Rc;

    #[test]
    fn test_pipeline_names_and_lookup() {
        let pipeline = TransformPipeline::new()
            .add_transform(DeadCodeElimination)
            .add_transform(LiteralBroadcastingPromotion);
        assert_eq!(
            pipeline.transform_names(),
            vec!["dce", "broadcast-promotion"]
        );
        assert_eq!(pipeline.len(), 2);
        assert!(TransformPipeline::by_name("dce").is_some());
        assert!(TransformPipeline::by_name("unknown").is_none());
    }

    #[test]
    fn test_pipeline_skips_declarations() {
        let mut b = Builder::new("m", Stage::Raw, Rc::new(IntrinsicRegistry::default()));
        b.declaration(
            "ext",
            vec![],
            Type::Void,
            crate::ir::function::DeclarationKind::External,
        );
        let f = b.function("f", vec![], Type::Void);
        let entry = b.block(f, "entry", vec![]);
        b.append(f, entry, None, InstructionKind::Return(None));
        let mut module = b.finish();

        let pipeline = TransformPipeline::new().add_transform(DeadCodeElimination);
        let stats = pipeline.apply_to_module(&mut module);
        assert_eq!(stats.transforms_run, 1);
    }
}
