//! Textual printing of IR modules.
//!
//! The printer mirrors the parser grammar exactly, so printing a
//! verified module and re-parsing it yields a structurally equal
//! module. Instructions reference definitions by arena id, so
//! rendering a use needs the enclosing function: named definitions
//! print as `%name`, unnamed ones by anonymous index (`%B.I` for
//! instruction I of block B, `%B^I` for argument I).

use std::fmt;
use std::fmt::Write;

use super::function::{DeclarationKind, Function};
use super::instruction::{InstructionKind, Padding, ReductionCombinator};
use super::module::{GlobalRef, Module};
use super::types::{ElementKey, Type};
use super::{BlockId, Definition, FuncId, InstId, Literal, ScalarLiteral, Use};

/// Prints a module in the textual surface syntax.
pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    Printer { module }.write_module(&mut out);
    out
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print_module(self))
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

struct Printer<'m> {
    module: &'m Module,
}

impl<'m> Printer<'m> {
    fn write_module(&self, out: &mut String) {
        let module = self.module;
        let _ = writeln!(out, "module \"{}\"", escape(&module.name));
        let _ = writeln!(out, "stage {}", module.stage);

        for (_, alias) in module.aliases() {
            match &alias.underlying {
                Some(underlying) => {
                    let _ = writeln!(out, "type ${} = {}", alias.name, self.ty(underlying));
                }
                None => {
                    let _ = writeln!(out, "type ${}", alias.name);
                }
            }
        }
        for (_, s) in module.structs() {
            let fields: Vec<String> = s
                .fields
                .iter()
                .map(|(name, ty)| format!("#{}: {}", name, self.ty(ty)))
                .collect();
            let _ = writeln!(out, "struct ${} {{ {} }}", s.name, fields.join(", "));
        }
        for (_, e) in module.enums() {
            let cases: Vec<String> = e
                .cases
                .iter()
                .map(|(name, associated)| {
                    if associated.is_empty() {
                        format!("?{}", name)
                    } else {
                        let types: Vec<String> =
                            associated.iter().map(|t| self.ty(t)).collect();
                        format!("?{}({})", name, types.join(", "))
                    }
                })
                .collect();
            let _ = writeln!(out, "enum ${} {{ {} }}", e.name, cases.join(", "));
        }

        for (id, variable) in module.variables() {
            match &variable.name {
                Some(name) => {
                    let _ = writeln!(out, "var @{}: {}", name, self.ty(&variable.ty));
                }
                None => {
                    let index = module.global_index(GlobalRef::Variable(id));
                    let _ = writeln!(out, "var @{}: {}", index, self.ty(&variable.ty));
                }
            }
        }

        for (id, function) in module.functions() {
            let _ = writeln!(out);
            self.write_function(out, id, function);
        }
    }

    fn function_name(&self, id: FuncId) -> String {
        match &self.module.function(id).name {
            Some(name) => format!("@{}", name),
            None => format!("@{}", self.module.global_index(GlobalRef::Function(id))),
        }
    }

    fn write_function(&self, out: &mut String, id: FuncId, function: &Function) {
        for attribute in &function.attributes {
            let _ = writeln!(out, "!{}", attribute.as_str());
        }
        match &function.declaration_kind {
            Some(DeclarationKind::External) => {
                let _ = write!(out, "[extern] ");
            }
            Some(DeclarationKind::Adjoint(config)) => {
                let _ = write!(
                    out,
                    "[adjoint {} from {} wrt {}",
                    self.function_name(config.primal),
                    config.source_index,
                    config
                        .argument_indices
                        .iter()
                        .map(|i| i.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                if !config.kept_indices.is_empty() {
                    let _ = write!(
                        out,
                        " keeping {}",
                        config
                            .kept_indices
                            .iter()
                            .map(|i| i.to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                }
                if config.seedable {
                    let _ = write!(out, " seedable");
                }
                let _ = write!(out, "] ");
            }
            None => {}
        }
        let _ = write!(
            out,
            "func {}: {}",
            self.function_name(id),
            self.ty(&function.ty())
        );
        if function.block_count() == 0 {
            let _ = writeln!(out);
            return;
        }
        let _ = writeln!(out, " {{");
        for (index, block) in function.blocks().enumerate() {
            self.write_block(out, function, block, index);
        }
        let _ = writeln!(out, "}}");
    }

    fn write_block(&self, out: &mut String, function: &Function, id: BlockId, index: usize) {
        let block = function.block(id);
        match &block.name {
            Some(name) => {
                let _ = write!(out, "'{}", name);
            }
            None => {
                let _ = write!(out, "'{}", index);
            }
        }
        if !block.arguments().is_empty() {
            let arguments: Vec<String> = block
                .arguments()
                .iter()
                .enumerate()
                .map(|(i, argument)| {
                    let name = match &argument.name {
                        Some(name) => format!("%{}", name),
                        None => format!("%{}^{}", index, i),
                    };
                    format!("{}: {}", name, self.ty(&argument.ty))
                })
                .collect();
            let _ = write!(out, "({})", arguments.join(", "));
        }
        let _ = writeln!(out, ":");
        for (position, inst) in block.instructions().iter().enumerate() {
            self.write_instruction(out, function, *inst, index, position);
        }
    }

    fn block_ref(&self, function: &Function, id: BlockId) -> String {
        match &function.block(id).name {
            Some(name) => format!("'{}", name),
            None => format!("'{}", function.block_index(id).unwrap_or(id.0)),
        }
    }

    fn write_instruction(
        &self,
        out: &mut String,
        function: &Function,
        id: InstId,
        block_index: usize,
        position: usize,
    ) {
        let instruction = function.instruction(id);
        let _ = write!(out, "    ");
        if !instruction.ty.is_void() {
            match &instruction.name {
                Some(name) => {
                    let _ = write!(out, "%{} = ", name);
                }
                None => {
                    let _ = write!(out, "%{}.{} = ", block_index, position);
                }
            }
        }
        let _ = writeln!(out, "{}", self.kind(function, &instruction.kind));
    }

    fn ints(values: &[usize]) -> String {
        values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn kind(&self, function: &Function, kind: &InstructionKind) -> String {
        use InstructionKind::*;
        match kind {
            Literal(literal, ty) => format!(
                "literal {}: {}",
                self.literal_body(function, literal),
                self.ty(ty)
            ),
            NumericUnary(op, v) => format!("{} {}", op.as_str(), self.use_(function, v)),
            NumericBinary(op, a, b) => format!(
                "{} {}, {}",
                op.as_str(),
                self.use_(function, a),
                self.use_(function, b)
            ),
            BooleanBinary(op, a, b) => format!(
                "{} {}, {}",
                op.as_str(),
                self.use_(function, a),
                self.use_(function, b)
            ),
            Compare(op, a, b) => format!(
                "{} {}, {}",
                op.as_str(),
                self.use_(function, a),
                self.use_(function, b)
            ),
            Not(v) => format!("not {}", self.use_(function, v)),
            Dot(a, b) => format!(
                "dot {}, {}",
                self.use_(function, a),
                self.use_(function, b)
            ),
            Concatenate(operands, axis) => format!(
                "concatenate {} along {}",
                operands
                    .iter()
                    .map(|u| self.use_(function, u))
                    .collect::<Vec<_>>()
                    .join(", "),
                axis
            ),
            Transpose(v) => format!("transpose {}", self.use_(function, v)),
            Reverse(v, dimensions) => format!(
                "reverse {} along {}",
                self.use_(function, v),
                Self::ints(dimensions)
            ),
            Slice(v, lower, upper) => format!(
                "slice {} from {} upto {}",
                self.use_(function, v),
                lower,
                upper
            ),
            Random(shape, lo, hi) => format!(
                "random {} from {} upto {}",
                shape,
                self.use_(function, lo),
                self.use_(function, hi)
            ),
            Select(left, right, flags) => format!(
                "select {}, {} by {}",
                self.use_(function, left),
                self.use_(function, right),
                self.use_(function, flags)
            ),
            Reduce {
                combinator,
                operand,
                initial,
                dimensions,
            } => format!(
                "reduce {} {} init {} along {}",
                self.combinator(function, combinator),
                self.use_(function, operand),
                self.use_(function, initial),
                Self::ints(dimensions)
            ),
            Scan {
                combinator,
                operand,
                dimensions,
            } => format!(
                "scan {} {} along {}",
                self.combinator(function, combinator),
                self.use_(function, operand),
                Self::ints(dimensions)
            ),
            ReduceWindow {
                combinator,
                operand,
                initial,
                dimensions,
                strides,
                padding,
            } => format!(
                "reduceWindow {} {} init {} dims {} strides {} padding {}",
                self.combinator(function, combinator),
                self.use_(function, operand),
                self.use_(function, initial),
                dimensions,
                Self::ints(strides),
                match padding {
                    Padding::None => "none",
                    Padding::Half => "half",
                }
            ),
            Convolve {
                operand,
                kernel,
                strides,
                padding,
                left_dilation,
                right_dilation,
                groups,
            } => {
                let mut text = format!(
                    "convolve {} kernel {}",
                    self.use_(function, operand),
                    self.use_(function, kernel)
                );
                if let Some(strides) = strides {
                    let _ = write!(text, " strides {}", Self::ints(strides));
                }
                if let Some(padding) = padding {
                    let pairs: Vec<String> = padding
                        .iter()
                        .map(|(low, high)| format!("({}, {})", low, high))
                        .collect();
                    let _ = write!(text, " padding {}", pairs.join(", "));
                }
                if let Some(dilation) = left_dilation {
                    let _ = write!(text, " leftDilation {}", Self::ints(dilation));
                }
                if let Some(dilation) = right_dilation {
                    let _ = write!(text, " rightDilation {}", Self::ints(dilation));
                }
                if let Some(groups) = groups {
                    let _ = write!(text, " groups {}", groups);
                }
                text
            }
            Rank(v) => format!("rank of {}", self.use_(function, v)),
            Shape(v) => format!("shape of {}", self.use_(function, v)),
            UnitCount(v) => format!("unitCount of {}", self.use_(function, v)),
            PadShape(v, at) => format!("padShape {} at {}", self.use_(function, v), at),
            SqueezeShape(v, at) => {
                format!("squeezeShape {} at {}", self.use_(function, v), at)
            }
            ShapeCast(v, shape) => {
                format!("shapeCast {} to {}", self.use_(function, v), shape)
            }
            BitCast(v, ty) => format!("bitCast {} to {}", self.use_(function, v), self.ty(ty)),
            DataTypeCast(v, dtype) => {
                format!("dataTypeCast {} to {}", self.use_(function, v), dtype)
            }
            Extract { source, keys } => format!(
                "extract {} from {}",
                self.keys(function, keys),
                self.use_(function, source)
            ),
            Insert {
                source,
                destination,
                keys,
            } => format!(
                "insert {} to {} at {}",
                self.use_(function, source),
                self.use_(function, destination),
                self.keys(function, keys)
            ),
            Apply { callee, arguments } => format!(
                "apply {} ({})",
                self.use_(function, callee),
                arguments
                    .iter()
                    .map(|u| self.use_(function, u))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            AllocateStack(ty, count) => {
                format!("allocateStack {} by {}", self.ty(ty), count)
            }
            AllocateHeap(ty, count) => format!(
                "allocateHeap {} count {}",
                self.ty(ty),
                self.use_(function, count)
            ),
            AllocateBox(ty) => format!("allocateBox {}", self.ty(ty)),
            ProjectBox(v) => format!("projectBox {}", self.use_(function, v)),
            Load(p) => format!("load {}", self.use_(function, p)),
            Store { value, destination } => format!(
                "store {} to {}",
                self.use_(function, value),
                self.use_(function, destination)
            ),
            ElementPointer(p, keys) => format!(
                "elementPointer {} at {}",
                self.use_(function, p),
                self.keys(function, keys)
            ),
            Copy {
                source,
                destination,
                count,
            } => format!(
                "copy from {} to {} count {}",
                self.use_(function, source),
                self.use_(function, destination),
                self.use_(function, count)
            ),
            CreateStack => "createStack".to_string(),
            DestroyStack(s) => format!("destroyStack {}", self.use_(function, s)),
            Push { value, stack } => format!(
                "push {} to {}",
                self.use_(function, value),
                self.use_(function, stack)
            ),
            Pop(ty, s) => format!("pop {} from {}", self.ty(ty), self.use_(function, s)),
            Retain(b) => format!("retain {}", self.use_(function, b)),
            Release(b) => format!("release {}", self.use_(function, b)),
            Deallocate(p) => format!("deallocate {}", self.use_(function, p)),
            Branch(block, arguments) => format!(
                "branch {}({})",
                self.block_ref(function, *block),
                arguments
                    .iter()
                    .map(|u| self.use_(function, u))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Conditional {
                condition,
                then_block,
                then_arguments,
                else_block,
                else_arguments,
            } => format!(
                "conditional {} then {}({}) else {}({})",
                self.use_(function, condition),
                self.block_ref(function, *then_block),
                then_arguments
                    .iter()
                    .map(|u| self.use_(function, u))
                    .collect::<Vec<_>>()
                    .join(", "),
                self.block_ref(function, *else_block),
                else_arguments
                    .iter()
                    .map(|u| self.use_(function, u))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            BranchEnum(v, cases) => {
                let mut text = format!("branchEnum {}", self.use_(function, v));
                for (case, block) in cases {
                    let _ = write!(
                        text,
                        " case ?{} {}",
                        case,
                        self.block_ref(function, *block)
                    );
                }
                text
            }
            Return(value) => match value {
                Some(v) => format!("return {}", self.use_(function, v)),
                None => "return".to_string(),
            },
            Trap => "trap".to_string(),
            Builtin(key, arguments) => format!(
                "builtin \"{}\" ({})",
                escape(key),
                arguments
                    .iter()
                    .map(|u| self.use_(function, u))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    fn combinator(&self, function: &Function, combinator: &ReductionCombinator) -> String {
        match combinator {
            ReductionCombinator::Function(u) => self.use_(function, u),
            ReductionCombinator::Boolean(op) => op.as_str().to_string(),
            ReductionCombinator::Numeric(op) => op.as_str().to_string(),
            ReductionCombinator::NumericBuiltin(key) => format!("\"{}\"", escape(key)),
        }
    }

    fn keys(&self, function: &Function, keys: &[ElementKey]) -> String {
        keys.iter()
            .map(|key| match key {
                ElementKey::Index(i) => i.to_string(),
                ElementKey::Name(name) => format!("#{}", name),
                ElementKey::Value(u) => self.use_(function, u),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn use_(&self, function: &Function, u: &Use) -> String {
        match u {
            Use::Literal(ty, literal) => format!(
                "{}: {}",
                self.literal_body(function, literal),
                self.ty(ty)
            ),
            Use::Definition(definition) => {
                let ty = u.ty(self.module, function);
                format!("{}: {}", self.definition(function, definition), self.ty(&ty))
            }
        }
    }

    fn definition(&self, function: &Function, definition: &Definition) -> String {
        match definition {
            Definition::Argument(arg) => {
                let block = function.block(arg.block);
                match block.arguments().get(arg.index).and_then(|a| a.name.clone()) {
                    Some(name) => format!("%{}", name),
                    None => format!(
                        "%{}^{}",
                        function.block_index(arg.block).unwrap_or(arg.block.0),
                        arg.index
                    ),
                }
            }
            Definition::Instruction(id) => match &function.instruction(*id).name {
                Some(name) => format!("%{}", name),
                None => match function.instruction_position(*id) {
                    Some((block, position)) => format!(
                        "%{}.{}",
                        function.block_index(block).unwrap_or(block.0),
                        position
                    ),
                    None => "%<detached>".to_string(),
                },
            },
            Definition::Variable(id) => match &self.module.variable(*id).name {
                Some(name) => format!("@{}", name),
                None => format!("@{}", self.module.global_index(GlobalRef::Variable(*id))),
            },
            Definition::Function(id) => self.function_name(*id),
        }
    }

    fn literal_body(&self, function: &Function, literal: &Literal) -> String {
        match literal {
            Literal::Undefined => "undefined".to_string(),
            Literal::Zero => "zero".to_string(),
            Literal::Null => "null".to_string(),
            Literal::Bool(true) => "true".to_string(),
            Literal::Bool(false) => "false".to_string(),
            Literal::Scalar(ScalarLiteral::Int(value)) => value.to_string(),
            Literal::Scalar(ScalarLiteral::Float(value)) => format_float(*value),
            Literal::Tensor(elements) => format!(
                "<{}>",
                elements
                    .iter()
                    .map(|u| self.use_(function, u))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Literal::Tuple(elements) => format!(
                "({})",
                elements
                    .iter()
                    .map(|u| self.use_(function, u))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Literal::Array(elements) => format!(
                "[{}]",
                elements
                    .iter()
                    .map(|u| self.use_(function, u))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Literal::Struct(fields) => format!(
                "{{{}}}",
                fields
                    .iter()
                    .map(|(name, u)| format!("#{} = {}", name, self.use_(function, u)))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Literal::Enum(case, operands) => {
                if operands.is_empty() {
                    format!("?{}", case)
                } else {
                    format!(
                        "?{}({})",
                        case,
                        operands
                            .iter()
                            .map(|u| self.use_(function, u))
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                }
            }
        }
    }

    fn ty(&self, ty: &Type) -> String {
        match ty {
            Type::Invalid => "invalid".to_string(),
            Type::Void => "void".to_string(),
            Type::Bool => "bool".to_string(),
            Type::Tensor(shape, dtype) => {
                if shape.is_scalar() {
                    dtype.to_string()
                } else {
                    format!("tensor<{} x {}>", shape, dtype)
                }
            }
            Type::Tuple(elements) => format!(
                "({})",
                elements
                    .iter()
                    .map(|t| self.ty(t))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Type::Array(count, element) => format!("[{} x {}]", count, self.ty(element)),
            Type::Pointer(element) => format!("*{}", self.ty(element)),
            Type::Box(element) => format!("box<{}>", self.ty(element)),
            Type::Function(arguments, result) => format!(
                "({}) -> {}",
                arguments
                    .iter()
                    .map(|t| self.ty(t))
                    .collect::<Vec<_>>()
                    .join(", "),
                self.ty(result)
            ),
            Type::Struct(id) => format!("${}", self.module.struct_type(*id).name),
            Type::Enum(id) => format!("${}", self.module.enum_type(*id).name),
            Type::Alias(id) => format!("${}", self.module.alias(*id).name),
            Type::Stack => "stack".to_string(),
        }
    }
}

/// Prints a type against a module's nominal tables.
pub fn print_type(module: &Module, ty: &Type) -> String {
    Printer { module }.ty(ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::Builder;
    use crate::ir::intrinsics::IntrinsicRegistry;
    use crate::ir::module::Stage;
    use crate::ir::shape::{DataType, TensorShape};
    use std::rc::Rc;

    #[test]
    fn test_print_simple_function() {
        let mut builder = Builder::new("m", Stage::Raw, Rc::new(IntrinsicRegistry::default()));
        let i32_ty = Type::scalar(DataType::Int(32));
        let f = builder.function("f", vec![i32_ty.clone()], i32_ty.clone());
        let entry = builder.block(f, "entry", vec![(Some("x".to_string()), i32_ty.clone())]);
        let x = builder.argument(f, entry, 0);
        builder.append(f, entry, None, InstructionKind::Return(Some(x)));
        let module = builder.finish();

        let printed = print_module(&module);
        assert_eq!(
            printed,
            "module \"m\"\nstage raw\n\nfunc @f: (i32) -> i32 {\n'entry(%x: i32):\n    return %x: i32\n}\n"
        );
    }

    #[test]
    fn test_print_types() {
        let module = Module::new("m", Stage::Raw, Rc::new(IntrinsicRegistry::default()));
        let i32_ty = Type::scalar(DataType::Int(32));
        assert_eq!(print_type(&module, &i32_ty), "i32");
        assert_eq!(
            print_type(
                &module,
                &Type::tensor(TensorShape::new(vec![2, 2]), DataType::Int(32))
            ),
            "tensor<2x2 x i32>"
        );
        assert_eq!(
            print_type(&module, &Type::Pointer(Box::new(Type::Bool))),
            "*bool"
        );
        assert_eq!(
            print_type(&module, &Type::Array(4, Box::new(i32_ty.clone()))),
            "[4 x i32]"
        );
        assert_eq!(
            print_type(
                &module,
                &Type::Function(vec![i32_ty.clone()], Box::new(Type::Void))
            ),
            "(i32) -> void"
        );
        assert_eq!(
            print_type(&module, &Type::Tuple(vec![i32_ty, Type::Stack])),
            "(i32, stack)"
        );
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(1.5), "1.5");
        assert_eq!(format_float(-2.25), "-2.25");
    }
}
