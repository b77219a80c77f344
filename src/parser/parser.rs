//! Two-phase LL parser for the textual IR.
//!
//! Phase 1 sweeps the token stream with a saved-and-restored cursor:
//! first registering every nominal type name, then filling nominal
//! type bodies, registering variables, function prototypes (full
//! signatures), and per-function basic block prototypes (names and
//! argument lists). Phase 2 walks the declarations again and parses
//! bodies against the pre-populated tables, so references to functions
//! and blocks may point forward.
//!
//! Forward references to instructions are only expressible anonymously
//! (`%B.I` with B up to the current block); such a reference reserves
//! a placeholder arena slot that the defining position fills later.
//! Unfilled placeholders and deferred type annotations are checked
//! when the function ends.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::ir::function::{
    AdjointConfiguration, Argument, BasicBlock, DeclarationKind, Function,
};
use crate::ir::instruction::{
    Instruction, InstructionKind, Padding, ReductionCombinator,
};
use crate::ir::module::{GlobalRef, Module, Stage, Variable};
use crate::ir::print::print_type;
use crate::ir::shape::TensorShape;
use crate::ir::types::{ElementKey, Type};
use crate::ir::{
    ArgId, BlockId, Definition, FuncId, InstId, Literal, ScalarLiteral, Use,
};

use super::lexer::{
    IdentifierKind, Keyword, Opcode, SourceLocation, Token, TokenKind,
};

/// Errors produced while parsing a token stream into a module.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("expected a {expected} identifier, found a {found} identifier at {location}")]
    UnexpectedIdentifierKind {
        expected: IdentifierKind,
        found: IdentifierKind,
        location: SourceLocation,
    },
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEndOfInput { expected: String },
    #[error("expected {expected}, found {found} at {location}")]
    UnexpectedToken {
        expected: String,
        found: String,
        location: SourceLocation,
    },
    #[error("undefined identifier {name} at {location}")]
    UndefinedIdentifier { name: String, location: SourceLocation },
    #[error("undefined intrinsic \"{name}\" at {location}")]
    UndefinedIntrinsic { name: String, location: SourceLocation },
    #[error("type mismatch, expected {expected} at {location}")]
    TypeMismatch { expected: String, location: SourceLocation },
    #[error("undefined nominal type ${name} at {location}")]
    UndefinedNominalType { name: String, location: SourceLocation },
    #[error("redefined identifier {name} at {location}")]
    RedefinedIdentifier { name: String, location: SourceLocation },
    #[error("anonymous identifier is not usable outside a local context at {location}")]
    AnonymousIdentifierNotInLocal { location: SourceLocation },
    #[error("invalid instruction index {index} at {location}")]
    InvalidInstructionIndex { index: usize, location: SourceLocation },
    #[error("invalid argument index {index} at {location}")]
    InvalidArgumentIndex { index: usize, location: SourceLocation },
    #[error("invalid basic block index {index} at {location}")]
    InvalidBasicBlockIndex { index: usize, location: SourceLocation },
    #[error("invalid variable index {index} at {location}")]
    InvalidVariableIndex { index: usize, location: SourceLocation },
    #[error("invalid function index {index} at {location}")]
    InvalidFunctionIndex { index: usize, location: SourceLocation },
    #[error("variables must precede functions; variable declared at {location}")]
    VariableAfterFunction { location: SourceLocation },
    #[error("type declarations must precede values; type declared at {location}")]
    TypeDeclarationNotBeforeValues { location: SourceLocation },
    #[error("a function must be declared with a function type at {location}")]
    NotFunctionType { location: SourceLocation },
    #[error("instruction outside a basic block at {location}")]
    NotInBasicBlock { location: SourceLocation },
    #[error("invalid attribute arguments at {location}")]
    InvalidAttributeArguments { location: SourceLocation },
    #[error("declaration @{name} cannot have a body")]
    DeclarationCannotHaveBody { name: String },
    #[error("cannot name void value %{name} at {location}")]
    CannotNameVoidValue { name: String, location: SourceLocation },
    #[error("invalid operands to {opcode} at {location}")]
    InvalidOperands { opcode: String, location: SourceLocation },
    #[error("invalid reduction combinator at {location}")]
    InvalidReductionCombinator { location: SourceLocation },
}

type Result<T> = std::result::Result<T, ParseError>;

/// Per-function parsing state.
struct FunctionContext {
    func: FuncId,
    locals: FxHashMap<String, Definition>,
    block_index: usize,
    parsed_instructions: usize,
    placeholders: FxHashSet<InstId>,
    placeholder_locations: FxHashMap<InstId, SourceLocation>,
    pending_annotations: Vec<(InstId, Type, SourceLocation)>,
    instruction_locations: Vec<(InstId, SourceLocation)>,
}

pub struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    module: Module,
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t [Token], module: Module) -> Self {
        Parser {
            tokens,
            pos: 0,
            module,
        }
    }

    pub fn parse(mut self) -> Result<Module> {
        self.parse_header()?;

        // Phase 1: symbol scanning over a preserved cursor.
        let saved = self.pos;
        self.scan_nominal_names()?;
        self.pos = saved;
        self.parse_top_levels(false)?;
        self.pos = saved;

        // Phase 2: body parsing against the populated tables.
        self.parse_top_levels(true)?;
        Ok(self.module)
    }

    // --- Cursor utilities ---

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn location(&self) -> SourceLocation {
        self.peek()
            .or_else(|| self.tokens.last())
            .map(|t| t.location)
            .unwrap_or(SourceLocation { line: 1, column: 1 })
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn describe(kind: &TokenKind) -> String {
        format!("{:?}", kind)
    }

    fn unexpected<T>(&self, expected: &str) -> Result<T> {
        match self.peek() {
            Some(token) => Err(ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: Self::describe(&token.kind),
                location: token.location,
            }),
            None => Err(ParseError::UnexpectedEndOfInput {
                expected: expected.to_string(),
            }),
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek_kind(), Some(TokenKind::Newline)) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<SourceLocation> {
        match self.peek() {
            Some(token) if token.kind == kind => {
                let location = token.location;
                self.pos += 1;
                Ok(location)
            }
            _ => self.unexpected(expected),
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        self.eat(&TokenKind::Keyword(keyword))
    }

    fn expect_keyword(&mut self, keyword: Keyword, expected: &str) -> Result<SourceLocation> {
        self.expect(TokenKind::Keyword(keyword), expected)
    }

    fn expect_integer(&mut self, expected: &str) -> Result<(usize, SourceLocation)> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Integer(value),
                location,
            }) if *value >= 0 => {
                let result = (*value as usize, *location);
                self.pos += 1;
                Ok(result)
            }
            _ => self.unexpected(expected),
        }
    }

    fn expect_identifier(
        &mut self,
        kind: IdentifierKind,
        expected: &str,
    ) -> Result<(String, SourceLocation)> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Identifier(found, name),
                location,
            }) => {
                if *found == kind {
                    let result = (name.clone(), *location);
                    self.pos += 1;
                    Ok(result)
                } else {
                    Err(ParseError::UnexpectedIdentifierKind {
                        expected: kind,
                        found: *found,
                        location: *location,
                    })
                }
            }
            _ => self.unexpected(expected),
        }
    }

    // --- Module header ---

    fn parse_header(&mut self) -> Result<()> {
        self.skip_separators();
        self.expect_keyword(Keyword::Module, "module")?;
        let name = match self.peek_kind().cloned() {
            Some(TokenKind::Str(name)) => {
                self.pos += 1;
                name
            }
            _ => return self.unexpected("module name string"),
        };
        self.module.name = name;
        self.skip_separators();
        self.expect_keyword(Keyword::Stage, "stage")?;
        self.module.stage = if self.eat_keyword(Keyword::Raw) {
            Stage::Raw
        } else if self.eat_keyword(Keyword::Optimizable) {
            Stage::Optimizable
        } else {
            return self.unexpected("raw or optimizable");
        };
        Ok(())
    }

    // --- Phase 1a: nominal type names ---

    fn scan_nominal_names(&mut self) -> Result<()> {
        let mut at_line_start = true;
        let mut pos = self.pos;
        while let Some(token) = self.tokens.get(pos) {
            match &token.kind {
                TokenKind::Newline => at_line_start = true,
                TokenKind::Keyword(kw @ (Keyword::Type | Keyword::Struct | Keyword::Enum))
                    if at_line_start =>
                {
                    if let Some(Token {
                        kind: TokenKind::Identifier(IdentifierKind::Type, name),
                        location,
                    }) = self.tokens.get(pos + 1)
                    {
                        if self.module.type_named(name).is_some() {
                            return Err(ParseError::RedefinedIdentifier {
                                name: format!("${}", name),
                                location: *location,
                            });
                        }
                        match kw {
                            Keyword::Type => {
                                self.module
                                    .add_alias(crate::ir::module::TypeAlias::new(name.clone(), None));
                            }
                            Keyword::Struct => {
                                self.module.add_struct(
                                    crate::ir::module::StructType::new(name.clone(), Vec::new()),
                                );
                            }
                            Keyword::Enum => {
                                self.module.add_enum(crate::ir::module::EnumType::new(
                                    name.clone(),
                                    Vec::new(),
                                ));
                            }
                            _ => unreachable!(),
                        }
                    }
                    at_line_start = false;
                }
                _ => at_line_start = false,
            }
            pos += 1;
        }
        Ok(())
    }

    // --- Declaration walk, shared by phase 1b and phase 2 ---

    fn parse_top_levels(&mut self, bodies: bool) -> Result<()> {
        let mut values_seen = false;
        let mut functions_seen = false;
        let mut parsed_functions = 0usize;
        loop {
            self.skip_separators();
            let token = match self.peek() {
                Some(token) => token.clone(),
                None => break,
            };
            match &token.kind {
                TokenKind::Keyword(Keyword::Type) => {
                    if values_seen {
                        return Err(ParseError::TypeDeclarationNotBeforeValues {
                            location: token.location,
                        });
                    }
                    self.parse_alias_declaration(bodies)?;
                }
                TokenKind::Keyword(Keyword::Struct) => {
                    if values_seen {
                        return Err(ParseError::TypeDeclarationNotBeforeValues {
                            location: token.location,
                        });
                    }
                    self.parse_struct_declaration(bodies)?;
                }
                TokenKind::Keyword(Keyword::Enum) => {
                    if values_seen {
                        return Err(ParseError::TypeDeclarationNotBeforeValues {
                            location: token.location,
                        });
                    }
                    self.parse_enum_declaration(bodies)?;
                }
                TokenKind::Keyword(Keyword::Var) => {
                    values_seen = true;
                    if functions_seen {
                        return Err(ParseError::VariableAfterFunction {
                            location: token.location,
                        });
                    }
                    self.parse_variable_declaration(bodies)?;
                }
                TokenKind::Attribute(_)
                | TokenKind::LeftBracket
                | TokenKind::Keyword(Keyword::Func) => {
                    values_seen = true;
                    functions_seen = true;
                    self.parse_function_declaration(bodies, parsed_functions)?;
                    parsed_functions += 1;
                }
                _ => return self.unexpected("a top-level declaration"),
            }
        }
        Ok(())
    }

    fn parse_alias_declaration(&mut self, bodies: bool) -> Result<()> {
        self.expect_keyword(Keyword::Type, "type")?;
        let (name, _) = self.expect_identifier(IdentifierKind::Type, "type name")?;
        let underlying = if self.eat(&TokenKind::Equal) {
            Some(self.parse_type()?)
        } else {
            None
        };
        if !bodies {
            let id = self
                .module
                .aliases()
                .find(|(_, a)| a.name == name)
                .map(|(id, _)| id)
                .expect("alias was registered in the name scan");
            self.module.alias_mut(id).underlying = underlying;
        }
        Ok(())
    }

    fn parse_struct_declaration(&mut self, bodies: bool) -> Result<()> {
        self.expect_keyword(Keyword::Struct, "struct")?;
        let (name, _) = self.expect_identifier(IdentifierKind::Type, "struct name")?;
        self.expect(TokenKind::LeftBrace, "{")?;
        let mut fields = Vec::new();
        self.skip_separators();
        if !self.eat(&TokenKind::RightBrace) {
            loop {
                self.skip_separators();
                let (field, location) =
                    self.expect_identifier(IdentifierKind::StructField, "field name")?;
                if fields.iter().any(|(existing, _)| *existing == field) {
                    return Err(ParseError::RedefinedIdentifier {
                        name: format!("#{}", field),
                        location,
                    });
                }
                self.expect(TokenKind::Colon, ":")?;
                let ty = self.parse_type()?;
                fields.push((field, ty));
                self.skip_separators();
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.skip_separators();
            self.expect(TokenKind::RightBrace, "}")?;
        }
        if !bodies {
            let id = self
                .module
                .structs()
                .find(|(_, s)| s.name == name)
                .map(|(id, _)| id)
                .expect("struct was registered in the name scan");
            self.module.struct_type_mut(id).fields = fields;
        }
        Ok(())
    }

    fn parse_enum_declaration(&mut self, bodies: bool) -> Result<()> {
        self.expect_keyword(Keyword::Enum, "enum")?;
        let (name, _) = self.expect_identifier(IdentifierKind::Type, "enum name")?;
        self.expect(TokenKind::LeftBrace, "{")?;
        let mut cases = Vec::new();
        self.skip_separators();
        if !self.eat(&TokenKind::RightBrace) {
            loop {
                self.skip_separators();
                let (case, location) =
                    self.expect_identifier(IdentifierKind::EnumCase, "case name")?;
                if cases.iter().any(|(existing, _)| *existing == case) {
                    return Err(ParseError::RedefinedIdentifier {
                        name: format!("?{}", case),
                        location,
                    });
                }
                let mut associated = Vec::new();
                if self.eat(&TokenKind::LeftParen) {
                    if !self.eat(&TokenKind::RightParen) {
                        loop {
                            associated.push(self.parse_type()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                        self.expect(TokenKind::RightParen, ")")?;
                    }
                }
                cases.push((case, associated));
                self.skip_separators();
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.skip_separators();
            self.expect(TokenKind::RightBrace, "}")?;
        }
        if !bodies {
            let id = self
                .module
                .enums()
                .find(|(_, e)| e.name == name)
                .map(|(id, _)| id)
                .expect("enum was registered in the name scan");
            self.module.enum_type_mut(id).cases = cases;
        }
        Ok(())
    }

    fn parse_variable_declaration(&mut self, bodies: bool) -> Result<()> {
        self.expect_keyword(Keyword::Var, "var")?;
        let name = match self.peek().cloned() {
            Some(Token {
                kind: TokenKind::Identifier(IdentifierKind::Global, name),
                location,
            }) => {
                self.pos += 1;
                if !bodies && self.module.global_named(&name).is_some() {
                    return Err(ParseError::RedefinedIdentifier {
                        name: format!("@{}", name),
                        location,
                    });
                }
                Some(name)
            }
            Some(Token {
                kind: TokenKind::AnonymousGlobal(index),
                location,
            }) => {
                self.pos += 1;
                if !bodies && index != self.module.variable_count() {
                    return Err(ParseError::InvalidVariableIndex { index, location });
                }
                None
            }
            _ => return self.unexpected("variable name"),
        };
        self.expect(TokenKind::Colon, ":")?;
        let ty = self.parse_type()?;
        if !bodies {
            self.module.add_variable(Variable::new(name, ty));
        }
        Ok(())
    }

    // --- Functions ---

    fn parse_function_declaration(&mut self, bodies: bool, index: usize) -> Result<()> {
        let mut attributes = Vec::new();
        while let Some(TokenKind::Attribute(attribute)) = self.peek_kind() {
            attributes.push(*attribute);
            self.pos += 1;
            self.skip_separators();
        }
        let declaration_kind = if self.peek_kind() == Some(&TokenKind::LeftBracket) {
            Some(self.parse_declaration_kind(bodies)?)
        } else {
            None
        };
        self.expect_keyword(Keyword::Func, "func")?;
        let name = match self.peek().cloned() {
            Some(Token {
                kind: TokenKind::Identifier(IdentifierKind::Global, name),
                location,
            }) => {
                self.pos += 1;
                if !bodies && self.module.global_named(&name).is_some() {
                    return Err(ParseError::RedefinedIdentifier {
                        name: format!("@{}", name),
                        location,
                    });
                }
                Some(name)
            }
            Some(Token {
                kind: TokenKind::AnonymousGlobal(anonymous),
                location,
            }) => {
                self.pos += 1;
                let expected = self.module.variable_count() + self.module.function_count();
                if !bodies && anonymous != expected {
                    return Err(ParseError::InvalidFunctionIndex {
                        index: anonymous,
                        location,
                    });
                }
                None
            }
            _ => return self.unexpected("function name"),
        };
        self.expect(TokenKind::Colon, ":")?;
        let type_location = self.location();
        let ty = self.parse_type()?;
        let (argument_types, return_type) = match ty {
            Type::Function(arguments, result) => (arguments, *result),
            _ => {
                return Err(ParseError::NotFunctionType {
                    location: type_location,
                })
            }
        };

        if !bodies {
            let func = self
                .module
                .add_function(Function::new(name, argument_types, return_type));
            if self.peek_kind() == Some(&TokenKind::LeftBrace) {
                self.scan_block_prototypes(func)?;
            }
            return Ok(());
        }

        let func = FuncId(index);
        {
            let function = self.module.function_mut(func);
            function.attributes = attributes;
            function.declaration_kind = declaration_kind.clone();
        }
        if self.peek_kind() == Some(&TokenKind::LeftBrace) {
            if declaration_kind.is_some() {
                return Err(ParseError::DeclarationCannotHaveBody {
                    name: self
                        .module
                        .function(func)
                        .name
                        .clone()
                        .unwrap_or_else(|| index.to_string()),
                });
            }
            self.parse_function_body(func)?;
        }
        Ok(())
    }

    fn parse_declaration_kind(&mut self, bodies: bool) -> Result<DeclarationKind> {
        self.expect(TokenKind::LeftBracket, "[")?;
        let kind = if self.eat_keyword(Keyword::Extern) {
            DeclarationKind::External
        } else if self.eat_keyword(Keyword::Adjoint) {
            let primal = match self.peek().cloned() {
                Some(Token {
                    kind: TokenKind::Identifier(IdentifierKind::Global, name),
                    location,
                }) => {
                    self.pos += 1;
                    if bodies {
                        match self.module.global_named(&name) {
                            Some(GlobalRef::Function(id)) => id,
                            _ => {
                                return Err(ParseError::UndefinedIdentifier {
                                    name: format!("@{}", name),
                                    location,
                                })
                            }
                        }
                    } else {
                        FuncId(0)
                    }
                }
                Some(Token {
                    kind: TokenKind::AnonymousGlobal(anonymous),
                    location,
                }) => {
                    self.pos += 1;
                    if bodies {
                        match self.module.global_by_index(anonymous) {
                            Some(GlobalRef::Function(id)) => id,
                            _ => {
                                return Err(ParseError::InvalidFunctionIndex {
                                    index: anonymous,
                                    location,
                                })
                            }
                        }
                    } else {
                        FuncId(0)
                    }
                }
                _ => return self.unexpected("primal function"),
            };
            self.expect_keyword(Keyword::From, "from")?;
            let (source_index, _) = self.expect_integer("source index")?;
            self.expect_keyword(Keyword::Wrt, "wrt")?;
            let mut argument_indices = vec![self.expect_integer("argument index")?.0];
            while self.eat(&TokenKind::Comma) {
                argument_indices.push(self.expect_integer("argument index")?.0);
            }
            let mut kept_indices = Vec::new();
            if self.eat_keyword(Keyword::Keeping) {
                kept_indices.push(self.expect_integer("kept index")?.0);
                while self.eat(&TokenKind::Comma) {
                    kept_indices.push(self.expect_integer("kept index")?.0);
                }
            }
            let seedable = self.eat_keyword(Keyword::Seedable);
            DeclarationKind::Adjoint(AdjointConfiguration {
                primal,
                source_index,
                argument_indices,
                kept_indices,
                seedable,
            })
        } else {
            return Err(ParseError::InvalidAttributeArguments {
                location: self.location(),
            });
        };
        self.expect(TokenKind::RightBracket, "]")?;
        Ok(kind)
    }

    // --- Phase 1: block prototypes ---

    fn scan_block_prototypes(&mut self, func: FuncId) -> Result<()> {
        self.expect(TokenKind::LeftBrace, "{")?;
        let mut brace_depth = 0usize;
        let mut at_line_start = true;
        loop {
            let token = match self.peek() {
                Some(token) => token.clone(),
                None => return self.unexpected("}"),
            };
            match &token.kind {
                TokenKind::Newline => {
                    at_line_start = true;
                    self.pos += 1;
                }
                TokenKind::LeftBrace => {
                    brace_depth += 1;
                    at_line_start = false;
                    self.pos += 1;
                }
                TokenKind::RightBrace => {
                    if brace_depth == 0 {
                        self.pos += 1;
                        return Ok(());
                    }
                    brace_depth -= 1;
                    at_line_start = false;
                    self.pos += 1;
                }
                TokenKind::Identifier(IdentifierKind::BasicBlock, _)
                | TokenKind::AnonymousBlock(_)
                    if at_line_start && brace_depth == 0 =>
                {
                    self.scan_block_header(func)?;
                    at_line_start = false;
                }
                _ => {
                    at_line_start = false;
                    self.pos += 1;
                }
            }
        }
    }

    fn scan_block_header(&mut self, func: FuncId) -> Result<()> {
        let block_index = self.module.function(func).block_count();
        let name = match self.advance() {
            Some(Token {
                kind: TokenKind::Identifier(IdentifierKind::BasicBlock, name),
                location,
            }) => {
                if self.module.function(func).block_named(&name).is_some() {
                    return Err(ParseError::RedefinedIdentifier {
                        name: format!("'{}", name),
                        location,
                    });
                }
                Some(name)
            }
            Some(Token {
                kind: TokenKind::AnonymousBlock(index),
                location,
            }) => {
                if index != block_index {
                    return Err(ParseError::InvalidBasicBlockIndex { index, location });
                }
                None
            }
            _ => return self.unexpected("basic block"),
        };
        let mut arguments = Vec::new();
        if self.eat(&TokenKind::LeftParen) {
            if !self.eat(&TokenKind::RightParen) {
                loop {
                    let argument_name = match self.advance() {
                        Some(Token {
                            kind: TokenKind::Identifier(IdentifierKind::Temporary, name),
                            ..
                        }) => Some(name),
                        Some(Token {
                            kind: TokenKind::ArgumentRef(block, index),
                            location,
                        }) => {
                            if block != block_index || index != arguments.len() {
                                return Err(ParseError::InvalidArgumentIndex { index, location });
                            }
                            None
                        }
                        _ => return self.unexpected("argument name"),
                    };
                    self.expect(TokenKind::Colon, ":")?;
                    let ty = self.parse_type()?;
                    arguments.push(Argument::new(argument_name, ty));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RightParen, ")")?;
            }
        }
        self.expect(TokenKind::Colon, ":")?;
        self.module
            .function_mut(func)
            .append_block(BasicBlock::new(name, arguments));
        Ok(())
    }

    // --- Phase 2: function bodies ---

    fn parse_function_body(&mut self, func: FuncId) -> Result<()> {
        self.expect(TokenKind::LeftBrace, "{")?;
        let mut ctx = FunctionContext {
            func,
            locals: FxHashMap::default(),
            block_index: 0,
            parsed_instructions: 0,
            placeholders: FxHashSet::default(),
            placeholder_locations: FxHashMap::default(),
            pending_annotations: Vec::new(),
            instruction_locations: Vec::new(),
        };

        // All block argument names are in scope for the whole body.
        {
            let function = self.module.function(func);
            for block in function.blocks() {
                for (index, argument) in function.block(block).arguments().iter().enumerate() {
                    if let Some(name) = &argument.name {
                        if ctx.locals.contains_key(name) {
                            return Err(ParseError::RedefinedIdentifier {
                                name: format!("%{}", name),
                                location: self.location(),
                            });
                        }
                        ctx.locals.insert(
                            name.clone(),
                            Definition::Argument(ArgId { block, index }),
                        );
                    }
                }
            }
        }

        loop {
            self.skip_separators();
            match self.peek_kind() {
                Some(TokenKind::RightBrace) => {
                    self.pos += 1;
                    break;
                }
                Some(
                    TokenKind::Identifier(IdentifierKind::BasicBlock, _)
                    | TokenKind::AnonymousBlock(_),
                ) => {
                    self.parse_block(&mut ctx)?;
                }
                Some(_) => return self.unexpected("a basic block or }"),
                None => return self.unexpected("}"),
            }
        }
        self.finish_function(ctx)
    }

    fn parse_block(&mut self, ctx: &mut FunctionContext) -> Result<()> {
        // The header was fully parsed in phase 1; re-validate the name
        // and consume through the trailing colon.
        match self.advance() {
            Some(Token {
                kind: TokenKind::Identifier(IdentifierKind::BasicBlock, name),
                location,
            }) => {
                let expected = self
                    .module
                    .function(ctx.func)
                    .block_at_index(ctx.block_index)
                    .and_then(|b| self.module.function(ctx.func).block(b).name.clone());
                if expected.as_deref() != Some(name.as_str()) {
                    return Err(ParseError::UndefinedIdentifier {
                        name: format!("'{}", name),
                        location,
                    });
                }
            }
            Some(Token {
                kind: TokenKind::AnonymousBlock(index),
                location,
            }) => {
                if index != ctx.block_index {
                    return Err(ParseError::InvalidBasicBlockIndex { index, location });
                }
            }
            _ => return self.unexpected("basic block"),
        }
        if self.eat(&TokenKind::LeftParen) {
            let mut depth = 0usize;
            loop {
                match self.peek_kind() {
                    Some(TokenKind::LeftParen) => depth += 1,
                    Some(TokenKind::RightParen) => {
                        if depth == 0 {
                            self.pos += 1;
                            break;
                        }
                        depth -= 1;
                    }
                    None => return self.unexpected(")"),
                    _ => {}
                }
                self.pos += 1;
            }
        }
        self.expect(TokenKind::Colon, ":")?;
        ctx.parsed_instructions = 0;

        loop {
            self.skip_separators();
            match self.peek_kind() {
                Some(
                    TokenKind::RightBrace
                    | TokenKind::Identifier(IdentifierKind::BasicBlock, _)
                    | TokenKind::AnonymousBlock(_),
                )
                | None => break,
                Some(_) => self.parse_instruction(ctx)?,
            }
        }
        ctx.block_index += 1;
        Ok(())
    }

    fn current_block(&self, ctx: &FunctionContext) -> Result<BlockId> {
        self.module
            .function(ctx.func)
            .block_at_index(ctx.block_index)
            .ok_or(ParseError::NotInBasicBlock {
                location: self.location(),
            })
    }

    fn parse_instruction(&mut self, ctx: &mut FunctionContext) -> Result<()> {
        let location = self.location();
        let block = self.current_block(ctx)?;

        // Optional result name.
        let mut name = None;
        match self.peek_kind().cloned() {
            Some(TokenKind::Identifier(IdentifierKind::Temporary, temp))
                if self.tokens.get(self.pos + 1).map(|t| &t.kind)
                    == Some(&TokenKind::Equal) =>
            {
                self.pos += 2;
                if ctx.locals.contains_key(&temp) {
                    return Err(ParseError::RedefinedIdentifier {
                        name: format!("%{}", temp),
                        location,
                    });
                }
                name = Some(temp);
            }
            Some(TokenKind::InstructionRef(b, i))
                if self.tokens.get(self.pos + 1).map(|t| &t.kind)
                    == Some(&TokenKind::Equal) =>
            {
                self.pos += 2;
                if b != ctx.block_index || i != ctx.parsed_instructions {
                    return Err(ParseError::InvalidInstructionIndex { index: i, location });
                }
            }
            _ => {}
        }

        let kind = self.parse_instruction_kind(ctx)?;
        let ty = {
            let function = self.module.function(ctx.func);
            kind.infer_type(&self.module, function)
        };

        let position = ctx.parsed_instructions;
        let existing = self
            .module
            .function(ctx.func)
            .block(block)
            .instructions()
            .get(position)
            .copied();
        let id = match existing {
            // A forward reference reserved this slot.
            Some(id) => {
                let instruction = self.module.function_mut(ctx.func).instruction_mut(id);
                instruction.name = name.clone();
                instruction.kind = kind;
                instruction.ty = ty;
                ctx.placeholders.remove(&id);
                id
            }
            None => {
                let instruction = Instruction::new(name.clone(), kind, ty);
                self.module
                    .function_mut(ctx.func)
                    .append_instruction(block, instruction)
            }
        };
        ctx.parsed_instructions += 1;
        ctx.instruction_locations.push((id, location));
        if let Some(name) = name {
            ctx.locals.insert(name, Definition::Instruction(id));
        }
        Ok(())
    }

    fn finish_function(&mut self, ctx: FunctionContext) -> Result<()> {
        if let Some((&id, &location)) = ctx
            .placeholder_locations
            .iter()
            .find(|(id, _)| ctx.placeholders.contains(id))
        {
            let index = self
                .module
                .function(ctx.func)
                .instruction_position(id)
                .map(|(_, i)| i)
                .unwrap_or(0);
            return Err(ParseError::InvalidInstructionIndex { index, location });
        }

        // Instruction types were derived in source order; forward
        // references may have produced provisional types, so re-derive
        // to a fixed point.
        let total = self.module.function(ctx.func).instruction_count();
        for _ in 0..total + 1 {
            let mut updates = Vec::new();
            {
                let function = self.module.function(ctx.func);
                for id in function.body_instructions() {
                    let instruction = function.instruction(id);
                    let ty = instruction.kind.infer_type(&self.module, function);
                    if ty != instruction.ty {
                        updates.push((id, ty));
                    }
                }
            }
            if updates.is_empty() {
                break;
            }
            let function = self.module.function_mut(ctx.func);
            for (id, ty) in updates {
                function.instruction_mut(id).ty = ty;
            }
        }

        for (id, annotated, location) in &ctx.pending_annotations {
            let function = self.module.function(ctx.func);
            let actual = function.instruction(*id).ty.clone();
            if !actual.conforms_to(annotated, &self.module) {
                return Err(ParseError::TypeMismatch {
                    expected: print_type(&self.module, annotated),
                    location: *location,
                });
            }
        }

        for (id, location) in &ctx.instruction_locations {
            let instruction = self.module.function(ctx.func).instruction(*id);
            if instruction.ty.is_void() {
                if let Some(name) = &instruction.name {
                    return Err(ParseError::CannotNameVoidValue {
                        name: name.clone(),
                        location: *location,
                    });
                }
            }
        }
        Ok(())
    }

    // --- Uses ---

    fn starts_use(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(
                TokenKind::Identifier(
                    IdentifierKind::Temporary
                        | IdentifierKind::Global
                        | IdentifierKind::EnumCase,
                    _,
                ) | TokenKind::InstructionRef(..)
                    | TokenKind::ArgumentRef(..)
                    | TokenKind::AnonymousGlobal(_)
                    | TokenKind::Integer(_)
                    | TokenKind::Float(_)
                    | TokenKind::LeftAngle
                    | TokenKind::LeftParen
                    | TokenKind::LeftBracket
                    | TokenKind::LeftBrace
                    | TokenKind::Keyword(
                        Keyword::True
                            | Keyword::False
                            | Keyword::Undefined
                            | Keyword::Zero
                            | Keyword::Null,
                    )
            )
        )
    }

    fn parse_use(&mut self, ctx: &mut FunctionContext) -> Result<Use> {
        let location = self.location();
        let body = match self.peek_kind().cloned() {
            Some(TokenKind::Identifier(IdentifierKind::Temporary, name)) => {
                self.pos += 1;
                match ctx.locals.get(&name) {
                    Some(definition) => UseBody::Definition(*definition),
                    None => {
                        return Err(ParseError::UndefinedIdentifier {
                            name: format!("%{}", name),
                            location,
                        })
                    }
                }
            }
            Some(TokenKind::InstructionRef(block_index, index)) => {
                self.pos += 1;
                self.resolve_instruction_ref(ctx, block_index, index, location)?
            }
            Some(TokenKind::ArgumentRef(block_index, index)) => {
                self.pos += 1;
                let function = self.module.function(ctx.func);
                let block = function.block_at_index(block_index).ok_or(
                    ParseError::InvalidBasicBlockIndex {
                        index: block_index,
                        location,
                    },
                )?;
                if index >= function.block(block).arguments().len() {
                    return Err(ParseError::InvalidArgumentIndex { index, location });
                }
                UseBody::Definition(Definition::Argument(ArgId { block, index }))
            }
            Some(TokenKind::Identifier(IdentifierKind::Global, name)) => {
                self.pos += 1;
                match self.module.global_named(&name) {
                    Some(GlobalRef::Variable(id)) => {
                        UseBody::Definition(Definition::Variable(id))
                    }
                    Some(GlobalRef::Function(id)) => {
                        UseBody::Definition(Definition::Function(id))
                    }
                    None => {
                        return Err(ParseError::UndefinedIdentifier {
                            name: format!("@{}", name),
                            location,
                        })
                    }
                }
            }
            Some(TokenKind::AnonymousGlobal(index)) => {
                self.pos += 1;
                match self.module.global_by_index(index) {
                    Some(GlobalRef::Variable(id)) => {
                        UseBody::Definition(Definition::Variable(id))
                    }
                    Some(GlobalRef::Function(id)) => {
                        UseBody::Definition(Definition::Function(id))
                    }
                    None => {
                        return Err(ParseError::UndefinedIdentifier {
                            name: format!("@{}", index),
                            location,
                        })
                    }
                }
            }
            Some(_) => UseBody::Literal(self.parse_literal_body(ctx)?),
            None => return self.unexpected("an operand"),
        };
        self.expect(TokenKind::Colon, ":")?;
        let annotation_location = self.location();
        let annotated = self.parse_type()?;

        match body {
            UseBody::Literal(literal) => Ok(Use::Literal(annotated, literal)),
            UseBody::Deferred(id) => {
                ctx.pending_annotations
                    .push((id, annotated, annotation_location));
                Ok(Use::Definition(Definition::Instruction(id)))
            }
            UseBody::Definition(definition) => {
                let u = Use::Definition(definition);
                let actual = {
                    let function = self.module.function(ctx.func);
                    u.ty(&self.module, function)
                };
                if !actual.conforms_to(&annotated, &self.module) {
                    return Err(ParseError::TypeMismatch {
                        expected: print_type(&self.module, &annotated),
                        location: annotation_location,
                    });
                }
                Ok(u)
            }
        }
    }

    fn resolve_instruction_ref(
        &mut self,
        ctx: &mut FunctionContext,
        block_index: usize,
        index: usize,
        location: SourceLocation,
    ) -> Result<UseBody> {
        if block_index > ctx.block_index {
            return Err(ParseError::InvalidBasicBlockIndex {
                index: block_index,
                location,
            });
        }
        let block = self
            .module
            .function(ctx.func)
            .block_at_index(block_index)
            .ok_or(ParseError::InvalidBasicBlockIndex {
                index: block_index,
                location,
            })?;
        let existing = self
            .module
            .function(ctx.func)
            .block(block)
            .instructions()
            .get(index)
            .copied();
        if let Some(id) = existing {
            if ctx.placeholders.contains(&id) {
                return Ok(UseBody::Deferred(id));
            }
            return Ok(UseBody::Definition(Definition::Instruction(id)));
        }
        if block_index < ctx.block_index {
            // The block is complete; the index is simply out of range.
            return Err(ParseError::InvalidInstructionIndex { index, location });
        }
        // A forward reference within the current block: reserve
        // placeholder slots up to the referenced position.
        let mut id = InstId(0);
        while self.module.function(ctx.func).block(block).instruction_count() <= index {
            let placeholder = Instruction::new(None, InstructionKind::Trap, Type::Invalid);
            id = self
                .module
                .function_mut(ctx.func)
                .append_instruction(block, placeholder);
            ctx.placeholders.insert(id);
            ctx.placeholder_locations.insert(id, location);
        }
        Ok(UseBody::Deferred(id))
    }

    fn parse_literal_body(&mut self, ctx: &mut FunctionContext) -> Result<Literal> {
        match self.peek_kind().cloned() {
            Some(TokenKind::Keyword(Keyword::Undefined)) => {
                self.pos += 1;
                Ok(Literal::Undefined)
            }
            Some(TokenKind::Keyword(Keyword::Zero)) => {
                self.pos += 1;
                Ok(Literal::Zero)
            }
            Some(TokenKind::Keyword(Keyword::Null)) => {
                self.pos += 1;
                Ok(Literal::Null)
            }
            Some(TokenKind::Keyword(Keyword::True)) => {
                self.pos += 1;
                Ok(Literal::Bool(true))
            }
            Some(TokenKind::Keyword(Keyword::False)) => {
                self.pos += 1;
                Ok(Literal::Bool(false))
            }
            Some(TokenKind::Integer(value)) => {
                self.pos += 1;
                Ok(Literal::Scalar(ScalarLiteral::Int(value)))
            }
            Some(TokenKind::Float(value)) => {
                self.pos += 1;
                Ok(Literal::Scalar(ScalarLiteral::Float(value)))
            }
            Some(TokenKind::LeftAngle) => {
                self.pos += 1;
                let elements = self.parse_use_list(ctx, &TokenKind::RightAngle)?;
                Ok(Literal::Tensor(elements))
            }
            Some(TokenKind::LeftParen) => {
                self.pos += 1;
                let elements = self.parse_use_list(ctx, &TokenKind::RightParen)?;
                Ok(Literal::Tuple(elements))
            }
            Some(TokenKind::LeftBracket) => {
                self.pos += 1;
                let elements = self.parse_use_list(ctx, &TokenKind::RightBracket)?;
                Ok(Literal::Array(elements))
            }
            Some(TokenKind::LeftBrace) => {
                self.pos += 1;
                let mut fields = Vec::new();
                if !self.eat(&TokenKind::RightBrace) {
                    loop {
                        let (field, _) = self
                            .expect_identifier(IdentifierKind::StructField, "field name")?;
                        self.expect(TokenKind::Equal, "=")?;
                        fields.push((field, self.parse_use(ctx)?));
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RightBrace, "}")?;
                }
                Ok(Literal::Struct(fields))
            }
            Some(TokenKind::Identifier(IdentifierKind::EnumCase, case)) => {
                self.pos += 1;
                let mut operands = Vec::new();
                if self.eat(&TokenKind::LeftParen) {
                    operands = self.parse_use_list(ctx, &TokenKind::RightParen)?;
                }
                Ok(Literal::Enum(case, operands))
            }
            _ => self.unexpected("a literal"),
        }
    }

    fn parse_use_list(
        &mut self,
        ctx: &mut FunctionContext,
        close: &TokenKind,
    ) -> Result<Vec<Use>> {
        let mut uses = Vec::new();
        if self.eat(close) {
            return Ok(uses);
        }
        loop {
            uses.push(self.parse_use(ctx)?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(close.clone(), "closing delimiter")?;
        Ok(uses)
    }

    // --- Types ---

    pub fn parse_type(&mut self) -> Result<Type> {
        match self.peek_kind().cloned() {
            Some(TokenKind::Keyword(Keyword::Void)) => {
                self.pos += 1;
                Ok(Type::Void)
            }
            Some(TokenKind::Keyword(Keyword::Bool)) => {
                self.pos += 1;
                Ok(Type::Bool)
            }
            Some(TokenKind::Keyword(Keyword::Stack)) => {
                self.pos += 1;
                Ok(Type::Stack)
            }
            Some(TokenKind::DataType(dtype)) => {
                self.pos += 1;
                Ok(Type::scalar(dtype))
            }
            Some(TokenKind::Keyword(Keyword::Tensor)) => {
                self.pos += 1;
                self.expect(TokenKind::LeftAngle, "<")?;
                let mut dimensions = Vec::new();
                while let Some(TokenKind::Integer(_)) = self.peek_kind() {
                    let (dimension, _) = self.expect_integer("dimension")?;
                    dimensions.push(dimension);
                    self.expect(TokenKind::Times, "x")?;
                }
                if dimensions.is_empty() {
                    return self.unexpected("tensor dimensions");
                }
                let dtype = match self.peek_kind().cloned() {
                    Some(TokenKind::DataType(dtype)) => {
                        self.pos += 1;
                        dtype
                    }
                    Some(TokenKind::Keyword(Keyword::Bool)) => {
                        self.pos += 1;
                        crate::ir::shape::DataType::Bool
                    }
                    _ => return self.unexpected("data type"),
                };
                self.expect(TokenKind::RightAngle, ">")?;
                Ok(Type::tensor(TensorShape::new(dimensions), dtype))
            }
            Some(TokenKind::Keyword(Keyword::Box)) => {
                self.pos += 1;
                self.expect(TokenKind::LeftAngle, "<")?;
                let element = self.parse_type()?;
                self.expect(TokenKind::RightAngle, ">")?;
                Ok(Type::Box(Box::new(element)))
            }
            Some(TokenKind::Star) => {
                self.pos += 1;
                Ok(Type::Pointer(Box::new(self.parse_type()?)))
            }
            Some(TokenKind::LeftParen) => {
                self.pos += 1;
                let mut elements = Vec::new();
                if !self.eat(&TokenKind::RightParen) {
                    loop {
                        elements.push(self.parse_type()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RightParen, ")")?;
                }
                if self.eat(&TokenKind::Arrow) {
                    let result = self.parse_type()?;
                    Ok(Type::Function(elements, Box::new(result)))
                } else {
                    Ok(Type::Tuple(elements))
                }
            }
            Some(TokenKind::LeftBracket) => {
                self.pos += 1;
                let (count, _) = self.expect_integer("array length")?;
                self.expect(TokenKind::Times, "x")?;
                let element = self.parse_type()?;
                self.expect(TokenKind::RightBracket, "]")?;
                Ok(Type::Array(count, Box::new(element)))
            }
            Some(TokenKind::Identifier(IdentifierKind::Type, name)) => {
                let location = self.location();
                self.pos += 1;
                self.module
                    .type_named(&name)
                    .cloned()
                    .ok_or(ParseError::UndefinedNominalType { name, location })
            }
            _ => self.unexpected("a type"),
        }
    }

    fn parse_shape(&mut self) -> Result<TensorShape> {
        if self.eat_keyword(Keyword::Scalar) {
            return Ok(TensorShape::scalar());
        }
        let mut dimensions = vec![self.expect_integer("dimension")?.0];
        while self.eat(&TokenKind::Times) {
            dimensions.push(self.expect_integer("dimension")?.0);
        }
        Ok(TensorShape::new(dimensions))
    }

    fn parse_index_list(&mut self) -> Result<Vec<usize>> {
        let mut indices = vec![self.expect_integer("index")?.0];
        while self.eat(&TokenKind::Comma) {
            indices.push(self.expect_integer("index")?.0);
        }
        Ok(indices)
    }

    fn parse_block_ref(&mut self, ctx: &FunctionContext) -> Result<BlockId> {
        match self.advance() {
            Some(Token {
                kind: TokenKind::Identifier(IdentifierKind::BasicBlock, name),
                location,
            }) => self
                .module
                .function(ctx.func)
                .block_named(&name)
                .ok_or(ParseError::UndefinedIdentifier {
                    name: format!("'{}", name),
                    location,
                }),
            Some(Token {
                kind: TokenKind::AnonymousBlock(index),
                location,
            }) => self
                .module
                .function(ctx.func)
                .block_at_index(index)
                .ok_or(ParseError::InvalidBasicBlockIndex { index, location }),
            _ => self.unexpected("a basic block"),
        }
    }

    fn parse_branch_arguments(&mut self, ctx: &mut FunctionContext) -> Result<Vec<Use>> {
        if self.eat(&TokenKind::LeftParen) {
            self.parse_use_list(ctx, &TokenKind::RightParen)
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_combinator(&mut self, ctx: &mut FunctionContext) -> Result<ReductionCombinator> {
        let location = self.location();
        match self.peek_kind().cloned() {
            Some(TokenKind::Opcode(Opcode::Binary(op))) => {
                self.pos += 1;
                Ok(ReductionCombinator::Numeric(op))
            }
            Some(TokenKind::Opcode(Opcode::BooleanBinary(op))) => {
                self.pos += 1;
                Ok(ReductionCombinator::Boolean(op))
            }
            Some(TokenKind::Str(key)) => {
                self.pos += 1;
                if self.module.intrinsics().intrinsic(&key).is_none() {
                    return Err(ParseError::UndefinedIntrinsic {
                        name: key,
                        location,
                    });
                }
                Ok(ReductionCombinator::NumericBuiltin(key))
            }
            Some(_) if self.starts_use() => {
                Ok(ReductionCombinator::Function(self.parse_use(ctx)?))
            }
            _ => Err(ParseError::InvalidReductionCombinator { location }),
        }
    }

    fn parse_element_keys(&mut self, ctx: &mut FunctionContext) -> Result<Vec<ElementKey>> {
        let mut keys = Vec::new();
        loop {
            match self.peek_kind().cloned() {
                Some(TokenKind::Identifier(IdentifierKind::StructField, name)) => {
                    self.pos += 1;
                    keys.push(ElementKey::Name(name));
                }
                Some(TokenKind::Integer(value)) if value >= 0 => {
                    // An index, unless a type annotation follows and
                    // makes it a scalar literal use.
                    if self.tokens.get(self.pos + 1).map(|t| &t.kind)
                        == Some(&TokenKind::Colon)
                    {
                        keys.push(ElementKey::Value(self.parse_use(ctx)?));
                    } else {
                        self.pos += 1;
                        keys.push(ElementKey::Index(value as usize));
                    }
                }
                _ => {
                    keys.push(ElementKey::Value(self.parse_use(ctx)?));
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(keys)
    }

    fn parse_instruction_kind(&mut self, ctx: &mut FunctionContext) -> Result<InstructionKind> {
        let opcode = match self.peek_kind().cloned() {
            Some(TokenKind::Opcode(opcode)) => {
                self.pos += 1;
                opcode
            }
            _ => return self.unexpected("an opcode"),
        };
        let kind = match opcode {
            Opcode::Literal => {
                let literal = self.parse_literal_body(ctx)?;
                self.expect(TokenKind::Colon, ":")?;
                let ty = self.parse_type()?;
                InstructionKind::Literal(literal, ty)
            }
            Opcode::Unary(op) => InstructionKind::NumericUnary(op, self.parse_use(ctx)?),
            Opcode::Binary(op) => {
                let a = self.parse_use(ctx)?;
                self.expect(TokenKind::Comma, ",")?;
                let b = self.parse_use(ctx)?;
                InstructionKind::NumericBinary(op, a, b)
            }
            Opcode::BooleanBinary(op) => {
                let a = self.parse_use(ctx)?;
                self.expect(TokenKind::Comma, ",")?;
                let b = self.parse_use(ctx)?;
                InstructionKind::BooleanBinary(op, a, b)
            }
            Opcode::Compare(op) => {
                let a = self.parse_use(ctx)?;
                self.expect(TokenKind::Comma, ",")?;
                let b = self.parse_use(ctx)?;
                InstructionKind::Compare(op, a, b)
            }
            Opcode::Not => InstructionKind::Not(self.parse_use(ctx)?),
            Opcode::Dot => {
                let a = self.parse_use(ctx)?;
                self.expect(TokenKind::Comma, ",")?;
                let b = self.parse_use(ctx)?;
                InstructionKind::Dot(a, b)
            }
            Opcode::Concatenate => {
                let mut operands = vec![self.parse_use(ctx)?];
                while self.eat(&TokenKind::Comma) {
                    operands.push(self.parse_use(ctx)?);
                }
                self.expect_keyword(Keyword::Along, "along")?;
                let (axis, _) = self.expect_integer("axis")?;
                InstructionKind::Concatenate(operands, axis)
            }
            Opcode::Transpose => InstructionKind::Transpose(self.parse_use(ctx)?),
            Opcode::Reverse => {
                let operand = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::Along, "along")?;
                InstructionKind::Reverse(operand, self.parse_index_list()?)
            }
            Opcode::Slice => {
                let operand = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::From, "from")?;
                let (lower, _) = self.expect_integer("lower bound")?;
                self.expect_keyword(Keyword::Upto, "upto")?;
                let (upper, _) = self.expect_integer("upper bound")?;
                InstructionKind::Slice(operand, lower, upper)
            }
            Opcode::Random => {
                let shape = self.parse_shape()?;
                self.expect_keyword(Keyword::From, "from")?;
                let lo = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::Upto, "upto")?;
                let hi = self.parse_use(ctx)?;
                InstructionKind::Random(shape, lo, hi)
            }
            Opcode::Select => {
                let left = self.parse_use(ctx)?;
                self.expect(TokenKind::Comma, ",")?;
                let right = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::By, "by")?;
                let flags = self.parse_use(ctx)?;
                InstructionKind::Select(left, right, flags)
            }
            Opcode::Reduce => {
                let combinator = self.parse_combinator(ctx)?;
                let operand = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::Init, "init")?;
                let initial = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::Along, "along")?;
                let dimensions = self.parse_index_list()?;
                InstructionKind::Reduce {
                    combinator,
                    operand,
                    initial,
                    dimensions,
                }
            }
            Opcode::Scan => {
                let combinator = self.parse_combinator(ctx)?;
                let operand = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::Along, "along")?;
                let dimensions = self.parse_index_list()?;
                InstructionKind::Scan {
                    combinator,
                    operand,
                    dimensions,
                }
            }
            Opcode::ReduceWindow => {
                let combinator = self.parse_combinator(ctx)?;
                let operand = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::Init, "init")?;
                let initial = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::Dims, "dims")?;
                let dimensions = self.parse_shape()?;
                self.expect_keyword(Keyword::Strides, "strides")?;
                let strides = self.parse_index_list()?;
                self.expect_keyword(Keyword::Padding, "padding")?;
                let padding = if self.eat_keyword(Keyword::None) {
                    Padding::None
                } else if self.eat_keyword(Keyword::Half) {
                    Padding::Half
                } else {
                    return self.unexpected("none or half");
                };
                InstructionKind::ReduceWindow {
                    combinator,
                    operand,
                    initial,
                    dimensions,
                    strides,
                    padding,
                }
            }
            Opcode::Convolve => {
                let operand = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::Kernel, "kernel")?;
                let kernel = self.parse_use(ctx)?;
                let mut strides = None;
                let mut padding = None;
                let mut left_dilation = None;
                let mut right_dilation = None;
                let mut groups = None;
                if self.eat_keyword(Keyword::Strides) {
                    strides = Some(self.parse_index_list()?);
                }
                if self.eat_keyword(Keyword::Padding) {
                    let mut pairs = Vec::new();
                    loop {
                        self.expect(TokenKind::LeftParen, "(")?;
                        let (low, _) = self.expect_integer("padding")?;
                        self.expect(TokenKind::Comma, ",")?;
                        let (high, _) = self.expect_integer("padding")?;
                        self.expect(TokenKind::RightParen, ")")?;
                        pairs.push((low, high));
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    padding = Some(pairs);
                }
                if self.eat_keyword(Keyword::LeftDilation) {
                    left_dilation = Some(self.parse_index_list()?);
                }
                if self.eat_keyword(Keyword::RightDilation) {
                    right_dilation = Some(self.parse_index_list()?);
                }
                if self.eat_keyword(Keyword::Groups) {
                    groups = Some(self.expect_integer("groups")?.0);
                }
                InstructionKind::Convolve {
                    operand,
                    kernel,
                    strides,
                    padding,
                    left_dilation,
                    right_dilation,
                    groups,
                }
            }
            Opcode::Rank => {
                self.expect_keyword(Keyword::Of, "of")?;
                InstructionKind::Rank(self.parse_use(ctx)?)
            }
            Opcode::Shape => {
                self.expect_keyword(Keyword::Of, "of")?;
                InstructionKind::Shape(self.parse_use(ctx)?)
            }
            Opcode::UnitCount => {
                self.expect_keyword(Keyword::Of, "of")?;
                InstructionKind::UnitCount(self.parse_use(ctx)?)
            }
            Opcode::PadShape => {
                let operand = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::At, "at")?;
                InstructionKind::PadShape(operand, self.expect_integer("index")?.0)
            }
            Opcode::SqueezeShape => {
                let operand = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::At, "at")?;
                InstructionKind::SqueezeShape(operand, self.expect_integer("index")?.0)
            }
            Opcode::ShapeCast => {
                let operand = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::To, "to")?;
                InstructionKind::ShapeCast(operand, self.parse_shape()?)
            }
            Opcode::BitCast => {
                let operand = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::To, "to")?;
                InstructionKind::BitCast(operand, self.parse_type()?)
            }
            Opcode::DataTypeCast => {
                let operand = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::To, "to")?;
                let dtype = match self.peek_kind().cloned() {
                    Some(TokenKind::DataType(dtype)) => {
                        self.pos += 1;
                        dtype
                    }
                    Some(TokenKind::Keyword(Keyword::Bool)) => {
                        self.pos += 1;
                        crate::ir::shape::DataType::Bool
                    }
                    _ => return self.unexpected("data type"),
                };
                InstructionKind::DataTypeCast(operand, dtype)
            }
            Opcode::Extract => {
                let keys = self.parse_element_keys(ctx)?;
                self.expect_keyword(Keyword::From, "from")?;
                let source = self.parse_use(ctx)?;
                InstructionKind::Extract { source, keys }
            }
            Opcode::Insert => {
                let source = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::To, "to")?;
                let destination = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::At, "at")?;
                let keys = self.parse_element_keys(ctx)?;
                InstructionKind::Insert {
                    source,
                    destination,
                    keys,
                }
            }
            Opcode::Apply => {
                let callee = self.parse_use(ctx)?;
                self.expect(TokenKind::LeftParen, "(")?;
                let arguments = self.parse_use_list(ctx, &TokenKind::RightParen)?;
                InstructionKind::Apply { callee, arguments }
            }
            Opcode::AllocateStack => {
                let ty = self.parse_type()?;
                self.expect_keyword(Keyword::By, "by")?;
                InstructionKind::AllocateStack(ty, self.expect_integer("count")?.0)
            }
            Opcode::AllocateHeap => {
                let ty = self.parse_type()?;
                self.expect_keyword(Keyword::Count, "count")?;
                InstructionKind::AllocateHeap(ty, self.parse_use(ctx)?)
            }
            Opcode::AllocateBox => InstructionKind::AllocateBox(self.parse_type()?),
            Opcode::ProjectBox => InstructionKind::ProjectBox(self.parse_use(ctx)?),
            Opcode::Load => InstructionKind::Load(self.parse_use(ctx)?),
            Opcode::Store => {
                let value = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::To, "to")?;
                let destination = self.parse_use(ctx)?;
                InstructionKind::Store { value, destination }
            }
            Opcode::ElementPointer => {
                let pointer = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::At, "at")?;
                InstructionKind::ElementPointer(pointer, self.parse_element_keys(ctx)?)
            }
            Opcode::Copy => {
                self.expect_keyword(Keyword::From, "from")?;
                let source = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::To, "to")?;
                let destination = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::Count, "count")?;
                let count = self.parse_use(ctx)?;
                InstructionKind::Copy {
                    source,
                    destination,
                    count,
                }
            }
            Opcode::CreateStack => InstructionKind::CreateStack,
            Opcode::DestroyStack => InstructionKind::DestroyStack(self.parse_use(ctx)?),
            Opcode::Push => {
                let value = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::To, "to")?;
                let stack = self.parse_use(ctx)?;
                InstructionKind::Push { value, stack }
            }
            Opcode::Pop => {
                let ty = self.parse_type()?;
                self.expect_keyword(Keyword::From, "from")?;
                InstructionKind::Pop(ty, self.parse_use(ctx)?)
            }
            Opcode::Retain => InstructionKind::Retain(self.parse_use(ctx)?),
            Opcode::Release => InstructionKind::Release(self.parse_use(ctx)?),
            Opcode::Deallocate => InstructionKind::Deallocate(self.parse_use(ctx)?),
            Opcode::Branch => {
                let block = self.parse_block_ref(ctx)?;
                let arguments = self.parse_branch_arguments(ctx)?;
                InstructionKind::Branch(block, arguments)
            }
            Opcode::Conditional => {
                let condition = self.parse_use(ctx)?;
                self.expect_keyword(Keyword::Then, "then")?;
                let then_block = self.parse_block_ref(ctx)?;
                let then_arguments = self.parse_branch_arguments(ctx)?;
                self.expect_keyword(Keyword::Else, "else")?;
                let else_block = self.parse_block_ref(ctx)?;
                let else_arguments = self.parse_branch_arguments(ctx)?;
                InstructionKind::Conditional {
                    condition,
                    then_block,
                    then_arguments,
                    else_block,
                    else_arguments,
                }
            }
            Opcode::BranchEnum => {
                let operand = self.parse_use(ctx)?;
                let mut cases = Vec::new();
                while self.eat_keyword(Keyword::Case) {
                    let (case, _) =
                        self.expect_identifier(IdentifierKind::EnumCase, "case name")?;
                    let block = self.parse_block_ref(ctx)?;
                    cases.push((case, block));
                }
                InstructionKind::BranchEnum(operand, cases)
            }
            Opcode::Return => {
                if self.starts_use() {
                    InstructionKind::Return(Some(self.parse_use(ctx)?))
                } else {
                    InstructionKind::Return(None)
                }
            }
            Opcode::Trap => InstructionKind::Trap,
            Opcode::Builtin => {
                let key_location = self.location();
                let key = match self.peek_kind().cloned() {
                    Some(TokenKind::Str(key)) => {
                        self.pos += 1;
                        key
                    }
                    _ => return self.unexpected("intrinsic name"),
                };
                if self.module.intrinsics().intrinsic(&key).is_none() {
                    return Err(ParseError::UndefinedIntrinsic {
                        name: key,
                        location: key_location,
                    });
                }
                self.expect(TokenKind::LeftParen, "(")?;
                let arguments = self.parse_use_list(ctx, &TokenKind::RightParen)?;
                InstructionKind::Builtin(key, arguments)
            }
        };
        Ok(kind)
    }
}

/// The resolved body of an operand before its type annotation is
/// checked. A deferred body points at a placeholder slot whose
/// annotation is re-checked once the slot is filled.
enum UseBody {
    Definition(Definition),
    Deferred(InstId),
    Literal(Literal),
}
