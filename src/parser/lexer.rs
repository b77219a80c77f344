//! Lexer for the textual IR.
//!
//! Newlines (and `;`) are emitted as separator tokens; `//` starts a
//! line comment. Identifiers carry a kind encoded by their prefix
//! character: `@` global, `%` temporary, `'` basic block, `$` type,
//! `#` struct field, `?` enum case, `!` attribute. Anonymous forms
//! follow a digit: `@N`, `'N`, `%B.I` (instruction I of block B), and
//! `%B^I` (argument I of block B). A bare `x` (also inside `2x3`)
//! separates shape dimensions.

use std::fmt;

use thiserror::Error;

use crate::ir::function::Attribute;
use crate::ir::instruction::{
    BooleanBinaryOp, ComparisonOp, NumericBinaryOp, NumericUnaryOp,
};
use crate::ir::shape::{DataType, FloatPrecision};

/// A position in the source text, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Errors produced while tokenising.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexicalError {
    #[error("unexpected token {text:?} at {location}")]
    UnexpectedToken { text: String, location: SourceLocation },
    #[error("illegal number {text:?} at {location}")]
    IllegalNumber { text: String, location: SourceLocation },
    #[error("illegal identifier at {location}")]
    IllegalIdentifier { location: SourceLocation },
    #[error("invalid escape character {character:?} at {location}")]
    InvalidEscapeCharacter {
        character: char,
        location: SourceLocation,
    },
    #[error("unclosed string literal starting at {location}")]
    UnclosedStringLiteral { location: SourceLocation },
    #[error("expecting an identifier name at {location}")]
    ExpectingIdentifierName { location: SourceLocation },
    #[error("invalid anonymous local identifier at {location}")]
    InvalidAnonymousLocalIdentifier { location: SourceLocation },
    #[error("invalid basic block index at {location}")]
    InvalidBasicBlockIndex { location: SourceLocation },
    #[error("invalid anonymous identifier index at {location}")]
    InvalidAnonymousIdentifierIndex { location: SourceLocation },
    #[error("unknown attribute !{name} at {location}")]
    UnknownAttribute { name: String, location: SourceLocation },
}

/// The kind an identifier's prefix encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Global,
    Temporary,
    BasicBlock,
    Type,
    StructField,
    EnumCase,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierKind::Global => write!(f, "global"),
            IdentifierKind::Temporary => write!(f, "temporary"),
            IdentifierKind::BasicBlock => write!(f, "basic block"),
            IdentifierKind::Type => write!(f, "type"),
            IdentifierKind::StructField => write!(f, "struct field"),
            IdentifierKind::EnumCase => write!(f, "enum case"),
        }
    }
}

/// Structural keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Module,
    Stage,
    Raw,
    Optimizable,
    Type,
    Struct,
    Enum,
    Var,
    Func,
    Extern,
    Adjoint,
    From,
    Wrt,
    Keeping,
    Seedable,
    Void,
    Bool,
    Stack,
    Box,
    Tensor,
    Scalar,
    Then,
    Else,
    Case,
    Along,
    Init,
    Dims,
    Strides,
    Padding,
    None,
    Half,
    Kernel,
    LeftDilation,
    RightDilation,
    Groups,
    Of,
    At,
    To,
    By,
    Upto,
    Count,
    True,
    False,
    Undefined,
    Zero,
    Null,
}

impl Keyword {
    fn from_name(name: &str) -> Option<Keyword> {
        Some(match name {
            "module" => Keyword::Module,
            "stage" => Keyword::Stage,
            "raw" => Keyword::Raw,
            "optimizable" => Keyword::Optimizable,
            "type" => Keyword::Type,
            "struct" => Keyword::Struct,
            "enum" => Keyword::Enum,
            "var" => Keyword::Var,
            "func" => Keyword::Func,
            "extern" => Keyword::Extern,
            "adjoint" => Keyword::Adjoint,
            "from" => Keyword::From,
            "wrt" => Keyword::Wrt,
            "keeping" => Keyword::Keeping,
            "seedable" => Keyword::Seedable,
            "void" => Keyword::Void,
            "bool" => Keyword::Bool,
            "stack" => Keyword::Stack,
            "box" => Keyword::Box,
            "tensor" => Keyword::Tensor,
            "scalar" => Keyword::Scalar,
            "then" => Keyword::Then,
            "else" => Keyword::Else,
            "case" => Keyword::Case,
            "along" => Keyword::Along,
            "init" => Keyword::Init,
            "dims" => Keyword::Dims,
            "strides" => Keyword::Strides,
            "padding" => Keyword::Padding,
            "none" => Keyword::None,
            "half" => Keyword::Half,
            "kernel" => Keyword::Kernel,
            "leftDilation" => Keyword::LeftDilation,
            "rightDilation" => Keyword::RightDilation,
            "groups" => Keyword::Groups,
            "of" => Keyword::Of,
            "at" => Keyword::At,
            "to" => Keyword::To,
            "by" => Keyword::By,
            "upto" => Keyword::Upto,
            "count" => Keyword::Count,
            "true" => Keyword::True,
            "false" => Keyword::False,
            "undefined" => Keyword::Undefined,
            "zero" => Keyword::Zero,
            "null" => Keyword::Null,
            _ => return Option::None,
        })
    }
}

/// Instruction opcodes. Operator families carry their operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Opcode {
    Unary(NumericUnaryOp),
    Binary(NumericBinaryOp),
    BooleanBinary(BooleanBinaryOp),
    Compare(ComparisonOp),
    Literal,
    Not,
    Dot,
    Concatenate,
    Transpose,
    Reverse,
    Slice,
    Random,
    Select,
    Reduce,
    Scan,
    ReduceWindow,
    Convolve,
    Rank,
    Shape,
    UnitCount,
    PadShape,
    SqueezeShape,
    ShapeCast,
    BitCast,
    DataTypeCast,
    Extract,
    Insert,
    Apply,
    AllocateStack,
    AllocateHeap,
    AllocateBox,
    ProjectBox,
    Load,
    Store,
    ElementPointer,
    Copy,
    CreateStack,
    DestroyStack,
    Push,
    Pop,
    Retain,
    Release,
    Deallocate,
    Branch,
    Conditional,
    BranchEnum,
    Return,
    Trap,
    Builtin,
}

impl Opcode {
    fn from_name(name: &str) -> Option<Opcode> {
        if let Some(op) = NumericUnaryOp::from_name(name) {
            return Some(Opcode::Unary(op));
        }
        if let Some(op) = NumericBinaryOp::from_name(name) {
            return Some(Opcode::Binary(op));
        }
        if let Some(op) = BooleanBinaryOp::from_name(name) {
            return Some(Opcode::BooleanBinary(op));
        }
        if let Some(op) = ComparisonOp::from_name(name) {
            return Some(Opcode::Compare(op));
        }
        Some(match name {
            "literal" => Opcode::Literal,
            "not" => Opcode::Not,
            "dot" => Opcode::Dot,
            "concatenate" => Opcode::Concatenate,
            "transpose" => Opcode::Transpose,
            "reverse" => Opcode::Reverse,
            "slice" => Opcode::Slice,
            "random" => Opcode::Random,
            "select" => Opcode::Select,
            "reduce" => Opcode::Reduce,
            "scan" => Opcode::Scan,
            "reduceWindow" => Opcode::ReduceWindow,
            "convolve" => Opcode::Convolve,
            "rank" => Opcode::Rank,
            "shape" => Opcode::Shape,
            "unitCount" => Opcode::UnitCount,
            "padShape" => Opcode::PadShape,
            "squeezeShape" => Opcode::SqueezeShape,
            "shapeCast" => Opcode::ShapeCast,
            "bitCast" => Opcode::BitCast,
            "dataTypeCast" => Opcode::DataTypeCast,
            "extract" => Opcode::Extract,
            "insert" => Opcode::Insert,
            "apply" => Opcode::Apply,
            "allocateStack" => Opcode::AllocateStack,
            "allocateHeap" => Opcode::AllocateHeap,
            "allocateBox" => Opcode::AllocateBox,
            "projectBox" => Opcode::ProjectBox,
            "load" => Opcode::Load,
            "store" => Opcode::Store,
            "elementPointer" => Opcode::ElementPointer,
            "copy" => Opcode::Copy,
            "createStack" => Opcode::CreateStack,
            "destroyStack" => Opcode::DestroyStack,
            "push" => Opcode::Push,
            "pop" => Opcode::Pop,
            "retain" => Opcode::Retain,
            "release" => Opcode::Release,
            "deallocate" => Opcode::Deallocate,
            "branch" => Opcode::Branch,
            "conditional" => Opcode::Conditional,
            "branchEnum" => Opcode::BranchEnum,
            "return" => Opcode::Return,
            "trap" => Opcode::Trap,
            "builtin" => Opcode::Builtin,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// A newline or `;`.
    Newline,
    Comma,
    Colon,
    Equal,
    Arrow,
    Star,
    /// The dimension separator `x`.
    Times,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    LeftAngle,
    RightAngle,
    Keyword(Keyword),
    Opcode(Opcode),
    DataType(DataType),
    Identifier(IdentifierKind, String),
    /// `@N`
    AnonymousGlobal(usize),
    /// `'N`
    AnonymousBlock(usize),
    /// `%B.I`
    InstructionRef(usize, usize),
    /// `%B^I`
    ArgumentRef(usize, usize),
    Attribute(Attribute),
    Integer(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
}

struct Lexer<'a> {
    source: &'a [u8],
    position: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Lexer {
            source: source.as_bytes(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.position + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.position += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(byte)
    }

    fn scan_digits(&mut self) -> &'a str {
        let start = self.position;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.bump();
        }
        std::str::from_utf8(&self.source[start..self.position]).unwrap_or("")
    }

    fn scan_index(&mut self, location: SourceLocation) -> Result<usize, LexicalError> {
        let digits = self.scan_digits();
        digits
            .parse::<usize>()
            .map_err(|_| LexicalError::InvalidAnonymousIdentifierIndex { location })
    }

    fn scan_name(&mut self) -> String {
        let start = self.position;
        while matches!(
            self.peek(),
            Some(b) if b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
        ) {
            self.bump();
        }
        String::from_utf8_lossy(&self.source[start..self.position]).into_owned()
    }

    fn scan_prefixed(
        &mut self,
        prefix: u8,
        location: SourceLocation,
    ) -> Result<TokenKind, LexicalError> {
        if matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            return match prefix {
                b'@' => Ok(TokenKind::AnonymousGlobal(self.scan_index(location)?)),
                b'\'' => {
                    let digits = self.scan_digits();
                    let index = digits
                        .parse::<usize>()
                        .map_err(|_| LexicalError::InvalidBasicBlockIndex { location })?;
                    Ok(TokenKind::AnonymousBlock(index))
                }
                b'%' => {
                    let block = self.scan_index(location)?;
                    match self.peek() {
                        Some(b'.') => {
                            self.bump();
                            let index = self.scan_index(location)?;
                            Ok(TokenKind::InstructionRef(block, index))
                        }
                        Some(b'^') => {
                            self.bump();
                            let index = self.scan_index(location)?;
                            Ok(TokenKind::ArgumentRef(block, index))
                        }
                        _ => Err(LexicalError::InvalidAnonymousLocalIdentifier { location }),
                    }
                }
                _ => Err(LexicalError::ExpectingIdentifierName { location }),
            };
        }
        let name = self.scan_name();
        if name.is_empty() || name.starts_with('.') {
            return Err(LexicalError::ExpectingIdentifierName { location });
        }
        let kind = match prefix {
            b'@' => IdentifierKind::Global,
            b'%' => IdentifierKind::Temporary,
            b'\'' => IdentifierKind::BasicBlock,
            b'$' => IdentifierKind::Type,
            b'#' => IdentifierKind::StructField,
            b'?' => IdentifierKind::EnumCase,
            _ => return Err(LexicalError::IllegalIdentifier { location }),
        };
        Ok(TokenKind::Identifier(kind, name))
    }

    fn scan_number(&mut self, negative: bool, location: SourceLocation) -> Result<TokenKind, LexicalError> {
        let start = self.position;
        self.scan_digits();
        let mut float = false;
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b) if b.is_ascii_digit()) {
            float = true;
            self.bump();
            self.scan_digits();
        }
        let text = std::str::from_utf8(&self.source[start..self.position])
            .unwrap_or("")
            .to_string();
        if float {
            let value: f64 = text
                .parse()
                .map_err(|_| LexicalError::IllegalNumber {
                    text: text.clone(),
                    location,
                })?;
            Ok(TokenKind::Float(if negative { -value } else { value }))
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| LexicalError::IllegalNumber {
                    text: text.clone(),
                    location,
                })?;
            Ok(TokenKind::Integer(if negative { -value } else { value }))
        }
    }

    fn scan_string(&mut self, location: SourceLocation) -> Result<TokenKind, LexicalError> {
        let mut value = String::new();
        loop {
            match self.bump() {
                Option::None | Some(b'\n') => {
                    return Err(LexicalError::UnclosedStringLiteral { location });
                }
                Some(b'"') => return Ok(TokenKind::Str(value)),
                Some(b'\\') => {
                    let escaped = self
                        .bump()
                        .ok_or(LexicalError::UnclosedStringLiteral { location })?;
                    match escaped {
                        b'"' => value.push('"'),
                        b'\\' => value.push('\\'),
                        b'n' => value.push('\n'),
                        b't' => value.push('\t'),
                        b'r' => value.push('\r'),
                        other => {
                            return Err(LexicalError::InvalidEscapeCharacter {
                                character: other as char,
                                location: self.location(),
                            });
                        }
                    }
                }
                Some(other) => value.push(other as char),
            }
        }
    }

    fn classify_word(&self, word: &str, location: SourceLocation) -> Result<TokenKind, LexicalError> {
        if let Some(keyword) = Keyword::from_name(word) {
            return Ok(TokenKind::Keyword(keyword));
        }
        if let Some(opcode) = Opcode::from_name(word) {
            return Ok(TokenKind::Opcode(opcode));
        }
        match word {
            "f16" => return Ok(TokenKind::DataType(DataType::Float(FloatPrecision::Half))),
            "f32" => return Ok(TokenKind::DataType(DataType::Float(FloatPrecision::Single))),
            "f64" => return Ok(TokenKind::DataType(DataType::Float(FloatPrecision::Double))),
            _ => {}
        }
        if let Some(width) = word.strip_prefix('i') {
            if !width.is_empty() && width.bytes().all(|b| b.is_ascii_digit()) {
                let width: u32 = width.parse().map_err(|_| LexicalError::IllegalNumber {
                    text: word.to_string(),
                    location,
                })?;
                return Ok(TokenKind::DataType(DataType::Int(width)));
            }
        }
        Err(LexicalError::UnexpectedToken {
            text: word.to_string(),
            location,
        })
    }

    fn next_token(&mut self) -> Result<Option<Token>, LexicalError> {
        loop {
            let location = self.location();
            let byte = match self.peek() {
                Some(byte) => byte,
                Option::None => return Ok(Option::None),
            };
            let kind = match byte {
                b' ' | b'\t' | b'\r' => {
                    self.bump();
                    continue;
                }
                b'/' if self.peek_at(1) == Some(b'/') => {
                    while !matches!(self.peek(), Option::None | Some(b'\n')) {
                        self.bump();
                    }
                    continue;
                }
                b'\n' | b';' => {
                    self.bump();
                    TokenKind::Newline
                }
                b',' => {
                    self.bump();
                    TokenKind::Comma
                }
                b':' => {
                    self.bump();
                    TokenKind::Colon
                }
                b'=' => {
                    self.bump();
                    TokenKind::Equal
                }
                b'*' => {
                    self.bump();
                    TokenKind::Star
                }
                b'(' => {
                    self.bump();
                    TokenKind::LeftParen
                }
                b')' => {
                    self.bump();
                    TokenKind::RightParen
                }
                b'[' => {
                    self.bump();
                    TokenKind::LeftBracket
                }
                b']' => {
                    self.bump();
                    TokenKind::RightBracket
                }
                b'{' => {
                    self.bump();
                    TokenKind::LeftBrace
                }
                b'}' => {
                    self.bump();
                    TokenKind::RightBrace
                }
                b'<' => {
                    self.bump();
                    TokenKind::LeftAngle
                }
                b'>' => {
                    self.bump();
                    TokenKind::RightAngle
                }
                b'-' => {
                    self.bump();
                    if self.peek() == Some(b'>') {
                        self.bump();
                        TokenKind::Arrow
                    } else if matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                        self.scan_number(true, location)?
                    } else {
                        return Err(LexicalError::UnexpectedToken {
                            text: "-".to_string(),
                            location,
                        });
                    }
                }
                b'"' => {
                    self.bump();
                    self.scan_string(location)?
                }
                b'@' | b'%' | b'\'' | b'$' | b'#' | b'?' => {
                    self.bump();
                    self.scan_prefixed(byte, location)?
                }
                b'!' => {
                    self.bump();
                    let name = self.scan_name();
                    match Attribute::from_name(&name) {
                        Some(attribute) => TokenKind::Attribute(attribute),
                        Option::None => {
                            return Err(LexicalError::UnknownAttribute { name, location });
                        }
                    }
                }
                // `x` separates dimensions when not followed by a word
                // character; `2x3` lexes as 2, x, 3.
                b'x' if !matches!(
                    self.peek_at(1),
                    Some(b) if b.is_ascii_alphabetic() || b == b'_'
                ) =>
                {
                    self.bump();
                    TokenKind::Times
                }
                b if b.is_ascii_digit() => self.scan_number(false, location)?,
                b if b.is_ascii_alphabetic() || b == b'_' => {
                    let start = self.position;
                    while matches!(
                        self.peek(),
                        Some(b) if b.is_ascii_alphanumeric() || b == b'_'
                    ) {
                        self.bump();
                    }
                    let word = std::str::from_utf8(&self.source[start..self.position])
                        .unwrap_or("")
                        .to_string();
                    self.classify_word(&word, location)?
                }
                other => {
                    return Err(LexicalError::UnexpectedToken {
                        text: (other as char).to_string(),
                        location,
                    });
                }
            };
            return Ok(Some(Token { kind, location }));
        }
    }
}

/// Tokenises a whole source text.
pub fn lex(source: &str) -> Result<Vec<Token>, LexicalError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).expect("lexing failed").into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_lex_header() {
        assert_eq!(
            kinds("module \"m\"\nstage raw"),
            vec![
                TokenKind::Keyword(Keyword::Module),
                TokenKind::Str("m".to_string()),
                TokenKind::Newline,
                TokenKind::Keyword(Keyword::Stage),
                TokenKind::Keyword(Keyword::Raw),
            ]
        );
    }

    #[test]
    fn test_lex_tensor_type() {
        assert_eq!(
            kinds("tensor<2x3 x i32>"),
            vec![
                TokenKind::Keyword(Keyword::Tensor),
                TokenKind::LeftAngle,
                TokenKind::Integer(2),
                TokenKind::Times,
                TokenKind::Integer(3),
                TokenKind::Times,
                TokenKind::DataType(DataType::Int(32)),
                TokenKind::RightAngle,
            ]
        );
    }

    #[test]
    fn test_lex_identifiers() {
        assert_eq!(
            kinds("@f %x 'entry $T #field ?some"),
            vec![
                TokenKind::Identifier(IdentifierKind::Global, "f".to_string()),
                TokenKind::Identifier(IdentifierKind::Temporary, "x".to_string()),
                TokenKind::Identifier(IdentifierKind::BasicBlock, "entry".to_string()),
                TokenKind::Identifier(IdentifierKind::Type, "T".to_string()),
                TokenKind::Identifier(IdentifierKind::StructField, "field".to_string()),
                TokenKind::Identifier(IdentifierKind::EnumCase, "some".to_string()),
            ]
        );
    }

    #[test]
    fn test_lex_anonymous_forms() {
        assert_eq!(
            kinds("@3 '1 %0.2 %1^0"),
            vec![
                TokenKind::AnonymousGlobal(3),
                TokenKind::AnonymousBlock(1),
                TokenKind::InstructionRef(0, 2),
                TokenKind::ArgumentRef(1, 0),
            ]
        );
    }

    #[test]
    fn test_lex_numbers() {
        assert_eq!(
            kinds("42 -7 1.5 -2.25"),
            vec![
                TokenKind::Integer(42),
                TokenKind::Integer(-7),
                TokenKind::Float(1.5),
                TokenKind::Float(-2.25),
            ]
        );
    }

    #[test]
    fn test_lex_string_escapes() {
        assert_eq!(
            kinds(r#""a\"b\\c\n""#),
            vec![TokenKind::Str("a\"b\\c\n".to_string())]
        );
        assert!(matches!(
            lex("\"unclosed"),
            Err(LexicalError::UnclosedStringLiteral { .. })
        ));
        assert!(matches!(
            lex(r#""bad \q escape""#),
            Err(LexicalError::InvalidEscapeCharacter { character: 'q', .. })
        ));
    }

    #[test]
    fn test_lex_comments_and_separators() {
        assert_eq!(
            kinds("trap // a comment\ntrap ; trap"),
            vec![
                TokenKind::Opcode(Opcode::Trap),
                TokenKind::Newline,
                TokenKind::Opcode(Opcode::Trap),
                TokenKind::Newline,
                TokenKind::Opcode(Opcode::Trap),
            ]
        );
    }

    #[test]
    fn test_lex_attribute() {
        assert_eq!(
            kinds("!inline"),
            vec![TokenKind::Attribute(Attribute::Inline)]
        );
        assert!(matches!(
            lex("!fast"),
            Err(LexicalError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn test_lex_arrow_and_function_type() {
        assert_eq!(
            kinds("(i32) -> i32"),
            vec![
                TokenKind::LeftParen,
                TokenKind::DataType(DataType::Int(32)),
                TokenKind::RightParen,
                TokenKind::Arrow,
                TokenKind::DataType(DataType::Int(32)),
            ]
        );
    }

    #[test]
    fn test_lex_rejects_stray_character() {
        assert!(matches!(
            lex("&"),
            Err(LexicalError::UnexpectedToken { .. })
        ));
    }
}
