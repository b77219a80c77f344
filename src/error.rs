//! Error types for the Tela IR library.
//!
//! The three stage-specific taxonomies (lexical, parse, verification)
//! live with their stages; this module wraps them in the crate-level
//! error so the driver propagates everything through one `Result`.

use thiserror::Error;

use crate::parser::lexer::LexicalError;
use crate::parser::parser::ParseError;
use crate::verify::VerificationError;

/// Main error type for the Tela IR library.
#[derive(Debug, Error)]
pub enum TelaError {
    #[error("lexical error: {0}")]
    Lexical(#[from] LexicalError),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("verification error: {0}")]
    Verification(#[from] VerificationError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TelaError>;
