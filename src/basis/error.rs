//! Basis expression errors with span-based diagnostics.

use crate::core::ValuationError;

/// Byte range in the basis source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Errors produced while lexing, parsing or compiling a basis expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BasisError {
    /// Unexpected character or malformed number.
    #[error("lex error at {}-{}: {message}", .span.start, .span.end)]
    LexError { message: String, span: Span },
    /// Unexpected token or missing construct.
    #[error("parse error at {}-{}: {message}", .span.start, .span.end)]
    ParseError { message: String, span: Span },
    /// Unknown variable or function, or wrong argument count.
    #[error("compile error at {}-{}: {message}", .span.start, .span.end)]
    CompileError { message: String, span: Span },
}

impl BasisError {
    pub fn span(&self) -> Span {
        match self {
            Self::LexError { span, .. }
            | Self::ParseError { span, .. }
            | Self::CompileError { span, .. } => *span,
        }
    }
}

impl From<BasisError> for ValuationError {
    fn from(e: BasisError) -> Self {
        ValuationError::Validation(format!("basis functions: {e}"))
    }
}
