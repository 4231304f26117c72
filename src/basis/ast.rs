//! Abstract syntax tree for parsed basis expressions.
//!
//! Each node carries a source `Span` for error reporting.

use crate::basis::error::Span;

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AstBinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AstExpr {
    pub kind: AstExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstExprKind {
    NumberLit(f64),
    Ident(String),
    Neg(Box<AstExpr>),
    BinOp {
        op: AstBinOp,
        lhs: Box<AstExpr>,
        rhs: Box<AstExpr>,
    },
    FnCall {
        name: String,
        args: Vec<AstExpr>,
    },
}

/// Parsed basis: one expression per regression term.
#[derive(Debug, Clone, PartialEq)]
pub struct BasisAst {
    pub terms: Vec<AstExpr>,
}
