//! Compiled form of a basis term.
//!
//! Variables are resolved to slot indices so evaluation is array indexing on the hot path.

use serde::{Deserialize, Serialize};

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Built-in function calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuiltinFn {
    /// `min(a, b)`.
    Min,
    /// `max(a, b)`.
    Max,
    /// `abs(x)`.
    Abs,
    /// `exp(x)`.
    Exp,
    /// `log(x)`.
    Log,
    /// `sqrt(x)`.
    Sqrt,
}

impl BuiltinFn {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "abs" => Some(Self::Abs),
            "exp" => Some(Self::Exp),
            "log" | "ln" => Some(Self::Log),
            "sqrt" => Some(Self::Sqrt),
            _ => None,
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Self::Min | Self::Max => 2,
            Self::Abs | Self::Exp | Self::Log | Self::Sqrt => 1,
        }
    }
}

/// Expression in the IR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Literal constant.
    Const(f64),
    /// Variable by slot index.
    Var(usize),
    Neg(Box<Expr>),
    BinOp {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Power with a small integer exponent.
    Powi(Box<Expr>, i32),
    Call {
        func: BuiltinFn,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Whether the expression reads any variable.
    pub fn is_constant(&self) -> bool {
        match self {
            Self::Const(_) => true,
            Self::Var(_) => false,
            Self::Neg(e) | Self::Powi(e, _) => e.is_constant(),
            Self::BinOp { lhs, rhs, .. } => lhs.is_constant() && rhs.is_constant(),
            Self::Call { args, .. } => args.iter().all(Expr::is_constant),
        }
    }
}
