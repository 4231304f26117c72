//! Tree-walking evaluator for compiled basis terms.

use crate::basis::ir::{BinOp, BuiltinFn, Expr};

/// Evaluates `expr` with variable slots read from `vars`.
#[inline]
pub fn eval(expr: &Expr, vars: &[f64]) -> f64 {
    match expr {
        Expr::Const(c) => *c,
        Expr::Var(slot) => vars[*slot],
        Expr::Neg(e) => -eval(e, vars),
        Expr::Powi(base, n) => eval(base, vars).powi(*n),
        Expr::BinOp { op, lhs, rhs } => {
            let a = eval(lhs, vars);
            let b = eval(rhs, vars);
            match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                BinOp::Pow => a.powf(b),
            }
        }
        Expr::Call { func, args } => {
            let x = eval(&args[0], vars);
            match func {
                BuiltinFn::Min => x.min(eval(&args[1], vars)),
                BuiltinFn::Max => x.max(eval(&args[1], vars)),
                BuiltinFn::Abs => x.abs(),
                BuiltinFn::Exp => x.exp(),
                BuiltinFn::Log => x.ln(),
                BuiltinFn::Sqrt => x.sqrt(),
            }
        }
    }
}
