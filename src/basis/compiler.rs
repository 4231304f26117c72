//! Lowers the basis AST to slot-indexed IR.

use crate::basis::ast::{AstBinOp, AstExpr, AstExprKind, BasisAst};
use crate::basis::error::BasisError;
use crate::basis::ir::{BinOp, BuiltinFn, Expr};

const MAX_INTEGER_POWER: f64 = 64.0;

/// Compiles every term, resolving identifiers against `variables`.
pub fn compile(ast: &BasisAst, variables: &[&str]) -> Result<Vec<Expr>, BasisError> {
    ast.terms
        .iter()
        .map(|term| compile_expr(term, variables))
        .collect()
}

fn compile_expr(expr: &AstExpr, variables: &[&str]) -> Result<Expr, BasisError> {
    match &expr.kind {
        AstExprKind::NumberLit(n) => Ok(Expr::Const(*n)),
        AstExprKind::Ident(name) => variables
            .iter()
            .position(|v| v == name)
            .map(Expr::Var)
            .ok_or_else(|| BasisError::CompileError {
                message: format!(
                    "unknown variable `{name}`; expected one of {}",
                    variables.join(", ")
                ),
                span: expr.span,
            }),
        AstExprKind::Neg(operand) => Ok(Expr::Neg(Box::new(compile_expr(operand, variables)?))),
        AstExprKind::BinOp { op, lhs, rhs } => {
            let lhs = compile_expr(lhs, variables)?;
            let rhs = compile_expr(rhs, variables)?;
            let op = match op {
                AstBinOp::Add => BinOp::Add,
                AstBinOp::Sub => BinOp::Sub,
                AstBinOp::Mul => BinOp::Mul,
                AstBinOp::Div => BinOp::Div,
                AstBinOp::Pow => match &rhs {
                    Expr::Const(e) if e.fract() == 0.0 && e.abs() <= MAX_INTEGER_POWER => {
                        return Ok(Expr::Powi(Box::new(lhs), *e as i32));
                    }
                    _ => BinOp::Pow,
                },
            };
            Ok(Expr::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            })
        }
        AstExprKind::FnCall { name, args } => {
            let func = BuiltinFn::lookup(name).ok_or_else(|| BasisError::CompileError {
                message: format!("unknown function `{name}`"),
                span: expr.span,
            })?;
            if args.len() != func.arity() {
                return Err(BasisError::CompileError {
                    message: format!(
                        "`{name}` takes {} argument(s), got {}",
                        func.arity(),
                        args.len()
                    ),
                    span: expr.span,
                });
            }
            let args = args
                .iter()
                .map(|a| compile_expr(a, variables))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::Call { func, args })
        }
    }
}
