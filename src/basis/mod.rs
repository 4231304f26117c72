//! Basis-function expressions for least-squares regression.
//!
//! A basis is written as a sum of terms, for example
//! `1 + x_st + x_sw + x_lt + x_st**2 + s * x_lt`. Each top-level term becomes one regressor.
//! The text is compiled once, lex → parse → compile to slot-indexed IR, and then evaluated
//! per path and per period without allocation.
//!
//! ```rust
//! use ferric_storage::basis::BasisFunctions;
//!
//! let basis = BasisFunctions::parse("1 + x**2 + max(x, 0)", &["x"]).unwrap();
//! let mut out = [0.0; 3];
//! basis.evaluate_into(&[-2.0], &mut out);
//! assert_eq!(out, [1.0, 4.0, 0.0]);
//! ```

pub mod ast;
pub mod compiler;
pub mod error;
pub mod eval;
pub mod ir;
pub mod lexer;
pub mod parser;

pub use error::{BasisError, Span};
pub use ir::{BinOp, BuiltinFn, Expr};

/// Compiled regression basis over a fixed set of named variables.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BasisFunctions {
    source: String,
    variables: Vec<String>,
    terms: Vec<Expr>,
}

impl BasisFunctions {
    /// Compiles `source` with identifiers resolved against `variables` (slot = position).
    pub fn parse(source: &str, variables: &[&str]) -> Result<Self, BasisError> {
        let tokens = lexer::tokenize(source)?;
        let ast = parser::parse(tokens, source.len())?;
        let terms = compiler::compile(&ast, variables)?;
        Ok(Self {
            source: source.to_string(),
            variables: variables.iter().map(|v| v.to_string()).collect(),
            terms,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn terms(&self) -> &[Expr] {
        &self.terms
    }

    /// Number of regressors.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether any term is a constant (an intercept).
    pub fn has_intercept(&self) -> bool {
        self.terms.iter().any(Expr::is_constant)
    }

    /// Writes each term's value for the variable values `vars` into `out`.
    #[inline]
    pub fn evaluate_into(&self, vars: &[f64], out: &mut [f64]) {
        for (slot, term) in out.iter_mut().zip(&self.terms) {
            *slot = eval::eval(term, vars);
        }
    }
}
