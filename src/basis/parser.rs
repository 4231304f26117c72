//! Recursive-descent parser for basis expressions.
//!
//! A `+` at the top level separates regression terms. Inside a term the usual precedence
//! applies, lowest first: `-` (binary), `*` and `/`, unary `-`, then right-associative `**`.
//! Parentheses and function arguments accept full arithmetic including `+`.

use crate::basis::ast::{AstBinOp, AstExpr, AstExprKind, BasisAst};
use crate::basis::error::{BasisError, Span};
use crate::basis::lexer::{Token, TokenKind};

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    source_len: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, source_len: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            source_len,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eof_span(&self) -> Span {
        Span::new(self.source_len, self.source_len)
    }

    fn current_span(&self) -> Span {
        self.peek().map_or_else(|| self.eof_span(), |t| t.span)
    }

    fn expect(&mut self, expected: &TokenKind) -> Result<Span, BasisError> {
        match self.peek() {
            Some(tok) if &tok.kind == expected => {
                let span = tok.span;
                self.pos += 1;
                Ok(span)
            }
            Some(tok) => Err(BasisError::ParseError {
                message: format!("expected {expected:?}, got {:?}", tok.kind),
                span: tok.span,
            }),
            None => Err(BasisError::ParseError {
                message: format!("expected {expected:?}, got end of input"),
                span: self.eof_span(),
            }),
        }
    }
}

/// Parse a token stream into one AST per basis term.
pub fn parse(tokens: Vec<Token>, source_len: usize) -> Result<BasisAst, BasisError> {
    let mut p = Parser::new(tokens, source_len);
    if p.peek().is_none() {
        return Err(BasisError::ParseError {
            message: "basis expression is empty".to_string(),
            span: p.eof_span(),
        });
    }

    let mut terms = vec![parse_difference(&mut p)?];
    while matches!(p.peek_kind(), Some(TokenKind::Plus)) {
        p.advance();
        terms.push(parse_difference(&mut p)?);
    }
    if let Some(tok) = p.peek() {
        return Err(BasisError::ParseError {
            message: format!("unexpected {:?} after basis term", tok.kind),
            span: tok.span,
        });
    }
    Ok(BasisAst { terms })
}

fn binary(op: AstBinOp, lhs: AstExpr, rhs: AstExpr) -> AstExpr {
    let span = Span::new(lhs.span.start, rhs.span.end);
    AstExpr {
        kind: AstExprKind::BinOp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    }
}

/// Full arithmetic, used inside parentheses and call arguments.
fn parse_expr(p: &mut Parser) -> Result<AstExpr, BasisError> {
    let mut left = parse_multiplicative(p)?;
    loop {
        let op = match p.peek_kind() {
            Some(TokenKind::Plus) => AstBinOp::Add,
            Some(TokenKind::Minus) => AstBinOp::Sub,
            _ => break,
        };
        p.advance();
        let right = parse_multiplicative(p)?;
        left = binary(op, left, right);
    }
    Ok(left)
}

/// A top-level term: subtraction binds within the term, `+` ends it.
fn parse_difference(p: &mut Parser) -> Result<AstExpr, BasisError> {
    let mut left = parse_multiplicative(p)?;
    while matches!(p.peek_kind(), Some(TokenKind::Minus)) {
        p.advance();
        let right = parse_multiplicative(p)?;
        left = binary(AstBinOp::Sub, left, right);
    }
    Ok(left)
}

fn parse_multiplicative(p: &mut Parser) -> Result<AstExpr, BasisError> {
    let mut left = parse_unary(p)?;
    loop {
        let op = match p.peek_kind() {
            Some(TokenKind::Star) => AstBinOp::Mul,
            Some(TokenKind::Slash) => AstBinOp::Div,
            _ => break,
        };
        p.advance();
        let right = parse_unary(p)?;
        left = binary(op, left, right);
    }
    Ok(left)
}

fn parse_unary(p: &mut Parser) -> Result<AstExpr, BasisError> {
    if matches!(p.peek_kind(), Some(TokenKind::Minus)) {
        let span = p.current_span();
        p.advance();
        let operand = parse_unary(p)?;
        let end = operand.span.end;
        return Ok(AstExpr {
            kind: AstExprKind::Neg(Box::new(operand)),
            span: Span::new(span.start, end),
        });
    }
    parse_power(p)
}

fn parse_power(p: &mut Parser) -> Result<AstExpr, BasisError> {
    let base = parse_primary(p)?;
    if matches!(p.peek_kind(), Some(TokenKind::Power)) {
        p.advance();
        let exponent = parse_unary(p)?;
        return Ok(binary(AstBinOp::Pow, base, exponent));
    }
    Ok(base)
}

fn parse_primary(p: &mut Parser) -> Result<AstExpr, BasisError> {
    let span = p.current_span();
    match p.peek_kind().cloned() {
        Some(TokenKind::Number(n)) => {
            p.advance();
            Ok(AstExpr {
                kind: AstExprKind::NumberLit(n),
                span,
            })
        }
        Some(TokenKind::LParen) => {
            p.advance();
            let expr = parse_expr(p)?;
            p.expect(&TokenKind::RParen)?;
            Ok(expr)
        }
        Some(TokenKind::Ident(name)) => {
            p.advance();
            if matches!(p.peek_kind(), Some(TokenKind::LParen)) {
                p.advance();
                let mut args = Vec::new();
                if !matches!(p.peek_kind(), Some(TokenKind::RParen)) {
                    args.push(parse_expr(p)?);
                    while matches!(p.peek_kind(), Some(TokenKind::Comma)) {
                        p.advance();
                        args.push(parse_expr(p)?);
                    }
                }
                let end = p.expect(&TokenKind::RParen)?;
                Ok(AstExpr {
                    kind: AstExprKind::FnCall { name, args },
                    span: Span::new(span.start, end.end),
                })
            } else {
                Ok(AstExpr {
                    kind: AstExprKind::Ident(name),
                    span,
                })
            }
        }
        Some(other) => Err(BasisError::ParseError {
            message: format!("expected number, variable or '(', got {other:?}"),
            span,
        }),
        None => Err(BasisError::ParseError {
            message: "unexpected end of input".to_string(),
            span,
        }),
    }
}
