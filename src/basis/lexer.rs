//! Tokenizer for basis expressions.

use crate::basis::error::{BasisError, Span};

/// Token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Token types.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    /// `**`
    Power,
    Slash,
    LParen,
    RParen,
    Comma,
}

/// Tokenize basis source text; whitespace of any kind separates tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>, BasisError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let ch = bytes[pos];
        if ch.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        let start = pos;

        if ch.is_ascii_digit() || (ch == b'.' && pos + 1 < bytes.len() && bytes[pos + 1].is_ascii_digit())
        {
            let (num, end) = lex_number(source, pos)?;
            tokens.push(Token {
                kind: TokenKind::Number(num),
                span: Span::new(start, end),
            });
            pos = end;
            continue;
        }

        if ch.is_ascii_alphabetic() || ch == b'_' {
            let end = lex_ident_end(source, pos);
            tokens.push(Token {
                kind: TokenKind::Ident(source[start..end].to_string()),
                span: Span::new(start, end),
            });
            pos = end;
            continue;
        }

        let (kind, len) = match ch {
            b'*' if bytes.get(pos + 1) == Some(&b'*') => (TokenKind::Power, 2),
            b'*' => (TokenKind::Star, 1),
            b'+' => (TokenKind::Plus, 1),
            b'-' => (TokenKind::Minus, 1),
            b'/' => (TokenKind::Slash, 1),
            b'(' => (TokenKind::LParen, 1),
            b')' => (TokenKind::RParen, 1),
            b',' => (TokenKind::Comma, 1),
            _ => {
                let c = source[pos..].chars().next().unwrap_or('?');
                return Err(BasisError::LexError {
                    message: format!("unexpected character '{c}'"),
                    span: Span::new(start, start + c.len_utf8()),
                });
            }
        };
        tokens.push(Token {
            kind,
            span: Span::new(start, start + len),
        });
        pos += len;
    }

    Ok(tokens)
}

fn lex_number(content: &str, start: usize) -> Result<(f64, usize), BasisError> {
    let bytes = content.as_bytes();
    let mut pos = start;

    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos < bytes.len() && bytes[pos] == b'.' {
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        let mut exp_end = pos + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        if exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            pos = exp_end;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }

    let text = &content[start..pos];
    text.parse::<f64>()
        .map(|n| (n, pos))
        .map_err(|_| BasisError::LexError {
            message: format!("invalid number literal '{text}'"),
            span: Span::new(start, pos),
        })
}

fn lex_ident_end(content: &str, start: usize) -> usize {
    let bytes = content.as_bytes();
    let mut pos = start;
    while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
        pos += 1;
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn power_is_one_token() {
        assert_eq!(
            kinds("x_st**2 * s"),
            vec![
                TokenKind::Ident("x_st".into()),
                TokenKind::Power,
                TokenKind::Number(2.0),
                TokenKind::Star,
                TokenKind::Ident("s".into()),
            ]
        );
    }

    #[test]
    fn numbers_with_exponents() {
        assert_eq!(kinds("1.5e-3 .25"), vec![TokenKind::Number(1.5e-3), TokenKind::Number(0.25)]);
    }

    #[test]
    fn spans_are_byte_offsets() {
        let toks = tokenize("1 +\n  x_lt").unwrap();
        assert_eq!(toks[2].span, Span::new(6, 10));
    }

    #[test]
    fn rejects_unknown_characters() {
        let err = tokenize("x_st % 2").unwrap_err();
        assert_eq!(err.span(), Span::new(5, 6));
    }
}
