//! Tokenizer for selection criteria.

use crate::ast::CmpOp;
use oxizip_core::error::{OxiZipError, Result};

/// Token kinds produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// Comparison operator.
    Op(CmpOp),
    /// Bare word: noun, keyword, or unquoted literal.
    Word(String),
    /// Quoted literal; never a keyword.
    Quoted(String),
}

/// A token with its character offset in the criteria string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// What was lexed.
    pub kind: TokenKind,
    /// Character offset of the first character.
    pub pos: usize,
}

fn is_operator_char(c: char) -> bool {
    matches!(c, '=' | '!' | '<' | '>')
}

/// Split a criteria string into tokens.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        let kind = match c {
            '(' => {
                i += 1;
                TokenKind::LParen
            }
            ')' => {
                i += 1;
                TokenKind::RParen
            }
            '\'' | '"' => {
                let quote = c;
                i += 1;
                let mut text = String::new();
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                        None => {
                            return Err(OxiZipError::parse("unterminated quoted string", start));
                        }
                    }
                }
                TokenKind::Quoted(text)
            }
            c if is_operator_char(c) => {
                let next = chars.get(i + 1).copied();
                let (op, len) = match (c, next) {
                    ('!', Some('=')) => (CmpOp::Ne, 2),
                    ('<', Some('=')) => (CmpOp::Le, 2),
                    ('>', Some('=')) => (CmpOp::Ge, 2),
                    ('<', _) => (CmpOp::Lt, 1),
                    ('>', _) => (CmpOp::Gt, 1),
                    ('=', _) => (CmpOp::Eq, 1),
                    _ => return Err(OxiZipError::parse("expected '!='", start)),
                };
                i += len;
                TokenKind::Op(op)
            }
            _ => {
                let mut text = String::new();
                while let Some(&ch) = chars.get(i) {
                    if ch.is_whitespace() || ch == '(' || ch == ')' || is_operator_char(ch) {
                        break;
                    }
                    text.push(ch);
                    i += 1;
                }
                TokenKind::Word(text)
            }
        };

        tokens.push(Token { kind, pos: start });
    }

    Ok(tokens)
}
