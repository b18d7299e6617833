//! Recursive-descent parser for selection criteria.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! or      := xor ( OR xor )*
//! xor     := and ( XOR and )*
//! and     := unary ( AND unary )*
//! unary   := NOT unary | primary
//! primary := '(' or ')' | noun op literal | word
//! ```
//!
//! A lone word that is not followed by an operator is shorthand for
//! `name = word`.

use crate::ast::{CmpOp, Criterion, Predicate, TimeField};
use crate::lexer::{Token, TokenKind, tokenize};
use crate::pattern::NamePattern;
use oxizip_core::FileAttributes;
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::time::local_offset;
use std::time::SystemTime;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime, Time};

/// Parse a criteria string.
pub fn parse(input: &str) -> Result<Criterion> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(OxiZipError::parse("empty selection criteria", 0));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.chars().count(),
    };
    let criterion = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        let message = match token.kind {
            TokenKind::RParen => "unbalanced ')'".to_string(),
            _ => format!("unexpected {}", describe(&token.kind)),
        };
        return Err(OxiZipError::parse(message, token.pos));
    }
    Ok(criterion)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    And,
    Or,
    Xor,
    Not,
}

enum Noun {
    Name,
    Size,
    Time(TimeField),
    Attributes,
    Type,
}

fn keyword(kind: &TokenKind) -> Option<Keyword> {
    let TokenKind::Word(word) = kind else {
        return None;
    };
    match word.to_ascii_lowercase().as_str() {
        "and" => Some(Keyword::And),
        "or" => Some(Keyword::Or),
        "xor" => Some(Keyword::Xor),
        "not" => Some(Keyword::Not),
        _ => None,
    }
}

fn noun(word: &str) -> Option<Noun> {
    match word.to_ascii_lowercase().as_str() {
        "name" => Some(Noun::Name),
        "size" => Some(Noun::Size),
        "mtime" => Some(Noun::Time(TimeField::Modified)),
        "ctime" => Some(Noun::Time(TimeField::Created)),
        "atime" => Some(Noun::Time(TimeField::Accessed)),
        "attributes" => Some(Noun::Attributes),
        "type" => Some(Noun::Type),
        _ => None,
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::Op(op) => format!("operator '{op}'"),
        TokenKind::Word(w) => format!("'{w}'"),
        TokenKind::Quoted(q) => format!("'{q}'"),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn position(&self) -> usize {
        self.peek().map_or(self.end, |t| t.pos)
    }

    fn eat_keyword(&mut self, expected: Keyword) -> bool {
        if self.peek().and_then(|t| keyword(&t.kind)) == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Criterion> {
        let mut lhs = self.parse_xor()?;
        while self.eat_keyword(Keyword::Or) {
            let rhs = self.parse_xor()?;
            lhs = Criterion::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_xor(&mut self) -> Result<Criterion> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword(Keyword::Xor) {
            let rhs = self.parse_and()?;
            lhs = Criterion::Xor(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Criterion> {
        let mut lhs = self.parse_unary()?;
        while self.eat_keyword(Keyword::And) {
            let rhs = self.parse_unary()?;
            lhs = Criterion::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Criterion> {
        if self.eat_keyword(Keyword::Not) {
            let inner = self.parse_unary()?;
            return Ok(Criterion::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Criterion> {
        let pos = self.position();
        let Some(token) = self.next() else {
            return Err(OxiZipError::parse("expected a comparison", pos));
        };

        match token.kind {
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    Some(other) => Err(OxiZipError::parse(
                        format!("expected ')', found {}", describe(&other.kind)),
                        other.pos,
                    )),
                    None => Err(OxiZipError::parse("missing ')'", self.end)),
                }
            }
            TokenKind::Word(ref word) if keyword(&token.kind).is_some() => Err(OxiZipError::parse(
                format!("expected a comparison, found keyword '{word}'"),
                token.pos,
            )),
            TokenKind::Word(word) => {
                let Some(TokenKind::Op(op)) = self.peek_kind(0).cloned() else {
                    if noun(&word).is_some() {
                        return Err(OxiZipError::parse(
                            format!("missing operator after '{word}'"),
                            self.position(),
                        ));
                    }
                    return name_criterion(CmpOp::Eq, &word);
                };
                self.pos += 1;
                let Some(noun) = noun(&word) else {
                    return Err(OxiZipError::parse(format!("unknown noun '{word}'"), token.pos));
                };
                self.parse_comparison(noun, &word, op)
            }
            TokenKind::Quoted(text) => name_criterion(CmpOp::Eq, &text),
            TokenKind::RParen => Err(OxiZipError::parse("unbalanced ')'", token.pos)),
            TokenKind::Op(op) => Err(OxiZipError::parse(
                format!("operator '{op}' without a noun"),
                token.pos,
            )),
        }
    }

    fn parse_comparison(&mut self, noun: Noun, noun_text: &str, op: CmpOp) -> Result<Criterion> {
        let pos = self.position();
        let literal = match self.next() {
            Some(Token {
                kind: TokenKind::Word(w) | TokenKind::Quoted(w),
                ..
            }) => w,
            _ => {
                return Err(OxiZipError::parse(
                    format!("missing value after '{noun_text} {op}'"),
                    pos,
                ));
            }
        };

        let equality_only = matches!(noun, Noun::Name | Noun::Attributes | Noun::Type);
        if equality_only && !op.is_equality() {
            return Err(OxiZipError::parse(
                format!("operator '{op}' is not supported for '{noun_text}'"),
                pos,
            ));
        }

        let predicate = match noun {
            Noun::Name => Predicate::Name {
                op,
                pattern: NamePattern::new(&literal)?,
            },
            Noun::Size => Predicate::Size {
                op,
                bytes: parse_size(&literal).ok_or_else(|| {
                    OxiZipError::parse(format!("invalid size '{literal}'"), pos)
                })?,
            },
            Noun::Time(field) => Predicate::Time {
                field,
                op,
                at: parse_time(&literal).ok_or_else(|| {
                    OxiZipError::parse(format!("invalid date/time '{literal}'"), pos)
                })?,
            },
            Noun::Attributes => {
                let mask = parse_attributes(&literal).ok_or_else(|| {
                    OxiZipError::parse(format!("invalid attributes '{literal}'"), pos)
                })?;
                Predicate::Attributes {
                    op,
                    mask,
                    letters: literal.to_ascii_uppercase(),
                }
            }
            Noun::Type => {
                let directory = match literal.to_ascii_uppercase().as_str() {
                    "D" => true,
                    "F" => false,
                    _ => {
                        return Err(OxiZipError::parse(
                            format!("invalid type '{literal}', expected D or F"),
                            pos,
                        ));
                    }
                };
                Predicate::Type { op, directory }
            }
        };
        Ok(Criterion::Compare(predicate))
    }
}

fn name_criterion(op: CmpOp, pattern: &str) -> Result<Criterion> {
    Ok(Criterion::Compare(Predicate::Name {
        op,
        pattern: NamePattern::new(pattern)?,
    }))
}

/// Parse a size literal such as `500`, `10kb`, `1.5m` or `2G`.
pub fn parse_size(text: &str) -> Option<u64> {
    let lower = text.trim().to_ascii_lowercase();
    let split = lower
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(lower.len());
    let (number, suffix) = lower.split_at(split);
    if number.is_empty() {
        return None;
    }

    let multiplier: u64 = match suffix {
        "" | "b" => 1,
        "k" | "kb" => 1024,
        "m" | "mb" => 1024 * 1024,
        "g" | "gb" => 1024 * 1024 * 1024,
        _ => return None,
    };

    if let Ok(whole) = number.parse::<u64>() {
        return whole.checked_mul(multiplier);
    }
    let value: f64 = number.parse().ok()?;
    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
        return None;
    }
    Some(bytes as u64)
}

/// Parse a time literal in local time.
///
/// Accepted forms: `2009-01-01`, `2009-01-01-14:30:00`,
/// `2009-01-01T14:30:00` and `2009-01-01 14:30:00`.
pub fn parse_time(text: &str) -> Option<SystemTime> {
    let text = text.trim();
    let date_only = format_description!("[year]-[month]-[day]");
    let dashed = format_description!("[year]-[month]-[day]-[hour]:[minute]:[second]");
    let iso = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let spaced = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

    let datetime = if let Ok(date) = Date::parse(text, date_only) {
        PrimitiveDateTime::new(date, Time::MIDNIGHT)
    } else {
        PrimitiveDateTime::parse(text, dashed)
            .or_else(|_| PrimitiveDateTime::parse(text, iso))
            .or_else(|_| PrimitiveDateTime::parse(text, spaced))
            .ok()?
    };
    Some(SystemTime::from(datetime.assume_offset(local_offset())))
}

/// Parse attribute letters into a DOS bitmask. Each letter may appear once.
pub fn parse_attributes(text: &str) -> Option<u32> {
    if text.is_empty() {
        return None;
    }
    let mut mask = 0;
    for letter in text.chars() {
        let bit = FileAttributes::bit_for_letter(letter)?;
        if mask & bit != 0 {
            return None;
        }
        mask |= bit;
    }
    Some(mask)
}
