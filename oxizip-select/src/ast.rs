//! Selection criteria syntax tree and evaluator.
//!
//! The tree is closed: adding a noun means adding a [`Predicate`] variant
//! and one arm in [`Predicate::evaluate`].

use crate::candidate::Candidate;
use crate::pattern::NamePattern;
use oxizip_core::time::local_offset;
use std::fmt;
use std::time::SystemTime;
use time::OffsetDateTime;
use time::macros::format_description;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CmpOp {
    /// Whether the operator is `=` or `!=`.
    pub fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }

    /// Apply the operator to an ordered pair.
    pub fn compare<T: PartialOrd>(self, lhs: T, rhs: T) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }

    /// Apply an equality operator to a boolean test result.
    fn apply(self, matched: bool) -> bool {
        match self {
            Self::Ne => !matched,
            _ => matched,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        })
    }
}

/// Which timestamp a time predicate reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeField {
    /// Last modification (`mtime`).
    Modified,
    /// Creation (`ctime`).
    Created,
    /// Last access (`atime`).
    Accessed,
}

impl TimeField {
    /// The noun keyword for this field.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Modified => "mtime",
            Self::Created => "ctime",
            Self::Accessed => "atime",
        }
    }
}

/// A single comparison against candidate metadata.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// `name = pattern`
    Name {
        /// `=` or `!=`.
        op: CmpOp,
        /// Wildcard pattern.
        pattern: NamePattern,
    },
    /// `size > 10kb`
    Size {
        /// Any operator.
        op: CmpOp,
        /// Size in bytes.
        bytes: u64,
    },
    /// `mtime < 2009-01-01`
    Time {
        /// Which timestamp.
        field: TimeField,
        /// Any operator.
        op: CmpOp,
        /// Instant to compare against.
        at: SystemTime,
    },
    /// `attributes = HR`
    Attributes {
        /// `=` or `!=`.
        op: CmpOp,
        /// Required DOS bits.
        mask: u32,
        /// Letters as written, for display.
        letters: String,
    },
    /// `type = D`
    Type {
        /// `=` or `!=`.
        op: CmpOp,
        /// True for `D`, false for `F`.
        directory: bool,
    },
}

impl Predicate {
    /// Evaluate against a candidate.
    pub fn evaluate(&self, candidate: &dyn Candidate) -> bool {
        match self {
            Self::Name { op, pattern } => op.apply(pattern.matches(candidate.path())),
            Self::Size { op, bytes } => op.compare(candidate.size(), *bytes),
            Self::Time { field, op, at } => match candidate.time(*field) {
                Some(t) => op.compare(t, *at),
                None => false,
            },
            Self::Attributes { op, mask, .. } => op.apply(candidate.attributes().contains(*mask)),
            Self::Type { op, directory } => op.apply(candidate.is_dir() == *directory),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name { op, pattern } => write!(f, "name {} '{}'", op, pattern.as_str()),
            Self::Size { op, bytes } => write!(f, "size {} {}", op, bytes),
            Self::Time { field, op, at } => {
                let local = OffsetDateTime::from(*at).to_offset(local_offset());
                let text = local
                    .format(format_description!(
                        "[year]-[month]-[day]-[hour]:[minute]:[second]"
                    ))
                    .map_err(|_| fmt::Error)?;
                write!(f, "{} {} {}", field.keyword(), op, text)
            }
            Self::Attributes { op, letters, .. } => write!(f, "attributes {} {}", op, letters),
            Self::Type { op, directory } => {
                write!(f, "type {} {}", op, if *directory { 'D' } else { 'F' })
            }
        }
    }
}

/// Boolean combination of predicates.
#[derive(Debug, Clone)]
pub enum Criterion {
    /// Both sides must hold.
    And(Box<Criterion>, Box<Criterion>),
    /// Either side holds.
    Or(Box<Criterion>, Box<Criterion>),
    /// Exactly one side holds.
    Xor(Box<Criterion>, Box<Criterion>),
    /// Negation.
    Not(Box<Criterion>),
    /// Leaf comparison.
    Compare(Predicate),
}

impl Criterion {
    /// Evaluate against a candidate.
    pub fn evaluate(&self, candidate: &dyn Candidate) -> bool {
        match self {
            Self::And(lhs, rhs) => lhs.evaluate(candidate) && rhs.evaluate(candidate),
            Self::Or(lhs, rhs) => lhs.evaluate(candidate) || rhs.evaluate(candidate),
            Self::Xor(lhs, rhs) => lhs.evaluate(candidate) ^ rhs.evaluate(candidate),
            Self::Not(inner) => !inner.evaluate(candidate),
            Self::Compare(predicate) => predicate.evaluate(candidate),
        }
    }

    /// Whether any leaf tests the given attribute bits.
    ///
    /// Used by traversal to decide whether reparse-point metadata matters.
    pub fn mentions_attribute(&self, bit: u32) -> bool {
        match self {
            Self::And(lhs, rhs) | Self::Or(lhs, rhs) | Self::Xor(lhs, rhs) => {
                lhs.mentions_attribute(bit) || rhs.mentions_attribute(bit)
            }
            Self::Not(inner) => inner.mentions_attribute(bit),
            Self::Compare(Predicate::Attributes { mask, .. }) => mask & bit != 0,
            Self::Compare(_) => false,
        }
    }

    /// Whether any leaf is a `type` test.
    pub fn mentions_type(&self) -> bool {
        match self {
            Self::And(lhs, rhs) | Self::Or(lhs, rhs) | Self::Xor(lhs, rhs) => {
                lhs.mentions_type() || rhs.mentions_type()
            }
            Self::Not(inner) => inner.mentions_type(),
            Self::Compare(Predicate::Type { .. }) => true,
            Self::Compare(_) => false,
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(lhs, rhs) => write!(f, "({} AND {})", lhs, rhs),
            Self::Or(lhs, rhs) => write!(f, "({} OR {})", lhs, rhs),
            Self::Xor(lhs, rhs) => write!(f, "({} XOR {})", lhs, rhs),
            Self::Not(inner) => write!(f, "NOT {}", inner),
            Self::Compare(predicate) => write!(f, "{}", predicate),
        }
    }
}
