//! Module: expr
//! Responsibility: filter-language AST, text and JSON forms, reference evaluation.
//! Does not own: normalization or minimization.
//! Boundary: every other module consumes `Expr` values produced here.

mod eval;
pub(crate) mod json;
pub(crate) mod like;
mod parse;
mod stringify;

#[cfg(test)]
mod tests;

pub use eval::{Row, compare_values, evaluate, truth};
pub use like::CaseFold;
pub use parse::parse;
pub use stringify::stringify;

use std::cmp::Ordering;

///
/// Literal
/// Constant leaf of an expression tree.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Literal {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view: booleans coerce to 0/1, text and null have none.
    #[must_use]
    pub const fn numeric(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Number(n) => Some(*n),
            Self::Null | Self::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text form used by concatenation and parameter-name interpolation.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Number(n) => Some(stringify::format_number(*n)),
            Self::Text(s) => Some(s.clone()),
        }
    }
}

///
/// CompareOp
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    /// Logical complement (`NOT (a op b)` on non-null operands).
    #[must_use]
    pub const fn negate(self) -> Self {
        match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::Gt => Self::Lte,
            Self::Gte => Self::Lt,
            Self::Lt => Self::Gte,
            Self::Lte => Self::Gt,
        }
    }

    /// Operator after swapping the operands.
    #[must_use]
    pub const fn flip(self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Gt => Self::Lt,
            Self::Gte => Self::Lte,
            Self::Lt => Self::Gt,
            Self::Lte => Self::Gte,
        }
    }

    #[must_use]
    pub const fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => matches!(ordering, Ordering::Equal),
            Self::Ne => !matches!(ordering, Ordering::Equal),
            Self::Gt => matches!(ordering, Ordering::Greater),
            Self::Gte => !matches!(ordering, Ordering::Less),
            Self::Lt => matches!(ordering, Ordering::Less),
            Self::Lte => !matches!(ordering, Ordering::Greater),
        }
    }

    pub(crate) fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "=" => Self::Eq,
            "<>" => Self::Ne,
            ">" => Self::Gt,
            ">=" => Self::Gte,
            "<" => Self::Lt,
            "<=" => Self::Lte,
            _ => return None,
        };

        Some(op)
    }
}

///
/// ArithOp
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }

    pub(crate) fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            _ => return None,
        };

        Some(op)
    }
}

///
/// Expr
///
/// Immutable filter-language expression tree.
/// `Param` carries its name as an expression: a text literal for plain paths,
/// or a concatenation chain when the path interpolates `{expr}` segments.
/// `Case` arms are `(guard, value)` pairs; an `ELSE` arm has the guard `true`.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Param(Box<Self>),
    Func {
        name: String,
        args: Vec<Self>,
    },
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
    Compare {
        op: CompareOp,
        lhs: Box<Self>,
        rhs: Box<Self>,
    },
    IsNull {
        operand: Box<Self>,
        negated: bool,
    },
    Like {
        lhs: Box<Self>,
        pattern: Box<Self>,
        escape: Option<Box<Self>>,
        negated: bool,
    },
    Case(Vec<(Self, Self)>),
    Arith {
        op: ArithOp,
        lhs: Box<Self>,
        rhs: Box<Self>,
    },
    Concat(Box<Self>, Box<Self>),
}

impl Expr {
    #[must_use]
    pub const fn null() -> Self {
        Self::Literal(Literal::Null)
    }

    #[must_use]
    pub const fn bool(value: bool) -> Self {
        Self::Literal(Literal::Bool(value))
    }

    #[must_use]
    pub const fn number(value: f64) -> Self {
        Self::Literal(Literal::Number(value))
    }

    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Literal(Literal::Text(value.into()))
    }

    /// Parameter with a plain (non-interpolated) path.
    #[must_use]
    pub fn param(path: impl Into<String>) -> Self {
        Self::Param(Box::new(Self::text(path)))
    }

    #[must_use]
    pub fn func(name: impl Into<String>, args: Vec<Self>) -> Self {
        Self::Func {
            name: name.into().to_ascii_uppercase(),
            args,
        }
    }

    #[must_use]
    pub fn compare(op: CompareOp, lhs: Self, rhs: Self) -> Self {
        Self::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    #[must_use]
    pub fn arith(op: ArithOp, lhs: Self, rhs: Self) -> Self {
        Self::Arith {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    #[must_use]
    pub fn concat(lhs: Self, rhs: Self) -> Self {
        Self::Concat(Box::new(lhs), Box::new(rhs))
    }

    #[must_use]
    pub fn not(operand: Self) -> Self {
        Self::Not(Box::new(operand))
    }

    #[must_use]
    pub fn is_null(operand: Self) -> Self {
        Self::IsNull {
            operand: Box::new(operand),
            negated: false,
        }
    }

    #[must_use]
    pub fn is_not_null(operand: Self) -> Self {
        Self::IsNull {
            operand: Box::new(operand),
            negated: true,
        }
    }

    #[must_use]
    pub fn like(lhs: Self, pattern: Self, escape: Option<Self>, negated: bool) -> Self {
        Self::Like {
            lhs: Box::new(lhs),
            pattern: Box::new(pattern),
            escape: escape.map(Box::new),
            negated,
        }
    }

    #[must_use]
    pub const fn as_literal(&self) -> Option<&Literal> {
        match self {
            Self::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    /// Plain parameter path when the name is a constant text literal.
    #[must_use]
    pub fn param_path(&self) -> Option<&str> {
        match self {
            Self::Param(name) => match name.as_ref() {
                Self::Literal(Literal::Text(path)) => Some(path),
                _ => None,
            },
            _ => None,
        }
    }

    /// True for operators whose value is always a boolean or null.
    #[must_use]
    pub const fn is_boolean(&self) -> bool {
        matches!(
            self,
            Self::Literal(Literal::Bool(_))
                | Self::And(_)
                | Self::Or(_)
                | Self::Not(_)
                | Self::Compare { .. }
                | Self::IsNull { .. }
                | Self::Like { .. }
        )
    }

    /// Canonical text form; structural identity is defined over this key.
    #[must_use]
    pub fn canonical_key(&self) -> String {
        self.to_string()
    }

    /// Binding strength used by stringify; higher binds tighter.
    pub(crate) const fn precedence(&self) -> u8 {
        match self {
            Self::Or(_) => 1,
            Self::And(_) => 2,
            Self::Not(_) => 3,
            Self::Compare { .. } | Self::IsNull { .. } | Self::Like { .. } => 4,
            Self::Concat(..) => 5,
            Self::Arith {
                op: ArithOp::Add | ArithOp::Sub,
                ..
            } => 6,
            Self::Arith { .. } => 7,
            Self::Literal(_) | Self::Param(_) | Self::Func { .. } | Self::Case(_) => 8,
        }
    }
}

impl From<Literal> for Expr {
    fn from(lit: Literal) -> Self {
        Self::Literal(lit)
    }
}
