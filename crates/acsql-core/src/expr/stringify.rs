use crate::expr::{
    Expr, Literal,
    parse::{is_ident_char, is_keyword, scan_number},
};
use std::fmt::{self, Write as _};

/// Filter text that parses back to `expr`.
#[must_use]
pub fn stringify(expr: &Expr) -> String {
    expr.to_string()
}

/// Canonical text for numbers; always re-parses as a JSON number.
pub(crate) fn format_number(n: f64) -> String {
    if n == 0.0 {
        // normalizes -0
        return "0".to_string();
    }

    n.to_string()
}

pub(crate) fn quote_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');

    out
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(true) => f.write_str("true"),
            Self::Bool(false) => f.write_str("false"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Text(s) => f.write_str(&quote_text(s)),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(lit) => write!(f, "{lit}"),
            Self::Param(name) => write_param_name(f, name),
            Self::Func { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Self::And(children) => write_chain(f, self, children, " AND "),
            Self::Or(children) => write_chain(f, self, children, " OR "),
            Self::Not(operand) => {
                f.write_str("NOT ")?;
                write_operand(f, operand, operand.precedence() < self.precedence())
            }
            Self::Compare { op, lhs, rhs } => write_binary(f, self, lhs, op.symbol(), rhs),
            Self::IsNull { operand, negated } => {
                write_operand(f, operand, operand.precedence() < self.precedence())?;
                f.write_str(if *negated { " IS NOT NULL" } else { " IS NULL" })
            }
            Self::Like {
                lhs,
                pattern,
                escape,
                negated,
            } => {
                let keyword = if *negated { "NOT LIKE" } else { "LIKE" };
                write_binary(f, self, lhs, keyword, pattern)?;
                if let Some(escape) = escape {
                    f.write_str(" ESCAPE ")?;
                    write_operand(f, escape, escape.precedence() <= self.precedence())?;
                }
                Ok(())
            }
            Self::Case(arms) => {
                f.write_str("CASE")?;
                for (guard, value) in arms {
                    if matches!(guard, Self::Literal(Literal::Bool(true))) {
                        write!(f, " ELSE {value}")?;
                    } else {
                        write!(f, " WHEN {guard} THEN {value}")?;
                    }
                }
                f.write_str(" END")
            }
            Self::Arith { op, lhs, rhs } => write_binary(f, self, lhs, op.symbol(), rhs),
            Self::Concat(lhs, rhs) => write_binary(f, self, lhs, "||", rhs),
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, operand: &Expr, parens: bool) -> fmt::Result {
    if parens {
        write!(f, "({operand})")
    } else {
        write!(f, "{operand}")
    }
}

// Left-associative: the right operand needs parentheses at equal precedence.
fn write_binary(
    f: &mut fmt::Formatter<'_>,
    parent: &Expr,
    lhs: &Expr,
    symbol: &str,
    rhs: &Expr,
) -> fmt::Result {
    let level = parent.precedence();
    write_operand(f, lhs, lhs.precedence() < level)?;
    write!(f, " {symbol} ")?;
    write_operand(f, rhs, rhs.precedence() <= level)
}

// Nested chains of the same kind keep their parentheses so they do not
// flatten on re-parse.
fn write_chain(
    f: &mut fmt::Formatter<'_>,
    parent: &Expr,
    children: &[Expr],
    separator: &str,
) -> fmt::Result {
    let level = parent.precedence();
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write_operand(f, child, child.precedence() <= level)?;
    }

    Ok(())
}

fn write_param_name(f: &mut fmt::Formatter<'_>, name: &Expr) -> fmt::Result {
    let mut parts = Vec::new();
    collect_name_parts(name, &mut parts);

    // Two bare segments in a row would lex as one.
    let mut out = String::new();
    let mut prev_bare = false;
    for part in &parts {
        match part {
            Expr::Literal(Literal::Text(raw))
                if !prev_bare && is_bare_segment(raw, parts.len() == 1) =>
            {
                out.push_str(raw);
                prev_bare = true;
            }
            other => {
                let _ = write!(out, "{{{other}}}");
                prev_bare = false;
            }
        }
    }

    f.write_str(&out)
}

// Interpolated names parse into a left-leaning concatenation chain.
fn collect_name_parts<'a>(name: &'a Expr, parts: &mut Vec<&'a Expr>) {
    match name {
        Expr::Concat(lhs, rhs) => {
            collect_name_parts(lhs, parts);
            parts.push(rhs);
        }
        other => parts.push(other),
    }
}

// A raw segment must re-lex as part of an identifier; standing alone it must
// not read as a number or keyword either.
fn is_bare_segment(raw: &str, standalone: bool) -> bool {
    if raw.is_empty() || !raw.chars().all(is_ident_char) {
        return false;
    }

    !standalone || (!is_keyword(raw) && scan_number(raw) != Some(raw.len()))
}
