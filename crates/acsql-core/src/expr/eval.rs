use crate::expr::{
    ArithOp, Expr, Literal,
    like::{CaseFold, LikePattern},
};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
};

///
/// Row
/// Parameter source for reference evaluation.
///

pub trait Row {
    fn param(&self, path: &str) -> Literal;

    /// Current instant in epoch milliseconds, exposed to `NOW()`.
    fn now(&self) -> f64 {
        0.0
    }
}

impl Row for BTreeMap<String, Literal> {
    fn param(&self, path: &str) -> Literal {
        self.get(path).cloned().unwrap_or(Literal::Null)
    }
}

impl Row for HashMap<String, Literal> {
    fn param(&self, path: &str) -> Literal {
        self.get(path).cloned().unwrap_or(Literal::Null)
    }
}

/// Total order over non-null values: numeric rank below text rank.
/// Returns `None` when either side is null.
#[must_use]
pub fn compare_values(a: &Literal, b: &Literal) -> Option<Ordering> {
    match (a, b) {
        (Literal::Null, _) | (_, Literal::Null) => None,
        (Literal::Text(x), Literal::Text(y)) => Some(x.cmp(y)),
        (Literal::Text(_), _) => Some(Ordering::Greater),
        (_, Literal::Text(_)) => Some(Ordering::Less),
        _ => {
            let x = a.numeric()?;
            let y = b.numeric()?;
            Some(x.partial_cmp(&y).unwrap_or(Ordering::Equal))
        }
    }
}

/// Boolean-context truthiness: TRUE iff the value equals `true`.
#[must_use]
pub fn truth(value: &Literal) -> Option<bool> {
    compare_values(value, &Literal::Bool(true)).map(|ord| ord == Ordering::Equal)
}

const fn from_truth(value: Option<bool>) -> Literal {
    match value {
        Some(b) => Literal::Bool(b),
        None => Literal::Null,
    }
}

/// Three-valued reference evaluation of an expression against a row.
#[must_use]
pub fn evaluate<R: Row + ?Sized>(expr: &Expr, row: &R) -> Literal {
    match expr {
        Expr::Literal(lit) => lit.clone(),
        Expr::Param(name) => match evaluate(name, row).to_text() {
            Some(path) => row.param(&path),
            None => Literal::Null,
        },
        Expr::Func { name, args } => eval_func(name, args, row),
        Expr::And(children) => {
            let mut saw_null = false;
            for child in children {
                match truth(&evaluate(child, row)) {
                    Some(false) => return Literal::Bool(false),
                    None => saw_null = true,
                    Some(true) => {}
                }
            }
            if saw_null {
                Literal::Null
            } else {
                Literal::Bool(true)
            }
        }
        Expr::Or(children) => {
            let mut saw_null = false;
            for child in children {
                match truth(&evaluate(child, row)) {
                    Some(true) => return Literal::Bool(true),
                    None => saw_null = true,
                    Some(false) => {}
                }
            }
            if saw_null {
                Literal::Null
            } else {
                Literal::Bool(false)
            }
        }
        Expr::Not(operand) => from_truth(truth(&evaluate(operand, row)).map(|b| !b)),
        Expr::Compare { op, lhs, rhs } => {
            let ordering = compare_values(&evaluate(lhs, row), &evaluate(rhs, row));
            from_truth(ordering.map(|ord| op.accepts(ord)))
        }
        Expr::IsNull { operand, negated } => {
            Literal::Bool(evaluate(operand, row).is_null() != *negated)
        }
        Expr::Like {
            lhs,
            pattern,
            escape,
            negated,
        } => {
            let value = evaluate(lhs, row);
            let pattern = evaluate(pattern, row);
            let escape = escape.as_ref().map(|e| evaluate(e, row));
            from_truth(eval_like(&value, &pattern, escape.as_ref()).map(|b| b != *negated))
        }
        Expr::Case(arms) => arms
            .iter()
            .find(|(guard, _)| truth(&evaluate(guard, row)) == Some(true))
            .map_or(Literal::Null, |(_, value)| evaluate(value, row)),
        Expr::Arith { op, lhs, rhs } => {
            let (Some(x), Some(y)) = (evaluate(lhs, row).numeric(), evaluate(rhs, row).numeric())
            else {
                return Literal::Null;
            };
            let result = match op {
                ArithOp::Add => x + y,
                ArithOp::Sub => x - y,
                ArithOp::Mul => x * y,
                ArithOp::Div if y == 0.0 => return Literal::Null,
                ArithOp::Div => x / y,
            };
            if result.is_finite() {
                Literal::Number(result)
            } else {
                Literal::Null
            }
        }
        Expr::Concat(lhs, rhs) => {
            match (evaluate(lhs, row).to_text(), evaluate(rhs, row).to_text()) {
                (Some(a), Some(b)) => Literal::Text(a + &b),
                _ => Literal::Null,
            }
        }
    }
}

fn eval_func<R: Row + ?Sized>(name: &str, args: &[Expr], row: &R) -> Literal {
    if let (Some(fold), [arg]) = (CaseFold::from_function_name(name), args) {
        return match evaluate(arg, row) {
            Literal::Text(text) => Literal::Text(fold.apply(&text)),
            other => other,
        };
    }

    match (name, args) {
        ("COALESCE", _) => args
            .iter()
            .map(|arg| evaluate(arg, row))
            .find(|value| !value.is_null())
            .unwrap_or(Literal::Null),
        ("NOW", []) => Literal::Number(row.now()),
        _ => Literal::Null,
    }
}

fn eval_like(value: &Literal, pattern: &Literal, escape: Option<&Literal>) -> Option<bool> {
    if value.is_null() || pattern.is_null() || escape.is_some_and(Literal::is_null) {
        return None;
    }
    let Literal::Text(text) = value else {
        return Some(false);
    };
    let pattern = pattern.to_text()?;
    let escape = escape.and_then(Literal::to_text).and_then(|e| e.chars().next());

    Some(LikePattern::parse(&pattern, escape).matches(text))
}
