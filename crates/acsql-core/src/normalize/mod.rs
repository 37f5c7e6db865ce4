//! Module: normalize
//! Responsibility: canonical algebraic form of expressions.
//! Does not own: boolean minimization (see `synth`).
//! Boundary: output is CASE-free below the root, folded, and oriented so
//! structurally equal inputs render identically.

mod polynomial;
mod rational;

#[cfg(test)]
mod tests;

use crate::{
    error::InternalError,
    expr::{CaseFold, CompareOp, Expr, Literal, compare_values, like::LikePattern, truth},
    obs::sink::{self, MetricsEvent},
};
use polynomial::Polynomial;
use std::collections::BTreeMap;
use tracing::instrument;

/// Ordered `(guard, value)` alternatives; the first TRUE guard selects the
/// value. A complete chain ends with a literal `true` guard.
type Chain = Vec<(Expr, Expr)>;

///
/// LinearForm
/// `slope * variable + offset`, with `root = -offset / slope` computed exactly.
///

#[derive(Clone, Debug, PartialEq)]
pub struct LinearForm {
    pub variable: Expr,
    pub slope: f64,
    pub offset: f64,
    pub root: f64,
}

/// Normalize an expression into its canonical form.
#[instrument(name = "normalize::normalize", level = "debug", skip_all)]
pub fn normalize(expr: &Expr) -> Result<Expr, InternalError> {
    sink::record(MetricsEvent::Normalize);
    let chain = to_chain(expr)?;

    Ok(render_chain(chain))
}

/// Decompose arithmetic that is linear in a single indeterminate.
#[must_use]
pub fn linear_form(expr: &Expr) -> Option<LinearForm> {
    let poly = Polynomial::from_expr(expr)?;
    let (variable, slope, offset) = poly.linear_form()?;
    let root = (-offset.clone()).checked_div(&slope)?;

    Some(LinearForm {
        variable,
        slope: slope.to_f64()?,
        offset: offset.to_f64()?,
        root: root.to_f64()?,
    })
}

// Trailing NULL values are implied by CASE without ELSE.
fn render_chain(mut chain: Chain) -> Expr {
    while chain
        .last()
        .is_some_and(|(_, value)| matches!(value, Expr::Literal(Literal::Null)))
    {
        chain.pop();
    }
    match chain.as_slice() {
        [] => Expr::null(),
        [(guard, _)] if is_true(guard) => chain.swap_remove(0).1,
        _ => Expr::Case(chain),
    }
}

fn is_true(expr: &Expr) -> bool {
    matches!(expr, Expr::Literal(Literal::Bool(true)))
}

///
/// ChainBuilder
/// Accumulates chain entries, dropping dead guards and stopping after the
/// first guard that is constantly true.
///

#[derive(Default)]
struct ChainBuilder {
    entries: Chain,
    closed: bool,
}

impl ChainBuilder {
    fn push(&mut self, guard: Expr, value: Expr) {
        if self.closed {
            return;
        }
        match guard.as_literal().map(truth) {
            Some(Some(true)) => {
                self.entries.push((Expr::bool(true), value));
                self.closed = true;
            }
            Some(_) => {}
            None => self.entries.push((guard, value)),
        }
    }

    fn finish(mut self) -> Chain {
        if !self.closed {
            self.entries.push((Expr::bool(true), Expr::null()));
        }

        self.entries
    }
}

fn single(value: Expr) -> Chain {
    vec![(Expr::bool(true), value)]
}

fn lift(
    operands: &[&Expr],
    mut combine: impl FnMut(Vec<Expr>) -> Result<Expr, InternalError>,
) -> Result<Chain, InternalError> {
    lift_chain(operands, |values| combine(values).map(single))
}

// Lexicographic product of operand chains, folded by `combine` into nested
// chains that are spliced under each combination's guard.
fn lift_chain(
    operands: &[&Expr],
    mut combine: impl FnMut(Vec<Expr>) -> Result<Chain, InternalError>,
) -> Result<Chain, InternalError> {
    let chains = operands
        .iter()
        .map(|operand| to_chain(operand))
        .collect::<Result<Vec<_>, _>>()?;

    let mut combos: Vec<(Vec<Expr>, Vec<Expr>)> = vec![(Vec::new(), Vec::new())];
    for chain in &chains {
        let mut next = Vec::with_capacity(combos.len() * chain.len());
        for (guards, values) in &combos {
            for (guard, value) in chain {
                let mut guards = guards.clone();
                if !is_true(guard) {
                    guards.push(guard.clone());
                }
                let mut values = values.clone();
                values.push(value.clone());
                next.push((guards, values));
            }
        }
        combos = next;
    }

    let mut builder = ChainBuilder::default();
    for (guards, values) in combos {
        if builder.closed {
            break;
        }
        let guard = fold_and(guards);
        for (inner, value) in combine(values)? {
            builder.push(fold_and(vec![guard.clone(), inner]), value);
        }
    }

    Ok(builder.finish())
}

fn to_chain(expr: &Expr) -> Result<Chain, InternalError> {
    match expr {
        Expr::Literal(_) => Ok(single(expr.clone())),
        Expr::Param(name) => lift(&[&**name], |mut v| Ok(fold_param(v.remove(0)))),
        Expr::Func { name, args } => func_chain(name, args),
        Expr::And(children) => {
            let refs: Vec<&Expr> = children.iter().collect();
            lift(&refs, |v| Ok(fold_and(v)))
        }
        Expr::Or(children) => {
            let refs: Vec<&Expr> = children.iter().collect();
            lift(&refs, |v| Ok(fold_or(v)))
        }
        Expr::Not(operand) => lift(&[&**operand], |mut v| Ok(fold_not(v.remove(0)))),
        Expr::Compare { op, lhs, rhs } => lift_chain(&[&**lhs, &**rhs], |mut v| {
            let rhs = v.remove(1);
            let lhs = v.remove(0);
            Ok(fold_compare(*op, lhs, rhs))
        }),
        Expr::IsNull { operand, negated } => {
            lift(&[&**operand], |mut v| Ok(fold_is_null(v.remove(0), *negated)))
        }
        Expr::Like {
            lhs,
            pattern,
            escape,
            negated,
        } => {
            let mut operands: Vec<&Expr> = vec![&**lhs, &**pattern];
            if let Some(escape) = escape {
                operands.push(&**escape);
            }
            lift(&operands, |mut v| {
                let escape = (v.len() == 3).then(|| v.remove(2));
                let pattern = v.remove(1);
                let lhs = v.remove(0);
                Ok(fold_like(lhs, pattern, escape, *negated))
            })
        }
        Expr::Case(arms) => case_chain(arms),
        Expr::Arith { op, lhs, rhs } => lift_chain(&[&**lhs, &**rhs], |mut v| {
            let rhs = v.remove(1);
            let lhs = v.remove(0);
            Ok(fold_arith(Expr::arith(*op, lhs, rhs)))
        }),
        Expr::Concat(lhs, rhs) => lift(&[&**lhs, &**rhs], |mut v| {
            let rhs = v.remove(1);
            let lhs = v.remove(0);
            Ok(fold_concat(lhs, rhs))
        }),
    }
}

fn func_chain(name: &str, args: &[Expr]) -> Result<Chain, InternalError> {
    let arity = |expected: usize| {
        if args.len() == expected {
            Ok(())
        } else {
            Err(InternalError::normalize(format!(
                "{name} expects {expected} argument(s), got {}",
                args.len()
            )))
        }
    };

    match name {
        "COALESCE" => {
            let Some((last, rest)) = args.split_last() else {
                return Err(InternalError::normalize(
                    "COALESCE expects at least one argument",
                ));
            };
            let mut arms: Vec<(Expr, Expr)> = rest
                .iter()
                .map(|arg| (Expr::is_not_null(arg.clone()), arg.clone()))
                .collect();
            arms.push((Expr::bool(true), last.clone()));
            case_chain(&arms)
        }
        "UPPER" | "LOWER" => {
            arity(1)?;
            let fold = CaseFold::from_function_name(name);
            lift(&[&args[0]], |mut v| {
                Ok(fold_case(name, fold, v.remove(0)))
            })
        }
        "NOW" => {
            arity(0)?;
            Ok(single(Expr::func(name, Vec::new())))
        }
        _ => {
            let refs: Vec<&Expr> = args.iter().collect();
            lift(&refs, |v| Ok(Expr::func(name, v)))
        }
    }
}

// Each arm contributes "guard TRUE and value" entries, then the remaining
// arms under "guard not TRUE".
fn case_chain(arms: &[(Expr, Expr)]) -> Result<Chain, InternalError> {
    let mut rest = single(Expr::null());
    for (guard, value) in arms.iter().rev() {
        let guard_chain = to_chain(guard)?;
        let value_chain = to_chain(value)?;

        let mut builder = ChainBuilder::default();
        for (h, b) in &guard_chain {
            for (vg, vv) in &value_chain {
                let g = fold_and(vec![h.clone(), b.clone(), vg.clone()]);
                builder.push(g, vv.clone());
            }
            for (rg, rv) in &rest {
                let g = fold_and(vec![h.clone(), rg.clone()]);
                builder.push(g, rv.clone());
            }
        }
        rest = builder.finish();
    }

    Ok(rest)
}

fn fold_param(name: Expr) -> Expr {
    match name {
        Expr::Literal(Literal::Null) => Expr::null(),
        Expr::Literal(lit) => match lit.to_text() {
            Some(path) => Expr::param(path),
            None => Expr::null(),
        },
        other => Expr::Param(Box::new(other)),
    }
}

fn fold_case(name: &str, fold: Option<CaseFold>, value: Expr) -> Expr {
    match (&value, fold) {
        (Expr::Literal(Literal::Text(text)), Some(fold)) => Expr::text(fold.apply(text)),
        (Expr::Literal(_), _) => value,
        _ => Expr::func(name, vec![value]),
    }
}

fn fold_and(operands: Vec<Expr>) -> Expr {
    fold_connective(operands, true)
}

fn fold_or(operands: Vec<Expr>) -> Expr {
    fold_connective(operands, false)
}

// `conjunction` selects AND (absorbing false) or OR (absorbing true).
fn fold_connective(operands: Vec<Expr>, conjunction: bool) -> Expr {
    let mut flat: Vec<Expr> = Vec::new();
    let mut saw_null = false;
    let mut stack = operands;
    stack.reverse();
    while let Some(operand) = stack.pop() {
        match operand {
            Expr::And(children) if conjunction => stack.extend(children.into_iter().rev()),
            Expr::Or(children) if !conjunction => stack.extend(children.into_iter().rev()),
            Expr::Literal(lit) => match truth(&lit) {
                Some(b) if b == conjunction => {}
                Some(_) => return Expr::bool(!conjunction),
                None => saw_null = true,
            },
            other => {
                let key = other.canonical_key();
                if !flat.iter().any(|e| e.canonical_key() == key) {
                    flat.push(other);
                }
            }
        }
    }
    if saw_null {
        flat.push(Expr::null());
    }

    match flat.len() {
        0 => Expr::bool(conjunction),
        1 => {
            let only = flat.swap_remove(0);
            if only.is_boolean() || only.is_literal() {
                only
            } else {
                Expr::compare(CompareOp::Eq, only, Expr::bool(true))
            }
        }
        _ if conjunction => Expr::And(flat),
        _ => Expr::Or(flat),
    }
}

fn fold_not(operand: Expr) -> Expr {
    match operand {
        Expr::Literal(lit) => match truth(&lit) {
            Some(b) => Expr::bool(!b),
            None => Expr::null(),
        },
        Expr::Not(inner) if inner.is_boolean() => *inner,
        Expr::Not(inner) => Expr::compare(CompareOp::Eq, *inner, Expr::bool(true)),
        Expr::Compare { op, lhs, rhs } => Expr::Compare {
            op: op.negate(),
            lhs,
            rhs,
        },
        Expr::IsNull { operand, negated } => Expr::IsNull {
            operand,
            negated: !negated,
        },
        Expr::Like {
            lhs,
            pattern,
            escape,
            negated,
        } => Expr::Like {
            lhs,
            pattern,
            escape,
            negated: !negated,
        },
        other => Expr::not(other),
    }
}

fn fold_is_null(operand: Expr, negated: bool) -> Expr {
    match operand {
        Expr::Literal(lit) => Expr::bool(lit.is_null() != negated),
        other => Expr::IsNull {
            operand: Box::new(other),
            negated,
        },
    }
}

fn fold_like(lhs: Expr, pattern: Expr, escape: Option<Expr>, negated: bool) -> Expr {
    let operands_null = lhs.as_literal().is_some_and(Literal::is_null)
        || pattern.as_literal().is_some_and(Literal::is_null)
        || escape
            .as_ref()
            .and_then(Expr::as_literal)
            .is_some_and(Literal::is_null);
    if operands_null {
        return Expr::null();
    }

    if let (Some(value), Some(pat)) = (lhs.as_literal(), pattern.as_literal()) {
        let escape_char = match escape.as_ref().map(Expr::as_literal) {
            None => Some(None),
            Some(Some(lit)) => Some(lit.to_text().and_then(|e| e.chars().next())),
            Some(None) => None,
        };
        if let (Some(escape_char), Some(pat)) = (escape_char, pat.to_text()) {
            let matched = match value {
                Literal::Text(text) => LikePattern::parse(&pat, escape_char).matches(text),
                _ => false,
            };
            return Expr::bool(matched != negated);
        }
    }

    Expr::like(lhs, pattern, escape, negated)
}

fn fold_concat(lhs: Expr, rhs: Expr) -> Expr {
    match (lhs.as_literal(), rhs.as_literal()) {
        (Some(Literal::Null), _) | (_, Some(Literal::Null)) => Expr::null(),
        (Some(a), Some(b)) => match (a.to_text(), b.to_text()) {
            (Some(a), Some(b)) => Expr::text(a + &b),
            _ => Expr::null(),
        },
        _ => Expr::concat(lhs, rhs),
    }
}

fn fold_arith(expr: Expr) -> Chain {
    let Some(poly) = Polynomial::from_expr(&expr) else {
        return single(Expr::null());
    };
    let result = poly.render();

    guarded(&[&expr], &result, result.clone())
}

fn fold_compare(op: CompareOp, lhs: Expr, rhs: Expr) -> Chain {
    match (lhs.as_literal(), rhs.as_literal()) {
        (Some(Literal::Null), _) | (_, Some(Literal::Null)) => return single(Expr::null()),
        (Some(a), Some(b)) => {
            return single(
                compare_values(a, b).map_or_else(Expr::null, |ord| Expr::bool(op.accepts(ord))),
            );
        }
        _ => {}
    }

    // subtraction preserves the comparison only between numeric-valued sides
    let numeric = |e: &Expr| match e {
        Expr::Arith { .. } => true,
        Expr::Literal(lit) => lit.numeric().is_some(),
        _ => false,
    };
    let arithmetic = matches!(lhs, Expr::Arith { .. }) || matches!(rhs, Expr::Arith { .. });
    if arithmetic && numeric(&lhs) && numeric(&rhs) {
        return compare_polynomial(op, &lhs, &rhs);
    }

    single(orient(op, lhs, rhs))
}

// `P op 0` with P canonical; literal-only differences fold to a constant.
fn compare_polynomial(op: CompareOp, lhs: &Expr, rhs: &Expr) -> Chain {
    let (Some(l), Some(r)) = (Polynomial::from_expr(lhs), Polynomial::from_expr(rhs)) else {
        return single(Expr::null());
    };
    let difference = l.sub(&r);
    let result = match difference.constant_value() {
        Some(constant) => Expr::bool(op.accepts(constant.cmp(&rational::Rational::zero()))),
        None => {
            let (canonical, flipped) = difference.canonicalize_sign();
            let op = if flipped { op.flip() } else { op };
            Expr::compare(op, canonical.render(), Expr::number(0.0))
        }
    };

    guarded(&[lhs, rhs], &difference.render(), result)
}

// Cancellation can drop an operand or divisor whose value made the input
// NULL; `result` then only holds while every dropped condition does.
fn guarded(inputs: &[&Expr], survivor: &Expr, result: Expr) -> Chain {
    let mut lost = BTreeMap::new();
    for input in inputs {
        lost.append(&mut polynomial::null_guards(input));
    }
    let kept = polynomial::null_guards(survivor);
    lost.retain(|key, _| !kept.contains_key(key));
    // `d <> 0` is already NULL when an operand of `d` is
    let implied: Vec<String> = lost
        .values()
        .filter_map(|guard| match guard {
            Expr::Compare { lhs, .. } => Some(polynomial::null_guards(lhs)),
            _ => None,
        })
        .flat_map(BTreeMap::into_keys)
        .collect();
    for key in implied {
        lost.remove(&key);
    }
    if lost.is_empty() {
        return single(result);
    }

    vec![
        (fold_and(lost.into_values().collect()), result),
        (Expr::bool(true), Expr::null()),
    ]
}

fn orient(op: CompareOp, lhs: Expr, rhs: Expr) -> Expr {
    let swap = match (lhs.is_literal(), rhs.is_literal()) {
        (true, false) => true,
        (false, false) => lhs.canonical_key() > rhs.canonical_key(),
        _ => false,
    };

    if swap {
        Expr::compare(op.flip(), rhs, lhs)
    } else {
        Expr::compare(op, lhs, rhs)
    }
}
