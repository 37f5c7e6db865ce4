use crate::{
    expr::{ArithOp, CompareOp, Expr, Literal},
    normalize::rational::{Rational, gcd},
};
use num_bigint::BigInt;
use num_traits::{One, ToPrimitive};
use std::{cmp::Reverse, collections::BTreeMap};

type MonomialKey = Vec<(String, i32)>;

///
/// Monomial
/// Product of indeterminates with non-zero integer powers, keyed by the
/// canonical text of each indeterminate.
///

#[derive(Clone, Debug, Default)]
struct Monomial {
    factors: BTreeMap<String, (Expr, i32)>,
}

impl Monomial {
    fn indeterminate(expr: Expr, power: i32) -> Self {
        let mut factors = BTreeMap::new();
        factors.insert(expr.canonical_key(), (expr, power));

        Self { factors }
    }

    fn key(&self) -> MonomialKey {
        self.factors
            .iter()
            .map(|(key, (_, power))| (key.clone(), *power))
            .collect()
    }

    fn degree(&self) -> i32 {
        self.factors.values().map(|(_, power)| *power).sum()
    }

    fn is_constant(&self) -> bool {
        self.factors.is_empty()
    }

    fn mul(&self, other: &Self) -> Self {
        let mut factors = self.factors.clone();
        for (key, (expr, power)) in &other.factors {
            let entry = factors
                .entry(key.clone())
                .or_insert_with(|| (expr.clone(), 0));
            entry.1 += power;
            if entry.1 == 0 {
                factors.remove(key);
            }
        }

        Self { factors }
    }

    fn inverse(&self) -> Self {
        let factors = self
            .factors
            .iter()
            .map(|(key, (expr, power))| (key.clone(), (expr.clone(), -power)))
            .collect();

        Self { factors }
    }
}

///
/// Polynomial
/// Sum of monomials with exact rational coefficients; zero coefficients are
/// never stored.
///

#[derive(Clone, Debug, Default)]
pub(crate) struct Polynomial {
    terms: BTreeMap<MonomialKey, (Monomial, Rational)>,
}

impl Polynomial {
    fn constant(value: Rational) -> Self {
        let mut poly = Self::default();
        poly.add_term(Monomial::default(), value);

        poly
    }

    fn single(monomial: Monomial, coefficient: Rational) -> Self {
        let mut poly = Self::default();
        poly.add_term(monomial, coefficient);

        poly
    }

    fn add_term(&mut self, monomial: Monomial, coefficient: Rational) {
        let key = monomial.key();
        let sum = match self.terms.remove(&key) {
            Some((_, existing)) => &existing + &coefficient,
            None => coefficient,
        };
        if !sum.is_zero() {
            self.terms.insert(key, (monomial, sum));
        }
    }

    /// Arithmetic view of an expression; `None` when it evaluates to null
    /// (null or text operands, division by zero).
    pub(crate) fn from_expr(expr: &Expr) -> Option<Self> {
        match expr {
            Expr::Literal(Literal::Null | Literal::Text(_)) => None,
            Expr::Literal(lit) => Rational::from_f64(lit.numeric()?).map(Self::constant),
            Expr::Arith { op, lhs, rhs } => {
                let lhs = Self::from_expr(lhs)?;
                let rhs = Self::from_expr(rhs)?;
                match op {
                    ArithOp::Add => Some(lhs.add(&rhs)),
                    ArithOp::Sub => Some(lhs.sub(&rhs)),
                    ArithOp::Mul => Some(lhs.mul(&rhs)),
                    ArithOp::Div => lhs.div(&rhs),
                }
            }
            other => Some(Self::single(
                Monomial::indeterminate(other.clone(), 1),
                Rational::one(),
            )),
        }
    }

    pub(crate) fn add(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for (monomial, coefficient) in other.terms.values() {
            out.add_term(monomial.clone(), coefficient.clone());
        }

        out
    }

    pub(crate) fn sub(&self, other: &Self) -> Self {
        self.add(&other.scale(&-Rational::one()))
    }

    fn scale(&self, factor: &Rational) -> Self {
        let mut out = Self::default();
        for (monomial, coefficient) in self.terms.values() {
            out.add_term(monomial.clone(), coefficient * factor);
        }

        out
    }

    fn mul(&self, other: &Self) -> Self {
        let mut out = Self::default();
        for (m1, c1) in self.terms.values() {
            for (m2, c2) in other.terms.values() {
                out.add_term(m1.mul(m2), c1 * c2);
            }
        }

        out
    }

    fn div(&self, divisor: &Self) -> Option<Self> {
        match divisor.terms.len() {
            0 => None,
            1 => {
                let (monomial, coefficient) = divisor.terms.values().next()?;
                let inverse = Self::single(monomial.inverse(), coefficient.recip()?);
                Some(self.mul(&inverse))
            }
            _ => {
                let opaque = Monomial::indeterminate(divisor.render(), -1);
                Some(self.mul(&Self::single(opaque, Rational::one())))
            }
        }
    }

    pub(crate) fn constant_value(&self) -> Option<Rational> {
        match self.terms.len() {
            0 => Some(Rational::zero()),
            1 => self
                .terms
                .values()
                .find(|(m, _)| m.is_constant())
                .map(|(_, c)| c.clone()),
            _ => None,
        }
    }

    // Single indeterminate, power one, coefficient one, no constant.
    fn bare_indeterminate(&self) -> Option<&Expr> {
        let mut terms = self.terms.values();
        let (Some((monomial, coefficient)), None) = (terms.next(), terms.next()) else {
            return None;
        };
        let expr = single_factor(monomial)?;

        coefficient.is_one().then_some(expr)
    }

    /// `a * x + b` when the polynomial is linear in one indeterminate.
    pub(crate) fn linear_form(&self) -> Option<(Expr, Rational, Rational)> {
        let mut variable = None;
        let mut constant = Rational::zero();
        for (monomial, coefficient) in self.terms.values() {
            if monomial.is_constant() {
                constant = coefficient.clone();
                continue;
            }
            let expr = single_factor(monomial)?;
            if variable.is_some() {
                return None;
            }
            variable = Some((expr.clone(), coefficient.clone()));
        }
        let (expr, slope) = variable?;

        Some((expr, slope, constant))
    }

    // Non-constant terms by descending degree then key; constant last.
    fn ordered_terms(&self) -> Vec<&(Monomial, Rational)> {
        let mut terms: Vec<_> = self.terms.values().collect();
        terms.sort_by_key(|(m, _)| (m.is_constant(), Reverse(m.degree()), m.key()));

        terms
    }

    /// Scale to coprime integer coefficients with a positive leading term.
    /// Returns whether the sign was flipped.
    pub(crate) fn canonicalize_sign(&self) -> (Self, bool) {
        let mut lcm = BigInt::one();
        for (_, coefficient) in self.terms.values() {
            let den = coefficient.denom();
            lcm = &lcm * den / gcd(&lcm, den);
        }
        let scaled = self.scale(&Rational::integer(lcm));

        let mut divisor = BigInt::from(0);
        for (_, coefficient) in scaled.terms.values() {
            divisor = gcd(&divisor, coefficient.numer());
        }
        let mut out = match Rational::integer(divisor).recip() {
            Some(inverse) => scaled.scale(&inverse),
            None => scaled,
        };

        let flipped = out
            .ordered_terms()
            .first()
            .is_some_and(|(_, c)| c.is_negative());
        if flipped {
            out = out.scale(&-Rational::one());
        }

        (out, flipped)
    }

    /// Deterministic arithmetic tree; a bare indeterminate keeps `+ 0` so the
    /// numeric coercion of the original arithmetic survives.
    pub(crate) fn render(&self) -> Expr {
        if let Some(value) = self.constant_value() {
            return rational_literal(&value);
        }
        if let Some(expr) = self.bare_indeterminate() {
            return Expr::arith(ArithOp::Add, expr.clone(), Expr::number(0.0));
        }
        if let Some((factor, rest)) = self.split_common_factor() {
            let factor = render_term(&Rational::one(), &factor);
            return Expr::arith(ArithOp::Mul, factor, rest.render_sum());
        }

        self.render_sum()
    }

    fn render_sum(&self) -> Expr {
        let mut acc: Option<Expr> = None;
        for (monomial, coefficient) in self.ordered_terms() {
            acc = Some(match acc {
                None => render_term(coefficient, monomial),
                Some(prev) if coefficient.is_negative() => Expr::arith(
                    ArithOp::Sub,
                    prev,
                    render_term(&coefficient.abs(), monomial),
                ),
                Some(prev) => Expr::arith(ArithOp::Add, prev, render_term(coefficient, monomial)),
            });
        }

        acc.unwrap_or_else(|| Expr::number(0.0))
    }

    // Largest monomial with positive powers dividing every term.
    fn split_common_factor(&self) -> Option<(Monomial, Self)> {
        if self.terms.len() < 2 {
            return None;
        }
        let mut terms = self.terms.values();
        let (first, _) = terms.next()?;
        let mut common: BTreeMap<String, (Expr, i32)> = first
            .factors
            .iter()
            .filter(|(_, (_, power))| *power > 0)
            .map(|(key, factor)| (key.clone(), factor.clone()))
            .collect();
        for (monomial, _) in terms {
            common.retain(|key, (_, power)| match monomial.factors.get(key) {
                Some((_, p)) if *p > 0 => {
                    *power = (*power).min(*p);
                    true
                }
                _ => false,
            });
        }
        if common.is_empty() {
            return None;
        }

        let factor = Monomial { factors: common };
        let inverse = factor.inverse();
        let mut rest = Self::default();
        for (monomial, coefficient) in self.terms.values() {
            rest.add_term(monomial.mul(&inverse), coefficient.clone());
        }

        Some((factor, rest))
    }
}

/// Conditions under which arithmetic over `expr` is not NULL, keyed by
/// canonical text: every operand is numeric and every divisor non-zero.
pub(crate) fn null_guards(expr: &Expr) -> BTreeMap<String, Expr> {
    let mut guards = BTreeMap::new();
    collect_guards(expr, &mut guards);

    guards
}

fn collect_guards(expr: &Expr, guards: &mut BTreeMap<String, Expr>) {
    let guard = match expr {
        Expr::Literal(_) => return,
        Expr::Arith { op, lhs, rhs } => {
            collect_guards(lhs, guards);
            collect_guards(rhs, guards);
            if *op != ArithOp::Div {
                return;
            }
            let Some(divisor) = Polynomial::from_expr(rhs) else {
                return;
            };
            if divisor.constant_value().is_some() {
                return;
            }
            let (canonical, _) = divisor.canonicalize_sign();
            Expr::compare(CompareOp::Ne, canonical.render(), Expr::number(0.0))
        }
        operand => Expr::IsNull {
            operand: Box::new(Expr::arith(
                ArithOp::Add,
                operand.clone(),
                Expr::number(0.0),
            )),
            negated: true,
        },
    };
    guards.entry(guard.canonical_key()).or_insert(guard);
}

// The indeterminate of a degree-one monomial in one variable.
fn single_factor(monomial: &Monomial) -> Option<&Expr> {
    let mut factors = monomial.factors.values();
    match (factors.next(), factors.next()) {
        (Some((expr, 1)), None) => Some(expr),
        _ => None,
    }
}

fn rational_literal(value: &Rational) -> Expr {
    value.to_f64().map_or_else(Expr::null, Expr::number)
}

fn big_literal(value: &BigInt) -> Expr {
    value.to_f64().map_or_else(Expr::null, Expr::number)
}

fn render_term(coefficient: &Rational, monomial: &Monomial) -> Expr {
    let mut positive = Vec::new();
    let mut negative = Vec::new();
    for (expr, power) in monomial.factors.values() {
        let target = if *power > 0 {
            &mut positive
        } else {
            &mut negative
        };
        for _ in 0..power.unsigned_abs() {
            target.push(expr.clone());
        }
    }

    let mut factors = Vec::new();
    if !coefficient.numer().is_one() || positive.is_empty() {
        factors.push(big_literal(coefficient.numer()));
    }
    factors.extend(positive);

    let mut iter = factors.into_iter();
    let first = iter.next().unwrap_or_else(|| Expr::number(1.0));
    let mut expr = iter.fold(first, |acc, f| Expr::arith(ArithOp::Mul, acc, f));
    if !coefficient.denom().is_one() {
        expr = Expr::arith(ArithOp::Div, expr, big_literal(coefficient.denom()));
    }
    for divisor in negative {
        expr = Expr::arith(ArithOp::Div, expr, divisor);
    }

    expr
}
