//! Module: synth::clause
//! Responsibility: the three-valued clause tree and its TRUE/FALSE/NULL sets.
//! Does not own: atom allocation, don't-cares or rendering (see `context`).
//! Boundary: clauses are built from normalized expressions only.

use crate::{
    error::InternalError,
    expr::{CaseFold, CompareOp, Expr, Literal, compare_values, like::LikePattern, truth},
    synth::{context::Context, espresso, sop::Sop},
};
use std::{collections::HashMap, rc::Rc};

///
/// SetKind
/// Which of the three truth values a derived set describes.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum SetKind {
    Truthy,
    Falsy,
    Nullish,
}

///
/// Clause
///

#[derive(Debug)]
pub(crate) struct Clause {
    key: String,
    kind: ClauseKind,
}

///
/// ClauseKind
///
/// `Compare` only carries `=`, `>` and `<`; the other operators are `Not`
/// over their complements.
///

#[derive(Debug)]
pub(crate) enum ClauseKind {
    /// Constant truth value; `None` is null.
    Exp(Option<bool>),
    Compare {
        lhs: Expr,
        op: CompareOp,
        rhs: Expr,
    },
    IsNull(Expr),
    Not(Rc<Clause>),
    And(Vec<Rc<Clause>>),
    Or(Vec<Rc<Clause>>),
    Like(LikeClause),
    Case(Vec<(Rc<Clause>, Rc<Clause>)>),
}

///
/// LikeClause
///

#[derive(Debug)]
pub(crate) enum LikeClause {
    /// Constant pattern on a (possibly case-folded) value.
    Static {
        lhs: Expr,
        pattern: LikePattern,
        fold: Option<CaseFold>,
    },
    /// Pattern or escape only known per row; kept as a non-negated LIKE.
    Dynamic(Expr),
}

///
/// Synth
///
/// Clause interning plus memoized set derivation over one context.
///

pub(crate) struct Synth<C: Context> {
    ctx: C,
    interned: HashMap<String, Rc<Clause>>,
    sets: HashMap<(String, SetKind), Sop>,
}

impl<C: Context> Synth<C> {
    pub(crate) fn new(ctx: C) -> Self {
        Self {
            ctx,
            interned: HashMap::new(),
            sets: HashMap::new(),
        }
    }

    pub(crate) const fn context(&self) -> &C {
        &self.ctx
    }

    fn intern(&mut self, key: String, build: impl FnOnce() -> ClauseKind) -> Rc<Clause> {
        if let Some(clause) = self.interned.get(&key) {
            return Rc::clone(clause);
        }
        let clause = Rc::new(Clause {
            key: key.clone(),
            kind: build(),
        });
        self.interned.insert(key, Rc::clone(&clause));

        clause
    }

    fn constant(&mut self, value: Option<bool>) -> Rc<Clause> {
        let key = match value {
            Some(b) => b.to_string(),
            None => "NULL".to_string(),
        };

        self.intern(key, || ClauseKind::Exp(value))
    }

    /// Clause tree of a normalized expression in boolean position.
    pub(crate) fn clause(&mut self, expr: &Expr) -> Result<Rc<Clause>, InternalError> {
        let key = expr.canonical_key();
        if let Some(clause) = self.interned.get(&key) {
            return Ok(Rc::clone(clause));
        }

        let clause = match expr {
            Expr::Literal(value) => self.constant(truth(value)),
            Expr::And(children) | Expr::Or(children) => {
                let conjunction = matches!(expr, Expr::And(_));
                let mut flat = Vec::with_capacity(children.len());
                for child in children {
                    let child = self.clause(child)?;
                    match (&child.kind, conjunction) {
                        (ClauseKind::And(inner), true) | (ClauseKind::Or(inner), false) => {
                            flat.extend(inner.iter().cloned());
                        }
                        _ => flat.push(child),
                    }
                }
                self.intern(key, || {
                    if conjunction {
                        ClauseKind::And(flat)
                    } else {
                        ClauseKind::Or(flat)
                    }
                })
            }
            Expr::Not(operand) => {
                let inner = self.clause(operand)?;
                self.intern(key, || ClauseKind::Not(inner))
            }
            Expr::Compare { op, lhs, rhs } => self.compare_clause(key, *op, lhs, rhs),
            Expr::IsNull { operand, negated } => {
                if let Expr::Literal(value) = operand.as_ref() {
                    return Ok(self.constant(Some(value.is_null() != *negated)));
                }
                let positive = self.intern(Expr::is_null((**operand).clone()).canonical_key(), || {
                    ClauseKind::IsNull((**operand).clone())
                });
                if *negated {
                    self.intern(key, || ClauseKind::Not(positive))
                } else {
                    positive
                }
            }
            Expr::Like {
                lhs,
                pattern,
                escape,
                negated,
            } => self.like_clause(key, lhs, pattern, escape.as_deref(), *negated)?,
            Expr::Case(arms) => {
                let mut out = Vec::with_capacity(arms.len());
                for (guard, value) in arms {
                    out.push((self.clause(guard)?, self.clause(value)?));
                }
                self.intern(key, || ClauseKind::Case(out))
            }
            // a value in boolean position is true only when it equals true
            Expr::Param(_) | Expr::Func { .. } | Expr::Arith { .. } | Expr::Concat(..) => {
                self.compare_clause(key, CompareOp::Eq, expr, &Expr::bool(true))
            }
        };

        Ok(clause)
    }

    fn compare_clause(&mut self, key: String, op: CompareOp, lhs: &Expr, rhs: &Expr) -> Rc<Clause> {
        match (lhs, rhs) {
            (Expr::Literal(a), Expr::Literal(b)) => {
                return self.constant(compare_values(a, b).map(|ord| op.accepts(ord)));
            }
            (Expr::Literal(Literal::Null), _) | (_, Expr::Literal(Literal::Null)) => {
                return self.constant(None);
            }
            (Expr::Literal(_), _) => return self.compare_clause(key, op.flip(), rhs, lhs),
            _ => {}
        }

        let (base, negated) = match op {
            CompareOp::Eq | CompareOp::Gt | CompareOp::Lt => (op, false),
            other => (other.negate(), true),
        };
        let base_key = Expr::compare(base, lhs.clone(), rhs.clone()).canonical_key();
        let positive = self.intern(base_key, || ClauseKind::Compare {
            lhs: lhs.clone(),
            op: base,
            rhs: rhs.clone(),
        });
        if negated {
            self.intern(key, || ClauseKind::Not(positive))
        } else {
            positive
        }
    }

    fn like_clause(
        &mut self,
        key: String,
        lhs: &Expr,
        pattern: &Expr,
        escape: Option<&Expr>,
        negated: bool,
    ) -> Result<Rc<Clause>, InternalError> {
        let positive_expr = Expr::like(lhs.clone(), pattern.clone(), escape.cloned(), false);
        let positive = match (pattern, escape) {
            (Expr::Literal(Literal::Null), _) | (_, Some(Expr::Literal(Literal::Null))) => {
                self.constant(None)
            }
            (Expr::Literal(text), None | Some(Expr::Literal(_))) => {
                let escape = escape
                    .and_then(Expr::as_literal)
                    .and_then(Literal::to_text)
                    .and_then(|e| e.chars().next());
                let pattern = LikePattern::parse(&text.to_text().unwrap_or_default(), escape);
                let (lhs, fold) = match lhs {
                    Expr::Func { name, args } => match (CaseFold::from_function_name(name), args.as_slice()) {
                        (Some(fold), [arg]) => (arg.clone(), Some(fold)),
                        _ => (lhs.clone(), None),
                    },
                    _ => (lhs.clone(), None),
                };
                if let Expr::Literal(value) = &lhs {
                    let folded = value
                        .as_text()
                        .map(|t| fold.map_or_else(|| t.to_string(), |f| f.apply(t)));
                    return Ok(self.constant(match value {
                        Literal::Null => None,
                        _ => Some(folded.is_some_and(|t| pattern.matches(&t)) != negated),
                    }));
                }
                self.intern(positive_expr.canonical_key(), || {
                    ClauseKind::Like(LikeClause::Static { lhs, pattern, fold })
                })
            }
            _ => self.intern(positive_expr.canonical_key(), || {
                ClauseKind::Like(LikeClause::Dynamic(positive_expr))
            }),
        };

        Ok(if negated {
            self.intern(key, || ClauseKind::Not(positive))
        } else {
            positive
        })
    }

    /// Rows for which `expr`, as a value, is null.
    fn value_null(&mut self, expr: &Expr) -> Result<Sop, InternalError> {
        match expr {
            Expr::Literal(Literal::Null) => Ok(Sop::universe()),
            Expr::Literal(_) | Expr::IsNull { .. } => Ok(Sop::empty()),
            _ => self.ctx.null(expr),
        }
    }

    pub(crate) fn truthy(&mut self, clause: &Clause) -> Result<Sop, InternalError> {
        self.set(clause, SetKind::Truthy)
    }

    pub(crate) fn falsy(&mut self, clause: &Clause) -> Result<Sop, InternalError> {
        self.set(clause, SetKind::Falsy)
    }

    pub(crate) fn nullish(&mut self, clause: &Clause) -> Result<Sop, InternalError> {
        self.set(clause, SetKind::Nullish)
    }

    fn set(&mut self, clause: &Clause, kind: SetKind) -> Result<Sop, InternalError> {
        let memo_key = (clause.key.clone(), kind);
        if let Some(sop) = self.sets.get(&memo_key) {
            return Ok(sop.clone());
        }
        let sop = self.derive(clause, kind)?;
        self.sets.insert(memo_key, sop.clone());

        Ok(sop)
    }

    fn derive(&mut self, clause: &Clause, kind: SetKind) -> Result<Sop, InternalError> {
        match &clause.kind {
            ClauseKind::Exp(value) => Ok(match (value, kind) {
                (Some(true), SetKind::Truthy)
                | (Some(false), SetKind::Falsy)
                | (None, SetKind::Nullish) => Sop::universe(),
                _ => Sop::empty(),
            }),
            ClauseKind::Compare { lhs, op, rhs } => self.atom_set(
                kind,
                |s| s.ctx.compare(lhs, *op, rhs),
                |s| Ok(s.value_null(lhs)?.or(&s.value_null(rhs)?)),
            ),
            ClauseKind::IsNull(operand) => {
                let null = self.value_null(operand)?;
                Ok(match kind {
                    SetKind::Truthy => null,
                    SetKind::Falsy => null.complement(),
                    SetKind::Nullish => Sop::empty(),
                })
            }
            ClauseKind::Not(inner) => match kind {
                SetKind::Truthy => self.falsy(inner),
                SetKind::Falsy => self.truthy(inner),
                SetKind::Nullish => self.nullish(inner),
            },
            ClauseKind::And(children) => self.connective(children, kind, true),
            ClauseKind::Or(children) => self.connective(children, kind, false),
            ClauseKind::Like(LikeClause::Static { lhs, pattern, fold }) => {
                if fold.is_some_and(|f| !pattern.consistent_with(f)) {
                    // never TRUE; NULL exactly when the value is
                    return self.atom_set(kind, |_| Ok(Sop::empty()), |s| s.value_null(lhs));
                }
                self.atom_set(kind, |s| s.ctx.like(lhs, pattern, *fold), |s| s.value_null(lhs))
            }
            ClauseKind::Like(LikeClause::Dynamic(expr)) => self.atom_set(
                kind,
                |s| s.ctx.dynamic_like(expr),
                |s| {
                    let mut null = Sop::empty();
                    if let Expr::Like {
                        lhs,
                        pattern,
                        escape,
                        ..
                    } = expr
                    {
                        for operand in [Some(&**lhs), Some(&**pattern), escape.as_deref()]
                            .into_iter()
                            .flatten()
                        {
                            null = null.or(&s.value_null(operand)?);
                        }
                    }
                    Ok(null)
                },
            ),
            ClauseKind::Case(arms) => self.case(arms, kind),
        }
    }

    // TRUE from the context; FALSE is what is neither TRUE nor null.
    fn atom_set(
        &mut self,
        kind: SetKind,
        truthy: impl FnOnce(&mut Self) -> Result<Sop, InternalError>,
        null: impl FnOnce(&mut Self) -> Result<Sop, InternalError>,
    ) -> Result<Sop, InternalError> {
        match kind {
            SetKind::Nullish => null(self),
            SetKind::Truthy => truthy(self),
            SetKind::Falsy => {
                let truthy = truthy(self)?;
                Ok(truthy.or(&null(self)?).complement())
            }
        }
    }

    fn connective(
        &mut self,
        children: &[Rc<Clause>],
        kind: SetKind,
        conjunction: bool,
    ) -> Result<Sop, InternalError> {
        // the absorbing value: FALSE for AND, TRUE for OR
        let (absorbing, neutral) = if conjunction {
            (SetKind::Falsy, SetKind::Truthy)
        } else {
            (SetKind::Truthy, SetKind::Falsy)
        };

        if kind == neutral {
            let mut acc = Sop::universe();
            for child in children {
                acc = acc.and(&self.set(child, neutral)?);
            }
            return Ok(acc);
        }

        let mut any_absorbing = Sop::empty();
        for child in children {
            any_absorbing = any_absorbing.or(&self.set(child, absorbing)?);
        }
        if kind == absorbing {
            return Ok(any_absorbing);
        }

        let mut any_null = Sop::empty();
        for child in children {
            any_null = any_null.or(&self.nullish(child)?);
        }

        Ok(any_absorbing.complement().and(&any_null))
    }

    fn case(&mut self, arms: &[(Rc<Clause>, Rc<Clause>)], kind: SetKind) -> Result<Sop, InternalError> {
        let mut not_taken = Sop::universe();
        let mut acc = Sop::empty();
        for (guard, value) in arms {
            let guard_true = self.truthy(guard)?;
            let taken = not_taken.and(&guard_true);
            acc = acc.or(&taken.and(&self.set(value, kind)?));
            not_taken = not_taken.and(&guard_true.complement());
        }
        if kind == SetKind::Nullish {
            acc = acc.or(&not_taken);
        }

        Ok(acc)
    }

    pub(crate) fn dc(&self) -> Sop {
        self.ctx.dc()
    }

    /// Minimized cover of `on` rendered through the context.
    pub(crate) fn render_minimized(&self, on: &Sop) -> Result<(Sop, C::Output), InternalError> {
        let cover = espresso::minimize(on, &self.dc(), &self.ctx);
        let output = self.ctx.render(&cover)?;

        Ok((cover, output))
    }
}
