//! Module: synth::context
//! Responsibility: atom allocation, don't-care derivation and rendering for
//! the generic (expression-to-expression) minimizer.
//! Does not own: clause semantics (see `clause`) or physical store typing.
//! Boundary: one context per call; variables are never shared across calls.

use crate::{
    error::InternalError,
    expr::{CaseFold, CompareOp, Expr, Literal, compare_values, like::LikePattern},
    normalize::linear_form,
    synth::{
        espresso::Policy,
        sop::{Cube, Lit, Sop, complement_lit, is_negated, lit, var_of},
    },
};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap, HashSet},
};

// Groups larger than this fall back to pairwise order constraints.
const ENUMERATION_LIMIT: usize = 16;

///
/// Context
/// Atom provider behind the clause model. Each method returns the SOP of the
/// requested condition being TRUE.
///

pub(crate) trait Context: Policy {
    /// Rendered form of a cover.
    type Output;

    /// `lhs op rhs` with `op` one of `=`, `>`, `<`.
    fn compare(&mut self, lhs: &Expr, op: CompareOp, rhs: &Expr) -> Result<Sop, InternalError>;

    /// A non-literal value expression is null.
    fn null(&mut self, expr: &Expr) -> Result<Sop, InternalError>;

    /// `fold(lhs) LIKE pattern`.
    fn like(
        &mut self,
        lhs: &Expr,
        pattern: &LikePattern,
        fold: Option<CaseFold>,
    ) -> Result<Sop, InternalError>;

    /// LIKE with a pattern only known at run time.
    fn dynamic_like(&mut self, expr: &Expr) -> Result<Sop, InternalError>;

    /// Assignments no row can produce.
    fn dc(&self) -> Sop;

    fn variable_count(&self) -> usize;

    fn render(&self, sop: &Sop) -> Result<Self::Output, InternalError>;
}

/// Operands whose nullness forces `expr` to be null.
pub(crate) fn strict_operands(expr: &Expr) -> Vec<&Expr> {
    let operands: Vec<&Expr> = match expr {
        Expr::Arith { lhs, rhs, .. } | Expr::Compare { lhs, rhs, .. } | Expr::Concat(lhs, rhs) => {
            vec![&**lhs, &**rhs]
        }
        Expr::Func { name, args } if CaseFold::from_function_name(name).is_some() => {
            args.iter().collect()
        }
        Expr::Param(inner) | Expr::Not(inner) => vec![&**inner],
        Expr::Like {
            lhs,
            pattern,
            escape,
            ..
        } => {
            let mut operands = vec![&**lhs, &**pattern];
            operands.extend(escape.as_deref());
            operands
        }
        _ => Vec::new(),
    };

    operands.into_iter().filter(|e| !e.is_literal()).collect()
}

// `expr` and everything whose nullness makes it null.
fn null_closure(expr: &Expr) -> Vec<&Expr> {
    let mut out = vec![expr];
    let mut i = 0;
    while i < out.len() {
        let next = strict_operands(out[i]);
        out.extend(next);
        i += 1;
    }

    out
}

/// Don't-care cubes for comparisons of one value against ranked constants.
///
/// `atoms` holds `(variable, op, rank)`; equal ranks name the same constant.
/// With `absent` every all-false assignment needs one of those literals, since
/// a present value always satisfies some comparison region.
pub(crate) fn order_dc(atoms: &[(u32, CompareOp, usize)], absent: Option<&[Lit]>) -> Vec<Cube> {
    let ranked: Vec<Ranked> = atoms
        .iter()
        .map(|&(var, op, rank)| Ranked {
            var,
            op,
            rank,
            below: None,
        })
        .collect();

    ranked_dc(&ranked, absent)
}

///
/// Ranked
/// A comparison against the constant at `rank`. With `below` set the atom
/// is FALSE for every value at or above the point of that rank.
///

#[derive(Clone, Copy, Debug)]
struct Ranked {
    var: u32,
    op: CompareOp,
    rank: usize,
    below: Option<usize>,
}

impl Ranked {
    // even regions are the gaps around points, odd regions the points
    fn holds(&self, region: usize) -> bool {
        if self.below.is_some_and(|ceiling| region > 2 * ceiling) {
            return false;
        }
        let ordering = if region % 2 == 1 {
            (region / 2).cmp(&self.rank)
        } else if region / 2 > self.rank {
            Ordering::Greater
        } else {
            Ordering::Less
        };

        self.op.accepts(ordering)
    }
}

fn ranked_dc(atoms: &[Ranked], absent: Option<&[Lit]>) -> Vec<Cube> {
    if atoms.len() < 2 && absent.is_none() {
        return Vec::new();
    }
    let points = atoms
        .iter()
        .map(|a| a.rank.max(a.below.unwrap_or(0)) + 1)
        .max()
        .unwrap_or(0);
    let regions = 2 * points + 1;
    let present: Vec<Lit> = absent
        .unwrap_or_default()
        .iter()
        .map(|l| complement_lit(*l))
        .collect();

    if atoms.len() > ENUMERATION_LIMIT {
        let mut cubes = Vec::new();
        for (i, a) in atoms.iter().enumerate() {
            for b in &atoms[i + 1..] {
                for (ta, tb) in [(true, true), (true, false), (false, true), (false, false)] {
                    if (0..regions).any(|r| a.holds(r) == ta && b.holds(r) == tb) {
                        continue;
                    }
                    let mut lits = vec![lit(a.var, !ta), lit(b.var, !tb)];
                    if !ta && !tb {
                        if absent.is_none() {
                            continue;
                        }
                        lits.extend(&present);
                    }
                    cubes.extend(Cube::from_lits(lits));
                }
            }
        }
        return cubes;
    }

    let mut feasible: Vec<Cube> = (0..regions)
        .filter_map(|r| {
            let lits = atoms.iter().map(|a| lit(a.var, !a.holds(r)));
            Cube::from_lits(lits.chain(present.iter().copied()))
        })
        .collect();
    let all_false = || atoms.iter().map(|a| lit(a.var, true));
    match absent {
        None => feasible.extend(Cube::from_lits(all_false())),
        Some(lits) => {
            for l in lits {
                feasible.extend(Cube::from_lits(all_false().chain([*l])));
            }
        }
    }

    Sop::from_cubes(feasible).complement().into_cubes()
}

///
/// Atom
///

#[derive(Clone, Debug)]
enum Atom {
    Null(Expr),
    Compare {
        lhs: Expr,
        op: CompareOp,
        rhs: Expr,
    },
    Like {
        lhs: Expr,
        pattern: LikePattern,
        fold: Option<CaseFold>,
    },
    DynamicLike(Expr),
}

impl Atom {
    // Value expressions whose non-nullness the atom being TRUE implies.
    fn operands(&self) -> Vec<&Expr> {
        match self {
            Self::Null(_) => Vec::new(),
            Self::Compare { lhs, rhs, .. } => [lhs, rhs].into_iter().filter(|e| !e.is_literal()).collect(),
            Self::Like { lhs, .. } => vec![lhs],
            Self::DynamicLike(expr) => strict_operands(expr),
        }
    }
}

///
/// GenericContext
///
/// Atoms are null tests, three-operator comparisons, static LIKE matches and
/// opaque dynamic LIKE matches, interned by canonical text.
///

#[derive(Debug, Default)]
pub(crate) struct GenericContext {
    atoms: Vec<Atom>,
    index: HashMap<String, u32>,
}

impl GenericContext {
    fn intern(&mut self, key: String, atom: impl FnOnce() -> Atom) -> Sop {
        let next = u32::try_from(self.atoms.len()).unwrap_or(u32::MAX);
        let var = *self.index.entry(key).or_insert_with(|| {
            self.atoms.push(atom());
            next
        });

        Sop::from_lit(lit(var, false))
    }

    fn null_var(&self, expr: &Expr) -> Option<u32> {
        self.index.get(&null_key(expr)).copied()
    }

    fn atom(&self, l: Lit) -> Option<&Atom> {
        self.atoms.get(var_of(l) as usize)
    }

    fn vars(&self) -> impl Iterator<Item = (u32, &Atom)> {
        (0u32..).zip(&self.atoms)
    }

    // Positive atoms imply non-null operands; negated null tests add to that.
    fn dependency_dc(&self, cubes: &mut Vec<Cube>) {
        for (var, atom) in self.vars() {
            match atom {
                Atom::Null(expr) => {
                    for sub in null_closure(expr).into_iter().skip(1) {
                        if let Some(sub_var) = self.null_var(sub) {
                            cubes.extend(Cube::from_lits([lit(sub_var, false), lit(var, true)]));
                        }
                    }
                }
                other => {
                    for operand in other.operands() {
                        for sub in null_closure(operand) {
                            if let Some(null_var) = self.null_var(sub) {
                                cubes.extend(Cube::from_lits([lit(var, false), lit(null_var, false)]));
                            }
                        }
                    }
                }
            }
        }
    }

    // Comparisons against constants share one value line per left operand;
    // single-variable linear atoms join their variable's line at the root.
    fn ordering_dc(&self, cubes: &mut Vec<Cube>) {
        let mut constant_groups: BTreeMap<String, (Expr, Vec<LineAtom>)> = BTreeMap::new();
        let mut symbolic_groups: BTreeMap<(String, String), (&Expr, &Expr, Vec<(u32, CompareOp, usize)>)> =
            BTreeMap::new();
        for (var, atom) in self.vars() {
            let Atom::Compare { lhs, op, rhs } = atom else {
                continue;
            };
            match rhs {
                Expr::Literal(value) => {
                    if let Some((variable, line_atom)) = linear_atom(var, lhs, *op, value) {
                        constant_groups
                            .entry(variable.canonical_key())
                            .or_insert_with(|| (variable, Vec::new()))
                            .1
                            .push(line_atom);
                        continue;
                    }
                    constant_groups
                        .entry(lhs.canonical_key())
                        .or_insert_with(|| (lhs.clone(), Vec::new()))
                        .1
                        .push(LineAtom {
                            var,
                            op: *op,
                            value: value.clone(),
                            numeric: false,
                        });
                }
                _ => symbolic_groups
                    .entry((lhs.canonical_key(), rhs.canonical_key()))
                    .or_insert_with(|| (lhs, rhs, Vec::new()))
                    .2
                    .push((var, *op, 0)),
            }
        }

        for (lhs, group) in constant_groups.into_values() {
            let atoms = rank_constants(&group);
            let absent = self.null_var(&lhs).map(|v| vec![lit(v, false)]);
            cubes.extend(ranked_dc(&atoms, absent.as_deref()));
        }
        for (lhs, rhs, atoms) in symbolic_groups.into_values() {
            let absent: Option<Vec<Lit>> = [lhs, rhs]
                .into_iter()
                .filter(|e| !e.is_literal())
                .map(|e| self.null_var(e).map(|v| lit(v, false)))
                .collect();
            cubes.extend(order_dc(&atoms, absent.as_deref()));
        }
    }

    fn like_dc(&self, cubes: &mut Vec<Cube>) {
        let likes: Vec<(u32, String, Option<CaseFold>, &LikePattern)> = self
            .vars()
            .filter_map(|(var, atom)| match atom {
                Atom::Like { lhs, pattern, fold } => Some((var, lhs.canonical_key(), *fold, pattern)),
                _ => None,
            })
            .collect();

        for (i, (va, lhs_a, fold_a, pa)) in likes.iter().enumerate() {
            for (vb, lhs_b, fold_b, pb) in &likes[i + 1..] {
                if lhs_a != lhs_b || fold_a != fold_b {
                    continue;
                }
                if pa.contains(pb) {
                    cubes.extend(Cube::from_lits([lit(*vb, false), lit(*va, true)]));
                }
                if pb.contains(pa) {
                    cubes.extend(Cube::from_lits([lit(*va, false), lit(*vb, true)]));
                }
                if pa.is_disjoint(pb) {
                    cubes.extend(Cube::from_lits([lit(*va, false), lit(*vb, false)]));
                }
            }
        }

        for (vc, atom) in self.vars() {
            let Atom::Compare {
                lhs,
                op,
                rhs: Expr::Literal(value),
            } = atom
            else {
                continue;
            };
            let key = lhs.canonical_key();
            for (vl, lhs_l, fold, pattern) in &likes {
                if *lhs_l != key {
                    continue;
                }
                let c = |negated| lit(vc, negated);
                let l = |negated| lit(*vl, negated);
                let cube = match (value, op) {
                    // a match makes the value text, which sorts above numbers
                    (Literal::Bool(_) | Literal::Number(_), CompareOp::Eq | CompareOp::Lt) => {
                        Cube::from_lits([l(false), c(false)])
                    }
                    (Literal::Bool(_) | Literal::Number(_), CompareOp::Gt) => {
                        Cube::from_lits([l(false), c(true)])
                    }
                    (Literal::Text(text), CompareOp::Eq) => {
                        let folded = fold.map_or_else(|| text.clone(), |f| f.apply(text));
                        Cube::from_lits([c(false), l(pattern.matches(&folded))])
                    }
                    _ => None,
                };
                cubes.extend(cube);
            }
        }
    }

    fn render_cube(&self, cube: &Cube) -> Result<Expr, InternalError> {
        let known_null: HashSet<String> = cube
            .lits()
            .iter()
            .filter(|l| !is_negated(**l))
            .filter_map(|l| match self.atom(*l) {
                Some(Atom::Null(expr)) => Some(expr.canonical_key()),
                _ => None,
            })
            .collect();
        let mut known_present: HashSet<String> = HashSet::new();
        let mut referenced: HashSet<String> = HashSet::new();
        for l in cube.lits() {
            match self.lookup(*l)? {
                Atom::Null(expr) if is_negated(*l) => {
                    known_present.extend(null_closure(expr).iter().map(|e| e.canonical_key()));
                }
                Atom::Null(_) => {}
                other => {
                    let operands = other.operands();
                    if is_negated(*l)
                        && operands.iter().any(|e| known_null.contains(&e.canonical_key()))
                    {
                        continue;
                    }
                    for operand in operands {
                        referenced.insert(operand.canonical_key());
                        if !is_negated(*l) {
                            known_present
                                .extend(null_closure(operand).iter().map(|e| e.canonical_key()));
                        }
                    }
                }
            }
        }

        let mut conjuncts = Vec::with_capacity(cube.len());
        for l in cube.lits() {
            let negated = is_negated(*l);
            let atom = self.lookup(*l)?;
            let operands = atom.operands();
            if negated && operands.iter().any(|e| known_null.contains(&e.canonical_key())) {
                // a null operand already makes the atom non-TRUE
                continue;
            }
            let positive = match atom {
                Atom::Null(expr) => {
                    if negated && referenced.contains(&expr.canonical_key()) {
                        continue;
                    }
                    conjuncts.push(Expr::IsNull {
                        operand: Box::new(expr.clone()),
                        negated,
                    });
                    continue;
                }
                Atom::Compare { lhs, op, rhs } => Expr::compare(*op, lhs.clone(), rhs.clone()),
                Atom::Like { lhs, pattern, fold } => {
                    let lhs = fold.map_or_else(
                        || lhs.clone(),
                        |f| Expr::func(f.function_name(), vec![lhs.clone()]),
                    );
                    let (text, escape) = pattern.render();
                    Expr::like(
                        lhs,
                        Expr::text(text),
                        escape.map(|e| Expr::text(e.to_string())),
                        false,
                    )
                }
                Atom::DynamicLike(expr) => expr.clone(),
            };
            if !negated {
                conjuncts.push(positive);
                continue;
            }

            let mut alternatives = vec![negate_atom(positive)];
            for operand in operands {
                if !known_present.contains(&operand.canonical_key()) {
                    alternatives.push(Expr::is_null(operand.clone()));
                }
            }
            conjuncts.push(if alternatives.len() == 1 {
                alternatives.swap_remove(0)
            } else {
                Expr::Or(alternatives)
            });
        }

        conjuncts.sort_by_cached_key(Expr::canonical_key);

        Ok(match conjuncts.len() {
            0 => Expr::bool(true),
            1 => conjuncts.swap_remove(0),
            _ => Expr::And(conjuncts),
        })
    }

    fn lookup(&self, l: Lit) -> Result<&Atom, InternalError> {
        self.atom(l)
            .ok_or_else(|| InternalError::synth_invariant(format!("unallocated variable {}", var_of(l))))
    }
}

fn negate_atom(expr: Expr) -> Expr {
    match expr {
        Expr::Compare { op, lhs, rhs } => Expr::Compare {
            op: op.negate(),
            lhs,
            rhs,
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

fn null_key(expr: &Expr) -> String {
    format!("N:{expr}")
}

fn value_order(a: &Literal, b: &Literal) -> Ordering {
    compare_values(a, b).unwrap_or(Ordering::Equal)
}

///
/// LineAtom
/// A comparison of a value against a constant. A `numeric` atom is only
/// TRUE for numeric values.
///

#[derive(Debug)]
struct LineAtom {
    var: u32,
    op: CompareOp,
    value: Literal,
    numeric: bool,
}

// `k * x + c op 0` as `x op' -c/k`, when that root is exact in floating point.
fn linear_atom(var: u32, lhs: &Expr, op: CompareOp, rhs: &Literal) -> Option<(Expr, LineAtom)> {
    if !matches!(lhs, Expr::Arith { .. }) || rhs.numeric() != Some(0.0) {
        return None;
    }
    let form = linear_form(lhs)?;
    let mantissa = form.slope.abs().to_bits() & ((1u64 << 52) - 1);
    if mantissa != 0 || !form.slope.is_normal() || !form.root.is_finite() {
        return None;
    }
    let op = if form.slope < 0.0 { op.flip() } else { op };

    Some((
        form.variable,
        LineAtom {
            var,
            op,
            value: Literal::Number(form.root),
            numeric: true,
        },
    ))
}

// Dense ranks of the compared constants under the value order. Numeric
// atoms stop below the empty string, the least text value.
fn rank_constants(group: &[LineAtom]) -> Vec<Ranked> {
    let text_floor = Literal::Text(String::new());
    let mut points: Vec<&Literal> = group.iter().map(|atom| &atom.value).collect();
    let numeric = group.iter().any(|atom| atom.numeric);
    if numeric {
        points.push(&text_floor);
    }
    points.sort_by(|a, b| value_order(a, b));
    points.dedup_by(|a, b| value_order(a, b) == Ordering::Equal);
    let rank_of = |value: &Literal| {
        points
            .iter()
            .position(|p| value_order(p, value) == Ordering::Equal)
            .unwrap_or(0)
    };
    let ceiling = numeric.then(|| rank_of(&text_floor));

    group
        .iter()
        .map(|atom| Ranked {
            var: atom.var,
            op: atom.op,
            rank: rank_of(&atom.value),
            below: if atom.numeric { ceiling } else { None },
        })
        .collect()
}

impl Policy for GenericContext {
    // Keep a negated null test while a negated comparison on the same value
    // still relies on it for its rendering.
    fn can_raise(&self, cube: &Cube, l: Lit) -> bool {
        let Some(Atom::Null(expr)) = self.atom(l) else {
            return true;
        };
        if !is_negated(l) {
            return true;
        }
        let key = expr.canonical_key();

        !cube.lits().iter().any(|other| {
            is_negated(*other)
                && self.atom(*other).is_some_and(|atom| {
                    atom.operands().iter().any(|e| e.canonical_key() == key)
                })
        })
    }
}

impl Context for GenericContext {
    type Output = Expr;

    fn compare(&mut self, lhs: &Expr, op: CompareOp, rhs: &Expr) -> Result<Sop, InternalError> {
        if !matches!(op, CompareOp::Eq | CompareOp::Gt | CompareOp::Lt) {
            return Err(InternalError::synth_invariant(format!(
                "comparison atoms use =, > or <, got {}",
                op.symbol()
            )));
        }
        let key = format!("C:{}", Expr::compare(op, lhs.clone(), rhs.clone()));

        Ok(self.intern(key, || Atom::Compare {
            lhs: lhs.clone(),
            op,
            rhs: rhs.clone(),
        }))
    }

    fn null(&mut self, expr: &Expr) -> Result<Sop, InternalError> {
        Ok(self.intern(null_key(expr), || Atom::Null(expr.clone())))
    }

    fn like(
        &mut self,
        lhs: &Expr,
        pattern: &LikePattern,
        fold: Option<CaseFold>,
    ) -> Result<Sop, InternalError> {
        let (text, escape) = pattern.render();
        let fold_name = fold.map_or("", CaseFold::function_name);
        let key = format!("L:{fold_name}:{lhs}:{text}:{escape:?}");

        Ok(self.intern(key, || Atom::Like {
            lhs: lhs.clone(),
            pattern: pattern.clone(),
            fold,
        }))
    }

    fn dynamic_like(&mut self, expr: &Expr) -> Result<Sop, InternalError> {
        Ok(self.intern(format!("D:{expr}"), || Atom::DynamicLike(expr.clone())))
    }

    fn dc(&self) -> Sop {
        let mut cubes = Vec::new();
        self.dependency_dc(&mut cubes);
        self.ordering_dc(&mut cubes);
        self.like_dc(&mut cubes);

        Sop::from_cubes(cubes)
    }

    fn variable_count(&self) -> usize {
        self.atoms.len()
    }

    /// Canonical expression for a minimized cover; an empty cover is
    /// `false` and a universal one `true`. Conjuncts and disjuncts are
    /// ordered by canonical text, independent of variable allocation.
    fn render(&self, sop: &Sop) -> Result<Expr, InternalError> {
        if sop.is_empty() {
            return Ok(Expr::bool(false));
        }
        if sop.is_universe() {
            return Ok(Expr::bool(true));
        }

        let mut disjuncts = Vec::with_capacity(sop.cubes().len());
        for cube in sop.cubes() {
            match self.render_cube(cube)? {
                Expr::Or(children) => disjuncts.extend(children),
                other => disjuncts.push(other),
            }
        }

        disjuncts.sort_by_cached_key(Expr::canonical_key);
        disjuncts.dedup_by(|a, b| a.canonical_key() == b.canonical_key());

        Ok(if disjuncts.len() == 1 {
            disjuncts.swap_remove(0)
        } else {
            Expr::Or(disjuncts)
        })
    }
}
