//! Module: synth
//! Responsibility: canonical minimal boolean forms under three-valued logic.
//! Does not own: arithmetic canonicalization (see `normalize`) or backend
//! query shapes (see `store`).
//! Boundary: every public entry point normalizes its inputs first and uses
//! a fresh context per call.

pub(crate) mod clause;
pub(crate) mod context;
pub(crate) mod espresso;
pub(crate) mod sop;


use crate::{
    error::InternalError,
    expr::Expr,
    normalize::normalize,
    obs::sink::{self, MetricsEvent},
    synth::{
        clause::{Clause, Synth},
        context::{Context, GenericContext},
        sop::Sop,
    },
};
use tracing::{debug, instrument, trace};

// Re-minimization rounds before a candidate is taken as is.
const STABILIZE_ROUNDS: usize = 4;

/// Minimal canonical form of `expr`.
///
/// With `boolean` only the rows for which `expr` is TRUE are preserved (a
/// filter position). Otherwise TRUE, FALSE and NULL are all preserved, and
/// the normalized input is returned when the minimized form cannot be
/// proven equivalent.
#[instrument(name = "synth::minimize", level = "debug", skip_all)]
pub fn minimize(expr: &Expr, boolean: bool) -> Result<Expr, InternalError> {
    let normalized = normalize(expr)?;
    if !boolean && !boolean_valued(&normalized) {
        return Ok(normalized);
    }

    let mut synth = Synth::new(GenericContext::default());
    let clause = synth.clause(&normalized)?;
    let truthy = synth.truthy(&clause)?;
    let (cover, first) = synth.render_minimized(&truthy)?;
    record_minimize(&synth, &truthy, &cover);
    let candidate = stabilize(first)?;
    if boolean {
        return Ok(candidate);
    }

    let check = synth.clause(&candidate)?;
    if equivalent(&mut synth, &clause, &check)? {
        Ok(candidate)
    } else {
        debug!(candidate = %candidate, "tri-state check failed; keeping normalized form");
        sink::record(MetricsEvent::TristateFallback);
        Ok(normalized)
    }
}

/// Minimized `e1 OR e2` and the rows matching `e2` but not `e1`.
#[instrument(name = "synth::union_diff", level = "debug", skip_all)]
pub fn union_diff(e1: &Expr, e2: &Expr) -> Result<(Expr, Expr), InternalError> {
    let mut synth = Synth::new(GenericContext::default());
    let first = synth.clause(&normalize(e1)?)?;
    let second = synth.clause(&normalize(e2)?)?;
    let t1 = synth.truthy(&first)?;
    let t2 = synth.truthy(&second)?;

    let union_on = t1.or(&t2);
    let diff_on = t1.complement().and(&t2);
    let (union_cover, union) = synth.render_minimized(&union_on)?;
    record_minimize(&synth, &union_on, &union_cover);
    let (diff_cover, diff) = synth.render_minimized(&diff_on)?;
    record_minimize(&synth, &diff_on, &diff_cover);

    Ok((union, diff))
}

/// Whether every row matching `e2` also matches `e1`.
#[instrument(name = "synth::covers", level = "debug", skip_all)]
pub fn covers(e1: &Expr, e2: &Expr) -> Result<bool, InternalError> {
    let mut synth = Synth::new(GenericContext::default());
    let first = synth.clause(&normalize(e1)?)?;
    let second = synth.clause(&normalize(e2)?)?;
    let t1 = synth.truthy(&first)?;
    let t2 = synth.truthy(&second)?;

    Ok(t1.or(&synth.dc()).covers(&t2))
}

// A rendered cover can allocate its atoms in a different order than the
// input did; re-minimize in fresh contexts until the text is a fixed point.
fn stabilize(mut candidate: Expr) -> Result<Expr, InternalError> {
    for round in 0..STABILIZE_ROUNDS {
        let mut synth = Synth::new(GenericContext::default());
        let clause = synth.clause(&normalize(&candidate)?)?;
        let truthy = synth.truthy(&clause)?;
        let (_, next) = synth.render_minimized(&truthy)?;
        if next == candidate {
            trace!(round, "minimized form is stable");
            break;
        }
        candidate = next;
    }

    Ok(candidate)
}

// Values of this shape are always TRUE, FALSE or NULL.
fn boolean_valued(expr: &Expr) -> bool {
    match expr {
        Expr::Case(arms) => arms.iter().all(|(_, value)| boolean_valued(value)),
        other => other.is_boolean(),
    }
}

// Same TRUE and FALSE sets on every assignment a row can produce.
fn equivalent<C: Context>(
    synth: &mut Synth<C>,
    a: &Clause,
    b: &Clause,
) -> Result<bool, InternalError> {
    let dc = synth.dc();
    let same = |x: &Sop, y: &Sop| x.or(&dc).covers(y) && y.or(&dc).covers(x);

    Ok(same(&synth.truthy(a)?, &synth.truthy(b)?) && same(&synth.falsy(a)?, &synth.falsy(b)?))
}

pub(crate) fn record_minimize<C: Context>(synth: &Synth<C>, on: &Sop, cover: &Sop) {
    sink::record(MetricsEvent::Minimize {
        variables: synth.context().variable_count() as u64,
        cubes_in: on.cubes().len() as u64,
        cubes_out: cover.cubes().len() as u64,
    });
}
