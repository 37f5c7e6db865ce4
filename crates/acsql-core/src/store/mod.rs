//! Module: store
//! Responsibility: compile filters into document-store query documents.
//! Does not own: boolean minimization (see `synth`) or filter parsing.
//! Boundary: output is canonical extended JSON; an unsatisfiable filter is
//! reported as a value, never as an error.

mod context;
mod physical;
mod schema;

#[cfg(test)]
mod tests;

use crate::{
    error::InternalError,
    expr::Expr,
    normalize::normalize,
    obs::sink::{self, MetricsEvent},
    synth::{clause::Synth, record_minimize},
};
use context::StoreContext;
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

pub use schema::{Collection, Field, PhysicalType, StoreConfig, get_param, get_types};

///
/// StoreQuery
///

#[derive(Clone, Debug, PartialEq)]
pub enum StoreQuery {
    /// No document can satisfy the filter; callers skip the round trip.
    NeverMatches,
    Filter(Value),
}

impl StoreQuery {
    #[must_use]
    pub const fn never_matches(&self) -> bool {
        matches!(self, Self::NeverMatches)
    }

    /// Query document; an unsatisfiable filter becomes one that matches nothing.
    #[must_use]
    pub fn into_document(self) -> Value {
        match self {
            Self::NeverMatches => serde_json::json!({ "$nor": [{}] }),
            Self::Filter(doc) => doc,
        }
    }
}

/// Compile a boolean filter for `collection`, reading `NOW()` from the
/// system clock.
pub fn to_query(
    expr: &Expr,
    collection: Collection,
    config: &StoreConfig,
) -> Result<StoreQuery, InternalError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |elapsed| (elapsed.as_secs_f64() * 1000.0).floor());

    to_query_at(expr, collection, config, now)
}

/// Compile a boolean filter for `collection` with `NOW()` fixed to `now`
/// (epoch milliseconds).
#[instrument(name = "store::to_query", level = "debug", skip_all, fields(collection = %collection))]
pub fn to_query_at(
    expr: &Expr,
    collection: Collection,
    config: &StoreConfig,
    now: f64,
) -> Result<StoreQuery, InternalError> {
    let normalized = normalize(&with_instant(expr, now))?;
    let mut synth = Synth::new(StoreContext::new(collection, config));
    let clause = synth.clause(&normalized)?;
    let truthy = synth.truthy(&clause)?;
    let (cover, document) = synth.render_minimized(&truthy)?;
    record_minimize(&synth, &truthy, &cover);

    let never_matches = cover.is_empty();
    sink::record(MetricsEvent::StoreCompile {
        collection: collection.name(),
        never_matches,
    });
    debug!(cubes = cover.cubes().len(), never_matches, "compiled store filter");

    Ok(if never_matches {
        StoreQuery::NeverMatches
    } else {
        StoreQuery::Filter(document)
    })
}

// Replaces every `NOW()` with `now`; the store only compares constants.
fn with_instant(expr: &Expr, now: f64) -> Expr {
    let at = |e: &Expr| with_instant(e, now);
    let boxed = |e: &Expr| Box::new(with_instant(e, now));

    match expr {
        Expr::Func { name, args } if name == "NOW" && args.is_empty() => Expr::number(now),
        Expr::Literal(_) => expr.clone(),
        Expr::Param(name) => Expr::Param(boxed(name)),
        Expr::Func { name, args } => Expr::Func {
            name: name.clone(),
            args: args.iter().map(at).collect(),
        },
        Expr::And(operands) => Expr::And(operands.iter().map(at).collect()),
        Expr::Or(operands) => Expr::Or(operands.iter().map(at).collect()),
        Expr::Not(operand) => Expr::Not(boxed(operand)),
        Expr::Compare { op, lhs, rhs } => Expr::Compare {
            op: *op,
            lhs: boxed(lhs),
            rhs: boxed(rhs),
        },
        Expr::IsNull { operand, negated } => Expr::IsNull {
            operand: boxed(operand),
            negated: *negated,
        },
        Expr::Like {
            lhs,
            pattern,
            escape,
            negated,
        } => Expr::Like {
            lhs: boxed(lhs),
            pattern: boxed(pattern),
            escape: escape.as_deref().map(boxed),
            negated: *negated,
        },
        Expr::Case(arms) => Expr::Case(
            arms.iter()
                .map(|(guard, value)| (at(guard), at(value)))
                .collect(),
        ),
        Expr::Arith { op, lhs, rhs } => Expr::Arith {
            op: *op,
            lhs: boxed(lhs),
            rhs: boxed(rhs),
        },
        Expr::Concat(lhs, rhs) => Expr::Concat(boxed(lhs), boxed(rhs)),
    }
}
