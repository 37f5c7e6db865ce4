//! Module: paginate
//! Responsibility: keyset bookmarks and planning of partially fetched
//! result windows.
//! Does not own: minimization (see `synth`) or store query shapes.
//! Boundary: nulls sort last ascending and first descending on every key.


use crate::{
    error::{ErrorOrigin, InternalError},
    expr::{CompareOp, Expr, Literal, Row, compare_values},
    normalize::normalize,
    obs::sink::{self, MetricsEvent},
    synth::{
        clause::Synth,
        context::{Context, GenericContext},
        record_minimize,
        sop::Sop,
    },
};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, instrument};

///
/// OrderDirection
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[display("ASC")]
    Asc,
    #[display("DESC")]
    Desc,
}

///
/// OrderSpec
/// Sort keys, most significant first.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct OrderSpec {
    pub fields: Vec<(String, OrderDirection)>,
}

impl OrderSpec {
    #[must_use]
    pub const fn new(fields: Vec<(String, OrderDirection)>) -> Self {
        Self { fields }
    }

    /// Relative position of two rows under this order.
    pub fn compare_rows<R: Row + ?Sized>(&self, a: &R, b: &R) -> Ordering {
        self.fields
            .iter()
            .map(|(key, direction)| sort_order(&a.param(key), &b.param(key), *direction))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

// Position of `a` relative to `b` on one key; `Null` is the null position.
fn sort_order(a: &Literal, b: &Literal, direction: OrderDirection) -> Ordering {
    let ascending = match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare_values(a, b).unwrap_or(Ordering::Equal),
    };

    match direction {
        OrderDirection::Asc => ascending,
        OrderDirection::Desc => ascending.reverse(),
    }
}

///
/// Bookmark
/// Sort-key values of the last row of a page, one per order field.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Bookmark {
    pub values: Vec<Literal>,
}

/// Bookmark of `row` under `order`.
#[must_use]
pub fn to_bookmark<R: Row + ?Sized>(order: &OrderSpec, row: &R) -> Bookmark {
    Bookmark {
        values: order.fields.iter().map(|(key, _)| row.param(key)).collect(),
    }
}

/// Filter matching the rows that sort strictly after `bookmark`.
pub fn bookmark_to_expression(bookmark: &Bookmark, order: &OrderSpec) -> Result<Expr, InternalError> {
    if bookmark.values.len() != order.fields.len() {
        return Err(InternalError::invalid_query(
            ErrorOrigin::Paginate,
            format!(
                "bookmark has {} values for {} order fields",
                bookmark.values.len(),
                order.fields.len()
            ),
        ));
    }

    let mut after = Expr::bool(false);
    for ((key, direction), value) in order.fields.iter().zip(&bookmark.values).rev() {
        let key = Expr::param(key.as_str());
        after = either(
            sorts_after(&key, value, *direction),
            both(sorts_at(&key, value), after),
        );
    }

    Ok(after)
}

/// Split `to_fetch` into the rows already covered by the fetched window and
/// the rows still to be fetched.
///
/// The fetched rows are only trusted up to the first row, in sort order,
/// that `fetched` misses; `covered` is the part of `to_fetch` strictly
/// before every such row, so every covered row matches `fetched`.
#[instrument(name = "paginate::paginate", level = "debug", skip_all)]
pub fn paginate(
    fetched: &Expr,
    to_fetch: &Expr,
    order: &OrderSpec,
) -> Result<(Expr, Expr), InternalError> {
    let mut synth = Synth::new(GenericContext::default());
    let fetched_clause = synth.clause(&normalize(fetched)?)?;
    let wanted_clause = synth.clause(&normalize(to_fetch)?)?;
    let fetched_on = synth.truthy(&fetched_clause)?;
    let wanted_on = synth.truthy(&wanted_clause)?;

    let missing = fetched_on.complement().and(&wanted_on);
    let (gaps, _) = synth.render_minimized(&missing)?;
    sink::record(MetricsEvent::Paginate {
        gap_cubes: gaps.cubes().len() as u64,
    });

    let mut prefixes = Vec::with_capacity(gaps.cubes().len());
    for cube in gaps.cubes() {
        let rendered = synth.context().render(&Sop::from_cubes([cube.clone()]))?;
        prefixes.push(prefix(&rendered, &order.fields));
    }
    debug!(gaps = prefixes.len(), "planned window prefixes");

    let bound = match prefixes.len() {
        0 => Expr::bool(true),
        1 => prefixes.swap_remove(0),
        _ => Expr::And(prefixes),
    };
    let bound_clause = synth.clause(&normalize(&bound)?)?;
    let bound_on = synth.truthy(&bound_clause)?;

    let covered_on = wanted_on.and(&bound_on);
    let (covered_cover, covered) = synth.render_minimized(&covered_on)?;
    record_minimize(&synth, &covered_on, &covered_cover);

    let gap_on = wanted_on.and(&bound_on.complement());
    let (gap_cover, gap) = synth.render_minimized(&gap_on)?;
    record_minimize(&synth, &gap_on, &gap_cover);

    Ok((covered, gap))
}

///
/// Bound
/// Every row of a gap cube sorts at `at` or later on one key; strictly
/// later when `strict`. `Null` stands for the null position.
///

#[derive(Clone, Debug)]
struct Bound {
    at: Literal,
    strict: bool,
}

impl Bound {
    fn compare(&self, other: &Self, direction: OrderDirection) -> Ordering {
        sort_order(&self.at, &other.at, direction).then(self.strict.cmp(&other.strict))
    }
}

// Tightest lower sort bound on `key` that `expr` being TRUE implies.
fn bound_of(expr: &Expr, key: &str, direction: OrderDirection) -> Option<Bound> {
    match expr {
        Expr::And(children) => children
            .iter()
            .filter_map(|child| bound_of(child, key, direction))
            .max_by(|a, b| a.compare(b, direction)),
        Expr::Or(children) => {
            let bounds: Option<Vec<Bound>> =
                children.iter().map(|child| bound_of(child, key, direction)).collect();
            bounds?.into_iter().min_by(|a, b| a.compare(b, direction))
        }
        Expr::Compare { op, lhs, rhs } if lhs.param_path() == Some(key) => {
            let value = rhs.as_literal().filter(|v| !v.is_null())?;
            let strict = match (*op, direction) {
                (CompareOp::Eq, _)
                | (CompareOp::Gte, OrderDirection::Asc)
                | (CompareOp::Lte, OrderDirection::Desc) => false,
                (CompareOp::Gt, OrderDirection::Asc) | (CompareOp::Lt, OrderDirection::Desc) => {
                    true
                }
                _ => return None,
            };
            Some(Bound {
                at: value.clone(),
                strict,
            })
        }
        Expr::IsNull { operand, negated } if operand.param_path() == Some(key) => {
            match (*negated, direction) {
                (false, _) => Some(Bound {
                    at: Literal::Null,
                    strict: false,
                }),
                // nulls lead a descending order
                (true, OrderDirection::Desc) => Some(Bound {
                    at: Literal::Null,
                    strict: true,
                }),
                (true, OrderDirection::Asc) => None,
            }
        }
        _ => None,
    }
}

// Rows sorting strictly before every row of `cube`, by tiered descent.
fn prefix(cube: &Expr, fields: &[(String, OrderDirection)]) -> Expr {
    let Some(((key, direction), rest)) = fields.split_first() else {
        return Expr::bool(false);
    };
    let Some(bound) = bound_of(cube, key, *direction) else {
        return Expr::bool(false);
    };
    let key = Expr::param(key.as_str());

    if bound.strict {
        return either(
            sorts_before(&key, &bound.at, *direction),
            sorts_at(&key, &bound.at),
        );
    }

    either(
        sorts_before(&key, &bound.at, *direction),
        both(sorts_at(&key, &bound.at), prefix(cube, rest)),
    )
}

fn compare(op: CompareOp, key: &Expr, value: &Literal) -> Expr {
    Expr::compare(op, key.clone(), Expr::Literal(value.clone()))
}

fn sorts_at(key: &Expr, at: &Literal) -> Expr {
    if at.is_null() {
        Expr::is_null(key.clone())
    } else {
        compare(CompareOp::Eq, key, at)
    }
}

fn sorts_after(key: &Expr, at: &Literal, direction: OrderDirection) -> Expr {
    match (at.is_null(), direction) {
        (true, OrderDirection::Asc) => Expr::bool(false),
        (true, OrderDirection::Desc) => Expr::is_not_null(key.clone()),
        (false, OrderDirection::Asc) => {
            either(compare(CompareOp::Gt, key, at), Expr::is_null(key.clone()))
        }
        (false, OrderDirection::Desc) => compare(CompareOp::Lt, key, at),
    }
}

fn sorts_before(key: &Expr, at: &Literal, direction: OrderDirection) -> Expr {
    match (at.is_null(), direction) {
        (true, OrderDirection::Asc) => Expr::is_not_null(key.clone()),
        (true, OrderDirection::Desc) => Expr::bool(false),
        (false, OrderDirection::Asc) => compare(CompareOp::Lt, key, at),
        (false, OrderDirection::Desc) => {
            either(compare(CompareOp::Gt, key, at), Expr::is_null(key.clone()))
        }
    }
}

fn is_constant(expr: &Expr, value: bool) -> bool {
    matches!(expr, Expr::Literal(Literal::Bool(b)) if *b == value)
}

fn either(a: Expr, b: Expr) -> Expr {
    if is_constant(&a, true) || is_constant(&b, false) {
        return a;
    }
    if is_constant(&b, true) || is_constant(&a, false) {
        return b;
    }

    let mut disjuncts = Vec::new();
    for side in [a, b] {
        match side {
            Expr::Or(children) => disjuncts.extend(children),
            other => disjuncts.push(other),
        }
    }

    Expr::Or(disjuncts)
}

fn both(a: Expr, b: Expr) -> Expr {
    if is_constant(&a, false) || is_constant(&b, true) {
        return a;
    }
    if is_constant(&b, false) || is_constant(&a, true) {
        return b;
    }

    Expr::And(vec![a, b])
}
