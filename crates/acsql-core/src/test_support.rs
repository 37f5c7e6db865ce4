//! Shared fixtures and proptest strategies for the crate's unit tests.

use crate::expr::{ArithOp, CompareOp, Expr, Literal};
use proptest::prelude::*;
use std::collections::BTreeMap;

pub(crate) type TestRow = BTreeMap<String, Literal>;

/// Parameters referenced by generated filters.
pub(crate) const PARAMS: [&str; 3] = ["a", "b", "s"];

pub(crate) fn row(pairs: &[(&str, Literal)]) -> TestRow {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_string(), value.clone()))
        .collect()
}

pub(crate) fn parsed(text: &str) -> Expr {
    crate::expr::parse(text).expect("fixture filter should parse")
}

fn arb_compare_op() -> impl Strategy<Value = CompareOp> {
    prop_oneof![
        Just(CompareOp::Eq),
        Just(CompareOp::Ne),
        Just(CompareOp::Gt),
        Just(CompareOp::Gte),
        Just(CompareOp::Lt),
        Just(CompareOp::Lte),
    ]
}

fn arb_arith_op() -> impl Strategy<Value = ArithOp> {
    prop_oneof![
        Just(ArithOp::Add),
        Just(ArithOp::Sub),
        Just(ArithOp::Mul),
        Just(ArithOp::Div),
    ]
}

fn arb_literal() -> impl Strategy<Value = Literal> {
    prop_oneof![
        Just(Literal::Null),
        any::<bool>().prop_map(Literal::Bool),
        (-3i32..6).prop_map(|n| Literal::Number(f64::from(n))),
        prop::sample::select(vec!["x", "y", "abc", "ABC", "b"])
            .prop_map(|s| Literal::Text(s.to_string())),
    ]
}

/// Any value a row may hold for a parameter.
pub(crate) fn arb_value() -> impl Strategy<Value = Literal> {
    arb_literal()
}

pub(crate) fn arb_row() -> impl Strategy<Value = TestRow> {
    (arb_value(), arb_value(), arb_value()).prop_map(|(a, b, s)| {
        row(&[(PARAMS[0], a), (PARAMS[1], b), (PARAMS[2], s)])
    })
}

fn arb_param() -> impl Strategy<Value = Expr> {
    prop::sample::select(PARAMS.to_vec()).prop_map(Expr::param)
}

// Integer constants keep arithmetic exact; zero exercises cancellation and
// division by zero.
fn arb_factor() -> impl Strategy<Value = f64> {
    prop::sample::select(vec![-2.0, 0.0, 1.0, 2.0, 3.0])
}

fn arb_filter_leaf() -> impl Strategy<Value = Expr> {
    let pattern = prop::sample::select(vec!["a%", "%b%", "abc", "_b_", "A%", "x"]);
    prop_oneof![
        (arb_param(), arb_compare_op(), arb_literal())
            .prop_map(|(p, op, lit)| Expr::compare(op, p, lit.into())),
        (arb_param(), arb_compare_op(), arb_param()).prop_map(|(l, op, r)| Expr::compare(op, l, r)),
        (arb_param(), any::<bool>()).prop_map(|(p, negated)| Expr::IsNull {
            operand: Box::new(p),
            negated,
        }),
        (arb_param(), pattern.clone(), any::<bool>())
            .prop_map(|(p, pat, negated)| Expr::like(p, Expr::text(pat), None, negated)),
        (arb_param(), pattern).prop_map(|(p, pat)| Expr::like(
            Expr::func("UPPER", vec![p]),
            Expr::text(pat),
            None,
            false
        )),
        (arb_param(), arb_arith_op(), arb_factor(), arb_compare_op(), -3i32..6).prop_map(
            |(p, aop, k, op, n)| Expr::compare(
                op,
                Expr::arith(aop, p, Expr::number(k)),
                Expr::number(f64::from(n)),
            )
        ),
        (arb_param(), arb_compare_op(), -3i32..6).prop_map(|(p, op, n)| Expr::compare(
            op,
            Expr::arith(ArithOp::Sub, p.clone(), p),
            Expr::number(f64::from(n)),
        )),
        (arb_param(), arb_param(), any::<bool>()).prop_map(|(x, y, negated)| Expr::IsNull {
            operand: Box::new(Expr::arith(
                ArithOp::Mul,
                Expr::arith(ArithOp::Sub, x.clone(), x),
                y,
            )),
            negated,
        }),
        (arb_param(), arb_param(), arb_compare_op(), arb_literal()).prop_map(|(x, y, op, lit)| {
            Expr::compare(op, Expr::func("COALESCE", vec![x, y]), lit.into())
        }),
        arb_param(),
    ]
}

/// Boolean filters over [`PARAMS`] with exact integer arithmetic.
pub(crate) fn arb_filter() -> impl Strategy<Value = Expr> {
    arb_filter_leaf().prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 2..4).prop_map(Expr::And),
            prop::collection::vec(inner.clone(), 2..4).prop_map(Expr::Or),
            inner.clone().prop_map(Expr::not),
            (inner.clone(), inner.clone(), inner)
                .prop_map(|(g, t, e)| Expr::Case(vec![(g, t), (Expr::bool(true), e)])),
        ]
    })
}

fn arb_syntax_leaf() -> impl Strategy<Value = Expr> {
    prop_oneof![
        Just(Expr::null()),
        any::<bool>().prop_map(Expr::bool),
        (-5i32..100).prop_map(|n| Expr::number(f64::from(n))),
        Just(Expr::number(0.25)),
        prop::sample::select(vec!["", "x", "it's", "a b", "NOT"]).prop_map(Expr::text),
        prop::sample::select(vec!["a", "b.c", "Device.*.X", "Tags.tag1", "_x-1"])
            .prop_map(Expr::param),
        Just(Expr::Param(Box::new(Expr::concat(
            Expr::concat(Expr::text("Device."), Expr::param("Root")),
            Expr::text(".Name"),
        )))),
    ]
}

/// Arbitrary well-formed trees for text round trips.
pub(crate) fn arb_syntax_expr() -> impl Strategy<Value = Expr> {
    arb_syntax_leaf().prop_recursive(4, 24, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 2..4).prop_map(Expr::And),
            prop::collection::vec(inner.clone(), 2..4).prop_map(Expr::Or),
            inner.clone().prop_map(Expr::not),
            (arb_compare_op(), inner.clone(), inner.clone())
                .prop_map(|(op, l, r)| Expr::compare(op, l, r)),
            (inner.clone(), any::<bool>()).prop_map(|(e, negated)| Expr::IsNull {
                operand: Box::new(e),
                negated,
            }),
            (inner.clone(), inner.clone(), any::<bool>())
                .prop_map(|(l, p, negated)| Expr::like(l, p, None, negated)),
            (arb_arith_op(), inner.clone(), inner.clone())
                .prop_map(|(op, l, r)| Expr::arith(op, l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::concat(l, r)),
            inner
                .clone()
                .prop_map(|arg| Expr::func("UPPER", vec![arg])),
            (arb_compare_op(), inner.clone(), inner.clone(), inner).prop_map(
                |(op, v, t, e)| Expr::Case(vec![
                    (Expr::compare(op, Expr::param("a"), v), t),
                    (Expr::bool(true), e),
                ])
            ),
        ]
    })
}
