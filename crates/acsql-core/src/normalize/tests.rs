use crate::{
    error::{ErrorClass, ErrorOrigin},
    expr::{ArithOp, CompareOp, Expr, Literal, evaluate},
    normalize::{linear_form, normalize},
    test_support::{arb_filter, arb_row, parsed, row},
};
use proptest::prelude::*;

fn normalized(text: &str) -> Expr {
    normalize(&parsed(text)).expect("filter should normalize")
}

fn rendered(text: &str) -> String {
    normalized(text).to_string()
}

#[test]
fn arithmetic_comparisons_share_one_canonical_form() {
    for text in ["a + 1 > 3", "3 < a + 1", "2 * a > 4", "a / 2 + 1 > 2", "a - 2 > 0"] {
        assert_eq!(rendered(text), "a - 2 > 0", "{text}");
    }
}

#[test]
fn leading_coefficient_sign_flips_the_operator() {
    assert_eq!(rendered("4 - 2 * a >= 0"), "a - 2 <= 0");
    assert_eq!(rendered("b - a = 0"), "a - b = 0");
}

#[test]
fn bare_indeterminates_keep_numeric_coercion() {
    assert_eq!(rendered("a * 2 - a > 0"), "a + 0 > 0");
    assert_eq!(rendered("a + 0"), "a + 0");
}

#[test]
fn constant_arithmetic_folds_exactly() {
    assert_eq!(normalized("0.1 + 0.2 = 0.3"), Expr::bool(true));
    assert_eq!(normalized("1 + 2"), Expr::number(3.0));
    assert_eq!(normalized("a / 0 > 1"), Expr::null());
    assert_eq!(normalized("'x' + 1"), Expr::null());
}

fn numeric(name: &str) -> Expr {
    Expr::is_not_null(Expr::arith(ArithOp::Add, Expr::param(name), Expr::number(0.0)))
}

#[test]
fn cancelled_operands_still_null_the_result() {
    let only_numeric_a = |value: Expr| Expr::Case(vec![(numeric("a"), value)]);

    assert_eq!(normalized("a * 0"), only_numeric_a(Expr::number(0.0)));
    assert_eq!(normalized("a * 0 = 0"), only_numeric_a(Expr::bool(true)));
    assert_eq!(normalized("a - a = 0"), only_numeric_a(Expr::bool(true)));
    assert_eq!(normalized("a + 1 > a + 0"), only_numeric_a(Expr::bool(true)));
}

#[test]
fn cancelled_divisors_still_null_the_result() {
    let nonzero_b = Expr::compare(
        CompareOp::Ne,
        Expr::arith(ArithOp::Add, Expr::param("b"), Expr::number(0.0)),
        Expr::number(0.0),
    );

    assert_eq!(
        normalized("a * b / b"),
        Expr::Case(vec![(nonzero_b, Expr::arith(ArithOp::Add, Expr::param("a"), Expr::number(0.0)))])
    );
}

#[test]
fn cancellation_agrees_with_evaluation_on_null_rows() {
    let rows = [
        row(&[("a", Literal::Null), ("b", Literal::Number(2.0))]),
        row(&[("a", Literal::Text("x".to_string())), ("b", Literal::Number(1.0))]),
        row(&[("a", Literal::Number(3.0)), ("b", Literal::Null)]),
        row(&[("a", Literal::Number(3.0)), ("b", Literal::Number(0.0))]),
    ];
    for text in [
        "(a - a) IS NULL",
        "b = 1 OR a * 0 = 0",
        "a * 0 = 0 AND b > 0",
        "a + 1 > a + 0",
        "(a - a) * b IS NOT NULL",
        "a * b / b > 2",
    ] {
        let expr = parsed(text);
        let out = normalize(&expr).expect("filter should normalize");
        for row in &rows {
            assert_eq!(evaluate(&out, row), evaluate(&expr, row), "{text} on {row:?}");
        }
    }

    let null_a = &rows[0];
    assert_eq!(evaluate(&normalized("(a - a) IS NULL"), null_a), Literal::Bool(true));
}

#[test]
fn shared_factors_are_pulled_out() {
    assert_eq!(rendered("a * b + a"), "a * (b + 1)");
}

#[test]
fn comparisons_are_oriented() {
    assert_eq!(rendered("1 < a"), "a > 1");
    assert_eq!(rendered("b = a"), "a = b");
    assert_eq!(rendered("a = NULL"), "NULL");
    assert_eq!(rendered("'abc' > 5"), "true");
}

#[test]
fn negation_is_pushed_into_atoms() {
    assert_eq!(rendered("NOT a > 1"), "a <= 1");
    assert_eq!(rendered("NOT a IS NULL"), "a IS NOT NULL");
    assert_eq!(rendered("NOT a LIKE 'x%'"), "a NOT LIKE 'x%'");
    assert_eq!(rendered("NOT NOT (a = 1)"), "a = 1");
    assert_eq!(rendered("NOT NOT b"), "b = true");
}

#[test]
fn connectives_flatten_and_absorb() {
    assert_eq!(rendered("a = 1 AND true AND (a = 1 AND b = 2)"), "a = 1 AND b = 2");
    assert_eq!(rendered("a = 1 AND false"), "false");
    assert_eq!(rendered("a = 1 OR 1 = 1"), "true");
    assert_eq!(rendered("a = 1 OR false"), "a = 1");
    assert_eq!(rendered("b AND true"), "b = true");
}

#[test]
fn coalesce_becomes_a_case_chain() {
    assert_eq!(
        normalized("COALESCE(a, 1)"),
        Expr::Case(vec![
            (Expr::is_not_null(Expr::param("a")), Expr::param("a")),
            (Expr::bool(true), Expr::number(1.0)),
        ])
    );
}

#[test]
fn case_operands_split_into_a_top_level_case() {
    assert_eq!(
        normalized("CASE WHEN a = 1 THEN b ELSE c END > 2"),
        Expr::Case(vec![
            (
                Expr::compare(CompareOp::Eq, Expr::param("a"), Expr::number(1.0)),
                Expr::compare(CompareOp::Gt, Expr::param("b"), Expr::number(2.0)),
            ),
            (
                Expr::bool(true),
                Expr::compare(CompareOp::Gt, Expr::param("c"), Expr::number(2.0)),
            ),
        ])
    );
}

#[test]
fn constant_guards_drop_or_truncate_branches() {
    assert_eq!(normalized("CASE WHEN false THEN a WHEN true THEN b ELSE c END"), Expr::param("b"));
    assert_eq!(normalized("CASE WHEN NULL THEN a END"), Expr::null());
    assert_eq!(rendered("CASE WHEN a = 1 THEN 5 END"), "CASE WHEN a = 1 THEN 5 END");
}

#[test]
fn literal_folds_cover_strings_and_patterns() {
    assert_eq!(normalized("UPPER('abc') || 1"), Expr::text("ABC1"));
    assert_eq!(normalized("'abc' LIKE 'a%'"), Expr::bool(true));
    assert_eq!(normalized("5 LIKE '5'"), Expr::bool(false));
    assert_eq!(normalized("NULL IS NULL"), Expr::bool(true));
    assert_eq!(normalized("{'Dev' || 1} = 2"), parsed("Dev1 = 2"));
}

#[test]
fn wrong_arity_is_a_normalization_error() {
    for text in ["UPPER(a, b)", "LOWER()", "NOW(1)", "COALESCE()"] {
        let err = normalize(&parsed(text)).expect_err("arity mismatch should fail");
        assert_eq!(err.class, ErrorClass::InvariantViolation, "{text}");
        assert_eq!(err.origin, ErrorOrigin::Normalize, "{text}");
    }
}

#[test]
fn linear_forms_expose_slope_offset_and_root() {
    let form = linear_form(&parsed("2 * a + 4")).expect("expression is linear");

    assert_eq!(form.variable, Expr::param("a"));
    assert_eq!(form.slope, 2.0);
    assert_eq!(form.offset, 4.0);
    assert_eq!(form.root, -2.0);

    assert!(linear_form(&parsed("a * b + 1")).is_none());
    assert!(linear_form(&parsed("a + b")).is_none());
    assert!(linear_form(&parsed("3")).is_none());
}

proptest! {
    #[test]
    fn normalization_preserves_evaluation(expr in arb_filter(), row in arb_row()) {
        let out = normalize(&expr).expect("generated filters should normalize");

        prop_assert_eq!(evaluate(&out, &row), evaluate(&expr, &row), "normalized: {}", out);
    }

    #[test]
    fn normalization_is_idempotent(expr in arb_filter()) {
        let once = normalize(&expr).expect("generated filters should normalize");
        let twice = normalize(&once).expect("normalized output should normalize");

        prop_assert_eq!(twice, once);
    }
}
