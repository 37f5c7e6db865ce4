use crate::{
    error::ErrorClass,
    expr::{ArithOp, CompareOp, Expr, Literal, evaluate, parse, truth},
    test_support::{arb_syntax_expr, row},
};
use proptest::prelude::*;

fn parsed(text: &str) -> Expr {
    parse(text).expect("filter text should parse")
}

#[test]
fn precedence_binds_and_tighter_than_or() {
    let expr = parsed("a = 1 OR b = 2 AND NOT c IS NULL");

    assert_eq!(
        expr,
        Expr::Or(vec![
            Expr::compare(CompareOp::Eq, Expr::param("a"), Expr::number(1.0)),
            Expr::And(vec![
                Expr::compare(CompareOp::Eq, Expr::param("b"), Expr::number(2.0)),
                Expr::not(Expr::is_null(Expr::param("c"))),
            ]),
        ])
    );
}

#[test]
fn arithmetic_is_left_associative_and_binds_tighter_than_concat() {
    let expr = parsed("a - b - c * 2 || 'x'");

    assert_eq!(
        expr,
        Expr::concat(
            Expr::arith(
                ArithOp::Sub,
                Expr::arith(ArithOp::Sub, Expr::param("a"), Expr::param("b")),
                Expr::arith(ArithOp::Mul, Expr::param("c"), Expr::number(2.0)),
            ),
            Expr::text("x"),
        )
    );
}

#[test]
fn keywords_are_case_insensitive() {
    assert_eq!(
        parsed("a is not null and b like 'x%'"),
        parsed("a IS NOT NULL AND b LIKE 'x%'")
    );
    assert_eq!(parsed("TRUE"), Expr::bool(true));
    assert_eq!(parsed("Null"), Expr::null());
}

#[test]
fn identifiers_cover_wildcard_device_paths() {
    let expr = parsed("InternetGatewayDevice.*.WANIPConnection.1-2 = 'up'");

    assert_eq!(
        expr,
        Expr::compare(
            CompareOp::Eq,
            Expr::param("InternetGatewayDevice.*.WANIPConnection.1-2"),
            Expr::text("up"),
        )
    );
}

#[test]
fn interpolated_parameter_names_build_a_concatenation() {
    let expr = parsed("Device.{Config.Root}.Name");

    assert_eq!(
        expr,
        Expr::Param(Box::new(Expr::concat(
            Expr::concat(Expr::text("Device."), Expr::param("Config.Root")),
            Expr::text(".Name"),
        )))
    );
    assert_eq!(expr.to_string(), "Device.{Config.Root}.Name");
}

#[test]
fn numbers_need_a_non_identifier_boundary() {
    assert_eq!(parsed("1.5e3"), Expr::number(1500.0));
    assert_eq!(parsed("-2"), Expr::number(-2.0));
    assert_eq!(parsed("0_BOOT"), Expr::param("0_BOOT"));
    assert_eq!(
        parsed("x - -2"),
        Expr::arith(ArithOp::Sub, Expr::param("x"), Expr::number(-2.0))
    );
}

#[test]
fn string_literals_support_both_quote_styles() {
    assert_eq!(parsed("'it''s'"), Expr::text("it's"));
    assert_eq!(parsed(r#""tab\there é""#), Expr::text("tab\there é"));
}

#[test]
fn case_expressions_accept_else_only() {
    let expr = parsed("CASE ELSE 1 END");

    assert_eq!(expr, Expr::Case(vec![(Expr::bool(true), Expr::number(1.0))]));
    assert_eq!(expr.to_string(), "CASE ELSE 1 END");
}

#[test]
fn function_calls_uppercase_their_names() {
    assert_eq!(
        parsed("lower(Name) LIKE 'abc%'"),
        Expr::like(
            Expr::func("LOWER", vec![Expr::param("Name")]),
            Expr::text("abc%"),
            None,
            false,
        )
    );
    assert_eq!(parsed("NOW()"), Expr::func("NOW", vec![]));
}

#[test]
fn syntax_errors_report_position() {
    for text in ["a = ", "(a = 1", "a = 1)", "CASE END", "a IS 1", "'open", "a AND"] {
        let err = parse(text).expect_err("malformed text should not parse");
        assert_eq!(err.class, ErrorClass::Syntax, "{text}");
        assert!(err.message.contains("position"), "{text}: {}", err.message);
    }
}

#[test]
fn stringify_inserts_parentheses_only_where_needed() {
    let cases = [
        ("(a = 1 OR b = 2) AND c = 3", "(a = 1 OR b = 2) AND c = 3"),
        ("a = 1 OR (b = 2 AND c = 3)", "a = 1 OR b = 2 AND c = 3"),
        ("a - (b - c)", "a - (b - c)"),
        ("(a - b) - c", "a - b - c"),
        ("NOT (a AND b)", "NOT (a AND b)"),
        ("(NOT a) = b", "(NOT a) = b"),
        ("x = 'O''Brien'", "x = 'O''Brien'"),
    ];

    for (input, expected) in cases {
        assert_eq!(parsed(input).to_string(), expected, "{input}");
    }
}

#[test]
fn awkward_parameter_names_round_trip_through_braces() {
    for name in ["5", "true", "NOT", "", "has space", "-3"] {
        let expr = Expr::param(name);
        let text = expr.to_string();
        assert_eq!(parsed(&text), expr, "{name} rendered as {text}");
    }
}

#[test]
fn json_form_round_trips_and_rejects_unknown_operators() {
    let expr = parsed("CASE WHEN a > 1 THEN UPPER(b) ELSE NULL END LIKE 'X%' ESCAPE '!'");
    let json = expr.to_json();

    assert_eq!(Expr::from_json(&json).expect("json form should decode"), expr);
    assert_eq!(
        parsed("a.b = 2").to_json(),
        serde_json::json!(["=", ["PARAM", "a.b"], 2])
    );

    let err = Expr::from_json(&serde_json::json!(["XOR", true, false]))
        .expect_err("unknown operator should fail");
    assert_eq!(err.class, ErrorClass::Unsupported);
}

#[test]
fn evaluation_follows_three_valued_logic() {
    let r = row(&[("a", Literal::Number(5.0)), ("s", Literal::Text("abc".into()))]);

    let value = |text: &str| evaluate(&parsed(text), &r);
    assert_eq!(value("a > 3 AND missing = 1"), Literal::Null);
    assert_eq!(value("a > 7 AND missing = 1"), Literal::Bool(false));
    assert_eq!(value("a > 3 OR missing = 1"), Literal::Bool(true));
    assert_eq!(value("NOT missing"), Literal::Null);
    assert_eq!(value("a / 0"), Literal::Null);
    assert_eq!(value("s > 1000"), Literal::Bool(true));
    assert_eq!(value("s || a"), Literal::Text("abc5".into()));
    assert_eq!(value("a LIKE '5'"), Literal::Bool(false));
    assert_eq!(value("UPPER(s) LIKE 'AB_'"), Literal::Bool(true));
    assert_eq!(value("COALESCE(missing, a)"), Literal::Number(5.0));
    assert_eq!(value("CASE WHEN missing THEN 1 WHEN a = 5 THEN 2 END"), Literal::Number(2.0));
    assert_eq!(value("{'s'} = 'abc'"), Literal::Bool(true));
}

#[test]
fn truthiness_is_equality_with_true() {
    assert_eq!(truth(&Literal::Bool(true)), Some(true));
    assert_eq!(truth(&Literal::Number(1.0)), Some(true));
    assert_eq!(truth(&Literal::Number(2.0)), Some(false));
    assert_eq!(truth(&Literal::Text("true".into())), Some(false));
    assert_eq!(truth(&Literal::Null), None);
}

proptest! {
    #[test]
    fn parse_inverts_stringify(expr in arb_syntax_expr()) {
        let text = expr.to_string();
        let reparsed = parse(&text).expect("stringified expression should parse");

        prop_assert_eq!(reparsed, expr, "text: {}", text);
    }
}
