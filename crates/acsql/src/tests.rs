use crate::{
    Compiler, CompilerConfig, ErrorKind, ErrorOrigin, bookmark, bookmark_filter, covers, minimize,
    parse, stringify, union_diff,
};
use acsql_core::prelude::*;
use serde_json::json;

#[test]
fn syntax_errors_map_to_the_public_kind() {
    let err = parse("a >").expect_err("dangling comparison should not parse");

    assert_eq!(err.kind, ErrorKind::Syntax);
    assert_eq!(err.origin, ErrorOrigin::Parse);
}

#[test]
fn public_errors_serialize_with_kind_and_origin() {
    let err = Compiler::default()
        .compile("password = 'x'", Collection::Users)
        .expect_err("password should be restricted");
    let value = serde_json::to_value(&err).expect("error should serialize");

    assert_eq!(value["kind"], json!("AccessDenied"));
    assert_eq!(value["origin"], json!("Store"));
}

#[test]
fn unsupported_operands_map_to_unsupported_operator() {
    let err = Compiler::default()
        .compile("Param1 = Param2", Collection::Devices)
        .expect_err("field comparisons should be unsupported");

    assert_eq!(err.kind, ErrorKind::UnsupportedOperator);
}

#[test]
fn normalization_faults_map_to_internal() {
    let err = minimize(&parse("UPPER(a, b) = 'X'").expect("filter should parse"), true)
        .expect_err("wrong arity should fail");

    assert_eq!(err.kind, ErrorKind::Internal);
    assert_eq!(err.origin, ErrorOrigin::Normalize);
}

#[test]
fn relative_instants_compile_against_a_fixed_now() {
    let filter = parse("Events.Registered < NOW() - 86400000").expect("filter should parse");

    let out = Compiler::default()
        .to_query_at(&filter, Collection::Devices, 1_700_000_000_000.0)
        .expect("filter should compile");

    assert_eq!(
        out,
        StoreQuery::Filter(json!({
            "_registered": { "$lt": { "$date": { "$numberLong": "1699913600000" } } }
        }))
    );
}

#[test]
fn toml_config_types_fields() {
    let compiler = Compiler::from_toml_str(
        r#"
        [store.fields.devices]
        Uptime = ["number"]
        "#,
    )
    .expect("config should load");

    let out = compiler
        .compile("Uptime > 10", Collection::Devices)
        .expect("filter should compile");

    assert_eq!(out, StoreQuery::Filter(json!({ "Uptime._value": { "$gt": 10 } })));
}

#[test]
fn toml_config_restricts_fields() {
    let compiler = Compiler::from_toml_str(
        r#"
        [store.restricted]
        devices = ["Secret"]
        "#,
    )
    .expect("config should load");

    let err = compiler
        .compile("Secret = 1", Collection::Devices)
        .expect_err("restricted field should be denied");
    assert_eq!(err.kind, ErrorKind::AccessDenied);
}

#[test]
fn empty_config_keeps_default_restrictions() {
    let config = CompilerConfig::from_toml_str("").expect("empty config should load");

    assert_eq!(config, CompilerConfig::default());
    assert!(config.store.is_restricted(Collection::Users, "password"));
}

#[test]
fn malformed_config_is_rejected() {
    for text in [
        "[store]\nbogus = 1",
        "[store.fields.devices]\nUptime = [\"float\"]",
        "[store.fields.nowhere]\nUptime = [\"number\"]",
        "[store.fields.devices]\nUptime = []",
    ] {
        let err = CompilerConfig::from_toml_str(text).expect_err("config should be rejected");

        assert_eq!(err.kind, ErrorKind::Config, "{text}");
        assert_eq!(err.origin, ErrorOrigin::Config, "{text}");
    }
}

#[test]
fn stateless_operations_wrap_the_engine() {
    let wide = parse("a > 1").expect("filter should parse");
    let narrow = parse("a > 2").expect("filter should parse");

    assert!(covers(&wide, &narrow).expect("covers should succeed"));
    assert!(!covers(&narrow, &wide).expect("covers should succeed"));

    let (union, diff) = union_diff(&narrow, &wide).expect("union should succeed");
    assert!(covers(&union, &wide).expect("covers should succeed"));
    assert!(covers(&wide, &union).expect("covers should succeed"));
    assert!(covers(&wide, &diff).expect("covers should succeed"));
}

#[test]
fn bookmarks_round_trip_through_the_facade() {
    let order = OrderSpec::new(vec![("a".to_string(), OrderDirection::Asc)]);
    let row = std::collections::BTreeMap::from([("a".to_string(), Literal::Number(3.0))]);

    let after = bookmark_filter(&bookmark(&order, &row), &order).expect("bookmark should convert");

    assert_eq!(after, parse("a > 3 OR a IS NULL").expect("filter should parse"));
}

#[test]
fn stringified_filters_parse_back() {
    let filter = parse("NOT (a = 1 OR b LIKE 'x%') AND c IS NOT NULL").expect("filter should parse");

    assert_eq!(parse(&stringify(&filter)).expect("output should parse"), filter);
}
