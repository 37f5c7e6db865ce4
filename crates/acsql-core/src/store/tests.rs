use crate::{
    error::{ErrorClass, ErrorOrigin},
    expr::{Literal, evaluate, truth},
    obs::sink::{MetricsEvent, MetricsSink, with_metrics_sink},
    store::{
        Collection, Field, PhysicalType, StoreConfig, StoreQuery, get_param, to_query, to_query_at,
    },
    store::physical::{object_id_ceil, object_id_floor},
    test_support::{PARAMS, TestRow, arb_filter, arb_row, parsed},
};
use proptest::prelude::*;
use regex::RegexBuilder;
use serde_json::{Value, json};
use std::{cell::RefCell, cmp::Ordering, collections::BTreeMap, rc::Rc};

fn compiled(text: &str, collection: Collection) -> Value {
    match to_query(&parsed(text), collection, &StoreConfig::default())
        .expect("filter should compile")
    {
        StoreQuery::Filter(doc) => doc,
        StoreQuery::NeverMatches => panic!("{text} should be satisfiable"),
    }
}

fn device_query(text: &str) -> Value {
    compiled(text, Collection::Devices)
}

fn disjuncts(doc: &Value) -> Vec<Value> {
    doc.get("$or")
        .and_then(Value::as_array)
        .cloned()
        .expect("query should be a disjunction")
}

///
/// Stored
/// A typed document value as the store holds it.
///

#[derive(Clone, Debug, PartialEq)]
enum Stored {
    Bool(bool),
    Number(f64),
    Date(i64),
    Text(String),
    ObjectId(String),
    Array(Vec<Self>),
}

impl Stored {
    // Query literal in canonical extended JSON.
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Object(doc) => {
                if let Some(ms) = doc.get("$date") {
                    let ms = ms.get("$numberLong")?.as_str()?.parse().ok()?;
                    return Some(Self::Date(ms));
                }
                doc.get("$oid")?.as_str().map(|hex| Self::ObjectId(hex.to_string()))
            }
            _ => None,
        }
    }

    const fn alias(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Date(_) => "date",
            Self::Text(_) => "string",
            Self::ObjectId(_) => "objectId",
            Self::Array(_) => "array",
        }
    }

    // Order within one type; values of different types never compare.
    fn order(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Number(a), Self::Number(b)) => a.partial_cmp(b),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) | (Self::ObjectId(a), Self::ObjectId(b)) => {
                Some(a.cmp(b))
            }
            _ => None,
        }
    }
}

/// Flattened document: dotted path to value; absent paths are missing.
type Document = BTreeMap<String, Stored>;

fn branches(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or_default()
}

fn matches(query: &Value, doc: &Document) -> bool {
    let clauses = query.as_object().expect("query should be a document");

    clauses.iter().all(|(key, condition)| match key.as_str() {
        "$or" => branches(condition).iter().any(|q| matches(q, doc)),
        "$and" => branches(condition).iter().all(|q| matches(q, doc)),
        "$nor" => !branches(condition).iter().any(|q| matches(q, doc)),
        path => field_matches(doc.get(path), condition),
    })
}

fn field_matches(field: Option<&Stored>, condition: &Value) -> bool {
    match condition.as_object() {
        Some(ops)
            if Stored::from_json(condition).is_none() && ops.keys().all(|k| k.starts_with('$')) =>
        {
            ops.iter().all(|(op, operand)| match op.as_str() {
                "$ne" => !equals(field, operand),
                "$gt" => compared(field, operand) == Some(Ordering::Greater),
                "$lt" => compared(field, operand) == Some(Ordering::Less),
                "$type" => field.is_some_and(|value| {
                    let alias = Value::String(value.alias().to_string());
                    operand == &alias || operand.as_array().is_some_and(|a| a.contains(&alias))
                }),
                "$not" => !field_matches(field, operand),
                "$regex" => {
                    let folded = ops.get("$options").and_then(Value::as_str) == Some("i");
                    let regex = RegexBuilder::new(operand.as_str().expect("regex should be text"))
                        .case_insensitive(folded)
                        .build()
                        .expect("emitted regex should compile");
                    matches!(field, Some(Stored::Text(text)) if regex.is_match(text))
                }
                "$options" => true,
                other => panic!("unexpected operator {other}"),
            })
        }
        _ => equals(field, condition),
    }
}

// Equality by type and value; arrays match any element.
fn equals(field: Option<&Stored>, literal: &Value) -> bool {
    let literal = Stored::from_json(literal).expect("equality operand should be a literal");
    match field {
        Some(Stored::Array(items)) => items.contains(&literal),
        Some(value) => value.order(&literal) == Some(Ordering::Equal),
        None => false,
    }
}

fn compared(field: Option<&Stored>, literal: &Value) -> Option<Ordering> {
    let literal = Stored::from_json(literal).expect("range operand should be a literal");
    field?.order(&literal)
}

// Device document for a row; whole numbers flagged in `dates` are stored as
// dates and NULL parameters are missing.
fn device_document(row: &TestRow, dates: &[bool]) -> Document {
    PARAMS
        .iter()
        .zip(dates)
        .filter_map(|(param, as_date)| {
            let stored = match row.get(*param)? {
                Literal::Null => return None,
                Literal::Bool(b) => Stored::Bool(*b),
                Literal::Number(n) if *as_date && n.fract() == 0.0 => Stored::Date(*n as i64),
                Literal::Number(n) => Stored::Number(*n),
                Literal::Text(s) => Stored::Text(s.clone()),
            };
            Some((format!("{param}._value"), stored))
        })
        .collect()
}

#[derive(Default)]
struct Recorder(RefCell<Vec<MetricsEvent>>);

impl MetricsSink for Recorder {
    fn record(&self, event: MetricsEvent) {
        self.0.borrow_mut().push(event);
    }
}

#[test]
fn tag_tests_compile_to_array_membership() {
    let expected = json!({ "_tags": "tag1" });

    assert_eq!(device_query("Tags.tag1 = true"), expected);
    assert_eq!(device_query("Tags.tag1 <> false"), expected);
    assert_eq!(
        device_query("Tags.tag1 IS NULL"),
        json!({ "_tags": { "$ne": "tag1" } })
    );
}

#[test]
fn numeric_literal_fans_out_to_number_and_date() {
    let doc = device_query("Param1 = 1657844103524");
    let parts = disjuncts(&doc);

    assert_eq!(parts.len(), 2);
    assert!(parts.contains(&json!({ "Param1._value": 1_657_844_103_524_i64 })));
    assert!(parts.contains(&json!({
        "Param1._value": { "$date": { "$numberLong": "1657844103524" } }
    })));
}

#[test]
fn not_equal_or_null_is_one_physical_clause() {
    assert_eq!(
        device_query("Param1 <> 'value2' OR Param1 IS NULL"),
        json!({ "Param1._value": { "$ne": "value2" } })
    );
}

#[test]
fn device_fields_map_to_physical_paths() {
    let config = StoreConfig::default();
    let field = |param: &str| get_param(Collection::Devices, param, &config).expect("field should map");

    assert_eq!(
        field("DeviceID.ID"),
        Field::Value {
            path: "_id".into(),
            types: vec![PhysicalType::String],
        }
    );
    assert_eq!(
        field("DeviceID.SerialNumber"),
        Field::Value {
            path: "_deviceId._SerialNumber".into(),
            types: vec![PhysicalType::String],
        }
    );
    assert_eq!(
        field("Events.0_BOOTSTRAP"),
        Field::Value {
            path: "_lastBootstrap".into(),
            types: vec![PhysicalType::Date],
        }
    );
    assert_eq!(field("Tags.office"), Field::Tag("office".into()));
    assert_eq!(
        field("InternetGatewayDevice.WANDevice"),
        Field::Value {
            path: "InternetGatewayDevice.WANDevice._value".into(),
            types: PhysicalType::VALUE.to_vec(),
        }
    );
}

#[test]
fn restricted_fields_are_denied() {
    let err = to_query(&parsed("password = 'x'"), Collection::Users, &StoreConfig::default())
        .expect_err("password should be restricted");

    assert_eq!(err.class, ErrorClass::AccessDenied);
    assert_eq!(err.origin, ErrorOrigin::Store);
}

#[test]
fn configured_types_override_defaults() {
    let mut config = StoreConfig::default();
    config
        .fields
        .entry(Collection::Devices)
        .or_default()
        .insert("Uptime".into(), vec![PhysicalType::Number]);

    let out = to_query(&parsed("Uptime > 10"), Collection::Devices, &config)
        .expect("filter should compile");

    assert_eq!(out, StoreQuery::Filter(json!({ "Uptime._value": { "$gt": 10 } })));
}

#[test]
fn contradictions_never_match() {
    let out = to_query(
        &parsed("Param1 = 1 AND Param1 = 2"),
        Collection::Devices,
        &StoreConfig::default(),
    )
    .expect("filter should compile");

    assert!(out.never_matches());
    assert_eq!(out.into_document(), json!({ "$nor": [{}] }));
}

#[test]
fn invalid_object_id_equality_never_matches() {
    let out = to_query(&parsed("_id = 'abc'"), Collection::Tasks, &StoreConfig::default())
        .expect("filter should compile");

    assert_eq!(out, StoreQuery::NeverMatches);
}

#[test]
fn object_id_bounds_round_toward_the_string() {
    assert_eq!(
        compiled("_id > 'abc'", Collection::Tasks),
        json!({ "_id": { "$gt": { "$oid": "abbfffffffffffffffffffff" } } })
    );
    assert_eq!(
        compiled("_id < 'abc'", Collection::Tasks),
        json!({ "_id": { "$lt": { "$oid": "abc000000000000000000000" } } })
    );
}

#[test]
fn object_id_rounding_handles_non_hex_text() {
    assert_eq!(
        object_id_floor("ABC").as_deref(),
        Some("9fffffffffffffffffffffff")
    );
    assert_eq!(
        object_id_ceil("ab-").as_deref(),
        Some("ab0000000000000000000000")
    );
    assert_eq!(object_id_floor("\u{1}"), None);
    assert_eq!(object_id_ceil("~"), None);
}

#[test]
fn same_path_operators_merge() {
    assert_eq!(
        compiled("retries > 1 AND retries < 5", Collection::Faults),
        json!({ "retries": { "$gt": 1, "$lt": 5 } })
    );
}

#[test]
fn extended_json_literals_do_not_merge() {
    assert_eq!(
        compiled("timestamp > 1 AND timestamp < 5", Collection::Tasks),
        json!({ "$and": [
            { "timestamp": { "$gt": { "$date": { "$numberLong": "1" } } } },
            { "timestamp": { "$lt": { "$date": { "$numberLong": "5" } } } },
        ] })
    );
}

#[test]
fn linear_arithmetic_compiles_to_numeric_bounds() {
    let doc = device_query("Param1 * 2 + 1 > 5");
    let parts = disjuncts(&doc);

    assert_eq!(parts.len(), 2);
    assert!(parts.contains(&json!({ "Param1._value": { "$gt": 2 } })));
    assert!(parts.contains(&json!({
        "Param1._value": { "$gt": { "$date": { "$numberLong": "2" } } }
    })));
}

#[test]
fn like_compiles_to_anchored_regex() {
    assert_eq!(
        device_query("DeviceID.ID LIKE 'abc%'"),
        json!({ "_id": { "$regex": "^abc" } })
    );
    assert_eq!(
        device_query("LOWER(DeviceID.SerialNumber) LIKE 'ab%'"),
        json!({ "_deviceId._SerialNumber": { "$regex": "^ab", "$options": "i" } })
    );
}

#[test]
fn non_parameter_operands_are_rejected() {
    let config = StoreConfig::default();

    let err = to_query(&parsed("Param1 = Param2"), Collection::Devices, &config)
        .expect_err("field comparisons should be unsupported");
    assert_eq!(err.class, ErrorClass::Unsupported);

    let err = to_query(&parsed("Param1 LIKE Param2"), Collection::Devices, &config)
        .expect_err("dynamic patterns should be unsupported");
    assert_eq!(err.class, ErrorClass::Unsupported);

    let err = to_query(&parsed("Param1 || 'x' = 'ax'"), Collection::Devices, &config)
        .expect_err("concatenations should be invalid");
    assert_eq!(err.class, ErrorClass::InvalidQuery);
}

#[test]
fn compile_reports_store_metrics() {
    let recorder = Rc::new(Recorder::default());
    with_metrics_sink(recorder.clone(), || {
        to_query(&parsed("_id = 'abc'"), Collection::Tasks, &StoreConfig::default())
            .expect("filter should compile");
    });

    assert!(recorder.0.borrow().contains(&MetricsEvent::StoreCompile {
        collection: "tasks",
        never_matches: true,
    }));
}

#[test]
fn relative_instants_fold_before_compiling() {
    let now = 1_657_844_103_524.0;

    let out = to_query_at(
        &parsed("Events.Inform > NOW() - 300000"),
        Collection::Devices,
        &StoreConfig::default(),
        now,
    )
    .expect("filter should compile");

    assert_eq!(
        out,
        StoreQuery::Filter(json!({
            "_lastInform": { "$gt": { "$date": { "$numberLong": "1657843803524" } } }
        }))
    );
    assert!(
        to_query(&parsed("Events.Inform > NOW()"), Collection::Devices, &StoreConfig::default())
            .is_ok(),
        "NOW() should read the clock"
    );
}

#[test]
fn tag_membership_matches_tagged_documents() {
    let tagged = Document::from([(
        "_tags".to_string(),
        Stored::Array(vec![Stored::Text("tag1".into())]),
    )]);
    let untagged = Document::from([(
        "_tags".to_string(),
        Stored::Array(vec![Stored::Text("other".into())]),
    )]);

    for (text, expected) in [
        ("Tags.tag1 = true", [true, false]),
        ("Tags.tag1 <> false", [true, false]),
        ("Tags.tag1 IS NULL", [false, true]),
    ] {
        let query = device_query(text);

        assert_eq!(matches(&query, &tagged), expected[0], "{text}");
        assert_eq!(matches(&query, &untagged), expected[1], "{text}");
    }
}

#[test]
fn typed_documents_match_like_rows() {
    let cases = [
        ("Param1 = 1657844103524", Stored::Date(1_657_844_103_524), true),
        ("Param1 = 1657844103524", Stored::Text("1657844103524".into()), false),
        ("Param1 > 'abc'", Stored::Number(5.0), false),
        ("Param1 < 'abc'", Stored::Bool(false), true),
        ("Param1 <> 'value2' OR Param1 IS NULL", Stored::Number(2.0), true),
        ("UPPER(Param1) LIKE 'AB%'", Stored::Text("abc".into()), true),
        ("Param1 * 2 + 1 > 5", Stored::Date(3), true),
    ];

    for (text, value, expected) in cases {
        let doc = Document::from([("Param1._value".to_string(), value)]);

        assert_eq!(matches(&device_query(text), &doc), expected, "{text}");
    }

    let missing = Document::new();
    assert!(matches(&device_query("Param1 <> 'value2' OR Param1 IS NULL"), &missing));
    assert!(!matches(&device_query("Param1 < 'abc'"), &missing));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn compiled_queries_match_evaluated_rows(
        expr in arb_filter(),
        row in arb_row(),
        dates in prop::collection::vec(any::<bool>(), PARAMS.len()),
    ) {
        // parameter-to-parameter comparisons do not compile
        let Ok(query) = to_query(&expr, Collection::Devices, &StoreConfig::default()) else {
            return Ok(());
        };
        let doc = device_document(&row, &dates);
        let expected = truth(&evaluate(&expr, &row)) == Some(true);

        prop_assert_eq!(
            matches(&query.clone().into_document(), &doc),
            expected,
            "query: {:?}",
            query
        );
    }
}
