//! Physical store predicates: typed comparisons, type tests, regular
//! expressions and tag membership, plus their extended-JSON rendering.

use crate::{
    expr::{CaseFold, CompareOp, Literal, json::number_to_json, like::LikePattern},
    store::schema::{PhysicalType, TAGS_PATH},
};
use serde_json::{Map, Value, json};
use std::cmp::Ordering;

const OBJECT_ID_LEN: usize = 24;
const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

// Largest instant the store's date type represents, in epoch milliseconds.
const MAX_INSTANT: f64 = 8.64e15;

///
/// PhysicalValue
///

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum PhysicalValue {
    Bool(bool),
    Number(f64),
    /// Epoch milliseconds.
    Date(i64),
    Text(String),
    /// Lowercase 24-digit hex.
    ObjectId(String),
}

impl PhysicalValue {
    pub(crate) const fn physical_type(&self) -> PhysicalType {
        match self {
            Self::Bool(_) => PhysicalType::Bool,
            Self::Number(_) => PhysicalType::Number,
            Self::Date(_) => PhysicalType::Date,
            Self::Text(_) => PhysicalType::String,
            Self::ObjectId(_) => PhysicalType::ObjectId,
        }
    }

    /// Order among values of one physical type.
    pub(crate) fn cmp_same_type(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) | (Self::ObjectId(a), Self::ObjectId(b)) => a.cmp(b),
            _ => self.physical_type().cmp(&other.physical_type()),
        }
    }

    /// Canonical extended JSON.
    pub(crate) fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::Date(ms) => json!({ "$date": { "$numberLong": ms.to_string() } }),
            Self::Text(s) => Value::String(s.clone()),
            Self::ObjectId(hex) => json!({ "$oid": hex }),
        }
    }
}

///
/// Physical
/// One backend predicate; each distinct one is a propositional variable.
///

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Physical {
    /// The field holds a value of this type.
    Type { path: String, ty: PhysicalType },
    /// `op` is one of `=`, `>`, `<`; only values of the literal's type match.
    Compare {
        path: String,
        op: CompareOp,
        value: PhysicalValue,
    },
    Regex {
        path: String,
        pattern: LikePattern,
        fold: Option<CaseFold>,
    },
    Tag(String),
}

impl Physical {
    pub(crate) fn key(&self) -> String {
        match self {
            Self::Type { path, ty } => format!("T:{path}:{ty}"),
            Self::Compare { path, op, value } => format!("C:{path}:{}:{value:?}", op.symbol()),
            Self::Regex {
                path,
                pattern,
                fold,
            } => format!("R:{path}:{}:{:?}", pattern.to_regex(), fold.is_some()),
            Self::Tag(tag) => format!("G:{tag}"),
        }
    }

    pub(crate) fn path(&self) -> &str {
        match self {
            Self::Type { path, .. } | Self::Compare { path, .. } | Self::Regex { path, .. } => path,
            Self::Tag(_) => TAGS_PATH,
        }
    }

    /// Type the predicate requires the field to hold.
    pub(crate) fn required_type(&self) -> Option<PhysicalType> {
        match self {
            Self::Type { .. } | Self::Tag(_) => None,
            Self::Compare { value, .. } => Some(value.physical_type()),
            Self::Regex { .. } => Some(PhysicalType::String),
        }
    }

    /// `(path, condition)` of the predicate or of its negation.
    pub(crate) fn render(&self, negated: bool) -> (String, Value) {
        let positive = match self {
            Self::Type { ty, .. } => json!({ "$type": ty.type_alias() }),
            Self::Compare { op, value, .. } => match (op, negated) {
                (CompareOp::Eq, false) => value.to_json(),
                (CompareOp::Eq, true) => {
                    return (self.path().to_string(), json!({ "$ne": value.to_json() }));
                }
                (CompareOp::Gt, _) => json!({ "$gt": value.to_json() }),
                _ => json!({ "$lt": value.to_json() }),
            },
            Self::Regex { pattern, fold, .. } => {
                let mut doc = Map::new();
                doc.insert("$regex".into(), Value::String(pattern.to_regex()));
                if fold.is_some() {
                    doc.insert("$options".into(), Value::String("i".into()));
                }
                Value::Object(doc)
            }
            Self::Tag(tag) => {
                let tag = Value::String(tag.clone());
                return (
                    TAGS_PATH.to_string(),
                    if negated { json!({ "$ne": tag }) } else { tag },
                );
            }
        };

        let condition = if negated {
            json!({ "$not": positive })
        } else {
            positive
        };

        (self.path().to_string(), condition)
    }
}

///
/// Fan-out
///

/// Predicates whose disjunction is `field op literal` for one physical type.
pub(crate) fn compare_type(
    path: &str,
    ty: PhysicalType,
    op: CompareOp,
    literal: &Literal,
) -> Vec<Physical> {
    let type_test = || {
        vec![Physical::Type {
            path: path.to_string(),
            ty,
        }]
    };
    let typed = |op: CompareOp, value: PhysicalValue| {
        vec![Physical::Compare {
            path: path.to_string(),
            op,
            value,
        }]
    };

    let literal_is_text = matches!(literal, Literal::Text(_));
    if ty.is_text() != literal_is_text {
        // every value of a higher rank is greater
        let type_above = ty.is_text();
        return match op {
            CompareOp::Gt if type_above => type_test(),
            CompareOp::Lt if !type_above => type_test(),
            _ => Vec::new(),
        };
    }

    match (ty, literal) {
        (PhysicalType::String, Literal::Text(s)) => typed(op, PhysicalValue::Text(s.clone())),
        (PhysicalType::ObjectId, Literal::Text(s)) => match op {
            CompareOp::Eq => is_object_id(s)
                .then(|| typed(op, PhysicalValue::ObjectId(s.clone())))
                .unwrap_or_default(),
            CompareOp::Gt => object_id_floor(s)
                .map_or_else(type_test, |id| typed(op, PhysicalValue::ObjectId(id))),
            _ => object_id_ceil(s)
                .map_or_else(type_test, |id| typed(op, PhysicalValue::ObjectId(id))),
        },
        (PhysicalType::Number, _) => literal
            .numeric()
            .map(|n| typed(op, PhysicalValue::Number(n)))
            .unwrap_or_default(),
        (PhysicalType::Date, _) => literal
            .numeric()
            .map(|n| compare_date(path, op, n))
            .unwrap_or_default(),
        (PhysicalType::Bool, _) => literal
            .numeric()
            .map(|n| compare_bool(path, op, n))
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn compare_date(path: &str, op: CompareOp, n: f64) -> Vec<Physical> {
    let all = || {
        vec![Physical::Type {
            path: path.to_string(),
            ty: PhysicalType::Date,
        }]
    };
    let bound = match op {
        CompareOp::Eq if n.fract() != 0.0 || n.abs() > MAX_INSTANT => return Vec::new(),
        CompareOp::Eq => n,
        CompareOp::Gt if n >= MAX_INSTANT => return Vec::new(),
        CompareOp::Gt if n < -MAX_INSTANT => return all(),
        CompareOp::Gt => n.floor(),
        _ if n <= -MAX_INSTANT => return Vec::new(),
        _ if n > MAX_INSTANT => return all(),
        _ => n.ceil(),
    };

    vec![Physical::Compare {
        path: path.to_string(),
        op,
        value: PhysicalValue::Date(bound as i64),
    }]
}

// Booleans compare as 0 and 1.
fn compare_bool(path: &str, op: CompareOp, n: f64) -> Vec<Physical> {
    let equals = |b: bool| {
        vec![Physical::Compare {
            path: path.to_string(),
            op: CompareOp::Eq,
            value: PhysicalValue::Bool(b),
        }]
    };
    let all = || {
        vec![Physical::Type {
            path: path.to_string(),
            ty: PhysicalType::Bool,
        }]
    };

    match op {
        CompareOp::Eq if n == 0.0 => equals(false),
        CompareOp::Eq if n == 1.0 => equals(true),
        CompareOp::Gt if n < 0.0 => all(),
        CompareOp::Gt if n < 1.0 => equals(true),
        CompareOp::Lt if n > 1.0 => all(),
        CompareOp::Lt if n > 0.0 => equals(false),
        _ => Vec::new(),
    }
}

///
/// Object ids
///

fn is_hex_digit(c: u8) -> bool {
    HEX_DIGITS.contains(&c)
}

pub(crate) fn is_object_id(s: &str) -> bool {
    s.len() == OBJECT_ID_LEN && s.bytes().all(is_hex_digit)
}

// Length of the longest prefix made of id digits, capped at an id's length.
fn hex_prefix(s: &str) -> usize {
    s.bytes()
        .take(OBJECT_ID_LEN)
        .take_while(|c| is_hex_digit(*c))
        .count()
}

fn padded(prefix: &[u8], digit: u8, fill: u8) -> String {
    let mut out: Vec<u8> = prefix.to_vec();
    out.push(digit);
    out.resize(OBJECT_ID_LEN, fill);

    String::from_utf8_lossy(&out).into_owned()
}

/// Largest object id not above `s`; ids greater than it are exactly the
/// ids greater than `s`.
pub(crate) fn object_id_floor(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let valid = hex_prefix(s);
    if valid == OBJECT_ID_LEN {
        return Some(s[..OBJECT_ID_LEN].to_string());
    }

    (0..=valid).rev().find_map(|k| {
        let next = *bytes.get(k)?;
        let digit = HEX_DIGITS.iter().rev().find(|d| **d < next)?;
        Some(padded(&bytes[..k], *digit, b'f'))
    })
}

/// Smallest object id not below `s`; ids less than it are exactly the ids
/// less than `s`.
pub(crate) fn object_id_ceil(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let valid = hex_prefix(s);
    if valid == OBJECT_ID_LEN && bytes.len() == OBJECT_ID_LEN {
        return Some(s.to_string());
    }
    if valid == bytes.len() {
        let mut out = s.as_bytes().to_vec();
        out.resize(OBJECT_ID_LEN, b'0');
        return Some(String::from_utf8_lossy(&out).into_owned());
    }

    (0..=valid.min(OBJECT_ID_LEN - 1)).rev().find_map(|k| {
        let next = *bytes.get(k)?;
        let digit = HEX_DIGITS.iter().find(|d| **d > next)?;
        Some(padded(&bytes[..k], *digit, b'0'))
    })
}
