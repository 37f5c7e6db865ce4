//! Lossless JSON array form: `[operator, operand...]` with literals as scalars.

use crate::{
    error::{ErrorOrigin, InternalError},
    expr::{ArithOp, CompareOp, Expr, Literal},
};
use serde_json::{Number, Value};

impl Expr {
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Literal(lit) => literal_to_json(lit),
            Self::Param(name) => tagged("PARAM", [name.to_json()]),
            Self::Func { name, args } => {
                let mut items = vec![Value::from("FUNC"), Value::from(name.as_str())];
                items.extend(args.iter().map(Self::to_json));
                Value::Array(items)
            }
            Self::And(children) => tagged("AND", children.iter().map(Self::to_json)),
            Self::Or(children) => tagged("OR", children.iter().map(Self::to_json)),
            Self::Not(operand) => tagged("NOT", [operand.to_json()]),
            Self::Compare { op, lhs, rhs } => tagged(op.symbol(), [lhs.to_json(), rhs.to_json()]),
            Self::IsNull { operand, negated } => {
                let tag = if *negated { "IS NOT NULL" } else { "IS NULL" };
                tagged(tag, [operand.to_json()])
            }
            Self::Like {
                lhs,
                pattern,
                escape,
                negated,
            } => {
                let tag = if *negated { "NOT LIKE" } else { "LIKE" };
                let mut operands = vec![lhs.to_json(), pattern.to_json()];
                if let Some(escape) = escape {
                    operands.push(escape.to_json());
                }
                tagged(tag, operands)
            }
            Self::Case(arms) => tagged(
                "CASE",
                arms.iter()
                    .flat_map(|(guard, value)| [guard.to_json(), value.to_json()]),
            ),
            Self::Arith { op, lhs, rhs } => tagged(op.symbol(), [lhs.to_json(), rhs.to_json()]),
            Self::Concat(lhs, rhs) => tagged("||", [lhs.to_json(), rhs.to_json()]),
        }
    }

    pub fn from_json(value: &Value) -> Result<Self, InternalError> {
        match value {
            Value::Null => Ok(Self::null()),
            Value::Bool(b) => Ok(Self::bool(*b)),
            Value::Number(n) => n
                .as_f64()
                .filter(|v| v.is_finite())
                .map(Self::number)
                .ok_or_else(|| invalid(format!("unrepresentable number {n}"))),
            Value::String(s) => Ok(Self::text(s.clone())),
            Value::Array(items) => array_from_json(items),
            Value::Object(_) => Err(invalid("objects are not expressions")),
        }
    }
}

fn tagged(tag: &str, operands: impl IntoIterator<Item = Value>) -> Value {
    let mut items = vec![Value::from(tag)];
    items.extend(operands);

    Value::Array(items)
}

fn literal_to_json(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Number(n) => number_to_json(*n),
        Literal::Text(s) => Value::String(s.clone()),
    }
}

// Integral values within the exact f64 range serialize as JSON integers.
pub(crate) fn number_to_json(n: f64) -> Value {
    const EXACT: f64 = 9_007_199_254_740_992.0;
    if n.fract() == 0.0 && n.abs() <= EXACT {
        return Value::from(n as i64);
    }

    Number::from_f64(n).map_or(Value::Null, Value::Number)
}

fn invalid(message: impl Into<String>) -> InternalError {
    InternalError::invalid_query(ErrorOrigin::Parse, message)
}

fn array_from_json(items: &[Value]) -> Result<Expr, InternalError> {
    let Some((head, operands)) = items.split_first() else {
        return Err(invalid("empty expression array"));
    };
    let Some(tag) = head.as_str() else {
        return Err(invalid("expression array must start with an operator name"));
    };
    let operands = operands
        .iter()
        .map(Expr::from_json)
        .collect::<Result<Vec<_>, _>>()?;

    let expr = match (tag, operands.as_slice()) {
        ("PARAM", [name]) => Expr::Param(Box::new(name.clone())),
        ("FUNC", [Expr::Literal(Literal::Text(name)), args @ ..]) => {
            Expr::func(name.clone(), args.to_vec())
        }
        ("AND", children) if children.len() >= 2 => Expr::And(operands),
        ("OR", children) if children.len() >= 2 => Expr::Or(operands),
        ("NOT", [operand]) => Expr::not(operand.clone()),
        ("IS NULL", [operand]) => Expr::is_null(operand.clone()),
        ("IS NOT NULL", [operand]) => Expr::is_not_null(operand.clone()),
        ("LIKE" | "NOT LIKE", [lhs, pattern]) => {
            Expr::like(lhs.clone(), pattern.clone(), None, tag == "NOT LIKE")
        }
        ("LIKE" | "NOT LIKE", [lhs, pattern, escape]) => Expr::like(
            lhs.clone(),
            pattern.clone(),
            Some(escape.clone()),
            tag == "NOT LIKE",
        ),
        ("CASE", arms) if !arms.is_empty() && arms.len() % 2 == 0 => Expr::Case(
            arms.chunks_exact(2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .collect(),
        ),
        ("||", [lhs, rhs]) => Expr::concat(lhs.clone(), rhs.clone()),
        (symbol, [lhs, rhs]) => {
            if let Some(op) = CompareOp::from_symbol(symbol) {
                Expr::compare(op, lhs.clone(), rhs.clone())
            } else if let Some(op) = ArithOp::from_symbol(symbol) {
                Expr::arith(op, lhs.clone(), rhs.clone())
            } else {
                return Err(unsupported(tag));
            }
        }
        _ => return Err(unsupported(tag)),
    };

    Ok(expr)
}

fn unsupported(tag: &str) -> InternalError {
    InternalError::unsupported(
        ErrorOrigin::Parse,
        format!("unsupported operator '{tag}' in expression array"),
    )
}
