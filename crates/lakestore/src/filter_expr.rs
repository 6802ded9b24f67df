//! `--filter` expressions.
//!
//! Each expression is `<column><op><literal>` with `op` one of `=`, `!=`,
//! `<`, `<=`, `>`, `>=`. Literals are typed by shape: `true`/`false`,
//! integers, floats, `null`, and anything else as a string (surrounding
//! quotes are stripped). Repeated expressions are AND-ed.

use anyhow::{bail, Result};
use lakestore_core::{col, Filter, ScalarValue};

const OPERATORS: [&str; 6] = ["!=", "<=", ">=", "=", "<", ">"];

/// Parse one expression.
pub fn parse_filter(expr: &str) -> Result<Filter> {
    let Some(start) = expr.find(|c| matches!(c, '=' | '!' | '<' | '>')) else {
        bail!(
            "invalid filter '{}': expected <column><op><value> with op one of =, !=, <, <=, >, >=",
            expr
        );
    };

    let column = expr[..start].trim();
    if column.is_empty() {
        bail!("invalid filter '{}': missing column name", expr);
    }

    let rest = &expr[start..];
    let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
        bail!("invalid filter '{}': unknown operator", expr);
    };
    let literal = parse_literal(rest[op.len()..].trim());

    let column = col(column);
    let filter = match (*op, literal) {
        ("=", ScalarValue::Null) => column.is_null(),
        ("!=", ScalarValue::Null) => column.is_not_null(),
        (_, ScalarValue::Null) => bail!("invalid filter '{}': null only supports = and !=", expr),
        ("=", value) => column.eq(value),
        ("!=", value) => column.not_eq(value),
        ("<", value) => column.lt(value),
        ("<=", value) => column.lt_eq(value),
        (">", value) => column.gt(value),
        (">=", value) => column.gt_eq(value),
        (other, _) => bail!("invalid filter '{}': unknown operator '{}'", expr, other),
    };
    Ok(filter)
}

/// Parse every expression and AND them together.
pub fn parse_filters<S: AsRef<str>>(exprs: &[S]) -> Result<Option<Filter>> {
    let filters = exprs
        .iter()
        .map(|e| parse_filter(e.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok(Filter::all(filters))
}

fn parse_literal(raw: &str) -> ScalarValue {
    if let Some(quoted) = strip_quotes(raw) {
        return ScalarValue::Utf8(quoted.to_string());
    }
    match raw {
        "true" => return ScalarValue::Boolean(true),
        "false" => return ScalarValue::Boolean(false),
        "null" | "NULL" => return ScalarValue::Null,
        _ => {}
    }
    if let Ok(v) = raw.parse::<i64>() {
        return ScalarValue::Int64(v);
    }
    if let Ok(v) = raw.parse::<f64>() {
        if v.is_finite() {
            return ScalarValue::Float64(v);
        }
    }
    ScalarValue::Utf8(raw.to_string())
}

fn strip_quotes(raw: &str) -> Option<&str> {
    ['\'', '"'].iter().find_map(|q| {
        raw.strip_prefix(*q).and_then(|r| r.strip_suffix(*q))
    })
}
