/*!
Per-type value ordering (spec.md §4.5): the comparator every bound-tracking
collector and every pruning predicate is built on.
*/
use std::cmp::Ordering;

use crate::error::{IcebergError, Result};
use crate::model::types::Value;

/// Compare two values of the same logical type under Iceberg's comparator
/// rules: numeric/temporal by value, string/uuid lexicographically by
/// Unicode code point, binary/fixed lexicographically by unsigned byte,
/// decimal by unscaled integer (scales must match — callers are expected to
/// have normalized both values to the same schema field's scale), boolean
/// with `false < true`.
///
/// Returns an error if `a` and `b` are not the same variant (mixed-type
/// comparisons never arise from within one column's statistics).
pub fn compare_values(a: &Value, b: &Value) -> Result<Ordering> {
    Ok(match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Long(x), Value::Long(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x.total_cmp(y),
        (Value::Double(x), Value::Double(y)) => x.total_cmp(y),
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        (Value::Time(x), Value::Time(y)) => x.cmp(y),
        (Value::Timestamp(x), Value::Timestamp(y)) => x.cmp(y),
        (Value::Timestamptz(x), Value::Timestamptz(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => compare_code_points(x, y),
        (Value::Uuid(x), Value::Uuid(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Value::Binary(x), Value::Binary(y)) => x.cmp(y),
        (Value::Decimal(x), Value::Decimal(y)) => {
            if x.scale() != y.scale() {
                return Err(IcebergError::Validation(format!(
                    "cannot compare decimals of differing scale {} vs {}",
                    x.scale(),
                    y.scale()
                )));
            }
            x.unscaled().cmp(y.unscaled())
        }
        (a, b) => {
            return Err(IcebergError::Validation(format!(
                "cannot compare values of differing type: {a:?} vs {b:?}"
            )))
        }
    })
}

/// Lexicographic comparison by Unicode code point, independent of locale
/// (Rust's `str` ordering is already byte-wise UTF-8, which agrees with
/// code-point order for valid UTF-8).
fn compare_code_points(a: &str, b: &str) -> Ordering {
    a.chars().cmp(b.chars())
}
