/*!
Zone-map pruning (spec.md §4.5): given a file's `{min, max}` bounds for a
column, decide whether the file can possibly contain a row matching a
predicate. Soundness is the only contract `can_prune` makes — returning
`true` must guarantee no match; returning `false` is always safe (it just
means "don't know, read the file").
*/
use std::cmp::Ordering;

use crate::error::Result;
use crate::model::types::Value;

use super::comparator::compare_values;

/// A single-column comparison predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    /// `column = value`
    Eq,
    /// `column != value`
    NotEq,
    /// `column < value`
    Lt,
    /// `column <= value`
    LtEq,
    /// `column > value`
    Gt,
    /// `column >= value`
    GtEq,
}

/// A file's per-column zone-map summary: the bounds a
/// [`crate::stats::collector::ColumnStatsCollector`] produces, read back in
/// for pruning.
#[derive(Debug, Clone, Default)]
pub struct ZoneMap {
    /// Smallest non-null value in the file, if known.
    pub lower_bound: Option<Value>,
    /// Largest non-null value in the file, if known.
    pub upper_bound: Option<Value>,
    /// Total rows in the file, if known.
    pub value_count: Option<i64>,
    /// Null rows in the file, if known.
    pub null_count: Option<i64>,
}

/// Whether `zone` can be skipped for `predicate column <op> value`
/// (spec.md §4.5). A missing bound means "cannot prune": returns `false`.
///
/// A literal `null` comparison value is treated as "cannot prune" rather
/// than as an implicit IS NULL test (spec.md §9 open question — the source
/// does not specify which is intended, so this does not guess).
pub fn can_prune(zone: &ZoneMap, op: Predicate, value: &Value) -> Result<bool> {
    if value.is_null() {
        return Ok(false);
    }
    let (min, max) = match (&zone.lower_bound, &zone.upper_bound) {
        (Some(min), Some(max)) => (min, max),
        _ => return Ok(false),
    };
    Ok(match op {
        Predicate::Eq => {
            compare_values(value, min)? == Ordering::Less || compare_values(value, max)? == Ordering::Greater
        }
        Predicate::NotEq => {
            compare_values(min, max)? == Ordering::Equal && compare_values(min, value)? == Ordering::Equal
        }
        Predicate::Lt => compare_values(min, value)? != Ordering::Less,
        Predicate::LtEq => compare_values(min, value)? == Ordering::Greater,
        Predicate::Gt => compare_values(max, value)? != Ordering::Greater,
        Predicate::GtEq => compare_values(max, value)? == Ordering::Less,
    })
}

/// A boolean combination of per-column predicates over a set of zone maps,
/// keyed by field id.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A leaf comparison against one column's zone map.
    Compare {
        /// Field id the zone map is keyed by.
        field_id: i32,
        /// The comparison operator.
        op: Predicate,
        /// The literal compared against.
        value: Value,
    },
    /// All sub-expressions must hold for the file to match.
    And(Vec<Expr>),
    /// At least one sub-expression must hold for the file to match.
    Or(Vec<Expr>),
}

/// Evaluate whether a file described by `zones` (field id -> zone map) can
/// be pruned for the compound predicate `expr`. An `AND` can be pruned if
/// any conjunct alone proves no match is possible; an `OR` can be pruned
/// only if every disjunct proves no match is possible.
pub fn can_prune_expr(expr: &Expr, zones: &std::collections::HashMap<i32, ZoneMap>) -> Result<bool> {
    Ok(match expr {
        Expr::Compare { field_id, op, value } => match zones.get(field_id) {
            Some(zone) => can_prune(zone, *op, value)?,
            None => false,
        },
        Expr::And(children) => {
            let mut pruned = false;
            for c in children {
                if can_prune_expr(c, zones)? {
                    pruned = true;
                    break;
                }
            }
            pruned
        }
        Expr::Or(children) => {
            let mut pruned = true;
            for c in children {
                if !can_prune_expr(c, zones)? {
                    pruned = false;
                    break;
                }
            }
            pruned
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(min: i32, max: i32) -> ZoneMap {
        ZoneMap {
            lower_bound: Some(Value::Int(min)),
            upper_bound: Some(Value::Int(max)),
            value_count: None,
            null_count: None,
        }
    }

    #[test]
    fn test_eq_prunes_outside_range() {
        assert!(can_prune(&zone(10, 20), Predicate::Eq, &Value::Int(5)).unwrap());
        assert!(!can_prune(&zone(10, 20), Predicate::Eq, &Value::Int(15)).unwrap());
    }

    #[test]
    fn test_gteq_prunes_when_max_below_threshold() {
        // scenario C: files with year bounds [2010,2015],[2016,2018],[2019,2022],
        // predicate year >= 2020.
        assert!(can_prune(&zone(2010, 2015), Predicate::GtEq, &Value::Int(2020)).unwrap());
        assert!(can_prune(&zone(2016, 2018), Predicate::GtEq, &Value::Int(2020)).unwrap());
        assert!(!can_prune(&zone(2019, 2022), Predicate::GtEq, &Value::Int(2020)).unwrap());
    }

    #[test]
    fn test_missing_bounds_cannot_prune() {
        let zone = ZoneMap::default();
        assert!(!can_prune(&zone, Predicate::Eq, &Value::Int(1)).unwrap());
    }

    #[test]
    fn test_null_literal_cannot_prune() {
        assert!(!can_prune(&zone(1, 10), Predicate::Eq, &Value::Null).unwrap());
    }

    #[test]
    fn test_not_eq_prunes_only_when_constant_column() {
        assert!(can_prune(&zone(5, 5), Predicate::NotEq, &Value::Int(5)).unwrap());
        assert!(!can_prune(&zone(5, 6), Predicate::NotEq, &Value::Int(5)).unwrap());
    }

    #[test]
    fn test_and_prunes_if_any_conjunct_prunes() {
        let mut zones = std::collections::HashMap::new();
        zones.insert(1, zone(10, 20));
        zones.insert(2, zone(100, 200));
        let expr = Expr::And(vec![
            Expr::Compare { field_id: 1, op: Predicate::Eq, value: Value::Int(5) },
            Expr::Compare { field_id: 2, op: Predicate::Eq, value: Value::Int(150) },
        ]);
        assert!(can_prune_expr(&expr, &zones).unwrap());
    }

    #[test]
    fn test_or_prunes_only_if_all_prune() {
        let mut zones = std::collections::HashMap::new();
        zones.insert(1, zone(10, 20));
        zones.insert(2, zone(100, 200));
        let expr = Expr::Or(vec![
            Expr::Compare { field_id: 1, op: Predicate::Eq, value: Value::Int(5) },
            Expr::Compare { field_id: 2, op: Predicate::Eq, value: Value::Int(150) },
        ]);
        assert!(!can_prune_expr(&expr, &zones).unwrap());
    }
}
