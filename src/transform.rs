/*!
Partition and sort transforms: the identity, bucket, truncate, temporal and
void functions used to derive a partition value from a source column value
(spec.md §4.3).
*/
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{IcebergError, Result};
use crate::hash::murmur3;
use crate::model::decimal::Decimal;
use crate::model::types::{PrimitiveType, Value};

lazy_static! {
    static ref BUCKET_RE: Regex = Regex::new(r"^bucket\[\s*(\d+)\s*\]$").unwrap();
    static ref TRUNCATE_RE: Regex = Regex::new(r"^truncate\[\s*(\d+)\s*\]$").unwrap();
}

/// A partition or sort transform applied to one source column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transform {
    /// Source value, unchanged.
    Identity,
    /// `(murmur3(bytes) & i32::MAX) % n`.
    Bucket(u32),
    /// Truncate a string/binary/int/long/decimal value to a fixed width.
    Truncate(u32),
    /// Extract the year from a date/timestamp, as years since 1970.
    Year,
    /// Extract the month from a date/timestamp, as months since 1970-01.
    Month,
    /// Extract the day from a date/timestamp, as days since 1970-01-01.
    Day,
    /// Extract the hour from a timestamp, as hours since 1970-01-01T00.
    Hour,
    /// Always unset; used to drop a column from partitioning without
    /// removing history of it having been partitioned on.
    Void,
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Identity => write!(f, "identity"),
            Transform::Bucket(n) => write!(f, "bucket[{n}]"),
            Transform::Truncate(w) => write!(f, "truncate[{w}]"),
            Transform::Year => write!(f, "year"),
            Transform::Month => write!(f, "month"),
            Transform::Day => write!(f, "day"),
            Transform::Hour => write!(f, "hour"),
            Transform::Void => write!(f, "void"),
        }
    }
}

impl std::str::FromStr for Transform {
    type Err = IcebergError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "identity" => Transform::Identity,
            "year" => Transform::Year,
            "month" => Transform::Month,
            "day" => Transform::Day,
            "hour" => Transform::Hour,
            "void" => Transform::Void,
            other => {
                if let Some(caps) = BUCKET_RE.captures(other) {
                    Transform::Bucket(caps[1].parse().unwrap())
                } else if let Some(caps) = TRUNCATE_RE.captures(other) {
                    Transform::Truncate(caps[1].parse().unwrap())
                } else {
                    return Err(IcebergError::Transform(format!("unknown transform '{other}'")));
                }
            }
        })
    }
}

impl serde::Serialize for Transform {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Transform {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Transform {
    /// The result type of applying this transform to a source of the given
    /// primitive type (spec.md §4.3 result-type table).
    pub fn result_type(&self, source: &PrimitiveType) -> Result<PrimitiveType> {
        use PrimitiveType::*;
        Ok(match self {
            Transform::Identity => source.clone(),
            Transform::Bucket(_) => Int,
            Transform::Truncate(_) => source.clone(),
            Transform::Year | Transform::Month | Transform::Day => Int,
            Transform::Hour => Int,
            Transform::Void => source.clone(),
        })
        .and_then(|t| {
            // temporal transforms are only defined over date/time sources;
            // `hour` additionally excludes bare `date`, which has no time
            // component.
            let temporal_ok = match self {
                Transform::Year | Transform::Month | Transform::Day => {
                    matches!(source, Date | Timestamp | Timestamptz | TimestampNs | TimestamptzNs)
                }
                Transform::Hour => {
                    matches!(source, Timestamp | Timestamptz | TimestampNs | TimestamptzNs)
                }
                _ => true,
            };
            if !temporal_ok {
                Err(IcebergError::Transform(format!(
                    "{self} is not defined over source type {source}"
                )))
            } else {
                Ok(t)
            }
        })
    }

    /// Apply this transform to a value, producing the partition value.
    /// Returns `Value::Null` unchanged for a null source (all transforms
    /// except identity pass nulls through as null).
    pub fn apply(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            Transform::Identity => Ok(value.clone()),
            Transform::Void => Ok(Value::Null),
            Transform::Bucket(n) => self.apply_bucket(*n, value),
            Transform::Truncate(w) => self.apply_truncate(*w, value),
            Transform::Year => self.apply_temporal(value, TemporalUnit::Year),
            Transform::Month => self.apply_temporal(value, TemporalUnit::Month),
            Transform::Day => self.apply_temporal(value, TemporalUnit::Day),
            Transform::Hour => self.apply_temporal(value, TemporalUnit::Hour),
        }
    }

    fn apply_bucket(&self, n: u32, value: &Value) -> Result<Value> {
        let bytes = canonical_hash_bytes(value)?;
        Ok(Value::Int(murmur3::bucket_n(&bytes, n)))
    }

    fn apply_truncate(&self, w: u32, value: &Value) -> Result<Value> {
        Ok(match value {
            Value::Int(i) => Value::Int(i - i.rem_euclid(w as i32)),
            Value::Long(l) => Value::Long(l - l.rem_euclid(w as i64)),
            Value::String(s) => {
                let truncated: String = s.chars().take(w as usize).collect();
                Value::String(truncated)
            }
            Value::Binary(b) => Value::Binary(b.iter().take(w as usize).cloned().collect()),
            Value::Decimal(d) => {
                let unscaled = d.unscaled();
                let w = num_bigint::BigInt::from(w);
                let remainder = ((unscaled % &w) + &w) % &w;
                let truncated = unscaled - remainder;
                Value::Decimal(Decimal::new(truncated, d.precision(), d.scale())?)
            }
            other => {
                return Err(IcebergError::Transform(format!(
                    "truncate is not defined over value {other:?}"
                )))
            }
        })
    }

    fn apply_temporal(&self, value: &Value, unit: TemporalUnit) -> Result<Value> {
        let dt = match (value, unit) {
            (Value::Date(_), TemporalUnit::Hour) => {
                return Err(IcebergError::Transform(
                    "hour transform is not defined over date values".to_string(),
                ))
            }
            (Value::Date(_), _) => value.as_date().map(|d| d.and_hms_opt(0, 0, 0).unwrap()),
            (Value::Timestamp(_), _) | (Value::Timestamptz(_), _) => value.as_datetime(),
            (other, _) => {
                return Err(IcebergError::Transform(format!(
                    "{self} is not defined over value {other:?}"
                )))
            }
        }
        .ok_or_else(|| IcebergError::Transform("invalid temporal value".to_string()))?;

        use chrono::Datelike;
        let result = match unit {
            TemporalUnit::Year => dt.year() - 1970,
            TemporalUnit::Month => (dt.year() - 1970) * 12 + (dt.month() as i32 - 1),
            TemporalUnit::Day => {
                let epoch = chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
                (dt.date() - epoch).num_days() as i32
            }
            TemporalUnit::Hour => {
                let epoch = chrono::NaiveDate::from_ymd_opt(1970, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap();
                ((dt - epoch).num_seconds() / 3600) as i32
            }
        };
        Ok(Value::Int(result))
    }
}

#[derive(Clone, Copy)]
enum TemporalUnit {
    Year,
    Month,
    Day,
    Hour,
}

/// Encode a value into the canonical little-endian byte sequence Iceberg
/// hashes for the `bucket` transform (spec.md §4.3 / Appendix B of the
/// table format spec): `int`/`date` widen to 8-byte `long`, `string` is
/// UTF-8 bytes, `decimal` hashes its unscaled value's minimal two's
/// complement big-endian form, `binary`/`fixed` hash raw bytes.
pub fn canonical_hash_bytes(value: &Value) -> Result<Vec<u8>> {
    Ok(match value {
        Value::Int(i) => (*i as i64).to_le_bytes().to_vec(),
        Value::Date(d) => (*d as i64).to_le_bytes().to_vec(),
        Value::Long(l) => l.to_le_bytes().to_vec(),
        Value::Time(t) | Value::Timestamp(t) | Value::Timestamptz(t) => t.to_le_bytes().to_vec(),
        Value::String(s) => s.as_bytes().to_vec(),
        Value::Binary(b) => b.clone(),
        Value::Uuid(u) => u.as_bytes().to_vec(),
        Value::Decimal(d) => d.to_be_bytes()?,
        Value::Boolean(b) => vec![*b as u8],
        other => {
            return Err(IcebergError::Transform(format!(
                "bucket is not defined over value {other:?}"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_bucket() {
        let t: Transform = "bucket[16]".parse().unwrap();
        assert_eq!(t, Transform::Bucket(16));
        assert_eq!(t.to_string(), "bucket[16]");
    }

    #[test]
    fn test_parse_truncate() {
        let t: Transform = "truncate[10]".parse().unwrap();
        assert_eq!(t, Transform::Truncate(10));
    }

    #[test]
    fn test_bucket_known_vector_int_34() {
        // Published Iceberg spec test vector: hash(34 as int) == 2017239379.
        let t = Transform::Bucket(16);
        let v = t.apply(&Value::Int(34)).unwrap();
        assert_eq!(v, Value::Int(2017239379i64.rem_euclid(16) as i32));
    }

    #[test]
    fn test_truncate_int_down_to_multiple() {
        let t = Transform::Truncate(10);
        assert_eq!(t.apply(&Value::Int(15)).unwrap(), Value::Int(10));
        assert_eq!(t.apply(&Value::Int(-1)).unwrap(), Value::Int(-10));
    }

    #[test]
    fn test_truncate_string() {
        let t = Transform::Truncate(3);
        assert_eq!(t.apply(&Value::String("iceberg".to_string())).unwrap(), Value::String("ice".to_string()));
    }

    #[test]
    fn test_null_passes_through_except_identity_still_null() {
        let t = Transform::Bucket(16);
        assert_eq!(t.apply(&Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_year_month_day_hour() {
        let date = Value::date_from_ymd(1970, 2, 1).unwrap();
        assert_eq!(Transform::Year.apply(&date).unwrap(), Value::Int(0));
        assert_eq!(Transform::Month.apply(&date).unwrap(), Value::Int(1));
        assert_eq!(Transform::Day.apply(&date).unwrap(), Value::Int(31));
    }

    #[test]
    fn test_hour_not_defined_over_date() {
        let date = Value::date_from_ymd(1970, 1, 1).unwrap();
        assert!(Transform::Hour.apply(&date).is_err());
    }

    #[test]
    fn test_void_always_null() {
        assert_eq!(Transform::Void.apply(&Value::Int(5)).unwrap(), Value::Null);
    }

    #[test]
    fn test_result_type_bucket_is_int() {
        let t = Transform::Bucket(4);
        assert_eq!(t.result_type(&PrimitiveType::String).unwrap(), PrimitiveType::Int);
    }

    #[test]
    fn test_result_type_year_rejects_string() {
        let t = Transform::Year;
        assert!(t.result_type(&PrimitiveType::String).is_err());
    }

    proptest! {
        // spec.md §8 invariant 4: 0 <= bucket[N](v) < N for every N>0.
        #[test]
        fn prop_bucket_always_in_range(n in 1u32..=4096, i in any::<i32>(), s in ".*") {
            let bucket_int = Transform::Bucket(n).apply(&Value::Int(i)).unwrap();
            let bucket_str = Transform::Bucket(n).apply(&Value::String(s)).unwrap();
            for v in [bucket_int, bucket_str] {
                match v {
                    Value::Int(b) => prop_assert!(b >= 0 && (b as u32) < n),
                    other => prop_assert!(false, "expected Int, got {other:?}"),
                }
            }
        }

        // spec.md §8 invariant 5: every transform maps null to null.
        #[test]
        fn prop_null_maps_to_null(n in 1u32..=256, w in 1u32..=256) {
            for t in [Transform::Identity, Transform::Bucket(n), Transform::Truncate(w),
                      Transform::Year, Transform::Month, Transform::Day, Transform::Hour, Transform::Void] {
                prop_assert_eq!(t.apply(&Value::Null).unwrap(), Value::Null);
            }
        }

        // truncate[W] on an int/long is always a multiple of W (spec.md §4.3).
        #[test]
        fn prop_truncate_int_is_multiple_of_width(w in 1u32..=10_000, i in any::<i32>()) {
            let truncated = Transform::Truncate(w).apply(&Value::Int(i)).unwrap();
            match truncated {
                Value::Int(t) => prop_assert_eq!((t as i64).rem_euclid(w as i64), 0),
                other => prop_assert!(false, "expected Int, got {other:?}"),
            }
        }
    }
}
