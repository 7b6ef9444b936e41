/*!
Iceberg's primitive and nested type system ([`Type`]), and the typed runtime
[`Value`] used by partition transforms, statistics bounds, and literal
predicates.
*/
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{IcebergError, Result};

lazy_static! {
    static ref DECIMAL_RE: Regex = Regex::new(r"^decimal\(\s*(\d+)\s*,\s*(\d+)\s*\)$").unwrap();
    static ref FIXED_RE: Regex = Regex::new(r"^fixed\[\s*(\d+)\s*\]$").unwrap();
}

/// A primitive Iceberg type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    /// `boolean`
    Boolean,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    /// 32-bit IEEE 754 float
    Float,
    /// 64-bit IEEE 754 float
    Double,
    /// Calendar date, no time zone
    Date,
    /// Time of day in microseconds, no date, no time zone
    Time,
    /// Timestamp in microseconds, no time zone
    Timestamp,
    /// Timestamp in microseconds, UTC
    Timestamptz,
    /// Timestamp in nanoseconds, no time zone (v3)
    TimestampNs,
    /// Timestamp in nanoseconds, UTC (v3)
    TimestamptzNs,
    /// UTF-8 string
    String,
    /// 128-bit UUID
    Uuid,
    /// Fixed-length byte array of length `L`
    Fixed(u64),
    /// Variable-length byte array
    Binary,
    /// Fixed-point decimal with precision `P` and scale `S`, `P <= 38`
    Decimal {
        /// Total number of decimal digits.
        precision: u32,
        /// Number of digits after the decimal point.
        scale: u32,
    },
    /// Semi-structured value carrying its own embedded schema (v3).
    Variant,
    /// A value of a type not understood by this reader (v3); round-trips
    /// opaquely and is never materialized.
    Unknown,
    /// Planar geometry in a specified CRS (v3).
    Geometry,
    /// Geodetic geography in a specified CRS (v3).
    Geography,
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveType::Boolean => write!(f, "boolean"),
            PrimitiveType::Int => write!(f, "int"),
            PrimitiveType::Long => write!(f, "long"),
            PrimitiveType::Float => write!(f, "float"),
            PrimitiveType::Double => write!(f, "double"),
            PrimitiveType::Date => write!(f, "date"),
            PrimitiveType::Time => write!(f, "time"),
            PrimitiveType::Timestamp => write!(f, "timestamp"),
            PrimitiveType::Timestamptz => write!(f, "timestamptz"),
            PrimitiveType::TimestampNs => write!(f, "timestamp_ns"),
            PrimitiveType::TimestamptzNs => write!(f, "timestamptz_ns"),
            PrimitiveType::String => write!(f, "string"),
            PrimitiveType::Uuid => write!(f, "uuid"),
            PrimitiveType::Fixed(l) => write!(f, "fixed[{l}]"),
            PrimitiveType::Binary => write!(f, "binary"),
            PrimitiveType::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            PrimitiveType::Variant => write!(f, "variant"),
            PrimitiveType::Unknown => write!(f, "unknown"),
            PrimitiveType::Geometry => write!(f, "geometry"),
            PrimitiveType::Geography => write!(f, "geography"),
        }
    }
}

impl PrimitiveType {
    /// `true` for the v3 types whose only permitted `initial-default` is
    /// `null` (spec.md §4.2): `unknown`, `variant`, `geometry`, `geography`.
    pub fn allows_only_null_default(&self) -> bool {
        matches!(
            self,
            PrimitiveType::Unknown | PrimitiveType::Variant | PrimitiveType::Geometry | PrimitiveType::Geography
        )
    }
}

impl std::str::FromStr for PrimitiveType {
    type Err = IcebergError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "boolean" => PrimitiveType::Boolean,
            "int" => PrimitiveType::Int,
            "long" => PrimitiveType::Long,
            "float" => PrimitiveType::Float,
            "double" => PrimitiveType::Double,
            "date" => PrimitiveType::Date,
            "time" => PrimitiveType::Time,
            "timestamp" => PrimitiveType::Timestamp,
            "timestamptz" => PrimitiveType::Timestamptz,
            "timestamp_ns" => PrimitiveType::TimestampNs,
            "timestamptz_ns" => PrimitiveType::TimestamptzNs,
            "string" => PrimitiveType::String,
            "uuid" => PrimitiveType::Uuid,
            "binary" => PrimitiveType::Binary,
            "variant" => PrimitiveType::Variant,
            "unknown" => PrimitiveType::Unknown,
            "geometry" => PrimitiveType::Geometry,
            "geography" => PrimitiveType::Geography,
            other => {
                if let Some(caps) = FIXED_RE.captures(other) {
                    let len: u64 = caps[1].parse().map_err(|_| {
                        IcebergError::Metadata(format!("invalid fixed length in '{other}'"))
                    })?;
                    PrimitiveType::Fixed(len)
                } else if let Some(caps) = DECIMAL_RE.captures(other) {
                    let precision: u32 = caps[1].parse().unwrap();
                    let scale: u32 = caps[2].parse().unwrap();
                    PrimitiveType::Decimal { precision, scale }
                } else {
                    return Err(IcebergError::Metadata(format!("unknown primitive type '{other}'")));
                }
            }
        })
    }
}

impl Serialize for PrimitiveType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PrimitiveType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// A field in a [`StructType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedField {
    /// Globally unique, monotonically allocated field id.
    pub id: i32,
    /// Field name, unique within its immediate parent struct.
    pub name: String,
    /// Whether a value is mandatory (`true`) or may be absent (`false`).
    pub required: bool,
    #[serde(rename = "type")]
    /// The field's type, primitive or nested.
    pub field_type: Type,
    /// Optional field documentation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    /// Default value used when reading older data files that lack this
    /// field, or when materializing newly-added rows.
    #[serde(skip_serializing_if = "Option::is_none", rename = "initial-default")]
    pub initial_default: Option<serde_json::Value>,
    /// Default value assigned to this field for rows written after the
    /// field was added, when the writer does not supply a value.
    #[serde(skip_serializing_if = "Option::is_none", rename = "write-default")]
    pub write_default: Option<serde_json::Value>,
}

/// An ordered collection of named, typed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructType {
    #[serde(rename = "type")]
    r#type: StructTag,
    /// Fields, in declared order. Order is part of the schema's identity for
    /// documents but not for field resolution, which is always by id.
    pub fields: Vec<NestedField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StructTag {
    Struct,
}

impl StructType {
    /// Build a struct type from a field list.
    pub fn new(fields: Vec<NestedField>) -> Self {
        StructType {
            r#type: StructTag::Struct,
            fields,
        }
    }

    /// Look up a field by its id.
    pub fn field_by_id(&self, id: i32) -> Option<&NestedField> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Look up a field by name among this struct's immediate children.
    pub fn field_by_name(&self, name: &str) -> Option<&NestedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A homogeneous, optionally-nullable sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListType {
    #[serde(rename = "type")]
    r#type: ListTag,
    /// Field id of the list's element.
    pub element_id: i32,
    /// Whether the list's elements may be null.
    pub element_required: bool,
    /// The element type.
    pub element: Arc<Type>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ListTag {
    List,
}

/// A map from a key type to a value type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapType {
    #[serde(rename = "type")]
    r#type: MapTag,
    /// Field id of the map's key.
    pub key_id: i32,
    /// The key type. Iceberg requires map keys be non-null.
    pub key: Arc<Type>,
    /// Field id of the map's value.
    pub value_id: i32,
    /// Whether the map's values may be null.
    pub value_required: bool,
    /// The value type.
    pub value: Arc<Type>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MapTag {
    Map,
}

/// Any Iceberg type: a primitive, or one of the three nested type
/// constructors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Type {
    /// A primitive, serialized as its bare string name.
    Primitive(PrimitiveType),
    /// `{"type": "struct", "fields": [...]}`
    Struct(StructType),
    /// `{"type": "list", ...}`
    List(ListType),
    /// `{"type": "map", ...}`
    Map(MapType),
}

impl Type {
    /// `true` if this is [`Type::Primitive`].
    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Primitive(_))
    }

    /// View this type as a primitive, if it is one.
    pub fn as_primitive(&self) -> Option<&PrimitiveType> {
        match self {
            Type::Primitive(p) => Some(p),
            _ => None,
        }
    }
}

impl From<PrimitiveType> for Type {
    fn from(p: PrimitiveType) -> Self {
        Type::Primitive(p)
    }
}

/// A typed runtime value: the result of decoding a stats bound, a partition
/// value, or a literal in a predicate. Distinct from [`Type`], which
/// describes shape; `Value` carries data.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of a value in a nullable field.
    Null,
    /// `boolean`
    Boolean(bool),
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// `date`, days since 1970-01-01
    Date(i32),
    /// `time`, microseconds since midnight
    Time(i64),
    /// `timestamp`, microseconds since 1970-01-01T00:00:00
    Timestamp(i64),
    /// `timestamptz`, microseconds since 1970-01-01T00:00:00Z
    Timestamptz(i64),
    /// `string`
    String(String),
    /// `uuid`
    Uuid(uuid::Uuid),
    /// `fixed[L]` / `binary`
    Binary(Vec<u8>),
    /// `decimal(P,S)`
    Decimal(super::decimal::Decimal),
}

impl Value {
    /// The days-since-epoch backing a [`Value::Date`], converting from a
    /// calendar date.
    pub fn date_from_ymd(year: i32, month: u32, day: u32) -> Result<Value> {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| IcebergError::Validation(format!("invalid date {year}-{month}-{day}")))?;
        Ok(Value::Date((date - epoch).num_days() as i32))
    }

    /// Render a [`Value::Date`] as a `NaiveDate`.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(days) => {
                let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
                epoch.checked_add_signed(chrono::Duration::days(*days as i64))
            }
            _ => None,
        }
    }

    /// Render a [`Value::Timestamp`]/[`Value::Timestamptz`] as a naive
    /// datetime (UTC offset applied to timestamptz is caller's concern;
    /// both variants store UTC microseconds).
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(us) | Value::Timestamptz(us) => {
                chrono::DateTime::from_timestamp_micros(*us).map(|dt| dt.naive_utc())
            }
            _ => None,
        }
    }

    /// Whether this value is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_roundtrip_decimal() {
        let t: PrimitiveType = "decimal(9,2)".parse().unwrap();
        assert_eq!(t, PrimitiveType::Decimal { precision: 9, scale: 2 });
        assert_eq!(t.to_string(), "decimal(9,2)");
    }

    #[test]
    fn test_primitive_roundtrip_fixed() {
        let t: PrimitiveType = "fixed[16]".parse().unwrap();
        assert_eq!(t, PrimitiveType::Fixed(16));
        assert_eq!(t.to_string(), "fixed[16]");
    }

    #[test]
    fn test_primitive_serde_json() {
        let t = PrimitiveType::Long;
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"long\"");
        let back: PrimitiveType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_unknown_primitive_rejected() {
        let r: Result<PrimitiveType> = "not-a-type".parse();
        assert!(r.is_err());
    }

    #[test]
    fn test_struct_field_lookup() {
        let s = StructType::new(vec![NestedField {
            id: 1,
            name: "a".to_string(),
            required: true,
            field_type: Type::Primitive(PrimitiveType::Int),
            doc: None,
            initial_default: None,
            write_default: None,
        }]);
        assert!(s.field_by_id(1).is_some());
        assert!(s.field_by_name("a").is_some());
        assert!(s.field_by_id(2).is_none());
    }

    #[test]
    fn test_date_from_ymd() {
        let v = Value::date_from_ymd(1970, 1, 2).unwrap();
        assert_eq!(v, Value::Date(1));
    }
}
