/*!
Binary encoding of column-statistics bounds (spec.md §4.5), used for
`lower_bounds`/`upper_bounds` in manifest entries and for
`lower_bound`/`upper_bound` in manifest-list partition summaries. The same
little-endian, fixed-width encoding is used everywhere a single typed value
needs to cross the Avro boundary as opaque bytes.
*/
use crate::error::{IcebergError, Result};
use crate::model::decimal::Decimal;
use crate::model::types::{PrimitiveType, Value};

/// Encode a single value to its binary bound representation.
pub fn encode_bound(value: &Value) -> Result<Vec<u8>> {
    Ok(match value {
        Value::Null => {
            return Err(IcebergError::Validation("cannot encode a null bound".to_string()))
        }
        Value::Boolean(b) => vec![*b as u8],
        Value::Int(i) => i.to_le_bytes().to_vec(),
        Value::Date(d) => d.to_le_bytes().to_vec(),
        Value::Long(l) => l.to_le_bytes().to_vec(),
        Value::Time(t) => t.to_le_bytes().to_vec(),
        Value::Timestamp(us) => us.to_le_bytes().to_vec(),
        Value::Timestamptz(us) => us.to_le_bytes().to_vec(),
        Value::Float(f) => f.to_le_bytes().to_vec(),
        Value::Double(d) => d.to_le_bytes().to_vec(),
        Value::String(s) => s.as_bytes().to_vec(),
        Value::Uuid(u) => u.to_string().into_bytes(),
        Value::Binary(b) => b.clone(),
        Value::Decimal(d) => d.to_be_bytes()?,
    })
}

/// Decode a binary bound back into a typed value, given the primitive type
/// it was encoded against (the width and endianness of a bound are not
/// self-describing; the caller must already know the column's type, the
/// same as reading `lower_bounds`/`upper_bounds` out of a manifest entry).
pub fn decode_bound(bytes: &[u8], ty: &PrimitiveType) -> Result<Value> {
    fn want(bytes: &[u8], n: usize) -> Result<&[u8]> {
        if bytes.len() != n {
            return Err(IcebergError::Validation(format!(
                "expected {n}-byte bound, got {}",
                bytes.len()
            )));
        }
        Ok(bytes)
    }
    Ok(match ty {
        PrimitiveType::Boolean => Value::Boolean(want(bytes, 1)?[0] != 0),
        PrimitiveType::Int => Value::Int(i32::from_le_bytes(want(bytes, 4)?.try_into().unwrap())),
        PrimitiveType::Date => Value::Date(i32::from_le_bytes(want(bytes, 4)?.try_into().unwrap())),
        PrimitiveType::Long => Value::Long(i64::from_le_bytes(want(bytes, 8)?.try_into().unwrap())),
        PrimitiveType::Time => Value::Time(i64::from_le_bytes(want(bytes, 8)?.try_into().unwrap())),
        PrimitiveType::Timestamp | PrimitiveType::TimestampNs => {
            Value::Timestamp(i64::from_le_bytes(want(bytes, 8)?.try_into().unwrap()))
        }
        PrimitiveType::Timestamptz | PrimitiveType::TimestamptzNs => {
            Value::Timestamptz(i64::from_le_bytes(want(bytes, 8)?.try_into().unwrap()))
        }
        PrimitiveType::Float => Value::Float(f32::from_le_bytes(want(bytes, 4)?.try_into().unwrap())),
        PrimitiveType::Double => Value::Double(f64::from_le_bytes(want(bytes, 8)?.try_into().unwrap())),
        PrimitiveType::String => {
            Value::String(String::from_utf8(bytes.to_vec()).map_err(|e| IcebergError::Validation(e.to_string()))?)
        }
        PrimitiveType::Uuid => {
            let s = std::str::from_utf8(bytes).map_err(|e| IcebergError::Validation(e.to_string()))?;
            Value::Uuid(s.parse().map_err(|e: uuid::Error| IcebergError::Validation(e.to_string()))?)
        }
        PrimitiveType::Binary | PrimitiveType::Fixed(_) => Value::Binary(bytes.to_vec()),
        PrimitiveType::Decimal { precision, scale } => {
            Value::Decimal(Decimal::from_be_bytes(bytes, *precision, *scale)?)
        }
        other => {
            return Err(IcebergError::Validation(format!(
                "{other} has no binary bound encoding"
            )))
        }
    })
}
