/*!
Sort orders: the same transform machinery as partition specs, applied to
produce a row ordering rather than a partition value (spec.md §4.3).
*/
use serde::{Deserialize, Serialize};

use super::schema::Schema;
use super::types::Type;
use crate::error::{IcebergError, Result};
use crate::transform::Transform;

/// Ascending or descending row order for one sort field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortDirection {
    /// Low to high.
    Asc,
    /// High to low.
    Desc,
}

/// Where nulls sort relative to non-null values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NullOrder {
    /// Nulls sort before all non-null values.
    NullsFirst,
    /// Nulls sort after all non-null values.
    NullsLast,
}

/// One column (or transformed column) in a [`SortOrder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    /// Field id of the source column in the table's schema.
    #[serde(rename = "source-id")]
    pub source_id: i32,
    /// Transform applied to the source value before comparison.
    pub transform: Transform,
    /// Ascending or descending.
    pub direction: SortDirection,
    /// Null placement.
    #[serde(rename = "null-order")]
    pub null_order: NullOrder,
}

/// An ordered list of [`SortField`]s describing how rows within a table (or
/// a single data file) are physically ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortOrder {
    /// Unique id of this sort order within the table's sort-order history.
    /// `0` is reserved for the unsorted order.
    #[serde(rename = "order-id")]
    pub order_id: i32,
    /// Sort fields, in comparison priority order (first field is the
    /// primary sort key).
    pub fields: Vec<SortField>,
}

impl SortOrder {
    /// The unsorted order: id 0, no fields.
    pub fn unsorted() -> Self {
        SortOrder {
            order_id: 0,
            fields: Vec::new(),
        }
    }

    /// `true` if this is the reserved unsorted order (id 0 with no fields).
    pub fn is_unsorted(&self) -> bool {
        self.order_id == 0 && self.fields.is_empty()
    }

    /// Validate that every source id exists in `schema` and every transform
    /// is defined over its source type.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        if self.order_id == 0 && !self.fields.is_empty() {
            return Err(IcebergError::Metadata(
                "sort order id 0 is reserved for the unsorted order".to_string(),
            ));
        }
        for field in &self.fields {
            let source = schema
                .field_by_id(field.source_id)
                .ok_or_else(|| IcebergError::Metadata(format!("sort source id {} not found", field.source_id)))?;
            let Type::Primitive(ref prim) = source.field_type else {
                return Err(IcebergError::Metadata(format!(
                    "sort source '{}' must be a primitive type",
                    source.name
                )));
            };
            field.transform.result_type(prim)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schema::Schema;
    use crate::model::types::{NestedField, PrimitiveType, StructType};

    fn test_schema() -> Schema {
        Schema::new(
            0,
            StructType::new(vec![NestedField {
                id: 1,
                name: "ts".to_string(),
                required: true,
                field_type: Type::Primitive(PrimitiveType::Timestamp),
                doc: None,
                initial_default: None,
                write_default: None,
            }]),
        )
    }

    #[test]
    fn test_unsorted_default() {
        let s = SortOrder::unsorted();
        assert!(s.is_unsorted());
        assert!(s.validate(&test_schema()).is_ok());
    }

    #[test]
    fn test_nonzero_id_with_fields_is_valid() {
        let order = SortOrder {
            order_id: 1,
            fields: vec![SortField {
                source_id: 1,
                transform: Transform::Day,
                direction: SortDirection::Asc,
                null_order: NullOrder::NullsFirst,
            }],
        };
        assert!(order.validate(&test_schema()).is_ok());
    }

    #[test]
    fn test_zero_id_with_fields_is_invalid() {
        let order = SortOrder {
            order_id: 0,
            fields: vec![SortField {
                source_id: 1,
                transform: Transform::Identity,
                direction: SortDirection::Asc,
                null_order: NullOrder::NullsFirst,
            }],
        };
        assert!(order.validate(&test_schema()).is_err());
    }
}
