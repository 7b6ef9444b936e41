/*!
Partition specs: named, ordered sets of [`PartitionField`]s that each apply
a [`crate::transform::Transform`] to one source field (spec.md §4.3).
*/
use serde::{Deserialize, Serialize};

use super::schema::Schema;
use super::types::{PrimitiveType, Type};
use crate::error::{IcebergError, Result};
use crate::transform::Transform;

/// One partition column: a transform applied to a source field, producing
/// a value identified by its own partition field id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionField {
    /// Field id of the source column in the table's schema.
    #[serde(rename = "source-id")]
    pub source_id: i32,
    /// Field id of this partition field, distinct from and never reused by
    /// `source-id` allocation; assigned starting at 1000 (spec.md §4.3).
    #[serde(rename = "field-id")]
    pub field_id: i32,
    /// The partition column's name, as it appears in partition paths and
    /// the `partition` struct of manifest entries.
    pub name: String,
    /// The transform applied to the source value.
    pub transform: Transform,
}

/// Partition field ids start here and count up, clear of schema field ids
/// (spec.md §4.3).
pub const PARTITION_FIELD_ID_START: i32 = 1000;

/// A named, versioned partition spec: an ordered list of partition fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSpec {
    /// Unique id of this spec within the table's partition-spec history.
    #[serde(rename = "spec-id")]
    pub spec_id: i32,
    /// Partition fields, in declared order; order is part of a spec's
    /// identity and determines the partition tuple's field order.
    pub fields: Vec<PartitionField>,
}

impl PartitionSpec {
    /// The unpartitioned spec: id 0, no fields.
    pub fn unpartitioned() -> Self {
        PartitionSpec {
            spec_id: 0,
            fields: Vec::new(),
        }
    }

    /// Validate that every source id exists in `schema`, and that `void`
    /// transforms aside, every transform is defined over its source field's
    /// type.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        for field in &self.fields {
            let source = schema
                .field_by_id(field.source_id)
                .ok_or_else(|| IcebergError::Metadata(format!("partition source id {} not found", field.source_id)))?;
            let Type::Primitive(ref prim) = source.field_type else {
                return Err(IcebergError::Metadata(format!(
                    "partition source '{}' must be a primitive type",
                    source.name
                )));
            };
            field.transform.result_type(prim)?;
        }
        Ok(())
    }

    /// The next available partition field id, for adding a field to this
    /// spec (or building a new spec derived from it) without colliding with
    /// ids already in use.
    pub fn next_field_id(&self) -> i32 {
        self.fields
            .iter()
            .map(|f| f.field_id)
            .max()
            .map(|m| m + 1)
            .unwrap_or(PARTITION_FIELD_ID_START)
    }

    /// The result type of each partition field, in order, given the schema
    /// the source ids resolve against.
    pub fn partition_type(&self, schema: &Schema) -> Result<Vec<PrimitiveType>> {
        self.fields
            .iter()
            .map(|field| {
                let source = schema
                    .field_by_id(field.source_id)
                    .ok_or_else(|| IcebergError::Metadata(format!("partition source id {} not found", field.source_id)))?;
                let Type::Primitive(ref prim) = source.field_type else {
                    return Err(IcebergError::Metadata("partition source must be primitive".to_string()));
                };
                field.transform.result_type(prim)
            })
            .collect()
    }

    /// Whether this spec contains no fields (the identity "unpartitioned"
    /// case), ignoring any all-`void` fields kept purely for partition-spec
    /// evolution history.
    pub fn is_unpartitioned(&self) -> bool {
        self.fields.iter().all(|f| f.transform == Transform::Void)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schema::Schema;
    use crate::model::types::{NestedField, StructType};

    fn test_schema() -> Schema {
        Schema::new(
            0,
            StructType::new(vec![NestedField {
                id: 1,
                name: "id".to_string(),
                required: true,
                field_type: Type::Primitive(PrimitiveType::Long),
                doc: None,
                initial_default: None,
                write_default: None,
            }]),
        )
    }

    #[test]
    fn test_unpartitioned_is_empty() {
        let spec = PartitionSpec::unpartitioned();
        assert!(spec.fields.is_empty());
        assert!(spec.is_unpartitioned());
    }

    #[test]
    fn test_validate_accepts_bucket_over_long() {
        let spec = PartitionSpec {
            spec_id: 1,
            fields: vec![PartitionField {
                source_id: 1,
                field_id: 1000,
                name: "id_bucket".to_string(),
                transform: Transform::Bucket(16),
            }],
        };
        assert!(spec.validate(&test_schema()).is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_source() {
        let spec = PartitionSpec {
            spec_id: 1,
            fields: vec![PartitionField {
                source_id: 99,
                field_id: 1000,
                name: "x".to_string(),
                transform: Transform::Identity,
            }],
        };
        assert!(spec.validate(&test_schema()).is_err());
    }

    #[test]
    fn test_next_field_id_starts_at_1000() {
        let spec = PartitionSpec::unpartitioned();
        assert_eq!(spec.next_field_id(), PARTITION_FIELD_ID_START);
    }
}
