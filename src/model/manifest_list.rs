/*!
Manifest lists: the Avro file that indexes a snapshot's manifests
(spec.md §4.4). The Avro schema is declared as a parsed-once constant JSON
document, the same pattern used for the manifest schema in
[`super::manifest`].
*/
use std::io::Cursor;

use apache_avro::{types::Value as AvroValue, Reader, Schema as AvroSchema, Writer};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::error::{IcebergError, Result};

/// Whether a manifest's entries add data files or delete files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum ManifestContent {
    /// Entries add or reference data files.
    Data = 0,
    /// Entries add or reference position/equality delete files or
    /// deletion vectors.
    Deletes = 1,
}

/// Per-partition-field min/max/null/nan summary over a manifest's entries,
/// used to prune whole manifests during planning without opening them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    /// Whether any entry's partition value is null in this field.
    pub contains_null: bool,
    /// Whether any entry's partition value is NaN in this field (floating
    /// point fields only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contains_nan: Option<bool>,
    /// Binary-encoded lower bound across all entries, per
    /// [`crate::stats::encode`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<ByteBuf>,
    /// Binary-encoded upper bound across all entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<ByteBuf>,
}

/// One row of a manifest-list file: metadata about a single manifest,
/// without needing to open it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Location of the manifest file.
    pub manifest_path: String,
    /// Length, in bytes, of the manifest file.
    pub manifest_length: i64,
    /// Id of the partition spec used to write this manifest.
    pub partition_spec_id: i32,
    /// Data or deletes.
    pub content: ManifestContent,
    /// Sequence number of the snapshot that added this manifest.
    pub sequence_number: i64,
    /// Lowest data/delete sequence number of any entry in this manifest.
    pub min_sequence_number: i64,
    /// Id of the snapshot that added this manifest.
    pub added_snapshot_id: i64,
    /// Count of entries with status `ADDED`.
    pub added_files_count: i32,
    /// Count of entries with status `EXISTING`.
    pub existing_files_count: i32,
    /// Count of entries with status `DELETED`.
    pub deleted_files_count: i32,
    /// Total row count of `ADDED` entries.
    pub added_rows_count: i64,
    /// Total row count of `EXISTING` entries.
    pub existing_rows_count: i64,
    /// Total row count of `DELETED` entries.
    pub deleted_rows_count: i64,
    /// Per-partition-field summary across this manifest's entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partitions: Option<Vec<FieldSummary>>,
    /// Implementation-specific key used to decrypt this manifest's
    /// contents, if table encryption is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_metadata: Option<ByteBuf>,
}

const MANIFEST_LIST_V2_SCHEMA_JSON: &str = r#"{
  "type": "record",
  "name": "manifest_file",
  "fields": [
    {"name": "manifest_path", "type": "string", "field-id": 500},
    {"name": "manifest_length", "type": "long", "field-id": 501},
    {"name": "partition_spec_id", "type": "int", "field-id": 502},
    {"name": "content", "type": "int", "field-id": 517},
    {"name": "sequence_number", "type": "long", "field-id": 515},
    {"name": "min_sequence_number", "type": "long", "field-id": 516},
    {"name": "added_snapshot_id", "type": "long", "field-id": 503},
    {"name": "added_files_count", "type": "int", "field-id": 504},
    {"name": "existing_files_count", "type": "int", "field-id": 505},
    {"name": "deleted_files_count", "type": "int", "field-id": 506},
    {"name": "added_rows_count", "type": "long", "field-id": 512},
    {"name": "existing_rows_count", "type": "long", "field-id": 513},
    {"name": "deleted_rows_count", "type": "long", "field-id": 514},
    {"name": "partitions", "type": ["null", {"type": "array", "items": {
        "type": "record", "name": "r508",
        "fields": [
          {"name": "contains_null", "type": "boolean", "field-id": 509},
          {"name": "contains_nan", "type": ["null", "boolean"], "field-id": 518, "default": null},
          {"name": "lower_bound", "type": ["null", "bytes"], "field-id": 510, "default": null},
          {"name": "upper_bound", "type": ["null", "bytes"], "field-id": 511, "default": null}
        ]
      }, "element-id": 508}], "field-id": 507, "default": null},
    {"name": "key_metadata", "type": ["null", "bytes"], "field-id": 519, "default": null}
  ]
}"#;

lazy_static! {
    static ref MANIFEST_LIST_V2_SCHEMA: AvroSchema =
        AvroSchema::parse_str(MANIFEST_LIST_V2_SCHEMA_JSON).expect("manifest list v2 schema is valid Avro");
}

/// The manifest-list Avro schema used by v2 and v3 tables (v3 reuses the v2
/// shape; it adds no manifest-list-level fields).
pub fn avro_schema() -> &'static AvroSchema {
    &MANIFEST_LIST_V2_SCHEMA
}

/// Write a slice of manifest-file entries to Avro bytes.
pub fn write_manifest_list(entries: &[ManifestFile]) -> Result<Vec<u8>> {
    let mut writer = Writer::new(avro_schema(), Vec::new());
    for entry in entries {
        let value = serde_json::to_value(entry).map_err(|e| IcebergError::Validation(e.to_string()))?;
        let avro_value = AvroValue::from(value.clone())
            .resolve(avro_schema())
            .map_err(|e| IcebergError::Validation(format!("manifest list entry does not match schema: {e}")))?;
        writer
            .append(avro_value)
            .map_err(|e| IcebergError::Validation(e.to_string()))?;
    }
    writer.into_inner().map_err(|e| IcebergError::Validation(e.to_string()))
}

/// Read all manifest-file entries out of a manifest-list Avro file's bytes.
pub fn read_manifest_list(data: &[u8]) -> Result<Vec<ManifestFile>> {
    let reader = Reader::new(Cursor::new(data)).map_err(|e| IcebergError::Validation(e.to_string()))?;
    reader
        .map(|record| {
            let record = record.map_err(|e| IcebergError::Validation(e.to_string()))?;
            let json = record
                .try_into()
                .map_err(|e: apache_avro::Error| IcebergError::Validation(e.to_string()))?;
            serde_json::from_value(json).map_err(|e| IcebergError::Validation(e.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> ManifestFile {
        ManifestFile {
            manifest_path: "s3://bucket/m1.avro".to_string(),
            manifest_length: 100,
            partition_spec_id: 0,
            content: ManifestContent::Data,
            sequence_number: 1,
            min_sequence_number: 1,
            added_snapshot_id: 1,
            added_files_count: 1,
            existing_files_count: 0,
            deleted_files_count: 0,
            added_rows_count: 10,
            existing_rows_count: 0,
            deleted_rows_count: 0,
            partitions: None,
            key_metadata: None,
        }
    }

    #[test]
    fn test_schema_parses() {
        let _ = avro_schema();
    }

    #[test]
    fn test_write_read_roundtrip() {
        let entries = vec![sample_entry()];
        let bytes = write_manifest_list(&entries).unwrap();
        let back = read_manifest_list(&bytes).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].manifest_path, entries[0].manifest_path);
        assert_eq!(back[0].content, ManifestContent::Data);
    }

    #[test]
    fn test_with_partition_summary() {
        let mut entry = sample_entry();
        entry.partitions = Some(vec![FieldSummary {
            contains_null: false,
            contains_nan: Some(false),
            lower_bound: Some(ByteBuf::from(vec![1, 2, 3])),
            upper_bound: Some(ByteBuf::from(vec![4, 5, 6])),
        }]);
        let bytes = write_manifest_list(&[entry.clone()]).unwrap();
        let back = read_manifest_list(&bytes).unwrap();
        assert_eq!(back[0].partitions, entry.partitions);
    }
}
