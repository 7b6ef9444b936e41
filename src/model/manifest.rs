/*!
Manifests: the Avro file listing the data and delete files added, existing
in, or removed from a table as of one snapshot (spec.md §4.4, §4.7).
*/
use std::collections::HashMap;
use std::io::Cursor;

use apache_avro::{types::Value as AvroValue, Reader, Schema as AvroSchema, Writer};
use lazy_static::lazy_static;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use serde_bytes::ByteBuf;
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::error::{IcebergError, Result};

/// Avro has no native map type keyed by anything but a string, so Iceberg's
/// int-keyed per-column stats maps (`column_sizes`, `value_counts`, ...)
/// are written as `array<record{key, value}>` instead. `IntMap` is a thin
/// `Vec<(i32, V)>` wrapper whose `Serialize`/`Deserialize` impls produce and
/// consume exactly that array-of-records shape.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IntMap<V>(Vec<(i32, V)>);

impl<V> IntMap<V> {
    /// An empty map.
    pub fn new() -> Self {
        IntMap(Vec::new())
    }

    /// Look up a value by field id.
    pub fn get(&self, key: i32) -> Option<&V> {
        self.0.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Insert or append a `(field id, value)` pair.
    pub fn insert(&mut self, key: i32, value: V) {
        self.0.push((key, value));
    }

    /// Iterate over `(field id, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(i32, V)> {
        self.0.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if this map has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V> FromIterator<(i32, V)> for IntMap<V> {
    fn from_iter<I: IntoIterator<Item = (i32, V)>>(iter: I) -> Self {
        IntMap(iter.into_iter().collect())
    }
}

#[derive(Serialize, Deserialize)]
struct IntMapEntry<V> {
    key: i32,
    value: V,
}

impl<V: Serialize> Serialize for IntMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let entries: Vec<IntMapEntry<&V>> = self.0.iter().map(|(key, value)| IntMapEntry { key: *key, value }).collect();
        entries.serialize(serializer)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for IntMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let entries: Vec<IntMapEntry<V>> = Vec::deserialize(deserializer).map_err(D::Error::custom)?;
        Ok(IntMap(entries.into_iter().map(|e| (e.key, e.value)).collect()))
    }
}

/// Reserved schema id used for the synthetic schema of position-delete
/// files (spec.md §4.7): `{file_path: string, pos: long}`.
pub const POSITION_DELETE_SCHEMA_ID: i32 = -1;
/// Reserved schema id used for the synthetic schema of equality-delete
/// files, which is a projection of the data schema onto `equality-ids`.
pub const EQUALITY_DELETE_SCHEMA_ID: i32 = -2;
/// Reserved field id of `file_path` within a position-delete file's rows.
pub const POSITION_DELETE_FILE_PATH_FIELD_ID: i32 = 2147483546;
/// Reserved field id of `pos` within a position-delete file's rows.
pub const POSITION_DELETE_POS_FIELD_ID: i32 = 2147483545;

/// Lifecycle state of a manifest entry relative to the snapshot that wrote
/// the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum Status {
    /// Unchanged from an earlier manifest being rewritten.
    Existing = 0,
    /// Added in the snapshot that wrote this manifest.
    Added = 1,
    /// Removed ("soft deleted") in the snapshot that wrote this manifest.
    Deleted = 2,
}

/// Whether a manifest's entries describe data files or delete files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum Content {
    /// Entries reference data files.
    Data = 0,
    /// Entries reference position-delete files or v3 deletion vectors.
    PositionDeletes = 1,
    /// Entries reference equality-delete files.
    EqualityDeletes = 2,
}

/// On-disk encoding of a data or delete file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileFormat {
    /// Apache Avro.
    Avro,
    /// Apache ORC.
    Orc,
    /// Apache Parquet.
    Parquet,
    /// A Puffin file, used to store v3 deletion vectors and statistics
    /// blobs (spec.md §4.7).
    Puffin,
}

/// A single data or delete file, as described by one manifest entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    /// Data, position deletes, or equality deletes.
    pub content: Content,
    /// Fully qualified location of the file.
    pub file_path: String,
    /// On-disk format of the file.
    pub file_format: FileFormat,
    /// Partition value tuple, encoded as an Avro record whose fields match
    /// the manifest's partition-spec-derived partition type; represented
    /// here as a JSON object of field name to JSON-encoded value for
    /// engine neutrality.
    pub partition: HashMap<String, serde_json::Value>,
    /// Number of rows in the file.
    pub record_count: i64,
    /// Total file size in bytes.
    pub file_size_in_bytes: i64,
    /// Per-column total size in bytes on disk, keyed by field id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_sizes: Option<IntMap<i64>>,
    /// Per-column value count (including nulls), keyed by field id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_counts: Option<IntMap<i64>>,
    /// Per-column null-value count, keyed by field id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub null_value_counts: Option<IntMap<i64>>,
    /// Per-column NaN-value count (floating-point columns only), keyed by
    /// field id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nan_value_counts: Option<IntMap<i64>>,
    /// Per-column binary-encoded lower bound, keyed by field id (spec.md
    /// §4.5).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower_bounds: Option<IntMap<ByteBuf>>,
    /// Per-column binary-encoded upper bound, keyed by field id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper_bounds: Option<IntMap<ByteBuf>>,
    /// Implementation-specific key used to decrypt this file, if table
    /// encryption is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_metadata: Option<ByteBuf>,
    /// Per-split offsets for planning parallel reads within the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_offsets: Option<Vec<i64>>,
    /// Field ids of an equality-delete file's equality columns; `None` for
    /// data files and position-delete files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equality_ids: Option<Vec<i32>>,
    /// Id of the sort order the file's rows are physically sorted by, if
    /// any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order_id: Option<i32>,
    /// First row id assigned to this file's rows (v3 row lineage;
    /// spec.md §3).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_row_id: Option<i64>,
    /// Byte offset of a v3 deletion vector's blob within its Puffin file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_offset: Option<i64>,
    /// Byte length of a v3 deletion vector's blob within its Puffin file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_size_in_bytes: Option<i64>,
    /// For a v3 deletion vector entry, the data file it applies to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_data_file: Option<String>,
}

impl DataFile {
    /// `true` if this entry is a v3 deletion vector (a `PositionDeletes`
    /// entry stored as a Puffin blob rather than a standalone delete file).
    pub fn is_deletion_vector(&self) -> bool {
        self.content == Content::PositionDeletes && self.file_format == FileFormat::Puffin
    }
}

/// One row of a manifest file: a data/delete file plus the bookkeeping
/// Iceberg needs without reading the file itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Existing, added, or deleted.
    pub status: Status,
    /// Id of the snapshot that added this entry's file, or in which the
    /// entry's status last changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<i64>,
    /// Data sequence number of the file, used to order deletes against the
    /// data they apply to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<i64>,
    /// Sequence number of the file for the purpose of file-level delete
    /// application ordering; equal to `sequence_number` unless inherited
    /// from an `EXISTING` entry carried forward from an earlier manifest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_sequence_number: Option<i64>,
    /// The file this entry describes.
    pub data_file: DataFile,
}

/// Manifest-level metadata, stored in the Avro file's key-value metadata
/// rather than as a record field.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestMetadata {
    /// JSON-encoded [`crate::model::schema::Schema`] used to write this
    /// manifest's entries.
    pub schema: String,
    /// Id of that schema.
    pub schema_id: i32,
    /// JSON-encoded [`crate::model::partition::PartitionSpec`] used to
    /// write this manifest's entries.
    pub partition_spec: String,
    /// Id of that partition spec.
    pub partition_spec_id: i32,
    /// Data, position deletes, or equality deletes.
    pub content: Content,
    /// `1` or `2`, matching the table's format version at write time.
    pub format_version: u8,
}

const MANIFEST_ENTRY_SCHEMA_JSON: &str = r#"{
  "type": "record",
  "name": "manifest_entry",
  "fields": [
    {"name": "status", "type": "int", "field-id": 0},
    {"name": "snapshot_id", "type": ["null", "long"], "field-id": 1, "default": null},
    {"name": "sequence_number", "type": ["null", "long"], "field-id": 3, "default": null},
    {"name": "file_sequence_number", "type": ["null", "long"], "field-id": 4, "default": null},
    {"name": "data_file", "type": {
      "type": "record", "name": "r2",
      "fields": [
        {"name": "content", "type": "int", "field-id": 134},
        {"name": "file_path", "type": "string", "field-id": 100},
        {"name": "file_format", "type": "string", "field-id": 101},
        {"name": "partition", "type": {"type": "record", "name": "r102", "fields": []}, "field-id": 102},
        {"name": "record_count", "type": "long", "field-id": 103},
        {"name": "file_size_in_bytes", "type": "long", "field-id": 104},
        {"name": "column_sizes", "type": ["null", {"type": "array", "items": {
            "type": "record", "name": "k117_v118",
            "fields": [{"name": "key", "type": "int", "field-id": 117}, {"name": "value", "type": "long", "field-id": 118}]
          }, "logicalType": "map"}], "field-id": 108, "default": null},
        {"name": "value_counts", "type": ["null", {"type": "array", "items": {
            "type": "record", "name": "k119_v120",
            "fields": [{"name": "key", "type": "int", "field-id": 119}, {"name": "value", "type": "long", "field-id": 120}]
          }, "logicalType": "map"}], "field-id": 109, "default": null},
        {"name": "null_value_counts", "type": ["null", {"type": "array", "items": {
            "type": "record", "name": "k121_v122",
            "fields": [{"name": "key", "type": "int", "field-id": 121}, {"name": "value", "type": "long", "field-id": 122}]
          }, "logicalType": "map"}], "field-id": 110, "default": null},
        {"name": "lower_bounds", "type": ["null", {"type": "array", "items": {
            "type": "record", "name": "k126_v127",
            "fields": [{"name": "key", "type": "int", "field-id": 126}, {"name": "value", "type": "bytes", "field-id": 127}]
          }, "logicalType": "map"}], "field-id": 125, "default": null},
        {"name": "upper_bounds", "type": ["null", {"type": "array", "items": {
            "type": "record", "name": "k129_v130",
            "fields": [{"name": "key", "type": "int", "field-id": 129}, {"name": "value", "type": "bytes", "field-id": 130}]
          }, "logicalType": "map"}], "field-id": 128, "default": null},
        {"name": "key_metadata", "type": ["null", "bytes"], "field-id": 131, "default": null},
        {"name": "split_offsets", "type": ["null", {"type": "array", "items": "long", "element-id": 133}], "field-id": 132, "default": null},
        {"name": "equality_ids", "type": ["null", {"type": "array", "items": "int", "element-id": 136}], "field-id": 135, "default": null},
        {"name": "sort_order_id", "type": ["null", "int"], "field-id": 140, "default": null}
      ]
    }, "field-id": 2}
  ]
}"#;

lazy_static! {
    static ref MANIFEST_ENTRY_SCHEMA: AvroSchema =
        AvroSchema::parse_str(MANIFEST_ENTRY_SCHEMA_JSON).expect("manifest entry schema is valid Avro");
}

/// The manifest-entry Avro schema (spec.md §4.4 / §4.7 delete-file fields
/// folded into the single `data_file` record, matching the table format
/// spec's unification of data and delete file manifests).
pub fn avro_schema() -> &'static AvroSchema {
    &MANIFEST_ENTRY_SCHEMA
}

/// Write manifest entries as Avro bytes, with the required manifest-level
/// key-value metadata embedded in the file header.
pub fn write_manifest(entries: &[ManifestEntry], metadata: &ManifestMetadata) -> Result<Vec<u8>> {
    let mut writer = Writer::new(avro_schema(), Vec::new());
    writer
        .add_user_metadata("schema".to_string(), metadata.schema.clone())
        .map_err(|e| IcebergError::Validation(e.to_string()))?;
    writer
        .add_user_metadata("schema-id".to_string(), metadata.schema_id.to_string())
        .map_err(|e| IcebergError::Validation(e.to_string()))?;
    writer
        .add_user_metadata("partition-spec".to_string(), metadata.partition_spec.clone())
        .map_err(|e| IcebergError::Validation(e.to_string()))?;
    writer
        .add_user_metadata("partition-spec-id".to_string(), metadata.partition_spec_id.to_string())
        .map_err(|e| IcebergError::Validation(e.to_string()))?;
    writer
        .add_user_metadata("content".to_string(), (metadata.content as i32).to_string())
        .map_err(|e| IcebergError::Validation(e.to_string()))?;
    writer
        .add_user_metadata("format-version".to_string(), metadata.format_version.to_string())
        .map_err(|e| IcebergError::Validation(e.to_string()))?;

    for entry in entries {
        let value = serde_json::to_value(entry).map_err(|e| IcebergError::Validation(e.to_string()))?;
        let avro_value = AvroValue::from(value)
            .resolve(avro_schema())
            .map_err(|e| IcebergError::Validation(format!("manifest entry does not match schema: {e}")))?;
        writer
            .append(avro_value)
            .map_err(|e| IcebergError::Validation(e.to_string()))?;
    }
    writer.into_inner().map_err(|e| IcebergError::Validation(e.to_string()))
}

/// Read all manifest entries out of a manifest file's Avro bytes, ignoring
/// the file's embedded metadata (use [`read_manifest_metadata`] for that).
pub fn read_manifest(data: &[u8]) -> Result<Vec<ManifestEntry>> {
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

/// Read just the manifest-level key-value metadata out of a manifest
/// file's Avro header, without decoding any entries.
pub fn read_manifest_metadata(data: &[u8]) -> Result<ManifestMetadata> {
    let reader = Reader::new(Cursor::new(data)).map_err(|e| IcebergError::Validation(e.to_string()))?;
    let get = |key: &str| -> Result<String> {
        reader
            .user_metadata()
            .get(key)
            .map(|v| String::from_utf8_lossy(v).to_string())
            .ok_or_else(|| IcebergError::Validation(format!("manifest is missing '{key}' metadata")))
    };
    let content = match get("content")?.as_str() {
        "0" => Content::Data,
        "1" => Content::PositionDeletes,
        "2" => Content::EqualityDeletes,
        other => return Err(IcebergError::Validation(format!("unknown manifest content {other}"))),
    };
    Ok(ManifestMetadata {
        schema: get("schema")?,
        schema_id: get("schema-id")?.parse().unwrap_or(0),
        partition_spec: get("partition-spec")?,
        partition_spec_id: get("partition-spec-id")?.parse().unwrap_or(0),
        content,
        format_version: get("format-version")?.parse().unwrap_or(2),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(status: Status) -> ManifestEntry {
        ManifestEntry {
            status,
            snapshot_id: Some(1),
            sequence_number: Some(1),
            file_sequence_number: Some(1),
            data_file: DataFile {
                content: Content::Data,
                file_path: "s3://bucket/data/f1.parquet".to_string(),
                file_format: FileFormat::Parquet,
                partition: HashMap::new(),
                record_count: 10,
                file_size_in_bytes: 1024,
                column_sizes: None,
                value_counts: None,
                null_value_counts: None,
                nan_value_counts: None,
                lower_bounds: None,
                upper_bounds: None,
                key_metadata: None,
                split_offsets: None,
                equality_ids: None,
                sort_order_id: None,
                first_row_id: None,
                content_offset: None,
                content_size_in_bytes: None,
                referenced_data_file: None,
            },
        }
    }

    fn sample_metadata() -> ManifestMetadata {
        ManifestMetadata {
            schema: "{}".to_string(),
            schema_id: 0,
            partition_spec: "[]".to_string(),
            partition_spec_id: 0,
            content: Content::Data,
            format_version: 2,
        }
    }

    #[test]
    fn test_write_read_roundtrip() {
        let entries = vec![sample_entry(Status::Added)];
        let bytes = write_manifest(&entries, &sample_metadata()).unwrap();
        let back = read_manifest(&bytes).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].status, Status::Added);
        assert_eq!(back[0].data_file.record_count, 10);
    }

    #[test]
    fn test_read_manifest_metadata() {
        let entries = vec![sample_entry(Status::Existing)];
        let bytes = write_manifest(&entries, &sample_metadata()).unwrap();
        let md = read_manifest_metadata(&bytes).unwrap();
        assert_eq!(md.schema_id, 0);
        assert_eq!(md.content, Content::Data);
        assert_eq!(md.format_version, 2);
    }

    #[test]
    fn test_is_deletion_vector() {
        let mut entry = sample_entry(Status::Added);
        entry.data_file.content = Content::PositionDeletes;
        entry.data_file.file_format = FileFormat::Puffin;
        assert!(entry.data_file.is_deletion_vector());
    }

    #[test]
    fn test_bounds_roundtrip() {
        let mut entry = sample_entry(Status::Added);
        let mut lower = IntMap::new();
        lower.insert(1, ByteBuf::from(vec![0u8, 0, 0, 1]));
        entry.data_file.lower_bounds = Some(lower);
        let bytes = write_manifest(&[entry.clone()], &sample_metadata()).unwrap();
        let back = read_manifest(&bytes).unwrap();
        assert_eq!(back[0].data_file.lower_bounds, entry.data_file.lower_bounds);
    }
}
