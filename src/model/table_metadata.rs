/*!
`table-metadata.json`: the single document that is the table (spec.md §3).
Dispatch on `format-version` follows the teacher's
`Metadata`/`MetadataV2`/`MetadataV1` pattern: a hand-written [`serde::Deserialize`]
peeks at `format-version` and either deserializes directly (v2/v3) or
deserializes the legacy v1 shape and upgrades it.
*/
use std::collections::HashMap;

use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::partition::PartitionSpec;
use super::schema::Schema;
use super::snapshot::{Reference, Snapshot, SnapshotLogEntry};
use super::sort::SortOrder;
use crate::error::{IcebergError, Result};

/// One row of `metadata-log`: records that `metadata-file` was the current
/// metadata file as of `timestamp-ms`. Bounded by
/// [`crate::config::MetadataRetention::previous_versions_max`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataLogEntry {
    /// Milliseconds since epoch, UTC.
    #[serde(rename = "timestamp-ms")]
    pub timestamp_ms: i64,
    /// Location of the metadata file that was current at this time.
    #[serde(rename = "metadata-file")]
    pub metadata_file: String,
}

/// The current, in-memory view of a table's metadata document (v2 and v3;
/// v1 documents are upgraded into this shape on load, see
/// [`TableMetadata::from_json`]).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableMetadata {
    /// `2` or `3`. Immutable for the life of a table: a table is never
    /// migrated between format versions in place.
    #[serde(rename = "format-version")]
    pub format_version: u8,
    /// Stable identity of the table, assigned at creation and never reused.
    #[serde(rename = "table-uuid")]
    pub table_uuid: Uuid,
    /// Table's base location; all relative paths in manifests resolve
    /// against this.
    pub location: String,
    /// Sequence number of the last commit; monotonically increasing.
    #[serde(rename = "last-sequence-number")]
    pub last_sequence_number: i64,
    /// Milliseconds since epoch, UTC, of the last metadata update.
    #[serde(rename = "last-updated-ms")]
    pub last_updated_ms: i64,
    /// Highest field id ever assigned to a schema field.
    #[serde(rename = "last-column-id")]
    pub last_column_id: i32,
    /// All schemas in this table's history.
    pub schemas: Vec<Schema>,
    /// Id of the schema currently in effect.
    #[serde(rename = "current-schema-id")]
    pub current_schema_id: i32,
    /// All partition specs in this table's history.
    #[serde(rename = "partition-specs")]
    pub partition_specs: Vec<PartitionSpec>,
    /// Id of the partition spec currently in effect.
    #[serde(rename = "default-spec-id")]
    pub default_spec_id: i32,
    /// Highest partition field id ever assigned.
    #[serde(rename = "last-partition-id")]
    pub last_partition_id: i32,
    /// Arbitrary table properties (spec.md §6); keys not recognized by this
    /// crate are preserved verbatim.
    #[serde(default)]
    pub properties: HashMap<String, String>,
    /// Id of the table's current snapshot, or `None` for a table with no
    /// committed data.
    #[serde(skip_serializing_if = "Option::is_none", rename = "current-snapshot-id")]
    pub current_snapshot_id: Option<i64>,
    /// Every snapshot still referenced by `metadata-log` retention or a
    /// ref; expired snapshots are removed from this list entirely.
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,
    /// Append-only record of `current-snapshot-id` transitions.
    #[serde(default, rename = "snapshot-log")]
    pub snapshot_log: Vec<SnapshotLogEntry>,
    /// Append-only record of metadata file transitions.
    #[serde(default, rename = "metadata-log")]
    pub metadata_log: Vec<MetadataLogEntry>,
    /// All sort orders in this table's history.
    #[serde(default, rename = "sort-orders")]
    pub sort_orders: Vec<SortOrder>,
    /// Id of the sort order currently in effect.
    #[serde(rename = "default-sort-order-id")]
    pub default_sort_order_id: i32,
    /// Named refs (branches and tags), including `main` once a snapshot has
    /// been committed.
    #[serde(default)]
    pub refs: HashMap<String, Reference>,
    /// Table row-id counter (v3 only; spec.md §3).
    #[serde(skip_serializing_if = "Option::is_none", rename = "next-row-id")]
    pub next_row_id: Option<i64>,
}

impl TableMetadata {
    /// Build the seed document for a brand-new table (spec.md §4.1
    /// `assert-create`): no schema, partition spec, or sort order yet. The
    /// `add-schema`/`add-partition-spec`/`add-sort-order` updates that are
    /// folded in the same commit populate them before the candidate is
    /// validated; [`TableMetadata::validate`] would reject this value on its
    /// own.
    pub fn new_table(table_uuid: Uuid, location: impl Into<String>, format_version: u8, now_ms: i64) -> Self {
        TableMetadata {
            format_version,
            table_uuid,
            location: location.into(),
            last_sequence_number: 0,
            last_updated_ms: now_ms,
            last_column_id: 0,
            schemas: Vec::new(),
            current_schema_id: -1,
            partition_specs: Vec::new(),
            default_spec_id: -1,
            last_partition_id: super::partition::PARTITION_FIELD_ID_START - 1,
            properties: HashMap::new(),
            current_snapshot_id: None,
            snapshots: Vec::new(),
            snapshot_log: Vec::new(),
            metadata_log: Vec::new(),
            sort_orders: Vec::new(),
            default_sort_order_id: -1,
            refs: HashMap::new(),
            next_row_id: if format_version >= 3 { Some(0) } else { None },
        }
    }

    /// The schema currently in effect.
    pub fn current_schema(&self) -> Result<&Schema> {
        self.schemas
            .iter()
            .find(|s| s.schema_id == self.current_schema_id)
            .ok_or_else(|| IcebergError::Metadata("current-schema-id does not reference a known schema".to_string()))
    }

    /// The partition spec currently in effect.
    pub fn default_spec(&self) -> Result<&PartitionSpec> {
        self.partition_specs
            .iter()
            .find(|s| s.spec_id == self.default_spec_id)
            .ok_or_else(|| IcebergError::Metadata("default-spec-id does not reference a known partition spec".to_string()))
    }

    /// The sort order currently in effect.
    pub fn default_sort_order(&self) -> Result<&SortOrder> {
        self.sort_orders
            .iter()
            .find(|s| s.order_id == self.default_sort_order_id)
            .ok_or_else(|| IcebergError::Metadata("default-sort-order-id does not reference a known sort order".to_string()))
    }

    /// The current snapshot, if the table has one.
    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        self.current_snapshot_id
            .and_then(|id| self.snapshots.iter().find(|s| s.snapshot_id == id))
    }

    /// Structural invariants a valid document must uphold (spec.md §3):
    /// format-version in range, current ids resolve, no duplicate schema
    /// ids, v3-only fields absent from v2 documents, and the high-water-mark
    /// invariants of spec.md §3/§8 property 1 (`last-column-id`,
    /// `last-partition-id`, `last-sequence-number` each dominate every id or
    /// sequence number they track).
    pub fn validate(&self) -> Result<()> {
        if !(2..=3).contains(&self.format_version) {
            return Err(IcebergError::Metadata(format!(
                "unsupported format-version {}",
                self.format_version
            )));
        }
        if self.format_version == 2 && self.next_row_id.is_some() {
            return Err(IcebergError::Metadata(
                "next-row-id is only valid in format-version 3".to_string(),
            ));
        }
        self.current_schema()?;
        self.default_spec()?;
        self.default_sort_order()?;
        for schema in &self.schemas {
            schema.validate()?;
            let highest = schema.highest_field_id();
            if highest > self.last_column_id {
                return Err(IcebergError::Metadata(format!(
                    "last-column-id {} is less than field id {highest} in schema {}",
                    self.last_column_id, schema.schema_id
                )));
            }
        }
        if self.last_partition_id < super::partition::PARTITION_FIELD_ID_START - 1 {
            return Err(IcebergError::Metadata(format!(
                "last-partition-id {} is below the reserved floor of {}",
                self.last_partition_id,
                super::partition::PARTITION_FIELD_ID_START - 1
            )));
        }
        for spec in &self.partition_specs {
            for field in &spec.fields {
                if field.field_id < super::partition::PARTITION_FIELD_ID_START {
                    return Err(IcebergError::Metadata(format!(
                        "partition field id {} in spec {} is below the reserved floor of {}",
                        field.field_id,
                        spec.spec_id,
                        super::partition::PARTITION_FIELD_ID_START
                    )));
                }
                if field.field_id > self.last_partition_id {
                    return Err(IcebergError::Metadata(format!(
                        "last-partition-id {} is less than partition field id {} in spec {}",
                        self.last_partition_id, field.field_id, spec.spec_id
                    )));
                }
            }
        }
        for snapshot in &self.snapshots {
            if snapshot.sequence_number > self.last_sequence_number {
                return Err(IcebergError::Metadata(format!(
                    "last-sequence-number {} is less than snapshot {}'s sequence-number {}",
                    self.last_sequence_number, snapshot.snapshot_id, snapshot.sequence_number
                )));
            }
            if self.format_version >= 3 {
                if let Some(first_row_id) = snapshot.first_row_id {
                    if first_row_id < 0 {
                        return Err(IcebergError::Metadata(format!(
                            "snapshot {}'s first-row-id {first_row_id} is negative",
                            snapshot.snapshot_id
                        )));
                    }
                }
                if let Some(added_rows) = snapshot.added_rows {
                    if added_rows < 0 {
                        return Err(IcebergError::Metadata(format!(
                            "snapshot {}'s added-rows {added_rows} is negative",
                            snapshot.snapshot_id
                        )));
                    }
                }
            }
        }
        if let Some(id) = self.current_snapshot_id {
            if !self.snapshots.iter().any(|s| s.snapshot_id == id) {
                return Err(IcebergError::Metadata(
                    "current-snapshot-id does not reference a known snapshot".to_string(),
                ));
            }
        }
        for (name, r) in &self.refs {
            if !self.snapshots.iter().any(|s| s.snapshot_id == r.snapshot_id()) {
                return Err(IcebergError::Metadata(format!("ref '{name}' points at an unknown snapshot")));
            }
        }
        Ok(())
    }

    /// Parse a `table-metadata.json` document, dispatching on
    /// `format-version` and upgrading a v1 document transparently.
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str::<TableMetadata>(data).map_err(|e| IcebergError::Metadata(e.to_string()))
    }

    /// Serialize to the canonical JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| IcebergError::Metadata(e.to_string()))
    }
}

impl<'de> Deserialize<'de> for TableMetadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let version = value
            .get("format-version")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| D::Error::custom("missing format-version"))?;
        match version {
            1 => {
                let v1: TableMetadataV1 = serde_json::from_value(value).map_err(D::Error::custom)?;
                Ok(v1.upgrade())
            }
            2 | 3 => serde_json::from_value::<TableMetadataV2Or3>(value)
                .map(Into::into)
                .map_err(D::Error::custom),
            other => Err(D::Error::custom(format!("unsupported format-version {other}"))),
        }
    }
}

/// The v2/v3 wire shape, identical to [`TableMetadata`]; kept as a separate
/// type purely so the hand-written top-level [`Deserialize`] impl can parse
/// it without recursing into itself.
#[derive(Debug, Deserialize)]
struct TableMetadataV2Or3 {
    #[serde(rename = "format-version")]
    format_version: u8,
    #[serde(rename = "table-uuid")]
    table_uuid: Uuid,
    location: String,
    #[serde(rename = "last-sequence-number")]
    last_sequence_number: i64,
    #[serde(rename = "last-updated-ms")]
    last_updated_ms: i64,
    #[serde(rename = "last-column-id")]
    last_column_id: i32,
    schemas: Vec<Schema>,
    #[serde(rename = "current-schema-id")]
    current_schema_id: i32,
    #[serde(rename = "partition-specs")]
    partition_specs: Vec<PartitionSpec>,
    #[serde(rename = "default-spec-id")]
    default_spec_id: i32,
    #[serde(rename = "last-partition-id")]
    last_partition_id: i32,
    #[serde(default)]
    properties: HashMap<String, String>,
    #[serde(rename = "current-snapshot-id")]
    current_snapshot_id: Option<i64>,
    #[serde(default)]
    snapshots: Vec<Snapshot>,
    #[serde(default, rename = "snapshot-log")]
    snapshot_log: Vec<SnapshotLogEntry>,
    #[serde(default, rename = "metadata-log")]
    metadata_log: Vec<MetadataLogEntry>,
    #[serde(default, rename = "sort-orders")]
    sort_orders: Vec<SortOrder>,
    #[serde(rename = "default-sort-order-id")]
    default_sort_order_id: i32,
    #[serde(default)]
    refs: HashMap<String, Reference>,
    #[serde(rename = "next-row-id")]
    next_row_id: Option<i64>,
}

impl From<TableMetadataV2Or3> for TableMetadata {
    fn from(v: TableMetadataV2Or3) -> Self {
        TableMetadata {
            format_version: v.format_version,
            table_uuid: v.table_uuid,
            location: v.location,
            last_sequence_number: v.last_sequence_number,
            last_updated_ms: v.last_updated_ms,
            last_column_id: v.last_column_id,
            schemas: v.schemas,
            current_schema_id: v.current_schema_id,
            partition_specs: v.partition_specs,
            default_spec_id: v.default_spec_id,
            last_partition_id: v.last_partition_id,
            properties: v.properties,
            current_snapshot_id: v.current_snapshot_id,
            snapshots: v.snapshots,
            snapshot_log: v.snapshot_log,
            metadata_log: v.metadata_log,
            sort_orders: v.sort_orders,
            default_sort_order_id: v.default_sort_order_id,
            refs: v.refs,
            next_row_id: v.next_row_id,
        }
    }
}

/// The legacy v1 wire shape: no partition/sort-order history, no
/// `last-sequence-number`, partitioning expressed as a bare `partition-spec`
/// field rather than `partition-specs` + `default-spec-id`.
#[derive(Debug, Deserialize)]
struct TableMetadataV1 {
    location: String,
    #[serde(rename = "last-updated-ms")]
    last_updated_ms: i64,
    #[serde(rename = "last-column-id")]
    last_column_id: i32,
    schema: Schema,
    #[serde(default, rename = "partition-spec")]
    partition_spec: Vec<super::partition::PartitionField>,
    #[serde(default, rename = "default-spec-id")]
    default_spec_id: i32,
    #[serde(default, rename = "last-partition-id")]
    last_partition_id: i32,
    #[serde(default)]
    properties: HashMap<String, String>,
    #[serde(rename = "current-snapshot-id")]
    current_snapshot_id: Option<i64>,
    #[serde(default)]
    snapshots: Vec<Snapshot>,
}

impl TableMetadataV1 {
    /// Upgrade a v1 document to the v2 in-memory shape: synthesize a
    /// `table-uuid` if missing is not possible here (the field is actually
    /// required in v1 too), wrap the single schema/spec into history lists,
    /// and set `last-sequence-number` to 0 since v1 has no concept of it.
    fn upgrade(self) -> TableMetadata {
        let partition_specs = vec![PartitionSpec {
            spec_id: self.default_spec_id,
            fields: self.partition_spec,
        }];
        TableMetadata {
            format_version: 2,
            table_uuid: Uuid::new_v4(),
            location: self.location,
            last_sequence_number: 0,
            last_updated_ms: self.last_updated_ms,
            last_column_id: self.last_column_id,
            current_schema_id: self.schema.schema_id,
            schemas: vec![self.schema],
            partition_specs,
            default_spec_id: self.default_spec_id,
            last_partition_id: self.last_partition_id,
            properties: self.properties,
            current_snapshot_id: self.current_snapshot_id,
            snapshots: self.snapshots,
            snapshot_log: Vec::new(),
            metadata_log: Vec::new(),
            sort_orders: vec![SortOrder::unsorted()],
            default_sort_order_id: 0,
            refs: HashMap::new(),
            next_row_id: None,
        }
    }
}
