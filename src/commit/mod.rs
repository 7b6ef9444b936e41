/*!
The atomic commit protocol (spec.md §4.1): requirement/update pairs folded
over a [`TableMetadata`] to produce a new candidate document, with optimistic
concurrency control enforced by [`Requirement::check`] before the fold and
[`TableMetadata::validate`] after it. [`engine`] wires this pure layer up to
a [`engine::StorageBackend`] and a retrying commit loop.

Generalizes the teacher's `transaction::operation::Operation` (a fixed
`UpdateSchema`/`UpdateSpec` enum executed directly against a `&mut Table`)
into the requirement/update model spec.md §4.1 describes: updates are pure
functions over an owned [`TableMetadata`] value, and requirements are
predicates checked against the metadata read at commit time, not against
whatever happens to be in memory.
*/
pub mod engine;

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::error::{IcebergError, Result};
use crate::model::partition::PartitionSpec;
use crate::model::schema::Schema;
use crate::model::snapshot::{Reference, Retention, Snapshot, SnapshotLogEntry, MAIN_BRANCH};
use crate::model::sort::SortOrder;
use crate::model::table_metadata::TableMetadata;

/// Sentinel schema/spec/sort-order id meaning "whichever one an earlier
/// update in this same commit just added" -- the same `-1` convention the
/// real Iceberg REST commit protocol uses for `set-current-schema`,
/// `set-default-spec`, and `set-default-sort-order` immediately following an
/// `add-*` update in the same request.
pub const LAST_ADDED: i32 = -1;

/// A predicate on the currently-read metadata, checked before a commit's
/// updates are folded (spec.md §4.1). Each variant fails the commit with
/// [`IcebergError::CommitConflict`] when unsatisfied; the caller should
/// reload and retry.
#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    /// No metadata currently exists at the table's location.
    AssertCreate,
    /// The current `table-uuid` equals the given value.
    AssertTableUuid(Uuid),
    /// The named ref currently points at `snapshot_id` (or does not exist,
    /// if `snapshot_id` is `None`).
    AssertRefSnapshotId {
        /// Ref name, e.g. `"main"`.
        reference: String,
        /// Expected snapshot id, or `None` for "ref does not exist".
        snapshot_id: Option<i64>,
    },
    /// `last-column-id` equals the given value.
    AssertLastAssignedFieldId(i32),
    /// `last-partition-id` equals the given value.
    AssertLastAssignedPartitionId(i32),
    /// `current-schema-id` equals the given value.
    AssertCurrentSchemaId(i32),
    /// `default-spec-id` equals the given value.
    AssertDefaultSpecId(i32),
    /// `default-sort-order-id` equals the given value.
    AssertDefaultSortOrderId(i32),
}

impl Requirement {
    /// Check this requirement against `current`, the metadata read at the
    /// start of a commit attempt (`None` if no metadata file exists yet).
    pub fn check(&self, current: Option<&TableMetadata>) -> Result<()> {
        if let Requirement::AssertCreate = self {
            return match current {
                None => Ok(()),
                Some(_) => Err(IcebergError::CommitConflict(
                    "table already exists".to_string(),
                )),
            };
        }
        let metadata = current.ok_or_else(|| {
            IcebergError::CommitConflict("table does not exist".to_string())
        })?;
        match self {
            Requirement::AssertCreate => unreachable!("handled above"),
            Requirement::AssertTableUuid(expected) => {
                if &metadata.table_uuid != expected {
                    return Err(IcebergError::CommitConflict(format!(
                        "table-uuid mismatch: expected {expected}, found {}",
                        metadata.table_uuid
                    )));
                }
                Ok(())
            }
            Requirement::AssertRefSnapshotId { reference, snapshot_id } => {
                let actual = metadata.refs.get(reference).map(|r| r.snapshot_id());
                if actual != *snapshot_id {
                    return Err(IcebergError::CommitConflict(format!(
                        "ref '{reference}' points at {actual:?}, expected {snapshot_id:?}"
                    )));
                }
                Ok(())
            }
            Requirement::AssertLastAssignedFieldId(expected) => {
                if metadata.last_column_id != *expected {
                    return Err(IcebergError::CommitConflict(format!(
                        "last-column-id is {}, expected {expected}",
                        metadata.last_column_id
                    )));
                }
                Ok(())
            }
            Requirement::AssertLastAssignedPartitionId(expected) => {
                if metadata.last_partition_id != *expected {
                    return Err(IcebergError::CommitConflict(format!(
                        "last-partition-id is {}, expected {expected}",
                        metadata.last_partition_id
                    )));
                }
                Ok(())
            }
            Requirement::AssertCurrentSchemaId(expected) => {
                if metadata.current_schema_id != *expected {
                    return Err(IcebergError::CommitConflict(format!(
                        "current-schema-id is {}, expected {expected}",
                        metadata.current_schema_id
                    )));
                }
                Ok(())
            }
            Requirement::AssertDefaultSpecId(expected) => {
                if metadata.default_spec_id != *expected {
                    return Err(IcebergError::CommitConflict(format!(
                        "default-spec-id is {}, expected {expected}",
                        metadata.default_spec_id
                    )));
                }
                Ok(())
            }
            Requirement::AssertDefaultSortOrderId(expected) => {
                if metadata.default_sort_order_id != *expected {
                    return Err(IcebergError::CommitConflict(format!(
                        "default-sort-order-id is {}, expected {expected}",
                        metadata.default_sort_order_id
                    )));
                }
                Ok(())
            }
        }
    }
}

/// A pure, declarative state transition over a [`TableMetadata`] document
/// (spec.md §4.1). Applied in sequence by [`apply_updates`].
#[derive(Debug, Clone)]
pub enum Update {
    /// Add a schema to `schemas[]`, raising `last-column-id` to at least
    /// the given value (and to at least the schema's own highest field id).
    AddSchema {
        /// The schema to add.
        schema: Schema,
        /// The `last-column-id` this schema was allocated against.
        last_column_id: i32,
    },
    /// Set `current-schema-id`. [`LAST_ADDED`] refers to the schema added
    /// by the most recent preceding `AddSchema` in this same commit.
    SetCurrentSchema {
        /// The schema id to make current, or [`LAST_ADDED`].
        schema_id: i32,
    },
    /// Add a partition spec to `partition-specs[]`, raising
    /// `last-partition-id` to at least its highest field id.
    AddPartitionSpec {
        /// The spec to add.
        spec: PartitionSpec,
    },
    /// Set `default-spec-id`. [`LAST_ADDED`] refers to the spec added by
    /// the most recent preceding `AddPartitionSpec`.
    SetDefaultSpec {
        /// The spec id to make default, or [`LAST_ADDED`].
        spec_id: i32,
    },
    /// Add a sort order to `sort-orders[]`.
    AddSortOrder {
        /// The sort order to add.
        order: SortOrder,
    },
    /// Set `default-sort-order-id`. [`LAST_ADDED`] refers to the order
    /// added by the most recent preceding `AddSortOrder`.
    SetDefaultSortOrder {
        /// The order id to make default, or [`LAST_ADDED`].
        order_id: i32,
    },
    /// Add a snapshot to `snapshots[]`, advancing `last-sequence-number`
    /// and appending a `snapshot-log` entry.
    AddSnapshot {
        /// The snapshot to add.
        snapshot: Snapshot,
    },
    /// Create or move a named ref to point at `snapshot_id`.
    SetSnapshotRef {
        /// Ref name, e.g. `"main"`.
        reference: String,
        /// Snapshot id the ref should point at.
        snapshot_id: i64,
        /// `true` for a branch, `false` for a tag.
        is_branch: bool,
        /// Retention policy for the ref.
        retention: Retention,
    },
    /// Remove snapshots by id. Fails if any is still referenced by a ref.
    RemoveSnapshots {
        /// Snapshot ids to remove.
        snapshot_ids: Vec<i64>,
    },
    /// Remove a named ref.
    RemoveSnapshotRef {
        /// Ref name to remove.
        reference: String,
    },
    /// Change the table's `location`.
    SetLocation {
        /// The new location.
        location: String,
    },
    /// Merge key/value pairs into `properties`.
    SetProperties {
        /// Properties to set (overwriting any existing value for the key).
        updates: HashMap<String, String>,
    },
    /// Remove keys from `properties`.
    RemoveProperties {
        /// Property keys to remove.
        keys: Vec<String>,
    },
    /// Upgrade `format-version`. Never allowed to go backwards.
    UpgradeFormatVersion {
        /// The new format version (2 or 3).
        format_version: u8,
    },
}

/// Tracks the id most recently added by `AddSchema`/`AddPartitionSpec`/
/// `AddSortOrder` within one [`apply_updates`] fold, so a later update in
/// the same sequence can refer to it via [`LAST_ADDED`].
#[derive(Debug, Default)]
struct LastAdded {
    schema_id: Option<i32>,
    spec_id: Option<i32>,
    sort_order_id: Option<i32>,
}

fn resolve(id: i32, last: Option<i32>, what: &str) -> Result<i32> {
    if id == LAST_ADDED {
        last.ok_or_else(|| {
            IcebergError::CommitTransaction(format!(
                "{what}(-1) with no preceding add-{what} earlier in this commit"
            ))
        })
    } else {
        Ok(id)
    }
}

/// Fold `updates` onto `base` in order, producing a new candidate metadata
/// document. `now_ms` becomes `last-updated-ms`. The result is validated
/// (spec.md §3 invariants) before being returned; no partial application is
/// ever observable by the caller -- either every update applies and a valid
/// document comes back, or the whole fold fails.
pub fn apply_updates(base: TableMetadata, updates: &[Update], now_ms: i64) -> Result<TableMetadata> {
    let mut last = LastAdded::default();
    let mut metadata = base;
    for update in updates {
        metadata = apply_one(metadata, update, &mut last)?;
    }
    metadata.last_updated_ms = now_ms;
    metadata.validate()?;
    Ok(metadata)
}

fn apply_one(mut metadata: TableMetadata, update: &Update, last: &mut LastAdded) -> Result<TableMetadata> {
    match update {
        Update::AddSchema { schema, last_column_id } => {
            if metadata.schemas.iter().any(|s| s.schema_id == schema.schema_id) {
                return Err(IcebergError::CommitTransaction(format!(
                    "schema id {} already exists",
                    schema.schema_id
                )));
            }
            schema.validate()?;
            metadata.last_column_id = metadata
                .last_column_id
                .max(*last_column_id)
                .max(schema.highest_field_id());
            last.schema_id = Some(schema.schema_id);
            metadata.schemas.push(schema.clone());
            Ok(metadata)
        }
        Update::SetCurrentSchema { schema_id } => {
            let id = resolve(*schema_id, last.schema_id, "schema")?;
            if !metadata.schemas.iter().any(|s| s.schema_id == id) {
                return Err(IcebergError::CommitTransaction(format!("unknown schema id {id}")));
            }
            metadata.current_schema_id = id;
            Ok(metadata)
        }
        Update::AddPartitionSpec { spec } => {
            if metadata.partition_specs.iter().any(|s| s.spec_id == spec.spec_id) {
                return Err(IcebergError::CommitTransaction(format!(
                    "partition spec id {} already exists",
                    spec.spec_id
                )));
            }
            let schema = metadata.current_schema()?.clone();
            spec.validate(&schema)?;
            let max_field_id = spec.fields.iter().map(|f| f.field_id).max().unwrap_or(0);
            metadata.last_partition_id = metadata.last_partition_id.max(max_field_id);
            last.spec_id = Some(spec.spec_id);
            metadata.partition_specs.push(spec.clone());
            Ok(metadata)
        }
        Update::SetDefaultSpec { spec_id } => {
            let id = resolve(*spec_id, last.spec_id, "spec")?;
            if !metadata.partition_specs.iter().any(|s| s.spec_id == id) {
                return Err(IcebergError::CommitTransaction(format!("unknown partition spec id {id}")));
            }
            metadata.default_spec_id = id;
            Ok(metadata)
        }
        Update::AddSortOrder { order } => {
            if metadata.sort_orders.iter().any(|o| o.order_id == order.order_id) {
                return Err(IcebergError::CommitTransaction(format!(
                    "sort order id {} already exists",
                    order.order_id
                )));
            }
            last.sort_order_id = Some(order.order_id);
            metadata.sort_orders.push(order.clone());
            Ok(metadata)
        }
        Update::SetDefaultSortOrder { order_id } => {
            let id = resolve(*order_id, last.sort_order_id, "sort-order")?;
            if !metadata.sort_orders.iter().any(|o| o.order_id == id) {
                return Err(IcebergError::CommitTransaction(format!("unknown sort order id {id}")));
            }
            metadata.default_sort_order_id = id;
            Ok(metadata)
        }
        Update::AddSnapshot { snapshot } => {
            if metadata.snapshots.iter().any(|s| s.snapshot_id == snapshot.snapshot_id) {
                return Err(IcebergError::CommitTransaction(format!(
                    "snapshot id {} already exists",
                    snapshot.snapshot_id
                )));
            }
            if snapshot.sequence_number < metadata.last_sequence_number {
                return Err(IcebergError::CommitTransaction(format!(
                    "snapshot sequence-number {} regresses last-sequence-number {}",
                    snapshot.sequence_number, metadata.last_sequence_number
                )));
            }
            metadata.last_sequence_number = metadata.last_sequence_number.max(snapshot.sequence_number);
            metadata.snapshot_log.push(SnapshotLogEntry {
                timestamp_ms: snapshot.timestamp_ms,
                snapshot_id: snapshot.snapshot_id,
            });
            metadata.snapshots.push(snapshot.clone());
            Ok(metadata)
        }
        Update::SetSnapshotRef { reference, snapshot_id, is_branch, retention } => {
            if !metadata.snapshots.iter().any(|s| s.snapshot_id == *snapshot_id) {
                return Err(IcebergError::CommitTransaction(format!(
                    "cannot point ref '{reference}' at unknown snapshot id {snapshot_id}"
                )));
            }
            let new_ref = if *is_branch {
                Reference::Branch { snapshot_id: *snapshot_id, retention: *retention }
            } else {
                Reference::Tag { snapshot_id: *snapshot_id, retention: *retention }
            };
            if reference == MAIN_BRANCH {
                metadata.current_snapshot_id = Some(*snapshot_id);
            }
            metadata.refs.insert(reference.clone(), new_ref);
            Ok(metadata)
        }
        Update::RemoveSnapshots { snapshot_ids } => {
            let still_referenced: HashSet<i64> = metadata.refs.values().map(|r| r.snapshot_id()).collect();
            for id in snapshot_ids {
                if still_referenced.contains(id) {
                    return Err(IcebergError::CommitTransaction(format!(
                        "cannot remove snapshot {id}: still referenced by a ref"
                    )));
                }
            }
            let to_remove: HashSet<i64> = snapshot_ids.iter().copied().collect();
            metadata.snapshots.retain(|s| !to_remove.contains(&s.snapshot_id));
            Ok(metadata)
        }
        Update::RemoveSnapshotRef { reference } => {
            metadata.refs.remove(reference);
            if reference == MAIN_BRANCH {
                metadata.current_snapshot_id = None;
            }
            Ok(metadata)
        }
        Update::SetLocation { location } => {
            metadata.location = location.clone();
            Ok(metadata)
        }
        Update::SetProperties { updates } => {
            metadata.properties.extend(updates.clone());
            Ok(metadata)
        }
        Update::RemoveProperties { keys } => {
            for key in keys {
                metadata.properties.remove(key);
            }
            Ok(metadata)
        }
        Update::UpgradeFormatVersion { format_version } => {
            if *format_version < metadata.format_version {
                return Err(IcebergError::CommitTransaction(format!(
                    "cannot downgrade format-version {} to {format_version}",
                    metadata.format_version
                )));
            }
            metadata.format_version = *format_version;
            Ok(metadata)
        }
    }
}
