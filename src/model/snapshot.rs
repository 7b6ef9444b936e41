/*!
Snapshots: an immutable, atomically-published view of a table's data at one
point in time, plus the branch/tag references that point at them
(spec.md §3, §4.4).
*/
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The kind of change a snapshot represents, used by readers to decide
/// whether incremental scans can skip it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Only data was added.
    Append,
    /// Data and/or deletes were added in a way that cannot be read
    /// incrementally (e.g. compaction).
    Replace,
    /// Data was deleted without adding any data.
    Overwrite,
    /// Data and/or deletes were added and deleted together (e.g.
    /// compaction combined with row-level deletes).
    Delete,
}

/// Free-form, operation-specific metadata about a snapshot, plus the
/// well-known counters Iceberg always tracks. Unknown keys round-trip via
/// `other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// The operation that produced this snapshot.
    pub operation: Operation,
    /// Every other `summary` key, including `added-data-files`,
    /// `deleted-data-files`, `added-records`, `total-records`,
    /// `total-data-files`, and engine-specific entries.
    #[serde(flatten)]
    pub other: HashMap<String, String>,
}

impl Summary {
    /// Build a summary with just an operation and no counters.
    pub fn new(operation: Operation) -> Self {
        Summary {
            operation,
            other: HashMap::new(),
        }
    }

    /// Read a well-known counter key as `i64`, if present and parseable.
    pub fn counter(&self, key: &str) -> Option<i64> {
        self.other.get(key).and_then(|v| v.parse().ok())
    }
}

/// One row written to `snapshot-log`: records that `snapshot-id` was the
/// table's current snapshot as of `timestamp-ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotLogEntry {
    /// Milliseconds since epoch, UTC.
    #[serde(rename = "timestamp-ms")]
    pub timestamp_ms: i64,
    /// The snapshot id that became current at this time.
    #[serde(rename = "snapshot-id")]
    pub snapshot_id: i64,
}

/// An immutable point-in-time view of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique, monotonically-allocated id.
    #[serde(rename = "snapshot-id")]
    pub snapshot_id: i64,
    /// The snapshot this one was created from, or `None` for the first
    /// snapshot on a branch's history.
    #[serde(skip_serializing_if = "Option::is_none", rename = "parent-snapshot-id")]
    pub parent_snapshot_id: Option<i64>,
    /// Table row-id counter as of this snapshot (v3; spec.md §3).
    #[serde(skip_serializing_if = "Option::is_none", rename = "first-row-id")]
    pub first_row_id: Option<i64>,
    /// Number of rows added by this snapshot (v3; spec.md §3). Non-negative
    /// when present.
    #[serde(skip_serializing_if = "Option::is_none", rename = "added-rows")]
    pub added_rows: Option<i64>,
    /// Monotonically increasing counter, one greater than the parent's.
    #[serde(rename = "sequence-number")]
    pub sequence_number: i64,
    /// Milliseconds since epoch, UTC, when this snapshot was committed.
    #[serde(rename = "timestamp-ms")]
    pub timestamp_ms: i64,
    /// Location of this snapshot's manifest list file.
    #[serde(rename = "manifest-list")]
    pub manifest_list: String,
    /// Summary of the operation that produced this snapshot.
    pub summary: Summary,
    /// Id of the schema used when this snapshot was written.
    #[serde(skip_serializing_if = "Option::is_none", rename = "schema-id")]
    pub schema_id: Option<i32>,
}

/// How long a ref is retained, and (for tags) expiry policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retention {
    /// Number of ancestor snapshots to keep for a branch even past
    /// `max-snapshot-age-ms`.
    #[serde(skip_serializing_if = "Option::is_none", rename = "min-snapshots-to-keep")]
    pub min_snapshots_to_keep: Option<i32>,
    /// Max age, in ms, of a snapshot kept purely by age.
    #[serde(skip_serializing_if = "Option::is_none", rename = "max-snapshot-age-ms")]
    pub max_snapshot_age_ms: Option<i64>,
    /// For a tag, how long the tag itself is kept before expiry candidacy.
    #[serde(skip_serializing_if = "Option::is_none", rename = "max-ref-age-ms")]
    pub max_ref_age_ms: Option<i64>,
}

/// A named pointer to a snapshot: a branch (mutable, advances on commit) or
/// a tag (fixed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Reference {
    /// A mutable ref that advances as new snapshots are committed to it.
    Branch {
        /// The snapshot this branch currently points at.
        #[serde(rename = "snapshot-id")]
        snapshot_id: i64,
        /// Retention policy for this branch's history.
        #[serde(flatten)]
        retention: Retention,
    },
    /// An immutable ref fixed to one snapshot.
    Tag {
        /// The snapshot this tag points at.
        #[serde(rename = "snapshot-id")]
        snapshot_id: i64,
        /// Retention policy for this tag.
        #[serde(flatten)]
        retention: Retention,
    },
}

impl Reference {
    /// The snapshot id this reference currently points at, regardless of
    /// whether it's a branch or a tag.
    pub fn snapshot_id(&self) -> i64 {
        match self {
            Reference::Branch { snapshot_id, .. } => *snapshot_id,
            Reference::Tag { snapshot_id, .. } => *snapshot_id,
        }
    }

    /// Whether this reference is a branch (mutable) as opposed to a tag.
    pub fn is_branch(&self) -> bool {
        matches!(self, Reference::Branch { .. })
    }
}

/// The well-known name of a table's default branch, used when no ref is
/// specified.
pub const MAIN_BRANCH: &str = "main";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_flatten_roundtrip() {
        let json = r#"{"operation":"append","added-data-files":"3","added-records":"100"}"#;
        let s: Summary = serde_json::from_str(json).unwrap();
        assert_eq!(s.operation, Operation::Append);
        assert_eq!(s.counter("added-data-files"), Some(3));
        let back = serde_json::to_string(&s).unwrap();
        let s2: Summary = serde_json::from_str(&back).unwrap();
        assert_eq!(s, s2);
    }

    #[test]
    fn test_reference_branch_roundtrip() {
        let json = r#"{"type":"branch","snapshot-id":1,"min-snapshots-to-keep":5}"#;
        let r: Reference = serde_json::from_str(json).unwrap();
        assert!(r.is_branch());
        assert_eq!(r.snapshot_id(), 1);
    }

    #[test]
    fn test_reference_tag_roundtrip() {
        let json = r#"{"type":"tag","snapshot-id":7,"max-ref-age-ms":86400000}"#;
        let r: Reference = serde_json::from_str(json).unwrap();
        assert!(!r.is_branch());
    }

    #[test]
    fn test_snapshot_roundtrip_minimal() {
        let snap = Snapshot {
            snapshot_id: 1,
            parent_snapshot_id: None,
            first_row_id: None,
            added_rows: None,
            sequence_number: 1,
            timestamp_ms: 1000,
            manifest_list: "s3://bucket/manifest-list.avro".to_string(),
            summary: Summary::new(Operation::Append),
            schema_id: Some(0),
        };
        let json = serde_json::to_string(&snap).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap, back);
        assert!(!json.contains("parent-snapshot-id"));
    }
}
