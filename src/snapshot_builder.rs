/*!
Snapshot and manifest-list assembly (spec.md §4.4): operation
classification, partition-field statistics aggregation, sequence-number
monotonicity, snapshot-summary rendering, and ref-retention.
*/
use std::collections::{HashMap, HashSet};

use crate::config::SnapshotRetention;
use crate::error::{IcebergError, Result};
use crate::model::manifest::{Content, ManifestEntry, Status};
use crate::model::manifest_list::{FieldSummary, ManifestContent, ManifestFile};
use crate::model::snapshot::{Operation, Reference, Snapshot, Summary};
use crate::model::types::{PrimitiveType, Value};
use crate::stats::comparator::compare_values;
use crate::stats::encode::{decode_bound, encode_bound};

/// Classify the operation a set of manifest entries represents (spec.md
/// §4.4): `append` adds only data; `delete` removes only; `overwrite` does
/// both; anything else (e.g. carrying forward only `EXISTING` entries, as a
/// wholesale rewrite does) is `replace`.
pub fn classify_operation(entries: &[ManifestEntry]) -> Operation {
    let added_data = entries
        .iter()
        .any(|e| e.status == Status::Added && e.data_file.content == Content::Data);
    let removed_or_deletes = entries.iter().any(|e| {
        e.status == Status::Deleted
            || matches!(e.data_file.content, Content::PositionDeletes | Content::EqualityDeletes)
    });
    match (added_data, removed_or_deletes) {
        (true, false) => Operation::Append,
        (false, true) => Operation::Delete,
        (true, true) => Operation::Overwrite,
        (false, false) => Operation::Replace,
    }
}

/// Aggregate one partition field's values across a manifest's entries into
/// a [`FieldSummary`] (spec.md §4.4): null presence, NaN presence for
/// floating-point fields, and binary-encoded min/max under the field's
/// comparator.
pub fn aggregate_field_summary(field_type: &PrimitiveType, values: &[Option<Value>]) -> Result<FieldSummary> {
    let mut contains_null = false;
    let mut contains_nan = None;
    let mut min: Option<Value> = None;
    let mut max: Option<Value> = None;

    let is_float_like = matches!(field_type, PrimitiveType::Float | PrimitiveType::Double);
    if is_float_like {
        contains_nan = Some(false);
    }

    for value in values {
        match value {
            None => contains_null = true,
            Some(Value::Null) => contains_null = true,
            Some(Value::Float(f)) if f.is_nan() => contains_nan = Some(true),
            Some(Value::Double(d)) if d.is_nan() => contains_nan = Some(true),
            Some(v) => {
                min = Some(match min.take() {
                    None => v.clone(),
                    Some(cur) => if compare_values(v, &cur)? == std::cmp::Ordering::Less { v.clone() } else { cur },
                });
                max = Some(match max.take() {
                    None => v.clone(),
                    Some(cur) => if compare_values(v, &cur)? == std::cmp::Ordering::Greater { v.clone() } else { cur },
                });
            }
        }
    }

    Ok(FieldSummary {
        contains_null,
        contains_nan,
        lower_bound: min.map(|v| encode_bound(&v)).transpose()?.map(Into::into),
        upper_bound: max.map(|v| encode_bound(&v)).transpose()?.map(Into::into),
    })
}

/// Aggregate partition-field summaries for every field in a partition spec,
/// given the partition values recorded by each manifest entry. `columns`
/// provides, per partition field in spec order, that field's primitive type
/// and the value seen in each entry (`None` where absent/null).
pub fn build_partition_summaries(columns: &[(PrimitiveType, Vec<Option<Value>>)]) -> Result<Vec<FieldSummary>> {
    columns
        .iter()
        .map(|(ty, values)| aggregate_field_summary(ty, values))
        .collect()
}

/// Merge two binary-encoded bounds under a field's comparator, decoding
/// with `field_type`, picking the minimum (if `take_min`) or maximum.
fn merge_bound(field_type: &PrimitiveType, a: Option<Vec<u8>>, b: Option<Vec<u8>>, take_min: bool) -> Result<Option<Vec<u8>>> {
    match (a, b) {
        (None, other) | (other, None) => Ok(other),
        (Some(a), Some(b)) => {
            let va = decode_bound(&a, field_type)?;
            let vb = decode_bound(&b, field_type)?;
            let ordering = compare_values(&va, &vb)?;
            let keep_a = if take_min { ordering != std::cmp::Ordering::Greater } else { ordering != std::cmp::Ordering::Less };
            Ok(Some(if keep_a { a } else { b }))
        }
    }
}

/// Merge per-column statistics across files being combined into one
/// manifest (spec.md §4.4 "Statistics aggregation"): null/NaN counts and
/// column sizes sum; bounds take the min/max under the column's comparator.
/// `field_types` maps field id to primitive type, needed to decode bounds.
pub fn merge_column_stats(
    field_types: &HashMap<i32, PrimitiveType>,
    counts: &[&HashMap<i32, i64>],
    column_sizes: &[&HashMap<i32, i64>],
    null_counts: &[&HashMap<i32, i64>],
    nan_counts: &[&HashMap<i32, i64>],
    lower_bounds: &[&HashMap<i32, Vec<u8>>],
    upper_bounds: &[&HashMap<i32, Vec<u8>>],
) -> Result<MergedColumnStats> {
    let sum_maps = |maps: &[&HashMap<i32, i64>]| -> HashMap<i32, i64> {
        let mut out = HashMap::new();
        for map in maps {
            for (k, v) in map.iter() {
                *out.entry(*k).or_insert(0) += v;
            }
        }
        out
    };

    let mut lower: HashMap<i32, Vec<u8>> = HashMap::new();
    for map in lower_bounds {
        for (field_id, bytes) in map.iter() {
            let ty = field_types
                .get(field_id)
                .ok_or_else(|| IcebergError::Validation(format!("no type known for field id {field_id}")))?;
            let existing = lower.remove(field_id);
            let merged = merge_bound(ty, existing, Some(bytes.clone()), true)?;
            if let Some(m) = merged {
                lower.insert(*field_id, m);
            }
        }
    }
    let mut upper: HashMap<i32, Vec<u8>> = HashMap::new();
    for map in upper_bounds {
        for (field_id, bytes) in map.iter() {
            let ty = field_types
                .get(field_id)
                .ok_or_else(|| IcebergError::Validation(format!("no type known for field id {field_id}")))?;
            let existing = upper.remove(field_id);
            let merged = merge_bound(ty, existing, Some(bytes.clone()), false)?;
            if let Some(m) = merged {
                upper.insert(*field_id, m);
            }
        }
    }

    Ok(MergedColumnStats {
        value_counts: sum_maps(counts),
        column_sizes: sum_maps(column_sizes),
        null_value_counts: sum_maps(null_counts),
        nan_value_counts: sum_maps(nan_counts),
        lower_bounds: lower,
        upper_bounds: upper,
    })
}

/// The result of merging several files' per-column statistics into one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedColumnStats {
    /// Summed per-column value counts.
    pub value_counts: HashMap<i32, i64>,
    /// Summed per-column encoded sizes.
    pub column_sizes: HashMap<i32, i64>,
    /// Summed per-column null counts.
    pub null_value_counts: HashMap<i32, i64>,
    /// Summed per-column NaN counts.
    pub nan_value_counts: HashMap<i32, i64>,
    /// Per-column binary-encoded lower bound, minimized across inputs.
    pub lower_bounds: HashMap<i32, Vec<u8>>,
    /// Per-column binary-encoded upper bound, maximized across inputs.
    pub upper_bounds: HashMap<i32, Vec<u8>>,
}

/// Per-status file and row counts for a manifest's entries, as recorded in
/// its manifest-list row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManifestCounts {
    /// Entries with status `ADDED`.
    pub added_files_count: i32,
    /// Entries with status `EXISTING`.
    pub existing_files_count: i32,
    /// Entries with status `DELETED`.
    pub deleted_files_count: i32,
    /// Row count of `ADDED` entries.
    pub added_rows_count: i64,
    /// Row count of `EXISTING` entries.
    pub existing_rows_count: i64,
    /// Row count of `DELETED` entries.
    pub deleted_rows_count: i64,
    /// Lowest `sequence_number` (or `file_sequence_number`) of any entry.
    pub min_sequence_number: i64,
}

/// Count a manifest's entries by status (spec.md §4.4).
pub fn summarize_manifest_entries(entries: &[ManifestEntry]) -> ManifestCounts {
    let mut counts = ManifestCounts {
        min_sequence_number: i64::MAX,
        ..Default::default()
    };
    for entry in entries {
        let seq = entry.sequence_number.or(entry.file_sequence_number).unwrap_or(0);
        counts.min_sequence_number = counts.min_sequence_number.min(seq);
        match entry.status {
            Status::Added => {
                counts.added_files_count += 1;
                counts.added_rows_count += entry.data_file.record_count;
            }
            Status::Existing => {
                counts.existing_files_count += 1;
                counts.existing_rows_count += entry.data_file.record_count;
            }
            Status::Deleted => {
                counts.deleted_files_count += 1;
                counts.deleted_rows_count += entry.data_file.record_count;
            }
        }
    }
    if counts.min_sequence_number == i64::MAX {
        counts.min_sequence_number = 0;
    }
    counts
}

/// Build a manifest-list row for one manifest, given its precomputed
/// entry counts and (optional) per-partition-field summaries.
#[allow(clippy::too_many_arguments)]
pub fn build_manifest_file(
    manifest_path: impl Into<String>,
    manifest_length: i64,
    partition_spec_id: i32,
    content: ManifestContent,
    sequence_number: i64,
    added_snapshot_id: i64,
    counts: ManifestCounts,
    partitions: Option<Vec<FieldSummary>>,
) -> ManifestFile {
    ManifestFile {
        manifest_path: manifest_path.into(),
        manifest_length,
        partition_spec_id,
        content,
        sequence_number,
        min_sequence_number: counts.min_sequence_number,
        added_snapshot_id,
        added_files_count: counts.added_files_count,
        existing_files_count: counts.existing_files_count,
        deleted_files_count: counts.deleted_files_count,
        added_rows_count: counts.added_rows_count,
        existing_rows_count: counts.existing_rows_count,
        deleted_rows_count: counts.deleted_rows_count,
        partitions,
        key_metadata: None,
    }
}

/// Validate that `proposed` is not less than `parent`'s sequence number
/// (spec.md §4.4: "the builder refuses to emit a snapshot whose
/// sequence-number is less than the parent snapshot's").
pub fn next_sequence_number(parent: Option<&Snapshot>, proposed: i64) -> Result<i64> {
    if let Some(parent) = parent {
        if proposed < parent.sequence_number {
            return Err(IcebergError::Validation(format!(
                "sequence number {proposed} is less than parent sequence number {}",
                parent.sequence_number
            )));
        }
    }
    Ok(proposed)
}

/// Build a snapshot summary with the well-known counters rendered as
/// strings (spec.md §4.4 "Counter fields are rendered as strings").
pub fn build_summary(operation: Operation, counters: &[(&str, i64)]) -> Summary {
    let mut summary = Summary::new(operation);
    for (key, value) in counters {
        summary.other.insert((*key).to_string(), value.to_string());
    }
    summary
}

/// Select the set of snapshot ids to keep under a table's retention policy
/// (spec.md §4.4 "Refs"): every ref head, plus every snapshot younger than
/// `max-snapshot-age-ms`, plus the most recent `min-snapshots-to-keep` on
/// each branch. A ref's own retention settings override the table default
/// when present.
pub fn compute_snapshots_to_keep(
    refs: &HashMap<String, Reference>,
    snapshots: &[Snapshot],
    table_retention: &SnapshotRetention,
    now_ms: i64,
) -> HashSet<i64> {
    let mut keep: HashSet<i64> = HashSet::new();

    for reference in refs.values() {
        keep.insert(reference.snapshot_id());
    }

    for (_, reference) in refs.iter() {
        let (branch_max_age, branch_min_keep) = match reference {
            Reference::Branch { retention, .. } => (
                retention.max_snapshot_age_ms.or(table_retention.max_snapshot_age_ms),
                retention.min_snapshots_to_keep.map(|n| n as u32).unwrap_or(table_retention.min_snapshots_to_keep),
            ),
            Reference::Tag { .. } => continue,
        };

        if let Some(max_age) = branch_max_age {
            for snap in snapshots {
                if now_ms.saturating_sub(snap.timestamp_ms) < max_age {
                    keep.insert(snap.snapshot_id);
                }
            }
        }

        let mut ancestors = ancestor_chain(reference.snapshot_id(), snapshots);
        ancestors.truncate(branch_min_keep as usize);
        keep.extend(ancestors);
    }

    keep
}

fn ancestor_chain(head: i64, snapshots: &[Snapshot]) -> Vec<i64> {
    let by_id: HashMap<i64, &Snapshot> = snapshots.iter().map(|s| (s.snapshot_id, s)).collect();
    let mut chain = Vec::new();
    let mut current = Some(head);
    while let Some(id) = current {
        chain.push(id);
        current = by_id.get(&id).and_then(|s| s.parent_snapshot_id);
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::manifest::DataFile;
    use crate::model::snapshot::Retention;
    use std::collections::HashMap as Map;

    fn data_file(content: Content, record_count: i64) -> DataFile {
        DataFile {
            content,
            file_path: "s3://b/f.parquet".to_string(),
            file_format: crate::model::manifest::FileFormat::Parquet,
            partition: Map::new(),
            record_count,
            file_size_in_bytes: 100,
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
        }
    }

    fn entry(status: Status, content: Content, record_count: i64) -> ManifestEntry {
        ManifestEntry {
            status,
            snapshot_id: Some(1),
            sequence_number: Some(1),
            file_sequence_number: Some(1),
            data_file: data_file(content, record_count),
        }
    }

    #[test]
    fn test_classify_append() {
        let entries = vec![entry(Status::Added, Content::Data, 10)];
        assert_eq!(classify_operation(&entries), Operation::Append);
    }

    #[test]
    fn test_classify_delete() {
        let entries = vec![entry(Status::Deleted, Content::Data, 10)];
        assert_eq!(classify_operation(&entries), Operation::Delete);
    }

    #[test]
    fn test_classify_overwrite() {
        let entries = vec![entry(Status::Added, Content::Data, 10), entry(Status::Deleted, Content::Data, 5)];
        assert_eq!(classify_operation(&entries), Operation::Overwrite);
    }

    #[test]
    fn test_aggregate_field_summary_year_bounds() {
        // spec.md scenario C values, aggregated as a partition field.
        let values = vec![Some(Value::Int(2010)), Some(Value::Int(2015))];
        let summary = aggregate_field_summary(&PrimitiveType::Int, &values).unwrap();
        assert!(!summary.contains_null);
        assert_eq!(decode_bound(summary.lower_bound.as_ref().unwrap(), &PrimitiveType::Int).unwrap(), Value::Int(2010));
        assert_eq!(decode_bound(summary.upper_bound.as_ref().unwrap(), &PrimitiveType::Int).unwrap(), Value::Int(2015));
    }

    #[test]
    fn test_aggregate_field_summary_null_and_nan() {
        let values = vec![None, Some(Value::Double(f64::NAN)), Some(Value::Double(1.0))];
        let summary = aggregate_field_summary(&PrimitiveType::Double, &values).unwrap();
        assert!(summary.contains_null);
        assert_eq!(summary.contains_nan, Some(true));
    }

    #[test]
    fn test_summarize_manifest_entries_counts() {
        let entries = vec![
            entry(Status::Added, Content::Data, 10),
            entry(Status::Added, Content::Data, 20),
            entry(Status::Existing, Content::Data, 5),
        ];
        let counts = summarize_manifest_entries(&entries);
        assert_eq!(counts.added_files_count, 2);
        assert_eq!(counts.added_rows_count, 30);
        assert_eq!(counts.existing_files_count, 1);
    }

    #[test]
    fn test_next_sequence_number_rejects_regression() {
        let parent = Snapshot {
            snapshot_id: 1,
            parent_snapshot_id: None,
            first_row_id: None,
            added_rows: None,
            sequence_number: 5,
            timestamp_ms: 0,
            manifest_list: String::new(),
            summary: Summary::new(Operation::Append),
            schema_id: None,
        };
        assert!(next_sequence_number(Some(&parent), 4).is_err());
        assert!(next_sequence_number(Some(&parent), 6).is_ok());
    }

    #[test]
    fn test_merge_column_stats_sums_counts_and_bounds_min_max() {
        let mut field_types = HashMap::new();
        field_types.insert(1, PrimitiveType::Int);

        let mut counts_a = HashMap::new();
        counts_a.insert(1, 10i64);
        let mut counts_b = HashMap::new();
        counts_b.insert(1, 20i64);

        let mut lower_a = HashMap::new();
        lower_a.insert(1, encode_bound(&Value::Int(5)).unwrap());
        let mut lower_b = HashMap::new();
        lower_b.insert(1, encode_bound(&Value::Int(2)).unwrap());

        let mut upper_a = HashMap::new();
        upper_a.insert(1, encode_bound(&Value::Int(5)).unwrap());
        let mut upper_b = HashMap::new();
        upper_b.insert(1, encode_bound(&Value::Int(9)).unwrap());

        let empty: HashMap<i32, i64> = HashMap::new();
        let merged = merge_column_stats(
            &field_types,
            &[&counts_a, &counts_b],
            &[&empty, &empty],
            &[&empty, &empty],
            &[&empty, &empty],
            &[&lower_a, &lower_b],
            &[&upper_a, &upper_b],
        )
        .unwrap();

        assert_eq!(merged.value_counts.get(&1), Some(&30));
        assert_eq!(decode_bound(&merged.lower_bounds[&1], &PrimitiveType::Int).unwrap(), Value::Int(2));
        assert_eq!(decode_bound(&merged.upper_bounds[&1], &PrimitiveType::Int).unwrap(), Value::Int(9));
    }

    #[test]
    fn test_compute_snapshots_to_keep_respects_min_snapshots_and_ref_heads() {
        let snapshots = vec![
            Snapshot {
                snapshot_id: 1,
                parent_snapshot_id: None,
                first_row_id: None,
                added_rows: None,
                sequence_number: 1,
                timestamp_ms: 0,
                manifest_list: String::new(),
                summary: Summary::new(Operation::Append),
                schema_id: None,
            },
            Snapshot {
                snapshot_id: 2,
                parent_snapshot_id: Some(1),
                first_row_id: None,
                added_rows: None,
                sequence_number: 2,
                timestamp_ms: 1,
                manifest_list: String::new(),
                summary: Summary::new(Operation::Append),
                schema_id: None,
            },
        ];
        let mut refs = HashMap::new();
        refs.insert(
            "main".to_string(),
            Reference::Branch {
                snapshot_id: 2,
                retention: Retention {
                    min_snapshots_to_keep: Some(1),
                    max_snapshot_age_ms: Some(0),
                    max_ref_age_ms: None,
                },
            },
        );
        let table_retention = SnapshotRetention {
            max_snapshot_age_ms: None,
            min_snapshots_to_keep: 1,
        };
        let keep = compute_snapshots_to_keep(&refs, &snapshots, &table_retention, 1000);
        assert!(keep.contains(&2));
        assert!(!keep.contains(&1));
    }
}
