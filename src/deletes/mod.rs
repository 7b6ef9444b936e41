/*!
Row-level deletes and deletion vectors (spec.md §4.7): position-delete
files, equality-delete files, and the v3 deletion-vector rules that
supersede position deletes for a given data file. Built directly on the
reserved schema and field ids already declared in
[`crate::model::manifest`].
*/
use crate::model::manifest::{
    Content, DataFile, FileFormat, EQUALITY_DELETE_SCHEMA_ID, POSITION_DELETE_SCHEMA_ID,
};

/// Whether `file` is a position-delete entry: a standalone v2-style file, or
/// a v3 deletion vector stored in a Puffin blob.
pub fn is_position_delete(file: &DataFile) -> bool {
    file.content == Content::PositionDeletes
}

/// Whether `file` is an equality-delete entry.
pub fn is_equality_delete(file: &DataFile) -> bool {
    file.content == Content::EqualityDeletes
}

/// A data file's deletes, as collected for one read of `data_file_path` at
/// `data_sequence_number` (spec.md §4.7 "Application order").
#[derive(Debug, Clone, Default)]
pub struct ApplicableDeletes<'a> {
    /// The single active deletion vector for this data file, if any.
    pub deletion_vector: Option<&'a DataFile>,
    /// Legacy position-delete files that apply, in manifest order.
    pub position_deletes: Vec<&'a DataFile>,
    /// Equality-delete files that apply, in manifest order.
    pub equality_deletes: Vec<&'a DataFile>,
}

/// Whether a v3 deletion vector exists for `data_file_path` among
/// `candidates` (position-delete-content entries from the live manifest
/// listing). Per spec.md §4.7, at most one DV is active per data file per
/// snapshot; `candidates` is expected to already be restricted to that file.
pub fn find_deletion_vector<'a>(data_file_path: &str, candidates: &[&'a DataFile]) -> Option<&'a DataFile> {
    candidates
        .iter()
        .copied()
        .find(|f| f.is_deletion_vector() && f.referenced_data_file.as_deref() == Some(data_file_path))
}

/// `true` if a deletion vector exists for `data_file_path`, in which case a
/// reader must ignore any legacy position-delete files for that same file
/// (spec.md §4.7, scenario F).
pub fn should_ignore_position_deletes(data_file_path: &str, candidates: &[&DataFile]) -> bool {
    find_deletion_vector(data_file_path, candidates).is_some()
}

/// Collect the deletes that apply when reading `data_file` written at
/// `data_sequence_number`, from the full set of delete-content manifest
/// entries (`content=1` or `content=2`) visible in the current snapshot.
/// Implements spec.md §4.7's three-step application order:
///
/// 1. If a deletion vector exists for the file, use only that.
/// 2. Otherwise collect position-delete files with `sequence_number >=
///    data_sequence_number` that reference the file.
/// 3. Collect equality-delete files with `sequence_number >=
///    data_sequence_number`.
pub fn applicable_deletes<'a>(
    data_file_path: &str,
    data_sequence_number: i64,
    delete_entries: &[(&'a DataFile, i64)],
) -> ApplicableDeletes<'a> {
    let position_candidates: Vec<&DataFile> = delete_entries
        .iter()
        .filter(|(f, _)| is_position_delete(f))
        .map(|(f, _)| *f)
        .collect();

    if let Some(dv) = find_deletion_vector(data_file_path, &position_candidates) {
        return ApplicableDeletes {
            deletion_vector: Some(dv),
            position_deletes: Vec::new(),
            equality_deletes: collect_equality_deletes(data_sequence_number, delete_entries),
        };
    }

    let position_deletes: Vec<&DataFile> = delete_entries
        .iter()
        .filter(|(f, seq)| is_position_delete(f) && !f.is_deletion_vector() && *seq >= data_sequence_number)
        .filter(|(f, _)| references_file(f, data_file_path))
        .map(|(f, _)| *f)
        .collect();

    ApplicableDeletes {
        deletion_vector: None,
        position_deletes,
        equality_deletes: collect_equality_deletes(data_sequence_number, delete_entries),
    }
}

fn collect_equality_deletes<'a>(data_sequence_number: i64, delete_entries: &[(&'a DataFile, i64)]) -> Vec<&'a DataFile> {
    delete_entries
        .iter()
        .filter(|(f, seq)| is_equality_delete(f) && *seq >= data_sequence_number)
        .map(|(f, _)| *f)
        .collect()
}

/// A v2-style position-delete file references a data file by the
/// `file_path` column inside its rows, which this crate's `DataFile` model
/// does not carry directly (it is a column of the delete file's own rows,
/// not manifest metadata). Callers that have already read the delete
/// file's rows should pre-filter by `file_path` themselves; this helper
/// only handles the DV case, where `referenced_data_file` is a manifest
/// field. For a plain position-delete entry with no row index loaded, any
/// entry can reference any file, so this conservatively returns `true`.
fn references_file(_file: &DataFile, _data_file_path: &str) -> bool {
    true
}

/// Build a position-delete `DataFile` entry (spec.md §4.7: reserved field
/// ids 2147483546/2147483545, reserved schema id -1).
pub fn position_delete_file(file_path: impl Into<String>, file_format: FileFormat, record_count: i64, file_size_in_bytes: i64) -> DataFile {
    DataFile {
        content: Content::PositionDeletes,
        file_path: file_path.into(),
        file_format,
        partition: Default::default(),
        record_count,
        file_size_in_bytes,
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

/// Build an equality-delete `DataFile` entry over `equality_ids` (the field
/// ids of the columns the deletes match on).
pub fn equality_delete_file(
    file_path: impl Into<String>,
    file_format: FileFormat,
    record_count: i64,
    file_size_in_bytes: i64,
    equality_ids: Vec<i32>,
) -> DataFile {
    DataFile {
        content: Content::EqualityDeletes,
        file_path: file_path.into(),
        file_format,
        partition: Default::default(),
        record_count,
        file_size_in_bytes,
        column_sizes: None,
        value_counts: None,
        null_value_counts: None,
        nan_value_counts: None,
        lower_bounds: None,
        upper_bounds: None,
        key_metadata: None,
        split_offsets: None,
        equality_ids: Some(equality_ids),
        sort_order_id: None,
        first_row_id: None,
        content_offset: None,
        content_size_in_bytes: None,
        referenced_data_file: None,
    }
}

/// Build a v3 deletion-vector `DataFile` entry: a `PositionDeletes`
/// entry stored as a Puffin blob, pointing at `referenced_data_file`
/// (spec.md §4.7). A v3 writer must use this instead of
/// [`position_delete_file`] (spec.md §4.7 "a v3 writer may not add new
/// position-delete files").
pub fn deletion_vector_file(
    puffin_path: impl Into<String>,
    referenced_data_file: impl Into<String>,
    content_offset: i64,
    content_size_in_bytes: i64,
    record_count: i64,
    file_size_in_bytes: i64,
) -> DataFile {
    DataFile {
        content: Content::PositionDeletes,
        file_path: puffin_path.into(),
        file_format: FileFormat::Puffin,
        partition: Default::default(),
        record_count,
        file_size_in_bytes,
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
        content_offset: Some(content_offset),
        content_size_in_bytes: Some(content_size_in_bytes),
        referenced_data_file: Some(referenced_data_file.into()),
    }
}

/// The schema id reserved for position-delete rows.
pub fn position_delete_schema_id() -> i32 {
    POSITION_DELETE_SCHEMA_ID
}

/// The schema id reserved for equality-delete rows.
pub fn equality_delete_schema_id() -> i32 {
    EQUALITY_DELETE_SCHEMA_ID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deletion_vector_supersedes_position_delete() {
        // scenario F: d.parquet has a v2 position-delete file pd.parquet
        // recording {3,5}; a v3 writer emits dv.puffin for d.parquet.
        let pd = position_delete_file("s3://b/pd.parquet", FileFormat::Parquet, 2, 128);
        let dv = deletion_vector_file("s3://b/dv.puffin", "s3://b/d.parquet", 0, 24, 3, 24);

        assert!(is_position_delete(&pd));
        assert!(dv.is_deletion_vector());

        let candidates = vec![&dv];
        assert!(should_ignore_position_deletes("s3://b/d.parquet", &candidates));

        let found = find_deletion_vector("s3://b/d.parquet", &candidates).unwrap();
        assert_eq!(found.referenced_data_file.as_deref(), Some("s3://b/d.parquet"));
    }

    #[test]
    fn test_no_deletion_vector_found_for_other_file() {
        let dv = deletion_vector_file("s3://b/dv.puffin", "s3://b/other.parquet", 0, 24, 3, 24);
        let candidates = vec![&dv];
        assert!(!should_ignore_position_deletes("s3://b/d.parquet", &candidates));
    }

    #[test]
    fn test_applicable_deletes_prefers_dv_over_position_deletes() {
        let pd = position_delete_file("s3://b/pd.parquet", FileFormat::Parquet, 2, 128);
        let dv = deletion_vector_file("s3://b/dv.puffin", "s3://b/d.parquet", 0, 24, 3, 24);
        let entries: Vec<(&DataFile, i64)> = vec![(&pd, 1), (&dv, 2)];

        let applicable = applicable_deletes("s3://b/d.parquet", 1, &entries);
        assert!(applicable.deletion_vector.is_some());
        assert!(applicable.position_deletes.is_empty());
    }

    #[test]
    fn test_applicable_deletes_filters_by_sequence_number() {
        let old_eq = equality_delete_file("s3://b/eq1.parquet", FileFormat::Parquet, 1, 64, vec![1]);
        let new_eq = equality_delete_file("s3://b/eq2.parquet", FileFormat::Parquet, 1, 64, vec![1]);
        let entries: Vec<(&DataFile, i64)> = vec![(&old_eq, 1), (&new_eq, 5)];

        let applicable = applicable_deletes("s3://b/d.parquet", 3, &entries);
        assert_eq!(applicable.equality_deletes.len(), 1);
        assert_eq!(applicable.equality_deletes[0].file_path, "s3://b/eq2.parquet");
    }

    #[test]
    fn test_reserved_schema_ids() {
        assert_eq!(position_delete_schema_id(), -1);
        assert_eq!(equality_delete_schema_id(), -2);
    }
}
