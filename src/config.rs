/*!
A typed read model over a table's `properties` map (spec.md §6). Properties
are always a `string -> string` map on the wire; this module is the single
place that knows the keys and their defaults, so the rest of the crate never
re-parses a magic string literal.
*/
use std::collections::HashMap;
use std::time::Duration;

/// Default number of commit retry attempts (spec.md §4.1).
pub const DEFAULT_COMMIT_NUM_RETRIES: u32 = 5;
/// Default minimum retry backoff.
pub const DEFAULT_COMMIT_MIN_WAIT_MS: u64 = 100;
/// Default maximum retry backoff.
pub const DEFAULT_COMMIT_MAX_WAIT_MS: u64 = 5_000;
/// Multiplicative jitter factor applied to backoff.
pub const DEFAULT_COMMIT_JITTER: f64 = 0.2;
/// Default cap on retained `previous-versions` in the metadata log.
pub const DEFAULT_METADATA_PREVIOUS_VERSIONS_MAX: u32 = 100;

fn get_u32(props: &HashMap<String, String>, key: &str, default: u32) -> u32 {
    props
        .get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_u64(props: &HashMap<String, String>, key: &str, default: u64) -> u64 {
    props
        .get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_f64(props: &HashMap<String, String>, key: &str, default: f64) -> f64 {
    props
        .get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_bool(props: &HashMap<String, String>, key: &str, default: bool) -> bool {
    props
        .get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Commit-retry tunables, read from `commit.retry.*` table properties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of commit attempts (including the first).
    pub num_retries: u32,
    /// Minimum backoff before a retry.
    pub min_wait: Duration,
    /// Maximum backoff before a retry.
    pub max_wait: Duration,
    /// Multiplicative jitter factor in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            num_retries: DEFAULT_COMMIT_NUM_RETRIES,
            min_wait: Duration::from_millis(DEFAULT_COMMIT_MIN_WAIT_MS),
            max_wait: Duration::from_millis(DEFAULT_COMMIT_MAX_WAIT_MS),
            jitter: DEFAULT_COMMIT_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Parse a [`RetryPolicy`] out of a table's `properties` map.
    pub fn from_properties(props: &HashMap<String, String>) -> Self {
        RetryPolicy {
            num_retries: get_u32(props, "commit.retry.num-retries", DEFAULT_COMMIT_NUM_RETRIES),
            min_wait: Duration::from_millis(get_u64(
                props,
                "commit.retry.min-wait-ms",
                DEFAULT_COMMIT_MIN_WAIT_MS,
            )),
            max_wait: Duration::from_millis(get_u64(
                props,
                "commit.retry.max-wait-ms",
                DEFAULT_COMMIT_MAX_WAIT_MS,
            )),
            jitter: get_f64(props, "commit.retry.jitter", DEFAULT_COMMIT_JITTER),
        }
    }
}

/// Metadata-log / version-file retention tunables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetadataRetention {
    /// Maximum number of entries kept in `metadata-log`.
    pub previous_versions_max: u32,
    /// Whether old metadata files are physically deleted after a commit.
    pub delete_after_commit: bool,
}

impl Default for MetadataRetention {
    fn default() -> Self {
        MetadataRetention {
            previous_versions_max: DEFAULT_METADATA_PREVIOUS_VERSIONS_MAX,
            delete_after_commit: false,
        }
    }
}

impl MetadataRetention {
    /// Parse a [`MetadataRetention`] out of a table's `properties` map.
    pub fn from_properties(props: &HashMap<String, String>) -> Self {
        MetadataRetention {
            previous_versions_max: get_u32(
                props,
                "metadata.previous-versions-max",
                DEFAULT_METADATA_PREVIOUS_VERSIONS_MAX,
            ),
            delete_after_commit: get_bool(props, "metadata.delete-after-commit.enabled", false),
        }
    }
}

/// Snapshot expiry policy, read from `history.expire.*` properties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotRetention {
    /// Maximum age, in ms, of a snapshot kept purely by age.
    pub max_snapshot_age_ms: Option<i64>,
    /// Minimum number of snapshots kept per branch regardless of age.
    pub min_snapshots_to_keep: u32,
}

impl Default for SnapshotRetention {
    fn default() -> Self {
        SnapshotRetention {
            max_snapshot_age_ms: Some(5 * 24 * 60 * 60 * 1000),
            min_snapshots_to_keep: 1,
        }
    }
}

impl SnapshotRetention {
    /// Parse a [`SnapshotRetention`] out of a table's `properties` map.
    pub fn from_properties(props: &HashMap<String, String>) -> Self {
        SnapshotRetention {
            max_snapshot_age_ms: props
                .get("history.expire.max-snapshot-age-ms")
                .and_then(|v| v.parse().ok()),
            min_snapshots_to_keep: get_u32(props, "history.expire.min-snapshots-to-keep", 1),
        }
    }
}

/// Write-side tunables consumed by manifest/file writers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteProperties {
    /// `write.format.default`, defaults to `"parquet"`.
    pub default_format: String,
    /// `write.parquet.compression-codec`.
    pub parquet_compression_codec: Option<String>,
    /// `write.target-file-size-bytes`.
    pub target_file_size_bytes: Option<u64>,
    /// `write.metadata.compression-codec`.
    pub metadata_compression_codec: Option<String>,
    /// `commit.manifest.target-size-bytes`.
    pub manifest_target_size_bytes: Option<u64>,
    /// `commit.manifest.min-count-to-merge`.
    pub manifest_min_count_to_merge: Option<u32>,
}

impl Default for WriteProperties {
    fn default() -> Self {
        WriteProperties {
            default_format: "parquet".to_string(),
            parquet_compression_codec: None,
            target_file_size_bytes: None,
            metadata_compression_codec: None,
            manifest_target_size_bytes: None,
            manifest_min_count_to_merge: None,
        }
    }
}

impl WriteProperties {
    /// Parse [`WriteProperties`] out of a table's `properties` map.
    pub fn from_properties(props: &HashMap<String, String>) -> Self {
        WriteProperties {
            default_format: props
                .get("write.format.default")
                .cloned()
                .unwrap_or_else(|| "parquet".to_string()),
            parquet_compression_codec: props.get("write.parquet.compression-codec").cloned(),
            target_file_size_bytes: props
                .get("write.target-file-size-bytes")
                .and_then(|v| v.parse().ok()),
            metadata_compression_codec: props.get("write.metadata.compression-codec").cloned(),
            manifest_target_size_bytes: props
                .get("commit.manifest.target-size-bytes")
                .and_then(|v| v.parse().ok()),
            manifest_min_count_to_merge: props
                .get("commit.manifest.min-count-to-merge")
                .and_then(|v| v.parse().ok()),
        }
    }
}

/// Convenience wrapper bundling every typed property view this crate reads.
#[derive(Debug, Clone, PartialEq)]
pub struct TableProperties {
    /// Commit retry tunables.
    pub retry: RetryPolicy,
    /// Metadata log retention.
    pub metadata_retention: MetadataRetention,
    /// Snapshot expiry policy.
    pub snapshot_retention: SnapshotRetention,
    /// Write-side tunables.
    pub write: WriteProperties,
}

impl TableProperties {
    /// Parse every typed sub-view out of a table's `properties` map.
    pub fn from_properties(props: &HashMap<String, String>) -> Self {
        TableProperties {
            retry: RetryPolicy::from_properties(props),
            metadata_retention: MetadataRetention::from_properties(props),
            snapshot_retention: SnapshotRetention::from_properties(props),
            write: WriteProperties::from_properties(props),
        }
    }

    /// Jittered, capped backoff for a given retry attempt, where
    /// `attempt` is 0-based (0 is the second try, i.e. the first retry).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.retry.min_wait.as_millis() as f64 * 2f64.powi(attempt as i32);
        let capped = base.min(self.retry.max_wait.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_absent() {
        let props = HashMap::new();
        let retry = RetryPolicy::from_properties(&props);
        assert_eq!(retry.num_retries, DEFAULT_COMMIT_NUM_RETRIES);
        assert_eq!(retry.min_wait, Duration::from_millis(100));
        assert_eq!(retry.max_wait, Duration::from_millis(5_000));
    }

    #[test]
    fn test_overrides() {
        let mut props = HashMap::new();
        props.insert("commit.retry.num-retries".to_string(), "3".to_string());
        props.insert("history.expire.min-snapshots-to-keep".to_string(), "7".to_string());
        let t = TableProperties::from_properties(&props);
        assert_eq!(t.retry.num_retries, 3);
        assert_eq!(t.snapshot_retention.min_snapshots_to_keep, 7);
    }

    #[test]
    fn test_backoff_caps_at_max_wait() {
        let t = TableProperties::from_properties(&HashMap::new());
        assert_eq!(t.backoff_for_attempt(0), Duration::from_millis(100));
        assert_eq!(t.backoff_for_attempt(20), t.retry.max_wait);
    }
}
