/*!
The external catalog collaborator boundary (spec.md §4.8): an optional
second CAS path for backends (most object stores) that cannot offer
`put_if_absent` themselves and instead delegate the atomic pointer swap to
a catalog service (a metastore, a REST catalog, a database row with a
compare-and-set update).

Trimmed from the teacher's broader `catalog::Catalog` (which also builds
and drops tables via `TableBuilder`/`TableIdentifier`/`Namespace`): table
lifecycle management beyond the commit swap itself is out of scope here,
so only the one method the commit engine actually needs survives.
*/
use async_trait::async_trait;

use crate::error::Result;

/// A catalog's view of where a table's current metadata lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTable {
    /// Fully-qualified table name as the catalog tracks it, e.g.
    /// `"db.orders"`.
    pub identifier: String,
    /// Location of the table's current metadata file, or `None` if the
    /// catalog has no record of this table yet.
    pub metadata_location: Option<String>,
}

/// External collaborator a [`super::commit::engine`] commit can delegate
/// its compare-and-set to, instead of relying on the storage backend's own
/// `put_if_absent`. Implementations must make `commit` atomic with respect
/// to concurrent callers racing on the same `identifier`.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Look up a table's current metadata location, if the catalog knows
    /// about it.
    async fn load_table(&self, identifier: &str) -> Result<Option<CatalogTable>>;

    /// Atomically advance `identifier`'s metadata pointer from
    /// `previous_metadata_location` (`None` for table creation) to
    /// `new_metadata_location`. Must fail with
    /// [`crate::error::IcebergError::CommitConflict`] if the catalog's
    /// current pointer does not match `previous_metadata_location`.
    async fn commit(
        &self,
        identifier: &str,
        previous_metadata_location: Option<&str>,
        new_metadata_location: &str,
    ) -> Result<()>;

    /// Remove a table's catalog entry. Does not touch its underlying
    /// files.
    async fn drop_table(&self, identifier: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::error::IcebergError;

    #[derive(Default)]
    struct MemoryCatalog {
        tables: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl Catalog for MemoryCatalog {
        async fn load_table(&self, identifier: &str) -> Result<Option<CatalogTable>> {
            Ok(self.tables.lock().unwrap().get(identifier).map(|location| CatalogTable {
                identifier: identifier.to_string(),
                metadata_location: Some(location.clone()),
            }))
        }

        async fn commit(
            &self,
            identifier: &str,
            previous_metadata_location: Option<&str>,
            new_metadata_location: &str,
        ) -> Result<()> {
            let mut tables = self.tables.lock().unwrap();
            let current = tables.get(identifier).map(|s| s.as_str());
            if current != previous_metadata_location {
                return Err(IcebergError::CommitConflict(format!(
                    "catalog pointer for '{identifier}' is {current:?}, expected {previous_metadata_location:?}"
                )));
            }
            tables.insert(identifier.to_string(), new_metadata_location.to_string());
            Ok(())
        }

        async fn drop_table(&self, identifier: &str) -> Result<()> {
            self.tables.lock().unwrap().remove(identifier);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_create_then_conflicting_commit_rejected() {
        let catalog = MemoryCatalog::default();
        catalog.commit("db.t", None, "s3://b/t/metadata/v1.metadata.json").await.unwrap();
        let err = catalog.commit("db.t", None, "s3://b/t/metadata/v2.metadata.json").await.unwrap_err();
        assert!(matches!(err, IcebergError::CommitConflict(_)));
    }

    #[tokio::test]
    async fn test_commit_advances_pointer() {
        let catalog = MemoryCatalog::default();
        catalog.commit("db.t", None, "s3://b/t/metadata/v1.metadata.json").await.unwrap();
        catalog
            .commit("db.t", Some("s3://b/t/metadata/v1.metadata.json"), "s3://b/t/metadata/v2.metadata.json")
            .await
            .unwrap();
        let loaded = catalog.load_table("db.t").await.unwrap().unwrap();
        assert_eq!(loaded.metadata_location.as_deref(), Some("s3://b/t/metadata/v2.metadata.json"));
    }

    #[tokio::test]
    async fn test_drop_table_clears_entry() {
        let catalog = MemoryCatalog::default();
        catalog.commit("db.t", None, "s3://b/t/metadata/v1.metadata.json").await.unwrap();
        catalog.drop_table("db.t").await.unwrap();
        assert!(catalog.load_table("db.t").await.unwrap().is_none());
    }
}
