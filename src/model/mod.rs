/*!
The Iceberg table-metadata object model: types, schemas, partition specs,
sort orders, snapshots, table metadata, manifests and manifest lists.
*/
pub mod decimal;
pub mod manifest;
pub mod manifest_list;
pub mod partition;
pub mod schema;
pub mod snapshot;
pub mod sort;
pub mod table_metadata;
pub mod types;
