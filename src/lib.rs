/*!
A Rust implementation of the core Apache Iceberg table format: the metadata
state machine and atomic commit protocol, schema/partition-spec/sort-order
evolution, and the manifest and statistics layer (bloom filters, deletion
vectors, zone-map pruning).

This crate is deliberately scoped to the table-format core. It does not ship
a catalog client, a REST service, or a query engine; [`catalog::Catalog`] is
the narrow trait a host application implements to plug its own catalog in.
*/
#![warn(missing_docs)]

pub mod bloom;
pub mod catalog;
pub mod commit;
pub mod config;
pub mod deletes;
pub mod error;
pub mod evolution;
pub mod hash;
pub mod model;
pub mod snapshot_builder;
pub mod stats;
pub mod transform;
pub mod util;
pub mod variant;

pub use error::{IcebergError, Result};
