/*!
Column statistics and zone-map pruning (spec.md §4.5): the per-type
comparator, the binary bound encoding shared by manifests and
manifest-lists, the per-column collector used while writing a data file,
and the `canPrune` predicate used while planning a read.
*/
pub mod collector;
pub mod comparator;
pub mod encode;
pub mod pruning;

pub use collector::ColumnStatsCollector;
pub use comparator::compare_values;
pub use encode::{decode_bound, encode_bound};
pub use pruning::{can_prune, Predicate, ZoneMap};
