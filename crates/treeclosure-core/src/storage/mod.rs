pub mod models;
pub mod queries;
pub mod sqlite;

pub use sqlite::Database;

use crate::analysis::aggregate::AggregateReport;
use crate::error::Result;
use models::{ClosureLink, NewNode};

/// Write side of the closure-table store, as driven by the chunked scanner.
pub trait TreeStore {
    /// Empties the node and closure tables. Node ids restart from 1.
    fn truncate_tree(&self) -> Result<()>;

    /// Inserts one node and its closure rows in a single transaction and
    /// returns the new node id. Directories also get their self-row.
    /// Nothing is written when any statement fails. Inserting a path that is
    /// already stored returns the existing id and only adds missing closure rows.
    fn insert_node(&self, node: &NewNode<'_>, ancestors: &[ClosureLink]) -> Result<i64>;

    fn count_nodes(&self) -> Result<i64>;

    /// Recomputes directory node counts and sizes from the closure table.
    fn recompute_aggregates(&self) -> Result<AggregateReport>;
}
