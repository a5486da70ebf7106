use crate::storage::Database;
use rusqlite::{params, Connection};
use std::time::Instant;
use tracing::{debug, error, info};

/// Totals for one directory, over every descendant except itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryAggregate {
    pub directory_id: i64,
    pub node_count: i64,
    pub size: i64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AggregateReport {
    pub directories_updated: usize,
    pub failed_updates: usize,
    pub emptied_directories: usize,
}

/// One grouped query over the closure table.
///
/// Every persisted node counts once, which equals summing the provisional
/// `node_count = 1` written at insert time. Sizes come from non-directory
/// descendants only (directories hold 0 until aggregated), so running the
/// pass twice yields the same values.
pub fn collect_directory_aggregates(conn: &Connection) -> rusqlite::Result<Vec<DirectoryAggregate>> {
    let mut stmt = conn.prepare(
        "SELECT c.ancestor, \
                COUNT(*), \
                COALESCE(SUM(CASE WHEN d.node_type = 'dir' THEN 0 ELSE d.size END), 0) \
         FROM fs_closure c \
         JOIN fs_node a ON a.id = c.ancestor \
         JOIN fs_node d ON d.id = c.descendant \
         WHERE a.node_type = 'dir' AND c.depth > 0 \
         GROUP BY c.ancestor",
    )?;

    let aggregates = stmt
        .query_map([], |row| {
            Ok(DirectoryAggregate {
                directory_id: row.get(0)?,
                node_count: row.get(1)?,
                size: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(aggregates)
}

/// Recompute directory aggregates after the queue drains.
///
/// Algorithm:
/// 1. Collect (count, size) per directory from the closure table
/// 2. Apply the updates in one transaction; a failing row is logged and skipped
/// 3. Directories with no descendant rows (only their self-row) are forced to 0/0
pub fn recompute_directory_aggregates(db: &Database) -> Result<AggregateReport, crate::Error> {
    let start = Instant::now();
    let aggregates = collect_directory_aggregates(db.connection())?;
    debug!("Collected aggregates for {} directories", aggregates.len());

    let mut report = AggregateReport::default();
    let tx = db.connection().unchecked_transaction()?;
    {
        let mut update_stmt = tx.prepare_cached(
            "UPDATE fs_node SET node_count = ?1, size = ?2 WHERE id = ?3",
        )?;
        for aggregate in &aggregates {
            match update_stmt.execute(params![
                aggregate.node_count,
                aggregate.size,
                aggregate.directory_id
            ]) {
                Ok(_) => report.directories_updated += 1,
                Err(e) => {
                    error!(
                        "Failed to update aggregates for directory {}: {}",
                        aggregate.directory_id, e
                    );
                    report.failed_updates += 1;
                }
            }
        }
    }

    match tx.execute(
        "UPDATE fs_node SET node_count = 0, size = 0 \
         WHERE node_type = 'dir' \
           AND id NOT IN (SELECT ancestor FROM fs_closure WHERE depth > 0)",
        [],
    ) {
        Ok(emptied) => report.emptied_directories = emptied,
        Err(e) => error!("Failed to zero aggregates of empty directories: {}", e),
    }
    tx.commit()?;

    info!(
        "Aggregates recomputed in {:.2}s: {} directories, {} empty, {} failed",
        start.elapsed().as_secs_f64(),
        report.directories_updated,
        report.emptied_directories,
        report.failed_updates,
    );
    Ok(report)
}
