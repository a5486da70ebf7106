use super::models::*;
use super::sqlite::Database;
use super::TreeStore;
use crate::analysis::aggregate::{self, AggregateReport};
use rusqlite::{params, Result, Row};
use tracing::{debug, trace};

const NODE_COLUMNS: &str = "n.id, n.path, n.name, n.node_type, n.size, n.node_count, \
                            n.parent_id, n.last_modified, n.last_scanned";

fn node_from_row(row: &Row<'_>) -> Result<Node> {
    let node_type: String = row.get(3)?;
    Ok(Node {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        node_type: NodeType::parse_lossy(&node_type),
        size: row.get(4)?,
        node_count: row.get(5)?,
        parent_id: row.get(6)?,
        last_modified: row.get(7)?,
        last_scanned: row.get(8)?,
    })
}

fn subtree_entry_from_row(row: &Row<'_>) -> Result<SubtreeEntry> {
    Ok(SubtreeEntry {
        node: node_from_row(row)?,
        depth: row.get(9)?,
    })
}

impl TreeStore for Database {
    fn truncate_tree(&self) -> crate::Result<()> {
        let tx = self.connection().unchecked_transaction()?;
        tx.execute_batch(
            "DELETE FROM fs_closure;
             DELETE FROM fs_node;
             DELETE FROM sqlite_sequence WHERE name = 'fs_node';",
        )?;
        tx.commit()?;
        debug!("Node and closure tables truncated");
        Ok(())
    }

    fn insert_node(&self, node: &NewNode<'_>, ancestors: &[ClosureLink]) -> crate::Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        let tx = self.connection().unchecked_transaction()?;
        let node_id = {
            let mut node_stmt = tx.prepare_cached(
                "INSERT INTO fs_node \
                 (path, name, node_type, size, node_count, parent_id, last_modified, last_scanned) \
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?7) \
                 ON CONFLICT(path) DO NOTHING",
            )?;
            let inserted = node_stmt.execute(params![
                node.path,
                node.name,
                node.node_type.as_str(),
                node.size,
                node.parent_id,
                node.last_modified,
                now,
            ])?;
            if inserted == 0 {
                // Persisted by a chunk whose queue snapshot was never saved.
                let existing: i64 = tx.query_row(
                    "SELECT id FROM fs_node WHERE path = ?1",
                    params![node.path],
                    |row| row.get(0),
                )?;
                debug!("Node {} already persisted as {}, reusing it", node.path, existing);
                existing
            } else {
                tx.last_insert_rowid()
            }
        };
        {
            let mut closure_stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO fs_closure (ancestor, descendant, depth) VALUES (?1, ?2, ?3)",
            )?;
            for link in ancestors {
                closure_stmt.execute(params![link.ancestor_id, node_id, link.depth])?;
            }
            if node.node_type.is_dir() {
                closure_stmt.execute(params![node_id, node_id, 0])?;
            }
        }
        tx.commit()?;
        trace!(
            "Inserted node {} ({}) with {} ancestor rows",
            node_id,
            node.path,
            ancestors.len()
        );
        Ok(node_id)
    }

    fn count_nodes(&self) -> crate::Result<i64> {
        let count = self
            .connection()
            .query_row("SELECT COUNT(*) FROM fs_node", [], |row| row.get(0))?;
        Ok(count)
    }

    fn recompute_aggregates(&self) -> crate::Result<AggregateReport> {
        aggregate::recompute_directory_aggregates(self)
    }
}

impl Database {
    // ── Node lookups ─────────────────────────────────────────────

    pub fn get_node(&self, id: i64) -> Result<Option<Node>> {
        match self.connection().query_row(
            &format!("SELECT {NODE_COLUMNS} FROM fs_node n WHERE n.id = ?1"),
            params![id],
            node_from_row,
        ) {
            Ok(node) => Ok(Some(node)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn get_node_by_path(&self, path: &str) -> Result<Option<Node>> {
        match self.connection().query_row(
            &format!("SELECT {NODE_COLUMNS} FROM fs_node n WHERE n.path = ?1"),
            params![path],
            node_from_row,
        ) {
            Ok(node) => Ok(Some(node)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn node_id_by_path(&self, path: &str) -> Result<Option<i64>> {
        match self.connection().query_row(
            "SELECT id FROM fs_node WHERE path = ?1",
            params![path],
            |row| row.get(0),
        ) {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The scan root: the first node without a parent.
    pub fn root_node(&self) -> Result<Option<Node>> {
        match self.connection().query_row(
            &format!(
                "SELECT {NODE_COLUMNS} FROM fs_node n \
                 WHERE n.parent_id IS NULL ORDER BY n.id LIMIT 1"
            ),
            [],
            node_from_row,
        ) {
            Ok(node) => Ok(Some(node)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ── Closure queries ──────────────────────────────────────────

    /// Every node below `ancestor_id` (itself included when it is a directory),
    /// ordered by depth then name. One join, whatever the shape of the tree.
    pub fn get_subtree(&self, ancestor_id: i64, max_depth: Option<u32>) -> Result<Vec<SubtreeEntry>> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {NODE_COLUMNS}, c.depth \
             FROM fs_closure c \
             JOIN fs_node n ON n.id = c.descendant \
             WHERE c.ancestor = ?1 AND (?2 IS NULL OR c.depth <= ?2) \
             ORDER BY c.depth, n.name"
        ))?;

        let entries = stmt
            .query_map(params![ancestor_id, max_depth], subtree_entry_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Immediate children of a directory, ordered by name.
    pub fn get_children(&self, parent_id: i64) -> Result<Vec<Node>> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {NODE_COLUMNS} \
             FROM fs_closure c \
             JOIN fs_node n ON n.id = c.descendant \
             WHERE c.ancestor = ?1 AND c.depth = 1 \
             ORDER BY n.name"
        ))?;

        let nodes = stmt
            .query_map(params![parent_id], node_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(nodes)
    }

    /// Ancestors of a node, root first. `depth` is the distance down to the node.
    pub fn get_ancestors(&self, descendant_id: i64) -> Result<Vec<SubtreeEntry>> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {NODE_COLUMNS}, c.depth \
             FROM fs_closure c \
             JOIN fs_node n ON n.id = c.ancestor \
             WHERE c.descendant = ?1 AND c.depth > 0 \
             ORDER BY c.depth DESC"
        ))?;

        let entries = stmt
            .query_map(params![descendant_id], subtree_entry_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn closure_rows_for_ancestor(&self, ancestor_id: i64) -> Result<Vec<ClosureRow>> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT ancestor, descendant, depth FROM fs_closure \
             WHERE ancestor = ?1 ORDER BY depth, descendant",
        )?;

        let rows = stmt
            .query_map(params![ancestor_id], |row| {
                Ok(ClosureRow {
                    ancestor: row.get(0)?,
                    descendant: row.get(1)?,
                    depth: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_closure_rows(&self) -> Result<i64> {
        self.connection()
            .query_row("SELECT COUNT(*) FROM fs_closure", [], |row| row.get(0))
    }

    // ── Search ───────────────────────────────────────────────────

    /// Path search. Non-exact queries use SQL `LIKE`; a query without `%` or
    /// `_` matches anywhere in the path.
    pub fn search_by_path(&self, query: &str, exact: bool, limit: i64) -> Result<Vec<Node>> {
        let (sql, pattern) = if exact {
            (
                format!("SELECT {NODE_COLUMNS} FROM fs_node n WHERE n.path = ?1 ORDER BY n.path LIMIT ?2"),
                query.to_string(),
            )
        } else {
            let pattern = if query.contains('%') || query.contains('_') {
                query.to_string()
            } else {
                format!("%{query}%")
            };
            (
                format!("SELECT {NODE_COLUMNS} FROM fs_node n WHERE n.path LIKE ?1 ORDER BY n.path LIMIT ?2"),
                pattern,
            )
        };

        let mut stmt = self.connection().prepare(&sql)?;
        let nodes = stmt
            .query_map(params![pattern, limit], node_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(nodes)
    }
}
