use treeclosure_core::kv::KvStore;
use treeclosure_core::storage::models::*;
use treeclosure_core::storage::{Database, TreeStore};
use treeclosure_core::tree::build_nested_tree;

fn new_node<'a>(path: &'a str, name: &'a str, node_type: NodeType, size: i64, parent_id: Option<i64>) -> NewNode<'a> {
    NewNode {
        path,
        name,
        node_type,
        size,
        last_modified: 1700000000,
        parent_id,
    }
}

fn link(ancestor_id: i64, depth: u32) -> ClosureLink {
    ClosureLink { ancestor_id, depth }
}

/// Layout:
///   /r            (1)
///     a.txt  10   (2)
///     b/          (3)
///       c.txt 5   (4)
///     empty/      (5)
fn seed_tree(db: &Database) {
    let root = db.insert_node(&new_node("/r", "r", NodeType::Dir, 0, None), &[]).unwrap();
    assert_eq!(root, 1);
    db.insert_node(&new_node("/r/a.txt", "a.txt", NodeType::File, 10, Some(1)), &[link(1, 1)])
        .unwrap();
    db.insert_node(&new_node("/r/b", "b", NodeType::Dir, 0, Some(1)), &[link(1, 1)])
        .unwrap();
    db.insert_node(
        &new_node("/r/b/c.txt", "c.txt", NodeType::File, 5, Some(3)),
        &[link(1, 2), link(3, 1)],
    )
    .unwrap();
    db.insert_node(&new_node("/r/empty", "empty", NodeType::Dir, 0, Some(1)), &[link(1, 1)])
        .unwrap();
}

#[test]
fn test_insert_writes_self_rows_for_directories_only() {
    let db = Database::open_in_memory().unwrap();
    seed_tree(&db);

    assert_eq!(db.count_nodes().unwrap(), 5);
    // 3 directory self-rows + 5 ancestor rows
    assert_eq!(db.count_closure_rows().unwrap(), 8);

    let self_rows: Vec<i64> = db
        .connection()
        .prepare("SELECT ancestor FROM fs_closure WHERE depth = 0 ORDER BY ancestor")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(self_rows, vec![1, 3, 5]);

    let rows = db.closure_rows_for_ancestor(1).unwrap();
    let depths: Vec<(i64, i64)> = rows.iter().map(|r| (r.descendant, r.depth)).collect();
    assert_eq!(depths, vec![(1, 0), (2, 1), (3, 1), (5, 1), (4, 2)]);
}

#[test]
fn test_provisional_values_before_aggregation() {
    let db = Database::open_in_memory().unwrap();
    seed_tree(&db);

    let root = db.get_node(1).unwrap().unwrap();
    assert_eq!(root.node_count, 1);
    assert_eq!(root.size, 0);
    let file = db.get_node(2).unwrap().unwrap();
    assert_eq!(file.size, 10);
    assert_eq!(file.node_count, 1);
}

#[test]
fn test_failed_insert_leaves_no_partial_rows() {
    let db = Database::open_in_memory().unwrap();
    seed_tree(&db);
    let before = db.count_closure_rows().unwrap();

    // Ancestor 99 does not exist, so the closure insert violates the foreign key.
    let result = db.insert_node(
        &new_node("/r/b/d.txt", "d.txt", NodeType::File, 1, Some(3)),
        &[link(1, 2), link(99, 1)],
    );
    assert!(result.is_err());
    assert_eq!(db.count_nodes().unwrap(), 5);
    assert_eq!(db.count_closure_rows().unwrap(), before);
    assert!(db.node_id_by_path("/r/b/d.txt").unwrap().is_none());
}

#[test]
fn test_reinserting_a_stored_path_reuses_its_id() {
    let db = Database::open_in_memory().unwrap();
    seed_tree(&db);
    db.connection()
        .execute("DELETE FROM fs_closure WHERE ancestor = 3 AND descendant = 4", [])
        .unwrap();
    assert_eq!(db.count_closure_rows().unwrap(), 7);

    let id = db
        .insert_node(
            &new_node("/r/b/c.txt", "c.txt", NodeType::File, 5, Some(3)),
            &[link(1, 2), link(3, 1)],
        )
        .unwrap();
    assert_eq!(id, 4);
    let dir_id = db.insert_node(&new_node("/r/b", "b", NodeType::Dir, 0, Some(1)), &[link(1, 1)]).unwrap();
    assert_eq!(dir_id, 3);

    assert_eq!(db.count_nodes().unwrap(), 5);
    assert_eq!(db.count_closure_rows().unwrap(), 8);
}

#[test]
fn test_aggregation_counts_descendants_and_sums_file_sizes() {
    let db = Database::open_in_memory().unwrap();
    seed_tree(&db);

    let report = db.recompute_aggregates().unwrap();
    assert_eq!(report.directories_updated, 2);
    assert_eq!(report.failed_updates, 0);

    let root = db.get_node(1).unwrap().unwrap();
    assert_eq!(root.node_count, 4);
    assert_eq!(root.size, 15);
    let b = db.get_node(3).unwrap().unwrap();
    assert_eq!(b.node_count, 1);
    assert_eq!(b.size, 5);
    let empty = db.get_node(5).unwrap().unwrap();
    assert_eq!(empty.node_count, 0);
    assert_eq!(empty.size, 0);
}

#[test]
fn test_aggregation_is_idempotent() {
    let db = Database::open_in_memory().unwrap();
    seed_tree(&db);

    db.recompute_aggregates().unwrap();
    let first: Vec<(i64, i64)> = (1..=5)
        .map(|id| {
            let n = db.get_node(id).unwrap().unwrap();
            (n.node_count, n.size)
        })
        .collect();

    db.recompute_aggregates().unwrap();
    let second: Vec<(i64, i64)> = (1..=5)
        .map(|id| {
            let n = db.get_node(id).unwrap().unwrap();
            (n.node_count, n.size)
        })
        .collect();
    assert_eq!(first, second);
}

#[test]
fn test_truncate_tree_restarts_ids() {
    let db = Database::open_in_memory().unwrap();
    seed_tree(&db);

    db.truncate_tree().unwrap();
    assert_eq!(db.count_nodes().unwrap(), 0);
    assert_eq!(db.count_closure_rows().unwrap(), 0);
    assert!(db.root_node().unwrap().is_none());

    let id = db.insert_node(&new_node("/x", "x", NodeType::Dir, 0, None), &[]).unwrap();
    assert_eq!(id, 1);
}

#[test]
fn test_truncate_all_also_clears_kv_store() {
    let db = Database::open_in_memory().unwrap();
    seed_tree(&db);
    db.set("treeclosure_scanner_status", b"{}").unwrap();

    db.truncate_all().unwrap();
    assert_eq!(db.count_nodes().unwrap(), 0);
    assert!(db.get("treeclosure_scanner_status").unwrap().is_none());
}

#[test]
fn test_lookup_by_path_and_root() {
    let db = Database::open_in_memory().unwrap();
    seed_tree(&db);

    assert_eq!(db.node_id_by_path("/r/b").unwrap(), Some(3));
    assert_eq!(db.node_id_by_path("/nope").unwrap(), None);
    let c = db.get_node_by_path("/r/b/c.txt").unwrap().unwrap();
    assert_eq!(c.parent_id, Some(3));
    assert_eq!(c.node_type, NodeType::File);
    assert_eq!(db.root_node().unwrap().unwrap().path, "/r");
    assert!(db.get_node(42).unwrap().is_none());
}

#[test]
fn test_subtree_children_and_ancestors() {
    let db = Database::open_in_memory().unwrap();
    seed_tree(&db);

    let full = db.get_subtree(1, None).unwrap();
    assert_eq!(full.len(), 5);
    assert_eq!(full[0].node.id, 1);
    assert_eq!(full[0].depth, 0);
    assert_eq!(full.last().unwrap().node.path, "/r/b/c.txt");

    let shallow = db.get_subtree(1, Some(1)).unwrap();
    assert_eq!(shallow.len(), 4);
    assert!(shallow.iter().all(|e| e.depth <= 1));

    let children: Vec<String> = db.get_children(1).unwrap().into_iter().map(|n| n.name).collect();
    assert_eq!(children, vec!["a.txt", "b", "empty"]);
    assert!(db.get_children(2).unwrap().is_empty());

    let ancestors = db.get_ancestors(4).unwrap();
    let chain: Vec<(i64, i64)> = ancestors.iter().map(|e| (e.node.id, e.depth)).collect();
    assert_eq!(chain, vec![(1, 2), (3, 1)]);
    assert!(db.get_ancestors(1).unwrap().is_empty());
}

#[test]
fn test_nested_tree_from_subtree() {
    let db = Database::open_in_memory().unwrap();
    seed_tree(&db);

    let tree = build_nested_tree(db.get_subtree(1, None).unwrap()).unwrap();
    assert_eq!(tree.len(), 5);
    let b = tree.children.iter().find(|c| c.node.name == "b").unwrap();
    assert_eq!(b.children.len(), 1);
    assert_eq!(b.children[0].node.name, "c.txt");

    // A file has no self-row, so it cannot root a subtree.
    assert!(build_nested_tree(db.get_subtree(2, None).unwrap()).is_none());
}

#[test]
fn test_search_by_path_substring_wildcard_and_exact() {
    let db = Database::open_in_memory().unwrap();
    seed_tree(&db);

    let hits: Vec<String> = db
        .search_by_path("c.txt", false, 10)
        .unwrap()
        .into_iter()
        .map(|n| n.path)
        .collect();
    assert_eq!(hits, vec!["/r/b/c.txt"]);

    let wildcard = db.search_by_path("/r/%.txt", false, 10).unwrap();
    assert_eq!(wildcard.len(), 2);

    let limited = db.search_by_path("/r", false, 2).unwrap();
    assert_eq!(limited.len(), 2);

    let exact = db.search_by_path("/r/b", true, 10).unwrap();
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].id, 3);
    assert!(db.search_by_path("/r/", true, 10).unwrap().is_empty());
}

#[test]
fn test_schema_survives_reopen_on_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("tree.db");
    let path_str = path.to_str().unwrap();
    {
        let db = Database::open(path_str).unwrap();
        seed_tree(&db);
    }
    let db = Database::open(path_str).unwrap();
    assert_eq!(db.count_nodes().unwrap(), 5);
    assert_eq!(db.count_closure_rows().unwrap(), 8);
}
