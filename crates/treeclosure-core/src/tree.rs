use crate::storage::models::{Node, SubtreeEntry};
use ahash::AHashMap;
use serde::Serialize;

/// A node with its children nested below it, for tree output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub node: Node,
    pub depth: i64,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Number of nodes in this subtree, itself included.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(TreeNode::len).sum::<usize>()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn sort_children(&mut self) {
        self.children.sort_by(|a, b| a.node.name.cmp(&b.node.name));
        for child in &mut self.children {
            child.sort_children();
        }
    }
}

/// Nests a flat subtree listing (as returned by `Database::get_subtree`)
/// under its depth-0 entry. Returns `None` when there is no depth-0 entry,
/// which is the case for a file queried as a subtree root.
///
/// Entries must be ordered by depth so every parent precedes its children.
pub fn build_nested_tree(entries: Vec<SubtreeEntry>) -> Option<TreeNode> {
    let root_id = entries.iter().find(|e| e.depth == 0)?.node.id;

    let mut index_by_id: AHashMap<i64, usize> = AHashMap::with_capacity(entries.len());
    let mut slots: Vec<Option<TreeNode>> = Vec::with_capacity(entries.len());
    for entry in entries {
        index_by_id.insert(entry.node.id, slots.len());
        slots.push(Some(TreeNode {
            node: entry.node,
            depth: entry.depth,
            children: Vec::new(),
        }));
    }

    // Deepest first, so each child is complete before it moves into its parent.
    for index in (0..slots.len()).rev() {
        let parent_index = match slots[index].as_ref() {
            Some(tree) if tree.node.id != root_id => tree
                .node
                .parent_id
                .and_then(|parent_id| index_by_id.get(&parent_id).copied()),
            _ => None,
        };
        let Some(parent_index) = parent_index else {
            continue;
        };
        if let Some(child) = slots[index].take() {
            if let Some(parent) = slots[parent_index].as_mut() {
                parent.children.push(child);
            }
        }
    }

    let root_index = index_by_id.get(&root_id).copied()?;
    let mut root = slots[root_index].take()?;
    root.sort_children();
    Some(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::NodeType;

    fn entry(id: i64, name: &str, node_type: NodeType, parent_id: Option<i64>, depth: i64) -> SubtreeEntry {
        SubtreeEntry {
            node: Node {
                id,
                path: format!("/r/{name}"),
                name: name.to_string(),
                node_type,
                size: 0,
                node_count: 1,
                parent_id,
                last_modified: None,
                last_scanned: String::new(),
            },
            depth,
        }
    }

    #[test]
    fn test_nests_entries_under_their_parents() {
        let entries = vec![
            entry(1, "r", NodeType::Dir, None, 0),
            entry(3, "b", NodeType::Dir, Some(1), 1),
            entry(2, "a.txt", NodeType::File, Some(1), 1),
            entry(4, "c.txt", NodeType::File, Some(3), 2),
        ];

        let tree = build_nested_tree(entries).unwrap();
        assert_eq!(tree.node.id, 1);
        assert_eq!(tree.len(), 4);
        let names: Vec<&str> = tree.children.iter().map(|c| c.node.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b"]);
        assert!(tree.children[0].is_leaf());
        assert_eq!(tree.children[1].children[0].node.id, 4);
        assert_eq!(tree.children[1].children[0].depth, 2);
    }

    #[test]
    fn test_subtree_root_with_parent_stays_root() {
        let entries = vec![
            entry(3, "b", NodeType::Dir, Some(1), 0),
            entry(4, "c.txt", NodeType::File, Some(3), 1),
        ];
        let tree = build_nested_tree(entries).unwrap();
        assert_eq!(tree.node.id, 3);
        assert_eq!(tree.children.len(), 1);
    }

    #[test]
    fn test_no_depth_zero_entry_yields_none() {
        assert!(build_nested_tree(Vec::new()).is_none());
        let entries = vec![entry(4, "c.txt", NodeType::File, Some(3), 1)];
        assert!(build_nested_tree(entries).is_none());
    }

    #[test]
    fn test_nested_tree_serializes_flat_node_fields() {
        let tree = build_nested_tree(vec![entry(1, "r", NodeType::Dir, None, 0)]).unwrap();
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["type"], "dir");
        assert_eq!(json["depth"], 0);
        assert!(json["children"].as_array().unwrap().is_empty());
    }
}
