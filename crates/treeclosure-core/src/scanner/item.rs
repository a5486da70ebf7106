use super::fs::ChildEntry;
use crate::storage::models::NodeType;
use serde::{Deserialize, Serialize};

/// Index of an ancestor record inside the queue's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemHandle(pub(crate) u32);

impl ItemHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A persisted directory that queued items may hang below.
///
/// Registered only after the directory's node row exists, so `record_id` is
/// set in practice; closure inserts still skip ancestors without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestorRecord {
    pub path: String,
    pub depth: u32,
    pub record_id: Option<i64>,
}

/// One filesystem entry waiting to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub path: String,
    pub name: String,
    pub node_type: NodeType,
    /// Levels below the scan root.
    pub depth: u32,
    /// The immediate parent; `None` only for the root.
    pub parent: Option<ItemHandle>,
    /// Root first, parent last.
    pub ancestors: Vec<ItemHandle>,
    pub size: u64,
    pub last_modified: i64,
    pub retry_budget: u8,
    pub record_id: Option<i64>,
}

impl QueueItem {
    pub fn root(entry: &ChildEntry, retry_budget: u8) -> Self {
        Self {
            path: entry.path.to_string_lossy().into_owned(),
            name: entry.name.clone(),
            node_type: NodeType::Dir,
            depth: 0,
            parent: None,
            ancestors: Vec::new(),
            size: 0,
            last_modified: entry.modified,
            retry_budget,
            record_id: None,
        }
    }

    /// Builds the item for `entry`, which lives directly inside `parent`,
    /// registered in the arena as `parent_handle`.
    pub fn child_of(
        parent: &QueueItem,
        parent_handle: ItemHandle,
        entry: ChildEntry,
        retry_budget: u8,
    ) -> Self {
        let mut ancestors = Vec::with_capacity(parent.ancestors.len() + 1);
        ancestors.extend_from_slice(&parent.ancestors);
        ancestors.push(parent_handle);

        Self {
            path: entry.path.to_string_lossy().into_owned(),
            name: entry.name,
            node_type: entry.node_type,
            depth: parent.depth + 1,
            parent: Some(parent_handle),
            ancestors,
            size: entry.size,
            last_modified: entry.modified,
            retry_budget,
            record_id: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.node_type.is_dir()
    }

    pub fn has_retries(&self) -> bool {
        self.retry_budget > 0
    }

    pub fn decrement_retry(&mut self) {
        self.retry_budget = self.retry_budget.saturating_sub(1);
    }

    /// Depth of this item below an ancestor at `ancestor_depth`.
    pub fn depth_relative_to(&self, ancestor_depth: u32) -> u32 {
        self.depth.saturating_sub(ancestor_depth)
    }

    /// Size stored at insert time: directories start at 0 until aggregated.
    pub fn provisional_size(&self) -> i64 {
        if self.is_dir() {
            0
        } else {
            self.size as i64
        }
    }

    pub fn to_ancestor_record(&self) -> AncestorRecord {
        AncestorRecord {
            path: self.path.clone(),
            depth: self.depth,
            record_id: self.record_id,
        }
    }
}
